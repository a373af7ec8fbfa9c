//! Runner configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use testrig_common::DEFAULT_TIMEOUT;

use crate::discovery::DEFAULT_PATTERNS;
use crate::error::{RunnerError, RunnerResult};

/// Suite configuration, read from an optional TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Per-test time budget when a script does not set one
    pub timeout_secs: f64,

    /// Globs, relative to the suite base, naming the test scripts
    pub patterns: Vec<String>,

    /// Harness script wrapping each test, relative to the suite base
    pub harness: PathBuf,

    /// Fixture certificates, relative to the suite base
    pub certs_dir: PathBuf,

    /// Fixture server document root, relative to the suite base
    pub www_dir: PathBuf,

    /// Start the HTTP/HTTPS fixture server for the run
    pub fixture_server: bool,

    /// `TZ` given to the target
    pub timezone: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 7.0,
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            harness: PathBuf::from("lib/testharness.js"),
            certs_dir: PathBuf::from("lib/certs"),
            www_dir: PathBuf::from("lib/www"),
            fixture_server: true,
            timezone: "CIST-12:45:00".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults when it does
    /// not exist
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RunnerResult<()> {
        if self.timeout_secs <= 0.0 || Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(RunnerError::InvalidConfig(format!(
                "timeout_secs must be positive, got {}",
                self.timeout_secs
            )));
        }
        if self.patterns.is_empty() {
            return Err(RunnerError::InvalidConfig("no test patterns".into()));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn harness_path(&self, base: &Path) -> PathBuf {
        base.join(&self.harness)
    }

    pub fn certs_path(&self, base: &Path) -> PathBuf {
        base.join(&self.certs_dir)
    }

    pub fn www_path(&self, base: &Path) -> PathBuf {
        base.join(&self.www_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::load(&dir.path().join("testrig.toml")).unwrap();
        assert_eq!(config.default_timeout(), Duration::from_secs(7));
        assert_eq!(config.patterns.len(), 4);
        assert!(config.fixture_server);
        assert_eq!(
            config.harness_path(Path::new("/suite")),
            PathBuf::from("/suite/lib/testharness.js")
        );
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testrig.toml");
        std::fs::write(
            &path,
            "timeout_secs = 1.5\npatterns = [\"cases/*.js\"]\nfixture_server = false\n",
        )
        .unwrap();

        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.default_timeout(), Duration::from_millis(1500));
        assert_eq!(config.patterns, vec!["cases/*.js"]);
        assert!(!config.fixture_server);
        assert_eq!(config.www_dir, PathBuf::from("lib/www"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testrig.toml");

        std::fs::write(&path, "timeout_secs = 0.0\n").unwrap();
        assert!(matches!(
            RunnerConfig::load(&path),
            Err(RunnerError::InvalidConfig(_))
        ));

        std::fs::write(&path, "timeout_secs = \"soon\"\n").unwrap();
        assert!(matches!(RunnerConfig::load(&path), Err(RunnerError::Toml(_))));
    }
}
