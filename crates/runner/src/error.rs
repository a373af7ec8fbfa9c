//! Error types for the runner

use std::path::PathBuf;

use thiserror::Error;

use testrig_common::RunResult;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Directive(String),

    #[error("{}: {source}", path.display())]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Don't know how to invoke {0}")]
    UnknownDebugger(String),

    #[error("Version check failed")]
    VersionCheck(RunResult),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid test pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
