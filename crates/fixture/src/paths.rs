//! Request path translation

use std::path::{Path, PathBuf};

/// A request path reduced to a location under the document root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    /// Lowercased, normalized, `/`-separated and never escaping the root
    pub relative: String,
    pub trailing_slash: bool,
}

impl Translated {
    /// Map a raw request target onto the document root.
    ///
    /// Query and fragment are dropped, the rest is percent-decoded and
    /// lowercased, and `.`, `..` and empty segments are collapsed so the
    /// result can never leave the root.
    pub fn new(raw: &str) -> Self {
        let end = raw.find(['?', '#']).unwrap_or(raw.len());
        let decoded = urlencoding::decode_binary(raw[..end].as_bytes());
        let path = String::from_utf8_lossy(&decoded).to_lowercase();

        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }

        Self {
            relative: segments.join("/"),
            trailing_slash: path.ends_with('/'),
        }
    }

    pub fn on_disk(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.relative.split('/').filter(|s| !s.is_empty()));
        path
    }
}
