//! Error types for the fixture server

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("failed to bind fixture listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("{}: {source}", path.display())]
    ReadCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {reason}", path.display())]
    InvalidCertificate { path: PathBuf, reason: String },

    #[error("PEM error: {0}")]
    Pem(#[from] pem::PemError),

    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FixtureResult<T> = Result<T, FixtureError>;
