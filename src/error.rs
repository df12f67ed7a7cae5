use std::path::PathBuf;
use thiserror::Error;

/// Errors raised when a required external value or declaration is missing.
///
/// These are always fatal to the calling bind/get operation and are never
/// retried; callers at the process boundary are expected to fail startup
/// rather than run with partial configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("required value cannot be empty [{0}]")]
    EmptyValue(String),

    #[error("{0} does not declare any key bindings")]
    MissingBinding(&'static str),

    #[error("no instance registered for {0}")]
    MissingInstance(&'static str),

    #[error("failed to read secret '{path}': {source}")]
    SecretRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to list secrets directory '{path}': {source}")]
    SecretScan {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors raised when a resolved string cannot be moved into or out of a
/// target type by either the structured decode or the scalar fallback.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BindError {
    #[error("cannot coerce value for key '{key}': {source}")]
    Coerce {
        key: String,
        source: serde_json::Error,
    },

    #[error("cannot encode value for key '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    #[error("invalid port number: '{0}'")]
    InvalidPort(String),
}

/// A failure propagated verbatim from the remote client.
///
/// This layer does not interpret or retry transport failures; whatever the
/// client raised is carried through unchanged.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

/// Top-level error type for the wharf-config library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("binding error: {0}")]
    Bind(#[from] BindError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
