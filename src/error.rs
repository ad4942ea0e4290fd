use thiserror::Error;

/// Errors raised while setting up the service (configuration, key loading).
///
/// Nothing in this enum crosses the `recover` boundary: per-request
/// failures are resolved to a [`crate::outcome::ResultCode`] instead.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key loading failed: {0}")]
    KeyLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Failures of token, cipher, and encoding operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    #[error("Random number generation failed: {0}")]
    Rng(String),
}

/// Failures of the key repository. "Not found" is not an error: lookups
/// return `Ok(None)` for that case.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt key record: {0}")]
    Corrupt(String),
}

/// Failures of an audit sink.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit sink rejected event: {0}")]
    Rejected(String),
}
