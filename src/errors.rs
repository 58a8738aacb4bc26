use std::fmt;

use thiserror::Error;

/// Stage of an encrypt/decrypt call, carried by crypto errors so callers
/// can tell which step failed without seeing any buffer contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoOp {
    Serialize,
    GenerateDataKey,
    WrapDataKey,
    UnwrapDataKey,
    Seal,
    Open,
    Frame,
    Deserialize,
}

impl fmt::Display for CryptoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Serialize => "serialize",
            Self::GenerateDataKey => "generate_data_key",
            Self::WrapDataKey => "wrap_data_key",
            Self::UnwrapDataKey => "unwrap_data_key",
            Self::Seal => "seal",
            Self::Open => "open",
            Self::Frame => "frame",
            Self::Deserialize => "deserialize",
        };
        f.write_str(s)
    }
}

/// Failures of the raw AES-256-GCM primitive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("nonce must be 12 bytes, got {0}")]
    InvalidNonceLength(usize),

    #[error("auth tag must be 16 bytes, got {0}")]
    InvalidTagLength(usize),

    #[error("sealed buffer too short ({0} bytes)")]
    Truncated(usize),

    #[error("authentication failed: wrong key or tampered data")]
    Authentication,

    #[error("system random number generator unavailable")]
    Rng,
}

/// Errors returned by a key provider (external KMS or local).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid key id '{0}'")]
    InvalidKeyId(String),

    #[error("key provider unavailable: {0}")]
    Unavailable(String),

    #[error("key provider returned a {actual}-byte key (expected {expected})")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("key provider could not unwrap data key: {0}")]
    UnwrapFailed(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

impl ProviderError {
    /// Only availability failures are worth a caller-level retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// All errors that can occur in the credential vault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Validation ---
    #[error("Validation failed: {0}")]
    Validation(String),

    // --- Crypto errors ---
    #[error("Encryption failed during {op}: {reason}")]
    Encryption { op: CryptoOp, reason: String },

    #[error("Decryption failed during {op}: {reason}")]
    Decryption { op: CryptoOp, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    // --- Record errors ---
    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // --- Config errors ---
    #[error("Config error: {0}")]
    Config(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation cancelled")]
    Cancelled,

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl VaultError {
    pub fn encryption(op: CryptoOp, reason: impl fmt::Display) -> Self {
        Self::Encryption {
            op,
            reason: reason.to_string(),
        }
    }

    pub fn decryption(op: CryptoOp, reason: impl fmt::Display) -> Self {
        Self::Decryption {
            op,
            reason: reason.to_string(),
        }
    }

    /// True when retrying the same call later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_retryable())
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience type alias for vault results.
pub type Result<T> = std::result::Result<T, VaultError>;
