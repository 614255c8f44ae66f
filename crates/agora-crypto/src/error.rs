use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Recoverable: callers substitute the placeholder text instead of
    /// propagating a crash.
    #[error("decryption failed")]
    Decryption,

    #[error("plaintext exceeds the {limit}-byte bound of the direct scheme")]
    PayloadTooLarge { limit: usize },

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("no key pair for user {0}")]
    KeyNotFound(Uuid),

    #[error("private key access denied for caller {caller}")]
    AccessDenied { caller: Uuid },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
