use thiserror::Error;
use uuid::Uuid;

use agora_crypto::{CryptoError, KeyStoreError};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("no key pair for user {0}")]
    KeyNotFound(Uuid),

    #[error("access denied")]
    AccessDenied,

    /// Recoverable: affected message degrades to the placeholder text.
    #[error("decryption failed")]
    Decryption,

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("caller is not a participant of this conversation")]
    NotAParticipant,

    #[error("caller lacks admin privileges for this conversation")]
    NotAuthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Database(#[from] anyhow::Error),
}

impl CoreError {
    /// True for failures that degrade to a placeholder instead of failing
    /// the whole call.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CoreError::Decryption)
    }

    /// HTTP status the API layer maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::BadRequest(_) => 400,
            CoreError::AccessDenied | CoreError::NotAParticipant | CoreError::NotAuthorized => 403,
            CoreError::KeyNotFound(_) | CoreError::ConversationNotFound | CoreError::MessageNotFound => {
                404
            }
            CoreError::KeyGeneration(_)
            | CoreError::Decryption
            | CoreError::Encryption(_)
            | CoreError::Database(_) => 500,
        }
    }
}

impl From<KeyStoreError> for CoreError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::KeyGeneration(msg) => CoreError::KeyGeneration(msg),
            KeyStoreError::KeyNotFound(owner) => CoreError::KeyNotFound(owner),
            KeyStoreError::AccessDenied { .. } => CoreError::AccessDenied,
            KeyStoreError::Storage(e) => CoreError::Database(e),
        }
    }
}

impl From<CryptoError> for CoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyGeneration(msg) => CoreError::KeyGeneration(msg),
            CryptoError::Encryption(msg) | CryptoError::InvalidKey(msg) => {
                CoreError::Encryption(msg)
            }
            CryptoError::Decryption => CoreError::Decryption,
            CryptoError::PayloadTooLarge { limit } => CoreError::BadRequest(format!(
                "plaintext exceeds the {}-byte bound of the direct scheme",
                limit
            )),
        }
    }
}
