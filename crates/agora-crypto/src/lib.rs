//! Cryptographic primitives for the messaging core.
//!
//! Two schemes, chosen by conversation type:
//! - direct conversations use RSA-OAEP straight to the recipient's public
//!   key, which avoids any shared-secret exchange for two-party chats;
//! - group and channel conversations use a fresh AES-256-GCM key per
//!   message, wrapped per recipient (encrypt once, wrap N times).
//!
//! Both the engine and the key store are traits so implementations can be
//! swapped (hardware-backed key storage, a different AEAD) without
//! touching the messaging service.

pub mod engine;
pub mod error;
pub mod keys;

pub use engine::{
    DIRECT_PLAINTEXT_MAX, EncryptionEngine, GroupCiphertext, OaepEngine, UNDECRYPTABLE_PLACEHOLDER,
};
pub use error::{CryptoError, KeyStoreError};
pub use keys::{KeyPair, KeyStore};
