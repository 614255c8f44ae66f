use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;

/// Substituted for message text whenever decryption fails. Decryption
/// failure is a recoverable, user-visible condition, never a crash.
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[unable to decrypt]";

/// Upper bound on direct-scheme plaintext: a 2048-bit modulus leaves
/// 256 - 2 * 32 - 2 = 190 bytes under OAEP with SHA-256. Longer payloads
/// belong to the symmetric scheme.
pub const DIRECT_PLAINTEXT_MAX: usize = 190;

/// Output of the group envelope scheme. The caller wraps `key` for each
/// current recipient; the raw key itself is never persisted.
pub struct GroupCiphertext {
    pub ciphertext: Vec<u8>,
    pub key: [u8; 32],
    pub nonce: [u8; 12],
}

/// Stateless cryptographic operations, split by conversation type.
pub trait EncryptionEngine: Send + Sync {
    fn encrypt_direct(
        &self,
        plaintext: &[u8],
        recipient: &RsaPublicKey,
    ) -> Result<Vec<u8>, CryptoError>;

    fn decrypt_direct(
        &self,
        ciphertext: &[u8],
        owner: &RsaPrivateKey,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Generates a fresh 256-bit key and 96-bit nonce per message.
    fn encrypt_group(&self, plaintext: &[u8]) -> Result<GroupCiphertext, CryptoError>;

    fn decrypt_group(
        &self,
        ciphertext: &[u8],
        key: &[u8; 32],
        nonce: &[u8; 12],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Wrap a per-message symmetric key for one recipient.
    fn wrap_key(&self, key: &[u8; 32], recipient: &RsaPublicKey) -> Result<Vec<u8>, CryptoError>;

    fn unwrap_key(&self, wrapped: &[u8], owner: &RsaPrivateKey) -> Result<[u8; 32], CryptoError>;
}

/// RSA-OAEP (SHA-256) for two-party messages, AES-256-GCM envelopes for
/// multi-party conversations.
#[derive(Debug, Default, Clone, Copy)]
pub struct OaepEngine;

impl OaepEngine {
    pub fn new() -> Self {
        Self
    }
}

impl EncryptionEngine for OaepEngine {
    fn encrypt_direct(
        &self,
        plaintext: &[u8],
        recipient: &RsaPublicKey,
    ) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() > DIRECT_PLAINTEXT_MAX {
            return Err(CryptoError::PayloadTooLarge {
                limit: DIRECT_PLAINTEXT_MAX,
            });
        }
        let mut rng = OsRng;
        recipient
            .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    fn decrypt_direct(
        &self,
        ciphertext: &[u8],
        owner: &RsaPrivateKey,
    ) -> Result<Vec<u8>, CryptoError> {
        owner
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }

    fn encrypt_group(&self, plaintext: &[u8]) -> Result<GroupCiphertext, CryptoError> {
        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        Ok(GroupCiphertext {
            ciphertext,
            key,
            nonce,
        })
    }

    fn decrypt_group(
        &self,
        ciphertext: &[u8],
        key: &[u8; 32],
        nonce: &[u8; 12],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }

    fn wrap_key(&self, key: &[u8; 32], recipient: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
        let mut rng = OsRng;
        recipient
            .encrypt(&mut rng, Oaep::new::<Sha256>(), key.as_slice())
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    fn unwrap_key(&self, wrapped: &[u8], owner: &RsaPrivateKey) -> Result<[u8; 32], CryptoError> {
        let bytes = owner
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::Decryption)?;
        bytes.try_into().map_err(|_| CryptoError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_keys;

    #[test]
    fn direct_roundtrip() {
        let pair = test_keys::pair(0);
        let engine = OaepEngine::new();
        let message = b"meet at the north gate";

        let ciphertext = engine.encrypt_direct(message, &pair.public_key).unwrap();
        assert_ne!(&ciphertext, message);

        let decrypted = engine.decrypt_direct(&ciphertext, &pair.private_key).unwrap();
        assert_eq!(decrypted, message);
    }

    #[test]
    fn direct_roundtrip_at_size_bound() {
        let pair = test_keys::pair(0);
        let engine = OaepEngine::new();
        let message = vec![0x41u8; DIRECT_PLAINTEXT_MAX];

        let ciphertext = engine.encrypt_direct(&message, &pair.public_key).unwrap();
        let decrypted = engine.decrypt_direct(&ciphertext, &pair.private_key).unwrap();
        assert_eq!(decrypted, message);
    }

    #[test]
    fn direct_rejects_oversize_plaintext() {
        let pair = test_keys::pair(0);
        let engine = OaepEngine::new();
        let message = vec![0x41u8; DIRECT_PLAINTEXT_MAX + 1];

        let err = engine.encrypt_direct(&message, &pair.public_key).unwrap_err();
        assert!(matches!(err, CryptoError::PayloadTooLarge { .. }));
    }

    #[test]
    fn direct_wrong_key_fails_cleanly() {
        let sender = test_keys::pair(0);
        let other = test_keys::pair(1);
        let engine = OaepEngine::new();

        let ciphertext = engine.encrypt_direct(b"secret", &sender.public_key).unwrap();
        let err = engine.decrypt_direct(&ciphertext, &other.private_key).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption));
    }

    #[test]
    fn group_roundtrip_arbitrary_length() {
        let engine = OaepEngine::new();
        let message = vec![0x5au8; 16 * 1024];

        let sealed = engine.encrypt_group(&message).unwrap();
        let decrypted = engine
            .decrypt_group(&sealed.ciphertext, &sealed.key, &sealed.nonce)
            .unwrap();
        assert_eq!(decrypted, message);
    }

    #[test]
    fn group_fresh_key_per_message() {
        let engine = OaepEngine::new();
        let a = engine.encrypt_group(b"same plaintext").unwrap();
        let b = engine.encrypt_group(b"same plaintext").unwrap();
        assert_ne!(a.key, b.key);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn group_tamper_is_detected() {
        let engine = OaepEngine::new();
        let mut sealed = engine.encrypt_group(b"authenticated").unwrap();
        sealed.ciphertext[0] ^= 0xff;

        let err = engine
            .decrypt_group(&sealed.ciphertext, &sealed.key, &sealed.nonce)
            .unwrap_err();
        assert!(matches!(err, CryptoError::Decryption));
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let pair = test_keys::pair(0);
        let engine = OaepEngine::new();
        let sealed = engine.encrypt_group(b"envelope").unwrap();

        let wrapped = engine.wrap_key(&sealed.key, &pair.public_key).unwrap();
        let unwrapped = engine.unwrap_key(&wrapped, &pair.private_key).unwrap();
        assert_eq!(unwrapped, sealed.key);
    }

    #[test]
    fn unwrap_with_wrong_key_fails_cleanly() {
        let owner = test_keys::pair(0);
        let other = test_keys::pair(1);
        let engine = OaepEngine::new();
        let sealed = engine.encrypt_group(b"envelope").unwrap();

        let wrapped = engine.wrap_key(&sealed.key, &owner.public_key).unwrap();
        let err = engine.unwrap_key(&wrapped, &other.private_key).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption));
    }
}
