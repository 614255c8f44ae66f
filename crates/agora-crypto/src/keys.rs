use rand_core::OsRng;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::{RsaPrivateKey, RsaPublicKey};
use uuid::Uuid;

use crate::error::{CryptoError, KeyStoreError};

/// Minimum modulus size required by the direct scheme.
pub const RSA_BITS: usize = 2048;

/// Asymmetric key material for one user. Created once on first use of
/// encrypted messaging, immutable thereafter. The private half never
/// leaves the owner's trust boundary.
#[derive(Clone)]
pub struct KeyPair {
    pub owner_id: Uuid,
    pub public_key: RsaPublicKey,
    pub private_key: RsaPrivateKey,
}

/// Access to per-user key material. Implementations decide where the
/// material lives (database rows, hardware-backed storage). Callers pass
/// their own id so the owner trust boundary can be enforced at the seam.
pub trait KeyStore: Send + Sync {
    /// Create a key pair for `owner_id` if none exists; idempotent.
    fn generate_key_pair(&self, owner_id: Uuid) -> Result<KeyPair, KeyStoreError>;

    fn public_key(&self, owner_id: Uuid) -> Result<RsaPublicKey, KeyStoreError>;

    /// Only callable within the owner's trust boundary: fails with
    /// `AccessDenied` when `caller_id` is not the owner.
    fn private_key(&self, owner_id: Uuid, caller_id: Uuid) -> Result<RsaPrivateKey, KeyStoreError>;
}

pub fn generate(owner_id: Uuid) -> Result<KeyPair, CryptoError> {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);
    Ok(KeyPair {
        owner_id,
        public_key,
        private_key,
    })
}

pub fn private_key_to_pem(key: &RsaPrivateKey) -> Result<String, CryptoError> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String, CryptoError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_roundtrip_private() {
        let pair = test_keys::pair(0);
        let pem = private_key_to_pem(&pair.private_key).unwrap();
        let restored = private_key_from_pem(&pem).unwrap();
        assert_eq!(restored, pair.private_key);
    }

    #[test]
    fn pem_roundtrip_public() {
        let pair = test_keys::pair(0);
        let pem = public_key_to_pem(&pair.public_key).unwrap();
        let restored = public_key_from_pem(&pem).unwrap();
        assert_eq!(restored, pair.public_key);
    }

    #[test]
    fn garbage_pem_is_rejected() {
        assert!(private_key_from_pem("not a key").is_err());
        assert!(public_key_from_pem("not a key").is_err());
    }
}
