use std::sync::Arc;

use anyhow::anyhow;
use tracing::info;
use uuid::Uuid;

use agora_crypto::keys::{
    self, KeyPair, KeyStore, private_key_from_pem, private_key_to_pem, public_key_from_pem,
    public_key_to_pem,
};
use agora_crypto::KeyStoreError;
use agora_db::Database;
use agora_db::models::KeyPairRow;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// Key store backed by the persistence collaborator. Key pairs are
/// created once per user on first use of encrypted messaging and are
/// immutable thereafter (no rotation in scope).
#[derive(Clone)]
pub struct DbKeyStore {
    db: Arc<Database>,
}

impl DbKeyStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn load(&self, owner_id: Uuid) -> Result<Option<KeyPairRow>, KeyStoreError> {
        Ok(self.db.get_key_pair(&owner_id.to_string())?)
    }
}

impl KeyStore for DbKeyStore {
    fn generate_key_pair(&self, owner_id: Uuid) -> Result<KeyPair, KeyStoreError> {
        // Idempotent: an existing pair is returned untouched.
        if let Some(row) = self.load(owner_id)? {
            return parse_pair(owner_id, &row);
        }

        let pair = keys::generate(owner_id)
            .map_err(|e| KeyStoreError::KeyGeneration(e.to_string()))?;
        let public_pem = public_key_to_pem(&pair.public_key)
            .map_err(|e| KeyStoreError::KeyGeneration(e.to_string()))?;
        let private_pem = private_key_to_pem(&pair.private_key)
            .map_err(|e| KeyStoreError::KeyGeneration(e.to_string()))?;

        let inserted =
            self.db
                .insert_key_pair_if_absent(&owner_id.to_string(), &public_pem, &private_pem)?;

        if inserted {
            info!("Generated key pair for {}", owner_id);
            return Ok(pair);
        }

        // Lost a concurrent generation race: the first writer's pair wins.
        let row = self
            .load(owner_id)?
            .ok_or_else(|| KeyStoreError::Storage(anyhow!("key pair vanished for {}", owner_id)))?;
        parse_pair(owner_id, &row)
    }

    fn public_key(&self, owner_id: Uuid) -> Result<RsaPublicKey, KeyStoreError> {
        let row = self
            .load(owner_id)?
            .ok_or(KeyStoreError::KeyNotFound(owner_id))?;
        public_key_from_pem(&row.public_key_pem)
            .map_err(|e| KeyStoreError::Storage(anyhow!("corrupt public key: {}", e)))
    }

    fn private_key(&self, owner_id: Uuid, caller_id: Uuid) -> Result<RsaPrivateKey, KeyStoreError> {
        // Trust boundary: the private half is only handed to its owner.
        if caller_id != owner_id {
            return Err(KeyStoreError::AccessDenied { caller: caller_id });
        }
        let row = self
            .load(owner_id)?
            .ok_or(KeyStoreError::KeyNotFound(owner_id))?;
        private_key_from_pem(&row.private_key_pem)
            .map_err(|e| KeyStoreError::Storage(anyhow!("corrupt private key: {}", e)))
    }
}

fn parse_pair(owner_id: Uuid, row: &KeyPairRow) -> Result<KeyPair, KeyStoreError> {
    let public_key = public_key_from_pem(&row.public_key_pem)
        .map_err(|e| KeyStoreError::Storage(anyhow!("corrupt public key: {}", e)))?;
    let private_key = private_key_from_pem(&row.private_key_pem)
        .map_err(|e| KeyStoreError::Storage(anyhow!("corrupt private key: {}", e)))?;
    Ok(KeyPair {
        owner_id,
        public_key,
        private_key,
    })
}
