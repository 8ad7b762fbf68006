// =============================================================================
// Token store — encrypted at rest, keyed from a process-wide secret
// =============================================================================
//
// API tokens for the operator's Deriv accounts are encrypted with AES-256-GCM
// before they touch disk. The key is derived from a process secret (an
// environment variable, mirroring `api/auth.rs`'s `QUANTIS_ADMIN_TOKEN`
// pattern) via PBKDF2-HMAC-SHA256 with a fixed salt and a high iteration
// count — the salt doesn't need to be random here since there is exactly one
// key in play per deployment, derived fresh from the environment at startup.
// Plaintext tokens are never logged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use crate::constants::TOKEN_STORE_PBKDF2_ITERATIONS;

const SALT: &[u8] = b"quantis-deriv-engine-token-store-v1";

#[derive(Debug, Serialize, Deserialize, Default)]
struct EncryptedRecord {
    nonce: String,
    ciphertext: String,
}

/// An account's stored, encrypted Deriv API token.
pub struct TokenStore {
    path: PathBuf,
    key: Key<Aes256Gcm>,
}

impl TokenStore {
    /// `secret` is the process-wide key material (e.g. read from an
    /// environment variable at startup). Never logged or persisted itself.
    pub fn new(path: impl Into<PathBuf>, secret: &str) -> Self {
        let mut derived = [0u8; 32];
        pbkdf2_hmac::<Sha256>(secret.as_bytes(), SALT, TOKEN_STORE_PBKDF2_ITERATIONS, &mut derived);
        Self { path: path.into(), key: *Key::<Aes256Gcm>::from_slice(&derived) }
    }

    /// Encrypt and persist `token` under `account_id`, merging into any
    /// existing on-disk store.
    pub fn store(&self, account_id: &str, token: &str) -> Result<()> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, token.as_bytes())
            .map_err(|_| anyhow!("token encryption failed"))?;

        let mut records = self.load_all().unwrap_or_default();
        records.insert(
            account_id.to_string(),
            EncryptedRecord { nonce: hex::encode(nonce), ciphertext: hex::encode(ciphertext) },
        );
        self.save_all(&records)?;
        info!(account_id, "token stored (encrypted)");
        Ok(())
    }

    /// Decrypt and return the token for `account_id`, if present.
    pub fn retrieve(&self, account_id: &str) -> Result<Option<String>> {
        let records = self.load_all().unwrap_or_default();
        let Some(record) = records.get(account_id) else { return Ok(None) };

        let nonce_bytes = hex::decode(&record.nonce).context("decode stored nonce")?;
        let ciphertext = hex::decode(&record.ciphertext).context("decode stored ciphertext")?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = Aes256Gcm::new(&self.key);
        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| anyhow!("token decryption failed — wrong secret or corrupt store"))?;

        Ok(Some(String::from_utf8(plaintext).context("decrypted token is not valid UTF-8")?))
    }

    pub fn remove(&self, account_id: &str) -> Result<()> {
        let mut records = self.load_all().unwrap_or_default();
        records.remove(account_id);
        self.save_all(&records)?;
        Ok(())
    }

    fn load_all(&self) -> Result<HashMap<String, EncryptedRecord>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path).context("read token store")?;
        serde_json::from_str(&content).or_else(|e| {
            warn!(error = %e, path = %self.path.display(), "token store unparsable, starting fresh");
            Ok(HashMap::new())
        })
    }

    fn save_all(&self, records: &HashMap<String, EncryptedRecord>) -> Result<()> {
        let path: &Path = &self.path;
        let content = serde_json::to_string_pretty(records).context("serialise token store")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("write tmp token store to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("rename tmp token store to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{name}_{}.json", chrono::Utc::now().timestamp_nanos_opt().unwrap()))
    }

    #[test]
    fn round_trips_a_stored_token() {
        let path = temp_path("token_store_roundtrip");
        let store = TokenStore::new(&path, "test-secret");
        store.store("acct-1", "deriv-api-token-abc123").unwrap();

        let retrieved = store.retrieve("acct-1").unwrap();
        assert_eq!(retrieved.as_deref(), Some("deriv-api-token-abc123"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_account_returns_none() {
        let path = temp_path("token_store_missing");
        let store = TokenStore::new(&path, "test-secret");
        assert!(store.retrieve("nope").unwrap().is_none());
    }

    #[test]
    fn wrong_secret_fails_to_decrypt() {
        let path = temp_path("token_store_wrong_secret");
        let store = TokenStore::new(&path, "correct-secret");
        store.store("acct-1", "sensitive-token").unwrap();

        let other = TokenStore::new(&path, "wrong-secret");
        assert!(other.retrieve("acct-1").is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn remove_deletes_stored_token() {
        let path = temp_path("token_store_remove");
        let store = TokenStore::new(&path, "test-secret");
        store.store("acct-1", "token-value").unwrap();
        store.remove("acct-1").unwrap();
        assert!(store.retrieve("acct-1").unwrap().is_none());

        let _ = std::fs::remove_file(&path);
    }
}
