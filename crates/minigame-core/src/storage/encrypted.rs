use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{DurableSlot, StorageError};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// On-disk shape of a sealed value
#[derive(Serialize, Deserialize)]
struct Sealed {
    salt: Vec<u8>,
    nonce: Vec<u8>,
    data: Vec<u8>,
}

/// Wraps another slot and encrypts every value with ChaCha20-Poly1305.
///
/// The key is derived from a passphrase with Argon2id and a fresh random
/// salt per write, so the same token written twice never produces the same
/// bytes. Values that fail authentication read back as `Corrupt`.
pub struct EncryptedSlot<S> {
    inner: S,
    passphrase: String,
    params: Params,
}

impl<S: DurableSlot> EncryptedSlot<S> {
    pub fn new(inner: S, passphrase: impl Into<String>) -> Self {
        Self::with_params(inner, passphrase, Params::default())
    }

    /// Use explicit Argon2 cost parameters instead of the library defaults.
    pub fn with_params(inner: S, passphrase: impl Into<String>, params: Params) -> Self {
        Self {
            inner,
            passphrase: passphrase.into(),
            params,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; KEY_LEN], StorageError> {
        let mut key = [0u8; KEY_LEN];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| StorageError::Corrupt(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }

    fn seal(&self, plaintext: &str) -> Result<String, StorageError> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let data = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| StorageError::Corrupt("encryption failed".to_string()))?;

        let sealed = Sealed {
            salt: salt.to_vec(),
            nonce: nonce.to_vec(),
            data,
        };
        serde_json::to_string(&sealed)
            .map_err(|e| StorageError::Corrupt(format!("failed to encode sealed value: {}", e)))
    }

    fn open(&self, raw: &str) -> Result<String, StorageError> {
        let sealed: Sealed = serde_json::from_str(raw)
            .map_err(|e| StorageError::Corrupt(format!("not a sealed value: {}", e)))?;
        if sealed.nonce.len() != NONCE_LEN || sealed.salt.len() != SALT_LEN {
            return Err(StorageError::Corrupt("sealed value has bad header".to_string()));
        }

        let key = self.derive_key(&sealed.salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.data.as_ref())
            .map_err(|_| StorageError::Corrupt("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| StorageError::Corrupt("decrypted value is not UTF-8".to_string()))
    }
}

impl<S: DurableSlot> DurableSlot for EncryptedSlot<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.inner.get(key)? {
            Some(raw) => self.open(&raw).map(Some),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let sealed = self.seal(value)?;
        self.inner.set(key, &sealed)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }

    fn name(&self) -> &'static str {
        "encrypted"
    }
}
