/// Password-derived symmetric encryption
///
/// Keys are derived with PBKDF2-HMAC-SHA512 over a fresh 16-byte salt,
/// then used with AES-256-GCM under a fresh 12-byte nonce. Every blob
/// carries its own salt, nonce, and iteration count, so decryption is a
/// single deterministic parameter set with no fallback across
/// historical KDF settings. A wrong password fails the GCM tag check
/// and surfaces as `SyncError::Encryption`, never as wrong plaintext.
use crate::error::{SyncError, SyncResult};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::sync::Mutex;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// An encrypted payload, opaque to every component except `CipherBox`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlob {
    /// Base64 AES-256-GCM ciphertext with the auth tag appended
    pub ciphertext: String,
    /// Base64 12-byte nonce
    pub nonce: String,
    /// Base64 16-byte KDF salt
    pub kdf_salt: String,
    /// PBKDF2 iteration count this blob was sealed under
    pub kdf_iterations: u32,
}

/// Password-derived encryption box
///
/// May be constructed unkeyed; operations then fail with
/// `NotInitialized` until `set_password` is called.
pub struct CipherBox {
    iterations: u32,
    password: Mutex<Option<String>>,
}

impl CipherBox {
    /// Create an unkeyed box
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations,
            password: Mutex::new(None),
        }
    }

    /// Create a box keyed with a password
    pub fn with_password(iterations: u32, password: &str) -> Self {
        Self {
            iterations,
            password: Mutex::new(Some(password.to_string())),
        }
    }

    /// Establish (or replace) the password
    pub fn set_password(&self, password: &str) {
        *self.password.lock().expect("password lock poisoned") = Some(password.to_string());
    }

    pub fn is_keyed(&self) -> bool {
        self.password
            .lock()
            .expect("password lock poisoned")
            .is_some()
    }

    /// Encrypt with the established password
    pub fn encrypt(&self, plaintext: &[u8]) -> SyncResult<EncryptedBlob> {
        let password = self.established_password()?;
        self.encrypt_with(plaintext, &password)
    }

    /// Decrypt with the established password
    pub fn decrypt(&self, blob: &EncryptedBlob) -> SyncResult<Vec<u8>> {
        let password = self.established_password()?;
        self.decrypt_with(blob, &password)
    }

    /// Encrypt with an explicit password, fresh salt and nonce
    pub fn encrypt_with(&self, plaintext: &[u8], password: &str) -> SyncResult<EncryptedBlob> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = derive_key(password, &salt, self.iterations);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SyncError::Encryption(format!("Failed to create cipher: {}", e)))?;

        let nonce = Nonce::from(nonce_bytes);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SyncError::Encryption(format!("Encryption failed: {}", e)))?;

        Ok(EncryptedBlob {
            ciphertext: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce_bytes),
            kdf_salt: BASE64.encode(salt),
            kdf_iterations: self.iterations,
        })
    }

    /// Decrypt with an explicit password, using exactly the parameters
    /// recorded in the blob
    pub fn decrypt_with(&self, blob: &EncryptedBlob, password: &str) -> SyncResult<Vec<u8>> {
        let ciphertext = BASE64
            .decode(&blob.ciphertext)
            .map_err(|e| SyncError::Encryption(format!("Invalid ciphertext encoding: {}", e)))?;
        let nonce_bytes = BASE64
            .decode(&blob.nonce)
            .map_err(|e| SyncError::Encryption(format!("Invalid nonce encoding: {}", e)))?;
        let salt = BASE64
            .decode(&blob.kdf_salt)
            .map_err(|e| SyncError::Encryption(format!("Invalid salt encoding: {}", e)))?;

        let nonce_bytes: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| SyncError::Encryption("Invalid nonce length".to_string()))?;

        if salt.len() != SALT_LEN {
            return Err(SyncError::Encryption("Invalid salt length".to_string()));
        }

        let key = derive_key(password, &salt, blob.kdf_iterations);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SyncError::Encryption(format!("Failed to create cipher: {}", e)))?;

        let nonce = Nonce::from(nonce_bytes);
        cipher
            .decrypt(&nonce, ciphertext.as_slice())
            .map_err(|_| SyncError::Encryption("Decryption failed".to_string()))
    }

    fn established_password(&self) -> SyncResult<String> {
        self.password
            .lock()
            .expect("password lock poisoned")
            .clone()
            .ok_or_else(|| SyncError::NotInitialized("No password established".to_string()))
    }
}

impl std::fmt::Debug for CipherBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherBox")
            .field("iterations", &self.iterations)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 32-byte key with PBKDF2-HMAC-SHA512
fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, iterations, &mut key);
    key
}
