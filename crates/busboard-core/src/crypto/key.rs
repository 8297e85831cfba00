//! Key derivation from the shared dataset password.
//!
//! All devices on a dataset must derive bit-identical keys from the same
//! password, so the salt is deterministic (a fixed application prefix plus the
//! dataset identifier) and the KDF is PBKDF2-HMAC-SHA256 with a high, fixed
//! iteration count. Different datasets never share a salt, so the same
//! password on two datasets yields unrelated keys.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::{Result, RosterError};

/// PBKDF2 iteration count. Fixed: changing it would silently derive different
/// keys on different app versions.
const PBKDF2_ITERATIONS: u32 = 310_000;

/// Length of the derived key in bytes (256 bits for AES-256-GCM).
const KEY_LENGTH: usize = 32;

/// Application-scoped salt prefix; the dataset id is appended.
const SALT_PREFIX: &str = "busboard/dataset:";

/// A 256-bit encryption key derived from the dataset password.
///
/// Key material is zeroized from memory on drop and redacted from Debug
/// output.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    /// Create a DerivedKey from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Get a reference to the raw key bytes.
    ///
    /// Use only for immediate cipher construction; never store or log.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Encode the raw key for the local key cache.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key)
    }

    /// Decode a key previously exported with [`DerivedKey::to_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| RosterError::Crypto(format!("Invalid cached key encoding: {}", e)))?;
        let key: [u8; KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| RosterError::Crypto("Cached key has wrong length".to_string()))?;
        Ok(Self { key })
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the dataset encryption key from a password.
///
/// Deterministic: the same password and dataset id always produce the same
/// key, on every device.
///
/// # Errors
///
/// Returns `RosterError::InvalidInput` when the password or dataset id is
/// empty.
pub fn derive_key(password: &str, dataset_id: &str) -> Result<DerivedKey> {
    if password.is_empty() {
        return Err(RosterError::InvalidInput(
            "Password cannot be empty".to_string(),
        ));
    }
    if dataset_id.trim().is_empty() {
        return Err(RosterError::InvalidInput(
            "Dataset id cannot be empty".to_string(),
        ));
    }

    let salt = format!("{}{}", SALT_PREFIX, dataset_id);
    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut key_bytes,
    );

    Ok(DerivedKey::from_bytes(key_bytes))
}
