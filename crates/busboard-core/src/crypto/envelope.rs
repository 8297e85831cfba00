//! Authenticated encryption of record documents for the sync wire.
//!
//! The wire format inside the envelope is `nonce(12) || ciphertext || auth_tag(16)`,
//! AES-256-GCM, base64-encoded into `{enc, v: 1}`. A fresh random nonce is
//! generated per call and never reused for a given key.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

use crate::error::{Result, RosterError};
use crate::model::{Envelope, RemoteDocument, ENVELOPE_VERSION};

use super::key::DerivedKey;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt a record into a wire envelope.
///
/// Pure computation with no shared state; safe to call concurrently.
pub fn encrypt_record<R: Serialize>(key: &DerivedKey, record: &R) -> Result<Envelope> {
    let plaintext = serde_json::to_vec(record)
        .map_err(|e| RosterError::Crypto(format!("Record serialization failed: {}", e)))?;

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let nonce_bytes: [u8; NONCE_LEN] = nonce.into();

    let ciphertext_with_tag = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| RosterError::Crypto(format!("Encryption failed: {}", e)))?;

    // Wire format: nonce || ciphertext || tag (aes-gcm appends the tag).
    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext_with_tag.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext_with_tag);

    Ok(Envelope {
        enc: BASE64.encode(blob),
        v: ENVELOPE_VERSION,
    })
}

/// Decrypt a wire envelope back into the record document.
///
/// The remote document key is authoritative over any embedded id: the
/// decrypted document is re-stamped with `expected_id`, defending against id
/// drift between the document key and its payload.
///
/// # Errors
///
/// Returns `RosterError::WrongPassword` when tag verification fails; the
/// caller must treat this as a wrong-password signal, never as corrupt data
/// or a generic I/O error.
pub fn decrypt_envelope(
    key: &DerivedKey,
    envelope: &Envelope,
    expected_id: &str,
) -> Result<serde_json::Value> {
    if envelope.v != ENVELOPE_VERSION {
        return Err(RosterError::Crypto(format!(
            "Unsupported envelope version {}",
            envelope.v
        )));
    }

    let blob = BASE64
        .decode(&envelope.enc)
        .map_err(|e| RosterError::Crypto(format!("Invalid envelope encoding: {}", e)))?;
    // Minimum: nonce + tag around an empty ciphertext.
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(RosterError::Crypto("Envelope too short".to_string()));
    }

    let nonce_bytes: [u8; NONCE_LEN] = blob[..NONCE_LEN]
        .try_into()
        .map_err(|_| RosterError::Crypto("Invalid nonce length".to_string()))?;
    let ciphertext_with_tag = &blob[NONCE_LEN..];

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from(nonce_bytes);
    let plaintext = cipher
        .decrypt(&nonce, ciphertext_with_tag)
        .map_err(|_| RosterError::WrongPassword)?;

    let mut doc: serde_json::Value = serde_json::from_slice(&plaintext)
        .map_err(|e| RosterError::Crypto(format!("Decrypted payload is not JSON: {}", e)))?;
    stamp_id(&mut doc, expected_id)?;
    Ok(doc)
}

/// Decrypt a remote document of either wire shape.
///
/// Plaintext documents pass through unchanged apart from the id re-stamp.
/// An encrypted document with no key available is a wrong-password condition:
/// the caller cannot see plaintext without unlocking first.
pub fn decrypt_document(
    key: Option<&DerivedKey>,
    document: RemoteDocument,
    expected_id: &str,
) -> Result<serde_json::Value> {
    match document {
        RemoteDocument::Plaintext(mut doc) => {
            stamp_id(&mut doc, expected_id)?;
            Ok(doc)
        }
        RemoteDocument::Encrypted(envelope) => match key {
            Some(key) => decrypt_envelope(key, &envelope, expected_id),
            None => Err(RosterError::WrongPassword),
        },
    }
}

fn stamp_id(doc: &mut serde_json::Value, expected_id: &str) -> Result<()> {
    match doc.as_object_mut() {
        Some(obj) => {
            obj.insert(
                "id".to_string(),
                serde_json::Value::String(expected_id.to_string()),
            );
            Ok(())
        }
        None => Err(RosterError::Crypto(
            "Remote document is not an object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::derive_key;
    use crate::model::Student;

    fn test_key() -> DerivedKey {
        derive_key("hunter2", "district-12").unwrap()
    }

    fn sample_student() -> Student {
        Student {
            id: "s1".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = test_key();
        let student = sample_student();

        let envelope = encrypt_record(&key, &student).unwrap();
        assert_eq!(envelope.v, 1);

        let doc = decrypt_envelope(&key, &envelope, "s1").unwrap();
        let restored: Student = serde_json::from_value(doc).unwrap();
        assert_eq!(restored, student);
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = test_key();
        let student = sample_student();
        let a = encrypt_record(&key, &student).unwrap();
        let b = encrypt_record(&key, &student).unwrap();
        assert_ne!(a.enc, b.enc);
    }

    #[test]
    fn test_wrong_key_signals_wrong_password() {
        let key = test_key();
        let other = derive_key("hunter3", "district-12").unwrap();

        let envelope = encrypt_record(&key, &sample_student()).unwrap();
        let result = decrypt_envelope(&other, &envelope, "s1");
        assert!(matches!(result, Err(RosterError::WrongPassword)));
    }

    #[test]
    fn test_tampered_ciphertext_signals_wrong_password() {
        let key = test_key();
        let envelope = encrypt_record(&key, &sample_student()).unwrap();

        let mut blob = BASE64.decode(&envelope.enc).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let tampered = Envelope {
            enc: BASE64.encode(blob),
            v: 1,
        };

        let result = decrypt_envelope(&key, &tampered, "s1");
        assert!(matches!(result, Err(RosterError::WrongPassword)));
    }

    #[test]
    fn test_document_key_wins_over_embedded_id() {
        let key = test_key();
        let envelope = encrypt_record(&key, &sample_student()).unwrap();

        let doc = decrypt_envelope(&key, &envelope, "renamed").unwrap();
        assert_eq!(doc["id"], "renamed");
    }

    #[test]
    fn test_plaintext_document_passes_through() {
        let raw = serde_json::json!({"id": "old", "name": "Bus 7"});
        let document = RemoteDocument::from_value(raw);
        assert!(!document.is_encrypted());

        let doc = decrypt_document(None, document, "b7").unwrap();
        assert_eq!(doc["id"], "b7");
        assert_eq!(doc["name"], "Bus 7");
    }

    #[test]
    fn test_encrypted_document_without_key_blocks() {
        let key = test_key();
        let envelope = encrypt_record(&key, &sample_student()).unwrap();
        let document = RemoteDocument::Encrypted(envelope);

        let result = decrypt_document(None, document, "s1");
        assert!(matches!(result, Err(RosterError::WrongPassword)));
    }

    #[test]
    fn test_truncated_envelope_is_crypto_error() {
        let key = test_key();
        let envelope = Envelope {
            enc: BASE64.encode([0u8; 8]),
            v: 1,
        };
        let result = decrypt_envelope(&key, &envelope, "s1");
        assert!(matches!(result, Err(RosterError::Crypto(_))));
    }
}
