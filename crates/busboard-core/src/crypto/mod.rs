//! Cryptographic operations: password-based key derivation and the
//! authenticated record envelope used on the sync wire.

pub mod envelope;
pub mod key;

pub use envelope::{decrypt_document, decrypt_envelope, encrypt_record};
pub use key::{derive_key, DerivedKey};
