//! Encryption coordinator: dataset key lifecycle across devices.
//!
//! State machine over `{Unencrypted, EncryptionRequired(key_version)}`,
//! transitioned only by explicit admin actions. The invariant held here:
//! a device's cached key is trustworthy only while its stored version equals
//! the published `encryptionKeyVersion`; on any mismatch the cached key is
//! discarded before a single decrypt is attempted.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::crypto::{decrypt_document, derive_key, encrypt_record, DerivedKey};
use crate::error::{Result, RosterError};
use crate::keycache::{CachedKey, KeyCache};
use crate::model::{EncryptionConfig, RemoteDocument, Table};
use crate::store::RosterStore;

use super::gateway::{PullSummary, SyncGateway};
use super::remote::RemoteStore;

/// Encryption readiness of this device against the published config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// The dataset has no encryption requirement published.
    Unencrypted,

    /// The cached key matches the published key version.
    Ready { version: u32 },

    /// Encryption is required and this device has no usable key. Any cached
    /// key was stale and has been discarded; the caller must prompt for the
    /// password and call [`Coordinator::unlock`].
    LockRequired { published_version: u32 },
}

/// The key this device currently trusts.
struct ActiveKey {
    key: DerivedKey,
    version: u32,
}

/// Per-dataset encryption coordinator.
pub struct Coordinator {
    dataset_id: String,
    cache: KeyCache,
    active: Option<ActiveKey>,
}

impl Coordinator {
    /// Load the coordinator for a dataset, restoring any cached key.
    ///
    /// A restored key is provisional until [`Coordinator::check_remote`]
    /// confirms its version against the published config.
    pub fn load(dataset_id: &str, cache_path: impl Into<PathBuf>) -> Result<Self> {
        let cache = KeyCache::new(cache_path);
        let active = match cache.load(dataset_id)? {
            Some(entry) if entry.enabled => Some(ActiveKey {
                key: DerivedKey::from_base64(&entry.key_b64)?,
                version: entry.version,
            }),
            _ => None,
        };
        Ok(Self {
            dataset_id: dataset_id.to_string(),
            cache,
            active,
        })
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    /// The key to encrypt/decrypt with, when one is active.
    pub fn active_key(&self) -> Option<&DerivedKey> {
        self.active.as_ref().map(|a| &a.key)
    }

    pub fn key_version(&self) -> Option<u32> {
        self.active.as_ref().map(|a| a.version)
    }

    /// Compare the cached key against the published config, discarding it on
    /// staleness.
    ///
    /// Called at connect and again before every sync: any suspension point
    /// may have raced a rotation on another device, so the version is
    /// re-validated on resume rather than trusted from an earlier check.
    pub async fn check_remote(&mut self, remote: &dyn RemoteStore) -> Result<KeyStatus> {
        let config = remote.fetch_config().await?;
        let config = match config {
            Some(config) if config.encryption_required => config,
            _ => return Ok(KeyStatus::Unencrypted),
        };

        match &self.active {
            Some(active) if active.version == config.encryption_key_version => {
                Ok(KeyStatus::Ready {
                    version: active.version,
                })
            }
            _ => {
                self.discard_key()?;
                Ok(KeyStatus::LockRequired {
                    published_version: config.encryption_key_version,
                })
            }
        }
    }

    /// Enable encryption for the whole dataset (admin action).
    ///
    /// Derives key version 1, persists it locally, then publishes
    /// `EncryptionRequired(1)`. From that point every push encrypts; existing
    /// remote plaintext stays readable through the pass-through until next
    /// written.
    pub async fn enable(
        &mut self,
        remote: &dyn RemoteStore,
        password: &SecretString,
    ) -> Result<()> {
        if let Some(config) = remote.fetch_config().await? {
            if config.encryption_required {
                return Err(RosterError::InvalidInput(
                    "Encryption is already enabled for this dataset; rotate instead".to_string(),
                ));
            }
        }

        let key = derive_key(password.expose_secret(), &self.dataset_id)?;
        self.persist_key(&key, 1)?;
        remote
            .publish_config(EncryptionConfig {
                encryption_required: true,
                encryption_key_version: 1,
            })
            .await?;
        Ok(())
    }

    /// Unlock an encrypted dataset on a device without the key.
    ///
    /// Derives a candidate key and proves it by pulling the whole dataset.
    /// On `WrongPassword` nothing is persisted and the caller must re-prompt.
    /// On success the key and the published version are cached for this
    /// session and future launches.
    pub async fn unlock(
        &mut self,
        gateway: &SyncGateway,
        store: &mut RosterStore,
        password: &SecretString,
    ) -> Result<PullSummary> {
        let config = match gateway.remote().fetch_config().await? {
            Some(config) if config.encryption_required => config,
            _ => {
                return Err(RosterError::InvalidInput(
                    "Encryption is not enabled for this dataset".to_string(),
                ))
            }
        };

        let candidate = derive_key(password.expose_secret(), &self.dataset_id)?;
        let summary = gateway.pull_all(Some(&candidate), store).await?;

        // The pull suspended; a rotation may have landed meanwhile. If the
        // published version moved, the candidate key is already stale.
        let after = gateway.remote().fetch_config().await?;
        let still_current = after
            .map(|c| c.encryption_key_version == config.encryption_key_version)
            .unwrap_or(false);
        if !still_current {
            return Err(RosterError::WrongPassword);
        }

        self.persist_key(&candidate, config.encryption_key_version)?;
        Ok(summary)
    }

    /// Rotate the dataset password (admin action).
    ///
    /// Every remote document is decrypted with the old key up front, so a wrong
    /// old password aborts before any remote write. The re-encrypted
    /// documents are then written back one by one; this phase is not
    /// transactional, and a crash mid-way leaves the remote partially
    /// migrated (accepted limitation, recovered by re-running the rotation).
    /// Plaintext documents from before encryption was enabled are converted
    /// to encrypted on the way through.
    ///
    /// Returns the new published key version. Devices still caching the old
    /// key detect the bump at next launch and force a re-unlock.
    pub async fn rotate(
        &mut self,
        remote: &dyn RemoteStore,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<u32> {
        let config = match remote.fetch_config().await? {
            Some(config) if config.encryption_required => config,
            _ => {
                return Err(RosterError::InvalidInput(
                    "Encryption is not enabled for this dataset".to_string(),
                ))
            }
        };

        let old_key = derive_key(old_password.expose_secret(), &self.dataset_id)?;
        let new_key = derive_key(new_password.expose_secret(), &self.dataset_id)?;

        // Phase 1: read and decrypt everything. Any failure here is a clean
        // abort with zero remote writes.
        let mut staged = Vec::new();
        for table in Table::ALL {
            for (id, value) in remote.fetch_all(table).await? {
                let document = RemoteDocument::from_value(value);
                let plain = decrypt_document(Some(&old_key), document, &id)?;
                staged.push((table, id, plain));
            }
        }

        // Phase 2: overwrite remote documents under the new key.
        for (table, id, plain) in staged {
            let envelope = encrypt_record(&new_key, &plain)?;
            remote
                .put_document(table, &id, serde_json::to_value(&envelope)?)
                .await?;
        }

        let new_version = config.encryption_key_version + 1;
        remote
            .publish_config(EncryptionConfig {
                encryption_required: true,
                encryption_key_version: new_version,
            })
            .await?;
        self.persist_key(&new_key, new_version)?;
        Ok(new_version)
    }

    /// Drop the cached key from memory and disk. Idempotent.
    pub fn discard_key(&mut self) -> Result<()> {
        self.active = None;
        self.cache.clear(&self.dataset_id)
    }

    fn persist_key(&mut self, key: &DerivedKey, version: u32) -> Result<()> {
        self.cache.store(
            &self.dataset_id,
            &CachedKey {
                enabled: true,
                key_b64: key.to_base64(),
                version,
            },
        )?;
        self.active = Some(ActiveKey {
            key: key.clone(),
            version,
        });
        Ok(())
    }
}
