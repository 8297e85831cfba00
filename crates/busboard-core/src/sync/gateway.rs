//! Sync gateway: bidirectional flow between the local store and the remote
//! collection.
//!
//! Convergence is last-write-wins per record id: no vector clocks, no merge.
//! Concurrent edits to the same record resolve to whichever write reaches the
//! remote collection last; edits to different records never conflict.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::crypto::{decrypt_document, encrypt_record, DerivedKey};
use crate::error::{Result, RosterError};
use crate::model::{Record, RemoteDocument, Table};
use crate::store::RosterStore;

use super::remote::{ChangeKind, RemoteChange, RemoteStore};

/// A change the gateway applied to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub table: Table,
    pub id: String,
    pub removed: bool,
}

/// Outcome of a full pull.
#[derive(Debug, Default)]
pub struct PullSummary {
    /// Every document applied to the local store, in application order.
    pub applied: Vec<AppliedChange>,
}

impl PullSummary {
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Gateway over one remote dataset.
pub struct SyncGateway {
    remote: Arc<dyn RemoteStore>,
}

impl SyncGateway {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Push one record to the remote collection, encrypting when a key is
    /// active.
    ///
    /// Push failures are logged and swallowed: local state is authoritative
    /// and there is no retry queue. An offline push is recovered by a later
    /// full resync, which pushes everything rather than a diff.
    pub async fn push<R: Record>(&self, key: Option<&DerivedKey>, record: &R) {
        match serde_json::to_value(record) {
            Ok(doc) => self.push_value(key, R::TABLE, record.id(), &doc).await,
            Err(e) => {
                tracing::warn!(table = R::TABLE.as_str(), error = %e, "push serialization failed");
            }
        }
    }

    /// Push one raw record document.
    pub async fn push_value(
        &self,
        key: Option<&DerivedKey>,
        table: Table,
        id: &str,
        doc: &serde_json::Value,
    ) {
        let wire = match key {
            Some(key) => match encrypt_record(key, doc) {
                Ok(envelope) => match serde_json::to_value(&envelope) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(table = table.as_str(), id, error = %e, "envelope encode failed");
                        return;
                    }
                },
                Err(e) => {
                    tracing::warn!(table = table.as_str(), id, error = %e, "push encryption failed");
                    return;
                }
            },
            None => doc.clone(),
        };
        if let Err(e) = self.remote.put_document(table, id, wire).await {
            tracing::warn!(table = table.as_str(), id, error = %e, "push failed; keeping local copy");
        }
    }

    /// Push a deletion. Failures are logged and swallowed like pushes.
    pub async fn push_delete(&self, table: Table, id: &str) {
        if let Err(e) = self.remote.delete_document(table, id).await {
            tracing::warn!(table = table.as_str(), id, error = %e, "remote delete failed");
        }
    }

    /// Fetch every remote document once and upsert it into the local store.
    ///
    /// Each document is decrypted before that document is applied, so a
    /// `WrongPassword` aborts the pull with no mutation for the failing
    /// document or anything after it. Documents applied before the failure
    /// stay applied; the pull is per-document atomic, not all-or-nothing.
    /// Tables are pulled parents-first.
    pub async fn pull_all(
        &self,
        key: Option<&DerivedKey>,
        store: &mut RosterStore,
    ) -> Result<PullSummary> {
        let mut summary = PullSummary::default();
        for table in Table::ALL {
            let docs = self.remote.fetch_all(table).await?;
            for (id, value) in docs {
                let document = RemoteDocument::from_value(value);
                let plain = decrypt_document(key, document, &id)?;
                store.upsert_value(table, &id, &plain)?;
                summary.applied.push(AppliedChange {
                    table,
                    id,
                    removed: false,
                });
            }
        }
        Ok(summary)
    }

    /// Push every local record to the remote collection.
    ///
    /// Used after a backup restore and as the manual recovery path for pushes
    /// dropped while offline. Best-effort per document; returns the number of
    /// documents attempted.
    pub async fn resync_all(
        &self,
        key: Option<&DerivedKey>,
        store: &RosterStore,
    ) -> Result<usize> {
        let mut pushed = 0;
        for table in Table::ALL {
            for (id, doc) in store.get_all_values(table)? {
                self.push_value(key, table, &id, &doc).await;
                pushed += 1;
            }
        }
        Ok(pushed)
    }

    /// Open the live change feed for one table.
    pub async fn subscribe(&self, table: Table) -> Result<broadcast::Receiver<RemoteChange>> {
        self.remote.subscribe(table).await
    }

    /// Apply one change event from a table feed to the local store.
    ///
    /// Idempotent: re-applying the same event leaves the store unchanged.
    /// Returns `None` when the event carried nothing to do (e.g. a removal
    /// of an id the store never had).
    pub fn apply_remote_change(
        &self,
        key: Option<&DerivedKey>,
        store: &mut RosterStore,
        change: RemoteChange,
    ) -> Result<Option<AppliedChange>> {
        match change.kind {
            ChangeKind::Removed => {
                let existed = store.delete_value(change.table, &change.id)?;
                Ok(existed.then_some(AppliedChange {
                    table: change.table,
                    id: change.id,
                    removed: true,
                }))
            }
            ChangeKind::Added | ChangeKind::Modified => {
                let value = match change.doc {
                    Some(value) => value,
                    None => {
                        return Err(RosterError::RemoteUnavailable(
                            "change event without document".to_string(),
                        ))
                    }
                };
                let document = RemoteDocument::from_value(value);
                let plain = decrypt_document(key, document, &change.id)?;
                store.upsert_value(change.table, &change.id, &plain)?;
                Ok(Some(AppliedChange {
                    table: change.table,
                    id: change.id,
                    removed: false,
                }))
            }
        }
    }
}
