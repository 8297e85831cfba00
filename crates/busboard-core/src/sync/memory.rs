//! In-memory remote collection.
//!
//! A process-local [`RemoteStore`] backed by maps and broadcast channels.
//! Cloning shares the underlying collection, so two engine instances holding
//! clones behave like two devices on the same dataset. Tests use
//! [`MemoryRemote::set_offline`] to exercise the degraded paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Result, RosterError};
use crate::model::{EncryptionConfig, Table};

use super::remote::{ChangeKind, RemoteChange, RemoteStore};

const FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct State {
    tables: HashMap<Table, BTreeMap<String, serde_json::Value>>,
    config: Option<EncryptionConfig>,
}

struct Inner {
    state: Mutex<State>,
    feeds: HashMap<Table, broadcast::Sender<RemoteChange>>,
    offline: AtomicBool,
}

/// Shared in-memory remote. Clones reference the same collection.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let feeds = Table::ALL
            .into_iter()
            .map(|table| (table, broadcast::channel(FEED_CAPACITY).0))
            .collect();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                feeds,
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate the backend becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of documents currently stored for a table.
    pub fn len(&self, table: Table) -> usize {
        self.lock()
            .map(|state| state.tables.get(&table).map(BTreeMap::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }

    /// Read one raw document, bypassing the offline switch. Test helper.
    pub fn raw_document(&self, table: Table, id: &str) -> Option<serde_json::Value> {
        self.lock()
            .ok()
            .and_then(|state| state.tables.get(&table).and_then(|docs| docs.get(id)).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.inner
            .state
            .lock()
            .map_err(|_| RosterError::RemoteUnavailable("memory remote state poisoned".to_string()))
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(RosterError::RemoteUnavailable(
                "memory remote is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn emit(&self, change: RemoteChange) {
        if let Some(sender) = self.inner.feeds.get(&change.table) {
            // No receivers is fine; the feed is fire-and-forget.
            let _ = sender.send(change);
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn ping(&self) -> Result<()> {
        self.check_online()
    }

    async fn fetch_all(&self, table: Table) -> Result<Vec<(String, serde_json::Value)>> {
        self.check_online()?;
        let state = self.lock()?;
        Ok(state
            .tables
            .get(&table)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put_document(&self, table: Table, id: &str, doc: serde_json::Value) -> Result<()> {
        self.check_online()?;
        let kind = {
            let mut state = self.lock()?;
            let docs = state.tables.entry(table).or_default();
            match docs.insert(id.to_string(), doc.clone()) {
                Some(_) => ChangeKind::Modified,
                None => ChangeKind::Added,
            }
        };
        self.emit(RemoteChange {
            table,
            kind,
            id: id.to_string(),
            doc: Some(doc),
        });
        Ok(())
    }

    async fn delete_document(&self, table: Table, id: &str) -> Result<()> {
        self.check_online()?;
        let existed = {
            let mut state = self.lock()?;
            state
                .tables
                .get_mut(&table)
                .map(|docs| docs.remove(id).is_some())
                .unwrap_or(false)
        };
        if existed {
            self.emit(RemoteChange {
                table,
                kind: ChangeKind::Removed,
                id: id.to_string(),
                doc: None,
            });
        }
        Ok(())
    }

    async fn fetch_config(&self) -> Result<Option<EncryptionConfig>> {
        self.check_online()?;
        Ok(self.lock()?.config)
    }

    async fn publish_config(&self, config: EncryptionConfig) -> Result<()> {
        self.check_online()?;
        self.lock()?.config = Some(config);
        Ok(())
    }

    async fn subscribe(&self, table: Table) -> Result<broadcast::Receiver<RemoteChange>> {
        self.check_online()?;
        let sender = self
            .inner
            .feeds
            .get(&table)
            .ok_or_else(|| RosterError::RemoteUnavailable("unknown table feed".to_string()))?;
        Ok(sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_fetch_round_trip() {
        let remote = MemoryRemote::new();
        let doc = serde_json::json!({"id": "b1", "name": "Bus 1"});
        remote
            .put_document(Table::Busses, "b1", doc.clone())
            .await
            .unwrap();

        let docs = remote.fetch_all(Table::Busses).await.unwrap();
        assert_eq!(docs, vec![("b1".to_string(), doc)]);
    }

    #[tokio::test]
    async fn test_clones_share_the_collection() {
        let remote = MemoryRemote::new();
        let other_device = remote.clone();

        remote
            .put_document(Table::Busses, "b1", serde_json::json!({"id": "b1"}))
            .await
            .unwrap();
        assert_eq!(other_device.len(Table::Busses), 1);
    }

    #[tokio::test]
    async fn test_feed_reports_add_modify_remove() {
        let remote = MemoryRemote::new();
        let mut feed = remote.subscribe(Table::Students).await.unwrap();

        let doc = serde_json::json!({"id": "s1"});
        remote
            .put_document(Table::Students, "s1", doc.clone())
            .await
            .unwrap();
        remote
            .put_document(Table::Students, "s1", doc.clone())
            .await
            .unwrap();
        remote.delete_document(Table::Students, "s1").await.unwrap();

        assert_eq!(feed.recv().await.unwrap().kind, ChangeKind::Added);
        assert_eq!(feed.recv().await.unwrap().kind, ChangeKind::Modified);
        let removed = feed.recv().await.unwrap();
        assert_eq!(removed.kind, ChangeKind::Removed);
        assert_eq!(removed.doc, None);
    }

    #[tokio::test]
    async fn test_offline_switch_fails_operations() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);

        let result = remote
            .put_document(Table::Busses, "b1", serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(RosterError::RemoteUnavailable(_))));

        remote.set_offline(false);
        assert!(remote.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_absent_id_is_silent() {
        let remote = MemoryRemote::new();
        let mut feed = remote.subscribe(Table::Busses).await.unwrap();
        remote.delete_document(Table::Busses, "ghost").await.unwrap();

        // No event was emitted.
        assert!(matches!(
            feed.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
