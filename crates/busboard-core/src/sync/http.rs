//! HTTP implementation of the remote collection.
//!
//! Talks to a document-store backend over a small REST surface:
//!
//! - `GET    /v1/{dataset}/{table}` returns all documents as an id-to-document map
//! - `PUT    /v1/{dataset}/{table}/{id}` creates/overwrites one document
//! - `DELETE /v1/{dataset}/{table}/{id}`
//! - `GET    /v1/{dataset}/config`, `PUT /v1/{dataset}/config`
//! - `GET    /v1/{dataset}/{table}/events?after={seq}` long-polls the change feed
//!
//! The change feed delivers events in remote delivery order per table; the
//! poller forwards them into a broadcast channel and keeps its cursor so a
//! slow consumer never skips events at the transport level.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::error::{Result, RosterError};
use crate::model::{EncryptionConfig, Table};

use super::remote::{ChangeKind, RemoteChange, RemoteStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(75);
const RETRY_BACKOFF: Duration = Duration::from_secs(2);
const FEED_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct EventBatch {
    next: u64,
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    kind: ChangeKind,
    id: String,
    #[serde(default)]
    doc: Option<serde_json::Value>,
}

struct HttpInner {
    client: reqwest::Client,
    base_url: String,
    dataset_id: String,
    feeds: Mutex<std::collections::HashMap<Table, broadcast::Sender<RemoteChange>>>,
}

/// REST client for a shared remote dataset.
#[derive(Clone)]
pub struct HttpRemote {
    inner: Arc<HttpInner>,
}

impl HttpRemote {
    /// Create a client for one dataset on one backend.
    pub fn new(base_url: &str, dataset_id: &str) -> Result<Self> {
        if dataset_id.trim().is_empty() {
            return Err(RosterError::InvalidInput(
                "Dataset id cannot be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RosterError::RemoteUnavailable(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(HttpInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                dataset_id: dataset_id.to_string(),
                feeds: Mutex::new(std::collections::HashMap::new()),
            }),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            self.inner.base_url, self.inner.dataset_id, suffix
        )
    }
}

async fn poll_once(
    inner: &HttpInner,
    table: Table,
    after: u64,
) -> std::result::Result<EventBatch, reqwest::Error> {
    inner
        .client
        .get(format!(
            "{}/v1/{}/{}/events",
            inner.base_url,
            inner.dataset_id,
            table.as_str()
        ))
        .query(&[("after", after.to_string())])
        .timeout(LONG_POLL_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json::<EventBatch>()
        .await
}

/// Long-poll loop feeding one table's broadcast channel.
///
/// Errors do not tear the feed down; the loop backs off and retries, which is
/// the subscribe-boundary behavior the engine expects (no events until
/// reconnect, never a hard failure). The task exits once every receiver is
/// gone.
async fn run_feed(inner: Arc<HttpInner>, table: Table, sender: broadcast::Sender<RemoteChange>) {
    let mut cursor = 0u64;
    loop {
        match poll_once(&inner, table, cursor).await {
            Ok(batch) => {
                cursor = batch.next;
                for event in batch.events {
                    let _ = sender.send(RemoteChange {
                        table,
                        kind: event.kind,
                        id: event.id,
                        doc: event.doc,
                    });
                }
            }
            Err(e) => {
                tracing::debug!(table = table.as_str(), error = %e, "change feed poll failed");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
        if sender.receiver_count() == 0 {
            break;
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn ping(&self) -> Result<()> {
        self.inner
            .client
            .get(self.url("config"))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| RosterError::RemoteUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn fetch_all(&self, table: Table) -> Result<Vec<(String, serde_json::Value)>> {
        let docs: BTreeMap<String, serde_json::Value> = self
            .inner
            .client
            .get(self.url(table.as_str()))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| RosterError::RemoteUnavailable(e.to_string()))?
            .json()
            .await?;
        Ok(docs.into_iter().collect())
    }

    async fn put_document(&self, table: Table, id: &str, doc: serde_json::Value) -> Result<()> {
        self.inner
            .client
            .put(self.url(&format!("{}/{}", table.as_str(), id)))
            .json(&doc)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| RosterError::RemoteUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete_document(&self, table: Table, id: &str) -> Result<()> {
        let response = self
            .inner
            .client
            .delete(self.url(&format!("{}/{}", table.as_str(), id)))
            .send()
            .await?;
        // Absent documents are a successful no-op.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        response
            .error_for_status()
            .map_err(|e| RosterError::RemoteUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn fetch_config(&self) -> Result<Option<EncryptionConfig>> {
        let response = self.inner.client.get(self.url("config")).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let config = response
            .error_for_status()
            .map_err(|e| RosterError::RemoteUnavailable(e.to_string()))?
            .json::<EncryptionConfig>()
            .await?;
        Ok(Some(config))
    }

    async fn publish_config(&self, config: EncryptionConfig) -> Result<()> {
        self.inner
            .client
            .put(self.url("config"))
            .json(&config)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| RosterError::RemoteUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, table: Table) -> Result<broadcast::Receiver<RemoteChange>> {
        let mut feeds = self
            .inner
            .feeds
            .lock()
            .map_err(|_| RosterError::RemoteUnavailable("feed registry poisoned".to_string()))?;

        if let Some(sender) = feeds.get(&table) {
            if sender.receiver_count() > 0 {
                return Ok(sender.subscribe());
            }
        }

        let (sender, receiver) = broadcast::channel(FEED_CAPACITY);
        feeds.insert(table, sender.clone());
        tokio::spawn(run_feed(Arc::clone(&self.inner), table, sender));
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_layout() {
        let remote = HttpRemote::new("https://sync.example.net/", "district-12").unwrap();
        assert_eq!(
            remote.url("busses/b1"),
            "https://sync.example.net/v1/district-12/busses/b1"
        );
        assert_eq!(
            remote.url("config"),
            "https://sync.example.net/v1/district-12/config"
        );
    }

    #[test]
    fn test_empty_dataset_id_rejected() {
        assert!(HttpRemote::new("https://sync.example.net", " ").is_err());
    }

    #[test]
    fn test_event_batch_decodes() {
        let batch: EventBatch = serde_json::from_value(serde_json::json!({
            "next": 42,
            "events": [
                {"kind": "added", "id": "b1", "doc": {"id": "b1"}},
                {"kind": "removed", "id": "b2"}
            ]
        }))
        .unwrap();
        assert_eq!(batch.next, 42);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].kind, ChangeKind::Added);
        assert_eq!(batch.events[1].doc, None);
    }
}
