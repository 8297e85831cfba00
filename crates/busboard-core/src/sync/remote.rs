//! The remote collection seam.
//!
//! All collaborating devices that share a dataset identifier talk to the same
//! remote collection through this trait. The engine never assumes a concrete
//! backend: tests and two-device simulations use [`super::MemoryRemote`],
//! deployments use [`super::HttpRemote`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::model::{EncryptionConfig, Table};

/// What happened to a remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One change event from a table's live feed.
///
/// Events within one table arrive in remote delivery order; ordering across
/// tables is not guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub table: Table,
    pub kind: ChangeKind,
    pub id: String,

    /// The raw wire document. `None` for removals.
    #[serde(default)]
    pub doc: Option<serde_json::Value>,
}

/// A shared remote document collection scoped by one dataset identifier.
///
/// Documents are raw wire values, either plaintext records or envelopes;
/// the remote neither inspects nor decrypts them.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap reachability probe used by the bounded connect.
    async fn ping(&self) -> Result<()>;

    /// Fetch every document of a table as `(id, document)` pairs.
    async fn fetch_all(&self, table: Table) -> Result<Vec<(String, serde_json::Value)>>;

    /// Create or overwrite a document under its id (last write wins).
    async fn put_document(&self, table: Table, id: &str, doc: serde_json::Value) -> Result<()>;

    /// Delete a document. Deleting an absent id is a no-op.
    async fn delete_document(&self, table: Table, id: &str) -> Result<()>;

    /// Read the dataset's encryption config document, if one was published.
    async fn fetch_config(&self) -> Result<Option<EncryptionConfig>>;

    /// Publish the dataset's encryption config document.
    async fn publish_config(&self, config: EncryptionConfig) -> Result<()>;

    /// Open the live change feed for one table.
    async fn subscribe(&self, table: Table) -> Result<broadcast::Receiver<RemoteChange>>;
}
