//! Synchronization between the local store and the shared remote collection.
//!
//! - **remote**: the backend seam all devices share
//! - **memory** / **http**: the two backend implementations
//! - **gateway**: push, pull, live feeds, last-write-wins application
//! - **coordinator**: encryption enablement, unlock, and key rotation

pub mod coordinator;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod remote;

pub use coordinator::{Coordinator, KeyStatus};
pub use gateway::{AppliedChange, PullSummary, SyncGateway};
pub use http::HttpRemote;
pub use memory::MemoryRemote;
pub use remote::{ChangeKind, RemoteChange, RemoteStore};
