//! # Busboard Core
//!
//! Core library for Busboard, the local-first storage and sync engine behind
//! a bus seating/roster application.
//!
//! The local SQLite store is always authoritative and immediately durable;
//! synchronization with the shared remote collection is best-effort and
//! asynchronous, converging on last-write-wins per record id. When encryption
//! is enabled for a dataset, documents are sealed with a password-derived key
//! before they leave the device.
//!
//! ## Architecture
//!
//! - **store**: local durable store with typed tables, compound indexes,
//!   transactional cascades, roster domain operations
//! - **crypto**: password key derivation and the authenticated wire envelope
//! - **sync**: remote collection seam, gateway, and encryption coordinator
//! - **backup**: plaintext JSON export/import of the whole dataset
//! - **app**: the process-owned context tying the pieces together

pub mod app;
pub mod backup;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod keycache;
pub mod model;
pub mod store;
pub mod sync;

pub use app::{App, AppOptions, ConnectStatus, Debouncer, StoreChange, DEFAULT_CONNECT_TIMEOUT};
pub use backup::BackupFile;
pub use error::{Result, RosterError};
pub use model::{
    Bus, Checkin, EncryptionConfig, Envelope, Record, RemoteDocument, Route, RouteRow,
    SeatAssignment, Side, Student, Table,
};
pub use store::{AssignmentOutcome, CheckinToggle, IndexKey, RosterStore, SeatLocation};
pub use sync::{
    ChangeKind, Coordinator, HttpRemote, KeyStatus, MemoryRemote, PullSummary, RemoteChange,
    RemoteStore, SyncGateway,
};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
