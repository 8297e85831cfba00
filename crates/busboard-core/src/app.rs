//! The application context: one explicit object owning the engine's state.
//!
//! Created at startup, torn down at shutdown, no hidden statics. All state
//! (the local store, the optional gateway, the cached key) is accessed from a
//! single logical thread of control; operations that suspend re-validate the
//! key version on resume instead of trusting earlier checks.
//!
//! Every local mutation follows the same flow: validate, commit to the local
//! store (immediately durable), signal the UI collaborator, then best-effort
//! push to the remote. A failed push never fails the mutation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::{broadcast, mpsc};

use crate::backup::{self, BackupFile};
use crate::error::{Result, RosterError};
use crate::model::{Record, Route, RouteRow, Table};
use crate::store::{
    AssignmentOutcome, CheckinToggle, Deletion, RosterStore, SeatLocation,
};
use crate::sync::{
    Coordinator, KeyStatus, PullSummary, RemoteChange, RemoteStore, SyncGateway,
};

const CHANGE_CAPACITY: usize = 1024;

/// Default bounded wait for the initial backend connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A local store change, signalled to the UI collaborator after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub table: Table,
    pub id: String,
    pub removed: bool,
}

/// Outcome of the bounded connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// Connected; `key` reports encryption readiness.
    Online { key: KeyStatus },

    /// The backend was unreachable within the timeout. The engine continues
    /// in local-only mode; nothing blocks.
    Offline,
}

/// Configuration for [`App::open`].
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub dataset_id: String,
    pub store_path: PathBuf,
    pub key_cache_path: PathBuf,
}

/// The engine context.
pub struct App {
    store: RosterStore,
    coordinator: Coordinator,
    gateway: Option<SyncGateway>,
    changes: broadcast::Sender<StoreChange>,
}

impl App {
    /// Open the local store and key cache for a dataset. Offline until
    /// [`App::connect`] succeeds.
    pub fn open(options: AppOptions) -> Result<Self> {
        let store = RosterStore::open(&options.store_path)?;
        let coordinator = Coordinator::load(&options.dataset_id, options.key_cache_path)?;
        Ok(Self::new(store, coordinator))
    }

    /// Assemble an app from parts. Tests use this with an in-memory store.
    pub fn new(store: RosterStore, coordinator: Coordinator) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            store,
            coordinator,
            gateway: None,
            changes,
        }
    }

    pub fn dataset_id(&self) -> &str {
        self.coordinator.dataset_id()
    }

    /// Read access to the local store.
    pub fn store(&self) -> &RosterStore {
        &self.store
    }

    pub fn is_online(&self) -> bool {
        self.gateway.is_some()
    }

    /// Encryption key version this device currently trusts, if any.
    pub fn key_version(&self) -> Option<u32> {
        self.coordinator.key_version()
    }

    /// Subscribe to local store changes (the UI re-render signal).
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Try to reach the remote backend, waiting at most `timeout`.
    ///
    /// On failure the engine proceeds in local-only mode rather than
    /// blocking; sync silently resumes only after a later successful connect.
    pub async fn connect(
        &mut self,
        remote: Arc<dyn RemoteStore>,
        timeout: Duration,
    ) -> ConnectStatus {
        match tokio::time::timeout(timeout, remote.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "remote unreachable; continuing offline");
                self.gateway = None;
                return ConnectStatus::Offline;
            }
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "remote connect timed out; continuing offline");
                self.gateway = None;
                return ConnectStatus::Offline;
            }
        }

        let key = match self.coordinator.check_remote(remote.as_ref()).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "encryption config check failed; continuing offline");
                self.gateway = None;
                return ConnectStatus::Offline;
            }
        };
        self.gateway = Some(SyncGateway::new(remote));
        ConnectStatus::Online { key }
    }

    // --- Record CRUD ---

    /// Upsert a record: local commit, UI signal, best-effort push.
    pub async fn put_record<R: Record>(&mut self, record: R) -> Result<R> {
        self.store.put(&record)?;
        self.notify(R::TABLE, record.id(), false);
        if let Some(gateway) = &self.gateway {
            gateway.push(self.coordinator.active_key(), &record).await;
        }
        Ok(record)
    }

    /// Delete a record with its declared cascades; propagate every deletion.
    pub async fn delete_record(&mut self, table: Table, id: &str) -> Result<Vec<Deletion>> {
        let deletions = self.store.delete(table, id)?;
        for deletion in &deletions {
            self.notify(deletion.table, &deletion.id, true);
        }
        if let Some(gateway) = &self.gateway {
            for deletion in &deletions {
                gateway.push_delete(deletion.table, &deletion.id).await;
            }
        }
        Ok(deletions)
    }

    // --- Domain operations ---

    /// Seat a student, displacing their prior seat on the route.
    pub async fn assign_student_to_seat(
        &mut self,
        bus_id: &str,
        route: Route,
        student_id: &str,
        seat: SeatLocation,
    ) -> Result<AssignmentOutcome> {
        let outcome = self
            .store
            .assign_student_to_seat(bus_id, route, student_id, seat)?;
        if let Some(removed) = &outcome.displaced {
            self.notify(Table::SeatAssignments, removed, true);
        }
        self.notify(Table::SeatAssignments, &outcome.assignment.id, false);
        if let Some(gateway) = &self.gateway {
            if let Some(removed) = &outcome.displaced {
                gateway.push_delete(Table::SeatAssignments, removed).await;
            }
            gateway
                .push(self.coordinator.active_key(), &outcome.assignment)
                .await;
        }
        Ok(outcome)
    }

    /// Toggle a checkin for `(bus, route, student, date)`.
    pub async fn toggle_checkin(
        &mut self,
        bus_id: &str,
        route: Route,
        student_id: &str,
        date: chrono::NaiveDate,
    ) -> Result<CheckinToggle> {
        let toggle = self.store.toggle_checkin(bus_id, route, student_id, date)?;
        match &toggle {
            CheckinToggle::CheckedIn(checkin) => {
                self.notify(Table::Checkins, &checkin.id, false);
                if let Some(gateway) = &self.gateway {
                    gateway.push(self.coordinator.active_key(), checkin).await;
                }
            }
            CheckinToggle::CheckedOut { id } => {
                self.notify(Table::Checkins, id, true);
                if let Some(gateway) = &self.gateway {
                    gateway.push_delete(Table::Checkins, id).await;
                }
            }
        }
        Ok(toggle)
    }

    /// Insert a route row; pushes every row the resequencing touched.
    pub async fn insert_route_row(&mut self, row: RouteRow) -> Result<Vec<RouteRow>> {
        let changed = self.store.insert_route_row(row)?;
        self.push_route_rows(&changed).await;
        Ok(changed)
    }

    /// Move a route row to a new position.
    pub async fn move_route_row(&mut self, id: &str, new_order: i64) -> Result<Vec<RouteRow>> {
        let changed = self.store.move_route_row(id, new_order)?;
        self.push_route_rows(&changed).await;
        Ok(changed)
    }

    /// Remove a route row, compacting the sheet.
    pub async fn remove_route_row(&mut self, id: &str) -> Result<Vec<Deletion>> {
        let (deletions, changed) = self.store.remove_route_row(id)?;
        for deletion in &deletions {
            self.notify(deletion.table, &deletion.id, true);
        }
        if let Some(gateway) = &self.gateway {
            for deletion in &deletions {
                gateway.push_delete(deletion.table, &deletion.id).await;
            }
        }
        self.push_route_rows(&changed).await;
        Ok(deletions)
    }

    async fn push_route_rows(&self, changed: &[RouteRow]) {
        for row in changed {
            self.notify(Table::RouteRows, &row.id, false);
        }
        if let Some(gateway) = &self.gateway {
            for row in changed {
                gateway.push(self.coordinator.active_key(), row).await;
            }
        }
    }

    // --- Sync ---

    /// Pull the whole remote dataset into the local store.
    ///
    /// Re-validates the key version first; returns `WrongPassword` when the
    /// dataset requires a key this device does not hold.
    pub async fn sync_now(&mut self) -> Result<PullSummary> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| RosterError::RemoteUnavailable("not connected".to_string()))?;

        let status = self
            .coordinator
            .check_remote(gateway.remote().as_ref())
            .await?;
        if let KeyStatus::LockRequired { .. } = status {
            return Err(RosterError::WrongPassword);
        }

        let summary = gateway
            .pull_all(self.coordinator.active_key(), &mut self.store)
            .await?;
        for applied in &summary.applied {
            self.notify(applied.table, &applied.id, applied.removed);
        }
        Ok(summary)
    }

    /// Push every local record to the remote (manual recovery / post-restore).
    pub async fn resync_all(&mut self) -> Result<usize> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| RosterError::RemoteUnavailable("not connected".to_string()))?;
        gateway
            .resync_all(self.coordinator.active_key(), &self.store)
            .await
    }

    /// Merge the live feeds of every table into one stream.
    ///
    /// Per-table ordering is preserved by the per-table forwarders; ordering
    /// across tables is not guaranteed, matching the remote's semantics.
    pub async fn watch_remote(&mut self) -> Result<mpsc::Receiver<RemoteChange>> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| RosterError::RemoteUnavailable("not connected".to_string()))?;

        let (tx, rx) = mpsc::channel(CHANGE_CAPACITY);
        for table in Table::ALL {
            let mut feed = gateway.subscribe(table).await?;
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    match feed.recv().await {
                        Ok(change) => {
                            if tx.send(change).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                table = table.as_str(),
                                skipped,
                                "change feed lagged; resync recommended"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        Ok(rx)
    }

    /// Apply one remote change event to the local store and signal the UI.
    pub fn apply_remote_change(&mut self, change: RemoteChange) -> Result<Option<StoreChange>> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| RosterError::RemoteUnavailable("not connected".to_string()))?;
        let applied = gateway.apply_remote_change(
            self.coordinator.active_key(),
            &mut self.store,
            change,
        )?;
        Ok(applied.map(|applied| {
            let change = StoreChange {
                table: applied.table,
                id: applied.id,
                removed: applied.removed,
            };
            let _ = self.changes.send(change.clone());
            change
        }))
    }

    // --- Encryption admin ---

    /// Enable end-to-end encryption for the dataset.
    pub async fn enable_encryption(&mut self, password: &SecretString) -> Result<()> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| RosterError::RemoteUnavailable("not connected".to_string()))?;
        self.coordinator
            .enable(gateway.remote().as_ref(), password)
            .await
    }

    /// Unlock an encrypted dataset with the shared password.
    pub async fn unlock(&mut self, password: &SecretString) -> Result<PullSummary> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| RosterError::RemoteUnavailable("not connected".to_string()))?;
        let summary = self
            .coordinator
            .unlock(gateway, &mut self.store, password)
            .await?;
        for applied in &summary.applied {
            self.notify(applied.table, &applied.id, applied.removed);
        }
        Ok(summary)
    }

    /// Rotate the dataset password. Returns the new key version.
    pub async fn rotate_password(
        &mut self,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<u32> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| RosterError::RemoteUnavailable("not connected".to_string()))?;
        self.coordinator
            .rotate(gateway.remote().as_ref(), old_password, new_password)
            .await
    }

    /// Forget the cached key (e.g. after a `WrongPassword` from a feed).
    pub fn discard_key(&mut self) -> Result<()> {
        self.coordinator.discard_key()
    }

    // --- Backup ---

    /// Snapshot the local store to a backup document.
    pub fn export_backup(&self) -> Result<BackupFile> {
        backup::export_backup(&self.store)
    }

    /// Replace the local store with a backup, then push everything.
    pub async fn import_backup(&mut self, backup: &BackupFile) -> Result<usize> {
        backup::restore_backup(&mut self.store, backup)?;
        match &self.gateway {
            Some(gateway) => {
                gateway
                    .resync_all(self.coordinator.active_key(), &self.store)
                    .await
            }
            None => Ok(0),
        }
    }

    fn notify(&self, table: Table, id: &str, removed: bool) {
        // No subscribers is fine; the signal is fire-and-forget.
        let _ = self.changes.send(StoreChange {
            table,
            id: id.to_string(),
            removed,
        });
    }
}

/// Explicit debounce policy for the UI boundary.
///
/// Rapid field edits coalesce into one store write: the UI calls
/// [`Debouncer::touch`] per keystroke and performs the write when
/// [`Debouncer::settled`] fires. This lives at the boundary on purpose; the
/// store contract itself has no notion of coalescing.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<tokio::time::Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Record an edit, pushing the deadline out by the full window.
    pub fn touch(&mut self) {
        self.deadline = Some(tokio::time::Instant::now() + self.window);
    }

    /// Drop any pending flush.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Wait for the edit window to settle.
    ///
    /// Returns `true` after sleeping out a pending window (the caller should
    /// flush now), `false` immediately when nothing is pending.
    pub async fn settled(&mut self) -> bool {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
                true
            }
            None => false,
        }
    }
}
