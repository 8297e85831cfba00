//! Plaintext JSON backup of the whole local dataset.
//!
//! The backup file is the collaborator boundary for export/import: one JSON
//! document holding all five tables, always plaintext regardless of the
//! dataset's encryption state. Restoring replaces the local store in one
//! transaction; the app layer follows up with a full push so the remote
//! collection converges on the restored data.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};
use crate::model::{Bus, Checkin, Record, RouteRow, SeatAssignment, Student, Table};
use crate::store::RosterStore;

/// A full dataset snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    #[serde(default)]
    pub busses: Vec<Bus>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub seat_assignments: Vec<SeatAssignment>,
    #[serde(default)]
    pub checkins: Vec<Checkin>,
    #[serde(default)]
    pub route_rows: Vec<RouteRow>,
}

impl BackupFile {
    pub fn record_count(&self) -> usize {
        self.busses.len()
            + self.students.len()
            + self.seat_assignments.len()
            + self.checkins.len()
            + self.route_rows.len()
    }
}

/// Snapshot the store into a backup document.
pub fn export_backup(store: &RosterStore) -> Result<BackupFile> {
    Ok(BackupFile {
        busses: store.get_all()?,
        students: store.get_all()?,
        seat_assignments: store.get_all()?,
        checkins: store.get_all()?,
        route_rows: store.get_all()?,
    })
}

/// Replace the store contents with a backup, in one transaction.
///
/// Every record is validated first; a malformed backup is rejected before
/// any mutation.
pub fn restore_backup(store: &mut RosterStore, backup: &BackupFile) -> Result<()> {
    let mut snapshot = Vec::with_capacity(Table::ALL.len());
    snapshot.push((Table::Busses, encode_rows(&backup.busses)?));
    snapshot.push((Table::Students, encode_rows(&backup.students)?));
    snapshot.push((Table::SeatAssignments, encode_rows(&backup.seat_assignments)?));
    snapshot.push((Table::Checkins, encode_rows(&backup.checkins)?));
    snapshot.push((Table::RouteRows, encode_rows(&backup.route_rows)?));
    store.replace_all(snapshot)
}

/// Write a backup document to disk as pretty-printed JSON.
pub fn write_backup_file(path: &Path, backup: &BackupFile) -> Result<()> {
    let json = serde_json::to_string_pretty(backup)
        .map_err(|e| RosterError::Storage(format!("Backup encode failed: {}", e)))?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a backup document from disk.
pub fn read_backup_file(path: &Path) -> Result<BackupFile> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| RosterError::Validation(format!("Backup file is not valid: {}", e)))
}

fn encode_rows<R: Record>(records: &[R]) -> Result<Vec<(String, serde_json::Value)>> {
    records
        .iter()
        .map(|record| {
            record.validate()?;
            Ok((record.id().to_string(), serde_json::to_value(record)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_store() -> RosterStore {
        let mut store = RosterStore::open_in_memory().unwrap();
        store
            .put(&Bus {
                id: "b1".to_string(),
                name: "Bus 1".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .put(&Student {
                id: "s1".to_string(),
                first_name: "Ann".to_string(),
                last_name: "Lee".to_string(),
                ..Default::default()
            })
            .unwrap();
        store
    }

    #[test]
    fn test_export_restore_round_trip() {
        let store = sample_store();
        let backup = export_backup(&store).unwrap();
        assert_eq!(backup.record_count(), 2);

        let mut fresh = RosterStore::open_in_memory().unwrap();
        restore_backup(&mut fresh, &backup).unwrap();

        let busses: Vec<Bus> = fresh.get_all().unwrap();
        let students: Vec<Student> = fresh.get_all().unwrap();
        assert_eq!(busses.len(), 1);
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].first_name, "Ann");
    }

    #[test]
    fn test_restore_replaces_existing_rows() {
        let store = sample_store();
        let backup = export_backup(&store).unwrap();

        let mut other = RosterStore::open_in_memory().unwrap();
        other
            .put(&Bus {
                id: "stale".to_string(),
                name: "Stale Bus".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();

        restore_backup(&mut other, &backup).unwrap();
        let busses: Vec<Bus> = other.get_all().unwrap();
        assert_eq!(busses.len(), 1);
        assert_eq!(busses[0].id, "b1");
    }

    #[test]
    fn test_invalid_backup_rejected_before_mutation() {
        let mut store = sample_store();
        let backup = BackupFile {
            busses: vec![Bus {
                id: String::new(),
                name: "No id".to_string(),
                created_at: Utc::now(),
            }],
            ..Default::default()
        };

        assert!(restore_backup(&mut store, &backup).is_err());
        // The existing rows survived the rejected restore.
        assert_eq!(store.count(Table::Busses).unwrap(), 1);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");

        let backup = export_backup(&sample_store()).unwrap();
        write_backup_file(&path, &backup).unwrap();

        let restored = read_backup_file(&path).unwrap();
        assert_eq!(restored.record_count(), backup.record_count());
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let backup: BackupFile = serde_json::from_str(r#"{"busses": []}"#).unwrap();
        assert_eq!(backup.record_count(), 0);
    }
}
