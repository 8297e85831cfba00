//! Encryption lifecycle across devices: enable, unlock, rotate, stale keys.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use tempfile::TempDir;

use busboard_core::crypto::{decrypt_envelope, derive_key};
use busboard_core::model::RemoteDocument;
use busboard_core::{
    App, Bus, ConnectStatus, Coordinator, KeyStatus, MemoryRemote, RemoteStore, RosterError,
    RosterStore, Student, Table,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DATASET: &str = "district-12";

struct Device {
    app: App,
    _dir: TempDir,
}

async fn device(remote: &MemoryRemote) -> Device {
    let dir = TempDir::new().unwrap();
    let store = RosterStore::open_in_memory().unwrap();
    let coordinator = Coordinator::load(DATASET, dir.path().join("keys.json")).unwrap();
    let mut app = App::new(store, coordinator);
    let status = app.connect(Arc::new(remote.clone()), CONNECT_TIMEOUT).await;
    assert!(matches!(status, ConnectStatus::Online { .. }));
    Device { app, _dir: dir }
}

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

fn bus(id: &str, name: &str) -> Bus {
    Bus {
        id: id.to_string(),
        name: name.to_string(),
        created_at: Utc::now(),
    }
}

fn student(id: &str, first: &str) -> Student {
    Student {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: "Tester".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_enable_then_push_writes_envelopes() {
    let remote = MemoryRemote::new();
    let mut admin = device(&remote).await;

    admin.app.enable_encryption(&secret("hunter2")).await.unwrap();
    admin.app.put_record(bus("b1", "Bus 1")).await.unwrap();

    let raw = remote.raw_document(Table::Busses, "b1").unwrap();
    assert!(RemoteDocument::from_value(raw).is_encrypted());
}

#[tokio::test]
async fn test_unlock_with_wrong_password_fails_and_persists_nothing() {
    let remote = MemoryRemote::new();
    let mut admin = device(&remote).await;
    admin.app.enable_encryption(&secret("hunter2")).await.unwrap();
    admin.app.put_record(student("s1", "Ann")).await.unwrap();

    let mut other = device(&remote).await;
    let result = other.app.unlock(&secret("not-the-password")).await;
    assert!(matches!(result, Err(RosterError::WrongPassword)));
    assert_eq!(other.app.key_version(), None);
    assert_eq!(other.app.store().count(Table::Students).unwrap(), 0);

    // The right password unlocks and pulls the dataset.
    let summary = other.app.unlock(&secret("hunter2")).await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(other.app.key_version(), Some(1));
    let students: Vec<Student> = other.app.store().get_all().unwrap();
    assert_eq!(students[0].first_name, "Ann");
}

#[tokio::test]
async fn test_sync_blocked_without_key_on_encrypted_dataset() {
    let remote = MemoryRemote::new();
    let mut admin = device(&remote).await;
    admin.app.enable_encryption(&secret("hunter2")).await.unwrap();
    admin.app.put_record(student("s1", "Ann")).await.unwrap();

    let mut locked = device(&remote).await;
    let result = locked.app.sync_now().await;
    assert!(matches!(result, Err(RosterError::WrongPassword)));
    // Blocked before any encrypted document touched the store.
    assert_eq!(locked.app.store().count(Table::Students).unwrap(), 0);
}

#[tokio::test]
async fn test_rotate_reencrypts_and_bumps_version_once() {
    let remote = MemoryRemote::new();
    let mut admin = device(&remote).await;
    admin.app.enable_encryption(&secret("old-pass")).await.unwrap();

    // Three records across two tables.
    admin.app.put_record(bus("b1", "Bus 1")).await.unwrap();
    admin.app.put_record(student("s1", "Ann")).await.unwrap();
    admin.app.put_record(student("s2", "Ben")).await.unwrap();

    let version = admin
        .app
        .rotate_password(&secret("old-pass"), &secret("new-pass"))
        .await
        .unwrap();
    assert_eq!(version, 2);

    let config = remote.fetch_config().await.unwrap().unwrap();
    assert_eq!(config.encryption_key_version, 2);

    let old_key = derive_key("old-pass", DATASET).unwrap();
    let new_key = derive_key("new-pass", DATASET).unwrap();
    for (table, id) in [
        (Table::Busses, "b1"),
        (Table::Students, "s1"),
        (Table::Students, "s2"),
    ] {
        let raw = remote.raw_document(table, id).unwrap();
        let envelope = match RemoteDocument::from_value(raw) {
            RemoteDocument::Encrypted(envelope) => envelope,
            RemoteDocument::Plaintext(_) => panic!("document was not re-encrypted"),
        };
        assert!(decrypt_envelope(&new_key, &envelope, id).is_ok());
        assert!(matches!(
            decrypt_envelope(&old_key, &envelope, id),
            Err(RosterError::WrongPassword)
        ));
    }
}

#[tokio::test]
async fn test_rotate_with_wrong_old_password_writes_nothing() {
    let remote = MemoryRemote::new();
    let mut admin = device(&remote).await;
    admin.app.enable_encryption(&secret("old-pass")).await.unwrap();
    admin.app.put_record(student("s1", "Ann")).await.unwrap();

    let before = remote.raw_document(Table::Students, "s1").unwrap();
    let result = admin
        .app
        .rotate_password(&secret("wrong"), &secret("new-pass"))
        .await;
    assert!(matches!(result, Err(RosterError::WrongPassword)));

    // Zero remote writes: the document bytes and the version are untouched.
    assert_eq!(remote.raw_document(Table::Students, "s1").unwrap(), before);
    let config = remote.fetch_config().await.unwrap().unwrap();
    assert_eq!(config.encryption_key_version, 1);
}

#[tokio::test]
async fn test_rotation_forces_reunlock_on_stale_device() {
    let remote = MemoryRemote::new();
    let mut admin = device(&remote).await;
    admin.app.enable_encryption(&secret("old-pass")).await.unwrap();
    admin.app.put_record(student("s1", "Ann")).await.unwrap();

    let mut other = device(&remote).await;
    other.app.unlock(&secret("old-pass")).await.unwrap();
    assert_eq!(other.app.key_version(), Some(1));

    admin
        .app
        .rotate_password(&secret("old-pass"), &secret("new-pass"))
        .await
        .unwrap();

    // The stale device detects the version bump and must re-unlock.
    let result = other.app.sync_now().await;
    assert!(matches!(result, Err(RosterError::WrongPassword)));
    assert_eq!(other.app.key_version(), None);

    other.app.unlock(&secret("new-pass")).await.unwrap();
    assert_eq!(other.app.key_version(), Some(2));
}

#[tokio::test]
async fn test_rotation_converts_legacy_plaintext() {
    let remote = MemoryRemote::new();
    // A document written before encryption was ever enabled.
    remote
        .put_document(
            Table::Busses,
            "b0",
            serde_json::json!({"id": "b0", "name": "Legacy", "createdAt": "2020-01-01T00:00:00Z"}),
        )
        .await
        .unwrap();

    let mut admin = device(&remote).await;
    admin.app.enable_encryption(&secret("old-pass")).await.unwrap();
    admin
        .app
        .rotate_password(&secret("old-pass"), &secret("new-pass"))
        .await
        .unwrap();

    let raw = remote.raw_document(Table::Busses, "b0").unwrap();
    assert!(RemoteDocument::from_value(raw).is_encrypted());
}

#[tokio::test]
async fn test_connect_reports_lock_requirement() {
    let remote = MemoryRemote::new();
    let mut admin = device(&remote).await;
    admin.app.enable_encryption(&secret("hunter2")).await.unwrap();

    // A fresh device with no cached key sees LockRequired at connect.
    let dir = TempDir::new().unwrap();
    let store = RosterStore::open_in_memory().unwrap();
    let coordinator = Coordinator::load(DATASET, dir.path().join("keys.json")).unwrap();
    let mut app = App::new(store, coordinator);
    let status = app.connect(Arc::new(remote.clone()), CONNECT_TIMEOUT).await;
    assert_eq!(
        status,
        ConnectStatus::Online {
            key: KeyStatus::LockRequired {
                published_version: 1
            }
        }
    );
}
