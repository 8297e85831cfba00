//! Core data types for the roster store and the sync wire format.
//!
//! All records serialize with camelCase field names to stay byte-compatible
//! with the shared remote collection layout. Every record carries a
//! caller-assigned, globally unique string `id`; the remote document key is
//! always this id.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};

/// The five synced tables of the shared dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Table {
    Busses,
    Students,
    SeatAssignments,
    Checkins,
    RouteRows,
}

impl Table {
    /// All tables, parents before dependents. Pull and resync iterate in this
    /// order so bus and student documents land before records that reference them.
    pub const ALL: [Table; 5] = [
        Table::Busses,
        Table::Students,
        Table::SeatAssignments,
        Table::Checkins,
        Table::RouteRows,
    ];

    /// Remote sub-collection name for this table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Busses => "busses",
            Table::Students => "students",
            Table::SeatAssignments => "seatAssignments",
            Table::Checkins => "checkins",
            Table::RouteRows => "routeRows",
        }
    }

    /// Local SQL table name.
    pub(crate) fn sql_name(&self) -> &'static str {
        match self {
            Table::Busses => "busses",
            Table::Students => "students",
            Table::SeatAssignments => "seat_assignments",
            Table::Checkins => "checkins",
            Table::RouteRows => "route_rows",
        }
    }

    /// Parse a remote sub-collection name.
    pub fn parse(s: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Morning or afternoon route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    #[serde(rename = "AM")]
    Am,
    #[serde(rename = "PM")]
    Pm,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Am => "AM",
            Route::Pm => "PM",
        }
    }

    pub fn parse(s: &str) -> Option<Route> {
        match s {
            "AM" | "am" => Some(Route::Am),
            "PM" | "pm" => Some(Route::Pm),
            _ => None,
        }
    }
}

/// Side of the bus aisle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        }
    }
}

/// A record that lives in one of the synced tables.
///
/// Implementations pair a table with the id accessor the store and the sync
/// gateway key everything on. Validation runs before any local mutation;
/// remote documents are applied as-is (last-write-wins, no re-validation).
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Table this record type belongs to.
    const TABLE: Table;

    /// The caller-assigned unique identifier.
    fn id(&self) -> &str;

    /// Validate the record before a local write.
    fn validate(&self) -> Result<()> {
        if self.id().trim().is_empty() {
            return Err(RosterError::Validation("Record id cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// A bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub id: String,

    /// Display name (e.g., "Bus 12").
    pub name: String,

    pub created_at: DateTime<Utc>,
}

impl Record for Bus {
    const TABLE: Table = Table::Busses;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RosterError::Validation("Bus id cannot be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(RosterError::Validation("Bus name cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// A student on the roster.
///
/// Contact fields are free-form strings; empty means unknown. `bus_am` and
/// `bus_pm` reference a [`Bus`] id when the student rides that route.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default, rename = "busAM")]
    pub bus_am: Option<String>,
    #[serde(default, rename = "busPM")]
    pub bus_pm: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub dropoff_address: String,
    #[serde(default)]
    pub parent_name: String,
    #[serde(default)]
    pub home_phone: String,
    #[serde(default)]
    pub cell_phone: String,
    #[serde(default)]
    pub work_phone: String,
    #[serde(default)]
    pub emergency_contact: String,
    #[serde(default)]
    pub other_info: String,
}

impl Record for Student {
    const TABLE: Table = Table::Students;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RosterError::Validation("Student id cannot be empty".to_string()));
        }
        if self.first_name.trim().is_empty() && self.last_name.trim().is_empty() {
            return Err(RosterError::Validation(
                "Student needs a first or last name".to_string(),
            ));
        }
        Ok(())
    }
}

/// A student's seat on a bus for one route.
///
/// Invariants (enforced by the store's domain operations, not by SQL
/// constraints; concurrent edits on other devices may transiently violate
/// them until last-write-wins settles):
/// - at most one assignment per `(busId, route, row, side, position)`
/// - at most one assignment per `(busId, route, studentId)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAssignment {
    pub id: String,
    pub bus_id: String,
    pub route: Route,
    pub student_id: String,

    /// 1-based seat row from the front of the bus.
    pub row: i64,
    pub side: Side,

    /// 1-based position within the row, counted from the aisle.
    pub position: i64,

    pub assigned_at: DateTime<Utc>,
}

impl Record for SeatAssignment {
    const TABLE: Table = Table::SeatAssignments;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RosterError::Validation(
                "Seat assignment id cannot be empty".to_string(),
            ));
        }
        if self.bus_id.trim().is_empty() || self.student_id.trim().is_empty() {
            return Err(RosterError::Validation(
                "Seat assignment needs a bus and a student".to_string(),
            ));
        }
        if self.row < 1 || self.position < 1 {
            return Err(RosterError::Validation(
                "Seat row and position are 1-based".to_string(),
            ));
        }
        Ok(())
    }
}

/// A boarding checkin for one student on one route and day.
///
/// At most one checkin exists per `(busId, route, studentId, date)`.
/// `is_extra` marks a student checked in without a seat assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkin {
    pub id: String,
    pub bus_id: String,
    pub route: Route,
    pub student_id: String,

    /// Calendar day of the checkin (YYYY-MM-DD).
    pub date: NaiveDate,

    /// Moment the checkin was recorded.
    pub timestamp: DateTime<Utc>,

    pub is_extra: bool,
}

impl Record for Checkin {
    const TABLE: Table = Table::Checkins;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RosterError::Validation("Checkin id cannot be empty".to_string()));
        }
        if self.bus_id.trim().is_empty() || self.student_id.trim().is_empty() {
            return Err(RosterError::Validation(
                "Checkin needs a bus and a student".to_string(),
            ));
        }
        Ok(())
    }
}

/// One stop in the ordered route sheet for `(busId, route)`.
///
/// `order` is dense (1..=n) and resequenced on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRow {
    pub id: String,
    pub bus_id: String,
    pub route: Route,
    pub order: i64,

    /// What happens at this stop (e.g., "pickup", "dropoff", "turn").
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub street_address: String,

    /// Set when the stop is tied to a roster student.
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub roadside: String,
    #[serde(default)]
    pub time: String,
}

impl Record for RouteRow {
    const TABLE: Table = Table::RouteRows;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RosterError::Validation("Route row id cannot be empty".to_string()));
        }
        if self.bus_id.trim().is_empty() {
            return Err(RosterError::Validation("Route row needs a bus".to_string()));
        }
        if self.order < 1 {
            return Err(RosterError::Validation("Route row order is 1-based".to_string()));
        }
        Ok(())
    }
}

/// Wire version tag for the encrypted envelope.
pub const ENVELOPE_VERSION: u32 = 1;

/// The encrypted wire wrapper around a record.
///
/// `enc` is base64 of `nonce(12) || ciphertext || auth_tag(16)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub enc: String,
    pub v: u32,
}

/// A document as stored in the remote collection: either the plaintext record
/// fields or an [`Envelope`].
///
/// Decoded explicitly on the envelope discriminant (`v: 1` plus a string
/// `enc`), never duck-typed downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteDocument {
    Plaintext(serde_json::Value),
    Encrypted(Envelope),
}

impl RemoteDocument {
    /// Classify a raw remote document.
    pub fn from_value(value: serde_json::Value) -> RemoteDocument {
        if let Some(obj) = value.as_object() {
            let tagged = obj.get("v").and_then(serde_json::Value::as_u64)
                == Some(ENVELOPE_VERSION as u64);
            if tagged {
                if let Some(enc) = obj.get("enc").and_then(serde_json::Value::as_str) {
                    return RemoteDocument::Encrypted(Envelope {
                        enc: enc.to_string(),
                        v: ENVELOPE_VERSION,
                    });
                }
            }
        }
        RemoteDocument::Plaintext(value)
    }

    /// Serialize back to the raw wire shape.
    pub fn into_value(self) -> serde_json::Value {
        match self {
            RemoteDocument::Plaintext(value) => value,
            RemoteDocument::Encrypted(envelope) => {
                serde_json::json!({ "enc": envelope.enc, "v": envelope.v })
            }
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, RemoteDocument::Encrypted(_))
    }
}

/// Dataset-wide encryption state, published as a singleton config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    /// Whether pushes to this dataset must encrypt.
    pub encryption_required: bool,

    /// Monotonically increasing version of the authoritative key.
    pub encryption_key_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_round_trip() {
        for table in Table::ALL {
            assert_eq!(Table::parse(table.as_str()), Some(table));
        }
    }

    #[test]
    fn test_student_serializes_camel_case() {
        let student = Student {
            id: "s1".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            bus_am: Some("b1".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&student).unwrap();
        assert_eq!(value["firstName"], "Ann");
        assert_eq!(value["busAM"], "b1");
        assert!(value.get("first_name").is_none());
    }

    #[test]
    fn test_route_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Route::Am).unwrap(), "AM");
        assert_eq!(serde_json::to_value(Side::Left).unwrap(), "left");
    }

    #[test]
    fn test_remote_document_discriminates_envelope() {
        let doc = RemoteDocument::from_value(serde_json::json!({"enc": "abc", "v": 1}));
        assert!(doc.is_encrypted());

        // A record that happens to have a `v` field is not an envelope.
        let doc = RemoteDocument::from_value(serde_json::json!({"id": "x", "v": 1}));
        assert!(!doc.is_encrypted());

        let doc = RemoteDocument::from_value(serde_json::json!({"id": "x", "name": "Bus 1"}));
        assert!(!doc.is_encrypted());
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let bus = Bus {
            id: "b1".to_string(),
            name: "  ".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(bus.validate(), Err(RosterError::Validation(_))));

        let assignment = SeatAssignment {
            id: "a1".to_string(),
            bus_id: "b1".to_string(),
            route: Route::Am,
            student_id: "s1".to_string(),
            row: 0,
            side: Side::Left,
            position: 1,
            assigned_at: Utc::now(),
        };
        assert!(assignment.validate().is_err());
    }

    #[test]
    fn test_checkin_date_serializes_iso() {
        let checkin = Checkin {
            id: "c1".to_string(),
            bus_id: "b1".to_string(),
            route: Route::Pm,
            student_id: "s1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 9, 3).unwrap(),
            timestamp: Utc::now(),
            is_extra: false,
        };
        let value = serde_json::to_value(&checkin).unwrap();
        assert_eq!(value["date"], "2024-09-03");
        assert_eq!(value["route"], "PM");
        assert_eq!(value["isExtra"], false);
    }
}
