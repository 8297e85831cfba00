//! SQL schema for the local durable store.
//!
//! Every table stores the full record as JSON in `data` plus extracted columns
//! for the compound secondary indexes. The JSON document is the record of
//! truth; the extracted columns exist only so index lookups stay in SQL.

use rusqlite::Connection;

use crate::error::Result;
use crate::model::Table;

/// A declared parent/child relationship with cascade-delete semantics.
///
/// Cascades run inside the parent-delete transaction rather than as SQLite
/// `ON DELETE CASCADE` constraints: remote change feeds are unordered across
/// tables, so a child document may legitimately arrive before its parent and
/// hard foreign keys would reject it.
pub(crate) struct Cascade {
    pub parent: Table,
    pub child: Table,
    pub child_column: &'static str,
}

/// The cascade relationships of the data model: deleting a bus or a student
/// deletes their seat assignments. Checkins and route rows survive their bus.
pub(crate) const CASCADES: &[Cascade] = &[
    Cascade {
        parent: Table::Busses,
        child: Table::SeatAssignments,
        child_column: "bus_id",
    },
    Cascade {
        parent: Table::Students,
        child: Table::SeatAssignments,
        child_column: "student_id",
    },
];

/// Create tables and indexes if they do not exist yet.
pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS busses (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS seat_assignments (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            bus_id TEXT,
            route TEXT,
            student_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_seat_assignments_bus_route
            ON seat_assignments(bus_id, route);
        CREATE INDEX IF NOT EXISTS idx_seat_assignments_student
            ON seat_assignments(student_id);

        CREATE TABLE IF NOT EXISTS checkins (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            bus_id TEXT,
            route TEXT,
            student_id TEXT,
            date TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_checkins_bus_date_route
            ON checkins(bus_id, date, route);
        CREATE INDEX IF NOT EXISTS idx_checkins_student_date
            ON checkins(student_id, date);

        CREATE TABLE IF NOT EXISTS route_rows (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            bus_id TEXT,
            route TEXT,
            ord INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_route_rows_bus_route
            ON route_rows(bus_id, route, ord);
        "#,
    )?;
    Ok(())
}
