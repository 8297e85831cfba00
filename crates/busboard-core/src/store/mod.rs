//! Local durable store (LDS) over SQLite.
//!
//! The store is the device's source of truth: local writes commit here first
//! and are immediately durable; remote propagation is best-effort and
//! asynchronous. Every mutation is transactional: a record write, or a delete
//! plus its declared cascades, either fully commits or leaves the state
//! unchanged.

mod ops;
mod schema;

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, RosterError};
use crate::model::{Record, Route, Table};

pub use ops::{AssignmentOutcome, CheckinToggle, SeatLocation};

/// A record removed by [`RosterStore::delete`], including cascade victims.
///
/// Callers propagate each deletion to the remote collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub table: Table,
    pub id: String,
}

/// Compound secondary index lookups supported by the store.
#[derive(Debug, Clone, Copy)]
pub enum IndexKey<'a> {
    /// `(busId, route)` on seat assignments, checkins, and route rows.
    BusRoute { bus_id: &'a str, route: Route },
    /// `(busId, date, route)` on checkins.
    BusDateRoute {
        bus_id: &'a str,
        date: NaiveDate,
        route: Route,
    },
    /// `(studentId, date)` on checkins.
    StudentDate {
        student_id: &'a str,
        date: NaiveDate,
    },
}

/// SQLite-backed roster store.
pub struct RosterStore {
    conn: Connection,
}

impl RosterStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store. Used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        schema::init(&conn)?;
        Ok(Self { conn })
    }

    /// Upsert a record by id.
    ///
    /// Validation runs before the transaction; a rejected record leaves the
    /// store untouched.
    pub fn put<R: Record>(&mut self, record: &R) -> Result<()> {
        record.validate()?;
        let doc = serde_json::to_value(record)?;
        let tx = self.conn.transaction()?;
        upsert_row(&tx, R::TABLE, record.id(), &doc)?;
        tx.commit()?;
        Ok(())
    }

    /// Upsert a raw document, as delivered by the sync gateway.
    ///
    /// Remote documents are applied as-is under last-write-wins; they are not
    /// re-validated (the losing side of a conflict may be any shape the
    /// winning device wrote).
    pub fn upsert_value(&mut self, table: Table, id: &str, doc: &serde_json::Value) -> Result<()> {
        if id.trim().is_empty() {
            return Err(RosterError::Storage("Document id cannot be empty".to_string()));
        }
        let tx = self.conn.transaction()?;
        upsert_row(&tx, table, id, doc)?;
        tx.commit()?;
        Ok(())
    }

    /// Fetch one record by id.
    pub fn get<R: Record>(&self, id: &str) -> Result<Option<R>> {
        match row_doc(&self.conn, R::TABLE, id)? {
            Some(doc) => Ok(Some(decode::<R>(doc)?)),
            None => Ok(None),
        }
    }

    /// Fetch every record of a table, ordered by id.
    pub fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        all_docs(&self.conn, R::TABLE)?
            .into_iter()
            .map(|(_, doc)| decode::<R>(doc))
            .collect()
    }

    /// Fetch every raw document of a table, ordered by id.
    pub fn get_all_values(&self, table: Table) -> Result<Vec<(String, serde_json::Value)>> {
        all_docs(&self.conn, table)
    }

    /// Fetch records matching a compound index key.
    ///
    /// Route rows come back in route-sheet order; other tables by id.
    pub fn get_by_index<R: Record>(&self, key: IndexKey<'_>) -> Result<Vec<R>> {
        docs_by_index(&self.conn, R::TABLE, key)?
            .into_iter()
            .map(decode::<R>)
            .collect()
    }

    /// Delete a record and its declared cascade children in one transaction.
    ///
    /// Returns every deletion that actually happened (empty when the id was
    /// absent) so callers can propagate them remotely.
    pub fn delete(&mut self, table: Table, id: &str) -> Result<Vec<Deletion>> {
        let tx = self.conn.transaction()?;
        let deletions = delete_cascade(&tx, table, id)?;
        tx.commit()?;
        Ok(deletions)
    }

    /// Delete a single row without cascades, as delivered by the sync
    /// gateway. Remote cascade victims arrive as their own removal events
    /// from the device that performed the delete.
    pub fn delete_value(&mut self, table: Table, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let existed = delete_row(&tx, table, id)?;
        tx.commit()?;
        Ok(existed)
    }

    /// Number of records in a table.
    pub fn count(&self, table: Table) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.sql_name());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Replace the contents of every table with the given snapshot, in one
    /// transaction. Used by backup restore.
    pub fn replace_all(
        &mut self,
        snapshot: Vec<(Table, Vec<(String, serde_json::Value)>)>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        for table in Table::ALL {
            tx.execute(&format!("DELETE FROM {}", table.sql_name()), [])?;
        }
        for (table, rows) in snapshot {
            for (id, doc) in rows {
                upsert_row(&tx, table, &id, &doc)?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn decode<R: Record>(doc: serde_json::Value) -> Result<R> {
    serde_json::from_value(doc).map_err(|e| RosterError::Storage(format!("Corrupt record: {}", e)))
}

fn text_field(doc: &serde_json::Value, field: &str) -> Option<String> {
    doc.get(field).and_then(serde_json::Value::as_str).map(str::to_string)
}

/// Insert or update one row, refreshing the extracted index columns.
pub(crate) fn upsert_row(
    conn: &Connection,
    table: Table,
    id: &str,
    doc: &serde_json::Value,
) -> Result<()> {
    let data = serde_json::to_string(doc)?;
    match table {
        Table::Busses | Table::Students => {
            conn.execute(
                &format!(
                    "INSERT INTO {} (id, data) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                    table.sql_name()
                ),
                params![id, data],
            )?;
        }
        Table::SeatAssignments => {
            conn.execute(
                "INSERT INTO seat_assignments (id, data, bus_id, route, student_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    data = excluded.data,
                    bus_id = excluded.bus_id,
                    route = excluded.route,
                    student_id = excluded.student_id",
                params![
                    id,
                    data,
                    text_field(doc, "busId"),
                    text_field(doc, "route"),
                    text_field(doc, "studentId"),
                ],
            )?;
        }
        Table::Checkins => {
            conn.execute(
                "INSERT INTO checkins (id, data, bus_id, route, student_id, date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    data = excluded.data,
                    bus_id = excluded.bus_id,
                    route = excluded.route,
                    student_id = excluded.student_id,
                    date = excluded.date",
                params![
                    id,
                    data,
                    text_field(doc, "busId"),
                    text_field(doc, "route"),
                    text_field(doc, "studentId"),
                    text_field(doc, "date"),
                ],
            )?;
        }
        Table::RouteRows => {
            conn.execute(
                "INSERT INTO route_rows (id, data, bus_id, route, ord)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    data = excluded.data,
                    bus_id = excluded.bus_id,
                    route = excluded.route,
                    ord = excluded.ord",
                params![
                    id,
                    data,
                    text_field(doc, "busId"),
                    text_field(doc, "route"),
                    doc.get("order").and_then(serde_json::Value::as_i64),
                ],
            )?;
        }
    }
    Ok(())
}

/// Delete one row. Returns whether it existed.
pub(crate) fn delete_row(conn: &Connection, table: Table, id: &str) -> Result<bool> {
    let changed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", table.sql_name()),
        params![id],
    )?;
    Ok(changed > 0)
}

/// Delete a record plus its declared cascade children.
pub(crate) fn delete_cascade(conn: &Connection, table: Table, id: &str) -> Result<Vec<Deletion>> {
    let exists: bool = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)",
            table.sql_name()
        ),
        params![id],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(Vec::new());
    }

    let mut deletions = Vec::new();
    for cascade in schema::CASCADES {
        if cascade.parent != table {
            continue;
        }
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ?1 ORDER BY id",
            cascade.child.sql_name(),
            cascade.child_column
        );
        let mut stmt = conn.prepare(&sql)?;
        let child_ids = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for child_id in child_ids {
            delete_row(conn, cascade.child, &child_id)?;
            deletions.push(Deletion {
                table: cascade.child,
                id: child_id,
            });
        }
    }
    delete_row(conn, table, id)?;
    deletions.push(Deletion {
        table,
        id: id.to_string(),
    });
    Ok(deletions)
}

pub(crate) fn row_doc(
    conn: &Connection,
    table: Table,
    id: &str,
) -> Result<Option<serde_json::Value>> {
    let data: Option<String> = conn
        .query_row(
            &format!("SELECT data FROM {} WHERE id = ?1", table.sql_name()),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match data {
        Some(text) => Ok(Some(parse_doc(&text)?)),
        None => Ok(None),
    }
}

pub(crate) fn all_docs(
    conn: &Connection,
    table: Table,
) -> Result<Vec<(String, serde_json::Value)>> {
    let order = match table {
        Table::RouteRows => "ORDER BY ord, id",
        _ => "ORDER BY id",
    };
    let sql = format!("SELECT id, data FROM {} {}", table.sql_name(), order);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(id, text)| Ok((id, parse_doc(&text)?)))
        .collect()
}

pub(crate) fn docs_by_index(
    conn: &Connection,
    table: Table,
    key: IndexKey<'_>,
) -> Result<Vec<serde_json::Value>> {
    let supported = matches!(
        (table, key),
        (
            Table::SeatAssignments | Table::Checkins | Table::RouteRows,
            IndexKey::BusRoute { .. }
        ) | (Table::Checkins, IndexKey::BusDateRoute { .. })
            | (Table::Checkins, IndexKey::StudentDate { .. })
    );
    if !supported {
        return Err(RosterError::InvalidInput(format!(
            "Table {} has no index for this key",
            table
        )));
    }

    let order = match table {
        Table::RouteRows => "ORDER BY ord, id",
        _ => "ORDER BY id",
    };
    let (sql, binds): (String, Vec<String>) = match key {
        IndexKey::BusRoute { bus_id, route } => (
            format!(
                "SELECT data FROM {} WHERE bus_id = ?1 AND route = ?2 {}",
                table.sql_name(),
                order
            ),
            vec![bus_id.to_string(), route.as_str().to_string()],
        ),
        IndexKey::BusDateRoute { bus_id, date, route } => (
            format!(
                "SELECT data FROM {} WHERE bus_id = ?1 AND date = ?2 AND route = ?3 {}",
                table.sql_name(),
                order
            ),
            vec![
                bus_id.to_string(),
                date.to_string(),
                route.as_str().to_string(),
            ],
        ),
        IndexKey::StudentDate { student_id, date } => (
            format!(
                "SELECT data FROM {} WHERE student_id = ?1 AND date = ?2 {}",
                table.sql_name(),
                order
            ),
            vec![student_id.to_string(), date.to_string()],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |row| {
            row.get::<_, String>(0)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.iter().map(|text| parse_doc(text)).collect()
}

fn parse_doc(text: &str) -> Result<serde_json::Value> {
    serde_json::from_str(text).map_err(|e| RosterError::Storage(format!("Corrupt row JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bus, Route, SeatAssignment, Side, Student};
    use chrono::Utc;

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

    fn assignment(id: &str, bus_id: &str, student_id: &str, row: i64) -> SeatAssignment {
        SeatAssignment {
            id: id.to_string(),
            bus_id: bus_id.to_string(),
            route: Route::Am,
            student_id: student_id.to_string(),
            row,
            side: Side::Left,
            position: 1,
            assigned_at: Utc::now(),
        }
    }

    #[test]
    fn test_put_then_get_all_contains_last_write() {
        let mut store = RosterStore::open_in_memory().unwrap();
        store.put(&bus("b1", "Bus 1")).unwrap();
        store.put(&bus("b1", "Bus One")).unwrap();

        let busses: Vec<Bus> = store.get_all().unwrap();
        assert_eq!(busses.len(), 1);
        assert_eq!(busses[0].id, "b1");
        assert_eq!(busses[0].name, "Bus One");
    }

    #[test]
    fn test_validation_rejects_before_mutation() {
        let mut store = RosterStore::open_in_memory().unwrap();
        let result = store.put(&bus("b1", "   "));
        assert!(matches!(result, Err(RosterError::Validation(_))));
        assert_eq!(store.count(Table::Busses).unwrap(), 0);
    }

    #[test]
    fn test_delete_bus_cascades_to_assignments() {
        let mut store = RosterStore::open_in_memory().unwrap();
        store.put(&bus("b1", "Bus 1")).unwrap();
        store.put(&student("s1", "Ann")).unwrap();
        store.put(&assignment("a1", "b1", "s1", 1)).unwrap();
        store.put(&assignment("a2", "b1", "s2", 2)).unwrap();

        let deletions = store.delete(Table::Busses, "b1").unwrap();
        assert_eq!(deletions.len(), 3);
        assert!(deletions.contains(&Deletion {
            table: Table::SeatAssignments,
            id: "a1".to_string()
        }));
        assert!(deletions.contains(&Deletion {
            table: Table::Busses,
            id: "b1".to_string()
        }));
        assert_eq!(store.count(Table::SeatAssignments).unwrap(), 0);
        // The student is untouched.
        assert_eq!(store.count(Table::Students).unwrap(), 1);
    }

    #[test]
    fn test_delete_missing_id_is_noop() {
        let mut store = RosterStore::open_in_memory().unwrap();
        let deletions = store.delete(Table::Busses, "ghost").unwrap();
        assert!(deletions.is_empty());
    }

    #[test]
    fn test_get_by_index_bus_route() {
        let mut store = RosterStore::open_in_memory().unwrap();
        store.put(&assignment("a1", "b1", "s1", 1)).unwrap();
        store.put(&assignment("a2", "b2", "s2", 1)).unwrap();

        let hits: Vec<SeatAssignment> = store
            .get_by_index(IndexKey::BusRoute {
                bus_id: "b1",
                route: Route::Am,
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a1");

        let misses: Vec<SeatAssignment> = store
            .get_by_index(IndexKey::BusRoute {
                bus_id: "b1",
                route: Route::Pm,
            })
            .unwrap();
        assert!(misses.is_empty());
    }

    #[test]
    fn test_index_key_rejected_for_wrong_table() {
        let store = RosterStore::open_in_memory().unwrap();
        let result: Result<Vec<Bus>> = store.get_by_index(IndexKey::BusRoute {
            bus_id: "b1",
            route: Route::Am,
        });
        assert!(matches!(result, Err(RosterError::InvalidInput(_))));
    }

    #[test]
    fn test_upsert_value_is_idempotent() {
        let mut store = RosterStore::open_in_memory().unwrap();
        let doc = serde_json::to_value(student("s1", "Ann")).unwrap();
        store.upsert_value(Table::Students, "s1", &doc).unwrap();
        store.upsert_value(Table::Students, "s1", &doc).unwrap();

        let students: Vec<Student> = store.get_all().unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].first_name, "Ann");
    }

    #[test]
    fn test_replace_all_swaps_snapshot() {
        let mut store = RosterStore::open_in_memory().unwrap();
        store.put(&bus("old", "Old Bus")).unwrap();

        let doc = serde_json::to_value(bus("new", "New Bus")).unwrap();
        store
            .replace_all(vec![(Table::Busses, vec![("new".to_string(), doc)])])
            .unwrap();

        let busses: Vec<Bus> = store.get_all().unwrap();
        assert_eq!(busses.len(), 1);
        assert_eq!(busses[0].id, "new");
    }
}
