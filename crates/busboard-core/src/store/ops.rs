//! Domain operations over the store.
//!
//! These enforce the roster invariants that plain upserts cannot: one seat per
//! student per route, one checkin per student per day, dense route-sheet
//! ordering. Each operation runs in a single transaction and returns every
//! record it created, changed, or removed so the caller can propagate the
//! whole outcome to the remote collection.

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{Result, RosterError};
use crate::model::{Checkin, Record, Route, RouteRow, SeatAssignment, Side, Table};

use super::{delete_row, docs_by_index, row_doc, upsert_row, Deletion, IndexKey, RosterStore};

/// A seat position on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatLocation {
    pub row: i64,
    pub side: Side,
    pub position: i64,
}

/// Result of assigning a student to a seat.
#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    /// The assignment now occupying the seat.
    pub assignment: SeatAssignment,

    /// Id of the student's prior assignment on this route, removed in the
    /// same transaction. The caller must push this deletion remotely.
    pub displaced: Option<String>,
}

/// Result of toggling a checkin.
#[derive(Debug, Clone)]
pub enum CheckinToggle {
    CheckedIn(Checkin),
    CheckedOut { id: String },
}

impl RosterStore {
    /// Assign a student to a seat on `(bus, route)`.
    ///
    /// Rejects with a validation error when another student already occupies
    /// the seat. The student's prior assignment on this route, if any, is
    /// removed in the same transaction. Re-assigning a student to their own
    /// current seat is a no-op.
    pub fn assign_student_to_seat(
        &mut self,
        bus_id: &str,
        route: Route,
        student_id: &str,
        seat: SeatLocation,
    ) -> Result<AssignmentOutcome> {
        if seat.row < 1 || seat.position < 1 {
            return Err(RosterError::Validation(
                "Seat row and position are 1-based".to_string(),
            ));
        }

        let tx = self.conn.transaction()?;
        require_exists(&tx, Table::Busses, bus_id)?;
        require_exists(&tx, Table::Students, student_id)?;

        let assignments = decode_all::<SeatAssignment>(docs_by_index(
            &tx,
            Table::SeatAssignments,
            IndexKey::BusRoute { bus_id, route },
        )?)?;

        if let Some(occupant) = assignments
            .iter()
            .find(|a| a.row == seat.row && a.side == seat.side && a.position == seat.position)
        {
            if occupant.student_id == student_id {
                return Ok(AssignmentOutcome {
                    assignment: occupant.clone(),
                    displaced: None,
                });
            }
            return Err(RosterError::Validation(format!(
                "Seat row {} {} position {} is already occupied",
                seat.row,
                seat.side.as_str(),
                seat.position
            )));
        }

        let mut displaced = None;
        if let Some(prior) = assignments.iter().find(|a| a.student_id == student_id) {
            delete_row(&tx, Table::SeatAssignments, &prior.id)?;
            displaced = Some(prior.id.clone());
        }

        let assignment = SeatAssignment {
            id: Uuid::new_v4().to_string(),
            bus_id: bus_id.to_string(),
            route,
            student_id: student_id.to_string(),
            row: seat.row,
            side: seat.side,
            position: seat.position,
            assigned_at: Utc::now(),
        };
        upsert_row(
            &tx,
            Table::SeatAssignments,
            &assignment.id,
            &serde_json::to_value(&assignment)?,
        )?;
        tx.commit()?;

        Ok(AssignmentOutcome {
            assignment,
            displaced,
        })
    }

    /// Toggle a student's checkin for `(bus, route, date)`.
    ///
    /// Creates the checkin when absent (marking `isExtra` when the student has
    /// no seat assignment on that route), deletes it when present.
    pub fn toggle_checkin(
        &mut self,
        bus_id: &str,
        route: Route,
        student_id: &str,
        date: NaiveDate,
    ) -> Result<CheckinToggle> {
        let tx = self.conn.transaction()?;
        require_exists(&tx, Table::Busses, bus_id)?;
        require_exists(&tx, Table::Students, student_id)?;

        let existing = decode_all::<Checkin>(docs_by_index(
            &tx,
            Table::Checkins,
            IndexKey::BusDateRoute {
                bus_id,
                date,
                route,
            },
        )?)?;

        if let Some(checkin) = existing.iter().find(|c| c.student_id == student_id) {
            delete_row(&tx, Table::Checkins, &checkin.id)?;
            tx.commit()?;
            return Ok(CheckinToggle::CheckedOut {
                id: checkin.id.clone(),
            });
        }

        let assignments = decode_all::<SeatAssignment>(docs_by_index(
            &tx,
            Table::SeatAssignments,
            IndexKey::BusRoute { bus_id, route },
        )?)?;
        let has_seat = assignments.iter().any(|a| a.student_id == student_id);

        let checkin = Checkin {
            id: Uuid::new_v4().to_string(),
            bus_id: bus_id.to_string(),
            route,
            student_id: student_id.to_string(),
            date,
            timestamp: Utc::now(),
            is_extra: !has_seat,
        };
        upsert_row(
            &tx,
            Table::Checkins,
            &checkin.id,
            &serde_json::to_value(&checkin)?,
        )?;
        tx.commit()?;

        Ok(CheckinToggle::CheckedIn(checkin))
    }

    /// Insert a route row at its requested `order`, shifting later stops.
    ///
    /// Returns every row whose stored order changed, the inserted row
    /// included. All of them need a remote push.
    pub fn insert_route_row(&mut self, row: RouteRow) -> Result<Vec<RouteRow>> {
        row.validate()?;
        let new_id = row.id.clone();
        let bus_id = row.bus_id.clone();
        let route = row.route;

        let tx = self.conn.transaction()?;
        require_exists(&tx, Table::Busses, &bus_id)?;

        let mut sequence = decode_all::<RouteRow>(docs_by_index(
            &tx,
            Table::RouteRows,
            IndexKey::BusRoute {
                bus_id: &bus_id,
                route,
            },
        )?)?;
        let index = ((row.order - 1).max(0) as usize).min(sequence.len());
        sequence.insert(index, row);

        let changed = resequence(&tx, sequence, Some(&new_id))?;
        tx.commit()?;
        Ok(changed)
    }

    /// Move an existing route row to a new position in its route sheet.
    pub fn move_route_row(&mut self, id: &str, new_order: i64) -> Result<Vec<RouteRow>> {
        let tx = self.conn.transaction()?;
        let target: RouteRow = match row_doc(&tx, Table::RouteRows, id)? {
            Some(doc) => serde_json::from_value(doc)
                .map_err(|e| RosterError::Storage(format!("Corrupt record: {}", e)))?,
            None => return Err(RosterError::NotFound(format!("Route row {}", id))),
        };

        let mut sequence = decode_all::<RouteRow>(docs_by_index(
            &tx,
            Table::RouteRows,
            IndexKey::BusRoute {
                bus_id: &target.bus_id,
                route: target.route,
            },
        )?)?;
        sequence.retain(|r| r.id != id);
        let index = ((new_order - 1).max(0) as usize).min(sequence.len());
        sequence.insert(index, target);

        let changed = resequence(&tx, sequence, None)?;
        tx.commit()?;
        Ok(changed)
    }

    /// Delete a route row and close the gap it leaves.
    ///
    /// Returns the deletion plus every row renumbered by the compaction.
    pub fn remove_route_row(&mut self, id: &str) -> Result<(Vec<Deletion>, Vec<RouteRow>)> {
        let tx = self.conn.transaction()?;
        let target: RouteRow = match row_doc(&tx, Table::RouteRows, id)? {
            Some(doc) => serde_json::from_value(doc)
                .map_err(|e| RosterError::Storage(format!("Corrupt record: {}", e)))?,
            None => return Ok((Vec::new(), Vec::new())),
        };

        delete_row(&tx, Table::RouteRows, id)?;
        let sequence = decode_all::<RouteRow>(docs_by_index(
            &tx,
            Table::RouteRows,
            IndexKey::BusRoute {
                bus_id: &target.bus_id,
                route: target.route,
            },
        )?)?;
        let changed = resequence(&tx, sequence, None)?;
        tx.commit()?;

        let deletions = vec![Deletion {
            table: Table::RouteRows,
            id: id.to_string(),
        }];
        Ok((deletions, changed))
    }
}

/// Rewrite `order` to the dense sequence 1..=n, persisting rows that moved.
///
/// `force_id` is always written even when its order happens to match (a newly
/// inserted row has no stored copy yet).
fn resequence(
    conn: &Connection,
    mut sequence: Vec<RouteRow>,
    force_id: Option<&str>,
) -> Result<Vec<RouteRow>> {
    let mut changed = Vec::new();
    for (index, row) in sequence.iter_mut().enumerate() {
        let expected = (index + 1) as i64;
        let forced = force_id == Some(row.id.as_str());
        if row.order != expected || forced {
            row.order = expected;
            upsert_row(conn, Table::RouteRows, &row.id, &serde_json::to_value(&*row)?)?;
            changed.push(row.clone());
        }
    }
    Ok(changed)
}

fn require_exists(conn: &Connection, table: Table, id: &str) -> Result<()> {
    if row_doc(conn, table, id)?.is_none() {
        return Err(RosterError::NotFound(format!("{} {}", table, id)));
    }
    Ok(())
}

fn decode_all<R: Record>(docs: Vec<serde_json::Value>) -> Result<Vec<R>> {
    docs.into_iter()
        .map(|doc| {
            serde_json::from_value(doc)
                .map_err(|e| RosterError::Storage(format!("Corrupt record: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bus, Student};

    fn seeded_store() -> RosterStore {
        let mut store = RosterStore::open_in_memory().unwrap();
        store
            .put(&Bus {
                id: "b1".to_string(),
                name: "Bus 1".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        for id in ["s1", "s2"] {
            store
                .put(&Student {
                    id: id.to_string(),
                    first_name: id.to_string(),
                    last_name: "Tester".to_string(),
                    ..Default::default()
                })
                .unwrap();
        }
        store
    }

    fn seat(row: i64, side: Side, position: i64) -> SeatLocation {
        SeatLocation {
            row,
            side,
            position,
        }
    }

    fn route_row(id: &str, order: i64) -> RouteRow {
        RouteRow {
            id: id.to_string(),
            bus_id: "b1".to_string(),
            route: Route::Am,
            order,
            action: "pickup".to_string(),
            direction: String::new(),
            street_address: String::new(),
            student_id: None,
            student_name: String::new(),
            roadside: String::new(),
            time: String::new(),
        }
    }

    #[test]
    fn test_reassign_moves_student_to_second_seat() {
        let mut store = seeded_store();

        let first = store
            .assign_student_to_seat("b1", Route::Am, "s1", seat(1, Side::Left, 1))
            .unwrap();
        assert!(first.displaced.is_none());

        let second = store
            .assign_student_to_seat("b1", Route::Am, "s1", seat(3, Side::Right, 2))
            .unwrap();
        assert_eq!(second.displaced.as_deref(), Some(first.assignment.id.as_str()));

        let assignments: Vec<SeatAssignment> = store
            .get_by_index(IndexKey::BusRoute {
                bus_id: "b1",
                route: Route::Am,
            })
            .unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].row, 3);
        assert_eq!(assignments[0].side, Side::Right);
    }

    #[test]
    fn test_occupied_seat_is_rejected() {
        let mut store = seeded_store();
        store
            .assign_student_to_seat("b1", Route::Am, "s1", seat(1, Side::Left, 1))
            .unwrap();

        let result = store.assign_student_to_seat("b1", Route::Am, "s2", seat(1, Side::Left, 1));
        assert!(matches!(result, Err(RosterError::Validation(_))));

        // The rejected write changed nothing.
        let assignments: Vec<SeatAssignment> = store
            .get_by_index(IndexKey::BusRoute {
                bus_id: "b1",
                route: Route::Am,
            })
            .unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].student_id, "s1");
    }

    #[test]
    fn test_same_seat_reassignment_is_noop() {
        let mut store = seeded_store();
        let first = store
            .assign_student_to_seat("b1", Route::Am, "s1", seat(2, Side::Left, 1))
            .unwrap();
        let again = store
            .assign_student_to_seat("b1", Route::Am, "s1", seat(2, Side::Left, 1))
            .unwrap();
        assert_eq!(again.assignment.id, first.assignment.id);
        assert!(again.displaced.is_none());
    }

    #[test]
    fn test_routes_are_independent_for_assignments() {
        let mut store = seeded_store();
        store
            .assign_student_to_seat("b1", Route::Am, "s1", seat(1, Side::Left, 1))
            .unwrap();
        store
            .assign_student_to_seat("b1", Route::Pm, "s1", seat(5, Side::Right, 1))
            .unwrap();

        let am: Vec<SeatAssignment> = store
            .get_by_index(IndexKey::BusRoute {
                bus_id: "b1",
                route: Route::Am,
            })
            .unwrap();
        assert_eq!(am.len(), 1);
        assert_eq!(am[0].row, 1);
    }

    #[test]
    fn test_toggle_checkin_twice_returns_to_unchecked() {
        let mut store = seeded_store();
        let date = NaiveDate::from_ymd_opt(2024, 9, 3).unwrap();

        let on = store
            .toggle_checkin("b1", Route::Am, "s1", date)
            .unwrap();
        let id = match on {
            CheckinToggle::CheckedIn(ref c) => c.id.clone(),
            CheckinToggle::CheckedOut { .. } => panic!("expected checkin"),
        };
        assert_eq!(store.count(Table::Checkins).unwrap(), 1);

        let off = store
            .toggle_checkin("b1", Route::Am, "s1", date)
            .unwrap();
        match off {
            CheckinToggle::CheckedOut { id: removed } => assert_eq!(removed, id),
            CheckinToggle::CheckedIn(_) => panic!("expected removal"),
        }
        assert_eq!(store.count(Table::Checkins).unwrap(), 0);
    }

    #[test]
    fn test_checkin_without_seat_is_extra() {
        let mut store = seeded_store();
        let date = NaiveDate::from_ymd_opt(2024, 9, 3).unwrap();
        store
            .assign_student_to_seat("b1", Route::Am, "s1", seat(1, Side::Left, 1))
            .unwrap();

        match store.toggle_checkin("b1", Route::Am, "s1", date).unwrap() {
            CheckinToggle::CheckedIn(c) => assert!(!c.is_extra),
            CheckinToggle::CheckedOut { .. } => panic!("expected checkin"),
        }
        match store.toggle_checkin("b1", Route::Am, "s2", date).unwrap() {
            CheckinToggle::CheckedIn(c) => assert!(c.is_extra),
            CheckinToggle::CheckedOut { .. } => panic!("expected checkin"),
        }
    }

    #[test]
    fn test_insert_route_row_resequences_dense() {
        let mut store = seeded_store();
        store.insert_route_row(route_row("r1", 1)).unwrap();
        store.insert_route_row(route_row("r2", 2)).unwrap();

        // Insert at the front; the two existing rows shift down.
        let changed = store.insert_route_row(route_row("r3", 1)).unwrap();
        assert_eq!(changed.len(), 3);

        let rows: Vec<RouteRow> = store
            .get_by_index(IndexKey::BusRoute {
                bus_id: "b1",
                route: Route::Am,
            })
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r3", "r1", "r2"]);
        let orders: Vec<i64> = rows.iter().map(|r| r.order).collect();
        assert_eq!(orders, [1, 2, 3]);
    }

    #[test]
    fn test_move_and_remove_route_row_keep_order_dense() {
        let mut store = seeded_store();
        for (id, order) in [("r1", 1), ("r2", 2), ("r3", 3)] {
            store.insert_route_row(route_row(id, order)).unwrap();
        }

        store.move_route_row("r3", 1).unwrap();
        let rows: Vec<RouteRow> = store
            .get_by_index(IndexKey::BusRoute {
                bus_id: "b1",
                route: Route::Am,
            })
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r3", "r1", "r2"]);

        let (deletions, changed) = store.remove_route_row("r3").unwrap();
        assert_eq!(deletions.len(), 1);
        assert_eq!(changed.len(), 2);
        let rows: Vec<RouteRow> = store
            .get_by_index(IndexKey::BusRoute {
                bus_id: "b1",
                route: Route::Am,
            })
            .unwrap();
        let orders: Vec<i64> = rows.iter().map(|r| r.order).collect();
        assert_eq!(orders, [1, 2]);
    }
}
