//! Seat assignment commands.

use std::collections::HashMap;

use busboard_core::{IndexKey, SeatAssignment, SeatLocation, Student, Table};

use crate::app::{open_session, parse_route, parse_side};
use crate::cli::{Cli, SeatCommands};

pub async fn handle(cli: &Cli, command: SeatCommands) -> anyhow::Result<()> {
    let mut session = open_session(cli).await?;
    match command {
        SeatCommands::Assign {
            bus,
            route,
            student,
            row,
            side,
            position,
        } => {
            let route = parse_route(&route)?;
            let side = parse_side(&side)?;
            let outcome = session
                .app
                .assign_student_to_seat(
                    &bus,
                    route,
                    &student,
                    SeatLocation {
                        row,
                        side,
                        position,
                    },
                )
                .await?;
            if !session.quiet {
                println!(
                    "Seated student {} at row {} {} position {} ({})",
                    student,
                    outcome.assignment.row,
                    outcome.assignment.side.as_str(),
                    outcome.assignment.position,
                    outcome.assignment.id,
                );
                if outcome.displaced.is_some() {
                    println!("(moved from their previous seat on this route)");
                }
            }
        }
        SeatCommands::Chart { bus, route } => {
            let route = parse_route(&route)?;
            let mut assignments: Vec<SeatAssignment> = session.app.store().get_by_index(
                IndexKey::BusRoute {
                    bus_id: &bus,
                    route,
                },
            )?;
            assignments.sort_by_key(|a| (a.row, a.side.as_str(), a.position));

            let names = student_names(&session.app)?;
            if !session.quiet {
                println!("ROW | SIDE | POS | STUDENT");
            }
            for a in assignments {
                let name = names
                    .get(a.student_id.as_str())
                    .cloned()
                    .unwrap_or_else(|| a.student_id.clone());
                println!("{} | {} | {} | {}", a.row, a.side.as_str(), a.position, name);
            }
        }
        SeatCommands::Rm { id } => {
            let deletions = session
                .app
                .delete_record(Table::SeatAssignments, &id)
                .await?;
            if deletions.is_empty() {
                return Err(anyhow::anyhow!("Seat assignment {} not found", id));
            }
            if !session.quiet {
                println!("Removed seat assignment {}", id);
            }
        }
    }
    Ok(())
}

fn student_names(app: &busboard_core::App) -> anyhow::Result<HashMap<String, String>> {
    let students: Vec<Student> = app.store().get_all()?;
    Ok(students
        .into_iter()
        .map(|s| (s.id.clone(), format!("{} {}", s.first_name, s.last_name)))
        .collect())
}
