//! Route sheet commands.

use uuid::Uuid;

use busboard_core::{IndexKey, RouteRow};

use crate::app::{open_session, parse_route};
use crate::cli::{Cli, RouteCommands};

pub async fn handle(cli: &Cli, command: RouteCommands) -> anyhow::Result<()> {
    let mut session = open_session(cli).await?;
    match command {
        RouteCommands::Add {
            bus,
            route,
            address,
            action,
            order,
            student,
        } => {
            let route = parse_route(&route)?;
            let order = match order {
                Some(value) => value,
                None => {
                    let existing: Vec<RouteRow> = session.app.store().get_by_index(
                        IndexKey::BusRoute {
                            bus_id: &bus,
                            route,
                        },
                    )?;
                    existing.len() as i64 + 1
                }
            };
            let row = RouteRow {
                id: Uuid::new_v4().to_string(),
                bus_id: bus,
                route,
                order,
                action,
                direction: String::new(),
                street_address: address,
                student_id: student,
                student_name: String::new(),
                roadside: String::new(),
                time: String::new(),
            };
            let id = row.id.clone();
            let changed = session.app.insert_route_row(row).await?;
            if !session.quiet {
                println!("Added stop {} ({} row(s) renumbered)", id, changed.len());
            }
        }
        RouteCommands::List { bus, route } => {
            let route = parse_route(&route)?;
            let rows: Vec<RouteRow> = session.app.store().get_by_index(IndexKey::BusRoute {
                bus_id: &bus,
                route,
            })?;
            if !session.quiet {
                println!("ORDER | ACTION | ADDRESS | STUDENT | ID");
            }
            for row in rows {
                println!(
                    "{} | {} | {} | {} | {}",
                    row.order,
                    row.action,
                    row.street_address,
                    row.student_id.as_deref().unwrap_or("-"),
                    row.id,
                );
            }
        }
        RouteCommands::Move { id, order } => {
            let changed = session.app.move_route_row(&id, order).await?;
            if !session.quiet {
                println!("Moved stop {} ({} row(s) renumbered)", id, changed.len());
            }
        }
        RouteCommands::Rm { id } => {
            let deletions = session.app.remove_route_row(&id).await?;
            if deletions.is_empty() {
                return Err(anyhow::anyhow!("Route row {} not found", id));
            }
            if !session.quiet {
                println!("Removed stop {}", id);
            }
        }
    }
    Ok(())
}
