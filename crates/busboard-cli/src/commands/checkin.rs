//! Boarding checkin commands.

use busboard_core::{Checkin, CheckinToggle, IndexKey};

use crate::app::{open_session, parse_date, parse_route};
use crate::cli::{CheckinCommands, Cli};

pub async fn handle(cli: &Cli, command: CheckinCommands) -> anyhow::Result<()> {
    let mut session = open_session(cli).await?;
    match command {
        CheckinCommands::Toggle {
            bus,
            route,
            student,
            date,
        } => {
            let route = parse_route(&route)?;
            let date = parse_date(date.as_deref())?;
            let toggle = session
                .app
                .toggle_checkin(&bus, route, &student, date)
                .await?;
            if !session.quiet {
                match toggle {
                    CheckinToggle::CheckedIn(checkin) => {
                        if checkin.is_extra {
                            println!("Checked in {} on {} (extra, no seat)", student, date);
                        } else {
                            println!("Checked in {} on {}", student, date);
                        }
                    }
                    CheckinToggle::CheckedOut { .. } => {
                        println!("Checked out {} on {}", student, date);
                    }
                }
            }
        }
        CheckinCommands::List { bus, route, date } => {
            let route = parse_route(&route)?;
            let date = parse_date(date.as_deref())?;
            let checkins: Vec<Checkin> = session.app.store().get_by_index(
                IndexKey::BusDateRoute {
                    bus_id: &bus,
                    date,
                    route,
                },
            )?;
            if !session.quiet {
                println!("STUDENT | TIME | EXTRA");
            }
            for c in checkins {
                println!(
                    "{} | {} | {}",
                    c.student_id,
                    c.timestamp,
                    if c.is_extra { "yes" } else { "no" }
                );
            }
        }
    }
    Ok(())
}
