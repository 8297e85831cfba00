//! Bus management commands.

use chrono::Utc;
use uuid::Uuid;

use busboard_core::{Bus, Table};

use crate::app::open_session;
use crate::cli::{BusCommands, Cli};

pub async fn handle(cli: &Cli, command: BusCommands) -> anyhow::Result<()> {
    let mut session = open_session(cli).await?;
    match command {
        BusCommands::Add { name } => {
            let bus = session
                .app
                .put_record(Bus {
                    id: Uuid::new_v4().to_string(),
                    name,
                    created_at: Utc::now(),
                })
                .await?;
            if !session.quiet {
                println!("Added bus {} ({})", bus.name, bus.id);
            }
        }
        BusCommands::List => {
            let busses: Vec<Bus> = session.app.store().get_all()?;
            if !session.quiet {
                println!("ID | NAME | CREATED");
            }
            for bus in busses {
                println!("{} | {} | {}", bus.id, bus.name, bus.created_at);
            }
        }
        BusCommands::Rm { id } => {
            let deletions = session.app.delete_record(Table::Busses, &id).await?;
            if deletions.is_empty() {
                return Err(anyhow::anyhow!("Bus {} not found", id));
            }
            if !session.quiet {
                println!("Removed {} record(s)", deletions.len());
            }
        }
    }
    Ok(())
}
