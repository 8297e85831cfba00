//! Student roster commands.

use uuid::Uuid;

use busboard_core::{Student, Table};

use crate::app::open_session;
use crate::cli::{Cli, StudentCommands};

pub async fn handle(cli: &Cli, command: StudentCommands) -> anyhow::Result<()> {
    let mut session = open_session(cli).await?;
    match command {
        StudentCommands::Add(args) => {
            let student = session
                .app
                .put_record(Student {
                    id: Uuid::new_v4().to_string(),
                    first_name: args.first,
                    last_name: args.last,
                    grade: args.grade,
                    bus_am: args.bus_am,
                    bus_pm: args.bus_pm,
                    address: args.address,
                    parent_name: args.parent,
                    home_phone: args.phone,
                    ..Default::default()
                })
                .await?;
            if !session.quiet {
                println!(
                    "Added student {} {} ({})",
                    student.first_name, student.last_name, student.id
                );
            }
        }
        StudentCommands::List => {
            let students: Vec<Student> = session.app.store().get_all()?;
            if !session.quiet {
                println!("ID | NAME | GRADE | AM | PM");
            }
            for s in students {
                println!(
                    "{} | {} {} | {} | {} | {}",
                    s.id,
                    s.first_name,
                    s.last_name,
                    s.grade,
                    s.bus_am.as_deref().unwrap_or("-"),
                    s.bus_pm.as_deref().unwrap_or("-"),
                );
            }
        }
        StudentCommands::Rm { id } => {
            let deletions = session.app.delete_record(Table::Students, &id).await?;
            if deletions.is_empty() {
                return Err(anyhow::anyhow!("Student {} not found", id));
            }
            if !session.quiet {
                println!("Removed {} record(s)", deletions.len());
            }
        }
    }
    Ok(())
}
