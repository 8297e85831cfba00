//! Backup export/import commands.

use std::path::Path;

use busboard_core::backup::{read_backup_file, write_backup_file};

use crate::app::open_session;
use crate::cli::{BackupCommands, Cli};

pub async fn handle(cli: &Cli, command: BackupCommands) -> anyhow::Result<()> {
    let mut session = open_session(cli).await?;
    match command {
        BackupCommands::Export { path } => {
            let backup = session.app.export_backup()?;
            write_backup_file(Path::new(&path), &backup)?;
            if !session.quiet {
                println!("Exported {} record(s) to {}", backup.record_count(), path);
            }
        }
        BackupCommands::Import { path } => {
            let backup = read_backup_file(Path::new(&path))?;
            let pushed = session.app.import_backup(&backup).await?;
            if !session.quiet {
                println!("Imported {} record(s)", backup.record_count());
                if session.app.is_online() {
                    println!("Pushed {} document(s) to the remote", pushed);
                } else {
                    println!("Offline; run `busboard sync resync` once connected");
                }
            }
        }
    }
    Ok(())
}
