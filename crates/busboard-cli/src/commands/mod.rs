//! Command handlers, one module per command group.

mod backup;
mod bus;
mod checkin;
mod encryption;
mod init;
mod route;
mod seat;
mod student;
mod sync;

use crate::cli::{Cli, Commands};

pub async fn run(mut cli: Cli) -> anyhow::Result<()> {
    let command = match cli.command.take() {
        Some(command) => command,
        None => {
            println!("Busboard v{}", busboard_core::VERSION);
            println!("\nRun `busboard --help` for usage information.");
            return Ok(());
        }
    };

    match command {
        Commands::Init(args) => init::handle(&cli, args),
        Commands::Bus { command } => bus::handle(&cli, command).await,
        Commands::Student { command } => student::handle(&cli, command).await,
        Commands::Seat { command } => seat::handle(&cli, command).await,
        Commands::Checkin { command } => checkin::handle(&cli, command).await,
        Commands::Route { command } => route::handle(&cli, command).await,
        Commands::Sync { command } => sync::handle(&cli, command).await,
        Commands::Encryption { command } => encryption::handle(&cli, command).await,
        Commands::Backup { command } => backup::handle(&cli, command).await,
    }
}
