//! Encryption admin commands.

use busboard_core::{ConnectStatus, KeyStatus, RosterError};

use crate::app::{open_session, prompt_new_password, prompt_password};
use crate::cli::{Cli, EncryptionCommands};

pub async fn handle(cli: &Cli, command: EncryptionCommands) -> anyhow::Result<()> {
    let mut session = open_session(cli).await?;
    match command {
        EncryptionCommands::Enable => {
            require_online(&session.connect)?;
            let password = prompt_new_password("New dataset password")?;
            session.app.enable_encryption(&password).await?;
            if !session.quiet {
                println!("Encryption enabled (key version 1).");
                println!("Other devices must run `busboard encryption unlock`.");
            }
        }
        EncryptionCommands::Unlock => {
            require_online(&session.connect)?;
            let password = prompt_password("Dataset password")?;
            let summary = session.app.unlock(&password).await.map_err(|e| match e {
                RosterError::WrongPassword => anyhow::anyhow!("Wrong password"),
                other => anyhow::Error::from(other),
            })?;
            if !session.quiet {
                println!(
                    "Unlocked (key version {}); applied {} document(s)",
                    session.app.key_version().unwrap_or_default(),
                    summary.len()
                );
            }
        }
        EncryptionCommands::Rotate => {
            require_online(&session.connect)?;
            let old = prompt_password("Current dataset password")?;
            let new = prompt_new_password("New dataset password")?;
            let version = session
                .app
                .rotate_password(&old, &new)
                .await
                .map_err(|e| match e {
                    RosterError::WrongPassword => anyhow::anyhow!("Wrong current password"),
                    other => anyhow::Error::from(other),
                })?;
            if !session.quiet {
                println!("Rotated; published key version is now {}", version);
                println!("Other devices will be asked to unlock again.");
            }
        }
        EncryptionCommands::Status => {
            if !session.quiet {
                match session.connect {
                    Some(ConnectStatus::Online { key }) => match key {
                        KeyStatus::Unencrypted => println!("Encryption: not enabled"),
                        KeyStatus::Ready { version } => {
                            println!("Encryption: unlocked (key version {})", version)
                        }
                        KeyStatus::LockRequired { published_version } => println!(
                            "Encryption: locked (published key version {}); run `busboard encryption unlock`",
                            published_version
                        ),
                    },
                    Some(ConnectStatus::Offline) => match session.app.key_version() {
                        Some(version) => println!(
                            "Remote offline; cached key version {} (unverified)",
                            version
                        ),
                        None => println!("Remote offline; no cached key"),
                    },
                    None => println!("Remote not configured; encryption does not apply"),
                }
            }
        }
    }
    Ok(())
}

fn require_online(connect: &Option<ConnectStatus>) -> anyhow::Result<()> {
    match connect {
        Some(ConnectStatus::Online { .. }) => Ok(()),
        Some(ConnectStatus::Offline) => Err(anyhow::anyhow!(
            "The remote backend is unreachable; encryption admin needs a connection"
        )),
        None => Err(anyhow::anyhow!(
            "No remote configured; encryption applies to synced datasets only"
        )),
    }
}
