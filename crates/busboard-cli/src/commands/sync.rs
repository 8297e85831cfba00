//! Sync commands: pull, watch, resync, status.

use busboard_core::{ConnectStatus, KeyStatus, RosterError};

use crate::app::{open_session, prompt_password, Session};
use crate::cli::{Cli, SyncCommands};

pub async fn handle(cli: &Cli, command: SyncCommands) -> anyhow::Result<()> {
    let mut session = open_session(cli).await?;
    match command {
        SyncCommands::Now => {
            let summary = pull_with_unlock(&mut session).await?;
            if !session.quiet {
                println!("Applied {} remote document(s)", summary.len());
            }
        }
        SyncCommands::Watch => {
            pull_with_unlock(&mut session).await?;
            let mut feed = session.app.watch_remote().await?;
            if !session.quiet {
                println!("Watching for remote changes (ctrl-c to stop)...");
            }
            loop {
                tokio::select! {
                    change = feed.recv() => {
                        let change = match change {
                            Some(change) => change,
                            None => break,
                        };
                        match session.app.apply_remote_change(change) {
                            Ok(Some(applied)) => {
                                if !session.quiet {
                                    let verb = if applied.removed { "removed" } else { "updated" };
                                    println!("{} {}/{}", verb, applied.table, applied.id);
                                }
                            }
                            Ok(None) => {}
                            Err(RosterError::WrongPassword) => {
                                session.app.discard_key()?;
                                return Err(anyhow::anyhow!(
                                    "The dataset key changed; run `busboard encryption unlock`"
                                ));
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        SyncCommands::Resync => {
            let pushed = session.app.resync_all().await?;
            if !session.quiet {
                println!("Pushed {} local document(s)", pushed);
            }
        }
        SyncCommands::Status => {
            if !session.quiet {
                println!("Dataset: {}", session.app.dataset_id());
                match session.connect {
                    Some(ConnectStatus::Online { key }) => {
                        println!("Remote: online");
                        match key {
                            KeyStatus::Unencrypted => println!("Encryption: not enabled"),
                            KeyStatus::Ready { version } => {
                                println!("Encryption: unlocked (key version {})", version)
                            }
                            KeyStatus::LockRequired { published_version } => println!(
                                "Encryption: locked (published key version {})",
                                published_version
                            ),
                        }
                    }
                    Some(ConnectStatus::Offline) => println!("Remote: offline"),
                    None => println!("Remote: not configured (local-only)"),
                }
            }
        }
    }
    Ok(())
}

/// Pull everything, prompting for the password once when the dataset is
/// locked. Remote unavailability is a status, not a failure.
async fn pull_with_unlock(
    session: &mut Session,
) -> anyhow::Result<busboard_core::PullSummary> {
    match session.app.sync_now().await {
        Ok(summary) => Ok(summary),
        Err(RosterError::WrongPassword) => {
            let password = prompt_password("Dataset password")?;
            let summary = session.app.unlock(&password).await.map_err(|e| match e {
                RosterError::WrongPassword => anyhow::anyhow!("Wrong password"),
                other => anyhow::Error::from(other),
            })?;
            Ok(summary)
        }
        Err(RosterError::RemoteUnavailable(reason)) => {
            if !session.quiet {
                eprintln!("note: remote unavailable ({}); working offline", reason);
            }
            Ok(busboard_core::PullSummary::default())
        }
        Err(e) => Err(e.into()),
    }
}
