//! Application wiring for command handlers.
//!
//! Bundles the loaded config with the opened engine so handlers don't thread
//! paths and flags around, mirroring the data flow: open the local store
//! first, then try the remote within a bounded wait, and carry on offline if
//! it doesn't answer.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dialoguer::Password;
use secrecy::SecretString;

use busboard_core::{
    App, AppOptions, ConnectStatus, HttpRemote, Route, Side, DEFAULT_CONNECT_TIMEOUT,
};

use crate::cli::Cli;
use crate::config::{self, BusboardConfig};

/// A loaded config plus the opened engine.
pub struct Session {
    pub app: App,
    pub connect: Option<ConnectStatus>,
    pub quiet: bool,
}

pub fn config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(PathBuf::from(path)),
        None => config::default_config_path(),
    }
}

/// Open the engine per the config file and try to connect when a remote is
/// configured. Never fails because of the remote: offline is a mode, not an
/// error.
pub async fn open_session(cli: &Cli) -> anyhow::Result<Session> {
    let path = config_path(cli)?;
    let config = BusboardConfig::load(&path)?;

    let mut app = App::open(AppOptions {
        dataset_id: config.sync.dataset_id.clone(),
        store_path: PathBuf::from(&config.store.path),
        key_cache_path: config::default_key_cache_path()?,
    })?;

    let connect = match &config.sync.remote_url {
        Some(url) => {
            let remote = HttpRemote::new(url, &config.sync.dataset_id)?;
            let status = app.connect(Arc::new(remote), DEFAULT_CONNECT_TIMEOUT).await;
            if status == ConnectStatus::Offline && !cli.quiet {
                eprintln!("note: remote unreachable, working offline");
            }
            Some(status)
        }
        None => None,
    };

    Ok(Session {
        app,
        connect,
        quiet: cli.quiet,
    })
}

pub fn prompt_password(prompt: &str) -> anyhow::Result<SecretString> {
    if let Ok(value) = std::env::var("BUSBOARD_PASSWORD") {
        if !value.trim().is_empty() {
            return Ok(SecretString::from(value));
        }
    }
    let value = Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))?;
    Ok(SecretString::from(value))
}

pub fn prompt_new_password(prompt: &str) -> anyhow::Result<SecretString> {
    if let Ok(value) = std::env::var("BUSBOARD_PASSWORD") {
        if !value.trim().is_empty() {
            return Ok(SecretString::from(value));
        }
    }
    let value = Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))?;
    Ok(SecretString::from(value))
}

pub fn parse_route(value: &str) -> anyhow::Result<Route> {
    Route::parse(value).ok_or_else(|| anyhow::anyhow!("Invalid route: {} (use AM or PM)", value))
}

pub fn parse_side(value: &str) -> anyhow::Result<Side> {
    Side::parse(value).ok_or_else(|| anyhow::anyhow!("Invalid side: {} (use left or right)", value))
}

/// Parse a `--date` value, defaulting to today.
pub fn parse_date(value: Option<&str>) -> anyhow::Result<NaiveDate> {
    match value {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("Invalid date (expected YYYY-MM-DD): {}", e)),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_and_side() {
        assert_eq!(parse_route("AM").unwrap(), Route::Am);
        assert_eq!(parse_route("pm").unwrap(), Route::Pm);
        assert!(parse_route("midday").is_err());

        assert_eq!(parse_side("left").unwrap(), Side::Left);
        assert!(parse_side("middle").is_err());
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date(Some("2024-09-03")).unwrap();
        assert_eq!(date.to_string(), "2024-09-03");
        assert!(parse_date(Some("09/03/2024")).is_err());
        // Default is today, whatever that is.
        assert!(parse_date(None).is_ok());
    }
}
