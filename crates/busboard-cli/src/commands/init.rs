//! Initialize configuration and the local store.

use std::path::PathBuf;

use busboard_core::RosterStore;

use crate::app::config_path;
use crate::cli::{Cli, InitArgs};
use crate::config::{self, BusboardConfig};

pub fn handle(cli: &Cli, args: InitArgs) -> anyhow::Result<()> {
    if args.dataset.trim().is_empty() {
        return Err(anyhow::anyhow!("Dataset id cannot be empty"));
    }

    let path = config_path(cli)?;
    if path.exists() {
        return Err(anyhow::anyhow!(
            "Config already exists at {}; remove it to re-initialize",
            path.display()
        ));
    }

    let store_path = match args.store {
        Some(ref value) => PathBuf::from(value),
        None => config::default_store_path()?,
    };

    let config = BusboardConfig::new(store_path.clone(), args.dataset.clone(), args.remote);
    config.save(&path)?;

    // Create the store now so the first real command doesn't have to.
    RosterStore::open(&store_path)?;

    if !cli.quiet {
        println!("Initialized busboard for dataset \"{}\"", args.dataset);
        println!("- config: {}", path.display());
        println!("- store:  {}", store_path.display());
        match &config.sync.remote_url {
            Some(url) => println!("- remote: {}", url),
            None => println!("- remote: (local-only)"),
        }
    }
    Ok(())
}
