//! Load generator for the stats engine.
//!
//! `grindstone` registers the views described in its configuration file, hammers them from a fixed number of producer
//! threads with seeded, reproducible batches, and then reports how quickly the engine drained its queue along with the
//! final contents of every view. Running the same file twice records exactly the same batches.

#![deny(warnings)]
#![deny(missing_docs)]

use std::path::PathBuf;

use anyhow::bail;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod config;
use self::config::Config;

mod driver;
use self::driver::Driver;

fn main() {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .with_target(true)
        .init();

    if let Err(e) = run() {
        error!("grindstone failed: {:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), anyhow::Error> {
    let mut args = std::env::args_os().skip(1);
    let (Some(config_path), None) = (args.next().map(PathBuf::from), args.next()) else {
        bail!("Usage: grindstone <path to configuration file>");
    };

    info!(config = %config_path.display(), "Loading configuration.");
    let config = Config::try_from_file(&config_path)?;

    Driver::new(config)?.run()?;

    info!("All producers finished and views reported.");
    Ok(())
}
