//! Voxshift CLI - Voice-Effect Audio Processing
//!
//! Command-line interface for the Voxshift engine.

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use voxshift::cli::{commands, Cli, Commands};
use voxshift::{EngineConfig, Processor, VoxError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --verbose wins over RUST_LOG; otherwise RUST_LOG, then info
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        if let Some(hint) = err
            .downcast_ref::<VoxError>()
            .and_then(VoxError::recovery_suggestion)
        {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        println!("Voxshift v{}", env!("CARGO_PKG_VERSION"));
        println!("Use --help for available commands");
        return Ok(());
    };

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(root) = cli.storage {
        config.storage.root = root;
    }
    debug!(?config, "Configuration resolved");

    let processor = Processor::new(&config)
        .with_context(|| format!("opening storage at {}", config.storage.root.display()))?;
    info!("Voxshift v{}", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Upload { path } => commands::upload(&processor, &config.upload, &path)
            .await
            .with_context(|| format!("uploading {}", path.display()))?,
        Commands::Process { filename, effect } => commands::process(&processor, &filename, &effect)
            .await
            .with_context(|| format!("applying '{}' to {}", effect, filename))?,
        Commands::List { json } => commands::list(&processor, json)?,
        Commands::Delete { filename } => commands::delete(&processor, &filename)
            .await
            .with_context(|| format!("deleting {}", filename))?,
        Commands::Effects => commands::effects(&processor),
        Commands::Export { filename, dest } => commands::export(&processor, &filename, &dest)
            .with_context(|| format!("exporting {}", filename))?,
    }

    Ok(())
}
