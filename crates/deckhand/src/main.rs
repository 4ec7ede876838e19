//! deckhand - Addon hook orchestration CLI
//!
//! Resolves addon dependencies, installs addons, triggers lifecycle hooks
//! and follows deployment logs.

use anyhow::{Context, Result};
use clap::Parser;
use deckhand_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let directive = if verbose { "deckhand=debug" } else { "deckhand=info" };
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so --json output on stdout stays parseable
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json)?;

    let config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Addons(cmd) => commands::addons::execute(cmd, config).await,
        Commands::Hooks(cmd) => commands::hooks::execute(cmd, config).await,
        Commands::Logs(cmd) => commands::logs::execute(cmd, &config).await,
        Commands::Metrics(cmd) => commands::metrics::execute(cmd, &config).await,
        Commands::Diagnose { error, json } => commands::diagnose::execute(&error, json),
        Commands::Config(cmd) => commands::config::execute(cmd, &config),
        Commands::Version => {
            println!("deckhand {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
