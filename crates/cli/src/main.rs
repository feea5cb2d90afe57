mod annotate;
mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;

use cardiovar_infra::{Settings, SqliteCacheStore};

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    if cli.log_json {
        cardiovar_observability::init();
    } else {
        cardiovar_observability::init_pretty();
    }

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    tracing::debug!(db = %settings.cache.db_path.display(), "settings loaded");

    let cache = open_cache(&settings)?;
    match cli.command {
        Commands::Cache(args) => commands::cache::run(&cache, args.command),
        Commands::Fetch(args) => commands::fetch::run(&settings, cache, args),
        Commands::Annotate(args) => commands::jobs::annotate(&settings, cache, args),
        Commands::Batch(args) => commands::jobs::batch(&settings, cache, args),
    }
}

fn open_cache(settings: &Settings) -> Result<SqliteCacheStore> {
    SqliteCacheStore::open(&settings.cache.db_path, settings.default_ttl())
        .with_context(|| format!("failed to open cache at {}", settings.cache.db_path.display()))
}

/// Pretty JSON on stdout.
pub(crate) fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
