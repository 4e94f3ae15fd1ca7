//! CLI entry point for bookloft.

use std::sync::Arc;

use anyhow::{Context, Result};
use bookloft_core::archive::ReadabilityChecker;
use bookloft_core::catalog::{Catalog, OaiHarvester};
use bookloft_core::config::EngineConfig;
use bookloft_core::search::{Aggregator, SearchOptions};
use bookloft_core::server::{AppState, router};
use clap::Parser;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so `bookloft search` output stays pipeable JSON.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut config = EngineConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    debug!(?config, "configuration resolved");

    match args.command() {
        Command::Serve { bind, harvest } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            config.harvest_on_start |= harvest;
            serve(config).await
        }
        Command::Search {
            query,
            page,
            ranked,
            no_probe,
        } => {
            let options = SearchOptions {
                page,
                ranked,
                probe: !no_probe,
            };
            search_once(&config, &query.join(" "), options).await
        }
    }
}

async fn serve(config: EngineConfig) -> Result<()> {
    let catalog = Arc::new(Catalog::new());
    let state = AppState::from_config(&config, Arc::clone(&catalog)).context("failed to initialize server")?;
    info!(sources = ?state.aggregator.source_names(), "bookloft starting");

    if config.harvest_on_start {
        spawn_harvest(&config, catalog);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("bookloft stopped");
    Ok(())
}

fn spawn_harvest(config: &EngineConfig, catalog: Arc<Catalog>) {
    let harvester = match OaiHarvester::with_base_url(config.harvest_endpoint.clone()) {
        Ok(harvester) => harvester.with_max_pages(config.harvest_max_pages),
        Err(error) => {
            warn!(error = %error, "catalog harvest disabled: client unavailable");
            return;
        }
    };
    tokio::spawn(async move {
        let records = harvester.harvest().await;
        let added = catalog.ingest(records);
        info!(added, total = catalog.len(), "catalog harvest ingested");
    });
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for ctrl-c; shutting down");
    }
    info!("shutdown requested");
}

async fn search_once(config: &EngineConfig, query: &str, options: SearchOptions) -> Result<()> {
    let checker = ReadabilityChecker::from_config(config).context("failed to build archive clients")?;
    let aggregator = Aggregator::from_config(config, checker);
    let outcome = aggregator.search(query, options).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
