//! # press_harvest
//!
//! Harvests articles from subscription news sites into a row-oriented store.
//!
//! ## Usage
//!
//! ```sh
//! PRESS_LOGIN=me@example.com PRESS_PASSWORD=secret press_harvest --profile zeit --count 50
//! ```
//!
//! ## Architecture
//!
//! One run is a three-stage pipeline:
//! 1. **Search**: page through the site's search results and queue article
//!    URLs that are not in the store yet (or all of them with `--update`)
//! 2. **Fetch**: a pool of workers downloads articles and extracts headline,
//!    kicker, lead, subheadings and image captions
//! 3. **Persist**: a single writer appends or updates rows in the store
//!
//! SIGINT or SIGTERM cancels search and fetching; everything already fetched
//! is still written before the process exits.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod scrapers;
mod store;
mod utils;

use cli::Cli;
use pipeline::Pipeline;
use store::jsonl::JsonLinesStore;
use utils::ensure_writable_parent;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    // Parse CLI
    let args = Cli::parse();
    debug!(profile = %args.profile, store = %args.store.display(), "Parsed CLI arguments");

    // --- Configuration: anything wrong here is fatal before work starts ---
    let settings = args.settings()?;
    let adapter = scrapers::build_adapter(&args.profile, &args.source_options(&settings))?;

    ensure_writable_parent(&args.store).await?;
    let store = JsonLinesStore::open(&args.store, settings.flush_every).await?;

    let cancel = CancellationToken::new();
    let pipeline = Arc::new(Pipeline::new(adapter, settings, args.run_options()));

    let mut run = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let cancel = cancel.clone();
        async move { pipeline.run(Box::new(store), cancel).await }
    });

    info!(
        profile = %args.profile,
        count = args.count,
        update = args.update,
        "App started"
    );

    // --- Graceful shutdown ---
    let finished = tokio::select! {
        signal = shutdown_signal() => {
            info!(signal, "Got signal, attempting graceful shutdown");
            None
        }
        joined = &mut run => Some(joined),
    };
    cancel.cancel();
    info!("Context is stopped");

    if let Err(e) = pipeline.shutdown().await {
        warn!(error = %e, "Pipeline shutdown failed");
    } else {
        info!(phase = ?pipeline.phase(), "Parser stopped");
    }

    let outcome = match finished {
        Some(joined) => joined?,
        None => run.await?,
    };

    let elapsed = start_time.elapsed();
    match outcome {
        Ok(summary) => {
            info!(
                ?elapsed,
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                persisted = summary.persisted,
                abandoned = summary.abandoned,
                "App shutting down"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, ?elapsed, "App shutting down after failed run");
            Err(e.into())
        }
    }
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM; only SIGINT will stop the run");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}
