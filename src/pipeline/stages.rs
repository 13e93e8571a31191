//! The three stage loops run by the orchestrator.
//!
//! ```text
//! search_stage ──items──▶ fetch_worker × N ──records──▶ persist_stage
//! ```
//!
//! Stages talk only through the two bounded channels. A stage ends its
//! part of the pipeline by dropping its channel handle; the next stage sees
//! the channel close and winds down in turn.

use super::budget::RateBudget;
use super::dedup::DedupIndex;
use super::stats::RunStats;
use super::RunOptions;
use crate::error::StoreError;
use crate::models::{CandidateItem, ExtractedRecord};
use crate::scrapers::SourceAdapter;
use crate::store::RecordStore;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Shared receiving end of the search → fetch queue.
pub type ItemReceiver = Arc<Mutex<mpsc::Receiver<CandidateItem>>>;

/// Why the search stage stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEnd {
    /// The item budget was used up.
    BudgetSpent,
    /// The adapter reported no more result pages.
    Exhausted,
    /// A results page failed to load; discovery stops for this run.
    Failed,
    Cancelled,
    /// Every fetch worker had already stopped.
    WorkersGone,
}

/// Why a fetch worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEnd {
    /// The item queue was closed and empty.
    Drained,
    Cancelled,
    /// The rate-limit budget ran out.
    RateLimited,
    /// The persist stage stopped accepting records.
    PersistGone,
}

/// Page through search results and feed accepted items to the workers.
///
/// Items already in `index` are skipped unless `options.update` is set.
/// The sender is dropped on every return path, which closes the queue.
#[instrument(level = "info", skip_all, fields(budget = options.item_budget, update = options.update))]
pub async fn search_stage(
    adapter: Arc<dyn SourceAdapter>,
    index: Arc<DedupIndex>,
    options: RunOptions,
    items: mpsc::Sender<CandidateItem>,
    cancel: CancellationToken,
    stats: Arc<RunStats>,
) -> SearchEnd {
    let mut remaining = options.item_budget;
    if remaining == 0 {
        info!("Item budget is zero; not searching");
        return SearchEnd::BudgetSpent;
    }

    let mut page: u32 = 1;
    loop {
        if cancel.is_cancelled() {
            info!(page, "Search cancelled");
            return SearchEnd::Cancelled;
        }

        let identifiers = match adapter.search_page(page).await {
            Ok(identifiers) => identifiers,
            Err(e) if e.is_not_found() => {
                info!(page, "No more search results");
                return SearchEnd::Exhausted;
            }
            Err(e) => {
                warn!(page, error = %e, "Search articles page failed");
                return SearchEnd::Failed;
            }
        };
        debug!(page, found = identifiers.len(), "Received search page");

        for identifier in identifiers {
            let known_location = index.lookup(&identifier);
            if known_location.is_some() && !options.update {
                stats.record_skipped_known();
                debug!(url = %identifier, "Already stored; skipping");
                continue;
            }

            if items
                .send(CandidateItem::new(identifier, known_location))
                .await
                .is_err()
            {
                warn!(page, "All fetch workers have stopped; ending search");
                return SearchEnd::WorkersGone;
            }
            stats.record_enqueued();

            remaining -= 1;
            if remaining == 0 {
                info!(page, "Item budget spent");
                return SearchEnd::BudgetSpent;
            }
        }
        page += 1;
    }
}

/// Pull items, fetch and extract them, and forward the results.
///
/// Stops when the item queue closes, on cancellation, when the rate budget
/// is exhausted, or when the persist stage has gone away. On budget
/// exhaustion the worker leaves the rest of the queue untouched.
#[instrument(level = "debug", skip_all, fields(worker = id))]
pub async fn fetch_worker(
    id: usize,
    adapter: Arc<dyn SourceAdapter>,
    items: ItemReceiver,
    records: mpsc::Sender<ExtractedRecord>,
    budget: Arc<RateBudget>,
    cancel: CancellationToken,
    stats: Arc<RunStats>,
) -> WorkerEnd {
    loop {
        let next = { items.lock().await.recv().await };
        let Some(item) = next else {
            return WorkerEnd::Drained;
        };

        if cancel.is_cancelled() {
            debug!(url = %item.identifier, "Cancelled; dropping item");
            return WorkerEnd::Cancelled;
        }
        if budget.is_exhausted() {
            warn!(url = %item.identifier, "Rate-limit budget exhausted; worker stopping");
            return WorkerEnd::RateLimited;
        }

        match adapter.fetch_and_extract(&item).await {
            Err(e) => {
                stats.record_fetch_failed();
                error!(url = %item.identifier, error = %e, "Download article failed");
            }
            Ok(record) if record.rate_limited => {
                stats.record_rate_limited();
                let remaining = budget.record_rate_limit();
                error!(url = %item.identifier, remaining, "Download article too many requests");
            }
            Ok(record) => {
                stats.record_fetched();
                debug!(url = %record.identifier, "Downloaded article");
                if records.send(record).await.is_err() {
                    warn!("Persist stage has stopped; worker stopping");
                    return WorkerEnd::PersistGone;
                }
            }
        }
    }
}

/// Write every record to the store in arrival order.
///
/// The first write error aborts the stage; records still queued are not
/// written. Returns the number of records written.
#[instrument(level = "info", skip_all)]
pub async fn persist_stage(
    mut records: mpsc::Receiver<ExtractedRecord>,
    store: &mut dyn RecordStore,
    stats: Arc<RunStats>,
) -> Result<usize, StoreError> {
    let mut written = 0usize;
    while let Some(record) = records.recv().await {
        match store.write_record(&record).await {
            Ok(location) => {
                written += 1;
                stats.record_persisted();
                debug!(url = %record.identifier, %location, "Saved article");
            }
            Err(e) => {
                error!(url = %record.identifier, error = %e, written, "Save articles failed; stopping persist stage");
                return Err(e);
            }
        }
    }
    info!(written, "Persist stage drained");
    Ok(written)
}
