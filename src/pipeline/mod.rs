//! The concurrent ingestion pipeline.
//!
//! A run moves through four phases, published on a `watch` channel:
//!
//! | Phase | What is running |
//! |-------|-----------------|
//! | `Idle` | nothing; `run` has not been called |
//! | `Running` | search stage, N fetch workers, persist stage |
//! | `Draining` | persist stage only, finishing what the workers produced |
//! | `Completed` | nothing; every stage has returned and the store is closed |
//!
//! Search and the workers share one `JoinSet`. When that set is empty the
//! orchestrator drops its record sender, which is the only thing that lets
//! the persist stage see its queue close. Persist runs in its own task and
//! is awaited separately.
//!
//! `Completed` is published on every exit path of [`Pipeline::run`],
//! including early failures before any stage starts.

use crate::config::PipelineSettings;
use crate::error::{PipelineError, StoreError};
use crate::scrapers::SourceAdapter;
use crate::store::RecordStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub mod budget;
pub mod dedup;
pub mod stages;
pub mod stats;

#[cfg(test)]
pub(crate) mod fakes;

use budget::RateBudget;
use dedup::DedupIndex;
use stages::{SearchEnd, WorkerEnd};
use stats::{RunStats, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Draining,
    Completed,
}

/// What a single run should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum number of items to enqueue in this run.
    pub item_budget: usize,
    /// Re-process articles that are already in the store.
    pub update: bool,
}

#[derive(Debug)]
enum StageEnd {
    Search(SearchEnd),
    Worker(usize, WorkerEnd),
}

/// Publishes `Completed` when dropped.
struct CompletionGuard<'a>(&'a watch::Sender<Phase>);

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(Phase::Completed);
    }
}

pub struct Pipeline {
    adapter: Arc<dyn SourceAdapter>,
    settings: PipelineSettings,
    options: RunOptions,
    phase: watch::Sender<Phase>,
    adapter_closed: AtomicBool,
}

impl Pipeline {
    pub fn new(adapter: Arc<dyn SourceAdapter>, settings: PipelineSettings, options: RunOptions) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            adapter,
            settings,
            options,
            phase,
            adapter_closed: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Run the pipeline to completion.
    ///
    /// Loads the dedup index from `store`, authenticates the adapter, then
    /// runs all stages until search is done and every queued record has been
    /// written. `cancel` stops search and the workers at their next
    /// checkpoint; records already handed to the persist stage are still
    /// written.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::AlreadyStarted`] if this pipeline has run before
    /// - [`PipelineError::LoadIndex`] / [`PipelineError::Auth`] before any
    ///   stage starts
    /// - [`PipelineError::Persist`] if a store write (or the final flush)
    ///   failed
    #[instrument(level = "info", skip_all, fields(source = self.adapter.name(), budget = self.options.item_budget, update = self.options.update))]
    pub async fn run(
        &self,
        mut store: Box<dyn RecordStore>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let claimed = self.phase.send_if_modified(|phase| {
            if *phase == Phase::Idle {
                *phase = Phase::Running;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(PipelineError::AlreadyStarted);
        }
        let _completion = CompletionGuard(&self.phase);

        let index = store
            .load_known_identifiers()
            .await
            .map_err(PipelineError::LoadIndex)?;
        let index = Arc::new(DedupIndex::new(index));
        info!(known = index.len(), "Loaded known articles");

        if cancel.is_cancelled() {
            info!("Cancelled before start; not logging in");
            return Ok(RunSummary::default());
        }
        self.adapter.authenticate().await.map_err(PipelineError::Auth)?;

        let stats = Arc::new(RunStats::default());
        let budget = Arc::new(RateBudget::new(self.settings.rate_limit_budget));
        let (item_tx, item_rx) = mpsc::channel(self.settings.search_queue_capacity);
        let (record_tx, record_rx) = mpsc::channel(self.settings.record_queue_capacity);

        let persist_stats = Arc::clone(&stats);
        let persist = tokio::spawn(async move {
            let written = stages::persist_stage(record_rx, &mut *store, persist_stats).await;
            let closed = store.close().await;
            let written = written?;
            closed?;
            Ok::<_, StoreError>(written)
        });

        let mut running = JoinSet::new();
        {
            let adapter = Arc::clone(&self.adapter);
            let options = self.options;
            let cancel = cancel.clone();
            let stats = Arc::clone(&stats);
            running.spawn(async move {
                StageEnd::Search(stages::search_stage(adapter, index, options, item_tx, cancel, stats).await)
            });
        }
        let item_rx = Arc::new(Mutex::new(item_rx));
        for id in 0..self.settings.workers {
            let adapter = Arc::clone(&self.adapter);
            let items = Arc::clone(&item_rx);
            let records = record_tx.clone();
            let budget = Arc::clone(&budget);
            let cancel = cancel.clone();
            let stats = Arc::clone(&stats);
            running.spawn(async move {
                StageEnd::Worker(
                    id,
                    stages::fetch_worker(id, adapter, items, records, budget, cancel, stats).await,
                )
            });
        }
        // Only the workers may keep the item queue open.
        drop(item_rx);
        info!(workers = self.settings.workers, "Pipeline running");

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(StageEnd::Search(end)) => info!(?end, "Search stage finished"),
                Ok(StageEnd::Worker(id, end)) => debug!(worker = id, ?end, "Fetch worker finished"),
                Err(e) => error!(error = %e, "Stage task failed"),
            }
        }

        drop(record_tx);
        self.phase.send_replace(Phase::Draining);
        info!("Draining persist stage");

        let persisted = persist.await?;

        let summary = RunSummary {
            rate_budget_remaining: budget.remaining(),
            ..stats.summary()
        };
        if budget.is_exhausted() {
            warn!(ceiling = budget.ceiling(), "Rate-limit budget exhausted");
        }
        if summary.abandoned > 0 {
            warn!(abandoned = summary.abandoned, "Queued articles were never fetched");
        }
        info!(
            enqueued = summary.enqueued,
            skipped_known = summary.skipped_known,
            fetched = summary.fetched,
            fetch_failed = summary.fetch_failed,
            rate_limited = summary.rate_limited,
            persisted = summary.persisted,
            rate_budget_remaining = summary.rate_budget_remaining,
            "Pipeline complete"
        );

        persisted.map_err(PipelineError::Persist)?;
        Ok(summary)
    }

    /// Wait for the current run to finish, then release the adapter.
    ///
    /// Callers cancel the run's token first if they want it to stop early.
    /// Shutting down an idle pipeline moves it straight to `Completed`, so a
    /// later [`Pipeline::run`] fails with `AlreadyStarted`. The adapter is
    /// shut down once; later calls return immediately.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        let never_ran = self.phase.send_if_modified(|phase| {
            if *phase == Phase::Idle {
                *phase = Phase::Completed;
                true
            } else {
                false
            }
        });
        if never_ran {
            info!("Pipeline shut down before it ran");
        }

        let mut phase = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = phase.wait_for(|phase| *phase == Phase::Completed).await;

        if self.adapter_closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.adapter.shutdown().await.map_err(PipelineError::Shutdown)?;
        info!(source = self.adapter.name(), "Pipeline shut down");
        Ok(())
    }
}
