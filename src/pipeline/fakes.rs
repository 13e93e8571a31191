//! In-memory adapter and store for exercising the pipeline without a network.

use crate::error::{AdapterError, StoreError};
use crate::models::{ArticleFields, CandidateItem, ExtractedRecord, RowLocation};
use crate::scrapers::SourceAdapter;
use crate::store::RecordStore;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One scripted search result page.
#[derive(Debug, Clone)]
pub enum Page {
    Ids(Vec<String>),
    Fail,
}

#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    pages: Vec<Page>,
    failing: HashSet<String>,
    rate_limited: HashSet<String>,
    always_rate_limited: bool,
    auth_fails: bool,
    fetch_delay: Option<Duration>,
    cancel_after_page: Option<(u32, CancellationToken)>,
    authentications: AtomicUsize,
    pages_requested: AtomicUsize,
    fetches: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn failing<'a>(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        self.failing.extend(ids.into_iter().map(str::to_string));
        self
    }

    pub fn rate_limiting<'a>(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        self.rate_limited.extend(ids.into_iter().map(str::to_string));
        self
    }

    pub fn always_rate_limited(mut self) -> Self {
        self.always_rate_limited = true;
        self
    }

    pub fn failing_auth(mut self) -> Self {
        self.auth_fails = true;
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Cancel `token` as soon as page `page` has been served.
    pub fn cancelling_after(mut self, page: u32, token: CancellationToken) -> Self {
        self.cancel_after_page = Some((page, token));
        self
    }

    pub fn authentications(&self) -> usize {
        self.authentications.load(Ordering::SeqCst)
    }

    pub fn pages_requested(&self) -> usize {
        self.pages_requested.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        self.authentications.fetch_add(1, Ordering::SeqCst);
        if self.auth_fails {
            return Err(AdapterError::Auth("bad password".to_string()));
        }
        Ok(())
    }

    async fn search_page(&self, page: u32) -> Result<Vec<String>, AdapterError> {
        self.pages_requested.fetch_add(1, Ordering::SeqCst);
        let result = match self.pages.get(page as usize - 1) {
            None => Err(AdapterError::NotFound),
            Some(Page::Fail) => Err(AdapterError::Status {
                url: format!("https://news.example/search?page={page}"),
                status: StatusCode::INTERNAL_SERVER_ERROR,
            }),
            Some(Page::Ids(ids)) => Ok(ids.clone()),
        };
        if let Some((after, token)) = &self.cancel_after_page {
            if *after == page {
                token.cancel();
            }
        }
        result
    }

    async fn fetch_and_extract(&self, item: &CandidateItem) -> Result<ExtractedRecord, AdapterError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&item.identifier) {
            return Err(AdapterError::ArticleNotFound(item.identifier.clone()));
        }
        if self.always_rate_limited || self.rate_limited.contains(&item.identifier) {
            return Ok(ExtractedRecord::rate_limited(item));
        }
        Ok(ExtractedRecord::extracted(
            item,
            ArticleFields {
                title: format!("Title of {}", item.identifier),
                ..ArticleFields::default()
            },
        ))
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store that keeps written records in a shared vector.
#[derive(Debug, Default)]
pub struct MemoryStore {
    known: HashMap<String, RowLocation>,
    rows: Arc<Mutex<Vec<ExtractedRecord>>>,
    attempts: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    fail_on_write: Option<usize>,
    fail_load: bool,
}

impl MemoryStore {
    pub fn with_known<'a>(known: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            known: known
                .into_iter()
                .enumerate()
                .map(|(i, id)| (id.to_string(), RowLocation::from_index(i)))
                .collect(),
            ..Self::default()
        }
    }

    /// Fail the `attempt`-th write (1-based).
    pub fn failing_on_write(mut self, attempt: usize) -> Self {
        self.fail_on_write = Some(attempt);
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn rows(&self) -> Arc<Mutex<Vec<ExtractedRecord>>> {
        Arc::clone(&self.rows)
    }

    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }

    pub fn closed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load_known_identifiers(&self) -> Result<HashMap<String, RowLocation>, StoreError> {
        if self.fail_load {
            return Err(StoreError::Io(std::io::Error::other("store unreadable")));
        }
        Ok(self.known.clone())
    }

    async fn write_record(&mut self, record: &ExtractedRecord) -> Result<RowLocation, StoreError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_write == Some(attempt) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        let mut rows = self.rows.lock().unwrap();
        rows.push(record.clone());
        Ok(record
            .known_location
            .unwrap_or_else(|| RowLocation::from_index(self.known.len() + rows.len() - 1)))
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
