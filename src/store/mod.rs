//! Persistent record store.
//!
//! The pipeline needs three things from storage: the set of articles it has
//! already saved (to skip or update them), a way to write one record, and a
//! final flush. [`RecordStore`] captures that; [`jsonl::JsonLinesStore`] is
//! the file-backed implementation used by the binary.

use crate::error::StoreError;
use crate::models::{ExtractedRecord, RowLocation};
use async_trait::async_trait;
use std::collections::HashMap;

pub mod jsonl;

/// Row-oriented storage for extracted articles.
///
/// Only the persist stage writes to a store, so implementations need no
/// internal locking.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every stored article URL with the row that holds it.
    async fn load_known_identifiers(&self) -> Result<HashMap<String, RowLocation>, StoreError>;

    /// Append `record`, or overwrite its row when `known_location` is set.
    async fn write_record(&mut self, record: &ExtractedRecord) -> Result<RowLocation, StoreError>;

    /// Flush everything written so far.
    async fn close(&mut self) -> Result<(), StoreError>;
}
