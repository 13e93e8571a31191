//! JSON-lines record store.
//!
//! One article per line; line `N` is [`RowLocation`] `N`. The whole file is
//! kept in memory and rewritten on flush, which keeps update-in-place
//! trivial:
//!
//! ```text
//! {"url":"https://www.zeit.de/a","title":"…","over_title":"…","lead":"…","subtitles":[…],"image_captions":[…]}
//! {"url":"https://www.zeit.de/b", …}
//! ```
//!
//! Flushes go through a temporary file and a rename so a crash mid-write
//! never leaves a truncated store behind.

use super::RecordStore;
use crate::error::StoreError;
use crate::models::{ArticleFields, ExtractedRecord, RowLocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredRow {
    url: String,
    #[serde(flatten)]
    fields: ArticleFields,
}

#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    rows: Vec<StoredRow>,
    flush_every: usize,
    unflushed: usize,
}

impl JsonLinesStore {
    /// Open the store at `path`. A missing file is an empty store.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>, flush_every: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let rows = match fs::read_to_string(&path).await {
            Ok(raw) => parse_rows(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Store file does not exist yet; starting empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(rows = rows.len(), "Opened record store");
        Ok(Self {
            path,
            rows,
            flush_every: flush_every.max(1),
            unflushed: 0,
        })
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&serde_json::to_string(row).map_err(StoreError::Encode)?);
            out.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, out).await?;
        fs::rename(&tmp, &self.path).await?;
        self.unflushed = 0;
        debug!(rows = self.rows.len(), "Flushed record store");
        Ok(())
    }
}

fn parse_rows(raw: &str) -> Result<Vec<StoredRow>, StoreError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| StoreError::Decode { line: i + 1, source })
        })
        .collect()
}

#[async_trait]
impl RecordStore for JsonLinesStore {
    async fn load_known_identifiers(&self) -> Result<HashMap<String, RowLocation>, StoreError> {
        Ok(self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.url.clone(), RowLocation::from_index(i)))
            .collect())
    }

    async fn write_record(&mut self, record: &ExtractedRecord) -> Result<RowLocation, StoreError> {
        if record.rate_limited {
            return Err(StoreError::RateLimitedRecord(record.identifier.clone()));
        }

        let row = StoredRow {
            url: record.identifier.clone(),
            fields: record.fields.clone(),
        };
        let location = match record.known_location {
            Some(location) => {
                let rows = self.rows.len();
                let slot = self
                    .rows
                    .get_mut(location.row() - 1)
                    .ok_or(StoreError::RowOutOfRange {
                        row: location.row(),
                        rows,
                    })?;
                *slot = row;
                location
            }
            None => {
                let location = RowLocation::from_index(self.rows.len());
                self.rows.push(row);
                location
            }
        };

        self.unflushed += 1;
        if self.unflushed >= self.flush_every {
            self.flush().await?;
        }
        Ok(location)
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn close(&mut self) -> Result<(), StoreError> {
        self.flush().await?;
        info!(rows = self.rows.len(), "Saved record store");
        Ok(())
    }
}
