//! Error types for configuration, source adapters, the record store and the
//! ingestion pipeline.
//!
//! The split mirrors how each failure is handled at runtime:
//!
//! | Type | Raised by | Handling |
//! |------|-----------|----------|
//! | [`ConfigError`] | CLI / YAML settings, adapter registry | Fatal before the pipeline starts |
//! | [`AdapterError`] | Site adapters | Per page or per item: logged and skipped |
//! | [`StoreError`] | Record store | Escalated: aborts the persist stage |
//! | [`PipelineError`] | Orchestrator | Returned to the caller of `Pipeline::run` |

use reqwest::StatusCode;
use thiserror::Error;

/// Invalid or incomplete configuration, detected before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("profile '{0}' not found (available: {1})")]
    UnknownProfile(String, String),

    #[error("login or password not set for profile '{0}'")]
    MissingCredentials(&'static str),

    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Failures reported by a source adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The search has run past its last page. Not a failure.
    #[error("articles not found")]
    NotFound,

    #[error("article not found at {0}")]
    ArticleNotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed search response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AdapterError {
    /// `true` for the distinguished "no more results" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AdapterError::NotFound)
    }
}

/// Failures raised by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode row: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("row {row} is out of range (store holds {rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("refusing to persist rate-limited record {0}")]
    RateLimitedRecord(String),
}

/// Failures that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline has already been started")]
    AlreadyStarted,

    #[error("failed to load known identifiers: {0}")]
    LoadIndex(#[source] StoreError),

    #[error("source authentication failed: {0}")]
    Auth(#[source] AdapterError),

    #[error("save articles: {0}")]
    Persist(#[source] StoreError),

    #[error("adapter shutdown failed: {0}")]
    Shutdown(#[source] AdapterError),

    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
