//! Data models passed between the pipeline stages.
//!
//! This module defines the values that travel through the ingestion pipeline:
//! - [`CandidateItem`]: an article URL accepted by the search stage
//! - [`ExtractedRecord`]: the result of fetching and parsing one article
//! - [`ArticleFields`]: the structured fields pulled out of an article page
//! - [`RowLocation`]: a handle to a row in the record store
//!
//! Candidates and records are moved through bounded channels; once a stage
//! sends one it no longer has access to it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based row index into the record store.
///
/// Only the store creates meaningful locations; the pipeline copies them
/// around but never computes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowLocation(usize);

impl RowLocation {
    /// Location of the row at 0-based position `index`.
    pub fn from_index(index: usize) -> Self {
        Self(index + 1)
    }

    /// The 1-based row number.
    pub fn row(self) -> usize {
        self.0
    }
}

impl fmt::Display for RowLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.0)
    }
}

/// An article URL the search stage decided to process.
///
/// `known_location` is set when the URL is already in the store, which only
/// happens in update mode; the persist stage then overwrites that row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    /// The article URL. Used as the stable identifier.
    pub identifier: String,
    /// Where the article already lives in the store, if anywhere.
    pub known_location: Option<RowLocation>,
}

impl CandidateItem {
    pub fn new(identifier: impl Into<String>, known_location: Option<RowLocation>) -> Self {
        Self {
            identifier: identifier.into(),
            known_location,
        }
    }
}

/// Structured fields extracted from an article page.
///
/// Subtitles and image captions keep document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleFields {
    /// The headline.
    pub title: String,
    /// The kicker shown above the headline.
    pub over_title: String,
    /// The teaser paragraph under the headline.
    pub lead: String,
    /// Section headings inside the article body.
    pub subtitles: Vec<String>,
    /// Captions of images and figures.
    pub image_captions: Vec<String>,
}

/// The outcome of fetching one [`CandidateItem`].
///
/// Records with `rate_limited` set were answered with HTTP 429 and carry no
/// usable fields. They are counted against the rate budget and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    /// The article URL.
    pub identifier: String,
    /// Extracted article content. Empty when `rate_limited` is set.
    pub fields: ArticleFields,
    /// The site refused the request with "too many requests".
    pub rate_limited: bool,
    /// Copied from the candidate; selects update-in-place in the store.
    pub known_location: Option<RowLocation>,
}

impl ExtractedRecord {
    /// A successfully extracted article.
    pub fn extracted(item: &CandidateItem, fields: ArticleFields) -> Self {
        Self {
            identifier: item.identifier.clone(),
            fields,
            rate_limited: false,
            known_location: item.known_location,
        }
    }

    /// A placeholder for a request the site rejected with HTTP 429.
    pub fn rate_limited(item: &CandidateItem) -> Self {
        Self {
            identifier: item.identifier.clone(),
            fields: ArticleFields::default(),
            rate_limited: true,
            known_location: item.known_location,
        }
    }
}
