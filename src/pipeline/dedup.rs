//! Lookup of articles that are already in the store.

use crate::models::RowLocation;
use std::collections::HashMap;

/// Maps article URLs to the store row that already holds them.
///
/// Built once from the store before the search stage starts and shared
/// read-only (behind an `Arc`) for the rest of the run. Rows written during
/// the run are not added back.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    known: HashMap<String, RowLocation>,
}

impl DedupIndex {
    pub fn new(known: HashMap<String, RowLocation>) -> Self {
        Self { known }
    }

    /// The row holding `identifier`, if it has been stored before.
    pub fn lookup(&self, identifier: &str) -> Option<RowLocation> {
        self.known.get(identifier).copied()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

impl FromIterator<(String, RowLocation)> for DedupIndex {
    fn from_iter<I: IntoIterator<Item = (String, RowLocation)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
