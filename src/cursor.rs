//! Per-bound pagination cursors.
//!
//! A fetch scans one or two lanes per geohash bound: points, clusters, or both in the
//! hybrid tier. Each lane remembers the last record it returned and whether its last
//! page was full. "Load more" rescans only the lanes that may still hold records,
//! starting strictly after their cursors.
//!
//! Cursor sets are keyed by entity kind and only handed out for the filter signature
//! they were built under, so a filter change can never resume an old scan.

use crate::compute::filter::FilterSignature;
use crate::compute::geohash_range::GeohashBound;
use crate::query::EntityKind;
use crate::storage::StoreCursor;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which record class a lane scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Points,
    Clusters,
}

/// Scan position within one bound of one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneCursor {
    pub lane: Lane,
    pub bound: GeohashBound,
    /// `None` until the lane has returned a record.
    pub after: Option<StoreCursor>,
    pub has_more: bool,
}

impl LaneCursor {
    pub fn new(lane: Lane, bound: GeohashBound) -> Self {
        Self {
            lane,
            bound,
            after: None,
            has_more: true,
        }
    }

    /// Record the outcome of scanning this lane. A failed scan closes the lane.
    pub fn advance(&mut self, last: Option<StoreCursor>, has_more: bool) {
        if last.is_some() {
            self.after = last;
        }
        self.has_more = has_more;
    }
}

/// Cursors for every lane of one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSet {
    pub kind: EntityKind,
    pub signature: FilterSignature,
    pub lanes: Vec<LaneCursor>,
    /// Ids of points already shown inside a hybrid cluster. Later pages leave them out.
    #[serde(default)]
    pub absorbed: BTreeSet<String>,
}

impl CursorSet {
    pub fn new(kind: EntityKind, signature: FilterSignature, lanes: Vec<LaneCursor>) -> Self {
        Self {
            kind,
            signature,
            lanes,
            absorbed: BTreeSet::new(),
        }
    }

    pub fn with_absorbed(mut self, absorbed: BTreeSet<String>) -> Self {
        self.absorbed = absorbed;
        self
    }

    pub fn empty(kind: EntityKind, signature: FilterSignature) -> Self {
        Self::new(kind, signature, Vec::new())
    }

    /// True if any lane may still hold unconsumed records.
    pub fn has_more(&self) -> bool {
        self.lanes.iter().any(|l| l.has_more)
    }

    /// Indices of lanes worth scanning again.
    pub fn pending(&self) -> impl Iterator<Item = (usize, &LaneCursor)> {
        self.lanes.iter().enumerate().filter(|(_, l)| l.has_more)
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }
}

/// Cursor sets of one map surface, one per entity kind.
#[derive(Debug, Default)]
pub struct PaginationCursorManager {
    sets: FxHashMap<EntityKind, CursorSet>,
}

impl PaginationCursorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursors for `kind`, but only if they were built under `signature`.
    pub fn get(&self, kind: EntityKind, signature: FilterSignature) -> Option<&CursorSet> {
        self.sets.get(&kind).filter(|set| set.signature == signature)
    }

    /// Store the cursors of a page-1 fetch, dropping whatever `kind` had before.
    pub fn replace(&mut self, cursors: CursorSet) {
        if let Some(old) = self.sets.get(&cursors.kind) {
            if old.signature != cursors.signature {
                log::info!(
                    "resetting {} cursors: filter signature {} -> {}",
                    cursors.kind,
                    old.signature,
                    cursors.signature
                );
            }
        }
        self.sets.insert(cursors.kind, cursors);
    }

    /// Apply one "load more" page. Returns false when the stored cursors no longer
    /// match `signature`, in which case nothing changes.
    pub fn advance(
        &mut self,
        kind: EntityKind,
        signature: FilterSignature,
        updates: impl IntoIterator<Item = (usize, Option<StoreCursor>, bool)>,
        absorbed: impl IntoIterator<Item = String>,
    ) -> bool {
        let Some(set) = self.sets.get_mut(&kind).filter(|s| s.signature == signature) else {
            return false;
        };
        for (index, last, has_more) in updates {
            if let Some(lane) = set.lanes.get_mut(index) {
                lane.advance(last, has_more);
            }
        }
        set.absorbed.extend(absorbed);
        true
    }

    pub fn invalidate(&mut self, kind: EntityKind) -> Option<CursorSet> {
        let removed = self.sets.remove(&kind);
        if removed.is_some() {
            log::info!("invalidated {} cursors", kind);
        }
        removed
    }

    pub fn invalidate_all(&mut self) {
        if !self.sets.is_empty() {
            log::info!("invalidated cursors for {} entity kinds", self.sets.len());
        }
        self.sets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
