//! Fan-in deduplication.
//!
//! Geohash bounds can overlap at their inclusive ends, so the same record may come
//! back from two scans. The merger keeps the first occurrence of each id.

use mapquery_types::Entity;
use rustc_hash::FxHashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedEntities {
    pub entities: Vec<Entity>,
    pub duplicates_removed: usize,
}

/// Accumulates per-bound entity lists into one list with unique ids.
#[derive(Debug, Default)]
pub struct ResultMerger {
    seen: FxHashSet<String>,
    entities: Vec<Entity>,
    duplicates_removed: usize,
}

impl ResultMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: FxHashSet::with_capacity_and_hasher(capacity, Default::default()),
            entities: Vec::with_capacity(capacity),
            duplicates_removed: 0,
        }
    }

    /// Append one bound's entities, skipping ids already seen.
    pub fn extend(&mut self, entities: impl IntoIterator<Item = Entity>) {
        for entity in entities {
            if self.seen.contains(entity.id()) {
                self.duplicates_removed += 1;
                continue;
            }
            self.seen.insert(entity.id().to_string());
            self.entities.push(entity);
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn finish(self) -> MergedEntities {
        MergedEntities {
            entities: self.entities,
            duplicates_removed: self.duplicates_removed,
        }
    }
}

/// Concatenate and deduplicate in one call.
pub fn merge_by_id<I>(pages: I) -> MergedEntities
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = Entity>,
{
    let mut merger = ResultMerger::new();
    for page in pages {
        merger.extend(page);
    }
    merger.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use mapquery_types::{PoiKind, PointOfInterest};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn entity(id: &str, lon: f64) -> Entity {
        PointOfInterest::new(id, PoiKind::Restaurant, Point::new(lon, 34.05), "9q5ctr").into()
    }

    #[test]
    fn test_first_occurrence_wins() {
        let merged = merge_by_id(vec![
            vec![entity("a", 1.0), entity("b", 1.0)],
            vec![entity("b", 2.0), entity("c", 2.0)],
        ]);
        let ids: Vec<&str> = merged.entities.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged.entities[1].coordinate().x(), 1.0);
        assert_eq!(merged.duplicates_removed, 1);
    }

    #[test]
    fn test_duplicates_within_one_page() {
        let merged = merge_by_id(vec![vec![entity("a", 0.0), entity("a", 0.0)]]);
        assert_eq!(merged.entities.len(), 1);
        assert_eq!(merged.duplicates_removed, 1);
    }

    #[test]
    fn test_empty_input() {
        let merged = merge_by_id(Vec::<Vec<Entity>>::new());
        assert!(merged.entities.is_empty());
        assert_eq!(merged.duplicates_removed, 0);
    }

    #[test]
    fn test_random_pages_have_unique_ids() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let pages: Vec<Vec<Entity>> = (0..rng.gen_range(1..9))
                .map(|_| {
                    (0..rng.gen_range(0..30))
                        .map(|_| entity(&format!("id{}", rng.gen_range(0..40)), 0.0))
                        .collect()
                })
                .collect();
            let total: usize = pages.iter().map(Vec::len).sum();

            let merged = merge_by_id(pages);
            let unique: FxHashSet<&str> = merged.entities.iter().map(|e| e.id()).collect();
            assert_eq!(unique.len(), merged.entities.len());
            assert_eq!(merged.entities.len() + merged.duplicates_removed, total);
        }
    }
}
