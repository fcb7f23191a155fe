//! Live substring filter over a session's accumulated items

use crate::{Item, ItemStore};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct FilterCache {
    predicate: String,
    /// Lower-cased predicate used for matching
    needle: String,
    generation: u64,
    /// Number of store items already tested against the predicate
    evaluated: usize,
    visible: Vec<usize>,
}

impl FilterCache {
    fn invalidate(&mut self, generation: u64) {
        self.generation = generation;
        self.evaluated = 0;
        self.visible.clear();
    }

    /// Test items appended since the last evaluation
    fn catch_up(&mut self, generation: u64, items: &[Item]) {
        if generation != self.generation || items.len() < self.evaluated {
            self.invalidate(generation);
        }
        for (index, item) in items.iter().enumerate().skip(self.evaluated) {
            if self.needle.is_empty() || item.id.to_lowercase().contains(&self.needle) {
                self.visible.push(index);
            }
        }
        self.evaluated = items.len();
    }
}

/// Case-insensitive substring filter over an `ItemStore`
///
/// The filter never queries the data source. Each read first tests the items
/// appended since the previous read, so a filter over a running scan follows
/// its growth without an explicit refresh. When the store starts a new
/// generation the visible set is recomputed from scratch.
#[derive(Debug)]
pub struct ResultFilter {
    store: ItemStore,
    cache: Mutex<FilterCache>,
}

impl ResultFilter {
    /// A filter with an empty predicate (everything visible)
    pub fn new(store: ItemStore) -> Self {
        Self {
            store,
            cache: Mutex::new(FilterCache::default()),
        }
    }

    /// Replace the predicate and recompute the visible subset
    pub fn set_predicate(&self, predicate: &str) {
        let mut cache = self.cache.lock();
        if cache.predicate == predicate {
            return;
        }
        cache.predicate = predicate.to_string();
        cache.needle = predicate.to_lowercase();
        let generation = cache.generation;
        cache.invalidate(generation);
        self.store
            .with_items(|generation, items| cache.catch_up(generation, items));
    }

    pub fn predicate(&self) -> String {
        self.cache.lock().predicate.clone()
    }

    /// Items matching the predicate, in the order they were scanned
    pub fn visible_items(&self) -> Vec<Item> {
        let mut cache = self.cache.lock();
        self.store.with_items(|generation, items| {
            cache.catch_up(generation, items);
            cache.visible.iter().map(|&i| items[i].clone()).collect()
        })
    }

    /// Positions of the visible items in the underlying sequence
    pub fn visible_indices(&self) -> Vec<usize> {
        let mut cache = self.cache.lock();
        self.store.with_items(|generation, items| {
            cache.catch_up(generation, items);
            cache.visible.clone()
        })
    }

    pub fn visible_count(&self) -> usize {
        let mut cache = self.cache.lock();
        self.store.with_items(|generation, items| {
            cache.catch_up(generation, items);
            cache.visible.len()
        })
    }
}
