//! Append-only item storage shared between the scan worker and readers

use crate::Item;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct StoreInner {
    items: Vec<Item>,
    generation: u64,
}

/// Ordered, append-only sequence of items with a single writer
///
/// The scan worker is the only writer. Readers always see a consistent prefix
/// of the sequence; every `reset` bumps the generation so readers holding
/// derived state (like a filter's index list) know the set was replaced.
#[derive(Debug, Clone, Default)]
pub struct ItemStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Copy of the current items
    pub fn snapshot(&self) -> Vec<Item> {
        self.inner.read().items.clone()
    }

    /// Run `f` against the current generation and items under one read lock
    pub fn with_items<R>(&self, f: impl FnOnce(u64, &[Item]) -> R) -> R {
        let inner = self.inner.read();
        f(inner.generation, &inner.items)
    }

    /// Drop all items and start a new generation, returning it
    pub(crate) fn reset(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.items.clear();
        inner.generation += 1;
        inner.generation
    }

    /// Append a batch unless `cancelled` has fired or the generation moved on
    ///
    /// The check and the append happen under the same write lock, so once a
    /// cancellation is observed no later batch can land in the store.
    pub(crate) fn append_unless(
        &self,
        generation: u64,
        items: Vec<Item>,
        cancelled: &CancellationToken,
    ) -> bool {
        let mut inner = self.inner.write();
        if cancelled.is_cancelled() || inner.generation != generation {
            return false;
        }
        inner.items.extend(items);
        true
    }
}
