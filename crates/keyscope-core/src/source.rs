//! Data source trait implemented by key-value backends

use crate::{Cursor, ItemMetadata, Result, ScanBatch};
use async_trait::async_trait;

/// A key-value backend that enumerates its key-space with a cursor
///
/// Implementations are shared between the presenter and the scan worker, so
/// they must be usable from any thread.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name used in log output (e.g., "redis")
    fn name(&self) -> &str;

    /// Fetch one batch starting at `cursor`
    ///
    /// `batch_size` is a hint; the source may return more or fewer items, and
    /// a weakly consistent backend may return the same key in more than one
    /// batch. Fails with `ScanError::SourceUnavailable` when the connection
    /// is lost.
    async fn scan(&self, cursor: &Cursor, pattern: &str, batch_size: usize) -> Result<ScanBatch>;

    /// Look up kind, TTL and size of a single key
    ///
    /// Fails with `ScanError::NotFound` when the key was removed since it was
    /// listed. Callers treat that as advisory.
    async fn metadata(&self, id: &str) -> Result<ItemMetadata>;

    /// Look up metadata for every key of a batch
    ///
    /// The outer error fails the whole batch; inner errors concern one key
    /// each and are returned in the order of `ids`. Backends that can
    /// pipeline lookups override this.
    async fn metadata_batch(&self, ids: &[String]) -> Result<Vec<Result<ItemMetadata>>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(self.metadata(id).await);
        }
        Ok(results)
    }

    /// Approximate number of keys in the key-space, if the backend knows it
    async fn estimated_len(&self) -> Result<Option<u64>> {
        Ok(None)
    }
}
