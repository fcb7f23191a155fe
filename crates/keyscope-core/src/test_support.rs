//! Scripted data source used by the session and filter tests

use crate::{Cursor, DataSource, Item, ItemKind, ItemMetadata, Result, ScanBatch, ScanError, Ttl};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

pub(crate) enum Step {
    Batch(u64, Vec<&'static str>),
    Fail(ScanError),
}

/// Replays a fixed list of scan responses
///
/// With a gate, every scan call waits for one permit before answering, so a
/// test can release batches one at a time.
pub(crate) struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    missing: Mutex<Vec<String>>,
    metadata_error: Mutex<HashMap<String, ScanError>>,
    gate: Option<Arc<Semaphore>>,
    estimate: Option<u64>,
    pub scan_calls: AtomicUsize,
    pub cursors: Mutex<Vec<Cursor>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            missing: Mutex::new(Vec::new()),
            metadata_error: Mutex::new(HashMap::new()),
            gate: None,
            estimate: None,
            scan_calls: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(batches: Vec<(u64, Vec<&'static str>)>) -> Self {
        Self::new(
            batches
                .into_iter()
                .map(|(cursor, keys)| Step::Batch(cursor, keys))
                .collect(),
        )
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_estimate(mut self, estimate: u64) -> Self {
        self.estimate = Some(estimate);
        self
    }

    /// Keys whose metadata lookup reports `NotFound`
    pub fn with_missing(self, keys: &[&str]) -> Self {
        self.missing
            .lock()
            .extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn with_metadata_error(self, key: &str, err: ScanError) -> Self {
        self.metadata_error.lock().insert(key.to_string(), err);
        self
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().push_back(step);
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn scan(&self, cursor: &Cursor, _pattern: &str, _batch_size: usize) -> Result<ScanBatch> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.cursors.lock().push(cursor.clone());

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ScanError::SourceUnavailable(e.to_string()))?
                .forget();
        }

        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Batch(next, keys)) => Ok(ScanBatch::new(
                Cursor::from(next),
                keys.into_iter().map(Item::new).collect(),
            )),
            Some(Step::Fail(err)) => Err(err),
            None => Err(ScanError::SourceUnavailable("script exhausted".to_string())),
        }
    }

    async fn metadata(&self, id: &str) -> Result<ItemMetadata> {
        if self.missing.lock().iter().any(|k| k == id) {
            return Err(ScanError::NotFound(id.to_string()));
        }
        if let Some(err) = self.metadata_error.lock().get(id) {
            return Err(err.clone());
        }
        Ok(ItemMetadata::new(ItemKind::String, Ttl::NoExpiry, id.len() as u64))
    }

    async fn estimated_len(&self) -> Result<Option<u64>> {
        Ok(self.estimate)
    }
}

pub(crate) fn ids(items: &[Item]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
}
