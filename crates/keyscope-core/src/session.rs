//! Scan session: drives a cursor-based enumeration on a worker task
//!
//! A session owns the accumulated items of one scan at a time. `start`
//! spawns the drive loop, which keeps calling `DataSource::scan` until the
//! source hands back the start cursor, the session is cancelled, or the
//! source fails. Progress is published through a watch channel after every
//! batch; the loop never waits for a consumer.
//!
//! Items are appended exactly in the order batches arrive. A weakly
//! consistent backend (Redis `SCAN` among them) may return a key in more than
//! one batch; such duplicates are kept. Callers that need set semantics
//! dedupe downstream.

use crate::{Cursor, DataSource, Item, ItemStore, Result, ResultFilter, ScanError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Default number of keys requested per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Options for a single scan run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Match pattern passed to the source (default: "*")
    pub pattern: String,
    /// Count hint per batch
    pub batch_size: usize,
    /// Look up kind, TTL and size for every item
    pub with_metadata: bool,
    /// Stop once this many items are accumulated (0 = no limit)
    pub limit: usize,
    /// Pause between batches to yield to the presenter
    pub batch_delay: Duration,
}

impl ScanOptions {
    /// Create options with pattern "*"
    pub fn new() -> Self {
        Self {
            pattern: "*".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            with_metadata: false,
            limit: 0,
            batch_delay: Duration::ZERO,
        }
    }

    /// Set the pattern to match. An empty pattern matches everything.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.pattern = if pattern.is_empty() {
            "*".to_string()
        } else {
            pattern
        };
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fetch per-item metadata while scanning
    pub fn with_metadata(mut self) -> Self {
        self.with_metadata = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ScanError::InvalidOptions(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a session
///
/// `Idle → Running → {Completed | Cancelled | Failed} → Idle`. Only `start`
/// from a non-running state enters `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    /// The source failed; items fetched before the failure are kept
    Failed(ScanError),
}

impl ScanStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ScanStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Cancelled | ScanStatus::Failed(_)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Idle => "idle",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStatus::Failed(err) => write!(f, "failed: {}", err),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Snapshot published after every batch and state transition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanProgress {
    /// Items currently held by the session
    pub items_so_far: usize,
    /// Items appended by the current run
    pub total_appended: usize,
    /// Batches received by the current run
    pub batches: usize,
    /// Items dropped because their metadata lookup failed for that key alone
    pub skipped: usize,
    pub status: ScanStatus,
    /// Advisory size of the key-space reported by the source
    pub estimated_total: Option<u64>,
}

#[derive(Debug, Default)]
struct SessionState {
    status: ScanStatus,
    cursor: Cursor,
    options: ScanOptions,
    generation: u64,
    batches: usize,
    skipped: usize,
    total_appended: usize,
    estimated_total: Option<u64>,
    cancel: CancellationToken,
}

struct SessionInner {
    source: Arc<dyn DataSource>,
    store: ItemStore,
    state: Mutex<SessionState>,
    progress: watch::Sender<ScanProgress>,
    runtime: Option<Handle>,
}

impl SessionInner {
    /// Publish the current state. Callers hold the state lock.
    fn publish(&self, state: &SessionState) {
        self.progress.send_replace(ScanProgress {
            items_so_far: self.store.len(),
            total_appended: state.total_appended,
            batches: state.batches,
            skipped: state.skipped,
            status: state.status.clone(),
            estimated_total: state.estimated_total,
        });
    }

    fn finish(&self, generation: u64, status: ScanStatus) {
        let mut state = self.state.lock();
        if state.generation != generation || !state.status.is_running() {
            return;
        }
        match &status {
            ScanStatus::Failed(err) => tracing::warn!(
                source = self.source.name(),
                items = self.store.len(),
                batches = state.batches,
                error = %err,
                "scan failed"
            ),
            _ => tracing::info!(
                source = self.source.name(),
                items = self.store.len(),
                batches = state.batches,
                skipped = state.skipped,
                status = status.as_str(),
                "scan finished"
            ),
        }
        state.status = status;
        self.publish(&state);
    }
}

/// A cursor scan over one data source connection
///
/// Only one run may be active per session; `start` while running is
/// rejected rather than queued. Handles are cheap to clone and all refer to
/// the same session.
#[derive(Clone)]
pub struct ScanSession {
    inner: Arc<SessionInner>,
}

impl ScanSession {
    /// Create an idle session for `source`
    ///
    /// The drive loop is spawned on the tokio runtime that is current when
    /// `start` is called, unless `with_runtime` provides one.
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        let (progress, _) = watch::channel(ScanProgress::default());
        Self {
            inner: Arc::new(SessionInner {
                source,
                store: ItemStore::new(),
                state: Mutex::new(SessionState::default()),
                progress,
                runtime: None,
            }),
        }
    }

    /// Spawn drive loops on `runtime` instead of the caller's runtime
    pub fn with_runtime(source: Arc<dyn DataSource>, runtime: Handle) -> Self {
        let (progress, _) = watch::channel(ScanProgress::default());
        Self {
            inner: Arc::new(SessionInner {
                source,
                store: ItemStore::new(),
                state: Mutex::new(SessionState::default()),
                progress,
                runtime: Some(runtime),
            }),
        }
    }

    /// Start scanning `pattern` with the given batch size
    pub fn start(&self, pattern: &str, batch_size: usize) -> Result<()> {
        self.start_with(
            ScanOptions::new()
                .with_pattern(pattern)
                .with_batch_size(batch_size),
        )
    }

    /// Start a scan run, replacing the items of any previous run
    pub fn start_with(&self, options: ScanOptions) -> Result<()> {
        options.validate()?;
        let runtime = match &self.inner.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|e| {
                ScanError::Configuration(format!("no tokio runtime to run the scan on: {}", e))
            })?,
        };

        let mut state = self.inner.state.lock();
        if state.status.is_running() {
            return Err(ScanError::AlreadyRunning);
        }

        let generation = self.inner.store.reset();
        let cancel = CancellationToken::new();
        *state = SessionState {
            status: ScanStatus::Running,
            cursor: Cursor::start(),
            options: options.clone(),
            generation,
            cancel: cancel.clone(),
            ..SessionState::default()
        };
        self.inner.publish(&state);
        drop(state);

        tracing::info!(
            source = self.inner.source.name(),
            pattern = %options.pattern,
            batch_size = options.batch_size,
            with_metadata = options.with_metadata,
            limit = options.limit,
            "scan started"
        );

        runtime.spawn(drive(self.inner.clone(), generation, options, cancel));
        Ok(())
    }

    /// Ask the running scan to stop at the next batch boundary
    ///
    /// An in-flight source call is abandoned rather than interrupted on the
    /// backend. The status becomes `Cancelled` once the drive loop notices.
    pub fn cancel(&self) {
        let state = self.inner.state.lock();
        if state.status.is_running() {
            tracing::debug!(source = self.inner.source.name(), "scan cancellation requested");
            state.cancel.cancel();
        }
    }

    /// Drop accumulated items and return to `Idle` (explicit disconnect)
    pub fn reset(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.status.is_running() {
            return Err(ScanError::AlreadyRunning);
        }
        let generation = self.inner.store.reset();
        *state = SessionState {
            generation,
            ..SessionState::default()
        };
        self.inner.publish(&state);
        Ok(())
    }

    /// Wait until the current run reaches a terminal state
    ///
    /// Returns the current status immediately when no run is active.
    pub async fn wait(&self) -> ScanStatus {
        let mut rx = self.inner.progress.subscribe();
        match rx.wait_for(|progress| !progress.status.is_running()).await {
            Ok(progress) => progress.status.clone(),
            Err(_) => self.status(),
        }
    }

    /// Receiver of progress snapshots
    pub fn subscribe(&self) -> watch::Receiver<ScanProgress> {
        self.inner.progress.subscribe()
    }

    pub fn progress(&self) -> ScanProgress {
        self.inner.progress.borrow().clone()
    }

    pub fn status(&self) -> ScanStatus {
        self.inner.state.lock().status.clone()
    }

    /// Cursor the next batch will be requested from
    pub fn cursor(&self) -> Cursor {
        self.inner.state.lock().cursor.clone()
    }

    pub fn options(&self) -> ScanOptions {
        self.inner.state.lock().options.clone()
    }

    /// Copy of the accumulated items, in arrival order
    pub fn items(&self) -> Vec<Item> {
        self.inner.store.snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Shared read handle on the accumulated items
    pub fn store(&self) -> ItemStore {
        self.inner.store.clone()
    }

    /// A filter over this session's items
    pub fn filter(&self) -> ResultFilter {
        ResultFilter::new(self.inner.store.clone())
    }
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("source", &self.inner.source.name())
            .field("status", &self.status())
            .field("items", &self.len())
            .finish()
    }
}

struct FetchedBatch {
    next_cursor: Cursor,
    items: Vec<Item>,
    skipped: usize,
}

/// One scan call, plus metadata lookups when requested
async fn fetch_batch(
    source: &dyn DataSource,
    cursor: &Cursor,
    options: &ScanOptions,
) -> Result<FetchedBatch> {
    let batch = source
        .scan(cursor, &options.pattern, options.batch_size)
        .await?;

    if !options.with_metadata {
        return Ok(FetchedBatch {
            next_cursor: batch.next_cursor,
            items: batch.items,
            skipped: 0,
        });
    }

    let ids: Vec<String> = batch.items.iter().map(|item| item.id.clone()).collect();
    let lookups = source.metadata_batch(&ids).await?;
    if lookups.len() != ids.len() {
        return Err(ScanError::Source(format!(
            "metadata lookup returned {} results for {} keys",
            lookups.len(),
            ids.len()
        )));
    }

    let mut items = Vec::with_capacity(batch.items.len());
    let mut skipped = 0;
    for (item, lookup) in batch.items.into_iter().zip(lookups) {
        match lookup {
            Ok(metadata) => items.push(item.with_metadata(metadata)),
            Err(ScanError::NotFound(_)) => {
                tracing::debug!(key = %item.id, "key vanished before metadata lookup, skipping");
                skipped += 1;
            }
            Err(err) if err.is_per_item() => {
                tracing::warn!(key = %item.id, error = %err, "metadata lookup failed, skipping key");
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(FetchedBatch {
        next_cursor: batch.next_cursor,
        items,
        skipped,
    })
}

async fn drive(
    inner: Arc<SessionInner>,
    generation: u64,
    options: ScanOptions,
    cancel: CancellationToken,
) {
    let source = inner.source.clone();

    let estimated = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            inner.finish(generation, ScanStatus::Cancelled);
            return;
        }
        result = source.estimated_len() => result,
    };
    let estimated_total = match estimated {
        Ok(total) => total,
        Err(err) => {
            tracing::debug!(error = %err, "source size estimate unavailable");
            None
        }
    };
    {
        let mut state = inner.state.lock();
        if state.generation == generation {
            state.estimated_total = estimated_total;
            inner.publish(&state);
        }
    }

    let mut cursor = Cursor::start();
    loop {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                inner.finish(generation, ScanStatus::Cancelled);
                return;
            }
            result = fetch_batch(source.as_ref(), &cursor, &options) => result,
        };

        let mut fetched = match fetched {
            Ok(fetched) => fetched,
            Err(err) => {
                inner.finish(generation, ScanStatus::Failed(err));
                return;
            }
        };

        let mut limit_reached = false;
        if options.limit > 0 {
            let room = options.limit.saturating_sub(inner.store.len());
            if fetched.items.len() >= room {
                fetched.items.truncate(room);
                limit_reached = true;
            }
        }

        let appended = fetched.items.len();
        if !inner.store.append_unless(generation, fetched.items, &cancel) {
            inner.finish(generation, ScanStatus::Cancelled);
            return;
        }

        cursor = fetched.next_cursor;
        let complete = cursor.is_start() || limit_reached;
        {
            let mut state = inner.state.lock();
            if state.generation != generation {
                return;
            }
            state.cursor = cursor.clone();
            state.batches += 1;
            state.total_appended += appended;
            state.skipped += fetched.skipped;
            tracing::debug!(
                batch = state.batches,
                appended,
                total = state.total_appended,
                cursor = %cursor,
                "scan batch received"
            );
            inner.publish(&state);
        }

        if complete {
            inner.finish(generation, ScanStatus::Completed);
            return;
        }

        if !options.batch_delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    inner.finish(generation, ScanStatus::Cancelled);
                    return;
                }
                _ = tokio::time::sleep(options.batch_delay) => {}
            }
        }
    }
}
