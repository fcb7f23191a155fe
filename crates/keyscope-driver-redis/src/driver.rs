//! Redis data source implementation

use crate::{
    RedisConfig, classify_error, kind_and_ttl, parse_scan_reply, size_command, size_from_reply,
};
use async_trait::async_trait;
use keyscope_core::{
    Cursor, DataSource, ItemKind, ItemMetadata, Result, ScanBatch, ScanError, Ttl,
};
use redis::aio::MultiplexedConnection;
use std::sync::atomic::{AtomicBool, Ordering};

/// A connected Redis server exposed as a `DataSource`
///
/// The multiplexed connection is cloned per call; clones share one socket
/// and pipeline concurrent requests.
pub struct RedisSource {
    connection: MultiplexedConnection,
    config: RedisConfig,
    closed: AtomicBool,
}

impl RedisSource {
    /// Connect and verify the connection with `PING`
    #[tracing::instrument(skip(config), fields(host = %config.host, port = config.port))]
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        tracing::debug!("connecting to Redis");

        let client = redis::Client::open(config.connection_info()).map_err(|e| {
            ScanError::Configuration(format!("Failed to create Redis client: {}", e))
        })?;

        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ScanError::SourceUnavailable(format!("Failed to connect to Redis: {}", e)))?;

        // Authentication errors only surface on the first command
        let ping: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut connection).await;
        match ping {
            Ok(response) => {
                if response != "PONG" {
                    tracing::warn!("Unexpected PING response: {}", response);
                }
                tracing::debug!("Redis connection verified with PING");
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("NOAUTH") || message.contains("Authentication") {
                    return Err(ScanError::Configuration(
                        "Redis authentication required. Please provide a password in the connection settings."
                            .to_string(),
                    ));
                }
                return Err(ScanError::SourceUnavailable(format!(
                    "Redis connection verification failed: {}",
                    e
                )));
            }
        }

        Ok(Self::new(connection, config))
    }

    /// Wrap an established connection
    pub fn new(connection: MultiplexedConnection, config: RedisConfig) -> Self {
        Self {
            connection,
            config,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Mark the source closed; later calls fail with `SourceUnavailable`
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("Redis connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn connection(&self) -> Result<MultiplexedConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ScanError::SourceUnavailable("Connection is closed".to_string()));
        }
        Ok(self.connection.clone())
    }

    async fn query<T: redis::FromRedisValue + Send>(&self, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.connection()?;
        let result: redis::RedisResult<T> = cmd.query_async(&mut conn).await;
        result.map_err(|e| classify_error(&e))
    }

    async fn query_pipeline(&self, pipe: &redis::Pipeline) -> Result<Vec<redis::Value>> {
        let mut conn = self.connection()?;
        let result: redis::RedisResult<Vec<redis::Value>> = pipe.query_async(&mut conn).await;
        result.map_err(|e| classify_error(&e))
    }

    async fn key_size(&self, id: &str, kind: &ItemKind) -> Result<u64> {
        match size_command(kind) {
            Some(command) => {
                let mut cmd = redis::cmd(command);
                cmd.arg(id);
                self.query(&cmd).await
            }
            None => Ok(1),
        }
    }

    /// Look up metadata key by key, for batches whose pipeline was rejected
    async fn metadata_each(&self, ids: &[String]) -> Vec<Result<ItemMetadata>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(self.metadata(id).await);
        }
        results
    }
}

#[async_trait]
impl DataSource for RedisSource {
    fn name(&self) -> &str {
        "redis"
    }

    async fn scan(&self, cursor: &Cursor, pattern: &str, batch_size: usize) -> Result<ScanBatch> {
        let start = std::time::Instant::now();

        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor.as_str())
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(batch_size);

        let reply: redis::Value = self.query(&cmd).await?;
        let batch = parse_scan_reply(&reply)?;

        tracing::trace!(
            cursor = %cursor,
            next_cursor = %batch.next_cursor,
            keys = batch.items.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "SCAN completed"
        );

        Ok(batch)
    }

    async fn metadata(&self, id: &str) -> Result<ItemMetadata> {
        let mut pipe = redis::pipe();
        pipe.cmd("TYPE").arg(id).cmd("TTL").arg(id);

        let replies = self.query_pipeline(&pipe).await?;
        let [type_reply, ttl_reply] = replies.as_slice() else {
            return Err(ScanError::Source(format!(
                "expected 2 replies to TYPE/TTL, got {}",
                replies.len()
            )));
        };
        let (kind, ttl) = kind_and_ttl(id, type_reply, ttl_reply)?;
        let size = self.key_size(id, &kind).await?;

        Ok(ItemMetadata::new(kind, ttl, size))
    }

    /// Two round trips per batch: `TYPE`/`TTL` for every key, then the
    /// cardinality command for every key that has one
    #[tracing::instrument(skip(self, ids), fields(keys = ids.len()))]
    async fn metadata_batch(&self, ids: &[String]) -> Result<Vec<Result<ItemMetadata>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in ids {
            pipe.cmd("TYPE").arg(id).cmd("TTL").arg(id);
        }
        let replies = match self.query_pipeline(&pipe).await {
            Ok(replies) => replies,
            Err(err) if err.is_per_item() => {
                tracing::debug!(error = %err, "TYPE/TTL pipeline rejected, looking up keys one by one");
                return Ok(self.metadata_each(ids).await);
            }
            Err(err) => return Err(err),
        };
        if replies.len() != ids.len() * 2 {
            return Err(ScanError::Source(format!(
                "expected {} replies to TYPE/TTL, got {}",
                ids.len() * 2,
                replies.len()
            )));
        }

        let kinds: Vec<Result<(ItemKind, Ttl)>> = ids
            .iter()
            .zip(replies.chunks_exact(2))
            .map(|(id, pair)| kind_and_ttl(id, &pair[0], &pair[1]))
            .collect();

        let mut size_pipe = redis::pipe();
        let mut sized = Vec::new();
        for (index, (id, kind)) in ids.iter().zip(&kinds).enumerate() {
            if let Ok((kind, _)) = kind
                && let Some(command) = size_command(kind)
            {
                size_pipe.cmd(command).arg(id);
                sized.push(index);
            }
        }

        let mut sizes: Vec<Option<Result<u64>>> = vec![None; ids.len()];
        if !sized.is_empty() {
            match self.query_pipeline(&size_pipe).await {
                Ok(replies) if replies.len() == sized.len() => {
                    for (index, reply) in sized.iter().zip(&replies) {
                        sizes[*index] = Some(size_from_reply(reply));
                    }
                }
                Ok(replies) => {
                    return Err(ScanError::Source(format!(
                        "expected {} size replies, got {}",
                        sized.len(),
                        replies.len()
                    )));
                }
                // A key changed type since TYPE; size the batch key by key
                Err(err) if err.is_per_item() => {
                    tracing::debug!(error = %err, "size pipeline rejected, sizing keys one by one");
                    for index in &sized {
                        if let Ok((kind, _)) = &kinds[*index] {
                            sizes[*index] = Some(self.key_size(&ids[*index], kind).await);
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Ok(kinds
            .into_iter()
            .zip(sizes)
            .map(|(kind, size)| -> Result<ItemMetadata> {
                let (kind, ttl) = kind?;
                let size = size.unwrap_or(Ok(1))?;
                Ok(ItemMetadata::new(kind, ttl, size))
            })
            .collect())
    }

    async fn estimated_len(&self) -> Result<Option<u64>> {
        let count: u64 = self.query(&redis::cmd("DBSIZE")).await?;
        Ok(Some(count))
    }
}

impl std::fmt::Debug for RedisSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSource")
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
