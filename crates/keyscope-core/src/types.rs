//! Data model shared by scan sessions, filters and data sources

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque continuation token for a cursor-based enumeration
///
/// The value `"0"` (or an empty token) denotes both the start of a scan and,
/// when handed back by the source, that the full pass is complete. Cursors are
/// only meaningful to the source that issued them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    /// The start cursor
    pub fn start() -> Self {
        Self("0".to_string())
    }

    /// Wrap a token returned by the source
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Whether this is the start (or completion) value
    pub fn is_start(&self) -> bool {
        self.0.is_empty() || self.0 == "0"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::start()
    }
}

impl From<u64> for Cursor {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of value stored under a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// String value
    String,
    /// List (linked list)
    List,
    /// Set (unordered unique strings)
    Set,
    /// Sorted set (ordered by score)
    Zset,
    /// Hash (field-value pairs)
    Hash,
    /// Stream (append-only log)
    Stream,
    /// Any tag the backend reports that is not one of the above (module types)
    Unknown(String),
}

impl ItemKind {
    /// Parse a backend type tag, case-insensitively
    pub fn from_type_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "string" => ItemKind::String,
            "list" => ItemKind::List,
            "set" => ItemKind::Set,
            "zset" => ItemKind::Zset,
            "hash" => ItemKind::Hash,
            "stream" => ItemKind::Stream,
            other => ItemKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ItemKind::String => "string",
            ItemKind::List => "list",
            ItemKind::Set => "set",
            ItemKind::Zset => "zset",
            ItemKind::Hash => "hash",
            ItemKind::Stream => "stream",
            ItemKind::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remaining time-to-live of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ttl {
    NoExpiry,
    Seconds(u64),
}

impl Ttl {
    pub fn has_expiry(&self) -> bool {
        matches!(self, Ttl::Seconds(_))
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::NoExpiry => f.write_str("∞"),
            Ttl::Seconds(secs) => write!(f, "{}", secs),
        }
    }
}

/// Per-item metadata looked up from the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub kind: ItemKind,
    pub ttl: Ttl,
    /// Size or cardinality (list length, set members, hash fields, ...)
    pub size: u64,
}

impl ItemMetadata {
    pub fn new(kind: ItemKind, ttl: Ttl, size: u64) -> Self {
        Self { kind, ttl, size }
    }
}

/// A fetched key, immutable once it enters a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// The key name
    pub id: String,
    pub metadata: Option<ItemMetadata>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One response of a `DataSource::scan` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBatch {
    /// Cursor to resume from; the start value means the pass is complete
    pub next_cursor: Cursor,
    pub items: Vec<Item>,
}

impl ScanBatch {
    pub fn new(next_cursor: Cursor, items: Vec<Item>) -> Self {
        Self { next_cursor, items }
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_start()
    }
}
