//! Key introspection helpers
//!
//! Maps raw Redis replies to the scan data model:
//! - TTL replies (-1 = no expiry, -2 = key doesn't exist)
//! - The cardinality command to use for each key type
//! - Redis errors to the scan error taxonomy
//! - `SCAN` replies, with binary-safe key decoding

use keyscope_core::{Cursor, Item, ItemKind, Result, ScanBatch, ScanError, Ttl};

/// TTL reply meaning the key does not exist
pub const TTL_MISSING: i64 = -2;
/// TTL reply meaning the key has no expiry
pub const TTL_PERSISTENT: i64 = -1;

/// Interpret a `TTL` reply. `None` means the key is gone.
pub fn ttl_from_reply(ttl: i64) -> Option<Ttl> {
    match ttl {
        TTL_MISSING => None,
        n if n < 0 => Some(Ttl::NoExpiry),
        n => Some(Ttl::Seconds(n as u64)),
    }
}

/// Command that reports the size of a key of the given kind
///
/// Strings and module types have no cardinality and count as a single value.
pub fn size_command(kind: &ItemKind) -> Option<&'static str> {
    match kind {
        ItemKind::List => Some("LLEN"),
        ItemKind::Set => Some("SCARD"),
        ItemKind::Zset => Some("ZCARD"),
        ItemKind::Hash => Some("HLEN"),
        ItemKind::Stream => Some("XLEN"),
        ItemKind::String | ItemKind::Unknown(_) => None,
    }
}

/// Whether a `TYPE` reply means the key is gone
pub fn is_missing_type(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("none")
}

/// Decode a `SCAN` reply: `[next_cursor, [key, ...]]`
///
/// Keys are read as raw bytes; one that is not valid UTF-8 is listed with
/// replacement characters instead of failing the batch.
pub fn parse_scan_reply(reply: &redis::Value) -> Result<ScanBatch> {
    let (next, keys): (String, Vec<Vec<u8>>) =
        redis::from_redis_value(reply).map_err(|e| classify_error(&e))?;
    let items = keys
        .into_iter()
        .map(|raw| Item::new(key_from_bytes(raw)))
        .collect();
    Ok(ScanBatch::new(Cursor::new(next), items))
}

/// Key name for display, lossy when the key is not valid UTF-8
pub fn key_from_bytes(raw: Vec<u8>) -> String {
    match String::from_utf8(raw) {
        Ok(key) => key,
        Err(err) => {
            let key = String::from_utf8_lossy(err.as_bytes()).into_owned();
            tracing::debug!(key = %key, "key is not valid UTF-8, listing it lossily");
            key
        }
    }
}

/// Interpret the `TYPE` and `TTL` replies for one key
pub fn kind_and_ttl(
    id: &str,
    type_reply: &redis::Value,
    ttl_reply: &redis::Value,
) -> Result<(ItemKind, Ttl)> {
    let tag: String = redis::from_redis_value(type_reply).map_err(|e| classify_error(&e))?;
    if is_missing_type(&tag) {
        return Err(ScanError::NotFound(id.to_string()));
    }
    let ttl: i64 = redis::from_redis_value(ttl_reply).map_err(|e| classify_error(&e))?;
    let ttl = ttl_from_reply(ttl).ok_or_else(|| ScanError::NotFound(id.to_string()))?;
    Ok((ItemKind::from_type_tag(&tag), ttl))
}

/// Interpret the reply of a cardinality command
pub fn size_from_reply(reply: &redis::Value) -> Result<u64> {
    redis::from_redis_value(reply).map_err(|e| classify_error(&e))
}

/// Map a Redis error onto the scan error taxonomy
///
/// Transport problems become `SourceUnavailable` so the session reports the
/// connection as lost; anything the server answered with becomes `Source`.
pub fn classify_error(err: &redis::RedisError) -> ScanError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        ScanError::SourceUnavailable(err.to_string())
    } else {
        ScanError::Source(err.to_string())
    }
}
