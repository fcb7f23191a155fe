//! Redis data source for keyscope
//!
//! Binds the `DataSource` contract to a Redis server: `SCAN` for cursor
//! enumeration, `TYPE`/`TTL` plus a per-type cardinality query for metadata,
//! and `DBSIZE` for the size estimate.

mod config;
mod driver;
#[cfg(test)]
mod driver_tests;
mod keys;
#[cfg(test)]
mod keys_tests;

pub use config::*;
pub use driver::*;
pub use keys::*;
