//! Keyscope Core - incremental key-space scanning
//!
//! This crate provides the backend-independent pieces of the key browser:
//!
//! - `DataSource` - Trait for key-value backends that enumerate with a cursor
//! - `ScanSession` - Drives a cursor scan on a worker task, publishing progress
//! - `ResultFilter` - Live substring filter over the accumulated items
//! - Common types like `Cursor`, `Item`, `ItemMetadata`

mod error;
mod filter;
#[cfg(test)]
mod filter_tests;
mod session;
#[cfg(test)]
mod session_tests;
mod source;
mod store;
#[cfg(test)]
mod test_support;
mod types;
#[cfg(test)]
mod types_tests;

pub use error::*;
pub use filter::*;
pub use session::*;
pub use source::*;
pub use store::ItemStore;
pub use types::*;
