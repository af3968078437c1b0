//! Core runtime for docdb: collection configuration, key and version codecs,
//! the filter compiler, and the operation compiler that turns fluent
//! document operations into one parameterized backend command.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod key;
pub mod obs;
pub mod patch;
pub mod settings;
pub mod timestamp;
pub mod version;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Default maximum number of bind slots in one `IN (...)` group.
///
/// Larger key sets are split into several groups combined with `OR`.
pub const DEFAULT_IN_LIST_CHUNK: usize = 1000;

/// Default number of keys fetched per sequence/GUID key-cache refill.
pub const DEFAULT_KEY_BATCH_SIZE: usize = 100;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
///

pub mod prelude {
    pub use crate::{
        config::{CollectionConfig, KeyAssignment, VersionMethod},
        db::{Collection, Connection, Document, OperationBuilder},
        error::Error,
        key::Key,
    };
}
