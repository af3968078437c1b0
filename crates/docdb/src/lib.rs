//! ## Crate layout
//! - `core`: collection configuration, key/version codecs, the filter
//!   compiler, and the operation compiler.
//! - `db`: collections, fluent operation builders, compiled operations, and
//!   the backend connection contract.
//! - `error`: the shared error taxonomy.
//!
//! The `prelude` module carries what application code needs to open a
//! collection and run operations against it.

pub use docdb_core as core;

pub use docdb_core::{config, db, error, filter, key, patch, settings, version};

/// re-exports
///
/// filters and projections are JSON values; callers build them without
/// adding serde_json themselves
#[doc(hidden)]
pub mod __reexports {
    pub use serde_json;
}

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use docdb_core::error::Error;

///
/// Prelude
///

pub mod prelude {
    pub use docdb_core::{
        config::{CollectionConfig, KeyAssignment, KeySqlType, ObjectKind, VersionMethod},
        db::{
            CancelHandle, Collection, CompiledOperation, Connection, Document, ExplainLevel,
            OperationBuilder, PatchOutcome, ResultCursor,
        },
        error::{Error, ErrorClass},
        settings::CompilerSettings,
    };
    pub use serde_json::json;
}
