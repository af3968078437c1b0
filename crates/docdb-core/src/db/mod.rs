//! Document collections over a relational backend.
//!
//! [`Collection`] owns one connection and hands out [`OperationBuilder`]
//! chains. Each terminal call compiles exactly one [`CompiledOperation`]
//! (or, for multi-document merge/patch, a select followed by per-document
//! replaces) and runs it through the [`Connection`] contract.

pub mod backend;
pub mod compiled;
pub mod operation;

pub(crate) mod compile;
pub(crate) mod payload;
pub(crate) mod sql;

mod collection;
mod coordinator;
mod cursor;
mod document;

pub use backend::{
    BackendError, BindValue, CancelHandle, Capabilities, ColumnValue, Connection, Execution, Row,
};
pub use collection::Collection;
pub use compiled::{CommandShape, CompiledOperation, OperationFingerprint, ResultShape};
pub use coordinator::PatchOutcome;
pub use cursor::ResultCursor;
pub use document::Document;
pub use operation::{ExplainLevel, OperationBuilder, OperationError, TerminalIntent};
