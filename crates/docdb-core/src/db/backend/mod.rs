//! Backend connection contract.
//!
//! The operation compiler never talks to a driver directly; it hands
//! compiled operations to a [`Connection`] and reads rows back.

use crate::db::compiled::CompiledOperation;
use std::fmt;
use thiserror::Error as ThisError;

///
/// Connection
///
/// One backend session. Calls are blocking and strictly sequential; the
/// collection handle guarantees at most one in-flight call per connection.
///

pub trait Connection {
    type Canceller: CancelHandle + 'static;

    /// Report optional backend features. Called once per collection handle.
    fn probe(&mut self) -> Result<Capabilities, BackendError>;

    /// Execute one compiled operation.
    fn execute(&mut self, operation: &CompiledOperation) -> Result<Execution, BackendError>;

    fn auto_commit(&mut self) -> Result<bool, BackendError>;

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), BackendError>;

    fn commit(&mut self) -> Result<(), BackendError>;

    fn rollback(&mut self) -> Result<(), BackendError>;

    /// Handle that can interrupt this connection's calls from another thread.
    fn cancel_handle(&self) -> Self::Canceller;
}

///
/// CancelHandle
///
/// Obtained before a call starts and used while it is in flight.
///

pub trait CancelHandle: Send + Sync {
    /// Best-effort, advisory. A call that has already finished is unaffected.
    fn cancel(&self) -> Result<(), BackendError>;
}

///
/// Capabilities
///
/// Capability negotiation result for one connection.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Capabilities {
    /// Writes can report generated/updated column values natively.
    pub returning_clause: bool,

    /// Filters may use lax path semantics.
    pub relaxed_filters: bool,
}

impl Capabilities {
    #[must_use]
    pub const fn new(returning_clause: bool, relaxed_filters: bool) -> Self {
        Self {
            returning_clause,
            relaxed_filters,
        }
    }
}

///
/// BindValue
///
/// Typed input bind. Booleans and nulls travel as strings.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BindValue {
    Text(String),
    /// Decimal number text.
    Number(String),
    Bool(bool),
    Null,
    Int(i64),
    Bytes(Vec<u8>),
}

impl BindValue {
    /// Text form a string-typed slot receives for this value.
    #[must_use]
    pub fn wire_text(&self) -> Option<String> {
        match self {
            Self::Text(text) | Self::Number(text) => Some(text.clone()),
            Self::Bool(value) => Some(value.to_string()),
            Self::Null => Some("null".to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Bytes(_) => None,
        }
    }
}

impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            other => write!(f, "{}", other.wire_text().unwrap_or_default()),
        }
    }
}

///
/// ColumnValue
/// One decoded result column.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColumnValue {
    Null,
    Text(String),
    Int(i64),
    Bytes(Vec<u8>),
}

///
/// Row
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Row(pub Vec<ColumnValue>);

impl Row {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ColumnValue> {
        self.0.get(index)
    }
}

impl FromIterator<ColumnValue> for Row {
    fn from_iter<T: IntoIterator<Item = ColumnValue>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

///
/// Execution
///
/// Outcome of one execution: affected-row count for writes, plus any rows
/// (query results, or returned/output-slot values for writes).
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Execution {
    pub rows_affected: u64,
    pub rows: Vec<Row>,
}

impl Execution {
    #[must_use]
    pub const fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub const fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows_affected: 0,
            rows,
        }
    }

    #[must_use]
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }
}

///
/// BackendError
/// Failure reported by the backend driver.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub code: Option<i32>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub const fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}
