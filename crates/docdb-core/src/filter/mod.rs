//! Filter compiler contract.
//!
//! A filter compiler turns a query-by-example document into a predicate
//! fragment, its ordered binds, literal keys pulled from `$id`, an optional
//! ordering clause, and the list of clause kinds it cannot execute.

mod qbe;

pub use qbe::QbeCompiler;
pub(crate) use qbe::json_path;

use crate::db::backend::BindValue;
use serde_json::Value;
use thiserror::Error as ThisError;

///
/// FilterCompiler
///

pub trait FilterCompiler {
    fn compile(&self, filter: &Value, context: &FilterContext<'_>)
    -> Result<CompiledFilter, FilterError>;
}

///
/// FilterContext
/// Collection facts a filter compiler needs to emit SQL.
///

#[derive(Clone, Copy, Debug)]
pub struct FilterContext<'a> {
    pub content_column: &'a str,
    pub key_column: &'a str,

    /// Use strict path semantics instead of lax.
    pub strict: bool,
}

///
/// CompiledFilter
///
/// Every `?` placeholder in `predicate` has one entry in `binds`, in order.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CompiledFilter {
    pub predicate: Option<String>,
    pub binds: Vec<BindValue>,
    pub literal_keys: Vec<String>,
    pub order_by: Option<FilterOrdering>,
    pub unsupported_clauses: Vec<String>,
}

impl CompiledFilter {
    #[must_use]
    pub const fn has_literal_keys(&self) -> bool {
        !self.literal_keys.is_empty()
    }

    #[must_use]
    pub const fn uses_unsupported_clauses(&self) -> bool {
        !self.unsupported_clauses.is_empty()
    }
}

///
/// FilterOrdering
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilterOrdering {
    /// Comma-separated ORDER BY items, without the `ORDER BY` keyword.
    pub fragment: String,

    /// The ordering already ends with the key column.
    pub covers_key: bool,
}

///
/// FilterError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum FilterError {
    #[error("filter must be a JSON object")]
    NotObject,

    #[error("unknown filter operator '{op}'")]
    UnknownOperator { op: String },

    #[error("invalid operand for '{op}': {reason}")]
    InvalidOperand { op: String, reason: String },

    #[error("invalid field path '{path}'")]
    InvalidPath { path: String },

    #[error("'$id' is only allowed at the top level of a filter")]
    MisplacedId,

    #[error("invalid $orderby: {reason}")]
    InvalidOrderBy { reason: String },

    #[error("filter uses unsupported clause kinds: {}", clauses.join(", "))]
    UnsupportedClause { clauses: Vec<String> },

    #[error("'$id' clauses are not allowed for this operation")]
    IdClauseNotAllowed,
}
