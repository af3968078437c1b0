//! Operation builder: the fluent chain between `Collection::find()` and a
//! terminal call.
//!
//! Setters validate eagerly and clear whatever state they override.
//! Nothing reaches the backend until a terminal call compiles the chain.

mod execute;
mod intent;
mod state;
#[cfg(test)]
mod tests;

pub use intent::{ExplainLevel, TerminalIntent};
pub use state::{
    AsOf, KeyOrder, KeyPattern, KeyRange, Projection, ProjectionSpec, Selector, SelectorKind,
    TimeConstraint,
};

pub(crate) use state::{OperationState, ReadContent};

use crate::{
    config::KeySqlType,
    db::{Collection, backend::Connection},
    error::{Error, ErrorClass},
    key::KeyCodec,
    timestamp::{TimestampError, canonical_timestamp},
    version::VersionError,
};
use serde_json::Value;
use thiserror::Error as ThisError;

///
/// OperationBuilder
///
/// Created per operation chain, mutated by chained setters, and consumed by
/// exactly one terminal call.
///

pub struct OperationBuilder<'c, C: Connection> {
    collection: &'c Collection<C>,
    state: OperationState,
}

impl<'c, C: Connection> OperationBuilder<'c, C> {
    pub(crate) fn new(collection: &'c Collection<C>) -> Self {
        Self {
            collection,
            state: OperationState::default(),
        }
    }

    // ------------------------------------------------------------------
    // Selectors
    // ------------------------------------------------------------------

    /// Target one document by key.
    pub fn key(mut self, key: &str) -> Result<Self, Error> {
        let key = self.codec().canonicalize(key)?;
        self.state.set_selector(Selector::Key(key));

        Ok(self)
    }

    /// Target a set of documents by key. Duplicates are dropped.
    pub fn keys<I, S>(mut self, keys: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = self.codec().canonicalize_all(keys)?;
        if keys.is_empty() {
            return Err(OperationError::EmptyKeySet.into());
        }
        self.state.set_selector(Selector::Keys(keys));

        Ok(self)
    }

    /// Target keys matching a `LIKE` pattern. Text keys only.
    pub fn key_like(mut self, pattern: &str, escape: Option<char>) -> Result<Self, Error> {
        if self.collection.config().key().sql_type != KeySqlType::Varchar {
            return Err(OperationError::PatternRequiresVarchar.into());
        }
        if pattern.is_empty() {
            return Err(OperationError::EmptyPattern.into());
        }
        self.state.set_selector(Selector::Like(KeyPattern {
            pattern: pattern.to_string(),
            escape,
        }));

        Ok(self)
    }

    /// Target keys from `start` onward; results are ordered in the range
    /// direction.
    pub fn start_key(
        mut self,
        start: &str,
        ascending: bool,
        inclusive: bool,
    ) -> Result<Self, Error> {
        let start = self.codec().canonicalize(start)?;
        self.state.set_selector(Selector::Range(KeyRange {
            start,
            ascending,
            inclusive,
        }));

        Ok(self)
    }

    /// Effective selector, if any.
    #[must_use]
    pub const fn selector(&self) -> Option<&Selector> {
        self.state.selector.as_ref()
    }

    // ------------------------------------------------------------------
    // Filter
    // ------------------------------------------------------------------

    /// Query-by-example filter. Compiled at the terminal call.
    pub fn filter(mut self, filter: Value) -> Result<Self, Error> {
        if !filter.is_object() {
            return Err(OperationError::InvalidFilter {
                reason: "filter must be a JSON object".to_string(),
            }
            .into());
        }
        self.state.filter = Some(filter);

        Ok(self)
    }

    /// Parse and set a query-by-example filter from JSON text.
    pub fn filter_json(self, filter: &str) -> Result<Self, Error> {
        let value = serde_json::from_str(filter).map_err(|err| OperationError::InvalidFilter {
            reason: err.to_string(),
        })?;

        self.filter(value)
    }

    // ------------------------------------------------------------------
    // Modifiers
    // ------------------------------------------------------------------

    /// Require the document's current version to equal `version`.
    pub fn version(mut self, version: &str) -> Result<Self, Error> {
        if self.collection.config().version().is_none() {
            return Err(VersionError::MissingColumn {
                operation: "version precondition",
            }
            .into());
        }
        if version.trim().is_empty() {
            return Err(OperationError::EmptyVersion.into());
        }
        self.state.version = Some(version.trim().to_string());

        Ok(self)
    }

    /// Require the document's last-modified timestamp to equal `timestamp`.
    /// Replaces any time range.
    pub fn last_modified(mut self, timestamp: &str) -> Result<Self, Error> {
        self.require_last_modified("last-modified precondition")?;
        let canonical = canonical_timestamp(timestamp).map_err(OperationError::from)?;
        self.state.time = Some(TimeConstraint::LastModified(canonical));

        Ok(self)
    }

    /// Restrict to documents modified after `since` and before `until`.
    /// Replaces any last-modified precondition.
    pub fn time_range(
        mut self,
        since: Option<&str>,
        until: Option<&str>,
        inclusive: bool,
    ) -> Result<Self, Error> {
        self.require_last_modified("time range")?;
        if since.is_none() && until.is_none() {
            return Err(OperationError::EmptyTimeRange.into());
        }
        let since = since
            .map(canonical_timestamp)
            .transpose()
            .map_err(OperationError::from)?;
        let until = until
            .map(canonical_timestamp)
            .transpose()
            .map_err(OperationError::from)?;
        self.state.time = Some(TimeConstraint::Range {
            since,
            until,
            inclusive,
        });

        Ok(self)
    }

    /// Read as of a snapshot sequence number. Replaces a timestamp marker.
    #[must_use]
    pub fn as_of_scn(mut self, scn: u64) -> Self {
        self.state.as_of = Some(AsOf::Scn(scn));
        self
    }

    /// Read as of a timestamp. Replaces a sequence-number marker.
    pub fn as_of_timestamp(mut self, timestamp: &str) -> Result<Self, Error> {
        let canonical = canonical_timestamp(timestamp).map_err(OperationError::from)?;
        self.state.as_of = Some(AsOf::Timestamp(canonical));

        Ok(self)
    }

    /// Lock selected rows for update.
    pub fn lock(mut self) -> Result<Self, Error> {
        if self.state.is_paged() {
            return Err(OperationError::LockWithPaging.into());
        }
        self.state.lock = true;

        Ok(self)
    }

    /// Shape returned content. Replaces header-only.
    pub fn project(mut self, spec: &Value) -> Result<Self, Error> {
        if !self.collection.config().is_json_only() {
            return Err(OperationError::ProjectionRequiresJson.into());
        }
        let spec = ProjectionSpec::parse(spec)
            .map_err(|reason| OperationError::InvalidProjection { reason })?;
        self.state.projection = Some(Projection::Spec(spec));

        Ok(self)
    }

    /// Return headers without content. Replaces any projection.
    #[must_use]
    pub fn header_only(mut self) -> Self {
        self.state.projection = Some(Projection::HeaderOnly);
        self
    }

    pub fn limit(mut self, limit: u32) -> Result<Self, Error> {
        if limit == 0 {
            return Err(OperationError::NonPositiveLimit.into());
        }
        if self.state.lock {
            return Err(OperationError::LockWithPaging.into());
        }
        self.state.limit = Some(limit);

        Ok(self)
    }

    pub fn skip(mut self, skip: u64) -> Result<Self, Error> {
        if self.state.lock {
            return Err(OperationError::LockWithPaging.into());
        }
        self.state.skip = Some(skip);

        Ok(self)
    }

    #[must_use]
    pub fn order_by_key(mut self) -> Self {
        self.state.key_order = KeyOrder::Ascending;
        self
    }

    #[must_use]
    pub fn order_by_key_desc(mut self) -> Self {
        self.state.key_order = KeyOrder::Descending;
        self
    }

    /// Optimizer hint text, emitted as a hint comment.
    pub fn hint(mut self, hint: &str) -> Result<Self, Error> {
        if hint.contains("*/") {
            return Err(OperationError::InvalidHint.into());
        }
        self.state.hint = Some(hint.trim().to_string()).filter(|hint| !hint.is_empty());

        Ok(self)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn codec(&self) -> KeyCodec<'_> {
        KeyCodec::new(self.collection.config().key())
    }

    fn require_last_modified(&self, operation: &'static str) -> Result<(), Error> {
        if self.collection.config().last_modified().is_none() {
            return Err(VersionError::MissingLastModified { operation }.into());
        }

        Ok(())
    }
}

///
/// OperationError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum OperationError {
    #[error("key set must not be empty")]
    EmptyKeySet,

    #[error("key pattern must not be empty")]
    EmptyPattern,

    #[error("invalid filter: {reason}")]
    InvalidFilter { reason: String },

    #[error("version token must not be empty")]
    EmptyVersion,

    #[error("invalid timestamp '{input}': expected RFC 3339")]
    InvalidTimestamp { input: String },

    #[error("time range needs a lower or an upper bound")]
    EmptyTimeRange,

    #[error("limit must be positive")]
    NonPositiveLimit,

    #[error("row lock cannot be combined with skip or limit")]
    LockWithPaging,

    #[error("invalid projection: {reason}")]
    InvalidProjection { reason: String },

    #[error("hint must not contain a comment terminator")]
    InvalidHint,

    #[error("{option} is not allowed for {intent}")]
    IncompatibleWithIntent {
        option: &'static str,
        intent: &'static str,
    },

    #[error("{intent} requires a single-key selector")]
    KeyRequired { intent: &'static str },

    #[error("document content is required")]
    ContentRequired,

    #[error("{intent} needs a document; use the terminal call instead")]
    PayloadRequired { intent: &'static str },

    #[error("collection '{collection}' is read-only")]
    ReadOnly { collection: String },

    #[error("key patterns require a VARCHAR key column")]
    PatternRequiresVarchar,

    #[error("projection requires a JSON-only collection")]
    ProjectionRequiresJson,

    #[error("row locks are not supported on views")]
    LockOnView,

    #[error("point-in-time reads are not supported on duality views")]
    AsOfOnDualityView,

    #[error("save requires a key known before the write; {assignment} keys are generated")]
    SaveRequiresKnownKey { assignment: &'static str },

    #[error("expected at most one document, matched {matched}")]
    NotUnique { matched: usize },
}

impl OperationError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::ReadOnly { .. }
            | Self::PatternRequiresVarchar
            | Self::ProjectionRequiresJson
            | Self::LockOnView
            | Self::AsOfOnDualityView
            | Self::SaveRequiresKnownKey { .. } => ErrorClass::Unsupported,
            Self::NotUnique { .. } => ErrorClass::NotUnique,
            _ => ErrorClass::InvalidArgument,
        }
    }
}

impl From<TimestampError> for OperationError {
    fn from(err: TimestampError) -> Self {
        Self::InvalidTimestamp { input: err.input }
    }
}
