use crate::{
    config::ConfigError,
    db::{backend::BackendError, operation::OperationError},
    filter::FilterError,
    key::KeyError,
    patch::PatchSpecError,
    version::VersionError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured runtime error with a stable classification.
///
/// Backend failures carry the compiled command text they were raised for.
/// Failures raised before a command was compiled never do.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct Error {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    #[source]
    pub detail: Option<ErrorDetail>,

    command: Option<String>,
    secondary: Option<Box<Self>>,
}

impl Error {
    /// Construct an error without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
            command: None,
            secondary: None,
        }
    }

    /// Construct an `InvalidArgument` error for malformed caller input.
    pub(crate) fn invalid_argument(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvalidArgument, origin, message)
    }

    /// Construct an `Unsupported` error for combinations the collection cannot satisfy.
    pub(crate) fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message)
    }

    /// Construct an operation-origin internal error.
    pub(crate) fn operation_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Operation, message)
    }

    /// Construct a cursor-origin internal error.
    pub(crate) fn cursor_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Cursor, message)
    }

    /// Construct a backend failure decorated with the command being attempted.
    pub(crate) fn backend(err: BackendError, command: impl Into<String>) -> Self {
        let mut out = Self::from(err);
        out.command = Some(command.into());
        out
    }

    /// Construct a transaction-control failure (commit, rollback, auto-commit).
    pub(crate) fn transaction(err: BackendError, action: &str) -> Self {
        let class = match action {
            "commit" => ErrorClass::Backend,
            _ => ErrorClass::TransactionRecovery,
        };

        Self {
            class,
            origin: ErrorOrigin::Transaction,
            message: format!("{action} failed: {err}"),
            detail: Some(ErrorDetail::Backend(err)),
            command: None,
            secondary: None,
        }
    }

    /// Attach a secondary failure raised while recovering from this one.
    ///
    /// The first secondary is kept; later ones are chained behind it.
    #[must_use]
    pub fn with_secondary(mut self, secondary: Self) -> Self {
        self.secondary = Some(match self.secondary.take() {
            Some(existing) => Box::new(existing.with_secondary(secondary)),
            None => Box::new(secondary),
        });
        self
    }

    /// Compiled command text this error was raised for, if a command existed.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Secondary failure raised during recovery (rollback, auto-commit restore).
    #[must_use]
    pub fn secondary(&self) -> Option<&Self> {
        self.secondary.as_deref()
    }

    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self.class, ErrorClass::InvalidArgument)
    }

    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self.class, ErrorClass::Unsupported)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`Error`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Backend(BackendError),

    #[error("{0}")]
    Config(ConfigError),

    #[error("{0}")]
    Filter(FilterError),

    #[error("{0}")]
    Key(KeyError),

    #[error("{0}")]
    Operation(OperationError),

    #[error("{0}")]
    Patch(PatchSpecError),

    #[error("{0}")]
    Version(VersionError),
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Self {
            class: ErrorClass::Backend,
            origin: ErrorOrigin::Backend,
            message: err.to_string(),
            detail: Some(ErrorDetail::Backend(err)),
            command: None,
            secondary: None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self {
            class: ErrorClass::InvalidArgument,
            origin: ErrorOrigin::Config,
            message: err.to_string(),
            detail: Some(ErrorDetail::Config(err)),
            command: None,
            secondary: None,
        }
    }
}

impl From<FilterError> for Error {
    fn from(err: FilterError) -> Self {
        let class = match &err {
            FilterError::UnsupportedClause { .. } => ErrorClass::UnsupportedFilterClause,
            FilterError::IdClauseNotAllowed => ErrorClass::IdClauseNotAllowed,
            _ => ErrorClass::InvalidArgument,
        };

        Self {
            class,
            origin: ErrorOrigin::Filter,
            message: err.to_string(),
            detail: Some(ErrorDetail::Filter(err)),
            command: None,
            secondary: None,
        }
    }
}

impl From<KeyError> for Error {
    fn from(err: KeyError) -> Self {
        let class = match &err {
            KeyError::GenerationUnsupported { .. } => ErrorClass::Unsupported,
            KeyError::PartialBatch { .. } => ErrorClass::Internal,
            _ => ErrorClass::InvalidArgument,
        };

        Self {
            class,
            origin: ErrorOrigin::Key,
            message: err.to_string(),
            detail: Some(ErrorDetail::Key(err)),
            command: None,
            secondary: None,
        }
    }
}

impl From<OperationError> for Error {
    fn from(err: OperationError) -> Self {
        Self {
            class: err.class(),
            origin: ErrorOrigin::Operation,
            message: err.to_string(),
            detail: Some(ErrorDetail::Operation(err)),
            command: None,
            secondary: None,
        }
    }
}

impl From<PatchSpecError> for Error {
    fn from(err: PatchSpecError) -> Self {
        Self {
            class: ErrorClass::InvalidArgument,
            origin: ErrorOrigin::Patch,
            message: err.to_string(),
            detail: Some(ErrorDetail::Patch(err)),
            command: None,
            secondary: None,
        }
    }
}

impl From<VersionError> for Error {
    fn from(err: VersionError) -> Self {
        Self {
            class: ErrorClass::Unsupported,
            origin: ErrorOrigin::Version,
            message: err.to_string(),
            detail: Some(ErrorDetail::Version(err)),
            command: None,
            secondary: None,
        }
    }
}

///
/// ErrorClass
/// Error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    InvalidArgument,
    Unsupported,
    UnsupportedFilterClause,
    IdClauseNotAllowed,
    NotUnique,
    Backend,
    TransactionRecovery,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Unsupported => "unsupported",
            Self::UnsupportedFilterClause => "unsupported_filter_clause",
            Self::IdClauseNotAllowed => "id_clause_not_allowed",
            Self::NotUnique => "not_unique",
            Self::Backend => "backend",
            Self::TransactionRecovery => "transaction_recovery",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Config,
    Key,
    Version,
    Filter,
    Operation,
    Patch,
    Backend,
    Transaction,
    Cursor,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Key => "key",
            Self::Version => "version",
            Self::Filter => "filter",
            Self::Operation => "operation",
            Self::Patch => "patch",
            Self::Backend => "backend",
            Self::Transaction => "transaction",
            Self::Cursor => "cursor",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_carry_command_text() {
        let err = Error::backend(
            BackendError::new("ORA-00942: table or view does not exist"),
            "select 1 from \"T\"",
        );

        assert_eq!(err.class, ErrorClass::Backend);
        assert_eq!(err.command(), Some("select 1 from \"T\""));
    }

    #[test]
    fn filter_errors_never_carry_command_text() {
        let err = Error::from(FilterError::IdClauseNotAllowed);

        assert_eq!(err.class, ErrorClass::IdClauseNotAllowed);
        assert!(err.command().is_none());
    }

    #[test]
    fn secondary_errors_chain_without_replacing_primary() {
        let primary = Error::backend(BackendError::new("boom"), "update \"T\"");
        let rollback = Error::transaction(BackendError::new("rollback lost"), "rollback");
        let restore = Error::transaction(BackendError::new("restore lost"), "auto-commit restore");

        let err = primary.with_secondary(rollback).with_secondary(restore);

        assert_eq!(err.message, "boom");
        let first = err.secondary().expect("rollback error attached");
        assert_eq!(first.class, ErrorClass::TransactionRecovery);
        let second = first.secondary().expect("restore error chained");
        assert!(second.message.contains("restore lost"));
    }
}
