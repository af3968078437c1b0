use crate::{
    config::{CollectionConfig, ObjectKind},
    db::operation::{OperationError, state::OperationState},
};

///
/// TerminalIntent
///
/// The terminal call that consumes a fluent chain. It decides which
/// accumulated options are legal.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminalIntent {
    Count,
    GetOne,
    GetCursor,
    Remove,
    Replace,
    ReplaceAndGet,
    Merge,
    MergeAndGet,
    Patch,
    PatchAndGet,
    Explain(ExplainLevel),
}

impl TerminalIntent {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::GetOne => "get_one",
            Self::GetCursor => "get_cursor",
            Self::Remove => "remove",
            Self::Replace => "replace",
            Self::ReplaceAndGet => "replace_and_get",
            Self::Merge => "merge",
            Self::MergeAndGet => "merge_and_get",
            Self::Patch => "patch",
            Self::PatchAndGet => "patch_and_get",
            Self::Explain(_) => "explain",
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::Remove
                | Self::Replace
                | Self::ReplaceAndGet
                | Self::Merge
                | Self::MergeAndGet
                | Self::Patch
                | Self::PatchAndGet
        )
    }

    /// Writes that hand back the resulting document headers.
    #[must_use]
    pub const fn returns_documents(self) -> bool {
        matches!(
            self,
            Self::ReplaceAndGet | Self::MergeAndGet | Self::PatchAndGet
        )
    }

    /// Writes that target exactly one document by key.
    #[must_use]
    pub const fn is_single_document_write(self) -> bool {
        matches!(self, Self::Replace | Self::ReplaceAndGet)
    }

    /// Check every accumulated option against this intent and the collection.
    pub(crate) fn validate(
        self,
        state: &OperationState,
        config: &CollectionConfig,
    ) -> Result<(), OperationError> {
        let incompatible = |option: &'static str| OperationError::IncompatibleWithIntent {
            option,
            intent: self.label(),
        };

        if state.lock {
            if config.object_kind().is_view() {
                return Err(OperationError::LockOnView);
            }
            if state.as_of.is_some() {
                return Err(incompatible("point-in-time read with lock"));
            }
        }
        if state.as_of.is_some() && config.object_kind() == ObjectKind::DualityView {
            return Err(OperationError::AsOfOnDualityView);
        }

        if self.is_write() {
            if config.is_read_only() {
                return Err(OperationError::ReadOnly {
                    collection: config.name().to_string(),
                });
            }
            if state.as_of.is_some() {
                return Err(incompatible("point-in-time read"));
            }
            if state.skip.is_some() {
                return Err(incompatible("skip"));
            }
            if state.limit.is_some() {
                return Err(incompatible("limit"));
            }
            if state.lock {
                return Err(incompatible("lock"));
            }
            if state.projection.is_some() {
                return Err(incompatible("projection"));
            }
        }

        match self {
            Self::Count => {
                if state.skip.is_some() {
                    return Err(incompatible("skip"));
                }
                if state.limit.is_some() {
                    return Err(incompatible("limit"));
                }
                if state.lock {
                    return Err(incompatible("lock"));
                }
            }
            Self::Replace | Self::ReplaceAndGet if !state.is_single_key() => {
                return Err(OperationError::KeyRequired {
                    intent: self.label(),
                });
            }
            _ => {}
        }

        Ok(())
    }
}

///
/// ExplainLevel
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ExplainLevel {
    Basic,
    #[default]
    Typical,
    All,
}

impl ExplainLevel {
    /// Plan display format name.
    #[must_use]
    pub const fn format(self) -> &'static str {
        match self {
            Self::Basic => "BASIC",
            Self::Typical => "TYPICAL",
            Self::All => "ALL",
        }
    }
}
