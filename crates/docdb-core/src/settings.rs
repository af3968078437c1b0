use crate::{DEFAULT_IN_LIST_CHUNK, DEFAULT_KEY_BATCH_SIZE};

///
/// CompilerSettings
///
/// Tunables shared by every operation compiled through one collection handle.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CompilerSettings {
    /// Maximum keys per `IN (...)` group.
    pub in_list_chunk: usize,

    /// Keys fetched per sequence/GUID cache refill.
    pub key_batch_size: usize,

    /// Force strict path semantics in filters even when the backend
    /// reports relaxed filter support.
    pub strict_filters: bool,
}

impl CompilerSettings {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_list_chunk: DEFAULT_IN_LIST_CHUNK,
            key_batch_size: DEFAULT_KEY_BATCH_SIZE,
            strict_filters: false,
        }
    }

    #[must_use]
    pub const fn in_list_chunk(mut self, chunk: usize) -> Self {
        // zero would never make progress
        self.in_list_chunk = if chunk == 0 { 1 } else { chunk };
        self
    }

    #[must_use]
    pub const fn key_batch_size(mut self, size: usize) -> Self {
        self.key_batch_size = if size == 0 { 1 } else { size };
        self
    }

    #[must_use]
    pub const fn strict_filters(mut self, strict: bool) -> Self {
        self.strict_filters = strict;
        self
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self::new()
    }
}
