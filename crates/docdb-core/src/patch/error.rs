use thiserror::Error as ThisError;

///
/// PatchSpecError
///
/// Structured failures for user-supplied merge and JSON patch specs.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PatchSpecError {
    #[error("patch spec is not valid JSON: {message}")]
    InvalidJson { message: String },

    #[error("invalid patch shape: expected {expected}, found {actual}")]
    InvalidShape {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("patch spec must contain at least one operation")]
    Empty,

    #[error("unknown patch operation '{op}'")]
    UnknownOp { op: String },

    #[error("patch operation is missing '{member}'")]
    MissingMember { member: &'static str },

    #[error("invalid JSON pointer '{pointer}'")]
    InvalidPointer { pointer: String },

    #[error("patch spec invalid at {path}: {source}")]
    Context {
        path: String,
        #[source]
        source: Box<Self>,
    },
}

impl PatchSpecError {
    /// Prepend a member segment to the error path.
    #[must_use]
    pub fn with_field(self, field: impl AsRef<str>) -> Self {
        self.with_path_segment(field.as_ref())
    }

    /// Prepend an index segment to the error path.
    #[must_use]
    pub fn with_index(self, index: usize) -> Self {
        self.with_path_segment(format!("[{index}]"))
    }

    /// Return the full contextual path, if available.
    #[must_use]
    pub const fn path(&self) -> Option<&str> {
        match self {
            Self::Context { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Return the innermost, non-context error variant.
    #[must_use]
    pub fn leaf(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.leaf(),
            _ => self,
        }
    }

    fn with_path_segment(self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        match self {
            Self::Context { path, source } => Self::Context {
                path: join_segments(segment.as_str(), path.as_str()),
                source,
            },
            source => Self::Context {
                path: segment,
                source: Box::new(source),
            },
        }
    }
}

fn join_segments(prefix: &str, suffix: &str) -> String {
    if suffix.starts_with('[') {
        format!("{prefix}{suffix}")
    } else {
        format!("{prefix}.{suffix}")
    }
}
