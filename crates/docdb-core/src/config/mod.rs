//! Collection configuration: the immutable physical layout of one collection.
//!
//! The compiler reads a configuration but never mutates it. Configurations are
//! built and validated through [`CollectionConfigBuilder`].

mod builder;

pub use builder::CollectionConfigBuilder;

use thiserror::Error as ThisError;

///
/// CollectionConfig
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollectionConfig {
    pub(crate) name: String,
    pub(crate) schema: Option<String>,
    pub(crate) table: String,
    pub(crate) object_kind: ObjectKind,
    pub(crate) key: KeyColumn,
    pub(crate) content: ContentColumn,
    pub(crate) version: Option<VersionColumn>,
    pub(crate) last_modified: Option<String>,
    pub(crate) created_on: Option<String>,
    pub(crate) media_type: Option<String>,
    pub(crate) read_only: bool,
}

impl CollectionConfig {
    /// Start building a configuration for `name` stored in `table`.
    #[must_use]
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> CollectionConfigBuilder {
        CollectionConfigBuilder::new(name, table)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub const fn object_kind(&self) -> ObjectKind {
        self.object_kind
    }

    #[must_use]
    pub const fn key(&self) -> &KeyColumn {
        &self.key
    }

    #[must_use]
    pub const fn content(&self) -> &ContentColumn {
        &self.content
    }

    #[must_use]
    pub const fn version(&self) -> Option<&VersionColumn> {
        self.version.as_ref()
    }

    #[must_use]
    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    #[must_use]
    pub fn created_on(&self) -> Option<&str> {
        self.created_on.as_deref()
    }

    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True when documents are JSON only (no per-document media type).
    #[must_use]
    pub const fn is_json_only(&self) -> bool {
        self.media_type.is_none()
    }

    /// Versioning method, or `None` when the collection has no version column.
    #[must_use]
    pub fn version_method(&self) -> Option<VersionMethod> {
        self.version.as_ref().map(|column| column.method)
    }
}

///
/// ObjectKind
/// Backend object a collection is mapped onto.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectKind {
    Table,
    View,
    DualityView,
}

impl ObjectKind {
    #[must_use]
    pub const fn is_view(self) -> bool {
        matches!(self, Self::View | Self::DualityView)
    }
}

///
/// KeyColumn
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyColumn {
    pub name: String,
    pub sql_type: KeySqlType,
    pub max_length: usize,
    pub assignment: KeyAssignment,
}

///
/// KeySqlType
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeySqlType {
    Varchar,
    Number,
    Raw,
}

///
/// KeyAssignment
/// How new keys come into existence.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyAssignment {
    /// Generated locally as a random UUID.
    Uuid,
    /// Generated by the backend in batches.
    Guid,
    /// Drawn from a named backend sequence in batches.
    Sequence(String),
    /// Always supplied by the caller.
    Client,
    /// Carried as `_id` inside the document body; generated when absent.
    Embedded,
    /// Assigned by the backend on insert and returned.
    Identity,
}

impl KeyAssignment {
    /// True when the caller is expected to supply keys.
    #[must_use]
    pub const fn is_client(&self) -> bool {
        matches!(self, Self::Client)
    }

    #[must_use]
    pub const fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded)
    }

    /// True when the backend, not the client, produces new keys.
    #[must_use]
    pub const fn is_backend_generated(&self) -> bool {
        matches!(self, Self::Guid | Self::Sequence(_) | Self::Identity)
    }
}

///
/// ContentColumn
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentColumn {
    pub name: String,
    pub sql_type: ContentSqlType,
}

///
/// ContentSqlType
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentSqlType {
    Blob,
    Clob,
    Varchar,
    Json,
}

impl ContentSqlType {
    /// SQL type named in `RETURNING` clauses of JSON operators.
    #[must_use]
    pub const fn returning_type(self) -> &'static str {
        match self {
            Self::Blob => "BLOB",
            Self::Clob => "CLOB",
            Self::Varchar => "VARCHAR2(4000)",
            Self::Json => "JSON",
        }
    }
}

///
/// VersionColumn
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionColumn {
    pub name: String,
    pub method: VersionMethod,
}

///
/// VersionMethod
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VersionMethod {
    /// The column exists but the backend maintains it.
    None,
    /// Counter incremented by the backend on every write.
    Sequential,
    /// Microseconds since the epoch at write time.
    Timestamp,
    Md5,
    Sha256,
    /// Random token per write.
    Uuid,
}

impl VersionMethod {
    /// True when the version is a digest of the payload bytes.
    #[must_use]
    pub const fn is_payload_derived(self) -> bool {
        matches!(self, Self::Md5 | Self::Sha256)
    }

    /// True when the backend computes the version and it must be returned.
    #[must_use]
    pub const fn is_backend_computed(self) -> bool {
        matches!(self, Self::None | Self::Sequential)
    }
}

///
/// ConfigError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ConfigError {
    #[error("collection name must not be empty")]
    EmptyName,

    #[error("{column} column name must not be empty")]
    EmptyColumnName { column: &'static str },

    #[error("key max length must be between 1 and {max}, found {found}")]
    KeyLength { max: usize, found: usize },

    #[error("sequence key assignment requires a sequence name")]
    MissingSequenceName,

    #[error("embedded keys require a VARCHAR key column")]
    EmbeddedKeyType,

    #[error("column '{name}' is mapped more than once")]
    DuplicateColumn { name: String },

    #[error("duality views require an embedded key")]
    DualityViewKey,
}
