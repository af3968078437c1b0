use crate::config::{
    CollectionConfig, ConfigError, ContentColumn, ContentSqlType, KeyAssignment, KeyColumn,
    KeySqlType, ObjectKind, VersionColumn, VersionMethod,
};
use std::collections::BTreeSet;

/// Upper bound on declared key length, in bytes.
pub const MAX_KEY_LENGTH: usize = 255;

///
/// CollectionConfigBuilder
///
/// Builder for [`CollectionConfig`]. Defaults match a plain JSON table with
/// UUID keys, BLOB content and SHA-256 versions.
///

#[derive(Clone, Debug)]
pub struct CollectionConfigBuilder {
    name: String,
    schema: Option<String>,
    table: String,
    object_kind: ObjectKind,
    key: KeyColumn,
    content: ContentColumn,
    version: Option<VersionColumn>,
    last_modified: Option<String>,
    created_on: Option<String>,
    media_type: Option<String>,
    read_only: bool,
}

impl CollectionConfigBuilder {
    pub(crate) fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            table: table.into(),
            object_kind: ObjectKind::Table,
            key: KeyColumn {
                name: "ID".to_string(),
                sql_type: KeySqlType::Varchar,
                max_length: 255,
                assignment: KeyAssignment::Uuid,
            },
            content: ContentColumn {
                name: "JSON_DOCUMENT".to_string(),
                sql_type: ContentSqlType::Blob,
            },
            version: Some(VersionColumn {
                name: "VERSION".to_string(),
                method: VersionMethod::Sha256,
            }),
            last_modified: Some("LAST_MODIFIED".to_string()),
            created_on: Some("CREATED_ON".to_string()),
            media_type: None,
            read_only: false,
        }
    }

    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub const fn object_kind(mut self, kind: ObjectKind) -> Self {
        self.object_kind = kind;
        self
    }

    /// Set the key column layout.
    #[must_use]
    pub fn key_column(
        mut self,
        name: impl Into<String>,
        sql_type: KeySqlType,
        max_length: usize,
    ) -> Self {
        self.key.name = name.into();
        self.key.sql_type = sql_type;
        self.key.max_length = max_length;
        self
    }

    #[must_use]
    pub fn key_assignment(mut self, assignment: KeyAssignment) -> Self {
        self.key.assignment = assignment;
        self
    }

    #[must_use]
    pub fn content_column(mut self, name: impl Into<String>, sql_type: ContentSqlType) -> Self {
        self.content = ContentColumn {
            name: name.into(),
            sql_type,
        };
        self
    }

    #[must_use]
    pub fn version_column(mut self, name: impl Into<String>, method: VersionMethod) -> Self {
        self.version = Some(VersionColumn {
            name: name.into(),
            method,
        });
        self
    }

    #[must_use]
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    #[must_use]
    pub fn last_modified_column(mut self, name: impl Into<String>) -> Self {
        self.last_modified = Some(name.into());
        self
    }

    #[must_use]
    pub fn without_last_modified(mut self) -> Self {
        self.last_modified = None;
        self
    }

    #[must_use]
    pub fn created_on_column(mut self, name: impl Into<String>) -> Self {
        self.created_on = Some(name.into());
        self
    }

    #[must_use]
    pub fn without_created_on(mut self) -> Self {
        self.created_on = None;
        self
    }

    #[must_use]
    pub fn media_type_column(mut self, name: impl Into<String>) -> Self {
        self.media_type = Some(name.into());
        self
    }

    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<CollectionConfig, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::EmptyColumnName { column: "table" });
        }
        if self.key.max_length == 0 || self.key.max_length > MAX_KEY_LENGTH {
            return Err(ConfigError::KeyLength {
                max: MAX_KEY_LENGTH,
                found: self.key.max_length,
            });
        }
        if let KeyAssignment::Sequence(name) = &self.key.assignment
            && name.trim().is_empty()
        {
            return Err(ConfigError::MissingSequenceName);
        }
        if self.key.assignment.is_embedded() && self.key.sql_type != KeySqlType::Varchar {
            return Err(ConfigError::EmbeddedKeyType);
        }
        if self.object_kind == ObjectKind::DualityView && !self.key.assignment.is_embedded() {
            return Err(ConfigError::DualityViewKey);
        }

        self.validate_columns()?;

        Ok(CollectionConfig {
            name: self.name,
            schema: self.schema,
            table: self.table,
            object_kind: self.object_kind,
            key: self.key,
            content: self.content,
            version: self.version,
            last_modified: self.last_modified,
            created_on: self.created_on,
            media_type: self.media_type,
            read_only: self.read_only,
        })
    }

    // Every mapped column must be named and distinct.
    fn validate_columns(&self) -> Result<(), ConfigError> {
        let columns = [
            ("key", Some(self.key.name.as_str())),
            ("content", Some(self.content.name.as_str())),
            ("version", self.version.as_ref().map(|v| v.name.as_str())),
            ("last modified", self.last_modified.as_deref()),
            ("created on", self.created_on.as_deref()),
            ("media type", self.media_type.as_deref()),
        ];

        let mut seen = BTreeSet::new();
        for (column, name) in columns {
            let Some(name) = name else {
                continue;
            };
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyColumnName { column });
            }
            if !seen.insert(name.to_ascii_uppercase()) {
                return Err(ConfigError::DuplicateColumn {
                    name: name.to_string(),
                });
            }
        }

        Ok(())
    }
}
