//! Compiled operations: one backend command, its binds, and the metadata a
//! cursor needs to decode the rows it produces.

use crate::db::backend::BindValue;
use sha2::{Digest, Sha256};
use std::fmt;

///
/// CommandShape
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandShape {
    Select,
    /// Keys narrowed and paged in a sub-select, then joined back for rows.
    PaginatedSelect,
    Count,
    Insert,
    Update,
    Delete,
    Upsert,
    Explain,
    PlanDisplay,
    KeyBatch,
}

impl CommandShape {
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::Upsert
        )
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Select => 0x01,
            Self::PaginatedSelect => 0x02,
            Self::Count => 0x03,
            Self::Insert => 0x04,
            Self::Update => 0x05,
            Self::Delete => 0x06,
            Self::Upsert => 0x07,
            Self::Explain => 0x08,
            Self::PlanDisplay => 0x09,
            Self::KeyBatch => 0x0A,
        }
    }
}

///
/// BindRole
/// What a bind stands for; carried for diagnostics and tests only.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BindRole {
    Key,
    Content,
    MediaType,
    Version,
    Timestamp,
    Filter,
    Transform,
    AsOf,
    Skip,
    Limit,
    BatchSize,
}

///
/// Bind
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bind {
    pub role: BindRole,
    pub value: BindValue,
}

///
/// ResultColumn
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultColumn {
    Key,
    Content,
    MediaType,
    LastModified,
    CreatedOn,
    Version,
    Count,
    PlanLine,
}

///
/// ResultShape
///
/// Ordered result columns. Cursors decode rows from this alone.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultShape {
    columns: Vec<ResultColumn>,
}

impl ResultShape {
    #[must_use]
    pub const fn new(columns: Vec<ResultColumn>) -> Self {
        Self { columns }
    }

    #[must_use]
    pub fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    /// Column position, if present.
    #[must_use]
    pub fn position(&self, column: ResultColumn) -> Option<usize> {
        self.columns.iter().position(|candidate| *candidate == column)
    }

    #[must_use]
    pub fn contains(&self, column: ResultColumn) -> bool {
        self.position(column).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

///
/// OutputType
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputType {
    Text,
    Number,
    Raw,
    Timestamp,
}

///
/// ReturnedColumn
///
/// One value a write hands back: the physical column it is read from and
/// the type the driver must report it as.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReturnedColumn {
    pub column: ResultColumn,
    pub name: String,
    pub sql_type: OutputType,
}

///
/// Returning
///
/// How a write hands back generated and updated column values.
/// Returned values arrive as one row ordered like the declared columns.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Returning {
    #[default]
    None,

    /// The connection reports the declared columns natively.
    Generated(Vec<ReturnedColumn>),

    /// The command is wrapped in a block; each column binds one output slot.
    OutputSlots(Vec<ReturnedColumn>),
}

impl Returning {
    /// Declared columns, in returned-row order.
    #[must_use]
    pub fn columns(&self) -> &[ReturnedColumn] {
        match self {
            Self::None => &[],
            Self::Generated(columns) | Self::OutputSlots(columns) => columns,
        }
    }

    /// Result shape of the returned rows.
    #[must_use]
    pub fn shape(&self) -> ResultShape {
        ResultShape::new(self.columns().iter().map(|returned| returned.column).collect())
    }

    #[must_use]
    pub const fn is_requested(&self) -> bool {
        !matches!(self, Self::None)
    }
}

///
/// CompiledOperation
///
/// Immutable result of resolving builder state. Consumed by one execution.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompiledOperation {
    pub(crate) shape: CommandShape,
    pub(crate) command: String,
    pub(crate) binds: Vec<Bind>,
    pub(crate) result: ResultShape,
    pub(crate) returning: Returning,
}

impl CompiledOperation {
    pub(crate) fn new(
        shape: CommandShape,
        command: String,
        binds: Vec<Bind>,
        result: ResultShape,
    ) -> Self {
        Self {
            shape,
            command,
            binds,
            result,
            returning: Returning::None,
        }
    }

    #[must_use]
    pub(crate) fn with_returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }

    #[must_use]
    pub const fn shape(&self) -> CommandShape {
        self.shape
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }

    /// Bind values alone, in placeholder order.
    #[must_use]
    pub fn bind_values(&self) -> Vec<&BindValue> {
        self.binds.iter().map(|bind| &bind.value).collect()
    }

    /// First bind with the given role, if any.
    #[must_use]
    pub fn bind(&self, role: BindRole) -> Option<&BindValue> {
        self.binds
            .iter()
            .find(|bind| bind.role == role)
            .map(|bind| &bind.value)
    }

    #[must_use]
    pub const fn result(&self) -> &ResultShape {
        &self.result
    }

    #[must_use]
    pub const fn returning(&self) -> &Returning {
        &self.returning
    }

    /// Stable fingerprint of the command shape and text. Bind values are
    /// excluded so equal statements with different arguments match.
    #[must_use]
    pub fn fingerprint(&self) -> OperationFingerprint {
        let mut hasher = Sha256::new();
        write_tag(&mut hasher, self.shape.tag());
        write_str(&mut hasher, &self.command);
        write_u32(&mut hasher, u32::try_from(self.binds.len()).unwrap_or(u32::MAX));

        OperationFingerprint(hasher.finalize().into())
    }
}

///
/// OperationFingerprint
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct OperationFingerprint([u8; 32]);

impl OperationFingerprint {
    #[must_use]
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for OperationFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, u32::try_from(value.len()).unwrap_or(u32::MAX));
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprints_render_as_lowercase_hex() {
        let operation = CompiledOperation::new(
            CommandShape::Count,
            r#"SELECT COUNT(*) FROM "DOCS""#.to_string(),
            Vec::new(),
            ResultShape::new(vec![ResultColumn::Count]),
        );
        let fingerprint = operation.fingerprint();

        let hex = fingerprint.as_hex();

        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(fingerprint.to_string(), hex);
        assert_eq!(hex::decode(&hex).expect("valid hex"), fingerprint.0);
    }
}
