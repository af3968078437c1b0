//! Content transforms for merge and patch terminals.
//!
//! The backend computes the transformed document; this module only validates
//! the caller's spec so malformed input fails before any backend contact.

mod error;

pub use error::PatchSpecError;

use serde::Deserialize;
use serde_json::Value;

///
/// TransformKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransformKind {
    /// RFC 7396 JSON merge patch.
    Merge,
    /// RFC 6902 JSON Patch.
    Patch,
}

impl TransformKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Patch => "patch",
        }
    }
}

///
/// ContentTransform
///
/// A validated transform spec, kept as the caller's original bytes so it
/// can be bound unchanged.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentTransform {
    kind: TransformKind,
    spec: Vec<u8>,
}

impl ContentTransform {
    /// Validate an RFC 7396 merge patch. Only object patches are accepted.
    pub fn merge(spec: impl Into<Vec<u8>>) -> Result<Self, PatchSpecError> {
        let spec = spec.into();
        let value = parse(&spec)?;
        if !value.is_object() {
            return Err(PatchSpecError::InvalidShape {
                expected: "object",
                actual: shape_name(&value),
            });
        }

        Ok(Self {
            kind: TransformKind::Merge,
            spec,
        })
    }

    /// Validate an RFC 6902 JSON Patch.
    pub fn patch(spec: impl Into<Vec<u8>>) -> Result<Self, PatchSpecError> {
        let spec = spec.into();
        let value = parse(&spec)?;
        let Value::Array(ops) = value else {
            return Err(PatchSpecError::InvalidShape {
                expected: "array",
                actual: shape_name(&value),
            });
        };
        if ops.is_empty() {
            return Err(PatchSpecError::Empty);
        }

        for (index, op) in ops.into_iter().enumerate() {
            validate_op(op).map_err(|err| err.with_index(index))?;
        }

        Ok(Self {
            kind: TransformKind::Patch,
            spec,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> TransformKind {
        self.kind
    }

    #[must_use]
    pub fn spec(&self) -> &[u8] {
        &self.spec
    }
}

///
/// RawOp
/// Loosely typed operation; validated member by member for precise errors.
///

#[derive(Deserialize)]
struct RawOp {
    op: Option<String>,
    path: Option<String>,
    from: Option<String>,
    #[serde(default, deserialize_with = "present")]
    value: Option<Value>,
}

// Keeps `"value": null` distinguishable from a missing member.
fn present<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn validate_op(op: Value) -> Result<(), PatchSpecError> {
    if !op.is_object() {
        return Err(PatchSpecError::InvalidShape {
            expected: "object",
            actual: shape_name(&op),
        });
    }
    let raw: RawOp = serde_json::from_value(op).map_err(|err| PatchSpecError::InvalidJson {
        message: err.to_string(),
    })?;

    let name = raw.op.ok_or(PatchSpecError::MissingMember { member: "op" })?;
    let path = raw
        .path
        .ok_or(PatchSpecError::MissingMember { member: "path" })?;
    validate_pointer(&path).map_err(|err| err.with_field("path"))?;

    match name.as_str() {
        "add" | "replace" | "test" => {
            if raw.value.is_none() {
                return Err(PatchSpecError::MissingMember { member: "value" });
            }
        }
        "remove" => {}
        "move" | "copy" => {
            let from = raw
                .from
                .ok_or(PatchSpecError::MissingMember { member: "from" })?;
            validate_pointer(&from).map_err(|err| err.with_field("from"))?;
        }
        _ => return Err(PatchSpecError::UnknownOp { op: name }),
    }

    Ok(())
}

// RFC 6901: empty, or '/'-prefixed with '~' only as '~0' or '~1'.
fn validate_pointer(pointer: &str) -> Result<(), PatchSpecError> {
    let invalid = || PatchSpecError::InvalidPointer {
        pointer: pointer.to_string(),
    };

    if pointer.is_empty() {
        return Ok(());
    }
    if !pointer.starts_with('/') {
        return Err(invalid());
    }

    let mut chars = pointer.chars();
    while let Some(c) = chars.next() {
        if c == '~' && !matches!(chars.next(), Some('0' | '1')) {
            return Err(invalid());
        }
    }

    Ok(())
}

fn parse(spec: &[u8]) -> Result<Value, PatchSpecError> {
    serde_json::from_slice(spec).map_err(|err| PatchSpecError::InvalidJson {
        message: err.to_string(),
    })
}

const fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
