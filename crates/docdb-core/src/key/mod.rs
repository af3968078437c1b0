//! Key codec: canonical key representation per collection key column, plus
//! key generation for locally and backend assigned strategies.

mod embedded;
mod generate;
#[cfg(test)]
mod tests;

pub(crate) use embedded::{EmbeddedKey, inject_embedded_key, probe_embedded_key};
pub(crate) use generate::{KeyCache, generate_embedded_key, generate_uuid_key};

use crate::{
    config::{KeyAssignment, KeyColumn, KeySqlType},
    db::backend::BindValue,
};
use derive_more::{Deref, Display};
use thiserror::Error as ThisError;

/// Maximum significant digits accepted in a NUMBER key.
const MAX_NUMBER_DIGITS: usize = 38;

///
/// Key
///
/// Canonical key text for one collection. Two keys naming the same document
/// always compare equal once canonicalized.
///

#[derive(Clone, Debug, Deref, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Key(String);

impl Key {
    /// Wrap text that is already canonical (backend output, generated keys).
    pub(crate) const fn from_canonical(text: String) -> Self {
        Self(text)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Typed bind value for this key under the given key column type.
    pub(crate) fn bind_value(&self, sql_type: KeySqlType) -> BindValue {
        match sql_type {
            KeySqlType::Varchar => BindValue::Text(self.0.clone()),
            KeySqlType::Number => BindValue::Number(self.0.clone()),
            // canonical raw keys are always valid hex
            KeySqlType::Raw => match hex::decode(&self.0) {
                Ok(bytes) => BindValue::Bytes(bytes),
                Err(_) => BindValue::Text(self.0.clone()),
            },
        }
    }
}

///
/// KeyCodec
///
/// Canonicalizes client-supplied keys for one key column.
///

#[derive(Clone, Copy, Debug)]
pub struct KeyCodec<'a> {
    column: &'a KeyColumn,
}

impl<'a> KeyCodec<'a> {
    #[must_use]
    pub const fn new(column: &'a KeyColumn) -> Self {
        Self { column }
    }

    /// Canonicalize a client-supplied key.
    pub fn canonicalize(&self, raw: &str) -> Result<Key, KeyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }

        let canonical = match self.column.sql_type {
            KeySqlType::Varchar => {
                let len = trimmed.len();
                if len > self.column.max_length {
                    return Err(KeyError::TooLong {
                        max: self.column.max_length,
                        found: len,
                    });
                }
                trimmed.to_string()
            }
            KeySqlType::Number => canonical_number(trimmed)?,
            KeySqlType::Raw => {
                let upper = trimmed.to_ascii_uppercase();
                if upper.len() % 2 != 0 || !upper.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(KeyError::NotHex {
                        key: trimmed.to_string(),
                    });
                }
                if upper.len() / 2 > self.column.max_length {
                    return Err(KeyError::TooLong {
                        max: self.column.max_length,
                        found: upper.len() / 2,
                    });
                }
                upper
            }
        };

        Ok(Key(canonical))
    }

    /// Canonicalize every key in order, dropping duplicates.
    pub fn canonicalize_all<I, S>(&self, keys: I) -> Result<Vec<Key>, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<Key> = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for raw in keys {
            let key = self.canonicalize(raw.as_ref())?;
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }

        Ok(out)
    }

    #[must_use]
    pub const fn assignment(&self) -> &KeyAssignment {
        &self.column.assignment
    }
}

// Canonical NUMBER key text: optional minus sign, no leading zeros.
fn canonical_number(raw: &str) -> Result<String, KeyError> {
    let not_numeric = || KeyError::NotNumeric {
        key: raw.to_string(),
    };

    let (negative, digits) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_numeric());
    }

    let significant = digits.trim_start_matches('0');
    if significant.len() > MAX_NUMBER_DIGITS {
        return Err(not_numeric());
    }

    Ok(match (negative, significant.is_empty()) {
        (_, true) => "0".to_string(),
        (true, false) => format!("-{significant}"),
        (false, false) => significant.to_string(),
    })
}

///
/// KeyError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KeyError {
    #[error("key must not be empty")]
    Empty,

    #[error("key exceeds maximum length {max} (found {found})")]
    TooLong { max: usize, found: usize },

    #[error("key '{key}' is not a valid integer")]
    NotNumeric { key: String },

    #[error("key '{key}' is not valid hexadecimal")]
    NotHex { key: String },

    #[error("key assignment {assignment} cannot generate keys on the client")]
    GenerationUnsupported { assignment: &'static str },

    #[error("a key was supplied for a collection with {assignment} key assignment")]
    KeyNotAllowed { assignment: &'static str },

    #[error("a key is required for client-assigned collections")]
    KeyRequired,

    #[error("key batch refill returned {received} of {requested} keys")]
    PartialBatch { requested: usize, received: usize },

    #[error("document body is not a JSON object: {reason}")]
    BodyNotObject { reason: String },

    #[error("embedded _id must be a non-empty string or integer")]
    InvalidEmbedded,

    #[error("embedded _id '{body}' does not match target key '{target}'")]
    EmbeddedMismatch { body: String, target: String },
}

/// Stable label for a key assignment, used in error messages.
pub(crate) const fn assignment_label(assignment: &KeyAssignment) -> &'static str {
    match assignment {
        KeyAssignment::Uuid => "UUID",
        KeyAssignment::Guid => "GUID",
        KeyAssignment::Sequence(_) => "SEQUENCE",
        KeyAssignment::Client => "CLIENT",
        KeyAssignment::Embedded => "EMBEDDED_OID",
        KeyAssignment::Identity => "IDENTITY",
    }
}
