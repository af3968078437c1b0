use crate::key::KeyError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Member name carrying an embedded key.
pub(crate) const EMBEDDED_KEY_MEMBER: &str = "_id";

///
/// EmbeddedKey
/// Result of probing a body for a top-level `_id`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum EmbeddedKey {
    Present(String),
    Absent,
}

// Top-level probe: only `_id` is materialised, every other member is skipped.
#[derive(Deserialize)]
struct Probe {
    #[serde(rename = "_id", default, deserialize_with = "present")]
    id: Option<Value>,
}

// Keeps an explicit `null` distinguishable from a missing member.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Inspect the body for an embedded key without building the document.
pub(crate) fn probe_embedded_key(body: &[u8]) -> Result<EmbeddedKey, KeyError> {
    // a sequence would otherwise deserialize positionally into the probe
    if first_significant(body) != Some(b'{') {
        return Err(KeyError::BodyNotObject {
            reason: "expected '{'".to_string(),
        });
    }

    let probe: Probe = serde_json::from_slice(body).map_err(|err| KeyError::BodyNotObject {
        reason: err.to_string(),
    })?;

    match probe.id {
        None => Ok(EmbeddedKey::Absent),
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(EmbeddedKey::Present(text)),
        Some(Value::Number(number)) if number.is_i64() || number.is_u64() => {
            Ok(EmbeddedKey::Present(number.to_string()))
        }
        Some(_) => Err(KeyError::InvalidEmbedded),
    }
}

/// Insert `_id` as the first member of an object body.
///
/// The rest of the body is kept byte for byte.
pub(crate) fn inject_embedded_key(body: &[u8], key: &str) -> Result<Vec<u8>, KeyError> {
    let not_object = || KeyError::BodyNotObject {
        reason: "expected '{'".to_string(),
    };

    let open = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .filter(|&at| body[at] == b'{')
        .ok_or_else(not_object)?;
    let after_open = &body[open + 1..];
    let is_empty = after_open
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'}');

    let encoded_key = serde_json::to_string(key).map_err(|err| KeyError::BodyNotObject {
        reason: err.to_string(),
    })?;

    let mut out = Vec::with_capacity(body.len() + encoded_key.len() + 8);
    out.extend_from_slice(&body[..=open]);
    out.extend_from_slice(b"\"");
    out.extend_from_slice(EMBEDDED_KEY_MEMBER.as_bytes());
    out.extend_from_slice(b"\":");
    out.extend_from_slice(encoded_key.as_bytes());
    if !is_empty {
        out.push(b',');
    }
    out.extend_from_slice(after_open);

    Ok(out)
}

fn first_significant(body: &[u8]) -> Option<u8> {
    body.iter().copied().find(|b| !b.is_ascii_whitespace())
}
