//! Key and version resolution for write payloads.

use crate::{
    config::{CollectionConfig, KeyAssignment},
    db::{document::Document, operation::OperationError},
    error::Error,
    key::{
        EmbeddedKey, Key, KeyCodec, KeyError, assignment_label, generate_embedded_key,
        generate_uuid_key, inject_embedded_key, probe_embedded_key,
    },
    version::{VersionBinding, VersionCodec},
};
use time::OffsetDateTime;

///
/// WriteTarget
///

#[derive(Clone, Copy, Debug)]
pub(crate) enum WriteTarget<'a> {
    /// New document; keys are generated where the collection allows it.
    Insert,
    /// Upsert; the key must be known before the write.
    Save,
    /// Existing document addressed by key.
    Replace(&'a Key),
}

///
/// PreparedWrite
///
/// Final payload bytes plus the key and version values bound beside them.
/// `key` is `None` only for identity keys, which come back from the write.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct PreparedWrite {
    pub(crate) key: Option<Key>,
    pub(crate) content: Vec<u8>,
    pub(crate) media_type: Option<String>,
    pub(crate) version: VersionBinding,
}

impl PreparedWrite {
    /// Headers known on the client before the write runs.
    pub(crate) fn header(&self) -> Document {
        Document {
            key: self.key.as_ref().map(|key| key.as_str().to_string()),
            media_type: self.media_type.clone(),
            version: self.version.token().map(str::to_string),
            ..Document::default()
        }
    }
}

/// Resolve key, body and version for one write.
///
/// `generate` supplies backend-generated keys (sequence/GUID caches).
pub(crate) fn prepare_write(
    config: &CollectionConfig,
    document: &Document,
    target: WriteTarget<'_>,
    now: OffsetDateTime,
    generate: impl FnOnce() -> Result<Key, Error>,
) -> Result<PreparedWrite, Error> {
    let content = document
        .content()
        .ok_or(OperationError::ContentRequired)?
        .to_vec();
    let codec = KeyCodec::new(config.key());
    let assignment = &config.key().assignment;

    let (key, content) = match (assignment, target) {
        (KeyAssignment::Embedded, target) => resolve_embedded(&codec, document, target, content)?,
        (_, WriteTarget::Replace(key)) => (Some(key.clone()), content),
        (KeyAssignment::Client, _) => {
            let raw = document.key().ok_or(KeyError::KeyRequired)?;
            (Some(codec.canonicalize(raw)?), content)
        }
        (other, WriteTarget::Save) => {
            return Err(OperationError::SaveRequiresKnownKey {
                assignment: assignment_label(other),
            }
            .into());
        }
        (other, WriteTarget::Insert) => {
            if document.key().is_some() {
                return Err(KeyError::KeyNotAllowed {
                    assignment: assignment_label(other),
                }
                .into());
            }
            let key = match other {
                KeyAssignment::Uuid => Some(generate_uuid_key()),
                KeyAssignment::Identity => None,
                _ => Some(generate()?),
            };
            (key, content)
        }
    };

    let media_type = config.media_type().map(|_| {
        document
            .media_type()
            .unwrap_or(Document::DEFAULT_MEDIA_TYPE)
            .to_string()
    });
    let version = VersionCodec::new(config.version_method()).compute(&content, now);

    Ok(PreparedWrite {
        key,
        content,
        media_type,
        version,
    })
}

// The body's `_id` wins; a missing one is injected from the target key, the
// document key, or a fresh ULID.
fn resolve_embedded(
    codec: &KeyCodec<'_>,
    document: &Document,
    target: WriteTarget<'_>,
    content: Vec<u8>,
) -> Result<(Option<Key>, Vec<u8>), Error> {
    let requested = match target {
        WriteTarget::Replace(key) => Some(key.clone()),
        WriteTarget::Insert | WriteTarget::Save => {
            document.key().map(|raw| codec.canonicalize(raw)).transpose()?
        }
    };

    match probe_embedded_key(&content)? {
        EmbeddedKey::Present(raw) => {
            let body_key = codec.canonicalize(&raw)?;
            if let Some(requested) = requested
                && requested != body_key
            {
                return Err(KeyError::EmbeddedMismatch {
                    body: body_key.into_string(),
                    target: requested.into_string(),
                }
                .into());
            }
            Ok((Some(body_key), content))
        }
        EmbeddedKey::Absent => {
            let key = match (requested, target) {
                (Some(key), _) => key,
                (None, WriteTarget::Save) => return Err(KeyError::KeyRequired.into()),
                (None, _) => generate_embedded_key(),
            };
            let content = inject_embedded_key(&content, key.as_str())?;
            Ok((Some(key), content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{CollectionConfig, KeyAssignment, VersionMethod},
        error::ErrorClass,
        timestamp::now_utc,
    };

    fn no_generator() -> Result<Key, Error> {
        Err(Error::operation_internal("generator not expected"))
    }

    fn config(assignment: KeyAssignment) -> CollectionConfig {
        CollectionConfig::builder("docs", "DOCS")
            .key_assignment(assignment)
            .version_column("VERSION", VersionMethod::Sha256)
            .build()
            .expect("valid config")
    }

    #[test]
    fn client_keys_are_required_and_canonicalized() {
        let config = config(KeyAssignment::Client);

        let missing = prepare_write(
            &config,
            &Document::new(br#"{"v":1}"#.to_vec()),
            WriteTarget::Insert,
            now_utc(),
            no_generator,
        )
        .expect_err("client key required");
        let prepared = prepare_write(
            &config,
            &Document::new(br#"{"v":1}"#.to_vec()).with_key("  a "),
            WriteTarget::Insert,
            now_utc(),
            no_generator,
        )
        .expect("prepared");

        assert_eq!(missing.class, ErrorClass::InvalidArgument);
        assert_eq!(prepared.key.as_ref().map(Key::as_str), Some("a"));
        assert!(prepared.version.token().is_some());
    }

    #[test]
    fn generated_assignments_reject_caller_keys() {
        let config = config(KeyAssignment::Uuid);

        let err = prepare_write(
            &config,
            &Document::new(b"{}".to_vec()).with_key("mine"),
            WriteTarget::Insert,
            now_utc(),
            no_generator,
        )
        .expect_err("uuid keys are generated");
        let prepared = prepare_write(
            &config,
            &Document::new(b"{}".to_vec()),
            WriteTarget::Insert,
            now_utc(),
            no_generator,
        )
        .expect("generated");

        assert_eq!(err.class, ErrorClass::InvalidArgument);
        assert_eq!(prepared.key.map(Key::into_string).map(|key| key.len()), Some(32));
    }

    #[test]
    fn sequence_keys_come_from_the_generator() {
        let config = config(KeyAssignment::Sequence("DOC_SEQ".to_string()));

        let prepared = prepare_write(
            &config,
            &Document::new(b"{}".to_vec()),
            WriteTarget::Insert,
            now_utc(),
            || Ok(Key::from_canonical("41".to_string())),
        )
        .expect("generated");

        assert_eq!(prepared.key.as_ref().map(Key::as_str), Some("41"));
    }

    #[test]
    fn embedded_keys_are_injected_when_absent() {
        let config = config(KeyAssignment::Embedded);

        let prepared = prepare_write(
            &config,
            &Document::new(br#"{"v":1}"#.to_vec()),
            WriteTarget::Insert,
            now_utc(),
            no_generator,
        )
        .expect("generated");
        let key = prepared.key.clone().expect("embedded key");
        let body: serde_json::Value =
            serde_json::from_slice(&prepared.content).expect("still json");

        assert_eq!(body["_id"], key.as_str());
        assert_eq!(body["v"], 1);
    }

    #[test]
    fn embedded_replace_rejects_a_different_body_key() {
        let config = config(KeyAssignment::Embedded);
        let target = Key::from_canonical("k1".to_string());

        let err = prepare_write(
            &config,
            &Document::new(br#"{"_id":"k2"}"#.to_vec()),
            WriteTarget::Replace(&target),
            now_utc(),
            no_generator,
        )
        .expect_err("mismatch");
        let injected = prepare_write(
            &config,
            &Document::new(br#"{"v":2}"#.to_vec()),
            WriteTarget::Replace(&target),
            now_utc(),
            no_generator,
        )
        .expect("injected");

        assert_eq!(err.class, ErrorClass::InvalidArgument);
        assert_eq!(injected.content, br#"{"_id":"k1","v":2}"#.to_vec());
    }

    #[test]
    fn save_needs_a_known_key() {
        let config = config(KeyAssignment::Guid);

        let err = prepare_write(
            &config,
            &Document::new(b"{}".to_vec()),
            WriteTarget::Save,
            now_utc(),
            no_generator,
        )
        .expect_err("guid keys are not known before the write");

        assert_eq!(err.class, ErrorClass::Unsupported);
    }
}
