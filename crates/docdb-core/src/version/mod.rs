//! Version codec: computes the version token bound on every write.


use crate::{config::VersionMethod, timestamp::unix_micros};
use md5::Md5;
use sha2::{Digest, Sha256};
use thiserror::Error as ThisError;
use time::OffsetDateTime;
use uuid::Uuid;

///
/// VersionBinding
///
/// How the version column is populated by one write.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VersionBinding {
    /// The collection has no version column.
    Absent,

    /// Token computed before binding; bound and handed back to the caller
    /// without a second round trip.
    Bound(String),

    /// The backend computes the value; it must come back through the
    /// returning clause.
    Backend(VersionMethod),
}

impl VersionBinding {
    /// Token known on the client, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Bound(token) => Some(token),
            Self::Absent | Self::Backend(_) => None,
        }
    }

    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

///
/// VersionCodec
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VersionCodec {
    method: Option<VersionMethod>,
}

impl VersionCodec {
    /// Codec for a collection versioning method (`None` when the collection
    /// has no version column).
    #[must_use]
    pub const fn new(method: Option<VersionMethod>) -> Self {
        Self { method }
    }

    /// Compute the version binding for a final payload.
    #[must_use]
    pub fn compute(&self, payload: &[u8], now: OffsetDateTime) -> VersionBinding {
        let Some(method) = self.method else {
            return VersionBinding::Absent;
        };

        match method {
            VersionMethod::None | VersionMethod::Sequential => VersionBinding::Backend(method),
            VersionMethod::Timestamp => VersionBinding::Bound(unix_micros(now).to_string()),
            VersionMethod::Md5 => VersionBinding::Bound(hex::encode_upper(Md5::digest(payload))),
            VersionMethod::Sha256 => {
                VersionBinding::Bound(hex::encode_upper(Sha256::digest(payload)))
            }
            VersionMethod::Uuid => {
                let mut buf = Uuid::encode_buffer();
                VersionBinding::Bound(
                    Uuid::new_v4()
                        .simple()
                        .encode_upper(&mut buf)
                        .to_string(),
                )
            }
        }
    }

    /// Version binding for a write whose content the backend computes
    /// (single-statement merge/patch). Payload digests are unavailable here.
    pub(crate) fn compute_without_payload(
        &self,
        now: OffsetDateTime,
    ) -> Result<VersionBinding, VersionError> {
        match self.method {
            Some(method) if method.is_payload_derived() => {
                Err(VersionError::PayloadRequired { method })
            }
            _ => Ok(self.compute(&[], now)),
        }
    }
}

///
/// VersionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum VersionError {
    #[error("{operation} requires a version column, but the collection declares none")]
    MissingColumn { operation: &'static str },

    #[error("{operation} requires a last-modified column, but the collection declares none")]
    MissingLastModified { operation: &'static str },

    #[error("version method {method:?} needs the final payload bytes")]
    PayloadRequired { method: VersionMethod },
}
