use crate::key::{Key, KeyError};
use std::collections::VecDeque;
use ulid::Ulid;
use uuid::Uuid;

/// Generate a UUID key: 32 uppercase hex digits.
pub(crate) fn generate_uuid_key() -> Key {
    let mut buf = Uuid::encode_buffer();
    let text = Uuid::new_v4().simple().encode_upper(&mut buf);

    Key::from_canonical(text.to_string())
}

/// Generate an embedded object key; ULIDs keep insertion order roughly sorted.
pub(crate) fn generate_embedded_key() -> Key {
    Key::from_canonical(Ulid::new().to_string())
}

///
/// KeyCache
///
/// Backend-generated keys fetched ahead of use. Refills always request a
/// whole batch and reject partial ones.
///

#[derive(Debug)]
pub(crate) struct KeyCache {
    pending: VecDeque<Key>,
    batch_size: usize,
}

impl KeyCache {
    pub(crate) const fn new(batch_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            batch_size,
        }
    }

    /// Take the next cached key, refilling synchronously when exhausted.
    pub(crate) fn next<E>(
        &mut self,
        refill: impl FnOnce(usize) -> Result<Vec<Key>, E>,
    ) -> Result<Key, E>
    where
        E: From<KeyError>,
    {
        if let Some(key) = self.pending.pop_front() {
            return Ok(key);
        }

        let batch = refill(self.batch_size)?;
        if batch.len() != self.batch_size {
            return Err(KeyError::PartialBatch {
                requested: self.batch_size,
                received: batch.len(),
            }
            .into());
        }
        tracing::debug!(batch = batch.len(), "key cache refilled");

        self.pending.extend(batch);
        self.pending.pop_front().ok_or_else(|| {
            KeyError::PartialBatch {
                requested: self.batch_size,
                received: 0,
            }
            .into()
        })
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.pending.len()
    }
}
