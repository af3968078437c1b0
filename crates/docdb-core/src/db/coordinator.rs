//! Multi-document merge/patch: select the transformed candidates, then
//! replace each one back by key under the version it was read with.
//!
//! The coordinator owns its context for one call. It never mutates the
//! caller's operation state, so nothing needs restoring afterwards.

use crate::{
    db::{
        Collection,
        backend::Connection,
        compile::{compile_read, compile_replace},
        cursor::decode_row,
        document::Document,
        operation::{OperationState, ReadContent, TerminalIntent},
        payload::{WriteTarget, prepare_write},
    },
    error::Error,
    key::Key,
    patch::ContentTransform,
    timestamp::now_utc,
};
use std::fmt;

///
/// PatchOutcome
///
/// Aggregate result of a merge or patch over one or more documents.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PatchOutcome {
    pub(crate) documents: Vec<Document>,
    pub(crate) replaced: u64,
    pub(crate) candidates: u64,
}

impl PatchOutcome {
    /// Resulting documents, for the `*_and_get` terminals.
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    /// Documents actually written.
    #[must_use]
    pub const fn replaced(&self) -> u64 {
        self.replaced
    }

    /// Documents the select phase considered.
    #[must_use]
    pub const fn candidates(&self) -> u64 {
        self.candidates
    }
}

///
/// PatchPhase
///

enum PatchPhase {
    Idle,
    Selecting,
    Replacing(Vec<Document>),
    Done,
    Failed(Error),
}

impl fmt::Display for PatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::Replacing(_) => "replacing",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        };
        write!(f, "{label}")
    }
}

///
/// PatchCoordinator
///

pub(crate) struct PatchCoordinator<'c, C: Connection> {
    collection: &'c Collection<C>,
    state: OperationState,
    transform: ContentTransform,
    intent: TerminalIntent,

    /// Auto-commit was switched off by this call and must be restored.
    managed: bool,
    outcome: PatchOutcome,
}

impl<'c, C: Connection> PatchCoordinator<'c, C> {
    pub(crate) fn new(
        collection: &'c Collection<C>,
        state: OperationState,
        transform: ContentTransform,
        intent: TerminalIntent,
    ) -> Self {
        Self {
            collection,
            state,
            transform,
            intent,
            managed: false,
            outcome: PatchOutcome::default(),
        }
    }

    pub(crate) fn run(mut self) -> Result<PatchOutcome, Error> {
        let mut phase = PatchPhase::Idle;

        loop {
            tracing::debug!(
                collection = self.collection.config().name(),
                transform = self.transform.kind().label(),
                %phase,
                "patch phase"
            );

            phase = match phase {
                PatchPhase::Idle => match self.begin() {
                    Ok(()) => PatchPhase::Selecting,
                    Err(err) => PatchPhase::Failed(err),
                },
                PatchPhase::Selecting => match self.select() {
                    Ok(candidates) => PatchPhase::Replacing(candidates),
                    Err(err) => PatchPhase::Failed(err),
                },
                PatchPhase::Replacing(candidates) => match self.replace_all(candidates) {
                    Ok(()) => PatchPhase::Done,
                    Err(err) => PatchPhase::Failed(err),
                },
                PatchPhase::Done => match self.finish() {
                    Ok(()) => return Ok(self.outcome),
                    Err(err) => PatchPhase::Failed(err),
                },
                PatchPhase::Failed(err) => return Err(self.recover(err)),
            };
        }
    }

    // Multi-document calls run in one transaction unless the caller already
    // holds one open.
    fn begin(&mut self) -> Result<(), Error> {
        if self.state.is_single_key() {
            return Ok(());
        }
        if self.collection.auto_commit()? {
            self.collection.set_auto_commit(false)?;
            self.managed = true;
        }

        Ok(())
    }

    fn select(&mut self) -> Result<Vec<Document>, Error> {
        let config = self.collection.config();
        let mut state = self.state.clone();
        // without versions, only a row lock keeps candidates stable
        state.lock = config.version().is_none() && !config.object_kind().is_view();

        let ctx = self.collection.compile_context()?;
        let operation = compile_read(
            &ctx,
            &state,
            TerminalIntent::GetCursor,
            ReadContent::Transformed(&self.transform),
        )?;
        let execution = self.collection.execute(&operation)?;

        let candidates = execution
            .rows
            .iter()
            .map(|row| decode_row(operation.result(), row))
            .collect::<Result<Vec<_>, _>>()?;
        self.outcome.candidates = u64::try_from(candidates.len()).unwrap_or(u64::MAX);

        Ok(candidates)
    }

    // Stops at the first failure; later candidates are never written.
    fn replace_all(&mut self, candidates: Vec<Document>) -> Result<(), Error> {
        let config = self.collection.config();
        let and_get = self.intent.returns_documents();

        for candidate in candidates {
            if candidate.content().is_none_or(<[u8]>::is_empty) {
                continue;
            }
            let key = candidate
                .key()
                .map(|key| Key::from_canonical(key.to_string()))
                .ok_or_else(|| Error::cursor_internal("patch candidate has no key"))?;

            let state = self.state.replace_back(key.clone(), candidate.version.clone());
            let write = prepare_write(
                config,
                &candidate,
                WriteTarget::Replace(&key),
                now_utc(),
                || Err(Error::operation_internal("replace never generates keys")),
            )?;

            let ctx = self.collection.compile_context()?;
            let operation = compile_replace(&ctx, &state, &write, and_get)?;
            let execution = self.collection.execute(&operation)?;
            if execution.rows_affected != 1 {
                continue;
            }

            self.outcome.replaced += 1;
            if and_get {
                let mut document =
                    Collection::<C>::returned_document(&operation, &execution, &write)?;
                document.content = Some(write.content);
                self.outcome.documents.push(document);
            }
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        if !self.managed {
            return Ok(());
        }
        self.collection.commit()?;
        self.managed = false;
        self.collection.set_auto_commit(true)
    }

    // Roll back and restore auto-commit; recovery failures ride along as
    // secondary errors.
    fn recover(&mut self, mut err: Error) -> Error {
        if !self.managed {
            return err;
        }
        self.managed = false;

        if let Err(rollback) = self.collection.rollback() {
            tracing::warn!(error = %rollback, "patch rollback failed");
            err = err.with_secondary(rollback);
        }
        if let Err(restore) = self.collection.set_auto_commit(true) {
            tracing::warn!(error = %restore, "auto-commit restore failed");
            err = err.with_secondary(restore);
        }

        err
    }
}
