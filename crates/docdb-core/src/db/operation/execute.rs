use crate::{
    config::VersionMethod,
    db::{
        Collection,
        backend::Connection,
        compile::{
            compile_explain, compile_plan_display, compile_read, compile_remove, compile_replace,
            compile_transform_update,
        },
        compiled::CompiledOperation,
        coordinator::{PatchCoordinator, PatchOutcome},
        cursor::{ResultCursor, decode_count, decode_plan_lines, decode_row},
        document::Document,
        operation::{
            ExplainLevel, OperationBuilder, OperationError, ReadContent, Selector, TerminalIntent,
        },
        payload::{PreparedWrite, WriteTarget, prepare_write},
    },
    error::Error,
    patch::ContentTransform,
    timestamp::now_utc,
    version::{VersionBinding, VersionCodec},
};
use ulid::Ulid;

impl<C: Connection> OperationBuilder<'_, C> {
    // ------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------

    /// Compile the chain for a read or remove intent without executing it.
    ///
    /// Intents that carry a payload compile through their own entry points.
    pub fn compile(&self, intent: TerminalIntent) -> Result<CompiledOperation, Error> {
        intent.validate(&self.state, self.collection.config())?;
        let ctx = self.collection.compile_context()?;

        match intent {
            TerminalIntent::Count | TerminalIntent::GetOne | TerminalIntent::GetCursor => {
                compile_read(&ctx, &self.state, intent, ReadContent::Stored)
            }
            TerminalIntent::Remove => compile_remove(&ctx, &self.state),
            TerminalIntent::Explain(_) => {
                compile_explain(&ctx, &self.state, &Ulid::new().to_string())
            }
            TerminalIntent::Replace
            | TerminalIntent::ReplaceAndGet
            | TerminalIntent::Merge
            | TerminalIntent::MergeAndGet
            | TerminalIntent::Patch
            | TerminalIntent::PatchAndGet => Err(OperationError::PayloadRequired {
                intent: intent.label(),
            }
            .into()),
        }
    }

    /// Compile a single-key replace of `document` without executing it.
    pub fn compile_replace(
        &self,
        document: &Document,
        and_get: bool,
    ) -> Result<CompiledOperation, Error> {
        self.prepare_replace(document, and_get)
            .map(|(operation, _)| operation)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Number of matching documents.
    pub fn count(self) -> Result<u64, Error> {
        let operation = self.compile(TerminalIntent::Count)?;
        let execution = self.collection.execute(&operation)?;

        decode_count(operation.result(), &execution.rows)
    }

    /// The one matching document, if any.
    pub fn get_one(self) -> Result<Option<Document>, Error> {
        let operation = self.compile(TerminalIntent::GetOne)?;
        let execution = self.collection.execute(&operation)?;

        match execution.rows.as_slice() {
            [] => Ok(None),
            [row] => decode_row(operation.result(), row).map(Some),
            rows => Err(OperationError::NotUnique {
                matched: rows.len(),
            }
            .into()),
        }
    }

    /// Every matching document.
    pub fn get_cursor(self) -> Result<ResultCursor, Error> {
        let operation = self.compile(TerminalIntent::GetCursor)?;
        let execution = self.collection.execute(&operation)?;

        Ok(ResultCursor::new(execution.rows, operation.result().clone()))
    }

    /// Execution plan text for the read this chain describes.
    pub fn explain(self, level: ExplainLevel) -> Result<String, Error> {
        let intent = TerminalIntent::Explain(level);
        intent.validate(&self.state, self.collection.config())?;

        let statement_id = Ulid::new().to_string();
        let ctx = self.collection.compile_context()?;
        let operation = compile_explain(&ctx, &self.state, &statement_id)?;
        self.collection.execute(&operation)?;

        let display = compile_plan_display(&statement_id, level);
        let execution = self.collection.execute(&display)?;

        Ok(decode_plan_lines(display.result(), &execution.rows)?.join("\n"))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Delete every matching document; returns how many were removed.
    pub fn remove(self) -> Result<u64, Error> {
        let operation = self.compile(TerminalIntent::Remove)?;
        let execution = self.collection.execute(&operation)?;

        Ok(execution.rows_affected)
    }

    /// Replace the selected document. `false` when nothing matched,
    /// including a failed version or last-modified precondition.
    pub fn replace(self, document: &Document) -> Result<bool, Error> {
        self.run_replace(document, false).map(|written| written.is_some())
    }

    /// Replace the selected document and return its new headers.
    pub fn replace_and_get(self, document: &Document) -> Result<Option<Document>, Error> {
        self.run_replace(document, true)
    }

    /// Apply an RFC 7396 merge patch to the selected document.
    pub fn merge_one(self, spec: &[u8]) -> Result<bool, Error> {
        let transform = ContentTransform::merge(spec)?;
        self.transform_one(transform, TerminalIntent::Merge)
            .map(|outcome| outcome.replaced == 1)
    }

    pub fn merge_one_and_get(self, spec: &[u8]) -> Result<Option<Document>, Error> {
        let transform = ContentTransform::merge(spec)?;
        self.transform_one(transform, TerminalIntent::MergeAndGet)
            .map(|outcome| outcome.into_documents().into_iter().next())
    }

    /// Apply an RFC 6902 JSON Patch to the selected document.
    pub fn patch_one(self, spec: &[u8]) -> Result<bool, Error> {
        let transform = ContentTransform::patch(spec)?;
        self.transform_one(transform, TerminalIntent::Patch)
            .map(|outcome| outcome.replaced == 1)
    }

    pub fn patch_one_and_get(self, spec: &[u8]) -> Result<Option<Document>, Error> {
        let transform = ContentTransform::patch(spec)?;
        self.transform_one(transform, TerminalIntent::PatchAndGet)
            .map(|outcome| outcome.into_documents().into_iter().next())
    }

    /// Merge-patch every matching document.
    pub fn merge(self, spec: &[u8]) -> Result<PatchOutcome, Error> {
        let transform = ContentTransform::merge(spec)?;
        self.apply_transform(transform, TerminalIntent::Merge)
    }

    pub fn merge_and_get(self, spec: &[u8]) -> Result<PatchOutcome, Error> {
        let transform = ContentTransform::merge(spec)?;
        self.apply_transform(transform, TerminalIntent::MergeAndGet)
    }

    /// JSON-Patch every matching document.
    pub fn patch(self, spec: &[u8]) -> Result<PatchOutcome, Error> {
        let transform = ContentTransform::patch(spec)?;
        self.apply_transform(transform, TerminalIntent::Patch)
    }

    pub fn patch_and_get(self, spec: &[u8]) -> Result<PatchOutcome, Error> {
        let transform = ContentTransform::patch(spec)?;
        self.apply_transform(transform, TerminalIntent::PatchAndGet)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn prepare_replace(
        &self,
        document: &Document,
        and_get: bool,
    ) -> Result<(CompiledOperation, PreparedWrite), Error> {
        let intent = if and_get {
            TerminalIntent::ReplaceAndGet
        } else {
            TerminalIntent::Replace
        };
        intent.validate(&self.state, self.collection.config())?;
        let Some(Selector::Key(key)) = &self.state.selector else {
            return Err(OperationError::KeyRequired {
                intent: intent.label(),
            }
            .into());
        };

        let write = prepare_write(
            self.collection.config(),
            document,
            WriteTarget::Replace(key),
            now_utc(),
            || Err(Error::operation_internal("replace never generates keys")),
        )?;
        let ctx = self.collection.compile_context()?;
        let operation = compile_replace(&ctx, &self.state, &write, and_get)?;

        Ok((operation, write))
    }

    fn run_replace(self, document: &Document, and_get: bool) -> Result<Option<Document>, Error> {
        let (operation, write) = self.prepare_replace(document, and_get)?;
        let execution = self.collection.execute(&operation)?;
        if execution.rows_affected == 0 {
            return Ok(None);
        }

        Collection::<C>::returned_document(&operation, &execution, &write).map(Some)
    }

    fn transform_one(
        self,
        transform: ContentTransform,
        intent: TerminalIntent,
    ) -> Result<PatchOutcome, Error> {
        if !self.state.is_single_key() {
            return Err(OperationError::KeyRequired {
                intent: intent.label(),
            }
            .into());
        }

        self.apply_transform(transform, intent)
    }

    // One statement when the backend can finish the whole write itself;
    // otherwise select-then-replace.
    fn apply_transform(
        self,
        transform: ContentTransform,
        intent: TerminalIntent,
    ) -> Result<PatchOutcome, Error> {
        let config = self.collection.config();
        intent.validate(&self.state, config)?;

        let payload_free = !config
            .version_method()
            .is_some_and(VersionMethod::is_payload_derived);
        let single_key = self.state.is_single_key();
        let single_statement = payload_free
            && !config.key().assignment.is_embedded()
            && (single_key || !intent.returns_documents());

        if !single_statement {
            return PatchCoordinator::new(self.collection, self.state, transform, intent).run();
        }

        let mut version =
            VersionCodec::new(config.version_method()).compute_without_payload(now_utc())?;
        // one random token would be shared by every row
        if !single_key && config.version_method() == Some(VersionMethod::Uuid) {
            version = VersionBinding::Backend(VersionMethod::Uuid);
        }

        let ctx = self.collection.compile_context()?;
        let operation = compile_transform_update(&ctx, &self.state, &transform, &version, intent)?;
        let execution = self.collection.execute(&operation)?;

        let mut outcome = PatchOutcome {
            documents: Vec::new(),
            replaced: execution.rows_affected,
            candidates: execution.rows_affected,
        };
        if intent.returns_documents()
            && execution.rows_affected == 1
            && let Some(Selector::Key(key)) = &self.state.selector
        {
            let known = PreparedWrite {
                key: Some(key.clone()),
                content: Vec::new(),
                media_type: None,
                version,
            };
            outcome.documents.push(Collection::<C>::returned_document(
                &operation, &execution, &known,
            )?);
        }

        Ok(outcome)
    }
}
