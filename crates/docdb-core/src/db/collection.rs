use crate::{
    config::CollectionConfig,
    db::{
        backend::{Capabilities, Connection, Execution},
        compile::{CompileContext, compile_insert, compile_key_batch, compile_upsert},
        compiled::CompiledOperation,
        cursor::decode_row,
        document::Document,
        operation::{OperationBuilder, OperationError},
        payload::{PreparedWrite, WriteTarget, prepare_write},
    },
    error::Error,
    filter::{FilterCompiler, QbeCompiler},
    key::{Key, KeyCache},
    obs::{OperationTraceSink, trace::start_operation_trace},
    settings::CompilerSettings,
    timestamp::now_utc,
};
use std::cell::{Cell, Ref, RefCell, RefMut};

///
/// Collection
///
/// Handle to one document collection over one backend connection.
///
/// Owns the negotiated capabilities and the generated-key cache, so both
/// live exactly as long as the connection they were obtained from. Not
/// `Sync`; one terminal call runs at a time.
///

pub struct Collection<C: Connection> {
    config: CollectionConfig,
    connection: RefCell<C>,
    capabilities: Cell<Option<Capabilities>>,
    key_cache: RefCell<KeyCache>,
    settings: CompilerSettings,
    filters: Box<dyn FilterCompiler>,
    trace: Option<&'static dyn OperationTraceSink>,
}

impl<C: Connection> Collection<C> {
    #[must_use]
    pub fn new(config: CollectionConfig, connection: C) -> Self {
        let settings = CompilerSettings::default();

        Self {
            config,
            connection: RefCell::new(connection),
            capabilities: Cell::new(None),
            key_cache: RefCell::new(KeyCache::new(settings.key_batch_size)),
            settings,
            filters: Box::new(QbeCompiler),
            trace: None,
        }
    }

    /// Replace compiler settings. Drops any cached generated keys.
    #[must_use]
    pub fn with_settings(mut self, settings: CompilerSettings) -> Self {
        self.key_cache = RefCell::new(KeyCache::new(settings.key_batch_size));
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_filter_compiler(mut self, filters: impl FilterCompiler + 'static) -> Self {
        self.filters = Box::new(filters);
        self
    }

    #[must_use]
    pub fn with_trace_sink(mut self, sink: &'static dyn OperationTraceSink) -> Self {
        self.trace = Some(sink);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &CollectionConfig {
        &self.config
    }

    #[must_use]
    pub const fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Borrow the underlying connection.
    ///
    /// # Panics
    /// Panics if called from inside a backend call on this handle.
    #[must_use]
    pub fn connection(&self) -> Ref<'_, C> {
        self.connection.borrow()
    }

    #[must_use]
    pub fn into_connection(self) -> C {
        self.connection.into_inner()
    }

    // ---------------------------------------------------------------------
    // Entry points
    // ---------------------------------------------------------------------

    /// Start an operation chain.
    #[must_use]
    pub fn find(&self) -> OperationBuilder<'_, C> {
        OperationBuilder::new(self)
    }

    /// Insert one document.
    pub fn insert(&self, document: &Document) -> Result<(), Error> {
        self.insert_with(document, false).map(|_| ())
    }

    /// Insert one document and return its headers (key, version, timestamps).
    pub fn insert_and_get(&self, document: &Document) -> Result<Document, Error> {
        self.insert_with(document, true)
    }

    /// Insert or replace one document by key.
    pub fn save(&self, document: &Document) -> Result<(), Error> {
        self.save_with(document).map(|_| ())
    }

    /// Insert or replace one document, then read back its headers.
    pub fn save_and_get(&self, document: &Document) -> Result<Document, Error> {
        let write = self.save_with(document)?;
        let key = write
            .key
            .as_ref()
            .ok_or_else(|| Error::operation_internal("save resolved no key"))?;

        self.find()
            .key(key.as_str())?
            .header_only()
            .get_one()?
            .ok_or_else(|| Error::operation_internal("saved document was not found"))
    }

    /// Negotiated backend capabilities; probed on first use, then cached.
    pub fn capabilities(&self) -> Result<Capabilities, Error> {
        if let Some(capabilities) = self.capabilities.get() {
            return Ok(capabilities);
        }

        let capabilities = self.connection_mut()?.probe()?;
        tracing::debug!(
            collection = self.config.name(),
            returning_clause = capabilities.returning_clause,
            relaxed_filters = capabilities.relaxed_filters,
            "backend capabilities probed"
        );
        self.capabilities.set(Some(capabilities));

        Ok(capabilities)
    }

    /// Handle for cancelling this collection's in-flight calls from another
    /// thread. Take it before starting the call to be cancelled.
    pub fn cancel_handle(&self) -> Result<C::Canceller, Error> {
        self.connection
            .try_borrow()
            .map(|connection| connection.cancel_handle())
            .map_err(|_| Error::operation_internal("connection is busy"))
    }

    // ---------------------------------------------------------------------
    // Crate-internal execution
    // ---------------------------------------------------------------------

    pub(crate) fn compile_context(&self) -> Result<CompileContext<'_>, Error> {
        Ok(CompileContext {
            config: &self.config,
            capabilities: self.capabilities()?,
            settings: &self.settings,
            filters: self.filters.as_ref(),
        })
    }

    /// Execute one compiled operation, decorating failures with its command.
    pub(crate) fn execute(&self, operation: &CompiledOperation) -> Result<Execution, Error> {
        tracing::debug!(
            collection = self.config.name(),
            shape = ?operation.shape(),
            binds = operation.binds().len(),
            "executing compiled operation"
        );

        let scope = start_operation_trace(self.trace, operation);
        let result = self.connection_mut().and_then(|mut connection| {
            connection
                .execute(operation)
                .map_err(|err| Error::backend(err, operation.command()))
        });

        if let Some(scope) = scope {
            match &result {
                Ok(execution) => scope.finish(execution.rows_affected, execution.rows.len()),
                Err(err) => scope.error(err),
            }
        }

        result
    }

    /// Next sequence/GUID key, refilling the cache in whole batches.
    pub(crate) fn next_generated_key(&self) -> Result<Key, Error> {
        let mut cache = self
            .key_cache
            .try_borrow_mut()
            .map_err(|_| Error::operation_internal("key cache is busy"))?;

        cache.next(|count| {
            let ctx = self.compile_context()?;
            let operation = compile_key_batch(&ctx, count)?;
            let execution = self.execute(&operation)?;

            execution
                .rows
                .iter()
                .map(|row| {
                    decode_row(operation.result(), row)?
                        .key
                        .map(Key::from_canonical)
                        .ok_or_else(|| Error::cursor_internal("key batch row has no key"))
                })
                .collect()
        })
    }

    /// Document headers after a write: returned columns first, then what the
    /// client already knew.
    pub(crate) fn returned_document(
        operation: &CompiledOperation,
        execution: &Execution,
        write: &PreparedWrite,
    ) -> Result<Document, Error> {
        let returned = match execution.rows.first() {
            Some(row) if operation.returning().is_requested() => {
                decode_row(&operation.returning().shape(), row)?
            }
            _ => Document::default(),
        };
        let document = returned.fill_from(write.header());

        if document.key.is_none() {
            return Err(Error::cursor_internal("write did not return the generated key"));
        }

        Ok(document)
    }

    pub(crate) fn auto_commit(&self) -> Result<bool, Error> {
        self.connection_mut()?
            .auto_commit()
            .map_err(|err| Error::transaction(err, "auto-commit"))
    }

    pub(crate) fn set_auto_commit(&self, enabled: bool) -> Result<(), Error> {
        let action = if enabled {
            "auto-commit restore"
        } else {
            "auto-commit"
        };

        self.connection_mut()?
            .set_auto_commit(enabled)
            .map_err(|err| Error::transaction(err, action))
    }

    pub(crate) fn commit(&self) -> Result<(), Error> {
        self.connection_mut()?
            .commit()
            .map_err(|err| Error::transaction(err, "commit"))
    }

    pub(crate) fn rollback(&self) -> Result<(), Error> {
        self.connection_mut()?
            .rollback()
            .map_err(|err| Error::transaction(err, "rollback"))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn connection_mut(&self) -> Result<RefMut<'_, C>, Error> {
        self.connection
            .try_borrow_mut()
            .map_err(|_| Error::operation_internal("connection is busy"))
    }

    fn require_writable(&self) -> Result<(), Error> {
        if self.config.is_read_only() {
            return Err(OperationError::ReadOnly {
                collection: self.config.name().to_string(),
            }
            .into());
        }

        Ok(())
    }

    fn insert_with(&self, document: &Document, and_get: bool) -> Result<Document, Error> {
        self.require_writable()?;
        let write = prepare_write(
            &self.config,
            document,
            WriteTarget::Insert,
            now_utc(),
            || self.next_generated_key(),
        )?;

        let ctx = self.compile_context()?;
        let operation = compile_insert(&ctx, &write, and_get)?;
        let execution = self.execute(&operation)?;

        if and_get {
            Self::returned_document(&operation, &execution, &write)
        } else {
            Ok(write.header())
        }
    }

    fn save_with(&self, document: &Document) -> Result<PreparedWrite, Error> {
        self.require_writable()?;
        let write = prepare_write(
            &self.config,
            document,
            WriteTarget::Save,
            now_utc(),
            || Err(Error::operation_internal("save never generates keys")),
        )?;

        let ctx = self.compile_context()?;
        let operation = compile_upsert(&ctx, &write)?;
        self.execute(&operation)?;

        Ok(write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{KeyAssignment, VersionMethod},
        db::{
            backend::{BindValue, CancelHandle, ColumnValue, Execution, Row},
            compiled::{BindRole, CommandShape},
        },
        error::ErrorClass,
        test_support::{MockConnection, client_config, collection, collection_with, text_row},
    };
    use sha2::{Digest, Sha256};
    use std::thread;

    fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode_upper(Sha256::digest(bytes))
    }

    #[test]
    fn capabilities_are_probed_once() {
        let connection = MockConnection::new()
            .with_handler(|_| Ok(Execution::rows(vec![Row(vec![ColumnValue::Int(0)])])));
        let docs = collection_with(client_config(), connection);

        docs.find().count().expect("count");
        docs.find().count().expect("count");

        assert_eq!(docs.connection().probes, 1);
    }

    #[test]
    fn cancel_handles_interrupt_an_in_flight_call() {
        let connection = MockConnection::new().blocking_until_cancelled();
        let signal = connection.cancel_signal();
        let docs = collection_with(client_config(), connection);
        let handle = docs.cancel_handle().expect("handle");

        let err = thread::scope(|scope| {
            scope.spawn(move || {
                signal.wait_in_flight();
                handle.cancel().expect("cancel");
            });

            docs.find()
                .key("a")
                .expect("key")
                .remove()
                .expect_err("cancelled")
        });

        assert_eq!(err.class, ErrorClass::Backend);
        assert!(err.message.contains("ORA-01013"));
        assert_eq!(err.command(), Some(r#"DELETE FROM "DOCS" WHERE "ID" = ?"#));
        assert_eq!(docs.connection().cancel_signal().cancels(), 1);
    }

    #[test]
    fn insert_binds_key_content_and_version() {
        let docs = collection(client_config());
        let content = br#"{"v":1}"#;

        docs.insert(&Document::new(content.to_vec()).with_key("a"))
            .expect("insert");

        let connection = docs.connection();
        let insert = &connection.executed[0];
        assert_eq!(insert.shape(), CommandShape::Insert);
        assert_eq!(insert.bind(BindRole::Key), Some(&BindValue::Text("a".to_string())));
        assert_eq!(
            insert.bind(BindRole::Content),
            Some(&BindValue::Bytes(content.to_vec()))
        );
        assert_eq!(
            insert.bind(BindRole::Version),
            Some(&BindValue::Text(sha256_hex(content)))
        );
    }

    #[test]
    fn client_keys_are_required_on_insert() {
        let docs = collection(client_config());

        let err = docs.insert(&Document::new(b"{}".to_vec())).expect_err("no key");

        assert_eq!(err.class, ErrorClass::InvalidArgument);
        assert!(docs.connection().executed.is_empty());
    }

    #[test]
    fn insert_and_get_reports_generated_headers() {
        let connection = MockConnection::new().with_handler(|_| {
            Ok(Execution::affected(1).with_rows(vec![text_row(&[
                "2024-05-01T00:00:00Z",
                "2024-05-01T00:00:00Z",
            ])]))
        });
        let docs = collection_with(
            CollectionConfig::builder("docs", "DOCS")
                .build()
                .expect("valid config"),
            connection,
        );

        let header = docs
            .insert_and_get(&Document::new(br#"{"v":1}"#.to_vec()))
            .expect("insert");

        assert!(header.key().is_some_and(|key| key.len() == 32));
        assert_eq!(header.last_modified(), Some("2024-05-01T00:00:00Z"));
        assert_eq!(header.version(), Some(sha256_hex(br#"{"v":1}"#).as_str()));
        assert!(header.content().is_none());
    }

    #[test]
    fn sequence_keys_refill_in_whole_batches() {
        let config = CollectionConfig::builder("docs", "DOCS")
            .key_assignment(KeyAssignment::Sequence("DOC_SEQ".to_string()))
            .build()
            .expect("valid config");
        let mut next = 0;
        let connection = MockConnection::new().with_handler(move |operation| {
            Ok(match operation.shape() {
                CommandShape::KeyBatch => {
                    let rows = (0..3)
                        .map(|_| {
                            next += 1;
                            text_row(&[next.to_string().as_str()])
                        })
                        .collect();
                    Execution::rows(rows)
                }
                _ => Execution::affected(1),
            })
        });
        let docs = collection_with(config, connection)
            .with_settings(CompilerSettings::default().key_batch_size(3));

        for _ in 0..4 {
            docs.insert(&Document::new(b"{}".to_vec())).expect("insert");
        }

        let connection = docs.connection();
        let shapes = connection.shapes();
        assert_eq!(
            shapes
                .iter()
                .filter(|shape| **shape == CommandShape::KeyBatch)
                .count(),
            2
        );
        let last_insert = connection.executed.last().expect("insert");
        assert_eq!(
            last_insert.bind(BindRole::Key),
            Some(&BindValue::Text("4".to_string()))
        );
    }

    #[test]
    fn partial_key_batches_are_rejected() {
        let config = CollectionConfig::builder("docs", "DOCS")
            .key_assignment(KeyAssignment::Guid)
            .build()
            .expect("valid config");
        let connection = MockConnection::new()
            .with_handler(|_| Ok(Execution::rows(vec![text_row(&["0A1B"])])));
        let docs = collection_with(config, connection);

        let err = docs.insert(&Document::new(b"{}".to_vec())).expect_err("short batch");

        assert_eq!(err.class, ErrorClass::Internal);
        assert_eq!(docs.connection().shapes(), vec![CommandShape::KeyBatch]);
    }

    #[test]
    fn save_and_get_reads_back_headers() {
        let connection = MockConnection::new().with_handler(|operation| {
            Ok(match operation.shape() {
                CommandShape::Select => Execution::rows(vec![text_row(&[
                    "a",
                    "2024-05-01T00:00:00Z",
                    "2024-01-01T00:00:00Z",
                    "TOKEN",
                ])]),
                _ => Execution::affected(1),
            })
        });
        let docs = collection_with(client_config(), connection);

        let header = docs
            .save_and_get(&Document::new(b"{}".to_vec()).with_key("a"))
            .expect("save");

        assert_eq!(header.key(), Some("a"));
        assert_eq!(header.version(), Some("TOKEN"));
        assert_eq!(
            docs.connection().shapes(),
            vec![CommandShape::Upsert, CommandShape::Select]
        );
    }

    #[test]
    fn save_needs_a_known_key() {
        let docs = collection(
            CollectionConfig::builder("docs", "DOCS")
                .build()
                .expect("valid config"),
        );

        let err = docs.save(&Document::new(b"{}".to_vec())).expect_err("uuid keys");

        assert_eq!(err.class, ErrorClass::Unsupported);
    }

    #[test]
    fn backend_failures_carry_the_command() {
        let docs = collection_with(client_config(), MockConnection::new().fail_on(1));

        let err = docs.find().key("a").expect("key").remove().expect_err("fails");

        assert_eq!(err.class, ErrorClass::Backend);
        assert_eq!(err.command(), Some(r#"DELETE FROM "DOCS" WHERE "ID" = ?"#));
    }

    #[test]
    fn replace_round_trip_honors_the_version_precondition() {
        let hash_v1 = sha256_hex(br#"{"v":1}"#);
        let hash_v2 = sha256_hex(br#"{"v":2}"#);

        // one stored row whose version moves with every successful write
        let mut stored: Option<BindValue> = None;
        let connection = MockConnection::new().with_handler(move |operation| {
            let versions: Vec<&BindValue> = operation
                .binds()
                .iter()
                .filter(|bind| bind.role == BindRole::Version)
                .map(|bind| &bind.value)
                .collect();
            let affected = match (operation.shape(), versions.as_slice()) {
                (CommandShape::Insert, [next]) => {
                    stored = Some((*next).clone());
                    1
                }
                (CommandShape::Update, [next, expected]) if stored.as_ref() == Some(*expected) => {
                    stored = Some((*next).clone());
                    1
                }
                _ => 0,
            };
            Ok(Execution::affected(affected))
        });
        let docs = collection_with(
            crate::test_support::versioned_config(VersionMethod::Sha256),
            connection,
        );
        docs.insert(&Document::new(br#"{"v":1}"#.to_vec()).with_key("a"))
            .expect("insert");

        let next = Document::new(br#"{"v":2}"#.to_vec());
        let replace_under = |version: &str| {
            docs.find()
                .key("a")
                .expect("key")
                .version(version)
                .expect("version")
                .replace(&next)
                .expect("replace")
        };
        let compiled = docs
            .find()
            .key("a")
            .expect("key")
            .version(&hash_v1)
            .expect("version")
            .compile_replace(&next, false)
            .expect("compiles");

        let fresh = replace_under(&hash_v1);
        let stale = replace_under(&hash_v1);
        let current = replace_under(&hash_v2);

        assert_eq!(
            compiled.bind(BindRole::Content),
            Some(&BindValue::Bytes(br#"{"v":2}"#.to_vec()))
        );
        assert_eq!(
            compiled.bind(BindRole::Version),
            Some(&BindValue::Text(hash_v2.clone()))
        );
        assert!(fresh);
        assert!(!stale);
        assert!(current);
    }
}
