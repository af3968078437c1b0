//! Test-only backend and collection fixtures.

use crate::{
    config::{CollectionConfig, KeyAssignment, VersionMethod},
    db::{
        Collection,
        backend::{
            BackendError, CancelHandle, Capabilities, ColumnValue, Connection, Execution, Row,
        },
        compiled::{CommandShape, CompiledOperation},
    },
};
use std::sync::{Arc, Condvar, Mutex};

pub(crate) type Handler = Box<dyn FnMut(&CompiledOperation) -> Result<Execution, BackendError>>;

///
/// MockConnection
///
/// Scripted in-process backend. Every executed operation is recorded; the
/// handler decides what each one returns.
///

pub(crate) struct MockConnection {
    capabilities: Capabilities,
    handler: Handler,
    auto_commit: bool,
    fail_on: Option<usize>,
    fail_rollback: bool,
    blocking: bool,
    signal: Arc<CancelSignal>,

    pub(crate) executed: Vec<CompiledOperation>,
    pub(crate) auto_commit_log: Vec<bool>,
    pub(crate) probes: usize,
    pub(crate) commits: usize,
    pub(crate) rollbacks: usize,
}

impl MockConnection {
    /// Writes affect one row; reads return nothing.
    pub(crate) fn new() -> Self {
        Self {
            capabilities: Capabilities::new(true, false),
            handler: Box::new(|operation| {
                Ok(if operation.shape().is_write() {
                    Execution::affected(1)
                } else {
                    Execution::default()
                })
            }),
            auto_commit: true,
            fail_on: None,
            fail_rollback: false,
            blocking: false,
            signal: Arc::default(),
            executed: Vec::new(),
            auto_commit_log: Vec::new(),
            probes: 0,
            commits: 0,
            rollbacks: 0,
        }
    }

    pub(crate) const fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub(crate) fn with_handler(
        mut self,
        handler: impl FnMut(&CompiledOperation) -> Result<Execution, BackendError> + 'static,
    ) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Fail the `n`th execution (1-based).
    pub(crate) const fn fail_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    pub(crate) const fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }

    pub(crate) const fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    /// Every execution blocks until a cancel handle fires, then fails.
    pub(crate) const fn blocking_until_cancelled(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub(crate) fn cancel_signal(&self) -> Arc<CancelSignal> {
        Arc::clone(&self.signal)
    }

    pub(crate) fn shapes(&self) -> Vec<CommandShape> {
        self.executed.iter().map(CompiledOperation::shape).collect()
    }

    pub(crate) const fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }
}

impl Connection for MockConnection {
    type Canceller = MockCanceller;

    fn probe(&mut self) -> Result<Capabilities, BackendError> {
        self.probes += 1;
        Ok(self.capabilities)
    }

    fn execute(&mut self, operation: &CompiledOperation) -> Result<Execution, BackendError> {
        self.executed.push(operation.clone());
        if self.fail_on == Some(self.executed.len()) {
            return Err(BackendError::new("ORA-00060: deadlock detected").with_code(60));
        }
        if self.blocking {
            self.signal.block_until_cancelled();
            return Err(
                BackendError::new("ORA-01013: user requested cancel of current operation")
                    .with_code(1013),
            );
        }

        (self.handler)(operation)
    }

    fn auto_commit(&mut self) -> Result<bool, BackendError> {
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), BackendError> {
        self.auto_commit = enabled;
        self.auto_commit_log.push(enabled);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        self.rollbacks += 1;
        if self.fail_rollback {
            return Err(BackendError::new("ORA-03113: end-of-file on communication channel"));
        }
        Ok(())
    }

    fn cancel_handle(&self) -> MockCanceller {
        MockCanceller(self.cancel_signal())
    }
}

///
/// CancelSignal
/// Shared by a mock connection and every cancel handle it gives out.
///

#[derive(Default)]
pub(crate) struct CancelSignal {
    state: Mutex<SignalState>,
    changed: Condvar,
}

#[derive(Default)]
struct SignalState {
    in_flight: bool,
    cancels: usize,
}

impl CancelSignal {
    pub(crate) fn cancels(&self) -> usize {
        self.state.lock().expect("signal lock").cancels
    }

    /// Wait until an execution is blocked inside the connection.
    pub(crate) fn wait_in_flight(&self) {
        let state = self.state.lock().expect("signal lock");
        let _state = self
            .changed
            .wait_while(state, |state| !state.in_flight)
            .expect("signal lock");
    }

    fn block_until_cancelled(&self) {
        let mut state = self.state.lock().expect("signal lock");
        state.in_flight = true;
        self.changed.notify_all();

        let mut state = self
            .changed
            .wait_while(state, |state| state.cancels == 0)
            .expect("signal lock");
        state.in_flight = false;
    }

    fn cancel(&self) {
        let mut state = self.state.lock().expect("signal lock");
        state.cancels += 1;
        self.changed.notify_all();
    }
}

///
/// MockCanceller
///

pub(crate) struct MockCanceller(Arc<CancelSignal>);

impl CancelHandle for MockCanceller {
    fn cancel(&self) -> Result<(), BackendError> {
        self.0.cancel();
        Ok(())
    }
}

///
/// Fixtures
///

/// Client keys, SHA-256 versions, timestamp columns.
pub(crate) fn client_config() -> CollectionConfig {
    CollectionConfig::builder("docs", "DOCS")
        .key_assignment(KeyAssignment::Client)
        .build()
        .expect("valid config")
}

/// Client keys with a versioning method chosen by the test.
pub(crate) fn versioned_config(method: VersionMethod) -> CollectionConfig {
    CollectionConfig::builder("docs", "DOCS")
        .key_assignment(KeyAssignment::Client)
        .version_column("VERSION", method)
        .build()
        .expect("valid config")
}

pub(crate) fn collection(config: CollectionConfig) -> Collection<MockConnection> {
    Collection::new(config, MockConnection::new())
}

pub(crate) fn collection_with(
    config: CollectionConfig,
    connection: MockConnection,
) -> Collection<MockConnection> {
    Collection::new(config, connection)
}

/// One text row per value.
pub(crate) fn text_row(values: &[&str]) -> Row {
    values
        .iter()
        .map(|value| ColumnValue::Text((*value).to_string()))
        .collect()
}
