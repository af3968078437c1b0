//! Operation tracing boundary.
//!
//! Tracing is optional, injected by the caller, and must not affect execution semantics.

use crate::{
    db::compiled::{CommandShape, CompiledOperation, OperationFingerprint},
    error::{Error, ErrorClass, ErrorOrigin},
};

///
/// OperationTraceSink
///

pub trait OperationTraceSink: Send + Sync {
    fn on_event(&self, event: OperationTraceEvent);
}

///
/// OperationTraceEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationTraceEvent {
    Start {
        fingerprint: OperationFingerprint,
        shape: CommandShape,
        binds: u32,
    },
    Finish {
        fingerprint: OperationFingerprint,
        shape: CommandShape,
        rows_affected: u64,
        rows: u64,
    },
    Error {
        fingerprint: OperationFingerprint,
        shape: CommandShape,
        class: ErrorClass,
        origin: ErrorOrigin,
    },
}

///
/// TraceScope
///

pub(crate) struct TraceScope {
    sink: &'static dyn OperationTraceSink,
    fingerprint: OperationFingerprint,
    shape: CommandShape,
}

impl TraceScope {
    fn new(sink: &'static dyn OperationTraceSink, operation: &CompiledOperation) -> Self {
        let fingerprint = operation.fingerprint();
        let shape = operation.shape();
        sink.on_event(OperationTraceEvent::Start {
            fingerprint,
            shape,
            binds: u32::try_from(operation.binds().len()).unwrap_or(u32::MAX),
        });

        Self {
            sink,
            fingerprint,
            shape,
        }
    }

    pub(crate) fn finish(self, rows_affected: u64, rows: usize) {
        self.sink.on_event(OperationTraceEvent::Finish {
            fingerprint: self.fingerprint,
            shape: self.shape,
            rows_affected,
            rows: u64::try_from(rows).unwrap_or(u64::MAX),
        });
    }

    pub(crate) fn error(self, err: &Error) {
        self.sink.on_event(OperationTraceEvent::Error {
            fingerprint: self.fingerprint,
            shape: self.shape,
            class: err.class,
            origin: err.origin,
        });
    }
}

pub(crate) fn start_operation_trace(
    sink: Option<&'static dyn OperationTraceSink>,
    operation: &CompiledOperation,
) -> Option<TraceScope> {
    let sink = sink?;
    Some(TraceScope::new(sink, operation))
}
