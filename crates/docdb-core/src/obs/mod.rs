//! Observability: the optional operation trace boundary.
//!
//! Trace sinks are injected by the caller and never change execution
//! semantics. Ambient diagnostics go through `tracing` directly.

pub(crate) mod trace;

// re-exports
pub use trace::{OperationTraceEvent, OperationTraceSink};
