//! Observability utilities: subscriber setup and span attributes.

mod tracing;

pub use self::tracing::{init_tracing, RunSpanAttributes, SpanTimer, StageSpanAttributes};
