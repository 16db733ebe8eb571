//! Error taxonomy.
//!
//! Registry-consistency errors mean lifecycle callbacks arrived out of order:
//! a programming-contract violation that is logged loudly but contained at the
//! listener boundary. Telemetry-backend errors are never fatal to the host
//! build and are never retried.

use std::time::Duration;

use thiserror::Error;

use crate::event::TaskKey;

/// A lifecycle-ordering violation surfaced by the span registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("a root span is already registered; a project build is still open")]
    RootSpanAlreadySet,

    #[error("no root span is registered; no project build is open")]
    RootSpanMissing,

    #[error("a span is already registered for task execution {0}")]
    DuplicateTaskSpan(TaskKey),

    #[error("no span is registered for task execution {0}")]
    TaskSpanMissing(TaskKey),
}

/// A non-fatal telemetry-backend condition during flush or teardown.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("trace flush did not complete within {timeout:?}")]
    FlushTimeout { timeout: Duration },

    #[error("trace backend error: {0}")]
    Backend(String),
}
