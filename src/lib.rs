//! Distributed-tracing instrumentation for multi-phase build executions.
//!
//! Maps a build host's lifecycle callbacks onto an OpenTelemetry span tree
//! that mirrors the build's structure, and guarantees the span pipeline is
//! flushed and torn down exactly once, when the last open project build
//! reaches its terminal callback.
//!
//! ```text
//! com.example:app                            (root - one per project build)
//!   ├── build.project.* attributes, inbound W3C context as parent
//!   │
//!   ├── clean:clean (default-clean) @ app    (child - one per task execution)
//!   │     └── build.plugin.* / build.execution.* attributes
//!   │
//!   └── compiler:compile (default-compile) @ app
//! ```
//!
//! ## Lifecycle
//!
//! 1. Build a [`TracePipeline`] and wrap it in a [`TraceListener`].
//! 2. Install it with [`register_trace_listener`]; a listener the host had
//!    already installed keeps receiving every callback through the chain.
//! 3. The host dispatches project and task callbacks; spans mirror the build,
//!    with lifecycle-ordering violations surfaced as registry errors and
//!    contained at the listener boundary.
//! 4. The terminal callback of the last open project flushes the pipeline
//!    with a bounded wait and then closes the transport, exactly once, even
//!    when the flush stalls.

pub mod counter;
pub mod error;
pub mod event;
pub mod listener;
pub mod pipeline;
pub mod propagation;
pub mod registry;
pub mod semconv;
pub mod shutdown;

pub use counter::ActiveProjectCounter;
pub use error::{ExportError, RegistryError};
pub use event::{
    BuildSession, ExecutionListener, PluginId, ProjectEvent, ProjectId, TaskEvent, TaskExecution,
    TaskKey,
};
pub use listener::{plugin_short_name, register_trace_listener, ChainedListener, TraceListener};
pub use pipeline::TracePipeline;
pub use propagation::{extract_context, EnvCarrier};
pub use registry::SpanRegistry;
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownableExporter};
