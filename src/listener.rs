//! Lifecycle listener mapping host build callbacks onto the span pipeline.
//!
//! The pipeline is torn down when the *last open project* reaches its
//! terminal callback, not at session end: build hosts can unload extension
//! code (the exporter included) before the session-end callback fires, and a
//! teardown attempted that late loses buffered spans.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::{Status, TraceContextExt, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::SdkTracer;
use tracing::{debug, error, info};

use crate::counter::ActiveProjectCounter;
use crate::event::{BuildSession, ExecutionListener, ProjectEvent, TaskEvent};
use crate::pipeline::TracePipeline;
use crate::propagation::{extract_context, EnvCarrier};
use crate::registry::SpanRegistry;
use crate::semconv;
use crate::shutdown::{ShutdownCoordinator, ShutdownableExporter};

/// Fixed status description for failed task spans; the host does not hand the
/// task's cause to terminal task callbacks.
const TASK_FAILED_DESCRIPTION: &str = "task execution failed";

/// Execution listener that mirrors the build as an OpenTelemetry span tree.
///
/// One root span per project build (named `{group_id}:{artifact_id}`, parented
/// on any inbound trace context found in the environment), one child span per
/// task execution. Span bookkeeping errors are contained here: they are logged
/// as contract violations and never propagate into the host build.
pub struct TraceListener {
    tracer: SdkTracer,
    registry: SpanRegistry,
    active_projects: ActiveProjectCounter,
    shutdown: ShutdownCoordinator,
    carrier: EnvCarrier,
}

impl TraceListener {
    /// Listener over `pipeline`, reading inbound trace context from the
    /// process environment and flushing with the default bound on teardown.
    pub fn new(pipeline: TracePipeline) -> Self {
        let tracer = pipeline.tracer();
        Self::with_exporter(tracer, Arc::new(pipeline))
    }

    /// Listener over an explicit tracer and teardown capability, for callers
    /// that decorate or observe the teardown path.
    pub fn with_exporter(tracer: SdkTracer, exporter: Arc<dyn ShutdownableExporter>) -> Self {
        Self {
            tracer,
            registry: SpanRegistry::new(),
            active_projects: ActiveProjectCounter::new(),
            shutdown: ShutdownCoordinator::new(exporter),
            carrier: EnvCarrier::from_process_env(),
        }
    }

    /// Replace the inbound-context carrier (the default snapshots the process
    /// environment at construction).
    pub fn with_carrier(mut self, carrier: EnvCarrier) -> Self {
        self.carrier = carrier;
        self
    }

    /// Bound on the flush wait when the pipeline is torn down.
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown = self.shutdown.with_flush_timeout(timeout);
        self
    }

    fn end_root_span(&self, event: &ProjectEvent, failed: bool) {
        match self.registry.remove_root() {
            Ok(cx) => {
                let span = cx.span();
                if failed {
                    let description = event
                        .failure
                        .as_ref()
                        .map(|cause| cause.to_string())
                        .unwrap_or_default();
                    if let Some(cause) = &event.failure {
                        span.record_error(cause.as_ref());
                    }
                    span.set_status(Status::error(description));
                } else {
                    span.set_status(Status::Ok);
                }
                span.end();
            }
            Err(err) => error!("lifecycle callbacks out of order: {err}"),
        }
    }
}

/// Runs the counter decrement (and, on the zero transition, the pipeline
/// teardown) when dropped, so the step executes on every exit path of a
/// terminal project callback.
struct ProjectTerminalGuard<'a> {
    listener: &'a TraceListener,
}

impl Drop for ProjectTerminalGuard<'_> {
    fn drop(&mut self) {
        if self.listener.active_projects.decrement_and_check_zero() {
            debug!("last active project finished, shutting down trace pipeline");
            self.listener.shutdown.shutdown();
        }
    }
}

impl ExecutionListener for TraceListener {
    fn project_started(&self, event: &ProjectEvent) {
        let project = &event.project;
        let parent_cx = extract_context(&self.carrier);
        let span_name = format!("{}:{}", project.group_id, project.artifact_id);
        debug!("starting project span {span_name}");

        let span = self
            .tracer
            .span_builder(span_name)
            .with_attributes(vec![
                KeyValue::new(semconv::PROJECT_GROUP_ID, project.group_id.clone()),
                KeyValue::new(semconv::PROJECT_ARTIFACT_ID, project.artifact_id.clone()),
                KeyValue::new(semconv::PROJECT_VERSION, project.version.clone()),
            ])
            .start_with_context(&self.tracer, &parent_cx);
        let cx = parent_cx.with_span(span);

        if let Err(err) = self.registry.set_root(cx.clone()) {
            error!("lifecycle callbacks out of order: {err}");
            let span = cx.span();
            span.set_status(Status::error("another project build is already open"));
            span.end();
        }
        self.active_projects.increment();
    }

    fn project_succeeded(&self, event: &ProjectEvent) {
        // Decrement (and possibly tear down) even if bookkeeping errors out.
        let _terminal = ProjectTerminalGuard { listener: self };
        debug!("ending project span {} (succeeded)", event.project);
        self.end_root_span(event, false);
    }

    fn project_failed(&self, event: &ProjectEvent) {
        let _terminal = ProjectTerminalGuard { listener: self };
        debug!("ending project span {} (failed)", event.project);
        self.end_root_span(event, true);
    }

    fn task_started(&self, event: &TaskEvent) {
        let root_cx = match self.registry.root() {
            Ok(cx) => cx,
            Err(err) => {
                error!("cannot start task span, {err}");
                return;
            }
        };

        let task = &event.task;
        let span_name = format!(
            "{}:{} ({}) @ {}",
            plugin_short_name(&task.plugin.artifact_id),
            task.goal,
            task.execution_id,
            event.project.artifact_id
        );
        debug!("starting task span {span_name}");

        let mut attributes = vec![
            KeyValue::new(semconv::PROJECT_GROUP_ID, event.project.group_id.clone()),
            KeyValue::new(semconv::PROJECT_ARTIFACT_ID, event.project.artifact_id.clone()),
            KeyValue::new(semconv::PROJECT_VERSION, event.project.version.clone()),
            KeyValue::new(semconv::PLUGIN_GROUP_ID, task.plugin.group_id.clone()),
            KeyValue::new(semconv::PLUGIN_ARTIFACT_ID, task.plugin.artifact_id.clone()),
            KeyValue::new(semconv::PLUGIN_VERSION, task.plugin.version.clone()),
            KeyValue::new(semconv::EXECUTION_GOAL, task.goal.clone()),
            KeyValue::new(semconv::EXECUTION_ID, task.execution_id.clone()),
        ];
        if let Some(phase) = &task.lifecycle_phase {
            attributes.push(KeyValue::new(
                semconv::EXECUTION_LIFECYCLE_PHASE,
                phase.clone(),
            ));
        }

        // The root context is the explicit parent: no ambient thread-local
        // activation to leak on an early return.
        let span = self
            .tracer
            .span_builder(span_name)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, &root_cx);
        let cx = root_cx.with_span(span);

        if let Err(err) = self.registry.insert_task(task.key(), cx.clone()) {
            error!("lifecycle callbacks out of order: {err}");
            let span = cx.span();
            span.set_status(Status::error("duplicate task execution span"));
            span.end();
        }
    }

    fn task_succeeded(&self, event: &TaskEvent) {
        debug!("ending task span {} (succeeded)", event.task.key());
        match self.registry.remove_task(&event.task.key()) {
            Ok(cx) => {
                let span = cx.span();
                span.set_status(Status::Ok);
                span.end();
            }
            Err(err) => error!("lifecycle callbacks out of order: {err}"),
        }
    }

    fn task_failed(&self, event: &TaskEvent) {
        debug!("ending task span {} (failed)", event.task.key());
        match self.registry.remove_task(&event.task.key()) {
            Ok(cx) => {
                let span = cx.span();
                span.set_status(Status::error(TASK_FAILED_DESCRIPTION));
                span.end();
            }
            Err(err) => error!("lifecycle callbacks out of order: {err}"),
        }
    }

    fn session_ended(&self) {
        debug!("build session ended");
    }
}

/// Dispatches every callback to an ordered list of listeners, so the tracing
/// listener coexists with whatever listener the host had already installed.
pub struct ChainedListener {
    listeners: Vec<Arc<dyn ExecutionListener>>,
}

impl ChainedListener {
    /// Chain `first` ahead of the previously installed `second`.
    pub fn new(
        first: Arc<dyn ExecutionListener>,
        second: Option<Arc<dyn ExecutionListener>>,
    ) -> Self {
        let mut listeners = vec![first];
        listeners.extend(second);
        Self { listeners }
    }
}

impl ExecutionListener for ChainedListener {
    fn project_started(&self, event: &ProjectEvent) {
        for listener in &self.listeners {
            listener.project_started(event);
        }
    }

    fn project_succeeded(&self, event: &ProjectEvent) {
        for listener in &self.listeners {
            listener.project_succeeded(event);
        }
    }

    fn project_failed(&self, event: &ProjectEvent) {
        for listener in &self.listeners {
            listener.project_failed(event);
        }
    }

    fn task_started(&self, event: &TaskEvent) {
        for listener in &self.listeners {
            listener.task_started(event);
        }
    }

    fn task_succeeded(&self, event: &TaskEvent) {
        for listener in &self.listeners {
            listener.task_succeeded(event);
        }
    }

    fn task_failed(&self, event: &TaskEvent) {
        for listener in &self.listeners {
            listener.task_failed(event);
        }
    }

    fn session_ended(&self) {
        for listener in &self.listeners {
            listener.session_ended();
        }
    }

    fn is_chain_wrapper(&self) -> bool {
        true
    }
}

/// Install `listener` into the session's single execution-listener slot,
/// chaining any listener already present so both keep receiving callbacks.
///
/// Idempotent: an installed chain wrapper means registration already
/// happened, and the call is a no-op.
pub fn register_trace_listener(session: &BuildSession, listener: Arc<TraceListener>) {
    let current = session.execution_listener();
    if current
        .as_ref()
        .is_some_and(|installed| installed.is_chain_wrapper())
    {
        debug!("trace listener already registered");
        return;
    }
    info!(
        "registering trace listener (chaining existing listener: {})",
        current.is_some()
    );
    session.set_execution_listener(Arc::new(ChainedListener::new(listener, current)));
}

/// Shorten a plugin artifact id by its conventional naming wrapper:
/// `maven-clean-plugin` -> `clean`, `sisu-maven-plugin` -> `sisu`,
/// `spotbugs-maven-plugin` -> `spotbugs`. Anything else is left unchanged.
pub fn plugin_short_name(artifact_id: &str) -> &str {
    if let Some(short) = artifact_id.strip_suffix("-maven-plugin") {
        return short;
    }
    if let Some(short) = artifact_id
        .strip_prefix("maven-")
        .and_then(|rest| rest.strip_suffix("-plugin"))
    {
        return short;
    }
    artifact_id
}
