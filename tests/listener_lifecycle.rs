//! End-to-end lifecycle scenarios: span trees, statuses, inbound context
//! propagation and the single pipeline teardown, observed through an
//! in-memory exporter and a recording teardown capability.

use std::sync::{Arc, Mutex};

use buildtrace::{
    register_trace_listener, BuildSession, EnvCarrier, ExecutionListener, ExportError, PluginId,
    ProjectEvent, ProjectId, ShutdownableExporter, TaskEvent, TaskExecution, TraceListener,
    TracePipeline,
};
use opentelemetry::trace::{SpanId, Status, TraceId};
use opentelemetry::Value;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use pretty_assertions::assert_eq;

/// Teardown capability that records the calls it receives instead of touching
/// the provider, so exported spans stay readable after the pipeline "closes".
#[derive(Default)]
struct RecordingTeardown {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingTeardown {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl ShutdownableExporter for RecordingTeardown {
    fn flush(&self) -> Result<(), ExportError> {
        self.calls.lock().unwrap().push("flush");
        Ok(())
    }

    fn close(&self) -> Result<(), ExportError> {
        self.calls.lock().unwrap().push("close");
        Ok(())
    }
}

fn traced_listener_with_carrier(
    carrier: EnvCarrier,
) -> (Arc<TraceListener>, InMemorySpanExporter, Arc<RecordingTeardown>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let pipeline = TracePipeline::new(provider);
    let teardown = Arc::new(RecordingTeardown::default());
    let listener = TraceListener::with_exporter(
        pipeline.tracer(),
        Arc::clone(&teardown) as Arc<dyn ShutdownableExporter>,
    )
    .with_carrier(carrier);
    (Arc::new(listener), exporter, teardown)
}

fn traced_listener() -> (Arc<TraceListener>, InMemorySpanExporter, Arc<RecordingTeardown>) {
    traced_listener_with_carrier(EnvCarrier::default())
}

fn project() -> ProjectId {
    ProjectId::new("com.example", "app", "1.0.0")
}

fn clean_task() -> TaskExecution {
    TaskExecution::new(
        PluginId::new("org.apache.maven.plugins", "maven-clean-plugin", "3.2.0"),
        "clean",
        "default-clean",
        Some("clean".into()),
    )
}

fn compile_task() -> TaskExecution {
    TaskExecution::new(
        PluginId::new("org.apache.maven.plugins", "maven-compiler-plugin", "3.11.0"),
        "compile",
        "default-compile",
        Some("compile".into()),
    )
}

fn attribute(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

fn span_named<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|span| span.name == name)
        .unwrap_or_else(|| panic!("no span named {name}"))
}

#[test]
fn full_build_produces_a_span_tree_mirroring_the_build() {
    let (listener, exporter, teardown) = traced_listener();
    let project = project();

    listener.project_started(&ProjectEvent::new(project.clone()));
    for task in [clean_task(), compile_task()] {
        listener.task_started(&TaskEvent::new(project.clone(), task.clone()));
        listener.task_succeeded(&TaskEvent::new(project.clone(), task));
    }

    // Both tasks done, project still open: nothing torn down yet.
    assert_eq!(teardown.calls(), Vec::<&str>::new());

    listener.project_succeeded(&ProjectEvent::new(project));
    listener.session_ended();

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 3);

    let root = span_named(&spans, "com.example:app");
    assert_eq!(root.status, Status::Ok);
    assert_eq!(root.parent_span_id, SpanId::INVALID);
    assert_eq!(
        attribute(root, "build.project.group_id"),
        Some(Value::from("com.example"))
    );
    assert_eq!(
        attribute(root, "build.project.version"),
        Some(Value::from("1.0.0"))
    );

    let root_span_id = root.span_context.span_id();
    for (name, goal) in [
        ("clean:clean (default-clean) @ app", "clean"),
        ("compiler:compile (default-compile) @ app", "compile"),
    ] {
        let task_span = span_named(&spans, name);
        assert_eq!(task_span.parent_span_id, root_span_id);
        assert_eq!(task_span.status, Status::Ok);
        assert_eq!(
            task_span.span_context.trace_id(),
            root.span_context.trace_id()
        );
        assert_eq!(
            attribute(task_span, "build.execution.goal"),
            Some(Value::from(goal))
        );
        assert_eq!(
            attribute(task_span, "build.execution.lifecycle_phase"),
            Some(Value::from(goal))
        );
    }

    // The last open project triggered exactly one flush-then-close.
    assert_eq!(teardown.calls(), vec!["flush", "close"]);
}

#[test]
fn failed_project_records_cause_and_still_tears_down() {
    let (listener, exporter, teardown) = traced_listener();
    let project = project();

    listener.project_started(&ProjectEvent::new(project.clone()));
    listener.task_started(&TaskEvent::new(project.clone(), clean_task()));
    listener.task_succeeded(&TaskEvent::new(project.clone(), clean_task()));
    listener.project_failed(&ProjectEvent::failed(
        project,
        anyhow::anyhow!("compilation failure"),
    ));

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 2);

    let task_span = span_named(&spans, "clean:clean (default-clean) @ app");
    assert_eq!(task_span.status, Status::Ok);

    let root = span_named(&spans, "com.example:app");
    assert_eq!(root.status, Status::error("compilation failure"));
    let exception = root
        .events
        .iter()
        .find(|event| event.name == "exception")
        .expect("failure cause recorded as exception event");
    assert!(exception
        .attributes
        .iter()
        .any(|kv| kv.key.as_str() == "exception.message"
            && kv.value.as_str().contains("compilation failure")));

    assert_eq!(teardown.calls(), vec!["flush", "close"]);
}

#[test]
fn failed_task_span_gets_a_fixed_error_description() {
    let (listener, exporter, _teardown) = traced_listener();
    let project = project();

    listener.project_started(&ProjectEvent::new(project.clone()));
    listener.task_started(&TaskEvent::new(project.clone(), compile_task()));
    listener.task_failed(&TaskEvent::new(project.clone(), compile_task()));

    let spans = exporter.get_finished_spans().unwrap();
    let task_span = span_named(&spans, "compiler:compile (default-compile) @ app");
    assert_eq!(task_span.status, Status::error("task execution failed"));
}

#[test]
fn inbound_trace_context_parents_the_root_span() {
    let (listener, exporter, _teardown) = traced_listener_with_carrier(EnvCarrier::new([(
        "TRACEPARENT".to_string(),
        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
    )]));

    let project = project();
    listener.project_started(&ProjectEvent::new(project.clone()));
    listener.project_succeeded(&ProjectEvent::new(project));

    let spans = exporter.get_finished_spans().unwrap();
    let root = span_named(&spans, "com.example:app");
    assert_eq!(
        root.span_context.trace_id(),
        TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap()
    );
    assert_eq!(
        root.parent_span_id,
        SpanId::from_hex("b7ad6b7169203331").unwrap()
    );
}

#[test]
fn sequential_projects_tear_down_exactly_once() {
    let (listener, exporter, teardown) = traced_listener();

    for (index, failed) in [(0, false), (1, true), (2, false)] {
        let project = ProjectId::new("com.example", format!("module-{index}"), "1.0.0");
        listener.project_started(&ProjectEvent::new(project.clone()));
        if failed {
            listener.project_failed(&ProjectEvent::failed(
                project,
                anyhow::anyhow!("module {index} failed"),
            ));
        } else {
            listener.project_succeeded(&ProjectEvent::new(project));
        }

        // The teardown fired on the first zero transition and never again.
        assert_eq!(teardown.calls(), vec!["flush", "close"]);
    }

    assert_eq!(exporter.get_finished_spans().unwrap().len(), 3);
}

#[test]
fn out_of_order_task_callbacks_are_contained() {
    let (listener, exporter, _teardown) = traced_listener();
    let project = project();

    // Terminal callback with no matching start: surfaced, nothing exported,
    // the host is unaffected.
    listener.task_succeeded(&TaskEvent::new(project.clone(), clean_task()));
    assert!(exporter.get_finished_spans().unwrap().is_empty());

    // A task before its project: no root span to parent on, nothing exported.
    listener.task_started(&TaskEvent::new(project.clone(), clean_task()));
    assert!(exporter.get_finished_spans().unwrap().is_empty());

    // The listener still instruments a well-formed build afterwards.
    listener.project_started(&ProjectEvent::new(project.clone()));
    listener.task_started(&TaskEvent::new(project.clone(), clean_task()));
    listener.task_succeeded(&TaskEvent::new(project.clone(), clean_task()));
    listener.project_succeeded(&ProjectEvent::new(project));
    assert_eq!(exporter.get_finished_spans().unwrap().len(), 2);
}

#[test]
fn duplicate_task_start_ends_the_extra_span() {
    let (listener, exporter, _teardown) = traced_listener();
    let project = project();

    listener.project_started(&ProjectEvent::new(project.clone()));
    listener.task_started(&TaskEvent::new(project.clone(), clean_task()));
    listener.task_started(&TaskEvent::new(project.clone(), clean_task()));
    listener.task_succeeded(&TaskEvent::new(project.clone(), clean_task()));
    listener.project_succeeded(&ProjectEvent::new(project));

    let spans = exporter.get_finished_spans().unwrap();
    // Root + the registered task span + the rejected duplicate: every span
    // created was also ended.
    assert_eq!(spans.len(), 3);
    let statuses: Vec<_> = spans
        .iter()
        .filter(|span| span.name == "clean:clean (default-clean) @ app")
        .map(|span| span.status.clone())
        .collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&Status::Ok));
    assert!(statuses
        .iter()
        .any(|status| matches!(status, Status::Error { .. })));
}

/// Counts the project callbacks that reach a pre-existing host listener.
#[derive(Default)]
struct CountingListener {
    started: Mutex<usize>,
    finished: Mutex<usize>,
}

impl ExecutionListener for CountingListener {
    fn project_started(&self, _event: &ProjectEvent) {
        *self.started.lock().unwrap() += 1;
    }

    fn project_succeeded(&self, _event: &ProjectEvent) {
        *self.finished.lock().unwrap() += 1;
    }
}

#[test]
fn registration_chains_the_previous_listener_and_is_idempotent() {
    let (listener, exporter, _teardown) = traced_listener();

    let session = BuildSession::new();
    let host_listener = Arc::new(CountingListener::default());
    session.set_execution_listener(Arc::clone(&host_listener) as Arc<dyn ExecutionListener>);

    register_trace_listener(&session, Arc::clone(&listener));
    let installed = session.execution_listener().expect("listener installed");
    assert!(installed.is_chain_wrapper());

    // A second registration must not wrap the chain again.
    register_trace_listener(&session, listener);
    let installed_again = session.execution_listener().expect("listener installed");
    assert!(Arc::ptr_eq(&installed, &installed_again));

    // Both the tracing listener and the pre-existing one observe the build.
    let project = project();
    installed.project_started(&ProjectEvent::new(project.clone()));
    installed.project_succeeded(&ProjectEvent::new(project));

    assert_eq!(*host_listener.started.lock().unwrap(), 1);
    assert_eq!(*host_listener.finished.lock().unwrap(), 1);
    assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
}
