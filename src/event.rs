//! Host-facing execution model: unit identities, lifecycle event payloads and
//! the listener capability the host dispatches callbacks through.
//!
//! The host guarantees ordering per unit: `project_started` precedes exactly
//! one terminal callback, and every task callback for a project falls inside
//! that project's open interval. The instrumentation does not re-check this
//! beyond the registry errors that surface violations.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Identity of one top-level project build.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProjectId {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ProjectId {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Identity of the plugin a task execution belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PluginId {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl PluginId {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }
}

/// One task execution nested inside a project build.
///
/// `lifecycle_phase` is absent when the goal was invoked directly rather than
/// bound to a phase.
#[derive(Clone, Debug)]
pub struct TaskExecution {
    pub plugin: PluginId,
    pub goal: String,
    pub execution_id: String,
    pub lifecycle_phase: Option<String>,
}

impl TaskExecution {
    pub fn new(
        plugin: PluginId,
        goal: impl Into<String>,
        execution_id: impl Into<String>,
        lifecycle_phase: Option<String>,
    ) -> Self {
        Self {
            plugin,
            goal: goal.into(),
            execution_id: execution_id.into(),
            lifecycle_phase,
        }
    }

    /// Registry key for this execution. A host never runs the same plugin
    /// goal + execution id concurrently within one project, so the key is
    /// unique while the task is in flight.
    pub fn key(&self) -> TaskKey {
        TaskKey {
            plugin: self.plugin.clone(),
            goal: self.goal.clone(),
            execution_id: self.execution_id.clone(),
        }
    }
}

/// Key identifying one in-flight task execution in the span registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskKey {
    plugin: PluginId,
    goal: String,
    execution_id: String,
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({})",
            self.plugin.artifact_id, self.goal, self.execution_id
        )
    }
}

/// Payload for project-level lifecycle callbacks.
#[derive(Debug)]
pub struct ProjectEvent {
    pub project: ProjectId,
    /// Failure cause supplied by the host on `project_failed`.
    pub failure: Option<anyhow::Error>,
}

impl ProjectEvent {
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            failure: None,
        }
    }

    pub fn failed(project: ProjectId, cause: anyhow::Error) -> Self {
        Self {
            project,
            failure: Some(cause),
        }
    }
}

/// Payload for task-level lifecycle callbacks.
#[derive(Clone, Debug)]
pub struct TaskEvent {
    pub project: ProjectId,
    pub task: TaskExecution,
}

impl TaskEvent {
    pub fn new(project: ProjectId, task: TaskExecution) -> Self {
        Self { project, task }
    }
}

/// Lifecycle callbacks a build host dispatches while executing a build.
///
/// Every method has an empty default so observers implement only what they
/// care about. Callbacks may arrive on different host threads; implementors
/// synchronize internally.
pub trait ExecutionListener: Send + Sync {
    fn project_started(&self, _event: &ProjectEvent) {}
    fn project_succeeded(&self, _event: &ProjectEvent) {}
    fn project_failed(&self, _event: &ProjectEvent) {}
    fn task_started(&self, _event: &TaskEvent) {}
    fn task_succeeded(&self, _event: &TaskEvent) {}
    fn task_failed(&self, _event: &TaskEvent) {}
    fn session_ended(&self) {}

    /// True only for the chain wrapper installed by
    /// [`register_trace_listener`](crate::listener::register_trace_listener);
    /// makes repeated registration detectable.
    fn is_chain_wrapper(&self) -> bool {
        false
    }
}

/// The host's single execution-listener slot for one build session.
///
/// A build tool holds exactly one listener per session and dispatches every
/// lifecycle callback to it. Registration chains into this slot so a
/// previously installed listener keeps receiving events.
#[derive(Default)]
pub struct BuildSession {
    listener: Mutex<Option<Arc<dyn ExecutionListener>>>,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently installed listener, if any.
    pub fn execution_listener(&self) -> Option<Arc<dyn ExecutionListener>> {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the installed listener.
    pub fn set_execution_listener(&self, listener: Arc<dyn ExecutionListener>) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }
}
