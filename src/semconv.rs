//! Span attribute keys for build telemetry.

pub const PROJECT_GROUP_ID: &str = "build.project.group_id";
pub const PROJECT_ARTIFACT_ID: &str = "build.project.artifact_id";
pub const PROJECT_VERSION: &str = "build.project.version";

pub const PLUGIN_GROUP_ID: &str = "build.plugin.group_id";
pub const PLUGIN_ARTIFACT_ID: &str = "build.plugin.artifact_id";
pub const PLUGIN_VERSION: &str = "build.plugin.version";

pub const EXECUTION_GOAL: &str = "build.execution.goal";
pub const EXECUTION_ID: &str = "build.execution.id";
pub const EXECUTION_LIFECYCLE_PHASE: &str = "build.execution.lifecycle_phase";
