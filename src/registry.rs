//! In-flight span bookkeeping, keyed by execution unit.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use opentelemetry::Context;
use tracing::warn;

use crate::error::RegistryError;
use crate::event::TaskKey;

/// Tracks the open root span (one project build at a time) plus one span per
/// in-flight task execution.
///
/// Spans are stored as the [`Context`] that owns them so parent linkage
/// survives until the matching terminal callback. The single root slot
/// assumes the host keeps at most one top-level project open at a time;
/// [`RegistryError::RootSpanAlreadySet`] surfaces any violation of that
/// assumption instead of silently misparenting spans.
///
/// All operations serialize on an internal lock: hosts may deliver lifecycle
/// callbacks from different threads.
#[derive(Default)]
pub struct SpanRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    root: Option<Context>,
    tasks: HashMap<TaskKey, Context>,
}

impl SpanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Losing one stale entry to a poisoned lock beats losing all telemetry
    /// for the rest of the build.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("span registry mutex was poisoned, recovering");
            e.into_inner()
        })
    }

    /// Store the root span context for the project build that just started.
    pub fn set_root(&self, cx: Context) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if inner.root.is_some() {
            return Err(RegistryError::RootSpanAlreadySet);
        }
        inner.root = Some(cx);
        Ok(())
    }

    /// Context of the currently open project build. Valid only between a
    /// project's start and its terminal callback.
    pub fn root(&self) -> Result<Context, RegistryError> {
        self.lock().root.clone().ok_or(RegistryError::RootSpanMissing)
    }

    /// Clear and return the root span context.
    pub fn remove_root(&self) -> Result<Context, RegistryError> {
        self.lock().root.take().ok_or(RegistryError::RootSpanMissing)
    }

    /// Store the span context for a task execution that just started.
    pub fn insert_task(&self, key: TaskKey, cx: Context) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if inner.tasks.contains_key(&key) {
            return Err(RegistryError::DuplicateTaskSpan(key));
        }
        inner.tasks.insert(key, cx);
        Ok(())
    }

    /// Context of an in-flight task execution.
    pub fn task(&self, key: &TaskKey) -> Result<Context, RegistryError> {
        self.lock()
            .tasks
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::TaskSpanMissing(key.clone()))
    }

    /// Remove and return the span context for a task execution. Failing means
    /// the host delivered a task-terminal callback without a matching start;
    /// nothing is mutated in that case.
    pub fn remove_task(&self, key: &TaskKey) -> Result<Context, RegistryError> {
        self.lock()
            .tasks
            .remove(key)
            .ok_or_else(|| RegistryError::TaskSpanMissing(key.clone()))
    }

    /// Number of task spans currently in flight.
    pub fn open_task_count(&self) -> usize {
        self.lock().tasks.len()
    }
}
