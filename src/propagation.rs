//! Inbound trace-context extraction from process environment variables.
//!
//! A CI system launching the build can export `TRACEPARENT`/`TRACESTATE` so
//! the build's spans continue its trace. The W3C propagator asks for
//! header-style lowercase keys, so the carrier maps every lookup onto the
//! upper-cased variable name.

use std::collections::HashMap;

use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Key/value carrier over a captured set of environment variables.
#[derive(Debug, Default)]
pub struct EnvCarrier {
    vars: HashMap<String, String>,
}

impl EnvCarrier {
    /// Snapshot the current process environment.
    pub fn from_process_env() -> Self {
        Self::new(std::env::vars())
    }

    pub fn new(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }
}

impl Extractor for EnvCarrier {
    /// Case-insensitive lookup: the propagator asks for `traceparent`, the
    /// environment carries `TRACEPARENT`.
    fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(&key.to_uppercase()).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }
}

/// Extract the inbound trace context carried by `carrier`, if any.
///
/// Stateless; with no (or an invalid) `TRACEPARENT` the returned context has
/// no active span and new root spans start a fresh trace.
pub fn extract_context(carrier: &EnvCarrier) -> Context {
    TraceContextPropagator::new().extract(carrier)
}
