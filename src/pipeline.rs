//! Ownership of the tracer provider and exporter transport for one build.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};

use crate::error::ExportError;
use crate::shutdown::ShutdownableExporter;

/// Instrumentation scope recorded on every span.
const SCOPE_NAME: &str = "buildtrace";

/// Owns the span pipeline (tracer provider + exporter) for one build.
///
/// Created once per build and destroyed exactly once by the
/// [`ShutdownCoordinator`](crate::shutdown::ShutdownCoordinator). Holding the
/// handle in the listener keeps lifetime and teardown ownership explicit
/// instead of routing through a process-wide global.
pub struct TracePipeline {
    provider: SdkTracerProvider,
}

impl TracePipeline {
    pub fn new(provider: SdkTracerProvider) -> Self {
        Self { provider }
    }

    /// Tracer used for every span the listener creates.
    pub fn tracer(&self) -> SdkTracer {
        self.provider.tracer(SCOPE_NAME)
    }
}

impl ShutdownableExporter for TracePipeline {
    fn flush(&self) -> Result<(), ExportError> {
        self.provider
            .force_flush()
            .map_err(|err| ExportError::Backend(err.to_string()))
    }

    fn close(&self) -> Result<(), ExportError> {
        self.provider
            .shutdown()
            .map_err(|err| ExportError::Backend(err.to_string()))
    }
}

#[cfg(feature = "otlp")]
mod otlp {
    //! OTLP/HTTP pipeline construction.

    use anyhow::{Context as _, Result};
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;
    use tracing::debug;

    use super::TracePipeline;

    /// Conventional OTLP endpoint variable; export stays disabled when unset.
    const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

    const SERVICE_NAME: &str = "buildtrace";

    impl TracePipeline {
        /// Build a pipeline from the conventional environment configuration.
        ///
        /// With no endpoint configured the provider carries no exporter:
        /// spans are still created but never shipped, and the host build is
        /// never failed over missing telemetry configuration.
        pub fn from_env() -> Result<Self> {
            match std::env::var(ENDPOINT_VAR) {
                Ok(endpoint) if !endpoint.is_empty() => Self::otlp(&endpoint),
                _ => {
                    debug!("{ENDPOINT_VAR} not set, trace export disabled");
                    Ok(Self::new(SdkTracerProvider::builder().build()))
                }
            }
        }

        /// Build a pipeline exporting to `endpoint` over OTLP/HTTP with a
        /// batch processor.
        pub fn otlp(endpoint: &str) -> Result<Self> {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .build()
                .context("failed to build OTLP span exporter")?;
            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
                .build();
            Ok(Self::new(provider))
        }
    }
}
