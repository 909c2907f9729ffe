//! OpenTelemetry tracer initialization and lifecycle management
//!
//! Builds the SDK tracer provider from `TracingConfig`, installs the W3C
//! propagator and the global provider, and hands back an RAII guard that
//! flushes pending spans on drop.

use crate::config::TracingConfig;
use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{self, Sampler, TracerProvider};
use opentelemetry_sdk::Resource;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during tracing initialization
#[derive(Error, Debug)]
pub enum TracingError {
    #[error("Invalid tracing configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to initialize OTLP exporter: {0}")]
    ExporterError(String),

    #[error("Failed to initialize tracer provider: {0}")]
    ProviderError(String),
}

/// RAII guard for tracing lifecycle management.
///
/// Flushes and shuts down the tracer provider when dropped, so pending
/// spans reach the exporter before the process exits.
#[derive(Debug)]
pub struct TracingGuard {
    provider: Option<Arc<TracerProvider>>,
    active: bool,
}

impl TracingGuard {
    fn new(provider: TracerProvider) -> Self {
        Self {
            provider: Some(Arc::new(provider)),
            active: true,
        }
    }

    /// Guard for the disabled configuration; dropping it is a no-op
    fn inactive() -> Self {
        Self {
            provider: None,
            active: false,
        }
    }

    /// Check if tracing is active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The provider owned by this guard, when tracing is active
    pub fn provider(&self) -> Option<&TracerProvider> {
        self.provider.as_deref()
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if self.active {
            if let Some(provider) = &self.provider {
                let _ = provider.force_flush();
            }
            global::shutdown_tracer_provider();
        }
    }
}

/// Map the configured sampling strategy onto an SDK sampler.
///
/// The strategy set is validated by `TracingConfig::validate`; anything
/// else is reported as an invalid configuration.
fn sampler_for(config: &TracingConfig) -> Result<Sampler, TracingError> {
    match config.sampling.strategy.as_str() {
        "always" => Ok(Sampler::AlwaysOn),
        "never" => Ok(Sampler::AlwaysOff),
        "ratio" => Ok(Sampler::TraceIdRatioBased(config.sampling.ratio)),
        "parent_based" => Ok(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            config.sampling.ratio,
        )))),
        other => Err(TracingError::InvalidConfig(format!(
            "unknown sampling strategy '{other}'"
        ))),
    }
}

/// Initialize OpenTelemetry tracing with the given configuration.
///
/// Sets the global tracer provider and the W3C trace-context propagator.
/// With the `otlp` feature enabled and a non-empty endpoint, spans are
/// exported over OTLP through a batch processor; otherwise the provider
/// runs without an exporter.
///
/// Returns a `TracingGuard` that flushes and shuts tracing down on drop.
pub fn init_tracing(config: &TracingConfig) -> Result<TracingGuard, TracingError> {
    if !config.enabled {
        return Ok(TracingGuard::inactive());
    }

    config
        .validate()
        .map_err(|e| TracingError::InvalidConfig(e.to_string()))?;

    let trace_config = trace::config()
        .with_sampler(sampler_for(config)?)
        .with_resource(Resource::new([KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]));

    #[allow(unused_mut)]
    let mut builder = TracerProvider::builder().with_config(trace_config);

    #[cfg(feature = "otlp")]
    if !config.otlp.endpoint.is_empty() {
        builder = builder.with_span_processor(otlp_batch_processor(config)?);
    }

    let provider = builder.build();

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());

    Ok(TracingGuard::new(provider))
}

#[cfg(feature = "otlp")]
fn otlp_batch_processor(
    config: &TracingConfig,
) -> Result<trace::BatchSpanProcessor<opentelemetry_sdk::runtime::Tokio>, TracingError> {
    use opentelemetry_otlp::WithExportConfig;
    use std::time::Duration;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(config.otlp.endpoint.clone())
        .with_timeout(Duration::from_secs(config.otlp.timeout_seconds))
        .build_span_exporter()
        .map_err(|e| TracingError::ExporterError(e.to_string()))?;

    let batch_config = trace::BatchConfig::default()
        .with_max_queue_size(config.batch.max_queue_size)
        .with_scheduled_delay(Duration::from_millis(config.batch.scheduled_delay_millis))
        .with_max_export_batch_size(config.batch.max_export_batch_size);

    Ok(
        trace::BatchSpanProcessor::builder(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_batch_config(batch_config)
            .build(),
    )
}

/// Explicitly shutdown tracing and flush all pending spans.
///
/// Called automatically when `TracingGuard` drops; use this form when the
/// flush result matters.
pub fn shutdown_tracing(mut guard: TracingGuard) -> Result<(), TracingError> {
    if guard.active {
        if let Some(provider) = &guard.provider {
            for result in provider.force_flush() {
                result.map_err(|e| TracingError::ProviderError(e.to_string()))?;
            }
        }
        // Mark as inactive to prevent double shutdown in Drop
        guard.active = false;
        global::shutdown_tracer_provider();
    }
    Ok(())
}
