//! Tracing subscriber setup with layered architecture
//!
//! Combines the OpenTelemetry export layer with console logging:
//!
//! ```text
//! Registry
//!   ├── OpenTelemetry layer (spans -> provider, when enabled)
//!   ├── EnvFilter (RUST_LOG)
//!   └── Fmt layer (console output)
//! ```
//!
//! The OpenTelemetry layer is only installed when the configuration enables
//! tracing; the console layers are always present.

use crate::config::TracingConfig;
use crate::telemetry::init::{init_tracing, TracingError, TracingGuard};
use opentelemetry::trace::TracerProvider as _;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber on top of the tracer provider.
///
/// Calls `init_tracing` first, then installs the global subscriber. Log
/// levels come from `RUST_LOG`, defaulting to `info`. Fails if a global
/// subscriber is already set.
pub fn init_subscriber(config: &TracingConfig) -> Result<TracingGuard, TracingError> {
    let guard = init_tracing(config)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let set_result = match guard.provider() {
        Some(provider) => {
            let tracer = provider.versioned_tracer(
                crate::SCOPE_NAME,
                Some(env!("CARGO_PKG_VERSION")),
                None::<&'static str>,
                None,
            );
            let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            let subscriber = tracing_subscriber::registry()
                .with(telemetry_layer)
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_target(true));
            tracing::subscriber::set_global_default(subscriber)
        }
        None => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_target(true));
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    set_result.map_err(|e| {
        TracingError::ProviderError(format!(
            "Failed to set global subscriber (may already be initialized): {e}"
        ))
    })?;

    Ok(guard)
}
