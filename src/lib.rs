//! Hookspan Library
//!
//! OpenTelemetry request-lifecycle plugin for hook-based HTTP hosts.
//!
//! Hookspan registers callbacks into a host framework's request lifecycle
//! and attaches distributed-tracing context to every in-scope request: one
//! span per request, W3C context extracted from inbound headers, outcome
//! attributes and status on completion, and a per-request accessor exposing
//! the tracer and ambient context to handlers and hooks.
//!
//! # Features
//!
//! - **Per-request spans**: started on the earliest hook, ended exactly once
//! - **W3C propagation**: extract/inject delegated to the OpenTelemetry API
//! - **Route wrapping**: handlers and hooks run inside the request context
//! - **Ignore lists**: suppress tracing entirely for matching routes
//! - **Custom attributes**: per-phase span attribute formatters
//!
//! # Example
//!
//! ```no_run
//! use hookspan::{register, HostInstance, PluginConfig, RouteSelector};
//!
//! fn install<H: HostInstance>(app: &mut H) -> Result<(), hookspan::RegisterError> {
//!     let config = PluginConfig {
//!         wrap_routes: RouteSelector::All,
//!         ..PluginConfig::default()
//!     };
//!     register(app, config)
//! }
//! ```

pub mod attributes;
pub mod config;
pub mod host;
pub mod plugin;
pub mod propagation;
pub mod telemetry;
pub mod wrap;

// Re-export commonly used types
pub use config::{PluginConfig, RouteSelector, SpanAttributeFormat, TracingConfig};
pub use host::{HookPoint, HostInstance, Reply, Request, Route};
pub use plugin::{register, RegisterError};
pub use telemetry::{RequestTelemetry, RequestTelemetryExt, TracerSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Instrumentation scope name reported to the tracer provider
pub const SCOPE_NAME: &str = env!("CARGO_PKG_NAME");
