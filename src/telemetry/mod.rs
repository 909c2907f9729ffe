//! Per-request telemetry surface
//!
//! The request-scoped handle exposed to handlers and hooks, the accessor
//! that retrieves it, and the tracer acquisition seam. SDK lifecycle
//! management (provider init, subscriber layering) lives in the `init` and
//! `subscriber` submodules.

use crate::host::Request;
use crate::propagation::Propagation;
use http::HeaderMap;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{SpanRef, TraceContextExt, TracerProvider as _};
use opentelemetry::Context;
use std::fmt;
use std::sync::Arc;

pub mod init;
pub mod subscriber;

pub use init::{init_tracing, shutdown_tracing, TracingError, TracingGuard};
pub use subscriber::init_subscriber;

/// Tracer acquisition seam.
///
/// The plugin resolves its tracer exactly once, at registration, through
/// this trait. The default implementation reads the process-global
/// provider; tests and embedders can inject their own.
pub trait TracerSource: Send + Sync {
    fn tracer(&self) -> BoxedTracer;
}

/// `TracerSource` backed by the global tracer provider
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalTracerSource;

impl TracerSource for GlobalTracerSource {
    fn tracer(&self) -> BoxedTracer {
        global::tracer_provider().versioned_tracer(
            crate::SCOPE_NAME,
            Some(env!("CARGO_PKG_VERSION")),
            None::<&'static str>,
            None,
        )
    }
}

/// Request-scoped tracing handle.
///
/// Created once per request on the earliest lifecycle hook and read-only
/// afterwards. The span lives in the carried context; `active_span` is a
/// view into it, and `extract`/`inject` delegate to the propagator with the
/// request's own context as base.
#[derive(Clone)]
pub struct RequestTelemetry {
    tracer: Arc<BoxedTracer>,
    context: Context,
    propagation: Propagation,
}

impl RequestTelemetry {
    pub(crate) fn new(tracer: Arc<BoxedTracer>, context: Context, propagation: Propagation) -> Self {
        Self {
            tracer,
            context,
            propagation,
        }
    }

    /// Handle for requests that bypass tracing: root context, no span
    pub(crate) fn detached(tracer: Arc<BoxedTracer>, propagation: Propagation) -> Self {
        Self::new(tracer, Context::new(), propagation)
    }

    /// The tracer resolved at plugin registration
    pub fn tracer(&self) -> &BoxedTracer {
        &self.tracer
    }

    /// The ambient context carrying the request span
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The span recording this request. Invalid (non-recording) for
    /// requests that bypass tracing.
    pub fn active_span(&self) -> SpanRef<'_> {
        self.context.span()
    }

    /// Extract a context from the given headers, using the request context
    /// as base
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        self.propagation.extract_with_context(&self.context, headers)
    }

    /// Inject the request context into the given headers
    pub fn inject(&self, headers: &mut HeaderMap) {
        self.propagation.inject_context(&self.context, headers);
    }
}

impl fmt::Debug for RequestTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTelemetry")
            .field("span_context", &self.context.span().span_context())
            .field("propagation", &self.propagation)
            .finish_non_exhaustive()
    }
}

/// Extension slot stored on the request.
///
/// Always present for requests the plugin saw (when the API is exposed or a
/// span is active); `exposed` gates the public accessor so `expose_api:
/// false` keeps the handle internal.
#[derive(Clone)]
pub(crate) struct TelemetrySlot {
    pub(crate) handle: RequestTelemetry,
    pub(crate) exposed: bool,
}

/// Per-request accessor over the host's request decoration
pub trait RequestTelemetryExt {
    /// The request's tracing handle, when the plugin exposes it
    fn telemetry(&self) -> Option<&RequestTelemetry>;
}

impl RequestTelemetryExt for Request {
    fn telemetry(&self) -> Option<&RequestTelemetry> {
        self.extensions()
            .get::<TelemetrySlot>()
            .and_then(|slot| slot.exposed.then_some(&slot.handle))
    }
}
