//! Plugin registration and request-lifecycle hooks
//!
//! Wires the tracing lifecycle into the host: one hook establishing the
//! request context, one recording errors, and one finalizing the span.
//! Everything the hooks need is resolved once at registration and shared
//! read-only across requests.

use crate::config::{
    ConfigError, ErrorFormatter, PluginConfig, ReplyFormatter, RequestFormatter, RouteSelector,
};
use crate::host::{ErrorHook, Hook, HookFuture, HookPoint, HostInstance};
use crate::propagation::Propagation;
use crate::telemetry::{GlobalTracerSource, RequestTelemetry, TelemetrySlot, TracerSource};
use crate::{attributes, wrap};
use futures::future;
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{Span as _, Status, TraceContextExt, Tracer as _};
use opentelemetry::Context;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Registration errors
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Invalid plugin configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Shared, read-only plugin state resolved at registration
pub(crate) struct PluginState {
    pub(crate) tracer: Arc<BoxedTracer>,
    pub(crate) propagation: Propagation,
    pub(crate) expose_api: bool,
    pub(crate) wrap_routes: RouteSelector,
    pub(crate) ignore_routes: RouteSelector,
    pub(crate) request_format: RequestFormatter,
    pub(crate) error_format: ErrorFormatter,
    pub(crate) reply_format: ReplyFormatter,
}

/// Register the plugin on a host application.
///
/// Validates the configuration, resolves the tracer from the configured
/// source (the global provider by default), and installs the lifecycle
/// hooks. When `wrap_routes` selects anything, a route callback is also
/// registered so in-scope routes run inside the request context.
///
/// Fails before any hook is installed if the configuration is invalid.
pub fn register<H: HostInstance + ?Sized>(
    app: &mut H,
    config: PluginConfig,
) -> Result<(), RegisterError> {
    config.validate()?;

    let PluginConfig {
        expose_api,
        wrap_routes,
        ignore_routes,
        format_span_attributes,
        tracer,
        propagator,
    } = config;

    let tracer = Arc::new(match tracer {
        Some(source) => source.tracer(),
        None => GlobalTracerSource.tracer(),
    });
    let propagation = match propagator {
        Some(propagator) => Propagation::Custom(propagator),
        None => Propagation::Global,
    };

    let request_format: RequestFormatter = match format_span_attributes.request {
        Some(formatter) => formatter,
        None => Arc::new(attributes::default_request_attributes),
    };
    let error_format: ErrorFormatter = match format_span_attributes.error {
        Some(formatter) => formatter,
        None => Arc::new(attributes::default_error_attributes),
    };
    let reply_format: ReplyFormatter = match format_span_attributes.reply {
        Some(formatter) => formatter,
        None => Arc::new(attributes::default_reply_attributes),
    };

    let state = Arc::new(PluginState {
        tracer,
        propagation,
        expose_api,
        wrap_routes,
        ignore_routes,
        request_format,
        error_format,
        reply_format,
    });

    app.add_hook(HookPoint::OnRequest, on_request_hook(state.clone()));
    app.add_error_hook(on_error_hook(state.clone()));
    app.add_hook(HookPoint::OnResponse, on_response_hook(state.clone()));

    if !state.wrap_routes.is_none() {
        app.on_route(wrap::route_callback(state.clone()));
    }

    debug!(
        wrap = ?state.wrap_routes,
        ignore = ?state.ignore_routes,
        expose_api = state.expose_api,
        "request tracing registered"
    );

    Ok(())
}

fn done<'a>() -> HookFuture<'a> {
    Box::pin(future::ready(Ok(())))
}

/// Establish the request context: resolve the parent, start the span,
/// record request attributes, and store the accessor handle.
fn on_request_hook(state: Arc<PluginState>) -> Hook {
    Arc::new(move |request, _reply| {
        if state
            .ignore_routes
            .matches(request.uri.path(), &request.method)
        {
            // Ignored requests still get a usable accessor, but nothing
            // touches the tracing API for them.
            if state.expose_api {
                let handle =
                    RequestTelemetry::detached(state.tracer.clone(), state.propagation.clone());
                request.extensions_mut().insert(TelemetrySlot {
                    handle,
                    exposed: true,
                });
            }
            return done();
        }

        // A locally active span (outer instrumentation) wins over header
        // extraction; extracting here would clobber its context.
        let current = Context::current();
        let parent = if current.has_active_span() {
            current
        } else {
            state
                .propagation
                .extract_with_context(&Context::new(), &request.headers)
        };

        let span_name = match request.route.as_deref() {
            Some(route) => format!("{} {}", request.method, route),
            None => request.method.to_string(),
        };

        let mut span = state.tracer.start_with_context(span_name, &parent);
        for attribute in (state.request_format)(request) {
            span.set_attribute(attribute);
        }

        let context = parent.with_span(span);
        let handle =
            RequestTelemetry::new(state.tracer.clone(), context, state.propagation.clone());
        request.extensions_mut().insert(TelemetrySlot {
            handle,
            exposed: state.expose_api,
        });

        done()
    })
}

/// Record the failure onto the span. The error itself keeps flowing through
/// the host's error channel untouched.
fn on_error_hook(state: Arc<PluginState>) -> ErrorHook {
    Arc::new(move |request, _reply, error| {
        if let Some(slot) = request.extensions().get::<TelemetrySlot>() {
            let context = slot.handle.context();
            if context.has_active_span() {
                let span = context.span();
                for attribute in (state.error_format)(error) {
                    span.set_attribute(attribute);
                }
            }
        }
        done()
    })
}

/// Finalize the span: reply attributes, status, end. Runs on success and
/// failure paths alike; nothing else ends the request span.
fn on_response_hook(state: Arc<PluginState>) -> Hook {
    Arc::new(move |request, reply| {
        if let Some(slot) = request.extensions().get::<TelemetrySlot>() {
            let context = slot.handle.context();
            if context.has_active_span() {
                let span = context.span();
                for attribute in (state.reply_format)(reply) {
                    span.set_attribute(attribute);
                }
                if reply.status.is_client_error() || reply.status.is_server_error() {
                    span.set_status(Status::error(reply.status.to_string()));
                } else {
                    span.set_status(Status::Ok);
                }
                span.end();
            }
        }
        done()
    })
}
