//! Route wrapping
//!
//! Rebinds a route's handler and hooks so they execute inside the request's
//! ambient tracing context. Spans started inside a wrapped callable pick up
//! the request span as parent without the callable having to thread the
//! context through by hand.

use crate::host::{Hook, Route, RouteCallback};
use crate::plugin::PluginState;
use crate::telemetry::TelemetrySlot;
use opentelemetry::trace::FutureExt;
use std::sync::Arc;
use tracing::debug;

/// Route callback wrapping every in-scope route.
///
/// Scope is decided once, at registration time: the route must be selected
/// by `wrap_routes` and not matched by `ignore_routes`.
pub(crate) fn route_callback(state: Arc<PluginState>) -> RouteCallback {
    Box::new(move |route: &mut Route| {
        if !state.wrap_routes.matches(&route.path, &route.method) {
            return;
        }
        if state.ignore_routes.matches(&route.path, &route.method) {
            return;
        }

        debug!(method = %route.method, path = %route.path, "wrapping route in request context");

        route.handler = bind_to_request_context(route.handler.clone());
        for hooks in route.hooks.values_mut() {
            for hook in hooks.iter_mut() {
                *hook = bind_to_request_context(hook.clone());
            }
        }
    })
}

/// Wrap a callable so its future runs inside the request context.
///
/// The binding is resolved at call time from the request's telemetry slot;
/// requests without one (ignored routes) run the inner callable unchanged.
/// The callable keeps whatever state it captured -- only the returned
/// future is layered.
pub fn bind_to_request_context(inner: Hook) -> Hook {
    Arc::new(move |request, reply| {
        let context = request
            .extensions()
            .get::<TelemetrySlot>()
            .map(|slot| slot.handle.context().clone());
        let future = inner(request, reply);
        match context {
            Some(context) => Box::pin(future.with_context(context)),
            None => future,
        }
    })
}
