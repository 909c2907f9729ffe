//! Host extension contract
//!
//! Hookspan does not implement an HTTP server. It registers callbacks into a
//! hook-based host runtime, and this module mirrors the extension surface
//! such a host exposes: per-request views, lifecycle hook points, route
//! metadata, and the registration trait the plugin installs itself through.
//!
//! Host obligations assumed by the plugin (and by every `HostInstance`
//! implementation):
//!
//! - `OnRequest` hooks run before any other hook for the request.
//! - `OnResponse` hooks run exactly once per request, on success and on
//!   failure alike.
//! - Error hooks run after a handler or hook fails, before `OnResponse`.
//! - Hooks for a single request run sequentially; concurrent requests are
//!   interleaved by the host's executor.
//! - App-level hooks added after route registration are merged into each
//!   route's hook lists before the route callbacks fire.

use http::{Extensions, HeaderMap, Method, StatusCode, Uri};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Boxed error type used across handler and hook results
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by hooks and handlers
pub type HookFuture<'a> = futures::future::BoxFuture<'a, Result<(), BoxError>>;

/// A lifecycle hook: async callback over the request/reply pair.
///
/// Shared via `Arc` so the same callback can be installed on several routes.
pub type Hook = Arc<dyn for<'a> Fn(&'a mut Request, &'a mut Reply) -> HookFuture<'a> + Send + Sync>;

/// A route handler. Same shape as a hook; the host invokes it between
/// `PreHandler` and `PreSerialization`.
pub type Handler = Hook;

/// An error-channel hook, additionally receiving the failure value
pub type ErrorHook = Arc<
    dyn for<'a> Fn(&'a mut Request, &'a mut Reply, &'a BoxError) -> HookFuture<'a> + Send + Sync,
>;

/// Callback invoked by the host for every registered route
pub type RouteCallback = Box<dyn FnMut(&mut Route) + Send>;

/// Named extension points in the host's request pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    OnRequest,
    PreParsing,
    PreValidation,
    PreHandler,
    PreSerialization,
    OnSend,
    OnResponse,
}

impl HookPoint {
    /// All hook points in pipeline order
    pub const ALL: [HookPoint; 7] = [
        HookPoint::OnRequest,
        HookPoint::PreParsing,
        HookPoint::PreValidation,
        HookPoint::PreHandler,
        HookPoint::PreSerialization,
        HookPoint::OnSend,
        HookPoint::OnResponse,
    ];
}

/// Read/write view of an inbound request, as handed to hooks by the host
#[derive(Debug, Default)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Route template matched by the host's router, when any
    pub route: Option<String>,
    extensions: Extensions,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            route: None,
            extensions: Extensions::new(),
        }
    }

    /// The request target as sent by the client (path and query)
    pub fn url(&self) -> String {
        self.uri.to_string()
    }

    /// Per-request decoration storage
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// Mutable view of the outbound reply
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl Default for Reply {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Route metadata and callables, as exposed to route callbacks.
///
/// Route callbacks may replace the handler and hook entries; the host runs
/// whatever is stored here once registration completes.
pub struct Route {
    pub method: Method,
    pub path: String,
    pub handler: Handler,
    pub hooks: HashMap<HookPoint, Vec<Hook>>,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: Handler) -> Self {
        Self {
            method,
            path: path.into(),
            handler,
            hooks: HashMap::new(),
        }
    }

    /// Attach a hook at the given lifecycle point
    pub fn hook(mut self, point: HookPoint, hook: Hook) -> Self {
        self.hooks.entry(point).or_default().push(hook);
        self
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("hooks", &self.hooks.keys())
            .finish_non_exhaustive()
    }
}

/// Registration surface of the host application.
///
/// The plugin only ever talks to the host through this trait: it installs
/// app-level hooks, one error-channel hook, and (when route wrapping is
/// enabled) a route callback the host invokes per registered route.
pub trait HostInstance {
    /// Install an app-level hook at the given lifecycle point
    fn add_hook(&mut self, point: HookPoint, hook: Hook);

    /// Install a hook on the error channel
    fn add_error_hook(&mut self, hook: ErrorHook);

    /// Register a callback invoked for every route the host knows about
    fn on_route(&mut self, callback: RouteCallback);
}
