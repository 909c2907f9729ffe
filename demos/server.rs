//! End-to-end demo
//!
//! Drives the plugin through a miniature hook-based host: two routes, one
//! using the per-request accessor to create a child span, one with a
//! pre-validation hook recording a span event, plus a request arriving with
//! an upstream `traceparent` header.
//!
//! Run with:
//!
//! ```bash
//! RUST_LOG=debug cargo run --example server
//! ```

use hookspan::host::{BoxError, ErrorHook, Handler, Hook, RouteCallback};
use hookspan::telemetry::init_subscriber;
use hookspan::{
    register, HookPoint, HostInstance, PluginConfig, Reply, Request, RequestTelemetryExt, Route,
    RouteSelector, TracingConfig,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use opentelemetry::trace::{Span, Tracer};
use std::collections::HashMap;
use std::sync::Arc;

/// Minimal hook-based host: just enough pipeline to run the plugin
#[derive(Default)]
struct DemoApp {
    hooks: HashMap<HookPoint, Vec<Hook>>,
    error_hooks: Vec<ErrorHook>,
    route_callbacks: Vec<RouteCallback>,
    routes: Vec<Route>,
}

impl HostInstance for DemoApp {
    fn add_hook(&mut self, point: HookPoint, hook: Hook) {
        self.hooks.entry(point).or_default().push(hook);
    }

    fn add_error_hook(&mut self, hook: ErrorHook) {
        self.error_hooks.push(hook);
    }

    fn on_route(&mut self, callback: RouteCallback) {
        self.route_callbacks.push(callback);
    }
}

impl DemoApp {
    fn get(&mut self, path: &str, handler: Handler) {
        self.routes.push(Route::new(Method::GET, path, handler));
    }

    fn route(&mut self, route: Route) {
        self.routes.push(route);
    }

    fn ready(&mut self) {
        for route in &mut self.routes {
            for callback in self.route_callbacks.iter_mut() {
                callback(route);
            }
        }
    }

    async fn dispatch(&mut self, method: Method, url: &str, headers: HeaderMap) -> Reply {
        let uri: Uri = url.parse().expect("demo url");
        let mut request = Request::new(method.clone(), uri);
        request.headers = headers;

        let route_index = self
            .routes
            .iter()
            .position(|route| route.method == method && route.path == request.uri.path());
        request.route = route_index.map(|index| self.routes[index].path.clone());

        let mut reply = Reply::default();

        let outcome = self.run(route_index, &mut request, &mut reply).await;
        if let Err(error) = outcome {
            reply.status = StatusCode::INTERNAL_SERVER_ERROR;
            for hook in self.error_hooks.clone() {
                let _ = hook(&mut request, &mut reply, &error).await;
            }
        }

        for hook in self.collect(HookPoint::OnSend, route_index) {
            let _ = hook(&mut request, &mut reply).await;
        }
        for hook in self.collect(HookPoint::OnResponse, route_index) {
            let _ = hook(&mut request, &mut reply).await;
        }

        reply
    }

    fn collect(&self, point: HookPoint, route_index: Option<usize>) -> Vec<Hook> {
        let mut hooks = self.hooks.get(&point).cloned().unwrap_or_default();
        if let Some(index) = route_index {
            if let Some(route_hooks) = self.routes[index].hooks.get(&point) {
                hooks.extend(route_hooks.iter().cloned());
            }
        }
        hooks
    }

    async fn run(
        &self,
        route_index: Option<usize>,
        request: &mut Request,
        reply: &mut Reply,
    ) -> Result<(), BoxError> {
        for hook in self.collect(HookPoint::OnRequest, route_index) {
            hook(request, reply).await?;
        }
        let Some(index) = route_index else {
            reply.status = StatusCode::NOT_FOUND;
            return Ok(());
        };
        for point in [
            HookPoint::PreParsing,
            HookPoint::PreValidation,
            HookPoint::PreHandler,
        ] {
            for hook in self.collect(point, route_index) {
                hook(request, reply).await?;
            }
        }
        let handler = self.routes[index].handler.clone();
        handler(request, reply).await?;
        for hook in self.collect(HookPoint::PreSerialization, route_index) {
            hook(request, reply).await?;
        }
        Ok(())
    }
}

fn root_handler() -> Handler {
    Arc::new(|request, reply| {
        Box::pin(async move {
            let telemetry = request.telemetry().expect("accessor attached");

            // Spans started in a wrapped route nest under the request span.
            let mut child = telemetry.tracer().start("preparing content");
            child.end();

            println!(
                "  handled / in trace {}",
                telemetry.active_span().span_context().trace_id()
            );
            reply
                .headers
                .insert("content-type", HeaderValue::from_static("text/html"));
            Ok(())
        })
    })
}

fn hooked_route() -> Route {
    let pre_validation: Hook = Arc::new(|request, _reply| {
        Box::pin(async move {
            if let Some(telemetry) = request.telemetry() {
                telemetry.active_span().add_event("preValidation", vec![]);
            }
            Ok(())
        })
    });

    let handler: Handler = Arc::new(|_request, _reply| {
        Box::pin(async move {
            println!("  handled /with-hooks");
            Ok(())
        })
    });

    Route::new(Method::GET, "/with-hooks", handler).hook(HookPoint::PreValidation, pre_validation)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let tracing_config = TracingConfig {
        enabled: true,
        service_name: "hookspan-demo".to_string(),
        ..TracingConfig::default()
    };
    let _guard = init_subscriber(&tracing_config)?;

    let mut app = DemoApp::default();
    register(
        &mut app,
        PluginConfig {
            wrap_routes: RouteSelector::All,
            ignore_routes: RouteSelector::Paths(vec!["/health".into()]),
            ..PluginConfig::default()
        },
    )?;

    app.get("/", root_handler());
    app.route(hooked_route());
    app.get("/health", Arc::new(|_request, _reply| Box::pin(async { Ok(()) })));
    app.ready();

    println!("GET /");
    let reply = app.dispatch(Method::GET, "/", HeaderMap::new()).await;
    println!("  -> {}", reply.status);

    println!("GET /with-hooks (with upstream traceparent)");
    let mut headers = HeaderMap::new();
    headers.insert(
        "traceparent",
        HeaderValue::from_static("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"),
    );
    let reply = app.dispatch(Method::GET, "/with-hooks", headers).await;
    println!("  -> {}", reply.status);

    println!("GET /health (ignored, never traced)");
    let reply = app.dispatch(Method::GET, "/health", HeaderMap::new()).await;
    println!("  -> {}", reply.status);

    Ok(())
}
