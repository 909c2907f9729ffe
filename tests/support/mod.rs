//! Shared integration-test harness
//!
//! A miniature hook-based host (`TestApp`) with an `inject` driver that runs
//! the full request pipeline, plus recording OpenTelemetry fixtures: an
//! in-memory span exporter, a call-counting propagator, and a tracer source
//! backed by a private SDK provider.
#![allow(dead_code)]

use futures::future;
use hookspan::{
    HookPoint, HostInstance, PluginConfig, Reply, Request, Route, TracerSource,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use hookspan::host::{BoxError, ErrorHook, Handler, Hook, RouteCallback};
use opentelemetry::global::BoxedTracer;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{Context, Value};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry::propagation::text_map_propagator::FieldIter;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Error type thrown by failing test handlers
#[derive(Error, Debug)]
#[error("{0}")]
pub struct HandlerFailure(pub String);

/// Handler that completes successfully without touching the reply
pub fn ok_handler() -> Handler {
    Arc::new(|_request, _reply| Box::pin(future::ready(Ok(()))))
}

/// Handler that fails with `HandlerFailure`
pub fn failing_handler(message: &str) -> Handler {
    let message = message.to_string();
    Arc::new(move |_request, _reply| {
        let error: BoxError = Box::new(HandlerFailure(message.clone()));
        Box::pin(future::ready(Err(error)))
    })
}

/// Inbound request description for `TestApp::inject`
pub struct InjectRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

impl InjectRequest {
    pub fn get(url: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("inject-harness"));
        headers.insert("host", HeaderValue::from_static("localhost:80"));
        Self {
            method: Method::GET,
            url: url.to_string(),
            headers,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        self
    }
}

/// Miniature hook-based host.
///
/// Honors the contract `HostInstance` documents: app-level hooks added
/// after route registration are merged into each route's hook lists (ahead
/// of route-level hooks) before route callbacks fire, `OnResponse` runs on
/// both success and failure paths, and error hooks run in between.
#[derive(Default)]
pub struct TestApp {
    instance_hooks: HashMap<HookPoint, Vec<Hook>>,
    late_hooks: Vec<(HookPoint, Hook)>,
    error_hooks: Vec<ErrorHook>,
    route_callbacks: Vec<RouteCallback>,
    routes: Vec<Route>,
    ready: bool,
}

impl HostInstance for TestApp {
    fn add_hook(&mut self, point: HookPoint, hook: Hook) {
        if self.routes.is_empty() {
            self.instance_hooks.entry(point).or_default().push(hook);
        } else {
            self.late_hooks.push((point, hook));
        }
    }

    fn add_error_hook(&mut self, hook: ErrorHook) {
        self.error_hooks.push(hook);
    }

    fn on_route(&mut self, callback: RouteCallback) {
        self.route_callbacks.push(callback);
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, route: Route) {
        assert!(!self.ready, "routes must be registered before ready()");
        self.routes.push(route);
    }

    pub fn get(&mut self, path: &str, handler: Handler) {
        self.route(Route::new(Method::GET, path, handler));
    }

    /// Finish registration: merge late app-level hooks into every route,
    /// then run the route callbacks.
    pub fn ready(&mut self) {
        if self.ready {
            return;
        }
        for route in &mut self.routes {
            for (point, hook) in self.late_hooks.iter().rev() {
                route.hooks.entry(*point).or_default().insert(0, hook.clone());
            }
        }
        for route in &mut self.routes {
            for callback in self.route_callbacks.iter_mut() {
                callback(route);
            }
        }
        self.ready = true;
    }

    /// Drive one request through the pipeline and return the reply
    pub async fn inject(&mut self, inject: InjectRequest) -> Reply {
        self.ready();

        let uri: Uri = inject.url.parse().expect("inject url");
        let mut request = Request::new(inject.method.clone(), uri);
        request.headers = inject.headers;

        let route_index = self
            .routes
            .iter()
            .position(|route| route.method == inject.method && route.path == request.uri.path());
        request.route = route_index.map(|index| self.routes[index].path.clone());

        let collect = |point: HookPoint| -> Vec<Hook> {
            let mut hooks = self
                .instance_hooks
                .get(&point)
                .cloned()
                .unwrap_or_default();
            if let Some(index) = route_index {
                if let Some(route_hooks) = self.routes[index].hooks.get(&point) {
                    hooks.extend(route_hooks.iter().cloned());
                }
            }
            hooks
        };

        let on_request = collect(HookPoint::OnRequest);
        let pre_phases = [
            collect(HookPoint::PreParsing),
            collect(HookPoint::PreValidation),
            collect(HookPoint::PreHandler),
        ];
        let pre_serialization = collect(HookPoint::PreSerialization);
        let on_send = collect(HookPoint::OnSend);
        let on_response = collect(HookPoint::OnResponse);
        let handler = route_index.map(|index| self.routes[index].handler.clone());
        let error_hooks = self.error_hooks.clone();

        let mut reply = Reply::default();

        let outcome: Result<(), BoxError> = async {
            for hook in &on_request {
                hook(&mut request, &mut reply).await?;
            }
            let Some(handler) = handler else {
                reply.status = StatusCode::NOT_FOUND;
                return Ok(());
            };
            for phase in &pre_phases {
                for hook in phase {
                    hook(&mut request, &mut reply).await?;
                }
            }
            handler(&mut request, &mut reply).await?;
            for hook in &pre_serialization {
                hook(&mut request, &mut reply).await?;
            }
            Ok(())
        }
        .await;

        if let Err(error) = outcome {
            reply.status = StatusCode::INTERNAL_SERVER_ERROR;
            for hook in &error_hooks {
                let _ = hook(&mut request, &mut reply, &error).await;
            }
        }

        for hook in &on_send {
            let _ = hook(&mut request, &mut reply).await;
        }
        for hook in &on_response {
            let _ = hook(&mut request, &mut reply).await;
        }

        reply
    }
}

/// Span exporter capturing finished spans in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl RecordingExporter {
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }
}

impl SpanExporter for RecordingExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> futures::future::BoxFuture<'static, ExportResult> {
        self.spans.lock().unwrap().extend(batch);
        Box::pin(future::ready(Ok(())))
    }
}

/// W3C propagator counting extract/inject calls
#[derive(Debug, Default)]
pub struct CountingPropagator {
    inner: TraceContextPropagator,
    extracts: AtomicUsize,
    injects: AtomicUsize,
}

impl CountingPropagator {
    pub fn extract_count(&self) -> usize {
        self.extracts.load(Ordering::SeqCst)
    }

    pub fn inject_count(&self) -> usize {
        self.injects.load(Ordering::SeqCst)
    }
}

impl TextMapPropagator for CountingPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        self.injects.fetch_add(1, Ordering::SeqCst);
        self.inner.inject_context(cx, injector);
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        self.inner.extract_with_context(cx, extractor)
    }

    fn fields(&self) -> FieldIter<'_> {
        self.inner.fields()
    }
}

/// `TracerSource` backed by a private SDK provider
#[derive(Debug, Clone)]
pub struct ProviderTracerSource(pub TracerProvider);

impl TracerSource for ProviderTracerSource {
    fn tracer(&self) -> BoxedTracer {
        BoxedTracer::new(Box::new(self.0.versioned_tracer(
            "hookspan-tests",
            None::<&'static str>,
            None::<&'static str>,
            None,
        )))
    }
}

/// Recording OpenTelemetry fixture: provider, exporter, counting propagator
pub struct OtelHarness {
    pub provider: TracerProvider,
    exporter: RecordingExporter,
    pub propagator: Arc<CountingPropagator>,
}

impl OtelHarness {
    pub fn new() -> Self {
        let exporter = RecordingExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        Self {
            provider,
            exporter,
            propagator: Arc::new(CountingPropagator::default()),
        }
    }

    /// Plugin configuration wired to this fixture's tracer and propagator
    pub fn plugin_config(&self) -> PluginConfig {
        PluginConfig {
            tracer: Some(Arc::new(ProviderTracerSource(self.provider.clone()))),
            propagator: Some(self.propagator.clone()),
            ..PluginConfig::default()
        }
    }

    /// Finished spans, flushed out of the provider first
    pub fn finished_spans(&self) -> Vec<SpanData> {
        for result in self.provider.force_flush() {
            result.expect("span flush failed");
        }
        self.exporter.finished_spans()
    }

    /// A tracer handle for starting spans directly in tests
    pub fn tracer(&self) -> BoxedTracer {
        ProviderTracerSource(self.provider.clone()).tracer()
    }
}

/// Look up a span attribute value by key
pub fn span_attr(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

/// Position of an attribute in recording order
pub fn attr_position(span: &SpanData, key: &str) -> Option<usize> {
    span.attributes.iter().position(|kv| kv.key.as_str() == key)
}
