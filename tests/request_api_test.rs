//! Per-request accessor tests
//!
//! The request handle exposes the tracer, the ambient context, the active
//! span, and propagation helpers; `expose_api: false` removes it entirely.

mod support;

use hookspan::{register, PluginConfig, RequestTelemetryExt};
use opentelemetry::trace::{FutureExt, Span, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, Value};
use std::sync::Arc;
use support::{ok_handler, span_attr, InjectRequest, OtelHarness, TestApp};

const TRACEPARENT: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

#[tokio::test]
async fn test_accessor_exposes_tracer_context_and_propagation() {
    let harness = OtelHarness::new();
    let mut app = TestApp::new();
    register(&mut app, harness.plugin_config()).unwrap();

    let handler: hookspan::host::Handler = Arc::new(|request, reply| {
        Box::pin(async move {
            let telemetry = request.telemetry().expect("accessor should be attached");

            telemetry
                .active_span()
                .set_attribute(opentelemetry::KeyValue::new("foo", "bar"));

            // A span parented on the context extracted from the request's
            // own headers nests under the request span.
            let parent = telemetry.extract(&request.headers);
            let mut child = telemetry.tracer().start_with_context("newSpan", &parent);
            child.end();

            telemetry.inject(&mut reply.headers);
            Ok(())
        })
    });
    app.get("/test", handler);

    let reply = app.inject(InjectRequest::get("/test")).await;
    assert_eq!(reply.status.as_u16(), 200);

    let spans = harness.finished_spans();
    assert_eq!(spans.len(), 2);

    let child = spans.iter().find(|s| s.name == "newSpan").unwrap();
    let request_span = spans.iter().find(|s| s.name == "GET /test").unwrap();

    assert_eq!(
        child.parent_span_id,
        request_span.span_context.span_id(),
        "span started from the accessor nests under the request span"
    );
    assert_eq!(span_attr(request_span, "foo"), Some(Value::from("bar")));

    // Extraction ran for the request itself and once from the handler;
    // injection wrote the request context into the reply headers.
    assert_eq!(harness.propagator.extract_count(), 2);
    assert_eq!(harness.propagator.inject_count(), 1);

    let traceparent = reply
        .headers
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .expect("traceparent header injected");
    assert!(traceparent.contains(&request_span.span_context.trace_id().to_string()));
}

#[tokio::test]
async fn test_accessor_absent_when_expose_api_is_off() {
    let harness = OtelHarness::new();
    let config = PluginConfig {
        expose_api: false,
        ..harness.plugin_config()
    };
    let mut app = TestApp::new();
    register(&mut app, config).unwrap();

    let handler: hookspan::host::Handler = Arc::new(|request, _reply| {
        Box::pin(async move {
            assert!(request.telemetry().is_none());
            Ok(())
        })
    });
    app.get("/test", handler);

    let reply = app.inject(InjectRequest::get("/test")).await;
    assert_eq!(reply.status.as_u16(), 200);

    // Tracing itself is unaffected; only the accessor is gone.
    let spans = harness.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, Status::Ok);
}

#[tokio::test]
async fn test_inbound_traceparent_becomes_the_span_parent() {
    let harness = OtelHarness::new();
    let mut app = TestApp::new();
    register(&mut app, harness.plugin_config()).unwrap();
    app.get("/test", ok_handler());

    app.inject(InjectRequest::get("/test").header("traceparent", TRACEPARENT))
        .await;

    let spans = harness.finished_spans();
    let span = &spans[0];

    assert_eq!(
        span.span_context.trace_id().to_string(),
        "0af7651916cd43dd8448eb211c80319c"
    );
    assert_eq!(span.parent_span_id.to_string(), "b7ad6b7169203331");
}

#[tokio::test]
async fn test_local_active_context_skips_header_extraction() {
    let harness = OtelHarness::new();
    let mut app = TestApp::new();
    register(&mut app, harness.plugin_config()).unwrap();
    app.get("/test", ok_handler());

    // Outer instrumentation has already established a span; the request
    // span must parent on it instead of the extracted headers.
    let tracer = harness.tracer();
    let outer = tracer.start("outer");
    let outer_id = outer.span_context().span_id();
    let outer_trace = outer.span_context().trace_id();
    let outer_cx = Context::new().with_span(outer);

    let reply = app
        .inject(InjectRequest::get("/test").header("traceparent", TRACEPARENT))
        .with_context(outer_cx)
        .await;
    assert_eq!(reply.status.as_u16(), 200);

    assert_eq!(harness.propagator.extract_count(), 0, "extraction skipped");

    let spans = harness.finished_spans();
    let span = spans.iter().find(|s| s.name == "GET /test").unwrap();
    assert_eq!(span.parent_span_id, outer_id);
    assert_eq!(span.span_context.trace_id(), outer_trace);
    assert_eq!(span_attr(span, "req.method"), Some(Value::from("GET")));
    assert_eq!(
        span_attr(span, "reply.statusCode"),
        Some(Value::from(200_i64))
    );
    assert_eq!(span.status, Status::Ok);
}
