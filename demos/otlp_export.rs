//! OTLP Export Demo
//!
//! Exports spans to an OTLP collector such as Jaeger.
//!
//! # Prerequisites
//!
//! 1. Start Jaeger:
//!    ```bash
//!    docker run -d --name jaeger \
//!      -p 4317:4317 \
//!      -p 16686:16686 \
//!      jaegertracing/all-in-one:latest
//!    ```
//!
//! 2. Run this demo:
//!    ```bash
//!    cargo run --example otlp_export --features otlp
//!    ```
//!
//! 3. View traces at http://localhost:16686 (service `hookspan-otlp-demo`).

use hookspan::config::{OtlpConfig, SamplingConfig};
use hookspan::telemetry::init_tracing;
use hookspan::TracingConfig;
use opentelemetry::global;
use opentelemetry::trace::{Span, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = TracingConfig {
        enabled: true,
        service_name: "hookspan-otlp-demo".to_string(),
        otlp: OtlpConfig {
            endpoint: "http://localhost:4317".to_string(),
            ..OtlpConfig::default()
        },
        sampling: SamplingConfig {
            strategy: "always".to_string(),
            ratio: 1.0,
        },
        ..TracingConfig::default()
    };

    println!("Initializing tracing");
    println!("  endpoint: {}", config.otlp.endpoint);
    println!("  service:  {}", config.service_name);

    let guard = init_tracing(&config)?;

    let tracer = global::tracer("otlp-demo");

    // A request-shaped trace: one parent, two nested operations.
    let mut request_span = tracer.start("GET /items");
    request_span.set_attribute(KeyValue::new("req.method", "GET"));
    request_span.set_attribute(KeyValue::new("req.url", "/items"));

    let cx = Context::current().with_span(request_span);
    {
        let mut lookup = tracer.start_with_context("load items", &cx);
        tokio::time::sleep(tokio::time::Duration::from_millis(40)).await;
        lookup.end();

        let mut render = tracer.start_with_context("render payload", &cx);
        tokio::time::sleep(tokio::time::Duration::from_millis(15)).await;
        render.end();
    }
    cx.span().set_attribute(KeyValue::new("reply.statusCode", 200_i64));
    cx.span().end();

    println!("Spans recorded; flushing to the collector");
    drop(guard);

    println!("Done. Check the Jaeger UI for the trace.");
    Ok(())
}
