//! Context propagation carriers
//!
//! Adapters between `http::HeaderMap` and the OpenTelemetry text-map
//! propagation API. Extraction and injection are fully delegated to the
//! configured `TextMapPropagator`; this module only supplies the carriers
//! and the routing between the global propagator and an injected one.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::{global, Context};
use std::sync::Arc;

/// Read-only header carrier for context extraction
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Mutable header carrier for context injection.
///
/// Values that do not form a valid header name or value are dropped rather
/// than corrupting the reply.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(value) = HeaderValue::from_str(&value) {
                self.0.insert(name, value);
            }
        }
    }
}

/// Propagator routing: the process-global propagator by default, or one
/// injected through `PluginConfig::propagator`.
#[derive(Clone, Default)]
pub(crate) enum Propagation {
    #[default]
    Global,
    Custom(Arc<dyn TextMapPropagator + Send + Sync>),
}

impl Propagation {
    pub(crate) fn extract_with_context(&self, cx: &Context, headers: &HeaderMap) -> Context {
        let extractor = HeaderExtractor(headers);
        match self {
            Propagation::Global => {
                global::get_text_map_propagator(|propagator| {
                    propagator.extract_with_context(cx, &extractor)
                })
            }
            Propagation::Custom(propagator) => propagator.extract_with_context(cx, &extractor),
        }
    }

    pub(crate) fn inject_context(&self, cx: &Context, headers: &mut HeaderMap) {
        let mut injector = HeaderInjector(headers);
        match self {
            Propagation::Global => {
                global::get_text_map_propagator(|propagator| {
                    propagator.inject_context(cx, &mut injector)
                });
            }
            Propagation::Custom(propagator) => propagator.inject_context(cx, &mut injector),
        }
    }
}

impl std::fmt::Debug for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Propagation::Global => f.write_str("Propagation::Global"),
            Propagation::Custom(_) => f.write_str("Propagation::Custom"),
        }
    }
}
