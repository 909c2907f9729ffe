//! Span attribute formatting
//!
//! Produces the key/value attributes recorded on the request span in each
//! phase of the lifecycle. Defaults follow the shape of the request/reply
//! pair: method and URL on arrival, outcome data on completion. Consumers
//! can replace any phase through `SpanAttributeFormat`.

use crate::host::{BoxError, Reply, Request};
use opentelemetry::KeyValue;

/// Attribute key for the request method
pub const REQ_METHOD: &str = "req.method";
/// Attribute key for the request URL (path and query)
pub const REQ_URL: &str = "req.url";
/// Attribute key for the reply status code
pub const REPLY_STATUS_CODE: &str = "reply.statusCode";
/// Attribute key for the error name
pub const ERROR_NAME: &str = "error.name";
/// Attribute key for the error message
pub const ERROR_MESSAGE: &str = "error.message";
/// Attribute key for the error cause chain
pub const ERROR_STACK: &str = "error.stack";

/// Request-phase defaults: method and URL
pub fn default_request_attributes(request: &Request) -> Vec<KeyValue> {
    vec![
        KeyValue::new(REQ_METHOD, request.method.to_string()),
        KeyValue::new(REQ_URL, request.url()),
    ]
}

/// Reply-phase defaults: status code
pub fn default_reply_attributes(reply: &Reply) -> Vec<KeyValue> {
    vec![KeyValue::new(REPLY_STATUS_CODE, i64::from(reply.status.as_u16()))]
}

/// Error-phase defaults: name, message, and cause chain.
///
/// Recorded before the reply-phase attributes, so a failed request carries
/// the error data ahead of its status code.
pub fn default_error_attributes(error: &BoxError) -> Vec<KeyValue> {
    vec![
        KeyValue::new(ERROR_NAME, error_name(error.as_ref())),
        KeyValue::new(ERROR_MESSAGE, error.to_string()),
        KeyValue::new(ERROR_STACK, error_chain(error.as_ref())),
    ]
}

/// Best-effort error name.
///
/// Rust errors carry no class name at runtime; the leading token of the
/// Debug rendering is the variant or struct name for ordinary error types.
fn error_name(error: &(dyn std::error::Error + 'static)) -> String {
    let rendered = format!("{error:?}");
    rendered
        .split(|c: char| c == '(' || c == '{' || c.is_whitespace())
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("Error")
        .to_string()
}

/// The error and its `source()` chain, one `caused by:` line per level
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
