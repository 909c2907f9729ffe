//! Configuration module for Hookspan
//!
//! Covers both surfaces: `PluginConfig`, the options accepted at plugin
//! registration, and `TracingConfig`, the SDK/exporter settings consumed by
//! the telemetry init path. YAML loading supports environment variable
//! expansion and validation.

use crate::host::{BoxError, Reply, Request};
use crate::telemetry::TracerSource;
use http::Method;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::KeyValue;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports `${VAR_NAME}` and `${VAR_NAME:-default}`. A variable that is
/// unset and carries no default keeps its placeholder.
fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let full_match = cap.get(0).unwrap();
        let var_name = cap.get(1).unwrap().as_str();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Custom deserializer for strings with environment variable expansion
fn deserialize_with_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_vars(&s))
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// ============================================================================
// Plugin Configuration
// ============================================================================

/// Request-phase attribute formatter
pub type RequestFormatter = Arc<dyn Fn(&Request) -> Vec<KeyValue> + Send + Sync>;
/// Error-phase attribute formatter
pub type ErrorFormatter = Arc<dyn Fn(&BoxError) -> Vec<KeyValue> + Send + Sync>;
/// Reply-phase attribute formatter
pub type ReplyFormatter = Arc<dyn Fn(&Reply) -> Vec<KeyValue> + Send + Sync>;

/// Per-phase span attribute formatter overrides.
///
/// A supplied phase formatter replaces the default formatter for that
/// phase; phases left as `None` keep the built-in attributes.
#[derive(Clone, Default)]
pub struct SpanAttributeFormat {
    pub request: Option<RequestFormatter>,
    pub error: Option<ErrorFormatter>,
    pub reply: Option<ReplyFormatter>,
}

impl fmt::Debug for SpanAttributeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanAttributeFormat")
            .field("request", &self.request.as_ref().map(|_| "custom"))
            .field("error", &self.error.as_ref().map(|_| "custom"))
            .field("reply", &self.reply.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// Route selection policy for wrapping and ignoring.
///
/// Deserializes from either a boolean (`true` selects every route, `false`
/// selects none) or an explicit path list. Predicates are only
/// constructible in code.
#[derive(Clone, Default)]
pub enum RouteSelector {
    /// Select no routes
    #[default]
    None,
    /// Select every route
    All,
    /// Select routes whose path template matches one of the entries
    Paths(Vec<String>),
    /// Select routes for which the predicate over (path, method) is true
    Predicate(Arc<dyn Fn(&str, &Method) -> bool + Send + Sync>),
}

impl RouteSelector {
    /// Whether the selector matches the given path and method
    pub fn matches(&self, path: &str, method: &Method) -> bool {
        match self {
            RouteSelector::None => false,
            RouteSelector::All => true,
            RouteSelector::Paths(paths) => paths.iter().any(|p| p == path),
            RouteSelector::Predicate(predicate) => predicate(path, method),
        }
    }

    /// Whether the selector can never match
    pub fn is_none(&self) -> bool {
        matches!(self, RouteSelector::None)
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if let RouteSelector::Paths(paths) = self {
            for path in paths {
                if !path.starts_with('/') {
                    return Err(ConfigError::ValidationError(format!(
                        "{field} entry '{path}' must start with '/'"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RouteSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSelector::None => f.write_str("None"),
            RouteSelector::All => f.write_str("All"),
            RouteSelector::Paths(paths) => f.debug_tuple("Paths").field(paths).finish(),
            RouteSelector::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

impl<'de> Deserialize<'de> for RouteSelector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Paths(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => RouteSelector::All,
            Repr::Flag(false) => RouteSelector::None,
            Repr::Paths(paths) => RouteSelector::Paths(paths),
        })
    }
}

/// Options accepted at plugin registration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Attach the per-request accessor. Default: true
    pub expose_api: bool,

    /// Which routes run their handler and hooks inside the request context
    pub wrap_routes: RouteSelector,

    /// Which requests bypass tracing entirely
    pub ignore_routes: RouteSelector,

    /// Per-phase span attribute overrides
    #[serde(skip)]
    pub format_span_attributes: SpanAttributeFormat,

    /// Tracer acquisition override. Default: the global provider
    #[serde(skip)]
    pub tracer: Option<Arc<dyn TracerSource>>,

    /// Propagator override. Default: the global text-map propagator
    #[serde(skip)]
    pub propagator: Option<Arc<dyn TextMapPropagator + Send + Sync>>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            expose_api: true,
            wrap_routes: RouteSelector::default(),
            ignore_routes: RouteSelector::default(),
            format_span_attributes: SpanAttributeFormat::default(),
            tracer: None,
            propagator: None,
        }
    }
}

impl PluginConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wrap_routes.validate("wrap_routes")?;
        self.ignore_routes.validate("ignore_routes")?;
        Ok(())
    }
}

impl fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConfig")
            .field("expose_api", &self.expose_api)
            .field("wrap_routes", &self.wrap_routes)
            .field("ignore_routes", &self.ignore_routes)
            .field("format_span_attributes", &self.format_span_attributes)
            .field("tracer", &self.tracer.as_ref().map(|_| "custom"))
            .field("propagator", &self.propagator.as_ref().map(|_| "custom"))
            .finish()
    }
}

// ============================================================================
// Tracing Configuration
// ============================================================================

/// OpenTelemetry SDK configuration for the telemetry init path.
///
/// # Example
///
/// ```yaml
/// enabled: true
/// service_name: "hookspan-demo"
/// otlp:
///   endpoint: "http://localhost:4317"
///   protocol: "grpc"
/// sampling:
///   strategy: "ratio"
///   ratio: 0.25
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Enable or disable tracing. Default: false
    #[serde(default)]
    pub enabled: bool,

    /// Service name reported in the trace resource. Supports ${VAR} and
    /// ${VAR:-default} expansion.
    #[serde(
        default = "default_service_name",
        deserialize_with = "deserialize_with_env"
    )]
    pub service_name: String,

    /// OTLP exporter configuration
    #[serde(default)]
    pub otlp: OtlpConfig,

    /// Trace sampling configuration
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Batch span processor configuration
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
            otlp: OtlpConfig::default(),
            sampling: SamplingConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl TracingConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Service name cannot be empty when tracing is enabled".into(),
            ));
        }

        // An empty endpoint means no export; anything else must be a URL.
        if !self.otlp.endpoint.is_empty() && !is_valid_http_url(&self.otlp.endpoint) {
            return Err(ConfigError::ValidationError(
                "Invalid OTLP endpoint: must start with http:// or https://".into(),
            ));
        }

        match self.otlp.protocol.as_str() {
            "grpc" | "http/protobuf" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid OTLP protocol '{other}': must be 'grpc' or 'http/protobuf'"
                )))
            }
        }

        if let Some(ref compression) = self.otlp.compression {
            match compression.as_str() {
                "gzip" | "none" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid compression '{other}': must be 'gzip' or 'none'"
                    )))
                }
            }
        }

        if !(0.0..=1.0).contains(&self.sampling.ratio) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid sampling ratio {}: must be between 0.0 and 1.0",
                self.sampling.ratio
            )));
        }

        match self.sampling.strategy.as_str() {
            "always" | "never" | "ratio" | "parent_based" => Ok(()),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid sampling strategy '{other}': must be 'always', 'never', 'ratio', or 'parent_based'"
            ))),
        }
    }
}

fn default_service_name() -> String {
    "hookspan".to_string()
}

/// OTLP (OpenTelemetry Protocol) exporter configuration.
///
/// An empty endpoint builds a provider without an exporter, which keeps
/// spans local (useful for tests and development).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpConfig {
    /// OTLP collector endpoint URL. Supports ${VAR} expansion.
    #[serde(default, deserialize_with = "deserialize_with_env")]
    pub endpoint: String,

    /// Protocol to use: "grpc" or "http/protobuf". Default: "grpc"
    #[serde(default = "default_otlp_protocol")]
    pub protocol: String,

    /// Timeout for OTLP export in seconds. Default: 10
    #[serde(default = "default_otlp_timeout")]
    pub timeout_seconds: u64,

    /// Optional compression: "gzip" or "none"
    #[serde(default)]
    pub compression: Option<String>,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            protocol: default_otlp_protocol(),
            timeout_seconds: default_otlp_timeout(),
            compression: None,
        }
    }
}

fn default_otlp_protocol() -> String {
    "grpc".to_string()
}

fn default_otlp_timeout() -> u64 {
    10
}

/// Trace sampling configuration.
///
/// # Sampling Strategies
/// - `always` - Sample all traces (default)
/// - `never` - Sample no traces
/// - `ratio` - Sample a fraction of traces based on `ratio`
/// - `parent_based` - Respect the parent span's sampling decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sampling strategy. Default: "always"
    #[serde(default = "default_sampling_strategy")]
    pub strategy: String,

    /// Sampling ratio (0.0 to 1.0). Used by "ratio" and "parent_based".
    #[serde(default = "default_sampling_ratio")]
    pub ratio: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            strategy: default_sampling_strategy(),
            ratio: default_sampling_ratio(),
        }
    }
}

fn default_sampling_strategy() -> String {
    "always".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

/// Batch span processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of spans queued before forced export. Default: 2048
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Delay in milliseconds between scheduled exports. Default: 5000
    #[serde(default = "default_scheduled_delay")]
    pub scheduled_delay_millis: u64,

    /// Maximum number of spans per export batch. Default: 512
    #[serde(default = "default_max_export_batch_size")]
    pub max_export_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            scheduled_delay_millis: default_scheduled_delay(),
            max_export_batch_size: default_max_export_batch_size(),
        }
    }
}

fn default_max_queue_size() -> usize {
    2048
}

fn default_scheduled_delay() -> u64 {
    5000
}

fn default_max_export_batch_size() -> usize {
    512
}
