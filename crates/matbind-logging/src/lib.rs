//! Logging bootstrap for matbind.
//!
//! Library crates log through the `log` facade. [`init_logging`] routes those
//! records into a `tracing` subscriber and, when a hook is registered with
//! [`set_log_hook`], forwards each one as a structured [`BindingLogRecord`].

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_log::LogTracer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Environment variable consulted after `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "MATBIND_LOG";

/// One log event, flattened for hooks.
#[derive(Debug, Clone, Serialize)]
pub struct BindingLogRecord {
    /// RFC 3339, millisecond precision, UTC
    pub ts: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<JsonValue>,
}

impl BindingLogRecord {
    fn from_event(event: &Event<'_>) -> Self {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let metadata = event.metadata();
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: metadata.level().to_string(),
            // bridged `log` records carry their real target as a field
            target: collector
                .target
                .unwrap_or_else(|| metadata.target().to_string()),
            message: collector
                .message
                .unwrap_or_else(|| metadata.name().to_string()),
            span_id: tracing::Span::current()
                .id()
                .map(|id| id.into_u64().to_string()),
            fields: (!collector.fields.is_empty()).then(|| JsonValue::Object(collector.fields)),
        }
    }
}

type LogHook = Arc<dyn Fn(&BindingLogRecord) + Send + Sync>;

static LOG_HOOK: OnceCell<LogHook> = OnceCell::new();

/// Keeps a thread-local subscriber installed when the global one was taken.
pub struct LoggingGuard {
    _local: Option<DefaultGuard>,
}

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Filter directive used when neither `RUST_LOG` nor `MATBIND_LOG` is set.
    pub default_filter: String,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
        }
    }
}

/// Register a hook receiving every log record. Only the first call wins.
pub fn set_log_hook<F>(hook: F)
where
    F: Fn(&BindingLogRecord) + Send + Sync + 'static,
{
    let _ = LOG_HOOK.set(Arc::new(hook));
}

fn resolve_filter(opts: &LoggingOptions) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(LOG_ENV_VAR))
        .or_else(|_| EnvFilter::try_new(&opts.default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the subscriber. Safe to call more than once; later calls fall
/// back to a subscriber scoped to the returned guard.
pub fn init_logging(opts: LoggingOptions) -> LoggingGuard {
    let _ = LogTracer::init();

    let subscriber = || {
        tracing_subscriber::registry()
            .with(resolve_filter(&opts))
            .with(HookLayer)
    };

    let local = tracing::subscriber::set_global_default(subscriber())
        .err()
        .map(|_| tracing::subscriber::set_default(subscriber()));

    LoggingGuard { _local: local }
}

struct HookLayer;

impl<S: Subscriber> Layer<S> for HookLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if let Some(hook) = LOG_HOOK.get() {
            hook(&BindingLogRecord::from_event(event));
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    target: Option<String>,
    fields: Map<String, JsonValue>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: JsonValue) {
        let text = || match &value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        match field.name() {
            "message" => self.message = Some(text()),
            "log.target" => self.target = Some(text()),
            // remaining `log.*` fields (module path, file, line) are noise here
            name if name.starts_with("log.") => {}
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, JsonValue::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, JsonValue::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, JsonValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, JsonValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, JsonValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, JsonValue::from(value));
    }
}
