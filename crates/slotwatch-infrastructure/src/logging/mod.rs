//! Logging bootstrap.
//!
//! Installs one global `tracing` subscriber with:
//! - a one-line JSON file layer (daily rolling `slotwatch.log`)
//! - a coloured human-readable stdout layer in debug builds
//!
//! `log` records from dependencies are forwarded into tracing. Every JSON
//! line carries timestamp (ISO 8601 with offset, millisecond precision),
//! level, target, pid, tid, file/line, message, version and the event's
//! structured fields.

use log::LevelFilter;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();
static APP_VERSION: OnceLock<String> = OnceLock::new();
static LOGGER_READY: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

pub const LOG_FILE_PREFIX: &str = "slotwatch.log";

/// Initialise logging. Calling it again after a successful call is a no-op.
///
/// Debug builds log to stdout (coloured) and to the JSON file; release
/// builds only write the JSON file.
pub fn init_logger(log_dir: PathBuf) -> anyhow::Result<()> {
    let _init = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if LOGGER_READY.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(&log_dir)?;

    let _ = LOG_DIR.set(log_dir.clone());
    let _ = APP_VERSION.set(env!("CARGO_PKG_VERSION").to_string());

    let _ = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init();

    let file_appender = rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = FILE_GUARD.set(guard);

    let json_layer = fmt::layer()
        .with_writer(non_blocking)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_timer(fmt::time::ChronoLocal::new(
            "%Y-%m-%dT%H:%M:%S%.3f%:z".to_string(),
        ))
        .event_format(JsonFormatter::new())
        .with_filter(file_filter());

    let stdout_layer = if cfg!(debug_assertions) {
        Some(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_ansi(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                ))
                .event_format(HumanReadableFormatter::new())
                .with_filter(stdout_filter()),
        )
    } else {
        None
    };

    let subscriber = Registry::default().with(json_layer).with(stdout_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    let _ = LOGGER_READY.set(());

    tracing::info!(
        target: "slotwatch::logging",
        log_dir = %log_dir.display(),
        version = env!("CARGO_PKG_VERSION"),
        profile = if cfg!(debug_assertions) { "Debug" } else { "Release" },
        "Logger initialized successfully"
    );

    Ok(())
}

/// Per-user log directory, next to the configuration file.
pub fn default_log_dir() -> PathBuf {
    crate::config::default_data_dir().join("logs")
}

fn file_filter() -> EnvFilter {
    // RUST_LOG overrides
    let default_level = if cfg!(debug_assertions) {
        "debug,slotwatch=trace"
    } else {
        "info,slotwatch=info"
    };

    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn stdout_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("debug,slotwatch=trace"))
        .unwrap_or_else(|_| EnvFilter::new("debug"))
}

pub fn get_log_dir() -> Option<PathBuf> {
    LOG_DIR.get().cloned()
}

// ============================================================
// Formatters
// ============================================================

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

struct LineMeta<'a> {
    timestamp: String,
    level: &'a Level,
    target: &'a str,
    file: Option<&'a str>,
    line: Option<u32>,
    pid: u32,
    tid: String,
    thread_name: String,
    version: &'a str,
}

fn render_json_line(
    meta: LineMeta<'_>,
    mut fields: serde_json::Map<String, serde_json::Value>,
) -> String {
    let mut json = serde_json::json!({
        "timestamp": meta.timestamp,
        "level": meta.level.to_string(),
        "pid": meta.pid,
        "tid": meta.tid,
        "thread_name": meta.thread_name,
        "target": meta.target,
        "version": meta.version,
    });

    if let Some(file) = meta.file {
        json["file"] = serde_json::json!(file);
    }
    if let Some(line) = meta.line {
        json["line"] = serde_json::json!(line);
    }

    if let Some(message) = fields.remove("message") {
        json["message"] = message;
    }
    if !fields.is_empty() {
        json["fields"] = serde_json::Value::Object(fields);
    }

    serde_json::to_string(&json).unwrap_or_default()
}

/// One JSON object per line
struct JsonFormatter {
    pid: u32,
    version: String,
}

impl JsonFormatter {
    fn new() -> Self {
        Self {
            pid: std::process::id(),
            version: APP_VERSION
                .get()
                .cloned()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let thread = std::thread::current();

        let mut visitor = JsonVisitor::new();
        event.record(&mut visitor);

        let meta = LineMeta {
            timestamp: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.3f%:z")
                .to_string(),
            level: metadata.level(),
            target: metadata.target(),
            file: metadata.file(),
            line: metadata.line(),
            pid: self.pid,
            tid: format!("{:?}", thread.id()),
            thread_name: thread.name().unwrap_or("unnamed").to_string(),
            version: &self.version,
        };

        writeln!(writer, "{}", render_json_line(meta, visitor.fields))
    }
}

/// Coloured single-line output for the terminal:
/// `2026-10-18 09:00:05.123 [INFO] (slotwatch_app::worker) pid=4242 tid=ThreadId(7) date=2026-10-25 | message (src/worker.rs:88)`
struct HumanReadableFormatter {
    pid: u32,
}

impl HumanReadableFormatter {
    fn new() -> Self {
        Self {
            pid: std::process::id(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for HumanReadableFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        let tid = format!("{:?}", std::thread::current().id());

        let level_str = match *metadata.level() {
            Level::ERROR => "\x1b[31mERROR\x1b[0m",
            Level::WARN => "\x1b[33mWARN\x1b[0m",
            Level::INFO => "\x1b[32mINFO\x1b[0m",
            Level::DEBUG => "\x1b[36mDEBUG\x1b[0m",
            Level::TRACE => "\x1b[35mTRACE\x1b[0m",
        };

        let mut fields_visitor = JsonVisitor::new();
        event.record(&mut fields_visitor);

        let message = fields_visitor
            .fields
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let fields_str: String = fields_visitor
            .fields
            .iter()
            .filter(|(key, _)| key.as_str() != "message")
            .map(|(key, value)| match value.as_str() {
                Some(text) => format!(" {}={}", key, text),
                None => format!(" {}={}", key, value),
            })
            .collect();

        let location = if let (Some(file), Some(line)) = (metadata.file(), metadata.line()) {
            format!(" ({}:{})", file, line)
        } else {
            String::new()
        };

        writeln!(
            writer,
            "{} [{}] ({}) pid={} tid={}{} | {}{}",
            timestamp,
            level_str,
            metadata.target(),
            self.pid,
            tid,
            fields_str,
            message,
            location
        )
    }
}

/// Collects event fields into a JSON map
struct JsonVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl JsonVisitor {
    fn new() -> Self {
        Self {
            fields: serde_json::Map::new(),
        }
    }
}

impl tracing::field::Visit for JsonVisitor {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}
