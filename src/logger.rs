use crate::classify::Classify;
use crate::config::LoggerConfig;
use crate::error::LoggerError;
use crate::format::OutputFormat;
use crate::level::Level;
use crate::record::{correct_field_name, Fields, Record, ERROR_KEY, REQUEST_ID_KEY};
use crate::sink::LogSink;
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

const ERROR_OCCURRED: &str = "Error occurred!";

/// Callback notified on unexpected error-level events with
/// `(message, error_text, request_id)`.
pub type ErrorHook = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// Sinks and hooks shared by a logger and every logger derived from it.
#[derive(Default)]
struct Shared {
    sinks: RwLock<Vec<Arc<dyn LogSink>>>,
    hooks: RwLock<Vec<ErrorHook>>,
}

/// Leveled structured logger.
///
/// Cloning is cheap. Derived loggers (`with_field`, `with_fields`) get
/// their own copy of the baseline fields and share sinks and hooks with
/// the logger they came from.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    fields: Arc<Fields>,
    level: Level,
    format: OutputFormat,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("format", &self.format)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Build a logger from configuration.
    ///
    /// The level name is parsed case-insensitively and `env_name`,
    /// `branch` and `commit` become baseline fields.
    pub fn new(config: &LoggerConfig, sinks: Vec<Arc<dyn LogSink>>) -> Result<Self, LoggerError> {
        let level = config.min_level.parse::<Level>()?;
        let format = if config.debug {
            OutputFormat::Debug
        } else {
            OutputFormat::Json
        };

        let mut builder = Logger::builder().level(level).format(format);
        for sink in sinks {
            builder = builder.sink(sink);
        }
        Ok(builder.build().with_fields([
            ("env_name", config.env_name.clone()),
            ("branch", config.branch.clone()),
            ("commit", config.commit.clone()),
        ]))
    }

    /// Logger for tests: only errors and panics, human-readable lines.
    pub fn new_test_logger(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        let mut builder = Logger::builder()
            .level(Level::Error)
            .format(OutputFormat::Debug);
        for sink in sinks {
            builder = builder.sink(sink);
        }
        builder.build()
    }

    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    pub fn debug(&self, msg: &str) {
        self.log_with(Level::Debug, || msg.to_string());
    }

    pub fn debug_fmt(&self, args: fmt::Arguments<'_>) {
        self.log_with(Level::Debug, || args.to_string());
    }

    pub fn info(&self, msg: &str) {
        self.log_with(Level::Info, || msg.to_string());
    }

    pub fn info_fmt(&self, args: fmt::Arguments<'_>) {
        self.log_with(Level::Info, || args.to_string());
    }

    pub fn warn(&self, msg: &str) {
        self.log_with(Level::Warning, || msg.to_string());
    }

    pub fn warn_fmt(&self, args: fmt::Arguments<'_>) {
        self.log_with(Level::Warning, || args.to_string());
    }

    /// Log `err` under an `error` field, then wake the error hooks unless
    /// it, or an error it wraps, is an expected domain condition.
    pub fn error<E>(&self, err: &E)
    where
        E: Classify + fmt::Display + ?Sized,
    {
        if !self.enabled(Level::Error) {
            return;
        }
        let text = err.to_string();
        self.emit(Level::Error, ERROR_OCCURRED.to_string(), Some(&text));
        if !err.expected() {
            self.trigger_error_hooks(ERROR_OCCURRED, &text);
        }
    }

    /// Like [`Logger::error`] with a formatted message.
    pub fn error_fmt<E>(&self, err: &E, args: fmt::Arguments<'_>)
    where
        E: Classify + fmt::Display + ?Sized,
    {
        if !self.enabled(Level::Error) {
            return;
        }
        let text = err.to_string();
        let message = args.to_string();
        let hook_message = format!("Error occurred: {}", message);
        self.emit(Level::Error, message, Some(&text));
        if !err.expected() {
            self.trigger_error_hooks(&hook_message, &text);
        }
    }

    /// Log at the highest severity and always wake the error hooks. The
    /// process keeps running.
    pub fn panic(&self, msg: &str) {
        if !self.enabled(Level::Panic) {
            return;
        }
        self.emit(Level::Panic, msg.to_string(), None);
        self.trigger_error_hooks(&format!("panic: {}", msg), "");
    }

    pub fn panic_fmt(&self, args: fmt::Arguments<'_>) {
        if self.enabled(Level::Panic) {
            self.panic(&args.to_string());
        }
    }

    /// Emit a record at `level` without touching the error hooks, even for
    /// `Error` and `Panic`.
    pub fn log(&self, level: Level, msg: &str) {
        self.log_with(level, || msg.to_string());
    }

    /// Derived logger with `name` set in its baseline fields.
    ///
    /// A reserved name given a non-string value is stored as
    /// `custom_<name>`.
    pub fn with_field(&self, name: impl Into<String>, value: impl Into<Value>) -> Logger {
        let value = value.into();
        let name = correct_field_name(name.into(), &value);
        let mut derived = self.clone();
        Arc::make_mut(&mut derived.fields).set(name, value);
        derived
    }

    /// Derived logger with every pair set in its baseline fields.
    pub fn with_fields<I, K, V>(&self, fields: I) -> Logger
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut derived = self.clone();
        let baseline = Arc::make_mut(&mut derived.fields);
        for (name, value) in fields {
            baseline.set(name, value);
        }
        derived
    }

    /// Independent handle to the same logger state.
    pub fn replicate(&self) -> Logger {
        self.clone()
    }

    /// Register another sink. Visible to every logger sharing this one's
    /// sink list.
    pub fn add_sink(&self, sink: Arc<dyn LogSink>) {
        self.shared
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn reg_error_hook<F>(&self, hook: F)
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        self.shared
            .hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    fn log_with(&self, level: Level, message: impl FnOnce() -> String) {
        if !self.enabled(level) {
            return;
        }
        self.emit(level, message(), None);
    }

    fn emit(&self, level: Level, message: String, error: Option<&str>) {
        let mut fields = (*self.fields).clone();
        if let Some(text) = error {
            fields.set(ERROR_KEY, text);
        }
        let record = Arc::new(Record::compose(level, message, fields, Utc::now()));
        let line = self.format.render_or_fallback(&record);

        // A sink may block on a full queue or register sinks itself, so
        // print from a snapshot taken outside the lock.
        let sinks = self
            .shared
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sink in &sinks {
            sink.print(&line, &record);
        }
    }

    fn trigger_error_hooks(&self, message: &str, error: &str) {
        let request_id = self.fields.get_str(REQUEST_ID_KEY).unwrap_or_default();
        // Hooks may log through this logger, so call them outside the lock.
        let hooks = self
            .shared
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            hook(message, error, request_id);
        }
    }
}

/// Collects sinks, hooks and baseline fields before the logger is shared
/// between threads.
pub struct LoggerBuilder {
    level: Level,
    format: OutputFormat,
    fields: Fields,
    sinks: Vec<Arc<dyn LogSink>>,
    hooks: Vec<ErrorHook>,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: OutputFormat::Json,
            fields: Fields::new(),
            sinks: Vec::new(),
            hooks: Vec::new(),
        }
    }
}

impl LoggerBuilder {
    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let name = correct_field_name(name.into(), &value);
        self.fields.set(name, value);
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Logger {
        Logger {
            shared: Arc::new(Shared {
                sinks: RwLock::new(self.sinks),
                hooks: RwLock::new(self.hooks),
            }),
            fields: Arc::new(self.fields),
            level: self.level,
            format: self.format,
        }
    }
}
