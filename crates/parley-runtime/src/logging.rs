//! Log output for a running bot.
//!
//! Installs one `tracing-subscriber` registry: an `EnvFilter` built from the
//! configured level and per-module filters (`RUST_LOG` wins when set), and a
//! single `fmt` layer writing to stdout, stderr or a rotating log file.
//!
//! The dispatcher opens a `dispatch` span per inbound event with `chat_id`
//! and `user_id` fields, so [`SpanEvents::LIFECYCLE`] logs one line when an
//! event arrives and one when its pipelines are done.
//!
//! ```rust,ignore
//! // from configuration, done by `ParleyRuntime::from_config`
//! parley_runtime::logging::init_from_config(&config.logging);
//!
//! // by hand, e.g. in a test binary
//! LoggingBuilder::new()
//!     .directive("parley_framework::pipeline=trace")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```

use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

/// Which span transitions produce a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

impl SpanEvents {
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// One line when a dispatch starts and one when it finishes.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    /// Every transition, including each poll of a dispatch future.
    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    /// Enter and exit only: shows where a dispatch yields to the runtime.
    pub const ACTIVE: Self = Self {
        new: false,
        enter: true,
        exit: true,
        close: false,
    };

    fn to_fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(FmtSpan::NONE, |acc, (_, flag)| acc | flag)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
        }
    }
}

/// Installs the subscriber described by `config`.
///
/// A no-op when a global subscriber already exists, so tests and embedding
/// applications may install their own first.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Subscriber settings, filled from [`LoggingConfig`] or set by hand.
#[derive(Default)]
pub struct LoggingBuilder {
    level: Option<tracing::Level>,
    /// `module=level` pairs added on top of `level`.
    directives: Vec<String>,
    format: LogFormat,
    output: LogOutput,
    span_events: SpanEvents,
    show_target: bool,
    show_thread_ids: bool,
    show_file: bool,
    show_line: bool,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
    max_files: usize,
}

impl LoggingBuilder {
    /// Compact output to stdout at `info`, module targets shown.
    pub fn new() -> Self {
        Self {
            show_target: true,
            max_files: 5,
            ..Default::default()
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut directives: Vec<String> = config
            .filters
            .iter()
            .map(|(module, level)| format!("{module}={}", level.as_str()))
            .collect();
        directives.sort();

        Self {
            level: Some(config.level.to_tracing_level()),
            directives,
            format: config.format,
            output: config.output,
            span_events: (&config.span_events).into(),
            show_target: true,
            show_thread_ids: config.thread_ids,
            show_file: config.file_location,
            show_line: config.file_location,
            file_path: config.file_path.clone(),
            rotation: config.rotation,
            max_files: config.max_files as usize,
        }
    }

    /// Level for modules without their own directive.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Add a filter directive such as `parley_framework::pipeline=trace`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Selects which span transitions are logged.
    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Show the emitting module, e.g. `parley_framework::dispatcher`.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.show_target = enabled;
        self
    }

    /// Show worker thread ids; useful with concurrent dispatches.
    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.show_thread_ids = enabled;
        self
    }

    pub fn with_file(mut self, enabled: bool) -> Self {
        self.show_file = enabled;
        self
    }

    pub fn with_line_number(mut self, enabled: bool) -> Self {
        self.show_line = enabled;
        self
    }

    /// Log file for [`LogOutput::File`]. Rotated files get a date suffix.
    pub fn file_path(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotated files kept before the oldest is deleted.
    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base_level = self.level.unwrap_or(tracing::Level::INFO);
        let base_filter = base_level.to_string().to_lowercase();

        // RUST_LOG takes precedence over the configured level
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base_filter));

        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }

        filter
    }

    fn file_appender(&self) -> Option<Result<RollingFileAppender, InitError>> {
        let path = self.file_path.as_ref()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("parley.log");

        Some(
            RollingFileAppender::builder()
                .rotation(self.rotation.into())
                .filename_prefix(file_name)
                .max_log_files(self.max_files.max(1))
                .build(dir),
        )
    }

    /// Chooses the writer. The second value is set when file output was
    /// requested but could not be opened.
    fn writer(&self) -> (BoxMakeWriter, Option<String>) {
        match self.output {
            LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), None),
            LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), None),
            LogOutput::File => match self.file_appender() {
                Some(Ok(appender)) => (BoxMakeWriter::new(appender), None),
                Some(Err(e)) => (
                    BoxMakeWriter::new(std::io::stdout),
                    Some(format!("cannot open log file: {e}")),
                ),
                None => (
                    BoxMakeWriter::new(std::io::stdout),
                    Some("file output requested without a file path".to_string()),
                ),
            },
        }
    }

    fn fmt_layer(&self, writer: BoxMakeWriter) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(self.span_events.to_fmt_span())
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_file(self.show_file)
            .with_line_number(self.show_line);

        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }

    /// Installs the subscriber, ignoring an already installed one.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber.
    ///
    /// Fails only when a global subscriber is already set. An unusable log
    /// file falls back to stdout with a warning.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let (writer, fallback) = self.writer();
        tracing_subscriber::registry()
            .with(self.fmt_layer(writer))
            .with(self.build_filter())
            .try_init()?;

        if let Some(reason) = fallback {
            warn!("{reason}, logging to stdout instead");
        }
        Ok(())
    }
}
