//! Structured logging set-up
//!
//! The engine only emits `tracing` events; installing a subscriber is left to
//! the embedding application. Every public query opens a span named after the
//! query, so `trace_queries` shows one open/close pair per editor request.
//! Recursion-guard short circuits are logged at `trace` under
//! `pysense::analysis` and are only visible with `engine_trace`.

use crate::frontend::config::{Config, LogFormatSetting, LogSettings};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const FILE_PREFIX: &str = "pysense";
const ENGINE_TARGET: &str = "pysense::analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatSetting> for LogFormat {
    fn from(setting: LogFormatSetting) -> Self {
        match setting {
            LogFormatSetting::Pretty => LogFormat::Pretty,
            LogFormatSetting::Compact => LogFormat::Compact,
            LogFormatSetting::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily rotated files `<directory>/pysense.<date>`
    Daily(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Open/close events for query spans
    pub trace_queries: bool,
    /// Per-node evaluation detail from the inference engine
    pub engine_trace: bool,
    /// Extra `target=level` directives
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            trace_queries: false,
            engine_trace: false,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings from the `[log]` section; an unknown level falls back to info
    pub fn from_settings(settings: &LogSettings) -> Self {
        Self {
            level: settings.level.parse().unwrap_or(Level::INFO),
            format: settings.format.into(),
            output: settings
                .directory
                .clone()
                .map_or(LogOutput::Stderr, LogOutput::Daily),
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_query_spans(mut self, enabled: bool) -> Self {
        self.trace_queries = enabled;
        self
    }

    pub fn with_engine_trace(mut self, enabled: bool) -> Self {
        self.engine_trace = enabled;
        self
    }

    /// Add comma separated directives such as `"pysense::imports=debug"`
    pub fn with_filter(mut self, directives: &str) -> Self {
        self.directives.extend(
            directives
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        );
        self
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level.into());
        if self.engine_trace {
            filter = filter.add_directive(engine_directive());
        }
        for raw in &self.directives {
            match raw.parse::<Directive>() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(err) => tracing::warn!(directive = %raw, error = %err, "invalid log directive ignored"),
            }
        }
        filter
    }

    fn span_events(&self) -> FmtSpan {
        if self.trace_queries {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

fn engine_directive() -> Directive {
    format!("{ENGINE_TARGET}=trace")
        .parse()
        .unwrap_or_else(|_| Level::TRACE.into())
}

/// Install the global subscriber.
///
/// The returned guard flushes buffered output when dropped and must outlive
/// every session. `None` when a subscriber was already installed.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::Daily(directory) => tracing_appender::non_blocking(rolling::daily(directory, FILE_PREFIX)),
    };
    install(&config, writer).then_some(guard)
}

/// Logging as described by a loaded project configuration
pub fn init_from_config(config: &Config) -> Option<WorkerGuard> {
    init_logging(LogConfig::from_settings(&config.log))
}

fn install<W>(config: &LogConfig, writer: W) -> bool
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_span_events(config.span_events());
    let filter = config.filter();
    let registry = tracing_subscriber::registry();
    let installed = match config.format {
        LogFormat::Pretty => registry.with(layer.pretty().with_filter(filter)).try_init(),
        LogFormat::Compact => registry.with(layer.compact().with_filter(filter)).try_init(),
        LogFormat::Json => registry.with(layer.json().with_filter(filter)).try_init(),
    };
    installed.is_ok()
}

/// Debug-level pretty logs on stderr with query spans
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(
        LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Pretty)
            .with_query_spans(true),
    )
}

/// JSON logs rotated daily under `log_dir`
pub fn init_prod_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    init_logging(
        LogConfig::new()
            .with_format(LogFormat::Json)
            .with_output(LogOutput::Daily(log_dir.as_ref().to_path_buf())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_query_spans(true)
            .with_filter("pysense::imports=trace, ,pysense::compiled=warn");

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.span_events(), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(config.directives, vec!["pysense::imports=trace", "pysense::compiled=warn"]);
    }

    #[test]
    fn test_from_settings() {
        let settings = LogSettings {
            level: "warn".to_string(),
            format: LogFormatSetting::Pretty,
            directory: Some(PathBuf::from("/var/log/pysense")),
        };
        let config = LogConfig::from_settings(&settings);
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.output, LogOutput::Daily(PathBuf::from("/var/log/pysense")));
    }

    #[test]
    fn test_bad_level_falls_back_to_info() {
        let settings = LogSettings {
            level: "chatty".to_string(),
            ..LogSettings::default()
        };
        assert_eq!(LogConfig::from_settings(&settings).level, Level::INFO);
    }
}
