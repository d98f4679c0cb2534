//! Configuration types for logging.

use std::env;
use std::str::FromStr;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON, one event per line.
    Json,
    /// Human-readable multi-line format.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Filter for a `-v` count; `None` keeps the configured filter.
fn verbosity_filter(level: u8) -> Option<&'static str> {
    match level {
        0 => None,
        1 => Some("info,scaosim_core=debug,scaosim_runtime=debug,scaosim=debug"),
        2 => Some("info,scaosim_core=trace,scaosim_runtime=trace,scaosim=trace"),
        _ => Some("trace"),
    }
}

/// Configuration for the tracing subscriber of one role process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    service_name: String,
    log_format: LogFormat,
    /// `EnvFilter` directive, e.g. "info,scaosim_core=trace".
    log_filter: String,
    include_location: bool,
    include_thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "scaosim".to_string(),
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
            include_location: false,
            include_thread_names: false,
        }
    }
}

impl TracingConfig {
    /// Start from the defaults.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the environment.
    ///
    /// - `SCAOSIM_LOG_FORMAT`: "json", "pretty" or "compact"; otherwise
    ///   pretty when stderr is a terminal, compact when it is not
    /// - `SCAOSIM_LOG_LEVEL`, then `RUST_LOG`: filter directive
    /// - `SCAOSIM_LOG_LOCATION=1`: include file and line
    /// - `SCAOSIM_LOG_THREAD_NAMES=1`: include thread names
    pub fn from_env() -> Self {
        let log_format = env::var("SCAOSIM_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| {
                if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
                    LogFormat::Pretty
                } else {
                    LogFormat::Compact
                }
            });

        let log_filter = env::var("SCAOSIM_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let flag = |name: &str| env::var(name).is_ok_and(|v| v == "1" || v == "true");

        Self {
            log_format,
            log_filter,
            include_location: flag("SCAOSIM_LOG_LOCATION"),
            include_thread_names: flag("SCAOSIM_LOG_THREAD_NAMES"),
            ..Self::default()
        }
    }

    /// Continue configuring from this value.
    pub fn into_builder(self) -> TracingConfigBuilder {
        TracingConfigBuilder { config: self }
    }

    /// Process name recorded at start-up.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Output format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Filter directive.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Whether events carry file and line.
    pub fn include_location(&self) -> bool {
        self.include_location
    }

    /// Whether events carry the thread name.
    pub fn include_thread_names(&self) -> bool {
        self.include_thread_names
    }
}

/// Builder for [`TracingConfig`].
#[derive(Debug, Clone)]
pub struct TracingConfigBuilder {
    config: TracingConfig,
}

impl TracingConfigBuilder {
    /// Set the service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Set the log format.
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Set the filter directive.
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Apply a `-v` count. Non-zero replaces the filter.
    pub fn verbosity(mut self, level: u8) -> Self {
        if let Some(filter) = verbosity_filter(level) {
            self.config.log_filter = filter.to_string();
        }
        self
    }

    /// Include file and line.
    pub fn include_location(mut self, include: bool) -> Self {
        self.config.include_location = include;
        self
    }

    /// Include thread names.
    pub fn include_thread_names(mut self, include: bool) -> Self {
        self.config.include_thread_names = include;
        self
    }

    /// Finish.
    pub fn build(self) -> TracingConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_format() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(verbosity_filter(0), None);
        assert_eq!(verbosity_filter(3), Some("trace"));
        assert_eq!(verbosity_filter(9), Some("trace"));
    }
}
