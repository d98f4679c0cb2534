//! Logging setup for scaosim processes.
//!
//! Every role process initializes one `tracing` subscriber at start-up.
//! Events carry structured fields (`channel`, `generation`,
//! `latency_us`, ...) so the JSON format can be fed to a log pipeline
//! unchanged.
//!
//! # Configuration
//!
//! Logging format is controlled via `SCAOSIM_LOG_FORMAT`:
//! - `json` - Structured JSON output
//! - `pretty` - Human-readable multi-line output (default for TTY)
//! - `compact` - Compact single-line format
//!
//! The filter comes from `SCAOSIM_LOG_LEVEL`, then `RUST_LOG`, then
//! `info`. Command-line verbosity overrides all three.
//!
//! # Example
//!
//! ```ignore
//! use scaosim_runtime::observability::{TracingConfig, init_tracing};
//!
//! let config = TracingConfig::from_env()
//!     .into_builder()
//!     .service_name("reconstructor")
//!     .verbosity(1)
//!     .build();
//! let _guard = init_tracing(config)?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::{TracingGuard, init_tracing};

/// Span covering one role process.
#[macro_export]
macro_rules! role_span {
    ($role:expr) => {
        tracing::info_span!("role", role = %$role, pid = std::process::id())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name(), "scaosim");
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn config_builder() {
        let config = TracingConfig::builder()
            .service_name("monitor")
            .log_format(LogFormat::Json)
            .log_filter("warn")
            .build();

        assert_eq!(config.service_name(), "monitor");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn verbosity_overrides_filter() {
        let config = TracingConfig::builder()
            .log_filter("warn")
            .verbosity(2)
            .build();
        assert_eq!(config.log_filter(), "info,scaosim_core=trace,scaosim_runtime=trace,scaosim=trace");

        let quiet = TracingConfig::builder().log_filter("warn").verbosity(0).build();
        assert_eq!(quiet.log_filter(), "warn");
    }

    #[test]
    fn config_from_env() {
        let config = TracingConfig::from_env();
        assert_eq!(config.service_name(), "scaosim");
    }
}
