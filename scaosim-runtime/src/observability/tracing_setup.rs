//! Tracing subscriber setup with format selection.

use anyhow::{Context, Result};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::{TracingConfig, config::LogFormat};

/// Guard returned by [`init_tracing`].
///
/// Logs process shutdown when dropped; keep it alive for the lifetime of
/// the process.
pub struct TracingGuard {
    service_name: String,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        tracing::debug!(service = %self.service_name, "Tracing shut down");
    }
}

/// Initialize tracing with the given configuration.
///
/// Events go to stderr so stdout stays free for command output. Fails if
/// a global subscriber is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<TracingGuard> {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.include_location())
        .with_line_number(config.include_location())
        .with_thread_names(config.include_thread_names());
    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.log_format() {
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(
        service = %config.service_name(),
        format = ?config.log_format(),
        filter = %config.log_filter(),
        "Tracing initialized"
    );

    Ok(TracingGuard {
        service_name: config.service_name().to_string(),
    })
}
