//! Tracing setup for the node.
//!
//! Logs go to stderr. `quote` and `status` print their JSON on stdout, and
//! that output has to stay pipeable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormatArg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// `RUST_LOG` when it parses, otherwise the node's own directives.
fn filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// Installs the global subscriber. Panics if one is already set, so `run`
/// calls it once before anything else logs.
pub fn init_logging(default_directives: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter(default_directives));

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    tracing::info!(?format, "logging ready");
}
