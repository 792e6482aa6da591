use tracing::Span;
use tracing_subscriber::EnvFilter;

use crate::error::{ReportError, ReportResult};

/// Installs the stderr subscriber. An explicit level wins over `RUST_LOG`;
/// without either, `info` is used.
pub fn init_logging(level: Option<&str>) -> ReportResult<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")),
    }
    .map_err(|e| ReportError::Configuration(format!("invalid log level: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| ReportError::Configuration(format!("logging already initialized: {e}")))
}

pub fn task_span(subject: &str, session: Option<&str>) -> Span {
    tracing::info_span!("report", subject = %subject, session = %session.unwrap_or("-"))
}
