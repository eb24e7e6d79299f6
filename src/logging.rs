//! Structured logging setup.
//!
//! Events carry shapes and counts only (paths, sheet names, row/column counts, outcomes).
//! Cell values and passwords never reach the log.

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this twice is harmless;
/// the second call leaves the first subscriber in place.
pub fn init(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("excelmgr={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = match format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Text => builder.compact().try_init(),
    };
}

/// Fresh identifier attached to every event of one invocation
pub fn run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
