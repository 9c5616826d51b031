//! Diagnostic logging to stderr

use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter directive
pub const LOG_ENV: &str = "CHARTFUSE_LOG";

/// Install the global subscriber
///
/// `CHARTFUSE_LOG` wins when set; otherwise `--debug` selects `debug` and
/// the default is `warn`.
pub fn init(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
