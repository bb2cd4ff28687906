//! Diagnostic tracing for the `overseer` binary.
//!
//! Tracing output goes to stderr. Session artifacts (goal reports, findings)
//! are written by `io::report` and do not depend on the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directives read before falling back to [`DEFAULT_DIRECTIVES`].
pub const LOG_ENV: &str = "OVERSEER_LOG";

/// Session lifecycle at `info`, everything else at `warn`.
pub const DEFAULT_DIRECTIVES: &str = "warn,overseer=info";

/// Install the global subscriber.
///
/// ```bash
/// OVERSEER_LOG=overseer::orchestrator=debug overseer run example.com
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}
