//! `tracing` subscriber setup.
//!
//! Structured fields (`session_id`, `connection_id`) are attached through spans
//! on the connection and analysis entry points, so every line emitted while
//! serving a session carries its identity.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. With `json` set, lines are
/// emitted as JSON objects; otherwise the compact human format is used.
/// Call once at startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails only when a global subscriber is already installed
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init_subscriber("debug", false);
        init_subscriber("info", true);
        tracing::info!(answer = 42, "still logging");
    }
}
