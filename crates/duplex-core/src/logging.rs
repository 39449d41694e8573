//! Structured logging with `tracing`.

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor a level is given.
pub const DEFAULT_LEVEL: &str = "info";

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
/// `RUST_LOG` takes precedence over `level` when it is set.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| build_filter(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global default is already set
    let _ = subscriber.try_init();
}

/// Build an `EnvFilter` from a level string, falling back to
/// [`DEFAULT_LEVEL`] when the string does not parse.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_noop() {
        init_subscriber("debug");
        init_subscriber("warn");
    }

    #[test]
    fn filter_accepts_directives() {
        let filter = build_filter("duplex_ws=debug,info");
        assert!(filter.to_string().contains("duplex_ws=debug"));
    }
}
