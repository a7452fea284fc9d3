//! Log output. Everything goes to stderr so the chat on stdout stays readable.

use tracing_subscriber::{fmt, EnvFilter};

/// Used when `RUST_LOG` is unset; the HTTP and SQLite layers are quiet below warn
pub const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn";

pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_FILTER);
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_tracing_with(default_filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_refused() {
        init_tracing_with("debug");
        assert!(!init_tracing_with("debug"));
    }
}
