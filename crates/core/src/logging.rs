//! Tracing subscriber setup for embedding applications.

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber filtered at `level`.
///
/// `RUST_LOG` takes precedence when set. An unparsable `level` falls back to
/// `info`. Returns `false` when a global subscriber was already installed,
/// which makes repeated calls harmless.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("debug");
        assert!(!init("not a [valid filter"));
    }
}
