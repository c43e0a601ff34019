//! Test fixtures.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`. Output goes through the test
/// harness capture.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Returns a stream name that is unique within the process.
pub fn unique_stream_name(prefix: &str) -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!("{prefix}-{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// A small batch of distinct payloads `e1`..`e{n}`.
pub fn numbered_payloads(n: usize) -> Vec<Vec<u8>> {
    (1..=n).map(|i| format!("e{i}").into_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        assert_ne!(unique_stream_name("s"), unique_stream_name("s"));
    }

    #[test]
    fn payloads_are_numbered_from_one() {
        assert_eq!(numbered_payloads(2), vec![b"e1".to_vec(), b"e2".to_vec()]);
    }

    #[test]
    fn tracing_init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
