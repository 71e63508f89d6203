//! Tracing and logging setup shared by binaries and tests.

/// Subscriber initialization (filters, formatting).
pub mod tracing;

/// Initialize process-wide logging.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Human-readable logs captured by the test harness.
pub fn init_for_tests() {
    tracing::init_for_tests();
}
