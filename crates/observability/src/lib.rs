//! Process-wide logging setup shared by the API and subscriber binaries.

/// Initialize process-wide tracing with the default filter (`info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_FILTER);
}

/// Initialize tracing and tag the process with a service name.
pub fn init_service(service: &'static str) {
    tracing::init(tracing::DEFAULT_FILTER);
    ::tracing::info!(service, "tracing initialised");
}

/// Tracing configuration (filters, layers).
pub mod tracing;
