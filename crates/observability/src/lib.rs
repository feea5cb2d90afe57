//! Tracing and logging setup shared by the cardiovar binaries.

/// Initialize process-wide structured logging (JSON lines).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize human-readable logging on stderr (interactive use).
///
/// Same filter rules as [`init`]; safe to call multiple times.
pub fn init_pretty() {
    tracing::init_pretty();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
