//! Tracing/logging setup shared by every stockhold process.

/// Initialize process-wide logging with defaults (`info`, JSON).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&LogSettings::default());
}

/// Initialize process-wide logging with explicit settings.
pub fn init_with(settings: &LogSettings) {
    tracing::init(settings);
}

pub use self::tracing::LogSettings;

/// Subscriber configuration (filters, output format).
pub mod tracing;
