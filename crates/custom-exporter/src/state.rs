//! Shared application state and the global allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use custom_exporter_core::exposition::Exporter;

pub(crate) struct WebState {
    pub(crate) exporter: Exporter,
    /// Normalized path the exposition is served on (always starts with `/`).
    pub(crate) telemetry_path: String,
}

pub(crate) type AppState = Arc<WebState>;

impl WebState {
    pub(crate) fn new(exporter: Exporter, telemetry_path: &str) -> AppState {
        Arc::new(Self {
            exporter,
            telemetry_path: normalize_path(telemetry_path),
        })
    }
}

/// Ensures a leading slash and strips trailing ones (`metrics/` → `/metrics`).
pub(crate) fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
