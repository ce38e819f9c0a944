//! custom-exporter-core — probe execution and field mapping for the custom exporter.
//!
//! Provides:
//! - `probe` — immutable probe definitions (`ProbeSpec`, credentials, value kinds)
//! - `config` — YAML configuration loading and validation
//! - `collector` — mapper, backend adapters (shell, SQL, key-value), runner, supervisor
//! - `sink` — samples, the bounded sample queue, Prometheus metric families
//! - `exposition` — the explicit list of supervisors rendered as Prometheus text

pub mod collector;
pub mod config;
pub mod exposition;
pub mod probe;
pub mod sink;

/// Namespace prepended to every exported metric name.
pub const NAMESPACE: &str = "custom";

/// Crate version, shared by the binary's `--version` and the build_info metric.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git revision the crate was built from.
pub const GIT_SHA: &str = env!("GIT_SHA");
