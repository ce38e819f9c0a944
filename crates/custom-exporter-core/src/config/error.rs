//! Startup configuration errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::probe::BackendKind;

/// Errors detected while loading the configuration or building probes.
///
/// All of them are fatal: the exporter refuses to start serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("the metrics list is empty")]
    NoProbes,

    #[error("duplicate metric name '{0}' (names are compared case-insensitively)")]
    DuplicateProbe(String),

    #[error("metric '{probe}': credential '{credential}' not found")]
    UnknownCredential { probe: String, credential: String },

    #[error("credential '{credential}': unknown collector type '{tag}'")]
    UnknownCredentialType { credential: String, tag: String },

    #[error(
        "metric '{probe}': mismatching collector type: config type = {declared} & credential type = {credential}"
    )]
    BackendMismatch {
        probe: String,
        declared: BackendKind,
        credential: BackendKind,
    },

    #[error("metric '{0}': empty commands to run")]
    EmptyCommands(String),

    #[error("metric '{0}': value_name is required for redis collectors")]
    MissingValueField(String),

    #[error("metric '{probe}': cannot find a valid dsn: '{dsn}'")]
    InvalidDsn { probe: String, dsn: String },

    #[error("metric '{probe}': unsupported SQL driver '{driver}'")]
    UnsupportedDriver { probe: String, driver: String },

    #[error("metric '{probe}': invalid uri '{uri}': {reason}")]
    InvalidUri {
        probe: String,
        uri: String,
        reason: String,
    },

    #[error("metric '{probe}': cannot resolve system user '{user}'")]
    UnknownPrincipal { probe: String, user: String },

    #[error("metric '{probe}': label '{label}' appears more than once in mapping")]
    DuplicateLabel { probe: String, label: String },

    #[error("metric '{probe}': invalid timeout '{value}': {reason}")]
    InvalidTimeout {
        probe: String,
        value: String,
        reason: String,
    },

    #[error("metric '{probe}': {source}")]
    Metric {
        probe: String,
        #[source]
        source: prometheus::Error,
    },
}
