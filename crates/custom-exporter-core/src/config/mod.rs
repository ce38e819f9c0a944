//! YAML configuration.
//!
//! The document declares named credentials and the metrics (probes) that use
//! them:
//!
//! ```yaml
//! credentials:
//!   - name: shell_root
//!     type: bash
//!     path: /opt/probes
//! metrics:
//!   - name: custom_metric_shell
//!     credential: shell_root
//!     commands: ["cat /opt/probes/animals.tsv"]
//!     mapping: [id, animal]
//!     separator: "\t"
//!     value_type: GAUGE
//! ```
//!
//! Loading resolves every credential reference and produces one immutable
//! [`ProbeSpec`] per metric. Backend-specific checks (DSN format, URI, system
//! user) run later, when the probe's backend is constructed.

mod error;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use prometheus::core::Desc;
use serde::Deserialize;
use tracing::debug;

use crate::probe::{BackendKind, Credential, ProbeSpec, ValueKind};

pub use error::ConfigError;

/// One entry of the `credentials` list.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialItem {
    pub name: String,
    #[serde(rename = "type")]
    pub collector: String,
    #[serde(default)]
    pub dsn: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub user: Option<String>,
}

/// One entry of the `metrics` list.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricItem {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<String>,
    pub credential: String,
    /// Optional backend kind; must agree with the credential's type when set.
    #[serde(default)]
    pub collector: Option<String>,
    #[serde(default)]
    pub mapping: Vec<String>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub value_name: Option<String>,
    #[serde(default)]
    pub value_type: String,
    /// Humantime duration (`500ms`, `5s`, `1m`).
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default = "default_reuse_connection")]
    pub reuse_connection: bool,
}

fn default_reuse_connection() -> bool {
    true
}

/// Raw configuration document as written in YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub credentials: Vec<CredentialItem>,
    #[serde(default)]
    pub metrics: Vec<MetricItem>,
}

/// Validated configuration: the probes to register, in document order.
#[derive(Debug, Clone)]
pub struct Config {
    pub probes: Vec<ProbeSpec>,
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = content.len(), "config file read");
        Self::from_yaml(&content)
    }

    /// Parses and validates a configuration document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument = serde_yaml::from_str(content)?;
        Self::from_document(document)
    }

    /// Resolves credential references and builds the probe list.
    pub fn from_document(document: ConfigDocument) -> Result<Self, ConfigError> {
        let credentials = resolve_credentials(&document.credentials)?;

        if document.metrics.is_empty() {
            return Err(ConfigError::NoProbes);
        }

        let mut seen = HashSet::new();
        let mut probes = Vec::with_capacity(document.metrics.len());
        for item in &document.metrics {
            if !seen.insert(item.name.to_lowercase()) {
                return Err(ConfigError::DuplicateProbe(item.name.clone()));
            }
            let credential = credentials.get(item.credential.as_str()).ok_or_else(|| {
                ConfigError::UnknownCredential {
                    probe: item.name.clone(),
                    credential: item.credential.clone(),
                }
            })?;
            probes.push(build_probe(item, credential)?);
        }

        Ok(Self { probes })
    }
}

fn resolve_credentials(items: &[CredentialItem]) -> Result<HashMap<&str, Credential>, ConfigError> {
    let mut result = HashMap::with_capacity(items.len());
    for item in items {
        let kind = BackendKind::from_tag(&item.collector).ok_or_else(|| {
            ConfigError::UnknownCredentialType {
                credential: item.name.clone(),
                tag: item.collector.clone(),
            }
        })?;
        let user = item
            .user
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        result.insert(
            item.name.as_str(),
            Credential {
                name: item.name.clone(),
                kind,
                tag: item.collector.clone(),
                dsn: item.dsn.clone(),
                uri: item.uri.clone(),
                path: item.path.clone(),
                user,
            },
        );
    }
    Ok(result)
}

fn build_probe(item: &MetricItem, credential: &Credential) -> Result<ProbeSpec, ConfigError> {
    let backend_kind = match item.collector.as_deref() {
        Some(tag) => BackendKind::from_tag(tag).ok_or_else(|| ConfigError::UnknownCredentialType {
            credential: item.credential.clone(),
            tag: tag.to_string(),
        })?,
        None => credential.kind,
    };

    let mut spec = ProbeSpec::new(&item.name, credential.clone())
        .with_commands(item.commands.iter().cloned())
        .with_label_fields(item.mapping.iter().map(|m| m.trim().to_string()))
        .with_value_kind(ValueKind::from_tag(&item.value_type))
        .with_reuse_connection(item.reuse_connection);
    spec.backend_kind = backend_kind;
    spec.separator = item.separator.clone();
    spec.value_field = item
        .value_name
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    if let Some(ref raw) = item.timeout {
        spec.timeout = Some(parse_timeout(&item.name, raw)?);
    }

    validate_probe(&spec)?;
    Ok(spec)
}

fn parse_timeout(probe: &str, raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTimeout {
        probe: probe.to_string(),
        value: raw.to_string(),
        reason,
    };
    let timeout = humantime::parse_duration(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if timeout.is_zero() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(timeout)
}

/// Checks the invariants shared by every backend kind.
///
/// Called again by each backend constructor, so specs built in code get the
/// same treatment as specs loaded from YAML.
pub fn validate_probe(spec: &ProbeSpec) -> Result<(), ConfigError> {
    if spec.backend_kind != spec.credential.kind {
        return Err(ConfigError::BackendMismatch {
            probe: spec.name.clone(),
            declared: spec.backend_kind,
            credential: spec.credential.kind,
        });
    }

    if spec.commands.iter().all(|c| c.trim().is_empty()) {
        return Err(ConfigError::EmptyCommands(spec.name.clone()));
    }

    if spec.backend_kind == BackendKind::KeyValue && spec.value_field.is_none() {
        return Err(ConfigError::MissingValueField(spec.name.clone()));
    }

    let mut labels = HashSet::with_capacity(spec.label_fields.len());
    if let Some(label) = spec.label_fields.iter().find(|l| !labels.insert(l.as_str())) {
        return Err(ConfigError::DuplicateLabel {
            probe: spec.name.clone(),
            label: label.clone(),
        });
    }

    // Metric and label names must be valid for the exposition.
    Desc::new(
        spec.metric_name(),
        spec.backend_kind.description().to_string(),
        spec.label_fields.clone(),
        HashMap::new(),
    )
    .map_err(|source| ConfigError::Metric {
        probe: spec.name.clone(),
        source,
    })?;

    Ok(())
}
