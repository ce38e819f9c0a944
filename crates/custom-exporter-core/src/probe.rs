//! Probe definitions.
//!
//! A [`ProbeSpec`] is built once from the configuration document and stays
//! immutable for the lifetime of the process. Backends, runners and
//! supervisors borrow or clone it; nothing mutates it after startup.

use std::fmt;
use std::time::Duration;

use prometheus::proto::MetricType;

/// Shell field delimiter used when a probe sets none.
pub const DEFAULT_SEPARATOR: &str = "\t";

/// Backend a probe talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Chain of local processes.
    Shell,
    /// SQL database reached through a `<driver>://...` DSN.
    Sql,
    /// Redis-protocol key-value store.
    KeyValue,
}

impl BackendKind {
    /// Parses the `type` tag of a credential.
    ///
    /// Accepts the tags used by existing configuration files (`bash`, `mysql`,
    /// `redis`) as well as the generic names.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "shell" | "bash" => Some(Self::Shell),
            "sql" | "mysql" | "postgres" | "postgresql" => Some(Self::Sql),
            "redis" | "kv" | "keyvalue" => Some(Self::KeyValue),
            _ => None,
        }
    }

    /// Canonical tag, used in logs and as the `collector` label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Sql => "sql",
            Self::KeyValue => "redis",
        }
    }

    /// Help text of the probe's metric family.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Shell => "Metrics from shell collector in the custom exporter.",
            Self::Sql => "Metrics from sql collector in the custom exporter.",
            Self::KeyValue => "Metrics from redis collector in the custom exporter.",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the numeric sample is classified in the exposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    Counter,
    Gauge,
    #[default]
    Untyped,
}

impl ValueKind {
    /// `COUNTER` and `GAUGE` (any case) map to their kinds, everything else is untyped.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "COUNTER" => Self::Counter,
            "GAUGE" => Self::Gauge,
            _ => Self::Untyped,
        }
    }

    /// Type written to the exposition.
    ///
    /// `prometheus::TextEncoder` cannot encode untyped families, so untyped
    /// values go out as gauges.
    pub(crate) fn metric_type(&self) -> MetricType {
        match self {
            Self::Counter => MetricType::COUNTER,
            Self::Gauge | Self::Untyped => MetricType::GAUGE,
        }
    }
}

/// Named connection information shared by one or more probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    /// Backend kind declared by the credential's `type` tag.
    pub kind: BackendKind,
    /// Original `type` tag, exported to shell probes as `CREDENTIALS_COLLECTOR`
    /// and used as the `collector` label of the error counter.
    pub tag: String,
    pub dsn: String,
    pub uri: String,
    pub path: String,
    /// OS principal (user name or numeric uid) shell commands run as.
    pub user: Option<String>,
}

impl Credential {
    /// Creates a credential with only a name and a kind; other fields are empty.
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            kind,
            tag: kind.as_str().to_string(),
            dsn: String::new(),
            uri: String::new(),
            path: String::new(),
            user: None,
        }
    }

    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = dsn.into();
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Value of the `collector` label: the lowercased `type` tag, or the
    /// canonical kind name when the tag is blank.
    pub fn collector_label(&self) -> String {
        match self.tag.trim() {
            "" => self.kind.as_str().to_string(),
            tag => tag.to_ascii_lowercase(),
        }
    }
}

/// Declarative description of one probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSpec {
    pub name: String,
    pub backend_kind: BackendKind,
    pub credential: Credential,
    pub commands: Vec<String>,
    /// Label names, in row order (shell) or matched by name (SQL, key-value).
    pub label_fields: Vec<String>,
    /// Key holding the numeric value in key-value documents.
    pub value_field: Option<String>,
    /// Shell field delimiter. `None` means [`DEFAULT_SEPARATOR`].
    pub separator: Option<String>,
    pub value_kind: ValueKind,
    /// Deadline for one probe cycle's blocking I/O. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Keep SQL/key-value connections open between scrapes.
    pub reuse_connection: bool,
}

impl ProbeSpec {
    /// Creates a probe bound to `credential`, inheriting its backend kind.
    pub fn new(name: impl Into<String>, credential: Credential) -> Self {
        Self {
            name: name.into(),
            backend_kind: credential.kind,
            credential,
            commands: Vec::new(),
            label_fields: Vec::new(),
            value_field: None,
            separator: None,
            value_kind: ValueKind::Untyped,
            timeout: None,
            reuse_connection: true,
        }
    }

    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value_field(mut self, field: impl Into<String>) -> Self {
        self.value_field = Some(field.into());
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn with_value_kind(mut self, kind: ValueKind) -> Self {
        self.value_kind = kind;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_reuse_connection(mut self, reuse: bool) -> Self {
        self.reuse_connection = reuse;
        self
    }

    /// Fully-qualified metric name: `custom_<lowercased probe name>`.
    pub fn metric_name(&self) -> String {
        format!("{}_{}", crate::NAMESPACE, self.name.to_lowercase())
    }

    /// Configured separator, or a tab when unset or empty.
    pub fn effective_separator(&self) -> &str {
        self.separator
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SEPARATOR)
    }
}
