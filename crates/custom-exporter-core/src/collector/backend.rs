//! Backend dispatch.

use thiserror::Error;

use super::kv::{Document, KvBackend, KvError};
use super::shell::{ShellBackend, ShellError};
use super::sql::{ResultSet, SqlBackend, SqlError};
use crate::config::ConfigError;
use crate::probe::{BackendKind, ProbeSpec};

/// What a backend produced for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// Shell stdout, split into rows by the mapper.
    Text(String),
    /// Rows of the last SQL query.
    Table(ResultSet),
    /// The last key-value reply, flattened.
    Document(Document),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error(transparent)]
    Sql(#[from] SqlError),
    #[error(transparent)]
    KeyValue(#[from] KvError),
}

/// A probe's backend adapter.
pub enum Backend {
    Shell(ShellBackend),
    Sql(SqlBackend),
    KeyValue(KvBackend),
}

impl Backend {
    /// Builds the adapter matching the probe's backend kind. Configuration
    /// problems (DSN, URI, system user) surface here, before serving.
    pub fn for_probe(spec: &ProbeSpec) -> Result<Self, ConfigError> {
        Ok(match spec.backend_kind {
            BackendKind::Shell => Backend::Shell(ShellBackend::new(spec)?),
            BackendKind::Sql => Backend::Sql(SqlBackend::new(spec)?),
            BackendKind::KeyValue => Backend::KeyValue(KvBackend::new(spec)?),
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Shell(_) => BackendKind::Shell,
            Backend::Sql(_) => BackendKind::Sql,
            Backend::KeyValue(_) => BackendKind::KeyValue,
        }
    }

    /// Makes sure a live connection exists. Shell probes have nothing to connect.
    pub fn connect(&mut self) -> Result<(), BackendError> {
        match self {
            Backend::Shell(_) => Ok(()),
            Backend::Sql(b) => Ok(b.connect()?),
            Backend::KeyValue(b) => Ok(b.connect()?),
        }
    }

    pub fn execute(&mut self, spec: &ProbeSpec) -> Result<RawOutput, BackendError> {
        match self {
            Backend::Shell(b) => Ok(RawOutput::Text(b.execute(spec)?)),
            Backend::Sql(b) => Ok(RawOutput::Table(b.execute(spec)?)),
            Backend::KeyValue(b) => Ok(RawOutput::Document(b.execute(spec)?)),
        }
    }

    /// Releases per-run resources.
    pub fn finish(&mut self) {
        match self {
            Backend::Shell(_) => {}
            Backend::Sql(b) => b.finish(),
            Backend::KeyValue(b) => b.finish(),
        }
    }
}
