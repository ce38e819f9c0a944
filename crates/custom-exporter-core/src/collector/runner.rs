//! One probe cycle: connect, execute, map, emit.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::backend::{Backend, BackendError, RawOutput};
use super::kv::map_document;
use super::mapper::{MappedRow, map_text};
use super::sql::scan_rows;
use crate::config::ConfigError;
use crate::probe::ProbeSpec;
use crate::sink::{Sample, SampleQueue};

/// Where a runner is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Executing,
    Mapping,
    Emitting,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::Executing => "executing",
            Phase::Mapping => "mapping",
            Phase::Emitting => "emitting",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A cycle that produced no samples.
#[derive(Debug, Error)]
#[error("probe '{probe}' failed while {phase}: {source}")]
pub struct ProbeError {
    pub probe: String,
    pub phase: Phase,
    #[source]
    pub source: BackendError,
}

/// Outcome of a cycle that reached the emitting phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Samples accepted by the queue.
    pub emitted: usize,
    /// Samples dropped because the queue was full.
    pub dropped: usize,
    /// SQL rows skipped because their value could not be scanned.
    pub row_errors: usize,
}

impl RunReport {
    /// A cycle with skipped rows still counts as a failed scrape.
    pub fn is_clean(&self) -> bool {
        self.row_errors == 0
    }
}

/// Rows mapped from one backend output, plus the number of rows that failed.
pub(crate) struct Mapped {
    pub rows: Vec<MappedRow>,
    pub row_errors: usize,
}

/// Maps raw backend output according to the probe's schema.
///
/// Shell and SQL rows fail one at a time; a key-value document that cannot
/// be mapped fails the whole cycle.
pub(crate) fn map_output(spec: &ProbeSpec, output: &RawOutput) -> Result<Mapped, BackendError> {
    match output {
        RawOutput::Text(text) => Ok(Mapped {
            rows: map_text(text, spec.effective_separator(), &spec.label_fields),
            row_errors: 0,
        }),
        RawOutput::Table(set) => {
            let (rows, errors) = scan_rows(set, &spec.label_fields);
            for (row, error) in &errors {
                warn!(probe = %spec.name, row, %error, "skipping row");
            }
            Ok(Mapped {
                rows,
                row_errors: errors.len(),
            })
        }
        RawOutput::Document(doc) => {
            let value_field = spec.value_field.as_deref().unwrap_or_default();
            let row = map_document(doc, &spec.label_fields, value_field)?;
            Ok(Mapped {
                rows: vec![row],
                row_errors: 0,
            })
        }
    }
}

/// Owns a probe's backend and runs its cycles.
pub struct ProbeRunner {
    spec: ProbeSpec,
    backend: Backend,
    phase: Phase,
}

impl ProbeRunner {
    pub fn new(spec: ProbeSpec, backend: Backend) -> Self {
        Self {
            spec,
            backend,
            phase: Phase::Idle,
        }
    }

    /// Builds the backend for `spec` and wraps it.
    pub fn from_spec(spec: ProbeSpec) -> Result<Self, ConfigError> {
        let backend = Backend::for_probe(&spec)?;
        Ok(Self::new(spec, backend))
    }

    pub fn spec(&self) -> &ProbeSpec {
        &self.spec
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs one cycle, pushing every sample into `queue`.
    pub fn run(&mut self, queue: &SampleQueue) -> Result<RunReport, ProbeError> {
        let result = self.cycle(queue);
        self.backend.finish();
        match result {
            Ok(report) => {
                self.phase = Phase::Idle;
                Ok(report)
            }
            Err(source) => {
                let error = ProbeError {
                    probe: self.spec.name.clone(),
                    phase: self.phase,
                    source,
                };
                self.phase = Phase::Failed;
                Err(error)
            }
        }
    }

    fn cycle(&mut self, queue: &SampleQueue) -> Result<RunReport, BackendError> {
        self.phase = Phase::Connecting;
        self.backend.connect()?;

        self.phase = Phase::Executing;
        let output = self.backend.execute(&self.spec)?;

        self.phase = Phase::Mapping;
        let mapped = map_output(&self.spec, &output)?;

        self.phase = Phase::Emitting;
        let mut report = RunReport {
            row_errors: mapped.row_errors,
            ..RunReport::default()
        };
        for row in mapped.rows {
            let sample = Sample::new(&self.spec.label_fields, row.label_values, row.value);
            if queue.offer(sample) {
                report.emitted += 1;
            } else {
                report.dropped += 1;
            }
        }

        debug!(
            probe = %self.spec.name,
            emitted = report.emitted,
            dropped = report.dropped,
            row_errors = report.row_errors,
            "probe cycle finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::kv::{KvError, parse_document};
    use crate::collector::mock::FakeKvServer;
    use crate::collector::sql::ResultSet;
    use crate::probe::{BackendKind, Credential};

    fn shell_spec(commands: &[&str]) -> ProbeSpec {
        ProbeSpec::new("custom_metric_shell", Credential::new("shell_root", BackendKind::Shell))
            .with_commands(commands.iter().copied())
            .with_label_fields(["id", "animal"])
            .with_separator(",")
    }

    fn kv_spec(uri: &str, value_field: &str) -> ProbeSpec {
        ProbeSpec::new(
            "custom_metric_redis",
            Credential::new("redis_connector", BackendKind::KeyValue).with_uri(uri),
        )
        .with_commands(["GET probe"])
        .with_label_fields(["role"])
        .with_value_field(value_field)
    }

    #[cfg(unix)]
    #[test]
    fn shell_cycle_emits_one_sample_per_row() {
        let mut runner = ProbeRunner::from_spec(shell_spec(&[
            "printf ,1,chicken,128,\\n2,beef,256\\nshort\\n",
        ]))
        .unwrap();
        let queue = SampleQueue::bounded(16);
        let report = runner.run(&queue).unwrap();

        assert_eq!(report, RunReport { emitted: 2, dropped: 0, row_errors: 0 });
        assert_eq!(runner.phase(), Phase::Idle);
        let samples = queue.drain();
        assert_eq!(samples[0].label_names, ["id", "animal"]);
        assert_eq!(samples[0].label_values, ["1", "chicken"]);
        assert_eq!(samples[1].value, 256.0);
    }

    #[cfg(unix)]
    #[test]
    fn full_queue_drops_are_reported() {
        let mut runner =
            ProbeRunner::from_spec(shell_spec(&["printf 1,a,1\\n2,b,2\\n3,c,3\\n"])).unwrap();
        let queue = SampleQueue::bounded(2);
        let report = runner.run(&queue).unwrap();
        assert_eq!(report.emitted, 2);
        assert_eq!(report.dropped, 1);
    }

    #[cfg(unix)]
    #[test]
    fn failed_command_emits_nothing() {
        let mut runner =
            ProbeRunner::from_spec(shell_spec(&["printf 1,a,1\\n", "false", "cat"])).unwrap();
        let queue = SampleQueue::bounded(16);
        let err = runner.run(&queue).unwrap_err();
        assert_eq!(err.phase, Phase::Executing);
        assert_eq!(runner.phase(), Phase::Failed);
        assert!(queue.is_empty());
        assert!(err.to_string().contains("command #2"));
    }

    #[test]
    fn table_output_skips_bad_rows() {
        let spec = ProbeSpec::new(
            "custom_metric_mysql",
            Credential::new("db", BackendKind::Sql).with_dsn("mysql://u@localhost/db"),
        )
        .with_commands(["SELECT id, animal, weight FROM farm"])
        .with_label_fields(["id", "animal"]);
        let cell = |s: &str| Some(s.to_string());
        let set = ResultSet::new(
            vec!["id".into(), "animal".into(), "weight".into()],
            vec![
                vec![cell("1"), cell("chicken"), cell("128")],
                vec![cell("2"), cell("beef"), cell("lots")],
                vec![cell("3"), cell("snails"), cell("14")],
            ],
        );
        let mapped = map_output(&spec, &RawOutput::Table(set)).unwrap();
        assert_eq!(mapped.row_errors, 1);
        let values: Vec<f64> = mapped.rows.iter().map(|r| r.value).collect();
        assert_eq!(values, [128.0, 14.0]);
    }

    #[test]
    fn document_without_value_fails_mapping() {
        let spec = kv_spec("redis://localhost", "value");
        let doc = parse_document(r#"{"role":"master"}"#).unwrap();
        let err = map_output(&spec, &RawOutput::Document(doc)).err().unwrap();
        assert!(matches!(err, BackendError::KeyValue(KvError::MissingValue(_))));
    }

    #[test]
    fn key_value_cycle_emits_exactly_one_sample() {
        let server = FakeKvServer::start(r#"{"value":"14.258","role":"master"}"#);
        let mut runner = ProbeRunner::from_spec(kv_spec(&server.uri(), "value")).unwrap();
        let queue = SampleQueue::bounded(16);
        let report = runner.run(&queue).unwrap();
        assert_eq!(report.emitted, 1);

        let samples = queue.drain();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label_values, ["master"]);
        assert_eq!(samples[0].value, 14.258);
    }

    #[test]
    fn key_value_missing_field_fails_in_mapping() {
        let server = FakeKvServer::start(r#"{"role":"master"}"#);
        let mut runner = ProbeRunner::from_spec(kv_spec(&server.uri(), "value")).unwrap();
        let queue = SampleQueue::bounded(16);
        let err = runner.run(&queue).unwrap_err();
        assert_eq!(err.phase, Phase::Mapping);
        assert!(queue.is_empty());
    }

    #[test]
    fn unreachable_backend_fails_while_connecting() {
        let spec = kv_spec("redis://127.0.0.1:1/0", "value")
            .with_timeout(std::time::Duration::from_secs(2));
        let mut runner = ProbeRunner::from_spec(spec).unwrap();
        let err = runner.run(&SampleQueue::bounded(4)).unwrap_err();
        assert_eq!(err.phase, Phase::Connecting);
    }
}
