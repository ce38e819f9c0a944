//! Samples and where they go.
//!
//! A runner hands every sample to a [`SampleQueue`] with a non-blocking push.
//! When the queue is full the sample is dropped and the caller is told so;
//! emission never waits on the consumer. After the run the queue is drained
//! into one Prometheus metric family per probe.

use std::collections::HashSet;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType};
use tracing::{debug, warn};

use crate::probe::ProbeSpec;

/// Default bound of one probe's per-scrape queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// One labeled value. `label_names` and `label_values` have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub label_names: Vec<String>,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl Sample {
    pub fn new(label_names: &[String], label_values: Vec<String>, value: f64) -> Self {
        debug_assert_eq!(label_names.len(), label_values.len());
        Self {
            label_names: label_names.to_vec(),
            label_values,
            value,
        }
    }

    /// Label pairs sorted by name.
    fn label_pairs(&self) -> Vec<LabelPair> {
        let mut pairs: Vec<LabelPair> = self
            .label_names
            .iter()
            .zip(&self.label_values)
            .map(|(name, value)| {
                let mut pair = LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                pair
            })
            .collect();
        pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        pairs
    }
}

/// Bounded, drop-on-full sample queue.
pub struct SampleQueue {
    tx: Sender<Sample>,
    rx: Receiver<Sample>,
    capacity: usize,
}

impl SampleQueue {
    /// Creates a queue holding at most `capacity` samples (at least one).
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Pushes without blocking. Returns `false` when the sample was dropped.
    pub fn offer(&self, sample: Sample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(sample)) => {
                warn!(capacity = self.capacity, labels = ?sample.label_values, "sample queue full, dropping sample");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Takes every queued sample, oldest first.
    pub fn drain(&self) -> Vec<Sample> {
        self.rx.try_iter().collect()
    }
}

/// Builds the probe's metric family. `None` when there is nothing to expose.
///
/// A label set seen twice keeps its first value.
pub fn sample_family(spec: &ProbeSpec, samples: &[Sample]) -> Option<MetricFamily> {
    if samples.is_empty() {
        return None;
    }

    let kind = spec.value_kind.metric_type();
    let mut seen = HashSet::with_capacity(samples.len());
    let mut metrics = Vec::with_capacity(samples.len());
    for sample in samples {
        if !seen.insert(sample.label_values.as_slice()) {
            debug!(probe = %spec.name, labels = ?sample.label_values, "duplicate label set skipped");
            continue;
        }
        let mut metric = Metric::default();
        metric.set_label(sample.label_pairs().into());
        set_value(&mut metric, kind, sample.value);
        metrics.push(metric);
    }

    let mut family = MetricFamily::default();
    family.set_name(spec.metric_name());
    family.set_help(spec.backend_kind.description().to_string());
    family.set_field_type(kind);
    family.set_metric(metrics.into());
    Some(family)
}

/// Stores `value` as a counter for `COUNTER` and as a gauge otherwise.
fn set_value(metric: &mut Metric, kind: MetricType, value: f64) {
    if kind == MetricType::COUNTER {
        let mut counter = proto::Counter::default();
        counter.set_value(value);
        metric.set_counter(counter);
    } else {
        let mut gauge = proto::Gauge::default();
        gauge.set_value(value);
        metric.set_gauge(gauge);
    }
}

/// `custom_exporter_build_info{version, revision} 1`.
pub fn build_info_family() -> MetricFamily {
    let mut metric = Metric::default();
    let labels: Vec<LabelPair> = [("revision", crate::GIT_SHA), ("version", crate::VERSION)]
        .into_iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.to_string());
            pair.set_value(value.to_string());
            pair
        })
        .collect();
    metric.set_label(labels.into());
    set_value(&mut metric, MetricType::GAUGE, 1.0);

    let mut family = MetricFamily::default();
    family.set_name(format!("{}_exporter_build_info", crate::NAMESPACE));
    family.set_help("A metric with a constant '1' value labeled by version and revision.".to_string());
    family.set_field_type(MetricType::GAUGE);
    family.set_metric(vec![metric].into());
    family
}
