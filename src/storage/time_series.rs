use std::hash::Hash;

use crate::common::types::{Sample, Timestamp};
use crate::common::Labels;
use crate::storage::{AppendOutcome, DuplicatePolicy};

/// What to do with a sample that passed validation against the tail of its series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SampleAction {
    Append(f64),
    /// Same timestamp as the last sample; overwrite its value.
    Replace(f64),
    /// Exact duplicate of the last sample.
    Skip,
}

/// Decides whether a sample may follow `last` in a series. Samples must arrive in strictly
/// increasing timestamp order, except for a repeat of the last timestamp which is resolved by
/// `policy`. A bit-identical repeat is always accepted and ignored.
pub(crate) fn check_sample(
    last: Option<Sample>,
    ts: Timestamp,
    value: f64,
    policy: DuplicatePolicy,
) -> Result<SampleAction, AppendOutcome> {
    let Some(last) = last else {
        return Ok(SampleAction::Append(value));
    };
    if ts > last.timestamp {
        return Ok(SampleAction::Append(value));
    }
    if ts < last.timestamp {
        return Err(AppendOutcome::OutOfOrder);
    }
    if last.value.to_bits() == value.to_bits() {
        return Ok(SampleAction::Skip);
    }
    policy
        .value_on_duplicate(ts, last.value, value)
        .map(SampleAction::Replace)
        .map_err(|_| AppendOutcome::DuplicateSampleForTimestamp)
}

/// Represents a time series: a label set and its samples, sorted by timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    /// fixed internal id, derived from the label set
    pub id: u64,

    /// Full label set, including `__name__`.
    /// For example, given `http_requests_total{method="POST", status="500"}`
    /// the metric name is `http_requests_total`, and the labels are method="POST" and status="500"
    pub labels: Labels,

    pub duplicate_policy: DuplicatePolicy,
    pub samples: Vec<Sample>,

    // meta
    pub first_timestamp: Timestamp,
    pub last_timestamp: Timestamp,
    pub last_value: f64,
}

/// Hash based on the label set, which should be unique in the db
impl Hash for TimeSeries {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.labels.hash(state);
    }
}

impl TimeSeries {
    /// Create a new empty time series.
    pub fn new(labels: Labels, duplicate_policy: DuplicatePolicy) -> Self {
        TimeSeries {
            id: labels.fingerprint(),
            labels,
            duplicate_policy,
            samples: vec![],
            first_timestamp: 0,
            last_timestamp: 0,
            last_value: f64::NAN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn total_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn metric_name(&self) -> &str {
        self.labels.metric_name().unwrap_or_default()
    }

    /// Get the full metric name of the time series, including labels in Prometheus format.
    /// For example,
    ///
    /// `http_requests_total{method="POST",status="500"}`
    pub fn prometheus_metric_name(&self) -> String {
        self.labels.to_string()
    }

    pub fn last_sample(&self) -> Option<Sample> {
        self.samples.last().copied()
    }

    /// Appends a sample at the tail of the series, resolving a repeated timestamp with the
    /// series' duplicate policy.
    pub fn add(&mut self, ts: Timestamp, value: f64) -> AppendOutcome {
        match check_sample(self.last_sample(), ts, value, self.duplicate_policy) {
            Ok(SampleAction::Append(value)) | Ok(SampleAction::Replace(value)) => {
                self.apply(Sample::new(ts, value));
                AppendOutcome::Accepted
            }
            Ok(SampleAction::Skip) => AppendOutcome::Accepted,
            Err(outcome) => outcome,
        }
    }

    /// Writes an already resolved sample. A sample at the last timestamp overwrites it, older
    /// samples are refused.
    pub(crate) fn apply(&mut self, sample: Sample) -> bool {
        match self.samples.last_mut() {
            Some(last) if sample.timestamp < last.timestamp => return false,
            Some(last) if sample.timestamp == last.timestamp => last.value = sample.value,
            _ => {
                if self.samples.is_empty() {
                    self.first_timestamp = sample.timestamp;
                }
                self.samples.push(sample);
                self.last_timestamp = sample.timestamp;
            }
        }
        self.last_value = sample.value;
        true
    }

    /// Get the samples between given start and end time (both inclusive).
    pub fn get_range(&self, start_time: Timestamp, end_time: Timestamp) -> &[Sample] {
        if start_time > end_time {
            return &[];
        }
        let start = self.samples.partition_point(|s| s.timestamp < start_time);
        let end = self.samples.partition_point(|s| s.timestamp <= end_time);
        &self.samples[start..end]
    }

    pub fn overlaps(&self, start_ts: Timestamp, end_ts: Timestamp) -> bool {
        !self.is_empty() && self.last_timestamp >= start_ts && self.first_timestamp <= end_ts
    }

    /// Drops samples older than `min_timestamp`. Returns the number of samples removed.
    pub fn trim(&mut self, min_timestamp: Timestamp) -> usize {
        let count = self.samples.partition_point(|s| s.timestamp < min_timestamp);
        if count > 0 {
            let _ = self.samples.drain(0..count);
            match self.samples.first() {
                Some(first) => self.first_timestamp = first.timestamp,
                None => {
                    self.first_timestamp = 0;
                    self.last_timestamp = 0;
                    self.last_value = f64::NAN;
                }
            }
        }
        count
    }
}
