use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use ahash::AHashMap;

use crate::common::types::{Sample, Timestamp};
use crate::common::{is_valid_label_name, is_valid_metric_name, Labels};
use crate::config::Settings;
use crate::error::{TsdbError, TsdbResult};
use crate::storage::time_series::{check_sample, SampleAction};
use crate::storage::{AppendOutcome, Appendable, Appender, DuplicatePolicy, TimeSeries};

#[derive(Debug, Clone)]
struct StorageOptions {
    retention: Option<Duration>,
    duplicate_policy: DuplicatePolicy,
    max_series_limit: usize,
}

impl From<&Settings> for StorageOptions {
    fn from(settings: &Settings) -> Self {
        StorageOptions {
            retention: settings.retention.filter(|r| !r.is_zero()),
            duplicate_policy: settings.duplicate_policy,
            max_series_limit: settings.max_series_limit,
        }
    }
}

#[derive(Debug, Default)]
struct StorageInner {
    series: AHashMap<Labels, TimeSeries>,
    /// highest committed timestamp across all series
    max_time: Option<Timestamp>,
    closed: bool,
}

impl StorageInner {
    fn min_valid_time(&self, retention: Option<Duration>) -> Option<Timestamp> {
        let retention = retention?;
        let max_time = self.max_time?;
        let retention = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        Some(max_time.saturating_sub(retention))
    }
}

/// In-memory time series store. Cloning yields another handle to the same data.
#[derive(Debug, Clone)]
pub struct Storage {
    inner: Arc<RwLock<StorageInner>>,
    options: Arc<StorageOptions>,
}

impl Default for Storage {
    fn default() -> Self {
        Storage::new(&Settings::default())
    }
}

impl Storage {
    pub fn new(settings: &Settings) -> Self {
        Storage {
            inner: Arc::new(RwLock::new(StorageInner::default())),
            options: Arc::new(StorageOptions::from(settings)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StorageInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StorageInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn series_count(&self) -> usize {
        self.read().series.len()
    }

    pub fn max_time(&self) -> Option<Timestamp> {
        self.read().max_time
    }

    /// Returns all committed samples of the series with exactly the given labels.
    pub fn samples(&self, labels: &Labels) -> Vec<Sample> {
        self.read()
            .series
            .get(labels)
            .map(|s| s.samples.clone())
            .unwrap_or_default()
    }

    pub fn range(&self, labels: &Labels, start: Timestamp, end: Timestamp) -> Vec<Sample> {
        self.read()
            .series
            .get(labels)
            .map(|s| s.get_range(start, end).to_vec())
            .unwrap_or_default()
    }

    pub fn total_samples(&self) -> usize {
        self.read().series.values().map(|s| s.total_samples()).sum()
    }

    /// Rejects all further commits. Open transactions fail on commit.
    pub fn close(&self) {
        self.write().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }
}

impl Appendable for Storage {
    type Appender = StorageAppender;

    fn appender(&self) -> StorageAppender {
        StorageAppender {
            storage: self.clone(),
            pending: AHashMap::new(),
            new_series: 0,
        }
    }
}

#[derive(Debug)]
struct PendingSeries {
    samples: Vec<Sample>,
    committed_last: Option<Sample>,
}

impl PendingSeries {
    fn last(&self) -> Option<Sample> {
        self.samples.last().copied().or(self.committed_last)
    }
}

fn same_sample(a: Option<Sample>, b: Option<Sample>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.timestamp == b.timestamp && a.value.to_bits() == b.value.to_bits(),
        (None, None) => true,
        _ => false,
    }
}

/// A transaction against [`Storage`]. Samples are buffered per series and validated against
/// both committed data and what was already appended in this transaction.
#[derive(Debug)]
pub struct StorageAppender {
    storage: Storage,
    pending: AHashMap<Labels, PendingSeries>,
    new_series: usize,
}

impl StorageAppender {
    pub fn pending_samples(&self) -> usize {
        self.pending.values().map(|p| p.samples.len()).sum()
    }

    fn validate_labels(labels: &Labels) -> TsdbResult<()> {
        if labels.is_empty() {
            return Err(TsdbError::InvalidLabels("empty label set".to_string()));
        }
        match labels.metric_name() {
            None => {
                return Err(TsdbError::InvalidMetric(format!(
                    "missing metric name in {labels}"
                )))
            }
            Some(name) if !is_valid_metric_name(name) => {
                return Err(TsdbError::InvalidMetric(format!("invalid metric name {name:?}")))
            }
            _ => {}
        }
        if let Some(name) = labels.duplicate_name() {
            return Err(TsdbError::InvalidLabels(format!(
                "label name {name:?} is not unique"
            )));
        }
        if let Some(label) = labels.iter().find(|l| !is_valid_label_name(&l.name)) {
            return Err(TsdbError::InvalidLabels(format!(
                "invalid label name {:?}",
                label.name
            )));
        }
        Ok(())
    }
}

impl Appender for StorageAppender {
    fn append(&mut self, labels: &Labels, timestamp: Timestamp, value: f64) -> AppendOutcome {
        if let Err(err) = Self::validate_labels(labels) {
            return AppendOutcome::Failed(err);
        }

        let options = Arc::clone(&self.storage.options);
        let (committed_last, min_valid_time, is_new, series_count) = {
            let inner = self.storage.read();
            let series = inner.series.get(labels);
            (
                series.and_then(|s| s.last_sample()),
                inner.min_valid_time(options.retention),
                series.is_none(),
                inner.series.len(),
            )
        };

        if is_new && !self.pending.contains_key(labels) {
            let limit = options.max_series_limit;
            if limit > 0 && series_count + self.new_series >= limit {
                return AppendOutcome::Failed(TsdbError::SeriesLimitExceeded(limit));
            }
        }

        if let Some(min_valid_time) = min_valid_time {
            if timestamp < min_valid_time {
                return AppendOutcome::OutOfBounds;
            }
        }

        let last = match self.pending.get(labels) {
            Some(pending) => pending.last(),
            None => committed_last,
        };

        match check_sample(last, timestamp, value, options.duplicate_policy) {
            Ok(SampleAction::Append(value)) => {
                let pending = self.pending.entry(labels.clone()).or_insert_with(|| {
                    if is_new {
                        self.new_series += 1;
                    }
                    PendingSeries {
                        samples: Vec::new(),
                        committed_last,
                    }
                });
                pending.samples.push(Sample::new(timestamp, value));
                AppendOutcome::Accepted
            }
            Ok(SampleAction::Replace(value)) => {
                let pending = self.pending.entry(labels.clone()).or_insert_with(|| PendingSeries {
                    samples: Vec::new(),
                    committed_last,
                });
                match pending.samples.last_mut() {
                    Some(last) if last.timestamp == timestamp => last.value = value,
                    _ => pending.samples.push(Sample::new(timestamp, value)),
                }
                AppendOutcome::Accepted
            }
            Ok(SampleAction::Skip) => AppendOutcome::Accepted,
            Err(outcome) => outcome,
        }
    }

    fn commit(self) -> TsdbResult<()> {
        let StorageAppender {
            storage, pending, ..
        } = self;
        let options = &storage.options;
        let mut inner = storage.write();
        if inner.closed {
            return Err(TsdbError::StorageClosed);
        }

        // other transactions may have created series since ours were counted
        let limit = options.max_series_limit;
        if limit > 0 {
            let created = pending
                .keys()
                .filter(|labels| !inner.series.contains_key(*labels))
                .count();
            if created > 0 && inner.series.len() + created > limit {
                return Err(TsdbError::SeriesLimitExceeded(limit));
            }
        }

        let prev_max_time = inner.max_time;
        let mut max_time = prev_max_time;
        let mut dropped = 0usize;
        let mut touched = Vec::with_capacity(pending.len());
        for (labels, pending) in pending {
            let series = inner
                .series
                .entry(labels.clone())
                .or_insert_with(|| TimeSeries::new(labels.clone(), options.duplicate_policy));

            // the tail moved under us: a concurrent commit wrote to this series
            let revalidate = !same_sample(series.last_sample(), pending.committed_last);
            for sample in pending.samples {
                let sample = if revalidate {
                    let last = series.last_sample();
                    match check_sample(last, sample.timestamp, sample.value, series.duplicate_policy) {
                        Ok(SampleAction::Append(value)) | Ok(SampleAction::Replace(value)) => {
                            Sample::new(sample.timestamp, value)
                        }
                        Ok(SampleAction::Skip) => continue,
                        Err(_) => {
                            dropped += 1;
                            continue;
                        }
                    }
                } else {
                    sample
                };
                if series.apply(sample) {
                    max_time = Some(max_time.map_or(sample.timestamp, |t| t.max(sample.timestamp)));
                } else {
                    dropped += 1;
                }
            }
            touched.push(labels);
        }
        if dropped > 0 {
            tracing::debug!(num_dropped = dropped, "Dropped samples conflicting with concurrent commits");
        }
        inner.max_time = max_time;

        match inner.min_valid_time(options.retention) {
            Some(min_valid_time) if max_time != prev_max_time => {
                inner.series.retain(|_, series| {
                    series.trim(min_valid_time);
                    !series.is_empty()
                });
            }
            min_valid_time => {
                for labels in touched {
                    let emptied = match inner.series.get_mut(&labels) {
                        Some(series) => {
                            if let Some(min_valid_time) = min_valid_time {
                                series.trim(min_valid_time);
                            }
                            series.is_empty()
                        }
                        None => false,
                    };
                    if emptied {
                        inner.series.remove(&labels);
                    }
                }
            }
        }
        Ok(())
    }

    fn rollback(self) -> TsdbResult<()> {
        if self.storage.is_closed() {
            return Err(TsdbError::StorageClosed);
        }
        Ok(())
    }
}
