use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::common::types::{Sample, Timestamp};
use crate::common::Labels;
use crate::error::{TsdbError, TsdbResult};
use crate::storage::{AppendOutcome, Appendable, Appender};
use crate::textparse::SampleSource;

/// Everything a [`CollectResultStore`] observed across all the transactions it handed out.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub appenders_opened: usize,
    /// every append call, whatever its outcome
    pub appended: Vec<(Labels, Sample)>,
    pub commits: usize,
    pub rollbacks: usize,
}

impl Recorded {
    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.appended.iter().map(|(_, s)| s.timestamp).collect()
    }
}

#[derive(Debug, Default)]
struct State {
    recorded: Recorded,
    outcomes: VecDeque<AppendOutcome>,
}

/// Fake store recording what was pushed into it. Append outcomes can be scripted;
/// once the script runs out every sample is accepted.
#[derive(Debug, Default, Clone)]
pub struct CollectResultStore {
    state: Arc<Mutex<State>>,
    commit_error: Option<TsdbError>,
    rollback_error: Option<TsdbError>,
}

impl CollectResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = AppendOutcome>) -> Self {
        let store = Self::default();
        store.lock().outcomes.extend(outcomes);
        store
    }

    pub fn failing_commit(mut self, err: TsdbError) -> Self {
        self.commit_error = Some(err);
        self
    }

    pub fn failing_rollback(mut self, err: TsdbError) -> Self {
        self.rollback_error = Some(err);
        self
    }

    pub fn recorded(&self) -> Recorded {
        self.lock().recorded.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Appendable for CollectResultStore {
    type Appender = CollectResultAppender;

    fn appender(&self) -> CollectResultAppender {
        self.lock().recorded.appenders_opened += 1;
        CollectResultAppender {
            store: self.clone(),
        }
    }
}

pub struct CollectResultAppender {
    store: CollectResultStore,
}

impl Appender for CollectResultAppender {
    fn append(&mut self, labels: &Labels, timestamp: Timestamp, value: f64) -> AppendOutcome {
        let mut state = self.store.lock();
        state
            .recorded
            .appended
            .push((labels.clone(), Sample::new(timestamp, value)));
        state.outcomes.pop_front().unwrap_or(AppendOutcome::Accepted)
    }

    fn commit(self) -> TsdbResult<()> {
        self.store.lock().recorded.commits += 1;
        match &self.store.commit_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn rollback(self) -> TsdbResult<()> {
        self.store.lock().recorded.rollbacks += 1;
        match &self.store.rollback_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Yields `up 1` forever, then panics after `remaining` samples.
pub struct PanickingSource {
    pub remaining: usize,
}

impl SampleSource for PanickingSource {
    fn advance(&mut self) -> bool {
        if self.remaining == 0 {
            panic!("sample source exploded");
        }
        self.remaining -= 1;
        true
    }

    fn at(&self) -> (&[u8], Option<Timestamp>, f64) {
        (b"up", Some(1_000), 1.0)
    }

    fn metric(&self, labels: &mut Labels) {
        labels.clear();
        labels.insert("__name__", "up");
    }

    fn err(&self) -> Option<&TsdbError> {
        None
    }

    fn take_err(&mut self) -> Option<TsdbError> {
        None
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    Labels::from_pairs(pairs.iter().copied())
}
