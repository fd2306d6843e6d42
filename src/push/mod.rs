mod counters;

use scopeguard::{guard, ScopeGuard};
use tracing::debug;

use crate::common::types::Timestamp;
use crate::common::{Clock, Labels, SystemClock};
use crate::config::{Settings, DEFAULT_MAX_LOGGED_PAYLOAD_BYTES};
use crate::error::{TsdbError, TsdbResult};
use crate::storage::{Appendable, Appender};
use crate::textparse::{SampleSource, TextParser};

pub use counters::*;

/// Outcome of a push: how many samples were seen, how many made it into the store, and the
/// error that ended the batch, if any. Samples are only durable when `error` is `None`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PushResult {
    pub total: usize,
    pub added: usize,
    pub error: Option<TsdbError>,
}

impl PushResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Returns `(total, added)` or the terminal error.
    pub fn into_result(self) -> TsdbResult<(usize, usize)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.total, self.added)),
        }
    }
}

/// Ingests text exposition payloads into a transactional store, one transaction per push.
pub struct Pusher<A: Appendable, C: Clock = SystemClock> {
    store: A,
    clock: C,
    max_logged_payload_bytes: usize,
}

impl<A: Appendable> Pusher<A> {
    pub fn new(store: A) -> Self {
        Pusher::with_clock(store, SystemClock)
    }
}

impl<A: Appendable, C: Clock> Pusher<A, C> {
    pub fn with_clock(store: A, clock: C) -> Self {
        Pusher {
            store,
            clock,
            max_logged_payload_bytes: DEFAULT_MAX_LOGGED_PAYLOAD_BYTES,
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.max_logged_payload_bytes = settings.max_logged_payload_bytes;
        self
    }

    pub fn store(&self) -> &A {
        &self.store
    }

    /// Parses `data` and appends every sample in a single transaction.
    ///
    /// Out of order, duplicate and out of bounds samples are dropped and the rest of the batch
    /// is committed. Any other append failure, or malformed input, rolls the whole batch back.
    /// Samples without a timestamp are stamped with the time the push started.
    ///
    /// An empty payload is a no-op and does not open a transaction.
    pub fn push(&self, data: &[u8]) -> PushResult {
        if data.is_empty() {
            return PushResult::default();
        }

        let now = self.clock.now_millis();
        if tracing::enabled!(tracing::Level::DEBUG) {
            let shown = &data[..data.len().min(self.max_logged_payload_bytes)];
            debug!(
                data = %String::from_utf8_lossy(shown),
                len = data.len(),
                "Pushing data into storage"
            );
        }

        let mut parser = TextParser::new(data);
        push_samples(&mut parser, self.store.appender(), now)
    }
}

/// Drains `source` into `appender` and finalizes the transaction.
///
/// `default_timestamp` is used for every sample that carries no timestamp of its own.
/// The appender is committed if the source was consumed without a parse fault and no append
/// failed; otherwise it is rolled back and the first error is returned. Errors raised by the
/// rollback itself are discarded.
pub fn push_samples<S, A>(source: &mut S, appender: A, default_timestamp: Timestamp) -> PushResult
where
    S: SampleSource + ?Sized,
    A: Appender,
{
    let mut counters = BatchCounters::default();
    let mut error: Option<TsdbError> = None;

    // rolls back if anything below unwinds
    let mut app = guard(appender, |app| {
        tracing::warn!("Push interrupted, rolling back transaction");
        let _ = app.rollback();
    });

    let mut labels = Labels::new();
    while source.advance() {
        let (series, ts, value) = source.at();
        source.metric(&mut labels);
        let ts = ts.unwrap_or(default_timestamp);

        match counters.record(app.append(&labels, ts, value)) {
            Verdict::Added => {}
            Verdict::Rejected(rejection) => {
                debug!(series = %String::from_utf8_lossy(series), "{rejection}");
            }
            Verdict::Fatal(err) => {
                debug!(series = %String::from_utf8_lossy(series), error = %err, "Unexpected error");
                error = Some(err);
                break;
            }
        }
    }

    if error.is_none() {
        error = source.take_err();
    }
    counters.report();

    let app = ScopeGuard::into_inner(app);
    let BatchCounters { total, added, .. } = counters;

    if let Some(err) = error {
        if let Err(rollback_err) = app.rollback() {
            debug!(error = %rollback_err, "Rollback failed");
        }
        return PushResult {
            total,
            added,
            error: Some(err),
        };
    }

    PushResult {
        total,
        added,
        error: app.commit().err(),
    }
}
