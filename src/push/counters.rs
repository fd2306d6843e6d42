use std::fmt::Display;

use crate::error::TsdbError;
use crate::storage::AppendOutcome;

/// Recoverable reasons for the store to refuse a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutOfOrder,
    DuplicateSampleForTimestamp,
    OutOfBounds,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::OutOfOrder => "Out of order sample",
            Rejection::DuplicateSampleForTimestamp => "Duplicate sample for timestamp",
            Rejection::OutOfBounds => "Out of bounds metric",
        }
    }

    /// Summary logged once per batch for all samples dropped for this reason.
    pub fn summary(&self) -> &'static str {
        match self {
            Rejection::OutOfOrder => "Error on ingesting out-of-order samples",
            Rejection::DuplicateSampleForTimestamp => {
                "Error on ingesting samples with different value but same timestamp"
            }
            Rejection::OutOfBounds => {
                "Error on ingesting samples that are too old or are too far into the future"
            }
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the batch proceeds after a sample has been appended.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Added,
    /// The sample was dropped, the batch goes on.
    Rejected(Rejection),
    /// The batch must stop and be rolled back.
    Fatal(TsdbError),
}

/// Per push tallies of append outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchCounters {
    /// samples handed to the store
    pub total: usize,
    pub added: usize,
    pub out_of_order: usize,
    pub duplicates: usize,
    pub out_of_bounds: usize,
}

impl BatchCounters {
    /// Counts one append outcome and classifies it.
    pub fn record(&mut self, outcome: AppendOutcome) -> Verdict {
        self.total += 1;
        match outcome {
            AppendOutcome::Accepted => {
                self.added += 1;
                Verdict::Added
            }
            AppendOutcome::OutOfOrder => {
                self.out_of_order += 1;
                Verdict::Rejected(Rejection::OutOfOrder)
            }
            AppendOutcome::DuplicateSampleForTimestamp => {
                self.duplicates += 1;
                Verdict::Rejected(Rejection::DuplicateSampleForTimestamp)
            }
            AppendOutcome::OutOfBounds => {
                self.out_of_bounds += 1;
                Verdict::Rejected(Rejection::OutOfBounds)
            }
            AppendOutcome::Failed(err) => Verdict::Fatal(err),
        }
    }

    pub fn rejected(&self) -> usize {
        self.out_of_order + self.duplicates + self.out_of_bounds
    }

    /// Dropped sample counts, skipping empty categories.
    pub fn dropped(&self) -> impl Iterator<Item = (Rejection, usize)> {
        [
            (Rejection::OutOfOrder, self.out_of_order),
            (Rejection::DuplicateSampleForTimestamp, self.duplicates),
            (Rejection::OutOfBounds, self.out_of_bounds),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
    }

    /// Logs one warning per non-empty rejection category. Returns the number of lines logged.
    pub fn report(&self) -> usize {
        let mut lines = 0;
        for (rejection, num_dropped) in self.dropped() {
            tracing::warn!(num_dropped, "{}", rejection.summary());
            lines += 1;
        }
        lines
    }
}
