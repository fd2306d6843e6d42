use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

mod db;
pub mod time_series;

use crate::common::types::Timestamp;
use crate::common::Labels;
use crate::error::{TsdbError, TsdbResult};

pub use db::*;
pub use time_series::TimeSeries;

/// Result of appending a single sample to a transaction.
///
/// The rejection variants are expected under normal operation and leave the transaction usable.
/// `Failed` signals that the sample could not be handled at all.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Accepted,
    /// The sample is older than the latest sample of its series.
    OutOfOrder,
    /// A sample with the same timestamp but a different value already exists.
    DuplicateSampleForTimestamp,
    /// The sample falls outside the window the store currently accepts.
    OutOfBounds,
    Failed(TsdbError),
}

impl AppendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AppendOutcome::Accepted)
    }
}

/// A transactional write handle. Samples appended are only visible to readers once
/// the transaction is committed.
///
/// Exactly one of `commit` or `rollback` ends the transaction; both consume the appender.
pub trait Appender {
    fn append(&mut self, labels: &Labels, timestamp: Timestamp, value: f64) -> AppendOutcome;

    fn commit(self) -> TsdbResult<()>;

    fn rollback(self) -> TsdbResult<()>;
}

/// Anything able to open a fresh transaction.
pub trait Appendable {
    type Appender: Appender;

    fn appender(&self) -> Self::Appender;
}

impl<T: Appendable + ?Sized> Appendable for &T {
    type Appender = T::Appender;

    fn appender(&self) -> Self::Appender {
        (**self).appender()
    }
}

#[derive(Debug, Default, PartialEq, Deserialize, Serialize, Clone, Copy)]
pub enum DuplicatePolicy {
    /// ignore any newly reported value and reject the sample
    #[default]
    Block,
    /// ignore any newly reported value
    KeepFirst,
    /// overwrite the existing value with the new value
    KeepLast,
    /// only override if the value is lower than the existing value
    Min,
    /// only override if the value is higher than the existing value
    Max,
    /// append the new value to the existing value
    Sum,
}

impl Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl DuplicatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::Block => "block",
            DuplicatePolicy::KeepFirst => "first",
            DuplicatePolicy::KeepLast => "last",
            DuplicatePolicy::Min => "min",
            DuplicatePolicy::Max => "max",
            DuplicatePolicy::Sum => "sum",
        }
    }

    pub fn value_on_duplicate(self, ts: Timestamp, old: f64, new: f64) -> TsdbResult<f64> {
        use DuplicatePolicy::*;
        let has_nan = old.is_nan() || new.is_nan();
        if has_nan && self != Block {
            // take the valid sample regardless of policy
            let value = if new.is_nan() { old } else { new };
            return Ok(value);
        }
        Ok(match self {
            Block => {
                let msg = format!("{new} @ {ts}");
                return Err(TsdbError::DuplicateSample(msg));
            }
            KeepFirst => old,
            KeepLast => new,
            Min => old.min(new),
            Max => old.max(new),
            Sum => old + new,
        })
    }
}

impl FromStr for DuplicatePolicy {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use DuplicatePolicy::*;

        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Block),
            "first" | "keepfirst" | "keep_first" => Ok(KeepFirst),
            "last" | "keeplast" | "keep_last" => Ok(KeepLast),
            "min" => Ok(Min),
            "max" => Ok(Max),
            "sum" => Ok(Sum),
            _ => Err(TsdbError::InvalidConfiguration(format!(
                "invalid duplicate policy: {s}"
            ))),
        }
    }
}

impl TryFrom<&str> for DuplicatePolicy {
    type Error = TsdbError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        DuplicatePolicy::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TsdbError;
    use crate::storage::DuplicatePolicy;
    use std::str::FromStr;

    #[test]
    fn test_duplicate_policy_parse() {
        assert!(matches!(DuplicatePolicy::from_str("block"), Ok(DuplicatePolicy::Block)));
        assert!(matches!(DuplicatePolicy::from_str("last"), Ok(DuplicatePolicy::KeepLast)));
        assert!(matches!(DuplicatePolicy::from_str("keepLast"), Ok(DuplicatePolicy::KeepLast)));
        assert!(matches!(DuplicatePolicy::from_str("first"), Ok(DuplicatePolicy::KeepFirst)));
        assert!(matches!(DuplicatePolicy::from_str("KeEp_FIRst"), Ok(DuplicatePolicy::KeepFirst)));
        assert!(matches!(DuplicatePolicy::from_str("min"), Ok(DuplicatePolicy::Min)));
        assert!(matches!(DuplicatePolicy::from_str("max"), Ok(DuplicatePolicy::Max)));
        assert!(matches!(DuplicatePolicy::from_str("sum"), Ok(DuplicatePolicy::Sum)));
        assert!(matches!(
            DuplicatePolicy::from_str("avg"),
            Err(TsdbError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_duplicate_policy_display_roundtrips() {
        use DuplicatePolicy::*;
        for policy in [Block, KeepFirst, KeepLast, Min, Max, Sum] {
            assert_eq!(DuplicatePolicy::try_from(policy.as_str()).unwrap(), policy);
        }
    }

    #[test]
    fn test_duplicate_policy_handle_duplicate() {
        let ts = 0;
        let old = 1.0;
        let new = 2.0;

        assert!(matches!(
            DuplicatePolicy::Block.value_on_duplicate(ts, old, new),
            Err(TsdbError::DuplicateSample(_))
        ));
        assert_eq!(DuplicatePolicy::KeepFirst.value_on_duplicate(ts, old, new).unwrap(), old);
        assert_eq!(DuplicatePolicy::KeepLast.value_on_duplicate(ts, old, new).unwrap(), new);
        assert_eq!(DuplicatePolicy::Min.value_on_duplicate(ts, old, new).unwrap(), old);
        assert_eq!(DuplicatePolicy::Max.value_on_duplicate(ts, old, new).unwrap(), new);
        assert_eq!(DuplicatePolicy::Sum.value_on_duplicate(ts, old, new).unwrap(), old + new);
    }

    #[test]
    fn test_duplicate_policy_handle_nan() {
        use DuplicatePolicy::*;

        let ts = 0;
        assert!(matches!(
            Block.value_on_duplicate(ts, 1.0, f64::NAN),
            Err(TsdbError::DuplicateSample(_))
        ));

        let policies = [KeepFirst, KeepLast, Min, Max, Sum];
        for policy in policies {
            assert_eq!(policy.value_on_duplicate(ts, 10.0, f64::NAN).unwrap(), 10.0);
            assert_eq!(policy.value_on_duplicate(ts, f64::NAN, 8.0).unwrap(), 8.0);
        }
    }
}
