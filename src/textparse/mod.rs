use std::fmt::Display;
use std::str::FromStr;

mod text_parser;

use crate::common::types::Timestamp;
use crate::common::Labels;
use crate::error::{TsdbError, TsdbResult};

pub use text_parser::TextParser;

/// A single pass, forward only stream of parsed samples.
///
/// Callers loop on `advance()` and inspect the current sample with `at()` and `metric()`.
/// Once `advance()` returns `false`, `err()` tells a clean end of input from a parse fault.
pub trait SampleSource {
    /// Moves to the next sample. Returns `false` at end of input or on a parse fault.
    fn advance(&mut self) -> bool;

    /// Raw series text, explicit timestamp if any, and value of the current sample.
    fn at(&self) -> (&[u8], Option<Timestamp>, f64);

    /// Writes the label set of the current sample, including the metric name, into `labels`.
    fn metric(&self, labels: &mut Labels);

    fn err(&self) -> Option<&TsdbError>;

    fn take_err(&mut self) -> Option<TsdbError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    #[default]
    Untyped,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::Untyped => "untyped",
        }
    }
}

impl Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = TsdbError;

    fn from_str(s: &str) -> TsdbResult<Self> {
        match s {
            "counter" => Ok(MetricType::Counter),
            "gauge" => Ok(MetricType::Gauge),
            "histogram" => Ok(MetricType::Histogram),
            "summary" => Ok(MetricType::Summary),
            "untyped" => Ok(MetricType::Untyped),
            _ => Err(TsdbError::General(format!("invalid metric type {s:?}"))),
        }
    }
}
