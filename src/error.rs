use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
/// Enum for various errors raised while ingesting samples.
pub enum TsdbError {
    #[error("Parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("Invalid metric. {0}")]
    InvalidMetric(String),

    #[error("Invalid labels. {0}")]
    InvalidLabels(String),

    #[error("Series limit of {0} exceeded")]
    SeriesLimitExceeded(usize),

    #[error("Storage is closed")]
    StorageClosed,

    #[error("Invalid configuration. {0}")]
    InvalidConfiguration(String),

    #[error("Duplicate sample. {0}")]
    DuplicateSample(String),

    #[error("Invalid duration. {0}")]
    InvalidDuration(String),

    #[error("Invalid number. {0}")]
    InvalidNumber(String),

    #[error("{0}")]
    General(String),
}

impl TsdbError {
    pub(crate) fn parse(line: usize, msg: impl Into<String>) -> Self {
        TsdbError::Parse {
            line,
            msg: msg.into(),
        }
    }
}

pub type TsdbResult<T> = Result<T, TsdbError>;
