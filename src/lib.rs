//! Transactional ingestion of Prometheus text exposition payloads.
//!
//! A [`Pusher`] parses a payload with [`TextParser`] and appends every sample to a store
//! through one [`Appender`] transaction. Samples the store refuses as out of order, duplicate
//! or out of bounds are counted and dropped; any other failure, or malformed input, rolls the
//! whole batch back.
//!
//! ```
//! use prom_push::{Labels, Pusher, Storage};
//!
//! let storage = Storage::default();
//! let pusher = Pusher::new(storage.clone());
//!
//! let result = pusher.push(b"http_requests_total{code=\"200\"} 1027 1395066363000\n");
//! assert_eq!(result.into_result().unwrap(), (1, 1));
//!
//! let labels = Labels::from_pairs([("__name__", "http_requests_total"), ("code", "200")]);
//! assert_eq!(storage.samples(&labels).len(), 1);
//! ```

pub mod common;
pub mod config;
pub mod error;
pub mod push;
pub mod storage;
pub mod textparse;

#[cfg(test)]
mod tests;

pub use common::types::{Label, Sample, Timestamp};
pub use common::{Clock, Labels, ManualClock, SystemClock, METRIC_NAME_LABEL};
pub use config::Settings;
pub use error::{TsdbError, TsdbResult};
pub use push::{push_samples, BatchCounters, PushResult, Pusher};
pub use storage::{AppendOutcome, Appendable, Appender, DuplicatePolicy, Storage, StorageAppender};
pub use textparse::{SampleSource, TextParser};
