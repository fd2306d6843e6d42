pub mod labels;
pub mod parse;
pub mod time;
pub mod types;

use std::sync::OnceLock;
use regex::Regex;

pub use labels::*;
pub use time::*;

pub static METRIC_NAME_LABEL: &str = "__name__";

static METRIC_NAME_RE: OnceLock<Regex> = OnceLock::new();
static LABEL_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn metric_name_regex() -> &'static Regex {
    METRIC_NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid metric name regex")
    })
}

fn label_name_regex() -> &'static Regex {
    LABEL_NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid label name regex")
    })
}

/// Metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_valid_metric_name(name: &str) -> bool {
    metric_name_regex().is_match(name)
}

/// Label names must match `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_valid_label_name(name: &str) -> bool {
    label_name_regex().is_match(name)
}
