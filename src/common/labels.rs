// Copyright 2017 The Prometheus Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use enquote::enquote;
use smallvec::SmallVec;
use xxhash_rust::xxh3::Xxh3;

use super::types::Label;
use super::METRIC_NAME_LABEL;

const SEP: u8 = b'\xff';

/// Labels is a set of labels sorted by name. Most series carry only a handful of labels, so
/// they are kept inline.
///
/// Names are expected to be unique. Inserting an already present name keeps both entries
/// adjacent so that callers can detect the collision with [`Labels::has_duplicate_names`].
#[derive(Clone, Debug, Default)]
pub struct Labels(SmallVec<Label, 8>);

impl Labels {
    pub fn new() -> Self {
        Labels(SmallVec::new())
    }

    pub fn from_pairs<N, V, I>(pairs: I) -> Self
    where
        N: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (N, V)>,
    {
        let mut labels = Labels::new();
        for (name, value) in pairs {
            labels.insert(name, value);
        }
        labels
    }

    /// Inserts a label keeping the set sorted by name.
    pub fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let label = Label::new(name, value);
        let pos = self.0.partition_point(|l| l.name <= label.name);
        self.0.insert(pos, label);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.0
    }

    /// Returns the value for the label with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    pub fn metric_name(&self) -> Option<&str> {
        self.get(METRIC_NAME_LABEL)
    }

    pub fn has_duplicate_names(&self) -> bool {
        self.0.windows(2).any(|w| w[0].name == w[1].name)
    }

    /// Returns the first duplicated label name, if any.
    pub fn duplicate_name(&self) -> Option<&str> {
        self.0
            .windows(2)
            .find(|w| w[0].name == w[1].name)
            .map(|w| w[0].name.as_str())
    }

    /// Stable 64 bit hash of the label set, used as series id.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::with_seed(0);
        for label in self.0.iter() {
            hasher.update(label.name.as_bytes());
            hasher.update(&[SEP]);
            hasher.update(label.value.as_bytes());
            hasher.update(&[SEP]);
        }
        hasher.digest()
    }
}

impl PartialEq for Labels {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Labels {}

impl Hash for Labels {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

/// Formats the set in Prometheus notation, e.g. `http_requests_total{method="POST",status="500"}`
impl Display for Labels {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = self.metric_name().unwrap_or_default();
        write!(f, "{name}")?;
        let mut first = true;
        for label in self.0.iter().filter(|l| l.name != METRIC_NAME_LABEL) {
            if first {
                write!(f, "{{")?;
                first = false;
            } else {
                write!(f, ",")?;
            }
            write!(f, "{}={}", label.name, enquote('"', &label.value))?;
        }
        if !first {
            write!(f, "}}")?;
        }
        Ok(())
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Labels::from_pairs(iter)
    }
}
