use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One timestamped batch of named measurements.
///
/// Values are opaque text, the relay decides how to interpret them.
/// Stats are kept sorted by name, which gives a stable order on the wire.
#[derive(PartialEq, Eq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct StatRecord {
    /// Milliseconds since the Unix epoch for records created via [StatRecord::now].
    pub timestamp: i64,
    pub stats: BTreeMap<String, String>,
}

impl StatRecord {
    pub fn new(timestamp: i64) -> Self {
        StatRecord {
            timestamp,
            stats: BTreeMap::new(),
        }
    }

    /// Create an empty record stamped with the current time in milliseconds.
    pub fn now() -> Self {
        Self::new(Utc::now().timestamp_millis())
    }

    /// Builder style variant of [StatRecord::insert].
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    /// Add a stat. An existing stat with the same name is overwritten.
    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.stats.insert(name.into(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for StatRecord
where
    K: Into<String>,
    V: ToString,
{
    /// Collect stats into a record stamped with the current time.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = StatRecord::now();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}
