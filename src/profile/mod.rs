use crate::metastore::StacktraceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueType {
    pub type_: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub name: String,
    pub period_type: ValueType,
    pub sample_type: ValueType,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Nanoseconds; 0 for instant captures.
    pub duration: i64,
    pub period: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub stacktrace_id: StacktraceId,
    pub value: i64,
    /// Second value of dual-valued sample types, e.g. alloc bytes next to alloc
    /// objects.
    pub companion: Option<i64>,
}

/// A point-in-time capture for one series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub samples: Vec<Sample>,
}

impl Profile {
    pub fn new(meta: Meta, samples: Vec<Sample>) -> Self {
        Self { meta, samples }
    }

    pub fn timestamp(&self) -> i64 {
        self.meta.timestamp
    }

    /// Sum of all sample values, the scalar used for range queries.
    pub fn total(&self) -> i64 {
        self.samples
            .iter()
            .fold(0i64, |acc, s| acc.saturating_add(s.value))
    }
}
