use crate::error::{Error, Result};
use crate::metastore::StacktraceId;
use crate::profile::{Meta, Profile};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Aggregated values of one stacktrace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub value: i64,
    pub companion: i64,
    /// Only set by [`StacktraceTable::diff`].
    pub diff: i64,
}

/// Stacktrace ID to aggregated totals: the result of folding any number of
/// profiles together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StacktraceTable {
    rows: HashMap<StacktraceId, Totals>,
    /// Metadata of the earliest profile folded in.
    meta: Option<Meta>,
    /// Set on tables built by [`StacktraceTable::diff`].
    is_diff: bool,
}

impl StacktraceTable {
    pub fn from_profile(profile: &Profile) -> Self {
        let mut t = Self::default();
        t.add_profile(profile);
        t
    }

    pub fn add_profile(&mut self, profile: &Profile) {
        for s in profile.samples.iter() {
            let row = self.rows.entry(s.stacktrace_id).or_default();
            row.value = row.value.saturating_add(s.value);
            row.companion = row.companion.saturating_add(s.companion.unwrap_or(0));
        }
        self.keep_earliest_meta(Some(&profile.meta));
    }

    /// Folds `other` into `self`.
    pub fn merge(mut self, other: Self) -> Self {
        let (mut big, small) = if self.rows.len() >= other.rows.len() {
            (std::mem::take(&mut self.rows), other.rows)
        } else {
            (other.rows, std::mem::take(&mut self.rows))
        };
        for (id, t) in small {
            let row = big.entry(id).or_default();
            row.value = row.value.saturating_add(t.value);
            row.companion = row.companion.saturating_add(t.companion);
            row.diff = row.diff.saturating_add(t.diff);
        }
        self.rows = big;
        self.keep_earliest_meta(other.meta.as_ref());
        self
    }

    /// For every stacktrace of either side: `value = b`, `diff = b - a`.
    pub fn diff(a: &Self, b: &Self) -> Self {
        let mut rows: HashMap<StacktraceId, Totals> = b
            .rows
            .iter()
            .map(|(id, t)| {
                let before = a.rows.get(id).map_or(0, |a| a.value);
                (
                    *id,
                    Totals {
                        value: t.value,
                        companion: t.companion,
                        diff: t.value.saturating_sub(before),
                    },
                )
            })
            .collect();

        for (id, t) in a.rows.iter() {
            rows.entry(*id).or_insert(Totals {
                value: 0,
                companion: 0,
                diff: 0i64.saturating_sub(t.value),
            });
        }

        Self {
            rows,
            meta: b.meta.clone().or_else(|| a.meta.clone()),
            is_diff: true,
        }
    }

    pub fn get(&self, id: &StacktraceId) -> Option<&Totals> {
        self.rows.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StacktraceId, &Totals)> {
        self.rows.iter()
    }

    /// Rows ordered by stacktrace ID, for reproducible output.
    pub fn sorted(&self) -> Vec<(StacktraceId, Totals)> {
        let mut rows: Vec<(StacktraceId, Totals)> =
            self.rows.iter().map(|(id, t)| (*id, *t)).collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn stacktrace_ids(&self) -> Vec<StacktraceId> {
        self.rows.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total(&self) -> i64 {
        self.rows
            .values()
            .fold(0i64, |acc, t| acc.saturating_add(t.value))
    }

    pub fn total_diff(&self) -> i64 {
        self.rows
            .values()
            .fold(0i64, |acc, t| acc.saturating_add(t.diff))
    }

    pub fn is_diff(&self) -> bool {
        self.is_diff
    }

    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_ref()
    }

    fn keep_earliest_meta(&mut self, meta: Option<&Meta>) {
        if let Some(meta) = meta {
            let replace = self
                .meta
                .as_ref()
                .map_or(true, |m| meta.timestamp < m.timestamp);
            if replace {
                self.meta = Some(meta.clone());
            }
        }
    }
}

/// Folds all `profiles` into one table on the rayon pool, checking `cancel`
/// before each profile.
pub fn merge_profiles(
    profiles: &[Arc<Profile>],
    cancel: &CancellationToken,
) -> Result<StacktraceTable> {
    profiles
        .par_iter()
        .try_fold(StacktraceTable::default, |mut table, p| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            table.add_profile(p);
            Ok(table)
        })
        .try_reduce(StacktraceTable::default, |a, b| Ok(a.merge(b)))
}
