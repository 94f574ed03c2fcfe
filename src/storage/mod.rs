mod index;
mod labels;
mod selector;
mod series;

pub use index::{LabelIndex, SeriesRef};
pub use labels::{Label, LabelSet, Matcher, MatcherKind, METRIC_NAME};
pub use selector::parse_selector;
pub use series::MemSeries;

use crate::error::{EntityKind, Error, Result};
use crate::metastore::Metastore;
use crate::profile::Profile;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Head {
    refs: HashMap<LabelSet, SeriesRef>,
    series: BTreeMap<SeriesRef, Arc<MemSeries>>,
    index: LabelIndex,
    next_ref: SeriesRef,
}

impl Head {
    fn get(&self, labels: &LabelSet) -> Option<Arc<MemSeries>> {
        self.refs.get(labels).map(|r| Arc::clone(&self.series[r]))
    }

    fn get_or_create(&mut self, labels: &LabelSet) -> Arc<MemSeries> {
        if let Some(series) = self.get(labels) {
            return series;
        }

        let r = self.next_ref;
        self.next_ref += 1;
        let series = Arc::new(MemSeries::new(labels.clone()));
        self.refs.insert(labels.clone(), r);
        self.series.insert(r, Arc::clone(&series));
        self.index.add(r, labels);
        log::debug!("Created series {} for {}", r, labels);
        series
    }

    fn any_active(&self, refs: &BTreeSet<SeriesRef>, start: i64, end: i64) -> Result<bool> {
        for r in refs.iter() {
            if let Some(s) = self.series.get(r) {
                if s.has_profiles_in(start, end)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn read_head(head: &RwLock<Head>) -> Result<RwLockReadGuard<'_, Head>> {
    head.read()
        .map_err(|_| Error::internal("Failed to lock series head"))
}

fn write_head(head: &RwLock<Head>) -> Result<RwLockWriteGuard<'_, Head>> {
    head.write()
        .map_err(|_| Error::internal("Failed to lock series head"))
}

/// The series store: label sets to time-ordered profile sequences.
#[derive(Debug)]
pub struct Db {
    metastore: Arc<Metastore>,
    head: Arc<RwLock<Head>>,
}

/// Handle for appending to one series.
///
/// If retention drops the series, the next append registers a fresh series
/// for the same labels and continues there.
#[derive(Debug, Clone)]
pub struct Appender {
    series: Arc<MemSeries>,
    head: Arc<RwLock<Head>>,
    metastore: Arc<Metastore>,
}

/// One selected series with its profiles in the requested range.
#[derive(Debug, Clone)]
pub struct SeriesSelection {
    pub labels: LabelSet,
    pub profiles: Vec<Arc<Profile>>,
}

/// Lazily yields matching series; each series is snapshotted when reached.
#[derive(Debug)]
pub struct SeriesSet {
    series: std::vec::IntoIter<Arc<MemSeries>>,
    start: i64,
    end: i64,
}

impl Db {
    pub fn new(metastore: Arc<Metastore>) -> Self {
        Self {
            metastore,
            head: Arc::new(RwLock::new(Head::default())),
        }
    }

    pub fn metastore(&self) -> &Arc<Metastore> {
        &self.metastore
    }

    /// Returns the appender of the series identified by `labels`, creating the
    /// series on first use.
    pub fn appender(&self, labels: &LabelSet) -> Result<Appender> {
        if labels.is_empty() {
            return Err(Error::invalid_argument("series must have at least one label"));
        }

        let existing = read_head(&self.head)?.get(labels);
        let series = match existing {
            Some(series) => series,
            None => write_head(&self.head)?.get_or_create(labels),
        };

        Ok(Appender {
            series,
            head: Arc::clone(&self.head),
            metastore: Arc::clone(&self.metastore),
        })
    }

    /// Series matching all `matchers` that have profiles in `[start, end)`, in
    /// series creation order.
    pub fn select_series(&self, matchers: &[Matcher], start: i64, end: i64) -> Result<SeriesSet> {
        let series = self.matching(matchers)?;
        log::debug!(
            "Selected {} candidate series for range [{}, {})",
            series.len(),
            start,
            end
        );
        Ok(SeriesSet {
            series: series.into_iter(),
            start,
            end,
        })
    }

    /// The latest profile not after `t` across all matching series. Ties go to
    /// the earliest created series.
    pub fn select_at(&self, matchers: &[Matcher], t: i64) -> Result<Option<SeriesSelection>> {
        let mut best: Option<(LabelSet, Arc<Profile>)> = None;
        for s in self.matching(matchers)? {
            if let Some(p) = s.at_or_before(t)? {
                let better = best
                    .as_ref()
                    .map_or(true, |(_, b)| p.timestamp() > b.timestamp());
                if better {
                    best = Some((s.labels().clone(), p));
                }
            }
        }

        Ok(best.map(|(labels, p)| SeriesSelection {
            labels,
            profiles: vec![p],
        }))
    }

    /// Label names of series with at least one profile in `[start, end)`,
    /// ascending.
    pub fn labels(&self, start: i64, end: i64) -> Result<Vec<String>> {
        let head = read_head(&self.head)?;
        let mut names = vec![];
        for name in head.index.label_names() {
            let mut refs = BTreeSet::new();
            for (_, r) in head.index.postings(&name) {
                refs.extend(r.iter().copied());
            }
            if head.any_active(&refs, start, end)? {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Values of `name` across series with at least one profile in
    /// `[start, end)`, ascending.
    pub fn values(&self, name: &str, start: i64, end: i64) -> Result<Vec<String>> {
        let head = read_head(&self.head)?;
        let mut values = vec![];
        for (value, refs) in head.index.postings(name) {
            if head.any_active(refs, start, end)? {
                values.push(value.to_string());
            }
        }
        Ok(values)
    }

    /// Drops profiles older than `t` and removes series this left empty.
    pub fn truncate_before(&self, t: i64) -> Result<usize> {
        let mut head = write_head(&self.head)?;

        let mut emptied = vec![];
        for (r, s) in head.series.iter() {
            if s.truncate_before(t)? {
                emptied.push(*r);
            }
        }

        for r in emptied.iter() {
            if let Some(s) = head.series.remove(r) {
                head.refs.remove(s.labels());
                head.index.remove(*r, s.labels());
            }
        }

        if !emptied.is_empty() {
            log::info!("Retention dropped {} empty series", emptied.len());
        }
        Ok(emptied.len())
    }

    pub fn num_series(&self) -> Result<usize> {
        Ok(read_head(&self.head)?.series.len())
    }

    fn matching(&self, matchers: &[Matcher]) -> Result<Vec<Arc<MemSeries>>> {
        let head = read_head(&self.head)?;
        Ok(head
            .index
            .select(matchers)
            .into_iter()
            .filter_map(|r| head.series.get(&r).cloned())
            .collect())
    }
}

impl Appender {
    pub fn labels(&self) -> &LabelSet {
        self.series.labels()
    }

    /// Appends `profile` after checking that every stacktrace it references is
    /// known to the Metastore.
    pub async fn append(&self, profile: Profile) -> Result<()> {
        let mut seen = HashSet::with_capacity(profile.samples.len());
        for sample in profile.samples.iter() {
            if seen.insert(sample.stacktrace_id)
                && !self.metastore.contains_stacktrace(sample.stacktrace_id).await?
            {
                return Err(Error::dangling(EntityKind::Stacktrace, sample.stacktrace_id));
            }
        }

        let ts = profile.timestamp();
        let mut series = Arc::clone(&self.series);
        let mut pending = profile;
        while let Some(profile) = series.try_append(pending)? {
            log::debug!("Series {} was dropped by retention, re-registering", series.labels());
            series = write_head(&self.head)?.get_or_create(self.series.labels());
            pending = profile;
        }
        log::debug!("Appended profile at {} to {}", ts, series.labels());
        Ok(())
    }
}

impl Iterator for SeriesSet {
    type Item = Result<SeriesSelection>;

    fn next(&mut self) -> Option<Self::Item> {
        for s in self.series.by_ref() {
            match s.range(self.start, self.end) {
                Ok(profiles) if profiles.is_empty() => continue,
                Ok(profiles) => {
                    return Some(Ok(SeriesSelection {
                        labels: s.labels().clone(),
                        profiles,
                    }))
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
