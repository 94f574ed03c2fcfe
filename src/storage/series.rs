use super::labels::LabelSet;
use crate::error::{Error, Result};
use crate::profile::Profile;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Chunk {
    profiles: Vec<Arc<Profile>>,
    /// Set once retention emptied the series and it left the index.
    dropped: bool,
}

/// An append-only, strictly time-increasing sequence of profiles.
///
/// Writers hold the lock only to validate and push; readers only to clone the
/// `Arc`s of a time range, so a reader never sees a half-appended profile.
#[derive(Debug)]
pub struct MemSeries {
    labels: LabelSet,
    chunk: RwLock<Chunk>,
}

impl MemSeries {
    pub fn new(labels: LabelSet) -> Self {
        Self {
            labels,
            chunk: RwLock::new(Chunk::default()),
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn append(&self, profile: Profile) -> Result<()> {
        match self.try_append(profile)? {
            None => Ok(()),
            Some(_) => Err(Error::not_found(format!(
                "series {} was dropped by retention",
                self.labels
            ))),
        }
    }

    /// Like [`MemSeries::append`], but hands the profile back if retention
    /// dropped the series.
    pub(crate) fn try_append(&self, profile: Profile) -> Result<Option<Profile>> {
        let mut chunk = self
            .chunk
            .write()
            .map_err(|_| Error::internal("Failed to lock series"))?;

        if chunk.dropped {
            return Ok(Some(profile));
        }

        if let Some(last) = chunk.profiles.last() {
            if profile.timestamp() <= last.timestamp() {
                return Err(Error::OutOfOrderSample {
                    series: self.labels.to_string(),
                    timestamp: profile.timestamp(),
                    last: last.timestamp(),
                });
            }
        }

        chunk.profiles.push(Arc::new(profile));
        Ok(None)
    }

    /// Profiles with `start <= timestamp < end`, ascending.
    pub fn range(&self, start: i64, end: i64) -> Result<Vec<Arc<Profile>>> {
        let chunk = self.read()?;
        let lo = chunk.profiles.partition_point(|p| p.timestamp() < start);
        let hi = chunk.profiles.partition_point(|p| p.timestamp() < end);
        if lo >= hi {
            return Ok(vec![]);
        }
        Ok(chunk.profiles[lo..hi].to_vec())
    }

    /// Latest profile not after `t`.
    pub fn at_or_before(&self, t: i64) -> Result<Option<Arc<Profile>>> {
        let chunk = self.read()?;
        let idx = chunk.profiles.partition_point(|p| p.timestamp() <= t);
        Ok(idx.checked_sub(1).map(|i| Arc::clone(&chunk.profiles[i])))
    }

    pub fn has_profiles_in(&self, start: i64, end: i64) -> Result<bool> {
        let chunk = self.read()?;
        let lo = chunk.profiles.partition_point(|p| p.timestamp() < start);
        Ok(chunk
            .profiles
            .get(lo)
            .map_or(false, |p| p.timestamp() < end))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.profiles.len())
    }

    /// Drops profiles older than `t`. Returns true if that left the series
    /// empty, in which case it is marked dropped and refuses further appends.
    /// A series that had nothing to drop is never marked.
    pub(crate) fn truncate_before(&self, t: i64) -> Result<bool> {
        let mut chunk = self
            .chunk
            .write()
            .map_err(|_| Error::internal("Failed to lock series"))?;
        let n = chunk.profiles.partition_point(|p| p.timestamp() < t);
        if n == 0 {
            return Ok(false);
        }
        chunk.profiles.drain(..n);
        if chunk.profiles.is_empty() {
            chunk.dropped = true;
        }
        Ok(chunk.dropped)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Chunk>> {
        self.chunk
            .read()
            .map_err(|_| Error::internal("Failed to lock series"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Meta;

    fn profile(ts: i64) -> Profile {
        Profile::new(
            Meta {
                timestamp: ts,
                ..Default::default()
            },
            vec![],
        )
    }

    fn series() -> MemSeries {
        MemSeries::new(LabelSet::from_pairs([("__name__", "allocs")]).unwrap())
    }

    #[test]
    fn range_is_half_open_and_ordered() {
        let s = series();
        for ts in [10, 20, 30, 40] {
            s.append(profile(ts)).unwrap();
        }

        let ts: Vec<i64> = s.range(20, 40).unwrap().iter().map(|p| p.timestamp()).collect();
        assert_eq!(ts, vec![20, 30]);
        assert!(s.range(41, 100).unwrap().is_empty());
        assert!(s.range(30, 30).unwrap().is_empty());
        assert!(s.has_profiles_in(35, 41).unwrap());
        assert!(!s.has_profiles_in(41, 50).unwrap());
    }

    #[test]
    fn out_of_order_appends_leave_series_unchanged() {
        let s = series();
        s.append(profile(10)).unwrap();

        for ts in [10, 5] {
            let err = s.append(profile(ts)).unwrap_err();
            assert!(matches!(err, Error::OutOfOrderSample { last: 10, .. }));
        }
        assert_eq!(s.len().unwrap(), 1);
    }

    #[test]
    fn at_or_before() {
        let s = series();
        s.append(profile(10)).unwrap();
        s.append(profile(20)).unwrap();

        assert!(s.at_or_before(9).unwrap().is_none());
        assert_eq!(s.at_or_before(10).unwrap().unwrap().timestamp(), 10);
        assert_eq!(s.at_or_before(19).unwrap().unwrap().timestamp(), 10);
        assert_eq!(s.at_or_before(99).unwrap().unwrap().timestamp(), 20);
    }

    #[test]
    fn truncation() {
        let s = series();
        s.append(profile(10)).unwrap();
        s.append(profile(20)).unwrap();

        assert!(!s.truncate_before(15).unwrap());
        assert_eq!(s.len().unwrap(), 1);
        assert!(s.truncate_before(25).unwrap());
        assert!(matches!(s.append(profile(30)), Err(Error::NotFound(_))));
    }

    #[test]
    fn series_without_profiles_survive_truncation() {
        let s = series();
        assert!(!s.truncate_before(100).unwrap());
        s.append(profile(10)).unwrap();
        assert_eq!(s.len().unwrap(), 1);
    }
}
