//! Validation of query API requests into well-typed queries.
//!
//! Everything here runs before any storage access. Once a request is converted,
//! mode and options can no longer disagree.

use crate::error::{Error, Result};
use crate::querypb::{
    self, profile_diff_selection, query_request, query_request::ReportType, QueryRangeRequest,
};
use crate::storage::{parse_selector, Matcher};
use prost_types::Timestamp;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

pub fn timestamp_to_nanos(ts: &Timestamp) -> i64 {
    ts.seconds
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(ts.nanos as i64)
}

pub fn nanos_to_timestamp(nanos: i64) -> Timestamp {
    Timestamp {
        seconds: nanos.div_euclid(NANOS_PER_SECOND),
        nanos: nanos.rem_euclid(NANOS_PER_SECOND) as i32,
    }
}

/// The profile at or before `time`.
#[derive(Debug, Clone)]
pub struct SingleSelection {
    pub matchers: Vec<Matcher>,
    pub time: i64,
}

/// All profiles in `[start, end)`.
#[derive(Debug, Clone)]
pub struct MergeSelection {
    pub matchers: Vec<Matcher>,
    pub start: i64,
    pub end: i64,
}

/// One side of a diff.
#[derive(Debug, Clone)]
pub enum Selection {
    Single(SingleSelection),
    Merge(MergeSelection),
}

#[derive(Debug, Clone)]
pub enum Query {
    Single(SingleSelection),
    Merge(MergeSelection),
    Diff { a: Selection, b: Selection },
}

#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub query: Query,
    pub report_type: ReportType,
}

#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub matchers: Vec<Matcher>,
    pub start: i64,
    pub end: i64,
    /// 0 means no limit.
    pub limit: usize,
}

impl TryFrom<&QueryRangeRequest> for RangeQuery {
    type Error = Error;

    fn try_from(req: &QueryRangeRequest) -> Result<Self> {
        let matchers = matchers(&req.query)?;
        let (start, end) = time_range(req.start.as_ref(), req.end.as_ref())?;
        Ok(Self {
            matchers,
            start,
            end,
            limit: req.limit as usize,
        })
    }
}

impl TryFrom<&querypb::QueryRequest> for ValidatedQuery {
    type Error = Error;

    fn try_from(req: &querypb::QueryRequest) -> Result<Self> {
        let mode = query_request::Mode::try_from(req.mode)
            .map_err(|_| Error::invalid_argument(format!("invalid mode {}", req.mode)))?;
        let report_type = ReportType::try_from(req.report_type).map_err(|_| {
            Error::invalid_argument(format!("invalid report type {}", req.report_type))
        })?;

        use query_request::{Mode, Options};
        let query = match (mode, req.options.as_ref()) {
            (_, None) => return Err(Error::invalid_argument("query options not provided")),
            (Mode::SingleUnspecified, Some(Options::Single(s))) => Query::Single(single(s)?),
            (Mode::Merge, Some(Options::Merge(m))) => Query::Merge(merge(m)?),
            (Mode::Diff, Some(Options::Diff(d))) => Query::Diff {
                a: diff_side(d.a.as_ref(), "a")?,
                b: diff_side(d.b.as_ref(), "b")?,
            },
            (mode, Some(_)) => {
                return Err(Error::invalid_argument(format!(
                    "options do not match mode {:?}",
                    mode
                )))
            }
        };

        Ok(Self { query, report_type })
    }
}

fn diff_side(sel: Option<&querypb::ProfileDiffSelection>, side: &str) -> Result<Selection> {
    use profile_diff_selection::{Mode, Options};

    let sel = sel.ok_or_else(|| {
        Error::invalid_argument(format!("diff selection {} not provided", side))
    })?;
    let mode = Mode::try_from(sel.mode).map_err(|_| {
        Error::invalid_argument(format!("invalid mode {} for diff selection {}", sel.mode, side))
    })?;

    match (mode, sel.options.as_ref()) {
        (Mode::SingleUnspecified, Some(Options::Single(s))) => Ok(Selection::Single(single(s)?)),
        (Mode::Merge, Some(Options::Merge(m))) => Ok(Selection::Merge(merge(m)?)),
        (_, None) => Err(Error::invalid_argument(format!(
            "options of diff selection {} not provided",
            side
        ))),
        (mode, Some(_)) => Err(Error::invalid_argument(format!(
            "options of diff selection {} do not match mode {:?}",
            side,
            mode
        ))),
    }
}

fn single(s: &querypb::SingleProfile) -> Result<SingleSelection> {
    let matchers = matchers(&s.query)?;
    let time = s
        .time
        .as_ref()
        .map(timestamp_to_nanos)
        .ok_or_else(|| Error::invalid_argument("time must be provided"))?;
    Ok(SingleSelection { matchers, time })
}

fn merge(m: &querypb::MergeProfile) -> Result<MergeSelection> {
    let matchers = matchers(&m.query)?;
    let (start, end) = time_range(m.start.as_ref(), m.end.as_ref())?;
    Ok(MergeSelection {
        matchers,
        start,
        end,
    })
}

fn matchers(query: &str) -> Result<Vec<Matcher>> {
    if query.trim().is_empty() {
        return Err(Error::invalid_argument("query must not be empty"));
    }
    parse_selector(query)
}

pub(crate) fn time_range(start: Option<&Timestamp>, end: Option<&Timestamp>) -> Result<(i64, i64)> {
    let start = start
        .map(timestamp_to_nanos)
        .ok_or_else(|| Error::invalid_argument("start timestamp must be provided"))?;
    let end = end
        .map(timestamp_to_nanos)
        .ok_or_else(|| Error::invalid_argument("end timestamp must be provided"))?;
    if start >= end {
        return Err(Error::invalid_argument(format!(
            "start {} must be before end {}",
            start, end
        )));
    }
    Ok((start, end))
}
