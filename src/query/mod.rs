mod flamegraph;
mod merge;
mod pprof_writer;
mod request;
mod resolve;
mod top;
mod tree;

pub use merge::{merge_profiles, StacktraceTable, Totals};
pub use request::{
    nanos_to_timestamp, timestamp_to_nanos, MergeSelection, Query, RangeQuery, Selection,
    SingleSelection, ValidatedQuery,
};
pub use resolve::{Frame, Resolved};
pub use tree::{Node, Tree};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::normalizer::encode_pprof;
use crate::profile::Profile;
use crate::querypb::query_request::ReportType;
use crate::querypb::query_response::Report;
use crate::querypb::query_service_server::QueryService;
use crate::querypb::{
    self, LabelsRequest, LabelsResponse, MetricsSample, MetricsSeries, QueryRangeRequest,
    QueryRangeResponse, QueryResponse, ValuesRequest, ValuesResponse,
};
use crate::storage::{Db, LabelSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

/// Answers range, single, merge and diff queries over a [`Db`].
#[derive(Debug, Clone)]
pub struct Querier {
    db: Arc<Db>,
    default_range_limit: usize,
}

impl Querier {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            default_range_limit: 0,
        }
    }

    pub fn with_config(db: Arc<Db>, config: &Config) -> Self {
        Self {
            db,
            default_range_limit: config.default_range_limit as usize,
        }
    }

    /// Per-series `(timestamp, total)` points, at most `limit` series in
    /// creation order.
    pub fn range(&self, q: &RangeQuery) -> Result<Vec<MetricsSeries>> {
        let limit = match q.limit {
            0 => self.default_range_limit,
            l => l,
        };
        let limit = if limit == 0 { usize::MAX } else { limit };

        let mut res = vec![];
        for selection in self.db.select_series(&q.matchers, q.start, q.end)?.take(limit) {
            let selection = selection?;
            res.push(MetricsSeries {
                labelset: Some(labelset_to_pb(&selection.labels)),
                samples: selection
                    .profiles
                    .iter()
                    .map(|p| MetricsSample {
                        timestamp: Some(nanos_to_timestamp(p.timestamp())),
                        value: p.total(),
                    })
                    .collect(),
            });
        }

        log::debug!("Range query returned {} series", res.len());
        Ok(res)
    }

    /// Runs a validated query and renders the requested report.
    pub async fn run(&self, q: &ValidatedQuery, cancel: &CancellationToken) -> Result<QueryResponse> {
        let table = match &q.query {
            Query::Single(s) => self.single(s)?,
            Query::Merge(m) => self.merge(m, cancel).await?,
            Query::Diff { a, b } => {
                let a = self.selection(a, cancel).await?;
                let b = self.selection(b, cancel).await?;
                StacktraceTable::diff(&a, &b)
            }
        };
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let report = self.report(&table, q.report_type).await?;
        Ok(QueryResponse {
            report: Some(report),
        })
    }

    pub async fn report(&self, table: &StacktraceTable, report_type: ReportType) -> Result<Report> {
        let resolved = Resolved::load(self.db.metastore(), &table.stacktrace_ids()).await?;
        let unit = table
            .meta()
            .map(|m| m.sample_type.unit.clone())
            .unwrap_or_default();

        Ok(match report_type {
            ReportType::FlamegraphUnspecified => {
                let tree = Tree::build(table, &resolved)?;
                Report::Flamegraph(flamegraph::flamegraph(&tree, &unit))
            }
            ReportType::Top => Report::Top(top::top(table, &resolved, &unit)?),
            ReportType::Pprof => {
                let p = pprof_writer::write_pprof(table, &resolved)?;
                Report::Pprof(encode_pprof(&p)?)
            }
        })
    }

    async fn selection(&self, s: &Selection, cancel: &CancellationToken) -> Result<StacktraceTable> {
        match s {
            Selection::Single(s) => self.single(s),
            Selection::Merge(m) => self.merge(m, cancel).await,
        }
    }

    fn single(&self, s: &SingleSelection) -> Result<StacktraceTable> {
        let selection = self.db.select_at(&s.matchers, s.time)?.ok_or_else(|| {
            Error::not_found(format!("no profile found at or before {}", s.time))
        })?;

        let profile = selection
            .profiles
            .first()
            .ok_or_else(|| Error::internal("empty single selection"))?;
        log::debug!(
            "Selected profile at {} of {}",
            profile.timestamp(),
            selection.labels
        );
        Ok(StacktraceTable::from_profile(profile))
    }

    async fn merge(&self, m: &MergeSelection, cancel: &CancellationToken) -> Result<StacktraceTable> {
        let mut profiles: Vec<Arc<Profile>> = vec![];
        for selection in self.db.select_series(&m.matchers, m.start, m.end)? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            profiles.extend(selection?.profiles);
        }
        log::debug!("Merging {} profiles", profiles.len());

        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || merge_profiles(&profiles, &cancel))
            .await
            .map_err(|e| Error::internal(format!("merge task failed: {}", e)))?
    }
}

#[tonic::async_trait]
impl QueryService for Querier {
    async fn query_range(
        &self,
        request: Request<QueryRangeRequest>,
    ) -> Result<Response<QueryRangeResponse>, Status> {
        let q = RangeQuery::try_from(request.get_ref())?;
        let series = self.range(&q)?;
        Ok(Response::new(QueryRangeResponse { series }))
    }

    async fn query(
        &self,
        request: Request<querypb::QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        let q = ValidatedQuery::try_from(request.get_ref())?;
        log::debug!("Received query {:?}", q);

        // Dropping the request future cancels any merge still running.
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        match self.run(&q, &cancel).await {
            Ok(resp) => Ok(Response::new(resp)),
            Err(e) => {
                log::warn!("Query failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn labels(
        &self,
        request: Request<LabelsRequest>,
    ) -> Result<Response<LabelsResponse>, Status> {
        let req = request.get_ref();
        let (start, end) = optional_range(req.start.as_ref(), req.end.as_ref())?;
        let label_names = self.db.labels(start, end)?;
        Ok(Response::new(LabelsResponse { label_names }))
    }

    async fn values(
        &self,
        request: Request<ValuesRequest>,
    ) -> Result<Response<ValuesResponse>, Status> {
        let req = request.get_ref();
        if req.label_name.is_empty() {
            return Err(Error::invalid_argument("label name must not be empty").into());
        }
        let (start, end) = optional_range(req.start.as_ref(), req.end.as_ref())?;
        let label_values = self.db.values(&req.label_name, start, end)?;
        Ok(Response::new(ValuesResponse { label_values }))
    }
}

/// Label discovery defaults to all time when no bounds are given.
fn optional_range(
    start: Option<&prost_types::Timestamp>,
    end: Option<&prost_types::Timestamp>,
) -> Result<(i64, i64)> {
    match (start, end) {
        (None, None) => Ok((i64::MIN, i64::MAX)),
        (start, end) => request::time_range(start, end),
    }
}

fn labelset_to_pb(labels: &LabelSet) -> querypb::LabelSet {
    querypb::LabelSet {
        labels: labels
            .iter()
            .map(|l| querypb::Label {
                name: l.name.clone(),
                value: l.value.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests;
