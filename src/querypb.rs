//! Messages of the query API.

use prost_types::Timestamp;

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub value: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelSet {
    #[prost(message, repeated, tag = "1")]
    pub labels: ::prost::alloc::vec::Vec<Label>,
}

/// Request for the per-series total of every profile in a time range.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryRangeRequest {
    /// Series selector, e.g. `allocs{pod="api"}`.
    #[prost(string, tag = "1")]
    pub query: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub start: ::core::option::Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub end: ::core::option::Option<Timestamp>,
    /// Maximum number of series returned; 0 means no limit.
    #[prost(uint32, tag = "4")]
    pub limit: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryRangeResponse {
    #[prost(message, repeated, tag = "1")]
    pub series: ::prost::alloc::vec::Vec<MetricsSeries>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricsSeries {
    #[prost(message, optional, tag = "1")]
    pub labelset: ::core::option::Option<LabelSet>,
    #[prost(message, repeated, tag = "2")]
    pub samples: ::prost::alloc::vec::Vec<MetricsSample>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricsSample {
    #[prost(message, optional, tag = "1")]
    pub timestamp: ::core::option::Option<Timestamp>,
    #[prost(int64, tag = "2")]
    pub value: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SingleProfile {
    #[prost(message, optional, tag = "1")]
    pub time: ::core::option::Option<Timestamp>,
    #[prost(string, tag = "2")]
    pub query: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MergeProfile {
    #[prost(string, tag = "1")]
    pub query: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub start: ::core::option::Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub end: ::core::option::Option<Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiffProfile {
    #[prost(message, optional, tag = "1")]
    pub a: ::core::option::Option<ProfileDiffSelection>,
    #[prost(message, optional, tag = "2")]
    pub b: ::core::option::Option<ProfileDiffSelection>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProfileDiffSelection {
    #[prost(enumeration = "profile_diff_selection::Mode", tag = "1")]
    pub mode: i32,
    #[prost(oneof = "profile_diff_selection::Options", tags = "2, 3")]
    pub options: ::core::option::Option<profile_diff_selection::Options>,
}

pub mod profile_diff_selection {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Mode {
        SingleUnspecified = 0,
        Merge = 1,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Options {
        #[prost(message, tag = "2")]
        Merge(super::MergeProfile),
        #[prost(message, tag = "3")]
        Single(super::SingleProfile),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryRequest {
    #[prost(enumeration = "query_request::Mode", tag = "1")]
    pub mode: i32,
    #[prost(oneof = "query_request::Options", tags = "2, 3, 4")]
    pub options: ::core::option::Option<query_request::Options>,
    #[prost(enumeration = "query_request::ReportType", tag = "5")]
    pub report_type: i32,
}

pub mod query_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Mode {
        SingleUnspecified = 0,
        Diff = 1,
        Merge = 2,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ReportType {
        FlamegraphUnspecified = 0,
        Pprof = 1,
        Top = 2,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Options {
        #[prost(message, tag = "2")]
        Diff(super::DiffProfile),
        #[prost(message, tag = "3")]
        Merge(super::MergeProfile),
        #[prost(message, tag = "4")]
        Single(super::SingleProfile),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryResponse {
    #[prost(oneof = "query_response::Report", tags = "5, 6, 8")]
    pub report: ::core::option::Option<query_response::Report>,
}

pub mod query_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Report {
        #[prost(message, tag = "5")]
        Flamegraph(super::Flamegraph),
        /// gzip-compressed pprof document.
        #[prost(bytes = "vec", tag = "6")]
        Pprof(::prost::alloc::vec::Vec<u8>),
        #[prost(message, tag = "8")]
        Top(super::Top),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Flamegraph {
    #[prost(message, optional, tag = "1")]
    pub root: ::core::option::Option<FlamegraphRootNode>,
    #[prost(int64, tag = "2")]
    pub total: i64,
    #[prost(string, tag = "3")]
    pub unit: ::prost::alloc::string::String,
    /// Depth of the deepest node, root included.
    #[prost(int32, tag = "4")]
    pub height: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FlamegraphRootNode {
    #[prost(int64, tag = "1")]
    pub cumulative: i64,
    #[prost(int64, tag = "2")]
    pub diff: i64,
    #[prost(message, repeated, tag = "3")]
    pub children: ::prost::alloc::vec::Vec<FlamegraphNode>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FlamegraphNode {
    #[prost(message, optional, tag = "1")]
    pub meta: ::core::option::Option<NodeMeta>,
    #[prost(int64, tag = "2")]
    pub cumulative: i64,
    #[prost(int64, tag = "3")]
    pub diff: i64,
    #[prost(message, repeated, tag = "4")]
    pub children: ::prost::alloc::vec::Vec<FlamegraphNode>,
}

/// Resolved location frame of a report node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeMeta {
    #[prost(string, tag = "1")]
    pub location_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub address: u64,
    #[prost(string, tag = "3")]
    pub function_name: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub system_name: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub filename: ::prost::alloc::string::String,
    #[prost(int64, tag = "6")]
    pub line: i64,
    #[prost(string, tag = "7")]
    pub mapping_file: ::prost::alloc::string::String,
    #[prost(string, tag = "8")]
    pub build_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Top {
    #[prost(message, repeated, tag = "1")]
    pub list: ::prost::alloc::vec::Vec<TopNode>,
    #[prost(int32, tag = "2")]
    pub reported: i32,
    #[prost(int64, tag = "3")]
    pub total: i64,
    #[prost(string, tag = "4")]
    pub unit: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TopNode {
    #[prost(message, optional, tag = "1")]
    pub meta: ::core::option::Option<NodeMeta>,
    #[prost(int64, tag = "2")]
    pub cumulative: i64,
    #[prost(int64, tag = "3")]
    pub flat: i64,
    #[prost(int64, tag = "4")]
    pub diff: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelsRequest {
    #[prost(message, optional, tag = "1")]
    pub start: ::core::option::Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub end: ::core::option::Option<Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelsResponse {
    #[prost(string, repeated, tag = "1")]
    pub label_names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValuesRequest {
    #[prost(string, tag = "1")]
    pub label_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub start: ::core::option::Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub end: ::core::option::Option<Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValuesResponse {
    #[prost(string, repeated, tag = "1")]
    pub label_values: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Server-side interface of the query API.
pub mod query_service_server {
    use tonic::{Request, Response, Status};

    #[tonic::async_trait]
    pub trait QueryService: Send + Sync + 'static {
        /// Per-series totals of every profile in a time range.
        async fn query_range(
            &self,
            request: Request<super::QueryRangeRequest>,
        ) -> Result<Response<super::QueryRangeResponse>, Status>;

        /// A single, merged or diffed profile rendered as the requested report.
        async fn query(
            &self,
            request: Request<super::QueryRequest>,
        ) -> Result<Response<super::QueryResponse>, Status>;

        async fn labels(
            &self,
            request: Request<super::LabelsRequest>,
        ) -> Result<Response<super::LabelsResponse>, Status>;

        async fn values(
            &self,
            request: Request<super::ValuesRequest>,
        ) -> Result<Response<super::ValuesResponse>, Status>;
    }
}
