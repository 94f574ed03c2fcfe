use super::*;
use crate::metastore::{Function, Line, Metastore, StacktraceId};
use crate::normalizer::{decode_pprof, testdata, PprofConverter};
use crate::pprofpb;
use crate::profile::{Meta, Sample, ValueType};
use crate::querypb::{
    profile_diff_selection, query_request, DiffProfile, Flamegraph, FlamegraphNode, MergeProfile,
    ProfileDiffSelection, QueryRequest, SingleProfile,
};
use crate::storage::Appender;
use chrono::{Duration, Utc};
use prost_types::Timestamp;
use tonic::Code;

fn querier() -> (Arc<Db>, Querier) {
    let db = Arc::new(Db::new(Arc::new(Metastore::in_memory())));
    (Arc::clone(&db), Querier::new(db))
}

fn ts(nanos: i64) -> Option<Timestamp> {
    Some(nanos_to_timestamp(nanos))
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap()
}

fn last_five_minutes() -> (i64, i64) {
    let end = Utc::now() + Duration::seconds(1);
    let start = end - Duration::minutes(5);
    (
        start.timestamp_nanos_opt().unwrap(),
        end.timestamp_nanos_opt().unwrap(),
    )
}

fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    LabelSet::from_pairs(pairs.iter().copied()).unwrap()
}

fn allocs(db: &Db) -> Appender {
    db.appender(&labels(&[("__name__", "allocs")])).unwrap()
}

async fn main_alloc_stacktrace(m: &Metastore) -> StacktraceId {
    let mut locations = vec![];
    for name in ["alloc", "main"] {
        let f = m
            .get_or_create_function(Function {
                name: name.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        locations.push(
            m.get_or_create_location(
                None,
                0,
                vec![Line {
                    function_id: f,
                    line: 1,
                }],
            )
            .await
            .unwrap(),
        );
    }
    m.get_or_create_stacktrace(locations).await.unwrap()
}

fn profile(ts: i64, st: StacktraceId, value: i64) -> Profile {
    Profile::new(
        Meta {
            name: "allocs".into(),
            sample_type: ValueType {
                type_: "alloc_space".into(),
                unit: "bytes".into(),
            },
            timestamp: ts,
            ..Default::default()
        },
        vec![Sample {
            stacktrace_id: st,
            value,
            companion: None,
        }],
    )
}

async fn append_pprof(db: &Db, app: &Appender, p: &pprofpb::Profile) {
    let profile = PprofConverter::new(db.metastore(), p)
        .await
        .unwrap()
        .profile("allocs", 0)
        .unwrap();
    app.append(profile).await.unwrap();
}

fn single_request(query: &str, time: i64) -> QueryRequest {
    QueryRequest {
        mode: query_request::Mode::SingleUnspecified as i32,
        options: Some(query_request::Options::Single(SingleProfile {
            query: query.into(),
            time: ts(time),
        })),
        report_type: ReportType::FlamegraphUnspecified as i32,
    }
}

fn merge_request(query: &str, start: i64, end: i64) -> QueryRequest {
    QueryRequest {
        mode: query_request::Mode::Merge as i32,
        options: Some(query_request::Options::Merge(MergeProfile {
            query: query.into(),
            start: ts(start),
            end: ts(end),
        })),
        report_type: ReportType::FlamegraphUnspecified as i32,
    }
}

fn single_side(query: &str, time: i64) -> Option<ProfileDiffSelection> {
    Some(ProfileDiffSelection {
        mode: profile_diff_selection::Mode::SingleUnspecified as i32,
        options: Some(profile_diff_selection::Options::Single(SingleProfile {
            query: query.into(),
            time: ts(time),
        })),
    })
}

fn merge_side(query: &str, start: i64, end: i64) -> Option<ProfileDiffSelection> {
    Some(ProfileDiffSelection {
        mode: profile_diff_selection::Mode::Merge as i32,
        options: Some(profile_diff_selection::Options::Merge(MergeProfile {
            query: query.into(),
            start: ts(start),
            end: ts(end),
        })),
    })
}

fn diff_request(a: Option<ProfileDiffSelection>, b: Option<ProfileDiffSelection>) -> QueryRequest {
    QueryRequest {
        mode: query_request::Mode::Diff as i32,
        options: Some(query_request::Options::Diff(DiffProfile { a, b })),
        report_type: ReportType::FlamegraphUnspecified as i32,
    }
}

async fn flamegraph(q: &Querier, req: QueryRequest) -> Flamegraph {
    let resp = q.query(Request::new(req)).await.unwrap().into_inner();
    match resp.report {
        Some(Report::Flamegraph(fg)) => fg,
        r => panic!("expected a flamegraph, got {:?}", r),
    }
}

async fn pprof_report(q: &Querier, mut req: QueryRequest) -> pprofpb::Profile {
    req.report_type = ReportType::Pprof as i32;
    match q.query(Request::new(req)).await.unwrap().into_inner().report {
        Some(Report::Pprof(raw)) => decode_pprof(&raw).unwrap(),
        r => panic!("expected pprof, got {:?}", r),
    }
}

fn walk<'a>(nodes: &'a [FlamegraphNode], out: &mut Vec<&'a FlamegraphNode>) {
    for n in nodes {
        out.push(n);
        walk(&n.children, out);
    }
}

fn name(n: &FlamegraphNode) -> &str {
    n.meta.as_ref().map_or("", |m| m.function_name.as_str())
}

#[tokio::test]
async fn query_range_empty_store() {
    let (_, q) = querier();
    let (start, end) = last_five_minutes();

    let resp = q
        .query_range(Request::new(QueryRangeRequest {
            query: "allocs".into(),
            start: ts(start),
            end: ts(end),
            limit: 10,
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(resp.series.is_empty());
}

#[tokio::test]
async fn query_range_valid() {
    let (db, q) = querier();
    let st = main_alloc_stacktrace(db.metastore()).await;
    allocs(&db)
        .append(profile(now_nanos(), st, 310797348))
        .await
        .unwrap();

    let (start, end) = last_five_minutes();
    let resp = q
        .query_range(Request::new(QueryRangeRequest {
            query: "allocs".into(),
            start: ts(start),
            end: ts(end),
            limit: 10,
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(resp.series.len(), 1);
    assert_eq!(resp.series[0].samples.len(), 1);
    assert_eq!(
        resp.series[0].labelset,
        Some(querypb::LabelSet {
            labels: vec![querypb::Label {
                name: "__name__".into(),
                value: "allocs".into(),
            }],
        })
    );
    assert_eq!(resp.series[0].samples[0].value, 310797348);
}

#[tokio::test]
async fn query_range_limited() {
    let (db, q) = querier();
    let st = main_alloc_stacktrace(db.metastore()).await;

    let num_series = 10;
    for i in 0..num_series {
        let meta = format!("series_{}", i);
        db.appender(&labels(&[("__name__", "allocs"), ("meta", meta.as_str())]))
            .unwrap()
            .append(profile(now_nanos(), st, 1))
            .await
            .unwrap();
    }

    let (start, end) = last_five_minutes();
    let request = |limit: u32| QueryRangeRequest {
        query: "allocs".into(),
        start: ts(start),
        end: ts(end),
        limit,
    };

    for limit in 1..num_series {
        let resp = q
            .query_range(Request::new(request(limit)))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.series.len(), limit as usize);
        assert!(resp.series.iter().all(|s| s.samples.len() == 1));
        // Series come back in creation order.
        let first = &resp.series[0].labelset.as_ref().unwrap().labels;
        assert_eq!(first[1].value, "series_0");
    }

    let resp = q.query_range(Request::new(request(0))).await.unwrap();
    assert_eq!(resp.get_ref().series.len(), 10);

    let config = Config {
        default_range_limit: 3,
        ..Default::default()
    };
    let limited = Querier::with_config(Arc::clone(&db), &config);
    let resp = limited.query_range(Request::new(request(0))).await.unwrap();
    assert_eq!(resp.get_ref().series.len(), 3);
}

#[tokio::test]
async fn query_range_input_validation() {
    let (_, q) = querier();
    let (start, end) = last_five_minutes();
    let valid = QueryRangeRequest {
        query: "allocs".into(),
        start: ts(start),
        end: ts(end),
        limit: 0,
    };

    let cases = [
        (
            "empty query",
            QueryRangeRequest {
                query: "".into(),
                ..valid.clone()
            },
        ),
        (
            "empty start",
            QueryRangeRequest {
                start: None,
                ..valid.clone()
            },
        ),
        (
            "empty end",
            QueryRangeRequest {
                end: None,
                ..valid.clone()
            },
        ),
        (
            "end before start",
            QueryRangeRequest {
                start: ts(end),
                end: ts(start),
                ..valid.clone()
            },
        ),
    ];

    for (name, req) in cases {
        let err = q.query_range(Request::new(req)).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument, "{}", name);
    }
}

#[tokio::test]
async fn query_input_validation() {
    let (_, q) = querier();

    let cases = [
        (
            "invalid mode",
            QueryRequest {
                mode: 1000,
                options: Some(query_request::Options::Single(SingleProfile::default())),
                report_type: ReportType::FlamegraphUnspecified as i32,
            },
        ),
        (
            "invalid report type",
            QueryRequest {
                mode: query_request::Mode::SingleUnspecified as i32,
                options: Some(query_request::Options::Single(SingleProfile::default())),
                report_type: 1000,
            },
        ),
        (
            "option doesn't match mode",
            QueryRequest {
                mode: query_request::Mode::SingleUnspecified as i32,
                options: Some(query_request::Options::Merge(MergeProfile::default())),
                report_type: ReportType::FlamegraphUnspecified as i32,
            },
        ),
        (
            "option not provided",
            QueryRequest {
                mode: query_request::Mode::SingleUnspecified as i32,
                options: None,
                report_type: ReportType::FlamegraphUnspecified as i32,
            },
        ),
        ("merge start after end", merge_request("allocs", 10, 5)),
        ("unparsable selector", single_request("allocs{", 10)),
        ("diff side missing", diff_request(single_side("allocs", 1), None)),
    ];

    for (name, req) in cases {
        let err = q.query(Request::new(req)).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument, "{}", name);
    }
}

#[tokio::test]
async fn query_simple() {
    let (db, q) = querier();
    let t1 = 1_650_000_000_000_000_000;
    append_pprof(&db, &allocs(&db), &testdata::heap_profile(t1)).await;

    let fg = flamegraph(&q, single_request("allocs", t1)).await;
    assert_eq!(fg.total, 4);
    assert_eq!(fg.unit, "count");
    assert_eq!(fg.height, 4);

    let root = fg.root.unwrap();
    assert_eq!(root.cumulative, 4);
    assert_eq!(root.children.len(), 1);

    let main = &root.children[0];
    assert_eq!(name(main), "main.main");
    assert_eq!(main.meta.as_ref().unwrap().mapping_file, "/usr/bin/app");
    assert_eq!(main.children.len(), 2);
    assert_eq!(name(&main.children[0]), "alloc::alloc::alloc");
    assert_eq!(main.children[0].cumulative, 3);
    assert_eq!(name(&main.children[1]), "main.run");
    assert_eq!(main.children[1].cumulative, 1);

    // A later instant still selects the latest earlier profile.
    let later = flamegraph(&q, single_request("allocs", t1 + 1_000)).await;
    assert_eq!(later.total, 4);
}

#[tokio::test]
async fn query_single_not_found() {
    let (db, q) = querier();
    append_pprof(&db, &allocs(&db), &testdata::heap_profile(100)).await;

    let err = q
        .query(Request::new(single_request("allocs", 99)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    let err = q
        .query(Request::new(single_request("cpu", 100)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn query_diff() {
    let (db, q) = querier();
    let app = allocs(&db);

    let t1 = 1_650_000_000_000_000_000;
    let t2 = t1 + 10_000_000;
    append_pprof(&db, &app, &testdata::heap_profile(t1)).await;

    let mut p2 = testdata::heap_profile(t2);
    p2.sample[0].value = vec![5, 500];
    append_pprof(&db, &app, &p2).await;

    let fg = flamegraph(&q, diff_request(single_side("allocs", t1), single_side("allocs", t2))).await;
    let root = fg.root.unwrap();
    assert_eq!(root.cumulative, 7);
    assert_eq!(root.diff, 3);

    let mut nodes = vec![];
    walk(&root.children, &mut nodes);
    let run = nodes.iter().find(|n| name(n) == "main.run").unwrap();
    assert_eq!((run.cumulative, run.diff), (1, 0));
    let direct = &root.children[0].children[0];
    assert_eq!(name(direct), "alloc::alloc::alloc");
    assert_eq!((direct.cumulative, direct.diff), (6, 3));
}

#[tokio::test]
async fn diff_of_same_selection_is_zero() {
    let (db, q) = querier();
    let app = allocs(&db);
    for t in 1..=4 {
        append_pprof(&db, &app, &testdata::heap_profile(t)).await;
    }

    let fg = flamegraph(
        &q,
        diff_request(merge_side("allocs", 0, 10), merge_side("allocs", 0, 10)),
    )
    .await;
    let root = fg.root.unwrap();
    assert_eq!(root.cumulative, 16);
    assert_eq!(root.diff, 0);

    let mut nodes = vec![];
    walk(&root.children, &mut nodes);
    assert!(!nodes.is_empty());
    assert!(nodes.iter().all(|n| n.diff == 0));
}

#[tokio::test]
async fn query_merge() {
    let metastore = Arc::new(Metastore::in_memory());
    let heap = testdata::heap_profile(0);
    let p = PprofConverter::new(&metastore, &heap)
        .await
        .unwrap()
        .profile("allocs", 0)
        .unwrap();

    for k in 0..=10 {
        let db = Arc::new(Db::new(Arc::clone(&metastore)));
        let q = Querier::new(Arc::clone(&db));
        let app = allocs(&db);

        let n: i64 = 1 << k;
        for j in 0..n {
            let mut p = p.clone();
            p.meta.timestamp = j + 1;
            app.append(p).await.unwrap();
        }

        let fg = flamegraph(&q, merge_request("allocs", 0, 1_000_000 * (n + 1))).await;
        assert_eq!(fg.total, 4 * n, "merging {} profiles", n);
    }
}

#[tokio::test]
async fn merge_without_profiles_is_empty() {
    let (db, q) = querier();
    append_pprof(&db, &allocs(&db), &testdata::heap_profile(100)).await;

    let fg = flamegraph(&q, merge_request("allocs", 0, 100)).await;
    assert_eq!(fg.total, 0);
    assert_eq!(fg.height, 1);
    assert!(fg.root.unwrap().children.is_empty());
}

#[tokio::test]
async fn top_and_pprof_reports() {
    let (db, q) = querier();
    let app = allocs(&db);
    for t in [10, 20] {
        append_pprof(&db, &app, &testdata::heap_profile(t)).await;
    }

    let mut req = merge_request("allocs", 0, 100);
    req.report_type = ReportType::Top as i32;
    let top = match q.query(Request::new(req)).await.unwrap().into_inner().report {
        Some(Report::Top(top)) => top,
        r => panic!("expected top, got {:?}", r),
    };
    assert_eq!(top.total, 8);
    assert_eq!(top.reported, 3);
    let first = &top.list[0];
    assert_eq!(first.meta.as_ref().unwrap().function_name, "alloc::alloc::alloc");
    assert_eq!((first.flat, first.cumulative), (8, 8));
    let main = top
        .list
        .iter()
        .find(|n| n.meta.as_ref().unwrap().function_name == "main.main")
        .unwrap();
    assert_eq!((main.flat, main.cumulative), (0, 8));

    let mut req = merge_request("allocs", 0, 100);
    req.report_type = ReportType::Pprof as i32;
    let raw = match q.query(Request::new(req)).await.unwrap().into_inner().report {
        Some(Report::Pprof(raw)) => raw,
        r => panic!("expected pprof, got {:?}", r),
    };
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    let p = decode_pprof(&raw).unwrap();
    assert_eq!(p.sample.iter().map(|s| s.value[0]).sum::<i64>(), 8);
    assert_eq!(p.time_nanos, 10);
}

#[tokio::test]
async fn pprof_report_of_a_diff_holds_differences() {
    let (db, q) = querier();
    let st = main_alloc_stacktrace(db.metastore()).await;
    let app = allocs(&db);
    app.append(profile(10, st, 100)).await.unwrap();
    app.append(profile(20, st, 100)).await.unwrap();

    let unchanged = pprof_report(&q, diff_request(single_side("allocs", 10), single_side("allocs", 20))).await;
    assert!(unchanged.sample.is_empty());

    app.append(profile(30, st, 160)).await.unwrap();
    let grown = pprof_report(&q, diff_request(single_side("allocs", 10), single_side("allocs", 30))).await;
    let values: Vec<i64> = grown.sample.iter().map(|s| s.value[0]).collect();
    assert_eq!(values, vec![60]);

    let shrunk = pprof_report(&q, diff_request(single_side("allocs", 30), single_side("allocs", 20))).await;
    let values: Vec<i64> = shrunk.sample.iter().map(|s| s.value[0]).collect();
    assert_eq!(values, vec![-60]);
}

#[tokio::test]
async fn cancelled_merge() {
    let (db, q) = querier();
    append_pprof(&db, &allocs(&db), &testdata::heap_profile(1)).await;

    let v = ValidatedQuery::try_from(&merge_request("allocs", 0, 10)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(q.run(&v, &cancel).await, Err(Error::Cancelled)));

    let err: Status = Error::Cancelled.into();
    assert_eq!(err.code(), Code::Cancelled);
}

#[tokio::test]
async fn labels_and_values() {
    let (db, q) = querier();
    let st = main_alloc_stacktrace(db.metastore()).await;
    for (name, pod) in [("allocs", "a"), ("allocs", "b"), ("cpu", "c")] {
        db.appender(&labels(&[("__name__", name), ("pod", pod)]))
            .unwrap()
            .append(profile(5, st, 1))
            .await
            .unwrap();
    }

    let resp = q
        .labels(Request::new(LabelsRequest {
            start: None,
            end: None,
        }))
        .await
        .unwrap();
    assert_eq!(resp.get_ref().label_names, vec!["__name__", "pod"]);

    let resp = q
        .values(Request::new(ValuesRequest {
            label_name: "__name__".into(),
            start: ts(0),
            end: ts(10),
        }))
        .await
        .unwrap();
    assert_eq!(resp.get_ref().label_values, vec!["allocs", "cpu"]);

    let resp = q
        .values(Request::new(ValuesRequest {
            label_name: "pod".into(),
            start: ts(6),
            end: ts(10),
        }))
        .await
        .unwrap();
    assert!(resp.get_ref().label_values.is_empty());

    let err = q
        .values(Request::new(ValuesRequest {
            label_name: "".into(),
            start: None,
            end: None,
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}
