use anyhow::Context;
use chrono::{TimeZone, Utc};
use profstore::config::Config;
use profstore::normalizer::{decode_pprof, PprofConverter};
use profstore::query::{MergeSelection, Querier, Query, ValidatedQuery};
use profstore::querypb::query_request::ReportType;
use profstore::querypb::query_response::Report;
use profstore::storage::{Db, LabelSet, Matcher, METRIC_NAME};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: profstore [--config <file>] <pprof file>...";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1).peekable();
    let config = match args.peek().map(String::as_str) {
        Some("--config") => {
            args.next();
            let path = args.next().context(USAGE)?;
            Config::from_path(path)?
        }
        Some("-h") | Some("--help") => {
            println!("{}", USAGE);
            return Ok(());
        }
        _ => Config::default(),
    };
    let paths: Vec<String> = args.collect();

    colog::default_builder()
        .filter_level(config.level_filter()?)
        .init();

    let metastore = Arc::new(config.open_metastore()?);
    let db = Arc::new(Db::new(Arc::clone(&metastore)));
    let querier = Querier::with_config(Arc::clone(&db), &config);

    // Sample type name -> (earliest, latest) ingested timestamp.
    let mut ingested: BTreeMap<String, (i64, i64)> = BTreeMap::new();

    for path in paths.iter() {
        let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
        let doc = decode_pprof(&raw).with_context(|| format!("Failed to decode {}", path))?;
        let converter = PprofConverter::new(&metastore, &doc).await?;

        for profile in converter.profiles(path)? {
            let name = match profile.meta.sample_type.type_.as_str() {
                "" => path.clone(),
                t => t.to_string(),
            };
            let labels = LabelSet::from_pairs([(METRIC_NAME, name.as_str())])?;
            let ts = profile.timestamp();

            log::info!(
                "Ingesting {} ({} samples) from {} at {}",
                name,
                profile.samples.len(),
                path,
                Utc.timestamp_nanos(ts)
            );
            if let Err(e) = db.appender(&labels)?.append(profile).await {
                log::warn!("Skipping {} from {}: {}", name, path, e);
                continue;
            }

            let range = ingested.entry(name).or_insert((ts, ts));
            range.0 = range.0.min(ts);
            range.1 = range.1.max(ts);
        }
    }

    if ingested.is_empty() {
        log::warn!("No profiles ingested");
        return Ok(());
    }

    for (name, (start, end)) in ingested {
        let q = ValidatedQuery {
            query: Query::Merge(MergeSelection {
                matchers: vec![Matcher::equal(METRIC_NAME, name.as_str())],
                start,
                end: end.saturating_add(1),
            }),
            report_type: ReportType::Top,
        };

        let top = match querier.run(&q, &CancellationToken::new()).await?.report {
            Some(Report::Top(top)) => top,
            _ => anyhow::bail!("Query for {} did not return a top table", name),
        };

        println!(
            "{} from {} to {}: total {} {}",
            name,
            Utc.timestamp_nanos(start),
            Utc.timestamp_nanos(end),
            top.total,
            top.unit
        );
        println!("{:>14} {:>14}  function", "flat", "cum");
        for node in top.list.iter() {
            let function = node.meta.as_ref().map_or("", |m| m.function_name.as_str());
            println!("{:>14} {:>14}  {}", node.flat, node.cumulative, function);
        }
        println!();
    }

    Ok(())
}
