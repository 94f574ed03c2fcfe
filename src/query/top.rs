use super::merge::StacktraceTable;
use super::resolve::Resolved;
use crate::error::Result;
use crate::querypb::{NodeMeta, Top, TopNode};
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
struct Entry {
    meta: NodeMeta,
    flat: i64,
    cumulative: i64,
    diff: i64,
}

/// Per-function table. `flat` counts the stacks a function is the leaf of,
/// `cumulative` every stack it appears in, once per stack even under
/// recursion. `diff` follows `flat`.
pub fn top(table: &StacktraceTable, resolved: &Resolved, unit: &str) -> Result<Top> {
    let mut entries: HashMap<String, Entry> = HashMap::new();

    for (id, totals) in table.sorted() {
        let frames = resolved.frames(&id)?;
        let mut seen: HashSet<String> = HashSet::with_capacity(frames.len());

        for (i, frame) in frames.iter().enumerate() {
            let name = frame.function_name();
            let entry = entries.entry(name.clone()).or_insert_with(|| Entry {
                meta: frame.meta(),
                flat: 0,
                cumulative: 0,
                diff: 0,
            });
            if i == 0 {
                entry.flat = entry.flat.saturating_add(totals.value);
                entry.diff = entry.diff.saturating_add(totals.diff);
            }
            if seen.insert(name) {
                entry.cumulative = entry.cumulative.saturating_add(totals.value);
            }
        }
    }

    let mut list: Vec<TopNode> = entries
        .into_values()
        .map(|e| TopNode {
            meta: Some(e.meta),
            cumulative: e.cumulative,
            flat: e.flat,
            diff: e.diff,
        })
        .collect();
    list.sort_by(|a, b| {
        b.flat
            .cmp(&a.flat)
            .then_with(|| b.cumulative.cmp(&a.cumulative))
            .then_with(|| name(a).cmp(name(b)))
    });

    Ok(Top {
        reported: list.len() as i32,
        total: table.total(),
        unit: unit.to_string(),
        list,
    })
}

fn name(n: &TopNode) -> &str {
    n.meta.as_ref().map_or("", |m| m.function_name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metastore::{Function, Line, LocationId, Metastore};
    use crate::profile::{Meta, Profile, Sample};

    async fn location(m: &Metastore, name: &str) -> LocationId {
        let f = m
            .get_or_create_function(Function {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        m.get_or_create_location(
            None,
            0,
            vec![Line {
                function_id: f,
                line: 1,
            }],
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn flat_and_cumulative() {
        let m = Metastore::in_memory();
        let main = location(&m, "main").await;
        let fib = location(&m, "fib").await;

        // main -> fib -> fib (recursive) with 4, main with 1.
        let deep = m.get_or_create_stacktrace(vec![fib, fib, main]).await.unwrap();
        let shallow = m.get_or_create_stacktrace(vec![main]).await.unwrap();

        let t = StacktraceTable::from_profile(&Profile::new(
            Meta::default(),
            vec![
                Sample {
                    stacktrace_id: deep,
                    value: 4,
                    companion: None,
                },
                Sample {
                    stacktrace_id: shallow,
                    value: 1,
                    companion: None,
                },
            ],
        ));
        let resolved = Resolved::load(&m, &t.stacktrace_ids()).await.unwrap();
        let top = top(&t, &resolved, "bytes").unwrap();

        assert_eq!(top.total, 5);
        assert_eq!(top.reported, 2);
        assert_eq!(top.unit, "bytes");

        assert_eq!(name(&top.list[0]), "fib");
        assert_eq!((top.list[0].flat, top.list[0].cumulative), (4, 4));
        assert_eq!(name(&top.list[1]), "main");
        assert_eq!((top.list[1].flat, top.list[1].cumulative), (1, 5));
    }
}
