use super::merge::StacktraceTable;
use super::resolve::Resolved;
use crate::error::Result;
use crate::metastore::{FunctionId, LocationId, MappingId, StacktraceId};
use crate::pprofpb;
use crate::profile::Meta;
use std::collections::HashMap;

/// Rebuilds a pprof document from an aggregated stacktrace table.
///
/// Entities are numbered in first-use order; every string is interned once.
pub(crate) struct PprofWriter<'a> {
    resolved: &'a Resolved,
    res: pprofpb::Profile,
    mapping_by_id: HashMap<MappingId, u64>,
    function_by_id: HashMap<FunctionId, u64>,
    location_by_id: HashMap<LocationId, u64>,
    string_table_index: HashMap<String, i64>,
}

impl<'a> PprofWriter<'a> {
    pub(crate) fn new(meta: Option<&Meta>, resolved: &'a Resolved) -> Self {
        let meta = meta.cloned().unwrap_or_default();
        let res = pprofpb::Profile {
            string_table: vec!["".to_string()],
            time_nanos: meta.timestamp,
            duration_nanos: meta.duration,
            period: meta.period,
            ..Default::default()
        };

        let mut w = Self {
            resolved,
            res,
            mapping_by_id: HashMap::new(),
            function_by_id: HashMap::new(),
            location_by_id: HashMap::new(),
            string_table_index: HashMap::from([("".into(), 0)]),
        };

        w.res.period_type = Some(pprofpb::ValueType {
            r#type: w.string(&meta.period_type.type_),
            unit: w.string(&meta.period_type.unit),
        });

        w.res.sample_type = vec![pprofpb::ValueType {
            r#type: w.string(&meta.sample_type.type_),
            unit: w.string(&meta.sample_type.unit),
        }];

        w
    }

    fn string(&mut self, s: &str) -> i64 {
        if let Some(idx) = self.string_table_index.get(s) {
            return *idx;
        }

        let idx = self.res.string_table.len() as i64;
        self.res.string_table.push(s.to_string());
        self.string_table_index.insert(s.to_string(), idx);
        idx
    }

    fn mapping(&mut self, id: MappingId) -> Result<u64> {
        if let Some(pprof_id) = self.mapping_by_id.get(&id) {
            return Ok(*pprof_id);
        }

        let m = Resolved::mapping(self.resolved, &id)?;
        let pprof_id = self.res.mapping.len() as u64 + 1;
        let mapping = pprofpb::Mapping {
            id: pprof_id,
            memory_start: m.start,
            memory_limit: m.limit,
            file_offset: m.offset,
            filename: self.string(&m.file),
            build_id: self.string(&m.build_id),
            has_functions: m.has_functions,
            has_filenames: m.has_filenames,
            has_line_numbers: m.has_line_numbers,
            has_inline_frames: m.has_inline_frames,
        };
        self.res.mapping.push(mapping);
        self.mapping_by_id.insert(id, pprof_id);
        Ok(pprof_id)
    }

    fn function(&mut self, id: FunctionId) -> Result<u64> {
        if let Some(pprof_id) = self.function_by_id.get(&id) {
            return Ok(*pprof_id);
        }

        let f = Resolved::function(self.resolved, &id)?;
        let pprof_id = self.res.function.len() as u64 + 1;
        let function = pprofpb::Function {
            id: pprof_id,
            name: self.string(&f.name),
            system_name: self.string(&f.system_name),
            filename: self.string(&f.filename),
            start_line: f.start_line,
        };
        self.res.function.push(function);
        self.function_by_id.insert(id, pprof_id);
        Ok(pprof_id)
    }

    fn location(&mut self, id: LocationId) -> Result<u64> {
        if let Some(pprof_id) = self.location_by_id.get(&id) {
            return Ok(*pprof_id);
        }

        let l = Resolved::location(self.resolved, &id)?;
        let mapping_id = match l.mapping_id {
            Some(m) => self.mapping(m)?,
            None => 0,
        };
        let mut line = Vec::with_capacity(l.lines.len());
        for ln in l.lines.iter() {
            line.push(pprofpb::Line {
                function_id: self.function(ln.function_id)?,
                line: ln.line,
            });
        }

        let pprof_id = self.res.location.len() as u64 + 1;
        self.res.location.push(pprofpb::Location {
            id: pprof_id,
            mapping_id,
            address: l.address,
            line,
            is_folded: false,
        });
        self.location_by_id.insert(id, pprof_id);
        Ok(pprof_id)
    }

    pub(crate) fn write_sample(&mut self, id: StacktraceId, value: i64) -> Result<()> {
        let stacktrace = Resolved::stacktrace(self.resolved, &id)?;
        let mut location_id = Vec::with_capacity(stacktrace.location_ids.len());
        for l in stacktrace.location_ids.iter() {
            location_id.push(self.location(*l)?);
        }

        self.res.sample.push(pprofpb::Sample {
            location_id,
            value: vec![value],
            label: vec![],
        });
        Ok(())
    }

    pub(crate) fn finish(self) -> pprofpb::Profile {
        self.res
    }
}

/// The table as a pprof document. Diff tables are written as `b - a` per
/// stacktrace. Zero-valued rows are left out.
pub(crate) fn write_pprof(table: &StacktraceTable, resolved: &Resolved) -> Result<pprofpb::Profile> {
    let mut w = PprofWriter::new(table.meta(), resolved);
    for (id, totals) in table.sorted() {
        let value = if table.is_diff() {
            totals.diff
        } else {
            totals.value
        };
        if value != 0 {
            w.write_sample(id, value)?;
        }
    }
    Ok(w.finish())
}
