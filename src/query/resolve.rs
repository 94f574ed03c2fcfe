use crate::error::{Error, Result};
use crate::metastore::{
    Function, FunctionId, Location, LocationId, Mapping, MappingId, Metastore, Stacktrace,
    StacktraceId,
};
use crate::querypb::NodeMeta;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

/// All Metastore entities reachable from a set of stacktraces, fetched in one
/// batch per entity kind.
#[derive(Debug, Default)]
pub struct Resolved {
    stacktraces: HashMap<StacktraceId, Arc<Stacktrace>>,
    locations: HashMap<LocationId, Arc<Location>>,
    functions: HashMap<FunctionId, Arc<Function>>,
    mappings: HashMap<MappingId, Arc<Mapping>>,
}

/// One frame of a resolved stacktrace. Inlined functions of a location each
/// get their own frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub location_id: LocationId,
    /// Position among the location's inlined frames, 0 being the leaf-most.
    pub inline_index: usize,
    pub address: u64,
    pub function: Option<Arc<Function>>,
    pub line: i64,
    pub mapping: Option<Arc<Mapping>>,
}

impl Resolved {
    pub async fn load(metastore: &Metastore, ids: &[StacktraceId]) -> Result<Self> {
        let stacktraces = metastore.get_stacktraces(ids).await.map_err(unresolved)?;

        let location_ids = unique(stacktraces.iter().flat_map(|s| s.location_ids.iter().copied()));
        let locations = metastore
            .get_locations(&location_ids)
            .await
            .map_err(unresolved)?;

        let function_ids = unique(
            locations
                .iter()
                .flat_map(|l| l.lines.iter().map(|line| line.function_id)),
        );
        let functions = metastore
            .get_functions(&function_ids)
            .await
            .map_err(unresolved)?;

        let mapping_ids = unique(locations.iter().filter_map(|l| l.mapping_id));
        let mappings = metastore
            .get_mappings(&mapping_ids)
            .await
            .map_err(unresolved)?;

        log::debug!(
            "Resolved {} stacktraces, {} locations, {} functions, {} mappings",
            stacktraces.len(),
            locations.len(),
            functions.len(),
            mappings.len()
        );

        Ok(Self {
            stacktraces: ids.iter().copied().zip(stacktraces).collect(),
            locations: location_ids.into_iter().zip(locations).collect(),
            functions: function_ids.into_iter().zip(functions).collect(),
            mappings: mapping_ids.into_iter().zip(mappings).collect(),
        })
    }

    pub fn stacktrace(&self, id: &StacktraceId) -> Result<&Arc<Stacktrace>> {
        lookup(&self.stacktraces, id, "stacktrace")
    }

    pub fn location(&self, id: &LocationId) -> Result<&Arc<Location>> {
        lookup(&self.locations, id, "location")
    }

    pub fn function(&self, id: &FunctionId) -> Result<&Arc<Function>> {
        lookup(&self.functions, id, "function")
    }

    pub fn mapping(&self, id: &MappingId) -> Result<&Arc<Mapping>> {
        lookup(&self.mappings, id, "mapping")
    }

    /// Frames of stacktrace `id`, leaf first.
    pub fn frames(&self, id: &StacktraceId) -> Result<Vec<Frame>> {
        let stacktrace = self.stacktrace(id)?;
        let mut frames = Vec::with_capacity(stacktrace.location_ids.len());

        for location_id in stacktrace.location_ids.iter() {
            let location = self.location(location_id)?;
            let mapping = match location.mapping_id {
                Some(m) => Some(Arc::clone(self.mapping(&m)?)),
                None => None,
            };

            if location.lines.is_empty() {
                frames.push(Frame {
                    location_id: *location_id,
                    inline_index: 0,
                    address: location.address,
                    function: None,
                    line: 0,
                    mapping,
                });
                continue;
            }

            for (i, line) in location.lines.iter().enumerate() {
                frames.push(Frame {
                    location_id: *location_id,
                    inline_index: i,
                    address: location.address,
                    function: Some(Arc::clone(self.function(&line.function_id)?)),
                    line: line.line,
                    mapping: mapping.clone(),
                });
            }
        }

        Ok(frames)
    }
}

impl Frame {
    /// Function name, or the hex address for frames without symbols.
    pub fn function_name(&self) -> String {
        match &self.function {
            Some(f) if !f.name.is_empty() => f.name.clone(),
            Some(f) if !f.system_name.is_empty() => f.system_name.clone(),
            _ => format!("{:#x}", self.address),
        }
    }

    pub fn meta(&self) -> NodeMeta {
        let (system_name, filename) = match &self.function {
            Some(f) => (f.system_name.clone(), f.filename.clone()),
            None => (String::new(), String::new()),
        };
        let (mapping_file, build_id) = match &self.mapping {
            Some(m) => (m.file.clone(), m.build_id.clone()),
            None => (String::new(), String::new()),
        };

        NodeMeta {
            location_id: self.location_id.to_string(),
            address: self.address,
            function_name: self.function_name(),
            system_name,
            filename,
            line: self.line,
            mapping_file,
            build_id,
        }
    }
}

fn unique<T: Copy + Eq + Hash>(ids: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

fn lookup<'a, K: Eq + Hash + std::fmt::Display, V>(
    map: &'a HashMap<K, V>,
    id: &K,
    kind: &str,
) -> Result<&'a V> {
    map.get(id)
        .ok_or_else(|| Error::internal(format!("{} {} was not resolved", kind, id)))
}

/// Stored profiles only reference existing entities, so a missing one while
/// building a report is an internal failure, not a bad request.
fn unresolved(err: Error) -> Error {
    match err {
        Error::NotFound(msg) => Error::internal(format!("unresolvable reference: {}", msg)),
        e => e,
    }
}
