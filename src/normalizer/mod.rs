//! Converts pprof documents into stored profiles.
//!
//! Every mapping, function, location and stacktrace a document references is
//! created in the Metastore before the resulting [`Profile`] is handed out, so
//! profiles produced here can always be appended.

mod decode;
mod utils;

pub use decode::{decode_pprof, encode_pprof};
pub use utils::{companion_index, validate_pprof_profile};

use crate::error::{Error, Result};
use crate::metastore::{
    Function, FunctionId, Line, LocationId, Mapping, MappingId, Metastore, StacktraceId,
};
use crate::pprofpb;
use crate::profile::{Meta, Profile, Sample, ValueType};
use crate::symbols::Demangler;
use std::collections::HashMap;

/// A validated pprof document whose entities have been resolved to Metastore
/// IDs. One converter yields a profile per sample type without touching the
/// Metastore again.
#[derive(Debug)]
pub struct PprofConverter<'a> {
    profile: &'a pprofpb::Profile,
    stacktraces: Vec<StacktraceId>,
}

impl<'a> PprofConverter<'a> {
    pub async fn new(metastore: &Metastore, profile: &'a pprofpb::Profile) -> Result<Self> {
        validate_pprof_profile(profile)
            .map_err(|e| Error::invalid_argument(format!("invalid pprof profile: {}", e)))?;

        let string = |idx: i64| string_at(&profile.string_table, idx);

        let mut mappings: Vec<MappingId> = Vec::with_capacity(profile.mapping.len());
        for m in profile.mapping.iter() {
            let id = metastore
                .get_or_create_mapping(Mapping {
                    start: m.memory_start,
                    limit: m.memory_limit,
                    offset: m.file_offset,
                    build_id: string(m.build_id),
                    file: string(m.filename),
                    has_functions: m.has_functions,
                    has_filenames: m.has_filenames,
                    has_line_numbers: m.has_line_numbers,
                    has_inline_frames: m.has_inline_frames,
                })
                .await?;
            mappings.push(id);
        }

        let demangler = Demangler::new(false);
        let mut functions: Vec<FunctionId> = Vec::with_capacity(profile.function.len());
        for f in profile.function.iter() {
            let function = demangler.demangle(&Function {
                name: string(f.name),
                system_name: string(f.system_name),
                filename: string(f.filename),
                start_line: f.start_line,
            });
            functions.push(metastore.get_or_create_function(function).await?);
        }

        let mut locations: Vec<LocationId> = Vec::with_capacity(profile.location.len());
        for l in profile.location.iter() {
            let mapping_id = match l.mapping_id {
                0 => None,
                id => Some(mappings[id as usize - 1]),
            };
            let lines = l
                .line
                .iter()
                .filter(|line| line.function_id != 0)
                .map(|line| Line {
                    function_id: functions[line.function_id as usize - 1],
                    line: line.line,
                })
                .collect();
            locations.push(
                metastore
                    .get_or_create_location(mapping_id, l.address, lines)
                    .await?,
            );
        }

        let mut by_path: HashMap<&[u64], StacktraceId> = HashMap::new();
        let mut stacktraces = Vec::with_capacity(profile.sample.len());
        for s in profile.sample.iter() {
            let id = match by_path.get(s.location_id.as_slice()) {
                Some(id) => *id,
                None => {
                    let ids = s
                        .location_id
                        .iter()
                        .map(|id| locations[*id as usize - 1])
                        .collect();
                    let id = metastore.get_or_create_stacktrace(ids).await?;
                    by_path.insert(s.location_id.as_slice(), id);
                    id
                }
            };
            stacktraces.push(id);
        }

        log::debug!(
            "Resolved pprof profile: {} mappings, {} functions, {} locations, {} stacktraces",
            mappings.len(),
            functions.len(),
            locations.len(),
            by_path.len()
        );

        Ok(Self {
            profile,
            stacktraces,
        })
    }

    pub fn num_sample_types(&self) -> usize {
        self.profile.sample_type.len()
    }

    /// The profile holding the values of `sample_index`, with the paired
    /// sample type (if any) as companion value. Samples sharing a stacktrace
    /// are summed and all-zero samples are dropped.
    pub fn profile(&self, name: &str, sample_index: usize) -> Result<Profile> {
        if sample_index >= self.num_sample_types() {
            return Err(Error::invalid_argument(format!(
                "sample index {} out of range, profile has {} sample types",
                sample_index,
                self.num_sample_types()
            )));
        }
        let companion = companion_index(self.profile, sample_index);

        let mut samples: Vec<Sample> = Vec::with_capacity(self.profile.sample.len());
        let mut positions: HashMap<StacktraceId, usize> = HashMap::new();
        for (s, stacktrace_id) in self.profile.sample.iter().zip(self.stacktraces.iter()) {
            let value = s.value[sample_index];
            let second = companion.map(|c| s.value[c]);
            if value == 0 && second.unwrap_or(0) == 0 {
                continue;
            }

            match positions.get(stacktrace_id) {
                Some(&pos) => {
                    let sample = &mut samples[pos];
                    sample.value = sample.value.saturating_add(value);
                    sample.companion = sample.companion.zip(second).map(|(a, b)| a.saturating_add(b));
                }
                None => {
                    positions.insert(*stacktrace_id, samples.len());
                    samples.push(Sample {
                        stacktrace_id: *stacktrace_id,
                        value,
                        companion: second,
                    });
                }
            }
        }

        Ok(Profile::new(self.meta(name, sample_index), samples))
    }

    /// One profile per sample type, in document order.
    pub fn profiles(&self, name: &str) -> Result<Vec<Profile>> {
        (0..self.num_sample_types())
            .map(|i| self.profile(name, i))
            .collect()
    }

    fn meta(&self, name: &str, sample_index: usize) -> Meta {
        let p = self.profile;
        let value_type = |vt: Option<&pprofpb::ValueType>| match vt {
            Some(vt) => ValueType {
                type_: string_at(&p.string_table, vt.r#type),
                unit: string_at(&p.string_table, vt.unit),
            },
            None => ValueType::default(),
        };

        Meta {
            name: name.to_string(),
            period_type: value_type(p.period_type.as_ref()),
            sample_type: value_type(p.sample_type.get(sample_index)),
            timestamp: p.time_nanos,
            duration: p.duration_nanos,
            period: p.period,
        }
    }
}

fn string_at(table: &[String], idx: i64) -> String {
    usize::try_from(idx)
        .ok()
        .and_then(|i| table.get(i))
        .cloned()
        .unwrap_or_default()
}

/// Decodes, validates and converts the sample type at `sample_index` of a raw
/// (optionally gzipped) pprof document.
pub async fn profile_from_pprof(
    metastore: &Metastore,
    raw: &[u8],
    name: &str,
    sample_index: usize,
) -> Result<Profile> {
    let p = decode_pprof(raw)?;
    PprofConverter::new(metastore, &p)
        .await?
        .profile(name, sample_index)
}
