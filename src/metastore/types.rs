use super::hash::{FunctionId, LocationId, MappingId};
use serde::{Deserialize, Serialize};

/// A loaded binary or shared object region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub start: u64,
    pub limit: u64,
    pub offset: u64,
    pub build_id: String,
    pub file: String,
    pub has_functions: bool,
    pub has_filenames: bool,
    pub has_line_numbers: bool,
    pub has_inline_frames: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct MappingKey<'a> {
    size: u64,
    offset: u64,
    build_id: &'a str,
    file: &'a str,
}

impl Mapping {
    /// Two mappings of the same object loaded at different base addresses share
    /// a key, hence the size instead of the absolute range.
    pub(crate) fn key(&self) -> MappingKey<'_> {
        MappingKey {
            size: self.limit.saturating_sub(self.start),
            offset: self.offset,
            build_id: &self.build_id,
            file: &self.file,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub system_name: String,
    pub filename: String,
    pub start_line: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct FunctionKey<'a> {
    name: &'a str,
    filename: &'a str,
    start_line: i64,
}

impl Function {
    pub(crate) fn key(&self) -> FunctionKey<'_> {
        FunctionKey {
            name: &self.name,
            filename: &self.filename,
            start_line: self.start_line,
        }
    }
}

/// One (possibly inlined) frame of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Line {
    pub function_id: FunctionId,
    pub line: i64,
}

/// An instruction address, with its inlined frames ordered leaf-most first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub mapping_id: Option<MappingId>,
    pub address: u64,
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct LocationKey<'a> {
    mapping_id: Option<MappingId>,
    address: u64,
    lines: &'a [Line],
}

impl Location {
    pub(crate) fn key(&self) -> LocationKey<'_> {
        LocationKey {
            mapping_id: self.mapping_id,
            address: self.address,
            lines: &self.lines,
        }
    }
}

/// Call stack of one sample, leaf location first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stacktrace {
    pub location_ids: Vec<LocationId>,
}

impl Stacktrace {
    pub(crate) fn key(&self) -> &[LocationId] {
        &self.location_ids
    }
}
