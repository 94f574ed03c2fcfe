use crate::pprofpb::Profile;
use anyhow::bail;

/// Checks that every index and reference inside a decoded pprof document
/// points at something that exists, so conversion can index freely.
pub fn validate_pprof_profile(profile: &Profile) -> anyhow::Result<()> {
    if let Some(elem) = profile.string_table.first() {
        if !elem.is_empty() {
            bail!("first string table element is expected to be empty");
        }
    }

    let string_table_len = profile.string_table.len() as i64;
    let string_ok = |idx: i64| idx == 0 || (0 < idx && idx < string_table_len);

    for vt in profile.sample_type.iter().chain(profile.period_type.iter()) {
        if !string_ok(vt.r#type) || !string_ok(vt.unit) {
            bail!("value type string index out of bounds");
        }
    }

    for (i, mapping) in profile.mapping.iter().enumerate() {
        if mapping.id != (i + 1) as u64 {
            bail!("mapping id is not sequential");
        }

        if !string_ok(mapping.filename) {
            bail!("mapping filename index out of bounds");
        }

        if !string_ok(mapping.build_id) {
            bail!("mapping build_id index out of bounds");
        }

        if mapping.memory_limit < mapping.memory_start {
            bail!("mapping {} ends before it starts", mapping.id);
        }
    }

    let functions_length = profile.function.len() as u64;
    for (i, function) in profile.function.iter().enumerate() {
        if function.id != (i + 1) as u64 {
            bail!("function id is not sequential");
        }

        if !string_ok(function.name) {
            bail!("function name index out of bounds");
        }

        if !string_ok(function.system_name) {
            bail!("function system_name index out of bounds");
        }

        if !string_ok(function.filename) {
            bail!("function filename index out of bounds");
        }
    }

    for (i, location) in profile.location.iter().enumerate() {
        if location.id != (i + 1) as u64 {
            bail!("location id is not sequential");
        }

        if location.mapping_id > profile.mapping.len() as u64 {
            bail!("location mapping_id index out of bounds");
        }

        for line in location.line.iter() {
            if line.function_id > functions_length {
                bail!("location function_id index out of bounds");
            }
        }
    }

    if profile.sample_type.is_empty() && !profile.sample.is_empty() {
        bail!("profile has samples but no sample_type");
    }

    for (i, sample) in profile.sample.iter().enumerate() {
        if sample.value.len() != profile.sample_type.len() {
            bail!(
                "sample {} has {} values, expected {}",
                i,
                sample.value.len(),
                profile.sample_type.len()
            );
        }

        for (j, location) in sample.location_id.iter().enumerate() {
            if *location == 0 {
                bail!(
                    "sample {} has location_id 0 at index {}. it must be non zero.",
                    i,
                    j
                );
            }

            if *location > profile.location.len() as u64 {
                bail!(
                    "sample {} has location_id {} at index {}. it must be at most {}.",
                    i,
                    location,
                    j,
                    profile.location.len()
                );
            }
        }

        for (j, label) in sample.label.iter().enumerate() {
            if label.key == 0 {
                bail!(
                    "sample {} has label key 0 at index {}. it must be non zero.",
                    i,
                    j
                );
            }

            if !string_ok(label.key) || !string_ok(label.str) {
                bail!(
                    "sample {} has a label string index at index {} outside the string table of {}.",
                    i,
                    j,
                    profile.string_table.len()
                );
            }
        }
    }

    Ok(())
}

/// Index of the sample type paired with `sample_index` in dual-valued
/// profiles: `alloc_space` with `alloc_objects`, `inuse_objects` with
/// `inuse_space` and so on.
pub fn companion_index(profile: &Profile, sample_index: usize) -> Option<usize> {
    let name = |i: usize| -> Option<&str> {
        let vt = profile.sample_type.get(i)?;
        profile
            .string_table
            .get(usize::try_from(vt.r#type).ok()?)
            .map(String::as_str)
    };

    let own = name(sample_index)?;
    let (prefix, suffix) = own.rsplit_once('_')?;
    let other = match suffix {
        "space" => "objects",
        "objects" => "space",
        "bytes" => "count",
        "count" => "bytes",
        _ => return None,
    };
    let wanted = format!("{}_{}", prefix, other);

    (0..profile.sample_type.len()).find(|&i| i != sample_index && name(i) == Some(wanted.as_str()))
}
