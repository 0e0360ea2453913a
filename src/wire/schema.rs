use crate::error::ArchiveError;
use crate::hash;
use crate::wire::fields::{is_hex, parse_hex};
use crate::wire::FIXED_FIELDS;

/// Resolved indices into a record's header field vector.
///
/// Everything after the 25 fixed fields floats: the JSON descriptor is five
/// fields on new-style streams and four on legacy ones, and the extras block
/// is variable length. The checksum fields land wherever those leave them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub json_type: usize,
    /// Present only on new-style records.
    pub json_len: Option<usize>,
    pub json_size: usize,
    pub json_cs_algo: usize,
    pub json_cs_value: usize,
    pub extras_size: usize,
    pub extras_count: usize,
    pub extras: std::ops::Range<usize>,
    pub header_cs_algo: usize,
    pub content_cs_algo: usize,
    pub header_cs_value: usize,
    pub content_cs_value: usize,
}

/// Decide the record's shape from the field values themselves.
///
/// At index 25 sits the JSON type name. If the two values after it are hex
/// and the third names a checksum algorithm, the record carries the optional
/// key-count field (new style); otherwise index 26 is already the JSON byte
/// size (legacy).
pub fn resolve(fields: &[Vec<u8>]) -> Result<FieldLayout, ArchiveError> {
    if fields.len() < FIXED_FIELDS {
        return Err(ArchiveError::MalformedRecord(format!(
            "expected at least {FIXED_FIELDS} header fields, got {}",
            fields.len()
        )));
    }

    let at = |i: usize| fields.get(i).map(|f| f.as_slice()).unwrap_or(b"");

    let new_style = is_hex(at(26))
        && is_hex(at(27))
        && hash::is_checksum_name(&String::from_utf8_lossy(at(28)));

    let (json_len, json_size, json_cs_algo, json_cs_value, extras_size) = if new_style {
        (Some(26), 27, 28, 29, 30)
    } else {
        (None, 26, 27, 28, 29)
    };

    let extras_count = extras_size + 1;
    let count = parse_hex(at(extras_count)).ok_or_else(|| {
        ArchiveError::MalformedRecord("extras count is not hex".to_string())
    })? as usize;

    let extras_start = extras_count + 1;
    let after_extras = extras_start + count;

    let layout = FieldLayout {
        json_type: 25,
        json_len,
        json_size,
        json_cs_algo,
        json_cs_value,
        extras_size,
        extras_count,
        extras: extras_start..after_extras,
        header_cs_algo: after_extras,
        content_cs_algo: after_extras + 1,
        header_cs_value: after_extras + 2,
        content_cs_value: after_extras + 3,
    };

    if layout.content_cs_value >= fields.len() {
        return Err(ArchiveError::MalformedRecord(format!(
            "field vector of {} entries has no room for the checksum fields",
            fields.len()
        )));
    }
    Ok(layout)
}
