//! NeoFile wire format
//!
//! An archive is a flat sequence of delimited text fields with two raw byte
//! regions per record. Every field is its payload followed by the configured
//! delimiter (one `0x00` byte unless overridden). Numbers are lowercase hex
//! without prefix or padding; checksums are lowercase hex strings.
//!
//! # Archive layout
//!
//! | Field | Description |
//! | ----- | ----------- |
//! | magic+ver | e.g. `NeoFile001` |
//! | headersize | byte length of the remaining preamble body, hex |
//! | scratch | `3 + 5 + extras + 1` in hex, opaque compatibility slot |
//! | encoding | usually `UTF-8` |
//! | os tag | free text |
//! | num_files | advisory entry count, hex |
//! | extras size | byte length of the extras blob, hex |
//! | extras count | hex, followed by that many extra fields |
//! | checksum algo | digest algorithm of the preamble |
//! | checksum | digest of everything above, delimiters included |
//!
//! Records follow, then the end sentinel: a `0` field twice.
//!
//! # Record layout
//!
//! | Region | Description |
//! | ------ | ----------- |
//! | headersize | header byte count minus one trailing delimiter, hex |
//! | field count | number of header fields that follow, hex |
//! | 25 fixed fields | type, encodings, names, sizes, times, mode, ownership, devices, seek hint |
//! | JSON descriptor | `type, key count, byte size, algo, digest` (legacy streams omit the key count) |
//! | extras | size field, count field, then that many extra fields |
//! | algorithm names | header digest algo, content digest algo |
//! | digest values | header digest, content digest |
//! | JSON region | exactly `json size` raw bytes, then a delimiter |
//! | stored region | `fcsize` bytes when compressed, else `fsize`, then a delimiter |
//!
//! The header digest covers everything from the record's headersize field
//! through the content-algorithm field, delimiters included; the two digest
//! value fields are outside their own coverage. The content digest covers
//! the stored bytes exactly as written, the JSON digest the raw JSON bytes.
//!
//! Whether a record carries the optional JSON key-count field is decided by
//! inspection, not negotiation; see [`schema`].

pub mod builder;
pub mod fields;
pub mod reader;
pub mod schema;

/// Granularity of the delimiter scan.
pub(crate) const SCAN_CHUNK: usize = 4096;

/// A record announcing more fields than this is rejected rather than
/// buffered, mirroring the cap on chunk sizes elsewhere in the reader.
pub(crate) const MAX_FIELDS: usize = 64 * 1024;

/// Count of the fixed leading fields every record must carry.
pub(crate) const FIXED_FIELDS: usize = 25;
