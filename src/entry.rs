use serde_json::{Map, Value};

use crate::compress::Compression;
use crate::hash::ChecksumKind;

/// Mode bits a packed file falls back to: regular file, rw for everyone.
pub const MODE_FILE_DEFAULT: u32 = 0o100666;
/// Fallback for directories: directory bit, rwxr-xr-x.
pub const MODE_DIR_DEFAULT: u32 = 0o40755;

/// The seven entry type codes of the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Hardlink,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
}

impl EntryKind {
    pub fn code(&self) -> u64 {
        match self {
            EntryKind::File => 0,
            EntryKind::Hardlink => 1,
            EntryKind::Symlink => 2,
            EntryKind::CharDevice => 3,
            EntryKind::BlockDevice => 4,
            EntryKind::Directory => 5,
            EntryKind::Fifo => 6,
        }
    }

    pub fn from_code(code: u64) -> Option<EntryKind> {
        match code {
            0 => Some(EntryKind::File),
            1 => Some(EntryKind::Hardlink),
            2 => Some(EntryKind::Symlink),
            3 => Some(EntryKind::CharDevice),
            4 => Some(EntryKind::BlockDevice),
            5 => Some(EntryKind::Directory),
            6 => Some(EntryKind::Fifo),
            _ => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        *self == EntryKind::Directory
    }
}

/// The per-record JSON sidecar. Archives in the wild carry either nothing,
/// an object, or (rarely) a bare value.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonSidecar {
    Absent,
    Object(Map<String, Value>),
    Value(Value),
}

impl JsonSidecar {
    pub fn is_absent(&self) -> bool {
        matches!(self, JsonSidecar::Absent)
    }

    /// Key count serialized into the new-style `json_len` field.
    pub fn key_count(&self) -> usize {
        match self {
            JsonSidecar::Object(map) => map.len(),
            _ => 0,
        }
    }

    /// Compact UTF-8 JSON bytes; empty when absent.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            JsonSidecar::Absent => Vec::new(),
            // Maps and values always serialize
            JsonSidecar::Object(map) => serde_json::to_vec(map).unwrap_or_default(),
            JsonSidecar::Value(value) => serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    /// Decode a sidecar region. Undecodable bytes degrade to `Absent`, the
    /// way the format has always been read.
    pub fn from_bytes(raw: &[u8]) -> JsonSidecar {
        if raw.is_empty() {
            return JsonSidecar::Absent;
        }
        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => JsonSidecar::Object(map),
            Ok(value) => JsonSidecar::Value(value),
            Err(_) => JsonSidecar::Absent,
        }
    }
}

/// An algorithm/value pair as stored on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub kind: ChecksumKind,
    pub value: String,
}

impl Digest {
    pub fn none() -> Digest {
        Digest {
            kind: ChecksumKind::None,
            value: "0".to_string(),
        }
    }
}

/// One archive record, fully normalized. Lives in memory only for the span
/// of a single operation; the byte stream is the persistent form.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub fid: u64,
    pub finode: u64,
    pub fname: String,
    pub flinkname: String,
    pub ftype: EntryKind,
    /// Logical byte count of the raw content.
    pub fsize: u64,
    /// Byte count of the stored region when compressed, 0 otherwise.
    pub fcsize: u64,
    pub fatime: u64,
    pub fmtime: u64,
    pub fctime: u64,
    pub fbtime: u64,
    pub fmode: u32,
    pub fwinattributes: u64,
    pub fuid: u64,
    pub funame: String,
    pub fgid: u64,
    pub fgname: String,
    pub flinkcount: u64,
    pub fdev: u64,
    pub fdev_minor: u64,
    pub fdev_major: u64,
    pub fcompression: Compression,
    pub fencoding: String,
    pub fcencoding: String,
    /// Opaque seek hint, emitted on write and carried verbatim on read.
    pub fseeknext: String,
    pub fjson: JsonSidecar,
    /// Logical content bytes, or None for a listing-only parse.
    pub fcontent: Option<Vec<u8>>,
    /// Set while `fcontent` still holds the stored (compressed) form:
    /// either decompression was not requested, or it failed and the parse
    /// tolerated it.
    pub content_compressed: bool,
    pub header_digest: Digest,
    pub content_digest: Digest,
    pub json_digest: Digest,
}

impl Entry {
    pub fn new(name: &str, kind: EntryKind) -> Entry {
        Entry {
            fid: 0,
            finode: 0,
            fname: normalize_name(name),
            flinkname: String::new(),
            ftype: kind,
            fsize: 0,
            fcsize: 0,
            fatime: 0,
            fmtime: 0,
            fctime: 0,
            fbtime: 0,
            fmode: if kind.is_dir() {
                MODE_DIR_DEFAULT
            } else {
                MODE_FILE_DEFAULT
            },
            fwinattributes: 0,
            fuid: 0,
            funame: String::new(),
            fgid: 0,
            fgname: String::new(),
            flinkcount: 1,
            fdev: 0,
            fdev_minor: 0,
            fdev_major: 0,
            fcompression: Compression::None,
            fencoding: "UTF-8".to_string(),
            fcencoding: "UTF-8".to_string(),
            fseeknext: String::new(),
            fjson: JsonSidecar::Absent,
            fcontent: None,
            content_compressed: false,
            header_digest: Digest::none(),
            content_digest: Digest::none(),
            json_digest: Digest::none(),
        }
    }

    /// How many bytes the stored region occupies on the wire.
    pub fn stored_len(&self) -> u64 {
        if !self.fcompression.is_none() && self.fcsize > 0 {
            self.fcsize
        } else {
            self.fsize
        }
    }
}

/// Entry names always leave the codec rooted at `./` or `/`.
pub fn normalize_name(name: &str) -> String {
    let name = name.replace('\\', "/");
    if name.starts_with("./") || name.starts_with('/') {
        name
    } else {
        format!("./{name}")
    }
}

/// The archive preamble. `num_files` is advisory; the record stream has its
/// own end sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalHeader {
    pub encoding: String,
    pub os_tag: String,
    pub num_files: u64,
    pub extras: Vec<String>,
    pub checksum: Digest,
}

impl GlobalHeader {
    pub fn new(encoding: &str, num_files: u64) -> GlobalHeader {
        GlobalHeader {
            encoding: encoding.to_string(),
            os_tag: std::env::consts::OS.to_string(),
            num_files,
            extras: Vec::new(),
            checksum: Digest::none(),
        }
    }
}

#[cfg(test)]
mod test_entry {
    use super::*;

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("hello.txt"), "./hello.txt");
        assert_eq!(normalize_name("./hello.txt"), "./hello.txt");
        assert_eq!(normalize_name("/abs/path"), "/abs/path");
        assert_eq!(normalize_name("a\\b\\c"), "./a/b/c");
    }

    #[test]
    fn stored_len_prefers_compressed_size() {
        let mut e = Entry::new("x", EntryKind::File);
        e.fsize = 100;
        e.fcsize = 40;
        e.fcompression = Compression::Zlib;
        assert_eq!(e.stored_len(), 40);

        e.fcompression = Compression::None;
        assert_eq!(e.stored_len(), 100);

        e.fcompression = Compression::Zlib;
        e.fcsize = 0;
        assert_eq!(e.stored_len(), 100);
    }

    #[test]
    fn kind_codes_round_trip() {
        for code in 0..7 {
            assert_eq!(EntryKind::from_code(code).unwrap().code(), code);
        }
        assert!(EntryKind::from_code(7).is_none());
    }

    #[test]
    fn sidecar_decodes_objects_and_values() {
        assert_eq!(JsonSidecar::from_bytes(b""), JsonSidecar::Absent);
        assert_eq!(JsonSidecar::from_bytes(b"not json"), JsonSidecar::Absent);

        let obj = JsonSidecar::from_bytes(br#"{"a":1,"b":2}"#);
        assert_eq!(obj.key_count(), 2);
        assert_eq!(obj.to_bytes(), br#"{"a":1,"b":2}"#.to_vec());

        let val = JsonSidecar::from_bytes(b"[1,2,3]");
        assert!(matches!(val, JsonSidecar::Value(_)));
        assert_eq!(val.key_count(), 0);
    }
}
