use log::debug;

use crate::compress::{self, Compression};
use crate::entry::{normalize_name, Digest, Entry, EntryKind, GlobalHeader, JsonSidecar};
use crate::error::{ArchiveError, ChecksumScope};
use crate::format::FormatSpec;
use crate::hash::{self, ChecksumKind};
use crate::stream::ByteStream;
use crate::wire::fields::{parse_hex, push_field, read_field, read_fields};
use crate::wire::{schema, MAX_FIELDS};

/// Knobs for a single parse. The defaults decode everything and verify the
/// JSON and content digests; header digests are opt-in.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Skip both byte regions; entries come back without content.
    pub list_only: bool,
    pub skip_checksum: bool,
    /// Decompress stored content. Failures are tolerated: the entry keeps
    /// the stored bytes and `content_compressed` stays set.
    pub uncompress: bool,
    pub skip_json: bool,
    /// Verify the per-record header digest and the preamble digest.
    pub verify_header: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            list_only: false,
            skip_checksum: false,
            uncompress: true,
            skip_json: false,
            verify_header: false,
        }
    }
}

/// Streaming record parser. Reads the preamble on open, then yields one
/// entry per record until the end sentinel.
pub struct ArchiveReader {
    stream: ByteStream,
    spec: FormatSpec,
    opts: ParseOptions,
    header: GlobalHeader,
    header_verified: Option<bool>,
    done: bool,
}

impl ArchiveReader {
    pub fn open(
        mut stream: ByteStream,
        spec: FormatSpec,
        opts: ParseOptions,
    ) -> Result<ArchiveReader, ArchiveError> {
        let (header, header_verified) = read_global_header(&mut stream, &spec, &opts)?;
        Ok(ArchiveReader {
            stream,
            spec,
            opts,
            header,
            header_verified,
            done: false,
        })
    }

    pub fn header(&self) -> &GlobalHeader {
        &self.header
    }

    /// Preamble digest state: None when verification was not requested.
    pub fn header_verified(&self) -> Option<bool> {
        self.header_verified
    }

    /// The next record, or None at the end sentinel.
    pub fn next_record(&mut self) -> Result<Option<Entry>, ArchiveError> {
        if self.done {
            return Ok(None);
        }
        match parse_record(&mut self.stream, &self.spec, &self.opts) {
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            other => other,
        }
    }
}

impl Iterator for ArchiveReader {
    type Item = Result<Entry, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match parse_record(&mut self.stream, &self.spec, &self.opts) {
            Ok(None) => {
                self.done = true;
                None
            }
            Ok(Some(entry)) => Some(Ok(entry)),
            Err(err) => {
                // A digest mismatch is detected with the record fully
                // consumed, so iteration can continue past it. Anything
                // else leaves the stream mid-record.
                if !matches!(err, ArchiveError::ChecksumMismatch { .. }) {
                    self.done = true;
                }
                Some(Err(err))
            }
        }
    }
}

fn read_global_header(
    stream: &mut ByteStream,
    spec: &FormatSpec,
    opts: &ParseOptions,
) -> Result<(GlobalHeader, Option<bool>), ArchiveError> {
    let d = &spec.delimiter;

    let magic = read_field(stream, d)?;
    if !magic.starts_with(spec.magic.as_bytes()) {
        return Err(ArchiveError::MalformedHeader(format!(
            "bad magic {:?}",
            String::from_utf8_lossy(&magic)
        )));
    }

    let headersize = read_field(stream, d)?;
    let scratch = read_field(stream, d)?; // opaque compatibility slot
    let encoding = text(read_field(stream, d)?, "encoding")?;
    let os_tag = text(read_field(stream, d)?, "os tag")?;

    let num_files_raw = read_field(stream, d)?;
    let num_files = parse_hex(&num_files_raw)
        .ok_or_else(|| ArchiveError::MalformedHeader("entry count is not hex".to_string()))?;

    let extras_size = read_field(stream, d)?;
    let extras_count_raw = read_field(stream, d)?;
    let extras_count = parse_hex(&extras_count_raw)
        .ok_or_else(|| ArchiveError::MalformedHeader("extras count is not hex".to_string()))?;

    let mut extras = Vec::with_capacity(extras_count as usize);
    for _ in 0..extras_count {
        extras.push(text(read_field(stream, d)?, "extra")?);
    }

    let cs_name = text(read_field(stream, d)?, "checksum algorithm")?;
    let cs_value = text(read_field(stream, d)?, "checksum")?;
    let cs_kind = ChecksumKind::from_name(&cs_name)?;

    let verified = if opts.verify_header {
        // The digest covers every field before it, delimiters included.
        let mut covered = Vec::new();
        push_field(&mut covered, &magic, d)?;
        push_field(&mut covered, &headersize, d)?;
        push_field(&mut covered, &scratch, d)?;
        push_field(&mut covered, encoding.as_bytes(), d)?;
        push_field(&mut covered, os_tag.as_bytes(), d)?;
        push_field(&mut covered, &num_files_raw, d)?;
        push_field(&mut covered, &extras_size, d)?;
        push_field(&mut covered, &extras_count_raw, d)?;
        for extra in &extras {
            push_field(&mut covered, extra.as_bytes(), d)?;
        }
        push_field(&mut covered, cs_name.as_bytes(), d)?;
        Some(hash::matches(&hash::digest(&covered, cs_kind), &cs_value))
    } else {
        None
    };

    let header = GlobalHeader {
        encoding: if encoding.is_empty() {
            "UTF-8".to_string()
        } else {
            encoding
        },
        os_tag,
        num_files,
        extras,
        checksum: Digest {
            kind: cs_kind,
            value: cs_value,
        },
    };
    Ok((header, verified))
}

fn parse_record(
    stream: &mut ByteStream,
    spec: &FormatSpec,
    opts: &ParseOptions,
) -> Result<Option<Entry>, ArchiveError> {
    let d = &spec.delimiter;

    let first = read_field(stream, d)?;
    let second = read_field(stream, d)?;
    if first == b"0" && second == b"0" {
        return Ok(None);
    }
    let (headersize_raw, count_raw) = (first, second);

    let n_fields = parse_hex(&count_raw)
        .ok_or_else(|| ArchiveError::MalformedRecord("field count is not hex".to_string()))?
        as usize;
    if n_fields > MAX_FIELDS {
        return Err(ArchiveError::MalformedRecord(format!(
            "record announces {n_fields} fields"
        )));
    }

    let fields = read_fields(stream, n_fields, d)?;
    let layout = schema::resolve(&fields)?;

    let hex_at = |i: usize, what: &str| -> Result<u64, ArchiveError> {
        parse_hex(&fields[i])
            .ok_or_else(|| ArchiveError::MalformedRecord(format!("{what} is not hex")))
    };
    let text_at = |i: usize, what: &str| -> Result<String, ArchiveError> {
        text(fields[i].clone(), what)
    };

    let ftype_code = hex_at(0, "entry type")?;
    let ftype = EntryKind::from_code(ftype_code).ok_or_else(|| {
        ArchiveError::MalformedRecord(format!("unknown entry type {ftype_code}"))
    })?;
    let fencoding = text_at(1, "encoding")?;
    let fcencoding = text_at(2, "content encoding")?;
    let raw_name = text_at(3, "name")?;
    let flinkname = text_at(4, "link name")?;
    let fsize = hex_at(5, "size")?;
    let fatime = hex_at(6, "atime")?;
    let fmtime = hex_at(7, "mtime")?;
    let fctime = hex_at(8, "ctime")?;
    let fbtime = hex_at(9, "btime")?;
    let fmode = hex_at(10, "mode")? as u32;
    let fwinattributes = hex_at(11, "win attributes")?;
    let fcompression = Compression::from_name(&text_at(12, "compression")?)?;
    let fcsize = hex_at(13, "stored size")?;
    let fuid = hex_at(14, "uid")?;
    let funame = text_at(15, "user name")?;
    let fgid = hex_at(16, "gid")?;
    let fgname = text_at(17, "group name")?;
    let fid = hex_at(18, "id")?;
    let finode = hex_at(19, "inode")?;
    let flinkcount = hex_at(20, "link count")?;
    let fdev = hex_at(21, "device")?;
    let fdev_minor = hex_at(22, "device minor")?;
    let fdev_major = hex_at(23, "device major")?;
    let fseeknext = text_at(24, "seek hint")?;

    let json_size = hex_at(layout.json_size, "json size")?;
    let json_cs_kind = ChecksumKind::from_name(&text_at(layout.json_cs_algo, "json algorithm")?)?;
    let json_cs_value = text_at(layout.json_cs_value, "json checksum")?;
    let header_cs_kind =
        ChecksumKind::from_name(&text_at(layout.header_cs_algo, "header algorithm")?)?;
    let content_cs_kind =
        ChecksumKind::from_name(&text_at(layout.content_cs_algo, "content algorithm")?)?;
    let header_cs_value = text_at(layout.header_cs_value, "header checksum")?;
    let content_cs_value = text_at(layout.content_cs_value, "content checksum")?;

    let name = normalize_name(&raw_name);

    // JSON region
    let json_read = json_size > 0 && !(opts.list_only || opts.skip_json);
    let json_bytes = if json_size > 0 {
        if json_read {
            let got = stream.read(json_size as usize)?;
            if (got.len() as u64) < json_size {
                return Err(ArchiveError::MalformedRecord(format!(
                    "truncated json region for {name}"
                )));
            }
            stream.skip(d.len() as u64)?;
            got
        } else {
            stream.skip(json_size + d.len() as u64)?;
            Vec::new()
        }
    } else {
        stream.skip(d.len() as u64)?;
        Vec::new()
    };

    // Stored content region
    let stored_len = if !fcompression.is_none() && fcsize > 0 {
        fcsize
    } else {
        fsize
    };
    let mut stored = Vec::new();
    if stored_len > 0 {
        if opts.list_only {
            stream.skip(stored_len)?;
        } else {
            stored = stream.read(stored_len as usize)?;
            if (stored.len() as u64) < stored_len {
                return Err(ArchiveError::MalformedRecord(format!(
                    "truncated content region for {name}"
                )));
            }
        }
    }
    stream.skip(d.len() as u64)?;

    // Digest verification, record fully consumed by now.
    if json_read && !opts.skip_checksum {
        let got = hash::digest(&json_bytes, json_cs_kind);
        if !hash::matches(&got, &json_cs_value) {
            return Err(ArchiveError::ChecksumMismatch {
                scope: ChecksumScope::Json,
                name: Some(name),
            });
        }
    }
    if !opts.skip_checksum && stored_len > 0 && !opts.list_only {
        let got = hash::digest(&stored, content_cs_kind);
        if !hash::matches(&got, &content_cs_value) {
            return Err(ArchiveError::ChecksumMismatch {
                scope: ChecksumScope::Content,
                name: Some(name),
            });
        }
    }
    if opts.verify_header {
        let mut covered = Vec::new();
        push_field(&mut covered, &headersize_raw, d)?;
        push_field(&mut covered, &count_raw, d)?;
        for field in &fields[..=layout.content_cs_algo] {
            push_field(&mut covered, field, d)?;
        }
        let got = hash::digest(&covered, header_cs_kind);
        if !hash::matches(&got, &header_cs_value) {
            return Err(ArchiveError::ChecksumMismatch {
                scope: ChecksumScope::Header,
                name: Some(name),
            });
        }
    }

    // Optional decompression; failure keeps the stored form.
    let mut content_compressed = !fcompression.is_none() && !stored.is_empty();
    let fcontent = if opts.list_only {
        None
    } else {
        let mut content = stored;
        if opts.uncompress && content_compressed {
            match compress::decompress(&content, fcompression) {
                Ok(raw) => {
                    content = raw;
                    content_compressed = false;
                }
                Err(err) => {
                    debug!("{name}: keeping stored bytes, decompression failed: {err}");
                }
            }
        }
        Some(content)
    };

    let fjson = JsonSidecar::from_bytes(&json_bytes);

    Ok(Some(Entry {
        fid,
        finode,
        fname: name,
        flinkname,
        ftype,
        fsize,
        fcsize,
        fatime,
        fmtime,
        fctime,
        fbtime,
        fmode,
        fwinattributes,
        fuid,
        funame,
        fgid,
        fgname,
        flinkcount,
        fdev,
        fdev_minor,
        fdev_major,
        fcompression,
        fencoding,
        fcencoding,
        fseeknext,
        fjson,
        fcontent,
        content_compressed,
        header_digest: Digest {
            kind: header_cs_kind,
            value: header_cs_value,
        },
        content_digest: Digest {
            kind: content_cs_kind,
            value: content_cs_value,
        },
        json_digest: Digest {
            kind: json_cs_kind,
            value: json_cs_value,
        },
    }))
}

fn text(raw: Vec<u8>, what: &str) -> Result<String, ArchiveError> {
    String::from_utf8(raw)
        .map_err(|_| ArchiveError::MalformedRecord(format!("{what} is not valid UTF-8")))
}

#[cfg(test)]
mod test_reader {
    use super::*;
    use crate::stream::ByteSource;
    use crate::wire::builder::{ArchiveWriter, ChecksumSet};
    use crate::wire::fields::{push_field, push_fields, to_hex};

    fn open(bytes: Vec<u8>, opts: ParseOptions) -> ArchiveReader {
        let stream = ByteStream::new(ByteSource::Bytes(bytes)).unwrap();
        ArchiveReader::open(stream, FormatSpec::default(), opts).unwrap()
    }

    fn empty_archive() -> Vec<u8> {
        let mut w = ArchiveWriter::new(Vec::new(), FormatSpec::default());
        w.write_global_header(&GlobalHeader::new("UTF-8", 0), ChecksumKind::Crc32)
            .unwrap();
        w.write_end().unwrap();
        w.into_inner()
    }

    #[test]
    fn sentinel_terminates() {
        let mut r = open(empty_archive(), ParseOptions::default());
        assert!(r.next_record().unwrap().is_none());
        // idempotent once done
        assert!(r.next_record().unwrap().is_none());
        assert_eq!(r.header().num_files, 0);
        assert_eq!(r.header().encoding, "UTF-8");
    }

    #[test]
    fn preamble_digest_verifies() {
        let stream = ByteStream::new(ByteSource::Bytes(empty_archive())).unwrap();
        let r = ArchiveReader::open(
            stream,
            FormatSpec::default(),
            ParseOptions {
                verify_header: true,
                ..ParseOptions::default()
            },
        )
        .unwrap();
        assert_eq!(r.header_verified(), Some(true));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = empty_archive();
        bytes[0] = b'X';
        let stream = ByteStream::new(ByteSource::Bytes(bytes)).unwrap();
        let err = ArchiveReader::open(stream, FormatSpec::default(), ParseOptions::default());
        assert!(matches!(err, Err(ArchiveError::MalformedHeader(_))));
    }

    #[test]
    fn record_round_trip() {
        let mut entry = Entry::new("hello.txt", EntryKind::File);
        entry.fsize = 6;
        entry.fmtime = 0x5f0000;

        let mut w = ArchiveWriter::new(Vec::new(), FormatSpec::default());
        w.write_global_header(&GlobalHeader::new("UTF-8", 1), ChecksumKind::Crc32)
            .unwrap();
        w.write_record(&entry, b"Hello\n", &ChecksumSet::default())
            .unwrap();
        w.write_end().unwrap();

        let mut r = open(
            w.into_inner(),
            ParseOptions {
                verify_header: true,
                ..ParseOptions::default()
            },
        );
        let got = r.next_record().unwrap().unwrap();
        assert_eq!(got.fname, "./hello.txt");
        assert_eq!(got.fsize, 6);
        assert_eq!(got.fmtime, 0x5f0000);
        assert_eq!(got.fcontent.as_deref(), Some(&b"Hello\n"[..]));
        assert_eq!(got.content_digest.value, "1d4a36d3");
        assert_eq!(got.fseeknext, "+1");
        assert!(!got.content_compressed);
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn legacy_json_descriptor_parses() {
        // Hand-built record in the four-field legacy shape, digests off.
        let d: &[u8] = &[0x00];
        let mut fields: Vec<Vec<u8>> = vec![
            b"0".to_vec(),       // ftype
            b"UTF-8".to_vec(),
            b"UTF-8".to_vec(),
            b"./x.txt".to_vec(),
            Vec::new(),          // link name
            b"3".to_vec(),       // fsize
        ];
        for _ in 0..4 {
            fields.push(b"0".to_vec()); // times
        }
        fields.push(b"81b6".to_vec()); // mode
        fields.push(b"0".to_vec()); // win attributes
        fields.push(b"none".to_vec()); // compression
        fields.push(b"0".to_vec()); // fcsize
        fields.push(b"0".to_vec()); // uid
        fields.push(Vec::new()); // user name
        fields.push(b"0".to_vec()); // gid
        fields.push(Vec::new()); // group name
        fields.push(b"0".to_vec()); // id
        fields.push(b"0".to_vec()); // inode
        fields.push(b"1".to_vec()); // link count
        fields.push(b"0".to_vec()); // dev
        fields.push(b"0".to_vec()); // dev minor
        fields.push(b"0".to_vec()); // dev major
        fields.push(b"+1".to_vec()); // seek hint
        // legacy JSON descriptor: type, byte size, algo, digest
        fields.push(b"none".to_vec());
        fields.push(b"0".to_vec());
        fields.push(b"none".to_vec());
        fields.push(b"0".to_vec());
        // extras
        fields.push(b"2".to_vec());
        fields.push(b"0".to_vec());
        // algorithm names and digest values
        fields.push(b"none".to_vec());
        fields.push(b"none".to_vec());
        fields.push(b"0".to_vec());
        fields.push(b"0".to_vec());
        assert_eq!(fields.len(), 35);

        let mut w = ArchiveWriter::new(Vec::new(), FormatSpec::default());
        w.write_global_header(&GlobalHeader::new("UTF-8", 1), ChecksumKind::Crc32)
            .unwrap();
        let mut bytes = w.into_inner();
        push_field(&mut bytes, b"1", d).unwrap(); // headersize, unused on read
        push_field(&mut bytes, to_hex(fields.len() as u64).as_bytes(), d).unwrap();
        push_fields(&mut bytes, &fields, d).unwrap();
        bytes.extend_from_slice(d); // empty JSON region
        bytes.extend_from_slice(b"abc");
        bytes.extend_from_slice(d);
        push_field(&mut bytes, b"0", d).unwrap();
        push_field(&mut bytes, b"0", d).unwrap();

        let mut r = open(bytes, ParseOptions::default());
        let got = r.next_record().unwrap().unwrap();
        assert_eq!(got.fname, "./x.txt");
        assert_eq!(got.fsize, 3);
        assert_eq!(got.fcontent.as_deref(), Some(&b"abc"[..]));
        assert!(got.fjson.is_absent());
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn list_only_skips_both_regions() {
        let mut entry = Entry::new("big.bin", EntryKind::File);
        entry.fsize = 4096;

        let mut w = ArchiveWriter::new(Vec::new(), FormatSpec::default());
        w.write_global_header(&GlobalHeader::new("UTF-8", 1), ChecksumKind::Crc32)
            .unwrap();
        w.write_record(&entry, &[0x5a; 4096], &ChecksumSet::default())
            .unwrap();
        w.write_end().unwrap();

        let mut r = open(
            w.into_inner(),
            ParseOptions {
                list_only: true,
                skip_checksum: true,
                uncompress: false,
                skip_json: true,
                verify_header: false,
            },
        );
        let got = r.next_record().unwrap().unwrap();
        assert_eq!(got.fname, "./big.bin");
        assert_eq!(got.fcontent, None);
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn corrupt_content_is_a_mismatch() {
        let mut entry = Entry::new("hello.txt", EntryKind::File);
        entry.fsize = 6;

        let mut w = ArchiveWriter::new(Vec::new(), FormatSpec::default());
        w.write_global_header(&GlobalHeader::new("UTF-8", 1), ChecksumKind::Crc32)
            .unwrap();
        w.write_record(&entry, b"Hello\n", &ChecksumSet::default())
            .unwrap();
        w.write_end().unwrap();

        let mut bytes = w.into_inner();
        let at = bytes.windows(6).position(|w| w == b"Hello\n").unwrap();
        bytes[at] = b'J';

        let mut r = open(bytes, ParseOptions::default());
        match r.next_record() {
            Err(ArchiveError::ChecksumMismatch { scope, name }) => {
                assert_eq!(scope, ChecksumScope::Content);
                assert_eq!(name.as_deref(), Some("./hello.txt"));
            }
            other => panic!("expected a content mismatch, got {other:?}"),
        }
        // the record was fully consumed; the sentinel is still reachable
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn undecodable_content_keeps_stored_bytes() {
        let mut entry = Entry::new("bad.z", EntryKind::File);
        entry.fsize = 100;
        entry.fcsize = 9;
        entry.fcompression = Compression::Zlib;

        let mut w = ArchiveWriter::new(Vec::new(), FormatSpec::default());
        w.write_global_header(&GlobalHeader::new("UTF-8", 1), ChecksumKind::Crc32)
            .unwrap();
        // Nine bytes that are not a zlib stream.
        w.write_record(&entry, b"not-zlib!", &ChecksumSet::default())
            .unwrap();
        w.write_end().unwrap();

        let mut r = open(w.into_inner(), ParseOptions::default());
        let got = r.next_record().unwrap().unwrap();
        assert!(got.content_compressed);
        assert_eq!(got.fcontent.as_deref(), Some(&b"not-zlib!"[..]));
    }
}
