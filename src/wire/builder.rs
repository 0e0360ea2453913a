use std::io::Write;

use crate::entry::{normalize_name, Entry, GlobalHeader};
use crate::error::ArchiveError;
use crate::format::FormatSpec;
use crate::hash::{self, ChecksumKind};
use crate::wire::fields::{push_field, push_fields, to_hex};

/// Digest algorithms for the record checksum triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumSet {
    pub header: ChecksumKind,
    pub content: ChecksumKind,
    pub json: ChecksumKind,
}

impl ChecksumSet {
    pub fn uniform(kind: ChecksumKind) -> ChecksumSet {
        ChecksumSet {
            header: kind,
            content: kind,
            json: kind,
        }
    }
}

impl Default for ChecksumSet {
    fn default() -> Self {
        ChecksumSet::uniform(ChecksumKind::Crc32)
    }
}

/// The serializer half of the codec. Owns the sink; the driver feeds it the
/// preamble, one record per entry, and the end sentinel.
pub struct ArchiveWriter<W: Write> {
    inner: W,
    spec: FormatSpec,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W, spec: FormatSpec) -> Self {
        ArchiveWriter {
            inner: writer,
            spec,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Emit the archive preamble. The trailing digest covers every byte
    /// written here up to and including the algorithm-name field.
    pub fn write_global_header(
        &mut self,
        header: &GlobalHeader,
        checksum: ChecksumKind,
    ) -> Result<(), ArchiveError> {
        let d = self.spec.delimiter.clone();
        let extras = &header.extras;

        // The extras blob counts its own count field.
        let mut extras_blob = Vec::new();
        push_field(&mut extras_blob, to_hex(extras.len() as u64).as_bytes(), &d)?;
        push_fields(&mut extras_blob, extras, &d)?;

        let mut body = Vec::new();
        // Opaque compatibility slot; readers accept any hex value here.
        push_field(&mut body, to_hex(3 + 5 + extras.len() as u64 + 1).as_bytes(), &d)?;
        push_field(&mut body, header.encoding.as_bytes(), &d)?;
        push_field(&mut body, header.os_tag.as_bytes(), &d)?;
        push_field(&mut body, to_hex(header.num_files).as_bytes(), &d)?;
        push_field(&mut body, to_hex(extras_blob.len() as u64).as_bytes(), &d)?;
        push_field(&mut body, to_hex(extras.len() as u64).as_bytes(), &d)?;
        push_fields(&mut body, extras, &d)?;
        push_field(&mut body, checksum.as_str().as_bytes(), &d)?;

        let mut out = Vec::new();
        push_field(&mut out, self.spec.magic_token().as_bytes(), &d)?;
        push_field(&mut out, to_hex(body.len() as u64).as_bytes(), &d)?;
        out.extend_from_slice(&body);

        let cs = hash::digest(&out, checksum);
        push_field(&mut out, cs.as_bytes(), &d)?;

        self.inner.write_all(&out)?;
        Ok(())
    }

    /// Emit one record. `stored` is the content region exactly as it will sit
    /// on the wire (already compressed when the entry says so).
    pub fn write_record(
        &mut self,
        entry: &Entry,
        stored: &[u8],
        cks: &ChecksumSet,
    ) -> Result<(), ArchiveError> {
        let d = self.spec.delimiter.clone();

        let mut fields: Vec<Vec<u8>> = Vec::with_capacity(36);
        fields.push(to_hex(entry.ftype.code()).into_bytes());
        fields.push(entry.fencoding.clone().into_bytes());
        fields.push(entry.fcencoding.clone().into_bytes());
        fields.push(normalize_name(&entry.fname).into_bytes());
        fields.push(entry.flinkname.clone().into_bytes());
        fields.push(to_hex(entry.fsize).into_bytes());
        fields.push(to_hex(entry.fatime).into_bytes());
        fields.push(to_hex(entry.fmtime).into_bytes());
        fields.push(to_hex(entry.fctime).into_bytes());
        fields.push(to_hex(entry.fbtime).into_bytes());
        fields.push(to_hex(entry.fmode as u64).into_bytes());
        fields.push(to_hex(entry.fwinattributes).into_bytes());
        fields.push(entry.fcompression.as_str().as_bytes().to_vec());
        fields.push(to_hex(entry.fcsize).into_bytes());
        fields.push(to_hex(entry.fuid).into_bytes());
        fields.push(entry.funame.clone().into_bytes());
        fields.push(to_hex(entry.fgid).into_bytes());
        fields.push(entry.fgname.clone().into_bytes());
        fields.push(to_hex(entry.fid).into_bytes());
        fields.push(to_hex(entry.finode).into_bytes());
        fields.push(to_hex(entry.flinkcount).into_bytes());
        fields.push(to_hex(entry.fdev).into_bytes());
        fields.push(to_hex(entry.fdev_minor).into_bytes());
        fields.push(to_hex(entry.fdev_major).into_bytes());
        // Seek hint, never consulted on read; kept for wire compatibility.
        fields.push(format!("+{}", d.len()).into_bytes());

        // JSON descriptor, always the five-field form on write.
        let raw_json = entry.fjson.to_bytes();
        let (json_type, json_cs_kind) = if raw_json.is_empty() {
            ("none", ChecksumKind::None)
        } else {
            ("json", cks.json)
        };
        let json_cs = hash::digest(&raw_json, json_cs_kind);
        fields.push(json_type.as_bytes().to_vec());
        fields.push(to_hex(entry.fjson.key_count() as u64).into_bytes());
        fields.push(to_hex(raw_json.len() as u64).into_bytes());
        fields.push(json_cs_kind.as_str().as_bytes().to_vec());
        fields.push(json_cs.into_bytes());

        // Records carry no extras of their own; the empty blob is still a
        // count field plus its delimiter.
        fields.push(to_hex(1 + d.len() as u64).into_bytes());
        fields.push(b"0".to_vec());

        let content_cs_kind = if stored.is_empty() {
            ChecksumKind::None
        } else {
            cks.content
        };
        fields.push(cks.header.as_str().as_bytes().to_vec());
        fields.push(content_cs_kind.as_str().as_bytes().to_vec());

        // The two digest values count toward the field total even though
        // they are appended after the digests are known.
        let fields_count = to_hex(fields.len() as u64 + 2);

        let mut header_no_cs = Vec::new();
        push_fields(&mut header_no_cs, &fields, &d)?;

        // Sized as if the digest value fields were empty; the count field
        // above is what readers actually walk by.
        let headersize = fields_count.len() + header_no_cs.len() + 2 * d.len();

        let mut header = Vec::new();
        push_field(&mut header, to_hex(headersize as u64).as_bytes(), &d)?;
        push_field(&mut header, fields_count.as_bytes(), &d)?;
        header.extend_from_slice(&header_no_cs);

        let header_cs = hash::digest(&header, cks.header);
        let content_cs = hash::digest(stored, content_cs_kind);
        push_field(&mut header, header_cs.as_bytes(), &d)?;
        push_field(&mut header, content_cs.as_bytes(), &d)?;

        header.extend_from_slice(&raw_json);
        header.extend_from_slice(&d);

        self.inner.write_all(&header)?;
        self.inner.write_all(stored)?;
        self.inner.write_all(&d)?;
        Ok(())
    }

    /// Two `0` fields close the record stream.
    pub fn write_end(&mut self) -> Result<(), ArchiveError> {
        let d = self.spec.delimiter.clone();
        let mut out = Vec::new();
        push_field(&mut out, b"0", &d)?;
        push_field(&mut out, b"0", &d)?;
        self.inner.write_all(&out)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ArchiveError> {
        self.inner.flush()?;
        Ok(())
    }
}
