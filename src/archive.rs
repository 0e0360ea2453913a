use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::compress::{self, Compression};
use crate::entry::{
    normalize_name, Entry, EntryKind, GlobalHeader, JsonSidecar, MODE_DIR_DEFAULT,
    MODE_FILE_DEFAULT,
};
use crate::error::{ArchiveError, ChecksumScope};
use crate::format::FormatSpec;
use crate::hash::ChecksumKind;
use crate::stream::{ByteSource, ByteStream};
use crate::wire::builder::{ArchiveWriter, ChecksumSet};
use crate::wire::reader::{ArchiveReader, ParseOptions};

/// A fully parsed archive.
#[derive(Debug, Clone)]
pub struct Archive {
    pub header: GlobalHeader,
    pub entries: Vec<Entry>,
}

/// Where an operation writes its output. `Buffer` hands the bytes back to
/// the caller instead of touching the filesystem.
pub enum ByteSink {
    Buffer,
    Path(PathBuf),
    Writer(Box<dyn Write>),
}

/// Compression request for pack and repack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressChoice {
    /// Size-based policy, see [`compress::auto_pick`].
    Auto,
    Fixed(Compression),
}

/// One entry descriptor handed to [`pack`].
#[derive(Debug, Clone, Default)]
pub struct EntryItem {
    pub name: String,
    pub is_dir: bool,
    pub data: Option<Vec<u8>>,
    /// Symlink target; implies a symlink entry.
    pub link: Option<String>,
    pub mode: Option<u32>,
    pub mtime: Option<u64>,
    /// Optional JSON sidecar for the record.
    pub json: Option<Map<String, Value>>,
}

impl EntryItem {
    pub fn file(name: &str, data: &[u8]) -> EntryItem {
        EntryItem {
            name: name.to_string(),
            data: Some(data.to_vec()),
            ..EntryItem::default()
        }
    }

    pub fn dir(name: &str) -> EntryItem {
        EntryItem {
            name: name.to_string(),
            is_dir: true,
            ..EntryItem::default()
        }
    }

    pub fn symlink(name: &str, target: &str) -> EntryItem {
        EntryItem {
            name: name.to_string(),
            link: Some(target.to_string()),
            ..EntryItem::default()
        }
    }
}

/// What [`pack`] consumes: descriptors in order, or a name-to-bytes mapping
/// where a None value (or a trailing slash) means a directory.
pub enum EntrySource {
    Items(Vec<EntryItem>),
    Map(BTreeMap<String, Option<Vec<u8>>>),
}

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub checksums: ChecksumSet,
    pub encoding: String,
    pub compression: CompressChoice,
    pub level: Option<u32>,
}

impl Default for PackOptions {
    fn default() -> Self {
        PackOptions {
            checksums: ChecksumSet::default(),
            encoding: "UTF-8".to_string(),
            compression: CompressChoice::Auto,
            level: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub include_dirs: bool,
    pub skip_json: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            include_dirs: true,
            skip_json: true,
        }
    }
}

/// One row of an advanced listing.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDetail {
    pub name: String,
    pub kind: EntryKind,
    pub compression: Compression,
    pub size: u64,
    pub stored_size: u64,
    pub mtime: u64,
    pub atime: u64,
    pub mode: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct UnpackOptions {
    pub skip_checksum: bool,
    pub uncompress: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        UnpackOptions {
            skip_checksum: false,
            uncompress: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepackOptions {
    pub checksums: ChecksumSet,
    pub compression: CompressChoice,
    pub level: Option<u32>,
}

impl Default for RepackOptions {
    fn default() -> Self {
        RepackOptions {
            checksums: ChecksumSet::default(),
            compression: CompressChoice::Auto,
            level: None,
        }
    }
}

/// Per-entry outcome of [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntryReport {
    pub index: usize,
    pub name: String,
    pub header_ok: bool,
    pub json_ok: bool,
    pub content_ok: bool,
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub ok: bool,
    pub header_ok: bool,
    pub entries: Vec<EntryReport>,
}

/// Restoration target for [`unpack_into`]. The codec hands entries over;
/// everything filesystem-shaped happens behind this seam.
pub trait EntrySink {
    fn put(&mut self, entry: &Entry) -> Result<(), ArchiveError>;
}

/// Default collaborator: restores entries under a root directory.
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> DirSink {
        DirSink { root: root.into() }
    }

    fn target(&self, name: &str) -> PathBuf {
        let rel = name.trim_start_matches("./").trim_start_matches('/');
        self.root.join(rel)
    }
}

impl EntrySink for DirSink {
    fn put(&mut self, entry: &Entry) -> Result<(), ArchiveError> {
        let path = self.target(&entry.fname);
        match entry.ftype {
            EntryKind::Directory => {
                fs::create_dir_all(&path)?;
            }
            EntryKind::Symlink => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                #[cfg(unix)]
                std::os::unix::fs::symlink(&entry.flinkname, &path)?;
                #[cfg(not(unix))]
                fs::write(&path, entry.flinkname.as_bytes())?;
            }
            _ => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, entry.fcontent.as_deref().unwrap_or_default())?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(
                        &path,
                        fs::Permissions::from_mode(entry.fmode & 0o777),
                    );
                }
            }
        }
        Ok(())
    }
}

/// Parse a whole archive into memory. The reader underneath streams; this
/// is the convenience shape for callers that want the entry vector.
pub fn parse(
    source: ByteSource,
    spec: &FormatSpec,
    opts: &ParseOptions,
) -> Result<Archive, ArchiveError> {
    let stream = ByteStream::new(source)?;
    let mut reader = ArchiveReader::open(stream, spec.clone(), *opts)?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_record()? {
        entries.push(entry);
    }
    debug!("parsed {} entries", entries.len());
    Ok(Archive {
        header: reader.header().clone(),
        entries,
    })
}

/// Fast name listing: payload regions are skipped, digests left unchecked.
pub fn list(
    source: ByteSource,
    spec: &FormatSpec,
    opts: &ListOptions,
) -> Result<Vec<String>, ArchiveError> {
    let mut out = Vec::new();
    for entry in list_reader(source, spec, opts)? {
        let entry = entry?;
        if entry.ftype.is_dir() && !opts.include_dirs {
            continue;
        }
        out.push(entry.fname);
    }
    Ok(out)
}

/// Listing with the per-entry metadata rows.
pub fn list_details(
    source: ByteSource,
    spec: &FormatSpec,
    opts: &ListOptions,
) -> Result<Vec<EntryDetail>, ArchiveError> {
    let mut out = Vec::new();
    for entry in list_reader(source, spec, opts)? {
        let entry = entry?;
        if entry.ftype.is_dir() && !opts.include_dirs {
            continue;
        }
        out.push(EntryDetail {
            name: entry.fname,
            kind: entry.ftype,
            compression: entry.fcompression,
            size: entry.fsize,
            stored_size: entry.fcsize,
            mtime: entry.fmtime,
            atime: entry.fatime,
            mode: entry.fmode,
        });
    }
    Ok(out)
}

fn list_reader(
    source: ByteSource,
    spec: &FormatSpec,
    opts: &ListOptions,
) -> Result<ArchiveReader, ArchiveError> {
    let stream = ByteStream::new(source)?;
    ArchiveReader::open(
        stream,
        spec.clone(),
        ParseOptions {
            list_only: true,
            skip_checksum: true,
            uncompress: false,
            skip_json: opts.skip_json,
            verify_header: false,
        },
    )
}

/// Full-strength verification pass. Digest mismatches land in the report
/// instead of aborting; structural failures still propagate.
pub fn validate(source: ByteSource, spec: &FormatSpec) -> Result<Validation, ArchiveError> {
    let stream = ByteStream::new(source)?;
    let mut reader = ArchiveReader::open(
        stream,
        spec.clone(),
        ParseOptions {
            list_only: false,
            skip_checksum: false,
            uncompress: false,
            skip_json: false,
            verify_header: true,
        },
    )?;
    let header_ok = reader.header_verified().unwrap_or(true);

    let mut entries = Vec::new();
    let mut ok = header_ok;
    let mut index = 0usize;
    loop {
        match reader.next_record() {
            Ok(None) => break,
            Ok(Some(entry)) => {
                entries.push(EntryReport {
                    index,
                    name: entry.fname,
                    header_ok: true,
                    json_ok: true,
                    content_ok: true,
                });
            }
            Err(ArchiveError::ChecksumMismatch { scope, name }) => {
                ok = false;
                let mut report = EntryReport {
                    index,
                    name: name.unwrap_or_default(),
                    header_ok: true,
                    json_ok: true,
                    content_ok: true,
                };
                match scope {
                    ChecksumScope::Header => report.header_ok = false,
                    ChecksumScope::Json => report.json_ok = false,
                    ChecksumScope::Content => report.content_ok = false,
                }
                entries.push(report);
            }
            Err(other) => return Err(other),
        }
        index += 1;
    }
    Ok(Validation {
        ok,
        header_ok,
        entries,
    })
}

/// Unpack to a name-to-bytes mapping; directories map to None.
pub fn unpack(
    source: ByteSource,
    spec: &FormatSpec,
    opts: &UnpackOptions,
) -> Result<BTreeMap<String, Option<Vec<u8>>>, ArchiveError> {
    let archive = parse(source, spec, &unpack_parse_options(opts))?;
    let mut out = BTreeMap::new();
    for entry in archive.entries {
        if entry.ftype.is_dir() {
            out.insert(entry.fname, None);
        } else {
            out.insert(entry.fname, Some(entry.fcontent.unwrap_or_default()));
        }
    }
    Ok(out)
}

/// Stream entries into a restoration sink.
pub fn unpack_into(
    source: ByteSource,
    spec: &FormatSpec,
    opts: &UnpackOptions,
    sink: &mut dyn EntrySink,
) -> Result<(), ArchiveError> {
    let stream = ByteStream::new(source)?;
    let reader = ArchiveReader::open(stream, spec.clone(), unpack_parse_options(opts))?;
    for entry in reader {
        sink.put(&entry?)?;
    }
    Ok(())
}

fn unpack_parse_options(opts: &UnpackOptions) -> ParseOptions {
    ParseOptions {
        list_only: false,
        skip_checksum: opts.skip_checksum,
        uncompress: opts.uncompress,
        skip_json: false,
        verify_header: false,
    }
}

/// Pack entries into a new archive. The input is snapshotted up front so
/// the advisory count in the preamble is exact; the end sentinel is what
/// readers actually stop on.
pub fn pack(
    source: EntrySource,
    out: ByteSink,
    spec: &FormatSpec,
    opts: &PackOptions,
) -> Result<Option<Vec<u8>>, ArchiveError> {
    let items = match source {
        EntrySource::Items(items) => items,
        EntrySource::Map(map) => map
            .into_iter()
            .map(|(name, data)| {
                let is_dir = data.is_none() || name.ends_with('/');
                EntryItem {
                    name,
                    is_dir,
                    data: if is_dir { None } else { data },
                    ..EntryItem::default()
                }
            })
            .collect(),
    };

    with_sink(out, |w| {
        let mut writer = ArchiveWriter::new(w, spec.clone());
        writer.write_global_header(
            &GlobalHeader::new(&opts.encoding, items.len() as u64),
            opts.checksums.header,
        )?;

        for (fid, item) in items.iter().enumerate() {
            let entry = build_entry(item, fid as u64, opts);
            let (entry, stored) = stage_content(entry, item, opts)?;
            writer.write_record(&entry, &stored, &opts.checksums)?;
        }
        writer.write_end()
    })
}

fn build_entry(item: &EntryItem, fid: u64, opts: &PackOptions) -> Entry {
    let name = normalize_name(&item.name);
    let is_dir = item.is_dir || name.ends_with('/');
    let kind = if is_dir {
        EntryKind::Directory
    } else if item.link.is_some() {
        EntryKind::Symlink
    } else {
        EntryKind::File
    };

    let mtime = item.mtime.unwrap_or_else(now_unix);
    let mut entry = Entry::new(&name, kind);
    entry.fencoding = opts.encoding.clone();
    entry.fcencoding = opts.encoding.clone();
    entry.flinkname = item.link.clone().unwrap_or_default();
    entry.fatime = mtime;
    entry.fmtime = mtime;
    entry.fctime = mtime;
    entry.fbtime = mtime;
    entry.fmode = item.mode.unwrap_or(if is_dir {
        MODE_DIR_DEFAULT
    } else {
        MODE_FILE_DEFAULT
    });
    entry.fid = fid;
    entry.finode = fid;
    if let Some(map) = &item.json {
        entry.fjson = JsonSidecar::Object(map.clone());
    }
    entry
}

/// Compress one item's raw bytes per the requested policy, falling back to
/// zlib level 6 when the requested algorithm fails.
fn stage_content(
    mut entry: Entry,
    item: &EntryItem,
    opts: &PackOptions,
) -> Result<(Entry, Vec<u8>), ArchiveError> {
    let raw: &[u8] = if entry.ftype.is_dir() {
        &[]
    } else {
        item.data.as_deref().unwrap_or(&[])
    };

    let (algo, level) = match opts.compression {
        CompressChoice::Auto => {
            let (algo, level) = compress::auto_pick(raw.len());
            (algo, opts.level.or(level))
        }
        CompressChoice::Fixed(algo) => (algo, opts.level),
    };

    let (stored, used) = match compress::compress(raw, algo, level) {
        Ok(bytes) => (bytes, algo),
        Err(err) => {
            warn!(
                "{}: {} compression failed ({err}), falling back to zlib",
                entry.fname,
                algo.as_str()
            );
            let level = Some(level.unwrap_or(6));
            (compress::compress(raw, Compression::Zlib, level)?, Compression::Zlib)
        }
    };

    entry.fsize = raw.len() as u64;
    entry.fcsize = if used.is_none() { 0 } else { stored.len() as u64 };
    entry.fcompression = used;
    Ok((entry, stored))
}

/// Write an archive with no entries: the preamble plus the end sentinel.
pub fn make_empty(
    out: ByteSink,
    spec: &FormatSpec,
    checksum: ChecksumKind,
    encoding: &str,
) -> Result<Option<Vec<u8>>, ArchiveError> {
    with_sink(out, |w| {
        let mut writer = ArchiveWriter::new(w, spec.clone());
        writer.write_global_header(&GlobalHeader::new(encoding, 0), checksum)?;
        writer.write_end()
    })
}

/// Re-emit an archive, possibly under a different compression. Stored
/// regions are copied verbatim when the algorithm does not change;
/// otherwise the content is decoded and re-encoded.
pub fn repack(
    source: ByteSource,
    out: ByteSink,
    spec: &FormatSpec,
    opts: &RepackOptions,
) -> Result<Option<Vec<u8>>, ArchiveError> {
    let archive = parse(
        source,
        spec,
        &ParseOptions {
            list_only: false,
            skip_checksum: false,
            uncompress: false,
            skip_json: false,
            verify_header: false,
        },
    )?;

    with_sink(out, |w| {
        let mut writer = ArchiveWriter::new(w, spec.clone());
        writer.write_global_header(
            &GlobalHeader {
                num_files: archive.entries.len() as u64,
                checksum: crate::entry::Digest::none(),
                ..archive.header.clone()
            },
            opts.checksums.header,
        )?;

        for entry in &archive.entries {
            let src_algo = entry.fcompression;
            let stored_src: &[u8] = entry.fcontent.as_deref().unwrap_or(&[]);

            let raw: Vec<u8> = if src_algo.is_none() {
                stored_src.to_vec()
            } else {
                compress::decompress(stored_src, src_algo).map_err(|_| {
                    ArchiveError::DecompressFailed {
                        algo: src_algo,
                        name: entry.fname.clone(),
                    }
                })?
            };

            let (dst_algo, dst_level) = match opts.compression {
                CompressChoice::Auto => {
                    let (algo, level) = compress::auto_pick(raw.len());
                    (algo, opts.level.or(level))
                }
                CompressChoice::Fixed(algo) => (algo, opts.level),
            };

            let (stored, used) = if dst_algo == src_algo {
                debug!("{}: copying stored bytes verbatim", entry.fname);
                (stored_src.to_vec(), src_algo)
            } else {
                (compress::compress(&raw, dst_algo, dst_level)?, dst_algo)
            };

            let mut out_entry = entry.clone();
            out_entry.fsize = raw.len() as u64;
            out_entry.fcsize = if used.is_none() { 0 } else { stored.len() as u64 };
            out_entry.fcompression = used;
            writer.write_record(&out_entry, &stored, &opts.checksums)?;
        }
        writer.write_end()
    })
}

fn with_sink<F>(out: ByteSink, body: F) -> Result<Option<Vec<u8>>, ArchiveError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), ArchiveError>,
{
    match out {
        ByteSink::Buffer => {
            let mut buf = Vec::new();
            body(&mut buf)?;
            Ok(Some(buf))
        }
        ByteSink::Path(path) => {
            let mut file = File::create(&path)?;
            body(&mut file)?;
            file.flush()?;
            Ok(None)
        }
        ByteSink::Writer(mut w) => {
            body(&mut w)?;
            w.flush()?;
            Ok(None)
        }
    }
}

fn now_unix() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}

/// Convenience for the filesystem collaborator path.
pub fn unpack_to_dir(
    source: ByteSource,
    spec: &FormatSpec,
    opts: &UnpackOptions,
    outdir: &Path,
) -> Result<(), ArchiveError> {
    let mut sink = DirSink::new(outdir);
    unpack_into(source, spec, opts, &mut sink)
}
