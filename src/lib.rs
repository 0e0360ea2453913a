//! Codec for the NeoFile container archive format.
//!
//! A NeoFile archive is a single self-describing byte stream: a global
//! preamble, a sequence of records (one per filesystem entry, each with a
//! JSON sidecar, per-record compression, and a triple of integrity digests),
//! and a two-field end sentinel. This crate serializes entry sequences into
//! that stream and parses it back without buffering whole archives.
//!
//! The wire format itself is documented in [`wire`]. Most callers only need
//! the driver operations:
//!
//! ```no_run
//! use neofile::{pack, parse, ByteSink, ByteSource, EntryItem, EntrySource,
//!               FormatSpec, PackOptions, ParseOptions};
//!
//! let spec = FormatSpec::default();
//! let bytes = pack(
//!     EntrySource::Items(vec![EntryItem::file("hello.txt", b"Hello\n")]),
//!     ByteSink::Buffer,
//!     &spec,
//!     &PackOptions::default(),
//! )
//! .unwrap()
//! .unwrap();
//!
//! let archive = parse(ByteSource::Bytes(bytes), &spec, &ParseOptions::default()).unwrap();
//! assert_eq!(archive.entries[0].fname, "./hello.txt");
//! ```

pub mod archive;
pub mod compress;
pub mod entry;
pub mod error;
pub mod format;
pub mod hash;
pub mod stream;
pub mod wire;

pub use archive::{
    list, list_details, make_empty, pack, parse, repack, unpack, unpack_into, unpack_to_dir,
    validate, Archive, ByteSink, CompressChoice, DirSink, EntryDetail, EntryItem, EntryReport,
    EntrySink, EntrySource, ListOptions, PackOptions, RepackOptions, UnpackOptions, Validation,
};
pub use compress::Compression;
pub use entry::{Digest, Entry, EntryKind, GlobalHeader, JsonSidecar};
pub use error::{ArchiveError, ChecksumScope};
pub use format::FormatSpec;
pub use hash::ChecksumKind;
pub use stream::{ByteSource, ByteStream};
pub use wire::builder::{ArchiveWriter, ChecksumSet};
pub use wire::reader::{ArchiveReader, ParseOptions};
