use std::fmt;

use thiserror::Error;

use crate::compress::Compression;

/// Which digest of the per-record checksum triple failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumScope {
    Header,
    Json,
    Content,
}

impl fmt::Display for ChecksumScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChecksumScope::Header => "header",
            ChecksumScope::Json => "json",
            ChecksumScope::Content => "content",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed global header: {0}")]
    MalformedHeader(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("{scope} checksum mismatch for {}", .name.as_deref().unwrap_or("archive"))]
    ChecksumMismatch {
        scope: ChecksumScope,
        name: Option<String>,
    },

    #[error("unsupported checksum: {0}")]
    UnsupportedChecksum(String),

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(String),

    #[error("{} decompression failed for {name}", .algo.as_str())]
    DecompressFailed { algo: Compression, name: String },

    #[error("field payload contains the delimiter: {0}")]
    DelimiterInPayload(String),
}
