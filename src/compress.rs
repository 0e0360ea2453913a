use std::io::{Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

use crate::error::ArchiveError;

/// Per-record content compression. `Lzma` is recognized on the wire but any
/// attempt to code through it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Gzip,
    Bz2,
    Lzma,
}

impl Compression {
    /// Case-insensitive lookup with the historical aliases folded in:
    /// `gz` is gzip, `bz`/`bzip`/`bzip2` are bz2, `z` is zlib, `xz` is lzma.
    pub fn from_name(name: &str) -> Result<Compression, ArchiveError> {
        match name.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Compression::None),
            "zlib" | "z" => Ok(Compression::Zlib),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "bz2" | "bz" | "bzip" | "bzip2" => Ok(Compression::Bz2),
            "lzma" | "xz" => Ok(Compression::Lzma),
            other => Err(ArchiveError::UnsupportedCompression(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zlib => "zlib",
            Compression::Gzip => "gzip",
            Compression::Bz2 => "bz2",
            Compression::Lzma => "lzma",
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Compression::None
    }
}

/// Size thresholds for the writer's `auto` policy.
const AUTO_NONE_BELOW: usize = 16 * 1024;
const AUTO_BZ2_FROM: usize = 256 * 1024;

/// Pick an algorithm and level from the raw content length: small payloads
/// are stored as-is, mid-size ones zlib level 6, large ones bz2 level 9.
pub fn auto_pick(len: usize) -> (Compression, Option<u32>) {
    if len < AUTO_NONE_BELOW {
        (Compression::None, None)
    } else if len >= AUTO_BZ2_FROM {
        (Compression::Bz2, Some(9))
    } else {
        (Compression::Zlib, Some(6))
    }
}

pub fn compress(
    data: &[u8],
    algo: Compression,
    level: Option<u32>,
) -> Result<Vec<u8>, ArchiveError> {
    match algo {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            let level = level.map(flate2::Compression::new).unwrap_or_default();
            let mut enc = ZlibEncoder::new(Vec::new(), level);
            enc.write_all(data)?;
            Ok(enc.finish()?)
        }
        Compression::Gzip => {
            let level = flate2::Compression::new(level.unwrap_or(9));
            let mut enc = GzEncoder::new(Vec::new(), level);
            enc.write_all(data)?;
            Ok(enc.finish()?)
        }
        Compression::Bz2 => {
            let level = bzip2::Compression::new(level.unwrap_or(9));
            let mut enc = BzEncoder::new(Vec::new(), level);
            enc.write_all(data)?;
            Ok(enc.finish()?)
        }
        Compression::Lzma => Err(ArchiveError::UnsupportedCompression(
            algo.as_str().to_string(),
        )),
    }
}

pub fn decompress(data: &[u8], algo: Compression) -> Result<Vec<u8>, ArchiveError> {
    let mut out = Vec::new();
    match algo {
        Compression::None => out.extend_from_slice(data),
        Compression::Zlib => {
            ZlibDecoder::new(data).read_to_end(&mut out)?;
        }
        Compression::Gzip => {
            MultiGzDecoder::new(data).read_to_end(&mut out)?;
        }
        Compression::Bz2 => {
            BzDecoder::new(data).read_to_end(&mut out)?;
        }
        Compression::Lzma => {
            return Err(ArchiveError::UnsupportedCompression(
                algo.as_str().to_string(),
            ))
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test_compress {
    use super::*;

    fn sample() -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog "
            .iter()
            .cycle()
            .take(4096)
            .copied()
            .collect()
    }

    #[test]
    fn zlib_round_trip() {
        let data = sample();
        let packed = compress(&data, Compression::Zlib, Some(6)).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, Compression::Zlib).unwrap(), data);
    }

    #[test]
    fn gzip_round_trip() {
        let data = sample();
        let packed = compress(&data, Compression::Gzip, None).unwrap();
        assert_eq!(decompress(&packed, Compression::Gzip).unwrap(), data);
    }

    #[test]
    fn bz2_round_trip() {
        let data = sample();
        let packed = compress(&data, Compression::Bz2, Some(9)).unwrap();
        assert_eq!(decompress(&packed, Compression::Bz2).unwrap(), data);
    }

    #[test]
    fn none_is_identity() {
        let data = sample();
        assert_eq!(compress(&data, Compression::None, None).unwrap(), data);
        assert_eq!(decompress(&data, Compression::None).unwrap(), data);
    }

    #[test]
    fn lzma_is_rejected() {
        assert!(compress(b"x", Compression::Lzma, None).is_err());
        assert!(decompress(b"x", Compression::Lzma).is_err());
    }

    #[test]
    fn name_aliases() {
        assert_eq!(Compression::from_name("gz").unwrap(), Compression::Gzip);
        assert_eq!(Compression::from_name("BZIP2").unwrap(), Compression::Bz2);
        assert_eq!(Compression::from_name("z").unwrap(), Compression::Zlib);
        assert_eq!(Compression::from_name("xz").unwrap(), Compression::Lzma);
        assert_eq!(Compression::from_name("").unwrap(), Compression::None);
        assert!(Compression::from_name("zstd").is_err());
    }

    #[test]
    fn auto_policy_thresholds() {
        assert_eq!(auto_pick(0), (Compression::None, None));
        assert_eq!(auto_pick(16 * 1024 - 1), (Compression::None, None));
        assert_eq!(auto_pick(16 * 1024), (Compression::Zlib, Some(6)));
        assert_eq!(auto_pick(256 * 1024 - 1), (Compression::Zlib, Some(6)));
        assert_eq!(auto_pick(256 * 1024), (Compression::Bz2, Some(9)));
    }
}
