use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::ArchiveError;

/// Digest algorithms a record or header may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    None,
    Crc32,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumKind {
    /// Case-insensitive name lookup. The empty string means no checksum.
    pub fn from_name(name: &str) -> Result<ChecksumKind, ArchiveError> {
        match name.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(ChecksumKind::None),
            "crc32" => Ok(ChecksumKind::Crc32),
            "md5" => Ok(ChecksumKind::Md5),
            "sha1" => Ok(ChecksumKind::Sha1),
            "sha224" => Ok(ChecksumKind::Sha224),
            "sha256" => Ok(ChecksumKind::Sha256),
            "sha384" => Ok(ChecksumKind::Sha384),
            "sha512" => Ok(ChecksumKind::Sha512),
            other => Err(ArchiveError::UnsupportedChecksum(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumKind::None => "none",
            ChecksumKind::Crc32 => "crc32",
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha224 => "sha224",
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha384 => "sha384",
            ChecksumKind::Sha512 => "sha512",
        }
    }
}

/// Names the field-index resolver accepts as checksum algorithms. Wider than
/// the supported set: legacy writers emitted blake2 names here.
pub fn is_checksum_name(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "none"
            | "crc32"
            | "md5"
            | "sha1"
            | "sha224"
            | "sha256"
            | "sha384"
            | "sha512"
            | "blake2b"
            | "blake2s"
    )
}

/// Digest `data`, rendered as lowercase hex. `none` digests to `"0"`, crc32
/// is zero-padded to 8 chars, the rest are conventional hex digests.
pub fn digest(data: &[u8], kind: ChecksumKind) -> String {
    match kind {
        ChecksumKind::None => "0".to_string(),
        ChecksumKind::Crc32 => format!("{:08x}", crc32fast::hash(data)),
        ChecksumKind::Md5 => to_hex(&Md5::digest(data)),
        ChecksumKind::Sha1 => to_hex(&Sha1::digest(data)),
        ChecksumKind::Sha224 => to_hex(&Sha224::digest(data)),
        ChecksumKind::Sha256 => to_hex(&Sha256::digest(data)),
        ChecksumKind::Sha384 => to_hex(&Sha384::digest(data)),
        ChecksumKind::Sha512 => to_hex(&Sha512::digest(data)),
    }
}

/// Hex digests compare case-insensitively.
pub fn matches(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

fn to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0xf) as usize] as char);
    }
    out
}

#[cfg(test)]
mod test_digest {
    use super::*;

    #[test]
    fn none_is_zero() {
        assert_eq!(digest(b"anything", ChecksumKind::None), "0");
    }

    #[test]
    fn crc32_is_padded() {
        assert_eq!(digest(b"Hello\n", ChecksumKind::Crc32), "1d4a36d3");
        assert_eq!(digest(b"", ChecksumKind::Crc32), "00000000");
    }

    #[test]
    fn known_vectors() {
        assert_eq!(
            digest(b"abc", ChecksumKind::Md5),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            digest(b"abc", ChecksumKind::Sha1),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            digest(b"abc", ChecksumKind::Sha224),
            "23097d223405d8228642a477bda255b32aadbce4bda0b3f7e36c9da7"
        );
        assert_eq!(
            digest(b"abc", ChecksumKind::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            digest(b"abc", ChecksumKind::Sha384),
            "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed8086072ba1e7cc2358baeca134c825a7"
        );
        assert_eq!(
            digest(b"abc", ChecksumKind::Sha512),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(
            ChecksumKind::from_name("SHA256").unwrap(),
            ChecksumKind::Sha256
        );
        assert_eq!(ChecksumKind::from_name("").unwrap(), ChecksumKind::None);
        assert!(ChecksumKind::from_name("whirlpool").is_err());
    }

    #[test]
    fn comparison_ignores_case() {
        assert!(matches("1D4A36D3", "1d4a36d3"));
        assert!(!matches("1d4a36d3", "1d4a36d4"));
    }

    #[test]
    fn resolver_name_set_is_wider() {
        assert!(is_checksum_name("BLAKE2b"));
        assert!(is_checksum_name("crc32"));
        assert!(!is_checksum_name("zlib"));
    }
}
