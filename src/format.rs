use serde::Deserialize;

use crate::wire::fields::decode_escape;

pub const DEFAULT_MAGIC: &str = "NeoFile";
/// Magic used by legacy writers; readers accept whatever spec they are handed.
pub const LEGACY_MAGIC: &str = "ArchiveFile";

/// Resolved archive configuration, threaded explicitly through every
/// operation. There is no process-global fallback: callers wanting an
/// override parse one with [`FormatSpec::from_toml`] and pass it along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    pub magic: String,
    /// Decimal digit string appended to the magic on the wire.
    pub version: String,
    /// Terminator byte(s) appended after every serialized field.
    pub delimiter: Vec<u8>,
    /// Reserved for format variants.
    pub new_style: bool,
}

impl Default for FormatSpec {
    fn default() -> Self {
        FormatSpec {
            magic: DEFAULT_MAGIC.to_string(),
            version: "001".to_string(),
            delimiter: vec![0x00],
            new_style: true,
        }
    }
}

/// On-disk override shape: all fields optional, the delimiter written with
/// C-style escapes (`\x00`).
#[derive(Deserialize)]
struct RawSpec {
    magic: Option<String>,
    ver: Option<String>,
    delimiter: Option<String>,
    newstyle: Option<bool>,
}

impl FormatSpec {
    /// Extract the decimal digits of a version string, `"001"` when none.
    pub fn version_digits(ver: &str) -> String {
        let digits: String = ver.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            "001".to_string()
        } else {
            digits
        }
    }

    /// The `magic || version_digits` token that opens an archive.
    pub fn magic_token(&self) -> String {
        format!("{}{}", self.magic, Self::version_digits(&self.version))
    }

    /// Parse a configuration override. Discovery of the text (file lookup,
    /// environment) is the caller's concern.
    pub fn from_toml(text: &str) -> Result<FormatSpec, toml::de::Error> {
        let raw: RawSpec = toml::from_str(text)?;
        let base = FormatSpec::default();
        Ok(FormatSpec {
            magic: raw.magic.unwrap_or(base.magic),
            version: Self::version_digits(raw.ver.as_deref().unwrap_or(&base.version)),
            delimiter: raw
                .delimiter
                .map(|d| decode_escape(&d))
                .unwrap_or(base.delimiter),
            new_style: raw.newstyle.unwrap_or(base.new_style),
        })
    }
}

#[cfg(test)]
mod test_format_spec {
    use super::*;

    #[test]
    fn default_spec() {
        let fs = FormatSpec::default();
        assert_eq!(fs.magic, "NeoFile");
        assert_eq!(fs.delimiter, vec![0x00]);
        assert_eq!(fs.magic_token(), "NeoFile001");
        assert!(fs.new_style);
    }

    #[test]
    fn version_digits_extraction() {
        assert_eq!(FormatSpec::version_digits("v0.0.1"), "001");
        assert_eq!(FormatSpec::version_digits("2"), "2");
        assert_eq!(FormatSpec::version_digits("rc"), "001");
        assert_eq!(FormatSpec::version_digits(""), "001");
    }

    #[test]
    fn toml_override() {
        let fs = FormatSpec::from_toml(
            r#"
            magic = "ArchiveFile"
            ver = "v7"
            delimiter = "\\x1f"
            newstyle = false
        "#,
        )
        .unwrap();
        assert_eq!(fs.magic, "ArchiveFile");
        assert_eq!(fs.version, "7");
        assert_eq!(fs.delimiter, vec![0x1f]);
        assert!(!fs.new_style);
    }

    #[test]
    fn toml_override_is_partial() {
        let fs = FormatSpec::from_toml(r#"magic = "Custom""#).unwrap();
        assert_eq!(fs.magic, "Custom");
        assert_eq!(fs.version, "001");
        assert_eq!(fs.delimiter, vec![0x00]);
    }
}
