//! Version number parsing
//!
//! PHP, Homebrew and Valet all report versions embedded in other text
//! (`PHP 8.1.10 (cli) ...`, `Laravel Valet 3.1.11`, `php@8.1`,
//! `/opt/homebrew/Cellar/php/8.2.3_1`). [`VersionNumber::parse`] extracts the
//! first `major.minor[.patch]` occurrence.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("Invalid version pattern regex")
});

/// A `major.minor[.patch]` version number
///
/// Ordered by major, minor, then patch (an unknown patch sorts first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl VersionNumber {
    pub fn new(major: u32, minor: u32, patch: Option<u32>) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extract the first version number found in `text`
    pub fn parse(text: &str) -> Option<Self> {
        let caps = VERSION_PATTERN.captures(text)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = caps.get(3).and_then(|m| m.as_str().parse().ok());
        Some(Self::new(major, minor, patch))
    }

    /// `8.1`
    pub fn short(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// `8.1.10`, or `8.1` when the patch level is unknown
    pub fn long(&self) -> String {
        match self.patch {
            Some(patch) => format!("{}.{}.{}", self.major, self.minor, patch),
            None => self.short(),
        }
    }

    /// Same major.minor, ignoring the patch level
    pub fn same_minor(&self, other: &VersionNumber) -> bool {
        self.major == other.major && self.minor == other.minor
    }

    /// Drop the patch level
    pub fn without_patch(&self) -> Self {
        Self::new(self.major, self.minor, None)
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.long())
    }
}

impl Serialize for VersionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.long())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() {
        let v = VersionNumber::parse("8.1.10").unwrap();
        assert_eq!(v, VersionNumber::new(8, 1, Some(10)));
        assert_eq!(v.short(), "8.1");
        assert_eq!(v.long(), "8.1.10");
    }

    #[test]
    fn test_parse_embedded_versions() {
        let php = VersionNumber::parse("PHP 8.1.10 (cli) (built: Sep  3 2022 12:09:27) (NTS)");
        assert_eq!(php.unwrap().long(), "8.1.10");

        let valet = VersionNumber::parse("Laravel Valet 3.1.11").unwrap();
        assert_eq!(valet.long(), "3.1.11");

        let keg = VersionNumber::parse("/opt/homebrew/Cellar/php/8.2.3_1").unwrap();
        assert_eq!(keg.long(), "8.2.3");
    }

    #[test]
    fn test_parse_formula_name() {
        let v = VersionNumber::parse("php@7.4").unwrap();
        assert_eq!(v.patch, None);
        assert_eq!(v.long(), "7.4");
    }

    #[test]
    fn test_parse_rejects_text_without_version() {
        assert!(VersionNumber::parse("php").is_none());
        assert!(VersionNumber::parse("").is_none());
    }

    #[test]
    fn test_ordering() {
        let mut versions = vec![
            VersionNumber::parse("8.2").unwrap(),
            VersionNumber::parse("7.4.33").unwrap(),
            VersionNumber::parse("8.1.10").unwrap(),
        ];
        versions.sort();
        let shorts: Vec<String> = versions.iter().map(|v| v.short()).collect();
        assert_eq!(shorts, vec!["7.4", "8.1", "8.2"]);
    }

    #[test]
    fn test_same_minor() {
        let a = VersionNumber::parse("8.1.10").unwrap();
        let b = VersionNumber::parse("php@8.1").unwrap();
        assert!(a.same_minor(&b));
        assert!(!a.same_minor(&VersionNumber::parse("8.2.3").unwrap()));
    }

    #[test]
    fn test_serializes_as_string() {
        let v = VersionNumber::new(8, 2, Some(3));
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"8.2.3\"");
    }
}
