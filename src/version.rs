//! Release version derivation for distribution archives.
//!
//! A distribution archive is named like `Sitecore 6.2 rev. 101105.zip`; the
//! canonical release version for every package produced from it is derived
//! from that filename.

use log::warn;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Matches `Sitecore <major>.<minor>[.<build>] rev. <revision>` anywhere in a
/// file name, case and spacing insensitive.
static PRODUCT_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sitecore\s*(\d+)\.(\d+)(?:\.(\d+))?\s*rev\.\s*(\d+)")
        .expect("product file name pattern is valid")
});

/// The canonical 4-part version assigned to an entire distribution's packages.
///
/// `revision` is kept as a string: it is a zero-padded numeric literal taken
/// from the file name and must round-trip exactly when formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    revision: String,
}

impl ReleaseVersion {
    /// Create a release version, validating the revision literal.
    ///
    /// The revision must be empty or exactly six digits.
    pub fn new(major: u32, minor: u32, build: u32, revision: &str) -> Option<Self> {
        if !revision.is_empty() && (revision.len() != 6 || !revision.bytes().all(|b| b.is_ascii_digit())) {
            warn!("Skipped (revision): {revision}");
            return None;
        }
        Some(Self {
            major,
            minor,
            build,
            revision: revision.to_string(),
        })
    }

    /// Parse a distribution file name into a release version.
    ///
    /// Returns `None` (with a logged reason) when the name does not match the
    /// product pattern or the revision group is implausible. The build group
    /// is optional and falls back to 0.
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = match PRODUCT_FILE_NAME.captures(file_name) {
            Some(caps) => caps,
            None => {
                warn!("Skipped (no version in file name): {file_name}");
                return None;
            }
        };

        let major = caps[1].parse().ok()?;
        let minor = caps[2].parse().ok()?;
        let build = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        Self::new(major, minor, build, &caps[4])
    }

    /// The revision literal, empty or exactly six digits.
    pub fn revision(&self) -> &str {
        &self.revision
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_without_build() {
        let v = ReleaseVersion::parse("Sitecore 6.2 rev. 101105.zip").unwrap();
        assert_eq!(v.major, 6);
        assert_eq!(v.minor, 2);
        assert_eq!(v.build, 0);
        assert_eq!(v.revision(), "101105");
        assert_eq!(v.to_string(), "6.2.0.101105");
    }

    #[test]
    fn test_parse_with_build() {
        let v = ReleaseVersion::parse("Sitecore 8.1.3 rev. 160519.zip").unwrap();
        assert_eq!(v.major, 8);
        assert_eq!(v.minor, 1);
        assert_eq!(v.build, 3);
        assert_eq!(v.to_string(), "8.1.3.160519");
    }

    #[test]
    fn test_parse_is_case_and_spacing_insensitive() {
        let v = ReleaseVersion::parse("sitecore6.2 rev.101105.zip").unwrap();
        assert_eq!(v.to_string(), "6.2.0.101105");
    }

    #[test]
    fn test_parse_rejects_short_revision() {
        assert!(ReleaseVersion::parse("Sitecore 6.2 rev. 10110.zip").is_none());
    }

    #[test]
    fn test_parse_rejects_long_revision() {
        assert!(ReleaseVersion::parse("Sitecore 6.2 rev. 1011050.zip").is_none());
    }

    #[test]
    fn test_parse_rejects_unrelated_name() {
        assert!(ReleaseVersion::parse("SomeOtherProduct 1.0.zip").is_none());
    }

    #[test]
    fn test_new_accepts_empty_revision() {
        let v = ReleaseVersion::new(7, 2, 0, "").unwrap();
        assert_eq!(v.to_string(), "7.2.0.");
    }

    #[test]
    fn test_new_rejects_non_numeric_revision() {
        assert!(ReleaseVersion::new(7, 2, 0, "abc123").is_none());
    }

    #[test]
    fn test_parse_matches_inside_full_path() {
        let v = ReleaseVersion::parse("/downloads/Sitecore 7.2 rev. 140526.zip").unwrap();
        assert_eq!(v.to_string(), "7.2.0.140526");
    }
}
