//! Best-effort matching of a required binary version against the versions a
//! public registry actually has.
//!
//! Public packages are versioned independently of the distribution's internal
//! numbering, so exact matches are rare. The matcher walks a fixed list of
//! progressively coarser candidate versions and takes the first one that is
//! published, trading precision for availability.

use anyhow::Result;
use log::{debug, info};

use crate::registry::Registry;

/// A package dependency resolved to a concrete id and version.
///
/// Either another package produced in the same run (pinned to the run's
/// release version) or an externally published package (pinned to whatever
/// version the fallback picked, which may differ from the requested one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub id: String,
    pub version: String,
}

/// A 4-part numeric version required by a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl RequiredVersion {
    pub fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    fn parts(&self) -> [u32; 4] {
        [self.major, self.minor, self.build, self.revision]
    }
}

impl std::fmt::Display for RequiredVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Map a package name to the binary name its version is read from.
///
/// A handful of public packages ship a binary under a different name than the
/// package itself; everything else passes through unchanged.
pub fn resolve_known_alias(package_name: &str) -> String {
    match package_name {
        "Antlr" => "Antlr3.Runtime".to_string(),
        "izenda.ComponentArt.Web.UI" => "ComponentArt.Web.UI".to_string(),
        "Lucene.Net.Contrib" => "Lucene.Net.Contrib.Core".to_string(),
        "mongocsharpdriver" => "MongoDB.Driver".to_string(),
        "Microsoft.AspNet.WebApi" => "System.Web.Http".to_string(),
        "YUICompressor.NET" => "Yahoo.Yui.Compressor".to_string(),
        name if name.starts_with("Microsoft.AspNet.") => {
            name.replace("Microsoft.AspNet.", "System.Web.")
        }
        name => name.to_string(),
    }
}

/// Collapse a build number to its leading digit (30706 becomes 3).
///
/// Compensates for the convention where a build number encodes a finer
/// sub-version whose first digit is the intended compatibility marker.
fn leading_digit(build: u32) -> u32 {
    let mut n = build;
    while n >= 10 {
        n /= 10;
    }
    n
}

/// Parse a published version string into numeric parts; absent parts are 0.
/// Returns `None` for anything non-numeric (e.g. prerelease suffixes).
fn parse_published(version: &str) -> Option<[u32; 4]> {
    let mut parts = [0u32; 4];
    let mut count = 0;
    for piece in version.split('.') {
        if count >= 4 {
            return None;
        }
        parts[count] = piece.parse().ok()?;
        count += 1;
    }
    if count < 2 {
        return None;
    }
    Some(parts)
}

/// Resolves "something compatible with version V of package X" against a
/// public registry.
pub struct PackageMatcher<R: Registry> {
    registry: R,
}

impl<R: Registry> PackageMatcher<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// Find the closest published version of `name` for `required`.
    ///
    /// Candidates are tried most-specific first: the exact 4-part version,
    /// then (major, minor, build), then (major, minor, leading digit of
    /// build), then (major, minor), then (major). The returned dependency is
    /// pinned to the matched published string, not the requested version.
    /// `None` means nothing usable is published; the miss is logged.
    #[tracing::instrument(skip(self))]
    pub async fn find_package(
        &self,
        name: &str,
        required: RequiredVersion,
    ) -> Result<Option<ResolvedDependency>> {
        let published = self.registry.published_versions(name).await?;
        if published.is_empty() {
            info!("- Package Not Found: {name}");
            return Ok(None);
        }

        // Only the first candidate carries the revision; every fallback
        // zeroes it, so a published revision can pin an exact match ahead
        // of the coarser build-level candidates.
        let candidates = [
            required.parts(),
            [required.major, required.minor, required.build, 0],
            [
                required.major,
                required.minor,
                leading_digit(required.build),
                0,
            ],
            [required.major, required.minor, 0, 0],
            [required.major, 0, 0, 0],
        ];

        for candidate in candidates {
            let matched = published
                .iter()
                .find(|v| parse_published(v) == Some(candidate));
            if let Some(version) = matched {
                debug!("Matched {name} {required} to published {version}");
                return Ok(Some(ResolvedDependency {
                    id: name.to_string(),
                    version: version.clone(),
                }));
            }
        }

        info!("--- Version Not Found: {name}, {required}");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MockRegistry;

    fn matcher_with(versions: &[&str]) -> PackageMatcher<MockRegistry> {
        let published: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        let mut registry = MockRegistry::new();
        registry
            .expect_published_versions()
            .returning(move |_| Ok(published.clone()));
        PackageMatcher::new(registry)
    }

    #[tokio::test]
    async fn test_exact_build_match_wins() {
        let matcher = matcher_with(&["1.2.3.0", "1.2.0.0", "1.0.0.0"]);
        let dep = matcher
            .find_package("Example", RequiredVersion::new(1, 2, 3, 7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dep.version, "1.2.3.0");
    }

    #[tokio::test]
    async fn test_exact_revision_match_beats_build_match() {
        let matcher = matcher_with(&["1.2.3.0", "1.2.3.7"]);
        let dep = matcher
            .find_package("Example", RequiredVersion::new(1, 2, 3, 7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dep.version, "1.2.3.7");
    }

    #[tokio::test]
    async fn test_leading_digit_fallback() {
        let matcher = matcher_with(&["1.2.3.0"]);
        let dep = matcher
            .find_package("Example", RequiredVersion::new(1, 2, 30706, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dep.version, "1.2.3.0");
    }

    #[tokio::test]
    async fn test_minor_and_major_fallback() {
        let matcher = matcher_with(&["1.2.0.0"]);
        let dep = matcher
            .find_package("Example", RequiredVersion::new(1, 2, 9, 9))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dep.version, "1.2.0.0");

        let matcher = matcher_with(&["4.0.0.0"]);
        let dep = matcher
            .find_package("Example", RequiredVersion::new(4, 5, 9, 9))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dep.version, "4.0.0.0");
    }

    #[tokio::test]
    async fn test_no_match_returns_none() {
        let matcher = matcher_with(&["2.0.0.0"]);
        let result = matcher
            .find_package("Example", RequiredVersion::new(1, 5, 0, 0))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_package_returns_none() {
        let matcher = matcher_with(&[]);
        let result = matcher
            .find_package("NoSuchPackage", RequiredVersion::new(1, 0, 0, 0))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_matched_published_string_is_kept_verbatim() {
        // Published "1.2.3" (three parts) must round-trip as-is.
        let matcher = matcher_with(&["1.2.3"]);
        let dep = matcher
            .find_package("Example", RequiredVersion::new(1, 2, 3, 5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dep.version, "1.2.3");
    }

    #[tokio::test]
    async fn test_prerelease_versions_are_ignored() {
        let matcher = matcher_with(&["1.2.3-beta1", "1.2.0"]);
        let dep = matcher
            .find_package("Example", RequiredVersion::new(1, 2, 3, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dep.version, "1.2.0");
    }

    #[test]
    fn test_leading_digit() {
        assert_eq!(leading_digit(0), 0);
        assert_eq!(leading_digit(3), 3);
        assert_eq!(leading_digit(30706), 3);
        assert_eq!(leading_digit(99), 9);
    }

    #[test]
    fn test_parse_published() {
        assert_eq!(parse_published("1.2"), Some([1, 2, 0, 0]));
        assert_eq!(parse_published("1.2.3"), Some([1, 2, 3, 0]));
        assert_eq!(parse_published("1.2.3.4"), Some([1, 2, 3, 4]));
        assert_eq!(parse_published("1"), None);
        assert_eq!(parse_published("1.2.3.4.5"), None);
        assert_eq!(parse_published("1.2.3-rc1"), None);
    }

    #[test]
    fn test_resolve_known_alias() {
        assert_eq!(resolve_known_alias("Antlr"), "Antlr3.Runtime");
        assert_eq!(resolve_known_alias("mongocsharpdriver"), "MongoDB.Driver");
        assert_eq!(
            resolve_known_alias("Microsoft.AspNet.WebApi"),
            "System.Web.Http"
        );
        assert_eq!(
            resolve_known_alias("Microsoft.AspNet.Mvc"),
            "System.Web.Mvc"
        );
        assert_eq!(resolve_known_alias("Newtonsoft.Json"), "Newtonsoft.Json");
    }
}
