//! Dependency resolution for packaging rules and individual binaries.
//!
//! One contract, two modes: emit only dependencies whose target can be
//! confirmed to exist. Rule-driven mode resolves the dependency names a rule
//! declares; reflection-driven mode walks the references a binary's own
//! metadata declares. Matcher failures are never fatal; the dependency is
//! omitted and the resolution of the enclosing package continues.

use log::{info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::matcher::{PackageMatcher, RequiredVersion, ResolvedDependency, resolve_known_alias};
use crate::metadata::{MetadataReader, ModuleRecord};
use crate::registry::Registry;
use crate::rules::{INTERNAL_PREFIX, PackagingRule};

/// Which package artifacts are known to exist: produced earlier in this run,
/// or left on disk by a prior run in one of the output locations.
#[derive(Debug, Clone, Default)]
pub struct ArtifactIndex {
    produced: HashSet<String>,
    output_dirs: Vec<PathBuf>,
}

impl ArtifactIndex {
    pub fn new(output_dirs: Vec<PathBuf>) -> Self {
        Self {
            produced: HashSet::new(),
            output_dirs,
        }
    }

    /// Record a package id produced in this run.
    pub fn record(&mut self, id: &str) {
        self.produced.insert(id.to_string());
    }

    /// Whether `{id}.{release_version}.nupkg` exists in this run or on disk.
    pub fn confirms(&self, id: &str, release_version: &str) -> bool {
        if self.produced.contains(id) {
            return true;
        }
        let artifact = format!("{id}.{release_version}.nupkg");
        self.output_dirs.iter().any(|dir| dir.join(&artifact).exists())
    }
}

pub struct DependencyResolver<'a, R: Registry, M: MetadataReader> {
    matcher: &'a PackageMatcher<R>,
    metadata: &'a M,
}

impl<'a, R: Registry, M: MetadataReader> DependencyResolver<'a, R, M> {
    pub fn new(matcher: &'a PackageMatcher<R>, metadata: &'a M) -> Self {
        Self { matcher, metadata }
    }

    /// Rule-driven mode: resolve the dependency names a rule declares.
    ///
    /// Internal names (distribution prefix) are confirmed against the
    /// artifact index; anything else is looked up on the public registry with
    /// the required version read from the matching binary in `bin_dir`.
    #[tracing::instrument(skip(self, rule, artifacts))]
    pub async fn resolve_rule(
        &self,
        rule: &PackagingRule,
        release_version: &str,
        bin_dir: &Path,
        artifacts: &ArtifactIndex,
    ) -> Vec<ResolvedDependency> {
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();

        for name in &rule.depends_on {
            if !seen.insert(name.clone()) {
                continue;
            }

            if name.starts_with(INTERNAL_PREFIX) {
                if artifacts.confirms(name, release_version) {
                    resolved.push(ResolvedDependency {
                        id: name.clone(),
                        version: release_version.to_string(),
                    });
                } else {
                    info!("Skipped (unconfirmed): {name}.{release_version}");
                }
            } else if let Some(dep) = self.find_public_package(name, bin_dir).await {
                resolved.push(dep);
            }
        }

        resolved
    }

    /// Reflection-driven mode: resolve the references a binary declares.
    ///
    /// Internal references are trusted and pinned to the release version with
    /// no existence check. External references take their required version
    /// from the referenced binary when it was extracted in this run, falling
    /// back to the referencing binary's own version as a last-resort guess.
    #[tracing::instrument(skip(self, module, local_modules))]
    pub async fn resolve_module(
        &self,
        module: &ModuleRecord,
        own_version: RequiredVersion,
        local_modules: &[ModuleRecord],
        release_version: &str,
    ) -> Vec<ResolvedDependency> {
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();

        for reference in &module.declared_references {
            if reference == &module.name || !seen.insert(reference.clone()) {
                continue;
            }

            if reference.starts_with(INTERNAL_PREFIX) {
                resolved.push(ResolvedDependency {
                    id: reference.clone(),
                    version: release_version.to_string(),
                });
                continue;
            }

            let required = match local_modules.iter().find(|m| &m.name == reference) {
                Some(local) => match self.metadata.read(&local.source_path) {
                    Ok(meta) => meta.file_version_required(),
                    Err(e) => {
                        warn!("Failed to read metadata of {reference}: {e:#}");
                        own_version
                    }
                },
                None => own_version,
            };

            match self.matcher.find_package(reference, required).await {
                Ok(Some(dep)) => resolved.push(dep),
                Ok(None) => {}
                Err(e) => warn!("Failed to resolve {reference}: {e:#}"),
            }
        }

        resolved
    }

    /// Look up a public package, reading the required version from the
    /// corresponding binary in the working directory.
    async fn find_public_package(
        &self,
        package_name: &str,
        bin_dir: &Path,
    ) -> Option<ResolvedDependency> {
        let binary_name = resolve_known_alias(package_name);
        let binary_path = bin_dir.join(format!("{binary_name}.dll"));
        if !binary_path.exists() {
            info!("--- Assembly for Package Not Found: {package_name}");
            return None;
        }

        let required = match self.metadata.read(&binary_path) {
            Ok(meta) => meta.file_version_required(),
            Err(e) => {
                warn!("Failed to read metadata of {}: {e:#}", binary_path.display());
                return None;
            }
        };

        match self.matcher.find_package(package_name, required).await {
            Ok(dep) => dep,
            Err(e) => {
                warn!("Failed to resolve {package_name}: {e:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MockMetadataReader, ModuleMetadata};
    use crate::registry::MockRegistry;
    use crate::rules::curated_catalog;
    use tempfile::tempdir;

    fn rule_named(deps: &[&str]) -> PackagingRule {
        PackagingRule {
            tag: "Test".into(),
            id: "Sitecore.Test".into(),
            title: "Test".into(),
            description: "Test".into(),
            file_patterns: vec![],
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn no_registry() -> MockRegistry {
        let mut registry = MockRegistry::new();
        registry.expect_published_versions().returning(|_| Ok(vec![]));
        registry
    }

    fn module(name: &str, refs: &[&str]) -> ModuleRecord {
        ModuleRecord {
            name: name.into(),
            source_path: PathBuf::from(format!("/bin/{name}.dll")),
            declared_references: refs.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_rule_internal_dependency_confirmed_by_run() {
        let matcher = PackageMatcher::new(no_registry());
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);

        let mut artifacts = ArtifactIndex::default();
        artifacts.record("Sitecore.Core");

        let rule = rule_named(&["Sitecore.Core"]);
        let deps = resolver
            .resolve_rule(&rule, "6.2.0.101105", Path::new("/nonexistent"), &artifacts)
            .await;

        assert_eq!(
            deps,
            vec![ResolvedDependency {
                id: "Sitecore.Core".into(),
                version: "6.2.0.101105".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rule_internal_dependency_confirmed_on_disk() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Sitecore.Core.6.2.0.101105.nupkg"), b"pkg").unwrap();

        let matcher = PackageMatcher::new(no_registry());
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);
        let artifacts = ArtifactIndex::new(vec![dir.path().to_path_buf()]);

        let rule = rule_named(&["Sitecore.Core"]);
        let deps = resolver
            .resolve_rule(&rule, "6.2.0.101105", Path::new("/nonexistent"), &artifacts)
            .await;
        assert_eq!(deps.len(), 1);
    }

    #[tokio::test]
    async fn test_rule_unconfirmed_internal_dependency_is_omitted() {
        let matcher = PackageMatcher::new(no_registry());
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);

        let rule = rule_named(&["Sitecore.Missing"]);
        let deps = resolver
            .resolve_rule(
                &rule,
                "6.2.0.101105",
                Path::new("/nonexistent"),
                &ArtifactIndex::default(),
            )
            .await;
        assert!(deps.is_empty());
    }

    #[tokio::test]
    async fn test_rule_public_dependency_versioned_from_binary() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Newtonsoft.Json.dll"), b"bytes").unwrap();

        let mut registry = MockRegistry::new();
        registry
            .expect_published_versions()
            .withf(|id| id == "Newtonsoft.Json")
            .returning(|_| Ok(vec!["4.5.11".into(), "6.0.8".into()]));
        let matcher = PackageMatcher::new(registry);

        let mut metadata = MockMetadataReader::new();
        metadata.expect_read().returning(|_| {
            Ok(ModuleMetadata {
                file_version: (4, 5, 11, 0),
                ..Default::default()
            })
        });

        let resolver = DependencyResolver::new(&matcher, &metadata);
        let rule = rule_named(&["Newtonsoft.Json"]);
        let deps = resolver
            .resolve_rule(&rule, "6.2.0.101105", dir.path(), &ArtifactIndex::default())
            .await;

        assert_eq!(
            deps,
            vec![ResolvedDependency {
                id: "Newtonsoft.Json".into(),
                version: "4.5.11".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rule_public_dependency_uses_alias_for_binary_lookup() {
        let dir = tempdir().unwrap();
        // The package "Antlr" ships as Antlr3.Runtime.dll.
        std::fs::write(dir.path().join("Antlr3.Runtime.dll"), b"bytes").unwrap();

        let mut registry = MockRegistry::new();
        registry
            .expect_published_versions()
            .withf(|id| id == "Antlr")
            .returning(|_| Ok(vec!["3.5.0.2".into()]));
        let matcher = PackageMatcher::new(registry);

        let mut metadata = MockMetadataReader::new();
        metadata.expect_read().returning(|_| {
            Ok(ModuleMetadata {
                file_version: (3, 5, 0, 2),
                ..Default::default()
            })
        });

        let resolver = DependencyResolver::new(&matcher, &metadata);
        let rule = rule_named(&["Antlr"]);
        let deps = resolver
            .resolve_rule(&rule, "6.2.0.101105", dir.path(), &ArtifactIndex::default())
            .await;
        assert_eq!(deps[0].id, "Antlr");
    }

    #[tokio::test]
    async fn test_rule_missing_binary_omits_dependency() {
        let dir = tempdir().unwrap();
        let matcher = PackageMatcher::new(no_registry());
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);

        let rule = rule_named(&["Newtonsoft.Json"]);
        let deps = resolver
            .resolve_rule(&rule, "6.2.0.101105", dir.path(), &ArtifactIndex::default())
            .await;
        assert!(deps.is_empty());
    }

    #[tokio::test]
    async fn test_module_internal_references_are_trusted() {
        let matcher = PackageMatcher::new(no_registry());
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);

        let m = module("Sitecore.Client", &["Sitecore.Kernel", "Sitecore.Logging"]);
        let deps = resolver
            .resolve_module(&m, RequiredVersion::new(6, 2, 0, 0), &[], "6.2.0.101105")
            .await;

        assert_eq!(deps.len(), 2);
        assert!(deps.iter().all(|d| d.version == "6.2.0.101105"));
    }

    #[tokio::test]
    async fn test_module_self_reference_and_duplicates_are_skipped() {
        let matcher = PackageMatcher::new(no_registry());
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);

        let m = module(
            "Sitecore.Client",
            &["Sitecore.Client", "Sitecore.Kernel", "Sitecore.Kernel"],
        );
        let deps = resolver
            .resolve_module(&m, RequiredVersion::new(6, 2, 0, 0), &[], "6.2.0.101105")
            .await;
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].id, "Sitecore.Kernel");
    }

    #[tokio::test]
    async fn test_module_external_reference_versioned_from_local_binary() {
        let mut registry = MockRegistry::new();
        registry
            .expect_published_versions()
            .returning(|_| Ok(vec!["2.6.0".into()]));
        let matcher = PackageMatcher::new(registry);

        let mut metadata = MockMetadataReader::new();
        metadata
            .expect_read()
            .withf(|p| p.ends_with("Lucene.Net.dll"))
            .returning(|_| {
                Ok(ModuleMetadata {
                    file_version: (2, 6, 0, 0),
                    ..Default::default()
                })
            });

        let resolver = DependencyResolver::new(&matcher, &metadata);
        let locals = vec![module("Lucene.Net", &[])];
        let m = module("Sitecore.Kernel", &["Lucene.Net"]);
        let deps = resolver
            .resolve_module(&m, RequiredVersion::new(6, 2, 0, 0), &locals, "6.2.0.101105")
            .await;

        assert_eq!(
            deps,
            vec![ResolvedDependency {
                id: "Lucene.Net".into(),
                version: "2.6.0".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_module_external_reference_falls_back_to_own_version() {
        let mut registry = MockRegistry::new();
        registry
            .expect_published_versions()
            .returning(|_| Ok(vec!["6.2.0".into()]));
        let matcher = PackageMatcher::new(registry);
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);

        // HtmlAgilityPack was not extracted; the referencing binary's own
        // file version is the last-resort guess.
        let m = module("Sitecore.Kernel", &["HtmlAgilityPack"]);
        let deps = resolver
            .resolve_module(&m, RequiredVersion::new(6, 2, 0, 0), &[], "6.2.0.101105")
            .await;
        assert_eq!(deps[0].version, "6.2.0");
    }

    #[tokio::test]
    async fn test_module_unresolvable_reference_is_omitted() {
        let matcher = PackageMatcher::new(no_registry());
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);

        let m = module("Sitecore.Kernel", &["NoSuchPackage"]);
        let deps = resolver
            .resolve_module(&m, RequiredVersion::new(6, 2, 0, 0), &[], "6.2.0.101105")
            .await;
        assert!(deps.is_empty());
    }

    #[tokio::test]
    async fn test_curated_catalog_resolves_generically() {
        // The resolver must not special-case rule contents: feed it a rule
        // straight from the curated catalog.
        let matcher = PackageMatcher::new(no_registry());
        let metadata = MockMetadataReader::new();
        let resolver = DependencyResolver::new(&matcher, &metadata);

        let mut artifacts = ArtifactIndex::default();
        artifacts.record("Sitecore.Core");

        let rules = curated_catalog(6);
        let client = rules.iter().find(|r| r.id == "Sitecore.Client").unwrap();
        let deps = resolver
            .resolve_rule(client, "6.2.0.101105", Path::new("/nonexistent"), &artifacts)
            .await;
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].id, "Sitecore.Core");
    }
}
