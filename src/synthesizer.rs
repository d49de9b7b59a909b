//! Package synthesis orchestration.
//!
//! One pass per distribution archive: extract the binaries into a scoped
//! working directory, derive the release version, resolve dependencies per
//! rule or per binary, and hand package descriptions to the writer. Each
//! archive is processed inside a failure boundary; a broken archive is logged
//! and the batch moves on.

use anyhow::{Context, Result, anyhow, bail};
use glob::Pattern;
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;

use crate::archive::{BINARY_ENTRY_PATTERN, extract_binaries};
use crate::matcher::{PackageMatcher, ResolvedDependency};
use crate::metadata::{MetadataReader, ModuleMetadata, ModuleRecord, module_name};
use crate::package::{PackageDescription, PackageWriter};
use crate::publish::{Publisher, ServerInfo};
use crate::registry::Registry;
use crate::resolver::{ArtifactIndex, DependencyResolver};
use crate::rules::{INTERNAL_PREFIX, curated_catalog, grouped_catalog};
use crate::version::ReleaseVersion;

/// File pattern used to discover distribution archives in a directory.
pub const ARCHIVE_FILE_PATTERN: &str = "Sitecore *.* rev. *.zip";

/// Binaries that get a package of their own in per-module mode.
const MODULE_FILE_PATTERN: &str = "Sitecore.*.dll";

/// The binary whose metadata anchors the release version in per-module mode.
const ANCHOR_MODULE: &str = "Sitecore.Kernel";

/// Which packaging-rule catalog and release-version convention drive a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Functional-group bundles; release version from the archive file name;
    /// artifacts grouped by release under the output folder.
    #[default]
    Grouped,
    /// One package per binary plus curated meta-packages; release version
    /// from the anchor binary; flat artifact layout.
    PerModule,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grouped" => Ok(Mode::Grouped),
            "per-module" => Ok(Mode::PerModule),
            _ => bail!("Unknown mode: {}. Expected grouped or per-module.", s),
        }
    }
}

pub struct Synthesizer<R: Registry, M: MetadataReader, W: PackageWriter> {
    matcher: PackageMatcher<R>,
    metadata: M,
    writer: W,
    publisher: Publisher,
    push: Option<ServerInfo>,
    output: PathBuf,
    mode: Mode,
}

impl<R: Registry, M: MetadataReader, W: PackageWriter> Synthesizer<R, M, W> {
    pub fn new(
        registry: R,
        metadata: M,
        writer: W,
        publisher: Publisher,
        push: Option<ServerInfo>,
        output: PathBuf,
        mode: Mode,
    ) -> Self {
        Self {
            matcher: PackageMatcher::new(registry),
            metadata,
            writer,
            publisher,
            push,
            output,
            mode,
        }
    }

    /// Process a single archive or a directory of archives.
    ///
    /// Per-archive failures are logged and never propagate; the returned
    /// error covers only setup problems (unusable input path, output folder).
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, input: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.output).with_context(|| {
            format!("Failed to create output folder {}", self.output.display())
        })?;

        if input.is_dir() {
            self.process_folder(input).await
        } else {
            if let Err(e) = self.process_archive(input).await {
                warn!("Error processing file {}: {e:#}", input.display());
            }
            Ok(())
        }
    }

    /// Scan a directory recursively for distribution archives and process
    /// each inside the failure boundary.
    async fn process_folder(&self, dir: &Path) -> Result<()> {
        let pattern = format!("{}/**/{ARCHIVE_FILE_PATTERN}", dir.display());
        let mut archives: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Invalid archive scan pattern {pattern}"))?
            .filter_map(|entry| entry.ok())
            .collect();
        archives.sort();

        info!("Files: {}", archives.len());
        for archive in archives {
            if let Err(e) = self.process_archive(&archive).await {
                warn!("Error processing file {}: {e:#}", archive.display());
            }
        }
        Ok(())
    }

    async fn process_archive(&self, archive_path: &Path) -> Result<()> {
        info!("File: {}", archive_path.display());

        let release_title = archive_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        // In grouped mode the release version comes from the file name, so an
        // unparseable name skips the archive before any extraction work.
        let file_release = match self.mode {
            Mode::Grouped => match ReleaseVersion::parse(&release_title) {
                Some(release) => Some(release),
                None => return Ok(()),
            },
            Mode::PerModule => None,
        };

        // Working directory scoped to this archive; removed on every exit
        // path when the guard drops.
        let workdir = TempDir::new().context("Failed to create working directory")?;
        let extracted = extract_binaries(archive_path, workdir.path(), BINARY_ENTRY_PATTERN)?;

        let written = match file_release {
            Some(release) => {
                self.synthesize_grouped(&release, &release_title, workdir.path(), &extracted)
                    .await?
            }
            None => {
                self.synthesize_per_module(&release_title, workdir.path(), &extracted)
                    .await?
            }
        };

        if let Some(push) = &self.push {
            for artifact in &written {
                if let Err(e) = self.publisher.push(artifact, push).await {
                    warn!("Failed to push {}: {e:#}", artifact.display());
                }
            }
        }

        Ok(())
    }

    /// Grouped mode: one package per functional-group rule, artifacts under
    /// `{output}/{release}/`, plus an umbrella package over everything
    /// produced.
    async fn synthesize_grouped(
        &self,
        release: &ReleaseVersion,
        release_title: &str,
        bin_dir: &Path,
        extracted: &[PathBuf],
    ) -> Result<Vec<PathBuf>> {
        let version = release.to_string();
        let out_dir = self.output.join(&version);
        let resolver = DependencyResolver::new(&self.matcher, &self.metadata);
        let mut artifacts = ArtifactIndex::new(vec![out_dir.clone()]);
        let mut emitted: Vec<String> = Vec::new();
        let mut written: Vec<PathBuf> = Vec::new();

        for rule in grouped_catalog(release.major) {
            let target = out_dir.join(format!("{}.{}.nupkg", rule.id, version));
            if target.exists() {
                info!("Skipped (exists): {}", target.display());
                emitted.push(rule.id.clone());
                continue;
            }

            let files: Vec<&PathBuf> = extracted
                .iter()
                .filter(|p| rule.matches_file(&file_name_of(p)))
                .collect();
            if files.is_empty() {
                info!("No files that match pattern. Skipping {}", rule.id);
                continue;
            }

            let deps = resolver
                .resolve_rule(&rule, &version, bin_dir, &artifacts)
                .await;
            if !rule.depends_on.is_empty() && deps.is_empty() {
                info!("Skipped (no dependencies): {}", rule.id);
                continue;
            }

            let file_names: Vec<String> = files.iter().map(|p| file_name_of(p)).collect();
            let description = format!(
                "{}Package includes: \n{}",
                rule.description,
                file_names.join(", \n")
            );
            let mut desc =
                PackageDescription::new(&rule.id, &rule.title, &description, &version);
            for file in &files {
                let name = file_name_of(file);
                desc.files.push(((*file).clone(), format!("lib/{name}")));
            }
            for dep in deps {
                desc.push_dependency(dep);
            }

            self.writer.write(&desc, &target)?;
            artifacts.record(&rule.id);
            emitted.push(rule.id.clone());
            written.push(target);
        }

        if !emitted.is_empty() {
            let umbrella_id = format!("{INTERNAL_PREFIX}{}", release.major);
            let target = out_dir.join(format!("{umbrella_id}.{version}.nupkg"));
            if target.exists() {
                info!("Skipped (exists): {}", target.display());
            } else {
                let mut desc = PackageDescription::new(
                    &umbrella_id,
                    &format!("{INTERNAL_PREFIX} {} Assemblies", release.major),
                    &format!("All assemblies of {release_title}"),
                    &version,
                );
                for id in &emitted {
                    desc.push_dependency(ResolvedDependency {
                        id: id.clone(),
                        version: version.clone(),
                    });
                }
                self.writer.write(&desc, &target)?;
                written.push(target);
            }
        }

        Ok(written)
    }

    /// Per-module mode: one package per internal binary, then the curated
    /// meta-packages, then the umbrella, all flat in the output folder.
    async fn synthesize_per_module(
        &self,
        release_title: &str,
        bin_dir: &Path,
        extracted: &[PathBuf],
    ) -> Result<Vec<PathBuf>> {
        let (locals, metas) = self.read_modules(extracted);
        let release = self.anchor_release_version(&metas)?;
        let version = release.to_string();

        let module_pattern =
            Pattern::new(MODULE_FILE_PATTERN).expect("module file pattern is valid");
        let resolver = DependencyResolver::new(&self.matcher, &self.metadata);
        let mut artifacts = ArtifactIndex::new(vec![self.output.clone()]);
        let mut emitted: Vec<String> = Vec::new();
        let mut written: Vec<PathBuf> = Vec::new();

        for module in locals
            .iter()
            .filter(|m| module_pattern.matches(&format!("{}.dll", m.name)))
        {
            emitted.push(module.name.clone());

            let target = self.output.join(format!("{}.{version}.nupkg", module.name));
            if target.exists() {
                info!("Skipped (exists): {}", target.display());
                continue;
            }

            let meta = &metas[&module.name];
            let deps = resolver
                .resolve_module(module, meta.file_version_required(), &locals, &version)
                .await;

            let (fmaj, fmin, fbld, frev) = meta.file_version;
            let description = format!(
                "{} assembly of {release_title}, assembly file version: {fmaj}.{fmin}.{fbld}.{frev}, product version: {}",
                module.name, meta.product_version_text
            );
            let mut desc =
                PackageDescription::new(&module.name, &module.name, &description, &version);
            desc.files.push((
                module.source_path.clone(),
                format!("lib/{}.dll", module.name),
            ));
            for dep in deps {
                desc.push_dependency(dep);
            }

            self.writer.write(&desc, &target)?;
            artifacts.record(&module.name);
            written.push(target);
        }

        for rule in curated_catalog(release.major) {
            let target = self.output.join(format!("{}.{version}.nupkg", rule.id));
            if target.exists() {
                info!("Skipped (exists): {}", target.display());
                emitted.push(rule.id.clone());
                continue;
            }

            let deps = resolver
                .resolve_rule(&rule, &version, bin_dir, &artifacts)
                .await;
            if deps.is_empty() {
                info!("Skipped (no dependencies): {}", rule.id);
                continue;
            }

            // Curated packages carry no payload of their own; they pin a
            // consistent set of module packages.
            let mut desc =
                PackageDescription::new(&rule.id, &rule.title, &rule.description, &version);
            for dep in deps {
                desc.push_dependency(dep);
            }

            self.writer.write(&desc, &target)?;
            artifacts.record(&rule.id);
            emitted.push(rule.id.clone());
            written.push(target);
        }

        if !emitted.is_empty() {
            let target = self.output.join(format!("{INTERNAL_PREFIX}.{version}.nupkg"));
            if target.exists() {
                info!("Skipped (exists): {}", target.display());
            } else {
                let mut desc = PackageDescription::new(
                    INTERNAL_PREFIX,
                    INTERNAL_PREFIX,
                    &format!("All assemblies of {release_title}"),
                    &version,
                );
                for id in &emitted {
                    desc.push_dependency(ResolvedDependency {
                        id: id.clone(),
                        version: version.clone(),
                    });
                }
                self.writer.write(&desc, &target)?;
                written.push(target);
            }
        }

        Ok(written)
    }

    /// Read metadata for every extracted binary. Unreadable binaries are
    /// logged and dropped; they can be neither packaged nor versioned.
    fn read_modules(
        &self,
        extracted: &[PathBuf],
    ) -> (Vec<ModuleRecord>, HashMap<String, ModuleMetadata>) {
        let mut locals = Vec::new();
        let mut metas = HashMap::new();

        for path in extracted {
            let name = module_name(path);
            match self.metadata.read(path) {
                Ok(meta) => {
                    locals.push(ModuleRecord {
                        name: name.clone(),
                        source_path: path.clone(),
                        declared_references: meta.references.clone(),
                    });
                    metas.insert(name, meta);
                }
                Err(e) => warn!("Skipped (metadata): {}: {e:#}", path.display()),
            }
        }

        (locals, metas)
    }

    /// Release version from the anchor binary: product major, file minor,
    /// build fixed at 0, revision from the last six digits of the product
    /// version string.
    fn anchor_release_version(
        &self,
        metas: &HashMap<String, ModuleMetadata>,
    ) -> Result<ReleaseVersion> {
        let anchor = metas
            .get(ANCHOR_MODULE)
            .ok_or_else(|| anyhow!("Anchor binary {ANCHOR_MODULE}.dll not found in archive"))?;

        let text = &anchor.product_version_text;
        let revision: String = if text.chars().count() >= 6 {
            let chars: Vec<char> = text.chars().collect();
            chars[chars.len() - 6..].iter().collect()
        } else {
            "000000".to_string()
        };

        ReleaseVersion::new(anchor.product_version.0, anchor.file_version.1, 0, &revision)
            .ok_or_else(|| anyhow!("Anchor product version {text:?} has no usable revision"))
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
