//! In-memory package descriptions and the nupkg container writer.
//!
//! A `PackageDescription` is built per emitted package and handed to a
//! [`PackageWriter`]; the writer renders the nuspec manifest and zips it
//! together with the payload files.

use anyhow::{Context, Result};
use log::debug;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::matcher::ResolvedDependency;

/// Install-time script shipped with every assembly package; switches the
/// referenced assemblies to Copy Local = false.
pub const INSTALL_PS1: &str = r#"param($installPath, $toolsPath, $package, $project)

write-host ===================================================
write-host "Setting 'CopyLocal' to false for the following references:"

$asms = $package.AssemblyReferences | %{$_.Name}

foreach ($reference in $project.Object.References)
{
    if ($asms -contains $reference.Name + ".dll")
    {
        Write-Host $reference.Name
        $reference.CopyLocal = $false;
    }
}"#;

/// Everything the builder needs to produce one package artifact.
#[derive(Debug, Clone, Default)]
pub struct PackageDescription {
    pub id: String,
    pub title: String,
    pub description: String,
    pub version: String,
    /// (source path on disk, target path inside the package).
    pub files: Vec<(PathBuf, String)>,
    dependencies: Vec<ResolvedDependency>,
}

impl PackageDescription {
    pub fn new(id: &str, title: &str, description: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    /// Add a dependency, keeping the list unique by id and free of
    /// self-references.
    pub fn push_dependency(&mut self, dep: ResolvedDependency) {
        if dep.id == self.id {
            debug!("Dropping self-reference in {}", self.id);
            return;
        }
        if self.dependencies.iter().any(|d| d.id == dep.id) {
            return;
        }
        self.dependencies.push(dep);
    }

    pub fn dependencies(&self) -> &[ResolvedDependency] {
        &self.dependencies
    }

    /// The conventional artifact file name, `{id}.{version}.nupkg`.
    pub fn artifact_name(&self) -> String {
        format!("{}.{}.nupkg", self.id, self.version)
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the nuspec manifest for a package description.
pub fn render_nuspec(desc: &PackageDescription) -> String {
    let dependencies: String = desc
        .dependencies
        .iter()
        .map(|d| {
            format!(
                r#"          <dependency id="{}" version="{}" />"#,
                xml_escape(&d.id),
                xml_escape(&d.version)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2010/07/nuspec.xsd">
    <metadata>
        <id>{id}</id>
        <version>{version}</version>
        <title>{title}</title>
        <authors>Sitecore</authors>
        <owners>Sitecore</owners>
        <iconUrl>http://www.sitecore.net/favicon.ico</iconUrl>
        <requireLicenseAcceptance>false</requireLicenseAcceptance>
        <description>{description}</description>
        <dependencies>
{dependencies}
        </dependencies>
    </metadata>
</package>"#,
        id = xml_escape(&desc.id),
        version = xml_escape(&desc.version),
        title = xml_escape(&desc.title),
        description = xml_escape(&desc.description),
        dependencies = dependencies,
    )
}

/// Trait for package artifact builders.
#[cfg_attr(test, mockall::automock)]
pub trait PackageWriter: Send + Sync {
    /// Produce the package artifact at `target`.
    fn write(&self, desc: &PackageDescription, target: &Path) -> Result<()>;
}

/// Writes nupkg containers with the zip crate.
pub struct NupkgWriter;

impl PackageWriter for NupkgWriter {
    #[tracing::instrument(skip(self, desc))]
    fn write(&self, desc: &PackageDescription, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = File::create(target)
            .with_context(|| format!("Failed to create package {}", target.display()))?;
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(format!("{}.nuspec", desc.id), options)?;
        zip.write_all(render_nuspec(desc).as_bytes())?;

        for (source, target_path) in &desc.files {
            let bytes = std::fs::read(source)
                .with_context(|| format!("Failed to read payload {}", source.display()))?;
            zip.start_file(target_path.as_str(), options)?;
            zip.write_all(&bytes)?;
        }

        // Assembly packages carry the install script alongside their payload.
        if !desc.files.is_empty() {
            zip.start_file("tools/install.ps1", options)?;
            zip.write_all(INSTALL_PS1.as_bytes())?;
        }

        zip.finish().context("Failed to finalize package")?;
        debug!("Wrote {}", target.display());
        Ok(())
    }
}
