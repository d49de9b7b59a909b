//! Extraction of binaries from a distribution archive.
//!
//! Binaries live under a fixed conventional subpath inside the archive; they
//! are materialized flat (base names only) into a working directory scoped to
//! one archive's processing.

use anyhow::{Context, Result};
use glob::Pattern;
use log::{debug, info};
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Where the binaries sit inside a distribution archive.
pub const BINARY_ENTRY_PATTERN: &str = "*/Website/bin/*.dll";

/// Extract every archive entry matching `pattern` into `dest`, flattened to
/// base names. Duplicate base names are skipped with a logged reason.
///
/// Returns the extracted file paths in archive order.
#[tracing::instrument(skip(archive_path, dest))]
pub fn extract_binaries(archive_path: &Path, dest: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(pattern)
        .with_context(|| format!("Invalid binary entry pattern: {pattern}"))?;

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to parse archive {}", archive_path.display()))?;

    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create working directory {}", dest.display()))?;

    let mut extracted = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read archive entry {i}"))?;
        if entry.is_dir() || !pattern.matches(entry.name()) {
            continue;
        }

        let file_name = match entry.enclosed_name().and_then(|p| {
            p.file_name().map(|n| n.to_string_lossy().into_owned())
        }) {
            Some(name) => name,
            None => {
                debug!("Skipping entry with invalid path");
                continue;
            }
        };

        if !seen.insert(file_name.clone()) {
            info!("Skipped (dll): {file_name}");
            continue;
        }

        let output_path = dest.join(&file_name);
        let mut output = File::create(&output_path)
            .with_context(|| format!("Failed to create {}", output_path.display()))?;
        std::io::copy(&mut entry, &mut output)
            .with_context(|| format!("Failed to extract {file_name}"))?;

        debug!("Extracted {file_name}");
        extracted.push(output_path);
    }

    Ok(extracted)
}
