//! Binary metadata extraction.
//!
//! The resolver never inspects binary internals directly; it goes through
//! [`MetadataReader`], which reports a module's 4-part file/product version
//! and the module names it statically links against. The real implementation
//! parses PE headers with goblin and reads the fixed version resource.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use crate::matcher::RequiredVersion;

/// One extracted binary and what its metadata declares.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// File base name without extension; the external-facing identity basis.
    pub name: String,
    pub source_path: PathBuf,
    /// Raw referenced module names, unresolved.
    pub declared_references: Vec<String>,
}

/// Version and linkage metadata read from one binary.
#[derive(Debug, Clone, Default)]
pub struct ModuleMetadata {
    pub file_version: (u32, u32, u32, u32),
    pub product_version: (u32, u32, u32, u32),
    /// The ProductVersion resource string, verbatim (may carry a revision
    /// literal the numeric fields cannot hold).
    pub product_version_text: String,
    /// Referenced module names, without extension.
    pub references: Vec<String>,
}

impl ModuleMetadata {
    pub fn file_version_required(&self) -> RequiredVersion {
        let (major, minor, build, revision) = self.file_version;
        RequiredVersion::new(major, minor, build, revision)
    }
}

/// Capability interface over binary introspection.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<ModuleMetadata>;
}

/// Reads PE headers and the VS version resource.
///
/// References are taken from the native import table. Managed assemblies
/// record their references in CLI metadata tables instead, which this reader
/// does not parse; those references are not discovered.
pub struct PeMetadataReader;

impl MetadataReader for PeMetadataReader {
    #[tracing::instrument(skip(self))]
    fn read(&self, path: &Path) -> Result<ModuleMetadata> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read binary {}", path.display()))?;
        let pe = goblin::pe::PE::parse(&bytes)
            .with_context(|| format!("Failed to parse PE headers of {}", path.display()))?;

        let references = pe
            .libraries
            .iter()
            .map(|lib| strip_dll_extension(lib))
            .collect();

        let mut meta = ModuleMetadata {
            references,
            ..Default::default()
        };

        if let Some((file, product)) = find_fixed_file_info(&bytes) {
            meta.file_version = file;
            meta.product_version = product;
        } else {
            debug!("No fixed version resource in {}", path.display());
        }
        meta.product_version_text = find_product_version_text(&bytes).unwrap_or_default();

        Ok(meta)
    }
}

/// Module identity for a binary path: base name without extension.
pub fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn strip_dll_extension(lib: &str) -> String {
    let lower = lib.to_lowercase();
    if lower.ends_with(".dll") {
        lib[..lib.len() - 4].to_string()
    } else {
        lib.to_string()
    }
}

const FIXED_FILE_INFO_SIGNATURE: [u8; 4] = [0xBD, 0x04, 0xEF, 0xFE];

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(
        bytes.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

/// Locate `VS_FIXEDFILEINFO` by its signature and decode the file and
/// product version words. MS holds (major, minor), LS holds (build, revision).
fn find_fixed_file_info(bytes: &[u8]) -> Option<((u32, u32, u32, u32), (u32, u32, u32, u32))> {
    let pos = bytes
        .windows(4)
        .position(|w| w == FIXED_FILE_INFO_SIGNATURE)?;

    let split = |ms: u32, ls: u32| (ms >> 16, ms & 0xFFFF, ls >> 16, ls & 0xFFFF);

    let file_ms = read_u32(bytes, pos + 8)?;
    let file_ls = read_u32(bytes, pos + 12)?;
    let product_ms = read_u32(bytes, pos + 16)?;
    let product_ls = read_u32(bytes, pos + 20)?;

    Some((split(file_ms, file_ls), split(product_ms, product_ls)))
}

/// Extract the UTF-16 `ProductVersion` string from the version resource.
fn find_product_version_text(bytes: &[u8]) -> Option<String> {
    let needle: Vec<u8> = "ProductVersion\0"
        .encode_utf16()
        .flat_map(|u| u.to_le_bytes())
        .collect();
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle.as_slice())?;

    // The value follows the key, padded with NUL words to a 32-bit boundary.
    let mut offset = pos + needle.len();
    while offset + 2 <= bytes.len()
        && u16::from_le_bytes([bytes[offset], bytes[offset + 1]]) == 0
    {
        offset += 2;
    }

    let mut units = Vec::new();
    while offset + 2 <= bytes.len() {
        let unit = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
        offset += 2;
    }

    let text = String::from_utf16_lossy(&units);
    (!text.is_empty()).then_some(text)
}
