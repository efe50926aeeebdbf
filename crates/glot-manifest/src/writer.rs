//! Manifest reading and the atomic snapshot writer.

use crate::errors::ManifestError;
use crate::package::{LocalPackage, PackageManifest};
use std::io::Write;
use std::path::Path;

/// Read a package manifest from disk.
pub fn read_manifest(path: &Path) -> Result<PackageManifest, ManifestError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Parse a package manifest out of a downloaded body.
pub fn parse_manifest(bytes: &[u8]) -> Result<PackageManifest, ManifestError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Build the snapshot manifest describing the given local set.
pub fn snapshot_manifest(packages: &[LocalPackage]) -> PackageManifest {
    let mut manifest = PackageManifest::default();
    for package in packages {
        manifest
            .content
            .insert(package.name.clone(), package.as_remote());
    }
    manifest
}

/// Write a manifest with a temp-file-then-rename so readers never observe
/// a partial document.
pub fn write_manifest(
    path: &Path,
    manifest: &PackageManifest,
    pretty: bool,
) -> Result<(), ManifestError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = if pretty {
        serde_json::to_string_pretty(manifest)?
    } else {
        serde_json::to_string(manifest)?
    };

    let temp_path = path.with_extension("tmp");
    {
        let file = std::fs::File::create(&temp_path)?;
        let mut writer = std::io::BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
    }
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
