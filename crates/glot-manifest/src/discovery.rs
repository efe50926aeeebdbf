//! Local package discovery.
//!
//! Walks the base directory up to a fixed depth, parses every descriptor
//! file it finds and reduces duplicates to a single survivor.

use crate::descriptor::{LanguageModuleDescriptor, PluginDescriptor};
use crate::package::{
    LocalPackage, PackageDescriptor, MODULE_FILE_EXTENSION, PLUGIN_FILE_EXTENSION, PLUGIN_TYPE,
};
use crate::platform;
use glot_logger as logger;
use std::path::Path;
use walkdir::WalkDir;

/// Descriptors deeper than `<base>/<folder>/<name>/<file>` are not considered.
const DISCOVERY_DEPTH: usize = 3;

/// Walk `base_dir` and collect every valid local package, in walk order.
///
/// Parse failures are logged and skip the file; platform-filtered
/// descriptors are dropped silently; duplicate names keep the higher
/// version with a warning.
pub fn load_local_packages(base_dir: &Path) -> Vec<LocalPackage> {
    logger::debug(&format!(
        "Discovering local packages under '{}'",
        base_dir.display()
    ));

    let mut packages: Vec<LocalPackage> = Vec::new();

    let walker = WalkDir::new(base_dir)
        .min_depth(1)
        .max_depth(DISCOVERY_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok());

    for entry in walker {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let is_module = extension == MODULE_FILE_EXTENSION;
        if !is_module && extension != PLUGIN_FILE_EXTENSION {
            continue;
        }

        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let Some(package) = read_package(path, name, is_module) else {
            continue;
        };

        match packages.iter_mut().find(|p| p.name == package.name) {
            None => packages.push(package),
            Some(existing) => {
                if existing.version != package.version {
                    logger::warn(&format!(
                        "By default, prioritizing newer version (v{}) of '{}' package, over older version (v{}).",
                        existing.version.max(package.version),
                        package.name,
                        existing.version.min(package.version)
                    ));
                    if existing.version < package.version {
                        *existing = package;
                    }
                } else {
                    logger::warn(&format!(
                        "The same version (v{}) of package '{}' exists at '{}' - second location will be ignored.",
                        existing.version,
                        package.name,
                        path.display()
                    ));
                }
            }
        }
    }

    logger::debug(&format!("Discovered {} local package(s)", packages.len()));
    packages
}

fn read_package(path: &Path, name: &str, is_module: bool) -> Option<LocalPackage> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            logger::error(&format!(
                "Package '{}': failed to read '{}': {}",
                name,
                path.display(),
                e
            ));
            return None;
        }
    };

    if is_module {
        let descriptor: LanguageModuleDescriptor = match serde_json::from_str(&json) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                logger::error(&format!("Package '{}' has JSON parsing error: {}", name, e));
                return None;
            }
        };
        if !platform::supports(&descriptor.supported_platforms) {
            return None;
        }
        if descriptor.language == PLUGIN_TYPE {
            logger::error(&format!(
                "Module descriptor '{}' has JSON parsing error: Forbidden language name",
                name
            ));
            return None;
        }
        Some(LocalPackage {
            name: name.to_string(),
            package_type: descriptor.language.clone(),
            path: path.to_path_buf(),
            version: descriptor.version,
            descriptor: PackageDescriptor::Module(descriptor),
        })
    } else {
        let mut descriptor: PluginDescriptor = match serde_json::from_str(&json) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                logger::error(&format!("Package '{}' has JSON parsing error: {}", name, e));
                return None;
            }
        };
        if !platform::supports(&descriptor.supported_platforms) {
            return None;
        }
        if descriptor.dedup_dependencies() {
            logger::warn(&format!(
                "Plugin descriptor '{}' has multiple dependencies with same name!",
                name
            ));
        }
        if descriptor.dedup_methods() {
            logger::warn(&format!(
                "Plugin descriptor '{}' has multiple methods with same name!",
                name
            ));
        }
        Some(LocalPackage {
            name: name.to_string(),
            package_type: PLUGIN_TYPE.to_string(),
            path: path.to_path_buf(),
            version: descriptor.version,
            descriptor: PackageDescriptor::Plugin(descriptor),
        })
    }
}
