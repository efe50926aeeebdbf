//! Package records: the installer's view of plugins and language modules.

use crate::descriptor::{LanguageModuleDescriptor, PluginDescriptor};
use crate::platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Package type tag used for plugins; modules use their language tag instead.
pub const PLUGIN_TYPE: &str = "plugin";

pub const MODULE_FILE_EXTENSION: &str = "gmodule";
pub const PLUGIN_FILE_EXTENSION: &str = "gplugin";
pub const MANIFEST_FILE_EXTENSION: &str = "gmanifest";

pub const MODULES_FOLDER: &str = "modules";
pub const PLUGINS_FOLDER: &str = "plugins";

/// Folder under the base directory that holds packages of the given type.
pub fn folder_for_type(package_type: &str) -> &'static str {
    if package_type == PLUGIN_TYPE {
        PLUGINS_FOLDER
    } else {
        MODULES_FOLDER
    }
}

/// Descriptor extension expected inside a package of the given type.
pub fn extension_for_type(package_type: &str) -> &'static str {
    if package_type == PLUGIN_TYPE {
        PLUGIN_FILE_EXTENSION
    } else {
        MODULE_FILE_EXTENSION
    }
}

/// Parsed descriptor carried by a local package, polymorphic by type.
#[derive(Debug, Clone)]
pub enum PackageDescriptor {
    Module(LanguageModuleDescriptor),
    Plugin(PluginDescriptor),
}

impl PackageDescriptor {
    pub fn update_url(&self) -> &str {
        match self {
            PackageDescriptor::Module(d) => &d.update_url,
            PackageDescriptor::Plugin(d) => &d.update_url,
        }
    }

    pub fn download_url(&self) -> &str {
        match self {
            PackageDescriptor::Module(d) => &d.download_url,
            PackageDescriptor::Plugin(d) => &d.download_url,
        }
    }

    pub fn created_by(&self) -> &str {
        match self {
            PackageDescriptor::Module(d) => &d.created_by,
            PackageDescriptor::Plugin(d) => &d.created_by,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            PackageDescriptor::Module(d) => &d.description,
            PackageDescriptor::Plugin(d) => &d.description,
        }
    }

    pub fn supported_platforms(&self) -> &[String] {
        match self {
            PackageDescriptor::Module(d) => &d.supported_platforms,
            PackageDescriptor::Plugin(d) => &d.supported_platforms,
        }
    }
}

/// A package installed on disk.
#[derive(Debug, Clone)]
pub struct LocalPackage {
    pub name: String,
    /// `"plugin"`, or the language tag for module packages.
    pub package_type: String,
    /// Path of the descriptor file.
    pub path: PathBuf,
    pub version: i32,
    pub descriptor: PackageDescriptor,
}

impl LocalPackage {
    /// Convert into the remote form used by snapshot manifests.
    pub fn as_remote(&self) -> RemotePackage {
        RemotePackage {
            name: self.name.clone(),
            package_type: self.package_type.clone(),
            author: self.descriptor.created_by().to_string(),
            description: self.descriptor.description().to_string(),
            versions: vec![PackageVersion {
                version: self.version,
                platforms: self.descriptor.supported_platforms().to_vec(),
                mirrors: if self.descriptor.download_url().is_empty() {
                    Vec::new()
                } else {
                    vec![self.descriptor.download_url().to_string()]
                },
            }],
        }
    }
}

/// One installable version of a remote package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,

    /// Download URLs, tried in order.
    #[serde(default)]
    pub mirrors: Vec<String>,
}

impl PackageVersion {
    pub fn supports_current_platform(&self) -> bool {
        platform::supports(&self.platforms)
    }
}

/// A package advertised by a repository manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePackage {
    pub name: String,

    #[serde(rename = "type")]
    pub package_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub versions: Vec<PackageVersion>,
}

impl RemotePackage {
    /// Highest advertised version.
    pub fn latest_version(&self) -> Option<&PackageVersion> {
        self.versions.iter().max_by_key(|v| v.version)
    }

    /// Exact version lookup.
    pub fn version(&self, version: i32) -> Option<&PackageVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Set-union of version records, identity being the version number.
    pub fn merge_versions(&mut self, versions: Vec<PackageVersion>) {
        for version in versions {
            if self.version(version.version).is_none() {
                self.versions.push(version);
            }
        }
    }

    /// Two records describe the same package when everything but the
    /// version set matches.
    pub fn same_identity(&self, other: &RemotePackage) -> bool {
        self.name == other.name
            && self.package_type == other.package_type
            && self.author == other.author
            && self.description == other.description
    }
}

/// The manifest document served by repositories and written by snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub content: BTreeMap<String, RemotePackage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(versions: &[i32]) -> RemotePackage {
        RemotePackage {
            name: "lua".into(),
            package_type: "lua".into(),
            author: String::new(),
            description: String::new(),
            versions: versions
                .iter()
                .map(|v| PackageVersion {
                    version: *v,
                    platforms: Vec::new(),
                    mirrors: vec![format!("https://mirror/lua-{v}.zip")],
                })
                .collect(),
        }
    }

    #[test]
    fn latest_version_picks_maximum() {
        let package = remote(&[2, 5, 3]);
        assert_eq!(package.latest_version().unwrap().version, 5);
        assert_eq!(package.version(3).unwrap().version, 3);
        assert!(package.version(9).is_none());
    }

    #[test]
    fn merge_is_a_set_union_by_version() {
        let mut package = remote(&[1, 2]);
        package.merge_versions(remote(&[2, 4]).versions);
        let mut versions: Vec<i32> = package.versions.iter().map(|v| v.version).collect();
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2, 4]);
    }

    #[test]
    fn manifest_round_trips() {
        let json = r#"{ "content": { "lua": { "name": "lua", "type": "lua",
            "versions": [ { "version": 5, "platforms": ["linux"], "mirrors": ["https://r/lua.zip"] } ] } } }"#;
        let manifest: PackageManifest = serde_json::from_str(json).unwrap();
        let lua = manifest.content.get("lua").unwrap();
        assert_eq!(lua.package_type, "lua");
        assert_eq!(lua.latest_version().unwrap().version, 5);

        let out = serde_json::to_string(&manifest).unwrap();
        let reparsed: PackageManifest = serde_json::from_str(&out).unwrap();
        assert_eq!(reparsed.content.len(), 1);
    }
}
