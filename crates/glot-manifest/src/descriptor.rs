//! Typed descriptor records parsed from `.gmodule` and `.gplugin` files.
//!
//! Unknown JSON fields are ignored; missing optional fields take defaults.

use crate::method::Method;
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Manifest of a language module (`<name>.gmodule`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LanguageModuleDescriptor {
    #[serde(default)]
    pub file_version: i32,

    /// Monotonic version; the higher one wins on duplicate names.
    #[serde(default)]
    pub version: i32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub friendly_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,

    #[serde(default, rename = "createdByURL", skip_serializing_if = "String::is_empty")]
    pub created_by_url: String,

    #[serde(default, rename = "docsURL", skip_serializing_if = "String::is_empty")]
    pub docs_url: String,

    #[serde(default, rename = "downloadURL", skip_serializing_if = "String::is_empty")]
    pub download_url: String,

    #[serde(default, rename = "updateURL", skip_serializing_if = "String::is_empty")]
    pub update_url: String,

    /// Empty means "all platforms".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_platforms: Vec<String>,

    /// Ordered paths, relative to the module base directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_directories: Vec<String>,

    /// Short language tag; `"plugin"` is forbidden.
    pub language: String,

    /// Directories added to the library search path while the module is loaded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub library_directories: Vec<String>,

    /// Load the module even when no discovered plugin references it.
    #[serde(default, skip_serializing_if = "is_false")]
    pub force_load: bool,
}

/// Reference to the language module that must load a plugin.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LanguageModuleInfo {
    pub name: String,
}

/// Reference from a plugin to another plugin it depends on.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginReference {
    pub name: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_platforms: Vec<String>,

    /// Exact version required, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_version: Option<i32>,
}

/// Manifest of a plugin (`<name>.gplugin`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    #[serde(default)]
    pub file_version: i32,

    #[serde(default)]
    pub version: i32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub friendly_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,

    #[serde(default, rename = "createdByURL", skip_serializing_if = "String::is_empty")]
    pub created_by_url: String,

    #[serde(default, rename = "docsURL", skip_serializing_if = "String::is_empty")]
    pub docs_url: String,

    #[serde(default, rename = "downloadURL", skip_serializing_if = "String::is_empty")]
    pub download_url: String,

    #[serde(default, rename = "updateURL", skip_serializing_if = "String::is_empty")]
    pub update_url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_platforms: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_directories: Vec<String>,

    /// Symbol exposed by the plugin as its entry point.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub entry_point: String,

    pub language_module: LanguageModuleInfo,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<PluginReference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exported_methods: Vec<Method>,
}

fn dedup_by_name<T>(items: &mut Vec<T>, name: impl Fn(&T) -> &str) -> bool {
    let before = items.len();
    let mut seen: Vec<String> = Vec::with_capacity(before);
    items.retain(|item| {
        let n = name(item);
        if seen.iter().any(|s| s == n) {
            false
        } else {
            seen.push(n.to_string());
            true
        }
    });
    items.len() != before
}

impl PluginDescriptor {
    /// Strip duplicate dependencies by name; returns true when any were removed.
    pub fn dedup_dependencies(&mut self) -> bool {
        dedup_by_name(&mut self.dependencies, |d| d.name.as_str())
    }

    /// Strip duplicate exported methods by name; returns true when any were removed.
    pub fn dedup_methods(&mut self) -> bool {
        dedup_by_name(&mut self.exported_methods, |m| m.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_descriptor_parses_with_unknown_fields() {
        let json = r#"{
            "fileVersion": 1,
            "version": 3,
            "friendlyName": "Hello",
            "languageModule": { "name": "lua" },
            "someFutureField": { "ignored": true },
            "dependencies": [ { "name": "base", "requestedVersion": 2 } ]
        }"#;
        let descriptor: PluginDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.version, 3);
        assert_eq!(descriptor.language_module.name, "lua");
        assert_eq!(descriptor.dependencies[0].requested_version, Some(2));
        assert!(!descriptor.dependencies[0].optional);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut descriptor = PluginDescriptor {
            dependencies: vec![
                PluginReference {
                    name: "a".into(),
                    requested_version: Some(1),
                    ..Default::default()
                },
                PluginReference {
                    name: "b".into(),
                    ..Default::default()
                },
                PluginReference {
                    name: "a".into(),
                    requested_version: Some(9),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert!(descriptor.dedup_dependencies());
        assert_eq!(descriptor.dependencies.len(), 2);
        assert_eq!(descriptor.dependencies[0].requested_version, Some(1));
        assert!(!descriptor.dedup_dependencies());
    }

    #[test]
    fn url_fields_use_upper_case_suffix() {
        let json = r#"{ "language": "lua", "updateURL": "https://example.org/lua.json" }"#;
        let descriptor: LanguageModuleDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.update_url, "https://example.org/lua.json");

        let out = serde_json::to_string(&descriptor).unwrap();
        assert!(out.contains("updateURL"));
    }
}
