//! Descriptor and package model for the glot runtime.
//!
//! This crate owns the typed records parsed from on-disk JSON descriptors
//! (`.gmodule` / `.gplugin`), the package manifest exchanged with remote
//! repositories, local package discovery, and the snapshot writer.

pub mod descriptor;
pub mod discovery;
pub mod errors;
pub mod method;
pub mod package;
pub mod platform;
pub mod writer;

pub use descriptor::{LanguageModuleDescriptor, LanguageModuleInfo, PluginDescriptor, PluginReference};
pub use errors::ManifestError;
pub use method::{CallingConvention, Method, Property, ValueType};
pub use package::{
    extension_for_type, folder_for_type, LocalPackage, PackageDescriptor, PackageManifest,
    PackageVersion, RemotePackage, MANIFEST_FILE_EXTENSION, MODULES_FOLDER, MODULE_FILE_EXTENSION,
    PLUGINS_FOLDER, PLUGIN_FILE_EXTENSION, PLUGIN_TYPE,
};
