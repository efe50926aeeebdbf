//! The glot runtime: a polyglot plugin host.
//!
//! A host process embeds [`Glot`] to discover plugin and language-module
//! descriptors on disk, resolve dependencies, load everything through the
//! right language module and drive the plugin lifecycle. The package
//! manager reconciles the on-disk set against remote repository manifests.

pub mod bridge;
pub mod config;
pub mod language;
pub mod loader;
pub mod packages;
pub mod plugins;
pub mod provider;
mod runtime;

pub use config::Config;
pub use language::{
    LanguageModule, LinkedModule, LoadResult, MethodAddress, ModuleLinker, MODULE_ABI_SYMBOL,
    MODULE_ABI_VERSION, MODULE_ENTRY_SYMBOL,
};
pub use loader::{Assembly, LibraryDirectory, LoadError};
pub use packages::{PackageError, PackageManager};
pub use plugins::handles::{ModuleHandle, PluginHandle};
pub use plugins::module::ModuleState;
pub use plugins::plugin::{MethodData, PluginState, UniqueId};
pub use plugins::PluginManager;
pub use provider::Provider;
pub use runtime::Glot;
