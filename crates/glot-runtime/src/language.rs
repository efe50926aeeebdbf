//! The contract between the runtime and language modules.
//!
//! A language module is a shared library teaching the runtime how to load
//! and invoke plugins of one source language. It exports an ABI version
//! marker and a constructor returning its [`LanguageModule`]
//! implementation; everything else goes through that trait.

use crate::loader::{library_file_name, Assembly, LibraryDirectory, LoadError};
use crate::plugins::handles::PluginHandle;
use crate::provider::Provider;
use glot_manifest::LanguageModuleDescriptor;
use std::ffi::c_void;
use std::path::Path;
use std::time::Duration;

/// Bumped whenever the trait or its types change incompatibly.
pub const MODULE_ABI_VERSION: u32 = 1;

/// Exported `u32` the runtime checks before constructing the module.
pub const MODULE_ABI_SYMBOL: &[u8] = b"GLOT_MODULE_ABI_VERSION\0";

/// Exported constructor: `fn() -> Box<dyn LanguageModule>`.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"glot_module_create\0";

type ModuleConstructor = fn() -> Box<dyn LanguageModule>;

/// Raw address of a resolved exported method inside a plugin.
#[derive(Debug, Clone)]
pub struct MethodAddress {
    /// Method name, matching the plugin descriptor's `exportedMethods`.
    pub name: String,
    pub addr: *mut c_void,
}

/// What a language module reports back from `on_load_plugin`: the resolved
/// method addresses, or an error string.
pub type LoadResult = Result<Vec<MethodAddress>, String>;

/// Implemented by language modules.
pub trait LanguageModule {
    /// Called once after the module's library is loaded.
    fn initialize(&mut self, provider: &Provider) -> Result<(), String>;

    /// Called before the module's library is unloaded.
    fn shutdown(&mut self);

    /// Notification that host natives changed.
    fn on_native_added(&mut self) {}

    /// Load a plugin and resolve its exported methods.
    fn on_load_plugin(&mut self, plugin: PluginHandle) -> LoadResult;

    /// Transition a loaded plugin into its running state.
    fn on_start_plugin(&mut self, plugin: PluginHandle);

    /// Stop a running plugin.
    fn on_end_plugin(&mut self, plugin: PluginHandle);

    /// Periodic tick from the host, in start order.
    fn on_update(&mut self, _dt: Duration) {}
}

/// A language module bound into the process.
pub struct LinkedModule {
    pub instance: Box<dyn LanguageModule>,
    /// Keeps the code alive; `None` for in-process (test) modules.
    pub assembly: Option<Assembly>,
    /// Scoped search-path entries, removed when the module unloads.
    pub search_dirs: Vec<LibraryDirectory>,
}

/// Seam between the lifecycle engine and the platform linker, so tests can
/// substitute in-process modules.
pub trait ModuleLinker {
    fn link(
        &self,
        descriptor: &LanguageModuleDescriptor,
        module_base: &Path,
        prefer_own_symbols: bool,
    ) -> Result<LinkedModule, LoadError>;
}

/// Production linker: opens `<module>/bin/<platform lib name>` and resolves
/// the entry symbols.
pub struct LibraryLinker;

impl ModuleLinker for LibraryLinker {
    fn link(
        &self,
        descriptor: &LanguageModuleDescriptor,
        module_base: &Path,
        prefer_own_symbols: bool,
    ) -> Result<LinkedModule, LoadError> {
        let mut search_dirs = Vec::with_capacity(descriptor.library_directories.len());
        for dir in &descriptor.library_directories {
            search_dirs.push(LibraryDirectory::add(&module_base.join(dir)));
        }

        let library_path = module_base
            .join("bin")
            .join(library_file_name(&descriptor.language));
        if !library_path.exists() {
            return Err(LoadError::Missing(library_path));
        }

        let assembly = Assembly::load(&library_path, prefer_own_symbols)?;

        unsafe {
            let version = **assembly.get_symbol::<*const u32>(MODULE_ABI_SYMBOL)?;
            if version != MODULE_ABI_VERSION {
                return Err(LoadError::AbiVersionMismatch {
                    expected: MODULE_ABI_VERSION,
                    actual: version,
                });
            }

            let constructor = *assembly.get_symbol::<ModuleConstructor>(MODULE_ENTRY_SYMBOL)?;
            let instance = constructor();

            Ok(LinkedModule {
                instance,
                assembly: Some(assembly),
                search_dirs,
            })
        }
    }
}
