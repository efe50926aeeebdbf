//! The runtime language-module entity.

use crate::language::{LanguageModule, LinkedModule};
use crate::loader::{Assembly, LibraryDirectory};
use crate::plugins::plugin::UniqueId;
use glot_logger as logger;
use glot_manifest::{LanguageModuleDescriptor, LocalPackage, PackageDescriptor};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    NotLoaded,
    Error,
    Loaded,
}

impl ModuleState {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::NotLoaded => "NotLoaded",
            ModuleState::Error => "Error",
            ModuleState::Loaded => "Loaded",
        }
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered language module and, once linked, its live instance.
///
/// Field order matters for drop: the instance goes before the assembly
/// that holds its code, the scoped search paths after both.
pub struct Module {
    id: UniqueId,
    name: String,
    file_path: PathBuf,
    base_dir: PathBuf,
    descriptor: LanguageModuleDescriptor,
    state: ModuleState,
    error: String,
    instance: Option<Box<dyn LanguageModule>>,
    assembly: Option<Assembly>,
    search_dirs: Vec<LibraryDirectory>,
}

impl Module {
    pub(crate) fn from_package(id: UniqueId, package: &LocalPackage) -> Option<Self> {
        let PackageDescriptor::Module(descriptor) = &package.descriptor else {
            return None;
        };
        let base_dir = package
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Some(Module {
            id,
            name: package.name.clone(),
            file_path: package.path.clone(),
            base_dir,
            descriptor: descriptor.clone(),
            state: ModuleState::NotLoaded,
            error: String::new(),
            instance: None,
            assembly: None,
            search_dirs: Vec::new(),
        })
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn friendly_name(&self) -> &str {
        if self.descriptor.friendly_name.is_empty() {
            &self.name
        } else {
            &self.descriptor.friendly_name
        }
    }

    pub fn language(&self) -> &str {
        &self.descriptor.language
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn descriptor(&self) -> &LanguageModuleDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub(crate) fn instance_mut(&mut self) -> Option<&mut Box<dyn LanguageModule>> {
        self.instance.as_mut()
    }

    pub(crate) fn set_linked(&mut self, linked: LinkedModule) {
        self.instance = Some(linked.instance);
        self.assembly = linked.assembly;
        self.search_dirs = linked.search_dirs;
        self.state = ModuleState::Loaded;
    }

    pub(crate) fn set_error(&mut self, error: impl Into<String>) {
        self.error = error.into();
        self.state = ModuleState::Error;
        logger::error(&format!("Module '{}': {}", self.name, self.error));
    }

    /// Shut the instance down and release the library and its search paths.
    pub(crate) fn unload(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            instance.shutdown();
        }
        self.assembly = None;
        self.search_dirs.clear();
        if self.state == ModuleState::Loaded {
            self.state = ModuleState::NotLoaded;
        }
    }

    /// Resource lookup with user-override semantics, same as for plugins.
    pub fn find_resource(&self, runtime_base: &Path, relative: &Path) -> Option<PathBuf> {
        let override_path = runtime_base.join(relative);
        if override_path.exists() {
            return Some(override_path);
        }
        let own = self.base_dir.join(relative);
        if own.exists() {
            return Some(own);
        }
        for dir in &self.descriptor.resource_directories {
            let candidate = self.base_dir.join(dir).join(relative);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}
