//! Opaque handles exposed to language modules and hosts.
//!
//! Thin read-only views over runtime-owned entities: every getter goes
//! through the view, keeping the public surface stable while the entities
//! evolve.

use crate::plugins::module::{Module, ModuleState};
use crate::plugins::plugin::{MethodData, Plugin, PluginState, UniqueId};
use glot_manifest::{LanguageModuleDescriptor, PluginDescriptor};
use std::path::{Path, PathBuf};

/// Read-only view over a [`Plugin`].
#[derive(Clone, Copy)]
pub struct PluginHandle<'a> {
    plugin: &'a Plugin,
    runtime_base: &'a Path,
}

impl<'a> PluginHandle<'a> {
    pub(crate) fn new(plugin: &'a Plugin, runtime_base: &'a Path) -> Self {
        PluginHandle {
            plugin,
            runtime_base,
        }
    }

    pub fn id(&self) -> UniqueId {
        self.plugin.id()
    }

    pub fn name(&self) -> &'a str {
        self.plugin.name()
    }

    pub fn friendly_name(&self) -> &'a str {
        self.plugin.friendly_name()
    }

    pub fn file_path(&self) -> &'a Path {
        self.plugin.file_path()
    }

    pub fn base_dir(&self) -> &'a Path {
        self.plugin.base_dir()
    }

    pub fn content_dir(&self) -> &'a Path {
        self.plugin.content_dir()
    }

    pub fn descriptor(&self) -> &'a PluginDescriptor {
        self.plugin.descriptor()
    }

    pub fn state(&self) -> PluginState {
        self.plugin.state()
    }

    pub fn error(&self) -> &'a str {
        self.plugin.error()
    }

    pub fn methods(&self) -> &'a [MethodData] {
        self.plugin.methods()
    }

    pub fn find_resource(&self, relative: &Path) -> Option<PathBuf> {
        self.plugin.find_resource(self.runtime_base, relative)
    }
}

/// Read-only view over a [`Module`].
#[derive(Clone, Copy)]
pub struct ModuleHandle<'a> {
    module: &'a Module,
    runtime_base: &'a Path,
}

impl<'a> ModuleHandle<'a> {
    pub(crate) fn new(module: &'a Module, runtime_base: &'a Path) -> Self {
        ModuleHandle {
            module,
            runtime_base,
        }
    }

    pub fn id(&self) -> UniqueId {
        self.module.id()
    }

    pub fn name(&self) -> &'a str {
        self.module.name()
    }

    pub fn friendly_name(&self) -> &'a str {
        self.module.friendly_name()
    }

    pub fn language(&self) -> &'a str {
        self.module.language()
    }

    pub fn file_path(&self) -> &'a Path {
        self.module.file_path()
    }

    pub fn base_dir(&self) -> &'a Path {
        self.module.base_dir()
    }

    pub fn descriptor(&self) -> &'a LanguageModuleDescriptor {
        self.module.descriptor()
    }

    pub fn state(&self) -> ModuleState {
        self.module.state()
    }

    pub fn error(&self) -> &'a str {
        self.module.error()
    }

    pub fn find_resource(&self, relative: &Path) -> Option<PathBuf> {
        self.module.find_resource(self.runtime_base, relative)
    }
}
