//! Plugin and module lifecycle engine.
//!
//! Drives discovery, language-module loading, dependency resolution and
//! the staged plugin lifecycle. Failures never surface as errors to the
//! host: they are captured on the affected entity and iteration continues.

pub mod handles;
pub mod module;
pub mod plugin;
mod resolver;

use crate::config::Config;
use crate::language::{LibraryLinker, ModuleLinker};
use crate::plugins::handles::{ModuleHandle, PluginHandle};
use crate::plugins::module::{Module, ModuleState};
use crate::plugins::plugin::{MethodData, Plugin, PluginState, UniqueId};
use crate::provider::Provider;
use glot_logger as logger;
use glot_manifest::{discovery, platform, PluginReference, PLUGIN_TYPE};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Owns every plugin and module entity and their lifecycle.
pub struct PluginManager {
    config: Config,
    linker: Box<dyn ModuleLinker>,
    modules: Vec<Module>,
    plugins: Vec<Plugin>,
    load_order: Vec<usize>,
    // Name-to-id maps survive re-discovery so ids stay stable and are
    // never reused within a process run.
    plugin_ids: HashMap<String, UniqueId>,
    module_ids: HashMap<String, UniqueId>,
    next_plugin_id: UniqueId,
    next_module_id: UniqueId,
    inited: bool,
}

impl PluginManager {
    pub fn new(config: Config) -> Self {
        Self::with_linker(config, Box::new(LibraryLinker))
    }

    /// Construct with a custom module linker (used by tests and embedders
    /// that provide in-process language modules).
    pub fn with_linker(config: Config, linker: Box<dyn ModuleLinker>) -> Self {
        PluginManager {
            config,
            linker,
            modules: Vec::new(),
            plugins: Vec::new(),
            load_order: Vec::new(),
            plugin_ids: HashMap::new(),
            module_ids: HashMap::new(),
            next_plugin_id: 0,
            next_module_id: 0,
            inited: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inited
    }

    /// Discover, load and start everything under the base directory.
    ///
    /// Returns `false` when already initialized.
    pub fn initialize(&mut self) -> bool {
        if self.inited {
            return false;
        }
        self.discover_all_modules_and_plugins();
        self.load_required_language_modules();
        self.load_and_start_available_plugins();
        self.inited = true;
        true
    }

    /// Stop plugins in reverse start order, then shut down and unload the
    /// language modules.
    pub fn terminate(&mut self) {
        if !self.inited {
            return;
        }
        let order = std::mem::take(&mut self.load_order);
        {
            let Self {
                ref mut modules,
                ref mut plugins,
                ref config,
                ..
            } = *self;
            for &idx in order.iter().rev() {
                if plugins[idx].state() != PluginState::Running {
                    continue;
                }
                plugins[idx].set_terminating();
                if let Some(m) = plugins[idx].module_index() {
                    if let Some(instance) = modules[m].instance_mut() {
                        instance.on_end_plugin(PluginHandle::new(&plugins[idx], &config.base_dir));
                    }
                }
                plugins[idx].set_unloaded();
            }
            for module in modules.iter_mut().rev() {
                module.unload();
            }
        }
        self.plugins.clear();
        self.modules.clear();
        self.inited = false;
    }

    /// Periodic tick, dispatched to loaded modules in load order.
    pub fn update(&mut self, dt: Duration) {
        if !self.inited {
            return;
        }
        for module in &mut self.modules {
            if module.state() == ModuleState::Loaded {
                if let Some(instance) = module.instance_mut() {
                    instance.on_update(dt);
                }
            }
        }
    }

    fn discover_all_modules_and_plugins(&mut self) {
        let packages = discovery::load_local_packages(&self.config.base_dir);
        for package in &packages {
            if package.package_type == PLUGIN_TYPE {
                let id = match self.plugin_ids.get(&package.name) {
                    Some(&id) => id,
                    None => {
                        let id = self.next_plugin_id;
                        self.next_plugin_id += 1;
                        self.plugin_ids.insert(package.name.clone(), id);
                        id
                    }
                };
                if let Some(plugin) = Plugin::from_package(id, package) {
                    self.plugins.push(plugin);
                }
            } else {
                let id = match self.module_ids.get(&package.name) {
                    Some(&id) => id,
                    None => {
                        let id = self.next_module_id;
                        self.next_module_id += 1;
                        self.module_ids.insert(package.name.clone(), id);
                        id
                    }
                };
                if let Some(module) = Module::from_package(id, package) {
                    self.modules.push(module);
                }
            }
        }
        logger::debug(&format!(
            "Discovered {} module(s) and {} plugin(s)",
            self.modules.len(),
            self.plugins.len()
        ));
    }

    /// Load every module referenced by at least one discovered plugin, plus
    /// the force-loaded ones.
    fn load_required_language_modules(&mut self) {
        let Self {
            ref mut modules,
            ref plugins,
            ref linker,
            ref config,
            ..
        } = *self;

        let prefer_own_symbols = config.prefer_own_symbols.unwrap_or(false);

        for module in modules.iter_mut() {
            let referenced = plugins.iter().any(|p| {
                p.state() != PluginState::Error
                    && p.descriptor().language_module.name == module.language()
            });
            if !referenced && !module.descriptor().force_load {
                continue;
            }

            match linker.link(module.descriptor(), module.base_dir(), prefer_own_symbols) {
                Ok(mut linked) => {
                    let provider = Provider::new(config);
                    match linked.instance.initialize(&provider) {
                        Ok(()) => {
                            logger::debug(&format!("Module '{}' loaded", module.name()));
                            module.set_linked(linked);
                        }
                        Err(e) => module.set_error(format!("Failed to initialize: {}", e)),
                    }
                }
                Err(e) => module.set_error(e.to_string()),
            }
        }
    }

    fn load_and_start_available_plugins(&mut self) {
        let order = resolver::resolve_load_order(&mut self.plugins, &self.modules);

        let Self {
            ref mut modules,
            ref mut plugins,
            ref config,
            ..
        } = *self;

        // Load phase, in dependency order.
        for &idx in &order {
            if plugins[idx].state() != PluginState::NotLoaded {
                continue;
            }
            let lang = plugins[idx].descriptor().language_module.name.clone();
            let module_index = modules.iter().position(|m| m.language() == lang);
            let Some(m) = module_index else {
                plugins[idx].set_error(format!("Language module '{}' was not found", lang));
                continue;
            };
            if modules[m].state() != ModuleState::Loaded {
                plugins[idx].set_error(format!("Language module '{}' is not loaded", lang));
                continue;
            }

            if let Some(failed) = first_unready_dependency(plugins, idx, PluginState::Loaded) {
                plugins[idx].set_error(format!("Dependency '{}' failed to load", failed));
                continue;
            }

            let Some(instance) = modules[m].instance_mut() else {
                plugins[idx].set_error(format!("Language module '{}' has no instance", lang));
                continue;
            };
            let result =
                instance.on_load_plugin(PluginHandle::new(&plugins[idx], &config.base_dir));

            match result {
                Ok(addresses) => {
                    let mut methods = Vec::new();
                    let mut missing = None;
                    for method in &plugins[idx].descriptor().exported_methods {
                        match addresses.iter().find(|a| a.name == method.name) {
                            Some(address) => methods.push(MethodData {
                                method: method.clone(),
                                addr: address.addr,
                            }),
                            None => {
                                missing = Some(method.name.clone());
                                break;
                            }
                        }
                    }
                    if let Some(name) = missing {
                        plugins[idx].set_error(format!(
                            "Language module did not resolve method '{}'",
                            name
                        ));
                        continue;
                    }
                    plugins[idx].set_methods(methods);
                    plugins[idx].set_module_index(m);
                    plugins[idx].set_loaded();
                }
                Err(e) => plugins[idx].set_error(format!("Failed to load: {}", e)),
            }
        }

        // Start phase, same order.
        for &idx in &order {
            if plugins[idx].state() != PluginState::Loaded {
                continue;
            }
            if let Some(blocked) = first_unready_dependency(plugins, idx, PluginState::Running) {
                plugins[idx].set_error(format!("Dependency '{}' is not running", blocked));
                continue;
            }
            let Some(m) = plugins[idx].module_index() else {
                continue;
            };
            if let Some(instance) = modules[m].instance_mut() {
                instance.on_start_plugin(PluginHandle::new(&plugins[idx], &config.base_dir));
                plugins[idx].set_running();
            }
        }

        self.load_order = order;
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleHandle<'_>> {
        self.modules
            .iter()
            .find(|m| m.name() == name)
            .map(|m| ModuleHandle::new(m, &self.config.base_dir))
    }

    pub fn find_module_from_id(&self, id: UniqueId) -> Option<ModuleHandle<'_>> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| ModuleHandle::new(m, &self.config.base_dir))
    }

    pub fn find_module_from_lang(&self, language: &str) -> Option<ModuleHandle<'_>> {
        self.modules
            .iter()
            .find(|m| m.language() == language)
            .map(|m| ModuleHandle::new(m, &self.config.base_dir))
    }

    pub fn find_module_from_path(&self, path: &Path) -> Option<ModuleHandle<'_>> {
        self.modules
            .iter()
            .find(|m| m.file_path() == path)
            .map(|m| ModuleHandle::new(m, &self.config.base_dir))
    }

    pub fn get_modules(&self) -> Vec<ModuleHandle<'_>> {
        self.modules
            .iter()
            .map(|m| ModuleHandle::new(m, &self.config.base_dir))
            .collect()
    }

    pub fn find_plugin(&self, name: &str) -> Option<PluginHandle<'_>> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| PluginHandle::new(p, &self.config.base_dir))
    }

    pub fn find_plugin_from_id(&self, id: UniqueId) -> Option<PluginHandle<'_>> {
        self.plugins
            .iter()
            .find(|p| p.id() == id)
            .map(|p| PluginHandle::new(p, &self.config.base_dir))
    }

    pub fn find_plugin_from_path(&self, path: &Path) -> Option<PluginHandle<'_>> {
        self.plugins
            .iter()
            .find(|p| p.file_path() == path)
            .map(|p| PluginHandle::new(p, &self.config.base_dir))
    }

    /// Find a plugin satisfying a reference descriptor (name, and exact
    /// version when requested).
    pub fn find_plugin_from_descriptor(
        &self,
        reference: &PluginReference,
    ) -> Option<PluginHandle<'_>> {
        self.plugins
            .iter()
            .find(|p| {
                p.name() == reference.name
                    && reference
                        .requested_version
                        .map_or(true, |v| p.descriptor().version == v)
            })
            .map(|p| PluginHandle::new(p, &self.config.base_dir))
    }

    pub fn get_plugins(&self) -> Vec<PluginHandle<'_>> {
        self.plugins
            .iter()
            .map(|p| PluginHandle::new(p, &self.config.base_dir))
            .collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// First non-optional, platform-matching dependency of `plugins[idx]` that
/// exists but has not reached `required` state.
fn first_unready_dependency(
    plugins: &[Plugin],
    idx: usize,
    required: PluginState,
) -> Option<String> {
    for dependency in &plugins[idx].descriptor().dependencies {
        if dependency.optional || !platform::supports(&dependency.supported_platforms) {
            continue;
        }
        if let Some(dep) = plugins.iter().find(|p| p.name() == dependency.name) {
            if dep.state() != required {
                return Some(dependency.name.clone());
            }
        }
    }
    None
}
