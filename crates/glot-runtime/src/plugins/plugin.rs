//! The runtime plugin entity.

use glot_logger as logger;
use glot_manifest::{LocalPackage, Method, PackageDescriptor, PluginDescriptor};
use std::ffi::c_void;
use std::path::{Path, PathBuf};

/// Process-unique plugin identifier, assigned at discovery and never reused.
pub type UniqueId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    NotLoaded,
    Error,
    Loaded,
    Running,
    Terminating,
}

impl PluginState {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginState::NotLoaded => "NotLoaded",
            PluginState::Error => "Error",
            PluginState::Loaded => "Loaded",
            PluginState::Running => "Running",
            PluginState::Terminating => "Terminating",
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exported method paired with its resolved address.
#[derive(Debug, Clone)]
pub struct MethodData {
    pub method: Method,
    pub addr: *mut c_void,
}

/// A discovered plugin and its lifecycle state.
pub struct Plugin {
    id: UniqueId,
    name: String,
    file_path: PathBuf,
    base_dir: PathBuf,
    content_dir: PathBuf,
    descriptor: PluginDescriptor,
    state: PluginState,
    error: String,
    methods: Vec<MethodData>,
    /// Index into the manager's module list, set once the resolver binds it.
    module_index: Option<usize>,
}

impl Plugin {
    /// Build the entity from a discovered plugin package.
    ///
    /// Returns `None` when the package does not carry a plugin descriptor.
    pub(crate) fn from_package(id: UniqueId, package: &LocalPackage) -> Option<Self> {
        let PackageDescriptor::Plugin(descriptor) = &package.descriptor else {
            return None;
        };
        let base_dir = package
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Some(Plugin {
            id,
            name: package.name.clone(),
            file_path: package.path.clone(),
            content_dir: base_dir.join("content"),
            base_dir,
            descriptor: descriptor.clone(),
            state: PluginState::NotLoaded,
            error: String::new(),
            methods: Vec::new(),
            module_index: None,
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

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn methods(&self) -> &[MethodData] {
        &self.methods
    }

    pub(crate) fn module_index(&self) -> Option<usize> {
        self.module_index
    }

    pub(crate) fn set_module_index(&mut self, index: usize) {
        self.module_index = Some(index);
    }

    pub(crate) fn set_methods(&mut self, methods: Vec<MethodData>) {
        self.methods = methods;
    }

    /// Route the plugin to its terminal error state and log the reason.
    pub(crate) fn set_error(&mut self, error: impl Into<String>) {
        self.error = error.into();
        self.state = PluginState::Error;
        logger::error(&format!("Plugin '{}': {}", self.name, self.error));
    }

    pub(crate) fn set_loaded(&mut self) {
        self.state = PluginState::Loaded;
    }

    pub(crate) fn set_running(&mut self) {
        self.state = PluginState::Running;
    }

    pub(crate) fn set_terminating(&mut self) {
        self.state = PluginState::Terminating;
    }

    pub(crate) fn set_unloaded(&mut self) {
        self.state = PluginState::NotLoaded;
    }

    /// Resolve a resource file, preferring a user override under the
    /// runtime base directory over the plugin's own copy.
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
