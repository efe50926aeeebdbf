//! The runtime root object a host embeds.

use crate::config::Config;
use crate::language::ModuleLinker;
use crate::packages::PackageManager;
use crate::plugins::PluginManager;
use glot_logger as logger;
use std::time::Duration;

/// Owns the plugin lifecycle engine and the package manager.
///
/// The runtime strictly outlives both managers and every handle they give
/// out; components never share ownership of each other.
pub struct Glot {
    config: Config,
    plugin_manager: PluginManager,
    package_manager: PackageManager,
    inited: bool,
}

impl Glot {
    pub fn new(config: Config) -> Self {
        if let Some(severity) = config.log_severity {
            logger::set_severity(severity);
        }
        Glot {
            plugin_manager: PluginManager::new(config.clone()),
            package_manager: PackageManager::new(config.clone()),
            config,
            inited: false,
        }
    }

    /// Build a runtime whose plugin manager links language modules through
    /// a custom linker.
    pub fn with_linker(config: Config, linker: Box<dyn ModuleLinker>) -> Self {
        if let Some(severity) = config.log_severity {
            logger::set_severity(severity);
        }
        Glot {
            plugin_manager: PluginManager::with_linker(config.clone(), linker),
            package_manager: PackageManager::new(config.clone()),
            config,
            inited: false,
        }
    }

    /// Initialize the package manager, then discover, load and start
    /// plugins. Returns `false` when already initialized.
    pub fn initialize(&mut self) -> bool {
        if self.inited {
            return false;
        }
        self.package_manager.initialize();
        self.plugin_manager.initialize();
        self.inited = true;
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.inited
    }

    /// Periodic tick from the host.
    pub fn update(&mut self, dt: Duration) {
        if self.inited {
            self.plugin_manager.update(dt);
        }
    }

    /// Tear everything down: plugins in reverse start order, then modules,
    /// then the package manager's request queue.
    pub fn terminate(&mut self) {
        if !self.inited {
            return;
        }
        self.plugin_manager.terminate();
        self.package_manager.terminate();
        self.inited = false;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn plugin_manager(&self) -> &PluginManager {
        &self.plugin_manager
    }

    pub fn plugin_manager_mut(&mut self) -> &mut PluginManager {
        &mut self.plugin_manager
    }

    pub fn package_manager(&self) -> &PackageManager {
        &self.package_manager
    }

    pub fn package_manager_mut(&mut self) -> &mut PackageManager {
        &mut self.package_manager
    }
}

impl Drop for Glot {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn initialize_is_one_shot() {
        glot_logger::set_severity(glot_logger::Severity::None);
        let tmp = TempDir::new().unwrap();
        let mut glot = Glot::new(Config::new(tmp.path()));

        assert!(!glot.is_initialized());
        assert!(glot.initialize());
        assert!(glot.is_initialized());
        assert!(!glot.initialize());

        glot.update(Duration::from_millis(16));

        glot.terminate();
        assert!(!glot.is_initialized());
        assert!(glot.plugin_manager().get_plugins().is_empty());
    }
}
