//! The narrow surface the runtime exposes to language modules.

use crate::config::Config;
use glot_logger::{self as logger, Severity};
use std::path::Path;

/// Borrowed view over the runtime handed to a language module at
/// initialization. Lives no longer than the runtime that created it.
#[derive(Clone, Copy)]
pub struct Provider<'a> {
    config: &'a Config,
}

impl<'a> Provider<'a> {
    pub(crate) fn new(config: &'a Config) -> Self {
        Provider { config }
    }

    /// Root of the on-disk package layout.
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Log through the runtime's logging facade.
    pub fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::None => {}
            Severity::Fatal | Severity::Error => logger::error(message),
            Severity::Warning => logger::warn(message),
            Severity::Info => logger::info(message),
            Severity::Debug => logger::debug(message),
            Severity::Verbose => logger::verbose(message),
        }
    }
}
