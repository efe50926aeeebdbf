//! Shared-library loading.
//!
//! [`Assembly`] opens a library at an absolute path and resolves typed
//! symbols; the handle is released on drop. [`LibraryDirectory`] scopes a
//! search-path augmentation to its own lifetime so a failed or unloaded
//! module never leaks path entries.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to load library '{path}': {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Failed to resolve symbol '{symbol}': {reason}")]
    Symbol { symbol: String, reason: String },

    #[error("Module ABI version mismatch: expected {expected}, got {actual}")]
    AbiVersionMismatch { expected: u32, actual: u32 },

    #[error("Library binary not found at '{0}'")]
    Missing(PathBuf),
}

/// A loaded shared library.
pub struct Assembly {
    library: libloading::Library,
    path: PathBuf,
}

impl Assembly {
    /// Open the library at `path`.
    ///
    /// With `prefer_own_symbols` the library is bound so that its own
    /// exports win over identically named symbols already present in the
    /// process, where the platform supports it.
    pub fn load(path: &Path, prefer_own_symbols: bool) -> Result<Self, LoadError> {
        let library = open_library(path, prefer_own_symbols).map_err(|e| LoadError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Assembly {
            library,
            path: path.to_path_buf(),
        })
    }

    /// Resolve a named symbol.
    ///
    /// # Safety
    /// The caller must supply the symbol's true type; the signature is not
    /// checked by the dynamic linker.
    pub unsafe fn get_symbol<T>(
        &self,
        symbol: &[u8],
    ) -> Result<libloading::Symbol<'_, T>, LoadError> {
        self.library.get(symbol).map_err(|e| LoadError::Symbol {
            symbol: String::from_utf8_lossy(symbol)
                .trim_end_matches('\0')
                .to_string(),
            reason: e.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembly").field("path", &self.path).finish()
    }
}

#[cfg(unix)]
fn open_library(path: &Path, prefer_own_symbols: bool) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix;

    let mut flags = unix::RTLD_NOW | unix::RTLD_LOCAL;
    #[cfg(target_os = "linux")]
    if prefer_own_symbols {
        // Glibc's RTLD_DEEPBIND; not exposed by libloading.
        const RTLD_DEEPBIND: std::os::raw::c_int = 0x8;
        flags |= RTLD_DEEPBIND;
    }
    #[cfg(not(target_os = "linux"))]
    let _ = prefer_own_symbols;

    unsafe { unix::Library::open(Some(path), flags).map(Into::into) }
}

#[cfg(windows)]
fn open_library(path: &Path, _prefer_own_symbols: bool) -> Result<libloading::Library, libloading::Error> {
    unsafe { libloading::Library::new(path) }
}

/// Scoped library search-path entry.
///
/// On Windows this wraps `AddDllDirectory`/`RemoveDllDirectory`; POSIX
/// dynamic linkers have no per-process search-path mutation, so it is a
/// no-op there (dependent libraries resolve through the rpath instead).
pub struct LibraryDirectory {
    #[cfg(windows)]
    cookie: *mut std::ffi::c_void,
    path: PathBuf,
}

impl LibraryDirectory {
    #[cfg(windows)]
    pub fn add(path: &Path) -> Self {
        use std::os::windows::ffi::OsStrExt;
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let cookie = unsafe { AddDllDirectory(wide.as_ptr()) };
        LibraryDirectory {
            cookie,
            path: path.to_path_buf(),
        }
    }

    #[cfg(not(windows))]
    pub fn add(path: &Path) -> Self {
        LibraryDirectory {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LibraryDirectory {
    fn drop(&mut self) {
        #[cfg(windows)]
        if !self.cookie.is_null() {
            unsafe {
                RemoveDllDirectory(self.cookie);
            }
        }
    }
}

#[cfg(windows)]
#[link(name = "kernel32")]
extern "system" {
    fn AddDllDirectory(new_directory: *const u16) -> *mut std::ffi::c_void;
    fn RemoveDllDirectory(cookie: *mut std::ffi::c_void) -> i32;
}

/// Platform file name of a module's shared library (`libfoo.so`, `foo.dll`).
pub fn library_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_reports_open_error() {
        let err = Assembly::load(Path::new("/definitely/not/here.so"), false).unwrap_err();
        match err {
            LoadError::Open { path, .. } => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.so"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn library_file_name_uses_platform_convention() {
        let name = library_file_name("lua");
        #[cfg(target_os = "linux")]
        assert_eq!(name, "liblua.so");
        #[cfg(target_os = "macos")]
        assert_eq!(name, "liblua.dylib");
        #[cfg(target_os = "windows")]
        assert_eq!(name, "lua.dll");
    }

    #[test]
    fn library_directory_scope_is_balanced() {
        let dir = LibraryDirectory::add(Path::new("/tmp"));
        assert_eq!(dir.path(), Path::new("/tmp"));
        drop(dir);
    }
}
