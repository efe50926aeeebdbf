//! Package manager: reconciles local installations with remote manifests.
//!
//! Every mutating operation runs inside a request block: queue the
//! downloads, hit the single barrier, then re-run discovery and dependency
//! analysis so in-memory state always reflects disk.

pub mod downloader;
mod installer;

use crate::config::Config;
use crate::packages::downloader::{DownloadResult, HttpDownloader, HTTP_STATUS_OK};
use glot_logger as logger;
use glot_manifest::{
    discovery, extension_for_type, folder_for_type, platform, writer, LocalPackage, ManifestError,
    PackageDescriptor, PackageManifest, PackageVersion, RemotePackage, MANIFEST_FILE_EXTENSION,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("HTTP failure: {0}")]
    Http(String),

    #[error("Invalid archive: {0}")]
    ArchiveInvalid(String),

    #[error("Package descriptor *.{0} missing")]
    DescriptorMissing(String),
}

/// A missed dependency: the remote package to fetch plus the exact version
/// requested, when any.
pub type MissedPackage = (RemotePackage, Option<i32>);

pub struct PackageManager {
    config: Config,
    downloader: Option<Arc<HttpDownloader>>,
    local_packages: Vec<LocalPackage>,
    remote_packages: Vec<RemotePackage>,
    missed_packages: BTreeMap<String, MissedPackage>,
    conflicted_packages: Vec<LocalPackage>,
}

impl PackageManager {
    pub fn new(config: Config) -> Self {
        PackageManager {
            config,
            downloader: None,
            local_packages: Vec::new(),
            remote_packages: Vec::new(),
            missed_packages: BTreeMap::new(),
            conflicted_packages: Vec::new(),
        }
    }

    /// Scan disk and the configured repositories.
    ///
    /// Returns `false` when already initialized.
    pub fn initialize(&mut self) -> bool {
        if self.downloader.is_some() {
            return false;
        }
        self.downloader = Some(Arc::new(HttpDownloader::new()));
        self.load_local_packages();
        self.load_remote_packages();
        self.find_dependencies();
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.downloader.is_some()
    }

    /// Drain in-flight requests and clear all state. New requests are
    /// refused once the downloader is gone.
    pub fn terminate(&mut self) {
        if let Some(downloader) = &self.downloader {
            downloader.wait_for_all_requests();
        }
        self.local_packages.clear();
        self.remote_packages.clear();
        self.missed_packages.clear();
        self.conflicted_packages.clear();
        self.downloader = None;
    }

    fn load_local_packages(&mut self) {
        self.local_packages = discovery::load_local_packages(&self.config.base_dir);
    }

    fn load_remote_packages(&mut self) {
        self.remote_packages.clear();
        let Some(downloader) = &self.downloader else {
            return;
        };

        let collected: Arc<Mutex<Vec<(String, PackageManifest)>>> = Arc::default();

        let fetch = |url: &str| {
            let url = url.to_string();
            let sink = Arc::clone(&collected);
            downloader.create_request(
                &url.clone(),
                Box::new(move |result: DownloadResult| {
                    if result.status != HTTP_STATUS_OK {
                        return;
                    }
                    match writer::parse_manifest(&result.data) {
                        Ok(manifest) => {
                            if let Ok(mut sink) = sink.lock() {
                                sink.push((url, manifest));
                            }
                        }
                        Err(e) => logger::error(&format!(
                            "Packages manifest from '{}' has JSON parsing error: {}",
                            url, e
                        )),
                    }
                }),
            );
        };

        for url in &self.config.repositories {
            if !url.is_empty() {
                fetch(url);
            }
        }
        for package in &self.local_packages {
            let url = package.descriptor.update_url();
            if !url.is_empty() {
                fetch(url);
            }
        }

        downloader.wait_for_all_requests();

        let collected = match collected.lock() {
            Ok(mut collected) => std::mem::take(&mut *collected),
            Err(_) => return,
        };
        for (url, manifest) in collected {
            for (name, package) in manifest.content {
                if name.is_empty() || package.name != name {
                    logger::error(&format!(
                        "Package manifest: '{}' has different name in key and object: {} <-> {}",
                        url, name, package.name
                    ));
                    continue;
                }
                match self.remote_packages.iter_mut().find(|p| p.name == name) {
                    None => self.remote_packages.push(package),
                    Some(existing) => {
                        if existing.same_identity(&package) {
                            existing.merge_versions(package.versions);
                        } else {
                            logger::warn(&format!(
                                "The package '{}' exists at '{}' - second location will be ignored.",
                                name, url
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Compute the missed and conflicted sets from the current scans.
    fn find_dependencies(&mut self) {
        self.missed_packages.clear();
        self.conflicted_packages.clear();

        for package in &self.local_packages {
            let PackageDescriptor::Plugin(descriptor) = &package.descriptor else {
                continue;
            };

            let lang = &descriptor.language_module.name;
            if !self.local_packages.iter().any(|p| p.package_type == *lang) {
                match self.remote_packages.iter().find(|p| p.package_type == *lang) {
                    Some(remote) => {
                        // Prioritizing the latest language module by default.
                        self.missed_packages
                            .entry(lang.clone())
                            .or_insert_with(|| (remote.clone(), None));
                    }
                    None => {
                        logger::error(&format!(
                            "Package: '{}' has language module dependency: '{}', but it was not found.",
                            package.name, lang
                        ));
                        self.conflicted_packages.push(package.clone());
                        continue;
                    }
                }
            }

            for dependency in &descriptor.dependencies {
                if dependency.optional || !platform::supports(&dependency.supported_platforms) {
                    continue;
                }

                if let Some(local) = self
                    .local_packages
                    .iter()
                    .find(|p| p.name == dependency.name)
                {
                    if let Some(requested) = dependency.requested_version {
                        if requested != local.version {
                            logger::error(&format!(
                                "Package: '{}' has dependency: '{}' which required (v{}), but (v{}) installed. Conflict cannot be resolved automatically.",
                                package.name, dependency.name, requested, local.version
                            ));
                        }
                    }
                    continue;
                }

                match self
                    .remote_packages
                    .iter()
                    .find(|p| p.name == dependency.name)
                {
                    Some(remote) => {
                        if let Some(requested) = dependency.requested_version {
                            if remote.version(requested).is_none() {
                                logger::error(&format!(
                                    "Package: '{}' has dependency: '{}' which required (v{}), but version was not found. Problem cannot be resolved automatically.",
                                    package.name, dependency.name, requested
                                ));
                                self.conflicted_packages.push(package.clone());
                                continue;
                            }
                        }

                        match self.missed_packages.get_mut(&dependency.name) {
                            None => {
                                self.missed_packages.insert(
                                    dependency.name.clone(),
                                    (remote.clone(), dependency.requested_version),
                                );
                            }
                            Some((_, existing_version)) => {
                                let Some(requested) = dependency.requested_version else {
                                    continue;
                                };
                                match *existing_version {
                                    Some(existing) if existing != requested => {
                                        logger::warn(&format!(
                                            "By default, prioritizing newer version (v{}) of '{}' dependency, over older version (v{}).",
                                            existing.max(requested),
                                            dependency.name,
                                            existing.min(requested)
                                        ));
                                        if existing < requested {
                                            *existing_version = Some(requested);
                                        }
                                    }
                                    Some(existing) => {
                                        logger::warn(&format!(
                                            "The same version (v{}) of dependency '{}' required by '{}' - second one will be ignored.",
                                            existing, dependency.name, package.name
                                        ));
                                    }
                                    None => *existing_version = Some(requested),
                                }
                            }
                        }
                    }
                    None => {
                        logger::error(&format!(
                            "Package: '{}' has dependency: '{}' which could not be found.",
                            package.name, dependency.name
                        ));
                        self.conflicted_packages.push(package.clone());
                    }
                }
            }
        }

        for (package, version) in self.missed_packages.values() {
            logger::info(&format!(
                "Required to install: '{}' [{}] (v{})",
                package.name,
                package.package_type,
                version.map_or_else(|| "[latest]".to_string(), |v| v.to_string())
            ));
        }
        for package in &self.conflicted_packages {
            logger::warn(&format!(
                "Unable to install: '{}' [{}] (v{}) due to unresolved conflicts",
                package.name, package.package_type, package.version
            ));
        }
    }

    /// Run a mutating action, hit the barrier, then re-scan so memory
    /// matches disk.
    fn request<F: FnOnce(&mut Self)>(&mut self, action: F, operation: &str) {
        action(self);
        if let Some(downloader) = &self.downloader {
            downloader.wait_for_all_requests();
        }
        self.load_local_packages();
        self.load_remote_packages();
        self.find_dependencies();
        logger::debug(&format!("{} processed", operation));
    }

    pub fn install_package(&mut self, package_name: &str, required_version: Option<i32>) {
        if package_name.is_empty() {
            return;
        }
        self.request(
            |pm| match pm.find_remote_package(package_name).cloned() {
                Some(package) => {
                    pm.install_remote_package(&package, required_version);
                }
                None => logger::error(&format!("Package: {} not found", package_name)),
            },
            "InstallPackage",
        );
    }

    pub fn install_packages(&mut self, package_names: &[String]) {
        let mut unique: HashSet<&str> = HashSet::with_capacity(package_names.len());
        self.request(
            |pm| {
                let mut not_found: Vec<&str> = Vec::new();
                for package_name in package_names {
                    if package_name.is_empty() || !unique.insert(package_name.as_str()) {
                        continue;
                    }
                    match pm.find_remote_package(package_name).cloned() {
                        Some(package) => {
                            pm.install_remote_package(&package, None);
                        }
                        None => not_found.push(package_name),
                    }
                }
                if !not_found.is_empty() {
                    logger::error(&format!("Not found '{}' package(s)", not_found.join("', '")));
                }
            },
            "InstallPackages",
        );
    }

    /// Install everything a manifest file lists; with `reinstall`, already
    /// installed packages are downloaded again.
    pub fn install_all_packages_from_path(&mut self, manifest_file_path: &Path, reinstall: bool) {
        if manifest_file_path
            .extension()
            .map_or(true, |ext| ext != MANIFEST_FILE_EXTENSION)
        {
            logger::error(&format!(
                "Package manifest: '{}' should be in *.{} format",
                manifest_file_path.display(),
                MANIFEST_FILE_EXTENSION
            ));
            return;
        }

        let path = self.config.base_dir.join(manifest_file_path);
        logger::info(&format!("Read package manifest from '{}'", path.display()));

        let manifest = match writer::read_manifest(&path) {
            Ok(manifest) => manifest,
            Err(e) => {
                logger::error(&format!(
                    "Package manifest: '{}' has JSON parsing error: {}",
                    path.display(),
                    e
                ));
                return;
            }
        };

        self.install_from_manifest(manifest, &path.display().to_string(), reinstall);
    }

    /// Same as [`Self::install_all_packages_from_path`] with the manifest
    /// fetched from a URL.
    pub fn install_all_packages_from_url(&mut self, manifest_url: &str, reinstall: bool) {
        if manifest_url.is_empty() {
            return;
        }
        let Some(downloader) = &self.downloader else {
            logger::error("Package manager is not initialized");
            return;
        };

        logger::info(&format!("Read package manifest from '{}'", manifest_url));

        let fetched: Arc<Mutex<Option<PackageManifest>>> = Arc::default();
        {
            let sink = Arc::clone(&fetched);
            let url = manifest_url.to_string();
            downloader.create_request(
                manifest_url,
                Box::new(move |result: DownloadResult| {
                    if result.status != HTTP_STATUS_OK {
                        logger::error(&format!(
                            "Failed downloading manifest from '{}' - Code: {}",
                            url, result.status
                        ));
                        return;
                    }
                    match writer::parse_manifest(&result.data) {
                        Ok(manifest) => {
                            if let Ok(mut sink) = sink.lock() {
                                *sink = Some(manifest);
                            }
                        }
                        Err(e) => logger::error(&format!(
                            "Packages manifest from '{}' has JSON parsing error: {}",
                            url, e
                        )),
                    }
                }),
            );
            downloader.wait_for_all_requests();
        }

        let manifest = match fetched.lock() {
            Ok(mut fetched) => fetched.take(),
            Err(_) => None,
        };
        if let Some(manifest) = manifest {
            self.install_from_manifest(manifest, manifest_url, reinstall);
        }
    }

    fn install_from_manifest(
        &mut self,
        mut manifest: PackageManifest,
        source: &str,
        reinstall: bool,
    ) {
        if !reinstall {
            for package in &self.local_packages {
                manifest.content.remove(&package.name);
            }
        }

        if manifest.content.is_empty() {
            logger::warn(
                "No packages to install was found! If you need to reinstall all installed packages, use the reinstall flag!",
            );
            return;
        }

        let source = source.to_string();
        self.request(
            move |pm| {
                for (name, package) in &manifest.content {
                    if name.is_empty() || package.name != *name {
                        logger::error(&format!(
                            "Package manifest: '{}' has different name in key and object: {} <-> {}",
                            source, name, package.name
                        ));
                        continue;
                    }
                    pm.install_remote_package(package, None);
                }
            },
            "InstallAllPackages",
        );
    }

    /// Install everything the last diagnosis reported missing.
    pub fn install_missed_packages(&mut self) {
        self.request(
            |pm| {
                let missed: Vec<(String, MissedPackage)> = pm
                    .missed_packages
                    .iter()
                    .map(|(name, dep)| (name.clone(), dep.clone()))
                    .collect();
                let mut installed: Vec<String> = Vec::new();
                for (name, (package, version)) in missed {
                    pm.install_remote_package(&package, version);
                    installed.push(name);
                }
                if !installed.is_empty() {
                    logger::info(&format!(
                        "Trying install '{}' missing package(s) to solve dependency issues",
                        installed.join("', '")
                    ));
                }
            },
            "InstallMissedPackages",
        );
    }

    /// Remove every package the last diagnosis reported conflicted.
    pub fn uninstall_conflicted_packages(&mut self) {
        self.request(
            |pm| {
                let conflicted = std::mem::take(&mut pm.conflicted_packages);
                let mut removed: Vec<String> = Vec::new();
                for package in &conflicted {
                    if pm.uninstall_local_package(package, false) {
                        removed.push(package.name.clone());
                    }
                }
                if !removed.is_empty() {
                    logger::info(&format!(
                        "Trying uninstall '{}' conflicted package(s) to solve dependency issues",
                        removed.join("', '")
                    ));
                }
            },
            "UninstallConflictedPackages",
        );
    }

    fn install_remote_package(
        &mut self,
        package: &RemotePackage,
        required_version: Option<i32>,
    ) -> bool {
        if let Some(local) = self.find_local_package(&package.name) {
            logger::warn(&format!(
                "Package: '{}' (v{}) already installed",
                package.name, local.version
            ));
            return false;
        }

        let version = match required_version {
            Some(required) => match package.version(required) {
                Some(version) => version,
                None => {
                    logger::warn(&format!(
                        "Package: '{}' (v{}) has not been found",
                        package.name, required
                    ));
                    return false;
                }
            },
            None => match package.latest_version() {
                Some(version) => version,
                None => {
                    logger::warn(&format!(
                        "Package: '{}' (v[latest]) has not been found",
                        package.name
                    ));
                    return false;
                }
            },
        };
        if !version.supports_current_platform() {
            return false;
        }

        self.download_package(package, version)
    }

    pub fn update_package(&mut self, package_name: &str, required_version: Option<i32>) {
        if package_name.is_empty() {
            return;
        }
        self.request(
            |pm| match pm.find_local_package(package_name).cloned() {
                Some(package) => {
                    pm.update_local_package(&package, required_version);
                }
                None => logger::error(&format!("Package: {} not found", package_name)),
            },
            "UpdatePackage",
        );
    }

    pub fn update_packages(&mut self, package_names: &[String]) {
        let mut unique: HashSet<&str> = HashSet::with_capacity(package_names.len());
        self.request(
            |pm| {
                let mut not_found: Vec<&str> = Vec::new();
                for package_name in package_names {
                    if package_name.is_empty() || !unique.insert(package_name.as_str()) {
                        continue;
                    }
                    match pm.find_local_package(package_name).cloned() {
                        Some(package) => {
                            pm.update_local_package(&package, None);
                        }
                        None => not_found.push(package_name),
                    }
                }
                if !not_found.is_empty() {
                    logger::error(&format!("Not found '{}' package(s)", not_found.join("', '")));
                }
            },
            "UpdatePackages",
        );
    }

    pub fn update_all_packages(&mut self) {
        self.request(
            |pm| {
                let local = pm.local_packages.clone();
                for package in &local {
                    pm.update_local_package(package, None);
                }
            },
            "UpdateAllPackages",
        );
    }

    fn update_local_package(&mut self, package: &LocalPackage, required_version: Option<i32>) -> bool {
        let Some(remote) = self.find_remote_package(&package.name).cloned() else {
            logger::warn(&format!("Package: '{}' has not been found", package.name));
            return false;
        };

        let version = match required_version {
            Some(required) => match remote.version(required) {
                Some(version) => {
                    let action = if version.version > package.version {
                        "upgraded"
                    } else if version.version == package.version {
                        "reinstalled"
                    } else {
                        "downgraded"
                    };
                    logger::info(&format!(
                        "Package '{}' (v{}) will be {}, to different version (v{})",
                        package.name, package.version, action, version.version
                    ));
                    version
                }
                None => {
                    logger::warn(&format!(
                        "Package: '{}' (v{}) has not been found",
                        package.name, required
                    ));
                    return false;
                }
            },
            None => match remote.latest_version() {
                Some(version) => {
                    if version.version <= package.version {
                        logger::warn(&format!(
                            "Package: '{}' has no update available",
                            package.name
                        ));
                        return false;
                    }
                    logger::info(&format!(
                        "Update available, prioritizing newer version (v{}) of '{}' package, over older version (v{}).",
                        version.version, remote.name, package.version
                    ));
                    version
                }
                None => {
                    logger::warn(&format!(
                        "Package: '{}' (v[latest]) has not been found",
                        package.name
                    ));
                    return false;
                }
            },
        };
        if !version.supports_current_platform() {
            return false;
        }

        let remote_clone = remote.clone();
        let version_clone = version.clone();
        self.download_package(&remote_clone, &version_clone)
    }

    pub fn uninstall_package(&mut self, package_name: &str) {
        if package_name.is_empty() {
            return;
        }
        self.request(
            |pm| match pm.find_local_package(package_name).cloned() {
                Some(package) => {
                    pm.uninstall_local_package(&package, true);
                }
                None => logger::error(&format!("Package: {} not found", package_name)),
            },
            "UninstallPackage",
        );
    }

    pub fn uninstall_packages(&mut self, package_names: &[String]) {
        let mut unique: HashSet<&str> = HashSet::with_capacity(package_names.len());
        self.request(
            |pm| {
                let mut not_found: Vec<&str> = Vec::new();
                for package_name in package_names {
                    if package_name.is_empty() || !unique.insert(package_name.as_str()) {
                        continue;
                    }
                    match pm.find_local_package(package_name).cloned() {
                        Some(package) => {
                            pm.uninstall_local_package(&package, true);
                        }
                        None => not_found.push(package_name),
                    }
                }
                if !not_found.is_empty() {
                    logger::error(&format!("Not found '{}' package(s)", not_found.join("', '")));
                }
            },
            "UninstallPackages",
        );
    }

    pub fn uninstall_all_packages(&mut self) {
        self.request(
            |pm| {
                let local = std::mem::take(&mut pm.local_packages);
                for package in &local {
                    pm.uninstall_local_package(package, false);
                }
            },
            "UninstallAllPackages",
        );
    }

    fn uninstall_local_package(&mut self, package: &LocalPackage, remove: bool) -> bool {
        let Some(package_path) = package.path.parent() else {
            logger::error(&format!(
                "Package: '{}' path doesn't contain parent path",
                package.name
            ));
            return false;
        };
        match std::fs::remove_dir_all(package_path) {
            Ok(()) => {
                if remove {
                    self.local_packages.retain(|p| p.name != package.name);
                }
                logger::info(&format!(
                    "Package: '{}' (v{}) was removed from: '{}'",
                    package.name,
                    package.version,
                    package_path.display()
                ));
                true
            }
            Err(e) => {
                logger::error(&format!(
                    "Package: '{}' could not be removed from: '{}' - {}",
                    package.name,
                    package_path.display(),
                    e
                ));
                false
            }
        }
    }

    /// Write a manifest describing the current local set.
    pub fn snapshot_packages(&self, manifest_file_path: &Path, pretty: bool) {
        if manifest_file_path
            .extension()
            .map_or(true, |ext| ext != MANIFEST_FILE_EXTENSION)
        {
            logger::error(&format!(
                "Package manifest: '{}' should be in *.{} format",
                manifest_file_path.display(),
                MANIFEST_FILE_EXTENSION
            ));
            return;
        }

        let manifest = writer::snapshot_manifest(&self.local_packages);
        if manifest.content.is_empty() {
            logger::warn("Packages was not found!");
            return;
        }

        match writer::write_manifest(manifest_file_path, &manifest, pretty) {
            Ok(()) => logger::debug(&format!(
                "Snapshot '{}' created",
                manifest_file_path.display()
            )),
            Err(e) => logger::error(&format!(
                "Snapshot '{}' could not be written - {}",
                manifest_file_path.display(),
                e
            )),
        }
    }

    fn download_package(&self, package: &RemotePackage, version: &PackageVersion) -> bool {
        if !self.is_package_authorized(&package.name, version.version) {
            logger::warn("Tried to download a package that is not verified, aborting");
            return false;
        }

        let Some(downloader) = &self.downloader else {
            logger::error("Package manager is not initialized");
            return false;
        };
        let Some(mirror) = version.mirrors.first() else {
            logger::error(&format!("Package: '{}' has no download mirrors", package.name));
            return false;
        };

        logger::verbose(&format!("Start downloading: '{}'", package.name));

        let name = package.name.clone();
        let folder = folder_for_type(&package.package_type).to_string();
        let extension = extension_for_type(&package.package_type).to_string();
        let base_dir = self.config.base_dir.clone();

        downloader.create_request(
            mirror,
            Box::new(move |result: DownloadResult| {
                if result.status != HTTP_STATUS_OK {
                    logger::error(&format!(
                        "Failed downloading: '{}' - Code: {}",
                        name, result.status
                    ));
                    return;
                }
                logger::verbose(&format!("Done downloading: '{}'", name));

                let media_type = result.content_type.split(';').next().unwrap_or("").trim();
                if media_type != "application/zip" {
                    logger::error(&format!(
                        "Package: '{}' should be in *.zip format to be extracted correctly",
                        name
                    ));
                    return;
                }

                match installer::stage_and_install(&result.data, &base_dir, &folder, &name, &extension)
                {
                    Ok(destination) => logger::verbose(&format!(
                        "Done extracting: '{}' into '{}'",
                        name,
                        destination.display()
                    )),
                    Err(e) => logger::error(&format!("Failed extracting: '{}' - {}", name, e)),
                }
            }),
        )
    }

    // Archive verification hook; deliberately disabled. A policy (checksum
    // allow-list) can be wired in here without touching the install path.
    fn is_package_authorized(&self, _package_name: &str, _version: i32) -> bool {
        true
    }

    pub fn find_local_package(&self, package_name: &str) -> Option<&LocalPackage> {
        self.local_packages.iter().find(|p| p.name == package_name)
    }

    pub fn find_remote_package(&self, package_name: &str) -> Option<&RemotePackage> {
        self.remote_packages.iter().find(|p| p.name == package_name)
    }

    pub fn get_local_packages(&self) -> &[LocalPackage] {
        &self.local_packages
    }

    pub fn get_remote_packages(&self) -> &[RemotePackage] {
        &self.remote_packages
    }

    pub fn get_missed_packages(&self) -> &BTreeMap<String, MissedPackage> {
        &self.missed_packages
    }

    pub fn get_conflicted_packages(&self) -> &[LocalPackage] {
        &self.conflicted_packages
    }

    pub fn has_missed_packages(&self) -> bool {
        !self.missed_packages.is_empty()
    }

    pub fn has_conflicted_packages(&self) -> bool {
        !self.conflicted_packages.is_empty()
    }
}

impl Drop for PackageManager {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glot_logger::Severity;
    use std::fs;
    use tempfile::TempDir;

    fn quiet() {
        glot_logger::set_severity(Severity::None);
    }

    fn write_plugin(base: &Path, name: &str, body: &str) {
        let dir = base.join("plugins").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.gplugin")), body).unwrap();
    }

    fn write_module(base: &Path, name: &str, body: &str) {
        let dir = base.join("modules").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.gmodule")), body).unwrap();
    }

    fn remote(name: &str, package_type: &str, versions: &[i32]) -> RemotePackage {
        RemotePackage {
            name: name.to_string(),
            package_type: package_type.to_string(),
            author: String::new(),
            description: String::new(),
            versions: versions
                .iter()
                .map(|v| PackageVersion {
                    version: *v,
                    platforms: Vec::new(),
                    mirrors: vec![format!("https://mirror/{name}-{v}.zip")],
                })
                .collect(),
        }
    }

    fn manager_with(base: &Path, remotes: Vec<RemotePackage>) -> PackageManager {
        let mut pm = PackageManager::new(Config::new(base));
        pm.load_local_packages();
        pm.remote_packages = remotes;
        pm.find_dependencies();
        pm
    }

    #[test]
    fn local_scan_produces_package_records() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_module(tmp.path(), "lua", r#"{ "version": 2, "language": "lua" }"#);
        write_plugin(
            tmp.path(),
            "hello",
            r#"{ "version": 1, "languageModule": { "name": "lua" } }"#,
        );

        let pm = manager_with(tmp.path(), Vec::new());
        assert_eq!(pm.get_local_packages().len(), 2);
        let lua = pm.find_local_package("lua").unwrap();
        assert_eq!(lua.version, 2);
        assert_eq!(lua.package_type, "lua");
        assert!(!pm.has_missed_packages());
        assert!(!pm.has_conflicted_packages());
    }

    #[test]
    fn missing_language_module_found_remotely_goes_to_missed() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "hello",
            r#"{ "version": 1, "languageModule": { "name": "lua" } }"#,
        );

        let pm = manager_with(tmp.path(), vec![remote("lua-module", "lua", &[5])]);
        assert!(pm.has_missed_packages());
        let (package, version) = &pm.get_missed_packages()["lua"];
        assert_eq!(package.name, "lua-module");
        assert_eq!(*version, None);
    }

    #[test]
    fn missing_language_module_nowhere_goes_to_conflicted() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "hello",
            r#"{ "version": 1, "languageModule": { "name": "lua" } }"#,
        );

        let pm = manager_with(tmp.path(), Vec::new());
        assert!(!pm.has_missed_packages());
        assert_eq!(pm.get_conflicted_packages().len(), 1);
        assert_eq!(pm.get_conflicted_packages()[0].name, "hello");
    }

    #[test]
    fn dependency_version_conflicts_are_diagnosed() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_module(tmp.path(), "lua", r#"{ "version": 1, "language": "lua" }"#);
        // Requests v9 of base, remote only has v1 and v2.
        write_plugin(
            tmp.path(),
            "needy",
            r#"{ "version": 1, "languageModule": { "name": "lua" },
                 "dependencies": [ { "name": "base", "requestedVersion": 9 } ] }"#,
        );

        let pm = manager_with(tmp.path(), vec![remote("base", "plugin", &[1, 2])]);
        assert_eq!(pm.get_conflicted_packages().len(), 1);
        assert_eq!(pm.get_conflicted_packages()[0].name, "needy");
    }

    #[test]
    fn duplicate_missed_dependency_keeps_maximum_version() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_module(tmp.path(), "lua", r#"{ "version": 1, "language": "lua" }"#);
        write_plugin(
            tmp.path(),
            "a",
            r#"{ "version": 1, "languageModule": { "name": "lua" },
                 "dependencies": [ { "name": "base", "requestedVersion": 1 } ] }"#,
        );
        write_plugin(
            tmp.path(),
            "b",
            r#"{ "version": 1, "languageModule": { "name": "lua" },
                 "dependencies": [ { "name": "base", "requestedVersion": 2 } ] }"#,
        );

        let pm = manager_with(tmp.path(), vec![remote("base", "plugin", &[1, 2])]);
        let (_, version) = &pm.get_missed_packages()["base"];
        assert_eq!(*version, Some(2));
    }

    #[test]
    fn optional_dependencies_do_not_conflict() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_module(tmp.path(), "lua", r#"{ "version": 1, "language": "lua" }"#);
        write_plugin(
            tmp.path(),
            "a",
            r#"{ "version": 1, "languageModule": { "name": "lua" },
                 "dependencies": [ { "name": "extra", "optional": true } ] }"#,
        );

        let pm = manager_with(tmp.path(), Vec::new());
        assert!(!pm.has_missed_packages());
        assert!(!pm.has_conflicted_packages());
    }

    #[test]
    fn snapshot_then_read_back_restores_versions() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_module(tmp.path(), "lua", r#"{ "version": 1, "language": "lua",
            "downloadURL": "https://mirror/lua.zip" }"#);
        write_plugin(
            tmp.path(),
            "a",
            r#"{ "version": 3, "languageModule": { "name": "lua" },
                 "downloadURL": "https://mirror/a.zip" }"#,
        );

        let pm = manager_with(tmp.path(), Vec::new());
        let snapshot = tmp.path().join("packages.gmanifest");
        pm.snapshot_packages(&snapshot, true);
        assert!(snapshot.exists());

        let manifest = writer::read_manifest(&snapshot).unwrap();
        assert_eq!(manifest.content.len(), 2);
        assert_eq!(manifest.content["a"].latest_version().unwrap().version, 3);
        assert_eq!(
            manifest.content["a"].latest_version().unwrap().mirrors,
            vec!["https://mirror/a.zip".to_string()]
        );
    }

    #[test]
    fn snapshot_rejects_wrong_extension() {
        quiet();
        let tmp = TempDir::new().unwrap();
        let pm = manager_with(tmp.path(), Vec::new());
        let bad = tmp.path().join("packages.json");
        pm.snapshot_packages(&bad, false);
        assert!(!bad.exists());
    }

    #[test]
    fn uninstall_removes_package_directory() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "gone",
            r#"{ "version": 1, "languageModule": { "name": "lua" } }"#,
        );

        let mut pm = PackageManager::new(Config::new(tmp.path()));
        pm.load_local_packages();
        let package = pm.find_local_package("gone").unwrap().clone();
        assert!(pm.uninstall_local_package(&package, true));
        assert!(!tmp.path().join("plugins").join("gone").exists());
        assert!(pm.find_local_package("gone").is_none());
    }

    #[test]
    fn install_remote_skips_already_installed() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "here",
            r#"{ "version": 1, "languageModule": { "name": "lua" } }"#,
        );
        let mut pm = PackageManager::new(Config::new(tmp.path()));
        pm.load_local_packages();
        let package = remote("here", "plugin", &[2]);
        assert!(!pm.install_remote_package(&package, None));
    }

    #[test]
    fn update_without_newer_remote_is_a_no_op() {
        quiet();
        let tmp = TempDir::new().unwrap();
        write_plugin(
            tmp.path(),
            "steady",
            r#"{ "version": 5, "languageModule": { "name": "lua" } }"#,
        );
        let mut pm = PackageManager::new(Config::new(tmp.path()));
        pm.load_local_packages();
        pm.remote_packages = vec![remote("steady", "plugin", &[4, 5])];
        let package = pm.find_local_package("steady").unwrap().clone();
        assert!(!pm.update_local_package(&package, None));
    }
}
