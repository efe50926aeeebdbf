//! Implementations of the CLI subcommands.

use crate::spec;
use colored::Colorize;
use glot_logger as logger;
use glot_runtime::PackageManager;
use std::path::Path;

pub fn install(
    manager: &mut PackageManager,
    package: Option<String>,
    manifest: Option<String>,
    reinstall: bool,
    missing: bool,
) {
    if missing {
        if manager.has_missed_packages() {
            manager.install_missed_packages();
        } else {
            logger::info("No missing packages to install");
        }
        return;
    }

    if let Some(manifest) = manifest {
        if manifest.starts_with("http://") || manifest.starts_with("https://") {
            manager.install_all_packages_from_url(&manifest, reinstall);
        } else {
            manager.install_all_packages_from_path(Path::new(&manifest), reinstall);
        }
        return;
    }

    match package {
        Some(package) => {
            let (name, version) = spec::parse(&package);
            manager.install_package(&name, version);
        }
        None => logger::error("Specify a package name or a manifest with -f"),
    }
}

pub fn update(manager: &mut PackageManager, package: Option<String>, all: bool) {
    if all {
        manager.update_all_packages();
        return;
    }
    match package {
        Some(package) => {
            let (name, version) = spec::parse(&package);
            manager.update_package(&name, version);
        }
        None => logger::error("Specify a package name or --all"),
    }
}

pub fn uninstall(
    manager: &mut PackageManager,
    package: Option<String>,
    all: bool,
    conflicted: bool,
) {
    if conflicted {
        if manager.has_conflicted_packages() {
            manager.uninstall_conflicted_packages();
        } else {
            logger::info("No conflicted packages to remove");
        }
        return;
    }
    if all {
        manager.uninstall_all_packages();
        return;
    }
    match package {
        Some(package) => manager.uninstall_package(&package),
        None => logger::error("Specify a package name or --all"),
    }
}

pub fn snapshot(manager: &PackageManager, path: &Path, pretty: bool) {
    manager.snapshot_packages(path, pretty);
}

pub fn list(manager: &PackageManager) {
    let local = manager.get_local_packages();
    if local.is_empty() {
        println!("No packages installed");
        return;
    }

    println!("{} package(s) installed:", local.len());
    for package in local {
        println!(
            "  {} {} (v{}) [{}]",
            "-".dimmed(),
            package.name.bold(),
            package.version,
            package.package_type
        );
    }

    let missed = manager.get_missed_packages();
    if !missed.is_empty() {
        println!("{} package(s) missing:", missed.len());
        for (name, (package, version)) in missed {
            println!(
                "  {} {} [{}] (v{})",
                "-".dimmed(),
                name.yellow(),
                package.package_type,
                version.map_or_else(|| "latest".to_string(), |v| v.to_string())
            );
        }
    }

    let conflicted = manager.get_conflicted_packages();
    if !conflicted.is_empty() {
        println!("{} package(s) conflicted:", conflicted.len());
        for package in conflicted {
            println!(
                "  {} {} (v{})",
                "-".dimmed(),
                package.name.red(),
                package.version
            );
        }
    }
}
