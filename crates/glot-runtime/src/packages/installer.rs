//! Archive extraction and the staged install step.
//!
//! Downloads are extracted into a timestamped staging directory first and
//! only renamed into their final location after the archive proved to
//! contain a descriptor. A failed extraction leaves the staging directory
//! behind for diagnosis.

use crate::packages::PackageError;
use glot_logger as logger;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Extract a downloaded zip into `extract_path`, fail-fast.
///
/// The archive must contain at least one file with the expected
/// descriptor extension.
pub(crate) fn extract_package(
    data: &[u8],
    extract_path: &Path,
    descriptor_ext: &str,
) -> Result<(), PackageError> {
    logger::verbose("Start extracting....");

    let mut archive =
        ZipArchive::new(Cursor::new(data)).map_err(|e| PackageError::ArchiveInvalid(e.to_string()))?;

    let mut found_descriptor = false;
    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| PackageError::ArchiveInvalid(e.to_string()))?;
        if Path::new(file.name())
            .extension()
            .is_some_and(|ext| ext == descriptor_ext)
        {
            found_descriptor = true;
            break;
        }
    }
    if !found_descriptor {
        return Err(PackageError::DescriptorMissing(descriptor_ext.to_string()));
    }

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| PackageError::ArchiveInvalid(e.to_string()))?;

        // Rejects absolute paths and traversal out of the destination.
        let Some(relative) = file.enclosed_name().map(Path::to_path_buf) else {
            return Err(PackageError::ArchiveInvalid(format!(
                "Unsafe path in archive: '{}'",
                file.name()
            )));
        };
        let out_path = extract_path.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out_file = std::fs::File::create(&out_path)?;
            std::io::copy(&mut file, &mut out_file)?;
        }
    }

    Ok(())
}

/// Extract `data` into a fresh staging directory under
/// `<base_dir>/<folder>/` and rename it to the package name once the
/// archive is verified. Returns the final package directory.
pub(crate) fn stage_and_install(
    data: &[u8],
    base_dir: &Path,
    folder: &str,
    name: &str,
    descriptor_ext: &str,
) -> Result<PathBuf, PackageError> {
    let final_path = base_dir.join(folder);
    let staging = final_path.join(format!(
        "{}-{}",
        name,
        chrono::Local::now().format("%Y_%m_%d_%H_%M_%S")
    ));
    std::fs::create_dir_all(&staging)?;

    extract_package(data, &staging, descriptor_ext)?;

    let destination = final_path.join(name);
    if destination.exists() {
        std::fs::remove_dir_all(&destination)?;
    }
    std::fs::rename(&staging, &destination)?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn make_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            for (name, body) in entries {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(body.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn staged_install_lands_in_final_location() {
        let tmp = TempDir::new().unwrap();
        let data = make_zip(&[
            ("lua.gmodule", r#"{ "version": 5, "language": "lua" }"#),
            ("bin/readme.txt", "hello"),
        ]);

        let installed = stage_and_install(&data, tmp.path(), "modules", "lua", "gmodule").unwrap();
        assert_eq!(installed, tmp.path().join("modules").join("lua"));
        assert!(installed.join("lua.gmodule").exists());
        assert!(installed.join("bin").join("readme.txt").exists());

        // No staging directory left behind.
        let entries: Vec<_> = std::fs::read_dir(tmp.path().join("modules"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_descriptor_aborts_and_keeps_staging() {
        glot_logger::set_severity(glot_logger::Severity::None);
        let tmp = TempDir::new().unwrap();
        let data = make_zip(&[("just-a-file.txt", "nothing here")]);

        let err = stage_and_install(&data, tmp.path(), "modules", "lua", "gmodule").unwrap_err();
        assert!(matches!(err, PackageError::DescriptorMissing(_)));

        // The final directory must not exist; staging stays for diagnosis.
        assert!(!tmp.path().join("modules").join("lua").exists());
        let staged: Vec<_> = std::fs::read_dir(tmp.path().join("modules"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].starts_with("lua-"));
    }

    #[test]
    fn corrupt_archive_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = extract_package(b"definitely not a zip", tmp.path(), "gmodule").unwrap_err();
        assert!(matches!(err, PackageError::ArchiveInvalid(_)));
    }

    #[test]
    fn reinstall_replaces_existing_package_directory() {
        let tmp = TempDir::new().unwrap();
        let v1 = make_zip(&[
            ("lua.gmodule", r#"{ "version": 1, "language": "lua" }"#),
            ("old-file.txt", "stale"),
        ]);
        let v2 = make_zip(&[("lua.gmodule", r#"{ "version": 2, "language": "lua" }"#)]);

        stage_and_install(&v1, tmp.path(), "modules", "lua", "gmodule").unwrap();
        let installed = stage_and_install(&v2, tmp.path(), "modules", "lua", "gmodule").unwrap();

        let body = std::fs::read_to_string(installed.join("lua.gmodule")).unwrap();
        assert!(body.contains("\"version\": 2"));
        assert!(!installed.join("old-file.txt").exists());
    }
}
