//! Release archive extraction
//!
//! The archive is extracted into `<entry>/.model.partial/` first and swapped
//! into `<entry>/model/` only once every member was written. The archive is
//! deleted afterwards on a best-effort basis; on any extraction error it is
//! left in place for inspection or retry.

use super::release::{archive_path, model_folder};
use crate::error::{ModelError, ModelResult};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const STAGING_DIR: &str = ".model.partial";

/// Extract `<entry>/model.zip` into `<entry>/model/`
pub async fn unpack(entry: &Path) -> ModelResult<PathBuf> {
    let archive = archive_path(entry);
    let target = model_folder(entry);
    let staging = entry.join(STAGING_DIR);

    tracing::info!(archive = ?archive, "Unzipping model");

    let result = {
        let archive = archive.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || extract_and_commit(&archive, &staging, &target))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r)
    };

    if let Err(reason) = result {
        return Err(ModelError::UnpackFailed { archive, reason });
    }

    cleanup(&archive).await;
    Ok(target)
}

/// Best-effort removal of the downloaded archive
async fn cleanup(archive: &Path) {
    if let Err(e) = tokio::fs::remove_file(archive).await {
        tracing::warn!(archive = ?archive, error = %e, "Unable to cleanup model archive");
    }
}

fn extract_and_commit(archive: &Path, staging: &Path, target: &Path) -> Result<(), String> {
    if staging.exists() {
        fs::remove_dir_all(staging).map_err(|e| format!("clear staging directory: {e}"))?;
    }
    fs::create_dir_all(staging).map_err(|e| format!("create staging directory: {e}"))?;

    if let Err(e) = extract_zip(archive, staging) {
        let _ = fs::remove_dir_all(staging);
        return Err(e);
    }

    if target.exists() {
        fs::remove_dir_all(target).map_err(|e| format!("remove previous model folder: {e}"))?;
    }
    fs::rename(staging, target).map_err(|e| format!("commit model folder: {e}"))
}

fn extract_zip(archive_path: &Path, destination: &Path) -> Result<(), String> {
    let file = File::open(archive_path).map_err(|e| format!("open archive: {e}"))?;
    let mut archive = ZipArchive::new(file).map_err(|e| format!("open zip archive: {e}"))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("read zip entry {i}: {e}"))?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| format!("unsafe entry path {:?}", entry.name()))?;
        let dest = destination.join(relative);

        if entry.is_dir() {
            // directory modes are not applied; a read-only one would block its children
            fs::create_dir_all(&dest).map_err(|e| format!("create {dest:?}: {e}"))?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create {parent:?}: {e}"))?;
        }
        let mut outfile = File::create(&dest).map_err(|e| format!("create {dest:?}: {e}"))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| format!("write {dest:?}: {e}"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&dest, fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| format!("set permissions on {dest:?}: {e}"))?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn write_zip(path: &Path, dirs: &[&str], files: &[(&str, &[u8], u32)]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for dir in dirs {
            zip.add_directory(*dir, FileOptions::default()).unwrap();
        }
        for (name, data, mode) in files {
            zip.start_file(*name, FileOptions::default().unix_permissions(*mode))
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn test_unpack_extracts_and_removes_archive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let entry = temp_dir.path().join("1_2_0");
        write_zip(
            &archive_path(&entry),
            &["mobilenet_v2_140_224/", "mobilenet_v2_140_224/variables/"],
            &[
                ("mobilenet_v2_140_224/saved_model.pb", &b"graph"[..], 0o644),
                ("mobilenet_v2_140_224/variables/variables.index", &b"idx"[..], 0o600),
            ],
        );

        let target = unpack(&entry).await.unwrap();

        assert_eq!(target, model_folder(&entry));
        let model = target.join("mobilenet_v2_140_224");
        assert_eq!(fs::read(model.join("saved_model.pb")).unwrap(), b"graph");
        assert!(model.join("variables/variables.index").is_file());
        assert!(!archive_path(&entry).exists());
        assert!(!entry.join(STAGING_DIR).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unpack_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let entry = temp_dir.path().join("1_2_0");
        write_zip(&archive_path(&entry), &[], &[("m/run.sh", &b"#!/bin/sh"[..], 0o755)]);

        unpack(&entry).await.unwrap();

        let mode = fs::metadata(model_folder(&entry).join("m/run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_directory_entries_do_not_block_extraction() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let entry = temp_dir.path().join("1_2_0");
        let archive = archive_path(&entry);
        fs::create_dir_all(&entry).unwrap();
        let mut zip = ZipWriter::new(File::create(&archive).unwrap());
        zip.add_directory("m/", FileOptions::default().unix_permissions(0o555))
            .unwrap();
        zip.start_file("m/saved_model.pb", FileOptions::default().unix_permissions(0o644))
            .unwrap();
        zip.write_all(b"graph").unwrap();
        zip.finish().unwrap();

        unpack(&entry).await.unwrap();

        let dir = model_folder(&entry).join("m");
        assert!(dir.join("saved_model.pb").is_file());
        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_ne!(mode & 0o200, 0);

        // a second unpack can still clear the previous model folder
        write_zip(&archive, &["m/"], &[("m/saved_model.pb", &b"new"[..], 0o644)]);
        unpack(&entry).await.unwrap();
        assert_eq!(fs::read(dir.join("saved_model.pb")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_kept() {
        let temp_dir = tempfile::tempdir().unwrap();
        let entry = temp_dir.path().join("1_2_0");
        fs::create_dir_all(&entry).unwrap();
        fs::write(archive_path(&entry), b"definitely not a zip").unwrap();

        let err = unpack(&entry).await.unwrap_err();

        assert!(matches!(err, ModelError::UnpackFailed { .. }));
        assert!(archive_path(&entry).exists());
        assert!(!model_folder(&entry).exists());
        assert!(!entry.join(STAGING_DIR).exists());
    }

    #[tokio::test]
    async fn test_missing_archive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = unpack(temp_dir.path()).await.unwrap_err();
        assert!(matches!(err, ModelError::UnpackFailed { .. }));
    }

    #[tokio::test]
    async fn test_failed_unpack_keeps_previous_model() {
        let temp_dir = tempfile::tempdir().unwrap();
        let entry = temp_dir.path().join("1_2_0");
        let previous = model_folder(&entry).join("m");
        fs::create_dir_all(&previous).unwrap();
        fs::write(previous.join("saved_model.pb"), b"old").unwrap();
        fs::write(archive_path(&entry), b"PK\x03\x04 truncated").unwrap();

        assert!(unpack(&entry).await.is_err());
        assert_eq!(fs::read(previous.join("saved_model.pb")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_unpack_replaces_previous_model() {
        let temp_dir = tempfile::tempdir().unwrap();
        let entry = temp_dir.path().join("1_2_0");
        let stale = model_folder(&entry).join("stale.txt");
        fs::create_dir_all(model_folder(&entry)).unwrap();
        fs::write(&stale, b"x").unwrap();
        write_zip(&archive_path(&entry), &[], &[("m/saved_model.pb", &b"new"[..], 0o644)]);

        unpack(&entry).await.unwrap();

        assert!(!stale.exists());
        assert_eq!(
            fs::read(model_folder(&entry).join("m/saved_model.pb")).unwrap(),
            b"new"
        );
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let entry = temp_dir.path().join("1_2_0");
        write_zip(&archive_path(&entry), &[], &[("../escape.txt", &b"x"[..], 0o644)]);

        let err = unpack(&entry).await.unwrap_err();

        assert!(matches!(err, ModelError::UnpackFailed { .. }));
        assert!(!temp_dir.path().join("escape.txt").exists());
        assert!(archive_path(&entry).exists());
    }
}
