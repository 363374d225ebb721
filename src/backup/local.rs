use super::{unique_backup_name, BackupManager, InflightGuard};
use crate::error::{Error, Result};
use crate::fsops;
use crate::model::{
    BackupFileInfo, BackupInfo, BackupMetadata, BackupResult, BackupVerification, Environment,
    RestoreResult, BACKUP_METADATA_VERSION,
};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

pub struct LocalBackupManager {
    backup_root: PathBuf,
    max_backup_bytes: u64,
    guard: InflightGuard,
}

impl LocalBackupManager {
    pub fn new(backup_root: impl Into<PathBuf>, max_backup_bytes: u64, guard: InflightGuard) -> Self {
        Self {
            backup_root: backup_root.into(),
            max_backup_bytes,
            guard,
        }
    }

    fn unit_dir(&self, backup_id: &str) -> PathBuf {
        self.backup_root.join(backup_id)
    }

    fn metadata_path(&self, backup_id: &str) -> PathBuf {
        self.unit_dir(backup_id).join("metadata.json")
    }

    fn archive_path(&self, backup_id: &str) -> PathBuf {
        self.backup_root.join(format!("{backup_id}.tar.gz"))
    }

    fn load_metadata(&self, backup_id: &str) -> Result<BackupMetadata> {
        // Archived units are unpacked on demand; the transform is transparent
        // to restore and verify.
        if !self.metadata_path(backup_id).exists() && self.archive_path(backup_id).exists() {
            self.unarchive_backup(backup_id)?;
        }
        let path = self.metadata_path(backup_id);
        if !path.exists() {
            return Err(Error::BackupNotFound {
                backup_id: backup_id.to_string(),
                backup_root: self.backup_root.to_string_lossy().into_owned(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_metadata(&self, metadata: &BackupMetadata) -> Result<()> {
        let path = self.metadata_path(&metadata.backup_id);
        fs::write(&path, serde_json::to_string_pretty(metadata)?)?;
        Ok(())
    }
}

impl BackupManager for LocalBackupManager {
    fn create_backup(&self, files: &[String], backup_id: &str) -> Result<BackupResult> {
        let _token = self.guard.begin(backup_id)?;
        info!("Creating local backup {} ({} files)", backup_id, files.len());

        let files_dir = self.unit_dir(backup_id).join("files");
        fs::create_dir_all(&files_dir).map_err(|e| Error::BackupFailed {
            backup_id: backup_id.to_string(),
            message: format!("cannot create unit directory: {e}"),
        })?;

        let mut backed_up = Vec::new();
        let mut errors = Vec::new();
        let mut taken = HashSet::new();
        let mut total_size: u64 = 0;

        for source in files {
            let size = match fs::metadata(source) {
                Ok(m) => m.len(),
                Err(e) => {
                    errors.push(format!("{source}: {e}"));
                    continue;
                }
            };

            total_size += size;
            if total_size > self.max_backup_bytes {
                // Abort must not strand a half-written unit: without
                // metadata.json it is invisible to list/cleanup and its
                // directory would block a retry under the same id.
                let _ = fs::remove_dir_all(self.unit_dir(backup_id));
                return Err(Error::BackupSizeExceeded {
                    actual: total_size,
                    limit: self.max_backup_bytes,
                });
            }

            let name = Path::new(source)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.clone());
            let backup_path = files_dir.join(unique_backup_name(&mut taken, &name));

            if let Err(e) = fs::copy(source, &backup_path) {
                errors.push(format!("{source}: copy failed: {e}"));
                total_size -= size;
                continue;
            }

            let checksum = match fsops::local_blake3(&backup_path.to_string_lossy()) {
                Ok(c) => c,
                Err(e) => {
                    errors.push(format!("{source}: checksum failed: {e}"));
                    total_size -= size;
                    let _ = fs::remove_file(&backup_path);
                    continue;
                }
            };

            backed_up.push(BackupFileInfo {
                original_path: source.clone(),
                backup_path: backup_path.to_string_lossy().into_owned(),
                size,
                checksum,
                backup_time: Utc::now(),
            });
        }

        let total_size: u64 = backed_up.iter().map(|f| f.size).sum();
        let metadata = BackupMetadata {
            backup_id: backup_id.to_string(),
            timestamp: Utc::now(),
            files: backed_up.clone(),
            total_size,
            environment: Environment::Local,
            version: BACKUP_METADATA_VERSION.to_string(),
        };
        self.write_metadata(&metadata)?;

        debug!(
            "Local backup {} complete: {} files, {} bytes, {} errors",
            backup_id,
            backed_up.len(),
            total_size,
            errors.len()
        );
        Ok(BackupResult {
            backup_id: backup_id.to_string(),
            backup_path: self.unit_dir(backup_id).to_string_lossy().into_owned(),
            files: backed_up,
            total_size,
            environment: Environment::Local,
            success: errors.is_empty(),
            errors,
        })
    }

    fn restore_backup(&self, backup_id: &str) -> Result<RestoreResult> {
        let _token = self.guard.begin(backup_id)?;
        let metadata = self.load_metadata(backup_id)?;
        info!("Restoring local backup {} ({} files)", backup_id, metadata.files.len());

        let mut restored = Vec::new();
        let mut errors = Vec::new();

        for entry in &metadata.files {
            let current = match fsops::local_blake3(&entry.backup_path) {
                Ok(c) => c,
                Err(e) => {
                    errors.push(format!("{}: unreadable backup copy: {e}", entry.original_path));
                    continue;
                }
            };
            if current != entry.checksum {
                errors.push(format!(
                    "{}: checksum mismatch, backup copy is corrupt",
                    entry.original_path
                ));
                continue;
            }

            if let Some(parent) = Path::new(&entry.original_path).parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    errors.push(format!("{}: {e}", entry.original_path));
                    continue;
                }
            }
            match fs::copy(&entry.backup_path, &entry.original_path) {
                Ok(_) => restored.push(entry.original_path.clone()),
                Err(e) => errors.push(format!("{}: restore failed: {e}", entry.original_path)),
            }
        }

        Ok(RestoreResult {
            backup_id: backup_id.to_string(),
            restored_file_count: restored.len(),
            restored_files: restored,
            environment: Environment::Local,
            success: errors.is_empty(),
            errors,
        })
    }

    fn verify_backup(&self, backup_id: &str) -> Result<BackupVerification> {
        let metadata = self.load_metadata(backup_id)?;
        let mut errors = Vec::new();

        for entry in &metadata.files {
            if !Path::new(&entry.backup_path).exists() {
                errors.push(format!("{}: backup copy missing", entry.backup_path));
                continue;
            }
            match fsops::local_blake3(&entry.backup_path) {
                Ok(actual) if actual == entry.checksum => {}
                Ok(actual) => errors.push(format!(
                    "{}: checksum mismatch (expected {}, got {})",
                    entry.backup_path, entry.checksum, actual
                )),
                Err(e) => errors.push(format!("{}: {e}", entry.backup_path)),
            }
        }

        Ok(BackupVerification {
            backup_id: backup_id.to_string(),
            valid: errors.is_empty(),
            checked_files: metadata.files.len(),
            errors,
        })
    }

    fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        if !self.backup_root.exists() {
            return Ok(backups);
        }
        for entry in fs::read_dir(&self.backup_root)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable backup entry: {}", e);
                    continue;
                }
            };
            if !entry.path().is_dir() {
                continue;
            }
            let backup_id = entry.file_name().to_string_lossy().into_owned();
            match self.load_metadata(&backup_id) {
                Ok(metadata) => backups.push(BackupInfo {
                    backup_id,
                    created_at: metadata.timestamp,
                    file_count: metadata.files.len(),
                    total_size: metadata.total_size,
                    environment: Environment::Local,
                    backup_path: entry.path().to_string_lossy().into_owned(),
                }),
                Err(e) => warn!("Skipping {}: {}", backup_id, e),
            }
        }
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    fn delete_backup(&self, backup_id: &str) -> Result<()> {
        let dir = self.unit_dir(backup_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        let archive = self.archive_path(backup_id);
        if archive.exists() {
            fs::remove_file(archive)?;
        }
        Ok(())
    }

    fn cleanup_old_backups(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut removed = 0;
        for info in self.list_backups()? {
            if info.created_at < cutoff {
                info!("Removing expired backup {} (created {})", info.backup_id, info.created_at);
                self.delete_backup(&info.backup_id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn archive_backup(&self, backup_id: &str) -> Result<()> {
        let dir = self.unit_dir(backup_id);
        if !dir.exists() {
            return Err(Error::BackupNotFound {
                backup_id: backup_id.to_string(),
                backup_root: self.backup_root.to_string_lossy().into_owned(),
            });
        }
        run_tar(&self.backup_root, &["czf", &format!("{backup_id}.tar.gz"), backup_id])?;
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    fn unarchive_backup(&self, backup_id: &str) -> Result<()> {
        let archive = self.archive_path(backup_id);
        if !archive.exists() {
            return Err(Error::BackupNotFound {
                backup_id: backup_id.to_string(),
                backup_root: self.backup_root.to_string_lossy().into_owned(),
            });
        }
        run_tar(&self.backup_root, &["xzf", &format!("{backup_id}.tar.gz")])?;
        fs::remove_file(archive)?;
        Ok(())
    }
}

fn run_tar(workdir: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("tar").current_dir(workdir).args(args).output()?;
    if !output.status.success() {
        return Err(Error::Other(format!(
            "tar {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
