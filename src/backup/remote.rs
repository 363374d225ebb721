use super::{unique_backup_name, BackupManager, InflightGuard};
use crate::error::{Error, Result};
use crate::model::{
    BackupFileInfo, BackupInfo, BackupMetadata, BackupResult, BackupVerification, Environment,
    RestoreResult, BACKUP_METADATA_VERSION,
};
use crate::remote::{commands, CommandChannel};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Backup manager for the remote environment. Every filesystem touch is a
/// shell command over the channel; the metadata document is written and read
/// as a whole file.
pub struct RemoteBackupManager {
    channel: Arc<dyn CommandChannel>,
    backup_root: String,
    max_backup_bytes: u64,
    guard: InflightGuard,
}

impl RemoteBackupManager {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        backup_root: impl Into<String>,
        max_backup_bytes: u64,
        guard: InflightGuard,
    ) -> Self {
        Self {
            channel,
            backup_root: backup_root.into(),
            max_backup_bytes,
            guard,
        }
    }

    fn unit_dir(&self, backup_id: &str) -> String {
        format!("{}/{}", self.backup_root.trim_end_matches('/'), backup_id)
    }

    fn metadata_path(&self, backup_id: &str) -> String {
        format!("{}/metadata.json", self.unit_dir(backup_id))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let out = self.channel.execute(&commands::file_exists(path))?;
        Ok(out.stdout.trim() == "yes")
    }

    fn file_size(&self, path: &str) -> Result<u64> {
        let out = self.channel.execute(&commands::file_size(path))?;
        out.stdout
            .trim()
            .parse()
            .map_err(|e| Error::Other(format!("unparseable size for {path}: {e}")))
    }

    fn checksum(&self, path: &str) -> Result<String> {
        let out = self.channel.execute(&commands::checksum(path))?;
        out.stdout
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::Other(format!("empty checksum output for {path}")))
    }

    fn load_metadata(&self, backup_id: &str) -> Result<BackupMetadata> {
        let metadata_path = self.metadata_path(backup_id);
        if !self.exists(&metadata_path)? {
            let archive = format!("{}.tar.gz", self.unit_dir(backup_id));
            if self.exists(&archive)? {
                self.unarchive_backup(backup_id)?;
            } else {
                return Err(Error::BackupNotFound {
                    backup_id: backup_id.to_string(),
                    backup_root: self.backup_root.clone(),
                });
            }
        }
        let out = self.channel.execute(&commands::read_file(&metadata_path))?;
        Ok(serde_json::from_str(&out.stdout)?)
    }

    fn write_metadata(&self, metadata: &BackupMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        self.channel
            .execute(&commands::write_file(&self.metadata_path(&metadata.backup_id), &json))?;
        Ok(())
    }
}

impl BackupManager for RemoteBackupManager {
    fn create_backup(&self, files: &[String], backup_id: &str) -> Result<BackupResult> {
        let _token = self.guard.begin(backup_id)?;
        info!("Creating remote backup {} ({} files)", backup_id, files.len());

        let files_dir = format!("{}/files", self.unit_dir(backup_id));
        self.channel
            .execute(&commands::mkdir_p(&files_dir))
            .map_err(|e| Error::BackupFailed {
                backup_id: backup_id.to_string(),
                message: format!("cannot create unit directory: {e}"),
            })?;

        let mut backed_up = Vec::new();
        let mut errors = Vec::new();
        let mut taken = HashSet::new();
        let mut running_total: u64 = 0;

        for source in files {
            let size = match self.file_size(source) {
                Ok(s) => s,
                Err(e) => {
                    errors.push(format!("{source}: {e}"));
                    continue;
                }
            };

            running_total += size;
            if running_total > self.max_backup_bytes {
                // Remove the half-written unit so the id stays retryable and
                // no metadata-less directory lingers past cleanup.
                let _ = self.channel.execute(&commands::remove_dir(&self.unit_dir(backup_id)));
                return Err(Error::BackupSizeExceeded {
                    actual: running_total,
                    limit: self.max_backup_bytes,
                });
            }

            let name = source.rsplit('/').next().unwrap_or(source).to_string();
            let backup_path = format!("{files_dir}/{}", unique_backup_name(&mut taken, &name));

            if let Err(e) = self.channel.execute(&commands::copy_file(source, &backup_path)) {
                errors.push(format!("{source}: copy failed: {e}"));
                running_total -= size;
                continue;
            }

            let checksum = match self.checksum(&backup_path) {
                Ok(c) => c,
                Err(e) => {
                    errors.push(format!("{source}: checksum failed: {e}"));
                    running_total -= size;
                    let _ = self.channel.execute(&commands::remove_file(&backup_path));
                    continue;
                }
            };

            backed_up.push(BackupFileInfo {
                original_path: source.clone(),
                backup_path,
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
            environment: Environment::Remote,
            version: BACKUP_METADATA_VERSION.to_string(),
        };
        self.write_metadata(&metadata)?;

        debug!(
            "Remote backup {} complete: {} files, {} bytes, {} errors",
            backup_id,
            backed_up.len(),
            total_size,
            errors.len()
        );
        Ok(BackupResult {
            backup_id: backup_id.to_string(),
            backup_path: self.unit_dir(backup_id),
            files: backed_up,
            total_size,
            environment: Environment::Remote,
            success: errors.is_empty(),
            errors,
        })
    }

    fn restore_backup(&self, backup_id: &str) -> Result<RestoreResult> {
        let _token = self.guard.begin(backup_id)?;
        let metadata = self.load_metadata(backup_id)?;
        info!("Restoring remote backup {} ({} files)", backup_id, metadata.files.len());

        let mut restored = Vec::new();
        let mut errors = Vec::new();

        for entry in &metadata.files {
            match self.checksum(&entry.backup_path) {
                Ok(actual) if actual == entry.checksum => {}
                Ok(_) => {
                    errors.push(format!(
                        "{}: checksum mismatch, backup copy is corrupt",
                        entry.original_path
                    ));
                    continue;
                }
                Err(e) => {
                    errors.push(format!("{}: unreadable backup copy: {e}", entry.original_path));
                    continue;
                }
            }

            if let Some((parent, _)) = entry.original_path.rsplit_once('/') {
                if let Err(e) = self.channel.execute(&commands::mkdir_p(parent)) {
                    errors.push(format!("{}: {e}", entry.original_path));
                    continue;
                }
            }
            match self
                .channel
                .execute(&commands::copy_file(&entry.backup_path, &entry.original_path))
            {
                Ok(_) => restored.push(entry.original_path.clone()),
                Err(e) => errors.push(format!("{}: restore failed: {e}", entry.original_path)),
            }
        }

        Ok(RestoreResult {
            backup_id: backup_id.to_string(),
            restored_file_count: restored.len(),
            restored_files: restored,
            environment: Environment::Remote,
            success: errors.is_empty(),
            errors,
        })
    }

    fn verify_backup(&self, backup_id: &str) -> Result<BackupVerification> {
        let metadata = self.load_metadata(backup_id)?;
        let mut errors = Vec::new();

        for entry in &metadata.files {
            match self.exists(&entry.backup_path) {
                Ok(true) => {}
                Ok(false) => {
                    errors.push(format!("{}: backup copy missing", entry.backup_path));
                    continue;
                }
                Err(e) => {
                    errors.push(format!("{}: {e}", entry.backup_path));
                    continue;
                }
            }
            match self.checksum(&entry.backup_path) {
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
        let out = self.channel.execute(&commands::list_subdirs(&self.backup_root))?;
        let mut backups = Vec::new();
        for backup_id in out.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match self.load_metadata(backup_id) {
                Ok(metadata) => backups.push(BackupInfo {
                    backup_id: backup_id.to_string(),
                    created_at: metadata.timestamp,
                    file_count: metadata.files.len(),
                    total_size: metadata.total_size,
                    environment: Environment::Remote,
                    backup_path: self.unit_dir(backup_id),
                }),
                Err(e) => warn!("Skipping remote backup {}: {}", backup_id, e),
            }
        }
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    fn delete_backup(&self, backup_id: &str) -> Result<()> {
        self.channel.execute(&commands::remove_dir(&self.unit_dir(backup_id)))?;
        self.channel
            .execute(&commands::remove_file(&format!("{}.tar.gz", self.unit_dir(backup_id))))?;
        Ok(())
    }

    fn cleanup_old_backups(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut removed = 0;
        for info in self.list_backups()? {
            if info.created_at < cutoff {
                info!("Removing expired remote backup {} (created {})", info.backup_id, info.created_at);
                self.delete_backup(&info.backup_id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn archive_backup(&self, backup_id: &str) -> Result<()> {
        let dir = self.unit_dir(backup_id);
        if !self.exists(&dir)? {
            return Err(Error::BackupNotFound {
                backup_id: backup_id.to_string(),
                backup_root: self.backup_root.clone(),
            });
        }
        self.channel.execute(&commands::archive_dir(&dir))?;
        Ok(())
    }

    fn unarchive_backup(&self, backup_id: &str) -> Result<()> {
        self.channel.execute(&commands::unarchive_dir(&self.unit_dir(backup_id)))?;
        Ok(())
    }
}
