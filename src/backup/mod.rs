mod local;
mod remote;

pub use local::LocalBackupManager;
pub use remote::RemoteBackupManager;

use crate::error::{Error, Result};
use crate::model::{
    BackupInfo, BackupResult, BackupVerification, RestoreResult,
};
use dashmap::DashMap;
use std::sync::Arc;

/// Snapshots a file set into a content-addressed backup unit and restores it.
pub trait BackupManager: Send + Sync {
    /// Copy `files` into `<root>/<backup_id>/files/`, checksum each copy, and
    /// write the metadata document. A failed individual copy is recorded and
    /// excluded; exceeding the size cap aborts the whole backup.
    fn create_backup(&self, files: &[String], backup_id: &str) -> Result<BackupResult>;

    /// Restore every catalogued file to its original path, verifying each
    /// backup copy's checksum first. A checksum mismatch fails that file's
    /// restore but not the batch.
    fn restore_backup(&self, backup_id: &str) -> Result<RestoreResult>;

    /// Independently re-check existence and checksum of every file.
    fn verify_backup(&self, backup_id: &str) -> Result<BackupVerification>;

    fn list_backups(&self) -> Result<Vec<BackupInfo>>;

    fn delete_backup(&self, backup_id: &str) -> Result<()>;

    /// Delete whole backup units older than the cutoff. Returns the number
    /// of units removed.
    fn cleanup_old_backups(&self, retention_days: i64) -> Result<usize>;

    /// Pack a completed backup unit into a tarball, reclaiming space.
    /// Transparent to restore.
    fn archive_backup(&self, backup_id: &str) -> Result<()>;

    fn unarchive_backup(&self, backup_id: &str) -> Result<()>;
}

/// Arena of in-flight backup ids. At most one create/restore may run per id;
/// a second concurrent operation is rejected instead of relying on caller
/// discipline.
#[derive(Clone, Default)]
pub struct InflightGuard {
    ids: Arc<DashMap<String, ()>>,
}

impl InflightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, backup_id: &str) -> Result<InflightToken> {
        use dashmap::mapref::entry::Entry;
        match self.ids.entry(backup_id.to_string()) {
            Entry::Occupied(_) => Err(Error::BackupInFlight {
                backup_id: backup_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InflightToken {
                    guard: self.clone(),
                    backup_id: backup_id.to_string(),
                })
            }
        }
    }
}

/// Releases the id when dropped, including on error paths.
pub struct InflightToken {
    guard: InflightGuard,
    backup_id: String,
}

impl Drop for InflightToken {
    fn drop(&mut self) {
        self.guard.ids.remove(&self.backup_id);
    }
}

/// Unique name for a file inside a backup unit's `files/` directory. Same
/// basenames from different source directories are disambiguated with the
/// deterministic `_N` suffix.
pub(crate) fn unique_backup_name(taken: &mut std::collections::HashSet<String>, name: &str) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s.to_string(), format!(".{e}")),
        _ => (name.to_string(), String::new()),
    };
    for n in 1..1000 {
        let candidate = format!("{stem}_{n}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
    }
    // 999 collisions on one basename means something is wrong upstream.
    format!("{stem}_{}{ext}", taken.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflight_guard_rejects_double_begin() {
        let guard = InflightGuard::new();
        let token = guard.begin("bk1").unwrap();
        assert!(matches!(
            guard.begin("bk1"),
            Err(Error::BackupInFlight { .. })
        ));
        drop(token);
        assert!(guard.begin("bk1").is_ok());
    }

    #[test]
    fn backup_names_disambiguate_deterministically() {
        let mut taken = std::collections::HashSet::new();
        assert_eq!(unique_backup_name(&mut taken, "a.txt"), "a.txt");
        assert_eq!(unique_backup_name(&mut taken, "a.txt"), "a_1.txt");
        assert_eq!(unique_backup_name(&mut taken, "a.txt"), "a_2.txt");
        assert_eq!(unique_backup_name(&mut taken, "b"), "b");
        assert_eq!(unique_backup_name(&mut taken, "b"), "b_1");
    }
}
