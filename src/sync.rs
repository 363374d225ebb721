//! Reconciles the differences a [`StructureComparator`] found, in the
//! configured direction, with bounded retries per corrective action.

use crate::compare::StructureComparator;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::fsops::EnvFs;
use crate::model::{
    DifferenceKind, Environment, FailedItem, StructureComparison, StructureDifference, SyncDirection,
    SyncReport, SyncedItem,
};
use crate::remote::CommandChannel;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SyncManager {
    channel: Arc<dyn CommandChannel>,
    local_root: String,
    remote_root: String,
    config: SyncConfig,
}

/// One reconciling step, resolved from a difference and the sync direction.
enum Action {
    CreateLocalDir { path: String, mode: String },
    CreateRemoteDir { path: String, mode: String },
    Upload { path: String, mode: Option<String> },
    Download { path: String },
    ChmodLocal { path: String, mode: String },
    ChmodRemote { path: String, mode: String },
    Review,
    Skip,
}

impl SyncManager {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        local_root: impl Into<String>,
        remote_root: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        Self {
            channel,
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            config,
        }
    }

    /// Apply one corrective action per difference. Content mismatches are
    /// never auto-resolved; they land in `flagged_for_review`. Individual
    /// failures are retried up to the configured limit, then recorded.
    pub fn sync_structures(&self, comparison: &StructureComparison, dry_run: bool) -> SyncReport {
        let direction = self.config.direction;
        let mut report = SyncReport {
            direction,
            synced: Vec::new(),
            failed: Vec::new(),
            skipped: 0,
            flagged_for_review: Vec::new(),
            dry_run,
        };

        info!(
            "Syncing {} differences ({}){}",
            comparison.differences.len(),
            direction,
            if dry_run { " (dry-run)" } else { "" }
        );

        for difference in &comparison.differences {
            let action = self.resolve_action(difference, direction);
            let (label, environment) = describe(&action);
            match action {
                Action::Skip => {
                    report.skipped += 1;
                    continue;
                }
                Action::Review => {
                    report.flagged_for_review.push(difference.clone());
                    continue;
                }
                _ => {}
            }

            if dry_run {
                report.synced.push(SyncedItem {
                    path: difference.path.clone(),
                    action: label,
                    environment,
                });
                continue;
            }

            match self.apply_with_retries(&action) {
                Ok(()) => report.synced.push(SyncedItem {
                    path: difference.path.clone(),
                    action: label,
                    environment,
                }),
                Err((attempts, e)) => {
                    warn!(
                        "Sync action '{}' failed for {} after {} attempts: {}",
                        label, difference.path, attempts, e
                    );
                    report.failed.push(FailedItem {
                        path: difference.path.clone(),
                        action: label,
                        attempts,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Re-compare after a sync pass; identical trees mean the two
    /// environments are structurally consistent.
    pub fn verify_consistency(&self) -> StructureComparison {
        StructureComparator::new(self.channel.clone())
            .compare_structures(&self.local_root, &self.remote_root)
    }

    fn resolve_action(&self, difference: &StructureDifference, direction: SyncDirection) -> Action {
        let to_remote = matches!(
            direction,
            SyncDirection::LocalToRemote | SyncDirection::Bidirectional
        );
        let to_local = matches!(
            direction,
            SyncDirection::RemoteToLocal | SyncDirection::Bidirectional
        );
        let path = difference.path.clone();

        match difference.kind {
            DifferenceKind::MissingDirectory if to_remote => Action::CreateRemoteDir {
                path,
                mode: difference.expected.clone().unwrap_or_else(|| "755".into()),
            },
            DifferenceKind::MissingFile if to_remote => Action::Upload {
                path,
                mode: None,
            },
            DifferenceKind::ExtraDirectory if to_local => Action::CreateLocalDir {
                path,
                mode: difference.actual.clone().unwrap_or_else(|| "755".into()),
            },
            DifferenceKind::ExtraFile if to_local => Action::Download { path },
            DifferenceKind::PermissionMismatch => {
                if to_remote {
                    match &difference.expected {
                        Some(mode) => Action::ChmodRemote {
                            path,
                            mode: mode.clone(),
                        },
                        None => Action::Skip,
                    }
                } else {
                    match &difference.actual {
                        Some(mode) => Action::ChmodLocal {
                            path,
                            mode: mode.clone(),
                        },
                        None => Action::Skip,
                    }
                }
            }
            DifferenceKind::SizeMismatch => Action::Review,
            _ => Action::Skip,
        }
    }

    fn apply_with_retries(&self, action: &Action) -> std::result::Result<(), (u32, Error)> {
        let max_attempts = self.config.max_retries.max(1);
        let mut last = None;
        for attempt in 1..=max_attempts {
            match self.apply(action) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Sync attempt {}/{} failed: {}", attempt, max_attempts, e);
                    last = Some(e);
                }
            }
        }
        Err((
            max_attempts,
            last.unwrap_or_else(|| Error::SyncFailed("no attempts made".to_string())),
        ))
    }

    fn local_path(&self, relative: &str) -> String {
        format!("{}/{}", self.local_root.trim_end_matches('/'), relative)
    }

    fn remote_path(&self, relative: &str) -> String {
        format!("{}/{}", self.remote_root.trim_end_matches('/'), relative)
    }

    fn apply(&self, action: &Action) -> Result<()> {
        let local_fs = EnvFs::Local;
        let remote_fs = EnvFs::Remote(self.channel.clone());
        match action {
            Action::CreateLocalDir { path, mode } => {
                let target = self.local_path(path);
                local_fs.mkdir_p(&target)?;
                local_fs.chmod(&target, mode)
            }
            Action::CreateRemoteDir { path, mode } => {
                let target = self.remote_path(path);
                remote_fs.mkdir_p(&target)?;
                remote_fs.chmod(&target, mode)
            }
            Action::Upload { path, mode } => {
                let source = self.local_path(path);
                let target = self.remote_path(path);
                self.channel.upload(Path::new(&source), &target)?;
                let mode = match mode {
                    Some(m) => m.clone(),
                    None => local_fs.permissions(&source)?,
                };
                remote_fs.chmod(&target, &mode)
            }
            Action::Download { path } => {
                let source = self.remote_path(path);
                let target = self.local_path(path);
                self.channel.download(&source, Path::new(&target))?;
                let mode = remote_fs.permissions(&source)?;
                local_fs.chmod(&target, &mode)
            }
            Action::ChmodLocal { path, mode } => local_fs.chmod(&self.local_path(path), mode),
            Action::ChmodRemote { path, mode } => remote_fs.chmod(&self.remote_path(path), mode),
            Action::Review | Action::Skip => Ok(()),
        }
    }
}

fn describe(action: &Action) -> (String, Environment) {
    match action {
        Action::CreateLocalDir { .. } => ("create_directory".into(), Environment::Local),
        Action::CreateRemoteDir { .. } => ("create_directory".into(), Environment::Remote),
        Action::Upload { .. } => ("copy_file".into(), Environment::Remote),
        Action::Download { .. } => ("copy_file".into(), Environment::Local),
        Action::ChmodLocal { .. } => ("set_permissions".into(), Environment::Local),
        Action::ChmodRemote { .. } => ("set_permissions".into(), Environment::Remote),
        Action::Review => ("review".into(), Environment::Local),
        Action::Skip => ("skip".into(), Environment::Local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LocalShellChannel;
    use std::fs;
    use tempfile::tempdir;

    fn manager(local: &str, remote: &str, direction: SyncDirection) -> SyncManager {
        SyncManager::new(
            Arc::new(LocalShellChannel::new()),
            local,
            remote,
            SyncConfig {
                direction,
                max_retries: 3,
            },
        )
    }

    fn compare(local: &str, remote: &str) -> StructureComparison {
        StructureComparator::new(Arc::new(LocalShellChannel::new()))
            .compare_structures(local, remote)
    }

    #[test]
    fn missing_file_and_directory_are_pushed_to_remote() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::create_dir_all(a.path().join("docs/guides")).unwrap();
        fs::write(a.path().join("docs/readme.md"), "hello").unwrap();

        let local = a.path().to_str().unwrap();
        let remote = b.path().to_str().unwrap();
        let manager = manager(local, remote, SyncDirection::LocalToRemote);
        let report = manager.sync_structures(&compare(local, remote), false);

        assert!(report.success());
        assert_eq!(report.failed.len(), 0);
        assert!(b.path().join("docs/guides").is_dir());
        assert_eq!(
            fs::read_to_string(b.path().join("docs/readme.md")).unwrap(),
            "hello"
        );
        assert!(manager.verify_consistency().identical());
    }

    #[test]
    fn direction_gates_corrective_actions() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::write(a.path().join("only-local.txt"), "x").unwrap();

        let local = a.path().to_str().unwrap();
        let remote = b.path().to_str().unwrap();
        // Pulling remote->local cannot fix a file the remote lacks.
        let manager = manager(local, remote, SyncDirection::RemoteToLocal);
        let report = manager.sync_structures(&compare(local, remote), false);

        assert_eq!(report.synced.len(), 0);
        assert_eq!(report.skipped, 1);
        assert!(!b.path().join("only-local.txt").exists());
    }

    #[test]
    fn bidirectional_fills_both_sides() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::write(a.path().join("local.txt"), "l").unwrap();
        fs::write(b.path().join("remote.txt"), "r").unwrap();

        let local = a.path().to_str().unwrap();
        let remote = b.path().to_str().unwrap();
        let manager = manager(local, remote, SyncDirection::Bidirectional);
        let report = manager.sync_structures(&compare(local, remote), false);

        assert!(report.success());
        assert!(a.path().join("remote.txt").exists());
        assert!(b.path().join("local.txt").exists());
        assert!(manager.verify_consistency().identical());
    }

    #[test]
    fn size_mismatch_is_flagged_never_overwritten() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::write(a.path().join("data.txt"), "long local version").unwrap();
        fs::write(b.path().join("data.txt"), "short").unwrap();

        let local = a.path().to_str().unwrap();
        let remote = b.path().to_str().unwrap();
        let manager = manager(local, remote, SyncDirection::Bidirectional);
        let report = manager.sync_structures(&compare(local, remote), false);

        assert_eq!(report.flagged_for_review.len(), 1);
        assert_eq!(report.flagged_for_review[0].path, "data.txt");
        assert_eq!(
            fs::read_to_string(b.path().join("data.txt")).unwrap(),
            "short"
        );
    }

    #[test]
    fn dry_run_reports_without_touching_either_side() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::write(a.path().join("pending.txt"), "x").unwrap();

        let local = a.path().to_str().unwrap();
        let remote = b.path().to_str().unwrap();
        let manager = manager(local, remote, SyncDirection::LocalToRemote);
        let report = manager.sync_structures(&compare(local, remote), true);

        assert!(report.dry_run);
        assert_eq!(report.synced.len(), 1);
        assert!(!b.path().join("pending.txt").exists());
    }

    #[test]
    fn unreachable_target_exhausts_retries() {
        let a = tempdir().unwrap();
        fs::write(a.path().join("doomed.txt"), "x").unwrap();

        // A regular file in the target path makes every mkdir fail with
        // NotADirectory, even when the tests run as root.
        let b = tempdir().unwrap();
        fs::write(b.path().join("blocker"), "").unwrap();
        let remote = format!("{}/blocker/sub", b.path().to_str().unwrap());

        let local = a.path().to_str().unwrap();
        let manager = manager(local, &remote, SyncDirection::LocalToRemote);
        let report = manager.sync_structures(&compare(local, &remote), false);

        assert!(!report.success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].attempts, 3);
    }
}
