//! Structural comparison of the two environments.
//!
//! Both roots are inventoried concurrently, then diffed by set membership
//! (paths present on only one side) and by attribute (permissions for
//! directories, size and permissions for files). The local tree is treated
//! as the reference side: paths only present locally are "missing" on the
//! remote, paths only present remotely are "extra" there.

use crate::model::{
    DifferenceKind, Environment, Severity, StructureComparison, StructureDifference,
    StructureInventory,
};
use crate::remote::{commands, CommandChannel};
use crate::scanner::is_denied_dir;
use chrono::Utc;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct StructureComparator {
    channel: Arc<dyn CommandChannel>,
}

impl StructureComparator {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    /// Inventory both sides and derive every difference. Subtree scan errors
    /// are logged and that side contributes an empty inventory; the
    /// comparison itself never fails on scan trouble.
    pub fn compare_structures(&self, local_root: &str, remote_root: &str) -> StructureComparison {
        let channel = self.channel.clone();
        let (local, remote) = rayon::join(
            || inventory_local(local_root),
            move || inventory_remote(channel.as_ref(), remote_root),
        );

        let differences = diff_inventories(&local, &remote);
        let total = local.total_items().max(remote.total_items());
        let match_percentage = if total == 0 {
            100.0
        } else {
            let matched = total.saturating_sub(differences.len());
            matched as f64 / total as f64 * 100.0
        };

        debug!(
            "Compared {} vs {}: {} differences, {:.1}% match",
            local_root,
            remote_root,
            differences.len(),
            match_percentage
        );

        StructureComparison {
            local_root: local_root.to_string(),
            remote_root: remote_root.to_string(),
            local,
            remote,
            differences,
            match_percentage,
            compared_at: Utc::now(),
        }
    }
}

fn octal(mode: u32) -> String {
    format!("{:o}", mode & 0o777)
}

/// Walk the local root collecting relative paths with their permission and
/// size attributes. Errors on individual entries are logged and skipped.
fn inventory_local(root: &str) -> StructureInventory {
    let mut inventory = StructureInventory::default();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                !is_denied_dir(&name)
            } else {
                !name.starts_with('.')
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root, e);
                continue;
            }
        };
        let rel = match entry.path().strip_prefix(root) {
            Ok(p) => p.to_string_lossy().to_string(),
            Err(_) => continue,
        };
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        let perms = octal(meta.permissions().mode());
        if meta.is_dir() {
            inventory.directories.insert(rel, perms);
        } else if meta.is_file() {
            inventory.files.insert(rel, (meta.len(), perms));
        }
    }
    inventory
}

/// Inventory the remote root through the command channel. A failed listing
/// leaves that half of the inventory empty rather than failing the compare.
fn inventory_remote(channel: &dyn CommandChannel, root: &str) -> StructureInventory {
    let mut inventory = StructureInventory::default();
    let prefix = format!("{}/", root.trim_end_matches('/'));

    match channel.execute(&commands::list_dirs_recursive(root)) {
        Ok(output) => {
            for line in output.stdout.lines() {
                let Some((perms, path)) = line.split_once('|') else {
                    continue;
                };
                let Some(rel) = path.strip_prefix(&prefix) else {
                    continue;
                };
                if !rel.is_empty() && !commands::is_excluded_dir(rel) {
                    inventory
                        .directories
                        .insert(rel.to_string(), perms.trim().to_string());
                }
            }
        }
        Err(e) => warn!("Remote directory listing failed for {}: {}", root, e),
    }

    let files = match channel.execute(&commands::list_files_recursive(root)) {
        Ok(output) => output.stdout,
        Err(e) => {
            warn!("Remote file listing failed for {}: {}", root, e);
            return inventory;
        }
    };
    for path in files.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(rel) = path.strip_prefix(&prefix) else {
            continue;
        };
        if commands::is_excluded_file(rel) {
            continue;
        }
        match channel.execute(&commands::stat_file(path)) {
            Ok(output) => {
                // size|mtime|perms|type|name, name last so it may contain '|'
                let mut fields = output.stdout.trim().splitn(5, '|');
                let size = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let _mtime = fields.next();
                let Some(perms) = fields.next() else {
                    continue;
                };
                inventory
                    .files
                    .insert(rel.to_string(), (size, perms.to_string()));
            }
            Err(e) => warn!("Skipping remote file {}: {}", path, e),
        }
    }
    inventory
}

fn diff_inventories(
    local: &StructureInventory,
    remote: &StructureInventory,
) -> Vec<StructureDifference> {
    let mut differences = Vec::new();

    for (path, local_perms) in &local.directories {
        match remote.directories.get(path) {
            None => differences.push(StructureDifference {
                kind: DifferenceKind::MissingDirectory,
                path: path.clone(),
                environment: Environment::Remote,
                expected: Some(local_perms.clone()),
                actual: None,
                severity: Severity::Medium,
                recommended_action: format!("create directory {path} on remote"),
            }),
            Some(remote_perms) if remote_perms != local_perms => {
                differences.push(StructureDifference {
                    kind: DifferenceKind::PermissionMismatch,
                    path: path.clone(),
                    environment: Environment::Remote,
                    expected: Some(local_perms.clone()),
                    actual: Some(remote_perms.clone()),
                    severity: permission_severity(path),
                    recommended_action: format!("chmod {local_perms} {path} on remote"),
                });
            }
            Some(_) => {}
        }
    }
    for (path, remote_perms) in &remote.directories {
        if !local.directories.contains_key(path) {
            differences.push(StructureDifference {
                kind: DifferenceKind::ExtraDirectory,
                path: path.clone(),
                environment: Environment::Remote,
                expected: None,
                actual: Some(remote_perms.clone()),
                severity: Severity::Low,
                recommended_action: format!("review extra remote directory {path}"),
            });
        }
    }

    for (path, (local_size, local_perms)) in &local.files {
        match remote.files.get(path) {
            None => differences.push(StructureDifference {
                kind: DifferenceKind::MissingFile,
                path: path.clone(),
                environment: Environment::Remote,
                expected: Some(local_size.to_string()),
                actual: None,
                severity: Severity::High,
                recommended_action: format!("copy {path} to remote"),
            }),
            Some((remote_size, remote_perms)) => {
                if remote_size != local_size {
                    differences.push(StructureDifference {
                        kind: DifferenceKind::SizeMismatch,
                        path: path.clone(),
                        environment: Environment::Remote,
                        expected: Some(local_size.to_string()),
                        actual: Some(remote_size.to_string()),
                        severity: Severity::High,
                        recommended_action: format!("review content divergence in {path}"),
                    });
                } else if remote_perms != local_perms {
                    differences.push(StructureDifference {
                        kind: DifferenceKind::PermissionMismatch,
                        path: path.clone(),
                        environment: Environment::Remote,
                        expected: Some(local_perms.clone()),
                        actual: Some(remote_perms.clone()),
                        severity: permission_severity(path),
                        recommended_action: format!("chmod {local_perms} {path} on remote"),
                    });
                }
            }
        }
    }
    for (path, (remote_size, _)) in &remote.files {
        if !local.files.contains_key(path) {
            differences.push(StructureDifference {
                kind: DifferenceKind::ExtraFile,
                path: path.clone(),
                environment: Environment::Local,
                expected: None,
                actual: Some(remote_size.to_string()),
                severity: Severity::Low,
                recommended_action: format!("copy {path} to local or review"),
            });
        }
    }

    differences
}

/// Permission drift on sensitive paths is worse than elsewhere.
fn permission_severity(path: &str) -> Severity {
    let lowered = path.to_lowercase();
    if lowered.contains("secret") || lowered.contains("security") {
        Severity::Critical
    } else {
        Severity::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LocalShellChannel;
    use std::fs;
    use std::os::unix::fs::PermissionsExt as _;
    use tempfile::tempdir;

    fn comparator() -> StructureComparator {
        StructureComparator::new(Arc::new(LocalShellChannel::new()))
    }

    fn make_tree(root: &std::path::Path) {
        fs::create_dir_all(root.join("docs/guides")).unwrap();
        fs::write(root.join("docs/readme.md"), "hello").unwrap();
        fs::write(root.join("docs/guides/setup.md"), "setup").unwrap();
    }

    #[test]
    fn identical_trees_match_fully() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        make_tree(a.path());
        make_tree(b.path());

        let comparison = comparator()
            .compare_structures(a.path().to_str().unwrap(), b.path().to_str().unwrap());
        assert!(comparison.identical());
        assert_eq!(comparison.match_percentage, 100.0);
    }

    #[test]
    fn deny_listed_trees_are_ignored_on_both_sides() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        make_tree(a.path());
        make_tree(b.path());
        for root in [a.path(), b.path()] {
            fs::create_dir_all(root.join("dist")).unwrap();
            fs::write(root.join("dist/bundle.js"), "artifact").unwrap();
            fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
            fs::write(root.join("node_modules/pkg/index.js"), "dep").unwrap();
        }
        // Build output on one side only must not register either.
        fs::create_dir_all(b.path().join("build")).unwrap();
        fs::write(b.path().join("build/out.o"), "obj").unwrap();

        let comparison = comparator()
            .compare_structures(a.path().to_str().unwrap(), b.path().to_str().unwrap());
        assert!(comparison.identical(), "diffs: {:?}", comparison.differences);
        assert_eq!(comparison.match_percentage, 100.0);
        assert!(!comparison.remote.directories.contains_key("dist"));
    }

    #[test]
    fn separator_in_filename_keeps_attributes_aligned() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        make_tree(a.path());
        make_tree(b.path());
        for root in [a.path(), b.path()] {
            fs::write(root.join("docs/a|b.txt"), "piped").unwrap();
        }

        let comparison = comparator()
            .compare_structures(a.path().to_str().unwrap(), b.path().to_str().unwrap());
        assert!(comparison.identical(), "diffs: {:?}", comparison.differences);
        let (size, _) = &comparison.remote.files["docs/a|b.txt"];
        assert_eq!(*size, 5);
    }

    #[test]
    fn missing_file_is_high_severity() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        make_tree(a.path());
        make_tree(b.path());
        fs::remove_file(b.path().join("docs/guides/setup.md")).unwrap();

        let comparison = comparator()
            .compare_structures(a.path().to_str().unwrap(), b.path().to_str().unwrap());
        assert_eq!(comparison.differences.len(), 1);
        let diff = &comparison.differences[0];
        assert_eq!(diff.kind, DifferenceKind::MissingFile);
        assert_eq!(diff.path, "docs/guides/setup.md");
        assert_eq!(diff.severity, Severity::High);
        assert!(comparison.match_percentage < 100.0);
    }

    #[test]
    fn size_and_extra_differences_detected() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        make_tree(a.path());
        make_tree(b.path());
        fs::write(b.path().join("docs/readme.md"), "hello world, longer").unwrap();
        fs::write(b.path().join("docs/orphan.txt"), "x").unwrap();

        let comparison = comparator()
            .compare_structures(a.path().to_str().unwrap(), b.path().to_str().unwrap());
        let kinds: Vec<DifferenceKind> =
            comparison.differences.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DifferenceKind::SizeMismatch));
        assert!(kinds.contains(&DifferenceKind::ExtraFile));
    }

    #[test]
    fn secret_permission_drift_is_critical() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        for root in [a.path(), b.path()] {
            fs::create_dir_all(root.join("config/secrets")).unwrap();
            fs::write(root.join("config/secrets/api.key"), "k").unwrap();
        }
        fs::set_permissions(
            a.path().join("config/secrets/api.key"),
            fs::Permissions::from_mode(0o600),
        )
        .unwrap();
        fs::set_permissions(
            b.path().join("config/secrets/api.key"),
            fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        let comparison = comparator()
            .compare_structures(a.path().to_str().unwrap(), b.path().to_str().unwrap());
        let drift = comparison
            .differences
            .iter()
            .find(|d| d.kind == DifferenceKind::PermissionMismatch)
            .unwrap();
        assert_eq!(drift.severity, Severity::Critical);
        assert_eq!(drift.expected.as_deref(), Some("600"));
    }

    #[test]
    fn unreadable_remote_root_degrades_to_empty() {
        let a = tempdir().unwrap();
        make_tree(a.path());

        let comparison = comparator()
            .compare_structures(a.path().to_str().unwrap(), "/nonexistent/compare-root");
        // Every local item shows up as missing remotely.
        assert_eq!(comparison.remote.total_items(), 0);
        assert_eq!(
            comparison.differences.len(),
            comparison.local.total_items()
        );
    }
}
