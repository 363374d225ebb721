use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use file_organizer::backup::{
    BackupManager, InflightGuard, LocalBackupManager, RemoteBackupManager,
};
use file_organizer::error::Error;
use file_organizer::config::{AppConfig, BackupConfig, MoverConfig};
use file_organizer::engine::{EngineOptions, ExecutionEngine};
use file_organizer::model::{ExecutionMode, ExecutionPhase};
use file_organizer::remote::{CommandChannel, LocalShellChannel};
use file_organizer::SilentReporter;

fn mode_of(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

/// Collect every file under `root` with its content, for before/after
/// snapshots.
fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut entries = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                entries.push((
                    path.strip_prefix(root).unwrap().to_string_lossy().into_owned(),
                    fs::read(&path).unwrap(),
                ));
            }
        }
    }
    entries.sort();
    entries
}

fn test_config(local: &Path, remote: &Path, output: &Path, backups: &Path) -> AppConfig {
    AppConfig {
        local_root: local.to_string_lossy().into_owned(),
        remote_root: remote.to_string_lossy().into_owned(),
        output_dir: output.to_string_lossy().into_owned(),
        backup: BackupConfig {
            local_backup_root: backups.join("local").to_string_lossy().into_owned(),
            remote_backup_root: backups.join("remote").to_string_lossy().into_owned(),
            ..BackupConfig::default()
        },
        mover: MoverConfig {
            batch_size: 10,
            batch_pause_ms: 0,
        },
        ..AppConfig::default()
    }
}

#[test]
fn backup_restore_round_trip_restores_every_file() {
    let work = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let a = work.path().join("a.txt");
    let b = work.path().join("b.txt");
    fs::write(&a, "0123456789").unwrap();
    fs::write(&b, "01234567890123456789").unwrap();

    let manager = LocalBackupManager::new(backups.path(), u64::MAX, InflightGuard::new());
    let created = manager
        .create_backup(
            &[
                a.to_string_lossy().into_owned(),
                b.to_string_lossy().into_owned(),
            ],
            "bk1",
        )
        .unwrap();
    assert!(created.success);
    assert_eq!(created.files.len(), 2);
    assert_eq!(created.total_size, 30);

    let verification = manager.verify_backup("bk1").unwrap();
    assert!(verification.valid, "errors: {:?}", verification.errors);
    assert_eq!(verification.checked_files, 2);

    // Restore after losing one file: every catalogued file is rewritten.
    fs::remove_file(&a).unwrap();
    let restored = manager.restore_backup("bk1").unwrap();
    assert!(restored.success);
    assert_eq!(restored.restored_file_count, 2);
    assert_eq!(fs::read_to_string(&a).unwrap(), "0123456789");
    assert_eq!(fs::read_to_string(&b).unwrap(), "01234567890123456789");
}

#[test]
fn size_cap_abort_leaves_no_partial_unit() {
    let work = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let a = work.path().join("a.txt");
    let b = work.path().join("b.txt");
    fs::write(&a, "0123456789").unwrap();
    fs::write(&b, "01234567890123456789").unwrap();
    let sources = [
        a.to_string_lossy().into_owned(),
        b.to_string_lossy().into_owned(),
    ];

    // The first file fits under the cap, the second pushes past it.
    let manager = LocalBackupManager::new(backups.path(), 15, InflightGuard::new());
    let err = manager.create_backup(&sources, "bk-cap").unwrap_err();
    assert!(matches!(err, Error::BackupSizeExceeded { .. }));
    assert!(
        !backups.path().join("bk-cap").exists(),
        "aborted unit left on disk"
    );
    assert!(manager.list_backups().unwrap().is_empty());

    // The id is immediately reusable.
    let created = manager.create_backup(&sources[..1], "bk-cap").unwrap();
    assert!(created.success);
    assert_eq!(created.files.len(), 1);
}

#[test]
fn remote_size_cap_abort_leaves_no_partial_unit() {
    let work = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let a = work.path().join("a.txt");
    let b = work.path().join("b.txt");
    fs::write(&a, "0123456789").unwrap();
    fs::write(&b, "01234567890123456789").unwrap();
    let sources = [
        a.to_string_lossy().into_owned(),
        b.to_string_lossy().into_owned(),
    ];

    let manager = RemoteBackupManager::new(
        Arc::new(LocalShellChannel::new()),
        backups.path().to_string_lossy().into_owned(),
        15,
        InflightGuard::new(),
    );
    let err = manager.create_backup(&sources, "bk-cap").unwrap_err();
    assert!(matches!(err, Error::BackupSizeExceeded { .. }));
    assert!(
        !backups.path().join("bk-cap").exists(),
        "aborted unit left on disk"
    );

    let created = manager.create_backup(&sources[..1], "bk-cap").unwrap();
    assert!(created.success);
    assert_eq!(created.files.len(), 1);
}

#[test]
fn full_pipeline_organizes_and_reports() {
    let local = tempdir().unwrap();
    let remote = tempdir().unwrap();
    let output = tempdir().unwrap();
    let backups = tempdir().unwrap();

    fs::write(local.path().join("deploy.sh"), "#!/bin/bash\necho deploy\n").unwrap();
    fs::write(local.path().join("secret.yaml"), "token: shhh\n").unwrap();
    fs::write(local.path().join("troubleshooting.md"), "# help\n").unwrap();
    fs::write(remote.path().join("cleanup.sh"), "#!/bin/sh\nrm -f *.tmp\n").unwrap();

    let config = test_config(local.path(), remote.path(), output.path(), backups.path());
    let channel: Arc<dyn CommandChannel> = Arc::new(LocalShellChannel::new());
    let engine = ExecutionEngine::new(config, Some(channel), Arc::new(SilentReporter));
    let result = engine.execute(&EngineOptions::default());

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.final_phase, ExecutionPhase::Completed);

    // Canonical placement with the permission policy applied.
    let script = local.path().join("development/scripts/deployment/deploy.sh");
    let secret = local.path().join("development/configs/secrets/secret.yaml");
    let doc = local.path().join("docs/troubleshooting/troubleshooting.md");
    assert!(script.exists());
    assert_eq!(mode_of(&script), 0o755);
    assert!(secret.exists());
    assert_eq!(mode_of(&secret), 0o600);
    assert!(doc.exists());
    assert_eq!(mode_of(&doc), 0o644);
    assert!(remote
        .path()
        .join("development/scripts/maintenance/cleanup.sh")
        .exists());

    // Originals were backed up before the move.
    let local_backup_id = result.local.backup_id.as_ref().unwrap();
    let metadata = backups
        .path()
        .join("local")
        .join(local_backup_id)
        .join("metadata.json");
    assert!(metadata.exists());
    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(metadata).unwrap()).unwrap();
    assert_eq!(metadata["files"].as_array().unwrap().len(), 3);

    // All three artifacts landed in the output directory.
    for name in [
        "organization-summary.md",
        "structure-comparison.md",
        "error-analysis.md",
    ] {
        assert!(output.path().join(name).exists(), "missing {name}");
    }
    let summary = fs::read_to_string(output.path().join("organization-summary.md")).unwrap();
    assert!(summary.contains("deploy.sh"));
}

#[test]
fn dry_run_changes_nothing_on_either_side() {
    let local = tempdir().unwrap();
    let remote = tempdir().unwrap();
    let output = tempdir().unwrap();
    let backups = tempdir().unwrap();

    fs::write(local.path().join("deploy.sh"), "#!/bin/sh\n").unwrap();
    fs::write(remote.path().join("notes.md"), "remote notes").unwrap();
    let local_before = snapshot(local.path());
    let remote_before = snapshot(remote.path());

    let config = test_config(local.path(), remote.path(), output.path(), backups.path());
    let channel: Arc<dyn CommandChannel> = Arc::new(LocalShellChannel::new());
    let engine = ExecutionEngine::new(config, Some(channel), Arc::new(SilentReporter));
    let result = engine.execute(&EngineOptions {
        dry_run: true,
        ..EngineOptions::default()
    });

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(snapshot(local.path()), local_before);
    assert_eq!(snapshot(remote.path()), remote_before);
    assert!(!backups.path().join("local").exists());
}

#[test]
fn scan_only_pipeline_surveys_flat_files() {
    let local = tempdir().unwrap();
    let output = tempdir().unwrap();

    fs::write(local.path().join("deploy.sh"), "#!/bin/sh\n").unwrap();
    fs::write(local.path().join("private.pem"), "----").unwrap();
    fs::create_dir(local.path().join("nested")).unwrap();
    fs::write(local.path().join("nested/ignored.txt"), "deep").unwrap();

    let config = test_config(
        local.path(),
        Path::new("/unused"),
        output.path(),
        Path::new("/unused"),
    );
    let engine = ExecutionEngine::new(config, None, Arc::new(SilentReporter));
    let result = engine.execute(&EngineOptions {
        mode: ExecutionMode::ScanOnly,
        ..EngineOptions::default()
    });

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.local.scanned_files, 2);
    assert_eq!(result.local.moved_files, 0);
    assert!(local.path().join("deploy.sh").exists());

    let summary = fs::read_to_string(output.path().join("organization-summary.md")).unwrap();
    assert!(summary.contains("Flat files surveyed: 2"));
    assert!(summary.contains("private.pem"), "suspicious file not surveyed");
}
