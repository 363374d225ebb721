use super::{check_common_preconditions, run_batches, FileMover};
use crate::config::MoverConfig;
use crate::error::{Error, Result};
use crate::fsops::EnvFs;
use crate::model::{ClassificationResult, FileInfo, MoveOptions, MoveReport};
use crate::remote::{commands, CommandChannel};
use std::sync::Arc;
use tracing::info;

/// Refuse to start moving onto a filesystem this close to full.
const MAX_DISK_USE_PERCENT: u64 = 95;

pub struct RemoteFileMover {
    channel: Arc<dyn CommandChannel>,
    root: String,
    config: MoverConfig,
}

impl RemoteFileMover {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        root: impl Into<String>,
        config: MoverConfig,
    ) -> Self {
        Self {
            channel,
            root: root.into(),
            config,
        }
    }

    /// Destination probe: the channel must answer, the root must exist as a
    /// directory, and the filesystem holding it must have headroom.
    fn check_destination(&self) -> Result<()> {
        let probe = self.channel.execute(&commands::connectivity_probe())?;
        if !probe.stdout.contains("connection_test") {
            return Err(Error::MovePrecondition(format!(
                "unexpected probe reply from {}",
                self.channel.endpoint()
            )));
        }

        let exists = self
            .channel
            .execute(&commands::file_exists(&self.root))?;
        if exists.stdout.trim() != "yes" {
            return Err(Error::MovePrecondition(format!(
                "destination root does not exist: {}",
                self.root
            )));
        }

        let usage = self
            .channel
            .execute(&commands::disk_use_percent(&self.root))?;
        let percent: u64 = usage.stdout.trim().parse().map_err(|_| {
            Error::MovePrecondition(format!(
                "unreadable disk usage for {}: {:?}",
                self.root,
                usage.stdout.trim()
            ))
        })?;
        if percent >= MAX_DISK_USE_PERCENT {
            return Err(Error::MovePrecondition(format!(
                "destination filesystem at {percent}% capacity"
            )));
        }
        Ok(())
    }
}

impl FileMover for RemoteFileMover {
    fn move_files(
        &self,
        files: &[FileInfo],
        classifications: &[ClassificationResult],
        options: &MoveOptions,
    ) -> Result<MoveReport> {
        let fsops = EnvFs::Remote(self.channel.clone());
        check_common_preconditions(&fsops, files, classifications)?;
        self.check_destination()?;

        info!(
            "Moving {} files on {}{}",
            files.len(),
            self.channel.endpoint(),
            if options.dry_run { " (dry-run)" } else { "" }
        );
        Ok(run_batches(
            &fsops,
            &self.root,
            files,
            classifications,
            options,
            &self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::config::ScanConfig;
    use crate::model::FileType;
    use crate::remote::LocalShellChannel;
    use crate::scanner::{RemoteScanner, Scanner};
    use std::fs;
    use tempfile::tempdir;

    fn channel() -> Arc<dyn CommandChannel> {
        Arc::new(LocalShellChannel::new())
    }

    fn fast_config() -> MoverConfig {
        MoverConfig {
            batch_size: 10,
            batch_pause_ms: 0,
        }
    }

    fn scan_and_classify(
        ch: &Arc<dyn CommandChannel>,
        root: &str,
    ) -> (Vec<FileInfo>, Vec<ClassificationResult>) {
        let scanner = RemoteScanner::new(ch.clone(), ScanConfig::default());
        let files = scanner.scan(root, true).unwrap();
        let classifications = Classifier::new(0.6).classify_all(&files);
        (files, classifications)
    }

    #[test]
    fn moves_script_into_canonical_tree() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().to_str().unwrap();
        fs::write(tmp.path().join("deploy.sh"), "#!/bin/sh\necho hi\n").unwrap();

        let ch = channel();
        let (files, classifications) = scan_and_classify(&ch, root);
        assert_eq!(files.len(), 1);
        assert_eq!(classifications[0].file_type, FileType::Script);

        let mover = RemoteFileMover::new(ch, root, fast_config());
        let report = mover
            .move_files(&files, &classifications, &MoveOptions::default())
            .unwrap();

        assert_eq!(report.moved_count, 1);
        let target = tmp
            .path()
            .join("development/scripts/deployment/deploy.sh");
        assert!(target.exists());
        assert!(!tmp.path().join("deploy.sh").exists());
    }

    #[test]
    fn missing_root_fails_precondition() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().to_str().unwrap();
        fs::write(tmp.path().join("notes.md"), "x").unwrap();

        let ch = channel();
        let (files, classifications) = scan_and_classify(&ch, root);

        let mover = RemoteFileMover::new(ch, "/nonexistent/organizer-root", fast_config());
        let err = mover
            .move_files(&files, &classifications, &MoveOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::MovePrecondition(_)));
        assert!(tmp.path().join("notes.md").exists());
    }

    #[test]
    fn dry_run_leaves_remote_untouched() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().to_str().unwrap();
        fs::write(tmp.path().join("config.yaml"), "a: 1\n").unwrap();

        let ch = channel();
        let (files, classifications) = scan_and_classify(&ch, root);

        let mover = RemoteFileMover::new(ch, root, fast_config());
        let options = MoveOptions {
            dry_run: true,
            ..MoveOptions::default()
        };
        let report = mover.move_files(&files, &classifications, &options).unwrap();

        assert_eq!(report.moved_count, 1);
        assert!(report.outcomes[0].dry_run);
        assert!(tmp.path().join("config.yaml").exists());
        assert!(!tmp.path().join("development").exists());
    }
}
