use super::{check_common_preconditions, run_batches, FileMover};
use crate::config::MoverConfig;
use crate::error::{Error, Result};
use crate::fsops::EnvFs;
use crate::model::{ClassificationResult, FileInfo, MoveOptions, MoveReport};
use std::fs;
use std::path::Path;
use tracing::info;

pub struct LocalFileMover {
    root: String,
    config: MoverConfig,
}

impl LocalFileMover {
    pub fn new(root: impl Into<String>, config: MoverConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Destination headroom probe: the root must exist and be writable.
    fn check_destination(&self) -> Result<()> {
        let root = Path::new(&self.root);
        if !root.is_dir() {
            return Err(Error::MovePrecondition(format!(
                "destination root does not exist: {}",
                self.root
            )));
        }
        let probe = root.join(".organizer-write-probe");
        fs::write(&probe, b"")
            .map_err(|e| Error::MovePrecondition(format!("destination not writable: {e}")))?;
        fs::remove_file(&probe)?;
        Ok(())
    }
}

impl FileMover for LocalFileMover {
    fn move_files(
        &self,
        files: &[FileInfo],
        classifications: &[ClassificationResult],
        options: &MoveOptions,
    ) -> Result<MoveReport> {
        let fsops = EnvFs::Local;
        check_common_preconditions(&fsops, files, classifications)?;
        self.check_destination()?;

        info!(
            "Moving {} local files{}",
            files.len(),
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
