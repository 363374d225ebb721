mod local;
mod remote;

pub use local::LocalFileMover;
pub use remote::RemoteFileMover;

use crate::config::MoverConfig;
use crate::error::{Error, Result};
use crate::fsops::EnvFs;
use crate::model::{
    ClassificationResult, FileInfo, FileMoveOutcome, MoveOptions, MoveReport,
};
use crate::permissions;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Relocates classified files into the canonical layout.
pub trait FileMover: Send + Sync {
    /// Move `files` to their classified target paths under the mover's root.
    ///
    /// Precondition violations (count mismatch, unreachable sources, no
    /// destination headroom) fail the whole call before any mutation.
    /// Per-file failures afterwards are isolated; the aggregate report says
    /// `success` only when every file moved.
    fn move_files(
        &self,
        files: &[FileInfo],
        classifications: &[ClassificationResult],
        options: &MoveOptions,
    ) -> Result<MoveReport>;
}

/// Number of source files probed for reachability before mutating anything.
const PRECONDITION_SAMPLE: usize = 5;

/// Cap on `_N` conflict suffix probing.
const MAX_CONFLICT_SUFFIX: u32 = 999;

pub(crate) fn check_common_preconditions(
    fsops: &EnvFs,
    files: &[FileInfo],
    classifications: &[ClassificationResult],
) -> Result<()> {
    if files.len() != classifications.len() {
        return Err(Error::MovePrecondition(format!(
            "file count {} does not match classification count {}",
            files.len(),
            classifications.len()
        )));
    }
    for file in files.iter().take(PRECONDITION_SAMPLE) {
        if !fsops.exists(&file.path)? {
            return Err(Error::MovePrecondition(format!(
                "source file not reachable: {}",
                file.path
            )));
        }
    }
    Ok(())
}

/// Batch driver shared by both variants: fixed-size batches, strictly in
/// sequence, with a pause between batches to bound load on the target side.
pub(crate) fn run_batches(
    fsops: &EnvFs,
    root: &str,
    files: &[FileInfo],
    classifications: &[ClassificationResult],
    options: &MoveOptions,
    config: &MoverConfig,
) -> MoveReport {
    let batch_size = config.batch_size.max(1);
    let mut outcomes = Vec::with_capacity(files.len());
    let mut warnings = Vec::new();
    let mut batches = 0;

    let pairs: Vec<(&FileInfo, &ClassificationResult)> =
        files.iter().zip(classifications.iter()).collect();

    for (index, batch) in pairs.chunks(batch_size).enumerate() {
        if index > 0 && !options.dry_run {
            std::thread::sleep(Duration::from_millis(config.batch_pause_ms));
        }
        batches += 1;
        debug!("Processing move batch {} ({} files)", index + 1, batch.len());

        for (file, classification) in batch {
            outcomes.push(move_one(fsops, root, file, classification, options, &mut warnings));
        }
    }

    let moved: Vec<&FileMoveOutcome> = outcomes.iter().filter(|o| o.success).collect();
    let moved_count = moved.len();
    let total_moved_bytes = moved.iter().map(|o| o.size).sum();
    let average_move_ms = if moved_count > 0 {
        moved.iter().map(|o| o.duration_ms).sum::<u64>() as f64 / moved_count as f64
    } else {
        0.0
    };
    let failed_count = outcomes.len() - moved_count;

    info!(
        "Move complete ({}): {}/{} succeeded in {} batches",
        fsops.environment(),
        moved_count,
        outcomes.len(),
        batches
    );
    MoveReport {
        environment: fsops.environment(),
        total_files: files.len(),
        moved_count,
        failed_count,
        total_moved_bytes,
        average_move_ms,
        batches,
        outcomes,
        warnings,
        dry_run: options.dry_run,
    }
}

fn move_one(
    fsops: &EnvFs,
    root: &str,
    file: &FileInfo,
    classification: &ClassificationResult,
    options: &MoveOptions,
    warnings: &mut Vec<String>,
) -> FileMoveOutcome {
    let start = Instant::now();
    let target_dir = format!(
        "{}/{}",
        root.trim_end_matches('/'),
        classification.target_path.trim_matches('/')
    );
    let naive_target = format!("{}/{}", target_dir, file.name);

    if options.dry_run {
        // Every step except mutation and conflict probing.
        return FileMoveOutcome {
            source: file.path.clone(),
            target: naive_target,
            size: file.size,
            success: true,
            error: None,
            duration_ms: start.elapsed().as_millis() as u64,
            dry_run: true,
        };
    }

    match execute_move(fsops, file, classification, &target_dir, &naive_target, options, warnings) {
        Ok(target) => FileMoveOutcome {
            source: file.path.clone(),
            target,
            size: file.size,
            success: true,
            error: None,
            duration_ms: start.elapsed().as_millis() as u64,
            dry_run: false,
        },
        Err(e) => {
            warn!("Move failed for {}: {}", file.path, e);
            FileMoveOutcome {
                source: file.path.clone(),
                target: naive_target,
                size: file.size,
                success: false,
                error: Some(e.to_string()),
                duration_ms: start.elapsed().as_millis() as u64,
                dry_run: false,
            }
        }
    }
}

fn execute_move(
    fsops: &EnvFs,
    file: &FileInfo,
    classification: &ClassificationResult,
    target_dir: &str,
    naive_target: &str,
    options: &MoveOptions,
    warnings: &mut Vec<String>,
) -> Result<String> {
    fsops.mkdir_p(target_dir)?;

    let target = if options.overwrite_existing {
        naive_target.to_string()
    } else {
        resolve_conflict(fsops, naive_target)?
    };

    if options.preserve_source {
        fsops.copy_file(&file.path, &target)?;
    } else {
        fsops.move_file(&file.path, &target)?;
    }

    let mode = permissions::target_permissions(&target, classification.file_type);
    fsops.chmod(&target, mode)?;

    // Verification: target must exist with the source's size; a lingering
    // source after a move is a warning, not an error.
    if !fsops.exists(&target)? {
        return Err(Error::MoveFailed {
            path: file.path.clone(),
            environment: fsops.environment(),
            message: "target missing after move".to_string(),
        });
    }
    let target_size = fsops.file_size(&target)?;
    if target_size != file.size {
        return Err(Error::MoveFailed {
            path: file.path.clone(),
            environment: fsops.environment(),
            message: format!("size mismatch after move: {} != {}", target_size, file.size),
        });
    }
    if !options.preserve_source && fsops.exists(&file.path)? {
        warnings.push(format!("source still present after move: {}", file.path));
    }

    Ok(target)
}

/// Deterministic conflict resolution: `target`, then `target_1`, `target_2`,
/// ... capped at 999.
pub(crate) fn resolve_conflict(fsops: &EnvFs, naive_target: &str) -> Result<String> {
    if !fsops.exists(naive_target)? {
        return Ok(naive_target.to_string());
    }
    let (dir, name) = naive_target
        .rsplit_once('/')
        .map(|(d, n)| (d.to_string(), n.to_string()))
        .unwrap_or((String::new(), naive_target.to_string()));
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s.to_string(), format!(".{e}")),
        _ => (name.clone(), String::new()),
    };
    for n in 1..=MAX_CONFLICT_SUFFIX {
        let candidate = if dir.is_empty() {
            format!("{stem}_{n}{ext}")
        } else {
            format!("{dir}/{stem}_{n}{ext}")
        };
        if !fsops.exists(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(Error::MoveFailed {
        path: naive_target.to_string(),
        environment: fsops.environment(),
        message: "no free conflict suffix below 1000".to_string(),
    })
}
