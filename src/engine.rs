//! Sequential phase state machine driving a full organization run.
//!
//! One orchestration thread walks the phases in order; inside the scanning
//! and backup phases the two environments fan out with `rayon::join` and the
//! engine waits for both, capturing each branch's outcome independently so a
//! single environment failure degrades the run instead of aborting it.

use crate::backup::{BackupManager, InflightGuard, LocalBackupManager, RemoteBackupManager};
use crate::classify::Classifier;
use crate::compare::StructureComparator;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::fsops::EnvFs;
use crate::model::{
    BackupResult, ClassificationResult, EnvironmentSummary, Environment, ExecutionError,
    ExecutionMode, ExecutionPhase, ExecutionProgress, ExecutionResult, FileInfo, FlatFileReport,
    GeneratedReport, MoveOptions, MoveReport, PermissionReport, StructureComparison, SyncReport,
};
use crate::mover::{FileMover, LocalFileMover, RemoteFileMover};
use crate::permissions::PermissionManager;
use crate::progress::ProgressReporter;
use crate::remote::CommandChannel;
use crate::report;
use crate::scanner::{LocalScanner, RemoteScanner, Scanner};
use crate::structure::DirectoryCreator;
use crate::sync::SyncManager;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub mode: ExecutionMode,
    pub dry_run: bool,
    pub continue_on_error: bool,
    /// Caller-supplied backup id; generated from the start time when absent.
    pub backup_id: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Full,
            dry_run: false,
            continue_on_error: false,
            backup_id: None,
        }
    }
}

/// Everything a run accumulates while walking the phases.
#[derive(Default)]
struct RunState {
    local_files: Vec<FileInfo>,
    remote_files: Vec<FileInfo>,
    local_flat_report: Option<FlatFileReport>,
    remote_flat_report: Option<FlatFileReport>,
    local_classifications: Vec<ClassificationResult>,
    remote_classifications: Vec<ClassificationResult>,
    local_backup: Option<BackupResult>,
    remote_backup: Option<BackupResult>,
    local_moves: Option<MoveReport>,
    remote_moves: Option<MoveReport>,
    local_permissions: Option<PermissionReport>,
    remote_permissions: Option<PermissionReport>,
    comparison: Option<StructureComparison>,
    sync: Option<SyncReport>,
    errors: Vec<ExecutionError>,
    warnings: Vec<String>,
    reports: Vec<GeneratedReport>,
}

pub struct ExecutionEngine {
    config: AppConfig,
    channel: Option<Arc<dyn CommandChannel>>,
    reporter: Arc<dyn ProgressReporter>,
    guard: InflightGuard,
}

impl ExecutionEngine {
    pub fn new(
        config: AppConfig,
        channel: Option<Arc<dyn CommandChannel>>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            config,
            channel,
            reporter,
            guard: InflightGuard::new(),
        }
    }

    /// Run the phase machine to completion (or to the first fatal phase when
    /// `continue_on_error` is off) and return the accumulated result.
    pub fn execute(&self, options: &EngineOptions) -> ExecutionResult {
        let started_at = Utc::now();
        let execution_id = format!("exec-{}", started_at.format("%Y%m%d-%H%M%S"));
        let phases = phases_for(options.mode);
        let mut state = RunState::default();
        let mut progress = ExecutionProgress {
            execution_id: execution_id.clone(),
            current_phase: ExecutionPhase::Initializing,
            overall_progress: 0.0,
            phase_progress: 0.0,
            processed_files: 0,
            total_files: 0,
            current_file: None,
            started_at,
            error_count: 0,
            warning_count: 0,
        };

        info!(
            "Execution {} starting: mode={:?} dry_run={}",
            execution_id, options.mode, options.dry_run
        );

        let mut final_phase = ExecutionPhase::Completed;
        for (index, phase) in phases.iter().copied().enumerate() {
            progress.current_phase = phase;
            progress.phase_progress = 0.0;
            progress.overall_progress = index as f64 / phases.len() as f64 * 100.0;
            progress.error_count = state.errors.len();
            progress.warning_count = state.warnings.len();
            self.reporter.on_phase_start(phase);
            self.reporter.on_progress(&progress);

            let phase_start = Instant::now();
            let outcome = self.run_phase(phase, options, &execution_id, &mut state);
            let elapsed = phase_start.elapsed().as_secs_f64();

            match outcome {
                Ok(()) => {
                    progress.phase_progress = 100.0;
                    progress.processed_files = state.local_files.len() + state.remote_files.len();
                    progress.total_files = progress.processed_files;
                    self.reporter.on_phase_complete(phase, elapsed);
                }
                Err(e) => {
                    error!("Phase {} failed: {}", phase, e);
                    state.errors.push(ExecutionError {
                        phase,
                        environment: None,
                        message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    if !options.continue_on_error {
                        final_phase = ExecutionPhase::Failed;
                        break;
                    }
                }
            }
        }
        progress.current_phase = final_phase;
        progress.overall_progress = 100.0;
        progress.error_count = state.errors.len();
        progress.warning_count = state.warnings.len();
        self.reporter.on_progress(&progress);

        let success = final_phase != ExecutionPhase::Failed && state.errors.is_empty();
        info!(
            "Execution {} finished: {} ({} errors, {} warnings)",
            execution_id,
            final_phase,
            state.errors.len(),
            state.warnings.len()
        );

        ExecutionResult {
            execution_id,
            success,
            dry_run: options.dry_run,
            mode: options.mode,
            started_at,
            finished_at: Utc::now(),
            final_phase,
            local: summarize(
                &state.local_files,
                &state.local_classifications,
                &state.local_moves,
                &state.local_permissions,
                &state.local_backup,
                &state.errors,
                Environment::Local,
            ),
            remote: summarize(
                &state.remote_files,
                &state.remote_classifications,
                &state.remote_moves,
                &state.remote_permissions,
                &state.remote_backup,
                &state.errors,
                Environment::Remote,
            ),
            comparison: state.comparison,
            sync: state.sync,
            errors: state.errors,
            warnings: state.warnings,
            reports: state.reports,
        }
    }

    fn run_phase(
        &self,
        phase: ExecutionPhase,
        options: &EngineOptions,
        execution_id: &str,
        state: &mut RunState,
    ) -> Result<()> {
        match phase {
            ExecutionPhase::Initializing => self.initialize(state),
            ExecutionPhase::Scanning => self.scan_both(options, state),
            ExecutionPhase::Classifying => self.classify(state),
            ExecutionPhase::CreatingDirectories => self.create_directories(options, state),
            ExecutionPhase::CreatingBackup => self.backup_both(options, execution_id, state),
            ExecutionPhase::MovingFiles => self.move_both(options, state),
            ExecutionPhase::SettingPermissions => self.set_permissions(options, state),
            ExecutionPhase::Syncing => self.sync_structures(options, state),
            ExecutionPhase::Validating => self.validate(options, state),
            ExecutionPhase::GeneratingReport => self.generate_reports(options, execution_id, state),
            ExecutionPhase::Completed | ExecutionPhase::Failed => Ok(()),
        }
    }

    fn initialize(&self, state: &mut RunState) -> Result<()> {
        if !std::path::Path::new(&self.config.local_root).is_dir() {
            return Err(Error::ValidationFailed(format!(
                "local root does not exist: {}",
                self.config.local_root
            )));
        }
        if let Some(channel) = &self.channel {
            let probe = channel.execute(&crate::remote::commands::connectivity_probe())?;
            if !probe.stdout.contains("connection_test") {
                return Err(Error::ConnectionFailed {
                    host: channel.endpoint(),
                    message: "unexpected probe reply".to_string(),
                });
            }
        } else {
            state
                .warnings
                .push("no remote configured; remote phases will be skipped".to_string());
        }
        Ok(())
    }

    fn scan_both(&self, options: &EngineOptions, state: &mut RunState) -> Result<()> {
        let local_scanner = LocalScanner::new(self.config.scan.clone());
        let local_root = self.config.local_root.clone();
        let large = self.config.scan.large_file_bytes;
        let flat_report_wanted = options.mode == ExecutionMode::ScanOnly;

        let remote = self.channel.clone().map(|channel| {
            (
                RemoteScanner::new(channel, self.config.scan.clone()),
                self.config.remote_root.clone(),
            )
        });

        let (local_result, remote_result) = rayon::join(
            || {
                let files = local_scanner.scan(&local_root, true)?;
                let report = if flat_report_wanted {
                    Some(local_scanner.detect_flat_files(&local_root, large)?)
                } else {
                    None
                };
                Ok::<_, Error>((files, report))
            },
            || match &remote {
                Some((scanner, root)) => {
                    let files = scanner.scan(root, true)?;
                    let report = if flat_report_wanted {
                        Some(scanner.detect_flat_files(root, large)?)
                    } else {
                        None
                    };
                    Ok(Some((files, report)))
                }
                None => Ok(None),
            },
        );

        match local_result {
            Ok((files, report)) => {
                info!("Scanned {} flat local files", files.len());
                state.local_files = files;
                state.local_flat_report = report;
            }
            Err(e) => self.record_branch_error(state, ExecutionPhase::Scanning, Environment::Local, e),
        }
        match remote_result {
            Ok(Some((files, report))) => {
                info!("Scanned {} flat remote files", files.len());
                state.remote_files = files;
                state.remote_flat_report = report;
            }
            Ok(None) => {}
            Err(e) => {
                self.record_branch_error(state, ExecutionPhase::Scanning, Environment::Remote, e)
            }
        }
        Ok(())
    }

    fn classify(&self, state: &mut RunState) -> Result<()> {
        let classifier = Classifier::new(self.config.classify.confidence_threshold);
        state.local_classifications = classifier.classify_all(&state.local_files);
        state.remote_classifications = classifier.classify_all(&state.remote_files);

        let review = state
            .local_classifications
            .iter()
            .chain(&state.remote_classifications)
            .filter(|c| c.requires_review)
            .count();
        if review > 0 {
            state
                .warnings
                .push(format!("{review} low-confidence classifications need review"));
        }
        Ok(())
    }

    fn create_directories(&self, options: &EngineOptions, state: &mut RunState) -> Result<()> {
        if options.dry_run {
            state
                .warnings
                .push("directory creation skipped (dry-run)".to_string());
            return Ok(());
        }
        let local = DirectoryCreator::new(EnvFs::Local).create_structure(&self.config.local_root)?;
        if !local.success() {
            for e in &local.errors {
                state.warnings.push(format!("local directory: {e}"));
            }
        }
        if let Some(channel) = &self.channel {
            let remote = DirectoryCreator::new(EnvFs::Remote(channel.clone()))
                .create_structure(&self.config.remote_root)?;
            if !remote.success() {
                for e in &remote.errors {
                    state.warnings.push(format!("remote directory: {e}"));
                }
            }
        }
        Ok(())
    }

    fn backup_both(
        &self,
        options: &EngineOptions,
        execution_id: &str,
        state: &mut RunState,
    ) -> Result<()> {
        if options.dry_run {
            state
                .warnings
                .push("backup creation skipped (dry-run)".to_string());
            return Ok(());
        }
        let backup_id = options
            .backup_id
            .clone()
            .unwrap_or_else(|| format!("{execution_id}-backup"));

        let local_paths: Vec<String> = state.local_files.iter().map(|f| f.path.clone()).collect();
        let remote_paths: Vec<String> = state.remote_files.iter().map(|f| f.path.clone()).collect();

        let local_manager = LocalBackupManager::new(
            &self.config.backup.local_backup_root,
            self.config.backup.max_backup_bytes,
            self.guard.clone(),
        );
        let remote_manager = self.channel.clone().map(|channel| {
            RemoteBackupManager::new(
                channel,
                &self.config.backup.remote_backup_root,
                self.config.backup.max_backup_bytes,
                self.guard.clone(),
            )
        });

        let local_id = format!("{backup_id}-local");
        let remote_id = format!("{backup_id}-remote");
        let (local_result, remote_result) = rayon::join(
            || local_manager.create_backup(&local_paths, &local_id),
            || match &remote_manager {
                Some(manager) if !remote_paths.is_empty() => {
                    manager.create_backup(&remote_paths, &remote_id).map(Some)
                }
                _ => Ok(None),
            },
        );

        match local_result {
            Ok(result) => state.local_backup = Some(result),
            Err(e) => self.record_branch_error(
                state,
                ExecutionPhase::CreatingBackup,
                Environment::Local,
                e,
            ),
        }
        match remote_result {
            Ok(result) => state.remote_backup = result,
            Err(e) => self.record_branch_error(
                state,
                ExecutionPhase::CreatingBackup,
                Environment::Remote,
                e,
            ),
        }
        Ok(())
    }

    fn move_both(&self, options: &EngineOptions, state: &mut RunState) -> Result<()> {
        let move_options = MoveOptions {
            dry_run: options.dry_run,
            ..MoveOptions::default()
        };

        if !state.local_files.is_empty() {
            let mover = LocalFileMover::new(&self.config.local_root, self.config.mover.clone());
            let report = mover.move_files(
                &state.local_files,
                &state.local_classifications,
                &move_options,
            )?;
            state.warnings.extend(report.warnings.iter().cloned());
            state.local_moves = Some(report);
        }
        if let Some(channel) = &self.channel {
            if !state.remote_files.is_empty() {
                let mover = RemoteFileMover::new(
                    channel.clone(),
                    &self.config.remote_root,
                    self.config.mover.clone(),
                );
                let report = mover.move_files(
                    &state.remote_files,
                    &state.remote_classifications,
                    &move_options,
                )?;
                state.warnings.extend(report.warnings.iter().cloned());
                state.remote_moves = Some(report);
            }
        }
        Ok(())
    }

    fn set_permissions(&self, options: &EngineOptions, state: &mut RunState) -> Result<()> {
        let local_targets = post_move_classifications(
            &state.local_classifications,
            state.local_moves.as_ref(),
        );
        if !local_targets.is_empty() {
            let manager = PermissionManager::new(EnvFs::Local);
            state.local_permissions = Some(manager.set_permissions(&local_targets, options.dry_run)?);
        }
        if let Some(channel) = &self.channel {
            let remote_targets = post_move_classifications(
                &state.remote_classifications,
                state.remote_moves.as_ref(),
            );
            if !remote_targets.is_empty() {
                let manager = PermissionManager::new(EnvFs::Remote(channel.clone()));
                state.remote_permissions =
                    Some(manager.set_permissions(&remote_targets, options.dry_run)?);
            }
        }
        Ok(())
    }

    fn sync_structures(&self, options: &EngineOptions, state: &mut RunState) -> Result<()> {
        let Some(channel) = &self.channel else {
            state
                .warnings
                .push("sync skipped: no remote configured".to_string());
            return Ok(());
        };
        let comparison = StructureComparator::new(channel.clone())
            .compare_structures(&self.config.local_root, &self.config.remote_root);
        let manager = SyncManager::new(
            channel.clone(),
            &self.config.local_root,
            &self.config.remote_root,
            self.config.sync.clone(),
        );
        let report = manager.sync_structures(&comparison, options.dry_run);
        if !report.success() {
            state.warnings.push(format!(
                "{} sync actions failed after retries",
                report.failed.len()
            ));
        }
        state.comparison = Some(comparison);
        state.sync = Some(report);
        Ok(())
    }

    fn validate(&self, options: &EngineOptions, state: &mut RunState) -> Result<()> {
        if options.dry_run {
            return Ok(());
        }

        if let Some(backup) = &state.local_backup {
            let manager = LocalBackupManager::new(
                &self.config.backup.local_backup_root,
                self.config.backup.max_backup_bytes,
                self.guard.clone(),
            );
            let verification = manager.verify_backup(&backup.backup_id)?;
            if !verification.valid {
                return Err(Error::ValidationFailed(format!(
                    "local backup '{}' failed verification",
                    backup.backup_id
                )));
            }
        }
        if let (Some(backup), Some(channel)) = (&state.remote_backup, &self.channel) {
            let manager = RemoteBackupManager::new(
                channel.clone(),
                &self.config.backup.remote_backup_root,
                self.config.backup.max_backup_bytes,
                self.guard.clone(),
            );
            let verification = manager.verify_backup(&backup.backup_id)?;
            if !verification.valid {
                return Err(Error::ValidationFailed(format!(
                    "remote backup '{}' failed verification",
                    backup.backup_id
                )));
            }
        }

        // After a move pass the roots should hold no loose files.
        if state.local_moves.is_some() {
            let leftovers = LocalScanner::new(self.config.scan.clone())
                .scan(&self.config.local_root, true)?;
            if !leftovers.is_empty() {
                state.warnings.push(format!(
                    "{} files still loose under {}",
                    leftovers.len(),
                    self.config.local_root
                ));
            }
        }

        // Syncing should leave the structures consistent, or the mismatch is
        // worth surfacing.
        if let (Some(sync), Some(channel)) = (&state.sync, &self.channel) {
            if sync.success() && sync.flagged_for_review.is_empty() {
                let check = SyncManager::new(
                    channel.clone(),
                    &self.config.local_root,
                    &self.config.remote_root,
                    self.config.sync.clone(),
                )
                .verify_consistency();
                if !check.identical() {
                    state.warnings.push(format!(
                        "structures still diverge after sync: {:.1}% match",
                        check.match_percentage
                    ));
                }
            }
        }
        Ok(())
    }

    fn generate_reports(
        &self,
        options: &EngineOptions,
        execution_id: &str,
        state: &mut RunState,
    ) -> Result<()> {
        let context = report::ReportContext {
            execution_id,
            mode: options.mode,
            dry_run: options.dry_run,
            local_files: &state.local_files,
            remote_files: &state.remote_files,
            local_flat_report: state.local_flat_report.as_ref(),
            remote_flat_report: state.remote_flat_report.as_ref(),
            local_classifications: &state.local_classifications,
            remote_classifications: &state.remote_classifications,
            local_backup: state.local_backup.as_ref(),
            remote_backup: state.remote_backup.as_ref(),
            local_moves: state.local_moves.as_ref(),
            remote_moves: state.remote_moves.as_ref(),
            comparison: state.comparison.as_ref(),
            sync: state.sync.as_ref(),
            errors: &state.errors,
            warnings: &state.warnings,
        };
        state.reports = report::write_all(&self.config.output_dir, &context)?;
        Ok(())
    }

    fn record_branch_error(
        &self,
        state: &mut RunState,
        phase: ExecutionPhase,
        environment: Environment,
        e: Error,
    ) {
        warn!("{} branch failed during {}: {}", environment, phase, e);
        self.reporter.on_warning(&e.to_string());
        state.errors.push(ExecutionError {
            phase,
            environment: Some(environment),
            message: e.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Phases each mode walks, in order.
fn phases_for(mode: ExecutionMode) -> Vec<ExecutionPhase> {
    use ExecutionPhase::*;
    match mode {
        ExecutionMode::Full => vec![
            Initializing,
            Scanning,
            Classifying,
            CreatingDirectories,
            CreatingBackup,
            MovingFiles,
            SettingPermissions,
            Syncing,
            Validating,
            GeneratingReport,
        ],
        ExecutionMode::ScanOnly => vec![Initializing, Scanning, GeneratingReport],
        ExecutionMode::ClassifyOnly => {
            vec![Initializing, Scanning, Classifying, GeneratingReport]
        }
        ExecutionMode::MoveOnly => vec![
            Initializing,
            Scanning,
            Classifying,
            CreatingDirectories,
            CreatingBackup,
            MovingFiles,
            SettingPermissions,
            Validating,
            GeneratingReport,
        ],
        ExecutionMode::SyncOnly => vec![Initializing, Syncing, Validating, GeneratingReport],
    }
}

/// Rebind classifications to the paths the mover actually produced, so the
/// permission pass works on the post-move tree.
fn post_move_classifications(
    classifications: &[ClassificationResult],
    moves: Option<&MoveReport>,
) -> Vec<ClassificationResult> {
    let Some(moves) = moves else {
        return Vec::new();
    };
    classifications
        .iter()
        .zip(&moves.outcomes)
        .filter(|(_, outcome)| outcome.success && !outcome.dry_run)
        .map(|(classification, outcome)| {
            let mut rebound = classification.clone();
            rebound.file.path = outcome.target.clone();
            rebound
        })
        .collect()
}

fn summarize(
    files: &[FileInfo],
    classifications: &[ClassificationResult],
    moves: &Option<MoveReport>,
    permissions: &Option<PermissionReport>,
    backup: &Option<BackupResult>,
    errors: &[ExecutionError],
    environment: Environment,
) -> EnvironmentSummary {
    EnvironmentSummary {
        scanned_files: files.len(),
        classified_files: classifications.len(),
        moved_files: moves.as_ref().map(|m| m.moved_count).unwrap_or(0),
        failed_moves: moves.as_ref().map(|m| m.failed_count).unwrap_or(0),
        permission_updates: permissions
            .as_ref()
            .map(|p| p.updated_count + p.unchanged_count)
            .unwrap_or(0),
        backup_id: backup.as_ref().map(|b| b.backup_id.clone()),
        errors: errors
            .iter()
            .filter(|e| e.environment == Some(environment))
            .count(),
    }
}
