use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two storage locations a file can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Local,
    Remote,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Local => write!(f, "local"),
            Environment::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Script,
    Document,
    Config,
    Test,
    Log,
    Other,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileType::Script => "script",
            FileType::Document => "document",
            FileType::Config => "config",
            FileType::Test => "test",
            FileType::Log => "log",
            FileType::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Immutable snapshot of one file's on-disk state at scan time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Absolute path in the owning environment.
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    /// Octal permission string, e.g. "644".
    pub permissions: String,
    pub modified: DateTime<Utc>,
    pub environment: Environment,
    /// Path relative to the scan root.
    pub relative_path: String,
    pub is_directory: bool,
    pub is_hidden: bool,
    /// Content sample captured for small text files.
    pub content_preview: Option<String>,
}

impl FileInfo {
    /// Whether the relative path sits directly under the scan root.
    pub fn is_flat(&self) -> bool {
        !self.relative_path.contains('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub file: FileInfo,
    pub file_type: FileType,
    /// Directory the file should move into, relative to the organization root.
    pub target_path: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub requires_review: bool,
    pub applied_rule: String,
    pub classified_at: DateTime<Utc>,
}

/// Flat-file survey for one environment, produced by `scan_only` runs.
#[derive(Debug, Clone)]
pub struct FlatFileReport {
    pub environment: Environment,
    pub scan_path: String,
    pub total_files: usize,
    pub files_by_type: std::collections::HashMap<FileType, Vec<FileInfo>>,
    pub suspicious_files: Vec<FileInfo>,
    pub large_files: Vec<FileInfo>,
    pub scanned_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFileInfo {
    pub original_path: String,
    pub backup_path: String,
    pub size: u64,
    pub checksum: String,
    pub backup_time: DateTime<Utc>,
}

/// The metadata document stored as `<root>/<backupId>/metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub backup_id: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<BackupFileInfo>,
    pub total_size: u64,
    pub environment: Environment,
    pub version: String,
}

pub const BACKUP_METADATA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone)]
pub struct BackupResult {
    pub backup_id: String,
    pub backup_path: String,
    pub files: Vec<BackupFileInfo>,
    pub total_size: u64,
    pub environment: Environment,
    pub success: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub backup_id: String,
    pub restored_file_count: usize,
    pub restored_files: Vec<String>,
    pub environment: Environment,
    pub success: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BackupVerification {
    pub backup_id: String,
    pub valid: bool,
    pub checked_files: usize,
    pub errors: Vec<String>,
}

/// Listing entry for a stored backup unit.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub backup_id: String,
    pub created_at: DateTime<Utc>,
    pub file_count: usize,
    pub total_size: u64,
    pub environment: Environment,
    pub backup_path: String,
}

// ---------------------------------------------------------------------------
// Move
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MoveOptions {
    pub overwrite_existing: bool,
    /// Copy instead of move, leaving the source in place.
    pub preserve_source: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct FileMoveOutcome {
    pub source: String,
    pub target: String,
    pub size: u64,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct MoveReport {
    pub environment: Environment,
    pub total_files: usize,
    pub moved_count: usize,
    pub failed_count: usize,
    pub total_moved_bytes: u64,
    pub average_move_ms: f64,
    pub batches: usize,
    pub outcomes: Vec<FileMoveOutcome>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
}

impl MoveReport {
    pub fn success(&self) -> bool {
        self.failed_count == 0
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PermissionOutcome {
    pub path: String,
    pub previous: String,
    pub target: String,
    pub changed: bool,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PermissionReport {
    pub environment: Environment,
    pub total_files: usize,
    pub updated_count: usize,
    pub unchanged_count: usize,
    pub failed_count: usize,
    pub outcomes: Vec<PermissionOutcome>,
}

impl PermissionReport {
    pub fn success(&self) -> bool {
        self.failed_count == 0
    }
}

// ---------------------------------------------------------------------------
// Structure comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    MissingDirectory,
    ExtraDirectory,
    MissingFile,
    ExtraFile,
    PermissionMismatch,
    SizeMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One discrepancy between the two environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureDifference {
    pub kind: DifferenceKind,
    /// Path relative to the compared roots.
    pub path: String,
    /// Environment the discrepancy is attributed to (the side needing action).
    pub environment: Environment,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub severity: Severity,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Default)]
pub struct StructureInventory {
    /// relative dir path -> octal permissions
    pub directories: std::collections::BTreeMap<String, String>,
    /// relative file path -> (size, octal permissions)
    pub files: std::collections::BTreeMap<String, (u64, String)>,
}

impl StructureInventory {
    pub fn total_items(&self) -> usize {
        self.directories.len() + self.files.len()
    }
}

#[derive(Debug, Clone)]
pub struct StructureComparison {
    pub local_root: String,
    pub remote_root: String,
    pub local: StructureInventory,
    pub remote: StructureInventory,
    pub differences: Vec<StructureDifference>,
    pub match_percentage: f64,
    pub compared_at: DateTime<Utc>,
}

impl StructureComparison {
    pub fn identical(&self) -> bool {
        self.differences.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    LocalToRemote,
    RemoteToLocal,
    Bidirectional,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::LocalToRemote => write!(f, "local_to_remote"),
            SyncDirection::RemoteToLocal => write!(f, "remote_to_local"),
            SyncDirection::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncedItem {
    pub path: String,
    pub action: String,
    pub environment: Environment,
}

#[derive(Debug, Clone)]
pub struct FailedItem {
    pub path: String,
    pub action: String,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub synced: Vec<SyncedItem>,
    pub failed: Vec<FailedItem>,
    pub skipped: usize,
    pub flagged_for_review: Vec<StructureDifference>,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
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
    Completed,
    Failed,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Initializing => "initializing",
            ExecutionPhase::Scanning => "scanning",
            ExecutionPhase::Classifying => "classifying",
            ExecutionPhase::CreatingDirectories => "creating_directories",
            ExecutionPhase::CreatingBackup => "creating_backup",
            ExecutionPhase::MovingFiles => "moving_files",
            ExecutionPhase::SettingPermissions => "setting_permissions",
            ExecutionPhase::Syncing => "syncing",
            ExecutionPhase::Validating => "validating",
            ExecutionPhase::GeneratingReport => "generating_report",
            ExecutionPhase::Completed => "completed",
            ExecutionPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Full,
    ScanOnly,
    ClassifyOnly,
    MoveOnly,
    SyncOnly,
}

#[derive(Debug, Clone)]
pub struct ExecutionProgress {
    pub execution_id: String,
    pub current_phase: ExecutionPhase,
    pub overall_progress: f64,
    pub phase_progress: f64,
    pub processed_files: usize,
    pub total_files: usize,
    pub current_file: Option<String>,
    pub started_at: DateTime<Utc>,
    pub error_count: usize,
    pub warning_count: usize,
}

#[derive(Debug, Clone)]
pub struct ExecutionError {
    pub phase: ExecutionPhase,
    pub environment: Option<Environment>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentSummary {
    pub scanned_files: usize,
    pub classified_files: usize,
    pub moved_files: usize,
    pub failed_moves: usize,
    pub permission_updates: usize,
    pub backup_id: Option<String>,
    pub errors: usize,
}

#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub success: bool,
    pub dry_run: bool,
    pub mode: ExecutionMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_phase: ExecutionPhase,
    pub local: EnvironmentSummary,
    pub remote: EnvironmentSummary,
    pub comparison: Option<StructureComparison>,
    pub sync: Option<SyncReport>,
    pub errors: Vec<ExecutionError>,
    pub warnings: Vec<String>,
    pub reports: Vec<GeneratedReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_detection_uses_relative_path() {
        let mut info = FileInfo {
            path: "/tmp/root/a.txt".into(),
            name: "a.txt".into(),
            extension: "txt".into(),
            size: 1,
            permissions: "644".into(),
            modified: Utc::now(),
            environment: Environment::Local,
            relative_path: "a.txt".into(),
            is_directory: false,
            is_hidden: false,
            content_preview: None,
        };
        assert!(info.is_flat());

        info.relative_path = "sub/a.txt".into();
        assert!(!info.is_flat());
    }

    #[test]
    fn phase_names_match_wire_format() {
        assert_eq!(ExecutionPhase::CreatingBackup.as_str(), "creating_backup");
        assert_eq!(ExecutionPhase::MovingFiles.as_str(), "moving_files");
    }
}
