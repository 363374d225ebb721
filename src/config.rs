use crate::model::SyncDirection;
use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the local environment being organized.
    pub local_root: String,
    /// Root of the remote environment, as an absolute path on the remote host.
    pub remote_root: String,
    /// Where execution report artifacts are written.
    pub output_dir: String,
    /// Log file written alongside stdout output.
    pub log_file: String,
    pub ssh: Option<SshSettings>,
    pub scan: ScanConfig,
    pub classify: ClassifyConfig,
    pub backup: BackupConfig,
    pub mover: MoverConfig,
    pub sync: SyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            local_root: ".".to_string(),
            remote_root: "/home/ec2-user/project".to_string(),
            output_dir: "./organization-reports".to_string(),
            log_file: "./logs/organizer.log".to_string(),
            ssh: None,
            scan: ScanConfig::default(),
            classify: ClassifyConfig::default(),
            backup: BackupConfig::default(),
            mover: MoverConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub host: String,
    pub user: String,
    pub key_path: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: "ec2-user".to_string(),
            key_path: String::new(),
            port: 22,
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Glob patterns excluded in addition to the built-in deny list.
    pub exclude_patterns: Vec<String>,
    /// Files at or below this size with a text extension get a content preview.
    pub preview_max_bytes: u64,
    /// Files above this size are reported as "large" in flat-file reports.
    pub large_file_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            preview_max_bytes: 4096,
            large_file_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Classifications below this confidence are flagged for review.
    pub confidence_threshold: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub local_backup_root: String,
    pub remote_backup_root: String,
    pub max_backup_bytes: u64,
    pub retention_days: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            local_backup_root: "./.organizer-backups".to_string(),
            remote_backup_root: "/tmp/organizer-backups".to_string(),
            max_backup_bytes: 1024 * 1024 * 1024,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MoverConfig {
    pub batch_size: usize,
    pub batch_pause_ms: u64,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub direction: SyncDirection,
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            direction: SyncDirection::Bidirectional,
            max_retries: 3,
        }
    }
}

impl AppConfig {
    /// Load from `Organizer.toml` if present, falling back to defaults.
    pub fn load() -> Result<AppConfig, ConfigError> {
        let builder = Config::builder()
            .add_source(ConfigFile::with_name("Organizer").required(false))
            .build()?;

        builder.try_deserialize::<AppConfig>()
    }
}
