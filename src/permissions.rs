//! Computes and applies the permission bits classified files should carry.

use crate::error::{Error, Result};
use crate::fsops::EnvFs;
use crate::model::{
    ClassificationResult, FileType, PermissionOutcome, PermissionReport,
};
use tracing::{debug, warn};

struct PermissionRule {
    file_type: FileType,
    permissions: &'static str,
    condition: Option<fn(&str) -> bool>,
}

fn is_script_path(path: &str) -> bool {
    path.ends_with(".sh") || path.ends_with(".py") || path.ends_with(".js")
}

fn is_sensitive_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    ["secret", "credential", "password", "key", ".env"]
        .iter()
        .any(|t| lower.contains(t))
}

/// Most specific rule first; the first match wins, "644" otherwise.
static RULES: &[PermissionRule] = &[
        PermissionRule {
            file_type: FileType::Script,
            permissions: "755",
            condition: Some(is_script_path),
        },
        PermissionRule {
            file_type: FileType::Script,
            permissions: "755",
            condition: None,
        },
        PermissionRule {
            file_type: FileType::Config,
            permissions: "600",
            condition: Some(is_sensitive_path),
        },
        PermissionRule {
            file_type: FileType::Config,
            permissions: "644",
            condition: None,
        },
        PermissionRule {
            file_type: FileType::Document,
            permissions: "644",
            condition: None,
        },
        PermissionRule {
            file_type: FileType::Test,
            permissions: "644",
            condition: None,
        },
        PermissionRule {
            file_type: FileType::Log,
            permissions: "644",
            condition: None,
        },
        PermissionRule {
            file_type: FileType::Other,
            permissions: "644",
            condition: None,
        },
];

/// Target permission bits for a classified file.
pub fn target_permissions(path: &str, file_type: FileType) -> &'static str {
    for rule in RULES {
        if rule.file_type != file_type {
            continue;
        }
        match rule.condition {
            Some(cond) if !cond(path) => continue,
            _ => return rule.permissions,
        }
    }
    "644"
}

pub struct PermissionManager {
    fsops: EnvFs,
}

impl PermissionManager {
    pub fn new(fsops: EnvFs) -> Self {
        Self { fsops }
    }

    /// Apply target permissions to every classified file. Idempotent: a file
    /// already at its target is reported as success with zero mutation.
    pub fn set_permissions(
        &self,
        classifications: &[ClassificationResult],
        dry_run: bool,
    ) -> Result<PermissionReport> {
        let mut outcomes = Vec::with_capacity(classifications.len());

        for classification in classifications {
            let path = classification.file.path.as_str();
            let target = target_permissions(path, classification.file_type);
            outcomes.push(self.apply_one(path, target, dry_run));
        }

        Ok(self.summarize(outcomes))
    }

    /// Report files whose current permissions have drifted from their target.
    pub fn validate_permissions(
        &self,
        classifications: &[ClassificationResult],
    ) -> Result<Vec<PermissionOutcome>> {
        let mut drifted = Vec::new();
        for classification in classifications {
            let path = classification.file.path.as_str();
            let target = target_permissions(path, classification.file_type);
            match self.fsops.permissions(path) {
                Ok(current) if current == target => {}
                Ok(current) => drifted.push(PermissionOutcome {
                    path: path.to_string(),
                    previous: current,
                    target: target.to_string(),
                    changed: false,
                    success: false,
                    error: None,
                }),
                Err(e) => drifted.push(PermissionOutcome {
                    path: path.to_string(),
                    previous: "unknown".to_string(),
                    target: target.to_string(),
                    changed: false,
                    success: false,
                    error: Some(e.to_string()),
                }),
            }
        }
        Ok(drifted)
    }

    /// Fix every drifted file found by [`validate_permissions`].
    pub fn repair_permissions(
        &self,
        classifications: &[ClassificationResult],
    ) -> Result<PermissionReport> {
        let drifted = self.validate_permissions(classifications)?;
        let mut outcomes = Vec::with_capacity(drifted.len());
        for item in drifted {
            outcomes.push(self.apply_one(&item.path, &item.target, false));
        }
        Ok(self.summarize(outcomes))
    }

    fn apply_one(&self, path: &str, target: &str, dry_run: bool) -> PermissionOutcome {
        let previous = match self.fsops.permissions(path) {
            Ok(p) => p,
            Err(e) => {
                warn!("Cannot read permissions for {}: {}", path, e);
                return PermissionOutcome {
                    path: path.to_string(),
                    previous: "unknown".to_string(),
                    target: target.to_string(),
                    changed: false,
                    success: false,
                    error: Some(e.to_string()),
                };
            }
        };

        if previous == target {
            debug!("{} already at {}", path, target);
            return PermissionOutcome {
                path: path.to_string(),
                previous,
                target: target.to_string(),
                changed: false,
                success: true,
                error: None,
            };
        }

        if dry_run {
            return PermissionOutcome {
                path: path.to_string(),
                previous,
                target: target.to_string(),
                changed: false,
                success: true,
                error: None,
            };
        }

        match self.fsops.chmod(path, target) {
            Ok(()) => PermissionOutcome {
                path: path.to_string(),
                previous,
                target: target.to_string(),
                changed: true,
                success: true,
                error: None,
            },
            Err(e) => {
                let err = Error::PermissionFailed {
                    path: path.to_string(),
                    message: e.to_string(),
                };
                PermissionOutcome {
                    path: path.to_string(),
                    previous,
                    target: target.to_string(),
                    changed: false,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    fn summarize(&self, outcomes: Vec<PermissionOutcome>) -> PermissionReport {
        let updated_count = outcomes.iter().filter(|o| o.changed).count();
        let failed_count = outcomes.iter().filter(|o| !o.success).count();
        let unchanged_count = outcomes
            .iter()
            .filter(|o| o.success && !o.changed)
            .count();
        PermissionReport {
            environment: self.fsops.environment(),
            total_files: outcomes.len(),
            updated_count,
            unchanged_count,
            failed_count,
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Environment, FileInfo};
    use chrono::Utc;
    use std::fs;
    use tempfile::tempdir;

    fn classification(path: &str, file_type: FileType) -> ClassificationResult {
        let name = path.rsplit('/').next().unwrap().to_string();
        ClassificationResult {
            file: FileInfo {
                path: path.to_string(),
                name: name.clone(),
                extension: name.rsplit_once('.').map(|(_, e)| e.to_string()).unwrap_or_default(),
                size: 0,
                permissions: "644".to_string(),
                modified: Utc::now(),
                environment: Environment::Local,
                relative_path: name,
                is_directory: false,
                is_hidden: false,
                content_preview: None,
            },
            file_type,
            target_path: String::new(),
            confidence: 1.0,
            reasoning: vec![],
            requires_review: false,
            applied_rule: "test".to_string(),
            classified_at: Utc::now(),
        }
    }

    #[test]
    fn rule_table_targets() {
        assert_eq!(target_permissions("/x/deploy.sh", FileType::Script), "755");
        assert_eq!(target_permissions("/x/secret-db.json", FileType::Config), "600");
        assert_eq!(target_permissions("/x/app.yaml", FileType::Config), "644");
        assert_eq!(target_permissions("/x/readme.md", FileType::Document), "644");
        assert_eq!(target_permissions("/x/blob.bin", FileType::Other), "644");
    }

    #[test]
    fn set_permissions_is_idempotent() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("run.sh");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        let manager = PermissionManager::new(EnvFs::Local);
        let items = vec![classification(path.to_str().unwrap(), FileType::Script)];

        let first = manager.set_permissions(&items, false).unwrap();
        assert!(first.success());
        assert_eq!(first.updated_count, 1);

        let second = manager.set_permissions(&items, false).unwrap();
        assert!(second.success());
        assert_eq!(second.updated_count, 0);
        assert_eq!(second.unchanged_count, 1);
    }

    #[test]
    fn repair_fixes_drift() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("app.yaml");
        fs::write(&path, "k: v\n").unwrap();
        let manager = PermissionManager::new(EnvFs::Local);
        let items = vec![classification(path.to_str().unwrap(), FileType::Config)];

        manager.set_permissions(&items, false).unwrap();
        // Introduce drift.
        EnvFs::Local.chmod(path.to_str().unwrap(), "777").unwrap();
        assert_eq!(manager.validate_permissions(&items).unwrap().len(), 1);

        let report = manager.repair_permissions(&items).unwrap();
        assert_eq!(report.updated_count, 1);
        assert!(manager.validate_permissions(&items).unwrap().is_empty());
    }

    #[test]
    fn dry_run_reports_without_mutating() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("tool.sh");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        EnvFs::Local.chmod(path.to_str().unwrap(), "644").unwrap();

        let manager = PermissionManager::new(EnvFs::Local);
        let items = vec![classification(path.to_str().unwrap(), FileType::Script)];
        let report = manager.set_permissions(&items, true).unwrap();

        assert!(report.success());
        assert_eq!(report.updated_count, 0);
        assert_eq!(EnvFs::Local.permissions(path.to_str().unwrap()).unwrap(), "644");
    }
}
