//! Pure file classification: extension, name tokens, and content preview in,
//! `(type, confidence, target directory, review flag)` out. No side effects,
//! safe to call in parallel.

use crate::model::{ClassificationResult, FileInfo, FileType};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashMap;

const SCRIPT_EXTENSIONS: &[&str] = &["sh", "bash", "zsh", "py", "pl", "rb", "js", "mjs", "ts"];
const DOC_EXTENSIONS: &[&str] = &["md", "txt", "rst", "adoc", "pdf", "html"];
const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "conf", "cfg", "env", "pem", "key",
];
const LOG_EXTENSIONS: &[&str] = &["log"];

const SECRET_TOKENS: &[&str] = &["secret", "credential", "password", "token", "key"];

/// Cheap extension-only type guess, used for flat-file survey grouping.
pub fn guess_type(file: &FileInfo) -> FileType {
    let ext = file.extension.as_str();
    let lower = file.name.to_ascii_lowercase();
    if lower.starts_with("test_") || lower.contains(".test.") || lower.contains(".spec.") {
        FileType::Test
    } else if LOG_EXTENSIONS.contains(&ext) {
        FileType::Log
    } else if SCRIPT_EXTENSIONS.contains(&ext) {
        FileType::Script
    } else if DOC_EXTENSIONS.contains(&ext) {
        FileType::Document
    } else if CONFIG_EXTENSIONS.contains(&ext) {
        FileType::Config
    } else {
        FileType::Other
    }
}

/// Aggregate view of one environment's classification pass.
#[derive(Debug, Clone, Default)]
pub struct ClassificationStats {
    pub total: usize,
    pub counts_by_type: HashMap<FileType, usize>,
    pub review_count: usize,
    pub average_confidence: f64,
}

pub struct Classifier {
    confidence_threshold: f64,
}

impl Classifier {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn classify(&self, file: &FileInfo) -> ClassificationResult {
        let mut reasoning = Vec::new();
        let (file_type, mut confidence, applied_rule) = self.match_rules(file, &mut reasoning);

        confidence = self.adjust_confidence(confidence, file, file_type, &mut reasoning);
        let target_path = target_directory(file, file_type);
        let requires_review = confidence < self.confidence_threshold;
        if requires_review {
            reasoning.push(format!(
                "confidence {confidence:.2} below threshold {:.2}",
                self.confidence_threshold
            ));
        }

        ClassificationResult {
            file: file.clone(),
            file_type,
            target_path,
            confidence,
            reasoning,
            requires_review,
            applied_rule,
            classified_at: Utc::now(),
        }
    }

    pub fn classify_all(&self, files: &[FileInfo]) -> Vec<ClassificationResult> {
        files.par_iter().map(|f| self.classify(f)).collect()
    }

    pub fn stats(results: &[ClassificationResult]) -> ClassificationStats {
        let mut counts_by_type = HashMap::new();
        let mut review_count = 0;
        let mut confidence_sum = 0.0;
        for r in results {
            *counts_by_type.entry(r.file_type).or_insert(0usize) += 1;
            if r.requires_review {
                review_count += 1;
            }
            confidence_sum += r.confidence;
        }
        let average_confidence = if results.is_empty() {
            0.0
        } else {
            confidence_sum / results.len() as f64
        };
        ClassificationStats {
            total: results.len(),
            counts_by_type,
            review_count,
            average_confidence,
        }
    }

    fn match_rules(&self, file: &FileInfo, reasoning: &mut Vec<String>) -> (FileType, f64, String) {
        let ext = file.extension.as_str();
        let lower = file.name.to_ascii_lowercase();

        // Test naming wins over the extension rules: test_runner.py is a test,
        // not a utility script.
        if lower.starts_with("test_") || lower.contains(".test.") || lower.contains(".spec.") {
            reasoning.push(format!("test naming convention: {}", file.name));
            return (FileType::Test, 0.9, "name:test".to_string());
        }
        if LOG_EXTENSIONS.contains(&ext) {
            reasoning.push(format!(".{ext} extension"));
            return (FileType::Log, 0.95, "ext:log".to_string());
        }
        if SCRIPT_EXTENSIONS.contains(&ext) {
            reasoning.push(format!(".{ext} extension"));
            return (FileType::Script, 0.9, "ext:script".to_string());
        }
        if DOC_EXTENSIONS.contains(&ext) {
            reasoning.push(format!(".{ext} extension"));
            return (FileType::Document, 0.9, "ext:document".to_string());
        }
        if CONFIG_EXTENSIONS.contains(&ext) {
            reasoning.push(format!(".{ext} extension"));
            return (FileType::Config, 0.85, "ext:config".to_string());
        }
        if let Some(preview) = &file.content_preview {
            if preview.starts_with("#!") {
                reasoning.push("shebang in content".to_string());
                return (FileType::Script, 0.7, "content:shebang".to_string());
            }
        }
        reasoning.push("no rule matched".to_string());
        (FileType::Other, 0.3, "fallback".to_string())
    }

    fn adjust_confidence(
        &self,
        base: f64,
        file: &FileInfo,
        file_type: FileType,
        reasoning: &mut Vec<String>,
    ) -> f64 {
        let mut confidence = base;
        let lower = file.name.to_ascii_lowercase();

        if file_type == FileType::Script {
            if let Some(preview) = &file.content_preview {
                if preview.starts_with("#!") {
                    confidence += 0.05;
                    reasoning.push("shebang corroborates script type".to_string());
                }
            }
            if file.permissions.starts_with('7') {
                confidence += 0.05;
                reasoning.push("executable permission bits".to_string());
            }
        }
        if file_type == FileType::Config && SECRET_TOKENS.iter().any(|t| lower.contains(t)) {
            reasoning.push("sensitive name token".to_string());
        }

        confidence.min(1.0)
    }
}

/// Canonical target directory for a classified file, relative to the
/// organization root. Always one of the canonical layout paths.
pub fn target_directory(file: &FileInfo, file_type: FileType) -> String {
    let lower = file.name.to_ascii_lowercase();
    let has = |tokens: &[&str]| tokens.iter().any(|t| lower.contains(t));

    let dir = match file_type {
        FileType::Script => {
            if has(&["deploy", "release", "install"]) {
                "development/scripts/deployment"
            } else if has(&["analy", "report", "stats"]) {
                "development/scripts/analysis"
            } else if has(&["clean", "fix", "repair", "maint", "migrate"]) {
                "development/scripts/maintenance"
            } else {
                "development/scripts/utilities"
            }
        }
        FileType::Document => {
            if has(&["troubleshoot", "debug", "issue"]) {
                "docs/troubleshooting"
            } else if has(&["deploy", "release"]) {
                "docs/deployment"
            } else if has(&["report", "summary"]) {
                "development/docs/reports"
            } else {
                "docs/guides"
            }
        }
        FileType::Config => {
            if has(SECRET_TOKENS) {
                "development/configs/secrets"
            } else if has(&["sample", "example", "template"]) {
                "config/samples"
            } else if has(&["env", "environment", "stage", "prod", "dev"]) {
                "development/configs/environments"
            } else {
                "config"
            }
        }
        FileType::Test => {
            if has(&["payload", "fixture"]) {
                "tests/payloads"
            } else if has(&["integration", "e2e"]) {
                "tests/integration"
            } else {
                "tests/unit"
            }
        }
        FileType::Log => {
            if has(&["deploy"]) {
                "development/logs/deployment"
            } else if has(&["analy"]) {
                "development/logs/analysis"
            } else {
                "development/logs/organization"
            }
        }
        FileType::Other => "archive/unknown",
    };
    dir.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Environment;

    fn file(name: &str, preview: Option<&str>) -> FileInfo {
        FileInfo {
            path: format!("/root/{name}"),
            name: name.to_string(),
            extension: match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
                _ => String::new(),
            },
            size: 10,
            permissions: "644".to_string(),
            modified: Utc::now(),
            environment: Environment::Local,
            relative_path: name.to_string(),
            is_directory: false,
            is_hidden: false,
            content_preview: preview.map(str::to_string),
        }
    }

    #[test]
    fn classifies_by_extension() {
        let c = Classifier::new(0.6);
        assert_eq!(c.classify(&file("deploy.sh", None)).file_type, FileType::Script);
        assert_eq!(c.classify(&file("readme.md", None)).file_type, FileType::Document);
        assert_eq!(c.classify(&file("app.yaml", None)).file_type, FileType::Config);
        assert_eq!(c.classify(&file("out.log", None)).file_type, FileType::Log);
    }

    #[test]
    fn test_naming_beats_script_extension() {
        let c = Classifier::new(0.6);
        let r = c.classify(&file("test_runner.py", None));
        assert_eq!(r.file_type, FileType::Test);
        assert_eq!(r.applied_rule, "name:test");
    }

    #[test]
    fn unknown_files_require_review() {
        let c = Classifier::new(0.6);
        let r = c.classify(&file("blob.xyz", None));
        assert_eq!(r.file_type, FileType::Other);
        assert!(r.requires_review);
        assert_eq!(r.target_path, "archive/unknown");
    }

    #[test]
    fn shebang_rescues_extensionless_scripts() {
        let c = Classifier::new(0.6);
        let r = c.classify(&file("run-things", Some("#!/bin/bash\necho hi\n")));
        assert_eq!(r.file_type, FileType::Script);
        assert!(!r.requires_review);
    }

    #[test]
    fn secret_config_targets_secrets_dir() {
        let c = Classifier::new(0.6);
        let r = c.classify(&file("db-credentials.json", None));
        assert_eq!(r.file_type, FileType::Config);
        assert_eq!(r.target_path, "development/configs/secrets");
    }

    #[test]
    fn stats_aggregate_counts_and_confidence() {
        let c = Classifier::new(0.6);
        let results = c.classify_all(&[
            file("deploy.sh", None),
            file("cleanup.sh", None),
            file("blob.xyz", None),
        ]);
        let stats = Classifier::stats(&results);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.counts_by_type[&FileType::Script], 2);
        assert_eq!(stats.counts_by_type[&FileType::Other], 1);
        assert_eq!(stats.review_count, 1);
        assert!(stats.average_confidence > 0.0 && stats.average_confidence < 1.0);
    }

    #[test]
    fn classification_is_deterministic() {
        let c = Classifier::new(0.6);
        let f = file("deploy.sh", None);
        let a = c.classify(&f);
        let b = c.classify(&f);
        assert_eq!(a.file_type, b.file_type);
        assert_eq!(a.target_path, b.target_path);
        assert!((a.confidence - b.confidence).abs() < f64::EPSILON);
    }
}
