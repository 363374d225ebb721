mod local;
mod remote;

pub use local::LocalScanner;
pub use remote::RemoteScanner;

use crate::error::Result;
use crate::model::{FileInfo, FileType, FlatFileReport};
use chrono::Utc;
use std::collections::HashMap;

/// Directories never descended into (or listed) by either scanner variant.
/// Hidden directories are denied as well, independent of this list.
pub const DENY_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".svn",
    ".hg",
    "target",
    "dist",
    "build",
    "cdk.out",
    "__pycache__",
    ".cache",
];

/// Extensions whose small files get a content preview at scan time.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "sh", "bash", "py", "js", "ts", "json", "yaml", "yml", "toml", "ini", "conf",
    "cfg", "env", "csv", "log", "xml", "html",
];

/// Inventories files under a root in one environment.
pub trait Scanner: Send + Sync {
    /// Scan `root`. With `flat_only`, only entries directly under the root
    /// are returned; subtrees are skipped, not recursed into.
    ///
    /// A failure on an individual file is logged and swallowed; a scan never
    /// aborts because one file is unreadable.
    fn scan(&self, root: &str, flat_only: bool) -> Result<Vec<FileInfo>>;

    fn environment(&self) -> crate::model::Environment;

    /// Survey the flat files under `root` for the scan-only report.
    fn detect_flat_files(&self, root: &str, large_file_bytes: u64) -> Result<FlatFileReport> {
        let files = self.scan(root, true)?;
        Ok(build_flat_report(
            self.environment(),
            root,
            files,
            large_file_bytes,
        ))
    }
}

pub(crate) fn is_denied_dir(name: &str) -> bool {
    name.starts_with('.') || DENY_DIRS.contains(&name)
}

pub(crate) fn is_text_extension(ext: &str) -> bool {
    TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

pub(crate) fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

const SUSPICIOUS_TOKENS: &[&str] = &["secret", "password", "credential", "token", "private"];
const SUSPICIOUS_EXTENSIONS: &[&str] = &["pem", "key", "p12", "pfx"];

fn build_flat_report(
    environment: crate::model::Environment,
    root: &str,
    files: Vec<FileInfo>,
    large_file_bytes: u64,
) -> FlatFileReport {
    let mut files_by_type: HashMap<FileType, Vec<FileInfo>> = HashMap::new();
    let mut suspicious = Vec::new();
    let mut large = Vec::new();

    for file in &files {
        let lower = file.name.to_ascii_lowercase();
        if SUSPICIOUS_TOKENS.iter().any(|t| lower.contains(t))
            || SUSPICIOUS_EXTENSIONS.contains(&file.extension.as_str())
        {
            suspicious.push(file.clone());
        }
        if file.size > large_file_bytes {
            large.push(file.clone());
        }
        files_by_type
            .entry(crate::classify::guess_type(file))
            .or_default()
            .push(file.clone());
    }

    FlatFileReport {
        environment,
        scan_path: root.to_string(),
        total_files: files.len(),
        files_by_type,
        suspicious_files: suspicious,
        large_files: large,
        scanned_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_covers_hidden_dirs() {
        assert!(is_denied_dir(".git"));
        assert!(is_denied_dir(".anything"));
        assert!(is_denied_dir("node_modules"));
        assert!(!is_denied_dir("src"));
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(extension_of("a.tar.gz"), "gz");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".env"), "");
        assert_eq!(extension_of("UPPER.SH"), "sh");
    }
}
