use super::{extension_of, is_denied_dir, is_text_extension};
use crate::config::ScanConfig;
use crate::error::Result;
use crate::model::{Environment, FileInfo};
use chrono::{DateTime, Utc};
use glob::Pattern;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

pub struct LocalScanner {
    config: ScanConfig,
    exclude_patterns: Vec<Pattern>,
}

impl LocalScanner {
    pub fn new(config: ScanConfig) -> Self {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .filter_map(|g| match Pattern::new(g) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("Invalid exclude pattern '{}': {}", g, e);
                    None
                }
            })
            .collect();
        Self {
            config,
            exclude_patterns,
        }
    }

    fn excluded(&self, path: &Path) -> bool {
        self.exclude_patterns.iter().any(|p| p.matches_path(path))
    }

    fn build_file_info(&self, root: &Path, path: &Path) -> Result<FileInfo> {
        let metadata = fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = extension_of(&name);

        let relative_path = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string_lossy().into_owned());

        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let size = metadata.len();
        let content_preview = if size <= self.config.preview_max_bytes
            && is_text_extension(&extension)
        {
            fs::read_to_string(path).ok()
        } else {
            None
        };

        Ok(FileInfo {
            path: path.to_string_lossy().into_owned(),
            name: name.clone(),
            extension,
            size,
            permissions: format!("{:o}", metadata.permissions().mode() & 0o777),
            modified,
            environment: Environment::Local,
            relative_path,
            is_directory: metadata.is_dir(),
            is_hidden: name.starts_with('.'),
            content_preview,
        })
    }
}

impl super::Scanner for LocalScanner {
    fn scan(&self, root: &str, flat_only: bool) -> Result<Vec<FileInfo>> {
        let root_path = Path::new(root);
        let mut files = Vec::new();

        let max_depth = if flat_only { 1 } else { usize::MAX };
        let walker = WalkDir::new(root_path)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_dir() {
                    !is_denied_dir(&name)
                } else {
                    !name.starts_with('.')
                }
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.excluded(path) {
                continue;
            }
            match self.build_file_info(root_path, path) {
                Ok(info) => files.push(info),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        Ok(files)
    }

    fn environment(&self) -> Environment {
        Environment::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;
    use tempfile::tempdir;

    fn scanner() -> LocalScanner {
        LocalScanner::new(ScanConfig::default())
    }

    #[test]
    fn flat_scan_skips_subdirectories() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("top.txt"), "top").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/nested.txt"), "nested").unwrap();

        let files = scanner().scan(tmp.path().to_str().unwrap(), true).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "top.txt");
        assert!(files[0].is_flat());
    }

    #[test]
    fn recursive_scan_honors_deny_list() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("keep.txt"), "x").unwrap();
        fs::create_dir(tmp.path().join("node_modules")).unwrap();
        fs::write(tmp.path().join("node_modules/skip.js"), "x").unwrap();
        fs::create_dir(tmp.path().join(".hidden")).unwrap();
        fs::write(tmp.path().join(".hidden/skip.txt"), "x").unwrap();
        fs::create_dir(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/lib.rs"), "x").unwrap();

        let files = scanner().scan(tmp.path().to_str().unwrap(), false).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"keep.txt"));
        assert!(names.contains(&"lib.rs"));
        assert!(!names.contains(&"skip.js"));
        assert!(!names.contains(&"skip.txt"));
    }

    #[test]
    fn small_text_files_capture_preview() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("note.md"), "hello preview").unwrap();
        let big = "x".repeat(10_000);
        fs::write(tmp.path().join("big.md"), &big).unwrap();

        let files = scanner().scan(tmp.path().to_str().unwrap(), true).unwrap();
        let note = files.iter().find(|f| f.name == "note.md").unwrap();
        assert_eq!(note.content_preview.as_deref(), Some("hello preview"));
        let big = files.iter().find(|f| f.name == "big.md").unwrap();
        assert!(big.content_preview.is_none());
    }
}
