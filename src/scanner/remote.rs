use super::{extension_of, is_text_extension};
use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::model::{Environment, FileInfo};
use crate::remote::{commands, CommandChannel};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

pub struct RemoteScanner {
    channel: Arc<dyn CommandChannel>,
    config: ScanConfig,
}

impl RemoteScanner {
    pub fn new(channel: Arc<dyn CommandChannel>, config: ScanConfig) -> Self {
        Self { channel, config }
    }

    /// One stat round trip per file; preview adds a second for small text files.
    fn build_file_info(&self, root: &str, path: &str) -> Result<FileInfo> {
        let out = self.channel.execute(&commands::stat_file(path))?;
        let line = out.stdout.trim();
        // size|mtime|perms|type|name, name last so it may contain '|'
        let mut parts = line.splitn(5, '|');
        let size: u64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Other(format!("unparseable stat for {path}: {line}")))?;
        let mtime: i64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let permissions = parts.next().unwrap_or("644").to_string();
        let kind = parts.next().unwrap_or("regular file");

        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let extension = extension_of(&name);
        let relative_path = path
            .strip_prefix(root)
            .map(|p| p.trim_start_matches('/').to_string())
            .unwrap_or_else(|| path.to_string());

        let modified: DateTime<Utc> = DateTime::from_timestamp(mtime, 0).unwrap_or_else(Utc::now);

        let content_preview = if size <= self.config.preview_max_bytes
            && is_text_extension(&extension)
        {
            self.channel
                .execute(&commands::read_head(path, self.config.preview_max_bytes))
                .ok()
                .map(|o| o.stdout)
        } else {
            None
        };

        Ok(FileInfo {
            path: path.to_string(),
            name: name.clone(),
            extension,
            size,
            permissions,
            modified,
            environment: Environment::Remote,
            relative_path,
            is_directory: kind.contains("directory"),
            is_hidden: name.starts_with('.'),
            content_preview,
        })
    }
}

impl super::Scanner for RemoteScanner {
    fn scan(&self, root: &str, flat_only: bool) -> Result<Vec<FileInfo>> {
        let list_cmd = if flat_only {
            commands::list_flat_files(root)
        } else {
            commands::list_files_recursive(root)
        };
        let out = self
            .channel
            .execute(&list_cmd)
            .map_err(|e| Error::ScanFailed {
                path: root.to_string(),
                message: e.to_string(),
            })?;

        let prefix = format!("{}/", root.trim_end_matches('/'));
        let mut files = Vec::new();
        for path in out.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(rel) = path.strip_prefix(&prefix) {
                if commands::is_excluded_file(rel) {
                    continue;
                }
            }
            match self.build_file_info(root, path) {
                Ok(info) => files.push(info),
                Err(e) => warn!("Skipping remote file {}: {}", path, e),
            }
        }
        Ok(files)
    }

    fn environment(&self) -> Environment {
        Environment::Remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CommandOutput, LocalShellChannel};
    use crate::scanner::Scanner;
    use std::fs;
    use tempfile::tempdir;

    fn scanner() -> RemoteScanner {
        RemoteScanner::new(Arc::new(LocalShellChannel::new()), ScanConfig::default())
    }

    #[test]
    fn flat_scan_via_shell_channel() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.sh"), "#!/bin/sh\n").unwrap();
        fs::write(tmp.path().join(".hidden"), "x").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/deep.txt"), "x").unwrap();

        let files = scanner().scan(tmp.path().to_str().unwrap(), true).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.sh");
        assert_eq!(files[0].environment, Environment::Remote);
        assert_eq!(files[0].size, 10);
    }

    #[test]
    fn recursive_scan_skips_deny_listed_trees() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.sh"), "#!/bin/sh\n").unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/deep.txt"), "x").unwrap();
        fs::create_dir_all(tmp.path().join("dist")).unwrap();
        fs::write(tmp.path().join("dist/bundle.js"), "artifact").unwrap();
        fs::create_dir_all(tmp.path().join("__pycache__")).unwrap();
        fs::write(tmp.path().join("__pycache__/m.pyc"), "b").unwrap();

        let mut names: Vec<String> = scanner()
            .scan(tmp.path().to_str().unwrap(), false)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(names, ["a.sh", "deep.txt"]);
    }

    #[test]
    fn listing_failure_is_a_scan_error() {
        struct DeadChannel;
        impl CommandChannel for DeadChannel {
            fn execute(&self, _command: &str) -> crate::error::Result<CommandOutput> {
                Err(Error::ConnectionFailed {
                    host: "test-host".to_string(),
                    message: "channel down".to_string(),
                })
            }
            fn upload(&self, _local: &std::path::Path, _remote: &str) -> crate::error::Result<()> {
                unreachable!()
            }
            fn download(&self, _remote: &str, _local: &std::path::Path) -> crate::error::Result<()> {
                unreachable!()
            }
            fn endpoint(&self) -> String {
                "test-host".to_string()
            }
        }

        let scanner = RemoteScanner::new(Arc::new(DeadChannel), ScanConfig::default());
        assert!(matches!(
            scanner.scan("/anywhere", true),
            Err(Error::ScanFailed { .. })
        ));
    }

    #[test]
    fn scan_survives_a_path_with_quotes() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("it's here.txt"), "quoted").unwrap();

        let files = scanner().scan(tmp.path().to_str().unwrap(), true).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "it's here.txt");
        assert_eq!(files[0].size, 6);
    }
}
