//! Safe builders for every shell command the engine sends over a
//! [`CommandChannel`](super::CommandChannel).
//!
//! All dynamic path segments pass through [`shell_escape`] here, so no call
//! site ever interpolates a raw path into a command string.

use crate::scanner::is_denied_dir;

/// Wrap a value in single quotes, escaping embedded single quotes with the
/// `'\''` idiom. Safe against any byte content the shell would otherwise
/// interpret.
pub fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// `size|mtime_epoch|octal_perms|type|name` for a single path. The name comes
/// last so an embedded separator in a filename cannot shift the numeric
/// fields; callers split from the left a bounded number of times.
pub fn stat_file(path: &str) -> String {
    format!("stat -c '%s|%Y|%a|%F|%n' {}", shell_escape(path))
}

/// List regular files directly under `root` (flat scan). Hidden files are
/// excluded, matching local scan semantics.
pub fn list_flat_files(root: &str) -> String {
    format!(
        "find {} -maxdepth 1 -type f ! -name '.*' 2>/dev/null | head -1000",
        shell_escape(root)
    )
}

/// Recursively list files under `root`. The heaviest deny-listed trees are
/// pruned shell-side to cap traffic; the authoritative deny filtering happens
/// in Rust through [`is_excluded_file`] on the root-relative path, since the
/// root itself may legitimately live inside a dot-directory.
pub fn list_files_recursive(root: &str) -> String {
    format!(
        "find {} -type f -not -path '*/node_modules/*' -not -path '*/.git/*' \
         -not -path '*/target/*' -not -path '*/cdk.out/*' \
         2>/dev/null | head -10000",
        shell_escape(root)
    )
}

/// Recursively list directories under `root` with their octal permissions,
/// one `perms|path` pair per line. Filtering is the caller's job through
/// [`is_excluded_dir`], as with [`list_files_recursive`].
pub fn list_dirs_recursive(root: &str) -> String {
    format!(
        "find {} -type d -not -path '*/node_modules/*' -not -path '*/.git/*' \
         -not -path '*/target/*' -not -path '*/cdk.out/*' \
         -exec stat -c '%a|%n' {{}} \\; 2>/dev/null",
        shell_escape(root)
    )
}

/// True when any component of a root-relative directory path is hidden or on
/// the scanner deny list. Applying the same predicate to remote listings as
/// the local walker uses keeps the two inventories symmetric: identical trees
/// must compare identical.
pub fn is_excluded_dir(relative: &str) -> bool {
    relative.split('/').any(is_denied_dir)
}

/// File-path variant: parent components are checked as directories, the
/// basename only for hiddenness.
pub fn is_excluded_file(relative: &str) -> bool {
    match relative.rsplit_once('/') {
        Some((dirs, name)) => dirs.split('/').any(is_denied_dir) || name.starts_with('.'),
        None => relative.starts_with('.'),
    }
}

pub fn mkdir_p(path: &str) -> String {
    format!("mkdir -p {}", shell_escape(path))
}

pub fn chmod(mode: &str, path: &str) -> String {
    format!("chmod {} {}", shell_escape(mode), shell_escape(path))
}

pub fn copy_file(source: &str, target: &str) -> String {
    format!("cp -p {} {}", shell_escape(source), shell_escape(target))
}

pub fn move_file(source: &str, target: &str) -> String {
    format!("mv {} {}", shell_escape(source), shell_escape(target))
}

pub fn remove_file(path: &str) -> String {
    format!("rm -f {}", shell_escape(path))
}

pub fn remove_dir(path: &str) -> String {
    format!("rm -rf {}", shell_escape(path))
}

/// SHA-256 of a file; stdout is `<hex>  <path>`.
pub fn checksum(path: &str) -> String {
    format!("sha256sum {}", shell_escape(path))
}

pub fn file_exists(path: &str) -> String {
    format!("test -e {} && echo yes || echo no", shell_escape(path))
}

pub fn file_size(path: &str) -> String {
    format!("stat -c '%s' {}", shell_escape(path))
}

pub fn read_head(path: &str, bytes: u64) -> String {
    format!("head -c {} {}", bytes, shell_escape(path))
}

pub fn read_file(path: &str) -> String {
    format!("cat {}", shell_escape(path))
}

/// Write literal content to a file, creating parent directories first.
pub fn write_file(path: &str, content: &str) -> String {
    let parent = parent_of(path);
    format!(
        "mkdir -p {} && printf '%s' {} > {}",
        shell_escape(&parent),
        shell_escape(content),
        shell_escape(path)
    )
}

/// Pack a directory into `<dir>.tar.gz` next to it and remove the original.
pub fn archive_dir(dir: &str) -> String {
    let parent = parent_of(dir);
    let name = basename_of(dir);
    format!(
        "cd {} && tar czf {}.tar.gz {} && rm -rf {}",
        shell_escape(&parent),
        shell_escape(&name),
        shell_escape(&name),
        shell_escape(&name)
    )
}

/// Inverse of [`archive_dir`].
pub fn unarchive_dir(dir: &str) -> String {
    let parent = parent_of(dir);
    let name = basename_of(dir);
    format!(
        "cd {} && tar xzf {}.tar.gz && rm -f {}.tar.gz",
        shell_escape(&parent),
        shell_escape(&name),
        shell_escape(&name)
    )
}

/// Percentage of disk used for the filesystem holding `path`.
pub fn disk_use_percent(path: &str) -> String {
    format!(
        "df -P {} | tail -1 | awk '{{print $5}}' | tr -d '%'",
        shell_escape(path)
    )
}

/// Epoch mtime of a path, for retention checks.
pub fn mtime_epoch(path: &str) -> String {
    format!("stat -c '%Y' {}", shell_escape(path))
}

/// List immediate subdirectory names of `root`, one per line.
pub fn list_subdirs(root: &str) -> String {
    format!(
        "find {} -mindepth 1 -maxdepth 1 -type d -exec basename {{}} \\; 2>/dev/null",
        shell_escape(root)
    )
}

pub fn connectivity_probe() -> String {
    "echo connection_test".to_string()
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        _ => "/".to_string(),
    }
}

fn basename_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => path.to_string(),
    }
}
