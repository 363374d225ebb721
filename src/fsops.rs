//! Environment-dispatched filesystem primitives.
//!
//! The engine touches two filesystems: the local one through `std::fs`, and
//! the remote one through shell commands over a [`CommandChannel`]. `EnvFs`
//! resolves that split once at construction; everything built on top of it
//! (directory creation, permissions, sync) stays monomorphic at the call site.

use crate::error::{Error, Result};
use crate::model::Environment;
use crate::remote::{commands, CommandChannel};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub enum EnvFs {
    Local,
    Remote(Arc<dyn CommandChannel>),
}

impl EnvFs {
    pub fn environment(&self) -> Environment {
        match self {
            EnvFs::Local => Environment::Local,
            EnvFs::Remote(_) => Environment::Remote,
        }
    }

    pub fn mkdir_p(&self, path: &str) -> Result<()> {
        match self {
            EnvFs::Local => {
                fs::create_dir_all(path)?;
                Ok(())
            }
            EnvFs::Remote(channel) => {
                channel.execute(&commands::mkdir_p(path))?;
                Ok(())
            }
        }
    }

    pub fn chmod(&self, path: &str, mode: &str) -> Result<()> {
        match self {
            EnvFs::Local => {
                let bits = parse_octal(mode)?;
                fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
                Ok(())
            }
            EnvFs::Remote(channel) => {
                channel.execute(&commands::chmod(mode, path))?;
                Ok(())
            }
        }
    }

    /// Current octal permission string of a path, e.g. "644".
    pub fn permissions(&self, path: &str) -> Result<String> {
        match self {
            EnvFs::Local => {
                let meta = fs::metadata(path)?;
                Ok(format!("{:o}", meta.permissions().mode() & 0o777))
            }
            EnvFs::Remote(channel) => {
                let out = channel.execute(&commands::stat_file(path))?;
                let line = out.stdout.trim();
                // size|mtime|perms|type|name
                line.splitn(5, '|')
                    .nth(2)
                    .map(str::to_string)
                    .ok_or_else(|| Error::Other(format!("unparseable stat output: {line}")))
            }
        }
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        match self {
            EnvFs::Local => Ok(Path::new(path).exists()),
            EnvFs::Remote(channel) => {
                let out = channel.execute(&commands::file_exists(path))?;
                Ok(out.stdout.trim() == "yes")
            }
        }
    }

    pub fn file_size(&self, path: &str) -> Result<u64> {
        match self {
            EnvFs::Local => Ok(fs::metadata(path)?.len()),
            EnvFs::Remote(channel) => {
                let out = channel.execute(&commands::file_size(path))?;
                out.stdout
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| Error::Other(format!("unparseable size for {path}: {e}")))
            }
        }
    }

    pub fn copy_file(&self, source: &str, target: &str) -> Result<()> {
        match self {
            EnvFs::Local => {
                if let Some(parent) = Path::new(target).parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(source, target)?;
                Ok(())
            }
            EnvFs::Remote(channel) => {
                if let Some((parent, _)) = target.rsplit_once('/') {
                    channel.execute(&commands::mkdir_p(parent))?;
                }
                channel.execute(&commands::copy_file(source, target))?;
                Ok(())
            }
        }
    }

    pub fn move_file(&self, source: &str, target: &str) -> Result<()> {
        match self {
            EnvFs::Local => {
                if let Some(parent) = Path::new(target).parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(source, target)?;
                Ok(())
            }
            EnvFs::Remote(channel) => {
                if let Some((parent, _)) = target.rsplit_once('/') {
                    channel.execute(&commands::mkdir_p(parent))?;
                }
                channel.execute(&commands::move_file(source, target))?;
                Ok(())
            }
        }
    }

    pub fn remove_file(&self, path: &str) -> Result<()> {
        match self {
            EnvFs::Local => {
                fs::remove_file(path)?;
                Ok(())
            }
            EnvFs::Remote(channel) => {
                channel.execute(&commands::remove_file(path))?;
                Ok(())
            }
        }
    }

    pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
        match self {
            EnvFs::Local => {
                if let Some(parent) = Path::new(path).parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, content)?;
                Ok(())
            }
            EnvFs::Remote(channel) => {
                channel.execute(&commands::write_file(path, content))?;
                Ok(())
            }
        }
    }

    /// Content checksum. Local files hash with blake3; remote files hash with
    /// `sha256sum` on the remote side. Checksums are only ever compared
    /// against checksums produced by the same environment.
    pub fn checksum(&self, path: &str) -> Result<String> {
        match self {
            EnvFs::Local => local_blake3(path),
            EnvFs::Remote(channel) => {
                let out = channel.execute(&commands::checksum(path))?;
                out.stdout
                    .split_whitespace()
                    .next()
                    .map(str::to_string)
                    .ok_or_else(|| Error::Other(format!("empty checksum output for {path}")))
            }
        }
    }
}

pub fn parse_octal(mode: &str) -> Result<u32> {
    u32::from_str_radix(mode, 8)
        .map_err(|e| Error::Other(format!("invalid octal mode '{mode}': {e}")))
}

/// Streaming blake3 of a local file.
pub fn local_blake3(path: &str) -> Result<String> {
    use std::io::Read;

    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_checksum_is_stable() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("f.txt");
        fs::write(&path, b"content").unwrap();

        let a = local_blake3(path.to_str().unwrap()).unwrap();
        let b = local_blake3(path.to_str().unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn local_chmod_and_permissions_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("x.sh");
        fs::write(&path, "#!/bin/sh\n").unwrap();

        let fsops = EnvFs::Local;
        let p = path.to_str().unwrap();
        fsops.chmod(p, "755").unwrap();
        assert_eq!(fsops.permissions(p).unwrap(), "755");
        fsops.chmod(p, "600").unwrap();
        assert_eq!(fsops.permissions(p).unwrap(), "600");
    }

    #[test]
    fn parse_octal_rejects_garbage() {
        assert!(parse_octal("7z5").is_err());
        assert_eq!(parse_octal("644").unwrap(), 0o644);
    }
}
