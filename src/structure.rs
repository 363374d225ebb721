//! Materializes the canonical directory layout in one environment.

use crate::error::{Error, Result};
use crate::fsops::EnvFs;
use crate::model::Environment;
use tracing::{debug, info};

/// The fixed, ordered list of relative directories both environments are
/// guaranteed to contain. This is also the contract the structure comparator
/// diffs against.
pub const CANONICAL_LAYOUT: &[&str] = &[
    "development/scripts/deployment",
    "development/scripts/analysis",
    "development/scripts/maintenance",
    "development/scripts/utilities",
    "development/scripts/legacy",
    "development/docs/reports",
    "development/docs/guides",
    "development/docs/legacy",
    "development/configs/environments",
    "development/configs/security",
    "development/configs/secrets",
    "development/configs/legacy",
    "development/logs/deployment",
    "development/logs/analysis",
    "development/logs/maintenance",
    "development/logs/organization",
    "development/temp/working",
    "development/temp/cache",
    "development/temp/build",
    "docs/troubleshooting",
    "docs/deployment",
    "docs/guides",
    "docs/legacy",
    "config/samples",
    "config/legacy",
    "tests/unit",
    "tests/integration",
    "tests/payloads",
    "tests/legacy",
    "archive/legacy-files",
    "archive/old-projects",
    "archive/backup-files",
    "archive/unknown",
];

/// Permission policy for created directories: sensitive paths are owner-only,
/// everything else standard.
pub fn directory_permissions(relative_path: &str) -> &'static str {
    if relative_path.contains("secret") || relative_path.contains("security") {
        "700"
    } else {
        "755"
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryCreationResult {
    pub environment: Environment,
    pub created_paths: Vec<String>,
    pub errors: Vec<String>,
}

impl DirectoryCreationResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct DirectoryCreator {
    fsops: EnvFs,
}

impl DirectoryCreator {
    pub fn new(fsops: EnvFs) -> Self {
        Self { fsops }
    }

    /// Create the canonical layout under `base_path`. Each individual failure
    /// is collected rather than aborting the whole structure; already-existing
    /// directories are not errors.
    pub fn create_structure(&self, base_path: &str) -> Result<DirectoryCreationResult> {
        let environment = self.fsops.environment();
        info!("Creating canonical directory structure under {} ({})", base_path, environment);

        let mut created_paths = Vec::new();
        let mut errors = Vec::new();

        for relative in CANONICAL_LAYOUT {
            let full = join(base_path, relative);
            match self.create_one(&full, relative) {
                Ok(()) => created_paths.push(full),
                Err(e) => errors.push(format!("{relative}: {e}")),
            }
        }

        self.write_readme_files(base_path, &mut errors);

        debug!(
            "Directory structure done: {} created, {} errors",
            created_paths.len(),
            errors.len()
        );
        Ok(DirectoryCreationResult {
            environment,
            created_paths,
            errors,
        })
    }

    fn create_one(&self, full_path: &str, relative: &str) -> Result<()> {
        let wrap = |e: Error| Error::DirectoryCreationFailed {
            path: full_path.to_string(),
            message: e.to_string(),
        };
        self.fsops.mkdir_p(full_path).map_err(wrap)?;
        self.fsops
            .chmod(full_path, directory_permissions(relative))
            .map_err(wrap)?;
        Ok(())
    }

    fn write_readme_files(&self, base_path: &str, errors: &mut Vec<String>) {
        for (namespace, content) in readme_contents() {
            let path = join(base_path, &format!("{namespace}/README.md"));
            if let Err(e) = self.fsops.write_file(&path, content) {
                errors.push(format!("README {namespace}: {e}"));
            }
        }
    }
}

/// README placeholder per top-level namespace.
fn readme_contents() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "development/scripts",
            "# Scripts\n\nOperational scripts, grouped by purpose: deployment, analysis, maintenance, utilities, legacy.\n",
        ),
        (
            "development/docs",
            "# Development documents\n\nWorking reports and guides produced during development.\n",
        ),
        (
            "development/configs",
            "# Environment configuration\n\nEnvironment-specific configuration. `secrets/` and `security/` are owner-only.\n",
        ),
        (
            "docs",
            "# Documentation\n\nUser-facing documentation: troubleshooting, deployment, guides.\n",
        ),
        (
            "config",
            "# Configuration\n\nMain configuration files plus samples and legacy copies.\n",
        ),
        (
            "tests",
            "# Tests\n\nUnit and integration tests plus request payloads.\n",
        ),
        (
            "archive",
            "# Archive\n\nLegacy files, retired projects, and backups kept for reference.\n",
        ),
    ]
}

fn join(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{base}/{relative}")
}
