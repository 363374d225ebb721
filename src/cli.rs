//! Command-line surface and the indicatif-backed progress reporter.

use crate::model::{ExecutionPhase, ExecutionProgress};
use crate::progress::ProgressReporter;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

#[derive(Debug, Parser)]
#[command(name = "file-organizer")]
#[command(about = "Organizes loose files into a canonical layout across local and remote environments", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full organization pipeline against both environments
    Organize {
        /// Preview every phase without touching either filesystem
        #[arg(long)]
        dry_run: bool,
        /// Keep running later phases after a phase fails
        #[arg(long)]
        continue_on_error: bool,
        /// Use this backup id instead of a generated one
        #[arg(long)]
        backup_id: Option<String>,
    },
    /// Survey loose files in both environments without changing anything
    Scan,
    /// Scan and classify, reporting target paths and confidence
    Classify,
    /// Move already-classified files without syncing environments
    Move {
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare the two directory structures and print the differences
    Compare,
    /// Reconcile structural differences between the environments
    Sync {
        #[arg(long)]
        dry_run: bool,
    },
    /// Backup unit management
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Probe remote connectivity and disk headroom
    Check,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommands {
    /// List local backup units
    List,
    /// Restore every file catalogued in a backup unit
    Restore { backup_id: String },
    /// Re-check existence and checksums of a backup unit
    Verify { backup_id: String },
    /// Delete one backup unit
    Delete { backup_id: String },
    /// Delete backup units older than the configured retention window
    Cleanup,
}

/// CLI progress reporter using indicatif spinners, one per phase.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_phase_start(&self, phase: ExecutionPhase) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(format!("{phase}..."));
        pb.enable_steady_tick(std::time::Duration::from_millis(80));

        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn on_phase_complete(&self, phase: ExecutionPhase, duration_secs: f64) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
        eprintln!("  \x1b[32m✓\x1b[0m {} ({:.2}s)", phase, duration_secs);
    }

    fn on_progress(&self, progress: &ExecutionProgress) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!(
                "{} ({:.0}% overall, {} files)",
                progress.current_phase, progress.overall_progress, progress.total_files
            ));
        }
    }

    fn on_warning(&self, message: &str) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.println(format!("  ! {message}"));
        } else {
            eprintln!("  ! {message}");
        }
    }
}
