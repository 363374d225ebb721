use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use dotenv::dotenv;
use file_organizer::backup::{BackupManager, InflightGuard, LocalBackupManager};
use file_organizer::cli::{BackupCommands, Cli, CliReporter, Commands};
use file_organizer::compare::StructureComparator;
use file_organizer::engine::{EngineOptions, ExecutionEngine};
use file_organizer::model::{ExecutionMode, ExecutionResult};
use file_organizer::remote::{CommandChannel, SshChannel};
use file_organizer::{logging, AppConfig};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Config first: the logger's file location comes from it.
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading configuration: {err}");
            process::exit(1);
        }
    };

    let _guard = logging::init_logger(&config.log_file);

    let args = Cli::parse();

    match args.command {
        Some(Commands::Organize {
            dry_run,
            continue_on_error,
            backup_id,
        }) => run_engine(
            &config,
            EngineOptions {
                mode: ExecutionMode::Full,
                dry_run,
                continue_on_error,
                backup_id,
            },
        )?,
        Some(Commands::Scan) => run_engine(
            &config,
            EngineOptions {
                mode: ExecutionMode::ScanOnly,
                ..EngineOptions::default()
            },
        )?,
        Some(Commands::Classify) => run_engine(
            &config,
            EngineOptions {
                mode: ExecutionMode::ClassifyOnly,
                ..EngineOptions::default()
            },
        )?,
        Some(Commands::Move { dry_run }) => run_engine(
            &config,
            EngineOptions {
                mode: ExecutionMode::MoveOnly,
                dry_run,
                ..EngineOptions::default()
            },
        )?,
        Some(Commands::Sync { dry_run }) => run_engine(
            &config,
            EngineOptions {
                mode: ExecutionMode::SyncOnly,
                dry_run,
                ..EngineOptions::default()
            },
        )?,
        Some(Commands::Compare) => run_compare(&config)?,
        Some(Commands::Backup { command }) => run_backup(&config, command)?,
        Some(Commands::Check) => run_check(&config)?,
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn build_channel(config: &AppConfig) -> Option<Arc<dyn CommandChannel>> {
    config
        .ssh
        .as_ref()
        .map(|settings| Arc::new(SshChannel::new(settings.clone())) as Arc<dyn CommandChannel>)
}

fn require_channel(config: &AppConfig) -> anyhow::Result<Arc<dyn CommandChannel>> {
    build_channel(config).context("no [ssh] section configured; a remote host is required")
}

fn run_engine(config: &AppConfig, options: EngineOptions) -> anyhow::Result<()> {
    let channel = build_channel(config);
    let engine = ExecutionEngine::new(config.clone(), channel, Arc::new(CliReporter::new()));
    let result = engine.execute(&options);
    print_summary(&result);
    if !result.success {
        bail!("execution {} finished with errors", result.execution_id);
    }
    Ok(())
}

fn print_summary(result: &ExecutionResult) {
    println!();
    let status = if result.success {
        "completed".green()
    } else {
        "failed".red()
    };
    println!(
        "Execution {} {} in phase {}{}",
        result.execution_id.cyan(),
        status,
        result.final_phase,
        if result.dry_run { " (dry-run)" } else { "" }
    );
    for (label, summary) in [("local", &result.local), ("remote", &result.remote)] {
        println!(
            "  {}: {} scanned, {} moved, {} failed, {} permission updates",
            label.bold(),
            summary.scanned_files,
            format!("{}", summary.moved_files).green(),
            format!("{}", summary.failed_moves).red(),
            summary.permission_updates,
        );
        if let Some(backup_id) = &summary.backup_id {
            println!("    backup: {backup_id}");
        }
    }
    if let Some(comparison) = &result.comparison {
        println!(
            "  structures: {:.1}% match, {} differences",
            comparison.match_percentage,
            comparison.differences.len()
        );
    }
    for report in &result.reports {
        println!("  report: {}", report.path);
    }
    if !result.errors.is_empty() {
        println!("  {}:", "errors".red());
        for e in &result.errors {
            println!("    [{}] {}", e.phase, e.message);
        }
    }
    for warning in &result.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

fn run_compare(config: &AppConfig) -> anyhow::Result<()> {
    let channel = require_channel(config)?;
    let comparison = StructureComparator::new(channel)
        .compare_structures(&config.local_root, &config.remote_root);

    println!(
        "{:.1}% match between {} and {}",
        comparison.match_percentage, comparison.local_root, comparison.remote_root
    );
    if comparison.identical() {
        println!("{}", "The environments are structurally identical.".green());
        return Ok(());
    }
    for difference in &comparison.differences {
        println!(
            "  {:?} {} ({:?}): {}",
            difference.kind, difference.path, difference.severity, difference.recommended_action
        );
    }
    Ok(())
}

fn run_backup(config: &AppConfig, command: BackupCommands) -> anyhow::Result<()> {
    let manager = LocalBackupManager::new(
        &config.backup.local_backup_root,
        config.backup.max_backup_bytes,
        InflightGuard::new(),
    );
    match command {
        BackupCommands::List => {
            let backups = manager.list_backups()?;
            if backups.is_empty() {
                println!("No backups under {}", config.backup.local_backup_root);
            }
            for info in backups {
                println!(
                    "{}  {}  {} files, {} bytes",
                    info.backup_id.cyan(),
                    info.created_at.format("%Y-%m-%d %H:%M:%S"),
                    info.file_count,
                    info.total_size
                );
            }
        }
        BackupCommands::Restore { backup_id } => {
            let result = manager.restore_backup(&backup_id)?;
            println!(
                "Restored {} files from {}",
                format!("{}", result.restored_file_count).green(),
                backup_id
            );
            for e in &result.errors {
                println!("  {} {}", "error:".red(), e);
            }
        }
        BackupCommands::Verify { backup_id } => {
            let verification = manager.verify_backup(&backup_id)?;
            if verification.valid {
                println!(
                    "{} valid ({} files checked)",
                    backup_id.green(),
                    verification.checked_files
                );
            } else {
                println!("{} invalid:", backup_id.red());
                for e in &verification.errors {
                    println!("  {e}");
                }
                bail!("backup verification failed");
            }
        }
        BackupCommands::Delete { backup_id } => {
            manager.delete_backup(&backup_id)?;
            println!("Deleted backup {backup_id}");
        }
        BackupCommands::Cleanup => {
            let removed = manager.cleanup_old_backups(config.backup.retention_days)?;
            println!(
                "Removed {} backups older than {} days",
                removed, config.backup.retention_days
            );
        }
    }
    Ok(())
}

fn run_check(config: &AppConfig) -> anyhow::Result<()> {
    use file_organizer::remote::commands;

    let channel = require_channel(config)?;
    let probe = channel.execute(&commands::connectivity_probe())?;
    if !probe.stdout.contains("connection_test") {
        bail!("unexpected probe reply from {}", channel.endpoint());
    }
    println!("{} {}", channel.endpoint().cyan(), "reachable".green());

    let usage = channel.execute(&commands::disk_use_percent(&config.remote_root))?;
    println!(
        "disk use at {}: {}%",
        config.remote_root,
        usage.stdout.trim()
    );
    Ok(())
}
