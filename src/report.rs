//! Execution report artifacts.
//!
//! Three markdown documents are written per run: an organization summary, a
//! structure comparison, and an error analysis. They are prose for humans,
//! not parsed by anything downstream.

use crate::classify::Classifier;
use crate::error::Result;
use crate::model::{
    BackupResult, ClassificationResult, ExecutionError, ExecutionMode, FileInfo, FlatFileReport,
    MoveReport, StructureComparison, SyncReport,
};
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::model::GeneratedReport;

/// Borrowed view of everything a run produced, handed in by the engine.
pub struct ReportContext<'a> {
    pub execution_id: &'a str,
    pub mode: ExecutionMode,
    pub dry_run: bool,
    pub local_files: &'a [FileInfo],
    pub remote_files: &'a [FileInfo],
    pub local_flat_report: Option<&'a FlatFileReport>,
    pub remote_flat_report: Option<&'a FlatFileReport>,
    pub local_classifications: &'a [ClassificationResult],
    pub remote_classifications: &'a [ClassificationResult],
    pub local_backup: Option<&'a BackupResult>,
    pub remote_backup: Option<&'a BackupResult>,
    pub local_moves: Option<&'a MoveReport>,
    pub remote_moves: Option<&'a MoveReport>,
    pub comparison: Option<&'a StructureComparison>,
    pub sync: Option<&'a SyncReport>,
    pub errors: &'a [ExecutionError],
    pub warnings: &'a [String],
}

/// Write all three artifacts under `output_dir`, creating it if needed.
pub fn write_all(output_dir: &str, context: &ReportContext<'_>) -> Result<Vec<GeneratedReport>> {
    fs::create_dir_all(output_dir)?;
    let mut generated = Vec::new();
    for (name, content) in [
        ("organization-summary.md", organization_summary(context)),
        ("structure-comparison.md", structure_comparison(context)),
        ("error-analysis.md", error_analysis(context)),
    ] {
        let path = Path::new(output_dir).join(name);
        fs::write(&path, content)?;
        info!("Wrote report {}", path.display());
        generated.push(GeneratedReport {
            name: name.to_string(),
            path: path.to_string_lossy().into_owned(),
        });
    }
    Ok(generated)
}

fn header(title: &str, context: &ReportContext<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {title}");
    let _ = writeln!(out);
    let _ = writeln!(out, "- Execution: `{}`", context.execution_id);
    let _ = writeln!(out, "- Mode: `{:?}`", context.mode);
    let _ = writeln!(out, "- Dry run: {}", context.dry_run);
    let _ = writeln!(out, "- Generated: {}", Utc::now().to_rfc3339());
    let _ = writeln!(out);
    out
}

fn organization_summary(context: &ReportContext<'_>) -> String {
    let mut out = header("Organization Summary", context);

    for (label, files, classifications, backup, moves, flat) in [
        (
            "Local",
            context.local_files,
            context.local_classifications,
            context.local_backup,
            context.local_moves,
            context.local_flat_report,
        ),
        (
            "Remote",
            context.remote_files,
            context.remote_classifications,
            context.remote_backup,
            context.remote_moves,
            context.remote_flat_report,
        ),
    ] {
        let _ = writeln!(out, "## {label} environment");
        let _ = writeln!(out);
        let _ = writeln!(out, "- Files scanned: {}", files.len());
        let _ = writeln!(out, "- Files classified: {}", classifications.len());

        let stats = Classifier::stats(classifications);
        if stats.total > 0 {
            let _ = writeln!(
                out,
                "- Average classification confidence: {:.2}",
                stats.average_confidence
            );
            let mut by_type: Vec<_> = stats.counts_by_type.iter().collect();
            by_type.sort_by_key(|(t, _)| format!("{t}"));
            for (file_type, count) in by_type {
                let _ = writeln!(out, "  - {file_type}: {count}");
            }
        }
        if stats.review_count > 0 {
            let _ = writeln!(out, "- Flagged for review: {}", stats.review_count);
        }
        if let Some(backup) = backup {
            let _ = writeln!(
                out,
                "- Backup: `{}` ({} files, {} bytes)",
                backup.backup_id,
                backup.files.len(),
                backup.total_size
            );
        }
        if let Some(moves) = moves {
            let _ = writeln!(
                out,
                "- Moves: {} of {} succeeded in {} batches ({} bytes)",
                moves.moved_count, moves.total_files, moves.batches, moves.total_moved_bytes
            );
            for outcome in moves.outcomes.iter().filter(|o| o.success) {
                let _ = writeln!(out, "  - `{}` -> `{}`", outcome.source, outcome.target);
            }
            for outcome in moves.outcomes.iter().filter(|o| !o.success) {
                let _ = writeln!(
                    out,
                    "  - FAILED `{}`: {}",
                    outcome.source,
                    outcome.error.as_deref().unwrap_or("unknown")
                );
            }
        }
        if let Some(flat) = flat {
            let _ = writeln!(out, "- Flat files surveyed: {}", flat.total_files);
            for (file_type, group) in &flat.files_by_type {
                let _ = writeln!(out, "  - {}: {}", file_type, group.len());
            }
            if !flat.suspicious_files.is_empty() {
                let _ = writeln!(out, "- Suspicious files:");
                for file in &flat.suspicious_files {
                    let _ = writeln!(out, "  - `{}`", file.name);
                }
            }
            if !flat.large_files.is_empty() {
                let _ = writeln!(out, "- Large files:");
                for file in &flat.large_files {
                    let _ = writeln!(out, "  - `{}` ({} bytes)", file.name, file.size);
                }
            }
        }
        let _ = writeln!(out);
    }

    if let Some(sync) = context.sync {
        let _ = writeln!(out, "## Sync");
        let _ = writeln!(out);
        let _ = writeln!(out, "- Direction: {}", sync.direction);
        let _ = writeln!(out, "- Actions applied: {}", sync.synced.len());
        let _ = writeln!(out, "- Actions failed: {}", sync.failed.len());
        let _ = writeln!(out, "- Skipped: {}", sync.skipped);
        let _ = writeln!(out, "- Flagged for review: {}", sync.flagged_for_review.len());
        let _ = writeln!(out);
    }

    out
}

fn structure_comparison(context: &ReportContext<'_>) -> String {
    let mut out = header("Structure Comparison", context);

    let Some(comparison) = context.comparison else {
        let _ = writeln!(out, "No structure comparison was performed in this run.");
        return out;
    };

    let _ = writeln!(out, "- Local root: `{}`", comparison.local_root);
    let _ = writeln!(out, "- Remote root: `{}`", comparison.remote_root);
    let _ = writeln!(
        out,
        "- Match: {:.1}% ({} local items, {} remote items, {} differences)",
        comparison.match_percentage,
        comparison.local.total_items(),
        comparison.remote.total_items(),
        comparison.differences.len()
    );
    let _ = writeln!(out);

    if comparison.identical() {
        let _ = writeln!(out, "The two environments are structurally identical.");
        return out;
    }

    let _ = writeln!(out, "| Path | Kind | Severity | Recommended action |");
    let _ = writeln!(out, "|------|------|----------|--------------------|");
    for difference in &comparison.differences {
        let _ = writeln!(
            out,
            "| `{}` | {:?} | {:?} | {} |",
            difference.path, difference.kind, difference.severity, difference.recommended_action
        );
    }
    out
}

fn error_analysis(context: &ReportContext<'_>) -> String {
    let mut out = header("Error Analysis", context);

    if context.errors.is_empty() && context.warnings.is_empty() {
        let _ = writeln!(out, "The run completed without errors or warnings.");
        return out;
    }

    if !context.errors.is_empty() {
        let _ = writeln!(out, "## Errors ({})", context.errors.len());
        let _ = writeln!(out);
        for error in context.errors {
            let environment = error
                .environment
                .map(|e| e.to_string())
                .unwrap_or_else(|| "both".to_string());
            let _ = writeln!(
                out,
                "- [{}] ({}) {}: {}",
                error.phase,
                environment,
                error.timestamp.to_rfc3339(),
                error.message
            );
        }
        let _ = writeln!(out);
    }

    if !context.warnings.is_empty() {
        let _ = writeln!(out, "## Warnings ({})", context.warnings.len());
        let _ = writeln!(out);
        for warning in context.warnings {
            let _ = writeln!(out, "- {warning}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionPhase;
    use tempfile::tempdir;

    fn empty_context<'a>() -> ReportContext<'a> {
        ReportContext {
            execution_id: "exec-test",
            mode: ExecutionMode::Full,
            dry_run: false,
            local_files: &[],
            remote_files: &[],
            local_flat_report: None,
            remote_flat_report: None,
            local_classifications: &[],
            remote_classifications: &[],
            local_backup: None,
            remote_backup: None,
            local_moves: None,
            remote_moves: None,
            comparison: None,
            sync: None,
            errors: &[],
            warnings: &[],
        }
    }

    #[test]
    fn writes_three_artifacts() {
        let out = tempdir().unwrap();
        let generated = write_all(out.path().to_str().unwrap(), &empty_context()).unwrap();

        assert_eq!(generated.len(), 3);
        for report in &generated {
            assert!(Path::new(&report.path).exists());
        }
        let summary =
            std::fs::read_to_string(out.path().join("organization-summary.md")).unwrap();
        assert!(summary.contains("exec-test"));
        assert!(summary.contains("Local environment"));
    }

    #[test]
    fn error_analysis_lists_phase_and_environment() {
        let out = tempdir().unwrap();
        let errors = vec![ExecutionError {
            phase: ExecutionPhase::MovingFiles,
            environment: Some(crate::model::Environment::Remote),
            message: "disk full".to_string(),
            timestamp: Utc::now(),
        }];
        let warnings = vec!["3 files skipped".to_string()];
        let mut context = empty_context();
        context.errors = &errors;
        context.warnings = &warnings;

        write_all(out.path().to_str().unwrap(), &context).unwrap();
        let analysis = std::fs::read_to_string(out.path().join("error-analysis.md")).unwrap();
        assert!(analysis.contains("moving_files"));
        assert!(analysis.contains("remote"));
        assert!(analysis.contains("disk full"));
        assert!(analysis.contains("3 files skipped"));
    }
}
