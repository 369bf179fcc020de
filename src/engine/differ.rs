//! Diff and report display

use crate::ui;
use colored::Colorize;
use declarative::{DiffSummary, Outcome, ResourceDiff, RunReport, RunState, group_by_kind};

/// Section title for a kind tag
fn kind_title(kind: &str) -> &str {
    match kind {
        "package" => "Packages",
        "execute" => "Commands",
        "line_edit" => "Environment and line edits",
        "template" => "Templates",
        "git" => "Source checkouts",
        "cron" => "Scheduled jobs",
        "web_app" => "Sites",
        "ownership" => "Ownership",
        other => other,
    }
}

/// Display pending changes of a dry run
pub fn display_diff(diffs: &[ResourceDiff], summary: &DiffSummary) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs) {
        println!("│ {}", kind_title(kind).bold());
        for diff in kind_diffs {
            println!(
                "│   {} {:<40} {}",
                "~".yellow(),
                ui::truncate_path(&diff.resource_id, 40),
                diff.change.dimmed()
            );
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} in sync, {} blocked by guards)",
        summary.changes.to_string().bold(),
        summary.in_sync.to_string().green(),
        summary.blocked.to_string().yellow()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display resource warnings, then resources whose check or action failed
pub fn display_failures(report: &RunReport) {
    let failed: Vec<_> = report
        .resources
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
        .collect();
    let warned: Vec<_> = report
        .resources
        .iter()
        .filter(|r| !r.warnings.is_empty())
        .collect();
    if failed.is_empty() && warned.is_empty() {
        return;
    }

    println!();
    for resource in warned {
        for warning in &resource.warnings {
            ui::warn(&format!("{}: {warning}", resource.id()));
        }
    }
    for resource in failed {
        let note = if resource.best_effort {
            " (best effort)".dimmed().to_string()
        } else {
            String::new()
        };
        ui::error(&format!(
            "{}{}: {}",
            resource.id(),
            note,
            ui::outcome_detail(&resource.outcome)
        ));
    }
}

/// Print final summary
pub fn print_summary(report: &RunReport) {
    let summary = report.summary();

    println!();
    match report.state {
        RunState::Completed if summary.is_success() => {
            println!("  {} Converged successfully!", "✓".green().bold());
        }
        RunState::Completed => {
            println!("  {} Converged with best-effort failures", "⚠".yellow().bold());
        }
        _ => match report.abort_cause() {
            Some(cause) => println!(
                "  {} Aborted at {}: {}",
                "✗".red().bold(),
                cause.id(),
                cause.cause()
            ),
            None => println!("  {} Aborted", "✗".red().bold()),
        },
    }

    if summary.converged > 0 {
        println!("    • {} resources converged", summary.converged);
    }
    if summary.unchanged > 0 {
        println!("    • {} resources already up to date", summary.unchanged);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
    for notification in &report.notifications {
        let symbol = if notification.success {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("    {} notified `{}`", symbol, notification.command);
    }
}
