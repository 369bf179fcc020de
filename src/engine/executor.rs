//! Execution engine - preview, confirm, then converge with UI integration

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyContext, ConflictPolicy, DiffSummary, ExecuteOptions, GuardErrorPolicy, NameScope,
    RunList, RunReport, RunState, compute_diffs, converge, converge_simple,
};

use super::differ::{display_diff, display_failures, print_summary};
use crate::progress::RunProgress;
use crate::ui;

/// Options for a CLI run (adds confirmation and display to the engine's options)
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Only show what would change
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Verbose output
    pub verbose: bool,
    /// Print nothing; the caller reports
    pub silent: bool,
    pub name_scope: NameScope,
    pub on_guard_error: GuardErrorPolicy,
    pub on_conflict: ConflictPolicy,
}

impl EngineOptions {
    fn engine(&self, dry_run: bool) -> ExecuteOptions {
        ExecuteOptions {
            dry_run,
            verbose: self.verbose,
            name_scope: self.name_scope,
            on_guard_error: self.on_guard_error,
            on_conflict: self.on_conflict,
        }
    }
}

/// How a CLI run ended
#[derive(Debug)]
pub enum Execution {
    /// Only the dry run ran
    Previewed(RunReport),
    /// The user declined the prompt after the dry run
    Declined(RunReport),
    /// The real run ran
    Applied(RunReport),
}

impl Execution {
    pub fn report(&self) -> &RunReport {
        match self {
            Self::Previewed(report) | Self::Declined(report) | Self::Applied(report) => report,
        }
    }

    /// Process exit status
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Declined(_) => 1,
            Self::Previewed(report) | Self::Applied(report) => match report.state {
                RunState::Completed => 0,
                _ => 1,
            },
        }
    }
}

/// Preview the run list, confirm, then converge it
///
/// `Err` means the run list was rejected before anything ran.
pub fn execute(run_list: &RunList, ctx: &mut ApplyContext, opts: &EngineOptions) -> Result<Execution> {
    // 1. Dry run: guards plus read-only checks
    let preview = converge_simple(run_list, ctx, &opts.engine(true))?;
    let diffs = compute_diffs(&preview);
    let summary = DiffSummary::from_report(&preview);

    // 2. Display what will change
    if !opts.silent {
        display_diff(&diffs, &summary);
        display_failures(&preview);
    }

    if opts.dry_run {
        if !opts.silent {
            println!();
            println!("  {} Dry run - no changes made", "ℹ".blue());
        }
        return Ok(Execution::Previewed(preview));
    }

    if preview.state == RunState::Aborted {
        if !opts.silent {
            ui::warn("The dry run stopped early; the real run may fail at the same resource");
        }
    } else if !summary.has_changes() {
        return Ok(Execution::Previewed(preview));
    }

    // 3. Confirm (unless --yes)
    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(Execution::Declined(preview));
    }

    // 4. Converge for real
    let mut progress = if opts.silent {
        RunProgress::hidden()
    } else {
        println!();
        println!(
            "  {} Converging {} resources...",
            "→".cyan(),
            run_list.len()
        );
        RunProgress::new(opts.verbose)
    };
    let report = converge(run_list, ctx, &opts.engine(false), &mut progress)?;

    // 5. Summary
    if !opts.silent {
        display_failures(&report);
        print_summary(&report);
    }

    Ok(Execution::Applied(report))
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
