//! Core types for convergence runs

use crate::error::ErrorCategory;
use crate::guard::GuardErrorPolicy;
use crate::propagate::ConflictPolicy;
use serde::{Deserialize, Serialize};
use std::process::Output;

/// What a kind's read-only check found on the live system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// The system already matches the resource
    InSync,
    /// Applying would change something (described)
    Drifted(String),
}

impl Drift {
    pub fn is_in_sync(&self) -> bool {
        matches!(self, Self::InSync)
    }
}

/// What an apply call did to the live system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Nothing had to be done
    Unchanged,
    /// The action ran and changed something (described)
    Converged(String),
}

/// Terminal result of a single resource within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Already in the desired state
    Unchanged,
    /// The action ran and made a change
    Converged { detail: String },
    /// Guards blocked the action, or the run is a dry run
    Skipped { reason: String },
    /// The action (or a guard, under the fail policy) errored
    Failed {
        cause: String,
        category: ErrorCategory,
    },
}

impl Outcome {
    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// The lifecycle phase this outcome terminates in
    pub fn phase(&self) -> ResourcePhase {
        match self {
            Self::Unchanged => ResourcePhase::Unchanged,
            Self::Converged { .. } => ResourcePhase::Converged,
            Self::Skipped { .. } => ResourcePhase::Skipped,
            Self::Failed { .. } => ResourcePhase::Failed,
        }
    }

    pub(crate) fn from_change(change: Change) -> Self {
        match change {
            Change::Unchanged => Self::Unchanged,
            Change::Converged(detail) => Self::Converged { detail },
        }
    }

    pub(crate) fn from_error(error: &crate::Error) -> Self {
        Self::Failed {
            cause: error.to_string(),
            category: error.category(),
        }
    }
}

/// Per-resource lifecycle
///
/// `Pending -> GuardChecked -> {Skipped | Applying} -> {Converged | Unchanged | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePhase {
    Pending,
    GuardChecked,
    Applying,
    Skipped,
    Unchanged,
    Converged,
    Failed,
}

impl ResourcePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Unchanged | Self::Converged | Self::Failed
        )
    }
}

/// Whole-run lifecycle: `Initializing -> Running -> {Completed | Aborted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Running,
    Completed,
    Aborted,
}

/// Outcome of one resource, tagged with its identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
    pub kind: String,
    pub name: String,
    pub best_effort: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Problems noticed without failing the resource, e.g. binding conflicts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ResourceReport {
    /// Display id, `kind[name]`
    pub fn id(&self) -> String {
        format!("{}[{}]", self.kind, self.name)
    }
}

/// Result of a delayed notification command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationReport {
    pub command: String,
    pub success: bool,
    pub detail: String,
}

/// What aborted a run: a resource, or a delayed notification after them
#[derive(Debug, Clone, Copy)]
pub enum AbortCause<'a> {
    Resource(&'a ResourceReport),
    Notification(&'a NotificationReport),
}

impl AbortCause<'_> {
    /// Display id, `kind[name]` or `notify[command]`
    pub fn id(&self) -> String {
        match self {
            Self::Resource(report) => report.id(),
            Self::Notification(report) => format!("notify[{}]", report.command),
        }
    }

    /// Failure message
    pub fn cause(&self) -> &str {
        match self {
            Self::Resource(report) => match &report.outcome {
                Outcome::Failed { cause, .. } => cause.as_str(),
                _ => "",
            },
            Self::Notification(report) => report.detail.as_str(),
        }
    }
}

/// Ordered record of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub dry_run: bool,
    pub resources: Vec<ResourceReport>,
    #[serde(default)]
    pub notifications: Vec<NotificationReport>,
}

impl RunReport {
    pub(crate) fn new(dry_run: bool) -> Self {
        Self {
            state: RunState::Initializing,
            dry_run,
            resources: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// The first failure that aborted the run, if any
    pub fn abort_cause(&self) -> Option<AbortCause<'_>> {
        if self.state != RunState::Aborted {
            return None;
        }
        self.resources
            .iter()
            .find(|r| !r.best_effort && !r.outcome.is_success())
            .map(AbortCause::Resource)
            .or_else(|| {
                self.notifications
                    .iter()
                    .find(|n| !n.success)
                    .map(AbortCause::Notification)
            })
    }

    /// Process exit status: zero on `Completed`, non-zero otherwise
    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunState::Completed => 0,
            _ => 1,
        }
    }

    /// Counts per outcome
    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for report in &self.resources {
            summary.add_outcome(&report.outcome);
        }
        summary
    }

    /// Look up the outcome for `kind[name]`
    pub fn outcome_of(&self, kind: &str, name: &str) -> Option<&Outcome> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.name == name)
            .map(|r| &r.outcome)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub converged: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.converged
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.converged + self.unchanged + self.skipped + self.failed
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Converged { .. } => self.converged += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Options for a convergence run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just report drift
    pub dry_run: bool,
    /// Verbose output
    pub verbose: bool,
    /// Scope within which resource names must be unique
    pub name_scope: NameScope,
    /// Guard error policy for resources that do not set their own
    pub on_guard_error: GuardErrorPolicy,
    /// Conflict policy for line edits that do not set their own
    pub on_conflict: ConflictPolicy,
}

/// Scope of resource-name uniqueness within one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameScope {
    /// Names must be unique within a kind
    #[default]
    PerKind,
    /// Names must be unique across all kinds
    Global,
    /// Duplicate names are allowed
    Unrestricted,
}

/// Output from a shell command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            // Killed by signal has no code
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stdout
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}
