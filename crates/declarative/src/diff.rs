//! Pending changes read back from a dry-run report

use crate::types::{Outcome, ResourceReport, RunReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix the engine puts on the skip reason of a drifted resource in a dry run
pub const DRY_RUN_PREFIX: &str = "dry run: ";

/// A change a real run would make
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Display id, `kind[name]`
    pub resource_id: String,
    pub kind: String,
    /// What applying would do
    pub change: String,
}

impl ResourceDiff {
    /// The pending change for one resource, `None` if it would not change
    pub fn from_report(report: &ResourceReport) -> Option<Self> {
        let Outcome::Skipped { reason } = &report.outcome else {
            return None;
        };
        let change = reason.strip_prefix(DRY_RUN_PREFIX)?;
        Some(Self {
            resource_id: report.id(),
            kind: report.kind.clone(),
            change: change.to_string(),
        })
    }
}

/// Pending changes of a dry run, in run order
pub fn compute_diffs(report: &RunReport) -> Vec<ResourceDiff> {
    report
        .resources
        .iter()
        .filter_map(ResourceDiff::from_report)
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Resources a real run would change
    pub changes: usize,
    /// Resources whose guards block them
    pub blocked: usize,
    /// Resources already in the desired state
    pub in_sync: usize,
    /// Resources whose check errored
    pub failed: usize,
}

impl DiffSummary {
    pub fn from_report(report: &RunReport) -> Self {
        let mut summary = Self::default();
        for resource in &report.resources {
            match &resource.outcome {
                Outcome::Skipped { reason } if reason.starts_with(DRY_RUN_PREFIX) => {
                    summary.changes += 1;
                }
                Outcome::Skipped { .. } => summary.blocked += 1,
                Outcome::Unchanged | Outcome::Converged { .. } => summary.in_sync += 1,
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.changes > 0
    }
}

/// Group diffs by resource kind
pub fn group_by_kind(diffs: &[ResourceDiff]) -> BTreeMap<&str, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<&str, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.kind.as_str()).or_default().push(diff);
    }
    groups
}
