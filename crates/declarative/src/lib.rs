//! # Declarative
//!
//! An idempotent convergence engine for single-node server provisioning.
//!
//! A run takes an ordered list of declared resources and converges the live
//! machine to them, safely and repeatably. Nothing is persisted between runs:
//! every check re-derives truth from the machine itself.
//!
//! ## Core Concepts
//!
//! - **Inventory**: read-only search records about the node and its apps
//! - **Propagator**: insert-if-no-match of environment bindings into files or
//!   the process environment, plus one-shot line replacement
//! - **Guard**: `only_if` / `not_if` predicates gating a resource's action
//! - **Resource**: a kind-tagged property bag identified by `(kind, name)`
//! - **RunList**: an ordered tree of resource nodes, applied pre-order
//! - **Engine**: [`converge`] walks the run list and records an [`Outcome`] per resource
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     converge_simple, ApplyContext, ExecuteOptions, GuardCheck, PackageSpec,
//!     ExecuteSpec, Resource, RunList,
//! };
//!
//! let mut list = RunList::new();
//! list.add(Resource::new("php7.0", PackageSpec::new("php7.0")))
//!     .add(
//!         Resource::new("npm install", ExecuteSpec::new("npm install").cwd("/srv/app"))
//!             .not_if(GuardCheck::file_exists("/srv/app/node_modules")),
//!     );
//!
//! let mut ctx = ApplyContext::new(collaborators);
//! let report = converge_simple(&list, &mut ctx, &ExecuteOptions::default())?;
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Collaborator Traits
//!
//! The engine reaches the machine only through traits:
//!
//! - [`Shell`], [`FileSystem`], [`SourceControl`], [`TemplateRenderer`],
//!   [`Scheduler`] and [`PackageManager`]: the external interfaces
//! - [`ProgressCallback`]: receives progress updates
//!
//! This allows the crate to be driven against the live system or an
//! in-memory stand-in without changing any resource logic.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod guard;
pub mod inventory;
pub mod kinds;
pub mod planner;
pub mod propagate;
pub mod resource;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use context::{
    ApplyContext, CheckoutRequest, Collaborators, FileSystem, Invocation, NoProgress,
    PackageManager, ProgressCallback, Scheduler, Shell, SourceControl, TemplateRenderer,
};
pub use diff::{DiffSummary, ResourceDiff, compute_diffs, group_by_kind};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{converge, converge_simple};
pub use guard::{Guard, GuardCheck, GuardErrorPolicy, Polarity, Verdict, evaluate_guards};
pub use inventory::{Filter, Inventory, InventoryRecord};
pub use kinds::{
    CheckoutSpec, CronEntry, CronSchedule, CronSpec, ExecuteSpec, Kind, LineEditSpec,
    LineReplacement, OwnershipSpec, PackageSpec, ResourceSpec, TemplateSpec, VirtualHostSpec,
};
pub use planner::{ResourceNode, RunList};
pub use propagate::{
    ConflictPolicy, EnvironmentBinding, LineSyntax, ProcessEnvironment, PropagationReport,
};
pub use resource::Resource;
pub use types::{
    AbortCause, Change, CommandOutput, Drift, ExecuteOptions, ExecuteSummary, NameScope, NotificationReport,
    Outcome, ResourcePhase, ResourceReport, RunReport, RunState,
};
