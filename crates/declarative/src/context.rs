//! Apply context and collaborator traits
//!
//! The engine never touches the machine directly. Shell commands, file
//! access, source control, template rendering, package installs and job
//! scheduling all go through the traits below, so the declarative crate can
//! be driven against the live system or an in-memory stand-in.

use crate::kinds::cron::CronEntry;
use crate::propagate::{ConflictPolicy, ProcessEnvironment};
use crate::types::{CommandOutput, Outcome, ResourcePhase, RunState};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A single shell command to run
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub command: &'a str,
    /// Run as this user; `None` runs as the engine's own user
    pub user: Option<&'a str>,
    pub cwd: Option<&'a Path>,
    pub env: &'a BTreeMap<String, String>,
}

/// Shell execution interface
///
/// Blocks until the command exits. A non-zero exit status is not an error;
/// only failing to start the command is.
pub trait Shell: Send + Sync {
    fn run(&self, invocation: &Invocation<'_>) -> Result<CommandOutput>;
}

/// Filesystem interface
pub trait FileSystem: Send + Sync {
    /// Read a text file; `None` if it does not exist
    fn read_to_string(&self, path: &Path) -> Result<Option<String>>;

    /// Replace a file's contents atomically, creating parent directories
    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()>;

    /// Whether anything (file, directory, symlink) exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Name of the owning user; `None` if the path does not exist
    fn owner(&self, path: &Path) -> Result<Option<String>>;

    /// Change ownership, descending into directories when `recursive`
    fn chown(&self, path: &Path, owner: &str, group: Option<&str>, recursive: bool)
    -> Result<()>;

    /// Target of a symlink; `None` if `path` is not a symlink
    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>>;

    /// Create a symlink at `link` pointing to `source`
    fn symlink(&self, source: &Path, link: &Path) -> Result<()>;

    /// Remove a file or symlink
    fn remove_file(&self, path: &Path) -> Result<()>;
}

/// Parameters for a source checkout
#[derive(Debug, Clone, Copy)]
pub struct CheckoutRequest<'a> {
    pub url: &'a str,
    pub revision: &'a str,
    pub deploy_key: Option<&'a str>,
    pub destination: &'a Path,
    pub user: Option<&'a str>,
}

/// Source-control interface
pub trait SourceControl: Send + Sync {
    /// Revision currently checked out at `destination`, without touching the network.
    /// `None` if there is no working copy.
    fn revision(&self, destination: &Path) -> Result<Option<String>>;

    /// Fetch and check out the requested revision, returning the resulting revision
    fn checkout(&self, request: &CheckoutRequest<'_>) -> Result<String>;
}

/// Template-render interface
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String>;
}

/// Scheduler interface for recurring jobs
pub trait Scheduler: Send + Sync {
    /// Jobs currently installed for `user`
    fn jobs(&self, user: &str) -> Result<Vec<CronEntry>>;

    /// Install `entry`, replacing any job with the same name for the same user
    fn install_job(&self, entry: &CronEntry) -> Result<()>;
}

/// OS package manager interface
pub trait PackageManager: Send + Sync {
    /// Installed version, or `None` if not installed
    fn installed_version(&self, name: &str) -> Result<Option<String>>;

    /// Install `name`, optionally pinned to `version`
    fn install(&self, name: &str, version: Option<&str>) -> Result<()>;
}

/// The external collaborators a run is wired to
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub shell: &'a dyn Shell,
    pub fs: &'a dyn FileSystem,
    pub scm: &'a dyn SourceControl,
    pub templates: &'a dyn TemplateRenderer,
    pub scheduler: &'a dyn Scheduler,
    pub packages: &'a dyn PackageManager,
}

/// Progress callback for convergence runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send {
    /// Called once the run list is validated
    fn on_run_start(&mut self, total: usize);

    /// Called when a resource leaves `Pending`
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called on every non-terminal phase transition
    fn on_phase(&mut self, _id: &str, _phase: ResourcePhase) {}

    /// Called when a resource reaches a terminal phase
    fn on_resource_complete(&mut self, id: &str, outcome: &Outcome);

    /// Called when the run reaches `Completed` or `Aborted`
    fn on_run_complete(&mut self, state: RunState);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _outcome: &Outcome) {}
    fn on_run_complete(&mut self, _state: RunState) {}
}

/// Context passed to guard evaluation and resource apply operations
pub struct ApplyContext<'a> {
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
    /// External collaborators
    pub sys: Collaborators<'a>,
    /// Live environment handed to every command the run executes
    pub env: ProcessEnvironment,
    /// Node attributes, exposed to templates as `node`
    pub node: serde_json::Value,
    /// What to do when a binding conflicts, unless the resource says otherwise
    pub on_conflict: ConflictPolicy,
    /// Warnings raised by the resource being converged, drained into its report
    pub warnings: Vec<String>,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(sys: Collaborators<'a>) -> Self {
        Self {
            dry_run: false,
            verbose: false,
            sys,
            env: ProcessEnvironment::default(),
            node: serde_json::Value::Object(serde_json::Map::new()),
            on_conflict: ConflictPolicy::default(),
            warnings: Vec::new(),
        }
    }

    /// Attach node attributes
    pub fn with_node(mut self, node: serde_json::Value) -> Self {
        self.node = node;
        self
    }

    /// Seed the process environment
    pub fn with_env(mut self, env: ProcessEnvironment) -> Self {
        self.env = env;
        self
    }

    /// Run a command with the run's environment plus `extra`
    pub fn run_command(
        &self,
        command: &str,
        user: Option<&str>,
        cwd: Option<&Path>,
        extra: &BTreeMap<String, String>,
    ) -> Result<CommandOutput> {
        let env = if extra.is_empty() {
            self.env.vars().clone()
        } else {
            let mut merged = self.env.vars().clone();
            merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
            merged
        };
        log::debug!("running `{command}` as {}", user.unwrap_or("current user"));
        self.sys.shell.run(&Invocation {
            command,
            user,
            cwd,
            env: &env,
        })
    }
}
