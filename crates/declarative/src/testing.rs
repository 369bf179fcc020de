//! In-memory collaborators for unit tests

use crate::context::{
    ApplyContext, CheckoutRequest, Collaborators, FileSystem, Invocation, PackageManager,
    Scheduler, Shell, SourceControl, TemplateRenderer,
};
use crate::kinds::cron::CronEntry;
use crate::types::CommandOutput;
use anyhow::{Result, anyhow, bail};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct FileEntry {
    content: String,
    owner: String,
}

#[derive(Default)]
struct FsState {
    files: BTreeMap<PathBuf, FileEntry>,
    links: BTreeMap<PathBuf, PathBuf>,
    writes: HashMap<PathBuf, usize>,
}

/// Filesystem held in memory; directories are implied by their contents
#[derive(Default)]
pub struct MemoryFs {
    state: Mutex<FsState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: impl AsRef<Path>, content: &str) {
        self.put_owned(path, content, "root");
    }

    pub fn put_owned(&self, path: impl AsRef<Path>, content: &str, owner: &str) {
        self.state.lock().unwrap().files.insert(
            path.as_ref().to_path_buf(),
            FileEntry {
                content: content.to_string(),
                owner: owner.to_string(),
            },
        );
    }

    pub fn put_link(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.state
            .lock()
            .unwrap()
            .links
            .insert(link.as_ref().to_path_buf(), target.as_ref().to_path_buf());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.files.get(path.as_ref()).map(|f| f.content.clone())
    }

    /// Number of writes through the trait, not counting `put`
    pub fn write_count(&self, path: impl AsRef<Path>) -> usize {
        let state = self.state.lock().unwrap();
        state.writes.get(path.as_ref()).copied().unwrap_or(0)
    }

    pub fn owner_of(&self, path: impl AsRef<Path>) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.files.get(path.as_ref()).map(|f| f.owner.clone())
    }

    pub fn link_target(&self, link: impl AsRef<Path>) -> Option<PathBuf> {
        self.state.lock().unwrap().links.get(link.as_ref()).cloned()
    }
}

impl FileSystem for MemoryFs {
    fn read_to_string(&self, path: &Path) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        let path = state.links.get(path).map_or(path, PathBuf::as_path);
        Ok(state.files.get(path).map(|f| f.content.clone()))
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| FileEntry {
                content: String::new(),
                owner: "root".to_string(),
            });
        entry.content = contents.to_string();
        *state.writes.entry(path.to_path_buf()).or_default() += 1;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        state.links.contains_key(path) || state.files.keys().any(|p| p.starts_with(path))
    }

    fn owner(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.owner_of(path))
    }

    fn chown(
        &self,
        path: &Path,
        owner: &str,
        _group: Option<&str>,
        recursive: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.files.contains_key(path) {
            bail!("{}: no such file or directory", path.display());
        }
        for (p, entry) in &mut state.files {
            if p == path || (recursive && p.starts_with(path)) {
                entry.owner = owner.to_string();
            }
        }
        Ok(())
    }

    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>> {
        Ok(self.link_target(path))
    }

    fn symlink(&self, source: &Path, link: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.links.contains_key(link) || state.files.contains_key(link) {
            bail!("{}: file exists", link.display());
        }
        state.links.insert(link.to_path_buf(), source.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.links.remove(path).is_none() && state.files.remove(path).is_none() {
            bail!("{}: no such file or directory", path.display());
        }
        Ok(())
    }
}

/// What a command was run with
#[derive(Debug, Clone)]
pub struct ShellCall {
    pub command: String,
    pub user: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

#[derive(Default)]
struct ShellState {
    exits: HashMap<String, i32>,
    unspawnable: HashSet<String>,
    calls: Vec<ShellCall>,
}

/// Shell whose commands exit 0 unless scripted otherwise
#[derive(Default)]
pub struct ScriptedShell {
    state: Mutex<ShellState>,
}

impl ScriptedShell {
    pub fn exit_with(&self, command: &str, code: i32) {
        let mut state = self.state.lock().unwrap();
        state.exits.insert(command.to_string(), code);
    }

    pub fn fail_to_spawn(&self, command: &str) {
        let mut state = self.state.lock().unwrap();
        state.unspawnable.insert(command.to_string());
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }
}

impl Shell for ScriptedShell {
    fn run(&self, invocation: &Invocation<'_>) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        if state.unspawnable.contains(invocation.command) {
            bail!("failed to spawn `{}`", invocation.command);
        }
        state.calls.push(ShellCall {
            command: invocation.command.to_string(),
            user: invocation.user.map(str::to_string),
            cwd: invocation.cwd.map(Path::to_path_buf),
            env: invocation.env.clone(),
        });
        let exit_code = state.exits.get(invocation.command).copied().unwrap_or(0);
        Ok(CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                format!("{} exited with {exit_code}", invocation.command)
            },
        })
    }
}

#[derive(Default)]
struct ScmState {
    revisions: BTreeMap<PathBuf, String>,
    deploy_keys: Vec<Option<String>>,
}

/// Source control that checks out whatever revision it is asked for
#[derive(Default)]
pub struct FakeScm {
    state: Mutex<ScmState>,
}

impl FakeScm {
    pub fn set_revision(&self, destination: impl AsRef<Path>, revision: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .revisions
            .insert(destination.as_ref().to_path_buf(), revision.to_string());
    }

    pub fn revision_at(&self, destination: &Path) -> Option<String> {
        self.state.lock().unwrap().revisions.get(destination).cloned()
    }

    pub fn checkout_count(&self) -> usize {
        self.state.lock().unwrap().deploy_keys.len()
    }

    pub fn last_deploy_key(&self) -> Option<String> {
        self.state.lock().unwrap().deploy_keys.last().cloned().flatten()
    }
}

impl SourceControl for FakeScm {
    fn revision(&self, destination: &Path) -> Result<Option<String>> {
        Ok(self.revision_at(destination))
    }

    fn checkout(&self, request: &CheckoutRequest<'_>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state
            .deploy_keys
            .push(request.deploy_key.map(str::to_string));
        state.revisions.insert(
            request.destination.to_path_buf(),
            request.revision.to_string(),
        );
        Ok(request.revision.to_string())
    }
}

#[derive(Default)]
struct PackageState {
    installed: BTreeMap<String, String>,
    installs: Vec<String>,
}

/// Package manager that installs the requested version, or `1.0`
#[derive(Default)]
pub struct FakePackages {
    state: Mutex<PackageState>,
}

impl FakePackages {
    pub fn preinstall(&self, name: &str, version: &str) {
        let mut state = self.state.lock().unwrap();
        state.installed.insert(name.to_string(), version.to_string());
    }

    pub fn install_count(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.installs.iter().filter(|n| *n == name).count()
    }
}

impl PackageManager for FakePackages {
    fn installed_version(&self, name: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().installed.get(name).cloned())
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .installed
            .insert(name.to_string(), version.unwrap_or("1.0").to_string());
        state.installs.push(name.to_string());
        Ok(())
    }
}

/// Scheduler keeping jobs in a list
#[derive(Default)]
pub struct FakeScheduler {
    jobs: Mutex<Vec<CronEntry>>,
}

impl FakeScheduler {
    pub fn jobs_for(&self, user: &str) -> Vec<CronEntry> {
        let jobs = self.jobs.lock().unwrap();
        jobs.iter().filter(|j| j.user == user).cloned().collect()
    }
}

impl Scheduler for FakeScheduler {
    fn jobs(&self, user: &str) -> Result<Vec<CronEntry>> {
        Ok(self.jobs_for(user))
    }

    fn install_job(&self, entry: &CronEntry) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.retain(|j| !(j.user == entry.user && j.name == entry.name));
        jobs.push(entry.clone());
        Ok(())
    }
}

/// Renders the template name followed by the context as compact JSON
#[derive(Default)]
pub struct StubRenderer {
    missing: Mutex<HashSet<String>>,
}

impl StubRenderer {
    pub fn make_missing(&self, template: &str) {
        self.missing.lock().unwrap().insert(template.to_string());
    }
}

impl TemplateRenderer for StubRenderer {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String> {
        if self.missing.lock().unwrap().contains(template) {
            return Err(anyhow!("template {template} not found"));
        }
        Ok(format!("# {template}\n{}\n", serde_json::to_string(context)?))
    }
}

/// A whole fake machine
#[derive(Default)]
pub struct Machine {
    pub fs: MemoryFs,
    pub shell: ScriptedShell,
    pub scm: FakeScm,
    pub packages: FakePackages,
    pub scheduler: FakeScheduler,
    pub templates: StubRenderer,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            shell: &self.shell,
            fs: &self.fs,
            scm: &self.scm,
            templates: &self.templates,
            scheduler: &self.scheduler,
            packages: &self.packages,
        }
    }

    pub fn context(&self) -> ApplyContext<'_> {
        ApplyContext::new(self.collaborators())
    }
}
