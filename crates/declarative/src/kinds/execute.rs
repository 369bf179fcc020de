//! Execute-command resource
//!
//! Commands run every time their guards permit. The engine adds no
//! deduplication of its own beyond the optional `creates` path.

use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::types::{Change, Drift};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn default_returns() -> Vec<i32> {
    vec![0]
}

/// A shell command to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSpec {
    pub command: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Extra variables on top of the run's process environment
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Exit codes counted as success
    #[serde(default = "default_returns")]
    pub returns: Vec<i32>,
    /// Skip the command when this path already exists
    #[serde(default)]
    pub creates: Option<PathBuf>,
}

impl ExecuteSpec {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            user: None,
            cwd: None,
            environment: BTreeMap::new(),
            returns: default_returns(),
            creates: None,
        }
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn creates(mut self, path: impl Into<PathBuf>) -> Self {
        self.creates = Some(path.into());
        self
    }

    pub(crate) fn description(&self) -> String {
        match &self.user {
            Some(user) => format!("Run `{}` as {user}", self.command),
            None => format!("Run `{}`", self.command),
        }
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("command is empty".to_string());
        }
        if self.returns.is_empty() {
            return Err("returns must list at least one exit code".to_string());
        }
        Ok(())
    }

    fn already_created(&self, ctx: &ApplyContext) -> bool {
        self.creates
            .as_deref()
            .is_some_and(|path| ctx.sys.fs.exists(path))
    }

    pub(crate) fn check(&self, ctx: &ApplyContext) -> Result<Drift> {
        if self.already_created(ctx) {
            return Ok(Drift::InSync);
        }
        Ok(Drift::Drifted(format!("run `{}`", self.command)))
    }

    pub(crate) fn apply(&self, ctx: &ApplyContext) -> Result<Change> {
        if self.already_created(ctx) {
            return Ok(Change::Unchanged);
        }

        let output = ctx.run_command(
            &self.command,
            self.user.as_deref(),
            self.cwd.as_deref(),
            &self.environment,
        )?;

        if !output.stdout.is_empty() {
            log::debug!("{}", output.stdout_trimmed());
        }
        if !self.returns.contains(&output.exit_code) {
            return Err(Error::command_failed(
                &self.command,
                output.exit_code,
                &output.stderr,
            ));
        }
        Ok(Change::Converged(format!("ran `{}`", self.command)))
    }
}
