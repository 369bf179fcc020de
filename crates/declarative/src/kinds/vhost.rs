//! Virtual-host resource - site config plus symlink activation

use super::template::Rendered;
use crate::context::ApplyContext;
use crate::error::Result;
use crate::types::{Change, Drift};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

pub const DEFAULT_SITES_AVAILABLE: &str = "/etc/apache2/sites-available";
pub const DEFAULT_SITES_ENABLED: &str = "/etc/apache2/sites-enabled";
pub const DEFAULT_TEMPLATE: &str = "web_app.conf.j2";

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_port() -> u16 {
    80
}

fn enabled_by_default() -> bool {
    true
}

/// An Apache-style site: a rendered config in sites-available, enabled by a
/// symlink in sites-enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualHostSpec {
    #[serde(default = "default_template")]
    pub template: String,
    pub server_name: String,
    #[serde(default)]
    pub server_aliases: Vec<String>,
    #[serde(default = "default_port")]
    pub server_port: u16,
    pub docroot: PathBuf,
    #[serde(default)]
    pub allow_override: Option<String>,
    /// Extra template parameters (e.g. `multisite`)
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub sites_available: Option<PathBuf>,
    #[serde(default)]
    pub sites_enabled: Option<PathBuf>,
}

/// Symlink state of a site
#[derive(Debug, PartialEq, Eq)]
enum LinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
}

impl VirtualHostSpec {
    pub fn new(server_name: &str, docroot: impl Into<PathBuf>) -> Self {
        Self {
            template: default_template(),
            server_name: server_name.to_string(),
            server_aliases: Vec::new(),
            server_port: default_port(),
            docroot: docroot.into(),
            allow_override: None,
            params: Map::new(),
            enabled: true,
            sites_available: None,
            sites_enabled: None,
        }
    }

    pub fn aliases(mut self, aliases: Vec<String>) -> Self {
        self.server_aliases = aliases;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn description(&self, name: &str) -> String {
        let state = if self.enabled { "enabled" } else { "disabled" };
        format!("Site {name} ({}:{}), {state}", self.server_name, self.server_port)
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.server_name.trim().is_empty() {
            return Err("server_name is empty".to_string());
        }
        if self.server_port == 0 {
            return Err("server_port must be non-zero".to_string());
        }
        Ok(())
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.sites_available
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_SITES_AVAILABLE))
            .join(format!("{name}.conf"))
    }

    fn link_path(&self, name: &str) -> PathBuf {
        self.sites_enabled
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_SITES_ENABLED))
            .join(format!("{name}.conf"))
    }

    fn context(&self, name: &str, ctx: &ApplyContext) -> Value {
        let mut params = Map::new();
        params.insert("name".to_string(), json!(name));
        params.insert("server_name".to_string(), json!(self.server_name));
        params.insert("server_aliases".to_string(), json!(self.server_aliases));
        params.insert("server_port".to_string(), json!(self.server_port));
        params.insert("docroot".to_string(), json!(self.docroot));
        params.insert("allow_override".to_string(), json!(self.allow_override));
        params.extend(self.params.clone());
        json!({ "params": params, "node": ctx.node })
    }

    fn link_state(&self, name: &str, ctx: &ApplyContext) -> Result<LinkState> {
        let config = self.config_path(name);
        match ctx.sys.fs.read_link(&self.link_path(name))? {
            None => Ok(LinkState::Missing),
            Some(target) if target == config => Ok(LinkState::Correct),
            Some(target) => Ok(LinkState::WrongTarget(target)),
        }
    }

    pub(crate) fn check(&self, name: &str, ctx: &ApplyContext) -> Result<Drift> {
        let config = self.config_path(name);
        let mut changes = Vec::new();

        if let Drift::Drifted(change) =
            Rendered::new(ctx, &config, &self.template, &self.context(name, ctx))?.drift()
        {
            changes.push(change);
        }
        match (self.enabled, self.link_state(name, ctx)?) {
            (true, LinkState::Correct) | (false, LinkState::Missing) => {}
            (true, _) => changes.push(format!("enable {name}")),
            (false, _) => changes.push(format!("disable {name}")),
        }

        if changes.is_empty() {
            Ok(Drift::InSync)
        } else {
            Ok(Drift::Drifted(changes.join(", ")))
        }
    }

    pub(crate) fn apply(&self, name: &str, ctx: &ApplyContext) -> Result<Change> {
        let config = self.config_path(name);
        let link = self.link_path(name);
        let mut changes = Vec::new();

        let rendered = Rendered::new(ctx, &config, &self.template, &self.context(name, ctx))?;
        if let Change::Converged(detail) = rendered.write(ctx)? {
            changes.push(detail);
        }

        match (self.enabled, self.link_state(name, ctx)?) {
            (true, LinkState::Correct) | (false, LinkState::Missing) => {}
            (true, state) => {
                if let LinkState::WrongTarget(previous) = state {
                    log::debug!("{} pointed at {}", link.display(), previous.display());
                    ctx.sys.fs.remove_file(&link)?;
                }
                ctx.sys.fs.symlink(&config, &link)?;
                log::info!("Enabled site {name}");
                changes.push(format!("enabled {name}"));
            }
            (false, _) => {
                ctx.sys.fs.remove_file(&link)?;
                log::info!("Disabled site {name}");
                changes.push(format!("disabled {name}"));
            }
        }

        if changes.is_empty() {
            Ok(Change::Unchanged)
        } else {
            Ok(Change::Converged(changes.join(", ")))
        }
    }
}
