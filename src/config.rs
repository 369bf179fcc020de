use anyhow::{Context, Result};
use declarative::{ConflictPolicy, GuardErrorPolicy, NameScope};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// System-wide settings file
const SYSTEM_CONFIG: &str = "/etc/steward/config.toml";

/// Get the per-user config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("steward"))
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory templates are looked up in
    pub templates_dir: String,
    /// Scope within which resource names must be unique
    pub name_scope: NameScope,
    /// Default for resources that do not set `on_guard_error`
    pub on_guard_error: GuardErrorPolicy,
    /// Default for line edits that do not set `on_conflict`
    pub on_conflict: ConflictPolicy,
    /// Interpreter used for every shell command
    pub shell: String,
    /// Default owner of scheduled jobs
    pub cron_user: String,
    pub apache: ApacheSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApacheSettings {
    pub sites_available: String,
    pub sites_enabled: String,
    /// Notified when a virtual host converges
    pub reload_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            templates_dir: "/etc/steward/templates".to_string(),
            name_scope: NameScope::default(),
            on_guard_error: GuardErrorPolicy::default(),
            on_conflict: ConflictPolicy::default(),
            shell: "/bin/sh".to_string(),
            cron_user: "root".to_string(),
            apache: ApacheSettings::default(),
        }
    }
}

impl Default for ApacheSettings {
    fn default() -> Self {
        Self {
            sites_available: declarative::kinds::vhost::DEFAULT_SITES_AVAILABLE.to_string(),
            sites_enabled: declarative::kinds::vhost::DEFAULT_SITES_ENABLED.to_string(),
            reload_command: "apache2ctl graceful".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `explicit`, else the user file, else the system file,
    /// else defaults. An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let candidates = [
            config_dir().ok().map(|dir| dir.join("config.toml")),
            Some(PathBuf::from(SYSTEM_CONFIG)),
        ];
        for path in candidates.into_iter().flatten() {
            if path.exists() {
                return Self::load_file(&path);
            }
        }

        log::debug!("no settings file found, using defaults");
        Ok(Self::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings = Self::parse(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn templates_path(&self) -> PathBuf {
        expand_path(&self.templates_dir)
    }
}
