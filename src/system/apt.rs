//! Debian packages through dpkg and apt-get

use crate::runner;
use anyhow::{Result, bail};
use declarative::PackageManager;
use std::process::Command;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct Apt {
    /// Whether package lists were refreshed this run
    refreshed: Mutex<bool>,
}

impl Apt {
    pub fn new() -> Self {
        Self::default()
    }

    fn apt_get(args: &[&str]) -> Result<()> {
        let mut command = Command::new("apt-get");
        command
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive");
        let output = runner::output(&mut command)?;
        if !output.success() {
            bail!("{} failed: {}", runner::describe(&command), output.stderr.trim());
        }
        Ok(())
    }

    fn refresh_once(&self) -> Result<()> {
        let mut refreshed = self
            .refreshed
            .lock()
            .map_err(|_| anyhow::anyhow!("package list lock poisoned"))?;
        if !*refreshed {
            log::info!("Refreshing package lists");
            Self::apt_get(&["update", "-q"])?;
            *refreshed = true;
        }
        Ok(())
    }
}

/// Version from `dpkg-query -f '${Status}\t${Version}'`, if fully installed
fn parse_status(line: &str) -> Option<String> {
    let (status, version) = line.trim().split_once('\t')?;
    (status.split_whitespace().last() == Some("installed") && !version.is_empty())
        .then(|| version.to_string())
}

impl PackageManager for Apt {
    fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let mut command = Command::new("dpkg-query");
        command.args(["-W", "-f=${Status}\\t${Version}", name]);
        let output = runner::output(&mut command)?;
        // Unknown packages exit non-zero
        if !output.success() {
            return Ok(None);
        }
        Ok(parse_status(&output.stdout))
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        if !runner::command_exists("apt-get") {
            bail!("apt-get not found; packages can only be installed on Debian-based systems");
        }
        self.refresh_once()?;
        let target = match version {
            Some(version) => format!("{name}={version}"),
            None => name.to_string(),
        };
        log::info!("Installing {target}");
        Self::apt_get(&["install", "-y", "-q", "--no-install-recommends", &target])
    }
}
