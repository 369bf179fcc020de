//! OS package resource

use crate::context::ApplyContext;
use crate::error::Result;
use crate::types::{Change, Drift};
use serde::{Deserialize, Serialize};

/// A package installed through the OS package manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name as the package manager knows it
    pub package: String,
    /// Pin to this version; any installed version satisfies `None`
    #[serde(default)]
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub(crate) fn description(&self) -> String {
        match &self.version {
            Some(version) => format!("Install package {} {}", self.package, version),
            None => format!("Install package {}", self.package),
        }
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.package.trim().is_empty() {
            return Err("package name is empty".to_string());
        }
        Ok(())
    }

    /// Whether the installed version satisfies this resource
    fn satisfied_by(&self, installed: Option<&str>) -> bool {
        match (installed, &self.version) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(installed), Some(wanted)) => installed == wanted,
        }
    }

    pub(crate) fn check(&self, ctx: &ApplyContext) -> Result<Drift> {
        let installed = ctx.sys.packages.installed_version(&self.package)?;
        if self.satisfied_by(installed.as_deref()) {
            return Ok(Drift::InSync);
        }
        Ok(Drift::Drifted(match installed {
            Some(current) => format!(
                "upgrade {} from {} to {}",
                self.package,
                current,
                self.version.as_deref().unwrap_or("latest")
            ),
            None => format!("install {}", self.package),
        }))
    }

    pub(crate) fn apply(&self, ctx: &ApplyContext) -> Result<Change> {
        let installed = ctx.sys.packages.installed_version(&self.package)?;
        if self.satisfied_by(installed.as_deref()) {
            return Ok(Change::Unchanged);
        }

        ctx.sys
            .packages
            .install(&self.package, self.version.as_deref())?;

        let version = ctx
            .sys
            .packages
            .installed_version(&self.package)?
            .unwrap_or_else(|| "unknown version".to_string());
        log::info!("Installed {} ({version})", self.package);
        Ok(Change::Converged(format!("installed {} {version}", self.package)))
    }
}
