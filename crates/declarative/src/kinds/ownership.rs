//! Ownership normalization resource
//!
//! Always guarded by an ownership check, so a tree that already has the
//! right owner is skipped without being walked.

use crate::context::ApplyContext;
use crate::error::Result;
use crate::guard::{Guard, GuardCheck};
use crate::types::{Change, Drift};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn recursive_by_default() -> bool {
    true
}

/// Force an owner (and optionally a group) onto a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipSpec {
    pub path: PathBuf,
    pub owner: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default = "recursive_by_default")]
    pub recursive: bool,
}

impl OwnershipSpec {
    pub fn new(path: impl Into<PathBuf>, owner: &str) -> Self {
        Self {
            path: path.into(),
            owner: owner.to_string(),
            group: None,
            recursive: true,
        }
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub(crate) fn description(&self) -> String {
        let who = match &self.group {
            Some(group) => format!("{}:{group}", self.owner),
            None => self.owner.clone(),
        };
        format!("Own {} by {who}", self.path.display())
    }

    pub(crate) fn ownership_guard(&self) -> Guard {
        Guard::not_if(GuardCheck::owned_by(self.path.clone(), self.owner.clone()))
    }

    pub(crate) fn check(&self, ctx: &ApplyContext) -> Result<Drift> {
        match ctx.sys.fs.owner(&self.path)? {
            Some(owner) if owner == self.owner => Ok(Drift::InSync),
            Some(owner) => Ok(Drift::Drifted(format!(
                "chown {} from {owner} to {}",
                self.path.display(),
                self.owner
            ))),
            None => Ok(Drift::Drifted(format!(
                "chown {} (does not exist yet)",
                self.path.display()
            ))),
        }
    }

    pub(crate) fn apply(&self, ctx: &ApplyContext) -> Result<Change> {
        ctx.sys.fs.chown(
            &self.path,
            &self.owner,
            self.group.as_deref(),
            self.recursive,
        )?;
        log::info!("Changed owner of {} to {}", self.path.display(), self.owner);
        Ok(Change::Converged(format!(
            "{} owned by {}",
            self.path.display(),
            self.owner
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{GuardErrorPolicy, Verdict, evaluate_guards};
    use crate::testing::Machine;
    use std::path::Path;

    #[test]
    fn test_guard_skips_when_owner_correct() {
        let machine = Machine::new();
        machine.fs.put_owned("/srv/site1", "", "www-data");
        let ctx = machine.context();
        let spec = OwnershipSpec::new("/srv/site1", "www-data");

        let verdict =
            evaluate_guards(&[spec.ownership_guard()], &ctx, GuardErrorPolicy::Fail).unwrap();
        assert!(matches!(verdict, Verdict::Block { .. }));
        assert_eq!(spec.check(&ctx).unwrap(), Drift::InSync);
    }

    #[test]
    fn test_recursive_chown() {
        let machine = Machine::new();
        machine.fs.put_owned("/srv/site1", "", "root");
        machine.fs.put_owned("/srv/site1/index.php", "<?php", "root");
        let ctx = machine.context();

        let spec = OwnershipSpec::new("/srv/site1", "www-data").group("www-data");
        assert!(matches!(spec.apply(&ctx).unwrap(), Change::Converged(_)));
        assert_eq!(
            machine.fs.owner_of(Path::new("/srv/site1/index.php")).as_deref(),
            Some("www-data")
        );
    }
}
