//! Source-checkout resource

use crate::context::{ApplyContext, CheckoutRequest};
use crate::error::Result;
use crate::types::{Change, Drift};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_revision() -> String {
    "HEAD".to_string()
}

/// A working copy at a requested revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSpec {
    pub destination: PathBuf,
    pub repository: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    /// Private key used for SSH remotes
    #[serde(default)]
    pub deploy_key: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

/// Whether a checked-out revision satisfies the requested one.
///
/// Abbreviated commit ids (7+ characters) match by prefix.
pub fn revision_matches(current: &str, requested: &str) -> bool {
    current == requested
        || (requested.len() >= 7
            && requested.chars().all(|c| c.is_ascii_hexdigit())
            && current.starts_with(requested))
}

impl CheckoutSpec {
    pub fn new(destination: impl Into<PathBuf>, repository: &str, revision: &str) -> Self {
        Self {
            destination: destination.into(),
            repository: repository.to_string(),
            revision: revision.to_string(),
            deploy_key: None,
            user: None,
        }
    }

    pub fn deploy_key(mut self, key: &str) -> Self {
        self.deploy_key = Some(key.to_string());
        self
    }

    pub(crate) fn description(&self) -> String {
        format!(
            "Check out {}@{} into {}",
            self.repository,
            self.revision,
            self.destination.display()
        )
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.repository.trim().is_empty() {
            return Err("repository is empty".to_string());
        }
        if self.revision.trim().is_empty() {
            return Err("revision is empty".to_string());
        }
        Ok(())
    }

    fn current(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        Ok(ctx.sys.scm.revision(&self.destination)?)
    }

    pub(crate) fn check(&self, ctx: &ApplyContext) -> Result<Drift> {
        Ok(match self.current(ctx)? {
            Some(current) if revision_matches(&current, &self.revision) => Drift::InSync,
            Some(current) => Drift::Drifted(format!(
                "move {} from {} to {}",
                self.destination.display(),
                current,
                self.revision
            )),
            None => Drift::Drifted(format!(
                "clone {} into {}",
                self.repository,
                self.destination.display()
            )),
        })
    }

    pub(crate) fn apply(&self, ctx: &ApplyContext) -> Result<Change> {
        let before = self.current(ctx)?;
        if let Some(current) = &before
            && revision_matches(current, &self.revision)
        {
            return Ok(Change::Unchanged);
        }

        let after = ctx.sys.scm.checkout(&CheckoutRequest {
            url: &self.repository,
            revision: &self.revision,
            deploy_key: self.deploy_key.as_deref(),
            destination: &self.destination,
            user: self.user.as_deref(),
        })?;

        if before.as_deref() == Some(after.as_str()) {
            return Ok(Change::Unchanged);
        }
        log::info!("Checked out {} at {after}", self.destination.display());
        Ok(Change::Converged(format!(
            "{} now at {after}",
            self.destination.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Machine;
    use std::path::Path;

    const REPO: &str = "git@example.com:site1.git";

    #[test]
    fn test_already_at_revision_makes_no_network_call() {
        let machine = Machine::new();
        machine.scm.set_revision("/srv/site1", "abc123");
        let ctx = machine.context();

        let spec = CheckoutSpec::new("/srv/site1", REPO, "abc123");
        assert_eq!(spec.check(&ctx).unwrap(), Drift::InSync);
        assert_eq!(spec.apply(&ctx).unwrap(), Change::Unchanged);
        assert_eq!(machine.scm.checkout_count(), 0);
    }

    #[test]
    fn test_new_revision_converges() {
        let machine = Machine::new();
        machine.scm.set_revision("/srv/site1", "abc123");
        let ctx = machine.context();

        let spec = CheckoutSpec::new("/srv/site1", REPO, "def456").deploy_key("-----KEY-----");
        assert!(matches!(spec.apply(&ctx).unwrap(), Change::Converged(_)));
        assert_eq!(
            machine.scm.revision_at(Path::new("/srv/site1")).as_deref(),
            Some("def456")
        );
        assert_eq!(machine.scm.checkout_count(), 1);
        assert_eq!(machine.scm.last_deploy_key().as_deref(), Some("-----KEY-----"));
    }

    #[test]
    fn test_fresh_clone() {
        let machine = Machine::new();
        let ctx = machine.context();
        let spec = CheckoutSpec::new("/srv/site1", REPO, "abc123");
        assert_eq!(
            spec.check(&ctx).unwrap(),
            Drift::Drifted(format!("clone {REPO} into /srv/site1"))
        );
        spec.apply(&ctx).unwrap();
        assert_eq!(spec.apply(&ctx).unwrap(), Change::Unchanged);
    }

    #[test]
    fn test_revision_matching() {
        assert!(revision_matches("abc123", "abc123"));
        assert!(revision_matches(
            "9fceb02d0ae598e95dc970b74767f19372d61af8",
            "9fceb02"
        ));
        assert!(!revision_matches("9fceb02d0ae598e95dc970b74767f19372d61af8", "9fc"));
        assert!(!revision_matches("9fceb02d0ae598e95dc970b74767f19372d61af8", "master"));
    }
}
