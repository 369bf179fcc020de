//! Declared resources
//!
//! A Resource is one unit of desired state: a kind-tagged property bag, the
//! guards gating its action, and how the run treats its failure. Resources
//! are built at recipe-load time and never persisted between runs; every
//! check re-derives truth from the live machine.

use crate::guard::{Guard, GuardCheck, GuardErrorPolicy};
use crate::kinds::{Kind, ResourceSpec};
use serde::{Deserialize, Serialize};

/// A declared resource, identified by `(kind, name)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(flatten)]
    pub spec: ResourceSpec,
    /// Declared guards, in author order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guards: Vec<Guard>,
    /// Failure is recorded but does not abort the run
    #[serde(default)]
    pub best_effort: bool,
    /// Overrides the run's guard error policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_guard_error: Option<GuardErrorPolicy>,
    /// Commands to run once at the end of the run if this resource converges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifies: Vec<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, spec: impl Into<ResourceSpec>) -> Self {
        Self {
            name: name.into(),
            spec: spec.into(),
            guards: Vec::new(),
            best_effort: false,
            on_guard_error: None,
            notifies: Vec::new(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.spec.kind()
    }

    /// Stable identifier, `kind[name]`
    pub fn id(&self) -> String {
        format!("{}[{}]", self.kind(), self.name)
    }

    pub fn description(&self) -> String {
        self.spec.description(&self.name)
    }

    /// Run only if `check` holds
    pub fn only_if(mut self, check: GuardCheck) -> Self {
        self.guards.push(Guard::only_if(check));
        self
    }

    /// Run unless `check` holds
    pub fn not_if(mut self, check: GuardCheck) -> Self {
        self.guards.push(Guard::not_if(check));
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    pub fn on_guard_error(mut self, policy: GuardErrorPolicy) -> Self {
        self.on_guard_error = Some(policy);
        self
    }

    pub fn notifies(mut self, command: impl Into<String>) -> Self {
        self.notifies.push(command.into());
        self
    }

    /// Guards the kind implies followed by the declared ones
    pub fn all_guards(&self) -> Vec<Guard> {
        let mut guards = self.spec.implicit_guards();
        guards.extend(self.guards.iter().cloned());
        guards
    }
}
