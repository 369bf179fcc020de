//! Resource registry - the fixed catalog of resource kinds
//!
//! Each kind is a plain property struct with a read-only `check` and an
//! `apply` that re-derives truth from the live system before changing it.
//! [`ResourceSpec`] is the tagged variant the engine dispatches on; there is
//! no open-ended registration of new kinds.

pub mod checkout;
pub mod cron;
pub mod execute;
pub mod line_edit;
pub mod ownership;
pub mod package;
pub mod template;
pub mod vhost;

use crate::context::ApplyContext;
use crate::error::Result;
use crate::guard::Guard;
use crate::types::{Change, Drift};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use checkout::CheckoutSpec;
pub use cron::{CronEntry, CronSchedule, CronSpec};
pub use execute::ExecuteSpec;
pub use line_edit::{LineEditSpec, LineReplacement};
pub use ownership::OwnershipSpec;
pub use package::PackageSpec;
pub use template::TemplateSpec;
pub use vhost::VirtualHostSpec;

/// Kind tag of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Package,
    Execute,
    LineEdit,
    Template,
    #[serde(rename = "git")]
    SourceCheckout,
    #[serde(rename = "cron")]
    ScheduledJob,
    #[serde(rename = "web_app")]
    VirtualHost,
    Ownership,
}

impl Kind {
    pub const ALL: [Kind; 8] = [
        Kind::Package,
        Kind::Execute,
        Kind::LineEdit,
        Kind::Template,
        Kind::SourceCheckout,
        Kind::ScheduledJob,
        Kind::VirtualHost,
        Kind::Ownership,
    ];

    /// Tag used in recipes and resource ids
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Package => "package",
            Kind::Execute => "execute",
            Kind::LineEdit => "line_edit",
            Kind::Template => "template",
            Kind::SourceCheckout => "git",
            Kind::ScheduledJob => "cron",
            Kind::VirtualHost => "web_app",
            Kind::Ownership => "ownership",
        }
    }

    /// Resolve a tag or a common alias (`packages`, `vhost`, `checkout`, ...)
    pub fn from_alias(name: &str) -> Option<Kind> {
        let kind = match name {
            "package" | "packages" | "apt" => Kind::Package,
            "execute" | "exec" | "command" => Kind::Execute,
            "line_edit" | "env" | "file_edit" => Kind::LineEdit,
            "template" | "templates" => Kind::Template,
            "git" | "checkout" | "source" => Kind::SourceCheckout,
            "cron" | "job" | "jobs" => Kind::ScheduledJob,
            "web_app" | "vhost" | "site" => Kind::VirtualHost,
            "ownership" | "chown" => Kind::Ownership,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Properties of a resource, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Package(PackageSpec),
    Execute(ExecuteSpec),
    LineEdit(LineEditSpec),
    Template(TemplateSpec),
    #[serde(rename = "git")]
    SourceCheckout(CheckoutSpec),
    #[serde(rename = "cron")]
    ScheduledJob(CronSpec),
    #[serde(rename = "web_app")]
    VirtualHost(VirtualHostSpec),
    Ownership(OwnershipSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Package(_) => Kind::Package,
            Self::Execute(_) => Kind::Execute,
            Self::LineEdit(_) => Kind::LineEdit,
            Self::Template(_) => Kind::Template,
            Self::SourceCheckout(_) => Kind::SourceCheckout,
            Self::ScheduledJob(_) => Kind::ScheduledJob,
            Self::VirtualHost(_) => Kind::VirtualHost,
            Self::Ownership(_) => Kind::Ownership,
        }
    }

    /// Human-readable description of what the resource converges
    pub fn description(&self, name: &str) -> String {
        match self {
            Self::Package(spec) => spec.description(),
            Self::Execute(spec) => spec.description(),
            Self::LineEdit(spec) => spec.description(),
            Self::Template(spec) => spec.description(),
            Self::SourceCheckout(spec) => spec.description(),
            Self::ScheduledJob(spec) => spec.description(name),
            Self::VirtualHost(spec) => spec.description(name),
            Self::Ownership(spec) => spec.description(),
        }
    }

    /// Guards a kind carries regardless of what the author declared
    pub fn implicit_guards(&self) -> Vec<Guard> {
        match self {
            Self::Ownership(spec) => vec![spec.ownership_guard()],
            _ => Vec::new(),
        }
    }

    /// Reject inconsistent properties before the run starts
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Package(spec) => spec.validate(),
            Self::Execute(spec) => spec.validate(),
            Self::LineEdit(spec) => spec.validate(),
            Self::Template(_) | Self::Ownership(_) => Ok(()),
            Self::SourceCheckout(spec) => spec.validate(),
            Self::ScheduledJob(spec) => spec.validate(),
            Self::VirtualHost(spec) => spec.validate(),
        }
    }

    /// Read-only drift check against the live system
    pub fn check(&self, name: &str, ctx: &mut ApplyContext) -> Result<Drift> {
        match self {
            Self::Package(spec) => spec.check(ctx),
            Self::Execute(spec) => spec.check(ctx),
            Self::LineEdit(spec) => spec.check(ctx),
            Self::Template(spec) => spec.check(ctx),
            Self::SourceCheckout(spec) => spec.check(ctx),
            Self::ScheduledJob(spec) => spec.check(name, ctx),
            Self::VirtualHost(spec) => spec.check(name, ctx),
            Self::Ownership(spec) => spec.check(ctx),
        }
    }

    /// Converge the live system to the resource
    pub fn apply(&self, name: &str, ctx: &mut ApplyContext) -> Result<Change> {
        match self {
            Self::Package(spec) => spec.apply(ctx),
            Self::Execute(spec) => spec.apply(ctx),
            Self::LineEdit(spec) => spec.apply(ctx),
            Self::Template(spec) => spec.apply(ctx),
            Self::SourceCheckout(spec) => spec.apply(ctx),
            Self::ScheduledJob(spec) => spec.apply(name, ctx),
            Self::VirtualHost(spec) => spec.apply(name, ctx),
            Self::Ownership(spec) => spec.apply(ctx),
        }
    }
}

macro_rules! spec_from {
    ($($spec:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$spec> for ResourceSpec {
                fn from(spec: $spec) -> Self {
                    ResourceSpec::$variant(spec)
                }
            }
        )*
    };
}

spec_from! {
    PackageSpec => Package,
    ExecuteSpec => Execute,
    LineEditSpec => LineEdit,
    TemplateSpec => Template,
    CheckoutSpec => SourceCheckout,
    CronSpec => ScheduledJob,
    VirtualHostSpec => VirtualHost,
    OwnershipSpec => Ownership,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip_through_aliases() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_alias(kind.as_str()), Some(kind));
        }
        assert_eq!(Kind::from_alias("vhost"), Some(Kind::VirtualHost));
        assert_eq!(Kind::from_alias("ruby_block"), None);
    }

    #[test]
    fn test_spec_tag_matches_kind() {
        let spec: ResourceSpec = serde_json::from_value(serde_json::json!({
            "kind": "git",
            "destination": "/srv/site1",
            "repository": "git@example.com:site1.git",
            "revision": "abc123"
        }))
        .unwrap();
        assert_eq!(spec.kind(), Kind::SourceCheckout);
        assert_eq!(
            serde_json::to_value(spec.kind()).unwrap(),
            serde_json::json!(spec.kind().as_str())
        );
    }
}
