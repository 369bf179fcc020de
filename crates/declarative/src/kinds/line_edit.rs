//! File-line-edit resource
//!
//! Thin wrapper over the variable propagator: insert-if-no-match into an
//! environment file or the process environment, or a one-shot line replace.

use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::propagate::{
    self, ConflictPolicy, EnvironmentBinding, LineSyntax, PropagationReport, insert_if_no_match,
    propagate_process, replace_line,
};
use crate::types::{Change, Drift};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

/// Overwrite every line matching `pattern` with `replacement`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReplacement {
    pub pattern: String,
    pub replacement: String,
}

/// A line edit against a text file or the process environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEditSpec {
    /// Target file; `None` targets the process environment
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub syntax: LineSyntax,
    #[serde(
        default,
        serialize_with = "serialize_bindings",
        deserialize_with = "deserialize_bindings"
    )]
    pub bindings: Vec<EnvironmentBinding>,
    #[serde(default)]
    pub replace: Option<LineReplacement>,
    #[serde(default)]
    pub on_conflict: Option<ConflictPolicy>,
}

fn serialize_bindings<S: Serializer>(
    bindings: &[EnvironmentBinding],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(bindings.iter().map(|b| (&b.key, &b.value)))
}

fn deserialize_bindings<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<EnvironmentBinding>, D::Error> {
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(EnvironmentBinding::from_map(&map))
}

impl LineEditSpec {
    /// Insert-if-no-match into a text file
    pub fn insert_into_file(
        path: impl Into<PathBuf>,
        syntax: LineSyntax,
        bindings: Vec<EnvironmentBinding>,
    ) -> Self {
        Self {
            path: Some(path.into()),
            syntax,
            bindings,
            replace: None,
            on_conflict: None,
        }
    }

    /// Insert-if-no-match into the process environment
    pub fn insert_into_process(bindings: Vec<EnvironmentBinding>) -> Self {
        Self {
            path: None,
            syntax: LineSyntax::default(),
            bindings,
            replace: None,
            on_conflict: None,
        }
    }

    /// Overwrite a settings line that is expected to exist already
    pub fn replace_line(path: impl Into<PathBuf>, pattern: &str, replacement: &str) -> Self {
        Self {
            path: Some(path.into()),
            syntax: LineSyntax::default(),
            bindings: Vec::new(),
            replace: Some(LineReplacement {
                pattern: pattern.to_string(),
                replacement: replacement.to_string(),
            }),
            on_conflict: None,
        }
    }

    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = Some(policy);
        self
    }

    fn target_name(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "process environment".to_string(),
        }
    }

    pub(crate) fn description(&self) -> String {
        match &self.replace {
            Some(replace) => format!(
                "Replace /{}/ in {} with {}",
                replace.pattern,
                self.target_name(),
                replace.replacement
            ),
            None => format!(
                "Ensure {} binding(s) in {}",
                self.bindings.len(),
                self.target_name()
            ),
        }
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        match &self.replace {
            Some(_) if self.path.is_none() => {
                Err("replace requires a file path".to_string())
            }
            Some(_) if !self.bindings.is_empty() => {
                Err("bindings and replace cannot be combined".to_string())
            }
            Some(replace) => Regex::new(&replace.pattern)
                .map(|_| ())
                .map_err(|e| format!("invalid pattern: {e}")),
            None => Ok(()),
        }
    }

    /// Apply the conflict policy to a propagation report
    ///
    /// Under the warn policy each conflict is also recorded on the context so
    /// it lands in the resource's report.
    fn settle(
        &self,
        ctx: &mut ApplyContext,
        report: PropagationReport,
    ) -> Result<PropagationReport> {
        let policy = self.on_conflict.unwrap_or(ctx.on_conflict);
        let target = self.target_name();
        for conflict in &report.conflicts {
            let warning = format!(
                "{} in {target} is {:?}, requested {:?}; left untouched",
                conflict.key, conflict.existing, conflict.requested
            );
            log::warn!("{warning}");
            if policy == ConflictPolicy::Warn {
                ctx.warnings.push(warning);
            }
        }
        if policy == ConflictPolicy::Fail
            && let Some(conflict) = report.conflicts.first()
        {
            return Err(conflict.clone().into_error(&target));
        }
        Ok(report)
    }

    fn describe_insert(&self, report: &PropagationReport) -> String {
        let mut detail = format!(
            "inserted {} into {}",
            report.inserted.join(", "),
            self.target_name()
        );
        if !report.conflicts.is_empty() {
            let keys: Vec<_> = report.conflicts.iter().map(|c| c.key.as_str()).collect();
            detail.push_str(&format!(" (conflicting, left as is: {})", keys.join(", ")));
        }
        detail
    }

    pub(crate) fn check(&self, ctx: &mut ApplyContext) -> Result<Drift> {
        if let Some(replace) = &self.replace {
            let Some(path) = &self.path else {
                return Ok(Drift::InSync);
            };
            let pattern = Regex::new(&replace.pattern)?;
            let content = ctx.sys.fs.read_to_string(path)?.unwrap_or_default();
            return Ok(match replace_line(&content, &pattern, &replace.replacement) {
                Some(_) => Drift::Drifted(format!("rewrite /{}/ in {}", replace.pattern, path.display())),
                None => Drift::InSync,
            });
        }

        let report = match &self.path {
            Some(path) => {
                let content = ctx.sys.fs.read_to_string(path)?.unwrap_or_default();
                insert_if_no_match(&content, &self.bindings, self.syntax)?.1
            }
            None => {
                let mut scratch = ctx.env.clone();
                propagate_process(&mut scratch, &self.bindings)
            }
        };
        let report = self.settle(ctx, report)?;
        if report.is_changed() {
            Ok(Drift::Drifted(self.describe_insert(&report)))
        } else {
            Ok(Drift::InSync)
        }
    }

    pub(crate) fn apply(&self, ctx: &mut ApplyContext) -> Result<Change> {
        if let Some(replace) = &self.replace {
            let Some(path) = &self.path else {
                return Err(Error::InvalidResource {
                    id: self.target_name(),
                    message: "replace requires a file path".to_string(),
                });
            };
            let pattern = Regex::new(&replace.pattern)?;
            let changed =
                propagate::replace_line_in_file(ctx.sys.fs, path, &pattern, &replace.replacement)?;
            return Ok(if changed {
                log::info!("Rewrote /{}/ in {}", replace.pattern, path.display());
                Change::Converged(format!("rewrote /{}/ in {}", replace.pattern, path.display()))
            } else {
                Change::Unchanged
            });
        }

        // Conflicts are settled before anything is written
        let preview = match &self.path {
            Some(path) => {
                let content = ctx.sys.fs.read_to_string(path)?.unwrap_or_default();
                insert_if_no_match(&content, &self.bindings, self.syntax)?.1
            }
            None => {
                let mut scratch = ctx.env.clone();
                propagate_process(&mut scratch, &self.bindings)
            }
        };
        self.settle(ctx, preview)?;

        let report = match &self.path {
            Some(path) => {
                propagate::propagate_file(ctx.sys.fs, path, &self.bindings, self.syntax)?
            }
            None => propagate_process(&mut ctx.env, &self.bindings),
        };

        if report.is_changed() {
            Ok(Change::Converged(self.describe_insert(&report)))
        } else {
            Ok(Change::Unchanged)
        }
    }
}
