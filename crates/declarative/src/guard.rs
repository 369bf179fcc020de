//! Guard evaluator
//!
//! Guards are read-only predicates over the live system that decide whether
//! a resource's action runs this time. `only_if` guards must all be true and
//! `not_if` guards must all be false; a resource without guards always runs.

use crate::context::ApplyContext;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Which way a guard gates its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Run only if the check is true
    OnlyIf,
    /// Run unless the check is true
    NotIf,
}

/// The check a guard performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum GuardCheck {
    /// True when the command exits zero
    Command {
        command: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    /// True when the path exists
    FileExists { path: PathBuf },
    /// True when the path is owned by `owner`
    OwnedBy { path: PathBuf, owner: String },
    /// True when some line of the file matches `pattern`
    FileContains { path: PathBuf, pattern: String },
}

impl GuardCheck {
    pub fn command(command: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            user: None,
            cwd: None,
        }
    }

    pub fn file_exists(path: impl Into<PathBuf>) -> Self {
        Self::FileExists { path: path.into() }
    }

    pub fn owned_by(path: impl Into<PathBuf>, owner: impl Into<String>) -> Self {
        Self::OwnedBy {
            path: path.into(),
            owner: owner.into(),
        }
    }

    pub fn file_contains(path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::FileContains {
            path: path.into(),
            pattern: pattern.into(),
        }
    }

    /// Evaluate against the live system. Never mutates anything.
    pub fn evaluate(&self, ctx: &ApplyContext) -> Result<bool> {
        match self {
            Self::Command { command, user, cwd } => {
                let output = ctx
                    .run_command(command, user.as_deref(), cwd.as_deref(), &BTreeMap::new())
                    .map_err(|e| Error::GuardEvaluation {
                        message: format!("could not run `{command}`: {e:#}"),
                    })?;
                Ok(output.success())
            }
            Self::FileExists { path } => Ok(ctx.sys.fs.exists(path)),
            Self::OwnedBy { path, owner } => {
                let current = ctx.sys.fs.owner(path).map_err(|e| Error::GuardEvaluation {
                    message: format!("could not read owner of {}: {e:#}", path.display()),
                })?;
                Ok(current.as_deref() == Some(owner.as_str()))
            }
            Self::FileContains { path, pattern } => {
                let regex = Regex::new(pattern).map_err(|e| Error::GuardEvaluation {
                    message: format!("invalid pattern {pattern:?}: {e}"),
                })?;
                let content = ctx
                    .sys
                    .fs
                    .read_to_string(path)
                    .map_err(|e| Error::GuardEvaluation {
                        message: format!("could not read {}: {e:#}", path.display()),
                    })?;
                Ok(content.is_some_and(|c| c.lines().any(|line| regex.is_match(line))))
            }
        }
    }
}

impl fmt::Display for GuardCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { command, .. } => write!(f, "`{command}`"),
            Self::FileExists { path } => write!(f, "{} exists", path.display()),
            Self::OwnedBy { path, owner } => write!(f, "{} owned by {owner}", path.display()),
            Self::FileContains { path, pattern } => {
                write!(f, "{} contains /{pattern}/", path.display())
            }
        }
    }
}

/// A check plus its polarity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    pub polarity: Polarity,
    #[serde(flatten)]
    pub check: GuardCheck,
}

impl Guard {
    pub fn only_if(check: GuardCheck) -> Self {
        Self {
            polarity: Polarity::OnlyIf,
            check,
        }
    }

    pub fn not_if(check: GuardCheck) -> Self {
        Self {
            polarity: Polarity::NotIf,
            check,
        }
    }

    /// Whether a check result lets the action run
    fn permits(&self, check_result: bool) -> bool {
        match self.polarity {
            Polarity::OnlyIf => check_result,
            Polarity::NotIf => !check_result,
        }
    }

    fn describe_block(&self) -> String {
        match self.polarity {
            Polarity::OnlyIf => format!("only_if {} was false", self.check),
            Polarity::NotIf => format!("not_if {} was true", self.check),
        }
    }
}

/// What to do when a guard's check itself errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardErrorPolicy {
    /// Treat the guard as blocking and skip the resource
    #[default]
    Skip,
    /// Fail the resource
    Fail,
}

/// Decision for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Block { reason: String },
}

/// Evaluate every guard of a resource and compose the results.
///
/// All guards are evaluated. A guard that definitively blocks wins over an
/// evaluation error elsewhere in the list; otherwise an error is resolved by
/// `policy`.
pub fn evaluate_guards(
    guards: &[Guard],
    ctx: &ApplyContext,
    policy: GuardErrorPolicy,
) -> Result<Verdict> {
    let mut blocked: Option<String> = None;
    let mut first_error: Option<Error> = None;

    for guard in guards {
        match guard.check.evaluate(ctx) {
            Ok(result) if guard.permits(result) => {}
            Ok(_) => {
                if blocked.is_none() {
                    blocked = Some(guard.describe_block());
                }
            }
            Err(err) => {
                log::warn!("guard {} could not be evaluated: {err}", guard.check);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    if let Some(reason) = blocked {
        return Ok(Verdict::Block { reason });
    }
    match (first_error, policy) {
        (None, _) => Ok(Verdict::Permit),
        (Some(err), GuardErrorPolicy::Skip) => Ok(Verdict::Block {
            reason: format!("guard error treated as false: {err}"),
        }),
        (Some(err), GuardErrorPolicy::Fail) => Err(err),
    }
}
