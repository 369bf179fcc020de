//! Error types for convergence runs.
//!
//! Errors are categorized so that a failed outcome can carry both a
//! human-readable cause and a category the caller can act on.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Categories of convergence errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A required input was missing (e.g. no inventory record matched)
    PreconditionNotMet,
    /// A guard's underlying check could not be evaluated
    GuardEvaluation,
    /// A resource action returned non-zero or raised
    ActionFailed,
    /// A binding's key already exists with a different value
    PropagationConflict,
    /// The run list itself is malformed
    InvalidRunList,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::PreconditionNotMet => "Precondition not met",
            Self::GuardEvaluation => "Guard could not be evaluated",
            Self::ActionFailed => "Action failed",
            Self::PropagationConflict => "Conflicting binding",
            Self::InvalidRunList => "Invalid run list",
        }
    }

    /// Whether errors of this category stop the run before any resource is applied.
    pub fn is_fatal_before_run(&self) -> bool {
        matches!(self, Self::PreconditionNotMet | Self::InvalidRunList)
    }
}

/// Errors that can occur while loading or converging resources.
#[derive(Debug, Error)]
pub enum Error {
    /// Required input missing, e.g. an inventory query returned no record
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    /// A guard's check itself errored
    #[error("guard evaluation failed: {message}")]
    GuardEvaluation {
        /// What went wrong while evaluating
        message: String,
    },

    /// The resource action failed
    #[error("action failed: {message}")]
    ActionFailed {
        /// Description of the failed action
        message: String,
        /// Standard error output, if the action was a command
        stderr: String,
    },

    /// A binding exists with a different value than requested
    #[error("conflicting value for {key} in {target}: found {existing:?}, requested {requested:?}")]
    PropagationConflict {
        /// File path or "process environment"
        target: String,
        /// Binding key
        key: String,
        /// Value currently present
        existing: String,
        /// Value the run asked for
        requested: String,
    },

    /// Two resources share a name within the configured uniqueness scope
    #[error("duplicate resource {id}")]
    DuplicateResource {
        /// Display id of the second declaration
        id: String,
    },

    /// Resource properties are inconsistent
    #[error("invalid resource {id}: {message}")]
    InvalidResource {
        /// Display id of the resource
        id: String,
        /// What is wrong with it
        message: String,
    },

    /// A line pattern failed to compile
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A file expected to be text could not be decoded
    #[error("{} is not valid UTF-8", .0.display())]
    NotText(PathBuf),

    /// An external collaborator (shell, filesystem, git, ...) failed
    #[error("{0:#}")]
    Collaborator(#[from] anyhow::Error),
}

impl Error {
    /// Build an action failure from a command's exit status and output.
    pub fn command_failed(command: &str, exit_code: i32, stderr: &str) -> Self {
        Error::ActionFailed {
            message: format!("`{command}` exited with status {exit_code}"),
            stderr: stderr.trim().to_string(),
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::PreconditionNotMet(_) => ErrorCategory::PreconditionNotMet,
            Error::GuardEvaluation { .. } => ErrorCategory::GuardEvaluation,
            Error::PropagationConflict { .. } => ErrorCategory::PropagationConflict,
            Error::DuplicateResource { .. } | Error::InvalidResource { .. } => {
                ErrorCategory::InvalidRunList
            }
            Error::ActionFailed { .. }
            | Error::Pattern(_)
            | Error::NotText(_)
            | Error::Collaborator(_) => ErrorCategory::ActionFailed,
        }
    }
}

/// Result type for convergence operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            Error::PreconditionNotMet("no app".into()).category(),
            ErrorCategory::PreconditionNotMet
        );
        assert_eq!(
            Error::command_failed("npm install", 1, "boom").category(),
            ErrorCategory::ActionFailed
        );
        assert_eq!(
            Error::DuplicateResource {
                id: "execute[build]".into()
            }
            .category(),
            ErrorCategory::InvalidRunList
        );
        assert_eq!(
            Error::Collaborator(anyhow::anyhow!("git not found")).category(),
            ErrorCategory::ActionFailed
        );
    }

    #[test]
    fn test_fatal_before_run() {
        assert!(ErrorCategory::PreconditionNotMet.is_fatal_before_run());
        assert!(ErrorCategory::InvalidRunList.is_fatal_before_run());
        assert!(!ErrorCategory::ActionFailed.is_fatal_before_run());
    }

    #[test]
    fn test_command_failed_message() {
        let err = Error::command_failed("ng build --prod", 2, "  missing module\n");
        assert_eq!(err.to_string(), "action failed: `ng build --prod` exited with status 2");
        match err {
            Error::ActionFailed { stderr, .. } => assert_eq!(stderr, "missing module"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
