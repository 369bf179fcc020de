//! Variable propagator
//!
//! Fans inventory key/value pairs out into environment files and the live
//! process environment. Insertion is insert-if-no-match: a key that already
//! has a line is never touched again, so repeated runs never grow a file.
//! `replace_line` is the one overwrite operation, for settings lines that an
//! earlier install step is expected to have created.

use crate::context::FileSystem;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// A key/value pair that must appear exactly once in its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentBinding {
    pub key: String,
    pub value: String,
}

impl EnvironmentBinding {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Bindings from a JSON mapping, in map order.
    ///
    /// Strings are taken verbatim, other scalars use their JSON text and
    /// `null` becomes the empty string.
    pub fn from_map(map: &Map<String, Value>) -> Vec<Self> {
        map.iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                Self::new(key.clone(), value)
            })
            .collect()
    }
}

/// How a binding is written into a text file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSyntax {
    /// `export KEY="value"`, for shell-sourced files such as apache2 envvars
    Export,
    /// `KEY="value"`, for plain environment files such as /etc/environment
    #[default]
    Plain,
}

impl LineSyntax {
    fn prefix(&self, key: &str) -> String {
        match self {
            Self::Export => format!("export {key}="),
            Self::Plain => format!("{key}="),
        }
    }

    /// The line written for `binding`
    pub fn line_for(&self, binding: &EnvironmentBinding) -> String {
        format!("{}\"{}\"", self.prefix(&binding.key), binding.value)
    }

    /// Anchored, case-sensitive pattern for lines that set `key`
    pub fn key_pattern(&self, key: &str) -> Result<Regex> {
        Ok(Regex::new(&format!("^{}", regex::escape(&self.prefix(key))))?)
    }

    /// Value assigned on `line`, with one level of quotes removed
    fn value_of<'l>(&self, line: &'l str, key: &str) -> Option<&'l str> {
        let raw = line.strip_prefix(&self.prefix(key))?.trim_end();
        let unquoted = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
            .unwrap_or(raw);
        Some(unquoted)
    }
}

/// What to do when a key is present with a different value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Leave the line, log a warning and report the conflict
    #[default]
    Warn,
    /// Fail the resource
    Fail,
}

/// A key found with a value other than the one requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub key: String,
    pub existing: String,
    pub requested: String,
}

impl Conflict {
    pub fn into_error(self, target: &str) -> Error {
        Error::PropagationConflict {
            target: target.to_string(),
            key: self.key,
            existing: self.existing,
            requested: self.requested,
        }
    }
}

/// Result of one propagation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Keys that were appended
    pub inserted: Vec<String>,
    /// Keys already present with the requested value
    pub present: Vec<String>,
    /// Keys present with a different value, left untouched
    pub conflicts: Vec<Conflict>,
}

impl PropagationReport {
    pub fn is_changed(&self) -> bool {
        !self.inserted.is_empty()
    }
}

/// Apply insert-if-no-match to `content`, returning the new text and a report
pub fn insert_if_no_match(
    content: &str,
    bindings: &[EnvironmentBinding],
    syntax: LineSyntax,
) -> Result<(String, PropagationReport)> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let original_len = lines.len();
    let mut report = PropagationReport::default();

    for binding in bindings {
        let pattern = syntax.key_pattern(&binding.key)?;
        match lines.iter().find(|line| pattern.is_match(line)) {
            Some(line) => {
                let existing = syntax.value_of(line, &binding.key).unwrap_or_default();
                if existing == binding.value {
                    report.present.push(binding.key.clone());
                } else {
                    report.conflicts.push(Conflict {
                        key: binding.key.clone(),
                        existing: existing.to_string(),
                        requested: binding.value.clone(),
                    });
                }
            }
            None => {
                lines.push(syntax.line_for(binding));
                report.inserted.push(binding.key.clone());
            }
        }
    }

    if !report.is_changed() {
        return Ok((content.to_string(), report));
    }

    let mut updated = content.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    for line in &lines[original_len..] {
        updated.push_str(line);
        updated.push('\n');
    }
    Ok((updated, report))
}

/// Insert-if-no-match against a text file; a missing file is treated as empty
pub fn propagate_file(
    fs: &dyn FileSystem,
    path: &Path,
    bindings: &[EnvironmentBinding],
    syntax: LineSyntax,
) -> Result<PropagationReport> {
    let content = fs.read_to_string(path)?.unwrap_or_default();
    let (updated, report) = insert_if_no_match(&content, bindings, syntax)?;
    if report.is_changed() {
        for key in &report.inserted {
            log::info!("Setting {key} in {}", path.display());
        }
        fs.write_atomic(path, &updated)?;
    }
    Ok(report)
}

/// Live environment that commands of the current run inherit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnvironment {
    vars: BTreeMap<String, String>,
}

impl ProcessEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Insert unless `key` is already set; returns whether it was inserted
    pub fn insert_if_absent(&mut self, key: &str, value: &str) -> bool {
        if self.vars.contains_key(key) {
            return false;
        }
        self.vars.insert(key.to_string(), value.to_string());
        true
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProcessEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Insert-if-no-match against the process environment
pub fn propagate_process(
    env: &mut ProcessEnvironment,
    bindings: &[EnvironmentBinding],
) -> PropagationReport {
    let mut report = PropagationReport::default();
    for binding in bindings {
        match env.get(&binding.key) {
            Some(existing) if existing == binding.value => {
                report.present.push(binding.key.clone());
            }
            Some(existing) => report.conflicts.push(Conflict {
                key: binding.key.clone(),
                existing: existing.to_string(),
                requested: binding.value.clone(),
            }),
            None => {
                env.insert_if_absent(&binding.key, &binding.value);
                report.inserted.push(binding.key.clone());
            }
        }
    }
    report
}

/// Overwrite every line matching `pattern` with `replacement`.
///
/// Returns `None` when nothing would change, including when no line matches.
pub fn replace_line(content: &str, pattern: &Regex, replacement: &str) -> Option<String> {
    let mut changed = false;
    let mut updated = String::with_capacity(content.len());

    for piece in content.split_inclusive('\n') {
        let (line, newline) = match piece.strip_suffix('\n') {
            Some(line) => (line, "\n"),
            None => (piece, ""),
        };
        if pattern.is_match(line) && line != replacement {
            changed = true;
            updated.push_str(replacement);
        } else {
            updated.push_str(line);
        }
        updated.push_str(newline);
    }

    changed.then_some(updated)
}

/// `replace_line` against a file; absent file or absent line is a no-op
pub fn replace_line_in_file(
    fs: &dyn FileSystem,
    path: &Path,
    pattern: &Regex,
    replacement: &str,
) -> Result<bool> {
    let Some(content) = fs.read_to_string(path)? else {
        log::debug!("{} does not exist, nothing to replace", path.display());
        return Ok(false);
    };
    match replace_line(&content, pattern, replacement) {
        Some(updated) => {
            fs.write_atomic(path, &updated)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
