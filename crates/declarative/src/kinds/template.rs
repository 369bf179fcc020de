//! Template-render resource

use crate::context::ApplyContext;
use crate::error::Result;
use crate::types::{Change, Drift};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// A file rendered from a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// File to write
    pub path: PathBuf,
    /// Template name, resolved by the renderer
    pub source: String,
    /// Resource properties exposed to the template at top level
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl TemplateSpec {
    pub fn new(path: impl Into<PathBuf>, source: &str) -> Self {
        Self {
            path: path.into(),
            source: source.to_string(),
            variables: Map::new(),
        }
    }

    pub fn variable(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn description(&self) -> String {
        format!("Render {} from {}", self.path.display(), self.source)
    }

    fn context(&self, ctx: &ApplyContext) -> Value {
        let mut context = Map::new();
        context.insert("node".to_string(), ctx.node.clone());
        context.extend(self.variables.clone());
        Value::Object(context)
    }

    pub(crate) fn check(&self, ctx: &ApplyContext) -> Result<Drift> {
        let rendered = Rendered::new(ctx, &self.path, &self.source, &self.context(ctx))?;
        Ok(rendered.drift())
    }

    pub(crate) fn apply(&self, ctx: &ApplyContext) -> Result<Change> {
        Rendered::new(ctx, &self.path, &self.source, &self.context(ctx))?.write(ctx)
    }
}

/// A rendered template next to the file it would replace
pub(crate) struct Rendered<'p> {
    path: &'p Path,
    content: String,
    existing: Option<String>,
}

impl<'p> Rendered<'p> {
    pub(crate) fn new(
        ctx: &ApplyContext,
        path: &'p Path,
        template: &str,
        context: &Value,
    ) -> Result<Self> {
        let content = ctx.sys.templates.render(template, context)?;
        let existing = ctx.sys.fs.read_to_string(path)?;
        Ok(Self {
            path,
            content,
            existing,
        })
    }

    pub(crate) fn is_current(&self) -> bool {
        self.existing.as_deref() == Some(self.content.as_str())
    }

    pub(crate) fn drift(&self) -> Drift {
        match &self.existing {
            _ if self.is_current() => Drift::InSync,
            Some(_) => Drift::Drifted(format!("update {}", self.path.display())),
            None => Drift::Drifted(format!("create {}", self.path.display())),
        }
    }

    /// Overwrite the target if its content differs
    pub(crate) fn write(self, ctx: &ApplyContext) -> Result<Change> {
        if self.is_current() {
            return Ok(Change::Unchanged);
        }
        ctx.sys.fs.write_atomic(self.path, &self.content)?;
        log::info!("Rendered {}", self.path.display());
        let verb = if self.existing.is_some() { "updated" } else { "created" };
        Ok(Change::Converged(format!("{verb} {}", self.path.display())))
    }
}
