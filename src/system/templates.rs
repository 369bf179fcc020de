//! Template files rendered with minijinja

use anyhow::{Context, Result};
use declarative::TemplateRenderer;
use minijinja::{Environment, UndefinedBehavior};
use std::fs;
use std::path::PathBuf;

/// Renders templates from a directory; absolute template names are used as-is
pub struct TemplateDir {
    root: PathBuf,
    env: Environment<'static>,
}

impl TemplateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self {
            root: root.into(),
            env,
        }
    }
}

impl TemplateRenderer for TemplateDir {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String> {
        let path = self.root.join(template);
        let source = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        self.env
            .render_str(&source, context)
            .with_context(|| format!("Failed to render template {template}"))
    }
}
