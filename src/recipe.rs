//! Recipe loader - builds a run list from a TOML recipe and an inventory
//!
//! ```toml
//! [search.app]
//! kind = "aws_opsworks_app"
//! filter = "deploy:true"
//!
//! [vars]
//! site_root = "/srv/{{ app.shortname }}"
//!
//! [[resource]]
//! kind = "line_edit"
//! name = "insert_env_vars"
//! path = "/etc/environment"
//! bindings = "{{ app.environment }}"
//! ```
//!
//! Search variables bind the first matching record. `[vars]` are evaluated in
//! document order with everything before them in scope. A string that is a
//! single `{{ expr }}` becomes the expression's typed value; any other string
//! containing template syntax is rendered to text.

use crate::config::Settings;
use anyhow::{Context, Result, bail};
use declarative::{Filter, Inventory, Kind, Polarity, Resource, ResourceNode, RunList};
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::Path;

/// A loaded recipe
#[derive(Debug)]
pub struct Recipe {
    pub run_list: RunList,
    /// Node attributes, exposed to templates as `node`
    pub node: Value,
}

impl Recipe {
    pub fn load(path: &Path, inventory: &Inventory, settings: &Settings) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Could not read recipe {}", path.display()))?;
        Self::parse(&source, inventory, settings)
            .with_context(|| format!("Invalid recipe {}", path.display()))
    }

    pub fn parse(source: &str, inventory: &Inventory, settings: &Settings) -> Result<Self> {
        let document: toml::Table = toml::from_str(source)?;
        let Value::Object(mut document) = serde_json::to_value(document)? else {
            bail!("recipe must be a table");
        };

        let loader = Loader::new(settings);
        let mut scope = Map::new();
        scope.insert("node".to_string(), inventory.node_value());

        if let Some(searches) = document.remove("search") {
            for (var, search) in as_table(searches, "search")? {
                let record = run_search(inventory, &var, &search)?;
                log::debug!("search.{var} matched {}", record);
                scope.insert(var, record);
            }
        }

        if let Some(vars) = document.remove("vars") {
            for (var, value) in as_table(vars, "vars")? {
                let value = loader
                    .render(value, &scope)
                    .with_context(|| format!("vars.{var}"))?;
                scope.insert(var, value);
            }
        }

        let mut run_list = RunList::new();
        if let Some(entries) = document.remove("resource") {
            let Value::Array(entries) = entries else {
                bail!("`resource` must be an array of tables");
            };
            for entry in entries {
                run_list.add_node(loader.node(entry, &scope)?);
            }
        }

        if let Some(key) = document.keys().next() {
            bail!("unknown top-level key `{key}`");
        }

        Ok(Self {
            run_list,
            node: inventory.node_value(),
        })
    }
}

/// Read an inventory JSON file; no path means an empty inventory
pub fn load_inventory(path: Option<&Path>) -> Result<Inventory> {
    let Some(path) = path else {
        return Ok(Inventory::new());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read inventory {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid inventory {}", path.display()))
}

fn as_table(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(table) => Ok(table),
        _ => bail!("`{what}` must be a table"),
    }
}

fn run_search(inventory: &Inventory, var: &str, search: &Value) -> Result<Value> {
    let kind = search
        .get("kind")
        .and_then(Value::as_str)
        .with_context(|| format!("search.{var} needs a `kind`"))?;
    let filter = match search.get("filter").and_then(Value::as_str) {
        Some(query) => Filter::parse(query)?,
        None => Filter::all(),
    };
    let record = inventory
        .first(kind, &filter)
        .with_context(|| format!("search.{var}"))?;
    Ok(record.to_value())
}

/// The single expression inside `{{ ... }}`, if that is all the string holds
fn sole_expression(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    (!inner.contains("{{") && !inner.contains("}}")).then_some(inner.trim())
}

fn is_template(text: &str) -> bool {
    text.contains("{{") || text.contains("{%")
}

struct Loader<'s> {
    env: Environment<'static>,
    settings: &'s Settings,
}

impl<'s> Loader<'s> {
    fn new(settings: &'s Settings) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env, settings }
    }

    /// Render every string inside `value` against `scope`
    fn render(&self, value: Value, scope: &Map<String, Value>) -> Result<Value> {
        match value {
            Value::String(text) => {
                if let Some(expr) = sole_expression(&text) {
                    let compiled = self
                        .env
                        .compile_expression(expr)
                        .with_context(|| format!("invalid expression `{expr}`"))?;
                    let result = compiled
                        .eval(scope)
                        .with_context(|| format!("could not evaluate `{expr}`"))?;
                    Ok(serde_json::to_value(&result)?)
                } else if is_template(&text) {
                    let rendered = self
                        .env
                        .render_str(&text, scope)
                        .with_context(|| format!("could not render {text:?}"))?;
                    Ok(Value::String(rendered))
                } else {
                    Ok(Value::String(text))
                }
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.render(item, scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(table) => table
                .into_iter()
                .map(|(key, item)| Ok((key, self.render(item, scope)?)))
                .collect::<Result<Map<_, _>>>()
                .map(Value::Object),
            other => Ok(other),
        }
    }

    /// Build a run tree node from one `[[resource]]` table
    fn node(&self, entry: Value, scope: &Map<String, Value>) -> Result<ResourceNode> {
        let mut table = as_table(entry, "resource")?;
        let children = match table.remove("children") {
            Some(Value::Array(children)) => children,
            Some(_) => bail!("`children` must be an array of tables"),
            None => Vec::new(),
        };
        let mut table = as_table(self.render(Value::Object(table), scope)?, "resource")?;

        let name = table
            .get("name")
            .and_then(Value::as_str)
            .context("resource needs a `name`")?
            .to_string();
        let kind = table
            .get("kind")
            .and_then(Value::as_str)
            .with_context(|| format!("resource {name} needs a `kind`"))?
            .to_string();

        let mut node = if kind == "group" {
            ResourceNode::group(format!("group[{name}]"))
        } else {
            collect_guards(&mut table)?;
            self.apply_defaults(&kind, &mut table);
            let resource: Resource = serde_json::from_value(Value::Object(table))
                .with_context(|| format!("invalid {kind} resource {name}"))?;
            ResourceNode::resource(resource)
        };

        for child in children {
            node = node.child(self.node(child, scope)?);
        }
        Ok(node)
    }

    /// Fill properties the settings file provides defaults for
    fn apply_defaults(&self, kind: &str, table: &mut Map<String, Value>) {
        let apache = &self.settings.apache;
        match Kind::from_alias(kind) {
            Some(Kind::VirtualHost) => {
                table
                    .entry("sites_available")
                    .or_insert_with(|| json!(apache.sites_available));
                table
                    .entry("sites_enabled")
                    .or_insert_with(|| json!(apache.sites_enabled));
                let notifies = table.entry("notifies").or_insert_with(|| json!([]));
                if let Value::Array(commands) = notifies
                    && !commands.iter().any(|c| c == &json!(apache.reload_command))
                {
                    commands.push(json!(apache.reload_command));
                }
            }
            Some(Kind::ScheduledJob) => {
                table
                    .entry("user")
                    .or_insert_with(|| json!(self.settings.cron_user));
            }
            _ => {}
        }
        if let Some(kind) = Kind::from_alias(kind) {
            table.insert("kind".to_string(), json!(kind.as_str()));
        }
    }
}

/// Turn `only_if` / `not_if` lists into tagged guards. A bare string is a
/// command check.
fn collect_guards(table: &mut Map<String, Value>) -> Result<()> {
    let mut guards = Vec::new();
    for (key, polarity) in [("only_if", Polarity::OnlyIf), ("not_if", Polarity::NotIf)] {
        let Some(value) = table.remove(key) else {
            continue;
        };
        let checks = match value {
            Value::Array(checks) => checks,
            single => vec![single],
        };
        for check in checks {
            let mut check = match check {
                Value::String(command) => json!({"check": "command", "command": command}),
                Value::Object(check) => Value::Object(check),
                _ => bail!("`{key}` entries must be commands or tables"),
            };
            check["polarity"] = serde_json::to_value(polarity)?;
            guards.push(check);
        }
    }
    if !guards.is_empty() {
        table.insert("guards".to_string(), Value::Array(guards));
    }
    Ok(())
}
