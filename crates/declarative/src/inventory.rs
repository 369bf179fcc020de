//! Inventory store - node attributes and searchable records
//!
//! The store is loaded once per run and is read-only afterwards. Records are
//! nested JSON mappings so recipes can reach `app_source.url` and friends.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One searchable record, e.g. an application marked for deploy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryRecord(Map<String, Value>);

impl InventoryRecord {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self(attributes)
    }

    /// Top-level attribute
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Nested attribute by dotted path, e.g. `app_source.url` or `domains.0`
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        parts.try_fold(self.0.get(first)?, |value, part| match value {
            Value::Object(map) => map.get(part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Nested string attribute
    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Attribute-equality filter, every term must match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    terms: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality term on a dotted attribute path
    pub fn where_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((path.into(), value.into()));
        self
    }

    /// Parse search syntax: `deploy:true`, `shortname:site1 AND deploy:true`.
    ///
    /// Values that read as JSON scalars (`true`, `3`) compare as such;
    /// anything else compares as a string. An empty query or `*:*` matches all.
    pub fn parse(query: &str) -> Result<Self> {
        let query = query.trim();
        if query.is_empty() || query == "*:*" {
            return Ok(Self::all());
        }

        let mut filter = Self::all();
        for term in query.split(" AND ") {
            let (path, raw) = term.trim().split_once(':').ok_or_else(|| {
                Error::PreconditionNotMet(format!("invalid search term '{}'", term.trim()))
            })?;
            let value = match serde_json::from_str::<Value>(raw) {
                Ok(v) if !v.is_object() && !v.is_array() => v,
                _ => Value::String(raw.to_string()),
            };
            filter = filter.where_eq(path.trim(), value);
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        self.terms
            .iter()
            .all(|(path, expected)| record.get_path(path) == Some(expected))
    }
}

/// Read-only inventory for a single run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// Attributes of the node being converged
    #[serde(default)]
    pub node: Map<String, Value>,

    /// Searchable records keyed by kind, in file order
    #[serde(default)]
    pub search: BTreeMap<String, Vec<InventoryRecord>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under `kind`
    pub fn insert(&mut self, kind: impl Into<String>, record: InventoryRecord) {
        self.search.entry(kind.into()).or_default().push(record);
    }

    /// All records of `kind` matching `filter`, in stored order
    pub fn query(&self, kind: &str, filter: &Filter) -> Vec<&InventoryRecord> {
        self.search
            .get(kind)
            .map(|records| records.iter().filter(|r| filter.matches(r)).collect())
            .unwrap_or_default()
    }

    /// First record of `kind` matching `filter`
    ///
    /// An empty result is a fatal precondition failure, never a silent no-op.
    pub fn first(&self, kind: &str, filter: &Filter) -> Result<&InventoryRecord> {
        self.query(kind, filter).into_iter().next().ok_or_else(|| {
            Error::PreconditionNotMet(if filter.is_empty() {
                format!("no '{kind}' record in inventory")
            } else {
                format!("no '{kind}' record matches the search filter")
            })
        })
    }

    pub fn node_value(&self) -> Value {
        Value::Object(self.node.clone())
    }
}
