//! Run list planner - the ordered tree of resource nodes a run walks

use crate::error::{Error, Result};
use crate::kinds::Kind;
use crate::resource::Resource;
use crate::types::NameScope;
use std::collections::HashSet;

/// A node in the run tree: an optional resource followed by its children
///
/// A node without a resource is a group, like an application block that only
/// nests the checkout, templates and commands deploying it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub label: String,
    pub resource: Option<Resource>,
    pub children: Vec<ResourceNode>,
}

impl ResourceNode {
    pub fn resource(resource: Resource) -> Self {
        Self {
            label: resource.id(),
            resource: Some(resource),
            children: Vec::new(),
        }
    }

    pub fn group(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            resource: None,
            children: Vec::new(),
        }
    }

    /// Append a child node
    pub fn child(mut self, child: impl Into<ResourceNode>) -> Self {
        self.children.push(child.into());
        self
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Resource>) {
        if let Some(resource) = &self.resource {
            out.push(resource);
        }
        for child in &self.children {
            child.collect(out);
        }
    }

    fn retain(&mut self, keep: &impl Fn(&Resource) -> bool) {
        if self.resource.as_ref().is_some_and(|r| !keep(r)) {
            self.resource = None;
        }
        for child in &mut self.children {
            child.retain(keep);
        }
        self.children.retain(|c| !c.is_empty());
    }

    fn is_empty(&self) -> bool {
        self.resource.is_none() && self.children.iter().all(ResourceNode::is_empty)
    }
}

impl From<Resource> for ResourceNode {
    fn from(resource: Resource) -> Self {
        Self::resource(resource)
    }
}

/// Ordered resource tree; resources apply in pre-order, exactly as declared
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunList {
    pub nodes: Vec<ResourceNode>,
}

impl RunList {
    /// Create a new empty run list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource at the top level
    pub fn add(&mut self, resource: Resource) -> &mut Self {
        self.nodes.push(ResourceNode::resource(resource));
        self
    }

    /// Append a node (and its subtree) at the top level
    pub fn add_node(&mut self, node: ResourceNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Resources in application order
    pub fn resources(&self) -> Vec<&Resource> {
        let mut out = Vec::new();
        for node in &self.nodes {
            node.collect(&mut out);
        }
        out
    }

    /// Total number of resources
    pub fn len(&self) -> usize {
        self.resources().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(ResourceNode::is_empty)
    }

    /// Check names are unique within `scope` and every resource is well-formed
    pub fn validate(&self, scope: NameScope) -> Result<()> {
        let mut seen: HashSet<(Option<Kind>, &str)> = HashSet::new();

        for resource in self.resources() {
            if resource.name.trim().is_empty() {
                return Err(Error::InvalidResource {
                    id: resource.id(),
                    message: "name must not be empty".to_string(),
                });
            }
            resource
                .spec
                .validate()
                .map_err(|message| Error::InvalidResource {
                    id: resource.id(),
                    message,
                })?;

            let key = match scope {
                NameScope::PerKind => (Some(resource.kind()), resource.name.as_str()),
                NameScope::Global => (None, resource.name.as_str()),
                NameScope::Unrestricted => continue,
            };
            if !seen.insert(key) {
                return Err(Error::DuplicateResource { id: resource.id() });
            }
        }
        Ok(())
    }

    /// Keep only resources matching `predicate`; ordering is preserved
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Resource) -> bool,
    {
        for node in &mut self.nodes {
            node.retain(&predicate);
        }
        self.nodes.retain(|n| !n.is_empty());
        self
    }

    /// Keep only resources matching a target pattern
    ///
    /// Target format: "kind" or "kind.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.filter(|r| matches_filter(r, kind.as_deref(), name.as_deref()))
            }
        }
    }
}

/// Parse a target string like "kind.name" into (kind, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((kind, name)) if Kind::from_alias(kind).is_some() => {
            (Some(kind.to_string()), Some(name.to_string()))
        }
        Some(_) => (None, Some(target.to_string())),
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &Resource, kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(k) = kind
        && Kind::from_alias(k) != Some(resource.kind())
    {
        return false;
    }

    if let Some(n) = name
        && !resource.name.contains(n)
    {
        return false;
    }

    true
}
