//! Capacity-bounded specialist registry
//!
//! The registry is the heap of specialists the router and the delegation
//! resolver walk. It is immutable once built: merging overrides or
//! re-applying caps always returns a new registry, so concurrent routing
//! operations can share one instance behind an `Arc`.
//!
//! Caps (see [`RegistryCaps`]):
//! - at most `max_top_level` ids are visible to the router
//! - every entry owns at most `max_tools` tools
//! - every entry owns at most `max_children` delegate targets

pub mod builder;
pub mod catalog;
pub mod entry;

pub use builder::{RegistryBuilder, RegistryCaps};
pub use catalog::{builtin_catalog, default_registry, Catalog};
pub use entry::{LogicalSpecialistSpec, OptionGroup, SpecialistEntry, SpecialistKind};

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Immutable snapshot of the specialist heap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistRegistry {
    top_level_ids: Vec<String>,
    entries: BTreeMap<String, SpecialistEntry>,
    #[serde(skip)]
    caps: RegistryCaps,
}

/// What the router sees for each top-level specialist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistSummary {
    pub id: String,
    pub kind: SpecialistKind,
    pub description: Option<String>,
    pub tool_count: usize,
}

impl SpecialistRegistry {
    /// Ids visible to the router, in registration order
    pub fn top_level_ids(&self) -> &[String] {
        &self.top_level_ids
    }

    pub fn get(&self, id: &str) -> Option<&SpecialistEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        self.get(id).map(SpecialistEntry::is_leaf).unwrap_or(false)
    }

    pub fn is_delegator(&self, id: &str) -> bool {
        self.get(id).map(SpecialistEntry::is_delegator).unwrap_or(false)
    }

    pub fn is_top_level(&self, id: &str) -> bool {
        self.top_level_ids.iter().any(|top| top == id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SpecialistEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn caps(&self) -> RegistryCaps {
        self.caps
    }

    /// The top-level id that `id` is a subspecialist of, if any.
    ///
    /// A declared `parent_id` naming another top-level id wins. Otherwise the
    /// naming convention applies: `id` belongs to top-level `P` when `P != id`
    /// and `id` starts with `"{P}_"`; the longest such `P` is chosen.
    pub fn subspecialist_parent(&self, id: &str) -> Option<&str> {
        if let Some(parent) = self.get(id).and_then(|entry| entry.parent_id.as_deref()) {
            if parent != id && self.is_top_level(parent) {
                return self
                    .top_level_ids
                    .iter()
                    .find(|top| top.as_str() == parent)
                    .map(String::as_str);
            }
        }

        self.top_level_ids
            .iter()
            .filter(|top| {
                top.as_str() != id
                    && id.len() > top.len()
                    && id.starts_with(top.as_str())
                    && id.as_bytes()[top.len()] == b'_'
            })
            .max_by_key(|top| top.len())
            .map(String::as_str)
    }

    /// Top-level ids that are not a subspecialist of another top-level id
    pub fn primary_ids(&self) -> Vec<String> {
        self.top_level_ids
            .iter()
            .filter(|id| self.subspecialist_parent(id).is_none())
            .cloned()
            .collect()
    }

    /// Children of a node; `None` is the root, whose children are the
    /// primary top-level ids.
    ///
    /// A node with delegate targets yields those present in the registry.
    /// Any other node yields the top-level ids that are its subspecialists.
    pub fn children(&self, node: Option<&str>) -> Vec<String> {
        let Some(node) = node else {
            return self.primary_ids();
        };
        let Some(entry) = self.get(node) else {
            return Vec::new();
        };

        if !entry.delegate_targets.is_empty() {
            return entry
                .delegate_targets
                .iter()
                .filter(|target| self.contains(target))
                .cloned()
                .collect();
        }

        self.top_level_ids
            .iter()
            .filter(|id| self.subspecialist_parent(id) == Some(node))
            .cloned()
            .collect()
    }

    /// Tools reachable from a node: its own tools for a leaf, the
    /// deduplicated union over its delegate targets for a delegator.
    pub fn effective_tools(&self, id: &str) -> Vec<String> {
        let mut tools = Vec::new();
        let mut seen_tools = HashSet::new();
        let mut visited = HashSet::new();
        self.collect_tools(id, &mut visited, &mut seen_tools, &mut tools);
        tools
    }

    fn collect_tools(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        seen_tools: &mut HashSet<String>,
        tools: &mut Vec<String>,
    ) {
        // Overrides can introduce cycles
        if !visited.insert(id.to_string()) {
            return;
        }
        let Some(entry) = self.get(id) else {
            return;
        };

        match entry.kind {
            SpecialistKind::Leaf => {
                for tool in &entry.tool_names {
                    if seen_tools.insert(tool.clone()) {
                        tools.push(tool.clone());
                    }
                }
            }
            SpecialistKind::Delegator => {
                for target in &entry.delegate_targets {
                    self.collect_tools(target, visited, seen_tools, tools);
                }
            }
            SpecialistKind::Inert => {}
        }
    }

    /// Capped top-level view handed to the router
    pub fn top_level_view(&self) -> Vec<SpecialistSummary> {
        self.top_level_ids
            .iter()
            .filter_map(|id| self.get(id))
            .map(|entry| SpecialistSummary {
                id: entry.id.clone(),
                kind: entry.kind,
                description: entry.description.clone(),
                tool_count: self.effective_tools(&entry.id).len(),
            })
            .collect()
    }
}
