//! Registry builder
//!
//! Turns logical specialists with arbitrarily long tool lists into a bounded
//! hierarchy:
//!
//! 1. A tool list that fits in one leaf becomes one leaf under the logical id.
//! 2. A longer list is split, in order, into leaves of at most `max_tools`.
//! 3. While there are more leaves (or groups) than `max_children`, they are
//!    gathered under intermediate delegators `"{id}__lvl{level}_group{n}"`.
//! 4. A root delegator is registered under the logical id. Only logical ids
//!    reach the top level.

use std::collections::{BTreeMap, HashSet};

use super::entry::{LogicalSpecialistSpec, SpecialistEntry};
use super::SpecialistRegistry;
use crate::config::HeapConfig;

/// Hard limits every registry satisfies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryCaps {
    /// K: tools per entry
    pub max_tools: usize,
    /// D: delegate targets per entry
    pub max_children: usize,
    /// T: ids visible at the top level
    pub max_top_level: usize,
}

impl Default for RegistryCaps {
    fn default() -> Self {
        HeapConfig::default().registry_caps()
    }
}

/// Builds [`SpecialistRegistry`] snapshots under a fixed set of caps
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryBuilder {
    caps: RegistryCaps,
}

impl RegistryBuilder {
    /// Caps below the smallest workable hierarchy are raised to it: one tool
    /// per leaf and two children per delegator.
    pub fn new(caps: RegistryCaps) -> Self {
        Self {
            caps: RegistryCaps {
                max_tools: caps.max_tools.max(1),
                max_children: caps.max_children.max(2),
                ..caps
            },
        }
    }

    pub fn caps(&self) -> RegistryCaps {
        self.caps
    }

    /// Build a registry from logical specs.
    ///
    /// `top_level_ids` defaults to the logical ids in input order. Ids
    /// synthesized here (parts and groups) are never allowed at the top
    /// level, and unknown ids are dropped.
    pub fn build(
        &self,
        specs: &[LogicalSpecialistSpec],
        top_level_ids: Option<&[String]>,
    ) -> SpecialistRegistry {
        let mut entries = BTreeMap::new();
        let mut synthesized = HashSet::new();

        for spec in specs {
            self.expand_spec(spec, &mut entries, &mut synthesized);
        }

        let requested: Vec<String> = match top_level_ids {
            Some(ids) => ids.to_vec(),
            None => specs.iter().map(|spec| spec.id.clone()).collect(),
        };
        let top_level_ids = requested
            .into_iter()
            .filter(|id| !synthesized.contains(id))
            .collect();

        let registry = SpecialistRegistry {
            top_level_ids,
            entries,
            caps: self.caps,
        }
        .enforce_caps();

        tracing::debug!(
            entries = registry.len(),
            top_level = registry.top_level_ids().len(),
            "specialist registry built"
        );

        registry
    }

    fn expand_spec(
        &self,
        spec: &LogicalSpecialistSpec,
        entries: &mut BTreeMap<String, SpecialistEntry>,
        synthesized: &mut HashSet<String>,
    ) {
        let max_tools = self.caps.max_tools;

        if spec.tool_names.is_empty() {
            let mut entry = SpecialistEntry::inert(&spec.id)
                .with_option_groups(spec.option_groups.clone());
            entry.description = spec.description.clone();
            entries.insert(spec.id.clone(), entry);
            return;
        }

        if spec.tool_names.len() <= max_tools {
            let mut entry = SpecialistEntry::leaf(&spec.id, spec.tool_names.clone())
                .with_option_groups(spec.option_groups.clone());
            entry.description = spec.description.clone();
            entries.insert(spec.id.clone(), entry);
            return;
        }

        let chunks: Vec<&[String]> = spec.tool_names.chunks(max_tools).collect();
        let total = chunks.len();
        let part_ids = part_ids_for(spec, total, entries);
        let mut children = Vec::with_capacity(total);

        for ((index, chunk), part_id) in chunks.into_iter().enumerate().zip(part_ids) {
            let mut leaf = SpecialistEntry::leaf(&part_id, chunk.to_vec());
            leaf.description = spec
                .description
                .as_ref()
                .map(|d| format!("{} (part {} of {})", d, index + 1, total));
            entries.insert(part_id.clone(), leaf);
            synthesized.insert(part_id.clone());
            children.push(part_id);
        }

        let width = self.caps.max_children;
        let mut level = 1;
        while children.len() > width {
            let mut next_level = Vec::with_capacity(children.len().div_ceil(width));
            for (index, group) in children.chunks(width).enumerate() {
                let group_id = format!("{}__lvl{}_group{}", spec.id, level, index + 1);
                for child in group {
                    adopt(entries, child, &group_id);
                }
                let mut delegator = SpecialistEntry::delegator(&group_id, group.to_vec());
                delegator.description = spec
                    .description
                    .as_ref()
                    .map(|d| format!("{} (group {} at level {})", d, index + 1, level));
                entries.insert(group_id.clone(), delegator);
                synthesized.insert(group_id.clone());
                next_level.push(group_id);
            }
            children = next_level;
            level += 1;
        }

        for child in &children {
            adopt(entries, child, &spec.id);
        }
        let mut root = SpecialistEntry::delegator(&spec.id, children)
            .with_option_groups(spec.option_groups.clone());
        root.description = spec.description.clone();
        entries.insert(spec.id.clone(), root);
    }
}

impl SpecialistRegistry {
    /// Return a new registry with `overrides` replacing or adding entries.
    ///
    /// Ids new to the registry join the top level only while it is under the
    /// cap; the rest are reachable by id but not offered to the router.
    pub fn merge_overrides<I>(&self, overrides: I) -> SpecialistRegistry
    where
        I: IntoIterator<Item = SpecialistEntry>,
    {
        let mut next = self.clone();

        for entry in overrides {
            let id = entry.id.clone();
            let is_new = !next.entries.contains_key(&id);
            next.entries.insert(id.clone(), entry);

            if is_new && !next.is_top_level(&id) {
                if next.top_level_ids.len() < next.caps.max_top_level {
                    next.top_level_ids.push(id);
                } else {
                    tracing::debug!(id = %id, "override accepted without top-level slot");
                }
            }
        }

        next.enforce_caps()
    }

    /// Re-apply every cap. Idempotent.
    pub(crate) fn enforce_caps(mut self) -> SpecialistRegistry {
        let caps = self.caps;

        let mut seen = HashSet::new();
        let entries = &self.entries;
        self.top_level_ids
            .retain(|id| entries.contains_key(id) && seen.insert(id.clone()));
        self.top_level_ids.truncate(caps.max_top_level);

        for entry in self.entries.values_mut() {
            entry.truncate(caps.max_tools, caps.max_children);
        }

        self
    }
}

/// Ids for the `total` parts of `spec`. A caller's `part_ids[n]` is used
/// when the list has one id per part and the id is scoped under the logical
/// id, is not taken and does not repeat. Any other part gets
/// `"{id}__part{n}"`; the `"{id}__"` prefix is kept for generated ids.
fn part_ids_for(
    spec: &LogicalSpecialistSpec,
    total: usize,
    entries: &BTreeMap<String, SpecialistEntry>,
) -> Vec<String> {
    let requested = spec.part_ids.as_ref().filter(|ids| ids.len() == total);
    let scope = format!("{}_", spec.id);
    let reserved = format!("{}__", spec.id);
    let mut seen = HashSet::new();

    (0..total)
        .map(|index| {
            let candidate = requested.map(|ids| ids[index].as_str()).filter(|id| {
                id.starts_with(&scope)
                    && !id.starts_with(&reserved)
                    && !entries.contains_key(*id)
                    && !seen.contains(*id)
            });
            let part_id = match candidate {
                Some(id) => id.to_string(),
                None => format!("{}__part{}", spec.id, index + 1),
            };
            seen.insert(part_id.clone());
            part_id
        })
        .collect()
}

fn adopt(entries: &mut BTreeMap<String, SpecialistEntry>, child: &str, parent: &str) {
    if let Some(entry) = entries.get_mut(child) {
        entry.parent_id = Some(parent.to_string());
    }
}
