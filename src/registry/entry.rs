//! Specialist entries
//!
//! A specialist is either a leaf that owns tools, a delegator that owns
//! children, or inert (planning-only, owns neither).

use serde::{Deserialize, Serialize};

/// What a specialist can do when it is selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    /// Owns callable tools, no children
    Leaf,
    /// Owns children, no tools
    Delegator,
    /// Owns neither; can be routed to but never executed or expanded
    Inert,
}

impl SpecialistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialistKind::Leaf => "leaf",
            SpecialistKind::Delegator => "delegator",
            SpecialistKind::Inert => "inert",
        }
    }
}

impl std::str::FromStr for SpecialistKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leaf" => Ok(SpecialistKind::Leaf),
            "delegator" => Ok(SpecialistKind::Delegator),
            "inert" => Ok(SpecialistKind::Inert),
            _ => Err(format!("Invalid specialist kind: {}", s)),
        }
    }
}

/// A named subset of tool ids, for callers that want a semantic selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionGroup {
    pub name: String,
    pub tool_ids: Vec<String>,
}

impl OptionGroup {
    pub fn new(name: impl Into<String>, tool_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            tool_ids,
        }
    }
}

/// A single node of the specialist heap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialistEntry {
    pub id: String,
    pub kind: SpecialistKind,
    #[serde(default)]
    pub tool_names: Vec<String>,
    #[serde(default)]
    pub delegate_targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_groups: Vec<OptionGroup>,
    /// Node that owns this one in the built hierarchy. Set for synthesized
    /// parts and groups; `None` for logical specialists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl SpecialistEntry {
    pub fn leaf(id: impl Into<String>, tool_names: Vec<String>) -> Self {
        Self {
            id: id.into(),
            kind: SpecialistKind::Leaf,
            tool_names,
            delegate_targets: Vec::new(),
            description: None,
            option_groups: Vec::new(),
            parent_id: None,
        }
    }

    pub fn delegator(id: impl Into<String>, delegate_targets: Vec<String>) -> Self {
        Self {
            id: id.into(),
            kind: SpecialistKind::Delegator,
            tool_names: Vec::new(),
            delegate_targets,
            description: None,
            option_groups: Vec::new(),
            parent_id: None,
        }
    }

    pub fn inert(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SpecialistKind::Inert,
            tool_names: Vec::new(),
            delegate_targets: Vec::new(),
            description: None,
            option_groups: Vec::new(),
            parent_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_option_groups(mut self, option_groups: Vec<OptionGroup>) -> Self {
        self.option_groups = option_groups;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == SpecialistKind::Leaf
    }

    pub fn is_delegator(&self) -> bool {
        self.kind == SpecialistKind::Delegator
    }

    /// Re-apply tool and child caps. Idempotent.
    pub(crate) fn truncate(&mut self, max_tools: usize, max_children: usize) {
        self.tool_names.truncate(max_tools);
        self.delegate_targets.truncate(max_children);
    }
}

/// Pre-cap input: one logical specialist with an unbounded tool list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalSpecialistSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tool_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_groups: Vec<OptionGroup>,
    /// Names for the chunks produced when `tool_names` has to be split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_ids: Option<Vec<String>>,
}

impl LogicalSpecialistSpec {
    pub fn new<I, S>(id: impl Into<String>, tool_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            tool_names: tool_names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_part_ids(mut self, part_ids: Vec<String>) -> Self {
        self.part_ids = Some(part_ids);
        self
    }

    pub fn with_option_groups(mut self, option_groups: Vec<OptionGroup>) -> Self {
        self.option_groups = option_groups;
        self
    }
}
