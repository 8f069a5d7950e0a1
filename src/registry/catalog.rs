//! Specialist catalogs
//!
//! The built-in catalog backs [`default_registry`], which is built once per
//! process and shared by reference afterwards. Other catalogs are loaded
//! from JSON files.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

use super::builder::{RegistryBuilder, RegistryCaps};
use super::entry::{LogicalSpecialistSpec, OptionGroup, SpecialistEntry};
use super::SpecialistRegistry;
use crate::error::Result;

static DEFAULT_REGISTRY: OnceLock<SpecialistRegistry> = OnceLock::new();

/// Registry built from [`builtin_catalog`] under default caps.
///
/// Built on first use, never rebuilt.
pub fn default_registry() -> &'static SpecialistRegistry {
    DEFAULT_REGISTRY.get_or_init(|| {
        RegistryBuilder::new(RegistryCaps::default()).build(&builtin_catalog(), None)
    })
}

/// The specialists every deployment ships with
pub fn builtin_catalog() -> Vec<LogicalSpecialistSpec> {
    vec![
        LogicalSpecialistSpec::new("general", ["web_search", "fetch_url", "summarize_text"])
            .with_description("Answers general questions and researches the web"),
        LogicalSpecialistSpec::new(
            "agent",
            [
                "create_agent",
                "update_agent",
                "get_agent",
                "list_agents",
                "delete_agent",
                "attach_tools_to_agent",
            ],
        )
        .with_description("Creates and manages agents")
        .with_option_groups(vec![
            OptionGroup::new(
                "lifecycle",
                vec!["create_agent".into(), "update_agent".into(), "delete_agent".into()],
            ),
            OptionGroup::new("inspection", vec!["get_agent".into(), "list_agents".into()]),
        ]),
        LogicalSpecialistSpec::new(
            "workflow",
            [
                "create_workflow",
                "update_workflow",
                "get_workflow",
                "list_workflows",
                "delete_workflow",
                "add_workflow_step",
                "remove_workflow_step",
                "reorder_workflow_steps",
                "run_workflow",
                "schedule_workflow",
                "list_workflow_runs",
                "cancel_workflow_run",
            ],
        )
        .with_description("Designs, runs and schedules workflows")
        .with_option_groups(vec![
            OptionGroup::new(
                "authoring",
                vec![
                    "create_workflow".into(),
                    "add_workflow_step".into(),
                    "remove_workflow_step".into(),
                    "reorder_workflow_steps".into(),
                ],
            ),
            OptionGroup::new(
                "runs",
                vec![
                    "run_workflow".into(),
                    "list_workflow_runs".into(),
                    "cancel_workflow_run".into(),
                ],
            ),
        ]),
        LogicalSpecialistSpec::new(
            "improve_agents_workflows",
            [
                "analyze_agent_runs",
                "suggest_agent_improvements",
                "suggest_workflow_improvements",
                "apply_improvement",
            ],
        )
        .with_description("Reviews existing agents and workflows and improves them"),
        LogicalSpecialistSpec::new(
            "tools",
            ["list_tools", "describe_tool", "create_tool", "update_tool", "test_tool"],
        )
        .with_description("Manages the tool catalog"),
        LogicalSpecialistSpec::new(
            "knowledge",
            ["search_documents", "ingest_document", "list_collections", "delete_document"],
        )
        .with_description("Searches and maintains the knowledge base"),
        LogicalSpecialistSpec::new("planner", Vec::<String>::new())
            .with_description("Breaks a task into steps without calling tools"),
    ]
}

/// A catalog file: logical specs plus optional top-level order and overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub specialists: Vec<LogicalSpecialistSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_level_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<SpecialistEntry>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            specialists: builtin_catalog(),
            ..Default::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn into_registry(self, caps: RegistryCaps) -> SpecialistRegistry {
        let registry =
            RegistryBuilder::new(caps).build(&self.specialists, self.top_level_ids.as_deref());
        if self.overrides.is_empty() {
            registry
        } else {
            registry.merge_overrides(self.overrides)
        }
    }
}
