//! Routing decisions and execution plans

use serde::{Deserialize, Serialize};

use crate::error::{HeapError, Result};

/// One step of a routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeapStep {
    /// Runs on its own
    Single(String),
    /// Runs alongside its siblings
    Parallel { parallel: Vec<String> },
}

impl HeapStep {
    pub fn single(id: impl Into<String>) -> Self {
        HeapStep::Single(id.into())
    }

    pub fn parallel<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HeapStep::Parallel {
            parallel: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn ids(&self) -> &[String] {
        match self {
            HeapStep::Single(id) => std::slice::from_ref(id),
            HeapStep::Parallel { parallel } => parallel,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, HeapStep::Parallel { .. })
    }
}

impl From<&str> for HeapStep {
    fn from(id: &str) -> Self {
        HeapStep::Single(id.to_string())
    }
}

/// Parsed result of a routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterOutput {
    pub priority_order: Vec<HeapStep>,
    #[serde(default)]
    pub refined_task: String,
}

impl RouterOutput {
    /// Parse router text. Accepts bare JSON as well as JSON wrapped in a
    /// markdown fence or surrounded by prose.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if let Ok(output) = serde_json::from_str(trimmed) {
            return Ok(output);
        }

        let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
            return Err(HeapError::InvalidRouterOutput(
                "no JSON object found".to_string(),
            ));
        };
        if end < start {
            return Err(HeapError::InvalidRouterOutput(
                "no JSON object found".to_string(),
            ));
        }

        serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| HeapError::InvalidRouterOutput(e.to_string()))
    }
}

/// Validated, leveled form of a routing decision. Levels run in order; ids
/// inside a level are independent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of ids across all levels
    pub fn unit_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().flatten().map(String::as_str)
    }

    /// Back to routing steps: one-id levels become `Single`, the rest
    /// `Parallel`.
    pub fn to_steps(&self) -> Vec<HeapStep> {
        self.levels
            .iter()
            .map(|level| match level.as_slice() {
                [only] => HeapStep::Single(only.clone()),
                _ => HeapStep::parallel(level.iter().cloned()),
            })
            .collect()
    }
}
