//! Plan builder
//!
//! Routers hallucinate. Ids that are not in the registry are dropped here
//! instead of failing the plan, and a step that loses every id produces no
//! level at all.

use super::step::{ExecutionPlan, HeapStep};
use crate::registry::SpecialistRegistry;

/// Build a leveled plan from a routing decision
pub fn build_plan(priority_order: &[HeapStep], registry: &SpecialistRegistry) -> ExecutionPlan {
    let mut levels = Vec::with_capacity(priority_order.len());

    for step in priority_order {
        let level: Vec<String> = step
            .ids()
            .iter()
            .filter(|id| registry.contains(id))
            .cloned()
            .collect();

        if level.len() < step.ids().len() {
            tracing::debug!(
                step = ?step,
                kept = level.len(),
                "dropped unknown specialist ids from step"
            );
        }

        if !level.is_empty() {
            levels.push(level);
        }
    }

    ExecutionPlan { levels }
}
