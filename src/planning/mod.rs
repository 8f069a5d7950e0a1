//! Execution planning
//!
//! Turns a routing decision into a leveled plan: reorder the steps by the
//! creation policies, then drop every id the registry does not know.

pub mod builder;
pub mod reorder;
pub mod step;

pub use builder::build_plan;
pub use reorder::{
    apply_reorder_policies, reorder_agent_before_workflow, reorder_creation_before_improvement,
    TaskIntent,
};
pub use step::{ExecutionPlan, HeapStep, RouterOutput};
