//! Reordering policies for routing decisions
//!
//! Both policies are stable partitions: they move whole steps and never add,
//! drop or edit one. Classification is by id naming only:
//! `agent` / `agent__*`, `workflow` / `workflow__*`,
//! `improve_agents_workflows` / `improve_agents_workflows__*`.

use regex::Regex;
use std::sync::LazyLock;

use super::step::HeapStep;

pub const AGENT_ROLE: &str = "agent";
pub const WORKFLOW_ROLE: &str = "workflow";
pub const IMPROVE_ROLE: &str = "improve_agents_workflows";

static CREATE_AGENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:create|build|make|add|set\s+up|spin\s+up)\s+(?:[\w-]+\s+){0,4}?agents?\b")
        .expect("static regex is valid")
});

static CREATE_WORKFLOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:create|build|make|add|set\s+up|spin\s+up)\s+(?:[\w-]+\s+){0,4}?workflows?\b",
    )
    .expect("static regex is valid")
});

/// What the originating task asks to create. Best effort: a miss leaves
/// the plan order unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskIntent {
    pub creates_agent: bool,
    pub creates_workflow: bool,
}

impl TaskIntent {
    /// From structured action names such as `create_agent` or `createWorkflow`
    pub fn from_actions<S: AsRef<str>>(actions: &[S]) -> Self {
        let normalized: Vec<String> = actions
            .iter()
            .map(|action| {
                action
                    .as_ref()
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect::<String>()
                    .to_ascii_lowercase()
            })
            .collect();

        Self {
            creates_agent: normalized.iter().any(|a| a.contains("createagent")),
            creates_workflow: normalized.iter().any(|a| a.contains("createworkflow")),
        }
    }

    /// From free-text instructions ("create a support agent and a workflow")
    pub fn from_instructions(text: &str) -> Self {
        Self {
            creates_agent: CREATE_AGENT.is_match(text),
            creates_workflow: CREATE_WORKFLOW.is_match(text),
        }
    }

    /// Structured actions win when present; otherwise the free text is used
    pub fn infer<S: AsRef<str>>(actions: Option<&[S]>, instructions: &str) -> Self {
        match actions {
            Some(actions) if !actions.is_empty() => Self::from_actions(actions),
            _ => Self::from_instructions(instructions),
        }
    }

    pub fn creates_agent_and_workflow(&self) -> bool {
        self.creates_agent && self.creates_workflow
    }
}

fn mentions(step: &HeapStep, role: &str) -> bool {
    step.ids().iter().any(|id| {
        id == role
            || id
                .strip_prefix(role)
                .map(|rest| rest.starts_with("__"))
                .unwrap_or(false)
    })
}

fn is_agent_only(step: &HeapStep) -> bool {
    mentions(step, AGENT_ROLE) && !mentions(step, WORKFLOW_ROLE)
}

/// Move agent-only steps to just before the first workflow step when the
/// task creates both. No-op when the intent is missing, there is no
/// workflow step, or no agent step sits at or after the first workflow step.
pub fn reorder_agent_before_workflow(steps: &[HeapStep], intent: &TaskIntent) -> Vec<HeapStep> {
    if !intent.creates_agent_and_workflow() {
        return steps.to_vec();
    }
    let Some(first_workflow) = steps.iter().position(|s| mentions(s, WORKFLOW_ROLE)) else {
        return steps.to_vec();
    };
    if !steps[first_workflow..].iter().any(is_agent_only) {
        return steps.to_vec();
    }

    let (agent_steps, others): (Vec<&HeapStep>, Vec<&HeapStep>) =
        steps.iter().partition(|step| is_agent_only(step));
    let insert_at = others
        .iter()
        .position(|s| mentions(s, WORKFLOW_ROLE))
        .unwrap_or(others.len());

    let reordered: Vec<HeapStep> = others[..insert_at]
        .iter()
        .chain(agent_steps.iter())
        .chain(others[insert_at..].iter())
        .map(|step| (*step).clone())
        .collect();

    tracing::debug!(moved = agent_steps.len(), "moved agent steps before workflow");
    reordered
}

/// Agent-only steps, then workflow steps, then improvement steps, then the
/// rest; relative order kept inside each group. Only applies when an
/// improvement step is present, and backs out if the partition would
/// change the number of steps.
pub fn reorder_creation_before_improvement(steps: &[HeapStep]) -> Vec<HeapStep> {
    if !steps.iter().any(|s| mentions(s, IMPROVE_ROLE)) {
        return steps.to_vec();
    }

    let mut agents = Vec::new();
    let mut workflows = Vec::new();
    let mut improvements = Vec::new();
    let mut rest = Vec::new();

    for step in steps {
        if is_agent_only(step) {
            agents.push(step.clone());
        } else if mentions(step, WORKFLOW_ROLE) {
            workflows.push(step.clone());
        } else if mentions(step, IMPROVE_ROLE) {
            improvements.push(step.clone());
        } else {
            rest.push(step.clone());
        }
    }

    let reordered: Vec<HeapStep> = agents
        .into_iter()
        .chain(workflows)
        .chain(improvements)
        .chain(rest)
        .collect();

    if reordered.len() != steps.len() {
        tracing::warn!(
            before = steps.len(),
            after = reordered.len(),
            "creation-before-improvement reorder changed step count; keeping original order"
        );
        return steps.to_vec();
    }

    reordered
}

/// Both policies, agent-before-workflow first
pub fn apply_reorder_policies(steps: &[HeapStep], intent: &TaskIntent) -> Vec<HeapStep> {
    let steps = reorder_agent_before_workflow(steps, intent);
    reorder_creation_before_improvement(&steps)
}
