//! Plan dispatch
//!
//! Runs a resolved [`ExecutionPlan`] on an [`ExecutionQueue`]: levels in
//! order, ids inside a level enqueued together. Only leaves run. A delegator
//! left unresolved or an inert specialist is reported as skipped.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::planning::ExecutionPlan;
use crate::queue::ExecutionQueue;
use crate::registry::{SpecialistEntry, SpecialistKind, SpecialistRegistry};

/// Executes one leaf specialist for a task
#[async_trait]
pub trait SpecialistRunner: Send + Sync {
    async fn run(&self, specialist: &SpecialistEntry, task: &str) -> Result<Value>;
}

/// What happened to one id of the plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { output: Value },
    Failed { error: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub id: String,
    pub level: usize,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub steps: Vec<StepReport>,
    /// A failure stopped the run before the last level
    pub halted: bool,
}

impl DispatchReport {
    pub fn succeeded(&self) -> bool {
        !self.halted && self.failed_ids().is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.ids_where(|outcome| matches!(outcome, StepOutcome::Failed { .. }))
    }

    pub fn completed_ids(&self) -> Vec<&str> {
        self.ids_where(|outcome| matches!(outcome, StepOutcome::Completed { .. }))
    }

    pub fn skipped_ids(&self) -> Vec<&str> {
        self.ids_where(|outcome| matches!(outcome, StepOutcome::Skipped { .. }))
    }

    fn ids_where(&self, pred: impl Fn(&StepOutcome) -> bool) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|step| pred(&step.outcome))
            .map(|step| step.id.as_str())
            .collect()
    }
}

/// Runs plans through a bounded queue
pub struct Dispatcher {
    queue: ExecutionQueue,
    runner: Arc<dyn SpecialistRunner>,
    halt_on_failure: bool,
}

impl Dispatcher {
    pub fn new(queue: ExecutionQueue, runner: Arc<dyn SpecialistRunner>) -> Self {
        Self {
            queue,
            runner,
            halt_on_failure: true,
        }
    }

    /// Keep running later levels after a failure
    pub fn with_halt_on_failure(mut self, halt_on_failure: bool) -> Self {
        self.halt_on_failure = halt_on_failure;
        self
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    pub async fn dispatch(
        &self,
        plan: &ExecutionPlan,
        registry: &SpecialistRegistry,
        task: &str,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (level, ids) in plan.levels.iter().enumerate() {
            if report.halted {
                report.steps.extend(ids.iter().map(|id| StepReport {
                    id: id.clone(),
                    level,
                    outcome: StepOutcome::Skipped {
                        reason: "halted after an earlier failure".to_string(),
                    },
                }));
                continue;
            }

            tracing::info!(level, specialists = ids.len(), "dispatching level");
            let outcomes = self.run_level(ids, registry, task).await;

            let mut level_failed = false;
            for (id, outcome) in ids.iter().zip(outcomes) {
                if let StepOutcome::Failed { error } = &outcome {
                    tracing::warn!(id = %id, level, error = %error, "specialist failed");
                    level_failed = true;
                }
                report.steps.push(StepReport {
                    id: id.clone(),
                    level,
                    outcome,
                });
            }

            if level_failed && self.halt_on_failure {
                report.halted = level + 1 < plan.levels.len();
            }
        }

        report
    }

    async fn run_level(
        &self,
        ids: &[String],
        registry: &SpecialistRegistry,
        task: &str,
    ) -> Vec<StepOutcome> {
        let mut pending = Vec::with_capacity(ids.len());

        for id in ids {
            let entry = match registry.get(id) {
                Some(entry) if entry.kind == SpecialistKind::Leaf => entry.clone(),
                Some(entry) => {
                    pending.push(Err(skip_reason(entry.kind)));
                    continue;
                }
                None => {
                    pending.push(Err("not in registry".to_string()));
                    continue;
                }
            };

            let runner = self.runner.clone();
            let task = task.to_string();
            let handle = self
                .queue
                .enqueue(async move { runner.run(&entry, &task).await });
            pending.push(Ok(handle));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for slot in pending {
            let outcome = match slot {
                Ok(handle) => match handle.await {
                    Ok(output) => StepOutcome::Completed { output },
                    Err(e) => StepOutcome::Failed {
                        error: e.to_string(),
                    },
                },
                Err(reason) => StepOutcome::Skipped { reason },
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn skip_reason(kind: SpecialistKind) -> String {
    match kind {
        SpecialistKind::Delegator => "unresolved delegator".to_string(),
        SpecialistKind::Inert => "inert specialist".to_string(),
        SpecialistKind::Leaf => "leaf".to_string(),
    }
}

/// Runner that echoes back the specialist and task it was handed
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoRunner;

#[async_trait]
impl SpecialistRunner for EchoRunner {
    async fn run(&self, specialist: &SpecialistEntry, task: &str) -> Result<Value> {
        Ok(serde_json::json!({
            "specialist": specialist.id,
            "tools": specialist.tool_names,
            "task": task,
        }))
    }
}
