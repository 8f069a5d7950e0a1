//! End-to-end routing pipeline
//!
//! route -> reorder -> plan -> expand delegators -> re-plan -> dispatch.
//! The router and the chooser are external decision makers; everything in
//! between is deterministic.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::HeapConfig;
use crate::delegation::{AsyncChooser, DelegationResolver};
use crate::dispatch::{DispatchReport, Dispatcher, SpecialistRunner};
use crate::error::Result;
use crate::planning::{
    apply_reorder_policies, build_plan, ExecutionPlan, HeapStep, RouterOutput, TaskIntent,
};
use crate::queue::ExecutionQueue;
use crate::registry::{SpecialistRegistry, SpecialistSummary};

/// Produces a routing decision for a task from the top-level specialists
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, task: &str, specialists: &[SpecialistSummary]) -> Result<RouterOutput>;
}

/// Router that always returns the same decision
#[derive(Debug, Clone)]
pub struct StaticRouter(pub RouterOutput);

#[async_trait]
impl Router for StaticRouter {
    async fn route(&self, _task: &str, _specialists: &[SpecialistSummary]) -> Result<RouterOutput> {
        Ok(self.0.clone())
    }
}

/// Every intermediate form of one pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    /// Task text handed to choosers and runners
    pub task: String,
    pub routed: Vec<HeapStep>,
    pub reordered: Vec<HeapStep>,
    pub plan: ExecutionPlan,
    pub resolved: ExecutionPlan,
    pub dispatch: DispatchReport,
}

pub struct Pipeline {
    registry: Arc<SpecialistRegistry>,
    router: Arc<dyn Router>,
    chooser: Arc<dyn AsyncChooser>,
    resolver: DelegationResolver,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(
        registry: Arc<SpecialistRegistry>,
        config: &HeapConfig,
        router: Arc<dyn Router>,
        chooser: Arc<dyn AsyncChooser>,
        runner: Arc<dyn SpecialistRunner>,
    ) -> Self {
        Self {
            resolver: DelegationResolver::new(registry.clone(), config),
            dispatcher: Dispatcher::new(ExecutionQueue::from_config(config), runner),
            registry,
            router,
            chooser,
        }
    }

    /// Replace the dispatcher, e.g. to share a queue or change halting
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    pub async fn run(&self, task: &str, intent: &TaskIntent) -> Result<PipelineReport> {
        let routed = self
            .router
            .route(task, &self.registry.top_level_view())
            .await?;

        let task = if routed.refined_task.trim().is_empty() {
            task.to_string()
        } else {
            routed.refined_task.clone()
        };

        let reordered = apply_reorder_policies(&routed.priority_order, intent);
        let plan = build_plan(&reordered, &self.registry);
        tracing::info!(
            routed = routed.priority_order.len(),
            levels = plan.levels.len(),
            "plan built"
        );

        let expanded = self
            .resolver
            .expand_to_leaves(&plan.to_steps(), &task, self.chooser.as_ref())
            .await?;
        let resolved = build_plan(&expanded, &self.registry);

        let dispatch = self.dispatcher.dispatch(&resolved, &self.registry, &task).await;
        tracing::info!(
            completed = dispatch.completed_ids().len(),
            failed = dispatch.failed_ids().len(),
            skipped = dispatch.skipped_ids().len(),
            "pipeline finished"
        );

        Ok(PipelineReport {
            task,
            routed: routed.priority_order,
            reordered,
            plan,
            resolved,
            dispatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::FirstOption;
    use crate::dispatch::EchoRunner;
    use crate::error::HeapError;
    use crate::registry::default_registry;

    struct Unreachable;

    #[async_trait]
    impl Router for Unreachable {
        async fn route(
            &self,
            _task: &str,
            _specialists: &[SpecialistSummary],
        ) -> Result<RouterOutput> {
            Err(HeapError::InvalidRouterOutput("router offline".to_string()))
        }
    }

    fn pipeline(router: Arc<dyn Router>) -> Pipeline {
        Pipeline::new(
            Arc::new(default_registry().clone()),
            &HeapConfig::default(),
            router,
            Arc::new(FirstOption),
            Arc::new(EchoRunner),
        )
    }

    #[tokio::test]
    async fn test_run_resolves_and_dispatches() {
        let output = RouterOutput::parse(
            r#"{"priorityOrder": ["workflow", "general", "ghost"], "refinedTask": "draft the onboarding flow"}"#,
        )
        .unwrap();
        let report = pipeline(Arc::new(StaticRouter(output)))
            .run("onboarding", &TaskIntent::default())
            .await
            .unwrap();

        assert_eq!(report.task, "draft the onboarding flow");
        assert_eq!(report.plan.levels, vec![vec!["workflow"], vec!["general"]]);
        assert_eq!(
            report.resolved.levels,
            vec![vec!["workflow__part1"], vec!["general"]]
        );
        assert_eq!(report.dispatch.completed_ids(), vec!["workflow__part1", "general"]);
    }

    #[tokio::test]
    async fn test_router_errors_propagate() {
        let result = pipeline(Arc::new(Unreachable))
            .run("anything", &TaskIntent::default())
            .await;
        assert!(matches!(result, Err(HeapError::InvalidRouterOutput(_))));
    }
}
