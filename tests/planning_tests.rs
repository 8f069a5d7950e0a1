//! Plan builder integration tests

use switchboard::planning::{
    apply_reorder_policies, build_plan, reorder_agent_before_workflow,
    reorder_creation_before_improvement, ExecutionPlan, HeapStep, RouterOutput, TaskIntent,
};
use switchboard::registry::{default_registry, LogicalSpecialistSpec, RegistryBuilder, RegistryCaps};

fn singles(ids: &[&str]) -> Vec<HeapStep> {
    ids.iter().map(|id| HeapStep::single(*id)).collect()
}

fn sorted(steps: &[HeapStep]) -> Vec<Vec<String>> {
    let mut ids: Vec<Vec<String>> = steps.iter().map(|s| s.ids().to_vec()).collect();
    ids.sort();
    ids
}

fn both() -> TaskIntent {
    TaskIntent {
        creates_agent: true,
        creates_workflow: true,
    }
}

#[test]
fn test_missing_ids_are_dropped_from_parallel_steps() {
    let registry = RegistryBuilder::new(RegistryCaps::default()).build(
        &[
            LogicalSpecialistSpec::new("workflow", ["create_workflow"]),
            LogicalSpecialistSpec::new("agent", ["create_agent"]),
        ],
        None,
    );
    let order = vec![
        HeapStep::single("workflow"),
        HeapStep::parallel(["agent", "tools"]),
    ];

    let plan = build_plan(&order, &registry);
    assert_eq!(plan.levels, vec![vec!["workflow"], vec!["agent"]]);
}

#[test]
fn test_plan_has_no_empty_or_unknown_levels() {
    let registry = default_registry();
    let order: Vec<HeapStep> = serde_json::from_str(
        r#"[
            "ghost",
            {"parallel": ["phantom", "spectre"]},
            {"parallel": []},
            {"parallel": ["general", "ghost", "knowledge"]},
            "workflow__part2",
            "tools"
        ]"#,
    )
    .unwrap();

    let plan = build_plan(&order, registry);
    assert_eq!(
        plan.levels,
        vec![
            vec!["general", "knowledge"],
            vec!["workflow__part2"],
            vec!["tools"],
        ]
    );
    for level in &plan.levels {
        assert!(!level.is_empty());
        assert!(level.iter().all(|id| registry.contains(id)));
    }
}

#[test]
fn test_reorders_are_stable_partitions() {
    let cases = vec![
        singles(&["general", "workflow", "agent"]),
        singles(&["improve_agents_workflows", "tools", "workflow__part1", "agent"]),
        vec![
            HeapStep::parallel(["workflow", "agent"]),
            HeapStep::single("agent__part2"),
            HeapStep::single("improve_agents_workflows"),
            HeapStep::parallel(["knowledge", "general"]),
        ],
        singles(&["agent", "agent", "workflow", "workflow"]),
    ];

    for steps in cases {
        let a = reorder_agent_before_workflow(&steps, &both());
        let b = reorder_creation_before_improvement(&steps);
        let both_applied = apply_reorder_policies(&steps, &both());
        assert_eq!(sorted(&a), sorted(&steps));
        assert_eq!(sorted(&b), sorted(&steps));
        assert_eq!(sorted(&both_applied), sorted(&steps));
    }
}

#[test]
fn test_reorders_are_noops_without_trigger() {
    let steps = singles(&["general", "workflow", "agent", "tools"]);
    assert_eq!(
        reorder_agent_before_workflow(&steps, &TaskIntent::default()),
        steps
    );
    assert_eq!(
        reorder_agent_before_workflow(
            &steps,
            &TaskIntent {
                creates_agent: true,
                creates_workflow: false
            }
        ),
        steps
    );
    assert_eq!(reorder_creation_before_improvement(&steps), steps);
}

#[test]
fn test_agent_moves_before_workflow_when_task_creates_both() {
    let intent =
        TaskIntent::from_instructions("Create an agent for triage, then create a workflow");
    let reordered =
        reorder_agent_before_workflow(&singles(&["general", "workflow", "agent"]), &intent);
    assert_eq!(reordered, singles(&["general", "agent", "workflow"]));
}

#[test]
fn test_router_output_to_plan() {
    let raw = "Routing decision:\n```json\n{\"priorityOrder\": [\"improve_agents_workflows\", {\"parallel\": [\"agent\", \"workflow\"]}], \"refinedTask\": \"tune the intake agent\"}\n```";
    let output = RouterOutput::parse(raw).unwrap();
    assert_eq!(output.refined_task, "tune the intake agent");

    let reordered = apply_reorder_policies(&output.priority_order, &TaskIntent::default());
    assert_eq!(
        reordered,
        vec![
            HeapStep::parallel(["agent", "workflow"]),
            HeapStep::single("improve_agents_workflows"),
        ]
    );

    let plan = build_plan(&reordered, default_registry());
    assert_eq!(plan.unit_count(), 3);
    assert_eq!(build_plan(&plan.to_steps(), default_registry()), plan);
}

#[test]
fn test_unparsable_router_output() {
    assert!(RouterOutput::parse("I could not decide").is_err());
    assert!(RouterOutput::parse("{\"priority\": []}").is_err());
    assert_eq!(ExecutionPlan::default().unit_count(), 0);
}
