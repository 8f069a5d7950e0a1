//! Registry builder integration tests
//!
//! Cap enforcement, tool splitting and top-level hiding through the public
//! API only.

use std::collections::HashSet;
use std::io::Write;
use switchboard::registry::{
    default_registry, Catalog, LogicalSpecialistSpec, RegistryBuilder, RegistryCaps,
    SpecialistEntry, SpecialistKind, SpecialistRegistry,
};
use switchboard::HeapConfig;

fn tools(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{}_{}", prefix, i)).collect()
}

fn caps(max_tools: usize, max_children: usize, max_top_level: usize) -> RegistryCaps {
    RegistryCaps {
        max_tools,
        max_children,
        max_top_level,
    }
}

fn assert_caps_hold(registry: &SpecialistRegistry, caps: RegistryCaps) {
    assert!(registry.top_level_ids().len() <= caps.max_top_level);
    for entry in registry.entries() {
        assert!(
            entry.tool_names.len() <= caps.max_tools,
            "{} owns {} tools",
            entry.id,
            entry.tool_names.len()
        );
        assert!(
            entry.delegate_targets.len() <= caps.max_children,
            "{} owns {} children",
            entry.id,
            entry.delegate_targets.len()
        );
    }
}

#[test]
fn test_caps_hold_across_shapes() {
    for (max_tools, max_children, max_top_level) in [(1, 2, 1), (3, 2, 4), (10, 8, 12), (4, 3, 2)] {
        let caps = caps(max_tools, max_children, max_top_level);
        let specs: Vec<LogicalSpecialistSpec> = [0, 1, 5, 17, 64]
            .iter()
            .enumerate()
            .map(|(i, n)| LogicalSpecialistSpec::new(format!("spec{}", i), tools("t", *n)))
            .collect();

        let registry = RegistryBuilder::new(caps).build(&specs, None);
        assert_caps_hold(&registry, caps);

        let merged = registry.merge_overrides(vec![
            SpecialistEntry::leaf("spec0", tools("override", 40)),
            SpecialistEntry::delegator("fanout", tools("child", 40)),
        ]);
        assert_caps_hold(&merged, caps);
    }
}

#[test]
fn test_split_preserves_tools_in_order() {
    let original = tools("crm", 25);
    let registry = RegistryBuilder::new(caps(3, 4, 12))
        .build(&[LogicalSpecialistSpec::new("crm", original.clone())], None);

    let leaves: Vec<&SpecialistEntry> = registry.entries().filter(|e| e.is_leaf()).collect();
    assert_eq!(leaves.len(), 25_usize.div_ceil(3));
    assert_eq!(registry.effective_tools("crm"), original);
}

#[test]
fn test_twenty_five_tools_with_k_ten() {
    let registry = RegistryBuilder::new(caps(10, 8, 12))
        .build(&[LogicalSpecialistSpec::new("crm", tools("crm", 25))], None);

    let root = registry.get("crm").unwrap();
    assert_eq!(root.kind, SpecialistKind::Delegator);
    assert_eq!(root.delegate_targets.len(), 3);

    let sizes: Vec<usize> = root
        .delegate_targets
        .iter()
        .map(|id| registry.get(id).unwrap().tool_names.len())
        .collect();
    assert_eq!(sizes, vec![10, 10, 5]);
}

#[test]
fn test_internal_ids_never_reach_top_level() {
    let specs = vec![
        LogicalSpecialistSpec::new("big", tools("big", 50)),
        LogicalSpecialistSpec::new("small", tools("small", 2)),
    ];
    let requested: Vec<String> = [
        "big__part1",
        "big__lvl1_group1",
        "small",
        "ghost",
        "big",
        "small",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let registry = RegistryBuilder::new(caps(2, 3, 12)).build(&specs, Some(&requested));
    assert_eq!(registry.top_level_ids(), vec!["small", "big"]);

    let synthesized: HashSet<&str> = registry
        .entries()
        .filter(|e| e.parent_id.is_some())
        .map(|e| e.id.as_str())
        .collect();
    assert!(!synthesized.is_empty());
    for id in registry.top_level_ids() {
        assert!(!synthesized.contains(id.as_str()));
    }
}

#[test]
fn test_overrides_beyond_cap_are_reachable_but_hidden() {
    let registry = RegistryBuilder::new(caps(10, 8, 2)).build(
        &[
            LogicalSpecialistSpec::new("general", tools("g", 2)),
            LogicalSpecialistSpec::new("docs", tools("d", 2)),
        ],
        None,
    );
    let merged = registry.merge_overrides(vec![
        SpecialistEntry::leaf("extra", tools("x", 1)),
        SpecialistEntry::leaf("docs", tools("new_docs", 3)).with_description("Replaced"),
    ]);

    assert_eq!(merged.top_level_ids(), vec!["general", "docs"]);
    assert!(merged.contains("extra"));
    assert_eq!(merged.get("docs").unwrap().tool_names, tools("new_docs", 3));
    // The original snapshot is untouched
    assert!(!registry.contains("extra"));
    assert_eq!(registry.get("docs").unwrap().tool_names, tools("d", 2));
}

#[test]
fn test_default_registry_shape() {
    let registry = default_registry();
    assert_caps_hold(registry, HeapConfig::default().registry_caps());
    assert!(registry.is_delegator("workflow"));
    assert!(registry.is_leaf("agent"));
    assert_eq!(registry.get("planner").unwrap().kind, SpecialistKind::Inert);
    assert!(!registry.is_top_level("workflow__part1"));
    assert!(std::ptr::eq(registry, default_registry()));
}

#[test]
fn test_catalog_file_round_trips_into_registry() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "specialists": [
                {{"id": "search", "toolNames": ["web", "news", "images"], "partIds": ["search_web", "search_rest"]}},
                {{"id": "notes", "toolNames": ["write"]}}
            ],
            "topLevelIds": ["notes", "search"],
            "overrides": [
                {{"id": "notes_archive", "kind": "leaf", "toolNames": ["archive"], "parentId": "notes"}}
            ]
        }}"#
    )
    .unwrap();

    let registry = Catalog::load(file.path())
        .unwrap()
        .into_registry(caps(2, 8, 12));

    assert_eq!(registry.top_level_ids(), vec!["notes", "search", "notes_archive"]);
    assert_eq!(
        registry.get("search").unwrap().delegate_targets,
        vec!["search_web", "search_rest"]
    );
    assert_eq!(registry.subspecialist_parent("notes_archive"), Some("notes"));
    assert_eq!(registry.primary_ids(), vec!["notes", "search"]);
}

#[test]
fn test_repeated_or_taken_part_ids_fall_back() {
    let specs = vec![
        LogicalSpecialistSpec::new("crm_notes", ["note"]),
        LogicalSpecialistSpec::new("crm", tools("t", 6)).with_part_ids(vec![
            "crm_a".into(),
            "crm_a".into(),
            "crm_notes".into(),
        ]),
    ];
    let registry = RegistryBuilder::new(caps(2, 8, 12)).build(&specs, None);

    assert_eq!(
        registry.get("crm").unwrap().delegate_targets,
        vec!["crm_a", "crm__part2", "crm__part3"]
    );
    assert_eq!(registry.effective_tools("crm"), tools("t", 6));
    assert_eq!(registry.get("crm_notes").unwrap().tool_names, vec!["note"]);
}

#[test]
fn test_child_cap_below_two_is_raised() {
    let builder = RegistryBuilder::new(caps(1, 1, 12));
    assert_eq!(builder.caps().max_children, 2);

    let registry = builder.build(&[LogicalSpecialistSpec::new("crm", tools("t", 4))], None);
    assert_eq!(registry.caps().max_children, 2);
    assert_eq!(registry.effective_tools("crm"), tools("t", 4));
    assert_caps_hold(&registry, registry.caps());
}
