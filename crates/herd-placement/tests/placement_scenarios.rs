//! End-to-end placement scenarios.
//!
//! Each test builds a small cluster snapshot, runs instance placement,
//! and checks the assignments, caps, and pins that come out.

use std::collections::BTreeMap;

use herd_core::{Node, NodeId, Resource, ResourceId, Score, Variant, WorkingSet};
use herd_placement::assign_instances;

fn make_ws(nodes: &[&str]) -> WorkingSet {
    let mut ws = WorkingSet::new();
    for id in nodes {
        ws.add_node(Node::online(id));
    }
    ws
}

fn make_clone(
    ws: &mut WorkingSet,
    id: &str,
    nodes: &[&str],
    instance_count: usize,
) -> (ResourceId, Vec<ResourceId>) {
    let mut clone = Resource::new(id, Variant::Clone);
    for node in nodes {
        clone.allow_node(node, Score::ZERO);
    }
    let clone_id = ws.add_resource(clone).unwrap();

    let mut instances = Vec::new();
    for i in 0..instance_count {
        let mut child = Resource::new(&format!("{id}:{i}"), Variant::Primitive);
        child.parent = Some(clone_id);
        for node in nodes {
            child.allow_node(node, Score::ZERO);
        }
        instances.push(ws.add_resource(child).unwrap());
    }
    (clone_id, instances)
}

fn assignments(ws: &WorkingSet, instances: &[ResourceId]) -> BTreeMap<String, Option<NodeId>> {
    instances
        .iter()
        .map(|&i| {
            let rsc = ws.resource(i).unwrap();
            (rsc.id.clone(), rsc.assigned_to.clone())
        })
        .collect()
}

#[test]
fn even_spread_across_three_nodes() {
    let mut ws = make_ws(&["a", "b", "c"]);
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b", "c"], 3);

    let report = assign_instances(&mut ws, clone_id, &instances, 3, 1).unwrap();

    assert_eq!(report.assigned, 3);
    let mut nodes: Vec<NodeId> = report.placed.iter().map(|(_, n)| n.clone()).collect();
    nodes.sort();
    assert_eq!(nodes, vec!["a", "b", "c"]);

    // Per-node cap: each node holds exactly one instance.
    let clone = ws.resource(clone_id).unwrap();
    assert!(clone.allowed_nodes.values().all(|view| view.count == 1));
}

#[test]
fn active_instances_stay_on_their_current_nodes() {
    let mut ws = make_ws(&["a", "b"]);
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b"], 2);

    // i0 runs on b, i1 on a — the reverse of what plain ordering would
    // produce, so stickiness is observable.
    ws.resource_mut(instances[0])
        .unwrap()
        .running_on
        .insert("b".to_string());
    ws.resource_mut(instances[1])
        .unwrap()
        .running_on
        .insert("a".to_string());

    let report = assign_instances(&mut ws, clone_id, &instances, 2, 1).unwrap();

    assert_eq!(report.assigned, 2);
    let placed = assignments(&ws, &instances);
    assert_eq!(placed["web:0"], Some("b".to_string()));
    assert_eq!(placed["web:1"], Some("a".to_string()));
}

#[test]
fn per_node_cap_leaves_surplus_instance_pinned() {
    let mut ws = make_ws(&["a", "b"]);
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b"], 3);

    let report = assign_instances(&mut ws, clone_id, &instances, 3, 1).unwrap();

    assert_eq!(report.assigned, 2);
    assert_eq!(report.requested, 3);

    let surplus = ws.resource(instances[2]).unwrap();
    assert!(surplus.flags.provisional);
    assert_eq!(surplus.assigned_to, None);
    assert_eq!(surplus.pins.len(), 1);
    assert_eq!(surplus.pins[0].reason, "collective limit reached");
    assert_eq!(surplus.pins[0].score, Score::MinusInf);
    assert!(surplus
        .allowed_nodes
        .values()
        .all(|view| view.weight == Score::MinusInf));
}

#[test]
fn banned_node_receives_no_instances() {
    let mut ws = make_ws(&["a", "b"]);
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b"], 2);
    ws.resource_mut(clone_id)
        .unwrap()
        .allowed_nodes
        .get_mut("a")
        .unwrap()
        .weight = Score::MinusInf;

    let report = assign_instances(&mut ws, clone_id, &instances, 2, 1).unwrap();

    // The ban cascades into every instance's own node table.
    for &instance in &instances {
        let view = &ws.resource(instance).unwrap().allowed_nodes["a"];
        assert_eq!(view.weight, Score::MinusInf);
    }
    for (_, node) in &report.placed {
        assert_ne!(node, "a");
    }
    // Only b can take anything, and only one instance fits there.
    assert_eq!(report.assigned, 1);
}

#[test]
fn unavailable_node_is_skipped() {
    let mut ws = make_ws(&["a", "b", "c"]);
    ws.nodes.get_mut("b").unwrap().online = false;
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b", "c"], 3);

    let report = assign_instances(&mut ws, clone_id, &instances, 3, 1).unwrap();

    assert_eq!(report.assigned, 2);
    for (_, node) in &report.placed {
        assert_ne!(node, "b");
    }
}

#[test]
fn max_total_below_instance_count() {
    let mut ws = make_ws(&["a", "b", "c"]);
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b", "c"], 3);

    let report = assign_instances(&mut ws, clone_id, &instances, 2, 1).unwrap();

    assert_eq!(report.assigned, 2);
    let placed = assignments(&ws, &instances);
    assert_eq!(placed.values().filter(|n| n.is_some()).count(), 2);
    let surplus = ws.resource(instances[2]).unwrap();
    assert_eq!(surplus.pins[0].reason, "collective limit reached");
}

#[test]
fn no_instance_lands_on_negative_score() {
    let mut ws = make_ws(&["a", "b"]);
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b"], 2);
    for &instance in &instances {
        ws.resource_mut(instance)
            .unwrap()
            .allowed_nodes
            .get_mut("a")
            .unwrap()
            .weight = Score::Finite(-5);
    }

    let report = assign_instances(&mut ws, clone_id, &instances, 2, 1).unwrap();

    for (_, node) in &report.placed {
        assert_ne!(node, "a");
    }
    assert_eq!(report.assigned, 1);
}

#[test]
fn placement_is_deterministic() {
    let build = || {
        let mut ws = make_ws(&["a", "b", "c"]);
        let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b", "c"], 3);
        ws.resource_mut(instances[1])
            .unwrap()
            .running_on
            .insert("c".to_string());
        (ws, clone_id, instances)
    };

    let (mut first_ws, clone_a, instances_a) = build();
    let (mut second_ws, clone_b, instances_b) = build();

    let first = assign_instances(&mut first_ws, clone_a, &instances_a, 3, 1).unwrap();
    let second = assign_instances(&mut second_ws, clone_b, &instances_b, 3, 1).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        assignments(&first_ws, &instances_a),
        assignments(&second_ws, &instances_b)
    );
}

#[test]
fn report_serializes_roundtrip() {
    let mut ws = make_ws(&["a", "b"]);
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b"], 2);

    let report = assign_instances(&mut ws, clone_id, &instances, 2, 1).unwrap();
    let json = serde_json::to_string(&report).unwrap();
    let back: herd_placement::PlacementReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}

#[test]
fn rerunning_on_own_output_changes_nothing() {
    let mut ws = make_ws(&["a", "b"]);
    let (clone_id, instances) = make_clone(&mut ws, "web", &["a", "b"], 2);

    assign_instances(&mut ws, clone_id, &instances, 2, 1).unwrap();
    let first_pass = assignments(&ws, &instances);

    // Instances are no longer provisional; a second pass must leave
    // every assignment exactly as it was.
    assign_instances(&mut ws, clone_id, &instances, 2, 1).unwrap();
    assert_eq!(assignments(&ws, &instances), first_pass);
}
