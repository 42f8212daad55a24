//! Per-variant node choice for a single resource.
//!
//! A primitive picks its best allowed node after applying colocation
//! scores; a group assigns its members in order and locates at its
//! first member. Assignment always finalizes: the resource leaves the
//! provisional state with either a chosen node or an explicit
//! "cannot run anywhere" pin.

use tracing::{debug, info, trace};

use herd_core::{Colocation, NodeId, ResourceId, Score, Variant, WorkingSet};

use crate::error::PlacementResult;

/// Assign a resource to a node according to its variant.
///
/// `prefer` is honored when the preferred node scores at least as well
/// as the best candidate and can run resources. Returns the chosen
/// node, or `None` when no node is viable (or a colocation dependency
/// cycle was detected, in which case the resource stays provisional).
pub fn assign_resource(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    prefer: Option<&NodeId>,
) -> PlacementResult<Option<NodeId>> {
    match ws.resource(rsc)?.variant {
        Variant::Primitive => assign_primitive(ws, rsc, prefer),
        Variant::Group => assign_group(ws, rsc, prefer),
        Variant::Clone | Variant::Bundle => {
            // Collectives are placed by the instance engine; a
            // colocation primary that happens to be one is consulted
            // for its location only.
            debug!(
                resource = %ws.resource(rsc)?.id,
                "not assigning collective here; using its current placement"
            );
            Ok(ws.location(rsc, false)?)
        }
    }
}

fn assign_primitive(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    prefer: Option<&NodeId>,
) -> PlacementResult<Option<NodeId>> {
    {
        let resource = ws.resource(rsc)?;
        if !resource.flags.provisional {
            return Ok(resource.assigned_to.clone());
        }
        if resource.flags.assigning {
            debug!(resource = %resource.id, "breaking assignment loop");
            return Ok(None);
        }
    }
    ws.resource_mut(rsc)?.flags.assigning = true;

    apply_colocations(ws, rsc)?;

    let chosen = choose_node(ws, rsc, prefer)?;
    {
        let resource = ws.resource_mut(rsc)?;
        resource.flags.provisional = false;
        resource.flags.assigning = false;
        resource.assigned_to = chosen.clone();
    }
    if chosen.is_none() {
        debug!(resource = %ws.resource(rsc)?.id, "resource cannot run anywhere");
        ws.resource_location(rsc, None, Score::MinusInf, "cannot run anywhere")?;
    }
    Ok(chosen)
}

fn assign_group(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    prefer: Option<&NodeId>,
) -> PlacementResult<Option<NodeId>> {
    {
        let resource = ws.resource(rsc)?;
        if !resource.flags.provisional {
            return Ok(resource.assigned_to.clone());
        }
        if resource.flags.assigning {
            debug!(resource = %resource.id, "breaking assignment loop");
            return Ok(None);
        }
    }
    ws.resource_mut(rsc)?.flags.assigning = true;

    let members = ws.resource(rsc)?.children.clone();
    let mut first_node = None;
    for member in members {
        let node = assign_resource(ws, member, prefer)?;
        if first_node.is_none() {
            first_node = node;
        }
    }

    let resource = ws.resource_mut(rsc)?;
    resource.flags.provisional = false;
    resource.flags.assigning = false;
    resource.assigned_to = first_node.clone();
    Ok(first_node)
}

/// Apply colocation scores to the resource's allowed nodes, mandatory
/// edges first so as many of them as possible are satisfied.
fn apply_colocations(ws: &mut WorkingSet, rsc: ResourceId) -> PlacementResult<()> {
    let this_with = ws.resource(rsc)?.this_with.clone();
    let with_this = ws.resource(rsc)?.with_this.clone();

    for mandatory_pass in [true, false] {
        for &edge_id in &this_with {
            let edge = ws.colocation(edge_id)?.clone();
            if edge_is_mandatory(&edge) == mandatory_pass {
                apply_this_with(ws, rsc, &edge)?;
            }
        }
        for &edge_id in &with_this {
            let edge = ws.colocation(edge_id)?.clone();
            if edge_is_mandatory(&edge) == mandatory_pass {
                apply_dependent_score(ws, rsc, &edge)?;
            }
        }
    }
    Ok(())
}

fn edge_is_mandatory(edge: &Colocation) -> bool {
    matches!(edge.score, Score::PlusInf | Score::MinusInf)
}

/// Apply a "this with" colocation: steer `rsc` toward (or away from)
/// the primary's node. The primary is assigned first if still pending.
fn apply_this_with(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    edge: &Colocation,
) -> PlacementResult<()> {
    // A finite negative score may empty the node table; keep a copy so
    // the scores can be reverted in that case.
    let archive = match edge.score {
        Score::Finite(score) if score < 0 => Some(ws.resource(rsc)?.allowed_nodes.clone()),
        _ => None,
    };

    let (primary_pending, primary_id) = {
        let primary = ws.resource(edge.primary)?;
        (
            primary.flags.provisional && !primary.flags.assigning,
            primary.id.clone(),
        )
    };
    if primary_pending {
        debug!(
            resource = %ws.resource(rsc)?.id,
            primary = %primary_id,
            colocation = %edge.id,
            score = %edge.score,
            "assigning colocation primary first"
        );
        assign_resource(ws, edge.primary, None)?;
    }
    let primary_node = ws.location(edge.primary, false)?;
    apply_coloc_score(ws, rsc, primary_node, edge.score)?;

    if let Some(archive) = archive {
        let none_left = ws
            .resource(rsc)?
            .allowed_nodes
            .values()
            .all(|view| view.weight.is_negative());
        if none_left {
            info!(
                resource = %ws.resource(rsc)?.id,
                colocation = %edge.id,
                "reverting colocation scores: no nodes would remain allowed"
            );
            ws.resource_mut(rsc)?.allowed_nodes = archive;
        }
    }
    Ok(())
}

fn apply_coloc_score(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    primary_node: Option<NodeId>,
    score: Score,
) -> PlacementResult<()> {
    match primary_node {
        Some(primary_node) => {
            let node_ids: Vec<NodeId> =
                ws.resource(rsc)?.allowed_nodes.keys().cloned().collect();
            let resource = ws.resource_mut(rsc)?;
            for node_id in node_ids {
                let Some(view) = resource.allowed_nodes.get_mut(&node_id) else {
                    continue;
                };
                if node_id == primary_node {
                    view.weight = view.weight.plus(score);
                } else if score == Score::PlusInf {
                    // Mandatory colocation: only the primary's node is
                    // acceptable.
                    view.weight = view.weight.plus(Score::MinusInf);
                }
            }
        }
        None => {
            if score == Score::PlusInf {
                trace!(
                    resource = %ws.resource(rsc)?.id,
                    "mandatory colocation primary is inactive; banning everywhere"
                );
                let resource = ws.resource_mut(rsc)?;
                for view in resource.allowed_nodes.values_mut() {
                    view.weight = view.weight.plus(Score::MinusInf);
                }
            }
        }
    }
    Ok(())
}

/// Apply a "with this" colocation: the dependent pulls `rsc` toward
/// wherever the dependent is placed or running.
fn apply_dependent_score(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    edge: &Colocation,
) -> PlacementResult<()> {
    {
        let dependent = ws.resource(edge.dependent)?;
        if !edge.has_influence(dependent) {
            return Ok(());
        }
    }
    let dependent_node = match ws.location(edge.dependent, false)? {
        Some(node) => Some(node),
        None => ws.location(edge.dependent, true)?,
    };
    if let Some(node_id) = dependent_node {
        if let Some(view) = ws.resource_mut(rsc)?.allowed_nodes.get_mut(&node_id) {
            view.weight = view.weight.plus(edge.score);
        }
    }
    Ok(())
}

/// Pick the best allowed node, honoring the preferred node when it is
/// at least as good, and breaking score ties toward the current node.
fn choose_node(
    ws: &WorkingSet,
    rsc: ResourceId,
    prefer: Option<&NodeId>,
) -> PlacementResult<Option<NodeId>> {
    let sorted = ws.sorted_allowed_nodes(rsc)?;
    let Some(best) = sorted.first() else {
        return Ok(None);
    };
    let resource = ws.resource(rsc)?;
    let best_weight = resource.allowed_nodes[best].weight;

    if let Some(preferred) = prefer {
        match resource.allowed_nodes.get(preferred) {
            Some(view)
                if view.weight >= best_weight
                    && !view.weight.is_negative()
                    && ws
                        .node(preferred)
                        .is_some_and(|n| n.available(true, false)) =>
            {
                trace!(resource = %resource.id, node = %preferred, "chose preferred node");
                return Ok(Some(preferred.clone()));
            }
            Some(_) => {
                trace!(resource = %resource.id, node = %preferred, "preferred node unsuitable")
            }
            None => trace!(resource = %resource.id, node = %preferred, "preferred node unknown"),
        }
    }

    if best_weight.is_negative() {
        return Ok(None);
    }

    let mut chosen = best.clone();

    // Prefer the current node among equally-scored candidates. Not for
    // collective instances: the instance engine already assigned
    // instances to their current nodes where appropriate, and the
    // remaining ones must spread out.
    let parent_is_collective = match resource.parent {
        Some(parent) => ws.resource(parent)?.variant.is_collective(),
        None => false,
    };
    if !parent_is_collective
        && best_weight > Score::ZERO
        && ws.node(&chosen).is_some_and(|n| n.available(false, false))
    {
        if let Some(running) = ws.location(rsc, true)? {
            if running != chosen
                && resource
                    .allowed_nodes
                    .get(&running)
                    .is_some_and(|view| view.weight == best_weight)
                && ws.node(&running).is_some_and(|n| n.available(true, false))
            {
                trace!(
                    resource = %resource.id,
                    node = %running,
                    "scores are equal; preferring current node"
                );
                chosen = running;
            }
        }
    }

    trace!(
        resource = %resource.id,
        node = %chosen,
        candidates = sorted.len(),
        "chose node"
    );
    Ok(Some(chosen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use herd_core::{Node, Resource};

    fn two_node_ws() -> WorkingSet {
        let mut ws = WorkingSet::new();
        ws.add_node(Node::online("a"));
        ws.add_node(Node::online("b"));
        ws
    }

    fn add_primitive(ws: &mut WorkingSet, id: &str, weights: &[(&str, Score)]) -> ResourceId {
        let mut rsc = Resource::new(id, Variant::Primitive);
        for (node, weight) in weights {
            rsc.allow_node(node, *weight);
        }
        ws.add_resource(rsc).unwrap()
    }

    #[test]
    fn picks_highest_weight() {
        let mut ws = two_node_ws();
        let rsc = add_primitive(
            &mut ws,
            "db",
            &[("a", Score::Finite(5)), ("b", Score::Finite(50))],
        );
        let chosen = assign_resource(&mut ws, rsc, None).unwrap();
        assert_eq!(chosen, Some("b".to_string()));
        assert!(!ws.resource(rsc).unwrap().flags.provisional);
    }

    #[test]
    fn all_banned_means_nowhere_and_pins() {
        let mut ws = two_node_ws();
        let rsc = add_primitive(
            &mut ws,
            "db",
            &[("a", Score::MinusInf), ("b", Score::Finite(-1))],
        );
        let chosen = assign_resource(&mut ws, rsc, None).unwrap();
        assert_eq!(chosen, None);
        let resource = ws.resource(rsc).unwrap();
        assert!(!resource.flags.provisional);
        assert_eq!(resource.pins.len(), 1);
        assert_eq!(resource.pins[0].reason, "cannot run anywhere");
    }

    #[test]
    fn prefer_honored_on_score_tie() {
        let mut ws = two_node_ws();
        let rsc = add_primitive(
            &mut ws,
            "db",
            &[("a", Score::ZERO), ("b", Score::ZERO)],
        );
        let prefer = "b".to_string();
        let chosen = assign_resource(&mut ws, rsc, Some(&prefer)).unwrap();
        assert_eq!(chosen, Some("b".to_string()));
    }

    #[test]
    fn prefer_rejected_when_outscored() {
        let mut ws = two_node_ws();
        let rsc = add_primitive(
            &mut ws,
            "db",
            &[("a", Score::Finite(100)), ("b", Score::ZERO)],
        );
        let prefer = "b".to_string();
        let chosen = assign_resource(&mut ws, rsc, Some(&prefer)).unwrap();
        assert_eq!(chosen, Some("a".to_string()));
    }

    #[test]
    fn tie_break_prefers_current_node() {
        let mut ws = two_node_ws();
        let rsc = add_primitive(
            &mut ws,
            "db",
            &[("a", Score::Finite(7)), ("b", Score::Finite(7))],
        );
        ws.resource_mut(rsc)
            .unwrap()
            .running_on
            .insert("b".to_string());
        let chosen = assign_resource(&mut ws, rsc, None).unwrap();
        assert_eq!(chosen, Some("b".to_string()));
    }

    #[test]
    fn mandatory_colocation_follows_primary() {
        let mut ws = two_node_ws();
        let primary = add_primitive(
            &mut ws,
            "db",
            &[("a", Score::ZERO), ("b", Score::Finite(10))],
        );
        let dependent = add_primitive(
            &mut ws,
            "app",
            &[("a", Score::Finite(100)), ("b", Score::ZERO)],
        );
        ws.add_colocation(Colocation {
            id: "app-with-db".to_string(),
            dependent,
            primary,
            score: Score::PlusInf,
            influence: true,
        })
        .unwrap();

        // Assigning the dependent assigns the primary first, then the
        // dependent can only land next to it.
        let chosen = assign_resource(&mut ws, dependent, None).unwrap();
        assert_eq!(chosen, Some("b".to_string()));
        assert_eq!(
            ws.resource(primary).unwrap().assigned_to,
            Some("b".to_string())
        );
    }

    #[test]
    fn anti_colocation_avoids_primary() {
        let mut ws = two_node_ws();
        let primary = add_primitive(
            &mut ws,
            "db",
            &[("a", Score::Finite(10)), ("b", Score::ZERO)],
        );
        let dependent = add_primitive(
            &mut ws,
            "batch",
            &[("a", Score::Finite(1)), ("b", Score::ZERO)],
        );
        ws.add_colocation(Colocation {
            id: "batch-away-from-db".to_string(),
            dependent,
            primary,
            score: Score::MinusInf,
            influence: true,
        })
        .unwrap();

        let chosen = assign_resource(&mut ws, dependent, None).unwrap();
        assert_eq!(chosen, Some("b".to_string()));
    }

    #[test]
    fn negative_finite_colocation_reverts_if_it_bans_everything() {
        let mut ws = WorkingSet::new();
        ws.add_node(Node::online("a"));
        let primary = add_primitive(&mut ws, "db", &[("a", Score::ZERO)]);
        let dependent = add_primitive(&mut ws, "batch", &[("a", Score::ZERO)]);
        ws.add_colocation(Colocation {
            id: "batch-avoid-db".to_string(),
            dependent,
            primary,
            score: Score::Finite(-100),
            influence: true,
        })
        .unwrap();

        // The only node would drop below zero; scores revert and the
        // dependent still lands there.
        let chosen = assign_resource(&mut ws, dependent, None).unwrap();
        assert_eq!(chosen, Some("a".to_string()));
    }

    #[test]
    fn colocation_cycle_fails_gracefully() {
        let mut ws = two_node_ws();
        let first = add_primitive(&mut ws, "one", &[("a", Score::ZERO)]);
        let second = add_primitive(&mut ws, "two", &[("a", Score::ZERO)]);
        ws.add_colocation(Colocation {
            id: "one-with-two".to_string(),
            dependent: first,
            primary: second,
            score: Score::Finite(5),
            influence: true,
        })
        .unwrap();
        ws.add_colocation(Colocation {
            id: "two-with-one".to_string(),
            dependent: second,
            primary: first,
            score: Score::Finite(5),
            influence: true,
        })
        .unwrap();

        // Both still get placed; the cycle is broken rather than
        // recursing forever.
        let chosen = assign_resource(&mut ws, first, None).unwrap();
        assert_eq!(chosen, Some("a".to_string()));
    }

    #[test]
    fn group_locates_at_first_member() {
        let mut ws = two_node_ws();
        let mut group = Resource::new("stack", Variant::Group);
        group.allow_node("a", Score::ZERO);
        group.allow_node("b", Score::ZERO);
        let group_id = ws.add_resource(group).unwrap();

        let mut ip = Resource::new("stack-ip", Variant::Primitive);
        ip.parent = Some(group_id);
        ip.allow_node("a", Score::Finite(3));
        ip.allow_node("b", Score::ZERO);
        ws.add_resource(ip).unwrap();

        let mut fs = Resource::new("stack-fs", Variant::Primitive);
        fs.parent = Some(group_id);
        fs.allow_node("a", Score::ZERO);
        fs.allow_node("b", Score::ZERO);
        ws.add_resource(fs).unwrap();

        let chosen = assign_resource(&mut ws, group_id, None).unwrap();
        assert_eq!(chosen, Some("a".to_string()));
        assert_eq!(
            ws.resource(group_id).unwrap().assigned_to,
            Some("a".to_string())
        );
    }
}
