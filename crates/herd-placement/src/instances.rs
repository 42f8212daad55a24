//! The phased instance placement engine.
//!
//! Placement runs in three phases: reset the collective's per-node
//! counts, assign as many instances as possible to the node they are
//! already running on, then finish the remainder in order. Instances
//! that cannot be placed are left provisional and pinned to
//! `-INFINITY` so downstream engines treat them as "not to be started".

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use herd_core::{NodeId, ResourceId, Score, WorkingSet};

use crate::error::{PlacementError, PlacementResult};
use crate::native;

/// Outcome of one collective's placement pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementReport {
    /// Instances the caller asked for (`max_total`).
    pub requested: u32,
    /// Instances that received a node.
    pub assigned: u32,
    /// (instance id, node id) pairs, sorted by instance id.
    pub placed: Vec<(String, NodeId)>,
}

/// Assign a collective's instances to nodes.
///
/// `instances` supplies the assignment order; at most `max_total`
/// instances are assigned overall and at most `max_per_node` land on
/// any one node.
pub fn assign_instances(
    ws: &mut WorkingSet,
    collective: ResourceId,
    instances: &[ResourceId],
    max_total: u32,
    max_per_node: u32,
) -> PlacementResult<PlacementReport> {
    if max_per_node == 0 {
        return Err(PlacementError::InvalidPerNodeCap);
    }
    {
        let rsc = ws.resource(collective)?;
        if !rsc.variant.is_collective() {
            return Err(PlacementError::NotCollective(rsc.id.clone()));
        }
    }

    let available_nodes = reset_allowed_node_counts(ws, collective)?;

    // Include finite positive preferences of colocation dependents only
    // when not every available node will get an instance; otherwise
    // honoring them would just shuffle instances among nodes.
    let all_coloc = max_total < available_nodes;

    let optimal_per_node = if available_nodes > 0 {
        (max_total / available_nodes).max(1)
    } else {
        1
    };

    // The available nodes can never hold more than this; the surplus is
    // beyond the collective's limit from the start.
    let effective_max = max_total.min(available_nodes.saturating_mul(max_per_node));

    debug!(
        collective = %ws.resource(collective)?.id,
        max_total,
        max_per_node,
        available_nodes,
        optimal_per_node,
        all_coloc,
        "assigning collective instances"
    );

    let mut assigned: u32 = 0;

    // Assign as many instances as possible to their current location.
    for &instance in instances {
        if assigned >= effective_max {
            break;
        }
        let parent = ws.resource(instance)?.parent.unwrap_or(collective);
        append_parent_colocations(ws, parent, instance, all_coloc)?;

        if let Some(current) = preferred_node(ws, instance, optimal_per_node)? {
            if assign_instance(ws, instance, Some(&current), max_per_node)? {
                trace!(
                    instance = %ws.resource(instance)?.id,
                    node = %current,
                    "assigned instance to its current node"
                );
                assigned += 1;
            }
        }
    }
    debug!(assigned, max_total, "early assignment to current nodes done");

    // Final assignment for whatever is still provisional.
    for &instance in instances {
        if !ws.resource(instance)?.flags.provisional {
            continue;
        }

        if !ws.resource(instance)?.running_on.is_empty() {
            if let Some(current) = ws.location(instance, true)? {
                if ws.top_allowed_node(instance, &current)?.is_none() {
                    let rsc = ws.resource(instance)?;
                    info!(
                        instance = %rsc.id,
                        node = %current,
                        managed = rsc.flags.managed,
                        "instance is running on a node that is no longer allowed"
                    );
                }
            }
        }

        if assigned >= effective_max {
            debug!(
                instance = %ws.resource(instance)?.id,
                max_total,
                "not assigning instance: collective maximum reached"
            );
            ws.resource_location(
                instance,
                None,
                Score::MinusInf,
                "collective limit reached",
            )?;
        } else if assign_instance(ws, instance, None, max_per_node)? {
            assigned += 1;
        }
    }

    let mut placed = Vec::new();
    for &instance in instances {
        let rsc = ws.resource(instance)?;
        if let Some(node) = &rsc.assigned_to {
            placed.push((rsc.id.clone(), node.clone()));
        }
    }
    placed.sort();

    debug!(
        collective = %ws.resource(collective)?.id,
        assigned,
        max_total,
        "collective placement complete"
    );
    Ok(PlacementReport {
        requested: max_total,
        assigned,
        placed,
    })
}

/// Reset per-node instance counts on the collective and count how many
/// of its allowed nodes can currently run resources.
fn reset_allowed_node_counts(
    ws: &mut WorkingSet,
    collective: ResourceId,
) -> PlacementResult<u32> {
    let availability: Vec<(NodeId, bool)> = ws
        .resource(collective)?
        .allowed_nodes
        .keys()
        .map(|node_id| {
            let available = ws
                .node(node_id)
                .is_some_and(|node| node.available(false, false));
            (node_id.clone(), available)
        })
        .collect();

    let mut available_nodes = 0;
    let rsc = ws.resource_mut(collective)?;
    for (node_id, available) in availability {
        if let Some(view) = rsc.allowed_nodes.get_mut(&node_id) {
            view.count = 0;
        }
        if available {
            available_nodes += 1;
        }
    }
    Ok(available_nodes)
}

/// Copy the parent's colocation edges onto an instance. Negative and
/// mandatory edges always transfer; finite positive ones only when
/// `all` is set. Incoming edges must additionally have influence on
/// the instance.
fn append_parent_colocations(
    ws: &mut WorkingSet,
    parent: ResourceId,
    child: ResourceId,
    all: bool,
) -> PlacementResult<()> {
    let this_with = ws.resource(parent)?.this_with.clone();
    for edge_id in this_with {
        let score = ws.colocation(edge_id)?.score;
        if all || score.is_negative() || score == Score::PlusInf {
            let child_rsc = ws.resource_mut(child)?;
            if !child_rsc.this_with.contains(&edge_id) {
                child_rsc.this_with.push(edge_id);
            }
        }
    }

    let with_this = ws.resource(parent)?.with_this.clone();
    for edge_id in with_this {
        let (score, influential) = {
            let edge = ws.colocation(edge_id)?;
            let score = edge.score;
            let influential = edge.has_influence(ws.resource(child)?);
            (score, influential)
        };
        if !influential {
            continue;
        }
        if all || score.is_negative() {
            let child_rsc = ws.resource_mut(child)?;
            if !child_rsc.with_this.contains(&edge_id) {
                child_rsc.with_this.push(edge_id);
            }
        }
    }
    Ok(())
}

/// The node an instance should be assigned to early, if any: its
/// current node, provided the instance is active, healthy, still
/// pending, and the node is available with spare optimal capacity.
fn preferred_node(
    ws: &WorkingSet,
    instance: ResourceId,
    optimal_per_node: u32,
) -> PlacementResult<Option<NodeId>> {
    {
        let rsc = ws.resource(instance)?;
        if rsc.running_on.is_empty() || !rsc.flags.provisional || rsc.flags.failed {
            return Ok(None);
        }
    }

    let Some(node_id) = ws.location(instance, true)? else {
        return Ok(None);
    };
    if !ws
        .node(&node_id)
        .is_some_and(|node| node.available(true, false))
    {
        trace!(
            instance = %ws.resource(instance)?.id,
            node = %node_id,
            "not assigning instance early: current node unavailable"
        );
        return Ok(None);
    }

    if let Some(top) = ws.top_allowed_node(instance, &node_id)? {
        if top.count >= optimal_per_node {
            trace!(
                instance = %ws.resource(instance)?.id,
                node = %node_id,
                "not assigning instance early: optimal instances already assigned"
            );
            return Ok(None);
        }
    }
    Ok(Some(node_id))
}

/// Whether a node may run one more instance.
fn can_run_instance(
    ws: &WorkingSet,
    instance: ResourceId,
    node_id: &NodeId,
    max_per_node: u32,
) -> PlacementResult<bool> {
    let rsc = ws.resource(instance)?;
    if rsc.flags.orphan {
        trace!(instance = %rsc.id, node = %node_id, "cannot run: orphaned");
        return Ok(false);
    }
    if !ws
        .node(node_id)
        .is_some_and(|node| node.available(false, false))
    {
        trace!(instance = %rsc.id, node = %node_id, "cannot run: node cannot run resources");
        return Ok(false);
    }
    match ws.top_allowed_node(instance, node_id)? {
        None => {
            warn!(instance = %rsc.id, node = %node_id, "cannot run: node not allowed");
            Ok(false)
        }
        Some(top) => {
            if top.weight.is_negative() {
                trace!(
                    instance = %rsc.id,
                    node = %node_id,
                    weight = %top.weight,
                    "cannot run: parent score is negative there"
                );
                Ok(false)
            } else if top.count >= max_per_node {
                trace!(
                    instance = %rsc.id,
                    node = %node_id,
                    max_per_node,
                    "cannot run: node already has the maximum instances"
                );
                Ok(false)
            } else {
                Ok(true)
            }
        }
    }
}

/// Ban an instance (and its whole subtree) from every allowed node it
/// cannot run on.
fn ban_unavailable_nodes(
    ws: &mut WorkingSet,
    instance: ResourceId,
    max_per_node: u32,
) -> PlacementResult<()> {
    let node_ids: Vec<NodeId> = ws.resource(instance)?.allowed_nodes.keys().cloned().collect();
    for node_id in node_ids {
        if !can_run_instance(ws, instance, &node_id, max_per_node)? {
            ws.update_score(instance, &node_id, Score::MinusInf)?;
        }
    }
    Ok(())
}

/// Choose a node for one instance.
///
/// With `prefer` set this is a tentative early assignment: if the
/// native choice lands elsewhere, the attempt is rolled back from a
/// pre-ban snapshot and the instance stays provisional.
fn assign_instance(
    ws: &mut WorkingSet,
    instance: ResourceId,
    prefer: Option<&NodeId>,
    max_per_node: u32,
) -> PlacementResult<bool> {
    {
        let rsc = ws.resource(instance)?;
        trace!(
            instance = %rsc.id,
            prefer = prefer.map(String::as_str).unwrap_or("no node"),
            "assigning instance"
        );
        if !rsc.flags.provisional {
            // Already decided this round.
            return Ok(rsc.assigned_to.is_some());
        }
        if rsc.flags.assigning {
            debug!(
                instance = %rsc.id,
                "assignment loop detected involving colocations"
            );
            return Ok(false);
        }
    }

    if let Some(preferred) = prefer {
        let viable = ws
            .resource(instance)?
            .allowed_nodes
            .get(preferred)
            .is_some_and(|view| !view.weight.is_negative());
        if !viable {
            trace!(
                instance = %ws.resource(instance)?.id,
                node = %preferred,
                "not assigning to preferred node: unavailable"
            );
            return Ok(false);
        }
    }

    let backup = if prefer.is_some() {
        Some(ws.resource(instance)?.allowed_nodes.clone())
    } else {
        None
    };

    ban_unavailable_nodes(ws, instance, max_per_node)?;

    let chosen = native::assign_resource(ws, instance, prefer)?;

    if let (Some(preferred), Some(node)) = (prefer, chosen.as_ref()) {
        if node != preferred {
            info!(
                instance = %ws.resource(instance)?.id,
                preferred = %preferred,
                chosen = %node,
                "not assigning to preferred node: a better node was chosen"
            );
            if let Some(backup) = backup {
                ws.resource_mut(instance)?.allowed_nodes = backup;
            }
            ws.unassign(instance)?;
            return Ok(false);
        }
    }

    match chosen {
        Some(node) => {
            // The top-level parent tracks how many instances each node
            // received.
            let managed = ws.resource(instance)?.flags.managed;
            match ws.top_allowed_node_mut(instance, &node)? {
                Some(top) => top.count += 1,
                None => {
                    // The instance is allowed on the node but its
                    // parent is not; per-node caps cannot be enforced.
                    // Impossible for a managed resource.
                    if managed {
                        error!(
                            instance = %ws.resource(instance)?.id,
                            node = %node,
                            "no parent view of chosen node for managed instance"
                        );
                    }
                }
            }
            Ok(true)
        }
        None => Ok(false),
    }
}
