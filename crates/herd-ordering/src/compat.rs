//! Compatible-child search for interleaved collectives.
//!
//! Two interleaved collectives pair their children by node: a child of
//! one is compatible with a child of the other when both are (or will
//! be) on the same node, the role filter matches, and neither is
//! blocked by a failure.

use tracing::{debug, trace};

use herd_core::{NodeId, ResourceId, Role, WorkingSet};

use crate::error::OrderingResult;

/// Whether `child` sits on `local_node` (currently, or after placement)
/// and passes the role filter. Blocked subtrees never match.
pub fn is_child_compatible(
    ws: &WorkingSet,
    child: ResourceId,
    local_node: &NodeId,
    filter: Role,
    current: bool,
) -> OrderingResult<bool> {
    let node = if ws.any_blocked(child)? {
        None
    } else {
        ws.location(child, current)?
    };

    let role = {
        let rsc = ws.resource(child)?;
        if current {
            rsc.role
        } else {
            rsc.next_role
        }
    };
    if filter != Role::Unknown && role != filter {
        trace!(child = %ws.resource(child)?.id, "filtered by role");
        return Ok(false);
    }

    Ok(node.as_ref() == Some(local_node))
}

fn find_compatible_child_by_node(
    ws: &WorkingSet,
    local_child: ResourceId,
    local_node: &NodeId,
    peer: ResourceId,
    filter: Role,
    current: bool,
) -> OrderingResult<Option<ResourceId>> {
    trace!(
        child = %ws.resource(local_child)?.id,
        peer = %ws.resource(peer)?.id,
        node = %local_node,
        "looking for a compatible instance"
    );
    for candidate in ws.instances_of(peer)? {
        if is_child_compatible(ws, candidate, local_node, filter, current)? {
            trace!(
                child = %ws.resource(local_child)?.id,
                pair = %ws.resource(candidate)?.id,
                node = %local_node,
                "paired instances"
            );
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Find the peer collective's child that `local_child` pairs with.
///
/// Prefers the child's own location; a child with no location yet is
/// tried against each of its allowed nodes, best score first.
pub fn find_compatible_child(
    ws: &WorkingSet,
    local_child: ResourceId,
    peer: ResourceId,
    filter: Role,
    current: bool,
) -> OrderingResult<Option<ResourceId>> {
    if let Some(node) = ws.location(local_child, current)? {
        return find_compatible_child_by_node(ws, local_child, &node, peer, filter, current);
    }

    for node in ws.sorted_allowed_nodes(local_child)? {
        if let Some(pair) =
            find_compatible_child_by_node(ws, local_child, &node, peer, filter, current)?
        {
            return Ok(Some(pair));
        }
    }

    debug!(
        child = %ws.resource(local_child)?.id,
        peer = %ws.resource(peer)?.id,
        "no compatible instance found"
    );
    Ok(None)
}
