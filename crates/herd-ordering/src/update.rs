//! The ordering updater.
//!
//! Walks caller-supplied orderings and propagates their flags through
//! the action graph. An ordering between two interleaved collectives is
//! expanded into per-child orderings paired by node; anything else gets
//! primitive-level propagation plus recursion into the then-side
//! children.

use tracing::{debug, error, info, trace};

use herd_core::{
    ActionFlags, ActionId, NodeId, OrderFlags, ResourceId, Score, Task, Updated, WorkingSet,
};

use crate::compat::find_compatible_child;
use crate::error::OrderingResult;

/// The filter used when a caller wants both optionality and
/// runnability propagated.
pub fn default_update_filter() -> ActionFlags {
    ActionFlags {
        optional: true,
        runnable: true,
        pseudo: false,
        migrate_runnable: false,
    }
}

/// Apply every ordering in the working set's input list: materialize
/// the top-level edge, then propagate flags (interleaving where
/// eligible).
pub fn apply_orderings(ws: &mut WorkingSet, filter: ActionFlags) -> OrderingResult<Updated> {
    let orderings = ws.orderings.clone();
    let mut changed = Updated::default();
    for ordering in orderings {
        ws.order_actions(ordering.first, ordering.then, ordering.flags)?;
        let first_flags = action_flags(ws, ordering.first, ordering.node.as_ref())?;
        let updated = update_collective_ordering(
            ws,
            ordering.first,
            ordering.then,
            ordering.node.as_ref(),
            first_flags,
            filter,
            ordering.flags,
        )?;
        changed = changed.union(updated);
    }
    Ok(changed)
}

/// Update two actions according to an ordering between them.
///
/// Dispatches to interleaved pairing when both sides are distinct
/// interleaved collectives; otherwise applies primitive propagation and
/// recurses into the then-side children.
pub fn update_collective_ordering(
    ws: &mut WorkingSet,
    first: ActionId,
    then: ActionId,
    node: Option<&NodeId>,
    first_flags: ActionFlags,
    filter: ActionFlags,
    flags: OrderFlags,
) -> OrderingResult<Updated> {
    trace!(
        first = %ws.action(first)?.uuid,
        then = %ws.action(then)?.uuid,
        "updating ordering"
    );

    if can_interleave(ws, first, then)? {
        return interleave_actions(ws, first, then, node, filter, flags);
    }

    let Some(then_rsc) = ws.action(then)?.resource else {
        return Ok(Updated::default());
    };

    // The primitive ordering case, then recursion into children (or
    // containers, for a bundle).
    let mut changed = update_ordered_actions(ws, first, then, node, first_flags, filter, flags)?;

    let then_task = ws.action(then)?.task;
    for child in ws.instances_of(then_rsc)? {
        let Some(child_action) = ws.find_first_action(child, then_task, node)? else {
            continue;
        };
        let child_flags = action_flags(ws, child_action, node)?;
        if !child_flags.runnable {
            continue;
        }
        let child_changed =
            update_for_resource(ws, child, first, child_action, node, first_flags, filter, flags)?;
        changed = changed.union(child_changed);

        if child_changed.then {
            // The child's successors may now see different flags;
            // re-run propagation along its outgoing edges.
            let edges = ws.action(child_action)?.after.clone();
            for edge in edges {
                let from_flags = action_flags(ws, child_action, node)?;
                update_ordered_actions(
                    ws,
                    child_action,
                    edge.then,
                    node,
                    from_flags,
                    filter,
                    edge.flags,
                )?;
            }
        }
    }
    Ok(changed)
}

/// Recurse according to the resource's variant: collectives get the
/// full collective treatment, primitives and groups the flat one.
fn update_for_resource(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    first: ActionId,
    then: ActionId,
    node: Option<&NodeId>,
    first_flags: ActionFlags,
    filter: ActionFlags,
    flags: OrderFlags,
) -> OrderingResult<Updated> {
    if ws.resource(rsc)?.variant.is_collective() {
        update_collective_ordering(ws, first, then, node, first_flags, filter, flags)
    } else {
        update_ordered_actions(ws, first, then, node, first_flags, filter, flags)
    }
}

/// Whether an ordering between these two actions should be expanded by
/// interleaving: both sides are distinct collectives and the governing
/// resource opted in via its `interleave` meta attribute. The governing
/// resource is the first's when the then-side is winding down.
fn can_interleave(ws: &WorkingSet, first: ActionId, then: ActionId) -> OrderingResult<bool> {
    let first_action = ws.action(first)?;
    let then_action = ws.action(then)?;
    let (Some(first_rsc), Some(then_rsc)) = (first_action.resource, then_action.resource) else {
        trace!("not interleaving: both sides must be resource actions");
        return Ok(false);
    };
    if first_rsc == then_rsc {
        trace!("not interleaving: sides must belong to different resources");
        return Ok(false);
    }
    if !ws.resource(first_rsc)?.variant.is_collective()
        || !ws.resource(then_rsc)?.variant.is_collective()
    {
        trace!("not interleaving: both sides must be clones or bundles");
        return Ok(false);
    }

    let governing =
        if then_action.uuid.ends_with("_stop_0") || then_action.uuid.ends_with("_demote_0") {
            first_rsc
        } else {
            then_rsc
        };
    let interleave = ws.resource(governing)?.meta_bool("interleave");
    trace!(
        first = %first_action.uuid,
        then = %then_action.uuid,
        governing = %ws.resource(governing)?.id,
        interleave,
        "interleave eligibility"
    );
    Ok(interleave)
}

/// Pair the then-side children with compatible first-side children by
/// node, ordering each pair and recursing. A then-side child with no
/// compatible peer is inhibited (pinned to `-INFINITY`) when the
/// ordering is mandatory.
fn interleave_actions(
    ws: &mut WorkingSet,
    first: ActionId,
    then: ActionId,
    node: Option<&NodeId>,
    filter: ActionFlags,
    flags: OrderFlags,
) -> OrderingResult<Updated> {
    let (first_rsc, current, first_task) = {
        let action = ws.action(first)?;
        let Some(rsc) = action.resource else {
            return Ok(Updated::default());
        };
        let current =
            action.uuid.ends_with("_stopped_0") || action.uuid.ends_with("_demoted_0");
        (rsc, current, action.task.instance_task())
    };
    let (then_rsc, then_task) = {
        let action = ws.action(then)?;
        let Some(rsc) = action.resource else {
            return Ok(Updated::default());
        };
        (rsc, action.task)
    };

    let mut changed = Updated::default();

    for then_child in ws.instances_of(then_rsc)? {
        let first_child =
            find_compatible_child(ws, then_child, first_rsc, herd_core::Role::Unknown, current)?;

        let Some(first_child) = first_child else {
            if current {
                // The first side already finished there; nothing to pair.
                trace!(
                    child = %ws.resource(then_child)?.id,
                    "ignoring unmatched child of a completed action"
                );
                continue;
            }
            debug!(
                child = %ws.resource(then_child)?.id,
                first = %ws.action(first)?.uuid,
                then = %ws.action(then)?.uuid,
                "no compatible instance found"
            );
            if flags.is_mandatory() {
                // Nothing is or will be active on the child's node, so
                // the child must not be allowed to start.
                info!(
                    child = %ws.resource(then_child)?.id,
                    "inhibiting instance from being active"
                );
                if inhibit_instance(ws, then_child)? {
                    changed.then = true;
                }
            }
            continue;
        };

        // For a containerized resource, stops belong to the contained
        // resource (its actions happen later and better match intent),
        // and role changes only ever apply to the contained resource.
        let first_src = match ws.resource(first_child)?.contained {
            Some(contained)
                if matches!(ws.action(first)?.task, Task::Stop | Task::Stopped) =>
            {
                contained
            }
            _ => first_child,
        };
        let first_action = ws.find_first_action(first_src, first_task, node)?;

        let then_src = match ws.resource(then_child)?.contained {
            Some(contained)
                if matches!(
                    then_task,
                    Task::Promote | Task::Promoted | Task::Demote | Task::Demoted
                ) =>
            {
                contained
            }
            _ => then_child,
        };
        let then_child_action =
            ws.find_first_action(then_src, then_task.instance_task(), node)?;

        let Some(first_action) = first_action else {
            report_missing_action(ws, first_child, first_task, "first")?;
            continue;
        };
        let Some(then_child_action) = then_child_action else {
            report_missing_action(ws, then_child, then_task.instance_task(), "then")?;
            continue;
        };

        if ws.order_actions(first_action, then_child_action, flags)? {
            debug!(
                first = %ws.action(first_action)?.uuid,
                then = %ws.action(then_child_action)?.uuid,
                "created constraint between paired instances"
            );
            changed.first = true;
            changed.then = true;
        }

        let first_action_flags = action_flags(ws, first_action, node)?;
        let child_changed = update_for_resource(
            ws,
            then_child,
            first_action,
            then_child_action,
            node,
            first_action_flags,
            filter,
            flags,
        )?;
        changed = changed.union(child_changed);
    }

    Ok(changed)
}

/// A missing child action is an internal error unless the child is an
/// orphan or the task is a wind-down (those actions legitimately may
/// not exist).
fn report_missing_action(
    ws: &WorkingSet,
    child: ResourceId,
    task: Task,
    side: &str,
) -> OrderingResult<()> {
    let rsc = ws.resource(child)?;
    if !rsc.flags.orphan && !matches!(task, Task::Stop | Task::Demote) {
        error!(
            child = %rsc.id,
            task = task.as_str(),
            side,
            "internal error: no action found for instance"
        );
    } else {
        trace!(
            child = %rsc.id,
            task = task.as_str(),
            orphan = rsc.flags.orphan,
            side,
            "no action found for instance"
        );
    }
    Ok(())
}

/// Force an instance to stay inactive: ban it everywhere and finalize
/// it with no node. Returns whether anything changed.
fn inhibit_instance(ws: &mut WorkingSet, rsc: ResourceId) -> OrderingResult<bool> {
    let already_inhibited = {
        let resource = ws.resource(rsc)?;
        resource.assigned_to.is_none()
            && !resource.flags.provisional
            && resource
                .allowed_nodes
                .values()
                .all(|view| view.weight == Score::MinusInf)
    };
    if already_inhibited {
        return Ok(false);
    }

    ws.resource_location(rsc, None, Score::MinusInf, "no compatible interleave peer")?;
    let resource = ws.resource_mut(rsc)?;
    resource.flags.provisional = false;
    resource.assigned_to = None;
    Ok(true)
}

/// The effective flags of an action: a collective's action reports the
/// summary over its children, anything else its own flags.
pub fn action_flags(
    ws: &mut WorkingSet,
    action: ActionId,
    node: Option<&NodeId>,
) -> OrderingResult<ActionFlags> {
    if let Some(rsc) = ws.action(action)?.resource {
        if ws.resource(rsc)?.variant.is_collective() {
            let children = ws.instances_of(rsc)?;
            return summary_action_flags(ws, action, &children, node);
        }
    }
    Ok(ws.action(action)?.flags)
}

/// Fold child actions of the same task into the flags of a collective
/// action: mandatory as soon as one child is mandatory, unrunnable when
/// no child is runnable. The underlying action is updated in step
/// (runnability only when no node was specified).
pub fn summary_action_flags(
    ws: &mut WorkingSet,
    action: ActionId,
    children: &[ResourceId],
    node: Option<&NodeId>,
) -> OrderingResult<ActionFlags> {
    let task = ws.action(action)?.task.instance_task();
    let mut flags = ActionFlags {
        optional: true,
        runnable: true,
        pseudo: true,
        migrate_runnable: false,
    };
    let mut any_runnable = false;

    for &child in children {
        let search_node = if ws.resource(child)?.children.is_empty() {
            node
        } else {
            None
        };
        let Some(child_action) = ws.find_first_action(child, task, search_node)? else {
            continue;
        };
        let child_flags = action_flags(ws, child_action, node)?;

        if flags.optional && !child_flags.optional {
            trace!(
                action = %ws.action(action)?.uuid,
                child_action = %ws.action(child_action)?.uuid,
                "collective action is mandatory because of child"
            );
            flags.optional = false;
            ws.action_mut(action)?.flags.optional = false;
        }
        if child_flags.runnable {
            any_runnable = true;
        }
    }

    if !any_runnable {
        trace!(
            action = %ws.action(action)?.uuid,
            "collective action is not runnable because no children are"
        );
        flags.runnable = false;
        if node.is_none() {
            ws.action_mut(action)?.flags.runnable = false;
        }
    }
    Ok(flags)
}

/// Primitive-level propagation of an ordering's flags.
///
/// With `implies_then` a mandatory first makes then mandatory; with
/// `runnable_left` an unrunnable first makes then unrunnable. The
/// filter limits which of the two propagations may fire.
pub fn update_ordered_actions(
    ws: &mut WorkingSet,
    _first: ActionId,
    then: ActionId,
    _node: Option<&NodeId>,
    first_flags: ActionFlags,
    filter: ActionFlags,
    flags: OrderFlags,
) -> OrderingResult<Updated> {
    let mut changed = Updated::default();
    let then_uuid = ws.action(then)?.uuid.clone();

    if flags.implies_then && filter.optional && !first_flags.optional {
        let then_action = ws.action_mut(then)?;
        if then_action.flags.optional {
            then_action.flags.optional = false;
            changed.then = true;
            trace!(then = %then_uuid, "then action is now mandatory");
        }
    }

    if flags.runnable_left && filter.runnable && !first_flags.runnable {
        let then_action = ws.action_mut(then)?;
        if then_action.flags.runnable {
            then_action.flags.runnable = false;
            changed.then = true;
            trace!(then = %then_uuid, "then action is no longer runnable");
        }
    }

    Ok(changed)
}
