//! Collective pseudo-actions and per-instance action creation.
//!
//! A collective's `start`/`started` and `stop`/`stopped` actions are
//! pseudo-actions: they exist only to anchor orderings and report
//! state, and never execute on a node. Their flags are derived from the
//! aggregated instance state.

use tracing::trace;

use herd_core::{
    ActionFlags, ActionId, NodeId, OrderFlags, ResourceId, Score, Task, Variant, WorkingSet,
};

use crate::error::OrderingResult;
use crate::state::{InstanceStateSummary, check_instance_state};

/// The four pseudo-actions created for a collective.
#[derive(Debug, Clone, Copy)]
pub struct CollectiveActions {
    pub start: ActionId,
    pub started: ActionId,
    pub stop: ActionId,
    pub stopped: ActionId,
}

/// Anchors returned by the external notification builder.
#[derive(Debug, Clone, Copy)]
pub struct NotifyHandles {
    /// The pre-notification pseudo-action.
    pub pre: ActionId,
    /// The post-notification-complete pseudo-action.
    pub post_done: ActionId,
}

/// External collaborator that creates paired pre/post notification
/// pseudo-actions around a collective action.
pub trait NotificationBuilder {
    fn build(
        &mut self,
        ws: &mut WorkingSet,
        collective: ResourceId,
        task: Task,
        begin: ActionId,
        end: ActionId,
    ) -> OrderingResult<NotifyHandles>;
}

/// Create a pseudo-action for a resource.
pub fn new_pseudo_action(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    task: Task,
    optional: bool,
    runnable: bool,
) -> OrderingResult<ActionId> {
    let flags = ActionFlags {
        optional,
        runnable,
        pseudo: true,
        migrate_runnable: false,
    };
    Ok(ws.add_action(rsc, task, None, flags)?)
}

/// Create actions for a collective's instances, then build the
/// collective's own pseudo-actions from the aggregated state.
///
/// When a notification builder is supplied, pre/post notify
/// pseudo-actions are created for both transitions, and the stop-side
/// post-completion is ordered (optionally) before the start-side pre.
pub fn create_instance_actions(
    ws: &mut WorkingSet,
    collective: ResourceId,
    instances: &[ResourceId],
    notify: Option<&mut dyn NotificationBuilder>,
) -> OrderingResult<CollectiveActions> {
    trace!(
        collective = %ws.resource(collective)?.id,
        "creating collective instance actions"
    );

    let mut state = InstanceStateSummary::default();
    for &instance in instances {
        create_actions(ws, instance)?;
        check_instance_state(ws, instance, &mut state)?;
    }

    let start = new_pseudo_action(ws, collective, Task::Start, !state.starting, true)?;
    let started = new_pseudo_action(ws, collective, Task::Started, !state.starting, false)?;
    ws.action_mut(started)?.priority = Score::PlusInf;
    if state.active || state.starting {
        ws.action_mut(started)?.flags.runnable = true;
    }

    let stop = new_pseudo_action(ws, collective, Task::Stop, !state.stopping, true)?;
    let stopped = new_pseudo_action(ws, collective, Task::Stopped, !state.stopping, true)?;
    ws.action_mut(stopped)?.priority = Score::PlusInf;
    if !state.restarting {
        // A pure stop with no restart behind it can be shortcut by a
        // live migration.
        ws.action_mut(stop)?.flags.migrate_runnable = true;
    }

    if let Some(builder) = notify {
        let start_notify = builder.build(ws, collective, Task::Start, start, started)?;
        let stop_notify = builder.build(ws, collective, Task::Stop, stop, stopped)?;
        ws.order_actions(
            stop_notify.post_done,
            start_notify.pre,
            OrderFlags {
                optional: true,
                ..OrderFlags::default()
            },
        )?;
    }

    Ok(CollectiveActions {
        start,
        started,
        stop,
        stopped,
    })
}

/// Create an instance's own actions from its placement outcome.
///
/// An instance that already carries actions is taken as precomputed and
/// left alone. Otherwise a primitive gets a stop per current node
/// (optional when it is staying put, pseudo when the node is being
/// fenced) and a start on its target (optional when already active
/// there); groups recurse into their members.
pub fn create_actions(ws: &mut WorkingSet, instance: ResourceId) -> OrderingResult<()> {
    {
        let rsc = ws.resource(instance)?;
        if !rsc.actions.is_empty() {
            return Ok(());
        }
    }

    if ws.resource(instance)?.variant != Variant::Primitive {
        for child in ws.resource(instance)?.children.clone() {
            create_actions(ws, child)?;
        }
        return Ok(());
    }

    let (running, target): (Vec<NodeId>, Option<NodeId>) = {
        let rsc = ws.resource(instance)?;
        (
            rsc.running_on.iter().cloned().collect(),
            rsc.assigned_to.clone(),
        )
    };

    for node in &running {
        let staying = target.as_ref() == Some(node);
        let fenced = ws.node(node).is_some_and(|n| n.unclean);
        let flags = ActionFlags {
            optional: staying,
            runnable: true,
            pseudo: fenced,
            migrate_runnable: false,
        };
        ws.add_action(instance, Task::Stop, Some(node), flags)?;
    }

    if let Some(target) = target {
        let active_there = running.contains(&target);
        let node_ok = ws
            .node(&target)
            .is_some_and(|n| n.available(false, false));
        let flags = ActionFlags {
            optional: active_there,
            runnable: node_ok,
            pseudo: false,
            migrate_runnable: false,
        };
        ws.add_action(instance, Task::Start, Some(&target), flags)?;
    }
    Ok(())
}
