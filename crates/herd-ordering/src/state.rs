//! Collective state summarizer.
//!
//! Folds a collective's subtree into four bits: is any instance
//! starting, stopping, restarting, or active. The pseudo-action builder
//! uses the summary to decide which collective actions are optional and
//! runnable.

use tracing::trace;

use herd_core::{ResourceId, Task, Variant, WorkingSet};

use crate::error::OrderingResult;

/// Aggregated state over a collective's instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceStateSummary {
    /// Some instance has a mandatory, runnable start.
    pub starting: bool,
    /// Some instance has a mandatory stop (runnable, or implied by
    /// fencing).
    pub stopping: bool,
    /// Some single instance is both starting and stopping. Not the same
    /// as `starting && stopping`, which may come from different
    /// instances.
    pub restarting: bool,
    /// Some instance is currently active.
    pub active: bool,
}

impl InstanceStateSummary {
    pub fn all(&self) -> bool {
        self.starting && self.stopping && self.restarting && self.active
    }

    fn merge(&mut self, other: InstanceStateSummary) {
        self.starting |= other.starting;
        self.stopping |= other.stopping;
        self.restarting |= other.restarting;
        self.active |= other.active;
    }
}

/// Fold one instance's subtree into the summary.
///
/// Collectives (including cloned groups) recurse into their children;
/// primitives contribute based on their current activity and their
/// start/stop actions. Short-circuits once every bit is set.
pub fn check_instance_state(
    ws: &WorkingSet,
    instance: ResourceId,
    state: &mut InstanceStateSummary,
) -> OrderingResult<()> {
    if state.all() {
        return Ok(());
    }

    let rsc = ws.resource(instance)?;
    if rsc.variant > Variant::Primitive {
        for child in rsc.children.clone() {
            if state.all() {
                break;
            }
            check_instance_state(ws, child, state)?;
        }
        return Ok(());
    }

    let mut local = InstanceStateSummary::default();
    if !rsc.running_on.is_empty() {
        local.active = true;
    }

    for &action_id in &rsc.actions {
        if local.starting && local.stopping {
            break;
        }
        let action = ws.action(action_id)?;
        match action.task {
            Task::Start => {
                if !action.flags.optional && action.flags.runnable {
                    trace!(instance = %rsc.id, action = %action.uuid, "instance is starting");
                    local.starting = true;
                }
            }
            Task::Stop => {
                // A pseudo stop means the node is being fenced; the
                // stop is implied rather than executed.
                if !action.flags.optional && (action.flags.runnable || action.flags.pseudo) {
                    trace!(instance = %rsc.id, action = %action.uuid, "instance is stopping");
                    local.stopping = true;
                }
            }
            _ => {}
        }
    }

    if local.starting && local.stopping {
        local.restarting = true;
    }
    state.merge(local);
    Ok(())
}
