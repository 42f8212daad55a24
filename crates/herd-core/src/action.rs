//! Actions and the ordering graph.
//!
//! An action is one step the cluster may take on a resource (start it
//! somewhere, stop it, promote it). Pseudo-actions exist only as graph
//! nodes — a collective's `start`/`started` pair never runs anywhere.
//! Ordering edges hang off the *first* action's `after` list.

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::resource::ResourceId;
use crate::score::Score;

/// Index of an action in the working set's action arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ActionId(pub usize);

/// What an action does.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Task {
    Monitor,
    Start,
    Started,
    Stop,
    Stopped,
    Promote,
    Promoted,
    Demote,
    Demoted,
    Notify,
    Notified,
    Shutdown,
    Fence,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Task::Monitor => "monitor",
            Task::Start => "start",
            Task::Started => "running",
            Task::Stop => "stop",
            Task::Stopped => "stopped",
            Task::Promote => "promote",
            Task::Promoted => "promoted",
            Task::Demote => "demote",
            Task::Demoted => "demoted",
            Task::Notify => "notify",
            Task::Notified => "notified",
            Task::Shutdown => "do_shutdown",
            Task::Fence => "stonith",
        }
    }

    /// The child-level task corresponding to a collective task: the
    /// completion pseudo-tasks collapse onto the action they complete.
    pub fn instance_task(self) -> Task {
        match self {
            Task::Started => Task::Start,
            Task::Stopped => Task::Stop,
            Task::Promoted => Task::Promote,
            Task::Demoted => Task::Demote,
            other => other,
        }
    }
}

/// Per-action flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFlags {
    /// Nothing needs to change; the action exists for graph purposes.
    pub optional: bool,
    /// The action can actually be executed this round.
    pub runnable: bool,
    /// Graph-only action that never runs on a node.
    pub pseudo: bool,
    /// A pure stop with no restart behind it; migration may shortcut it.
    pub migrate_runnable: bool,
}

impl ActionFlags {
    pub fn runnable() -> Self {
        Self {
            runnable: true,
            ..Self::default()
        }
    }
}

/// Flags on an ordering relation between two actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFlags {
    /// The ordering itself is advisory.
    pub optional: bool,
    /// If `first` cannot run, `then` cannot run.
    pub runnable_left: bool,
    /// If `first` is required, `then` is required.
    pub implies_then: bool,
}

impl OrderFlags {
    pub fn union(self, other: OrderFlags) -> OrderFlags {
        OrderFlags {
            optional: self.optional || other.optional,
            runnable_left: self.runnable_left || other.runnable_left,
            implies_then: self.implies_then || other.implies_then,
        }
    }

    /// The ordering must be honored (either mandatory form).
    pub fn is_mandatory(self) -> bool {
        self.runnable_left || self.implies_then
    }
}

/// An edge in the ordering graph, stored on the first action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingEdge {
    pub then: ActionId,
    pub flags: OrderFlags,
}

/// A caller-supplied ordering to be applied by the ordering engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderingSpec {
    pub first: ActionId,
    pub then: ActionId,
    pub node: Option<NodeId>,
    pub flags: OrderFlags,
}

/// One step the cluster may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub resource: Option<ResourceId>,
    pub task: Task,
    /// Node the action runs on; `None` for collective pseudo-actions.
    pub node: Option<NodeId>,
    pub flags: ActionFlags,
    /// Stable key, `"{resource}_{task}_0"` for resource actions. Suffix
    /// matching on the key drives interleave dispatch.
    pub uuid: String,
    pub priority: Score,
    /// Ordering edges to actions that must come after this one.
    pub after: Vec<OrderingEdge>,
}

/// Which sides of an ordering were changed by an update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Updated {
    pub first: bool,
    pub then: bool,
}

impl Updated {
    pub fn union(self, other: Updated) -> Updated {
        Updated {
            first: self.first || other.first,
            then: self.then || other.then,
        }
    }

    pub fn any(self) -> bool {
        self.first || self.then
    }
}
