//! The resource tree: primitives, groups, clones, and bundles.
//!
//! Resources, colocations, and actions reference each other in cycles,
//! so every cross-reference is an index into an arena owned by the
//! working set rather than a pointer.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, NodeView};
use crate::score::Score;

/// Index of a resource in the working set's resource arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ResourceId(pub usize);

/// Index of a colocation edge in the working set's colocation arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ColocationId(pub usize);

/// What kind of resource this is. The ordering is meaningful:
/// `Clone` and above are collectives whose children run as instances.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Variant {
    Primitive,
    Group,
    Clone,
    Bundle,
}

impl Variant {
    /// Clones and bundles place multiple instances across the cluster.
    pub fn is_collective(self) -> bool {
        self >= Variant::Clone
    }
}

/// Resource role, for role-filtered compatibility matching.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Role {
    #[default]
    Unknown,
    Stopped,
    Started,
    Unpromoted,
    Promoted,
}

/// Per-resource scheduling flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFlags {
    /// Configuration for this resource is gone; it must only be stopped.
    pub orphan: bool,
    /// Placement has not been decided this round.
    pub provisional: bool,
    /// Assignment is in progress; seeing this set again means a
    /// dependency cycle.
    pub assigning: bool,
    /// The cluster is allowed to start, stop, and move this resource.
    pub managed: bool,
    /// A failure was recorded for this resource.
    pub failed: bool,
    /// A failed action blocks further activity on this resource.
    pub blocked: bool,
}

impl Default for ResourceFlags {
    fn default() -> Self {
        Self {
            orphan: false,
            provisional: true,
            assigning: false,
            managed: true,
            failed: false,
            blocked: false,
        }
    }
}

/// An explicit location preference applied to a resource, kept as a
/// record so later engines (and operators) can see why a resource was
/// pinned. `node = None` means the pin applied to every allowed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPin {
    pub node: Option<NodeId>,
    pub score: Score,
    pub reason: String,
}

/// A node in the resource tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Configured resource name, unique within the working set.
    pub id: String,
    pub variant: Variant,
    pub flags: ResourceFlags,
    /// This resource's view of each node it may run on.
    pub allowed_nodes: BTreeMap<NodeId, NodeView>,
    pub parent: Option<ResourceId>,
    pub children: Vec<ResourceId>,
    /// For a bundle replica container: the resource it hosts.
    pub contained: Option<ResourceId>,
    /// Outgoing colocations ("this resource with another").
    pub this_with: Vec<ColocationId>,
    /// Incoming colocations ("another resource with this one").
    pub with_this: Vec<ColocationId>,
    /// Nodes where the resource is currently active.
    pub running_on: BTreeSet<NodeId>,
    pub meta: BTreeMap<String, String>,
    /// Node chosen by placement, once no longer provisional.
    pub assigned_to: Option<NodeId>,
    /// Current role.
    pub role: Role,
    /// Role the scheduler intends after this round.
    pub next_role: Role,
    /// Actions belonging to this resource, in creation order.
    pub actions: Vec<crate::action::ActionId>,
    /// Explicit location pins applied this round.
    pub pins: Vec<LocationPin>,
}

impl Resource {
    pub fn new(id: &str, variant: Variant) -> Self {
        Self {
            id: id.to_string(),
            variant,
            flags: ResourceFlags::default(),
            allowed_nodes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            contained: None,
            this_with: Vec::new(),
            with_this: Vec::new(),
            running_on: BTreeSet::new(),
            meta: BTreeMap::new(),
            assigned_to: None,
            role: Role::Unknown,
            next_role: Role::Unknown,
            actions: Vec::new(),
            pins: Vec::new(),
        }
    }

    /// Allow this resource on `node_id` with the given weight.
    pub fn allow_node(&mut self, node_id: &str, weight: Score) {
        self.allowed_nodes
            .insert(node_id.to_string(), NodeView::new(node_id, weight));
    }

    /// Truthiness of a boolean `meta` attribute ("true", "yes", "on",
    /// "1", "y" — matching the configuration parser).
    pub fn meta_bool(&self, key: &str) -> bool {
        matches!(
            self.meta.get(key).map(String::as_str),
            Some("true") | Some("yes") | Some("on") | Some("1") | Some("y")
        )
    }
}

/// A directed colocation edge: `dependent` wants to run where
/// `primary` runs (or away from it, for negative scores).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Colocation {
    pub id: String,
    pub dependent: ResourceId,
    pub primary: ResourceId,
    pub score: Score,
    /// Whether the dependent's preferences may steer the primary.
    pub influence: bool,
}

impl Colocation {
    /// Whether this edge affects `child`'s placement: the edge must
    /// carry influence and the child must be managed (an unmanaged
    /// child's placement is never steered by dependents).
    pub fn has_influence(&self, child: &Resource) -> bool {
        self.influence && child.flags.managed
    }
}
