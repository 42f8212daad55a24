//! Cluster nodes and per-resource node views.
//!
//! The cluster-wide [`Node`] carries membership and health state. Each
//! resource additionally holds its own [`NodeView`] per allowed node,
//! with a private weight and an instance count; placement reads and
//! mutates the views, never the cluster node itself.

use serde::{Deserialize, Serialize};

use crate::score::Score;

/// Unique identifier for a cluster node. Opaque; ordered
/// lexicographically wherever a tie-break is needed.
pub type NodeId = String;

/// Cluster-wide state of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Member of the cluster and reachable.
    pub online: bool,
    /// Operator-requested standby: resources must move away.
    pub standby: bool,
    /// Maintenance mode: resources are left alone but nothing new starts.
    pub maintenance: bool,
    /// Needs fencing; its state cannot be trusted.
    pub unclean: bool,
    /// Shutdown in progress.
    pub shutdown: bool,
}

impl Node {
    /// A healthy online node with the given id.
    pub fn online(id: &str) -> Self {
        Self {
            id: id.to_string(),
            online: true,
            standby: false,
            maintenance: false,
            unclean: false,
            shutdown: false,
        }
    }

    /// Whether this node can run resources.
    ///
    /// `strict` additionally rejects nodes in maintenance mode;
    /// `allow_standby` admits standby nodes (used when deciding whether
    /// a resource may *stay*, as opposed to being newly placed).
    pub fn available(&self, strict: bool, allow_standby: bool) -> bool {
        if !self.online || self.unclean || self.shutdown {
            return false;
        }
        if self.standby && !allow_standby {
            return false;
        }
        if strict && self.maintenance {
            return false;
        }
        true
    }
}

/// A resource's private view of a node: its placement weight there and
/// how many instances the current pass has assigned to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: NodeId,
    pub weight: Score,
    pub count: u32,
}

impl NodeView {
    pub fn new(node_id: &str, weight: Score) -> Self {
        Self {
            node_id: node_id.to_string(),
            weight,
            count: 0,
        }
    }
}
