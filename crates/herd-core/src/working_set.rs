//! The working set: one scheduling round's snapshot of the cluster.
//!
//! Owns the arenas that resources, colocations, and actions live in,
//! plus the graph helpers shared by the placement and ordering engines.
//! All iteration at decision points is over sorted structures; rerunning
//! a round on an identical snapshot produces identical output.

use std::collections::BTreeMap;

use tracing::trace;

use crate::action::{
    Action, ActionFlags, ActionId, OrderFlags, OrderingEdge, OrderingSpec, Task,
};
use crate::error::{CoreError, CoreResult};
use crate::node::{Node, NodeId, NodeView};
use crate::resource::{Colocation, ColocationId, LocationPin, Resource, ResourceId};
use crate::score::Score;

/// A materialized snapshot of cluster state for one scheduling round.
#[derive(Debug, Default)]
pub struct WorkingSet {
    pub nodes: BTreeMap<NodeId, Node>,
    pub resources: Vec<Resource>,
    pub colocations: Vec<Colocation>,
    pub actions: Vec<Action>,
    /// Caller-supplied orderings for the ordering engine to apply.
    pub orderings: Vec<OrderingSpec>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ──────────────────────────────────────────────

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Add a resource, wiring it into its parent's child list.
    pub fn add_resource(&mut self, resource: Resource) -> CoreResult<ResourceId> {
        let id = ResourceId(self.resources.len());
        if let Some(parent) = resource.parent {
            self.resource_mut(parent)?.children.push(id);
        }
        self.resources.push(resource);
        Ok(id)
    }

    /// Add a colocation edge, wiring it onto both endpoints.
    pub fn add_colocation(&mut self, colocation: Colocation) -> CoreResult<ColocationId> {
        let id = ColocationId(self.colocations.len());
        let dependent = colocation.dependent;
        let primary = colocation.primary;
        self.resource_mut(dependent)?.this_with.push(id);
        self.resource_mut(primary)?.with_this.push(id);
        self.colocations.push(colocation);
        Ok(id)
    }

    /// Create an action for a resource and register it there.
    pub fn add_action(
        &mut self,
        resource: ResourceId,
        task: Task,
        node: Option<&NodeId>,
        flags: ActionFlags,
    ) -> CoreResult<ActionId> {
        let uuid = format!("{}_{}_0", self.resource(resource)?.id, task.as_str());
        let id = ActionId(self.actions.len());
        self.actions.push(Action {
            resource: Some(resource),
            task,
            node: node.cloned(),
            flags,
            uuid,
            priority: Score::ZERO,
            after: Vec::new(),
        });
        self.resource_mut(resource)?.actions.push(id);
        Ok(id)
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn resource(&self, id: ResourceId) -> CoreResult<&Resource> {
        self.resources
            .get(id.0)
            .ok_or(CoreError::UnknownResource(id.0))
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> CoreResult<&mut Resource> {
        self.resources
            .get_mut(id.0)
            .ok_or(CoreError::UnknownResource(id.0))
    }

    pub fn action(&self, id: ActionId) -> CoreResult<&Action> {
        self.actions.get(id.0).ok_or(CoreError::UnknownAction(id.0))
    }

    pub fn action_mut(&mut self, id: ActionId) -> CoreResult<&mut Action> {
        self.actions
            .get_mut(id.0)
            .ok_or(CoreError::UnknownAction(id.0))
    }

    pub fn colocation(&self, id: ColocationId) -> CoreResult<&Colocation> {
        self.colocations
            .get(id.0)
            .ok_or(CoreError::UnknownColocation(id.0))
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    // ── Tree helpers ──────────────────────────────────────────────

    /// The outermost ancestor of a resource (itself if top-level).
    pub fn top_resource(&self, id: ResourceId) -> CoreResult<ResourceId> {
        let mut current = id;
        while let Some(parent) = self.resource(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// The outermost ancestor's view of a node. This is the view that
    /// enforces per-host instance caps across a whole collective.
    pub fn top_allowed_node(
        &self,
        instance: ResourceId,
        node_id: &NodeId,
    ) -> CoreResult<Option<&NodeView>> {
        let top = self.top_resource(instance)?;
        Ok(self.resource(top)?.allowed_nodes.get(node_id))
    }

    /// Mutable variant of [`top_allowed_node`](Self::top_allowed_node).
    pub fn top_allowed_node_mut(
        &mut self,
        instance: ResourceId,
        node_id: &NodeId,
    ) -> CoreResult<Option<&mut NodeView>> {
        let top = self.top_resource(instance)?;
        Ok(self.resource_mut(top)?.allowed_nodes.get_mut(node_id))
    }

    /// The children a collective places as instances. Bundle children
    /// are the replica containers.
    pub fn instances_of(&self, id: ResourceId) -> CoreResult<Vec<ResourceId>> {
        Ok(self.resource(id)?.children.clone())
    }

    /// Whether this resource or any descendant is blocked.
    pub fn any_blocked(&self, id: ResourceId) -> CoreResult<bool> {
        let rsc = self.resource(id)?;
        if rsc.flags.blocked {
            return Ok(true);
        }
        for child in rsc.children.clone() {
            if self.any_blocked(child)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Where the resource is (`current = true`: the single node it is
    /// running on, if exactly one) or will be (`current = false`: the
    /// node placement chose).
    pub fn location(&self, id: ResourceId, current: bool) -> CoreResult<Option<NodeId>> {
        let rsc = self.resource(id)?;
        if current {
            if rsc.running_on.len() == 1 {
                return Ok(rsc.running_on.iter().next().cloned());
            }
            return Ok(None);
        }
        Ok(rsc.assigned_to.clone())
    }

    // ── Score and location mutation ───────────────────────────────

    /// Merge a score into a resource's view of a node, and recursively
    /// into its children's views. A ban (`-INFINITY`) therefore cascades
    /// down the subtree. Nodes the resource has no view of are skipped.
    pub fn update_score(
        &mut self,
        id: ResourceId,
        node_id: &NodeId,
        score: Score,
    ) -> CoreResult<()> {
        let children = {
            let rsc = self.resource_mut(id)?;
            if let Some(view) = rsc.allowed_nodes.get_mut(node_id) {
                view.weight = view.weight.plus(score);
            }
            rsc.children.clone()
        };
        for child in children {
            self.update_score(child, node_id, score)?;
        }
        Ok(())
    }

    /// Apply an explicit location preference: merge `score` into the
    /// named node's view (or every allowed node when `node` is `None`)
    /// and keep a pin record with the reason.
    pub fn resource_location(
        &mut self,
        id: ResourceId,
        node: Option<NodeId>,
        score: Score,
        reason: &str,
    ) -> CoreResult<()> {
        trace!(
            resource = %self.resource(id)?.id,
            node = node.as_deref().unwrap_or("all"),
            score = %score,
            reason,
            "applying location preference"
        );
        let targets: Vec<NodeId> = match &node {
            Some(n) => vec![n.clone()],
            None => self.resource(id)?.allowed_nodes.keys().cloned().collect(),
        };
        for target in targets {
            self.update_score(id, &target, score)?;
        }
        self.resource_mut(id)?.pins.push(LocationPin {
            node,
            score,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Undo an assignment: the resource (and its subtree) becomes
    /// provisional again with no chosen node.
    pub fn unassign(&mut self, id: ResourceId) -> CoreResult<()> {
        let children = {
            let rsc = self.resource_mut(id)?;
            rsc.flags.provisional = true;
            rsc.assigned_to = None;
            rsc.children.clone()
        };
        for child in children {
            self.unassign(child)?;
        }
        Ok(())
    }

    // ── Deterministic iteration ───────────────────────────────────

    /// A resource's allowed nodes ordered by the standard comparator:
    /// weight descending, then node id ascending.
    pub fn sorted_allowed_nodes(&self, id: ResourceId) -> CoreResult<Vec<NodeId>> {
        let rsc = self.resource(id)?;
        let mut nodes: Vec<(&NodeId, Score)> = rsc
            .allowed_nodes
            .iter()
            .map(|(node_id, view)| (node_id, view.weight))
            .collect();
        // BTreeMap iteration is id-ascending; the stable sort by weight
        // keeps that as the tie-break.
        nodes.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(nodes.into_iter().map(|(node_id, _)| node_id.clone()).collect())
    }

    // ── Action graph ──────────────────────────────────────────────

    /// First action of a resource matching a task, optionally limited
    /// to a node.
    pub fn find_first_action(
        &self,
        resource: ResourceId,
        task: Task,
        node: Option<&NodeId>,
    ) -> CoreResult<Option<ActionId>> {
        for &action_id in &self.resource(resource)?.actions {
            let action = self.action(action_id)?;
            if action.task != task {
                continue;
            }
            if let Some(wanted) = node {
                if action.node.as_ref() != Some(wanted) {
                    continue;
                }
            }
            return Ok(Some(action_id));
        }
        Ok(None)
    }

    /// Add an ordering edge `first → then`, merging flags into an
    /// existing edge if one is already present. Returns whether the
    /// graph changed.
    pub fn order_actions(
        &mut self,
        first: ActionId,
        then: ActionId,
        flags: OrderFlags,
    ) -> CoreResult<bool> {
        if first == then {
            return Ok(false);
        }
        self.action(then)?; // Validate before mutating.
        let first_action = self.action_mut(first)?;
        for edge in &mut first_action.after {
            if edge.then == then {
                let merged = edge.flags.union(flags);
                if merged == edge.flags {
                    return Ok(false);
                }
                edge.flags = merged;
                return Ok(true);
            }
        }
        first_action.after.push(OrderingEdge { then, flags });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Variant;

    fn ws_with_clone() -> (WorkingSet, ResourceId, ResourceId) {
        let mut ws = WorkingSet::new();
        ws.add_node(Node::online("a"));
        ws.add_node(Node::online("b"));

        let mut clone = Resource::new("web-clone", Variant::Clone);
        clone.allow_node("a", Score::ZERO);
        clone.allow_node("b", Score::Finite(10));
        let clone_id = ws.add_resource(clone).unwrap();

        let mut child = Resource::new("web:0", Variant::Primitive);
        child.parent = Some(clone_id);
        child.allow_node("a", Score::ZERO);
        child.allow_node("b", Score::ZERO);
        let child_id = ws.add_resource(child).unwrap();

        (ws, clone_id, child_id)
    }

    #[test]
    fn top_allowed_node_walks_to_outermost_parent() {
        let (ws, _, child) = ws_with_clone();
        let view = ws.top_allowed_node(child, &"b".to_string()).unwrap();
        assert_eq!(view.unwrap().weight, Score::Finite(10));
    }

    #[test]
    fn update_score_cascades_to_children() {
        let (mut ws, clone_id, child) = ws_with_clone();
        ws.update_score(clone_id, &"a".to_string(), Score::MinusInf)
            .unwrap();
        let child_view = &ws.resource(child).unwrap().allowed_nodes["a"];
        assert_eq!(child_view.weight, Score::MinusInf);
        let other = &ws.resource(child).unwrap().allowed_nodes["b"];
        assert_eq!(other.weight, Score::ZERO);
    }

    #[test]
    fn resource_location_without_node_pins_everywhere() {
        let (mut ws, _, child) = ws_with_clone();
        ws.resource_location(child, None, Score::MinusInf, "collective limit reached")
            .unwrap();
        let rsc = ws.resource(child).unwrap();
        assert!(rsc
            .allowed_nodes
            .values()
            .all(|view| view.weight == Score::MinusInf));
        assert_eq!(rsc.pins.len(), 1);
        assert_eq!(rsc.pins[0].reason, "collective limit reached");
        assert_eq!(rsc.pins[0].node, None);
    }

    #[test]
    fn sorted_nodes_by_weight_then_id() {
        let mut ws = WorkingSet::new();
        let mut rsc = Resource::new("r", Variant::Primitive);
        rsc.allow_node("c", Score::Finite(5));
        rsc.allow_node("a", Score::ZERO);
        rsc.allow_node("b", Score::Finite(5));
        let id = ws.add_resource(rsc).unwrap();

        let sorted = ws.sorted_allowed_nodes(id).unwrap();
        assert_eq!(sorted, vec!["b", "c", "a"]);
    }

    #[test]
    fn order_actions_dedups_and_merges_flags() {
        let (mut ws, _, child) = ws_with_clone();
        let start = ws
            .add_action(child, Task::Start, None, ActionFlags::runnable())
            .unwrap();
        let stop = ws
            .add_action(child, Task::Stop, None, ActionFlags::runnable())
            .unwrap();

        let runnable_left = OrderFlags {
            runnable_left: true,
            ..OrderFlags::default()
        };
        assert!(ws.order_actions(stop, start, runnable_left).unwrap());
        // Same edge again: no change.
        assert!(!ws.order_actions(stop, start, runnable_left).unwrap());
        // New flag on the same pair merges instead of duplicating.
        let implies = OrderFlags {
            implies_then: true,
            ..OrderFlags::default()
        };
        assert!(ws.order_actions(stop, start, implies).unwrap());
        let edges = &ws.action(stop).unwrap().after;
        assert_eq!(edges.len(), 1);
        assert!(edges[0].flags.runnable_left);
        assert!(edges[0].flags.implies_then);
    }

    #[test]
    fn self_ordering_is_rejected() {
        let (mut ws, _, child) = ws_with_clone();
        let start = ws
            .add_action(child, Task::Start, None, ActionFlags::runnable())
            .unwrap();
        assert!(!ws.order_actions(start, start, OrderFlags::default()).unwrap());
    }

    #[test]
    fn location_current_requires_single_node() {
        let (mut ws, _, child) = ws_with_clone();
        assert_eq!(ws.location(child, true).unwrap(), None);

        ws.resource_mut(child)
            .unwrap()
            .running_on
            .insert("a".to_string());
        assert_eq!(ws.location(child, true).unwrap(), Some("a".to_string()));

        ws.resource_mut(child)
            .unwrap()
            .running_on
            .insert("b".to_string());
        assert_eq!(ws.location(child, true).unwrap(), None);
    }

    #[test]
    fn dangling_indices_fail_fast() {
        let ws = WorkingSet::new();
        assert!(ws.resource(ResourceId(0)).is_err());
        assert!(ws.action(ActionId(3)).is_err());
    }
}
