//! herd-core — the working-set model for the herd scheduling core.
//!
//! A scheduling round operates on a *working set*: a snapshot of the
//! cluster's nodes, the resource tree (primitives, groups, clones,
//! bundles), colocation constraints, actions, and ordering relations.
//! The placement and ordering engines (`herd-placement`,
//! `herd-ordering`) mutate this snapshot in place; the caller discards
//! it at the end of the round and rebuilds it for the next one.
//!
//! # Components
//!
//! - **`score`** — saturating placement scores with ±infinity sentinels
//! - **`node`** — cluster nodes and per-resource node views
//! - **`resource`** — the resource tree, flags, and colocation edges
//! - **`action`** — actions, action flags, and the ordering graph
//! - **`working_set`** — the arena container and graph helpers
//! - **`rules`** — rule-input plumbing for the external rule evaluator

pub mod action;
pub mod error;
pub mod node;
pub mod resource;
pub mod rules;
pub mod score;
pub mod working_set;

pub use action::{
    Action, ActionFlags, ActionId, OrderFlags, OrderingEdge, OrderingSpec, Task, Updated,
};
pub use error::{CoreError, CoreResult};
pub use node::{Node, NodeId, NodeView};
pub use resource::{
    Colocation, ColocationId, LocationPin, Resource, ResourceFlags, ResourceId, Role, Variant,
};
pub use rules::{NvPairBlock, RuleEvaluator, RuleInput, unpack_nvpair_blocks};
pub use score::Score;
pub use working_set::WorkingSet;
