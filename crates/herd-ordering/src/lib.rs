//! herd-ordering — synthesizes and orders collective actions.
//!
//! After placement, every collective needs pseudo-actions
//! (`start`/`started`, `stop`/`stopped`) derived from its children's
//! actions, and the caller-supplied ordering relations must be
//! propagated through the action graph. For two interleaved
//! collectives, child actions are paired node-by-node instead of
//! all-to-all.
//!
//! # Components
//!
//! - **`state`** — summarizes a collective's children into
//!   starting/stopping/restarting/active bits
//! - **`pseudo`** — builds the collective pseudo-actions and notify hooks
//! - **`compat`** — finds the compatible child on a peer collective
//! - **`update`** — the ordering updater (interleaved and recursive)
//! - **`error`** — ordering error types

pub mod compat;
pub mod error;
pub mod pseudo;
pub mod state;
pub mod update;

pub use compat::{find_compatible_child, is_child_compatible};
pub use error::{OrderingError, OrderingResult};
pub use pseudo::{
    CollectiveActions, NotificationBuilder, NotifyHandles, create_instance_actions,
    new_pseudo_action,
};
pub use state::{InstanceStateSummary, check_instance_state};
pub use update::{
    action_flags, apply_orderings, default_update_filter, summary_action_flags,
    update_collective_ordering, update_ordered_actions,
};
