//! Rule-input plumbing for the external rule evaluator.
//!
//! Rule evaluation itself (time predicates, node-attribute expressions,
//! role conditions) lives outside the core. The core's job is to hand
//! the evaluator a fully-populated [`RuleInput`], order the name/value
//! blocks correctly, and fold the surviving pairs into a map.

use std::collections::BTreeMap;

use tracing::trace;

/// Everything a rule expression may reference. Unset fields mean the
/// corresponding context does not apply to this evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleInput<'a> {
    /// Evaluation time, as seconds since the epoch.
    pub now: Option<i64>,
    pub node_attrs: Option<&'a BTreeMap<String, String>>,
    pub rsc_standard: Option<&'a str>,
    pub rsc_provider: Option<&'a str>,
    pub rsc_agent: Option<&'a str>,
    pub rsc_params: Option<&'a BTreeMap<String, String>>,
    pub rsc_meta: Option<&'a BTreeMap<String, String>>,
    pub rsc_id: Option<&'a str>,
    /// Byte ranges of submatches from matching `rsc_id` against a
    /// configured pattern.
    pub rsc_id_submatches: Option<&'a [(usize, usize)]>,
    pub op_name: Option<&'a str>,
    pub op_interval_ms: Option<u32>,
}

/// A block of name/value pairs guarded by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvPairBlock {
    pub id: Option<String>,
    pub score: i32,
    pub pairs: Vec<(String, String)>,
}

/// External rule evaluator. The core never interprets rule expressions;
/// it only asks whether a block applies under the given input.
pub trait RuleEvaluator {
    fn block_passes(&self, block: &NvPairBlock, input: &RuleInput<'_>) -> bool;
}

/// An evaluator that admits every block; used when a caller has no
/// rules configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPasses;

impl RuleEvaluator for AlwaysPasses {
    fn block_passes(&self, _block: &NvPairBlock, _input: &RuleInput<'_>) -> bool {
        true
    }
}

/// Evaluate and fold nvpair blocks into a single map.
///
/// Blocks are processed in a fixed order: a block whose id exactly
/// matches `always_first` comes first, then score descending, then
/// document order. Within that order the first writer of a name wins.
pub fn unpack_nvpair_blocks(
    blocks: &[NvPairBlock],
    input: &RuleInput<'_>,
    evaluator: &dyn RuleEvaluator,
    always_first: Option<&str>,
) -> BTreeMap<String, String> {
    let mut order: Vec<usize> = (0..blocks.len()).collect();
    order.sort_by_key(|&i| {
        let block = &blocks[i];
        let pinned = match (always_first, block.id.as_deref()) {
            (Some(wanted), Some(id)) => id == wanted,
            _ => false,
        };
        // The trailing index keeps the sort stable on ties.
        (!pinned, std::cmp::Reverse(block.score), i)
    });

    let mut values = BTreeMap::new();
    for i in order {
        let block = &blocks[i];
        if !evaluator.block_passes(block, input) {
            trace!(block = block.id.as_deref().unwrap_or("<anonymous>"), "rule block filtered out");
            continue;
        }
        for (name, value) in &block.pairs {
            if !values.contains_key(name) {
                values.insert(name.clone(), value.clone());
            }
        }
    }
    values
}
