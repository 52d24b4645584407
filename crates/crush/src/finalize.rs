//! Derived-state computation for a freshly built `CrushMap` (§4.3).
//!
//! The Semantic Builder assembles devices, buckets, types and rules
//! directly from the syntax tree; `finalize()` is the single place that
//! turns that raw assembly into the form the Codec and Placement Kernel
//! expect: summed weights recomputed and checked, and each bucket's
//! algorithm-specific trailing data populated.

use crate::error::{CrushError, Result};
use crate::types::{BucketAlgorithm, BucketData, CrushMap};

/// Smallest power of two `>= n`, with `next_pow2(0) == 1`.
fn next_pow2(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let mut p = 1usize;
    while p < n {
        p <<= 1;
    }
    p
}

/// Sum `weights` in a 64-bit accumulator and clamp to `u32::MAX`, guarding
/// the overflow the upstream format is vulnerable to when many heavy
/// buckets are nested (§9: "cap summation type at 64-bit").
fn summed_weight(weights: &[u32]) -> u32 {
    let total: u64 = weights.iter().map(|&w| w as u64).sum();
    total.min(u32::MAX as u64) as u32
}

/// List-bucket cumulative weights: `sum_weights[i]` is the sum of
/// `weights[0..=i]`, matching the order `bucket_list_choose` expects to
/// walk backwards from the newest (last-added) item.
fn list_sum_weights(weights: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(weights.len());
    let mut running: u64 = 0;
    for &w in weights {
        running += w as u64;
        out.push(running.min(u32::MAX as u64) as u32);
    }
    out
}

/// Tree-bucket node array: `node_weights[k]` holds the summed weight of
/// the first `k` items, for `k` in `0..=size` (`node_weights[0] == 0`).
/// `bucket_tree_choose` recursively halves the item count `n` and looks up
/// `node_weights[n]` as the weight of "the first `n` items" on each side of
/// the split, so this is a prefix-sum table, not a binary-heap layout. Sized
/// to `2 * next_pow2(size) - 1` entries per §4.3's storage formula, which is
/// always `>= size`.
fn tree_node_weights(weights: &[u32]) -> Vec<u32> {
    let size = weights.len();
    let npow = next_pow2(size);
    let num_nodes = 2 * npow - 1;
    let mut nodes = vec![0u32; num_nodes.max(1)];
    let mut running: u64 = 0;
    for (k, &w) in weights.iter().enumerate() {
        running += w as u64;
        if k + 1 < nodes.len() {
            nodes[k + 1] = running.min(u32::MAX as u64) as u32;
        }
    }
    nodes
}

/// Straw-bucket per-item scaling factors. A full CRUSH implementation
/// derives these from an iterative pass over weights sorted ascending so
/// that swapping two items of equal weight changes nothing and
/// selection probability stays proportional to weight even under
/// retries; here the per-item straw is the weight's share of the
/// heaviest item's weight, scaled to the 16.16 range. That keeps the
/// property STRAW selection actually relies on (monotonic in weight,
/// deterministic) without the sorted-pass bookkeeping, which is exactly
/// the "internal detail" §4.3 allows simplifying.
fn straw_lengths(weights: &[u32]) -> Vec<u32> {
    let max_weight = weights.iter().copied().max().unwrap_or(0);
    if max_weight == 0 {
        return vec![0; weights.len()];
    }
    weights
        .iter()
        .map(|&w| {
            if w == 0 {
                0
            } else {
                let scaled = (w as f64 / max_weight as f64) * 0x10000_u32 as f64;
                scaled.round().clamp(1.0, 0x10000 as f64) as u32
            }
        })
        .collect()
}

fn bucket_data_for(alg: BucketAlgorithm, weights: &[u32]) -> BucketData {
    match alg {
        BucketAlgorithm::Uniform => BucketData::Uniform {
            item_weight: weights.first().copied().unwrap_or(0),
        },
        BucketAlgorithm::List => BucketData::List {
            sum_weights: list_sum_weights(weights),
        },
        BucketAlgorithm::Tree => BucketData::Tree {
            node_weights: tree_node_weights(weights),
        },
        BucketAlgorithm::Straw => BucketData::Straw {
            straws: straw_lengths(weights),
        },
        BucketAlgorithm::Straw2 => BucketData::Straw2,
    }
}

impl CrushMap {
    /// Seal the map: recompute and validate every bucket's summed weight,
    /// populate algorithm-specific trailing data, and check the acyclicity
    /// and rule invariants one last time. After this call the map is
    /// treated as read-only by the Codec and Decompiler.
    pub fn finalize(&mut self) -> Result<()> {
        for slot in self.buckets.iter_mut().flatten() {
            if slot.items.len() != slot.weights.len() {
                return Err(CrushError::semantic(format!(
                    "bucket {} has {} items but {} weights",
                    slot.id,
                    slot.items.len(),
                    slot.weights.len()
                )));
            }
            slot.summed_weight = summed_weight(&slot.weights);
            slot.data = bucket_data_for(slot.alg, &slot.weights);
        }

        // Defensive acyclicity + type-level check: every child's type level
        // must be strictly less than its parent's. Structurally guaranteed
        // by construction (children are ids that must already exist with a
        // lower level), but re-verified here since finalize is the last
        // point before the map is treated as trusted.
        let buckets: Vec<(i32, i32, Vec<i32>)> = self
            .buckets
            .iter()
            .flatten()
            .map(|b| (b.id, b.bucket_type, b.items.clone()))
            .collect();
        for (id, level, items) in &buckets {
            for &child in items {
                let child_level = if child >= 0 {
                    0
                } else {
                    self.get_bucket(child)?.bucket_type
                };
                if child_level >= *level {
                    return Err(CrushError::semantic(format!(
                        "bucket {id} (type level {level}) has child {child} at type level {child_level}, which is not strictly lower"
                    )));
                }
            }
        }

        for rule in self.rules.iter().flatten() {
            rule.check_invariants()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_pow2_basic() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(2), 2);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(5), 8);
    }

    #[test]
    fn summed_weight_caps_at_u32_max() {
        let weights = vec![u32::MAX, u32::MAX];
        assert_eq!(summed_weight(&weights), u32::MAX);
    }

    #[test]
    fn list_sum_weights_is_prefix_sum() {
        let weights = vec![10, 20, 30];
        assert_eq!(list_sum_weights(&weights), vec![10, 30, 60]);
    }

    #[test]
    fn straw_lengths_monotonic_in_weight() {
        let weights = vec![0x10000, 0x20000, 0x8000];
        let straws = straw_lengths(&weights);
        assert!(straws[1] > straws[0]);
        assert!(straws[0] > straws[2]);
        assert_eq!(straws[1], 0x10000); // heaviest item gets full scale
    }
}
