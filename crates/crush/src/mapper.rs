//! The Placement Kernel: walks a rule's steps to map an input key to a set
//! of devices (§4.4). Only FIRSTN and CHOOSELEAF FIRSTN are executed; the
//! INDEP variants are parsed and preserved in a compiled `CrushRule` but not
//! driven by this kernel, which has no placement-group-stable retry state
//! to make INDEP's contract meaningful.

use crate::bucket::bucket_choose;
use crate::error::Result;
use crate::hash::crush_hash32_2;
use crate::types::{CrushMap, RuleOp};

/// Whether `item`'s weight marks it as failed/fully-offloaded for input `x`.
fn is_out(weight: &[u32], item: i32, x: u32) -> bool {
    if item < 0 || item as usize >= weight.len() {
        return true;
    }

    let w = weight[item as usize];

    if w >= 0x10000 {
        return false;
    }
    if w == 0 {
        return true;
    }

    let hash = crush_hash32_2(x, item as u32);
    (hash & 0xffff) >= w
}

/// Execute rule `rule_id` for input `x`, writing up to `result_max` selected
/// device ids into `result`. `weights` is the current per-device weight
/// table (distinct from the map's own bucket weights: this lets a caller
/// mark devices out without recompiling the map).
pub fn crush_do_rule(
    map: &CrushMap,
    rule_id: u32,
    x: u32,
    result: &mut Vec<i32>,
    result_max: usize,
    weights: &[u32],
) -> Result<()> {
    let rule = map.get_rule(rule_id)?;

    result.clear();

    let mut work: Vec<i32> = Vec::new();
    let mut scratch: Vec<i32> = Vec::new();

    let tries = map.tunables.choose_total_tries;
    let vary_r = map.tunables.chooseleaf_vary_r;
    let stable = map.tunables.chooseleaf_stable;

    for step in &rule.steps {
        match step.op {
            RuleOp::Take => {
                work.clear();
                work.push(step.arg1);
            }

            RuleOp::ChooseFirstN | RuleOp::ChooseLeafFirstN => {
                scratch.clear();
                let numrep = if step.arg1 == 0 {
                    result_max as i32
                } else if step.arg1 > 0 {
                    step.arg1
                } else {
                    (result_max as i32) + step.arg1
                };

                let item_type = step.arg2;
                let recurse_to_leaf = step.op == RuleOp::ChooseLeafFirstN;

                for &item in &work {
                    crush_choose_firstn(
                        map,
                        item,
                        x,
                        numrep.max(0) as usize,
                        item_type,
                        &mut scratch,
                        weights,
                        tries,
                        recurse_to_leaf,
                        vary_r,
                        stable,
                    )?;
                }

                work.clone_from(&scratch);
            }

            RuleOp::Emit => {
                for &item in &work {
                    if result.len() < result_max {
                        result.push(item);
                    }
                }
            }

            RuleOp::ChooseIndep | RuleOp::ChooseLeafIndep => {
                tracing::warn!(
                    "rule {} uses {:?}, which this kernel preserves but does not execute",
                    rule_id,
                    step.op
                );
            }

            RuleOp::Noop => {}
        }
    }

    Ok(())
}

/// The core recursive descent: pick `numrep` items of `item_type` reachable
/// from `bucket_id`, retrying on collision, out devices, and dead ends.
#[allow(clippy::too_many_arguments)]
fn crush_choose_firstn(
    map: &CrushMap,
    bucket_id: i32,
    x: u32,
    numrep: usize,
    item_type: i32,
    out: &mut Vec<i32>,
    weights: &[u32],
    tries: u32,
    recurse_to_leaf: bool,
    vary_r: u8,
    stable: u8,
) -> Result<()> {
    if bucket_id >= 0 {
        if item_type == 0 && !is_out(weights, bucket_id, x) {
            out.push(bucket_id);
        }
        return Ok(());
    }

    let bucket = map.get_bucket(bucket_id)?;
    tracing::debug!(
        bucket_id = bucket.id,
        bucket_type = bucket.bucket_type,
        size = bucket.size(),
        "descending into bucket"
    );

    for rep in 0..numrep {
        let mut found = false;
        let r = if stable != 0 { 0 } else { rep as u32 };
        let mut current_bucket = bucket;

        'tries: for ftotal in 0..tries {
            let r_prime = if vary_r != 0 { r + ftotal } else { r };

            loop {
                let item = match bucket_choose(current_bucket, x, r_prime) {
                    Some(item) => item,
                    None => continue 'tries,
                };

                let itemtype = if item >= 0 {
                    0
                } else {
                    match map.get_bucket(item) {
                        Ok(b) => b.bucket_type,
                        Err(_) => continue 'tries,
                    }
                };

                if itemtype != item_type {
                    if item >= 0 {
                        continue 'tries;
                    }
                    current_bucket = map.get_bucket(item)?;
                    continue;
                }

                if out.contains(&item) {
                    continue 'tries;
                }

                if item >= 0 && is_out(weights, item, x) {
                    continue 'tries;
                }

                if recurse_to_leaf && item < 0 {
                    let before_len = out.len();
                    crush_choose_firstn(
                        map, item, x, 1, 0, out, weights, tries, true, vary_r, stable,
                    )?;

                    if out.len() > before_len {
                        found = true;
                        break 'tries;
                    } else {
                        continue 'tries;
                    }
                }

                out.push(item);
                found = true;
                break 'tries;
            }
        }

        if !found {
            tracing::debug!(rep, tries, "no valid item found for replica after retries");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BucketAlgorithm, BucketData, CrushBucket, CrushRule, CrushRuleStep, RuleType};

    fn straw2_bucket(id: i32, items: Vec<i32>, weights: Vec<u32>) -> CrushBucket {
        CrushBucket {
            id,
            bucket_type: 1,
            alg: BucketAlgorithm::Straw2,
            summed_weight: weights.iter().sum(),
            items,
            weights,
            data: BucketData::Straw2,
        }
    }

    #[test]
    fn is_out_checks_weight_thresholds() {
        let weights = vec![0x10000, 0x8000, 0, 0x20000];

        assert!(!is_out(&weights, 0, 123));
        assert!(!is_out(&weights, 3, 123));
        assert!(is_out(&weights, 2, 123));
        assert!(is_out(&weights, 10, 123));
        assert!(is_out(&weights, -1, 123));
    }

    #[test]
    fn crush_do_rule_chooseleaf_firstn() {
        let mut map = CrushMap::new();
        map.max_devices = 2;
        map.buckets = vec![Some(straw2_bucket(
            -1,
            vec![0, 1],
            vec![0x10000, 0x10000],
        ))];
        map.rules = vec![Some(CrushRule {
            rule_id: 0,
            pool: 0,
            rule_type: RuleType::Replicated,
            min_size: 1,
            max_size: 10,
            steps: vec![
                CrushRuleStep {
                    op: RuleOp::Take,
                    arg1: -1,
                    arg2: 0,
                },
                CrushRuleStep {
                    op: RuleOp::ChooseLeafFirstN,
                    arg1: 1,
                    arg2: 0,
                },
                CrushRuleStep {
                    op: RuleOp::Emit,
                    arg1: 0,
                    arg2: 0,
                },
            ],
        })];

        let mut result = Vec::new();
        let weights = vec![0x10000, 0x10000];

        crush_do_rule(&map, 0, 123, &mut result, 1, &weights).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0] == 0 || result[0] == 1);
    }

    #[test]
    fn crush_do_rule_is_deterministic() {
        let mut map = CrushMap::new();
        map.max_devices = 3;
        map.buckets = vec![Some(straw2_bucket(
            -1,
            vec![0, 1, 2],
            vec![0x10000, 0x10000, 0x10000],
        ))];
        map.rules = vec![Some(CrushRule {
            rule_id: 0,
            pool: 0,
            rule_type: RuleType::Replicated,
            min_size: 1,
            max_size: 10,
            steps: vec![
                CrushRuleStep {
                    op: RuleOp::Take,
                    arg1: -1,
                    arg2: 0,
                },
                CrushRuleStep {
                    op: RuleOp::ChooseLeafFirstN,
                    arg1: 2,
                    arg2: 0,
                },
                CrushRuleStep {
                    op: RuleOp::Emit,
                    arg1: 0,
                    arg2: 0,
                },
            ],
        })];

        let weights = vec![0x10000, 0x10000, 0x10000];
        let mut first = Vec::new();
        crush_do_rule(&map, 0, 999, &mut first, 2, &weights).unwrap();
        let mut second = Vec::new();
        crush_do_rule(&map, 0, 999, &mut second, 2, &weights).unwrap();
        assert_eq!(first, second);
        if first.len() == 2 {
            assert_ne!(first[0], first[1]);
        }
    }

    #[test]
    fn crush_choose_firstn_respects_numrep() {
        let mut map = CrushMap::new();
        map.max_devices = 3;
        map.buckets = vec![Some(straw2_bucket(
            -1,
            vec![0, 1, 2],
            vec![0x10000, 0x10000, 0x10000],
        ))];

        let mut out = Vec::new();
        let weights = vec![0x10000, 0x10000, 0x10000];

        crush_choose_firstn(&map, -1, 123, 2, 0, &mut out, &weights, 50, false, 0, 0).unwrap();
        assert!(out.len() <= 2);
        if out.len() == 2 {
            assert_ne!(out[0], out[1]);
        }
    }
}
