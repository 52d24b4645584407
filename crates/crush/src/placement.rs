//! Thin placement entry point over the rule-execution kernel (§4.4).
//!
//! This stops at `crush_do_rule`: turning a placement result into pool PGs,
//! object locators, or OSD session state is client-stack territory this
//! crate does not own.

use crate::error::Result;
use crate::mapper::crush_do_rule;
use crate::types::CrushMap;

/// Map `input_key` to up to `replica_count` device ids by running rule
/// `rule_id`. `device_weights` lets a caller mark devices out without
/// recompiling the map; pass the map's own per-device offload-derived
/// weights when there is no separate OSD weight table to consult.
pub fn place(
    map: &CrushMap,
    rule_id: u32,
    input_key: u32,
    replica_count: usize,
    device_weights: &[u32],
) -> Result<Vec<i32>> {
    let mut result = Vec::new();
    crush_do_rule(
        map,
        rule_id,
        input_key,
        &mut result,
        replica_count,
        device_weights,
    )?;
    Ok(result)
}

/// Build a full-weight table (every device fully in) sized to cover every
/// device id present in `map`, the common case for a caller with no
/// separate failure/offload state of its own.
pub fn full_weights(map: &CrushMap) -> Vec<u32> {
    let max_id = map.devices().into_iter().max().unwrap_or(-1);
    vec![crate::types::OFFLOAD_SCALE; (max_id + 1).max(0) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BucketAlgorithm, BucketData, CrushBucket, CrushRule, CrushRuleStep, RuleOp, RuleType,
    };

    fn sample_map() -> CrushMap {
        let mut map = CrushMap::new();
        map.max_devices = 3;
        map.names.insert(0, "osd.0".into());
        map.names.insert(1, "osd.1".into());
        map.names.insert(2, "osd.2".into());
        map.buckets = vec![Some(CrushBucket {
            id: -1,
            bucket_type: 1,
            alg: BucketAlgorithm::Straw2,
            summed_weight: 3 * 0x10000,
            items: vec![0, 1, 2],
            weights: vec![0x10000, 0x10000, 0x10000],
            data: BucketData::Straw2,
        })];
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
        map
    }

    #[test]
    fn place_returns_requested_replica_count() {
        let map = sample_map();
        let weights = full_weights(&map);
        let result = place(&map, 0, 42, 2, &weights).unwrap();
        assert_eq!(result.len(), 2);
        assert_ne!(result[0], result[1]);
    }

    #[test]
    fn place_is_deterministic_for_same_input() {
        let map = sample_map();
        let weights = full_weights(&map);
        let a = place(&map, 0, 7, 2, &weights).unwrap();
        let b = place(&map, 0, 7, 2, &weights).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn full_weights_covers_every_device() {
        let map = sample_map();
        let weights = full_weights(&map);
        assert_eq!(weights.len(), 3);
        assert!(weights.iter().all(|&w| w == 0x10000));
    }
}
