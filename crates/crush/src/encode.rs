//! Binary encoding of a finalized CRUSH map, the mirror image of
//! [`crate::decode`] (§4.5). Section order and field widths match exactly
//! so `decode(encode(m)) == m`.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use crate::decode::{CRUSH_CODEC_MAGIC, CRUSH_TEXT_CODEC_V1};
use crate::types::{BucketData, CrushBucket, CrushMap, CrushRule};

fn encode_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn encode_i32_string_map(buf: &mut BytesMut, map: &HashMap<i32, String>) {
    let mut entries: Vec<(&i32, &String)> = map.iter().collect();
    entries.sort_by_key(|(k, _)| **k);
    buf.put_u32_le(entries.len() as u32);
    for (key, value) in entries {
        buf.put_i32_le(*key);
        encode_string(buf, value);
    }
}

fn encode_u32_string_map(buf: &mut BytesMut, map: &HashMap<u32, String>) {
    let mut entries: Vec<(&u32, &String)> = map.iter().collect();
    entries.sort_by_key(|(k, _)| **k);
    buf.put_u32_le(entries.len() as u32);
    for (key, value) in entries {
        buf.put_u32_le(*key);
        encode_string(buf, value);
    }
}

fn encode_bucket(buf: &mut BytesMut, bucket: &CrushBucket) {
    buf.put_i32_le(bucket.id);
    buf.put_i32_le(bucket.bucket_type);
    buf.put_u8(bucket.alg as u8);
    buf.put_u32_le(bucket.summed_weight);
    buf.put_u32_le(bucket.size() as u32);
    for &item in &bucket.items {
        buf.put_i32_le(item);
    }
    for &weight in &bucket.weights {
        buf.put_u32_le(weight);
    }
    match &bucket.data {
        BucketData::Uniform { item_weight } => buf.put_u32_le(*item_weight),
        BucketData::List { sum_weights } => {
            for &w in sum_weights {
                buf.put_u32_le(w);
            }
        }
        BucketData::Tree { node_weights } => {
            buf.put_u32_le(node_weights.len() as u32);
            for &w in node_weights {
                buf.put_u32_le(w);
            }
        }
        BucketData::Straw { straws } => {
            for &w in straws {
                buf.put_u32_le(w);
            }
        }
        BucketData::Straw2 => {}
    }
}

fn encode_rule(buf: &mut BytesMut, rule: &CrushRule) {
    buf.put_i32_le(rule.pool);
    buf.put_u8(rule.rule_type as u8);
    buf.put_u8(rule.min_size);
    buf.put_u8(rule.max_size);
    buf.put_u32_le(rule.steps.len() as u32);
    for step in &rule.steps {
        buf.put_u32_le(step.op as u32);
        buf.put_i32_le(step.arg1);
        buf.put_i32_le(step.arg2);
    }
}

/// Serialize `map` to its binary wire form.
pub fn encode_map(map: &CrushMap) -> Vec<u8> {
    let mut buf = BytesMut::new();

    buf.put_u32_le(CRUSH_CODEC_MAGIC);
    buf.put_u32_le(CRUSH_TEXT_CODEC_V1);
    buf.put_i32_le(map.max_devices);

    let mut devices: Vec<i32> = map.names.keys().copied().filter(|&id| id >= 0).collect();
    devices.sort_unstable();
    buf.put_u32_le(devices.len() as u32);
    for id in devices {
        buf.put_i32_le(id);
        buf.put_u32_le(map.offload(id));
    }

    buf.put_u32_le(map.buckets.len() as u32);
    let mut bodies = BytesMut::new();
    let mut offsets = Vec::with_capacity(map.buckets.len());
    for slot in &map.buckets {
        match slot {
            None => offsets.push(u32::MAX),
            Some(bucket) => {
                offsets.push(bodies.len() as u32);
                encode_bucket(&mut bodies, bucket);
            }
        }
    }
    for offset in offsets {
        buf.put_u32_le(offset);
    }
    buf.put_u32_le(bodies.len() as u32);
    buf.put_slice(&bodies);

    buf.put_u32_le(map.rules.len() as u32);
    for slot in &map.rules {
        match slot {
            None => buf.put_u8(0),
            Some(rule) => {
                buf.put_u8(1);
                encode_rule(&mut buf, rule);
            }
        }
    }

    encode_i32_string_map(&mut buf, &map.type_names);
    encode_i32_string_map(&mut buf, &map.names);
    encode_u32_string_map(&mut buf, &map.rule_names);

    buf.put_u32_le(map.tunables.choose_local_tries);
    buf.put_u32_le(map.tunables.choose_local_fallback_tries);
    buf.put_u32_le(map.tunables.choose_total_tries);
    buf.put_u32_le(map.tunables.chooseleaf_descend_once);
    buf.put_u8(map.tunables.chooseleaf_vary_r);
    buf.put_u8(map.tunables.chooseleaf_stable);

    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::types::{BucketAlgorithm, CrushRuleStep, RuleOp, RuleType};

    #[test]
    fn encode_then_decode_round_trips_an_empty_map() {
        let map = CrushMap::new();
        let encoded = encode_map(&map);
        let mut bytes = Bytes::from(encoded);
        let decoded = CrushMap::decode(&mut bytes).unwrap();
        assert_eq!(decoded.buckets.len(), 0);
        assert_eq!(decoded.rules.len(), 0);
        assert_eq!(decoded.tunables, map.tunables);
    }

    #[test]
    fn encode_then_decode_round_trips_a_populated_map() {
        let mut map = CrushMap::new();
        map.names.insert(0, "osd.0".into());
        map.device_offload.insert(0, 0x8000);
        map.buckets = vec![Some(CrushBucket {
            id: -1,
            bucket_type: 1,
            alg: BucketAlgorithm::Uniform,
            summed_weight: 0x10000,
            items: vec![0],
            weights: vec![0x10000],
            data: BucketData::Uniform {
                item_weight: 0x10000,
            },
        })];
        map.rules = vec![Some(CrushRule {
            rule_id: 0,
            pool: 3,
            rule_type: RuleType::Replicated,
            min_size: 1,
            max_size: 5,
            steps: vec![CrushRuleStep {
                op: RuleOp::Noop,
                arg1: 0,
                arg2: 0,
            }],
        })];

        let encoded = encode_map(&map);
        let mut bytes = Bytes::from(encoded);
        let decoded = CrushMap::decode(&mut bytes).unwrap();

        assert_eq!(decoded.offload(0), 0x8000);
        assert_eq!(decoded.get_bucket(-1).unwrap().data, map.get_bucket(-1).unwrap().data);
        assert_eq!(decoded.get_rule(0).unwrap().pool, 3);
    }
}
