//! Binary decoding of a compiled CRUSH map (§4.5).
//!
//! Sections are read in a fixed order: header (magic, version, max_devices),
//! devices, bucket directory, bucket bodies, rules, name tables, tunables.
//! Every primitive read goes
//! through a `decode_*` helper that turns a short read into a `DecodeError`
//! instead of panicking, since this function is the boundary where
//! untrusted bytes first become typed data.

use bytes::{Buf, Bytes};
use std::collections::HashMap;

use crate::error::{CrushError, Result};
use crate::types::*;

pub const CRUSH_CODEC_MAGIC: u32 = 0x43525348; // "CRSH"
pub const CRUSH_TEXT_CODEC_V1: u32 = 1;

const EMPTY_SLOT: u32 = u32::MAX;

#[inline]
fn decode_u8(buf: &mut impl Buf, context: &str) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(CrushError::DecodeError(format!(
            "truncated input reading {context}: need 1 byte, have {}",
            buf.remaining()
        )));
    }
    Ok(buf.get_u8())
}

#[inline]
fn decode_u32(buf: &mut impl Buf, context: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(CrushError::DecodeError(format!(
            "truncated input reading {context}: need 4 bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(buf.get_u32_le())
}

#[inline]
fn decode_i32(buf: &mut impl Buf, context: &str) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(CrushError::DecodeError(format!(
            "truncated input reading {context}: need 4 bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(buf.get_i32_le())
}

fn decode_string(buf: &mut impl Buf, context: &str) -> Result<String> {
    let len = decode_u32(buf, context)? as usize;
    if buf.remaining() < len {
        return Err(CrushError::DecodeError(format!(
            "truncated input reading {context}: need {len} bytes, have {}",
            buf.remaining()
        )));
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|e| CrushError::DecodeError(format!("{context}: {e}")))
}

fn decode_i32_string_map(buf: &mut impl Buf, context: &str) -> Result<HashMap<i32, String>> {
    let len = decode_u32(buf, context)?;
    let mut map = HashMap::with_capacity(len as usize);
    for i in 0..len {
        let key = decode_i32(buf, &format!("{context} key {i}"))?;
        let value = decode_string(buf, &format!("{context} value {i}"))?;
        map.insert(key, value);
    }
    Ok(map)
}

fn decode_u32_string_map(buf: &mut impl Buf, context: &str) -> Result<HashMap<u32, String>> {
    let len = decode_u32(buf, context)?;
    let mut map = HashMap::with_capacity(len as usize);
    for i in 0..len {
        let key = decode_u32(buf, &format!("{context} key {i}"))?;
        let value = decode_string(buf, &format!("{context} value {i}"))?;
        map.insert(key, value);
    }
    Ok(map)
}

impl CrushMap {
    /// Decode a compiled CRUSH map from its binary form.
    pub fn decode(data: &mut Bytes) -> Result<Self> {
        let magic = decode_u32(data, "magic")?;
        if magic != CRUSH_CODEC_MAGIC {
            return Err(CrushError::DecodeError(format!(
                "bad magic: 0x{magic:08x}, expected 0x{CRUSH_CODEC_MAGIC:08x}"
            )));
        }
        let version = decode_u32(data, "version")?;
        if version != CRUSH_TEXT_CODEC_V1 {
            return Err(CrushError::DecodeError(format!(
                "unsupported codec version: {version}"
            )));
        }

        let mut map = CrushMap::new();

        map.max_devices = decode_i32(data, "max_devices")?;

        // devices (only those with a name or non-default offload are listed;
        // `max_devices` above is the capacity, not this count, since device
        // ids need not be contiguous)
        let device_count = decode_u32(data, "device count")?;
        for i in 0..device_count {
            let id = decode_i32(data, &format!("device {i} id"))?;
            let offload = decode_u32(data, &format!("device {i} offload"))?;
            if offload != 0 {
                map.device_offload.insert(id, offload);
            }
        }

        // bucket directory
        let bucket_count = decode_u32(data, "bucket directory count")?;
        let mut offsets = Vec::with_capacity(bucket_count as usize);
        for i in 0..bucket_count {
            offsets.push(decode_u32(data, &format!("bucket directory slot {i}"))?);
        }

        // bucket bodies, as one length-prefixed blob
        let body_len = decode_u32(data, "bucket bodies length")? as usize;
        if data.remaining() < body_len {
            return Err(CrushError::DecodeError(format!(
                "truncated input reading bucket bodies: need {body_len} bytes, have {}",
                data.remaining()
            )));
        }
        let mut body = data.copy_to_bytes(body_len);

        map.buckets = Vec::with_capacity(bucket_count as usize);
        let mut cursor: u32 = 0;
        for (slot, &offset) in offsets.iter().enumerate() {
            if offset == EMPTY_SLOT {
                map.buckets.push(None);
                continue;
            }
            if offset != cursor {
                return Err(CrushError::DecodeError(format!(
                    "bucket directory slot {slot} offset {offset} does not match expected {cursor}"
                )));
            }
            let before = body.remaining();
            let bucket = decode_bucket(&mut body, slot)?;
            cursor += (before - body.remaining()) as u32;
            map.buckets.push(Some(bucket));
        }

        // rules
        let rule_count = decode_u32(data, "rule count")?;
        map.rules = Vec::with_capacity(rule_count as usize);
        for i in 0..rule_count {
            let exists = decode_u8(data, &format!("rule {i} existence flag"))?;
            if exists == 0 {
                map.rules.push(None);
                continue;
            }
            map.rules.push(Some(decode_rule(data, i)?));
        }

        // name tables
        map.type_names = decode_i32_string_map(data, "type names")?;
        map.names = decode_i32_string_map(data, "item names")?;
        map.rule_names = decode_u32_string_map(data, "rule names")?;
        map.ids = map.names.iter().map(|(id, name)| (name.clone(), *id)).collect();

        // tunables
        map.tunables.choose_local_tries = decode_u32(data, "choose_local_tries")?;
        map.tunables.choose_local_fallback_tries = decode_u32(data, "choose_local_fallback_tries")?;
        map.tunables.choose_total_tries = decode_u32(data, "choose_total_tries")?;
        map.tunables.chooseleaf_descend_once = decode_u32(data, "chooseleaf_descend_once")?;
        map.tunables.chooseleaf_vary_r = decode_u8(data, "chooseleaf_vary_r")?;
        map.tunables.chooseleaf_stable = decode_u8(data, "chooseleaf_stable")?;

        Ok(map)
    }
}

fn decode_bucket(data: &mut Bytes, slot: usize) -> Result<CrushBucket> {
    let id = decode_i32(data, &format!("bucket[slot {slot}] id"))?;
    let bucket_type = decode_i32(data, &format!("bucket[slot {slot}] type"))?;
    let alg_byte = decode_u8(data, &format!("bucket[slot {slot}] alg"))?;
    let summed_weight = decode_u32(data, &format!("bucket[slot {slot}] weight"))?;
    let size = decode_u32(data, &format!("bucket[slot {slot}] size"))?;

    if size > 1_000_000 {
        return Err(CrushError::DecodeError(format!(
            "bucket[slot {slot}] size implausibly large: {size}"
        )));
    }

    let mut items = Vec::with_capacity(size as usize);
    for i in 0..size {
        items.push(decode_i32(data, &format!("bucket[slot {slot}] item {i}"))?);
    }
    let mut weights = Vec::with_capacity(size as usize);
    for i in 0..size {
        weights.push(decode_u32(data, &format!("bucket[slot {slot}] weight {i}"))?);
    }

    let alg = BucketAlgorithm::try_from(alg_byte)?;

    let data_field = match alg {
        BucketAlgorithm::Uniform => {
            let item_weight = decode_u32(data, &format!("bucket[slot {slot}] uniform item_weight"))?;
            BucketData::Uniform { item_weight }
        }
        BucketAlgorithm::List => {
            let mut sum_weights = Vec::with_capacity(size as usize);
            for i in 0..size {
                sum_weights.push(decode_u32(
                    data,
                    &format!("bucket[slot {slot}] list sum_weight {i}"),
                )?);
            }
            BucketData::List { sum_weights }
        }
        BucketAlgorithm::Tree => {
            let num_nodes = decode_u32(data, &format!("bucket[slot {slot}] tree num_nodes"))?;
            let mut node_weights = Vec::with_capacity(num_nodes as usize);
            for i in 0..num_nodes {
                node_weights.push(decode_u32(
                    data,
                    &format!("bucket[slot {slot}] tree node_weight {i}"),
                )?);
            }
            BucketData::Tree { node_weights }
        }
        BucketAlgorithm::Straw => {
            let mut straws = Vec::with_capacity(size as usize);
            for i in 0..size {
                straws.push(decode_u32(data, &format!("bucket[slot {slot}] straw {i}"))?);
            }
            BucketData::Straw { straws }
        }
        BucketAlgorithm::Straw2 => BucketData::Straw2,
    };

    Ok(CrushBucket {
        id,
        bucket_type,
        alg,
        summed_weight,
        items,
        weights,
        data: data_field,
    })
}

fn decode_rule(data: &mut Bytes, rule_id: u32) -> Result<CrushRule> {
    let pool = decode_i32(data, &format!("rule {rule_id} pool"))?;
    let rule_type_byte = decode_u8(data, &format!("rule {rule_id} type"))?;
    let min_size = decode_u8(data, &format!("rule {rule_id} min_size"))?;
    let max_size = decode_u8(data, &format!("rule {rule_id} max_size"))?;
    let rule_type = RuleType::try_from(rule_type_byte)?;

    let step_count = decode_u32(data, &format!("rule {rule_id} step count"))?;
    let mut steps = Vec::with_capacity(step_count as usize);
    for i in 0..step_count {
        let op = decode_u32(data, &format!("rule {rule_id} step {i} op"))?;
        let arg1 = decode_i32(data, &format!("rule {rule_id} step {i} arg1"))?;
        let arg2 = decode_i32(data, &format!("rule {rule_id} step {i} arg2"))?;
        steps.push(CrushRuleStep {
            op: RuleOp::try_from(op)?,
            arg1,
            arg2,
        });
    }

    Ok(CrushRule {
        rule_id,
        pool,
        rule_type,
        min_size,
        max_size,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_map;

    fn sample_map() -> CrushMap {
        let mut map = CrushMap::new();
        map.max_devices = 2;
        map.names.insert(0, "osd.0".into());
        map.names.insert(1, "osd.1".into());
        map.names.insert(-1, "root".into());
        map.ids.insert("osd.0".into(), 0);
        map.ids.insert("osd.1".into(), 1);
        map.ids.insert("root".into(), -1);
        map.type_names.insert(0, "osd".into());
        map.type_names.insert(1, "root".into());
        map.buckets = vec![Some(CrushBucket {
            id: -1,
            bucket_type: 1,
            alg: BucketAlgorithm::Straw2,
            summed_weight: 2 * 0x10000,
            items: vec![0, 1],
            weights: vec![0x10000, 0x10000],
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
                    op: RuleOp::Emit,
                    arg1: 0,
                    arg2: 0,
                },
            ],
        })];
        map.rule_names.insert(0, "data".into());
        map
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut bytes = Bytes::from_static(&[0, 0, 0, 0]);
        let err = CrushMap::decode(&mut bytes).unwrap_err();
        assert!(matches!(err, CrushError::DecodeError(_)));
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let mut buf = bytes::BytesMut::new();
        buf.extend_from_slice(&CRUSH_CODEC_MAGIC.to_le_bytes());
        let mut bytes = buf.freeze();
        assert!(CrushMap::decode(&mut bytes).is_err());
    }

    #[test]
    fn round_trip_preserves_bucket_and_rule_shape() {
        let map = sample_map();
        let encoded = encode_map(&map);
        let mut bytes = Bytes::from(encoded);
        let decoded = CrushMap::decode(&mut bytes).unwrap();

        assert_eq!(decoded.max_devices, map.max_devices);
        assert_eq!(decoded.buckets.len(), map.buckets.len());
        assert_eq!(decoded.get_bucket(-1).unwrap().items, vec![0, 1]);
        assert_eq!(decoded.get_rule(0).unwrap().steps.len(), 2);
        assert_eq!(decoded.name_of(0), Some("osd.0"));
        assert_eq!(decoded.rule_names.get(&0).map(String::as_str), Some("data"));
        assert_eq!(decoded.tunables, map.tunables);
    }

    #[test]
    fn round_trip_preserves_max_devices_with_sparse_ids() {
        // device 0 and device 5 only: max_devices must come back as 6, not 2
        // (the number of named devices), so a later `device 4 ...` wouldn't
        // collide with an id the compiler thought was still free.
        let mut map = CrushMap::new();
        map.max_devices = 6;
        map.names.insert(0, "osd.0".into());
        map.names.insert(5, "osd.5".into());
        map.ids.insert("osd.0".into(), 0);
        map.ids.insert("osd.5".into(), 5);

        let encoded = encode_map(&map);
        let mut bytes = Bytes::from(encoded);
        let decoded = CrushMap::decode(&mut bytes).unwrap();

        assert_eq!(decoded.max_devices, 6);
    }
}
