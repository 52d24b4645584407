//! Per-algorithm item selection within a single bucket (§4.4).

use crate::hash::{crush_hash32_2, crush_hash32_3, crush_hash32_4};
use crate::types::{BucketAlgorithm, BucketData, CrushBucket};

/// Select one item from `bucket` for draw `r` of input `x`.
pub fn bucket_choose(bucket: &CrushBucket, x: u32, r: u32) -> Option<i32> {
    if bucket.size() == 0 {
        return None;
    }

    match bucket.alg {
        BucketAlgorithm::Straw2 => bucket_straw2_choose(bucket, x, r),
        BucketAlgorithm::Uniform => bucket_uniform_choose(bucket, x, r),
        BucketAlgorithm::List => bucket_list_choose(bucket, x, r),
        BucketAlgorithm::Tree => bucket_tree_choose(bucket, x, r),
        BucketAlgorithm::Straw => bucket_straw_choose(bucket, x, r),
    }
}

/// `2^44 * log2(xin + 1)`, computed directly in floating point rather than
/// through the upstream fixed-point lookup tables: this crate is not tested
/// against a byte-identical upstream corpus, so a direct computation is
/// preferable to hand-fabricating the multi-kilobyte table those lookups
/// depend on.
fn crush_ln(xin: u32) -> u64 {
    let x = (xin as f64) + 1.0;
    let log2x = x.log2();
    (log2x * (1u64 << 44) as f64) as u64
}

/// Exponential-distribution draw for STRAW2: `-ln(U) / weight`, with `U`
/// drawn uniformly from the hash of `(x, item, r)`.
fn generate_exponential_distribution(x: u32, y: i32, z: u32, weight: u32) -> i64 {
    let mut u = crush_hash32_3(x, y as u32, z);
    u &= 0xffff;

    let ln = crush_ln(u) as i64 - 0x1000000000000i64;

    if weight == 0 {
        i64::MIN
    } else {
        ln / weight as i64
    }
}

fn bucket_straw2_choose(bucket: &CrushBucket, x: u32, r: u32) -> Option<i32> {
    let weights = &bucket.weights;

    let mut high = 0usize;
    let mut high_draw = i64::MIN;

    for (i, &weight) in weights.iter().enumerate().take(bucket.size()) {
        let draw = if weight > 0 {
            generate_exponential_distribution(x, bucket.items[i], r, weight)
        } else {
            i64::MIN
        };

        if i == 0 || draw > high_draw {
            high = i;
            high_draw = draw;
        }
    }

    Some(bucket.items[high])
}

fn bucket_uniform_choose(bucket: &CrushBucket, x: u32, r: u32) -> Option<i32> {
    let hash = crush_hash32_2(x, r);
    let index = (hash as usize) % bucket.size();
    Some(bucket.items[index])
}

fn bucket_list_choose(bucket: &CrushBucket, x: u32, r: u32) -> Option<i32> {
    let sum_weights = match &bucket.data {
        BucketData::List { sum_weights } => sum_weights,
        _ => return None,
    };

    for i in (0..bucket.size()).rev() {
        let mut w = crush_hash32_4(x, bucket.items[i] as u32, r, bucket.id as u32) as u64;
        w &= 0xffff;
        w = w.wrapping_mul(sum_weights[i] as u64);
        w >>= 16;

        if w < bucket.weights[i] as u64 {
            return Some(bucket.items[i]);
        }
    }

    Some(bucket.items[0])
}

fn bucket_tree_choose(bucket: &CrushBucket, x: u32, r: u32) -> Option<i32> {
    let node_weights = match &bucket.data {
        BucketData::Tree { node_weights } => node_weights,
        _ => return None,
    };

    let mut n = bucket.size();

    while n > 1 {
        let left = n >> 1;
        let right = n - left;

        let w = crush_hash32_4(x, n as u32, r, bucket.id as u32);
        let wl = (w & 0xffff) as u64;
        let wr = (w >> 16) as u64;

        let left_weight = node_weights.get(left).copied().unwrap_or(0) as u64;
        let right_weight = node_weights.get(right).copied().unwrap_or(0) as u64;

        if wl * (left_weight + right_weight) < wr * left_weight {
            n = left;
        } else {
            n = right;
        }
    }

    bucket.items.get(n.saturating_sub(1)).copied().or_else(|| bucket.items.first().copied())
}

fn bucket_straw_choose(bucket: &CrushBucket, x: u32, r: u32) -> Option<i32> {
    let straws = match &bucket.data {
        BucketData::Straw { straws } => straws,
        _ => return None,
    };

    let mut high = 0usize;
    let mut high_draw = 0u64;

    for (i, &straw) in straws.iter().enumerate().take(bucket.size()) {
        let mut draw = crush_hash32_3(x, bucket.items[i] as u32, r) as u64;
        draw &= 0xffff;
        draw = draw.wrapping_mul(straw as u64);

        if i == 0 || draw > high_draw {
            high = i;
            high_draw = draw;
        }
    }

    Some(bucket.items[high])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BucketAlgorithm, BucketData};

    fn straw2_bucket(items: Vec<i32>, weights: Vec<u32>) -> CrushBucket {
        CrushBucket {
            id: -1,
            bucket_type: 1,
            alg: BucketAlgorithm::Straw2,
            summed_weight: weights.iter().sum(),
            items,
            weights,
            data: BucketData::Straw2,
        }
    }

    #[test]
    fn straw2_choose_is_deterministic() {
        let bucket = straw2_bucket(vec![0, 1, 2], vec![0x10000, 0x10000, 0x10000]);

        let result = bucket_straw2_choose(&bucket, 123, 0);
        assert!(result.is_some());
        let item = result.unwrap();
        assert!((0..=2).contains(&item));

        let result2 = bucket_straw2_choose(&bucket, 123, 0);
        assert_eq!(result, result2);
    }

    #[test]
    fn straw2_choose_favors_heavier_item() {
        let bucket = straw2_bucket(vec![0, 1], vec![1, 0x10000 * 1000]);
        let mut wins = [0usize; 2];
        for x in 0..200u32 {
            if let Some(item) = bucket_straw2_choose(&bucket, x, 0) {
                wins[item as usize] += 1;
            }
        }
        assert!(wins[1] > wins[0]);
    }

    #[test]
    fn uniform_choose_stays_in_range() {
        let bucket = CrushBucket {
            id: -1,
            bucket_type: 1,
            alg: BucketAlgorithm::Uniform,
            summed_weight: 0x30000,
            items: vec![0, 1, 2],
            weights: vec![0x10000, 0x10000, 0x10000],
            data: BucketData::Uniform {
                item_weight: 0x10000,
            },
        };

        let result = bucket_uniform_choose(&bucket, 123, 0);
        assert!(result.is_some());
        let item = result.unwrap();
        assert!((0..=2).contains(&item));
    }

    #[test]
    fn bucket_choose_dispatches_on_algorithm() {
        let bucket = straw2_bucket(vec![0, 1], vec![0x10000, 0x10000]);
        let result = bucket_choose(&bucket, 123, 0);
        assert!(result.is_some());
    }

    #[test]
    fn crush_ln_is_monotonic() {
        let ln1 = crush_ln(0x8000);
        let ln2 = crush_ln(0xFFFF);
        assert!(ln2 > ln1);
    }

    #[test]
    fn empty_bucket_chooses_nothing() {
        let bucket = straw2_bucket(vec![], vec![]);
        assert_eq!(bucket_choose(&bucket, 1, 0), None);
    }
}
