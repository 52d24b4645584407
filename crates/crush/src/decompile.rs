//! Pretty-printing a finalized [`CrushMap`] back to DSL text (§4.6).
//!
//! The only contract that matters here is `compile(decompile(m)) == encode(m)`:
//! the emitted text need not look exactly like whatever a human originally
//! wrote, but recompiling it must reproduce the same binary map. That's why
//! every item is always given an explicit `weight` (the Builder's "default
//! to the referenced item's own weight" rule only has to agree with the
//! decompiled text if we never rely on it), and why bucket ids are always
//! explicit (skips the auto-assignment path entirely).

use std::fmt::Write as _;

use crate::error::{CrushError, Result};
use crate::types::{BucketAlgorithm, CrushMap, RuleOp, Tunables, CRUSH_ITEM_NONE, OFFLOAD_SCALE};

fn format_fixed(v: u32) -> String {
    format!("{:.6}", v as f64 / OFFLOAD_SCALE as f64)
}

fn name_of(map: &CrushMap, id: i32) -> Result<&str> {
    map.name_of(id)
        .ok_or_else(|| CrushError::semantic(format!("item id {id} has no name")))
}

fn type_name_of(map: &CrushMap, level: i32) -> Result<&str> {
    map.type_names
        .get(&level)
        .map(String::as_str)
        .ok_or_else(|| CrushError::semantic(format!("type level {level} has no name")))
}

/// Emit a DSL program equivalent to `map`: recompiling it reproduces the
/// same binary map byte-for-byte (§4.6).
pub fn decompile(map: &CrushMap) -> Result<String> {
    let mut out = String::new();

    let mut devices: Vec<i32> = map.names.keys().copied().filter(|&id| id >= 0).collect();
    devices.sort_unstable();
    for id in devices {
        let name = name_of(map, id)?;
        let offload = map.offload(id);
        write!(out, "device {id} {name}").unwrap();
        if offload == OFFLOAD_SCALE {
            out.push_str(" down");
        } else if offload != 0 {
            write!(out, " offload {}", format_fixed(offload)).unwrap();
        }
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }

    let mut levels: Vec<i32> = map.type_names.keys().copied().collect();
    levels.sort_unstable();
    for level in &levels {
        out.push_str(&format!("type {level} {}\n", map.type_names[level]));
    }
    if !levels.is_empty() {
        out.push('\n');
    }

    for bucket in map.buckets_in_id_order() {
        let name = name_of(map, bucket.id)?;
        let type_name = type_name_of(map, bucket.bucket_type)?;
        writeln!(out, "{type_name} {name} {{").unwrap();
        writeln!(out, "  id {}", bucket.id).unwrap();
        writeln!(out, "  alg {}", bucket.alg.keyword()).unwrap();

        // Positions matter structurally for UNIFORM and TREE (always
        // emitted); for LIST/STRAW/STRAW2 only once a hole has been seen
        // do later items need an explicit `pos` to land back in the same
        // slot on recompile.
        let always_pos = matches!(bucket.alg, BucketAlgorithm::Uniform | BucketAlgorithm::Tree);
        let mut seen_hole = false;
        for (i, (&item, &weight)) in bucket.items.iter().zip(&bucket.weights).enumerate() {
            if item == CRUSH_ITEM_NONE {
                // A filler slot left by the Builder's `items[]`
                // materialization (§4.2), not a real item: skip it, but
                // remember that later items must carry an explicit `pos`
                // to keep their slot.
                seen_hole = true;
                continue;
            }
            let item_name = name_of(map, item)?;
            write!(out, "  item {item_name} weight {}", format_fixed(weight)).unwrap();
            if always_pos || seen_hole {
                write!(out, " pos {i}").unwrap();
            }
            out.push('\n');
        }
        out.push_str("}\n\n");
    }

    for rule in map.rules.iter().flatten() {
        let header = match map.rule_names.get(&rule.rule_id) {
            Some(name) => format!("rule {name} {{"),
            None => "rule {".to_string(),
        };
        out.push_str(&header);
        out.push('\n');
        writeln!(out, "  pool {}", rule.pool).unwrap();
        writeln!(out, "  type {}", rule.rule_type.keyword()).unwrap();
        writeln!(out, "  min_size {}", rule.min_size).unwrap();
        writeln!(out, "  max_size {}", rule.max_size).unwrap();
        for step in &rule.steps {
            match step.op {
                RuleOp::Take => {
                    let name = name_of(map, step.arg1)?;
                    writeln!(out, "  step take {name}").unwrap();
                }
                RuleOp::ChooseFirstN | RuleOp::ChooseIndep => {
                    let mode = if step.op == RuleOp::ChooseIndep { "indep" } else { "firstn" };
                    let type_name = type_name_of(map, step.arg2)?;
                    writeln!(out, "  step choose {mode} {} type {type_name}", step.arg1).unwrap();
                }
                RuleOp::ChooseLeafFirstN | RuleOp::ChooseLeafIndep => {
                    let mode = if step.op == RuleOp::ChooseLeafIndep { "indep" } else { "firstn" };
                    let type_name = type_name_of(map, step.arg2)?;
                    writeln!(out, "  step chooseleaf {mode} {} type {type_name}", step.arg1)
                        .unwrap();
                }
                RuleOp::Emit => writeln!(out, "  step emit").unwrap(),
                RuleOp::Noop => writeln!(out, "  step noop").unwrap(),
            }
        }
        out.push_str("}\n\n");
    }

    let default_tunables = Tunables::default();
    let t = &map.tunables;
    if *t != default_tunables {
        out.push_str("tunables {\n");
        if t.choose_local_tries != default_tunables.choose_local_tries {
            writeln!(out, "  choose_local_tries {}", t.choose_local_tries).unwrap();
        }
        if t.choose_local_fallback_tries != default_tunables.choose_local_fallback_tries {
            writeln!(
                out,
                "  choose_local_fallback_tries {}",
                t.choose_local_fallback_tries
            )
            .unwrap();
        }
        if t.choose_total_tries != default_tunables.choose_total_tries {
            writeln!(out, "  choose_total_tries {}", t.choose_total_tries).unwrap();
        }
        if t.chooseleaf_descend_once != default_tunables.chooseleaf_descend_once {
            writeln!(out, "  chooseleaf_descend_once {}", t.chooseleaf_descend_once).unwrap();
        }
        if t.chooseleaf_vary_r != default_tunables.chooseleaf_vary_r {
            writeln!(out, "  chooseleaf_vary_r {}", t.chooseleaf_vary_r).unwrap();
        }
        if t.chooseleaf_stable != default_tunables.chooseleaf_stable {
            writeln!(out, "  chooseleaf_stable {}", t.chooseleaf_stable).unwrap();
        }
        out.push_str("}\n");
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::compile;
    use crate::encode::encode_map;

    const SAMPLE: &str = "\
device 0 osd0
device 1 osd1
device 2 osd2
type 0 osd
type 1 host
type 2 root
host h0 {
  id -2
  alg straw2
  item osd0
  item osd1
}
root r0 {
  id -1
  alg straw2
  item h0
  item osd2
}
rule data {
  pool 0
  type replicated
  min_size 1
  max_size 10
  step take r0
  step chooseleaf firstn 0 type osd
  step emit
}
";

    #[test]
    fn decompile_then_recompile_round_trips_bytes() {
        let map = compile(SAMPLE).unwrap();
        let text = decompile(&map).unwrap();
        let recompiled = compile(&text).unwrap();

        assert_eq!(encode_map(&map), encode_map(&recompiled));
    }

    #[test]
    fn decompile_emits_offload_and_down() {
        let src = "\
device 0 osd0 offload 0.250
device 1 osd1 down
type 0 osd
";
        let map = compile(src).unwrap();
        let text = decompile(&map).unwrap();
        assert!(text.contains("offload 0.250000"));
        assert!(text.contains("device 1 osd1 down"));
    }

    #[test]
    fn decompile_preserves_explicit_bucket_id() {
        let map = compile(SAMPLE).unwrap();
        let text = decompile(&map).unwrap();
        assert!(text.contains("id -2"));
        assert!(text.contains("id -1"));
    }

    #[test]
    fn decompile_round_trips_tunables() {
        let src = "tunables { chooseleaf_vary_r 1 }\n";
        let map = compile(src).unwrap();
        let text = decompile(&map).unwrap();
        assert!(text.contains("chooseleaf_vary_r 1"));

        let recompiled = compile(&text).unwrap();
        assert_eq!(encode_map(&map), encode_map(&recompiled));
    }

    #[test]
    fn decompile_omits_default_tunables_block() {
        let map = compile(SAMPLE).unwrap();
        let text = decompile(&map).unwrap();
        assert!(!text.contains("tunables"));
    }

    #[test]
    fn decompile_round_trips_rule_name_and_step_tokens() {
        let map = compile(SAMPLE).unwrap();
        let text = decompile(&map).unwrap();
        assert!(text.contains("rule data {"));
        assert!(text.contains("step chooseleaf firstn 0 type osd"));
    }

    #[test]
    fn decompile_preserves_position_holes() {
        let src = "\
device 0 osd0
device 1 osd1
device 2 osd2
device 3 osd3
type 0 osd
type 1 host
host h0 {
  id -1
  alg straw
  item osd0 pos 0
  item osd1 pos 1
  item osd2 weight 0 pos 2
  item osd3 pos 3
}
";
        let map = compile(src).unwrap();
        let text = decompile(&map).unwrap();
        let recompiled = compile(&text).unwrap();
        assert_eq!(encode_map(&map), encode_map(&recompiled));
    }

    #[test]
    fn decompile_does_not_confuse_position_hole_with_device_zero() {
        // A gap at pos 1/2 must decompile without inventing a spurious
        // `item osd0` reference, since device id 0 is a real device here.
        let src = "\
device 0 osd0
device 1 osd1
type 0 osd
type 1 host
host h0 {
  id -1
  alg straw
  item osd0 pos 0
  item osd1 pos 3
}
";
        let map = compile(src).unwrap();
        let text = decompile(&map).unwrap();
        assert_eq!(text.matches("item osd0").count(), 1);

        let recompiled = compile(&text).unwrap();
        assert_eq!(encode_map(&map), encode_map(&recompiled));
    }
}
