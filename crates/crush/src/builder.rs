//! The Semantic Builder: turns a parsed [`crate::dsl::Program`] into a
//! finalized [`CrushMap`] (§4.2).
//!
//! Runs in two passes: a pre-scan that records every explicit bucket id so
//! auto-assignment never collides with one named later in the source, then
//! a walk that processes each top-level construct in source order and
//! dispatches on its kind.

use std::collections::{HashMap, HashSet};

use crate::dsl::ast::{BucketDecl, DeviceDecl, OffloadSpec, RuleDecl, StepDecl, TopLevel, TunablesDecl, TypeDecl};
use crate::dsl::Parser;
use crate::error::{CrushError, Result};
use crate::types::{
    BucketAlgorithm, BucketData, CrushBucket, CrushMap, CrushRule, CrushRuleStep, RuleOp, RuleType,
    CRUSH_ITEM_NONE, OFFLOAD_SCALE,
};

/// Compile DSL source text into a finalized [`CrushMap`].
pub fn compile(source: &str) -> Result<CrushMap> {
    let mut parser = Parser::new(source)?;
    let program = parser.parse_program()?;

    let mut used_ids: HashSet<i32> = HashSet::new();
    for item in &program.items {
        if let TopLevel::Bucket(b) = item {
            if let Some(id) = b.id {
                if id != 0 {
                    used_ids.insert(id as i32);
                }
            }
        }
    }

    let mut builder = Builder {
        map: CrushMap::new(),
        used_bucket_ids: used_ids,
        next_auto_id: -1,
    };

    for item in program.items {
        match item {
            TopLevel::Device(d) => builder.process_device(d)?,
            TopLevel::Type(t) => builder.process_type(t)?,
            TopLevel::Bucket(b) => builder.process_bucket(b)?,
            TopLevel::Rule(r) => builder.process_rule(r)?,
            TopLevel::Tunables(t) => builder.process_tunables(t)?,
        }
    }

    builder.map.finalize()?;
    Ok(builder.map)
}

struct Builder {
    map: CrushMap,
    used_bucket_ids: HashSet<i32>,
    next_auto_id: i32,
}

fn to_fixed(f: f64) -> Result<u32> {
    if !(0.0..=1.0).contains(&f) {
        return Err(CrushError::semantic(format!(
            "value {f} is outside the valid [0, 1] range"
        )));
    }
    Ok((f * OFFLOAD_SCALE as f64).round() as u32)
}

impl Builder {
    fn process_device(&mut self, decl: DeviceDecl) -> Result<()> {
        if self.map.ids.contains_key(&decl.name) {
            return Err(CrushError::semantic(format!(
                "device name '{}' is already in use",
                decl.name
            )));
        }
        let id = decl.id as i32;
        self.map.names.insert(id, decl.name.clone());
        self.map.ids.insert(decl.name, id);
        if id + 1 > self.map.max_devices {
            self.map.max_devices = id + 1;
        }

        if let Some(spec) = decl.offload {
            let fraction = match spec {
                OffloadSpec::Offload(f) => f,
                OffloadSpec::Load(f) => 1.0 - f,
                OffloadSpec::Down => 1.0,
            };
            let fixed = to_fixed(fraction)?;
            if fixed != 0 {
                self.map.device_offload.insert(id, fixed);
            }
        }
        Ok(())
    }

    fn process_type(&mut self, decl: TypeDecl) -> Result<()> {
        let level = decl.level as i32;
        if let Some(existing) = self.map.type_names.get(&level) {
            if existing != &decl.name {
                return Err(CrushError::semantic(format!(
                    "type level {level} already registered as '{existing}'"
                )));
            }
        }
        if let Some(existing_level) = self.map.type_level_of(&decl.name) {
            if existing_level != level {
                return Err(CrushError::semantic(format!(
                    "type name '{}' already registered at level {existing_level}",
                    decl.name
                )));
            }
        }
        self.map.type_names.insert(level, decl.name);
        Ok(())
    }

    fn alloc_bucket_id(&mut self, explicit: Option<i64>) -> i32 {
        if let Some(id) = explicit {
            if id != 0 {
                return id as i32;
            }
        }
        while self.used_bucket_ids.contains(&self.next_auto_id) {
            self.next_auto_id -= 1;
        }
        let id = self.next_auto_id;
        self.used_bucket_ids.insert(id);
        self.next_auto_id -= 1;
        id
    }

    fn ensure_bucket_slot(&mut self, id: i32) {
        let slot = CrushMap::bucket_slot(id);
        if slot >= self.map.buckets.len() {
            self.map.buckets.resize_with(slot + 1, || None);
        }
    }

    fn process_bucket(&mut self, decl: BucketDecl) -> Result<()> {
        let bucket_type = self.map.type_level_of(&decl.type_name).ok_or_else(|| {
            CrushError::semantic(format!("unknown type '{}'", decl.type_name))
        })?;
        if bucket_type == 0 {
            return Err(CrushError::semantic(format!(
                "bucket '{}' cannot use device-level type '{}'",
                decl.name, decl.type_name
            )));
        }
        if self.map.ids.contains_key(&decl.name) {
            return Err(CrushError::semantic(format!(
                "bucket name '{}' is already in use",
                decl.name
            )));
        }
        let alg = BucketAlgorithm::from_keyword(&decl.alg).ok_or_else(|| {
            CrushError::semantic(format!("unknown bucket algorithm '{}'", decl.alg))
        })?;

        let explicit_count = decl.items.len();
        let mut max_pos = None;
        let mut occupied: HashSet<usize> = HashSet::new();
        for item in &decl.items {
            if let Some(pos) = item.pos {
                let pos = pos as usize;
                if !occupied.insert(pos) {
                    return Err(CrushError::semantic(format!(
                        "bucket '{}' has two items at position {pos}",
                        decl.name
                    )));
                }
                max_pos = Some(max_pos.map_or(pos, |m: usize| m.max(pos)));
            }
        }
        let len = explicit_count.max(max_pos.map_or(0, |m| m + 1));

        let mut items: Vec<Option<i32>> = vec![None; len];
        let mut weights: Vec<u32> = vec![0; len];
        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut next_free = 0usize;

        for item in &decl.items {
            if !seen_names.insert(item.name.as_str()) {
                return Err(CrushError::semantic(format!(
                    "bucket '{}' references item '{}' more than once",
                    decl.name, item.name
                )));
            }
            let child_id = self
                .map
                .id_of(&item.name)
                .ok_or_else(|| CrushError::semantic(format!("unknown item '{}'", item.name)))?;

            let default_weight = if child_id >= 0 {
                OFFLOAD_SCALE
            } else {
                self.map.get_bucket(child_id)?.summed_weight
            };
            let weight = match item.weight {
                Some(w) => to_fixed(w.min(f64::MAX))
                    .unwrap_or_else(|_| (w * OFFLOAD_SCALE as f64).round() as u32),
                None => default_weight,
            };

            let slot = match item.pos {
                Some(pos) => pos as usize,
                None => {
                    while occupied.contains(&next_free) {
                        next_free += 1;
                    }
                    occupied.insert(next_free);
                    next_free
                }
            };

            items[slot] = Some(child_id);
            weights[slot] = weight;
        }

        // An unfilled slot is a positional gap, not item id 0 (which is a
        // valid device id): use the reserved sentinel so the decompiler can
        // tell a real item from a hole (§4.6).
        let items: Vec<i32> = items.into_iter().map(|i| i.unwrap_or(CRUSH_ITEM_NONE)).collect();

        let id = self.alloc_bucket_id(decl.id);
        self.ensure_bucket_slot(id);

        let summed_weight: u64 = weights.iter().map(|&w| w as u64).sum();
        let bucket = CrushBucket {
            id,
            bucket_type,
            alg,
            summed_weight: summed_weight.min(u32::MAX as u64) as u32,
            items,
            weights,
            data: BucketData::Straw2, // placeholder; finalize() recomputes per-alg data
        };

        self.map.names.insert(id, decl.name.clone());
        self.map.ids.insert(decl.name, id);
        self.map.buckets[CrushMap::bucket_slot(id)] = Some(bucket);

        Ok(())
    }

    fn process_rule(&mut self, decl: RuleDecl) -> Result<()> {
        let rule_type = RuleType::from_keyword(&decl.rule_type).ok_or_else(|| {
            CrushError::semantic(format!("unknown rule type '{}'", decl.rule_type))
        })?;

        if let Some(name) = &decl.name {
            if self.map.rule_names.values().any(|n| n == name) {
                return Err(CrushError::semantic(format!(
                    "rule name '{name}' is already in use"
                )));
            }
        }

        let mut steps = Vec::with_capacity(decl.steps.len());
        for step in &decl.steps {
            steps.push(self.translate_step(step)?);
        }

        let rule_id = self.map.rules.len() as u32;
        let rule = CrushRule {
            rule_id,
            pool: decl.pool as i32,
            rule_type,
            min_size: decl.min_size as u8,
            max_size: decl.max_size as u8,
            steps,
        };
        rule.check_invariants()?;

        if let Some(name) = decl.name {
            self.map.rule_names.insert(rule_id, name);
        }
        self.map.rules.push(Some(rule));
        Ok(())
    }

    fn translate_step(&self, step: &StepDecl) -> Result<CrushRuleStep> {
        match step {
            StepDecl::Take(item_name) => {
                let id = self
                    .map
                    .id_of(item_name)
                    .ok_or_else(|| CrushError::semantic(format!("unknown item '{item_name}'")))?;
                Ok(CrushRuleStep {
                    op: RuleOp::Take,
                    arg1: id,
                    arg2: 0,
                })
            }
            StepDecl::Choose { indep, n, type_name } => {
                let level = self.map.type_level_of(type_name).ok_or_else(|| {
                    CrushError::semantic(format!("unknown type '{type_name}'"))
                })?;
                Ok(CrushRuleStep {
                    op: if *indep {
                        RuleOp::ChooseIndep
                    } else {
                        RuleOp::ChooseFirstN
                    },
                    arg1: *n as i32,
                    arg2: level,
                })
            }
            StepDecl::ChooseLeaf { indep, n, type_name } => {
                let level = self.map.type_level_of(type_name).ok_or_else(|| {
                    CrushError::semantic(format!("unknown type '{type_name}'"))
                })?;
                Ok(CrushRuleStep {
                    op: if *indep {
                        RuleOp::ChooseLeafIndep
                    } else {
                        RuleOp::ChooseLeafFirstN
                    },
                    arg1: *n as i32,
                    arg2: level,
                })
            }
            StepDecl::Emit => Ok(CrushRuleStep {
                op: RuleOp::Emit,
                arg1: 0,
                arg2: 0,
            }),
            StepDecl::Noop => Ok(CrushRuleStep {
                op: RuleOp::Noop,
                arg1: 0,
                arg2: 0,
            }),
        }
    }

    fn process_tunables(&mut self, decl: TunablesDecl) -> Result<()> {
        for (key, value) in decl.entries {
            match key.as_str() {
                "choose_local_tries" => self.map.tunables.choose_local_tries = value as u32,
                "choose_local_fallback_tries" => {
                    self.map.tunables.choose_local_fallback_tries = value as u32
                }
                "choose_total_tries" => self.map.tunables.choose_total_tries = value as u32,
                "chooseleaf_descend_once" => {
                    self.map.tunables.chooseleaf_descend_once = value as u32
                }
                "chooseleaf_vary_r" => self.map.tunables.chooseleaf_vary_r = value as u8,
                "chooseleaf_stable" => self.map.tunables.chooseleaf_stable = value as u8,
                other => {
                    return Err(CrushError::semantic(format!("unknown tunable key '{other}'")))
                }
            }
        }
        Ok(())
    }
}

/// Unused by the builder directly but kept alongside it: a convenience for
/// callers that already have a `HashMap` of device weights and want the
/// default (fully-in) table instead.
#[allow(dead_code)]
fn full_device_weights(max_devices: i32) -> HashMap<i32, u32> {
    (0..max_devices).map(|id| (id, OFFLOAD_SCALE)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn compiles_a_small_hierarchy() {
        let map = compile(SAMPLE).unwrap();
        assert_eq!(map.max_devices, 3);
        assert_eq!(map.get_bucket(-2).unwrap().items, vec![0, 1]);
        assert_eq!(map.get_bucket(-1).unwrap().items.len(), 2);
        assert_eq!(map.rules.len(), 1);
        assert_eq!(map.rule_names.get(&0).map(String::as_str), Some("data"));
    }

    #[test]
    fn rejects_forward_referenced_items() {
        let src = "type 0 osd\ntype 1 host\nhost h0 { id -1 alg straw2 item osd0 }\ndevice 0 osd0\n";
        let err = compile(src).unwrap_err();
        assert!(matches!(err, CrushError::Semantic(_)));
    }

    #[test]
    fn rejects_unknown_bucket_algorithm() {
        let src = "type 0 osd\ntype 1 host\ndevice 0 osd0\nhost h0 { id -1 alg bogus item osd0 }\n";
        let err = compile(src).unwrap_err();
        assert!(matches!(err, CrushError::Semantic(_)));
    }

    #[test]
    fn rejects_unknown_tunable_key() {
        let src = "tunables { not_a_real_key 1 }\n";
        let err = compile(src).unwrap_err();
        assert!(matches!(err, CrushError::Semantic(_)));
    }

    #[test]
    fn auto_assigns_negative_bucket_ids_avoiding_explicit_ones() {
        let src = "\
type 0 osd
type 1 host
device 0 osd0
device 1 osd1
host h0 { id -3 alg straw2 item osd0 }
host h1 { alg straw2 item osd1 }
";
        let map = compile(src).unwrap();
        assert!(map.get_bucket(-3).is_ok());
        // auto-assigned id must not collide with the explicit -3
        let auto_id = map.id_of("h1").unwrap();
        assert_ne!(auto_id, -3);
    }

    #[test]
    fn rejects_down_device_used_with_bad_fraction() {
        let src = "device 0 osd0 offload 1.5\n";
        let err = compile(src).unwrap_err();
        assert!(matches!(err, CrushError::Semantic(_)));
    }
}
