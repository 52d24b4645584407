use std::collections::HashMap;

/// CRUSH bucket selection algorithms.
///
/// STRAW2 is not in the distilled grammar but is carried over from the
/// upstream placement system as the modern replacement for STRAW: same
/// wire shape, no precomputed straw table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BucketAlgorithm {
    Uniform = 1,
    List = 2,
    Tree = 3,
    Straw = 4,
    Straw2 = 5,
}

impl BucketAlgorithm {
    pub fn keyword(self) -> &'static str {
        match self {
            BucketAlgorithm::Uniform => "uniform",
            BucketAlgorithm::List => "list",
            BucketAlgorithm::Tree => "tree",
            BucketAlgorithm::Straw => "straw",
            BucketAlgorithm::Straw2 => "straw2",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "uniform" => Some(BucketAlgorithm::Uniform),
            "list" => Some(BucketAlgorithm::List),
            "tree" => Some(BucketAlgorithm::Tree),
            "straw" => Some(BucketAlgorithm::Straw),
            "straw2" => Some(BucketAlgorithm::Straw2),
            _ => None,
        }
    }
}

impl TryFrom<u8> for BucketAlgorithm {
    type Error = crate::error::CrushError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BucketAlgorithm::Uniform),
            2 => Ok(BucketAlgorithm::List),
            3 => Ok(BucketAlgorithm::Tree),
            4 => Ok(BucketAlgorithm::Straw),
            5 => Ok(BucketAlgorithm::Straw2),
            _ => Err(crate::error::CrushError::InvalidBucketAlgorithm(value)),
        }
    }
}

/// CRUSH rule types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RuleType {
    Replicated = 1,
    Raid4 = 2,
}

impl RuleType {
    pub fn keyword(self) -> &'static str {
        match self {
            RuleType::Replicated => "replicated",
            RuleType::Raid4 => "raid4",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "replicated" => Some(RuleType::Replicated),
            "raid4" => Some(RuleType::Raid4),
            _ => None,
        }
    }
}

impl TryFrom<u8> for RuleType {
    type Error = crate::error::CrushError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RuleType::Replicated),
            2 => Ok(RuleType::Raid4),
            _ => Err(crate::error::CrushError::Semantic(format!(
                "unknown rule type byte {value}"
            ))),
        }
    }
}

/// CRUSH rule step operations. Numeric values match the historical CRUSH
/// wire constants so a `crushtool`-compiled rule step is recognizable to
/// anyone who has read the upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RuleOp {
    Noop = 0,
    Take = 1,
    ChooseFirstN = 2,
    ChooseIndep = 3,
    Emit = 4,
    ChooseLeafFirstN = 6,
    ChooseLeafIndep = 7,
}

impl TryFrom<u32> for RuleOp {
    type Error = crate::error::CrushError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RuleOp::Noop),
            1 => Ok(RuleOp::Take),
            2 => Ok(RuleOp::ChooseFirstN),
            3 => Ok(RuleOp::ChooseIndep),
            4 => Ok(RuleOp::Emit),
            6 => Ok(RuleOp::ChooseLeafFirstN),
            7 => Ok(RuleOp::ChooseLeafIndep),
            _ => Err(crate::error::CrushError::InvalidRuleOp(value)),
        }
    }
}

/// A single step in a CRUSH rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrushRuleStep {
    pub op: RuleOp,
    pub arg1: i32,
    pub arg2: i32,
}

/// A CRUSH rule mapping a pool's PGs to a walk of the bucket hierarchy.
#[derive(Debug, Clone)]
pub struct CrushRule {
    pub rule_id: u32,
    pub pool: i32,
    pub rule_type: RuleType,
    pub min_size: u8,
    pub max_size: u8,
    pub steps: Vec<CrushRuleStep>,
}

impl CrushRule {
    /// §3 invariant: at least one TAKE precedes any CHOOSE*, and at least
    /// one EMIT appears somewhere in the steps.
    pub fn check_invariants(&self) -> crate::error::Result<()> {
        let mut taken = false;
        let mut emitted = false;
        for step in &self.steps {
            match step.op {
                RuleOp::Take => taken = true,
                RuleOp::ChooseFirstN | RuleOp::ChooseIndep => {
                    if !taken {
                        return Err(crate::error::CrushError::semantic(
                            "rule step `choose` before any `take`",
                        ));
                    }
                }
                RuleOp::ChooseLeafFirstN | RuleOp::ChooseLeafIndep => {
                    if !taken {
                        return Err(crate::error::CrushError::semantic(
                            "rule step `chooseleaf` before any `take`",
                        ));
                    }
                }
                RuleOp::Emit => emitted = true,
                RuleOp::Noop => {}
            }
        }
        if !taken {
            return Err(crate::error::CrushError::semantic(
                "rule has no `take` step",
            ));
        }
        if !emitted {
            return Err(crate::error::CrushError::semantic(
                "rule has no `emit` step",
            ));
        }
        Ok(())
    }
}

/// Algorithm-specific bucket trailing data (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketData {
    /// All children share `item_weight`.
    Uniform { item_weight: u32 },
    /// Cumulative per-position weight, walked newest-to-oldest.
    List { sum_weights: Vec<u32> },
    /// Implicit complete binary tree over `items`; `node_weights[i]` is the
    /// summed weight of the subtree rooted at node `i`.
    Tree { node_weights: Vec<u32> },
    /// Precomputed straw lengths, one per item.
    Straw { straws: Vec<u32> },
    /// No trailing data: the per-child weight array already suffices.
    Straw2,
}

/// A CRUSH bucket: an interior node aggregating devices or other buckets.
#[derive(Debug, Clone)]
pub struct CrushBucket {
    /// Bucket ID (negative; `slot = -1 - id`).
    pub id: i32,
    /// Hierarchy type level (> 0).
    pub bucket_type: i32,
    pub alg: BucketAlgorithm,
    /// Cached sum of `weights`.
    pub summed_weight: u32,
    /// Child item ids, positions significant for LIST and TREE.
    pub items: Vec<i32>,
    /// Parallel per-child fixed-point weights.
    pub weights: Vec<u32>,
    pub data: BucketData,
}

impl CrushBucket {
    pub fn size(&self) -> usize {
        self.items.len()
    }
}

/// A parsed/compiled device offload: 16.16 fixed point, `0` = fully in,
/// `0x10000` = fully out.
pub const OFFLOAD_SCALE: u32 = 0x10000;

/// Sentinel item id marking an empty positional slot in a bucket's
/// `items[]` (§4.2's "a child without explicit `pos`" materialization can
/// leave gaps before explicit positions are filled in). Matches upstream
/// CRUSH's `CRUSH_ITEM_NONE`: a reserved value no real device or bucket id
/// can ever take, since device ids are non-negative and bucket ids are
/// strictly negative.
pub const CRUSH_ITEM_NONE: i32 = i32::MAX;

/// Map-wide tunables governing the Placement Kernel's retry and descent
/// behavior (§3). Exposed in the DSL as an optional `tunables` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    pub choose_local_tries: u32,
    pub choose_local_fallback_tries: u32,
    pub choose_total_tries: u32,
    pub chooseleaf_descend_once: u32,
    pub chooseleaf_vary_r: u8,
    pub chooseleaf_stable: u8,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            choose_local_tries: 2,
            choose_local_fallback_tries: 5,
            choose_total_tries: 19,
            chooseleaf_descend_once: 0,
            chooseleaf_vary_r: 0,
            chooseleaf_stable: 0,
        }
    }
}

/// The compiled CRUSH map: devices, buckets, types, rules, and tunables.
#[derive(Debug, Clone)]
pub struct CrushMap {
    pub max_devices: i32,
    /// Buckets indexed by slot (`slot = -1 - id`); sparse.
    pub buckets: Vec<Option<CrushBucket>>,
    pub rules: Vec<Option<CrushRule>>,
    /// type level -> type name.
    pub type_names: HashMap<i32, String>,
    /// item id (device or bucket) -> name, shared namespace.
    pub names: HashMap<i32, String>,
    /// name -> item id, the inverse of `names`.
    pub ids: HashMap<String, i32>,
    pub rule_names: HashMap<u32, String>,
    /// device id -> 16.16 fixed-point offload fraction.
    pub device_offload: HashMap<i32, u32>,
    pub tunables: Tunables,
}

impl CrushMap {
    pub fn new() -> Self {
        CrushMap {
            max_devices: 0,
            buckets: Vec::new(),
            rules: Vec::new(),
            type_names: HashMap::new(),
            names: HashMap::new(),
            ids: HashMap::new(),
            rule_names: HashMap::new(),
            device_offload: HashMap::new(),
            tunables: Tunables::default(),
        }
    }

    pub fn max_buckets(&self) -> i32 {
        self.buckets.len() as i32
    }

    pub fn bucket_slot(id: i32) -> usize {
        (-1 - id) as usize
    }

    /// Get a bucket by its negative id.
    pub fn get_bucket(&self, id: i32) -> crate::error::Result<&CrushBucket> {
        if id >= 0 {
            return Err(crate::error::CrushError::InvalidBucketId(id));
        }
        let index = Self::bucket_slot(id);
        self.buckets
            .get(index)
            .and_then(|b| b.as_ref())
            .ok_or(crate::error::CrushError::BucketNotFound(id))
    }

    /// Get a rule by id.
    pub fn get_rule(&self, rule_id: u32) -> crate::error::Result<&CrushRule> {
        self.rules
            .get(rule_id as usize)
            .and_then(|r| r.as_ref())
            .ok_or(crate::error::CrushError::RuleNotFound(rule_id))
    }

    /// Every device in the map, ordered by id.
    pub fn devices(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.names.keys().copied().filter(|&id| id >= 0).collect();
        ids.sort_unstable();
        ids
    }

    /// Every populated bucket, ordered most-negative-id first (§4.6).
    pub fn buckets_in_id_order(&self) -> Vec<&CrushBucket> {
        let mut out: Vec<&CrushBucket> = self.buckets.iter().filter_map(|b| b.as_ref()).collect();
        out.sort_by_key(|b| b.id);
        out
    }

    pub fn offload(&self, device_id: i32) -> u32 {
        self.device_offload.get(&device_id).copied().unwrap_or(0)
    }

    pub fn name_of(&self, id: i32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.ids.get(name).copied()
    }

    pub fn type_level_of(&self, name: &str) -> Option<i32> {
        self.type_names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(level, _)| *level)
    }
}

impl Default for CrushMap {
    fn default() -> Self {
        Self::new()
    }
}
