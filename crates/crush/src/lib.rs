//! CRUSH map compiler/decompiler library.
//!
//! Pipeline (compile): DSL source -> [`dsl`] token stream and syntax tree ->
//! [`builder`] populates a [`types::CrushMap`] -> [`types::CrushMap::finalize`]
//! computes derived state -> [`encode`] serializes to bytes.
//!
//! Pipeline (decompile): bytes -> [`decode`] -> [`decompile`] emits DSL text.
//!
//! [`mapper`] and [`placement`] implement the placement kernel the compiled
//! map's on-disk shape must support; [`bucket`] and [`hash`] are its
//! per-algorithm and pseudo-random building blocks.

pub mod bucket;
pub mod builder;
pub mod decode;
pub mod decompile;
pub mod dsl;
pub mod encode;
pub mod error;
pub mod finalize;
pub mod hash;
pub mod mapper;
pub mod placement;
pub mod types;

pub use builder::compile;
pub use decompile::decompile;
pub use encode::encode_map;
pub use error::{CrushError, Result};
pub use placement::{full_weights, place};
pub use types::{
    BucketAlgorithm, BucketData, CrushBucket, CrushMap, CrushRule, CrushRuleStep, RuleOp, RuleType,
    Tunables,
};
