//! Typed syntax tree for the CRUSH DSL (§4.1). Each node kind matches one
//! of the five top-level constructs the parser recognizes.

#[derive(Debug, Clone, PartialEq)]
pub enum OffloadSpec {
    Offload(f64),
    Load(f64),
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDecl {
    pub id: i64,
    pub name: String,
    pub offload: Option<OffloadSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub level: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDecl {
    pub name: String,
    pub weight: Option<f64>,
    pub pos: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketDecl {
    pub type_name: String,
    pub name: String,
    pub id: Option<i64>,
    pub alg: String,
    pub items: Vec<ItemDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepDecl {
    Take(String),
    Choose { indep: bool, n: i64, type_name: String },
    ChooseLeaf { indep: bool, n: i64, type_name: String },
    Emit,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecl {
    pub name: Option<String>,
    pub pool: i64,
    pub rule_type: String,
    pub min_size: i64,
    pub max_size: i64,
    pub steps: Vec<StepDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TunablesDecl {
    pub entries: Vec<(String, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    Device(DeviceDecl),
    Type(TypeDecl),
    Bucket(BucketDecl),
    Rule(RuleDecl),
    Tunables(TunablesDecl),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<TopLevel>,
}
