use thiserror::Error;

/// A 1-based source location, used to anchor lex/parse diagnostics to a
/// physical line and column of the original DSL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Error, Debug)]
pub enum CrushError {
    #[error("Invalid bucket ID: {0}")]
    InvalidBucketId(i32),

    #[error("Invalid rule ID: {0}")]
    InvalidRuleId(u32),

    #[error("Invalid bucket algorithm: {0}")]
    InvalidBucketAlgorithm(u8),

    #[error("Bucket not found: {0}")]
    BucketNotFound(i32),

    #[error("Rule not found: {0}")]
    RuleNotFound(u32),

    #[error("Invalid rule step operation: {0}")]
    InvalidRuleOp(u32),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("No valid OSDs found")]
    NoValidOsds,

    #[error("Invalid weight: {0}")]
    InvalidWeight(u32),

    /// A lexing or grammar failure, anchored to a location in the source text.
    #[error("{location}: error: parse error at '{fragment}'")]
    Parse {
        location: SourceLocation,
        fragment: String,
        line_text: String,
    },

    /// A failure discovered while cross-referencing and validating the
    /// syntax tree against the Map being built (duplicate names, unknown
    /// references, out-of-range values, and so on).
    #[error("semantic error: {0}")]
    Semantic(String),

    /// The requested output target already exists and `--clobber` wasn't
    /// given.
    #[error("output file already exists: {0}")]
    OutputExists(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CrushError {
    pub fn semantic(msg: impl Into<String>) -> Self {
        CrushError::Semantic(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CrushError>;
