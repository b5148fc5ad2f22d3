use std::time::Duration;
use thiserror::Error;

/// A listing source could not produce its symbols. The source contributes
/// nothing to the universe; the scan goes on.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing column '{0}'")]
    MissingColumn(String),
}

/// A whole retrieval lot is unusable. Every symbol in it is skipped.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Batch rejected by upstream: {0}")]
    Rejected(String),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Retrieval task failed: {0}")]
    TaskFailed(String),
}

/// One symbol's series cannot be evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymbolError {
    #[error("Symbol absent from batch response")]
    Absent,

    #[error("No complete bars")]
    Empty,

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("Bar at index {index} is not after its predecessor")]
    OutOfOrder { index: usize },

    #[error("Missing bar before index {index}")]
    Gap { index: usize },
}

/// Why the technical cascade turned a symbol down.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Insufficient history: {len} bars, need {required}")]
    InsufficientHistory { len: usize, required: usize },

    #[error("Last close {0} outside price band")]
    PriceOutOfBand(f64),

    #[error("Last volume {0} below liquidity floor")]
    Illiquid(f64),

    #[error("Base range undefined")]
    BaseUndefined,

    #[error("Base range {0:.1}% too wide")]
    BaseTooWide(f64),

    #[error("No fresh moving-average crossover")]
    NoCrossover,

    #[error("Volume ratio undefined")]
    VolumeRatioUndefined,
}

impl Rejection {
    /// Stable key used in scan statistics.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InsufficientHistory { .. } => "insufficient_history",
            Rejection::PriceOutOfBand(_) => "price_out_of_band",
            Rejection::Illiquid(_) => "illiquid",
            Rejection::BaseUndefined => "base_undefined",
            Rejection::BaseTooWide(_) => "base_too_wide",
            Rejection::NoCrossover => "no_crossover",
            Rejection::VolumeRatioUndefined => "volume_ratio_undefined",
        }
    }
}

/// The scan parameters are inconsistent; raised before any work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Could not parse {var}='{value}'")]
    Unparsable { var: String, value: String },
}
