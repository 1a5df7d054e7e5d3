//! FILENAME: core/pivot-layout/src/error.rs

use thiserror::Error;

use crate::hierarchy::Axis;

pub type Result<T> = std::result::Result<T, PivotError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PivotError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{axis} index {index} out of range (len {len})")]
    IndexOutOfRange { axis: Axis, index: usize, len: usize },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Node {node} cannot be drilled: {reason}")]
    InvalidDrillTarget { node: String, reason: String },

    #[error("Drill-down on {requested} conflicts with pending drill-down on {pending}")]
    DrillConflict { requested: String, pending: String },

    #[error("Unknown drill-down token: {0}")]
    UnknownDrillToken(u64),
}

/// Fatal configuration problems, reported before any tree is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Field {field} ({area}) is not a column of the data")]
    UnknownField { field: String, area: &'static str },

    #[error("Field {0} is placed more than once")]
    DuplicateField(String),

    #[error("Field id {0} is reserved")]
    ReservedField(String),

    #[error("Malformed strategy value table: {0}")]
    MalformedStrategy(String),

    #[error("Invalid derived value for {value_field}: {reason}")]
    InvalidDerivedValue { value_field: String, reason: String },

    #[error("Contradictory totals config: {0}")]
    ContradictoryTotals(String),
}

/// Non-fatal problems; the layout is still produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutWarning {
    #[error("Sort of {field} by {sort_by_field} ignored: field not present at this level")]
    SortResolution { field: String, sort_by_field: String },

    #[error("Dropped {count} drill-down rows that do not belong to {node}")]
    DroppedDrillRows { node: String, count: usize },
}
