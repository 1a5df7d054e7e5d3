//! FILENAME: core/pivot-layout/src/lib.rs
//! Pivot hierarchy and layout engine.
//!
//! This crate turns flat records plus a field configuration into the two
//! header trees of a pivot table and answers per-cell data queries against
//! them. Rendering is left to the caller.
//!
//! Layers:
//! - `definition`: Serializable configuration (what the layout IS)
//! - `data`: Flat rows, queries and aggregation
//! - `fields`, `sort`, `builder`, `totals`: Tree construction (HOW we build)
//! - `hierarchy`: The arena-backed axis trees
//! - `layout`, `view`: Projection, geometry and cell lookups (WHAT we display)
//! - `drill`: Drill-down on row leaves
//! - `engine`: Entry points

pub mod builder;
pub mod data;
pub mod definition;
pub mod drill;
pub mod engine;
pub mod error;
pub mod fields;
pub mod hierarchy;
pub mod layout;
pub mod sort;
pub mod totals;
pub mod view;

pub use data::{DataRow, DataSet, DataSourceId, DataValue, OrderedFloat, Query};
pub use definition::*;
pub use drill::{DrillDownManager, DrillOutcome, DrillToken};
pub use engine::{build_layout, build_layout_with, LayoutCalculator};
pub use error::{ConfigError, LayoutWarning, PivotError, Result};
pub use fields::{resolve_fields, ResolvedFields};
pub use hierarchy::{Axis, Hierarchy, Node, NodeKey};
pub use layout::{LayoutResult, LayoutResultAssembler};
pub use view::{CellSize, DefaultSizing, SizingPolicy, ViewMeta};
