//! FILENAME: core/pivot-layout/src/engine.rs
//! Layout Engine - turns a configuration and flat rows into a LayoutResult.
//!
//! This module takes a PivotLayoutConfig (configuration) and a DataSet (data)
//! and produces a LayoutResult (both header trees, ready for cell queries).
//!
//! Algorithm:
//! 1. Resolve fields: fold the measures into one dimension, validate names
//! 2. Build the row and column trees by recursive group-by, sorting each level
//! 3. Inject grand totals and subtotals
//! 4. Project the visible leaves and assign header geometry

use crate::builder::HierarchyBuilder;
use crate::data::DataSet;
use crate::definition::PivotLayoutConfig;
use crate::error::{LayoutWarning, Result};
use crate::fields::{resolve_fields, ResolvedFields};
use crate::hierarchy::{Axis, Hierarchy};
use crate::layout::LayoutResult;
use crate::totals::{validate_totals, TotalsInjector};
use crate::view::{DefaultSizing, SizingPolicy};

// ============================================================================
// LAYOUT CALCULATOR
// ============================================================================

/// Runs one build. The configuration and data move into the result.
pub struct LayoutCalculator {
    config: PivotLayoutConfig,
    data: DataSet,
    sizing: Box<dyn SizingPolicy>,
}

impl LayoutCalculator {
    pub fn new(config: PivotLayoutConfig, data: DataSet) -> Self {
        LayoutCalculator {
            config,
            data,
            sizing: Box::new(DefaultSizing::default()),
        }
    }

    pub fn with_sizing(mut self, sizing: Box<dyn SizingPolicy>) -> Self {
        self.sizing = sizing;
        self
    }

    /// Executes the full build. Configuration errors abort before any tree
    /// exists.
    pub fn calculate(self) -> Result<LayoutResult> {
        let LayoutCalculator { config, data, sizing } = self;

        // Step 1: Resolve and validate fields
        let resolved = resolve_fields(&config, &data)?;
        validate_totals(&config, &resolved)?;

        // Step 2: Build both axis trees
        let mut warnings = Vec::new();
        let mut rows = build_axis(Axis::Row, &config, &resolved, &data, &mut warnings);
        let mut cols = build_axis(Axis::Col, &config, &resolved, &data, &mut warnings);

        // Step 3: Totals
        TotalsInjector::new(Axis::Row, &config, &resolved).inject(&mut rows, &data);
        TotalsInjector::new(Axis::Col, &config, &resolved).inject(&mut cols, &data);

        // Step 4: Projection and geometry happen when the result is assembled
        let result = LayoutResult::new(config, resolved, rows, cols, data, sizing, warnings);
        log::debug!(
            "layout built: {} row leaves x {} column leaves",
            result.row_count(),
            result.col_count()
        );
        Ok(result)
    }
}

fn build_axis(
    axis: Axis,
    config: &PivotLayoutConfig,
    resolved: &ResolvedFields,
    data: &DataSet,
    warnings: &mut Vec<LayoutWarning>,
) -> Hierarchy {
    let mut builder = HierarchyBuilder::new(axis, config, resolved, data);
    let hierarchy = builder.build();
    for warning in builder.take_warnings() {
        if !warnings.contains(&warning) {
            warnings.push(warning);
        }
    }
    hierarchy
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Builds a layout with the default cell sizes.
/// This is the main entry point for the layout engine.
pub fn build_layout(config: PivotLayoutConfig, data: DataSet) -> Result<LayoutResult> {
    LayoutCalculator::new(config, data).calculate()
}

/// Builds a layout measuring header cells with `sizing`.
pub fn build_layout_with(
    config: PivotLayoutConfig,
    data: DataSet,
    sizing: Box<dyn SizingPolicy>,
) -> Result<LayoutResult> {
    LayoutCalculator::new(config, data).with_sizing(sizing).calculate()
}
