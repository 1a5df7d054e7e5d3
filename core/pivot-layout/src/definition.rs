//! FILENAME: core/pivot-layout/src/definition.rs
//! Pivot Layout Definition - The serializable configuration.
//!
//! This module contains all the types needed to DESCRIBE a pivot layout.
//! These structures are designed to be:
//! - Serializable (for persisting sheet state on the caller side)
//! - Passed by value into every build call
//! - Immutable snapshots of user intent

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Reserved field id of the synthetic measure dimension.
pub const EXTRA_FIELD: &str = "$$extra$$";

/// Separator joining ancestor values into a node id.
pub const ID_SEPARATOR: &str = "[&]";

/// Id of every hierarchy root.
pub const ROOT_ID: &str = "root";

/// Id segment of a grand total node.
pub const TOTAL_VALUE: &str = "$$total$$";

/// Id segment of a subtotal node.
pub const SUBTOTAL_VALUE: &str = "$$subtotal$$";

pub const DEFAULT_TOTAL_LABEL: &str = "grand total";
pub const DEFAULT_SUBTOTAL_LABEL: &str = "subtotal";

/// Node id → collapsed flag, supplied by the caller.
pub type CollapseState = FxHashMap<String, bool>;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Aggregation used by totals and multi-row cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    #[serde(rename = "SUM")]
    Sum,
    #[serde(rename = "AVG")]
    Avg,
    #[serde(rename = "MIN")]
    Min,
    #[serde(rename = "MAX")]
    Max,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::Sum
    }
}

// ============================================================================
// FIELD DEFINITIONS
// ============================================================================

/// Wide-format measures: every data row already carries one column per
/// entry of `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyValue {
    /// Value columns, in display order.
    pub fields: Vec<String>,

    /// Per-measure annotations.
    #[serde(default)]
    pub extra: Vec<StrategyExtra>,
}

/// Annotation attached to one measure of a strategy table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyExtra {
    /// The measure this entry describes.
    pub key: String,
    /// Start the measure node collapsed.
    #[serde(default)]
    pub collapse: bool,
    #[serde(default)]
    pub remark: String,
}

/// How the measures of the pivot are declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureSpec {
    /// Plain list of value fields.
    List(Vec<String>),
    /// Strategy value table.
    Strategy(StrategyValue),
}

impl Default for MeasureSpec {
    fn default() -> Self {
        MeasureSpec::List(Vec::new())
    }
}

/// Derived metrics attached to a value field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedValue {
    /// The value field these metrics belong to.
    pub value_field: String,
    /// All derived metrics of `value_field`.
    #[serde(default)]
    pub derived_value_field: Vec<String>,
    /// Derived metrics displayed as measures of their own.
    #[serde(default)]
    pub display_derived_value_field: Vec<String>,
}

/// The field specification: which fields go where.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fields {
    /// Fields placed in the row area (ordered from outer to inner).
    #[serde(default)]
    pub rows: Vec<String>,

    /// Fields placed in the column area (ordered from outer to inner).
    #[serde(default)]
    pub columns: Vec<String>,

    /// Measures.
    #[serde(default)]
    pub values: MeasureSpec,

    #[serde(default)]
    pub derived_values: Vec<DerivedValue>,
}

/// Display metadata for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub field: String,

    /// Display name (used as the label of measure nodes).
    #[serde(default)]
    pub name: Option<String>,

    /// Aggregation used when a cell is backed by several rows.
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
}

impl Meta {
    pub fn new(field: impl Into<String>) -> Self {
        Meta {
            field: field.into(),
            name: None,
            aggregation: None,
        }
    }
}

// ============================================================================
// TOTALS
// ============================================================================

/// Totals policy for one axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Total {
    /// Show the grand total node.
    pub show_grand_totals: bool,

    /// Show subtotal nodes for `sub_totals_dimensions`.
    pub show_sub_totals: bool,

    /// Aggregation of the grand total.
    pub aggregation: Aggregation,

    /// Aggregation of subtotals.
    pub aggregation_sub: Aggregation,

    /// Fields whose nodes get a subtotal child.
    pub sub_totals_dimensions: Vec<String>,

    /// Grand total placed first instead of last.
    pub reverse_layout: bool,

    /// Subtotals placed first instead of last.
    pub reverse_sub_layout: bool,

    /// Grand total label (defaults to "grand total").
    pub label: Option<String>,

    /// Subtotal label (defaults to "subtotal").
    pub sub_label: Option<String>,
}

impl Total {
    pub fn grand_total_label(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_TOTAL_LABEL)
    }

    pub fn subtotal_label(&self) -> &str {
        self.sub_label.as_deref().unwrap_or(DEFAULT_SUBTOTAL_LABEL)
    }
}

/// Totals policy keyed by the axis whose hierarchy receives the nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(default)]
    pub row: Option<Total>,
    #[serde(default)]
    pub col: Option<Total>,
}

// ============================================================================
// SORTING
// ============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMethod {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl Default for SortMethod {
    fn default() -> Self {
        SortMethod::Asc
    }
}

/// One sort rule for the siblings of a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortParam {
    /// Field whose siblings are ordered.
    pub sort_field_id: String,

    #[serde(default)]
    pub sort_method: Option<SortMethod>,

    /// Fixed custom order.
    #[serde(default)]
    pub sort_by: Option<Vec<String>>,

    /// Order by the values of another field.
    #[serde(default)]
    pub sort_by_field: Option<String>,

    /// Narrows the rows that determine a `sort_by_field` order.
    #[serde(default)]
    pub query: Option<FxHashMap<String, String>>,
}

impl SortParam {
    pub fn method(field: impl Into<String>, method: SortMethod) -> Self {
        SortParam {
            sort_field_id: field.into(),
            sort_method: Some(method),
            ..SortParam::default()
        }
    }

    pub fn custom(field: impl Into<String>, order: Vec<String>) -> Self {
        SortParam {
            sort_field_id: field.into(),
            sort_by: Some(order),
            ..SortParam::default()
        }
    }

    pub fn by_field(
        field: impl Into<String>,
        sort_by_field: impl Into<String>,
        method: SortMethod,
    ) -> Self {
        SortParam {
            sort_field_id: field.into(),
            sort_method: Some(method),
            sort_by_field: Some(sort_by_field.into()),
            ..SortParam::default()
        }
    }

    pub fn with_query(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.query
            .get_or_insert_with(FxHashMap::default)
            .insert(field.into(), value.into());
        self
    }
}

// ============================================================================
// LAYOUT OPTIONS
// ============================================================================

/// Flat (grid) or nested (tree) row header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HierarchyType {
    #[serde(rename = "grid")]
    Grid,
    #[serde(rename = "tree")]
    Tree,
}

impl Default for HierarchyType {
    fn default() -> Self {
        HierarchyType::Grid
    }
}

/// Where to place the measure field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuesPosition {
    /// Measures appear as the innermost columns.
    Columns,
    /// Measures appear as the innermost rows.
    Rows,
}

impl Default for ValuesPosition {
    fn default() -> Self {
        ValuesPosition::Columns
    }
}

/// Row paging, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_size: usize,
    pub current: usize,
}

/// Controls how the hierarchies are built and projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub hierarchy_type: HierarchyType,

    pub values_position: ValuesPosition,

    /// Collapsed row nodes by id.
    pub collapsed_rows: CollapseState,

    /// Collapsed column nodes by id.
    pub collapsed_cols: CollapseState,

    /// Tree mode: collapse every non-leaf row node unless `collapsed_rows`
    /// says otherwise.
    pub hierarchy_collapse: bool,

    /// Build placeholder nodes for values absent from a branch.
    pub show_all_items: bool,

    /// Applied to fields that have no sort params of their own.
    pub default_sort: Option<SortMethod>,

    /// Keep each node's row subset for view-meta lookups.
    pub cache_row_subsets: bool,

    pub pagination: Option<Pagination>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            hierarchy_type: HierarchyType::Grid,
            values_position: ValuesPosition::Columns,
            collapsed_rows: CollapseState::default(),
            collapsed_cols: CollapseState::default(),
            hierarchy_collapse: false,
            show_all_items: false,
            default_sort: None,
            cache_row_subsets: true,
            pagination: None,
        }
    }
}

// ============================================================================
// MAIN DEFINITION STRUCT
// ============================================================================

/// The complete configuration of one layout build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotLayoutConfig {
    pub fields: Fields,

    #[serde(default)]
    pub meta: Vec<Meta>,

    #[serde(default)]
    pub totals: Totals,

    #[serde(default)]
    pub sort_params: Vec<SortParam>,

    #[serde(default)]
    pub options: LayoutOptions,
}

impl PivotLayoutConfig {
    /// Creates a configuration with row, column and value fields.
    pub fn new(rows: &[&str], columns: &[&str], values: &[&str]) -> Self {
        let to_vec = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        PivotLayoutConfig {
            fields: Fields {
                rows: to_vec(rows),
                columns: to_vec(columns),
                values: MeasureSpec::List(to_vec(values)),
                derived_values: Vec::new(),
            },
            ..PivotLayoutConfig::default()
        }
    }

    pub fn meta_for(&self, field: &str) -> Option<&Meta> {
        self.meta.iter().find(|m| m.field == field)
    }

    /// Sort params targeting `field`, in listed order.
    pub fn sort_params_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a SortParam> + 'a {
        self.sort_params.iter().filter(move |p| p.sort_field_id == field)
    }
}
