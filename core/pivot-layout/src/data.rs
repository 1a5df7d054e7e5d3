//! FILENAME: core/pivot-layout/src/data.rs
//! Source data as the layout engine sees it.
//!
//! - `DataValue`: a normalized, hashable cell value used as grouping key
//! - `DataRow` / `DataSet`: the flat rows handed in by the caller
//! - `Query`: the field → value conjunction accumulated down a node path
//! - `AggregateAccumulator`: incremental SUM/AVG/MIN/MAX

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::definition::{Aggregation, EXTRA_FIELD};

// ============================================================================
// VALUES
// ============================================================================

/// Wrapper around f64 that implements Eq and Hash for use as HashMap keys.
/// NaN values are treated as equal to each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            true
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            u64::MAX.hash(state);
        } else if self.0 == 0.0 {
            // 0.0 and -0.0 compare equal, so they must hash equal
            0u64.hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}

/// A single field value of a data row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Number(OrderedFloat),
    Boolean(bool),
    Text(String),
    Empty,
}

static EMPTY_VALUE: DataValue = DataValue::Empty;

impl DataValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, DataValue::Empty)
    }

    /// The numeric value used by aggregations. Text is never coerced.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DataValue::Number(n) => Some(n.0),
            _ => None,
        }
    }

    /// Numeric reading used by sorting: numbers and numeric text.
    pub fn parse_number(&self) -> Option<f64> {
        match self {
            DataValue::Number(n) => Some(n.0),
            DataValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Whether two values fall into the same header node. Values of different
    /// kinds match when their labels agree (`2020` and `"2020"`).
    pub fn same_member(&self, other: &DataValue) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (DataValue::Number(_), DataValue::Number(_))
            | (DataValue::Text(_), DataValue::Text(_))
            | (DataValue::Boolean(_), DataValue::Boolean(_)) => false,
            _ => self.label() == other.label(),
        }
    }

    /// Display label of the value.
    pub fn label(&self) -> String {
        match self {
            DataValue::Empty => String::new(),
            DataValue::Number(n) => format_number(n.0),
            DataValue::Text(s) => s.clone(),
            DataValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Number(OrderedFloat(value))
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Number(OrderedFloat(value as f64))
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Number(OrderedFloat(value as f64))
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Boolean(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Text(value)
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// One source row: field → value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRow {
    values: FxHashMap<String, DataValue>,
}

impl DataRow {
    pub fn new() -> Self {
        DataRow::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<DataValue>) {
        self.values.insert(field.into(), value.into());
    }

    /// Value of `field`; missing fields read as `Empty`.
    pub fn get(&self, field: &str) -> &DataValue {
        self.values.get(field).unwrap_or(&EMPTY_VALUE)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

impl<K: Into<String>, V: Into<DataValue>> FromIterator<(K, V)> for DataRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        DataRow {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Identifies where a node's rows live: the base data set or a drill-down set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DataSourceId(pub u32);

impl DataSourceId {
    pub const BASE: DataSourceId = DataSourceId(0);
}

/// The flat rows handed in by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<DataRow>", into = "Vec<DataRow>")]
pub struct DataSet {
    rows: Vec<DataRow>,
    /// Known column names in first-seen order.
    columns: Vec<String>,
}

impl DataSet {
    pub fn new(rows: Vec<DataRow>) -> Self {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut columns = Vec::new();
        for row in &rows {
            // Row maps are unordered; sort per row so column order is deterministic.
            let mut fields: Vec<&str> = row.fields().collect();
            fields.sort_unstable();
            for field in fields {
                if seen.insert(field.to_string()) {
                    columns.push(field.to_string());
                }
            }
        }
        DataSet { rows, columns }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&DataRow> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.columns.iter().any(|c| c == field)
    }

    /// Indices of all rows.
    pub fn all_indices(&self) -> Vec<usize> {
        (0..self.rows.len()).collect()
    }

    /// Indices of rows matching every one of `queries`.
    pub fn matching(&self, queries: &[&Query]) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| queries.iter().all(|q| q.matches(row)))
            .map(|(i, _)| i)
            .collect()
    }
}

impl From<Vec<DataRow>> for DataSet {
    fn from(rows: Vec<DataRow>) -> Self {
        DataSet::new(rows)
    }
}

impl From<DataSet> for Vec<DataRow> {
    fn from(data: DataSet) -> Self {
        data.rows
    }
}

// ============================================================================
// QUERY
// ============================================================================

/// Field → value conjunction accumulated from the root down to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    conditions: SmallVec<[(String, DataValue); 4]>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    /// Returns a copy extended with one more condition.
    pub fn with(&self, field: &str, value: DataValue) -> Self {
        let mut next = self.clone();
        next.conditions.push((field.to_string(), value));
        next
    }

    pub fn get(&self, field: &str) -> Option<&DataValue> {
        self.conditions
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v)
    }

    /// The measure id carried by the query, if any.
    pub fn measure(&self) -> Option<String> {
        self.get(EXTRA_FIELD).map(|v| v.label())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.conditions.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether any condition filters data rows (the measure field does not).
    pub fn has_dimension_filter(&self) -> bool {
        self.conditions.iter().any(|(f, _)| f != EXTRA_FIELD)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|(f, _)| f.as_str())
    }

    /// Whether `row` satisfies every dimension condition.
    pub fn matches(&self, row: &DataRow) -> bool {
        self.conditions
            .iter()
            .filter(|(f, _)| f != EXTRA_FIELD)
            .all(|(f, v)| row.get(f).same_member(v))
    }

    /// Whether `row` has no value that contradicts the query. Missing fields pass.
    pub fn admits(&self, row: &DataRow) -> bool {
        self.conditions
            .iter()
            .filter(|(f, _)| f != EXTRA_FIELD)
            .all(|(f, v)| !row.contains(f) || row.get(f).same_member(v))
    }
}

// ============================================================================
// AGGREGATE ACCUMULATOR
// ============================================================================

/// Accumulator for computing aggregates incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateAccumulator {
    pub sum: f64,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl AggregateAccumulator {
    pub fn new() -> Self {
        AggregateAccumulator::default()
    }

    /// Adds a numeric value to the accumulator.
    pub fn add_number(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    /// Adds a value; anything that is not a number is ignored.
    pub fn add(&mut self, value: &DataValue) {
        if let Some(n) = value.as_number() {
            self.add_number(n);
        }
    }

    /// Computes the final aggregate; `None` when no number was seen.
    pub fn compute(&self, aggregation: Aggregation) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match aggregation {
            Aggregation::Sum => Some(self.sum),
            Aggregation::Avg => Some(self.sum / self.count as f64),
            Aggregation::Min => self.min,
            Aggregation::Max => self.max,
        }
    }
}

/// Aggregates `field` over the given rows of `data`.
pub fn aggregate_rows(
    data: &DataSet,
    rows: &[usize],
    field: &str,
    aggregation: Aggregation,
) -> Option<f64> {
    let mut acc = AggregateAccumulator::new();
    for &i in rows {
        if let Some(row) = data.row(i) {
            acc.add(row.get(field));
        }
    }
    acc.compute(aggregation)
}

/// Intersection of two ascending index lists.
pub fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
