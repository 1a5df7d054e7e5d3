//! FILENAME: core/pivot-layout/src/fields.rs
//! Field resolution.
//!
//! Normalizes the field specification once, up front: the measure list (or
//! strategy table) becomes one synthetic `EXTRA_FIELD` dimension on the
//! measure axis, displayed derived values join the measure list, and every
//! field reference is validated against the data.

use rustc_hash::FxHashSet;

use crate::data::DataSet;
use crate::definition::{
    DerivedValue, HierarchyType, MeasureSpec, PivotLayoutConfig, StrategyExtra, StrategyValue,
    ValuesPosition, EXTRA_FIELD,
};
use crate::error::ConfigError;
use crate::hierarchy::Axis;

/// The field layout every later stage works from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFields {
    pub row_fields: Vec<String>,
    pub col_fields: Vec<String>,
    /// Measure ids in display order.
    pub measures: Vec<String>,
    /// Axis carrying `EXTRA_FIELD`, if the measures were folded into one.
    pub measure_axis: Option<Axis>,
    pub hierarchy_type: HierarchyType,
    pub derived_values: Vec<DerivedValue>,
    pub extras: Vec<StrategyExtra>,
}

impl ResolvedFields {
    pub fn fields(&self, axis: Axis) -> &[String] {
        match axis {
            Axis::Row => &self.row_fields,
            Axis::Col => &self.col_fields,
        }
    }

    /// The measure every cell carries when no `EXTRA_FIELD` node says otherwise.
    pub fn implicit_measure(&self) -> Option<&str> {
        match (self.measure_axis, self.measures.as_slice()) {
            (None, [only]) => Some(only.as_str()),
            _ => None,
        }
    }

    /// All derived metrics of `measure`.
    pub fn derived_for(&self, measure: &str) -> &[String] {
        self.derived_values
            .iter()
            .find(|d| d.value_field == measure)
            .map(|d| d.derived_value_field.as_slice())
            .unwrap_or(&[])
    }

    pub fn extra_for(&self, measure: &str) -> Option<&StrategyExtra> {
        self.extras.iter().find(|e| e.key == measure)
    }
}

/// Resolves and validates the field specification of `config`.
pub fn resolve_fields(config: &PivotLayoutConfig, data: &DataSet) -> Result<ResolvedFields, ConfigError> {
    let fields = &config.fields;

    let mut placed: FxHashSet<&str> = FxHashSet::default();
    for field in fields.rows.iter().chain(fields.columns.iter()) {
        if field == EXTRA_FIELD {
            return Err(ConfigError::ReservedField(field.clone()));
        }
        if !placed.insert(field.as_str()) {
            return Err(ConfigError::DuplicateField(field.clone()));
        }
    }

    let (mut measures, extras) = match &fields.values {
        MeasureSpec::List(values) => (values.clone(), Vec::new()),
        MeasureSpec::Strategy(table) => {
            validate_strategy(table)?;
            (table.fields.clone(), table.extra.clone())
        }
    };

    let base_measures = measures.clone();
    for derived in &fields.derived_values {
        if !base_measures.contains(&derived.value_field) {
            return Err(ConfigError::InvalidDerivedValue {
                value_field: derived.value_field.clone(),
                reason: "not a value field".to_string(),
            });
        }
        let mut insert_at = measures
            .iter()
            .position(|m| *m == derived.value_field)
            .map(|p| p + 1)
            .unwrap_or(measures.len());
        for shown in &derived.display_derived_value_field {
            if !derived.derived_value_field.contains(shown) {
                return Err(ConfigError::InvalidDerivedValue {
                    value_field: derived.value_field.clone(),
                    reason: format!("{} is displayed but not derived", shown),
                });
            }
            if !measures.contains(shown) {
                measures.insert(insert_at, shown.clone());
                insert_at += 1;
            }
        }
    }

    let mut seen_measures: FxHashSet<&str> = FxHashSet::default();
    for measure in &measures {
        if measure == EXTRA_FIELD {
            return Err(ConfigError::ReservedField(measure.clone()));
        }
        if placed.contains(measure.as_str()) || !seen_measures.insert(measure.as_str()) {
            return Err(ConfigError::DuplicateField(measure.clone()));
        }
    }

    // Column checks only make sense against actual rows.
    if !data.is_empty() {
        let check = |field: &String, area: &'static str| -> Result<(), ConfigError> {
            if data.has_column(field) {
                Ok(())
            } else {
                Err(ConfigError::UnknownField {
                    field: field.clone(),
                    area,
                })
            }
        };
        for field in &fields.rows {
            check(field, "rows")?;
        }
        for field in &fields.columns {
            check(field, "columns")?;
        }
        for field in &base_measures {
            check(field, "values")?;
        }
        for derived in &fields.derived_values {
            for field in &derived.derived_value_field {
                check(field, "derived values")?;
            }
        }
    }

    let mut row_fields = fields.rows.clone();
    let mut col_fields = fields.columns.clone();
    let axis = match config.options.values_position {
        ValuesPosition::Columns => Axis::Col,
        ValuesPosition::Rows => Axis::Row,
    };
    let axis_fields = match axis {
        Axis::Row => &mut row_fields,
        Axis::Col => &mut col_fields,
    };
    let fold = measures.len() >= 2 || (measures.len() == 1 && axis_fields.is_empty());
    if fold {
        axis_fields.push(EXTRA_FIELD.to_string());
    }

    log::debug!(
        "resolved fields: rows={:?} cols={:?} measures={:?}",
        row_fields,
        col_fields,
        measures
    );

    Ok(ResolvedFields {
        row_fields,
        col_fields,
        measures,
        measure_axis: fold.then_some(axis),
        hierarchy_type: config.options.hierarchy_type,
        derived_values: fields.derived_values.clone(),
        extras,
    })
}

fn validate_strategy(table: &StrategyValue) -> Result<(), ConfigError> {
    if table.fields.is_empty() {
        return Err(ConfigError::MalformedStrategy("no value fields".to_string()));
    }
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for field in &table.fields {
        if !seen.insert(field.as_str()) {
            return Err(ConfigError::MalformedStrategy(format!("duplicate field {}", field)));
        }
    }
    for extra in &table.extra {
        if !seen.contains(extra.key.as_str()) {
            return Err(ConfigError::MalformedStrategy(format!(
                "extra key {} is not a value field",
                extra.key
            )));
        }
    }
    Ok(())
}
