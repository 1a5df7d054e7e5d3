//! FILENAME: core/pivot-layout/src/sort.rs
//! Sibling ordering.
//!
//! Sorting happens on raw groups before any node exists, so the order is part
//! of the tree structure. Params for a field are applied in listed order, the
//! first one being the primary key; remaining ties keep first-seen order.

use std::cmp::Ordering;

use crate::data::{DataSet, DataValue};
use crate::definition::{SortMethod, SortParam, EXTRA_FIELD};
use crate::error::LayoutWarning;

/// The rows sharing one value of a field, within one parent scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub value: DataValue,
    pub rows: Vec<usize>,
}

impl Group {
    pub fn new(value: DataValue, rows: Vec<usize>) -> Self {
        Group { value, rows }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Rank(usize),
    Number(f64),
    Text(String),
    Missing,
}

fn compare_keys(a: &SortKey, b: &SortKey, method: SortMethod) -> Ordering {
    let ordering = match (a, b) {
        (SortKey::Missing, SortKey::Missing) => return Ordering::Equal,
        // Missing keys stay last in both directions.
        (SortKey::Missing, _) => return Ordering::Greater,
        (_, SortKey::Missing) => return Ordering::Less,
        (SortKey::Rank(x), SortKey::Rank(y)) => x.cmp(y),
        (SortKey::Number(x), SortKey::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        (SortKey::Number(_), _) => Ordering::Less,
        (_, SortKey::Number(_)) => Ordering::Greater,
        (SortKey::Rank(_), _) => Ordering::Less,
        (_, SortKey::Rank(_)) => Ordering::Greater,
    };
    match method {
        SortMethod::Asc => ordering,
        SortMethod::Desc => ordering.reverse(),
    }
}

/// One resolved sort param: a key per group plus a direction.
struct Rule {
    keys: Vec<SortKey>,
    method: SortMethod,
}

/// Orders sibling groups.
pub struct Sorter<'a> {
    data: &'a DataSet,
    default_sort: Option<SortMethod>,
}

impl<'a> Sorter<'a> {
    pub fn new(data: &'a DataSet, default_sort: Option<SortMethod>) -> Self {
        Sorter { data, default_sort }
    }

    /// Sorts `groups` of `field` with `params` (already filtered to the field).
    /// Unresolvable params are skipped and reported through `warnings`.
    pub fn sort(
        &self,
        field: &str,
        mut groups: Vec<Group>,
        params: &[&SortParam],
        warnings: &mut Vec<LayoutWarning>,
    ) -> Vec<Group> {
        if groups.len() < 2 {
            return groups;
        }

        let mut rules: Vec<Rule> = Vec::new();
        if params.is_empty() {
            // The measure field keeps declared order unless it has params of its own.
            if let (Some(method), false) = (self.default_sort, field == EXTRA_FIELD) {
                rules.push(self.own_value_rule(&groups, method));
            }
        } else {
            for param in params {
                if let Some(rule) = self.resolve(field, param, &groups, warnings) {
                    rules.push(rule);
                }
            }
        }
        if rules.is_empty() {
            return groups;
        }

        let mut order: Vec<usize> = (0..groups.len()).collect();
        order.sort_by(|&a, &b| {
            rules
                .iter()
                .map(|rule| compare_keys(&rule.keys[a], &rule.keys[b], rule.method))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let mut slots: Vec<Option<Group>> = groups.drain(..).map(Some).collect();
        order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect()
    }

    fn resolve(
        &self,
        field: &str,
        param: &SortParam,
        groups: &[Group],
        warnings: &mut Vec<LayoutWarning>,
    ) -> Option<Rule> {
        if let Some(order) = &param.sort_by {
            let keys = groups
                .iter()
                .map(|g| {
                    let label = g.value.label();
                    SortKey::Rank(order.iter().position(|o| *o == label).unwrap_or(order.len()))
                })
                .collect();
            return Some(Rule { keys, method: SortMethod::Asc });
        }

        if let Some(by_field) = &param.sort_by_field {
            let method = param.sort_method.unwrap_or_default();
            return match self.by_field_keys(by_field, param, groups) {
                Some(keys) => Some(Rule { keys, method }),
                None => {
                    let warning = LayoutWarning::SortResolution {
                        field: field.to_string(),
                        sort_by_field: by_field.clone(),
                    };
                    if !warnings.contains(&warning) {
                        log::warn!("{}", warning);
                        warnings.push(warning);
                    }
                    None
                }
            };
        }

        param
            .sort_method
            .map(|method| self.own_value_rule(groups, method))
    }

    /// ASC/DESC on the groups' own values; numeric when every value parses.
    fn own_value_rule(&self, groups: &[Group], method: SortMethod) -> Rule {
        let numbers: Option<Vec<f64>> = groups.iter().map(|g| g.value.parse_number()).collect();
        let keys = match numbers {
            Some(numbers) => numbers.into_iter().map(SortKey::Number).collect(),
            None => groups.iter().map(|g| SortKey::Text(g.value.label())).collect(),
        };
        Rule { keys, method }
    }

    /// Keys from another field's values inside each group, narrowed by `query`.
    /// `None` when the field cannot be resolved at this level.
    fn by_field_keys(&self, by_field: &str, param: &SortParam, groups: &[Group]) -> Option<Vec<SortKey>> {
        let query = param.query.as_ref();
        let target: String = if by_field == EXTRA_FIELD {
            query.and_then(|q| q.get(EXTRA_FIELD)).cloned()?
        } else {
            by_field.to_string()
        };

        let present = groups.iter().any(|g| {
            g.rows
                .iter()
                .filter_map(|&i| self.data.row(i))
                .any(|row| row.contains(&target))
        });
        if !present {
            return None;
        }

        let in_query = |i: usize| -> bool {
            let Some(row) = self.data.row(i) else {
                return false;
            };
            query.map_or(true, |q| {
                q.iter()
                    .filter(|(f, _)| f.as_str() != EXTRA_FIELD)
                    .all(|(f, v)| row.get(f).label() == *v)
            })
        };

        let values: Vec<Vec<&DataValue>> = groups
            .iter()
            .map(|g| {
                g.rows
                    .iter()
                    .copied()
                    .filter(|&i| in_query(i))
                    .filter_map(|i| self.data.row(i))
                    .map(|row| row.get(&target))
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .collect();

        let numeric = values.iter().flatten().all(|v| v.as_number().is_some());
        let keys = values
            .iter()
            .map(|vs| {
                if vs.is_empty() {
                    SortKey::Missing
                } else if numeric {
                    SortKey::Number(vs.iter().filter_map(|v| v.as_number()).sum())
                } else {
                    SortKey::Text(vs[0].label())
                }
            })
            .collect();
        Some(keys)
    }
}
