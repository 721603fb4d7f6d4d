use std::collections::BTreeSet;

use ahash::AHashSet;
use polars::prelude::*;

use super::JoinRow;
use crate::{error::Result, filter::Filter, value::Value};

/// Concatenated join rows of every (catchment layer, candidate layer) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusedTable {
    rows: Vec<JoinRow>,
}

/// The rows of one (buffer layer, join layer) pair with their matched geometries.
#[derive(Debug, Clone)]
pub struct Provenance<'a> {
    /// `"<join_layer>_geometry"`.
    pub column: String,
    pub rows: Vec<&'a JoinRow>,
}

impl FusedTable {
    pub fn new(rows: Vec<JoinRow>) -> Self { Self { rows } }

    #[inline] pub fn rows(&self) -> &[JoinRow] { &self.rows }

    #[inline] pub fn len(&self) -> usize { self.rows.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub(crate) fn extend(&mut self, rows: impl IntoIterator<Item = JoinRow>) {
        self.rows.extend(rows);
    }

    /// Column names in first-seen order.
    pub fn column_names(&self) -> Vec<&str> {
        let mut seen = AHashSet::new();
        self.rows.iter()
            .flat_map(|row| row.columns.iter().map(|(name, _)| name.as_str()))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Distinct (buffer layer, join layer) pairs present in the table.
    pub fn pairs(&self) -> BTreeSet<(&str, &str)> {
        self.rows.iter().map(|row| (row.buffer_layer.as_str(), row.join_layer.as_str())).collect()
    }

    /// Select the rows of one pair, keeping the matched geometry under its layer-qualified name.
    pub fn provenance(&self, buffer_layer: &str, join_layer: &str) -> Provenance<'_> {
        Provenance {
            column: format!("{join_layer}_geometry"),
            rows: self.rows.iter()
                .filter(|row| row.buffer_layer == buffer_layer && row.join_layer == join_layer)
                .collect(),
        }
    }

    /// Apply a filter to the rows; see [`Filter::retain`].
    pub fn retain(&mut self, filter: &Filter) -> bool {
        let column = filter.column.as_str();
        filter.retain("fused table", &mut self.rows, |row| row.get(column))
    }

    /// Export the attribute columns. Each column takes the narrowest type holding
    /// all its non-null cells: integer, float, boolean, else string.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let columns = self.column_names().into_iter()
            .map(|name| {
                let cells = self.rows.iter().map(|row| row.get(name).unwrap_or(&Value::Null)).collect::<Vec<_>>();
                value_column(name, &cells)
            })
            .collect::<Vec<_>>();
        Ok(DataFrame::new(columns)?)
    }
}

pub(crate) fn value_column(name: &str, cells: &[&Value]) -> Column {
    let present = || cells.iter().filter(|value| !matches!(value, Value::Null));

    if present().all(|value| matches!(value, Value::Int(_))) && present().next().is_some() {
        let values = cells.iter().map(|value| match value { Value::Int(i) => Some(*i), _ => None }).collect::<Vec<_>>();
        Column::new(name.into(), values)
    } else if present().all(|value| matches!(value, Value::Int(_) | Value::Float(_))) && present().next().is_some() {
        let values = cells.iter().map(|value| match value {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }).collect::<Vec<_>>();
        Column::new(name.into(), values)
    } else if present().all(|value| matches!(value, Value::Bool(_))) && present().next().is_some() {
        let values = cells.iter().map(|value| match value { Value::Bool(b) => Some(*b), _ => None }).collect::<Vec<_>>();
        Column::new(name.into(), values)
    } else {
        let values = cells.iter().map(|value| match value {
            Value::Null => None,
            other => Some(other.to_string()),
        }).collect::<Vec<_>>();
        Column::new(name.into(), values)
    }
}
