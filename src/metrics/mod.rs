//! Grouped statistics over the fused join table.

mod config;

use std::collections::BTreeSet;

use ahash::AHashMap;
use log::{debug, warn};
use polars::prelude::{AnyValue, Column, DataFrame};

use crate::{
    error::{CatchmentError, Result},
    join::value_column,
    value::{round_to, Value},
};

pub use config::{ColumnSpec, Function, MetricsConfig, MultiplySpec, RatioSpec};

/// Decimals kept in every numeric output.
pub const DECIMALS: i32 = 2;

/// Column carried through to the output when it is not a group key.
const AREA_COLUMN: &str = "area_km2";

fn value_of(any: AnyValue<'_>) -> Value {
    match any {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::Int32(i) => Value::Int(i.into()),
        AnyValue::Int64(i) => Value::Int(i),
        AnyValue::UInt32(u) => Value::Int(u.into()),
        AnyValue::UInt64(u) => i64::try_from(u).map_or(Value::Float(u as f64), Value::Int),
        AnyValue::Float32(f) => Value::Float(f.into()),
        AnyValue::Float64(f) => Value::Float(f),
        AnyValue::String(s) => Value::Str(s.to_string()),
        AnyValue::StringOwned(s) => Value::Str(s.to_string()),
        other => match other.extract::<i64>() {
            Some(i) if other.dtype().is_integer() => Value::Int(i),
            _ => Value::Str(other.to_string()),
        },
    }
}

/// The table's columns as `Value`s, read on demand.
struct Cells<'a> {
    table: &'a DataFrame,
    columns: AHashMap<String, Vec<Value>>,
}

impl<'a> Cells<'a> {
    fn new(table: &'a DataFrame) -> Self {
        Self { table, columns: AHashMap::new() }
    }

    fn get(&mut self, name: &str) -> Result<Option<&[Value]>> {
        if !self.columns.contains_key(name) {
            let Ok(column) = self.table.column(name) else { return Ok(None) };
            let values = (0..column.len())
                .map(|i| column.get(i).map(value_of))
                .collect::<Result<Vec<_>, _>>()?;
            self.columns.insert(name.to_string(), values);
        }
        Ok(self.columns.get(name).map(Vec::as_slice))
    }
}

/// Aggregate one numeric group. `None` is a missing result.
fn numeric(function: Function, values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    match function {
        Function::Sum => Some(values.iter().sum()),
        Function::Max => values.iter().copied().reduce(f64::max),
        Function::Min => values.iter().copied().reduce(f64::min),
        Function::Mean => (!values.is_empty()).then(|| values.iter().sum::<f64>() / n),
        Function::Std => (values.len() > 1).then(|| {
            let mean = values.iter().sum::<f64>() / n;
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        }),
        Function::Count | Function::CountDistinct => Some(values.len() as f64),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Append `column` unless an output column already has its name.
fn push_unique(output: &mut Vec<Column>, column: Column) -> bool {
    if output.iter().any(|existing| existing.name() == column.name()) {
        warn!("[metrics] duplicate output column '{}' skipped", column.name());
        return false
    }
    output.push(column);
    true
}

fn rounded(values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    values.into_iter().map(|v| v.map(|v| round_to(v, DECIMALS))).collect()
}

/// Group `table` by `group_by` and compute the configured statistics, one row per
/// distinct non-null key tuple in ascending key order.
///
/// A missing group-by column is the only hard failure; missing metric columns are
/// logged and skipped.
pub fn aggregate(table: &DataFrame, group_by: &[String], config: &MetricsConfig) -> Result<DataFrame> {
    for name in config.unknown.keys() {
        warn!("[metrics] unknown function '{name}' ignored");
    }

    let mut cells = Cells::new(table);
    let mut keys = Vec::with_capacity(group_by.len());
    for name in group_by {
        let column = cells.get(name)?
            .ok_or_else(|| CatchmentError::Aggregation(format!("group-by column '{name}' not found")))?;
        keys.push(column.to_vec());
    }

    // Rows with a missing key belong to no group.
    let mut rows = (0..table.height())
        .filter(|&i| keys.iter().all(|column| !column[i].is_missing()))
        .collect::<Vec<_>>();
    let compare = |&a: &usize, &b: &usize| {
        keys.iter().map(|column| column[a].total_cmp(&column[b]))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    };
    rows.sort_by(compare);
    let groups = rows.chunk_by(|a, b| compare(a, b).is_eq()).collect::<Vec<_>>();
    debug!("[metrics] {} rows in {} groups", table.height(), groups.len());

    let mut output = group_by.iter().zip(&keys)
        .map(|(name, column)| value_column(name, &groups.iter().map(|group| &column[group[0]]).collect::<Vec<_>>()))
        .collect::<Vec<Column>>();
    // Aggregated numeric columns by name, for post ratios.
    let mut aggregated = AHashMap::<String, Vec<Option<f64>>>::new();

    for function in Function::ALL {
        for spec in config.specs(function) {
            let Some(column) = cells.get(&spec.column)? else {
                warn!("[metrics] column '{}' not found, {function} skipped", spec.column);
                continue
            };
            let name = spec.output_name(function);

            match function {
                Function::Count | Function::CountDistinct => {
                    let counts = groups.iter().map(|group| {
                        let present = group.iter().map(|&i| &column[i]).filter(|value| !value.is_missing());
                        if function == Function::Count {
                            present.count() as i64
                        } else {
                            present.map(Value::to_string).collect::<BTreeSet<_>>().len() as i64
                        }
                    }).collect::<Vec<_>>();
                    let as_f64 = counts.iter().map(|&c| Some(c as f64)).collect();
                    if push_unique(&mut output, Column::new(name.as_str().into(), counts)) {
                        aggregated.insert(name, as_f64);
                    }
                }
                _ => {
                    let values = rounded(groups.iter().map(|group| {
                        let numbers = group.iter().filter_map(|&i| column[i].as_f64()).collect::<Vec<_>>();
                        numeric(function, &numbers)
                    }).collect());
                    if push_unique(&mut output, Column::new(name.as_str().into(), values.clone())) {
                        aggregated.insert(name, values);
                    }
                }
            }
        }
    }

    for ratio in config.ratio.as_slice() {
        let numerator = cells.get(&ratio.numerator)?.map(<[Value]>::to_vec);
        let denominator = cells.get(&ratio.denominator)?.map(<[Value]>::to_vec);
        let (Some(numerator), Some(denominator)) = (numerator, denominator) else {
            warn!("[metrics] ratio '{}' needs '{}' and '{}', skipped", ratio.name, ratio.numerator, ratio.denominator);
            continue
        };
        let values = rounded(groups.iter().map(|group| {
            mean(group.iter().filter_map(|&i| {
                match (numerator[i].as_f64(), denominator[i].as_f64()) {
                    (Some(n), Some(d)) if d != 0.0 => Some(n / d),
                    _ => None,
                }
            }))
        }).collect());
        if push_unique(&mut output, Column::new(ratio.name.as_str().into(), values.clone())) {
            aggregated.insert(ratio.name.clone(), values);
        }
    }

    for product in config.multiply.as_slice() {
        let mut factors = Vec::with_capacity(product.columns.len());
        for name in &product.columns {
            match cells.get(name)? {
                Some(column) => factors.push(column.to_vec()),
                None => break,
            }
        }
        if factors.len() != product.columns.len() || factors.is_empty() {
            warn!("[metrics] multiply '{}' has missing columns, skipped", product.name);
            continue
        }
        let values = rounded(groups.iter().map(|group| {
            group.iter()
                .filter_map(|&i| factors.iter().map(|column| column[i].as_f64()).product::<Option<f64>>())
                .reduce(|a, b| a * b)
        }).collect());
        if push_unique(&mut output, Column::new(product.name.as_str().into(), values.clone())) {
            aggregated.insert(product.name.clone(), values);
        }
    }

    if !group_by.iter().any(|key| key == AREA_COLUMN) {
        if let Some(area) = cells.get(AREA_COLUMN)? {
            let values = groups.iter()
                .map(|group| group.iter().find_map(|&i| area[i].as_f64()))
                .collect::<Vec<_>>();
            if push_unique(&mut output, Column::new(AREA_COLUMN.into(), values.clone())) {
                aggregated.insert(AREA_COLUMN.to_string(), values);
            }
        }
    }

    for ratio in &config.post_ratio {
        let (Some(numerator), Some(denominator)) = (aggregated.get(&ratio.numerator), aggregated.get(&ratio.denominator)) else {
            warn!("[metrics] post ratio '{}' needs aggregated '{}' and '{}', skipped", ratio.name, ratio.numerator, ratio.denominator);
            continue
        };
        let values = rounded(numerator.iter().zip(denominator)
            .map(|(n, d)| match (n, d) {
                (Some(n), Some(d)) if *d != 0.0 => Some(n / d),
                _ => None,
            })
            .collect());
        push_unique(&mut output, Column::new(ratio.name.as_str().into(), values));
    }

    Ok(DataFrame::new(output)?)
}
