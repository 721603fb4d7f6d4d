use std::{cmp::Ordering, fmt};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{layer::FeatureLayer, value::Value};

/// Comparison applied by a `Filter`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "==")] Eq,
    #[serde(rename = "!=")] Ne,
    #[serde(rename = ">")] Gt,
    #[serde(rename = ">=")] Ge,
    #[serde(rename = "<")] Lt,
    #[serde(rename = "<=")] Le,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        })
    }
}

/// Keep rows where `<column> <operator> <value>` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub operator: Operator,
}

/// Values whose types cannot be ordered against the filter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incomparable;

impl Filter {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self { column: column.into(), value: value.into(), operator }
    }

    /// Evaluate the filter on one cell. Missing cells fail every test except `!=`;
    /// equality across types is false, ordering across types is an error.
    pub fn test(&self, cell: &Value) -> Result<bool, Incomparable> {
        if cell.is_missing() { return Ok(self.operator == Operator::Ne) }

        let Some(ordering) = cell.compare(&self.value) else {
            return match self.operator {
                Operator::Eq => Ok(false),
                Operator::Ne => Ok(true),
                _ => Err(Incomparable),
            }
        };
        Ok(match self.operator {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
        })
    }

    /// Retain the items passing the filter. `cell` reads the filtered column of an item,
    /// returning `None` when the item lacks it. An incomplete filter, a column no item
    /// has, or an incomparable value leaves `items` untouched and returns false.
    pub fn retain<T>(&self, scope: &str, items: &mut Vec<T>, cell: impl Fn(&T) -> Option<&Value>) -> bool {
        if self.value.is_missing() {
            warn!("[filter] ignoring incomplete filter on '{}' for '{scope}'", self.column);
            return false
        }
        if !items.is_empty() && items.iter().all(|item| cell(item).is_none()) {
            warn!("[filter] column '{}' not found in '{scope}', filter skipped", self.column);
            return false
        }

        static NULL: Value = Value::Null;
        let keep = match items.iter()
            .map(|item| self.test(cell(item).unwrap_or(&NULL)))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(keep) => keep,
            Err(Incomparable) => {
                warn!("[filter] cannot compare '{}' {} {} in '{scope}', filter skipped", self.column, self.operator, self.value);
                return false
            }
        };

        let before = items.len();
        let mut keep = keep.into_iter();
        items.retain(|_| keep.next().unwrap_or(false));
        debug!("[filter] '{}' {} {} kept {}/{before} rows of '{scope}'", self.column, self.operator, self.value, items.len());
        true
    }

    /// Apply the filter to a feature layer's attributes.
    pub fn apply_to_layer(&self, layer: &mut FeatureLayer) -> bool {
        let column = self.column.as_str();
        self.retain(&layer.name.clone(), &mut layer.features, |feature| feature.attributes.get(column))
    }
}

#[cfg(test)]
mod tests {
    use geo::point;

    use super::*;
    use crate::layer::{Attributes, Feature};

    fn layer() -> FeatureLayer {
        let feature = |active: Value, kind: &str| {
            Feature::new(point!(x: 0.0, y: 0.0), Attributes::from([
                ("active".to_string(), active),
                ("kind".to_string(), Value::from(kind)),
            ]))
        };
        FeatureLayer::new("stops", None, vec![
            feature(Value::Int(1), "bus"),
            feature(Value::Int(0), "metro"),
            feature(Value::Null, "bus"),
            feature(Value::Int(3), "tram"),
        ])
    }

    #[test]
    fn operator_defaults_to_equality() {
        let filter: Filter = serde_json::from_str(r#"{"column": "active", "value": 1}"#).unwrap();
        assert_eq!(filter.operator, Operator::Eq);

        let filter: Filter = serde_json::from_str(r#"{"column": "active", "value": 1, "operator": ">="}"#).unwrap();
        assert_eq!(filter.operator, Operator::Ge);
    }

    #[test]
    fn numeric_comparisons() {
        let mut stops = layer();
        assert!(Filter::new("active", Operator::Ge, 1).apply_to_layer(&mut stops));
        assert_eq!(stops.len(), 2);

        let mut stops = layer();
        assert!(Filter::new("active", Operator::Ne, 1).apply_to_layer(&mut stops));
        // Null counts as "not equal".
        assert_eq!(stops.len(), 3);
    }

    #[test]
    fn string_equality() {
        let mut stops = layer();
        assert!(Filter::new("kind", Operator::Eq, "bus").apply_to_layer(&mut stops));
        assert_eq!(stops.len(), 2);
    }

    #[test]
    fn missing_column_is_skipped() {
        let mut stops = layer();
        assert!(!Filter::new("absent", Operator::Eq, 1).apply_to_layer(&mut stops));
        assert_eq!(stops.len(), 4);
    }

    #[test]
    fn incomparable_ordering_is_skipped() {
        let mut stops = layer();
        assert!(!Filter::new("kind", Operator::Gt, 2).apply_to_layer(&mut stops));
        assert_eq!(stops.len(), 4);
    }

    #[test]
    fn incomplete_filter_is_skipped() {
        let mut stops = layer();
        assert!(!Filter::new("active", Operator::Eq, Value::Null).apply_to_layer(&mut stops));
        assert_eq!(stops.len(), 4);
    }
}
