use std::{collections::BTreeMap, fmt, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::OneOrMany;

/// Aggregation functions applied to one source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Sum,
    Max,
    Min,
    Mean,
    Std,
    Count,
    CountDistinct,
}

impl Function {
    pub const ALL: [Function; 7] = [
        Function::Sum, Function::Max, Function::Min, Function::Mean,
        Function::Std, Function::Count, Function::CountDistinct,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Function::Sum => "sum",
            Function::Max => "max",
            Function::Min => "min",
            Function::Mean => "mean",
            Function::Std => "std",
            Function::Count => "count",
            Function::CountDistinct => "count_distinct",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// `"<column>"` or `"<column> as <alias>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnSpec {
    pub column: String,
    pub alias: Option<String>,
}

impl ColumnSpec {
    /// Output column name: the alias, else `"<function>_<column>"`.
    pub fn output_name(&self, function: Function) -> String {
        self.alias.clone().unwrap_or_else(|| format!("{function}_{}", self.column))
    }
}

impl FromStr for ColumnSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"(?i)^\s*(\S.*?)(?:\s+as\s+(\S.*?))?\s*$").expect("valid column spec pattern")
        });
        let captures = pattern.captures(s).ok_or_else(|| format!("empty column spec '{s}'"))?;
        Ok(Self {
            column: captures[1].to_string(),
            alias: captures.get(2).map(|alias| alias.as_str().to_string()),
        })
    }
}

impl TryFrom<String> for ColumnSpec {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<ColumnSpec> for String {
    fn from(spec: ColumnSpec) -> Self {
        match spec.alias {
            Some(alias) => format!("{} as {alias}", spec.column),
            None => spec.column,
        }
    }
}

/// `name = numerator / denominator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioSpec {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
}

/// `name = product of columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplySpec {
    pub name: String,
    pub columns: Vec<String>,
}

/// Declarative statistics computed per group of the fused table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sum: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub max: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub min: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mean: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub std: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub count: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub count_distinct: Vec<ColumnSpec>,
    /// Per-row ratio, averaged per group.
    #[serde(default)]
    pub ratio: OneOrMany<RatioSpec>,
    /// Per-row product, multiplied across the group.
    #[serde(default)]
    pub multiply: OneOrMany<MultiplySpec>,
    /// Ratios of aggregated columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_ratio: Vec<RatioSpec>,
    /// Unrecognized function names, reported and ignored.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl MetricsConfig {
    pub fn specs(&self, function: Function) -> &[ColumnSpec] {
        match function {
            Function::Sum => &self.sum,
            Function::Max => &self.max,
            Function::Min => &self.min,
            Function::Mean => &self.mean,
            Function::Std => &self.std,
            Function::Count => &self.count,
            Function::CountDistinct => &self.count_distinct,
        }
    }

    pub fn is_empty(&self) -> bool {
        Function::ALL.iter().all(|&function| self.specs(function).is_empty())
            && self.ratio.as_slice().is_empty()
            && self.multiply.as_slice().is_empty()
            && self.post_ratio.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_specs_parse_aliases() {
        let spec: ColumnSpec = "capacity as mean_capacity".parse().unwrap();
        assert_eq!(spec.column, "capacity");
        assert_eq!(spec.output_name(Function::Mean), "mean_capacity");

        let spec: ColumnSpec = " stop_id ".parse().unwrap();
        assert_eq!(spec.alias, None);
        assert_eq!(spec.output_name(Function::CountDistinct), "count_distinct_stop_id");

        assert!("   ".parse::<ColumnSpec>().is_err());
    }

    #[test]
    fn config_accepts_objects_or_lists() {
        let config: MetricsConfig = serde_json::from_str(r#"{
            "count": ["stop_id"],
            "ratio": {"name": "density", "numerator": "pop", "denominator": "area"},
            "multiply": [{"name": "volume", "columns": ["a", "b"]}],
            "post_ratio": [{"name": "per_stop", "numerator": "sum_pop", "denominator": "count_stop_id"}],
            "median": ["pop"]
        }"#).unwrap();

        assert_eq!(config.count.len(), 1);
        assert_eq!(config.ratio.as_slice()[0].name, "density");
        assert_eq!(config.multiply.as_slice()[0].columns, vec!["a", "b"]);
        assert_eq!(config.post_ratio.len(), 1);
        assert!(config.unknown.contains_key("median"));
        assert!(!config.is_empty());
        assert!(MetricsConfig::default().is_empty());
    }
}
