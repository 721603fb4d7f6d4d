use std::{collections::BTreeMap, io::Read};

use serde::{Deserialize, Serialize};

use crate::{
    catchment::{CatchmentParams, StrategyKind},
    error::{CatchmentError, Result},
    filter::Filter,
    geom::Crs,
    join::Predicate,
    layer::GeometryKind,
    metrics::MetricsConfig,
    network::NetworkMode,
};

/// A single value or a list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self { OneOrMany::Many(Vec::new()) }
}

/// Where an input layer is read from. Reading is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSource {
    pub path: String,
    #[serde(default)]
    pub format: Option<String>,
}

/// Raw per-layer catchment configuration, validated into `CatchmentParams`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferParams {
    #[serde(default)]
    pub geometry_type: Option<GeometryKind>,
    #[serde(default)]
    pub buffer_type: Option<StrategyKind>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub wide: Option<f64>,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub travel_time: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub network_type: Option<NetworkMode>,
}

pub const DEFAULT_CELL_SIZE: f64 = 100.0;
pub const DEFAULT_NETWORK_DISTANCE: f64 = 500.0;
pub const DEFAULT_ISOCHRONE_MARGIN: f64 = 2000.0;
pub const DEFAULT_SPEED_KMH: f64 = 4.5;
pub const DEFAULT_TRAVEL_TIME_MIN: f64 = 5.0;

impl BufferParams {
    /// The geometry kind the strategy is applied to (defaults to points).
    pub fn kind(&self) -> GeometryKind {
        self.geometry_type.unwrap_or(GeometryKind::Points)
    }

    /// Check and default the parameters of the configured strategy.
    pub fn validate(&self, layer: &str) -> Result<CatchmentParams> {
        let strategy = self.buffer_type
            .ok_or_else(|| CatchmentError::config(layer, "missing buffer_type"))?;

        let positive = |name: &str, value: Option<f64>, default: Option<f64>| -> Result<f64> {
            match value.or(default) {
                Some(v) if v.is_finite() && v > 0.0 => Ok(v),
                Some(v) => Err(CatchmentError::config(layer, format!("{name} must be a positive number, got {v}"))),
                None => Err(CatchmentError::config(layer, format!("missing {name} for {strategy} catchments"))),
            }
        };
        let mode = self.network_type.unwrap_or_default();

        Ok(match strategy {
            StrategyKind::Circular => CatchmentParams::Circular {
                distance: positive("distance", self.distance, None)?,
            },
            StrategyKind::Grid => CatchmentParams::Grid {
                wide: positive("wide", self.wide, Some(DEFAULT_CELL_SIZE))?,
                length: positive("length", self.length, Some(DEFAULT_CELL_SIZE))?,
            },
            StrategyKind::Zones => CatchmentParams::Zones {
                wide: positive("wide", self.wide, Some(DEFAULT_CELL_SIZE))?,
                length: positive("length", self.length, Some(DEFAULT_CELL_SIZE))?,
            },
            StrategyKind::Network => CatchmentParams::Network {
                distance: positive("distance", self.distance, Some(DEFAULT_NETWORK_DISTANCE))?,
                mode,
            },
            StrategyKind::Isochrone => {
                let budget = match &self.travel_time {
                    None => Some(DEFAULT_TRAVEL_TIME_MIN),
                    Some(times) => times.as_slice().iter().copied().reduce(f64::max),
                };
                CatchmentParams::Isochrone {
                    travel_time: positive("travel_time", budget, None)?,
                    speed: positive("speed", self.speed, Some(DEFAULT_SPEED_KMH))?,
                    distance: positive("distance", self.distance, Some(DEFAULT_ISOCHRONE_MARGIN))?,
                    mode,
                }
            }
        })
    }
}

/// The predicate used for one geometry kind of candidate layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    #[serde(rename = "type")]
    pub predicate: Predicate,
}

fn default_projected_crs() -> Crs { Crs::Epsg(32618) }

fn default_chunk_size() -> usize { 256 }

/// Declarative description of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub layers: BTreeMap<String, LayerSource>,
    #[serde(default)]
    pub buffer_layer: BTreeMap<String, BufferParams>,
    #[serde(default)]
    pub join_layers: BTreeMap<GeometryKind, JoinSpec>,
    #[serde(default)]
    pub groupby_columns: Vec<String>,
    #[serde(default)]
    pub metrics_config: MetricsConfig,
    #[serde(default)]
    pub filter_files: BTreeMap<String, Filter>,
    #[serde(default)]
    pub filter_global: Vec<Filter>,
    #[serde(default = "default_projected_crs")]
    pub default_projected_crs: Crs,
    #[serde(default)]
    pub compute_proportions: bool,
    /// Worker threads for graph-based catchments; defaults to the available cores.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layers: BTreeMap::new(),
            buffer_layer: BTreeMap::new(),
            join_layers: BTreeMap::new(),
            groupby_columns: Vec::new(),
            metrics_config: MetricsConfig::default(),
            filter_files: BTreeMap::new(),
            filter_global: Vec::new(),
            default_projected_crs: default_projected_crs(),
            compute_proportions: false,
            workers: None,
            chunk_size: default_chunk_size(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn from_reader(reader: impl Read) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }

    /// Predicates per candidate geometry kind.
    pub fn predicates(&self) -> BTreeMap<GeometryKind, Predicate> {
        self.join_layers.iter().map(|(&kind, spec)| (kind, spec.predicate)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "layers": {"stations": {"path": "stations.geojson", "format": "geojson"}},
        "buffer_layer": {"stations": {"geometry_type": "Point", "buffer_type": "isochrone",
                                       "travel_time": [5, 10], "speed": 4.5, "network_type": "walk"}},
        "join_layers": {"points": {"type": "contains"}, "polygons": {"type": "intersects"}},
        "groupby_columns": ["catchment_id"],
        "metrics_config": {"count": ["stop_id"], "mean": ["capacity as mean_capacity"]},
        "filter_files": {"stops": {"column": "active", "value": 1, "operator": "=="}},
        "workers": 2
    }"#;

    #[test]
    fn parse_full_config() {
        let config = PipelineConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.layers["stations"].path, "stations.geojson");
        assert_eq!(config.default_projected_crs, Crs::Epsg(32618));
        assert_eq!(config.chunk_size, 256);
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.predicates()[&GeometryKind::Points], Predicate::Contains);
        assert_eq!(config.predicates()[&GeometryKind::Polygons], Predicate::Intersects);

        let params = config.buffer_layer["stations"].validate("stations").unwrap();
        assert_eq!(params, CatchmentParams::Isochrone {
            travel_time: 10.0, speed: 4.5, distance: DEFAULT_ISOCHRONE_MARGIN, mode: NetworkMode::Walk,
        });
    }

    #[test]
    fn defaults_fill_in() {
        let grid = BufferParams { buffer_type: Some(StrategyKind::Grid), ..Default::default() };
        assert_eq!(grid.validate("g").unwrap(), CatchmentParams::Grid { wide: 100.0, length: 100.0 });

        let network = BufferParams { buffer_type: Some(StrategyKind::Network), ..Default::default() };
        assert_eq!(network.validate("n").unwrap(), CatchmentParams::Network { distance: 500.0, mode: NetworkMode::Walk });

        let scalar: BufferParams = serde_json::from_str(r#"{"buffer_type": "isochrone", "travel_time": 7}"#).unwrap();
        assert!(matches!(scalar.validate("i").unwrap(), CatchmentParams::Isochrone { travel_time, .. } if travel_time == 7.0));
    }

    #[test]
    fn invalid_parameters_are_configuration_errors() {
        let circular = BufferParams { buffer_type: Some(StrategyKind::Circular), ..Default::default() };
        assert!(matches!(circular.validate("c"), Err(CatchmentError::Configuration { .. })));

        let negative = BufferParams { buffer_type: Some(StrategyKind::Circular), distance: Some(-5.0), ..Default::default() };
        assert!(matches!(negative.validate("c"), Err(CatchmentError::Configuration { .. })));

        assert!(matches!(BufferParams::default().validate("x"), Err(CatchmentError::Configuration { .. })));
    }
}
