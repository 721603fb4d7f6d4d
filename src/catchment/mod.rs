//! Catchment generation: one polygon of influence per source feature.

mod circular;
mod graph;
mod grid;
mod registry;

use std::fmt;

use ahash::AHashMap;
use geo::{Centroid, Coord, Polygon};
use log::{debug, warn};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CatchmentError, Result},
    geom::{area_km2, Crs, Projector},
    layer::{Attributes, FeatureLayer, GeometryKind},
    network::{GraphCache, NetworkMode},
    value::Value,
};

pub use circular::CircularStrategy;
pub use graph::{IsochroneStrategy, NetworkStrategy};
pub use grid::{GridStrategy, ZonesStrategy};
pub use registry::StrategyRegistry;

/// The catchment construction algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Circular,
    Grid,
    Zones,
    Network,
    Isochrone,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Circular => "circular",
            StrategyKind::Grid => "grid",
            StrategyKind::Zones => "zones",
            StrategyKind::Network => "network",
            StrategyKind::Isochrone => "isochrone",
        })
    }
}

/// Validated strategy parameters. Distances in meters, times in minutes, speed in km/h.
#[derive(Debug, Clone, PartialEq)]
pub enum CatchmentParams {
    Circular { distance: f64 },
    Grid { wide: f64, length: f64 },
    Zones { wide: f64, length: f64 },
    Network { distance: f64, mode: NetworkMode },
    /// `distance` is the margin around the layer used when requesting the graph.
    Isochrone { travel_time: f64, speed: f64, distance: f64, mode: NetworkMode },
}

impl CatchmentParams {
    pub fn kind(&self) -> StrategyKind {
        match self {
            CatchmentParams::Circular { .. } => StrategyKind::Circular,
            CatchmentParams::Grid { .. } => StrategyKind::Grid,
            CatchmentParams::Zones { .. } => StrategyKind::Zones,
            CatchmentParams::Network { .. } => StrategyKind::Network,
            CatchmentParams::Isochrone { .. } => StrategyKind::Isochrone,
        }
    }

    /// Radius of the circle used when no routing graph is available.
    pub fn fallback_radius(&self) -> Option<f64> {
        match *self {
            CatchmentParams::Network { distance, .. } => Some(distance),
            CatchmentParams::Isochrone { travel_time, speed, .. } => Some(speed * 1000.0 / 60.0 * travel_time),
            _ => None,
        }
    }

    /// Parameter columns carried by every catchment and join row.
    pub fn columns(&self) -> Vec<(&'static str, Value)> {
        let mut columns = vec![("buffer_type", Value::from(self.kind().to_string()))];
        match *self {
            CatchmentParams::Circular { distance } => columns.push(("distance", distance.into())),
            CatchmentParams::Grid { wide, length } | CatchmentParams::Zones { wide, length } => {
                columns.push(("wide", wide.into()));
                columns.push(("length", length.into()));
            }
            CatchmentParams::Network { distance, mode } => {
                columns.push(("distance", distance.into()));
                columns.push(("network_type", mode.to_string().into()));
            }
            CatchmentParams::Isochrone { travel_time, speed, mode, .. } => {
                columns.push(("travel_time", travel_time.into()));
                columns.push(("speed", speed.into()));
                columns.push(("network_type", mode.to_string().into()));
            }
        }
        columns
    }
}

/// Hands out run-unique catchment ids, starting at 1.
#[derive(Debug, Clone)]
pub struct CatchmentIdSequence {
    next: u64,
}

impl Default for CatchmentIdSequence {
    fn default() -> Self { Self { next: 1 } }
}

impl CatchmentIdSequence {
    pub fn new() -> Self { Self::default() }

    /// Take the next id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next call to `next_id` will return.
    #[inline] pub fn peek(&self) -> u64 { self.next }
}

/// A degradation recorded while building a catchment layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub feature: Option<usize>,
    pub reason: String,
}

impl Diagnostic {
    pub fn feature(feature: usize, reason: impl Into<String>) -> Self {
        Self { feature: Some(feature), reason: reason.into() }
    }

    pub fn layer(reason: impl Into<String>) -> Self {
        Self { feature: None, reason: reason.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.feature {
            Some(i) => write!(f, "feature {i}: {}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// A polygon of influence around one source feature. `geometry` is `None` when no
/// catchment could be built for the feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Catchment {
    pub id: u64,
    pub source_layer: String,
    pub source_index: usize,
    pub geometry: Option<Polygon<f64>>,
    pub area_km2: Option<f64>,
    pub params: CatchmentParams,
    /// Source feature attributes, plus strategy extras such as `cell_row`/`cell_col`.
    pub attributes: Attributes,
}

/// All catchments built from one source layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchmentLayer {
    /// `"<source layer>_buffer"`.
    pub name: String,
    pub source_layer: String,
    pub kind: GeometryKind,
    pub crs: Crs,
    pub catchments: Vec<Catchment>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CatchmentLayer {
    #[inline] pub fn len(&self) -> usize { self.catchments.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.catchments.is_empty() }

    /// Catchments that have a geometry.
    pub fn built(&self) -> impl Iterator<Item = &Catchment> {
        self.catchments.iter().filter(|c| c.geometry.is_some())
    }
}

/// One strategy result, in the source layer's CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub source_index: usize,
    pub geometry: Option<Polygon<f64>>,
    pub extra: Attributes,
}

impl Outline {
    pub fn new(source_index: usize, geometry: Option<Polygon<f64>>) -> Self {
        Self { source_index, geometry, extra: Attributes::new() }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }
}

/// Outlines in source feature order, plus the degradations met on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyOutput {
    pub outlines: Vec<Outline>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Shared resources available to strategies.
pub struct BuildContext<'a> {
    pub graphs: &'a mut GraphCache,
    pub pool: &'a ThreadPool,
    pub chunk_size: usize,
}

/// Uniform contract of every catchment construction algorithm.
pub trait CatchmentStrategy: Send + Sync {
    fn build(&self, ctx: &mut BuildContext<'_>, layer: &FeatureLayer, params: &CatchmentParams) -> Result<StrategyOutput>;
}

/// Metric (projected) frames keyed by CRS, with transforms to and from the layer CRS.
pub(crate) struct MetricFrames {
    layer_crs: Crs,
    frames: AHashMap<Crs, (Projector, Projector)>,
}

impl MetricFrames {
    pub(crate) fn new(layer_crs: &Crs) -> Self {
        Self { layer_crs: layer_crs.clone(), frames: AHashMap::new() }
    }

    /// The metric CRS for work around `center` (layer coordinates).
    #[inline]
    pub(crate) fn crs_near(&self, center: Coord<f64>) -> Crs {
        self.layer_crs.metric_near(center)
    }

    /// Transforms (layer -> metric, metric -> layer) for the frame around `center`.
    pub(crate) fn around(&mut self, center: Coord<f64>) -> Result<&(Projector, Projector)> {
        let metric = self.crs_near(center);
        if !self.frames.contains_key(&metric) {
            let pair = (Projector::new(&self.layer_crs, &metric)?, Projector::new(&metric, &self.layer_crs)?);
            self.frames.insert(metric.clone(), pair);
        }
        self.frames.get(&metric).ok_or_else(|| CatchmentError::Projection(format!("no frame for {metric}")))
    }
}

/// Centroid of every feature in a layer, in layer coordinates.
pub(crate) fn layer_center(layer: &FeatureLayer) -> Option<Coord<f64>> {
    let bounds = layer.bounds()?;
    Some(bounds.centroid().0)
}

/// Run the configured strategy over a layer and assign ids and areas.
///
/// Fails with `Configuration`/`Geometry` errors when the (kind, strategy) pair is
/// unsupported or the layer has no CRS; per-feature problems become sentinels.
pub fn generate(
    registry: &StrategyRegistry,
    ctx: &mut BuildContext<'_>,
    ids: &mut CatchmentIdSequence,
    layer: &FeatureLayer,
    kind: GeometryKind,
    params: &CatchmentParams,
) -> Result<CatchmentLayer> {
    let strategy = registry.get(kind, params.kind())
        .ok_or_else(|| CatchmentError::geometry(&layer.name, None, format!("{} catchments are not supported for {kind}", params.kind())))?;
    let crs = layer.crs.clone()
        .ok_or_else(|| CatchmentError::config(&layer.name, "layer has no coordinate system"))?;

    let StrategyOutput { outlines, mut diagnostics } = strategy.build(ctx, layer, params)?;

    let mut catchments = Vec::with_capacity(outlines.len());
    for Outline { source_index, geometry, extra } in outlines {
        let area = match &geometry {
            Some(polygon) => match area_km2(polygon, &crs) {
                Ok(area) => Some(area),
                Err(e) => {
                    diagnostics.push(Diagnostic::feature(source_index, format!("area: {e}")));
                    None
                }
            },
            None => None,
        };
        let mut attributes = layer.features.get(source_index)
            .map(|feature| feature.attributes.clone())
            .unwrap_or_default();
        attributes.extend(extra);

        catchments.push(Catchment {
            id: ids.next_id(),
            source_layer: layer.name.clone(),
            source_index,
            geometry,
            area_km2: area,
            params: params.clone(),
            attributes,
        });
    }

    for diagnostic in &diagnostics {
        warn!("[catchment] '{}': {diagnostic}", layer.name);
    }
    debug!("[catchment] built {} {} catchments for '{}'", catchments.len(), params.kind(), layer.name);

    Ok(CatchmentLayer {
        name: format!("{}_buffer", layer.name),
        source_layer: layer.name.clone(),
        kind,
        crs,
        catchments,
        diagnostics,
    })
}
