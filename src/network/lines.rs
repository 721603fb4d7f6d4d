use ahash::AHashMap;
use geo::{BoundingRect, Coord, Geometry, Intersects, LineString, Rect};
use log::debug;

use crate::{
    error::{CatchmentError, Result},
    geom::Crs,
    layer::FeatureLayer,
    network::{GraphSource, NetworkMode, RoadEdge, RoutingGraph},
    value::Value,
};

/// Builds routing graphs from a lon/lat line layer (e.g. a street centerline file).
///
/// Every vertex becomes a node; vertices closer than `tolerance` meters are
/// merged. Lines with a `highway` attribute are filtered by mode, and a truthy
/// `oneway` attribute makes the line directional when driving.
#[derive(Debug, Clone)]
pub struct LineLayerGraphSource {
    layer: FeatureLayer,
    tolerance: f64,
}

impl LineLayerGraphSource {
    pub fn new(layer: FeatureLayer) -> Self {
        Self { layer, tolerance: 0.5 }
    }

    /// Snap tolerance in meters.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

fn is_oneway(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i == 1,
        Value::Str(s) => matches!(s.as_str(), "yes" | "true" | "1"),
        _ => false,
    }
}

impl GraphSource for LineLayerGraphSource {
    fn build_or_load_graph(&self, bbox: Rect<f64>, mode: NetworkMode) -> Result<RoutingGraph> {
        if self.layer.crs.as_ref().is_some_and(|crs| *crs != Crs::WGS84) {
            return Err(CatchmentError::network(&self.layer.name, "line layer must be in EPSG:4326"))
        }

        // Degrees per meter along a meridian.
        let step = (self.tolerance / 111_320.0).max(f64::EPSILON);
        let mut lookup = AHashMap::<(i64, i64), usize>::new();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        let mut node_for = |c: Coord<f64>| -> usize {
            let key = ((c.x / step).round() as i64, (c.y / step).round() as i64);
            *lookup.entry(key).or_insert_with(|| {
                nodes.push(c);
                nodes.len() - 1
            })
        };

        for feature in &self.layer.features {
            let allowed = feature.get("highway").as_str().is_none_or(|highway| mode.allows(highway));
            if !allowed { continue }
            if !feature.geometry.bounding_rect().is_some_and(|rect| rect.intersects(&bbox)) { continue }

            let oneway = mode.respects_oneway() && is_oneway(feature.get("oneway"));
            let lines: Vec<&LineString<f64>> = match &feature.geometry {
                Geometry::LineString(line) => vec![line],
                Geometry::MultiLineString(lines) => lines.iter().collect(),
                _ => continue,
            };
            for line in lines {
                for segment in line.lines() {
                    let (from, to) = (node_for(segment.start), node_for(segment.end));
                    if from != to {
                        edges.push(RoadEdge { from, to, length: None, oneway });
                    }
                }
            }
        }

        debug!("[network] built {mode} graph from '{}': {} nodes, {} edges", self.layer.name, nodes.len(), edges.len());
        Ok(RoutingGraph::new(Crs::WGS84, nodes, edges))
    }
}
