//! Routing graph acquisition for the network and isochrone strategies.
//!
//! Graphs are requested through the [`GraphSource`] capability with a lon/lat
//! bounding box and a travel mode, and cached per run by [`GraphCache`].

mod cache;
mod lines;
#[cfg(feature = "download")]
mod overpass;
mod source;

use std::{fmt, sync::OnceLock};

use geo::{Coord, Rect};
use log::debug;
use regex::Regex;
use roadgraph::{RoadGraph, RoadGraphBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CatchmentError, Result},
    geom::{Crs, Projector},
};

pub use cache::GraphCache;
pub use lines::LineLayerGraphSource;
#[cfg(feature = "download")]
pub use overpass::OverpassGraphSource;
pub use source::StaticGraphSource;

/// Travel mode a routing graph is built for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Walk,
    Drive,
    #[serde(alias = "bicycle")]
    Bike,
}

impl NetworkMode {
    /// Highway values that are never usable in this mode.
    pub(crate) fn excluded_highways(self) -> &'static str {
        match self {
            NetworkMode::Walk => "abandoned|bus_guideway|construction|cycleway|motor|no|planned|platform|proposed|raceway|razed",
            NetworkMode::Drive => "abandoned|bridleway|bus_guideway|construction|corridor|cycleway|elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|razed|service|steps|track",
            NetworkMode::Bike => "abandoned|bus_guideway|construction|corridor|elevator|escalator|footway|motor|no|planned|platform|proposed|raceway|razed|steps",
        }
    }

    /// Whether a way tagged `highway=<highway>` can be travelled in this mode.
    pub fn allows(self, highway: &str) -> bool {
        static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [NetworkMode::Walk, NetworkMode::Drive, NetworkMode::Bike]
                .map(|mode| Regex::new(mode.excluded_highways()).expect("valid highway pattern"))
        });
        !patterns[self as usize].is_match(highway)
    }

    /// Whether one-way restrictions apply.
    #[inline] pub fn respects_oneway(self) -> bool { self == NetworkMode::Drive }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkMode::Walk => "walk",
            NetworkMode::Drive => "drive",
            NetworkMode::Bike => "bike",
        })
    }
}

/// A street segment between two nodes of a `RoutingGraph`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadEdge {
    pub from: usize,
    pub to: usize,
    /// Length in meters; measured in the working CRS when absent.
    pub length: Option<f64>,
    pub oneway: bool,
}

/// A street network as delivered by a graph source, in its own CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingGraph {
    pub crs: Crs,
    pub nodes: Vec<Coord<f64>>,
    pub edges: Vec<RoadEdge>,
}

impl RoutingGraph {
    pub fn new(crs: Crs, nodes: Vec<Coord<f64>>, edges: Vec<RoadEdge>) -> Self {
        Self { crs, nodes, edges }
    }

    #[inline] pub fn node_count(&self) -> usize { self.nodes.len() }

    #[inline] pub fn edge_count(&self) -> usize { self.edges.len() }

    /// Pack the graph into a searchable `RoadGraph` with coordinates in `working`.
    pub fn to_road_graph(&self, layer: &str, working: &Crs) -> Result<RoadGraph> {
        let projector = Projector::new(&self.crs, working)?;

        let mut builder = RoadGraphBuilder::with_capacity(self.nodes.len(), self.edges.len());
        for &node in &self.nodes {
            builder.add_node(projector.coord(node)?);
        }
        for edge in &self.edges {
            if edge.from >= self.nodes.len() || edge.to >= self.nodes.len() {
                return Err(CatchmentError::network(layer, format!("edge {} -> {} references a missing node", edge.from, edge.to)))
            }
            let (from, to) = (roadgraph::NodeId(edge.from as u32), roadgraph::NodeId(edge.to as u32));
            match edge.length {
                Some(length) => builder.add_edge(from, to, length, edge.oneway),
                None => builder.add_straight_edge(from, to, edge.oneway),
            }
        }

        let graph = builder.build().map_err(|e| CatchmentError::network(layer, e.to_string()))?;
        debug!("[network] graph for '{layer}': {} nodes, {} arcs", graph.node_count(), graph.arc_count());
        Ok(graph)
    }
}

/// Anything that can produce a routing graph covering a lon/lat bounding box.
pub trait GraphSource {
    fn build_or_load_graph(&self, bbox: Rect<f64>, mode: NetworkMode) -> Result<RoutingGraph>;
}

impl<S: GraphSource + ?Sized> GraphSource for Box<S> {
    fn build_or_load_graph(&self, bbox: Rect<f64>, mode: NetworkMode) -> Result<RoutingGraph> {
        (**self).build_or_load_graph(bbox, mode)
    }
}

/// Widen a bounding box by `margin` on every side.
pub fn widen(bbox: Rect<f64>, margin: f64) -> Rect<f64> {
    Rect::new(
        Coord { x: bbox.min().x - margin, y: bbox.min().y - margin },
        Coord { x: bbox.max().x + margin, y: bbox.max().y + margin },
    )
}
