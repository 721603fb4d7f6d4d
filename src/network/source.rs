use std::collections::BTreeMap;

use geo::{Coord, Rect};

use crate::{
    error::{CatchmentError, Result},
    geom::{Crs, Projector},
    network::{GraphSource, NetworkMode, RoadEdge, RoutingGraph},
};

/// Serves pre-baked graphs, clipped to the requested bounding box.
#[derive(Debug, Clone, Default)]
pub struct StaticGraphSource {
    default: Option<RoutingGraph>,
    by_mode: BTreeMap<NetworkMode, RoutingGraph>,
}

impl StaticGraphSource {
    /// Serve `graph` for every mode.
    pub fn new(graph: RoutingGraph) -> Self {
        Self { default: Some(graph), by_mode: BTreeMap::new() }
    }

    /// A source with no graphs; every request fails.
    pub fn empty() -> Self { Self::default() }

    /// Serve `graph` for `mode` instead of the default.
    pub fn with_mode(mut self, mode: NetworkMode, graph: RoutingGraph) -> Self {
        self.by_mode.insert(mode, graph);
        self
    }
}

impl GraphSource for StaticGraphSource {
    fn build_or_load_graph(&self, bbox: Rect<f64>, mode: NetworkMode) -> Result<RoutingGraph> {
        let graph = self.by_mode.get(&mode)
            .or(self.default.as_ref())
            .ok_or_else(|| CatchmentError::network("static", format!("no {mode} graph available")))?;
        clip(graph, bbox)
    }
}

#[inline]
fn inside(bbox: &Rect<f64>, c: Coord<f64>) -> bool {
    bbox.min().x <= c.x && c.x <= bbox.max().x && bbox.min().y <= c.y && c.y <= bbox.max().y
}

/// Keep the nodes inside a lon/lat bbox and the edges between them.
pub(crate) fn clip(graph: &RoutingGraph, bbox: Rect<f64>) -> Result<RoutingGraph> {
    let to_lonlat = Projector::new(&graph.crs, &Crs::WGS84)?;

    let mut remap = vec![None; graph.nodes.len()];
    let mut nodes = Vec::new();
    for (i, &node) in graph.nodes.iter().enumerate() {
        if inside(&bbox, to_lonlat.coord(node)?) {
            remap[i] = Some(nodes.len());
            nodes.push(node);
        }
    }

    let edges = graph.edges.iter()
        .filter_map(|edge| Some(RoadEdge {
            from: (*remap.get(edge.from)?)?,
            to: (*remap.get(edge.to)?)?,
            ..*edge
        }))
        .collect();

    Ok(RoutingGraph::new(graph.crs.clone(), nodes, edges))
}

#[cfg(test)]
mod tests {
    use geo::coord;

    use super::*;

    fn graph() -> RoutingGraph {
        RoutingGraph::new(Crs::WGS84, vec![
            coord! { x: 0.0, y: 0.0 }, coord! { x: 0.001, y: 0.0 }, coord! { x: 1.0, y: 1.0 },
        ], vec![
            RoadEdge { from: 0, to: 1, length: Some(111.0), oneway: false },
            RoadEdge { from: 1, to: 2, length: None, oneway: false },
        ])
    }

    #[test]
    fn clipping_drops_outside_nodes_and_their_edges() {
        let source = StaticGraphSource::new(graph());
        let bbox = Rect::new(coord! { x: -0.01, y: -0.01 }, coord! { x: 0.01, y: 0.01 });
        let clipped = source.build_or_load_graph(bbox, NetworkMode::Walk).unwrap();
        assert_eq!(clipped.node_count(), 2);
        assert_eq!(clipped.edges, vec![RoadEdge { from: 0, to: 1, length: Some(111.0), oneway: false }]);
    }

    #[test]
    fn mode_specific_graph_wins() {
        let drive = RoutingGraph::new(Crs::WGS84, vec![coord! { x: 0.0, y: 0.0 }], vec![]);
        let source = StaticGraphSource::new(graph()).with_mode(NetworkMode::Drive, drive);
        let bbox = Rect::new(coord! { x: -2.0, y: -2.0 }, coord! { x: 2.0, y: 2.0 });
        assert_eq!(source.build_or_load_graph(bbox, NetworkMode::Drive).unwrap().node_count(), 1);
        assert_eq!(source.build_or_load_graph(bbox, NetworkMode::Walk).unwrap().node_count(), 3);
    }

    #[test]
    fn empty_source_fails() {
        let bbox = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        assert!(StaticGraphSource::empty().build_or_load_graph(bbox, NetworkMode::Walk).is_err());
    }
}
