use geo::Coord;
use rstar::{RTree, primitives::GeomWithData};

use crate::{graph::RoadGraph, node::NodeId};

/// R-tree over the routable nodes of a `RoadGraph`, for nearest-node snapping.
///
/// Nodes without any incident arc are left out so that a snapped source can
/// always reach at least one neighbor.
#[derive(Debug, Clone)]
pub struct NodeIndex {
    tree: RTree<GeomWithData<[f64; 2], NodeId>>,
}

impl NodeIndex {
    pub fn new(graph: &RoadGraph) -> Self {
        let mask = graph.connected_mask();
        Self {
            tree: RTree::bulk_load(
                graph.coords().iter().enumerate()
                    .filter(|&(i, _)| mask[i])
                    .map(|(i, c)| GeomWithData::new([c.x, c.y], NodeId(i as u32)))
                    .collect()
            ),
        }
    }

    /// Number of indexed (routable) nodes.
    #[inline] pub fn len(&self) -> usize { self.tree.size() }

    #[inline] pub fn is_empty(&self) -> bool { self.tree.size() == 0 }

    /// Find the routable node closest to `coord`.
    pub fn nearest(&self, coord: Coord<f64>) -> Option<NodeId> {
        self.tree.nearest_neighbor(&[coord.x, coord.y]).map(|entry| entry.data)
    }
}
