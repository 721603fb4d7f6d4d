use std::sync::Arc;

use ahash::AHashMap;
use geo::Rect;
use log::{debug, info};

use crate::{
    error::Result,
    network::{GraphSource, NetworkMode, RoutingGraph},
};

type GraphKey = ([u64; 4], NetworkMode);

/// Memoizes graph requests so each (bbox, mode) is built or downloaded once per run.
/// Failures are cached too.
pub struct GraphCache {
    source: Box<dyn GraphSource>,
    graphs: AHashMap<GraphKey, Result<Arc<RoutingGraph>>>,
}

impl GraphCache {
    pub fn new(source: impl GraphSource + 'static) -> Self {
        Self { source: Box::new(source), graphs: AHashMap::new() }
    }

    /// Number of distinct requests made so far.
    #[inline] pub fn len(&self) -> usize { self.graphs.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.graphs.is_empty() }

    /// Forget every cached graph and failure.
    pub fn clear(&mut self) { self.graphs.clear() }

    /// Get the graph for a lon/lat bounding box and mode, requesting it on first use.
    pub fn get(&mut self, bbox: Rect<f64>, mode: NetworkMode) -> Result<Arc<RoutingGraph>> {
        let key = ([bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y].map(f64::to_bits), mode);
        if let Some(cached) = self.graphs.get(&key) {
            debug!("[network] reusing cached {mode} graph");
            return cached.clone()
        }

        info!("[network] requesting {mode} graph for bbox ({:.5}, {:.5}) - ({:.5}, {:.5})",
            bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y);
        let graph = self.source.build_or_load_graph(bbox, mode).map(Arc::new);
        self.graphs.insert(key, graph.clone());
        graph
    }
}
