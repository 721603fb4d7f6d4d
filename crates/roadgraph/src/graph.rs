use std::fmt;

use geo::{Coord, Rect};

use crate::node::NodeId;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur when assembling a `RoadGraph`.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// An edge references a node index that was never added.
    UnknownNode(u32),
    /// An edge length is negative, NaN or infinite.
    InvalidLength { from: u32, to: u32, length: f64 },
    /// A node coordinate is NaN or infinite.
    InvalidCoord(u32),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownNode(node) => write!(f, "edge references unknown node {node}"),
            GraphError::InvalidLength { from, to, length } =>
                write!(f, "edge {from} -> {to} has invalid length {length}"),
            GraphError::InvalidCoord(node) => write!(f, "node {node} has a non-finite coordinate"),
        }
    }
}

impl std::error::Error for GraphError {}

// ---------------------------------------------------------------------------
// RoadGraph
// ---------------------------------------------------------------------------

/// A directed road graph in compressed sparse row format.
///
/// Two-way streets are stored as a pair of arcs. Node coordinates are in
/// whatever planar system the caller built the graph in; arc lengths are the
/// traversal cost basis (normally meters).
#[derive(Debug, Clone, Default)]
pub struct RoadGraph {
    coords: Vec<Coord<f64>>,
    offsets: Vec<u32>,
    targets: Vec<u32>,
    lengths: Vec<f64>,
}

impl RoadGraph {
    /// Get the number of nodes in the graph.
    #[inline] pub fn node_count(&self) -> usize { self.coords.len() }

    /// Get the number of directed arcs in the graph.
    #[inline] pub fn arc_count(&self) -> usize { self.targets.len() }

    /// Check whether the graph has no arcs, i.e. nothing is routable.
    #[inline] pub fn is_unroutable(&self) -> bool { self.targets.is_empty() }

    /// Get the coordinate of a node.
    #[inline] pub fn coord(&self, node: NodeId) -> Coord<f64> { self.coords[node.index()] }

    /// Get a reference to all node coordinates, indexed by `NodeId`.
    #[inline] pub fn coords(&self) -> &[Coord<f64>] { &self.coords }

    /// Get the range of arcs leaving a given node.
    #[inline]
    fn range(&self, node: NodeId) -> std::ops::Range<usize> {
        self.offsets[node.index()] as usize .. self.offsets[node.index() + 1] as usize
    }

    /// Get the out-degree of a given node.
    #[inline] pub fn degree(&self, node: NodeId) -> usize { self.range(node).len() }

    /// Get an iterator over the successors and arc lengths of a given node.
    #[inline]
    pub fn arcs(&self, node: NodeId) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.range(node).map(move |arc| (NodeId(self.targets[arc]), self.lengths[arc]))
    }

    /// Flag every node that has at least one incident arc (incoming or outgoing).
    pub fn connected_mask(&self) -> Vec<bool> {
        let mut mask = (0..self.node_count())
            .map(|node| self.degree(NodeId(node as u32)) > 0)
            .collect::<Vec<_>>();
        for &target in &self.targets { mask[target as usize] = true }
        mask
    }

    /// Compute the bounding rectangle of all node coordinates.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let first = *self.coords.first()?;
        let (min, max) = self.coords.iter().fold((first, first), |(min, max), c| (
            Coord { x: min.x.min(c.x), y: min.y.min(c.y) },
            Coord { x: max.x.max(c.x), y: max.y.max(c.y) },
        ));
        Some(Rect::new(min, max))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Incrementally collects nodes and edges, then packs them into a `RoadGraph`.
#[derive(Debug, Default)]
pub struct RoadGraphBuilder {
    coords: Vec<Coord<f64>>,
    arcs: Vec<(u32, u32, f64)>,
}

impl RoadGraphBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self { coords: Vec::with_capacity(nodes), arcs: Vec::with_capacity(edges * 2) }
    }

    /// Add a node and return its id.
    pub fn add_node(&mut self, coord: Coord<f64>) -> NodeId {
        self.coords.push(coord);
        NodeId(self.coords.len() as u32 - 1)
    }

    /// Add a street segment between two nodes. Two-way segments add both arcs.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, length: f64, oneway: bool) {
        self.arcs.push((from.0, to.0, length));
        if !oneway { self.arcs.push((to.0, from.0, length)) }
    }

    /// Add a street segment whose length is the Euclidean distance between its endpoints.
    pub fn add_straight_edge(&mut self, from: NodeId, to: NodeId, oneway: bool) {
        let (a, b) = (self.coords[from.index()], self.coords[to.index()]);
        self.add_edge(from, to, (b.x - a.x).hypot(b.y - a.y), oneway);
    }

    /// Validate and pack into CSR form. Arcs keep their insertion order per source node.
    pub fn build(self) -> Result<RoadGraph, GraphError> {
        let num_nodes = self.coords.len();

        if let Some(i) = self.coords.iter().position(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(GraphError::InvalidCoord(i as u32));
        }
        for &(from, to, length) in &self.arcs {
            if from as usize >= num_nodes { return Err(GraphError::UnknownNode(from)) }
            if to as usize >= num_nodes { return Err(GraphError::UnknownNode(to)) }
            if !length.is_finite() || length < 0.0 {
                return Err(GraphError::InvalidLength { from, to, length });
            }
        }

        // Counting sort of arcs by source node.
        let mut offsets = vec![0u32; num_nodes + 1];
        for &(from, _, _) in &self.arcs { offsets[from as usize + 1] += 1 }
        for i in 0..num_nodes { offsets[i + 1] += offsets[i] }

        let mut cursor = offsets.clone();
        let mut targets = vec![0u32; self.arcs.len()];
        let mut lengths = vec![0.0; self.arcs.len()];
        for (from, to, length) in self.arcs {
            let slot = cursor[from as usize] as usize;
            targets[slot] = to;
            lengths[slot] = length;
            cursor[from as usize] += 1;
        }

        Ok(RoadGraph { coords: self.coords, offsets, targets, lengths })
    }
}
