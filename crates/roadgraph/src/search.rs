use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{graph::RoadGraph, node::NodeId};

/// A node reached by `reachable_within`, with its shortest-path cost from the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reached {
    pub node: NodeId,
    pub cost: f64,
}

/// Min-heap entry keyed on cost bits (monotone for non-negative f64).
#[derive(Copy, Clone, Eq, PartialEq)]
struct Entry {
    cost_bits: u64,
    node: u32,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so the cheapest entry pops first.
        other.cost_bits.cmp(&self.cost_bits)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

/// Dijkstra from `source`, returning every node whose shortest-path cost is at most `cutoff`.
///
/// `cost` converts an arc length into a traversal cost (e.g. length in meters to minutes),
/// and must return a non-negative value. Results are sorted by node id. The source is
/// always included with cost 0 when `cutoff >= 0`.
pub fn reachable_within(
    graph: &RoadGraph,
    source: NodeId,
    cutoff: f64,
    cost: impl Fn(f64) -> f64,
) -> Vec<Reached> {
    if source.index() >= graph.node_count() || cutoff.is_nan() || cutoff < 0.0 { return Vec::new() }

    let mut best = vec![f64::INFINITY; graph.node_count()];
    let mut settled = vec![false; graph.node_count()];
    let mut heap = BinaryHeap::new();

    best[source.index()] = 0.0;
    heap.push(Entry { cost_bits: 0f64.to_bits(), node: source.0 });

    while let Some(Entry { cost_bits, node }) = heap.pop() {
        let node = NodeId(node);
        if settled[node.index()] { continue }
        settled[node.index()] = true;

        let dist = f64::from_bits(cost_bits);
        for (next, length) in graph.arcs(node) {
            let candidate = dist + cost(length);
            if candidate <= cutoff && candidate < best[next.index()] {
                best[next.index()] = candidate;
                heap.push(Entry { cost_bits: candidate.to_bits(), node: next.0 });
            }
        }
    }

    best.iter().enumerate()
        .filter(|(_, cost)| cost.is_finite())
        .map(|(i, &cost)| Reached { node: NodeId(i as u32), cost })
        .collect()
}
