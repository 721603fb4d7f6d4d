pub mod graph;
pub mod index;
pub mod node;
pub mod search;

pub use graph::{GraphError, RoadGraph, RoadGraphBuilder};
pub use index::NodeIndex;
pub use node::NodeId;
pub use search::{reachable_within, Reached};
