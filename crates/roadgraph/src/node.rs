use std::fmt;

/// Identifies a single node (street intersection or way vertex) within a `RoadGraph`.
///
/// Nodes are assigned contiguous indices starting from `0`, in insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline] pub fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}
