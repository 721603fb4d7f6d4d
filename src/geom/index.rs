use geo::{BoundingRect, Geometry, Rect};
use rstar::RTree;

use crate::geom::BoundingBox;

/// An R-tree over the bounding boxes of a slice of geometries.
#[derive(Debug, Clone)]
pub(crate) struct GeometryIndex {
    rtree: RTree<BoundingBox>,
}

impl GeometryIndex {
    /// Index geometries by position. Empty geometries have no box and are never returned.
    pub(crate) fn new<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> Self {
        Self {
            rtree: RTree::bulk_load(
                geometries.into_iter().enumerate()
                    .filter_map(|(i, geometry)| geometry.bounding_rect().map(|bbox| BoundingBox::new(i, bbox)))
                    .collect()
            ),
        }
    }

    /// Indices of geometries whose boxes intersect `rect`, in ascending order.
    pub(crate) fn candidates(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut found = self.rtree
            .locate_in_envelope_intersecting(&BoundingBox::envelope_of(rect))
            .map(BoundingBox::idx)
            .collect::<Vec<_>>();
        found.sort_unstable();
        found
    }
}
