mod bbox;
mod index;
mod proj;
mod shapes;
mod validity;

pub(crate) use bbox::BoundingBox;
pub(crate) use index::GeometryIndex;
pub use proj::{area_km2, Crs, Projector};
pub use shapes::{anchor, circle, hull_of, line_length, rectangle, CIRCLE_SEGMENTS};
pub use validity::{problem, repair};
