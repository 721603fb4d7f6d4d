use std::f64::consts::TAU;

use geo::{Area, Centroid, ConvexHull, Coord, Geometry, LineString, MultiPoint, Point, Polygon, Rect};

/// Vertices used to approximate a circle.
pub const CIRCLE_SEGMENTS: usize = 256;

/// Circle of `radius` around `center`, as a closed ring of `CIRCLE_SEGMENTS` vertices.
pub fn circle(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    let ring = (0..=CIRCLE_SEGMENTS)
        .map(|i| {
            let theta = TAU * (i % CIRCLE_SEGMENTS) as f64 / CIRCLE_SEGMENTS as f64;
            Coord { x: center.x + radius * theta.cos(), y: center.y + radius * theta.sin() }
        })
        .collect::<Vec<_>>();
    Polygon::new(LineString::new(ring), vec![])
}

/// Axis-aligned rectangle `wide` x `length` centered on `center`.
pub fn rectangle(center: Coord<f64>, wide: f64, length: f64) -> Polygon<f64> {
    Rect::new(
        Coord { x: center.x - wide / 2.0, y: center.y - length / 2.0 },
        Coord { x: center.x + wide / 2.0, y: center.y + length / 2.0 },
    ).to_polygon()
}

/// Convex hull of a point set, or `None` when fewer than 3 non-collinear points remain.
pub fn hull_of(coords: &[Coord<f64>]) -> Option<Polygon<f64>> {
    if coords.len() < 3 { return None }

    let hull = MultiPoint::from(coords.iter().map(|&c| Point::from(c)).collect::<Vec<_>>()).convex_hull();
    (hull.unsigned_area() > 0.0).then_some(hull)
}

/// The coordinate a strategy grows from: the point itself, or the centroid of anything larger.
pub fn anchor(geometry: &Geometry<f64>) -> Option<Coord<f64>> {
    match geometry {
        Geometry::Point(point) => Some(point.0),
        other => other.centroid().map(|point| point.0),
    }
    .filter(|c| c.x.is_finite() && c.y.is_finite())
}

/// Planar length of every line in the geometry; zero for points and polygons.
pub fn line_length(geometry: &Geometry<f64>) -> f64 {
    fn length(line_string: &LineString<f64>) -> f64 {
        line_string.lines().map(|line| line.dx().hypot(line.dy())).sum()
    }
    match geometry {
        Geometry::Line(line) => line.dx().hypot(line.dy()),
        Geometry::LineString(line_string) => length(line_string),
        Geometry::MultiLineString(lines) => lines.iter().map(length).sum(),
        Geometry::GeometryCollection(collection) => collection.iter().map(line_length).sum(),
        _ => 0.0,
    }
}
