use geo::{Area, BooleanOps, Geometry, MultiLineString, MultiPolygon, Polygon, Relate};

use crate::{geom::line_length, value::round_to};

/// Share of `feature` inside `catchment`, rounded to 4 decimals: area share for
/// polygons, length share for lines, 1 or 0 for points (a point on the boundary is
/// not contained).
pub fn proportion(catchment: &Polygon<f64>, feature: &Geometry<f64>) -> f64 {
    let share = match feature {
        Geometry::Polygon(polygon) => area_share(catchment, &MultiPolygon(vec![polygon.clone()])),
        Geometry::MultiPolygon(polygons) => area_share(catchment, polygons),
        Geometry::Rect(rect) => area_share(catchment, &MultiPolygon(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => area_share(catchment, &MultiPolygon(vec![triangle.to_polygon()])),
        Geometry::LineString(line_string) => length_share(catchment, &MultiLineString(vec![line_string.clone()])),
        Geometry::MultiLineString(lines) => length_share(catchment, lines),
        Geometry::Line(line) => length_share(catchment, &MultiLineString(vec![(*line).into()])),
        point_like => if catchment.relate(point_like).is_contains() { 1.0 } else { 0.0 },
    };
    round_to(share.clamp(0.0, 1.0), 4)
}

fn area_share(catchment: &Polygon<f64>, feature: &MultiPolygon<f64>) -> f64 {
    let total = feature.unsigned_area();
    if total <= 0.0 { return 0.0 }
    catchment.intersection(feature).unsigned_area() / total
}

fn length_share(catchment: &Polygon<f64>, feature: &MultiLineString<f64>) -> f64 {
    let total = line_length(&Geometry::MultiLineString(feature.clone()));
    if total <= 0.0 { return 0.0 }
    let inside = catchment.clip(feature, false);
    line_length(&Geometry::MultiLineString(inside)) / total
}

#[cfg(test)]
mod tests {
    use geo::{line_string, point, polygon};

    use super::*;

    fn square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)]
    }

    #[test]
    fn polygon_area_share() {
        let half_out = polygon![(x: 5.0, y: 0.0), (x: 15.0, y: 0.0), (x: 15.0, y: 10.0), (x: 5.0, y: 10.0)];
        assert!((proportion(&square(), &half_out.into()) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn line_length_share() {
        let line = line_string![(x: -10.0, y: 5.0), (x: 5.0, y: 5.0)];
        assert!((proportion(&square(), &line.into()) - 0.3333).abs() < 1e-9);
    }

    #[test]
    fn points_are_all_or_nothing() {
        assert_eq!(proportion(&square(), &point!(x: 3.0, y: 3.0).into()), 1.0);
        assert_eq!(proportion(&square(), &point!(x: 30.0, y: 3.0).into()), 0.0);
        assert_eq!(proportion(&square(), &point!(x: 10.0, y: 5.0).into()), 0.0);
    }
}
