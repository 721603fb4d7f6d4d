use geo::{
    line_intersection::{line_intersection, LineIntersection},
    Area, BooleanOps, Coord, CoordsIter, Geometry, Line, LineString, MultiPolygon, Polygon,
};

/// Describe why a geometry is invalid, or `None` if it is usable as-is.
pub fn problem(geometry: &Geometry<f64>) -> Option<String> {
    if geometry.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Some("non-finite coordinate".into())
    }
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => None,
        Geometry::Line(line) => (line.start == line.end).then(|| "degenerate line".into()),
        Geometry::LineString(line_string) => line_problem(line_string),
        Geometry::MultiLineString(lines) => lines.iter().find_map(line_problem),
        Geometry::Polygon(polygon) => polygon_problem(polygon),
        Geometry::MultiPolygon(polygons) => polygons.iter().find_map(polygon_problem),
        Geometry::Rect(rect) => (rect.width() == 0.0 || rect.height() == 0.0).then(|| "zero-area rectangle".into()),
        Geometry::Triangle(triangle) => (triangle.unsigned_area() == 0.0).then(|| "zero-area triangle".into()),
        Geometry::GeometryCollection(collection) => collection.iter().find_map(problem),
    }
}

/// Attempt a single repair. Polygons are unioned with themselves, which resolves
/// self-intersections into simple parts; lines lose repeated vertices.
pub fn repair(geometry: &Geometry<f64>) -> Option<Geometry<f64>> {
    if geometry.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) { return None }

    let repaired = match geometry {
        Geometry::Polygon(polygon) => repair_polygons(&MultiPolygon::new(vec![polygon.clone()])),
        Geometry::MultiPolygon(polygons) => repair_polygons(polygons),
        Geometry::LineString(line_string) => {
            let mut coords = line_string.0.clone();
            coords.dedup();
            (coords.len() >= 2).then(|| LineString::new(coords).into())
        }
        _ => None,
    }?;
    problem(&repaired).is_none().then_some(repaired)
}

fn repair_polygons(polygons: &MultiPolygon<f64>) -> Option<Geometry<f64>> {
    let mut parts = polygons.union(polygons).0.into_iter()
        .filter(|part| part.unsigned_area() > 0.0)
        .collect::<Vec<_>>();
    match parts.len() {
        0 => None,
        1 => parts.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(parts))),
    }
}

fn line_problem(line_string: &LineString<f64>) -> Option<String> {
    let mut distinct = line_string.0.clone();
    distinct.dedup();
    (distinct.len() < 2).then(|| "line has fewer than 2 distinct coordinates".into())
}

fn polygon_problem(polygon: &Polygon<f64>) -> Option<String> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .find_map(ring_problem)
        .or_else(|| (polygon.unsigned_area() == 0.0).then(|| "polygon has zero area".into()))
}

fn ring_problem(ring: &LineString<f64>) -> Option<String> {
    if ring.0.len() < 4 { return Some("ring has fewer than 4 coordinates".into()) }
    if !ring.is_closed() { return Some("ring is not closed".into()) }
    self_intersects(ring).then(|| "ring self-intersection".into())
}

/// Sweep ring segments by x; any contact between non-adjacent segments, or overlap
/// between adjacent ones, is a self-intersection.
fn self_intersects(ring: &LineString<f64>) -> bool {
    let segments = ring.lines().filter(|line| line.start != line.end).collect::<Vec<Line<f64>>>();
    let n = segments.len();
    if n < 3 { return false }

    let min_x = |line: &Line<f64>| line.start.x.min(line.end.x);
    let max_x = |line: &Line<f64>| line.start.x.max(line.end.x);

    let mut order = (0..n).collect::<Vec<_>>();
    order.sort_by(|&a, &b| min_x(&segments[a]).total_cmp(&min_x(&segments[b])));

    for (k, &i) in order.iter().enumerate() {
        let reach = max_x(&segments[i]);
        for &j in order[k + 1..].iter().take_while(|&&j| min_x(&segments[j]) <= reach) {
            let (a, b) = (i.min(j), i.max(j));
            let adjacent = b == a + 1 || (a == 0 && b == n - 1);
            match line_intersection(segments[a], segments[b]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(LineIntersection::Collinear { intersection }) if adjacent && is_point(intersection) => {}
                Some(_) => return true,
            }
        }
    }
    false
}

#[inline]
fn is_point(line: Line<f64>) -> bool {
    let Coord { x, y } = line.delta();
    x == 0.0 && y == 0.0
}

#[cfg(test)]
mod tests {
    use geo::{line_string, point, polygon};

    use super::*;

    fn bowtie() -> Geometry<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)].into()
    }

    #[test]
    fn simple_shapes_are_valid() {
        let square: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)].into();
        assert_eq!(problem(&square), None);
        assert_eq!(problem(&point!(x: 1.0, y: 1.0).into()), None);
        assert_eq!(problem(&line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 0.0)].into()), None);
    }

    #[test]
    fn collinear_vertex_is_not_an_intersection() {
        let square: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0),
        ].into();
        assert_eq!(problem(&square), None);
    }

    #[test]
    fn defects_are_reported() {
        assert_eq!(problem(&bowtie()).as_deref(), Some("ring self-intersection"));
        assert_eq!(problem(&point!(x: f64::NAN, y: 1.0).into()).as_deref(), Some("non-finite coordinate"));

        let flat: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0)].into();
        assert!(problem(&flat).is_some());

        let stub: Geometry<f64> = line_string![(x: 1.0, y: 1.0), (x: 1.0, y: 1.0)].into();
        assert!(problem(&stub).is_some());
    }

    #[test]
    fn bowtie_repairs_into_two_parts() {
        let Some(Geometry::MultiPolygon(parts)) = repair(&bowtie()) else { panic!("expected a multipolygon") };
        assert_eq!(parts.0.len(), 2);
        assert!((parts.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn unrepairable_geometries() {
        assert_eq!(repair(&point!(x: f64::INFINITY, y: 0.0).into()), None);
        let flat: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0)].into();
        assert_eq!(repair(&flat), None);
    }
}
