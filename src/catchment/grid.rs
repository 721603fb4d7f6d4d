use geo::{Area, BooleanOps, BoundingRect, Coord, Geometry, Rect};

use crate::{
    catchment::{layer_center, BuildContext, CatchmentParams, CatchmentStrategy, Diagnostic, MetricFrames, Outline, StrategyOutput},
    error::{CatchmentError, Result},
    geom::{anchor, rectangle, Crs},
    layer::FeatureLayer,
};

/// One `wide` x `length` meter rectangle centered on each point or centroid.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridStrategy;

impl CatchmentStrategy for GridStrategy {
    fn build(&self, _ctx: &mut BuildContext<'_>, layer: &FeatureLayer, params: &CatchmentParams) -> Result<StrategyOutput> {
        let CatchmentParams::Grid { wide, length } = *params else {
            return Err(CatchmentError::config(&layer.name, format!("grid strategy given {} parameters", params.kind())))
        };

        let mut frames = MetricFrames::new(layer.crs.as_ref().unwrap_or(&Crs::WGS84));
        let mut output = StrategyOutput::default();
        for (i, feature) in layer.features.iter().enumerate() {
            let built = anchor(&feature.geometry)
                .ok_or_else(|| CatchmentError::geometry(&layer.name, Some(i), "no usable anchor point"))
                .and_then(|center| {
                    let (to_metric, to_layer) = frames.around(center)?;
                    to_layer.project(&rectangle(to_metric.coord(center)?, wide, length))
                });
            match built {
                Ok(polygon) => output.outlines.push(Outline::new(i, Some(polygon))),
                Err(e) => {
                    output.diagnostics.push(Diagnostic::feature(i, e.to_string()));
                    output.outlines.push(Outline::new(i, None));
                }
            }
        }
        Ok(output)
    }
}

/// Tiles each polygon's extent with a global lattice of `wide` x `length` meter cells
/// and keeps the cells overlapping the polygon, one catchment per cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZonesStrategy;

/// Cells one polygon may be tiled into before it is rejected.
pub const MAX_ZONE_CELLS: usize = 1_000_000;

/// Lattice cell bounds covering `[min, max]`: lower bound snapped down, upper bound up.
fn lattice(min: f64, max: f64, step: f64) -> (f64, usize) {
    let start = (min / step).floor() * step;
    let end = (max / step).ceil() * step;
    (start, (((end - start) / step).round() as usize).max(1))
}

impl CatchmentStrategy for ZonesStrategy {
    fn build(&self, _ctx: &mut BuildContext<'_>, layer: &FeatureLayer, params: &CatchmentParams) -> Result<StrategyOutput> {
        let CatchmentParams::Zones { wide, length } = *params else {
            return Err(CatchmentError::config(&layer.name, format!("zones strategy given {} parameters", params.kind())))
        };

        let mut output = StrategyOutput::default();
        let Some(center) = layer_center(layer) else { return Ok(output) };
        let mut frames = MetricFrames::new(layer.crs.as_ref().unwrap_or(&Crs::WGS84));
        let (to_metric, to_layer) = frames.around(center)?;

        for (i, feature) in layer.features.iter().enumerate() {
            let Geometry::Polygon(polygon) = &feature.geometry else {
                output.diagnostics.push(Diagnostic::feature(i, "zones need a polygon"));
                output.outlines.push(Outline::new(i, None));
                continue
            };
            let projected = match to_metric.project(polygon) {
                Ok(projected) => projected,
                Err(e) => {
                    output.diagnostics.push(Diagnostic::feature(i, e.to_string()));
                    output.outlines.push(Outline::new(i, None));
                    continue
                }
            };
            let Some(bounds) = projected.bounding_rect() else {
                output.diagnostics.push(Diagnostic::feature(i, "polygon has no extent"));
                output.outlines.push(Outline::new(i, None));
                continue
            };

            let (x0, cols) = lattice(bounds.min().x, bounds.max().x, wide);
            let (y0, rows) = lattice(bounds.min().y, bounds.max().y, length);
            if cols.checked_mul(rows).is_none_or(|cells| cells > MAX_ZONE_CELLS) {
                output.diagnostics.push(Diagnostic::feature(i, format!("{cols} x {rows} cells exceed the limit of {MAX_ZONE_CELLS}")));
                output.outlines.push(Outline::new(i, None));
                continue
            }

            let mut kept = 0;
            for row in 0..rows {
                for col in 0..cols {
                    let min = Coord { x: x0 + col as f64 * wide, y: y0 + row as f64 * length };
                    let cell = Rect::new(min, Coord { x: min.x + wide, y: min.y + length }).to_polygon();
                    if projected.intersection(&cell).unsigned_area() <= 0.0 { continue }

                    match to_layer.project(&cell) {
                        Ok(cell) => {
                            kept += 1;
                            output.outlines.push(Outline::new(i, Some(cell))
                                .with("cell_row", row as i64)
                                .with("cell_col", col as i64));
                        }
                        Err(e) => output.diagnostics.push(Diagnostic::feature(i, format!("cell ({row}, {col}): {e}"))),
                    }
                }
            }
            if kept == 0 {
                output.diagnostics.push(Diagnostic::feature(i, "no cell overlaps the polygon"));
                output.outlines.push(Outline::new(i, None));
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use geo::{point, polygon, Area, LineString, Polygon};

    use super::*;
    use crate::{
        catchment::{generate, CatchmentIdSequence, CatchmentLayer, StrategyRegistry},
        layer::{Attributes, Feature, GeometryKind},
        network::{GraphCache, StaticGraphSource},
        value::Value,
    };

    fn run(layer: &FeatureLayer, kind: GeometryKind, params: CatchmentParams) -> CatchmentLayer {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let mut graphs = GraphCache::new(StaticGraphSource::empty());
        let mut ctx = BuildContext { graphs: &mut graphs, pool: &pool, chunk_size: 8 };
        generate(&StrategyRegistry::default(), &mut ctx, &mut CatchmentIdSequence::new(), layer, kind, &params).unwrap()
    }

    fn utm(features: Vec<Feature>) -> FeatureLayer {
        FeatureLayer::new("cells", Some(Crs::Epsg(32618)), features)
    }

    #[test]
    fn lattice_snaps_outward() {
        assert_eq!(lattice(50.0, 150.0, 100.0), (0.0, 2));
        assert_eq!(lattice(-30.0, 0.0, 100.0), (-100.0, 1));
        assert_eq!(lattice(0.0, 300.0, 100.0), (0.0, 3));
    }

    #[test]
    fn grid_rectangle_around_point() {
        let layer = utm(vec![Feature::new(point!(x: 1000.0, y: 2000.0), Attributes::new())]);
        let built = run(&layer, GeometryKind::Points, CatchmentParams::Grid { wide: 100.0, length: 50.0 });
        let rect = built.catchments[0].geometry.as_ref().unwrap();
        assert_eq!(rect.unsigned_area(), 5000.0);
        assert!((built.catchments[0].area_km2.unwrap() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn zones_keep_overlapping_cells_only() {
        // Touches cell (1, 1) at a single corner.
        let triangle = polygon![(x: 0.0, y: 0.0), (x: 200.0, y: 0.0), (x: 0.0, y: 200.0)];
        let layer = utm(vec![Feature::new(triangle, Attributes::from([("zone".to_string(), Value::from("z1"))]))]);
        let built = run(&layer, GeometryKind::Polygons, CatchmentParams::Zones { wide: 100.0, length: 100.0 });

        let cells = built.catchments.iter()
            .map(|c| (c.attributes["cell_row"].clone(), c.attributes["cell_col"].clone()))
            .collect::<Vec<_>>();
        assert_eq!(cells, vec![
            (Value::Int(0), Value::Int(0)), (Value::Int(0), Value::Int(1)), (Value::Int(1), Value::Int(0)),
        ]);
        assert!(built.catchments.iter().all(|c| c.attributes["zone"] == Value::from("z1")));
        assert!(built.catchments.iter().all(|c| (c.area_km2.unwrap() - 0.01).abs() < 1e-12));
        assert_eq!(built.catchments.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn zones_extent_is_never_truncated() {
        let square = polygon![(x: 50.0, y: 50.0), (x: 250.0, y: 50.0), (x: 250.0, y: 130.0), (x: 50.0, y: 130.0)];
        let layer = utm(vec![Feature::new(square, Attributes::new())]);
        let built = run(&layer, GeometryKind::Polygons, CatchmentParams::Zones { wide: 100.0, length: 100.0 });
        // x: 0..300 (3 columns), y: 0..200 (2 rows).
        assert_eq!(built.len(), 6);
    }

    #[test]
    fn empty_polygon_yields_a_sentinel() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0), (x: 0.0, y: 100.0)];
        let empty = Polygon::new(LineString::new(vec![]), vec![]);
        let layer = utm(vec![Feature::new(empty, Attributes::new()), Feature::new(square, Attributes::new())]);
        let built = run(&layer, GeometryKind::Polygons, CatchmentParams::Zones { wide: 100.0, length: 100.0 });

        assert_eq!(built.len(), 2);
        assert_eq!(built.catchments[0].source_index, 0);
        assert!(built.catchments[0].geometry.is_none());
        assert!(built.catchments[1].geometry.is_some());
        assert!(built.diagnostics.iter().any(|d| d.feature == Some(0)));
    }

    #[test]
    fn oversized_lattice_is_rejected() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 5000.0, y: 0.0), (x: 5000.0, y: 5000.0), (x: 0.0, y: 5000.0)];
        let layer = utm(vec![Feature::new(square, Attributes::new())]);
        let built = run(&layer, GeometryKind::Polygons, CatchmentParams::Zones { wide: 1.0, length: 1.0 });

        assert_eq!(built.len(), 1);
        assert!(built.catchments[0].geometry.is_none());
        assert!(built.diagnostics.iter().any(|d| d.reason.contains("exceed")));
    }
}
