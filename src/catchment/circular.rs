use crate::{
    catchment::{BuildContext, CatchmentParams, CatchmentStrategy, Diagnostic, MetricFrames, Outline, StrategyOutput},
    error::{CatchmentError, Result},
    geom::{anchor, circle, Crs},
    layer::FeatureLayer,
};

/// Circle of `distance` meters around each point or centroid.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircularStrategy;

impl CatchmentStrategy for CircularStrategy {
    fn build(&self, _ctx: &mut BuildContext<'_>, layer: &FeatureLayer, params: &CatchmentParams) -> Result<StrategyOutput> {
        let CatchmentParams::Circular { distance } = *params else {
            return Err(CatchmentError::config(&layer.name, format!("circular strategy given {} parameters", params.kind())))
        };
        Ok(circles(layer, distance))
    }
}

/// Buffer every feature's anchor by `radius` meters in the UTM zone of that anchor.
pub(crate) fn circles(layer: &FeatureLayer, radius: f64) -> StrategyOutput {
    let mut frames = MetricFrames::new(layer.crs.as_ref().unwrap_or(&Crs::WGS84));
    let mut output = StrategyOutput::default();

    for (i, feature) in layer.features.iter().enumerate() {
        let Some(center) = anchor(&feature.geometry) else {
            output.diagnostics.push(Diagnostic::feature(i, "no usable anchor point"));
            output.outlines.push(Outline::new(i, None));
            continue
        };
        let built = frames.around(center).and_then(|(to_metric, to_layer)| {
            to_layer.project(&circle(to_metric.coord(center)?, radius))
        });
        match built {
            Ok(polygon) => output.outlines.push(Outline::new(i, Some(polygon))),
            Err(e) => {
                output.diagnostics.push(Diagnostic::feature(i, e.to_string()));
                output.outlines.push(Outline::new(i, None));
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use geo::{line_string, point, Area, Centroid};

    use super::*;
    use crate::{
        catchment::{generate, CatchmentIdSequence, StrategyRegistry},
        layer::{Attributes, Feature, GeometryKind},
        network::{GraphCache, StaticGraphSource},
    };

    fn run(layer: &FeatureLayer, kind: GeometryKind, distance: f64) -> crate::catchment::CatchmentLayer {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let mut graphs = GraphCache::new(StaticGraphSource::empty());
        let mut ctx = BuildContext { graphs: &mut graphs, pool: &pool, chunk_size: 8 };
        generate(&StrategyRegistry::default(), &mut ctx, &mut CatchmentIdSequence::new(), layer, kind,
            &CatchmentParams::Circular { distance }).unwrap()
    }

    #[test]
    fn projected_point_area_is_pi_d_squared() {
        let layer = FeatureLayer::new("a", Some(Crs::Epsg(32618)), vec![
            Feature::new(point!(x: 0.0, y: 0.0), Attributes::new()),
        ]);
        let built = run(&layer, GeometryKind::Points, 50.0);
        let expected = PI * 50.0 * 50.0 / 1e6;
        let area = built.catchments[0].area_km2.unwrap();
        assert!((area - expected).abs() / expected < 1e-3, "area {area}");
    }

    #[test]
    fn geographic_point_is_buffered_in_utm() {
        let layer = FeatureLayer::new("stations", Some(Crs::WGS84), vec![
            Feature::new(point!(x: -73.57, y: 45.50), Attributes::new()),
        ]);
        let built = run(&layer, GeometryKind::Points, 500.0);
        let catchment = &built.catchments[0];

        let expected = PI * 500.0 * 500.0 / 1e6;
        assert!((catchment.area_km2.unwrap() - expected).abs() / expected < 1e-3);

        // Back in degrees, centered on the station.
        let polygon = catchment.geometry.as_ref().unwrap();
        let center = polygon.centroid().unwrap();
        assert!((center.x() + 73.57).abs() < 1e-5 && (center.y() - 45.50).abs() < 1e-5);
        assert!(polygon.unsigned_area() < 1e-3);
    }

    #[test]
    fn lines_are_buffered_around_their_centroid() {
        let layer = FeatureLayer::new("routes", Some(Crs::Epsg(32618)), vec![
            Feature::new(line_string![(x: 0.0, y: 0.0), (x: 200.0, y: 0.0)], Attributes::new()),
        ]);
        let built = run(&layer, GeometryKind::Lines, 10.0);
        let center = built.catchments[0].geometry.as_ref().unwrap().centroid().unwrap();
        assert!((center.x() - 100.0).abs() < 1e-6 && center.y().abs() < 1e-6);
    }
}
