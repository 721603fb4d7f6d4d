//! Spatial join of catchments against candidate layers.

mod proportion;
mod table;

use std::{collections::BTreeSet, fmt};

use geo::{BoundingRect, Geometry, Polygon, Relate};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    catchment::{Catchment, CatchmentLayer},
    error::{CatchmentError, Result},
    extract::ExtractedLayers,
    geom::{GeometryIndex, Projector},
    layer::{FeatureLayer, GeometryKind},
    value::Value,
};

pub use proportion::proportion;
pub use table::{FusedTable, Provenance};
pub(crate) use table::value_column;

/// Spatial predicate between a catchment and a candidate feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    /// The catchment contains the feature.
    Contains,
    Intersects,
    /// The catchment lies within the feature.
    Within,
}

impl Predicate {
    /// Evaluate the predicate with the DE-9IM matrix of (catchment, feature).
    pub fn holds(self, catchment: &Polygon<f64>, feature: &Geometry<f64>) -> bool {
        let matrix = catchment.relate(feature);
        match self {
            Predicate::Contains => matrix.is_contains(),
            Predicate::Intersects => matrix.is_intersects(),
            Predicate::Within => matrix.is_within(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Predicate::Contains => "contains",
            Predicate::Intersects => "intersects",
            Predicate::Within => "within",
        })
    }
}

/// Column names owned by the join itself. Attributes never take these names.
pub const RESERVED_COLUMNS: [&str; 7] =
    ["catchment_id", "buffer_layer", "source_layer", "join_layer", "predicate", "area_km2", "proportion"];

/// One (catchment, candidate layer, matched feature) match.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRow {
    pub catchment_id: u64,
    pub buffer_layer: String,
    pub join_layer: String,
    pub predicate: Predicate,
    /// Index of the matched feature in its candidate layer.
    pub feature_index: usize,
    /// The matched feature's original geometry, exposed as `"<join_layer>_geometry"`.
    pub geometry: Geometry<f64>,
    /// Bookkeeping, catchment and candidate columns in output order.
    pub columns: Vec<(String, Value)>,
}

impl JoinRow {
    /// Look up a column by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(column, _)| column == name).map(|(_, value)| value)
    }

    /// Name of the provenance geometry column.
    #[inline]
    pub fn geometry_column(&self) -> String {
        format!("{}_geometry", self.join_layer)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinOptions {
    /// Add a `proportion` column: share of the feature inside the catchment.
    pub compute_proportions: bool,
}

/// Join every catchment layer against every candidate layer whose geometry kind has a
/// predicate. A failing pair is logged and contributes no rows.
pub fn spatial_join<'a>(
    catchments: impl IntoIterator<Item = &'a CatchmentLayer>,
    candidates: &ExtractedLayers,
    predicates: &std::collections::BTreeMap<GeometryKind, Predicate>,
    options: JoinOptions,
) -> FusedTable {
    let mut table = FusedTable::default();
    for catchment_layer in catchments {
        for (&kind, &predicate) in predicates {
            for candidate_layer in candidates.by_kind(kind).values() {
                match join_pair(catchment_layer, candidate_layer, predicate, options) {
                    Ok(rows) => {
                        debug!("[join] {} {predicate} {}: {} rows", catchment_layer.name, candidate_layer.name, rows.len());
                        table.extend(rows);
                    }
                    Err(e) => warn!("[join] {e}"),
                }
            }
        }
    }
    table
}

/// Join one catchment layer against one candidate layer.
pub fn join_pair(
    catchment_layer: &CatchmentLayer,
    candidate_layer: &FeatureLayer,
    predicate: Predicate,
    options: JoinOptions,
) -> Result<Vec<JoinRow>> {
    let error = |reason: String| CatchmentError::Join {
        buffer_layer: catchment_layer.name.clone(),
        join_layer: candidate_layer.name.clone(),
        reason,
    };

    // Candidates in the catchment CRS; originals are kept for provenance.
    let projected = match &candidate_layer.crs {
        Some(crs) if *crs != catchment_layer.crs => {
            let projector = Projector::new(crs, &catchment_layer.crs).map_err(|e| error(e.to_string()))?;
            candidate_layer.features.iter()
                .map(|feature| projector.project(&feature.geometry))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| error(e.to_string()))?
        }
        _ => candidate_layer.features.iter().map(|feature| feature.geometry.clone()).collect(),
    };
    let index = GeometryIndex::new(&projected);

    let right_names = candidate_layer.features.iter()
        .flat_map(|feature| feature.attributes.keys().map(String::as_str))
        .collect::<BTreeSet<_>>();
    let left_names = catchment_layer.catchments.iter()
        .flat_map(|catchment| catchment.attributes.keys().map(String::as_str))
        .collect::<BTreeSet<_>>();

    let mut rows = Vec::new();
    for catchment in &catchment_layer.catchments {
        let Some(polygon) = &catchment.geometry else { continue };
        let Some(envelope) = polygon.bounding_rect() else { continue };

        for i in index.candidates(&envelope) {
            if !predicate.holds(polygon, &projected[i]) { continue }

            let feature = &candidate_layer.features[i];
            let mut columns = bookkeeping(catchment, catchment_layer, candidate_layer, predicate);
            let reserved = columns.iter().map(|(name, _)| name.clone()).collect::<BTreeSet<_>>();

            for (name, value) in &catchment.attributes {
                let clash = reserved.contains(name) || right_names.contains(name.as_str());
                columns.push((if clash { format!("{name}_left") } else { name.clone() }, value.clone()));
            }
            for (name, value) in &feature.attributes {
                let clash = reserved.contains(name) || left_names.contains(name.as_str());
                columns.push((if clash { format!("{name}_right") } else { name.clone() }, value.clone()));
            }
            if options.compute_proportions {
                columns.push(("proportion".into(), Value::Float(proportion(polygon, &projected[i]))));
            }

            rows.push(JoinRow {
                catchment_id: catchment.id,
                buffer_layer: catchment_layer.name.clone(),
                join_layer: candidate_layer.name.clone(),
                predicate,
                feature_index: i,
                geometry: feature.geometry.clone(),
                columns,
            });
        }
    }
    Ok(rows)
}

fn bookkeeping(
    catchment: &Catchment,
    catchment_layer: &CatchmentLayer,
    candidate_layer: &FeatureLayer,
    predicate: Predicate,
) -> Vec<(String, Value)> {
    let mut columns = vec![
        ("catchment_id".to_string(), Value::Int(catchment.id as i64)),
        ("buffer_layer".to_string(), Value::from(catchment_layer.name.as_str())),
        ("source_layer".to_string(), Value::from(catchment.source_layer.as_str())),
        ("join_layer".to_string(), Value::from(candidate_layer.name.as_str())),
        ("predicate".to_string(), Value::from(predicate.to_string())),
        ("area_km2".to_string(), Value::from(catchment.area_km2)),
    ];
    columns.extend(catchment.params.columns().into_iter().map(|(name, value)| (name.to_string(), value)));
    columns
}

#[cfg(test)]
mod tests {
    use geo::{point, polygon};

    use super::*;
    use crate::{
        catchment::CatchmentParams,
        geom::Crs,
        layer::{Attributes, Feature},
    };

    fn catchment(id: u64, geometry: Option<Polygon<f64>>, attributes: Attributes) -> Catchment {
        Catchment {
            id,
            source_layer: "stations".into(),
            source_index: id as usize - 1,
            geometry,
            area_km2: Some(0.01),
            params: CatchmentParams::Grid { wide: 100.0, length: 100.0 },
            attributes,
        }
    }

    fn catchments() -> CatchmentLayer {
        let square = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        CatchmentLayer {
            name: "stations_buffer".into(),
            source_layer: "stations".into(),
            kind: GeometryKind::Points,
            crs: Crs::Epsg(32618),
            catchments: vec![
                catchment(1, Some(square), Attributes::from([("name".to_string(), Value::from("A"))])),
                catchment(2, None, Attributes::new()),
            ],
            diagnostics: vec![],
        }
    }

    fn stops() -> FeatureLayer {
        let stop = |x: f64, y: f64, name: &str| Feature::new(point!(x: x, y: y),
            Attributes::from([("name".to_string(), Value::from(name)), ("routes".to_string(), Value::Int(2))]));
        FeatureLayer::new("stops", Some(Crs::Epsg(32618)), vec![stop(5.0, 5.0, "in"), stop(10.0, 5.0, "edge"), stop(50.0, 50.0, "out")])
    }

    #[test]
    fn predicates_are_directional() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        let inner: Geometry<f64> = polygon![(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0)].into();
        let outer: Geometry<f64> = polygon![(x: -5.0, y: -5.0), (x: 20.0, y: -5.0), (x: 20.0, y: 20.0), (x: -5.0, y: 20.0)].into();

        assert!(Predicate::Contains.holds(&square, &inner));
        assert!(!Predicate::Within.holds(&square, &inner));
        assert!(Predicate::Within.holds(&square, &outer));
        assert!(!Predicate::Contains.holds(&square, &outer));
        assert!(Predicate::Intersects.holds(&square, &inner) && Predicate::Intersects.holds(&square, &outer));
    }

    #[test]
    fn boundary_points_intersect_but_are_not_contained() {
        let rows = join_pair(&catchments(), &stops(), Predicate::Contains, JoinOptions::default()).unwrap();
        assert_eq!(rows.iter().map(|r| r.feature_index).collect::<Vec<_>>(), vec![0]);

        let rows = join_pair(&catchments(), &stops(), Predicate::Intersects, JoinOptions::default()).unwrap();
        assert_eq!(rows.iter().map(|r| r.feature_index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn collisions_are_suffixed() {
        let rows = join_pair(&catchments(), &stops(), Predicate::Contains, JoinOptions::default()).unwrap();
        let row = &rows[0];
        assert_eq!(row.get("name_left"), Some(&Value::from("A")));
        assert_eq!(row.get("name_right"), Some(&Value::from("in")));
        assert_eq!(row.get("routes"), Some(&Value::Int(2)));
        assert_eq!(row.get("catchment_id"), Some(&Value::Int(1)));
        assert_eq!(row.get("buffer_type"), Some(&Value::from("grid")));
        assert_eq!(row.get("predicate"), Some(&Value::from("contains")));
        assert_eq!(row.geometry_column(), "stops_geometry");
        assert_eq!(row.geometry, Geometry::Point(point!(x: 5.0, y: 5.0)));
    }

    #[test]
    fn suffixes_are_stable_across_catchments() {
        let square = |x0: f64| polygon![(x: x0, y: 0.0), (x: x0 + 10.0, y: 0.0), (x: x0 + 10.0, y: 10.0), (x: x0, y: 10.0)];
        let mut layer = catchments();
        layer.catchments = vec![
            catchment(1, Some(square(0.0)), Attributes::from([("name".to_string(), Value::from("A"))])),
            catchment(2, Some(square(100.0)), Attributes::from([("code".to_string(), Value::from("B"))])),
        ];
        let stop = |x: f64, name: &str| Feature::new(point!(x: x, y: 5.0),
            Attributes::from([("name".to_string(), Value::from(name))]));
        let stops = FeatureLayer::new("stops", Some(Crs::Epsg(32618)), vec![stop(5.0, "near A"), stop(105.0, "near B")]);

        let rows = join_pair(&layer, &stops, Predicate::Contains, JoinOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name_right"), Some(&Value::from("near A")));
        assert_eq!(rows[1].get("name_right"), Some(&Value::from("near B")));
        assert_eq!(rows[1].get("name"), None);
        assert_eq!(rows[1].get("code"), Some(&Value::from("B")));
    }

    #[test]
    fn reserved_names_are_never_renamed() {
        let mut stops = stops();
        for feature in &mut stops.features {
            feature.attributes.insert("area_km2".into(), Value::Float(9.0));
        }
        let rows = join_pair(&catchments(), &stops, Predicate::Contains, JoinOptions::default()).unwrap();
        assert_eq!(rows[0].get("area_km2"), Some(&Value::Float(0.01)));
        assert_eq!(rows[0].get("area_km2_right"), Some(&Value::Float(9.0)));
    }

    #[test]
    fn candidates_are_reprojected() {
        // The stop sits at the lon/lat of UTM (500000, 5000000) in zone 18.
        let square = polygon![
            (x: 499_990.0, y: 4_999_990.0), (x: 500_010.0, y: 4_999_990.0),
            (x: 500_010.0, y: 5_000_010.0), (x: 499_990.0, y: 5_000_010.0),
        ];
        let mut layer = catchments();
        layer.catchments[0].geometry = Some(square);
        let lonlat = Projector::new(&Crs::Epsg(32618), &Crs::WGS84).unwrap()
            .coord(geo::Coord { x: 500_000.0, y: 5_000_000.0 }).unwrap();
        let stops = FeatureLayer::new("stops", Some(Crs::WGS84), vec![Feature::new(geo::Point::from(lonlat), Attributes::new())]);

        let rows = join_pair(&layer, &stops, Predicate::Contains, JoinOptions::default()).unwrap();
        assert_eq!(rows.len(), 1);
        // Provenance keeps the original lon/lat geometry.
        assert_eq!(rows[0].geometry, Geometry::Point(geo::Point::from(lonlat)));
    }

    #[test]
    fn join_is_idempotent() {
        let mut candidates = ExtractedLayers::default();
        candidates.points.insert("stops".into(), stops());
        let predicates = [(GeometryKind::Points, Predicate::Intersects)].into_iter().collect();
        let layers = [catchments()];

        let first = spatial_join(&layers, &candidates, &predicates, JoinOptions { compute_proportions: true });
        let second = spatial_join(&layers, &candidates, &predicates, JoinOptions { compute_proportions: true });
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
