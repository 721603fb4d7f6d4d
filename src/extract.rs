use std::collections::BTreeMap;

use geo::{Geometry, LineString, Polygon};
use log::{debug, warn};

use crate::{
    error::Result,
    geom::{problem, repair, Crs, Projector},
    layer::{Feature, FeatureLayer, GeometryKind},
    value::Value,
};

/// Layers split by geometry kind, every one in EPSG:4326.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedLayers {
    pub points: BTreeMap<String, FeatureLayer>,
    pub lines: BTreeMap<String, FeatureLayer>,
    pub polygons: BTreeMap<String, FeatureLayer>,
}

impl ExtractedLayers {
    #[inline]
    pub fn by_kind(&self, kind: GeometryKind) -> &BTreeMap<String, FeatureLayer> {
        match kind {
            GeometryKind::Points => &self.points,
            GeometryKind::Lines => &self.lines,
            GeometryKind::Polygons => &self.polygons,
        }
    }

    #[inline]
    pub fn by_kind_mut(&mut self, kind: GeometryKind) -> &mut BTreeMap<String, FeatureLayer> {
        match kind {
            GeometryKind::Points => &mut self.points,
            GeometryKind::Lines => &mut self.lines,
            GeometryKind::Polygons => &mut self.polygons,
        }
    }

    /// Get the `kind` sub-layer of a named input layer.
    #[inline]
    pub fn get(&self, kind: GeometryKind, name: &str) -> Option<&FeatureLayer> {
        self.by_kind(kind).get(name)
    }

    /// Iterate every sub-layer with its kind.
    pub fn iter(&self) -> impl Iterator<Item = (GeometryKind, &FeatureLayer)> {
        [GeometryKind::Points, GeometryKind::Lines, GeometryKind::Polygons].into_iter()
            .flat_map(move |kind| self.by_kind(kind).values().map(move |layer| (kind, layer)))
    }

    fn insert(&mut self, kind: GeometryKind, layer: FeatureLayer) {
        self.by_kind_mut(kind).insert(layer.name.clone(), layer);
    }
}

/// Assign a coordinate system to a layer that has none: projected (`default_projected`)
/// when the mean absolute coordinate exceeds 180, geographic EPSG:4326 otherwise.
pub fn assign_crs(layer: &mut FeatureLayer, default_projected: &Crs) {
    if layer.crs.is_some() { return }

    let crs = match layer.mean_coord_magnitude() {
        Some(magnitude) if magnitude > 180.0 => default_projected.clone(),
        _ => Crs::WGS84,
    };
    debug!("[extract] layer '{}' has no CRS, assuming {crs}", layer.name);
    layer.crs = Some(crs);
}

/// Reproject a layer into EPSG:4326. Features that fail to project are dropped.
pub fn normalize(layer: &mut FeatureLayer) -> Result<()> {
    let from = layer.crs.clone().unwrap_or(Crs::WGS84);
    if from == Crs::WGS84 {
        layer.crs = Some(Crs::WGS84);
        return Ok(())
    }

    let projector = Projector::new(&from, &Crs::WGS84)?;
    let name = layer.name.clone();
    layer.features = std::mem::take(&mut layer.features).into_iter().enumerate()
        .filter_map(|(i, feature)| match projector.project(&feature.geometry) {
            Ok(geometry) => Some(Feature { geometry, ..feature }),
            Err(e) => {
                warn!("[extract] dropping feature {i} of '{name}': {e}");
                None
            }
        })
        .collect();
    layer.crs = Some(Crs::WGS84);
    Ok(())
}

/// Column labelling each part of an exploded multi-part feature.
pub const PART_NAME_COLUMN: &str = "polygon_name";

/// Split a layer into single-part point, line and polygon sub-layers, repairing or
/// dropping invalid geometries on the way. Empty sub-layers are omitted.
///
/// Parts of a multi-part feature are labelled in a `polygon_name` column; the
/// source attributes, `name` included, are left untouched.
pub fn split(layer: FeatureLayer) -> Vec<(GeometryKind, FeatureLayer)> {
    let mut parts: BTreeMap<GeometryKind, Vec<Feature>> = BTreeMap::new();

    for (i, feature) in layer.features.into_iter().enumerate() {
        let base = match feature.attributes.get("name") {
            Some(value) if !value.is_missing() => value.to_string(),
            _ => format!("{}_{i}", layer.name),
        };

        let mut pieces = Vec::new();
        flatten(feature.geometry, &mut pieces);

        let mut singles = Vec::new();
        let mut multipart = pieces.len() > 1;
        for geometry in pieces {
            let geometry = match problem(&geometry) {
                None => geometry,
                Some(reason) => match repair(&geometry) {
                    Some(repaired) => {
                        debug!("[extract] repaired feature {i} of '{}' ({reason})", layer.name);
                        repaired
                    }
                    None => {
                        warn!("[extract] dropping invalid feature {i} of '{}': {reason}", layer.name);
                        continue
                    }
                },
            };
            multipart |= explode(geometry, &mut singles);
        }

        let count = singles.len();
        for (k, geometry) in singles.into_iter().enumerate() {
            let Some(kind) = GeometryKind::of(&geometry) else { continue };
            let mut attributes = feature.attributes.clone();
            if multipart || count > 1 {
                attributes.insert(PART_NAME_COLUMN.into(), Value::Str(format!("{base}_part_{}", k + 1)));
            }
            parts.entry(kind).or_default().push(Feature { geometry, attributes });
        }
    }

    parts.into_iter()
        .map(|(kind, features)| (kind, FeatureLayer::new(layer.name.clone(), layer.crs.clone(), features)))
        .collect()
}

/// Run assign_crs, normalize and split over every input layer.
pub fn extract(layers: impl IntoIterator<Item = FeatureLayer>, default_projected: &Crs) -> ExtractedLayers {
    let mut extracted = ExtractedLayers::default();
    for mut layer in layers {
        assign_crs(&mut layer, default_projected);
        if let Err(e) = normalize(&mut layer) {
            warn!("[extract] skipping layer '{}': {e}", layer.name);
            continue
        }
        for (kind, sub_layer) in split(layer) {
            debug!("[extract] {kind} layer '{}' with {} features", sub_layer.name, sub_layer.len());
            extracted.insert(kind, sub_layer);
        }
    }
    extracted
}

/// Unnest geometry collections.
fn flatten(geometry: Geometry<f64>, out: &mut Vec<Geometry<f64>>) {
    match geometry {
        Geometry::GeometryCollection(collection) => collection.0.into_iter().for_each(|g| flatten(g, out)),
        other => out.push(other),
    }
}

/// Push the single parts of a geometry; returns true when it was a multi-part type.
fn explode(geometry: Geometry<f64>, out: &mut Vec<Geometry<f64>>) -> bool {
    match geometry {
        Geometry::MultiPoint(points) => { out.extend(points.0.into_iter().map(Geometry::Point)); true }
        Geometry::MultiLineString(lines) => { out.extend(lines.0.into_iter().map(Geometry::LineString)); true }
        Geometry::MultiPolygon(polygons) => { out.extend(polygons.0.into_iter().map(Geometry::Polygon)); true }
        Geometry::Line(line) => { out.push(LineString::from(vec![line.start, line.end]).into()); false }
        Geometry::Rect(rect) => { out.push(rect.to_polygon().into()); false }
        Geometry::Triangle(triangle) => { out.push(Polygon::from(triangle).into()); false }
        Geometry::GeometryCollection(collection) => {
            collection.0.into_iter().for_each(|g| { explode(g, out); });
            true
        }
        single => { out.push(single); false }
    }
}
