//! GeoJSON layer reading and catchment/provenance writing.

use std::{fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use catchment::{
    catchment::CatchmentLayer,
    join::Provenance,
    Attributes, Crs, Feature, FeatureLayer, Value as Cell,
};
use geo::{Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use log::warn;
use serde_json::{json, Map, Value};

/// Read a GeoJSON FeatureCollection (or a single Feature) as a named layer.
/// The layer CRS comes from the legacy `crs` member when present.
pub fn read_layer(path: &Path, name: &str) -> Result<FeatureLayer> {
    let bytes = fs::read(path)
        .with_context(|| format!("[io::geojson] Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("[io::geojson] Failed to parse {}", path.display()))?;
    parse_layer(name, &value)
}

pub fn parse_layer(name: &str, value: &Value) -> Result<FeatureLayer> {
    let crs = value["crs"]["properties"]["name"].as_str()
        .map(|s| s.parse::<Crs>())
        .transpose()
        .with_context(|| format!("[io::geojson] Unsupported CRS in layer '{name}'"))?;

    let features = match value["type"].as_str() {
        Some("FeatureCollection") => value["features"].as_array()
            .ok_or_else(|| anyhow!("[io::geojson] '{name}': FeatureCollection without features"))?
            .as_slice(),
        Some("Feature") => std::slice::from_ref(value),
        other => bail!("[io::geojson] '{name}': expected a FeatureCollection, found {other:?}"),
    };

    let mut layer = FeatureLayer::new(name, crs, Vec::with_capacity(features.len()));
    for (i, feature) in features.iter().enumerate() {
        let Some(geometry) = parse_geometry(&feature["geometry"])
            .with_context(|| format!("[io::geojson] '{name}': feature {i}"))? else {
            warn!("[io::geojson] '{name}': feature {i} has no geometry, skipped");
            continue
        };
        let attributes = feature["properties"].as_object()
            .map(|properties| properties.iter().map(|(k, v)| (k.clone(), Cell::from_json(v))).collect())
            .unwrap_or_else(Attributes::new);
        layer.features.push(Feature::new(geometry, attributes));
    }
    Ok(layer)
}

fn parse_geometry(value: &Value) -> Result<Option<Geometry<f64>>> {
    if value.is_null() { return Ok(None) }
    let coords = &value["coordinates"];
    let geometry = match value["type"].as_str() {
        Some("Point") => Point(parse_coord(coords)?).into(),
        Some("MultiPoint") => MultiPoint(each(coords, |c| parse_coord(c).map(Point))?).into(),
        Some("LineString") => parse_line(coords)?.into(),
        Some("MultiLineString") => MultiLineString(each(coords, parse_line)?).into(),
        Some("Polygon") => parse_polygon(coords)?.into(),
        Some("MultiPolygon") => MultiPolygon(each(coords, parse_polygon)?).into(),
        Some("GeometryCollection") => {
            let members = value["geometries"].as_array()
                .ok_or_else(|| anyhow!("GeometryCollection without geometries"))?;
            let mut geometries = Vec::with_capacity(members.len());
            for member in members {
                geometries.extend(parse_geometry(member)?);
            }
            Geometry::GeometryCollection(GeometryCollection(geometries))
        }
        other => bail!("unsupported geometry type {other:?}"),
    };
    Ok(Some(geometry))
}

fn each<T>(value: &Value, parse: impl Fn(&Value) -> Result<T>) -> Result<Vec<T>> {
    value.as_array()
        .ok_or_else(|| anyhow!("coordinates must be an array"))?
        .iter().map(parse).collect()
}

fn parse_coord(value: &Value) -> Result<Coord<f64>> {
    match value.as_array().map(Vec::as_slice) {
        Some([x, y, ..]) => Ok(Coord {
            x: x.as_f64().ok_or_else(|| anyhow!("Invalid coordinate: x must be a number"))?,
            y: y.as_f64().ok_or_else(|| anyhow!("Invalid coordinate: y must be a number"))?,
        }),
        _ => bail!("Invalid coordinate: expected [x, y]"),
    }
}

fn parse_line(value: &Value) -> Result<LineString<f64>> {
    Ok(LineString(each(value, parse_coord)?))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = each(value, parse_line)?.into_iter();
    let exterior = rings.next().ok_or_else(|| anyhow!("Invalid Polygon: missing exterior ring"))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

fn coords(line: &LineString<f64>) -> Vec<[f64; 2]> {
    line.coords().map(|c| [c.x, c.y]).collect()
}

fn rings(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors()).map(coords).collect()
}

fn geometry_to_geojson(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": [p.x(), p.y()]}),
        Geometry::MultiPoint(mp) => json!({"type": "MultiPoint", "coordinates": mp.iter().map(|p| [p.x(), p.y()]).collect::<Vec<_>>()}),
        Geometry::Line(line) => geometry_to_geojson(&Geometry::LineString((*line).into())),
        Geometry::LineString(line) => json!({"type": "LineString", "coordinates": coords(line)}),
        Geometry::MultiLineString(ml) => json!({"type": "MultiLineString", "coordinates": ml.iter().map(coords).collect::<Vec<_>>()}),
        Geometry::Polygon(polygon) => json!({"type": "Polygon", "coordinates": rings(polygon)}),
        Geometry::MultiPolygon(mp) => json!({"type": "MultiPolygon", "coordinates": mp.iter().map(rings).collect::<Vec<_>>()}),
        Geometry::Rect(rect) => geometry_to_geojson(&Geometry::Polygon(rect.to_polygon())),
        Geometry::Triangle(triangle) => geometry_to_geojson(&Geometry::Polygon(triangle.to_polygon())),
        Geometry::GeometryCollection(collection) => json!({
            "type": "GeometryCollection",
            "geometries": collection.iter().map(geometry_to_geojson).collect::<Vec<_>>(),
        }),
    }
}

fn collection(name: &str, crs: &Crs, features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "name": name,
        "crs": {"type": "name", "properties": {"name": crs.to_string()}},
        "features": features,
    })
}

/// Catchments as polygon features; sentinels get a null geometry.
pub fn catchments_to_geojson(layer: &CatchmentLayer) -> Value {
    let features = layer.catchments.iter().map(|catchment| {
        let mut properties = catchment.attributes.iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<Map<_, _>>();
        properties.insert("catchment_id".into(), json!(catchment.id));
        properties.insert("source_layer".into(), json!(catchment.source_layer));
        properties.insert("area_km2".into(), json!(catchment.area_km2));
        for (name, value) in catchment.params.columns() {
            properties.insert(name.into(), value.to_json());
        }
        json!({
            "type": "Feature",
            "id": catchment.id,
            "geometry": catchment.geometry.as_ref().map(|polygon| geometry_to_geojson(&polygon.clone().into())),
            "properties": properties,
        })
    }).collect();
    collection(&layer.name, &layer.crs, features)
}

/// Matched features of one (buffer layer, join layer) pair with their join columns.
/// Matched geometries keep the candidate layer's coordinates (EPSG:4326).
pub fn provenance_to_geojson(provenance: &Provenance<'_>) -> Value {
    let features = provenance.rows.iter().map(|row| {
        let properties = row.columns.iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<Map<_, _>>();
        json!({
            "type": "Feature",
            "geometry": geometry_to_geojson(&row.geometry),
            "properties": properties,
        })
    }).collect();
    collection(&provenance.column, &Crs::WGS84, features)
}

pub fn write_geojson(value: &Value, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec(value).context("[io::geojson] Failed to serialize GeoJSON")?;
    fs::write(path, bytes).with_context(|| format!("[io::geojson] Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use catchment::GeometryKind;
    use geo::polygon;

    use super::*;

    #[test]
    fn reads_mixed_features() {
        let value = json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32618"}},
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [611000.0, 5040000.0]},
                 "properties": {"stop_id": "a", "routes": 3}},
                {"type": "Feature", "geometry": {"type": "Polygon",
                 "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]], [[2, 2], [4, 2], [4, 4], [2, 2]]]},
                 "properties": null},
                {"type": "Feature", "geometry": null, "properties": {}},
            ],
        });
        let layer = parse_layer("stops", &value).unwrap();

        assert_eq!(layer.crs, Some(Crs::Epsg(32618)));
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.features[0].get("routes"), &Cell::Int(3));
        assert_eq!(GeometryKind::of(&layer.features[0].geometry), Some(GeometryKind::Points));
        let Geometry::Polygon(polygon) = &layer.features[1].geometry else { panic!("expected a polygon") };
        assert_eq!(polygon.interiors().len(), 1);
    }

    #[test]
    fn rejects_unknown_geometry() {
        let value = json!({"type": "Feature", "geometry": {"type": "Curve", "coordinates": []}, "properties": {}});
        assert!(parse_layer("bad", &value).is_err());
    }

    #[test]
    fn geometry_round_trips_through_json() {
        let square: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)].into();
        let value = geometry_to_geojson(&square);
        assert_eq!(value["type"], "Polygon");
        assert_eq!(parse_geometry(&value).unwrap(), Some(square));
    }

    #[test]
    fn reads_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.geojson");
        let value = json!({"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "MultiPoint", "coordinates": [[1, 2], [3, 4]]}, "properties": {"name": "x"}},
        ]});
        write_geojson(&value, &path).unwrap();

        let layer = read_layer(&path, "points").unwrap();
        assert_eq!(layer.crs, None);
        assert!(matches!(&layer.features[0].geometry, Geometry::MultiPoint(points) if points.0.len() == 2));
    }
}
