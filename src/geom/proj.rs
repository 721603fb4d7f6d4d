use std::{fmt, str::FromStr};

use geo::{Area, Centroid, Coord, MapCoords, Polygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CatchmentError, Result};

/// A coordinate reference system, either an EPSG code or a raw PROJ.4 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    Epsg(u32),
    Proj(String),
}

impl Crs {
    /// Canonical interchange system: WGS84 lon/lat.
    pub const WGS84: Crs = Crs::Epsg(4326);

    /// WGS84 UTM zone containing the given lon/lat: 326zz (north) / 327zz (south).
    pub fn utm_for(lon: f64, lat: f64) -> Crs {
        let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u32;
        Crs::Epsg(if lat >= 0.0 { 32600 + zone } else { 32700 + zone })
    }

    /// True for lon/lat systems (degrees), false for projected ones (meters).
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Epsg(code) => matches!(code, 4326 | 4269 | 4258 | 4617 | 4937),
            Crs::Proj(s) => ["+proj=longlat", "+proj=latlong", "+proj=lonlat", "+proj=latlon"]
                .iter().any(|p| s.contains(p)),
        }
    }

    /// Pick a metric system for work near `center` (lon/lat): the system itself if
    /// already projected, otherwise the UTM zone of the center.
    pub fn metric_near(&self, center: Coord<f64>) -> Crs {
        if self.is_geographic() { Crs::utm_for(center.x, center.y) } else { self.clone() }
    }

    /// Build the PROJ.4 definition string for this system.
    pub fn proj4(&self) -> Result<String> {
        let code = match self {
            Crs::Proj(s) => return Ok(s.clone()),
            Crs::Epsg(code) => *code,
        };
        let zone = code % 100;
        let proj = match code {
            4326 | 4937 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
            4269 | 4617 => "+proj=longlat +datum=NAD83 +no_defs".to_string(),
            4258 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string(),
            3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs".to_string(),
            32188 => "+proj=tmerc +lat_0=0 +lon_0=-73.5 +k=0.9999 +x_0=304800 +y_0=0 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs".to_string(),
            32601..=32660 => format!("+proj=utm +zone={zone} +datum=WGS84 +units=m +no_defs"),
            32701..=32760 => format!("+proj=utm +zone={zone} +south +datum=WGS84 +units=m +no_defs"),
            26901..=26923 => format!("+proj=utm +zone={zone} +datum=NAD83 +units=m +no_defs"),
            other => return Err(CatchmentError::Projection(format!("unsupported EPSG code {other}"))),
        };
        Ok(proj)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Proj(s) => f.write_str(s),
        }
    }
}

impl FromStr for Crs {
    type Err = CatchmentError;

    /// Parse "EPSG:4326", "urn:ogc:def:crs:EPSG::32618", "urn:ogc:def:crs:OGC:1.3:CRS84",
    /// a bare code, or a PROJ.4 string.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with('+') { return Ok(Crs::Proj(s.to_string())) }
        if s.ends_with("CRS84") { return Ok(Crs::WGS84) }
        s.rsplit(':').next()
            .and_then(|code| code.parse::<u32>().ok())
            .map(Crs::Epsg)
            .ok_or_else(|| CatchmentError::Projection(format!("unrecognized CRS '{s}'")))
    }
}

impl Serialize for Crs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Crs::Epsg(code) => serializer.serialize_u32(*code),
            Crs::Proj(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Crs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr { Code(u32), Text(String) }

        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => Ok(Crs::Epsg(code)),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A ready-to-use transform between two coordinate systems.
pub struct Projector {
    from: Proj4,
    to: Proj4,
    from_geographic: bool,
    to_geographic: bool,
    identity: bool,
}

impl Projector {
    pub fn new(from: &Crs, to: &Crs) -> Result<Self> {
        let build = |crs: &Crs| -> Result<Proj4> {
            let proj_string = crs.proj4()?;
            Proj4::from_proj_string(&proj_string)
                .map_err(|e| CatchmentError::Projection(format!("failed to build PROJ.4 '{proj_string}': {e}")))
        };

        Ok(Self {
            from: build(from)?,
            to: build(to)?,
            from_geographic: from.is_geographic(),
            to_geographic: to.is_geographic(),
            identity: from == to,
        })
    }

    /// Transform a single coordinate. Degrees in and out for geographic systems.
    pub fn coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        if self.identity { return Ok(coord) }

        let mut point = if self.from_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| CatchmentError::Projection(format!("transform of ({}, {}) failed: {e}", coord.x, coord.y)))?;

        let out = if self.to_geographic {
            Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
        } else {
            Coord { x: point.0, y: point.1 }
        };
        if !out.x.is_finite() || !out.y.is_finite() {
            return Err(CatchmentError::Projection(format!("transform of ({}, {}) is out of domain", coord.x, coord.y)));
        }
        Ok(out)
    }

    /// Transform every coordinate of a geometry.
    pub fn project<G: MapCoords<f64, f64>>(&self, geometry: &G) -> Result<G::Output> {
        geometry.try_map_coords(|coord| self.coord(coord))
    }
}

/// Area in km², measured in `crs` if projected, else in the UTM zone of the polygon's centroid.
pub fn area_km2(polygon: &Polygon<f64>, crs: &Crs) -> Result<f64> {
    if !crs.is_geographic() { return Ok(polygon.unsigned_area() / 1e6) }

    let center = polygon.centroid()
        .ok_or_else(|| CatchmentError::Projection("cannot measure an empty polygon".into()))?;
    let metric = Projector::new(crs, &Crs::utm_for(center.x(), center.y()))?;
    Ok(metric.project(polygon)?.unsigned_area() / 1e6)
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    #[test]
    fn utm_zone_selection() {
        assert_eq!(Crs::utm_for(-73.57, 45.50), Crs::Epsg(32618));
        assert_eq!(Crs::utm_for(151.2, -33.9), Crs::Epsg(32756));
        assert_eq!(Crs::utm_for(-180.0, 0.0), Crs::Epsg(32601));
        assert_eq!(Crs::utm_for(180.0, 10.0), Crs::Epsg(32660));
    }

    #[test]
    fn parse_common_spellings() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!("urn:ogc:def:crs:EPSG::32618".parse::<Crs>().unwrap(), Crs::Epsg(32618));
        assert_eq!("urn:ogc:def:crs:OGC:1.3:CRS84".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!("3857".parse::<Crs>().unwrap(), Crs::Epsg(3857));
        assert!(matches!("+proj=longlat +datum=WGS84".parse::<Crs>().unwrap(), Crs::Proj(_)));
        assert!("not a crs".parse::<Crs>().is_err());
    }

    #[test]
    fn deserialize_from_number_or_string() {
        assert_eq!(serde_json::from_str::<Crs>("32618").unwrap(), Crs::Epsg(32618));
        assert_eq!(serde_json::from_str::<Crs>("\"EPSG:4269\"").unwrap(), Crs::Epsg(4269));
    }

    #[test]
    fn geographic_detection() {
        assert!(Crs::WGS84.is_geographic());
        assert!(Crs::Epsg(4269).is_geographic());
        assert!(!Crs::Epsg(32618).is_geographic());
        assert!(Crs::Proj("+proj=longlat +ellps=GRS80".into()).is_geographic());
        assert!(!Crs::Proj("+proj=utm +zone=18".into()).is_geographic());
    }

    #[test]
    fn unsupported_code_is_an_error() {
        assert!(matches!(Crs::Epsg(2154).proj4(), Err(CatchmentError::Projection(_))));
    }

    #[test]
    fn round_trip_near_central_meridian_is_sub_meter() {
        // Zone 18 central meridian is -75.
        let original = Coord { x: -75.01, y: 45.5 };
        let to_metric = Projector::new(&Crs::WGS84, &Crs::utm_for(original.x, original.y)).unwrap();
        let to_canonical = Projector::new(&Crs::utm_for(original.x, original.y), &Crs::WGS84).unwrap();

        let metric = to_metric.coord(original).unwrap();
        assert!((metric.x - 499_218.0).abs() < 5.0, "easting {}", metric.x);
        let back = to_canonical.coord(metric).unwrap();

        // 1e-6 degrees is roughly 0.1 m.
        assert!((back.x - original.x).abs() < 1e-6);
        assert!((back.y - original.y).abs() < 1e-6);
    }

    #[test]
    fn identity_projection_is_exact() {
        let projector = Projector::new(&Crs::Epsg(32618), &Crs::Epsg(32618)).unwrap();
        let c = Coord { x: 123.456, y: 789.012 };
        assert_eq!(projector.coord(c).unwrap(), c);
    }

    #[test]
    fn projected_area_is_measured_in_place() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1000.0, y: 0.0), (x: 1000.0, y: 1000.0), (x: 0.0, y: 1000.0)];
        assert!((area_km2(&square, &Crs::Epsg(32618)).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn geographic_area_is_measured_in_utm() {
        // 0.01 x 0.01 degree cell near Montreal: about 0.78 km x 1.11 km.
        let cell = polygon![
            (x: -73.58, y: 45.50), (x: -73.57, y: 45.50), (x: -73.57, y: 45.51), (x: -73.58, y: 45.51),
        ];
        let area = area_km2(&cell, &Crs::WGS84).unwrap();
        assert!((area - 0.867).abs() < 0.01, "area {area}");
    }
}
