use std::{collections::BTreeMap, fmt, str::FromStr};

use geo::{BoundingRect, Coord, CoordsIter, Geometry, Rect};
use serde::{Deserialize, Serialize};

use crate::{geom::Crs, value::Value};

/// Attribute columns of a feature, in deterministic (sorted) order.
pub type Attributes = BTreeMap<String, Value>;

/// The three geometry families layers are split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    #[serde(alias = "point", alias = "Point", alias = "MultiPoint")]
    Points,
    #[serde(alias = "line", alias = "LineString", alias = "MultiLineString")]
    Lines,
    #[serde(alias = "polygon", alias = "Polygon", alias = "MultiPolygon")]
    Polygons,
}

impl GeometryKind {
    /// The kind a geometry belongs to, or `None` for empty collections.
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(Self::Points),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => Some(Self::Lines),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Some(Self::Polygons),
            Geometry::GeometryCollection(_) => None,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GeometryKind::Points => "points",
            GeometryKind::Lines => "lines",
            GeometryKind::Polygons => "polygons",
        })
    }
}

impl FromStr for GeometryKind {
    type Err = String;

    /// Accepts both the join-layer names ("points") and geometry type names ("Point").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "points" | "point" | "Point" | "MultiPoint" => Ok(Self::Points),
            "lines" | "line" | "LineString" | "MultiLineString" => Ok(Self::Lines),
            "polygons" | "polygon" | "Polygon" | "MultiPolygon" => Ok(Self::Polygons),
            other => Err(format!("unknown geometry type '{other}'")),
        }
    }
}

/// A geometry with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>, attributes: Attributes) -> Self {
        Self { geometry: geometry.into(), attributes }
    }

    /// Get an attribute value, treating absent keys as null.
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.attributes.get(name).unwrap_or(&NULL)
    }
}

/// A named collection of features sharing one coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayer {
    pub name: String,
    pub crs: Option<Crs>,
    pub features: Vec<Feature>,
}

impl FeatureLayer {
    pub fn new(name: impl Into<String>, crs: Option<Crs>, features: Vec<Feature>) -> Self {
        Self { name: name.into(), crs, features }
    }

    #[inline] pub fn len(&self) -> usize { self.features.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.features.is_empty() }

    /// Compute the bounding rectangle of all features.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.features.iter()
            .filter_map(|feature| feature.geometry.bounding_rect())
            .reduce(|a, b| Rect::new(
                Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            ))
    }

    /// Mean absolute coordinate magnitude over every coordinate of every feature.
    pub fn mean_coord_magnitude(&self) -> Option<f64> {
        let (sum, count) = self.features.iter()
            .flat_map(|feature| feature.geometry.coords_iter())
            .filter(|c| c.x.is_finite() && c.y.is_finite())
            .fold((0.0, 0usize), |(sum, count), c| (sum + c.x.abs() + c.y.abs(), count + 2));
        (count > 0).then(|| sum / count as f64)
    }
}
