//! Area of interest normalization
//!
//! A user-supplied bounding box or polygon is validated once and stored as a
//! closed `geo_types::Polygon` in longitude/latitude, together with its
//! axis-aligned envelope.

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BoundingRect};
use geo_types::{Coord, Line, LineString, MultiPoint, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Axis-aligned bounding box in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Envelope {
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Centre as (lon, lat)
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Whether the two boxes share a region of positive area.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
            && self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`, the STAC `bbox` layout.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// Points sampled along each raster edge; UTM edges are curved in lon/lat.
const EDGE_SAMPLES: usize = 8;

impl Envelope {
    /// Longitude/latitude extent of a raster on a geographic or WGS84 / UTM grid.
    ///
    /// Fails with [`Error::InvalidParameter`] when the raster has no CRS or one
    /// that cannot be converted.
    pub fn of_raster<T: RasterElement>(raster: &Raster<T>) -> Result<Envelope> {
        let crs = raster.crs().ok_or_else(|| Error::InvalidParameter {
            name: "crs",
            value: "none".into(),
            reason: "raster has no CRS; geographic bounds are unknown".into(),
        })?;
        let (min_x, min_y, max_x, max_y) = raster.bounds();

        let mut points = Vec::with_capacity(4 * (EDGE_SAMPLES + 1));
        for i in 0..=EDGE_SAMPLES {
            let f = i as f64 / EDGE_SAMPLES as f64;
            let x = min_x + f * (max_x - min_x);
            let y = min_y + f * (max_y - min_y);
            for (px, py) in [(x, min_y), (x, max_y), (min_x, y), (max_x, y)] {
                let (lon, lat) = crs.to_wgs84(px, py).ok_or_else(|| Error::InvalidParameter {
                    name: "crs",
                    value: crs.identifier(),
                    reason: "only geographic and WGS84 / UTM grids can be placed on a map".into(),
                })?;
                points.push(Point::new(lon, lat));
            }
        }
        MultiPoint::new(points)
            .bounding_rect()
            .map(Envelope::from)
            .ok_or_else(|| Error::EmptyRaster("raster has no extent".into()))
    }
}

impl From<Rect<f64>> for Envelope {
    fn from(rect: Rect<f64>) -> Self {
        Envelope {
            min_lon: rect.min().x,
            min_lat: rect.min().y,
            max_lon: rect.max().x,
            max_lat: rect.max().y,
        }
    }
}

/// Validated, immutable area of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    polygon: Polygon<f64>,
    envelope: Envelope,
}

impl AreaOfInterest {
    /// Build an AOI from a longitude/latitude bounding box.
    ///
    /// Fails with [`Error::InvalidGeometry`] if `min >= max` on either axis or
    /// any coordinate is not finite.
    pub fn from_bounding_box(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        if ![min_lon, min_lat, max_lon, max_lat].iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidGeometry(
                "bounding box coordinates must be finite".into(),
            ));
        }
        if min_lon >= max_lon {
            return Err(Error::InvalidGeometry(format!(
                "min_lon {} must be less than max_lon {}",
                min_lon, max_lon
            )));
        }
        if min_lat >= max_lat {
            return Err(Error::InvalidGeometry(format!(
                "min_lat {} must be less than max_lat {}",
                min_lat, max_lat
            )));
        }

        let ring = LineString::from(vec![
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
            (min_lon, min_lat),
        ]);
        Ok(Self {
            polygon: Polygon::new(ring, vec![]),
            envelope: Envelope {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            },
        })
    }

    /// Build an AOI from polygon vertices given as (lon, lat).
    ///
    /// The ring may be open or closed. Fails with [`Error::InvalidGeometry`]
    /// when it has fewer than 3 distinct vertices, zero area, or crossing edges.
    pub fn from_polygon(vertices: &[(f64, f64)]) -> Result<Self> {
        let mut coords: Vec<Coord<f64>> = Vec::with_capacity(vertices.len() + 1);
        for &(x, y) in vertices {
            if !x.is_finite() || !y.is_finite() {
                return Err(Error::InvalidGeometry(
                    "polygon coordinates must be finite".into(),
                ));
            }
            let c = Coord { x, y };
            // collapse consecutive duplicates
            if coords.last() != Some(&c) {
                coords.push(c);
            }
        }
        if coords.len() > 1 && coords.first() == coords.last() {
            coords.pop();
        }

        let mut distinct = coords.clone();
        distinct.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(Error::InvalidGeometry(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }

        let edges: Vec<Line<f64>> = (0..coords.len())
            .map(|i| Line::new(coords[i], coords[(i + 1) % coords.len()]))
            .collect();
        if let Some((i, j)) = first_crossing(&edges) {
            return Err(Error::InvalidGeometry(format!(
                "polygon ring self-intersects between edges {} and {}",
                i, j
            )));
        }

        coords.push(coords[0]);
        let polygon = Polygon::new(LineString::new(coords), vec![]);
        if polygon.unsigned_area() <= 0.0 {
            return Err(Error::InvalidGeometry("polygon has zero area".into()));
        }

        let envelope = polygon
            .bounding_rect()
            .map(Envelope::from)
            .ok_or_else(|| Error::InvalidGeometry("polygon has no vertices".into()))?;
        Ok(Self { polygon, envelope })
    }

    /// Parse a GeoJSON `Polygon` geometry, a `Feature` wrapping one, or a
    /// `FeatureCollection` whose first feature is a polygon.
    ///
    /// Only the exterior ring is used.
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "Polygon" => {
                let ring = value
                    .get("coordinates")
                    .and_then(Value::as_array)
                    .and_then(|rings| rings.first())
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::InvalidGeometry("Polygon without coordinates".into()))?;
                let mut vertices = Vec::with_capacity(ring.len());
                for pos in ring {
                    let pair = pos
                        .as_array()
                        .filter(|p| p.len() >= 2)
                        .and_then(|p| Some((p[0].as_f64()?, p[1].as_f64()?)))
                        .ok_or_else(|| Error::InvalidGeometry(format!("bad position {}", pos)))?;
                    vertices.push(pair);
                }
                Self::from_polygon(&vertices)
            }
            "Feature" => {
                let geometry = value
                    .get("geometry")
                    .ok_or_else(|| Error::InvalidGeometry("Feature without geometry".into()))?;
                Self::from_geojson(geometry)
            }
            "FeatureCollection" => {
                let first = value
                    .get("features")
                    .and_then(Value::as_array)
                    .and_then(|f| f.first())
                    .ok_or_else(|| Error::InvalidGeometry("empty FeatureCollection".into()))?;
                Self::from_geojson(first)
            }
            other => Err(Error::InvalidGeometry(format!(
                "unsupported GeoJSON type '{}'",
                other
            ))),
        }
    }

    /// Parse GeoJSON text; see [`AreaOfInterest::from_geojson`].
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidGeometry(format!("invalid GeoJSON: {}", e)))?;
        Self::from_geojson(&value)
    }

    /// GeoJSON `Polygon` geometry of the boundary.
    pub fn to_geojson(&self) -> Value {
        let ring: Vec<[f64; 2]> = self
            .polygon
            .exterior()
            .coords()
            .map(|c| [c.x, c.y])
            .collect();
        json!({ "type": "Polygon", "coordinates": [ring] })
    }

    /// The axis-aligned bounding box.
    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Planar area in squared degrees.
    pub fn area_deg2(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    pub fn intersects(&self, envelope: &Envelope) -> bool {
        self.envelope.intersects(envelope)
    }
}

/// First pair of ring edges that touch or cross, other than neighbours
/// sharing their common vertex.
fn first_crossing(edges: &[Line<f64>]) -> Option<(usize, usize)> {
    let n = edges.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return Some((i, j)),
            }
        }
    }
    None
}
