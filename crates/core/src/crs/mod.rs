//! Coordinate Reference System handling
//!
//! Emberline does not reproject rasters. A CRS is carried alongside each
//! raster so that grids from different projections can be rejected, pixel
//! areas can be converted to ground area, and UTM corners can be placed on a
//! longitude/latitude map.

mod utm;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use utm::{parse_utm_epsg, utm_to_wgs84};

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation
    wkt: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// WGS84 / UTM zone, the grid Sentinel-2 tiles are delivered on.
    pub fn utm(zone: u8, north: bool) -> Self {
        let base = if north { 32600 } else { 32700 };
        Self::from_epsg(base + zone as u32)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether coordinates are in degrees rather than a projected unit.
    pub fn is_geographic(&self) -> bool {
        match self.epsg {
            Some(4326) | Some(4269) | Some(4258) => true,
            Some(_) => false,
            None => self
                .wkt
                .as_deref()
                .map(|w| w.trim_start().starts_with("GEOGCS") || w.trim_start().starts_with("GEOGCRS"))
                .unwrap_or(false),
        }
    }

    /// UTM zone and hemisphere for WGS84 / UTM codes.
    pub fn utm_zone(&self) -> Option<(u32, bool)> {
        self.epsg.and_then(parse_utm_epsg)
    }

    /// Convert a coordinate in this CRS to WGS84 (lon, lat).
    ///
    /// `None` for systems other than geographic and WGS84 / UTM.
    pub fn to_wgs84(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.is_geographic() {
            return Some((x, y));
        }
        self.utm_zone()
            .map(|(zone, north)| utm_to_wgs84(x, y, zone, north))
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", wkt.chars().take(50).collect::<String>());
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

/// Whether two optional CRS values may be mixed in one operation.
///
/// An unknown CRS on either side is accepted; only two known, different
/// systems are incompatible.
pub fn compatible(a: Option<&CRS>, b: Option<&CRS>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_equivalent(b),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(32610);
        assert_eq!(crs.epsg(), Some(32610));
        assert_eq!(crs.identifier(), "EPSG:32610");
        assert!(!crs.is_geographic());
    }

    #[test]
    fn utm_codes() {
        assert_eq!(CRS::utm(10, true).epsg(), Some(32610));
        assert_eq!(CRS::utm(56, false).epsg(), Some(32756));
    }

    #[test]
    fn geographic_detection() {
        assert!(CRS::wgs84().is_geographic());
        assert!(CRS::from_wkt("GEOGCS[\"WGS 84\"]").is_geographic());
        assert!(!CRS::from_wkt("PROJCS[\"UTM\"]").is_geographic());
    }

    #[test]
    fn wgs84_conversion() {
        assert_eq!(CRS::wgs84().to_wgs84(-120.2, 38.7), Some((-120.2, 38.7)));
        let (lon, lat) = CRS::utm(10, true).to_wgs84(500_000.0, 0.0).unwrap();
        assert!((lon + 123.0).abs() < 1e-9 && lat.abs() < 1e-9);
        assert!(CRS::from_epsg(3857).to_wgs84(0.0, 0.0).is_none());
    }

    #[test]
    fn compatibility_accepts_unknown() {
        let a = CRS::utm(10, true);
        let b = CRS::utm(11, true);
        assert!(compatible(Some(&a), None));
        assert!(compatible(Some(&a), Some(&a.clone())));
        assert!(!compatible(Some(&a), Some(&b)));
    }
}
