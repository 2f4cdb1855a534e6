//! Ground area of a raster cell

use emberline_core::raster::{Raster, RasterElement};
use emberline_core::{Error, Result};

/// Kilometres per degree of latitude (WGS84 mean)
const KM_PER_DEGREE: f64 = 111.32;

/// Ground area of one cell of `raster` in km².
///
/// Projected (and unknown) systems are taken to be in metres. For a
/// geographic CRS the cell size in degrees is converted at the latitude of
/// the raster centre.
pub fn pixel_ground_area_km2<T: RasterElement>(raster: &Raster<T>) -> Result<f64> {
    let gt = raster.transform();
    let area = match raster.crs() {
        Some(crs) if crs.is_geographic() => {
            let (_, min_y, _, max_y) = raster.bounds();
            let lat = ((min_y + max_y) / 2.0).to_radians();
            let (dx, dy) = gt.resolution();
            (dx * KM_PER_DEGREE * lat.cos()) * (dy * KM_PER_DEGREE)
        }
        _ => gt.pixel_area() / 1.0e6,
    };

    if !area.is_finite() || area <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "pixel_area_km2",
            value: area.to_string(),
            reason: "raster transform yields no ground area".into(),
        });
    }
    Ok(area)
}
