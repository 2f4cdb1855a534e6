//! Two-band alignment onto a common pixel grid

use crate::maybe_rayon::*;
use emberline_core::crs;
use emberline_core::raster::{GeoTransform, Raster};
use emberline_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Interpolation used when sampling the coarser grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Weighted mean of the four nearest cell centres, edges clamped.
    /// For continuous reflectance.
    #[default]
    Bilinear,
    /// Value of the containing cell. For class codes.
    Nearest,
}

/// Bring two rasters onto one pixel grid.
///
/// The grid with the smaller pixel area is the target. It is cropped to the
/// pixels whose centres lie inside the other raster's extent (never padded);
/// the other raster is then sampled at those pixel centres. The returned pair
/// is in input order and always shares shape and transform.
///
/// Fails with [`Error::ResolutionMismatch`] when the CRS differ, when either
/// grid is rotated or degenerate, or when the extents do not overlap.
pub fn align(
    a: &Raster<f64>,
    b: &Raster<f64>,
    method: Resampling,
) -> Result<(Raster<f64>, Raster<f64>)> {
    if a.is_aligned_with(b) {
        return Ok((a.clone(), b.clone()));
    }

    if !crs::compatible(a.crs(), b.crs()) {
        return Err(Error::ResolutionMismatch(format!(
            "grids use different coordinate systems ({} vs {})",
            describe_crs(a),
            describe_crs(b)
        )));
    }
    for r in [a, b] {
        let gt = r.transform();
        if gt.row_rotation != 0.0 || gt.col_rotation != 0.0 || gt.pixel_area() == 0.0 {
            return Err(Error::ResolutionMismatch(format!(
                "unsupported transform {:?}",
                gt.to_gdal()
            )));
        }
    }

    let a_is_fine = a.transform().pixel_area() <= b.transform().pixel_area();
    let (fine, coarse) = if a_is_fine { (a, b) } else { (b, a) };

    let (row0, col0, rows, cols) = window_inside(fine, coarse).ok_or_else(|| {
        Error::ResolutionMismatch(format!(
            "extents do not overlap: {:?} vs {:?}",
            a.bounds(),
            b.bounds()
        ))
    })?;

    let fine_out = fine.crop(row0, col0, rows, cols)?;
    let coarse_out = resample_to_grid(coarse, fine_out.transform(), rows, cols, method)?;

    if a_is_fine {
        Ok((fine_out, coarse_out))
    } else {
        Ok((coarse_out, fine_out))
    }
}

fn describe_crs(r: &Raster<f64>) -> String {
    r.crs().map(|c| c.to_string()).unwrap_or_else(|| "unknown".into())
}

/// Window (row0, col0, rows, cols) of `fine` cells whose centres fall inside
/// the extent of `other`.
fn window_inside(fine: &Raster<f64>, other: &Raster<f64>) -> Option<(usize, usize, usize, usize)> {
    let (min_x, min_y, max_x, max_y) = other.bounds();
    let gt = fine.transform();
    let (c_a, r_a) = gt.geo_to_pixel(min_x, max_y);
    let (c_b, r_b) = gt.geo_to_pixel(max_x, min_y);

    let (col0, col1) = centre_span(c_a.min(c_b), c_a.max(c_b), fine.cols());
    let (row0, row1) = centre_span(r_a.min(r_b), r_a.max(r_b), fine.rows());
    if col1 <= col0 || row1 <= row0 {
        return None;
    }
    Some((row0, col0, row1 - row0, col1 - col0))
}

/// Index range [i0, i1) of cells whose centre `i + 0.5` lies in [lo, hi).
fn centre_span(lo: f64, hi: f64, len: usize) -> (usize, usize) {
    const EPS: f64 = 1e-6;
    let i0 = (lo - 0.5 - EPS).ceil().max(0.0);
    let i1 = (hi - 0.5 - EPS).ceil().max(0.0);
    ((i0 as usize).min(len), (i1 as usize).min(len))
}


/// Sample `src` at the cell centres of the grid (`transform`, `rows`, `cols`).
///
/// Target cells outside the source extent, or whose contributing source
/// cells are no-data, are NaN.
pub fn resample_to_grid(
    src: &Raster<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    method: Resampling,
) -> Result<Raster<f64>> {
    if src.is_empty() {
        return Err(Error::EmptyRaster("cannot resample an empty raster".into()));
    }
    let (src_rows, src_cols) = src.shape();
    let src_gt = src.transform();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let (x, y) = transform.pixel_to_geo(col, row);
                let (sc, sr) = src_gt.geo_to_pixel(x, y);
                if !(sc >= 0.0 && sr >= 0.0 && sc <= src_cols as f64 && sr <= src_rows as f64) {
                    continue;
                }
                row_data[col] = match method {
                    Resampling::Nearest => nearest(src, sr, sc),
                    Resampling::Bilinear => bilinear(src, sr - 0.5, sc - 0.5),
                };
            }
            row_data
        })
        .collect();

    let mut out = src.with_same_meta::<f64>(rows, cols);
    out.set_transform(*transform);
    out.set_nodata(Some(f64::NAN));
    *out.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(out)
}

fn nearest(src: &Raster<f64>, sr: f64, sc: f64) -> f64 {
    let r = (sr.floor() as usize).min(src.rows() - 1);
    let c = (sc.floor() as usize).min(src.cols() - 1);
    let v = unsafe { src.get_unchecked(r, c) };
    if src.is_nodata(v) {
        f64::NAN
    } else {
        v
    }
}

/// Bilinear sample at fractional cell-centre coordinates, edges clamped.
fn bilinear(src: &Raster<f64>, ry: f64, rx: f64) -> f64 {
    let h = src.rows() as i64;
    let w = src.cols() as i64;
    let fy = ry.floor() as i64;
    let fx = rx.floor() as i64;
    let ty = ry - fy as f64;
    let tx = rx - fx as f64;
    let r0 = fy.clamp(0, h - 1) as usize;
    let r1 = (fy + 1).clamp(0, h - 1) as usize;
    let c0 = fx.clamp(0, w - 1) as usize;
    let c1 = (fx + 1).clamp(0, w - 1) as usize;

    let taps = [
        (r0, c0, (1.0 - ty) * (1.0 - tx)),
        (r0, c1, (1.0 - ty) * tx),
        (r1, c0, ty * (1.0 - tx)),
        (r1, c1, ty * tx),
    ];
    let mut acc = 0.0;
    for (r, c, weight) in taps {
        if weight == 0.0 {
            continue;
        }
        let v = unsafe { src.get_unchecked(r, c) };
        if src.is_nodata(v) {
            return f64::NAN;
        }
        acc += weight * v;
    }
    acc
}
