//! Raster-to-RGBA rendering using color schemes and class palettes.

use crate::scheme::{evaluate, ClassPalette, ColorScheme, Rgb};
use emberline_core::raster::{Raster, RasterElement};

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Parameters for continuous colormap rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ColormapParams {
    pub scheme: ColorScheme,
    /// Values below this are clamped.
    pub min: f64,
    /// Values above this are clamped.
    pub max: f64,
    /// Color for nodata pixels (RGBA). Default: fully transparent.
    pub nodata_color: [u8; 4],
}

impl ColormapParams {
    /// Params spanning the scheme's designed value range.
    pub fn new(scheme: ColorScheme) -> Self {
        let (min, max) = scheme.default_range();
        Self::with_range(scheme, min, max)
    }

    pub fn with_range(scheme: ColorScheme, min: f64, max: f64) -> Self {
        Self {
            scheme,
            min,
            max,
            nodata_color: TRANSPARENT,
        }
    }
}

/// How values become colors.
#[derive(Debug, Clone, PartialEq)]
pub enum Colormap {
    /// Linear stretch of a continuous raster (index or delta).
    Continuous(ColormapParams),
    /// Lookup of integer class codes.
    Classes(ClassPalette),
}

impl Colormap {
    pub fn dnbr() -> Self {
        Colormap::Continuous(ColormapParams::new(ColorScheme::Dnbr))
    }

    pub fn burn_severity() -> Self {
        Colormap::Classes(ClassPalette::burn_severity())
    }
}

/// Auto-detect min/max from a raster, returning `ColormapParams` ready to use.
///
/// Scans all valid (non-nodata) cells to find the data range.
pub fn auto_params<T: RasterElement>(raster: &Raster<T>, scheme: ColorScheme) -> ColormapParams {
    let nodata = raster.nodata();
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);

    for v in raster
        .data()
        .iter()
        .filter(|v| !v.is_nodata(nodata))
        .filter_map(|v| v.to_f64())
        .filter(|v| v.is_finite())
    {
        min = min.min(v);
        max = max.max(v);
    }

    if !min.is_finite() || !max.is_finite() {
        (min, max) = scheme.default_range();
    } else if (max - min).abs() < f64::EPSILON {
        max = min + 1.0;
    }

    ColormapParams::with_range(scheme, min, max)
}

/// Convert a raster to an RGBA pixel buffer with a continuous scheme.
///
/// Returns `rows * cols * 4` bytes in row-major order. Valid pixels get
/// `alpha`; nodata and non-finite pixels get `params.nodata_color`.
pub fn raster_to_rgba<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams, alpha: u8) -> Vec<u8> {
    let nodata = raster.nodata();
    let range = params.max - params.min;
    let inv_range = if range.abs() > f64::EPSILON { 1.0 / range } else { 1.0 };

    let mut rgba = Vec::with_capacity(raster.len() * 4);
    for val in raster.data().iter() {
        let px = match val.to_f64() {
            Some(v) if v.is_finite() && !val.is_nodata(nodata) => {
                let t = (v - params.min) * inv_range;
                evaluate(params.scheme, t).with_alpha(alpha)
            }
            _ => params.nodata_color,
        };
        rgba.extend_from_slice(&px);
    }
    rgba
}

/// Convert a class raster to RGBA through a palette.
///
/// Unmapped and no-data codes are fully transparent.
pub fn classes_to_rgba<T: RasterElement>(raster: &Raster<T>, palette: &ClassPalette, alpha: u8) -> Vec<u8> {
    let nodata = raster.nodata();
    let mut rgba = Vec::with_capacity(raster.len() * 4);
    for val in raster.data().iter() {
        let color: Option<Rgb> = if val.is_nodata(nodata) {
            None
        } else {
            val.to_f64()
                .filter(|v| v.fract() == 0.0 && (0.0..=255.0).contains(v))
                .and_then(|v| palette.color(v as u8))
        };
        let px = color.map_or(TRANSPARENT, |c| c.with_alpha(alpha));
        rgba.extend_from_slice(&px);
    }
    rgba
}

/// Render with either kind of [`Colormap`].
pub fn render_rgba<T: RasterElement>(raster: &Raster<T>, colormap: &Colormap, alpha: u8) -> Vec<u8> {
    match colormap {
        Colormap::Continuous(params) => raster_to_rgba(raster, params, alpha),
        Colormap::Classes(palette) => classes_to_rgba(raster, palette, alpha),
    }
}
