//! Normalized Burn Ratio
//!
//! `NBR = (NIR - SWIR) / (NIR + SWIR)` on physical reflectance. Stored
//! digital numbers are converted first with `(dn + offset) / scale`.

use crate::maybe_rayon::*;
use emberline_core::raster::Raster;
use emberline_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Temporal snapshot an index raster was computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Snapshot {
    Pre,
    Post,
}

impl Snapshot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Snapshot::Pre => "pre",
            Snapshot::Post => "post",
        }
    }
}

/// Reflectance conversion for stored digital numbers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Divisor mapping stored integers to reflectance. Default: 10000
    pub reflectance_scale: f64,
    /// Added to the stored value before scaling. Default: 0
    pub reflectance_offset: f64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            reflectance_scale: 10_000.0,
            reflectance_offset: 0.0,
        }
    }
}

impl IndexParams {
    pub fn validate(&self) -> Result<()> {
        if !self.reflectance_scale.is_finite() || self.reflectance_scale <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "reflectance_scale",
                value: self.reflectance_scale.to_string(),
                reason: "must be a positive finite number".into(),
            });
        }
        if !self.reflectance_offset.is_finite() {
            return Err(Error::InvalidParameter {
                name: "reflectance_offset",
                value: self.reflectance_offset.to_string(),
                reason: "must be finite".into(),
            });
        }
        Ok(())
    }

    #[inline]
    fn to_reflectance(&self, dn: f64) -> f64 {
        (dn + self.reflectance_offset) / self.reflectance_scale
    }
}

/// An index raster tagged with the snapshot it represents.
///
/// Values are in [-1, 1] or NaN (no-data).
#[derive(Debug, Clone)]
pub struct SpectralIndexRaster {
    snapshot: Snapshot,
    raster: Raster<f64>,
}

impl SpectralIndexRaster {
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    pub fn raster(&self) -> &Raster<f64> {
        &self.raster
    }

    pub fn into_raster(self) -> Raster<f64> {
        self.raster
    }
}

/// NBR algorithm over an aligned (NIR, SWIR) pair
#[derive(Debug, Clone, Default)]
pub struct Nbr;

impl Algorithm for Nbr {
    type Input = (Raster<f64>, Raster<f64>);
    type Output = Raster<f64>;
    type Params = IndexParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "NBR"
    }

    fn description(&self) -> &'static str {
        "Normalized Burn Ratio from near-infrared and shortwave-infrared reflectance"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        normalized_burn_ratio(&input.0, &input.1, &params)
    }
}

/// Compute NBR for one snapshot.
pub fn compute_index(
    nir: &Raster<f64>,
    swir: &Raster<f64>,
    snapshot: Snapshot,
    params: &IndexParams,
) -> Result<SpectralIndexRaster> {
    let raster = normalized_burn_ratio(nir, swir, params)?;
    Ok(SpectralIndexRaster { snapshot, raster })
}

/// Normalized Burn Ratio
///
/// Per pixel:
/// - either band no-data: NaN
/// - `NIR + SWIR == 0` exactly: 0
/// - otherwise the ratio, clamped to [-1, 1] (an offset can push
///   reflectance slightly negative)
///
/// Fails with [`Error::GridMismatch`] unless the bands are aligned.
///
/// # Arguments
/// * `nir` - Near-infrared band (Sentinel-2 B08)
/// * `swir` - Shortwave infrared band (Sentinel-2 B12)
/// * `params` - Reflectance scale and offset
pub fn normalized_burn_ratio(
    nir: &Raster<f64>,
    swir: &Raster<f64>,
    params: &IndexParams,
) -> Result<Raster<f64>> {
    params.validate()?;
    nir.ensure_aligned(swir)?;

    let (rows, cols) = nir.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let n = unsafe { nir.get_unchecked(row, col) };
                let s = unsafe { swir.get_unchecked(row, col) };
                if nir.is_nodata(n) || swir.is_nodata(s) {
                    continue;
                }
                row_data[col] = ratio(params.to_reflectance(n), params.to_reflectance(s));
            }
            row_data
        })
        .collect();

    build_output(nir, rows, cols, data)
}

#[inline]
fn ratio(n: f64, s: f64) -> f64 {
    let sum = n + s;
    if sum == 0.0 {
        return 0.0;
    }
    ((n - s) / sum).clamp(-1.0, 1.0)
}

pub(crate) fn build_output(
    template: &Raster<f64>,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
) -> Result<Raster<f64>> {
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}
