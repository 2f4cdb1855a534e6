//! Cloud and snow masking from a Sentinel-2 style scene classification (SCL)
//!
//! SCL codes: 0 no data, 1 saturated, 2 dark area, 3 cloud shadow,
//! 4 vegetation, 5 bare soil, 6 water, 7 unclassified, 8 cloud medium
//! probability, 9 cloud high probability, 10 thin cirrus, 11 snow/ice.

use crate::maybe_rayon::*;
use crate::resample::{resample_to_grid, Resampling};
use emberline_core::crs;
use emberline_core::raster::Raster;
use emberline_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Medium and high probability cloud, thin cirrus, snow/ice
pub const SCL_DEFAULT_UNRELIABLE: [u16; 4] = [8, 9, 10, 11];

/// Set of classification codes whose pixels are treated as no-data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudMask {
    pub unreliable_classes: Vec<u16>,
}

impl Default for CloudMask {
    fn default() -> Self {
        Self {
            unreliable_classes: SCL_DEFAULT_UNRELIABLE.to_vec(),
        }
    }
}

/// Masked band plus the number of cells newly set to no-data
#[derive(Debug, Clone)]
pub struct MaskOutcome {
    pub raster: Raster<f64>,
    pub masked: usize,
}

impl CloudMask {
    pub fn new(unreliable_classes: impl Into<Vec<u16>>) -> Self {
        Self {
            unreliable_classes: unreliable_classes.into(),
        }
    }

    #[inline]
    pub fn is_unreliable(&self, code: f64) -> bool {
        code.is_finite()
            && code >= 0.0
            && code.fract() == 0.0
            && self.unreliable_classes.iter().any(|&c| c as f64 == code)
    }

    /// Null out every cell of `band` whose classification is unreliable.
    ///
    /// A classification on a different grid is first resampled (nearest) onto
    /// the band's grid. Cells the classification does not cover stay valid.
    /// Applying the same mask twice gives the same raster.
    pub fn mask(&self, band: &Raster<f64>, classification: &Raster<f64>) -> Result<MaskOutcome> {
        let classes = self.onto_grid(band, classification)?;
        self.mask_aligned(band, &classes)
    }

    /// Mask an aligned band pair with one classification layer, resampling
    /// the classification only once.
    pub fn mask_pair(
        &self,
        a: &Raster<f64>,
        b: &Raster<f64>,
        classification: &Raster<f64>,
    ) -> Result<(MaskOutcome, MaskOutcome)> {
        a.ensure_aligned(b)?;
        let classes = self.onto_grid(a, classification)?;
        Ok((self.mask_aligned(a, &classes)?, self.mask_aligned(b, &classes)?))
    }

    fn onto_grid(&self, band: &Raster<f64>, classification: &Raster<f64>) -> Result<Raster<f64>> {
        if band.is_aligned_with(classification) {
            return Ok(classification.clone());
        }
        if !crs::compatible(band.crs(), classification.crs()) {
            return Err(Error::ResolutionMismatch(
                "classification layer uses a different coordinate system".into(),
            ));
        }
        let (rows, cols) = band.shape();
        let classes = resample_to_grid(classification, band.transform(), rows, cols, Resampling::Nearest)?;
        if classes.valid_count() == 0 {
            return Err(Error::ResolutionMismatch(
                "classification layer does not overlap the band".into(),
            ));
        }
        Ok(classes)
    }

    fn mask_aligned(&self, band: &Raster<f64>, classes: &Raster<f64>) -> Result<MaskOutcome> {
        let (rows, cols) = band.shape();
        let cells: Vec<(f64, bool)> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = Vec::with_capacity(cols);
                for col in 0..cols {
                    let v = unsafe { band.get_unchecked(row, col) };
                    let code = unsafe { classes.get_unchecked(row, col) };
                    if !band.is_nodata(v) && self.is_unreliable(code) {
                        row_data.push((f64::NAN, true));
                    } else {
                        row_data.push((v, false));
                    }
                }
                row_data
            })
            .collect();

        let masked = cells.iter().filter(|(_, hit)| *hit).count();
        let data: Vec<f64> = cells.into_iter().map(|(v, _)| v).collect();

        let mut raster = band.clone();
        *raster.data_mut() =
            Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
        Ok(MaskOutcome { raster, masked })
    }
}
