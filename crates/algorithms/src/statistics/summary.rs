//! Severity summary statistics
//!
//! Counts valid cells per severity class and derives areas and percentages.
//! No-data cells are excluded from both numerator and denominator.

use crate::imagery::{SeverityClass, NO_DATA_CLASS};
use emberline_core::raster::Raster;
use emberline_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Figures for one severity class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub class: SeverityClass,
    pub code: u8,
    pub label: String,
    pub pixel_count: usize,
    pub area_km2: f64,
    pub percent: f64,
}

/// dNBR value range over valid cells
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaStatistics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Summary of a classified severity raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub total_valid_pixels: usize,
    pub nodata_pixels: usize,
    pub pixel_area_km2: f64,
    pub total_area_km2: f64,
    /// One entry per class, in class order
    pub classes: Vec<ClassStatistics>,
    /// Low severity and above
    pub burned_area_km2: f64,
    pub burned_percent: f64,
    pub high_severity_area_km2: f64,
    pub high_severity_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnbr: Option<DeltaStatistics>,
}

impl SeveritySummary {
    pub fn class(&self, class: SeverityClass) -> &ClassStatistics {
        &self.classes[class.code() as usize]
    }

    /// Attach the dNBR mean/min/max over valid cells.
    pub fn with_delta(mut self, delta: &Raster<f64>) -> Self {
        let stats = delta.statistics();
        if let (Some(mean), Some(min), Some(max)) = (stats.mean, stats.min, stats.max) {
            self.dnbr = Some(DeltaStatistics { mean, min, max });
        }
        self
    }
}

/// Summarize a severity raster.
///
/// Fails with [`Error::EmptyRaster`] when no cell holds a severity class, and
/// with [`Error::InvalidParameter`] for a non-positive pixel area.
pub fn summarize(severity: &Raster<u8>, pixel_area_km2: f64) -> Result<SeveritySummary> {
    if !pixel_area_km2.is_finite() || pixel_area_km2 <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "pixel_area_km2",
            value: pixel_area_km2.to_string(),
            reason: "must be a positive finite number".into(),
        });
    }

    let mut counts = [0usize; 6];
    let mut nodata = 0usize;
    for &code in severity.data().iter() {
        if code == NO_DATA_CLASS || severity.is_nodata(code) {
            nodata += 1;
            continue;
        }
        match SeverityClass::from_code(code) {
            Some(class) => counts[class.code() as usize] += 1,
            None => {
                return Err(Error::UnsupportedDataType(format!(
                    "unknown severity code {}",
                    code
                )))
            }
        }
    }

    let total: usize = counts.iter().sum();
    if total == 0 {
        return Err(Error::EmptyRaster(format!(
            "all {} cells are no-data",
            severity.len()
        )));
    }

    let percent = |n: usize| 100.0 * n as f64 / total as f64;
    let classes: Vec<ClassStatistics> = SeverityClass::ALL
        .iter()
        .map(|&class| {
            let n = counts[class.code() as usize];
            ClassStatistics {
                class,
                code: class.code(),
                label: class.label().to_string(),
                pixel_count: n,
                area_km2: n as f64 * pixel_area_km2,
                percent: percent(n),
            }
        })
        .collect();

    let burned: usize = SeverityClass::ALL
        .iter()
        .filter(|c| c.is_burned())
        .map(|c| counts[c.code() as usize])
        .sum();
    let high = counts[SeverityClass::High.code() as usize];

    Ok(SeveritySummary {
        total_valid_pixels: total,
        nodata_pixels: nodata,
        pixel_area_km2,
        total_area_km2: total as f64 * pixel_area_km2,
        classes,
        burned_area_km2: burned as f64 * pixel_area_km2,
        burned_percent: percent(burned),
        high_severity_area_km2: high as f64 * pixel_area_km2,
        high_severity_percent: percent(high),
        dnbr: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn classes(codes: Vec<u8>) -> Raster<u8> {
        let n = codes.len();
        let mut r = Raster::from_vec(codes, 1, n).unwrap();
        r.set_nodata(Some(NO_DATA_CLASS));
        r
    }

    #[test]
    fn percentages_sum_to_100_without_nodata() {
        let r = classes(vec![0, 1, 1, 2, 3, 4, 5, 5, 255, 255]);
        let s = summarize(&r, 0.0001).unwrap();
        assert_eq!(s.total_valid_pixels, 8);
        assert_eq!(s.nodata_pixels, 2);
        let sum: f64 = s.classes.iter().map(|c| c.percent).sum();
        assert_relative_eq!(sum, 100.0, epsilon = 1e-9);
        assert_relative_eq!(s.class(SeverityClass::Unburned).percent, 25.0);
        assert_relative_eq!(s.class(SeverityClass::High).area_km2, 0.0002, epsilon = 1e-15);
    }

    #[test]
    fn burned_and_high_figures() {
        let r = classes(vec![1, 1, 2, 5]);
        let s = summarize(&r, 0.01).unwrap();
        assert_eq!(s.classes.len(), 6);
        assert_relative_eq!(s.burned_percent, 50.0);
        assert_relative_eq!(s.burned_area_km2, 0.02, epsilon = 1e-12);
        assert_relative_eq!(s.high_severity_percent, 25.0);
        assert_relative_eq!(s.total_area_km2, 0.04, epsilon = 1e-12);
    }

    #[test]
    fn all_nodata_is_an_error() {
        let r = classes(vec![255; 9]);
        assert!(matches!(summarize(&r, 1.0), Err(Error::EmptyRaster(_))));
    }

    #[test]
    fn bad_pixel_area_rejected() {
        let r = classes(vec![1]);
        assert!(summarize(&r, 0.0).is_err());
        assert!(summarize(&r, f64::NAN).is_err());
    }

    #[test]
    fn unknown_code_rejected() {
        let r = classes(vec![1, 7]);
        assert!(matches!(summarize(&r, 1.0), Err(Error::UnsupportedDataType(_))));
    }

    #[test]
    fn delta_range_attached_and_serialized() {
        let r = classes(vec![1, 5]);
        let delta = Raster::from_vec(vec![0.0, 0.8, f64::NAN], 1, 3).unwrap();
        let s = summarize(&r, 1.0).unwrap().with_delta(&delta);
        let d = s.dnbr.unwrap();
        assert_relative_eq!(d.mean, 0.4);
        assert_eq!(d.max, 0.8);

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["classes"][5]["class"], "high");
        assert_eq!(json["total_valid_pixels"], 2);
    }
}
