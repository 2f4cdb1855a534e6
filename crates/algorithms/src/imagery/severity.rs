//! Burn-severity classification of dNBR
//!
//! Breakpoints follow the USGS FIREMON convention. Intervals are closed on
//! the lower bound and open on the upper bound; the first matching row wins:
//!
//! | dNBR                 | Class           | Code |
//! |----------------------|-----------------|------|
//! | < -0.10              | Enhanced regrowth | 0  |
//! | [-0.10, 0.10)        | Unburned        | 1    |
//! | [0.10, 0.27)         | Low             | 2    |
//! | [0.27, 0.44)         | Moderate-low    | 3    |
//! | [0.44, 0.66)         | Moderate-high   | 4    |
//! | >= 0.66              | High            | 5    |
//! | no-data              | No-data         | 255  |

use crate::maybe_rayon::*;
use emberline_core::raster::Raster;
use emberline_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};

/// Class code reserved for no-data cells
pub const NO_DATA_CLASS: u8 = 255;

/// The six ordered burn-severity classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SeverityClass {
    EnhancedRegrowth = 0,
    Unburned = 1,
    Low = 2,
    ModerateLow = 3,
    ModerateHigh = 4,
    High = 5,
}

impl SeverityClass {
    pub const ALL: [SeverityClass; 6] = [
        SeverityClass::EnhancedRegrowth,
        SeverityClass::Unburned,
        SeverityClass::Low,
        SeverityClass::ModerateLow,
        SeverityClass::ModerateHigh,
        SeverityClass::High,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            SeverityClass::EnhancedRegrowth => "Enhanced Regrowth",
            SeverityClass::Unburned => "Unburned",
            SeverityClass::Low => "Low Severity",
            SeverityClass::ModerateLow => "Moderate-Low Severity",
            SeverityClass::ModerateHigh => "Moderate-High Severity",
            SeverityClass::High => "High Severity",
        }
    }

    /// Whether the class counts towards burned area (Low and above).
    pub fn is_burned(self) -> bool {
        self >= SeverityClass::Low
    }
}

/// Lower bounds of the classes above Enhanced Regrowth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    /// Lower bound of Unburned. Default: -0.10
    pub unburned: f64,
    /// Lower bound of Low. Default: 0.10
    pub low: f64,
    /// Lower bound of Moderate-low. Default: 0.27
    pub moderate_low: f64,
    /// Lower bound of Moderate-high. Default: 0.44
    pub moderate_high: f64,
    /// Lower bound of High. Default: 0.66
    pub high: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            unburned: -0.10,
            low: 0.10,
            moderate_low: 0.27,
            moderate_high: 0.44,
            high: 0.66,
        }
    }
}

impl SeverityThresholds {
    pub fn breakpoints(&self) -> [f64; 5] {
        [
            self.unburned,
            self.low,
            self.moderate_low,
            self.moderate_high,
            self.high,
        ]
    }

    /// Breakpoints must be finite and strictly increasing.
    pub fn validate(&self) -> Result<()> {
        let b = self.breakpoints();
        if b.iter().any(|v| !v.is_finite()) || b.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidParameter {
                name: "thresholds",
                value: format!("{:?}", b),
                reason: "breakpoints must be finite and strictly increasing".into(),
            });
        }
        Ok(())
    }
}

/// Classify a single dNBR value; `None` for NaN.
#[inline]
pub fn classify_value(delta: f64, t: &SeverityThresholds) -> Option<SeverityClass> {
    if delta.is_nan() {
        None
    } else if delta < t.unburned {
        Some(SeverityClass::EnhancedRegrowth)
    } else if delta < t.low {
        Some(SeverityClass::Unburned)
    } else if delta < t.moderate_low {
        Some(SeverityClass::Low)
    } else if delta < t.moderate_high {
        Some(SeverityClass::ModerateLow)
    } else if delta < t.high {
        Some(SeverityClass::ModerateHigh)
    } else {
        Some(SeverityClass::High)
    }
}

/// Severity classification algorithm
#[derive(Debug, Clone, Default)]
pub struct SeverityClassification;

impl Algorithm for SeverityClassification {
    type Input = Raster<f64>;
    type Output = Raster<u8>;
    type Params = SeverityThresholds;
    type Error = Error;

    fn name(&self) -> &'static str {
        "SeverityClassification"
    }

    fn description(&self) -> &'static str {
        "Burn-severity classes from dNBR breakpoints"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        classify(&input, &params)
    }
}

/// Classify a dNBR raster into severity codes on the same grid.
///
/// No-data cells get [`NO_DATA_CLASS`], which is also set as the output's
/// no-data value.
pub fn classify(delta: &Raster<f64>, thresholds: &SeverityThresholds) -> Result<Raster<u8>> {
    thresholds.validate()?;

    let (rows, cols) = delta.shape();
    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NO_DATA_CLASS; cols];
            for col in 0..cols {
                let d = unsafe { delta.get_unchecked(row, col) };
                if delta.is_nodata(d) {
                    continue;
                }
                if let Some(class) = classify_value(d, thresholds) {
                    row_data[col] = class.code();
                }
            }
            row_data
        })
        .collect();

    delta.derive(data, Some(NO_DATA_CLASS))
}
