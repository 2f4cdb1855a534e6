//! # Emberline Algorithms
//!
//! Raster algorithms for burn-severity mapping.
//!
//! ## Available Algorithm Categories
//!
//! - **resample**: band alignment onto a common pixel grid (bilinear / nearest)
//! - **masking**: scene-classification cloud/snow masking
//! - **imagery**: NBR, dNBR and severity classification
//! - **statistics**: per-class counts, areas and burned-area figures

pub(crate) mod maybe_rayon;

pub mod imagery;
pub mod masking;
pub mod resample;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{
        classify, compute_delta, compute_index, normalized_burn_ratio, Dnbr, IndexParams, Nbr,
        SeverityClass, SeverityClassification, SeverityThresholds, Snapshot, SpectralIndexRaster,
        NO_DATA_CLASS,
    };
    pub use crate::masking::{CloudMask, MaskOutcome};
    pub use crate::resample::{align, resample_to_grid, Resampling};
    pub use crate::statistics::{pixel_ground_area_km2, summarize, ClassStatistics, SeveritySummary};
    pub use emberline_core::prelude::*;
}
