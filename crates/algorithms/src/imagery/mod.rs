//! Burn indices and severity classification
//!
//! - NBR from near-infrared and shortwave-infrared reflectance
//! - dNBR, the pre-fire minus post-fire index difference
//! - Severity classes from dNBR breakpoints

mod change_detection;
mod indices;
mod severity;

pub use change_detection::{compute_delta, DeltaRaster, Dnbr};
pub use indices::{compute_index, normalized_burn_ratio, IndexParams, Nbr, Snapshot, SpectralIndexRaster};
pub use severity::{
    classify, classify_value, SeverityClass, SeverityClassification, SeverityThresholds,
    NO_DATA_CLASS,
};
