//! Resampling and band alignment
//!
//! Bands captured at different native resolutions are brought onto the
//! finer of the two grids. The finer band is never downsampled.

mod align;

pub use align::{align, resample_to_grid, Resampling};
