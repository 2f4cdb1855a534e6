//! Severity statistics
//!
//! - **summary**: per-class pixel counts, areas and percentages
//! - **area**: ground area of one pixel from the raster's georeferencing

mod area;
mod summary;

pub use area::pixel_ground_area_km2;
pub use summary::{summarize, ClassStatistics, DeltaStatistics, SeveritySummary};
