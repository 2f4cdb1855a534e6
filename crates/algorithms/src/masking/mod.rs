//! Masking of unreliable pixels from a scene classification layer

mod cloud;

pub use cloud::{CloudMask, MaskOutcome, SCL_DEFAULT_UNRELIABLE};
