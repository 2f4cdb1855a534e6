//! # Emberline Colormap
//!
//! Color mapping and overlay rendering for burn-severity products.
//!
//! Continuous rasters (NBR, dNBR) go through a multi-stop interpolation
//! engine; severity classes go through a fixed [`ClassPalette`]. An
//! [`OverlayRenderer`] packages the RGBA result with its geographic bounds.
//!
//! ## Usage
//!
//! ```ignore
//! use emberline_colormap::{Colormap, OverlayRenderer, RgbaOverlayRenderer};
//!
//! let layer = RgbaOverlayRenderer::default().render(&dnbr, aoi.envelope(), &Colormap::dnbr())?;
//! layer.write("dnbr_overlay.tif")?;
//! ```

mod overlay;
mod render;
mod scheme;

pub use overlay::{OverlayImage, OverlayRenderer, RgbaOverlayRenderer};
pub use render::{auto_params, classes_to_rgba, raster_to_rgba, render_rgba, ColormapParams, Colormap};
pub use scheme::{evaluate, ClassPalette, ColorScheme, ColorStop, PaletteEntry, Rgb};
