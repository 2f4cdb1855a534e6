//! Map overlay layers: an RGBA image pinned to geographic bounds.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use emberline_core::raster::{Raster, RasterElement};
use emberline_core::{Envelope, Error, Result};
use serde::{Deserialize, Serialize};
use tiff::encoder::{colortype::RGBA8, TiffEncoder};

use crate::render::{render_rgba, Colormap};

/// A displayable image layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayImage {
    pub name: String,
    pub width: usize,
    pub height: usize,
    /// Longitude/latitude extent the image is stretched over.
    pub bounds: Envelope,
    pub opacity: f64,
    /// Row-major RGBA, `width * height * 4` bytes.
    #[serde(skip)]
    pub rgba: Vec<u8>,
}

impl OverlayImage {
    /// Write the image as an RGBA TIFF plus a `<stem>.json` sidecar holding
    /// name, size, bounds and opacity. Returns the sidecar path.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        let file = BufWriter::new(File::create(path)?);
        let mut encoder =
            TiffEncoder::new(file).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;
        encoder
            .write_image::<RGBA8>(self.width as u32, self.height as u32, &self.rgba)
            .map_err(|e| Error::Other(format!("cannot write overlay image: {}", e)))?;

        let sidecar = path.with_extension("json");
        let meta = BufWriter::new(File::create(&sidecar)?);
        serde_json::to_writer_pretty(meta, self)
            .map_err(|e| Error::Other(format!("cannot write overlay metadata: {}", e)))?;
        Ok(sidecar)
    }
}

/// Turns a raster plus its geographic bounds into an image layer.
pub trait OverlayRenderer {
    fn render<T: RasterElement>(
        &self,
        raster: &Raster<T>,
        bounds: Envelope,
        colormap: &Colormap,
    ) -> Result<OverlayImage>;
}

/// Renders straight to an RGBA buffer with a uniform layer opacity.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaOverlayRenderer {
    opacity: f64,
    name: String,
}

impl Default for RgbaOverlayRenderer {
    fn default() -> Self {
        Self {
            opacity: 0.65,
            name: "dNBR".into(),
        }
    }
}

impl RgbaOverlayRenderer {
    pub fn new(opacity: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(Error::InvalidParameter {
                name: "opacity",
                value: opacity.to_string(),
                reason: "must be between 0 and 1".into(),
            });
        }
        Ok(Self {
            opacity,
            ..Self::default()
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }
}

impl OverlayRenderer for RgbaOverlayRenderer {
    fn render<T: RasterElement>(
        &self,
        raster: &Raster<T>,
        bounds: Envelope,
        colormap: &Colormap,
    ) -> Result<OverlayImage> {
        if raster.is_empty() {
            return Err(Error::EmptyRaster("nothing to render".into()));
        }
        let alpha = (self.opacity * 255.0).round() as u8;
        Ok(OverlayImage {
            name: self.name.clone(),
            width: raster.cols(),
            height: raster.rows(),
            bounds,
            opacity: self.opacity,
            rgba: render_rgba(raster, colormap, alpha),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberline_core::AreaOfInterest;

    fn bounds() -> Envelope {
        AreaOfInterest::from_bounding_box(-120.2, 38.7, -120.1, 38.8)
            .unwrap()
            .envelope()
    }

    #[test]
    fn opacity_becomes_alpha() {
        let r = Raster::from_vec(vec![0.9, f64::NAN, -0.3, 0.1], 2, 2).unwrap();
        let img = RgbaOverlayRenderer::default()
            .render(&r, bounds(), &Colormap::dnbr())
            .unwrap();
        assert_eq!((img.width, img.height), (2, 2));
        assert_eq!(img.rgba.len(), 16);
        assert_eq!(img.rgba[3], 166);
        assert_eq!(img.rgba[7], 0);
        assert_eq!(img.bounds, bounds());
    }

    #[test]
    fn invalid_opacity_rejected() {
        assert!(RgbaOverlayRenderer::new(1.5).is_err());
        assert!(RgbaOverlayRenderer::new(-0.1).is_err());
        assert_eq!(RgbaOverlayRenderer::new(1.0).unwrap().opacity(), 1.0);
    }

    #[test]
    fn write_image_and_sidecar() {
        let r = Raster::from_vec(vec![1u8, 5, 255, 0], 2, 2).unwrap();
        let img = RgbaOverlayRenderer::new(1.0)
            .unwrap()
            .with_name("severity")
            .render(&r, bounds(), &Colormap::burn_severity())
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sidecar = img.write(dir.path().join("severity.tif")).unwrap();
        assert!(dir.path().join("severity.tif").metadata().unwrap().len() > 16);

        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(meta["name"], "severity");
        assert_eq!(meta["bounds"]["min_lon"], -120.2);
        assert!(meta.get("rgba").is_none());
    }
}
