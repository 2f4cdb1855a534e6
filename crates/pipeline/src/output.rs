//! Writing run products to disk.
//!
//! All files are written into a staging directory next to the target and
//! moved into place with a single rename once every file succeeded. A failed
//! write leaves no partial product set behind.

use std::fs;
use std::path::{Path, PathBuf};

use emberline_colormap::{Colormap, OverlayRenderer, RgbaOverlayRenderer};
use emberline_core::io::{write_geotiff, write_geotiff_u8};
use emberline_core::{Envelope, Error, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::OutputConfig;
use crate::error::{AtStage, PipelineError, Stage};
use crate::pipeline::{MaskCounts, SeverityProducts};

pub const PRE_NBR_FILE: &str = "nbr_pre.tif";
pub const POST_NBR_FILE: &str = "nbr_post.tif";
pub const DNBR_FILE: &str = "dnbr.tif";
pub const SEVERITY_FILE: &str = "severity.tif";
pub const SUMMARY_FILE: &str = "summary.json";
pub const SCENES_FILE: &str = "scenes.json";
pub const OVERLAY_FILE: &str = "dnbr_overlay.tif";

/// Paths of the written products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenProducts {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct SceneRecord<'a> {
    pre: &'a emberline_cloud::SceneCandidate,
    post: &'a emberline_cloud::SceneCandidate,
    masked_pixels: MaskCounts,
}

/// Write every product of `products` into `dir`.
///
/// `dir` must not exist or be empty unless `options.overwrite` is set.
pub fn write_products(
    products: &SeverityProducts,
    dir: &Path,
    options: &OutputConfig,
) -> std::result::Result<WrittenProducts, PipelineError> {
    write_staged(products, dir, options).at(Stage::Output)
}

fn write_staged(products: &SeverityProducts, dir: &Path, options: &OutputConfig) -> Result<WrittenProducts> {
    check_target(dir, options.overwrite)?;
    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    // Removed on drop; after the rename below that cleanup has nothing to do.
    let staging = tempfile::Builder::new()
        .prefix(".emberline-staging-")
        .tempdir_in(&parent)?;
    let stage_dir = staging.path();

    let mut names = vec![PRE_NBR_FILE, POST_NBR_FILE, DNBR_FILE, SEVERITY_FILE, SUMMARY_FILE, SCENES_FILE];
    write_geotiff(products.pre_nbr.raster(), stage_dir.join(PRE_NBR_FILE), None)?;
    write_geotiff(products.post_nbr.raster(), stage_dir.join(POST_NBR_FILE), None)?;
    write_geotiff(&products.dnbr, stage_dir.join(DNBR_FILE), None)?;
    write_geotiff_u8(&products.severity, stage_dir.join(SEVERITY_FILE))?;
    write_json(&stage_dir.join(SUMMARY_FILE), &products.summary)?;
    write_json(
        &stage_dir.join(SCENES_FILE),
        &SceneRecord {
            pre: &products.pre_scene,
            post: &products.post_scene,
            masked_pixels: products.masked,
        },
    )?;

    if options.write_overlay {
        let bounds = Envelope::of_raster(&products.dnbr)?;
        let overlay = RgbaOverlayRenderer::new(options.overlay_opacity)?
            .render(&products.dnbr, bounds, &Colormap::dnbr())?;
        let sidecar = overlay.write(stage_dir.join(OVERLAY_FILE))?;
        names.push(OVERLAY_FILE);
        debug!(sidecar = %sidecar.display(), "overlay written");
    }

    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::rename(stage_dir, dir)?;

    let mut files: Vec<PathBuf> = names.iter().map(|n| dir.join(n)).collect();
    if options.write_overlay {
        files.push(dir.join(OVERLAY_FILE).with_extension("json"));
    }
    info!(dir = %dir.display(), files = files.len(), "products written");
    Ok(WrittenProducts {
        dir: dir.to_path_buf(),
        files,
    })
}

fn check_target(dir: &Path, overwrite: bool) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    if !dir.is_dir() {
        return Err(Error::InvalidParameter {
            name: "output directory",
            value: dir.display().to_string(),
            reason: "exists and is not a directory".into(),
        });
    }
    let empty = fs::read_dir(dir)?.next().is_none();
    if !empty && !overwrite {
        return Err(Error::InvalidParameter {
            name: "output directory",
            value: dir.display().to_string(),
            reason: "is not empty (enable overwrite to replace it)".into(),
        });
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::Other(e.to_string()))?;
    fs::write(path, text)?;
    Ok(())
}
