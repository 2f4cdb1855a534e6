//! Burn-severity pipeline orchestration.
//!
//! AOI → scene selection (pre, post) → band read → alignment → cloud mask →
//! NBR (pre, post) → dNBR → severity classes → statistics.
//!
//! Each stage runs only if every earlier stage succeeded; the first failure
//! is returned with its [`Stage`].

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use emberline_algorithms::imagery::{
    classify, compute_delta, compute_index, DeltaRaster, Snapshot, SpectralIndexRaster,
};
use emberline_algorithms::resample::{align, Resampling};
use emberline_algorithms::statistics::{pixel_ground_area_km2, summarize, SeveritySummary};
use emberline_cloud::{select_scene, BandReader, CatalogConnector, SceneCandidate, SearchRequest};
use emberline_core::{AreaOfInterest, Error, Raster};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{AtStage, PipelineError, Stage};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Inclusive acquisition date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> emberline_core::Result<Self> {
        if start > end {
            return Err(Error::InvalidParameter {
                name: "date window",
                value: format!("{}/{}", start, end),
                reason: "start is after end".into(),
            });
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.end)
    }
}

impl FromStr for DateWindow {
    type Err = Error;

    /// Parse `YYYY-MM-DD/YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| Error::InvalidParameter {
            name: "date window",
            value: s.to_string(),
            reason,
        };
        let (a, b) = s
            .split_once('/')
            .ok_or_else(|| invalid("expected START/END".into()))?;
        let parse = |d: &str| {
            NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").map_err(|e| invalid(e.to_string()))
        };
        Self::new(parse(a)?, parse(b)?)
    }
}

/// One burn-severity assessment.
#[derive(Debug, Clone)]
pub struct SeverityRequest {
    pub aoi: AreaOfInterest,
    pub pre_window: DateWindow,
    pub post_window: DateWindow,
}

impl SeverityRequest {
    pub fn new(aoi: AreaOfInterest, pre_window: DateWindow, post_window: DateWindow) -> Self {
        Self {
            aoi,
            pre_window,
            post_window,
        }
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Cells newly set to no-data by the cloud mask, per snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskCounts {
    pub pre: usize,
    pub post: usize,
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct SeverityProducts {
    pub aoi: AreaOfInterest,
    pub pre_scene: SceneCandidate,
    pub post_scene: SceneCandidate,
    pub pre_nbr: SpectralIndexRaster,
    pub post_nbr: SpectralIndexRaster,
    pub dnbr: DeltaRaster,
    pub severity: Raster<u8>,
    pub summary: SeveritySummary,
    pub masked: MaskCounts,
}

/// NIR and SWIR on one grid plus the scene's mask count.
struct PreparedBands {
    nir: Raster<f64>,
    swir: Raster<f64>,
    masked: usize,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The burn-severity pipeline over a catalog and a band reader.
///
/// A pipeline holds no per-run state; independent requests may run on
/// separate instances in parallel.
pub struct BurnSeverityPipeline<C, R> {
    catalog: C,
    reader: R,
    config: PipelineConfig,
}

impl<C: CatalogConnector, R: BandReader> BurnSeverityPipeline<C, R> {
    /// Fails with [`Error::InvalidParameter`] for an invalid configuration.
    pub fn new(catalog: C, reader: R, config: PipelineConfig) -> emberline_core::Result<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            reader,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage for `request`.
    pub fn run(&self, request: &SeverityRequest) -> Result<SeverityProducts, PipelineError> {
        info!(
            envelope = ?request.aoi.envelope().to_array(),
            pre = %request.pre_window,
            post = %request.post_window,
            "starting burn-severity run"
        );

        let pre_scene = self
            .select(request, request.pre_window)
            .at(Stage::PreSceneSelection)?;
        let post_scene = self
            .select(request, request.post_window)
            .at(Stage::PostSceneSelection)?;

        let pre = self.prepare(&pre_scene)?;
        let post = self.prepare(&post_scene)?;

        let masked = MaskCounts {
            pre: pre.masked,
            post: post.masked,
        };

        let params = &self.config.index;
        let pre_nbr = compute_index(&pre.nir, &pre.swir, Snapshot::Pre, params).at(Stage::Index)?;
        let post_nbr =
            compute_index(&post.nir, &post.swir, Snapshot::Post, params).at(Stage::Index)?;
        drop((pre, post));
        info!("NBR computed for both snapshots");

        let dnbr = compute_delta(pre_nbr.raster(), post_nbr.raster()).at(Stage::Delta)?;
        let severity = classify(&dnbr, &self.config.thresholds).at(Stage::Classification)?;
        info!(rows = severity.rows(), cols = severity.cols(), "severity classified");

        let summary = pixel_ground_area_km2(&severity)
            .and_then(|area| summarize(&severity, area))
            .at(Stage::Statistics)?
            .with_delta(&dnbr);
        info!(
            valid_pixels = summary.total_valid_pixels,
            burned_km2 = summary.burned_area_km2,
            burned_percent = summary.burned_percent,
            "run complete"
        );

        Ok(SeverityProducts {
            aoi: request.aoi.clone(),
            masked,
            pre_scene,
            post_scene,
            pre_nbr,
            post_nbr,
            dnbr,
            severity,
            summary,
        })
    }

    fn select(&self, request: &SeverityRequest, window: DateWindow) -> emberline_core::Result<SceneCandidate> {
        let ceiling = self.config.catalog.max_cloud_cover;
        let search = SearchRequest::new(request.aoi.clone(), window.start, window.end, ceiling);
        let candidates = self.catalog.search(&search)?;
        debug!(window = %window, candidates = candidates.len(), "catalog answered");
        let scene = select_scene(&candidates, ceiling)?;
        info!(
            scene = %scene.id,
            acquired = %scene.acquired,
            cloud_cover = scene.cloud_cover,
            "scene selected"
        );
        Ok(scene.clone())
    }

    /// Read, align and mask one scene's bands.
    fn prepare(&self, scene: &SceneCandidate) -> Result<PreparedBands, PipelineError> {
        let mask = self.config.cloud_mask.mask();
        // A masked run never proceeds on unmasked bands.
        if mask.is_some() && scene.assets.classification.is_none() {
            let key = self.config.bands.classification.as_deref().unwrap_or("classification");
            warn!(scene = %scene.id, key, "cloud mask enabled but scene has no classification asset");
            return Err(PipelineError::new(
                Stage::BandRead,
                Error::asset_unreadable(key, format!("scene {} has no classification asset", scene.id)),
            ));
        }

        let nir = self.reader.read(&scene.assets.nir).at(Stage::BandRead)?;
        let swir = self.reader.read(&scene.assets.swir).at(Stage::BandRead)?;
        let classification = match (&mask, &scene.assets.classification) {
            (Some(_), Some(asset)) => Some(self.reader.read(asset).at(Stage::BandRead)?),
            _ => None,
        };

        let (nir, swir) = align(&nir, &swir, Resampling::Bilinear).at(Stage::Alignment)?;
        debug!(scene = %scene.id, rows = nir.rows(), cols = nir.cols(), "bands aligned");

        match (mask, classification) {
            (Some(mask), Some(classes)) => {
                let (nir, swir) = mask.mask_pair(&nir, &swir, &classes).at(Stage::CloudMask)?;
                let masked = nir.masked.max(swir.masked);
                debug!(scene = %scene.id, masked, "cloud mask applied");
                Ok(PreparedBands {
                    nir: nir.raster,
                    swir: swir.raster,
                    masked,
                })
            }
            _ => Ok(PreparedBands {
                nir,
                swir,
                masked: 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_window_parsing() {
        let w: DateWindow = "2021-06-01/2021-07-15".parse().unwrap();
        assert_eq!(w.start, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
        assert_eq!(w.to_string(), "2021-06-01/2021-07-15");
        assert!("2021-07-15/2021-06-01".parse::<DateWindow>().is_err());
        assert!("2021-06-01".parse::<DateWindow>().is_err());
        assert!("2021-13-01/2021-14-01".parse::<DateWindow>().is_err());
    }

    #[test]
    fn single_day_window() {
        let d = NaiveDate::from_ymd_opt(2021, 8, 30).unwrap();
        assert!(DateWindow::new(d, d).is_ok());
    }
}
