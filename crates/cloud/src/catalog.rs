//! Scene catalog boundary: candidate scenes, band roles and scene selection.
//!
//! [`CatalogConnector`] is the seam between the pipeline and whatever serves
//! imagery metadata. [`StacCatalogConnector`] implements it over a STAC API
//! using a private single-threaded Tokio runtime, so callers stay synchronous.

use std::cmp::Ordering;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use emberline_core::{AreaOfInterest, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CloudError, Result};
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};
use crate::stac_models::{StacItem, StacSearchParams};

/// Default Sentinel-2 Level-2A collection.
pub const DEFAULT_COLLECTION: &str = "sentinel-2-l2a";

// ---------------------------------------------------------------------------
// Band roles
// ---------------------------------------------------------------------------

/// The fixed set of bands the burn-severity chain consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandRole {
    Nir,
    Swir,
    Classification,
}

impl BandRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandRole::Nir => "nir",
            BandRole::Swir => "swir",
            BandRole::Classification => "classification",
        }
    }
}

impl std::fmt::Display for BandRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one asset: the catalog's asset key and where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub key: String,
    pub href: String,
}

impl AssetRef {
    pub fn new(key: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            href: href.into(),
        }
    }
}

/// Assets of a scene, by role. NIR and SWIR are mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandAssets {
    pub nir: AssetRef,
    pub swir: AssetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<AssetRef>,
}

impl BandAssets {
    pub fn get(&self, role: BandRole) -> Option<&AssetRef> {
        match role {
            BandRole::Nir => Some(&self.nir),
            BandRole::Swir => Some(&self.swir),
            BandRole::Classification => self.classification.as_ref(),
        }
    }
}

/// Catalog asset keys for each band role (Sentinel-2 L2A naming by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandKeys {
    pub nir: String,
    pub swir: String,
    /// `None` disables the classification band entirely.
    pub classification: Option<String>,
}

impl Default for BandKeys {
    fn default() -> Self {
        Self {
            nir: "B08".into(),
            swir: "B12".into(),
            classification: Some("SCL".into()),
        }
    }
}

impl BandKeys {
    /// Resolve the role → asset mapping for a STAC item.
    ///
    /// Returns the first missing required role on failure. A missing
    /// classification asset is not an error.
    pub fn resolve(&self, item: &StacItem) -> std::result::Result<BandAssets, BandRole> {
        let lookup = |key: &str| item.asset(key).map(|a| AssetRef::new(key, a.href.clone()));
        let nir = lookup(&self.nir).ok_or(BandRole::Nir)?;
        let swir = lookup(&self.swir).ok_or(BandRole::Swir)?;
        let classification = self.classification.as_deref().and_then(lookup);
        Ok(BandAssets {
            nir,
            swir,
            classification,
        })
    }
}

// ---------------------------------------------------------------------------
// Candidates and requests
// ---------------------------------------------------------------------------

/// A scene returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneCandidate {
    pub id: String,
    pub acquired: DateTime<Utc>,
    /// Percent, 0–100.
    pub cloud_cover: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub assets: BandAssets,
}

/// Geometry, closed date window and cloud ceiling for one search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub aoi: AreaOfInterest,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub max_cloud_cover: f64,
}

impl SearchRequest {
    pub fn new(aoi: AreaOfInterest, start: NaiveDate, end: NaiveDate, max_cloud_cover: f64) -> Self {
        Self {
            aoi,
            start,
            end,
            max_cloud_cover,
        }
    }

    /// Reject reversed windows and ceilings outside 0–100.
    pub fn validate(&self) -> emberline_core::Result<()> {
        if self.start > self.end {
            return Err(Error::InvalidParameter {
                name: "date window",
                value: format!("{}/{}", self.start, self.end),
                reason: "start is after end".into(),
            });
        }
        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            return Err(Error::InvalidParameter {
                name: "max_cloud_cover",
                value: self.max_cloud_cover.to_string(),
                reason: "must be a percentage between 0 and 100".into(),
            });
        }
        Ok(())
    }
}

/// Source of scene candidates.
///
/// Implementations return a finite list ordered by acquisition time. Calling
/// `search` again with the same request starts over.
pub trait CatalogConnector {
    fn search(&self, request: &SearchRequest) -> emberline_core::Result<Vec<SceneCandidate>>;
}

impl<C: CatalogConnector + ?Sized> CatalogConnector for &C {
    fn search(&self, request: &SearchRequest) -> emberline_core::Result<Vec<SceneCandidate>> {
        (**self).search(request)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Pick the candidate with the lowest cloud cover at or below `max_cloud_cover`.
///
/// Ties go to the earliest acquisition, then the lowest id. Fails with
/// [`Error::NoSuitableScene`] when nothing qualifies.
pub fn select_scene(
    candidates: &[SceneCandidate],
    max_cloud_cover: f64,
) -> emberline_core::Result<&SceneCandidate> {
    candidates
        .iter()
        .filter(|c| c.cloud_cover.is_finite() && c.cloud_cover <= max_cloud_cover)
        .min_by(|a, b| {
            a.cloud_cover
                .partial_cmp(&b.cloud_cover)
                .unwrap_or(Ordering::Equal)
                .then(a.acquired.cmp(&b.acquired))
                .then_with(|| a.id.cmp(&b.id))
        })
        .ok_or_else(|| {
            Error::NoSuitableScene(if candidates.is_empty() {
                "catalog returned no scenes".to_string()
            } else {
                format!(
                    "all {} scenes exceed the {}% cloud ceiling",
                    candidates.len(),
                    max_cloud_cover
                )
            })
        })
}

/// Write candidates as pretty JSON.
pub fn export_candidates<P: AsRef<Path>>(path: P, candidates: &[SceneCandidate]) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(writer, candidates)
        .map_err(|e| CloudError::Parse(format!("serializing candidates: {e}")))
}

// ---------------------------------------------------------------------------
// STAC connector
// ---------------------------------------------------------------------------

/// Blocking [`CatalogConnector`] over a STAC API.
pub struct StacCatalogConnector {
    rt: tokio::runtime::Runtime,
    client: StacClient,
    collection: String,
    keys: BandKeys,
    page_limit: u32,
}

impl StacCatalogConnector {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;
        let client = StacClient::new(catalog, options)?;
        Ok(Self {
            rt,
            client,
            collection: DEFAULT_COLLECTION.to_string(),
            keys: BandKeys::default(),
            page_limit: 50,
        })
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_band_keys(mut self, keys: BandKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    pub fn client(&self) -> &StacClient {
        &self.client
    }

    fn search_params(&self, request: &SearchRequest) -> StacSearchParams {
        StacSearchParams::new()
            .intersects(request.aoi.to_geojson())
            .date_range(request.start, request.end)
            .collections(&[self.collection.as_str()])
            .limit(self.page_limit)
            .max_cloud_cover(request.max_cloud_cover)
            .sort_by_datetime()
    }

    fn search_items(&self, request: &SearchRequest) -> Result<Vec<StacItem>> {
        let params = self.search_params(request);
        self.rt.block_on(self.client.search_all(&params))
    }
}

impl CatalogConnector for StacCatalogConnector {
    fn search(&self, request: &SearchRequest) -> emberline_core::Result<Vec<SceneCandidate>> {
        request.validate()?;
        info!(
            collection = %self.collection,
            window = %format!("{}/{}", request.start, request.end),
            max_cloud_cover = request.max_cloud_cover,
            "searching catalog"
        );
        let items = self
            .search_items(request)
            .map_err(CloudError::into_catalog_error)?;
        debug!(items = items.len(), "catalog items returned");
        Ok(candidates_from_items(items, &self.keys))
    }
}

/// Convert STAC items into candidates ordered by acquisition time.
///
/// Items lacking a timestamp, a cloud cover figure or a required band are
/// dropped with a warning.
pub fn candidates_from_items(items: Vec<StacItem>, keys: &BandKeys) -> Vec<SceneCandidate> {
    let mut out: Vec<SceneCandidate> = items
        .into_iter()
        .filter_map(|item| {
            let Some(acquired) = item.acquired() else {
                warn!(scene = %item.id, "skipping scene without a valid datetime");
                return None;
            };
            let Some(cloud_cover) = item.cloud_cover() else {
                warn!(scene = %item.id, "skipping scene without eo:cloud_cover");
                return None;
            };
            let assets = match keys.resolve(&item) {
                Ok(a) => a,
                Err(role) => {
                    warn!(scene = %item.id, %role, "skipping scene missing a required band");
                    return None;
                }
            };
            Some(SceneCandidate {
                id: item.id,
                acquired,
                cloud_cover,
                collection: item.collection,
                assets,
            })
        })
        .collect();
    out.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.id.cmp(&b.id)));
    out
}
