//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [catalog]
//! catalog = "planetary-computer"   # or "earth-search", or a STAC API URL
//! collection = "sentinel-2-l2a"
//! max_cloud_cover = 10.0
//!
//! [bands]
//! nir = "B08"
//! swir = "B12"
//! classification = "SCL"
//!
//! [cloud_mask]
//! enabled = true
//! unreliable_classes = [8, 9, 10, 11]
//!
//! [index]
//! reflectance_scale = 10000.0
//! reflectance_offset = 0.0
//!
//! [thresholds]
//! unburned = -0.10
//! low = 0.10
//! moderate_low = 0.27
//! moderate_high = 0.44
//! high = 0.66
//!
//! [output]
//! write_overlay = true
//! overlay_opacity = 0.65
//! ```

use std::path::Path;
use std::time::Duration;

use emberline_algorithms::imagery::{IndexParams, SeverityThresholds};
use emberline_algorithms::masking::{CloudMask, SCL_DEFAULT_UNRELIABLE};
use emberline_cloud::{BandKeys, StacCatalog, StacClientOptions};
use emberline_core::Error;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming a default configuration file.
pub const CONFIG_ENV: &str = "EMBERLINE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub catalog: CatalogConfig,
    pub bands: BandKeys,
    pub cloud_mask: CloudMaskConfig,
    pub index: IndexParams,
    pub thresholds: SeverityThresholds,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub catalog: StacCatalog,
    pub collection: String,
    /// Cloud ceiling in percent, inclusive.
    pub max_cloud_cover: f64,
    /// Items per search page.
    pub page_limit: u32,
    /// Upper bound on items gathered across pages.
    pub max_items: usize,
    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let client = StacClientOptions::default();
        Self {
            catalog: StacCatalog::PlanetaryComputer,
            collection: emberline_cloud::catalog::DEFAULT_COLLECTION.to_string(),
            max_cloud_cover: 10.0,
            page_limit: 50,
            max_items: client.max_items,
            request_timeout_secs: client.request_timeout.as_secs(),
            download_timeout_secs: client.download_timeout.as_secs(),
            max_retries: client.max_retries,
        }
    }
}

impl CatalogConfig {
    pub fn client_options(&self) -> StacClientOptions {
        StacClientOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            max_retries: self.max_retries,
            max_items: self.max_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudMaskConfig {
    pub enabled: bool,
    pub unreliable_classes: Vec<u16>,
}

impl Default for CloudMaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unreliable_classes: SCL_DEFAULT_UNRELIABLE.to_vec(),
        }
    }
}

impl CloudMaskConfig {
    /// The mask to apply, or `None` when masking is switched off.
    pub fn mask(&self) -> Option<CloudMask> {
        self.enabled
            .then(|| CloudMask::new(self.unreliable_classes.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub write_overlay: bool,
    pub overlay_opacity: f64,
    /// Replace an existing, non-empty output directory.
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_overlay: true,
            overlay_opacity: 0.65,
            overwrite: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load the file named by `EMBERLINE_CONFIG`, or the defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> emberline_core::Result<()> {
        let c = &self.catalog;
        if !(0.0..=100.0).contains(&c.max_cloud_cover) {
            return Err(Error::InvalidParameter {
                name: "catalog.max_cloud_cover",
                value: c.max_cloud_cover.to_string(),
                reason: "must be a percentage between 0 and 100".into(),
            });
        }
        if c.page_limit == 0 || c.max_items == 0 {
            return Err(Error::InvalidParameter {
                name: "catalog.page_limit",
                value: format!("{} / {}", c.page_limit, c.max_items),
                reason: "page limit and max items must be positive".into(),
            });
        }
        if self.bands.nir.is_empty() || self.bands.swir.is_empty() {
            return Err(Error::InvalidParameter {
                name: "bands",
                value: format!("{:?}", self.bands),
                reason: "NIR and SWIR asset keys are required".into(),
            });
        }
        if self.cloud_mask.enabled && self.cloud_mask.unreliable_classes.is_empty() {
            return Err(Error::InvalidParameter {
                name: "cloud_mask.unreliable_classes",
                value: "[]".into(),
                reason: "an enabled mask needs at least one class code".into(),
            });
        }
        self.index.validate()?;
        self.thresholds.validate()?;
        let o = self.output.overlay_opacity;
        if !(0.0..=1.0).contains(&o) {
            return Err(Error::InvalidParameter {
                name: "output.overlay_opacity",
                value: o.to_string(),
                reason: "must be between 0 and 1".into(),
            });
        }
        Ok(())
    }
}
