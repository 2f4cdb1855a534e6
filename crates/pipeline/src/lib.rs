//! # Emberline Pipeline
//!
//! Orchestrates a burn-severity assessment from an area of interest and two
//! date windows to classified rasters, statistics and a map overlay.
//!
//! ```ignore
//! use emberline_cloud::{HttpBandReader, StacCatalogConnector};
//! use emberline_pipeline::{BurnSeverityPipeline, PipelineConfig, SeverityRequest};
//!
//! let config = PipelineConfig::from_env()?;
//! let catalog = StacCatalogConnector::new(config.catalog.catalog.clone(), config.catalog.client_options())?;
//! let reader = HttpBandReader::new(config.catalog.catalog.clone(), config.catalog.client_options(), "downloads")?;
//! let pipeline = BurnSeverityPipeline::new(catalog, reader, config)?;
//! let products = pipeline.run(&SeverityRequest::new(aoi, pre, post))?;
//! emberline_pipeline::write_products(&products, "out".as_ref(), &pipeline.config().output)?;
//! ```

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;

pub use config::{CatalogConfig, CloudMaskConfig, OutputConfig, PipelineConfig, CONFIG_ENV};
pub use error::{ConfigError, PipelineError, Stage};
pub use output::{write_products, WrittenProducts};
pub use pipeline::{
    BurnSeverityPipeline, DateWindow, MaskCounts, SeverityProducts, SeverityRequest,
};
