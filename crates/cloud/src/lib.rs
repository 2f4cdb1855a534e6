//! # Emberline Cloud
//!
//! Imagery catalog access for the burn-severity pipeline.
//!
//! - [`stac_client`]: async STAC Item Search with pagination, retry and
//!   Planetary Computer href signing
//! - [`catalog`]: the [`CatalogConnector`] boundary, scene candidates keyed by
//!   band role, and lowest-cloud scene selection
//! - [`band_reader`]: the [`BandReader`] boundary with local GeoTIFF and
//!   download-then-decode readers
//!
//! Blocking adapters own a single-threaded Tokio runtime, so callers never
//! need one of their own.

pub mod band_reader;
pub mod catalog;
pub mod error;
pub mod stac_client;
pub mod stac_models;

pub use band_reader::{BandReader, GeoTiffBandReader, HttpBandReader};
pub use catalog::{
    export_candidates, select_scene, AssetRef, BandAssets, BandKeys, BandRole, CatalogConnector,
    SceneCandidate, SearchRequest, StacCatalogConnector,
};
pub use error::{CloudError, Result};
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};
