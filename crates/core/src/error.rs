//! Error types for Emberline

use thiserror::Error;

/// Main error type for Emberline operations.
///
/// The first six variants form the burn-severity error taxonomy; every stage
/// of the pipeline reports one of them (or a raster-library variant) and
/// propagates it unmodified.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("no suitable scene: {0}")]
    NoSuitableScene(String),

    #[error("asset unreadable: {asset}: {reason}")]
    AssetUnreadable { asset: String, reason: String },

    #[error("resolution mismatch: {0}")]
    ResolutionMismatch(String),

    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    #[error("empty raster: {0}")]
    EmptyRaster(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an [`Error::AssetUnreadable`] from any displayable cause.
    pub fn asset_unreadable(asset: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::AssetUnreadable {
            asset: asset.into(),
            reason: reason.to_string(),
        }
    }

    /// Short, stable name of the error kind (used in reports and logs).
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidGeometry(_) => "InvalidGeometry",
            Error::NoSuitableScene(_) => "NoSuitableScene",
            Error::AssetUnreadable { .. } => "AssetUnreadable",
            Error::ResolutionMismatch(_) => "ResolutionMismatch",
            Error::GridMismatch(_) => "GridMismatch",
            Error::EmptyRaster(_) => "EmptyRaster",
            Error::Catalog(_) => "Catalog",
            Error::Io(_) => "Io",
            Error::InvalidDimensions { .. } => "InvalidDimensions",
            Error::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            Error::SizeMismatch { .. } => "SizeMismatch",
            Error::UnsupportedDataType(_) => "UnsupportedDataType",
            Error::InvalidParameter { .. } => "InvalidParameter",
            Error::Other(_) => "Other",
        }
    }
}

/// Result type alias for Emberline operations
pub type Result<T> = std::result::Result<T, Error>;
