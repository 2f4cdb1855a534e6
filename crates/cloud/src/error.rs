//! Error types for catalog search and asset download.

use thiserror::Error;

/// Errors produced while talking to a STAC API or fetching assets.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("invalid STAC response: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search matched more than {max} items; narrow the date window or raise max_items")]
    TooManyItems { max: usize },

    #[error("core error: {0}")]
    Core(#[from] emberline_core::Error),
}

impl CloudError {
    /// Map a search-side failure into the core taxonomy.
    pub fn into_catalog_error(self) -> emberline_core::Error {
        match self {
            CloudError::Core(e) => e,
            other => emberline_core::Error::Catalog(other.to_string()),
        }
    }

    /// Map a download/decode failure of `asset` into the core taxonomy.
    pub fn into_asset_error(self, asset: &str) -> emberline_core::Error {
        match self {
            CloudError::Core(emberline_core::Error::AssetUnreadable { asset, reason }) => {
                emberline_core::Error::AssetUnreadable { asset, reason }
            }
            other => emberline_core::Error::asset_unreadable(asset, other),
        }
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failure_becomes_catalog_error() {
        let err = CloudError::Network("connection reset".into()).into_catalog_error();
        assert_eq!(err.kind(), "Catalog");
    }

    #[test]
    fn download_failure_becomes_asset_unreadable() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = CloudError::from(io).into_asset_error("B12");
        assert!(matches!(err, emberline_core::Error::AssetUnreadable { ref asset, .. } if asset == "B12"));
    }

    #[test]
    fn item_cap_becomes_catalog_error() {
        let err = CloudError::TooManyItems { max: 100 }.into_catalog_error();
        assert_eq!(err.kind(), "Catalog");
        assert!(err.to_string().contains("more than 100 items"));
    }

    #[test]
    fn core_errors_pass_through() {
        let err = CloudError::Core(emberline_core::Error::InvalidGeometry("x".into()));
        assert_eq!(err.into_catalog_error().kind(), "InvalidGeometry");
    }
}
