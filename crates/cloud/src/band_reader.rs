//! Band readers: turn an asset reference into a georeferenced grid.
//!
//! Every failure (missing file, HTTP error, truncated body, undecodable
//! TIFF) is reported as [`Error::AssetUnreadable`] naming the asset key.

use std::fs;
use std::path::{Path, PathBuf};

use emberline_core::io::read_geotiff;
use emberline_core::{Error, Raster};
use tracing::{debug, info};

use crate::catalog::AssetRef;
use crate::error::CloudError;
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};

/// Source of band rasters.
pub trait BandReader {
    fn read(&self, asset: &AssetRef) -> emberline_core::Result<Raster<f64>>;
}

impl<R: BandReader + ?Sized> BandReader for &R {
    fn read(&self, asset: &AssetRef) -> emberline_core::Result<Raster<f64>> {
        (**self).read(asset)
    }
}

// ── Local files ─────────────────────────────────────────────────────

/// Reads GeoTIFFs from the local filesystem. `file://` hrefs are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffBandReader;

impl GeoTiffBandReader {
    fn local_path(href: &str) -> &Path {
        Path::new(href.strip_prefix("file://").unwrap_or(href))
    }
}

impl BandReader for GeoTiffBandReader {
    fn read(&self, asset: &AssetRef) -> emberline_core::Result<Raster<f64>> {
        let path = Self::local_path(&asset.href);
        debug!(asset = %asset.key, path = %path.display(), "reading band");
        read_geotiff(path).map_err(|e| Error::asset_unreadable(&asset.key, e))
    }
}

// ── Remote assets ───────────────────────────────────────────────────

/// Removes the in-progress download unless disarmed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn commit(mut self, dest: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, dest)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Downloads HTTP(S) assets into a working directory, then decodes them.
///
/// Planetary Computer hrefs are signed first. Non-HTTP hrefs fall through
/// to [`GeoTiffBandReader`].
pub struct HttpBandReader {
    rt: tokio::runtime::Runtime,
    client: StacClient,
    work_dir: PathBuf,
    keep_downloads: bool,
}

impl HttpBandReader {
    pub fn new(
        catalog: StacCatalog,
        options: StacClientOptions,
        work_dir: impl Into<PathBuf>,
    ) -> crate::Result<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;
        Ok(Self {
            rt,
            client: StacClient::new(catalog, options)?,
            work_dir,
            keep_downloads: false,
        })
    }

    /// Leave decoded downloads in the working directory.
    pub fn keep_downloads(mut self, keep: bool) -> Self {
        self.keep_downloads = keep;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Download `asset` and return the local path.
    pub fn fetch(&self, asset: &AssetRef) -> crate::Result<PathBuf> {
        let dest = self.work_dir.join(local_file_name(asset));
        let part = PartialFile::new(dest.with_extension("part"));

        let bytes = self.rt.block_on(async {
            let href = self.client.sign_asset_href(&asset.href).await?;
            self.client.download(&href, &part.path).await
        })?;

        part.commit(&dest)?;
        info!(asset = %asset.key, bytes, path = %dest.display(), "asset downloaded");
        Ok(dest)
    }
}

impl BandReader for HttpBandReader {
    fn read(&self, asset: &AssetRef) -> emberline_core::Result<Raster<f64>> {
        if !is_remote(&asset.href) {
            return GeoTiffBandReader.read(asset);
        }
        let path = self.fetch(asset).map_err(|e| e.into_asset_error(&asset.key))?;
        let raster = read_geotiff(&path).map_err(|e| Error::asset_unreadable(&asset.key, e));
        if !self.keep_downloads {
            let _ = fs::remove_file(&path);
        }
        raster
    }
}

fn is_remote(href: &str) -> bool {
    href.starts_with("http://") || href.starts_with("https://")
}

/// `<key>_<last path segment>` with any query string dropped.
fn local_file_name(asset: &AssetRef) -> String {
    let path = asset.href.split(['?', '#']).next().unwrap_or("");
    let name = path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("asset.tif");
    format!("{}_{}", asset.key, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberline_core::io::write_geotiff;
    use emberline_core::{GeoTransform, CRS};

    #[test]
    fn local_reader_decodes_geotiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("B08.tif");
        let mut r = Raster::filled(3, 4, 2500.0_f64);
        r.set_transform(GeoTransform::new(600_000.0, 4_300_000.0, 10.0, -10.0));
        r.set_crs(Some(CRS::utm(10, true)));
        write_geotiff(&r, &path, None).unwrap();

        let href = format!("file://{}", path.display());
        let band = GeoTiffBandReader.read(&AssetRef::new("B08", href)).unwrap();
        assert_eq!(band.shape(), (3, 4));
        assert_eq!(band.get(2, 3).unwrap(), 2500.0);
        assert!(band.is_aligned_with(&r));
    }

    #[test]
    fn missing_file_is_asset_unreadable() {
        let err = GeoTiffBandReader
            .read(&AssetRef::new("B12", "/nonexistent/B12.tif"))
            .unwrap_err();
        assert!(matches!(err, Error::AssetUnreadable { ref asset, .. } if asset == "B12"));
    }

    #[test]
    fn garbage_file_is_asset_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SCL.tif");
        fs::write(&path, b"not a tiff").unwrap();
        let err = GeoTiffBandReader
            .read(&AssetRef::new("SCL", path.to_string_lossy()))
            .unwrap_err();
        assert_eq!(err.kind(), "AssetUnreadable");
    }

    #[test]
    fn partial_file_removed_unless_committed() {
        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("x.part");
        fs::write(&part_path, b"half").unwrap();
        drop(PartialFile::new(part_path.clone()));
        assert!(!part_path.exists());

        fs::write(&part_path, b"whole").unwrap();
        let dest = dir.path().join("x.tif");
        PartialFile::new(part_path.clone()).commit(&dest).unwrap();
        assert!(!part_path.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"whole");
    }

    #[test]
    fn file_names_drop_query_strings() {
        let a = AssetRef::new("B08", "https://host/tiles/T10SFH/B08_10m.tif?st=2021&sig=abc");
        assert_eq!(local_file_name(&a), "B08_B08_10m.tif");
        let b = AssetRef::new("SCL", "https://host/");
        assert_eq!(local_file_name(&b), "SCL_host");
    }

    #[test]
    fn unreachable_host_is_asset_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let options = StacClientOptions {
            request_timeout: std::time::Duration::from_millis(200),
            download_timeout: std::time::Duration::from_millis(500),
            ..StacClientOptions::default()
        };
        let reader =
            HttpBandReader::new(StacCatalog::EarthSearch, options, dir.path().join("dl")).unwrap();
        let err = reader
            .read(&AssetRef::new("B08", "http://127.0.0.1:9/B08.tif"))
            .unwrap_err();
        assert_eq!(err.kind(), "AssetUnreadable");
        let leftovers: Vec<_> = fs::read_dir(reader.work_dir()).unwrap().collect();
        assert!(leftovers.is_empty());
    }
}
