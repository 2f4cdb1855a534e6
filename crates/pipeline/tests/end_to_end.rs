//! Pipeline runs against an in-memory catalog and band store.

use std::cell::Cell;
use std::collections::HashMap;

use approx::assert_relative_eq;
use chrono::{NaiveDate, TimeZone, Utc};
use emberline_algorithms::imagery::{SeverityClass, Snapshot, NO_DATA_CLASS};
use emberline_cloud::{AssetRef, BandAssets, BandReader, CatalogConnector, SceneCandidate, SearchRequest};
use emberline_core::{AreaOfInterest, Error, GeoTransform, Raster, CRS};
use emberline_pipeline::{
    write_products, BurnSeverityPipeline, DateWindow, OutputConfig, PipelineConfig, SeverityRequest,
    Stage,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeCatalog {
    /// Candidates keyed by window start.
    scenes: HashMap<NaiveDate, Vec<SceneCandidate>>,
}

impl CatalogConnector for FakeCatalog {
    fn search(&self, request: &SearchRequest) -> emberline_core::Result<Vec<SceneCandidate>> {
        Ok(self.scenes.get(&request.start).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeReader {
    bands: HashMap<String, Raster<f64>>,
    reads: Cell<usize>,
}

impl BandReader for FakeReader {
    fn read(&self, asset: &AssetRef) -> emberline_core::Result<Raster<f64>> {
        self.reads.set(self.reads.get() + 1);
        self.bands
            .get(&asset.href)
            .cloned()
            .ok_or_else(|| Error::asset_unreadable(&asset.key, "404 Not Found"))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const ORIGIN_X: f64 = 499_980.0;
const ORIGIN_Y: f64 = 4_200_000.0;

fn band(size: usize, cell: f64, value: f64, origin_x: f64) -> Raster<f64> {
    let mut r = Raster::filled(size, size, value);
    r.set_transform(GeoTransform::new(origin_x, ORIGIN_Y, cell, -cell));
    r.set_crs(Some(CRS::utm(10, true)));
    r.set_nodata(Some(0.0));
    r
}

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, m, d).unwrap()
}

fn candidate(id: &str, acquired: NaiveDate, cloud: f64) -> SceneCandidate {
    SceneCandidate {
        id: id.into(),
        acquired: Utc
            .from_utc_datetime(&acquired.and_hms_opt(18, 49, 0).unwrap()),
        cloud_cover: cloud,
        collection: Some("sentinel-2-l2a".into()),
        assets: BandAssets {
            nir: AssetRef::new("B08", format!("{id}/B08.tif")),
            swir: AssetRef::new("B12", format!("{id}/B12.tif")),
            classification: Some(AssetRef::new("SCL", format!("{id}/SCL.tif"))),
        },
    }
}

struct SceneBands {
    nir: f64,
    swir: f64,
    cloudy_corner: bool,
    origin_x: f64,
}

impl SceneBands {
    fn new(nir: f64, swir: f64) -> Self {
        Self {
            nir,
            swir,
            cloudy_corner: false,
            origin_x: ORIGIN_X,
        }
    }

    fn cloudy(mut self) -> Self {
        self.cloudy_corner = true;
        self
    }

    fn insert(&self, id: &str, store: &mut HashMap<String, Raster<f64>>) {
        let mut scl = band(4, 20.0, 4.0, self.origin_x);
        if self.cloudy_corner {
            scl.set(0, 0, 9.0).unwrap();
        }
        store.insert(format!("{id}/B08.tif"), band(8, 10.0, self.nir, self.origin_x));
        store.insert(format!("{id}/B12.tif"), band(4, 20.0, self.swir, self.origin_x));
        store.insert(format!("{id}/SCL.tif"), scl);
    }
}

fn pre_window() -> DateWindow {
    DateWindow::new(day(6, 1), day(7, 31)).unwrap()
}

fn post_window() -> DateWindow {
    DateWindow::new(day(10, 1), day(10, 31)).unwrap()
}

fn request() -> SeverityRequest {
    // 0.1° x 0.1° box over the burn scar
    let aoi = AreaOfInterest::from_bounding_box(-120.25, 38.70, -120.15, 38.80).unwrap();
    SeverityRequest::new(aoi, pre_window(), post_window())
}

/// One clear scene per window plus a rejected cloudy one, burned in between.
fn burned_world(post: SceneBands) -> (FakeCatalog, FakeReader) {
    let mut scenes = HashMap::new();
    scenes.insert(
        pre_window().start,
        vec![
            candidate("S2_PRE_CLOUDY", day(6, 20), 35.0),
            candidate("S2_PRE", day(7, 10), 2.0),
        ],
    );
    scenes.insert(post_window().start, vec![candidate("S2_POST", day(10, 14), 7.5)]);

    let mut reader = FakeReader::default();
    SceneBands::new(5000.0, 1000.0).insert("S2_PRE", &mut reader.bands);
    SceneBands::new(5000.0, 1000.0).insert("S2_PRE_CLOUDY", &mut reader.bands);
    post.insert("S2_POST", &mut reader.bands);
    (FakeCatalog { scenes }, reader)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn burned_area_end_to_end() {
    let (catalog, reader) = burned_world(SceneBands::new(1000.0, 4000.0).cloudy());
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, PipelineConfig::default()).unwrap();
    let products = pipeline.run(&request()).unwrap();

    assert_eq!(products.pre_scene.id, "S2_PRE");
    assert_eq!(products.post_scene.id, "S2_POST");
    assert_eq!(reader.reads.get(), 6);

    // finer (10 m) grid wins
    assert_eq!(products.severity.shape(), (8, 8));
    assert!(products.severity.is_aligned_with(&products.dnbr));
    assert_eq!(products.pre_nbr.snapshot(), Snapshot::Pre);
    assert_relative_eq!(products.pre_nbr.raster().get(5, 5).unwrap(), 0.666_666, epsilon = 1e-5);
    assert_relative_eq!(products.post_nbr.raster().get(5, 5).unwrap(), -0.6, epsilon = 1e-9);
    assert_relative_eq!(products.dnbr.get(5, 5).unwrap(), 1.266_666, epsilon = 1e-5);

    assert_eq!(products.masked.pre, 0);
    assert_eq!(products.masked.post, 4);
    assert_eq!(products.severity.get(0, 0).unwrap(), NO_DATA_CLASS);
    assert_eq!(products.severity.get(7, 7).unwrap(), SeverityClass::High.code());

    let s = &products.summary;
    assert_eq!(s.total_valid_pixels, 60);
    assert_eq!(s.nodata_pixels, 4);
    let total: f64 = s.classes.iter().map(|c| c.percent).sum();
    assert_relative_eq!(total, 100.0, epsilon = 1e-9);
    assert_relative_eq!(s.high_severity_percent, 100.0);
    assert_relative_eq!(s.pixel_area_km2, 1.0e-4, epsilon = 1e-15);
    assert!(s.dnbr.is_some());
}

#[test]
fn unburned_scene_with_mask_disabled() {
    let (catalog, reader) = burned_world(SceneBands::new(5000.0, 1000.0).cloudy());
    let mut config = PipelineConfig::default();
    config.cloud_mask.enabled = false;
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, config).unwrap();
    let products = pipeline.run(&request()).unwrap();

    // classification bands are never read
    assert_eq!(reader.reads.get(), 4);
    assert_eq!(products.masked.post, 0);
    assert_eq!(products.summary.total_valid_pixels, 64);
    assert_relative_eq!(products.summary.class(SeverityClass::Unburned).percent, 100.0);
    assert_relative_eq!(products.summary.burned_area_km2, 0.0);
}

#[test]
fn cloudy_post_window_stops_before_any_read() {
    let (mut catalog, reader) = burned_world(SceneBands::new(1000.0, 4000.0));
    catalog.scenes.insert(
        post_window().start,
        vec![candidate("A", day(10, 3), 40.0), candidate("B", day(10, 8), 10.5)],
    );
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, PipelineConfig::default()).unwrap();
    let err = pipeline.run(&request()).unwrap_err();

    assert_eq!(err.stage, Stage::PostSceneSelection);
    assert_eq!(err.kind(), "NoSuitableScene");
    assert_eq!(reader.reads.get(), 0);
}

#[test]
fn empty_pre_window() {
    let (mut catalog, reader) = burned_world(SceneBands::new(1000.0, 4000.0));
    catalog.scenes.remove(&pre_window().start);
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, PipelineConfig::default()).unwrap();
    let err = pipeline.run(&request()).unwrap_err();
    assert_eq!(err.stage, Stage::PreSceneSelection);
    assert_eq!(err.kind(), "NoSuitableScene");
}

#[test]
fn missing_asset_fails_band_read() {
    let (catalog, mut reader) = burned_world(SceneBands::new(1000.0, 4000.0));
    reader.bands.remove("S2_POST/B12.tif");
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, PipelineConfig::default()).unwrap();
    let err = pipeline.run(&request()).unwrap_err();
    assert_eq!(err.stage, Stage::BandRead);
    assert!(matches!(err.source, Error::AssetUnreadable { ref asset, .. } if asset == "B12"));
}

#[test]
fn masked_run_requires_classification_asset() {
    let (mut catalog, reader) = burned_world(SceneBands::new(1000.0, 4000.0).cloudy());
    let mut post = candidate("S2_POST", day(10, 14), 7.5);
    post.assets.classification = None;
    catalog.scenes.insert(post_window().start, vec![post]);

    let pipeline = BurnSeverityPipeline::new(catalog, &reader, PipelineConfig::default()).unwrap();
    let err = pipeline.run(&request()).unwrap_err();
    assert_eq!(err.stage, Stage::BandRead);
    assert!(matches!(err.source, Error::AssetUnreadable { ref asset, .. } if asset == "SCL"));
    // pre scene bands only; nothing read for the rejected post scene
    assert_eq!(reader.reads.get(), 3);
}

#[test]
fn unmasked_run_accepts_scene_without_classification() {
    let (mut catalog, reader) = burned_world(SceneBands::new(1000.0, 4000.0).cloudy());
    let mut post = candidate("S2_POST", day(10, 14), 7.5);
    post.assets.classification = None;
    catalog.scenes.insert(post_window().start, vec![post]);

    let mut config = PipelineConfig::default();
    config.cloud_mask.enabled = false;
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, config).unwrap();
    let products = pipeline.run(&request()).unwrap();
    assert_eq!(products.masked.post, 0);
    assert_eq!(products.summary.total_valid_pixels, 64);
}

#[test]
fn shifted_post_grid_is_a_grid_mismatch() {
    let mut post = SceneBands::new(1000.0, 4000.0);
    post.origin_x = ORIGIN_X + 20.0;
    let (catalog, reader) = burned_world(post);
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, PipelineConfig::default()).unwrap();
    let err = pipeline.run(&request()).unwrap_err();
    assert_eq!(err.stage, Stage::Delta);
    assert_eq!(err.kind(), "GridMismatch");
}

#[test]
fn fully_clouded_scene_is_an_empty_raster() {
    let (catalog, mut reader) = burned_world(SceneBands::new(1000.0, 4000.0));
    reader
        .bands
        .insert("S2_POST/SCL.tif".into(), band(4, 20.0, 9.0, ORIGIN_X));
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, PipelineConfig::default()).unwrap();
    let err = pipeline.run(&request()).unwrap_err();
    assert_eq!(err.stage, Stage::Statistics);
    assert_eq!(err.kind(), "EmptyRaster");
}

#[test]
fn invalid_config_rejected_up_front() {
    let (catalog, reader) = burned_world(SceneBands::new(1000.0, 4000.0));
    let mut config = PipelineConfig::default();
    config.thresholds.high = 0.2;
    assert!(BurnSeverityPipeline::new(catalog, &reader, config).is_err());
}

#[test]
fn products_written_atomically() {
    let (catalog, reader) = burned_world(SceneBands::new(1000.0, 4000.0).cloudy());
    let pipeline = BurnSeverityPipeline::new(catalog, &reader, PipelineConfig::default()).unwrap();
    let products = pipeline.run(&request()).unwrap();

    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("caldor");
    let written = write_products(&products, &out, &OutputConfig::default()).unwrap();
    assert_eq!(written.files.len(), 8);
    assert!(written.files.iter().all(|f| f.exists()));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["total_valid_pixels"], 60);
    let scenes: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("scenes.json")).unwrap()).unwrap();
    assert_eq!(scenes["post"]["id"], "S2_POST");
    assert_eq!(scenes["masked_pixels"]["post"], 4);

    // overlay placed on the dNBR grid's own extent (UTM 10N, 80 m square)
    let overlay: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("dnbr_overlay.json")).unwrap()).unwrap();
    let bounds = &overlay["bounds"];
    let (min_lon, max_lon) = (bounds["min_lon"].as_f64().unwrap(), bounds["max_lon"].as_f64().unwrap());
    let (min_lat, max_lat) = (bounds["min_lat"].as_f64().unwrap(), bounds["max_lat"].as_f64().unwrap());
    assert!(min_lon < -123.0 && max_lon > -123.0, "{min_lon}..{max_lon}");
    assert!(max_lon - min_lon < 0.002);
    assert!((37.9..38.0).contains(&min_lat) && max_lat > min_lat);

    // no staging directories left next to the output
    let siblings: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
    assert_eq!(siblings.len(), 1);

    let err = write_products(&products, &out, &OutputConfig::default()).unwrap_err();
    assert_eq!(err.stage, Stage::Output);

    let overwrite = OutputConfig {
        overwrite: true,
        write_overlay: false,
        ..OutputConfig::default()
    };
    let again = write_products(&products, &out, &overwrite).unwrap();
    assert_eq!(again.files.len(), 6);
    assert!(!out.join("dnbr_overlay.tif").exists());
}
