//! Integration tests against live STAC catalogs.
//!
//! All tests here need network access and are `#[ignore]`d.
//! Run with: `cargo test -p emberline-cloud -- --ignored stac`

use chrono::NaiveDate;
use emberline_cloud::catalog::{select_scene, BandKeys, CatalogConnector, SearchRequest, StacCatalogConnector};
use emberline_cloud::stac_client::{StacCatalog, StacClient, StacClientOptions};
use emberline_cloud::stac_models::StacSearchParams;
use emberline_core::AreaOfInterest;

/// Caldor fire, California, 2021.
fn caldor_aoi() -> AreaOfInterest {
    AreaOfInterest::from_bounding_box(-120.25, 38.70, -120.15, 38.80).expect("valid AOI")
}

#[tokio::test]
#[ignore]
async fn stac_earth_search_cloud_filter() {
    let client = StacClient::new(StacCatalog::EarthSearch, StacClientOptions::default())
        .expect("failed to create client");

    let params = StacSearchParams::new()
        .intersects(caldor_aoi().to_geojson())
        .datetime("2021-06-01T00:00:00Z/2021-07-31T23:59:59Z")
        .collections(&["sentinel-2-l2a"])
        .max_cloud_cover(10.0)
        .limit(5);

    let results = client.search(&params).await.expect("search failed");
    println!("Found {} items", results.len());
    assert!(!results.is_empty(), "should find at least one item");

    for item in &results.features {
        let cc = item.cloud_cover().expect("eo:cloud_cover present");
        println!("  {} dt={:?} cc={}", item.id, item.acquired(), cc);
        assert!(cc <= 10.0);
        assert!(item.acquired().is_some());
    }
}

#[tokio::test]
#[ignore]
async fn stac_pc_url_signing() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");

    let params = StacSearchParams::new()
        .intersects(caldor_aoi().to_geojson())
        .datetime("2021-09-01T00:00:00Z/2021-09-30T23:59:59Z")
        .collections(&["sentinel-2-l2a"])
        .limit(1);
    let results = client.search(&params).await.expect("search failed");
    let href = &results.features[0].asset("B12").expect("B12 asset").href;

    let signed = client.sign_asset_href(href).await.expect("signing failed");
    assert!(signed.contains("sig="), "should contain SAS token params");
    assert!(signed.starts_with(href.as_str()));
}

#[tokio::test]
#[ignore]
async fn stac_paginated_search() {
    let opts = StacClientOptions {
        max_items: 15,
        ..StacClientOptions::default()
    };
    let client = StacClient::new(StacCatalog::EarthSearch, opts).expect("failed to create client");

    let params = StacSearchParams::new()
        .intersects(caldor_aoi().to_geojson())
        .datetime("2021-01-01T00:00:00Z/2021-12-31T23:59:59Z")
        .collections(&["sentinel-2-l2a"])
        .limit(5);

    let items = client.search_all(&params).await.expect("search_all failed");
    println!("Fetched {} items across pages", items.len());
    assert!(items.len() > 5, "should have fetched more than one page");
    assert!(items.len() <= 15, "should respect max_items");
}

#[test]
#[ignore]
fn stac_connector_selects_clear_scene() {
    // Earth Search names assets by common name rather than band id.
    let keys = BandKeys {
        nir: "nir".into(),
        swir: "swir22".into(),
        classification: Some("scl".into()),
    };
    let connector = StacCatalogConnector::new(StacCatalog::EarthSearch, StacClientOptions::default())
        .expect("connector")
        .with_band_keys(keys);

    let request = SearchRequest::new(
        caldor_aoi(),
        NaiveDate::from_ymd_opt(2021, 10, 1).unwrap(),
        NaiveDate::from_ymd_opt(2021, 10, 31).unwrap(),
        10.0,
    );
    let candidates = connector.search(&request).expect("search failed");
    assert!(candidates.windows(2).all(|w| w[0].acquired <= w[1].acquired));

    let best = select_scene(&candidates, 10.0).expect("a clear scene");
    println!("selected {} ({}%)", best.id, best.cloud_cover);
    assert!(candidates.iter().all(|c| c.cloud_cover >= best.cloud_cover));
}
