//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Serde models for STAC Item Search (POST /search): geometry, datetime and
//! collection filters, the `query` extension for cloud cover, pagination via
//! `links`, and the asset/property subset used to build scene candidates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search` (STAC API – Item Search).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacSearchParams {
    /// GeoJSON geometry the items must intersect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Query extension filters, e.g. `{"eo:cloud_cover": {"lte": 10}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortby: Option<Vec<SortBy>>,
}

/// Sort extension entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: String,
}

impl StacSearchParams {
    /// Create empty search params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to items intersecting a GeoJSON geometry.
    pub fn intersects(mut self, geometry: Value) -> Self {
        self.intersects = Some(geometry);
        self
    }

    /// Set datetime or datetime range (e.g. `"2024-06-01/2024-06-30"`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    /// Closed date range covering both days entirely.
    pub fn date_range(self, start: NaiveDate, end: NaiveDate) -> Self {
        let dt = format!(
            "{}T00:00:00Z/{}T23:59:59Z",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        self.datetime(&dt)
    }

    /// Set collection filter.
    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Set maximum items per page.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Only items whose `eo:cloud_cover` is at most `percent`.
    pub fn max_cloud_cover(mut self, percent: f64) -> Self {
        let filter = json!({ "eo:cloud_cover": { "lte": percent } });
        match self.query.as_mut().and_then(Value::as_object_mut) {
            Some(existing) => {
                if let Some(obj) = filter.as_object() {
                    existing.extend(obj.clone());
                }
            }
            None => self.query = Some(filter),
        }
        self
    }

    /// Ascending sort by acquisition time.
    pub fn sort_by_datetime(mut self) -> Self {
        self.sortby = Some(vec![SortBy {
            field: "properties.datetime".into(),
            direction: "asc".into(),
        }]);
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,

    /// Earth Search / some catalogs use `context` instead of numberMatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StacItemCollection {
    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    #[serde(rename = "type")]
    pub type_: String,

    /// Unique item identifier.
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,

    /// Bounding box `[west, south, east, north]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(default)]
    pub links: Vec<StacLink>,
}

impl StacItem {
    /// Get an asset by key.
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// Acquisition time from `properties.datetime`.
    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        let raw = self.properties.datetime.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Cloud cover percentage (EO extension).
    pub fn cloud_cover(&self) -> Option<f64> {
        self.properties.eo_cloud_cover
    }

    /// EPSG code from the projection extension (`proj:epsg`, or `proj:code`
    /// of the form `EPSG:32630`).
    pub fn epsg(&self) -> Option<u32> {
        let extra = &self.properties.extra;
        if let Some(code) = extra.get("proj:epsg").and_then(Value::as_u64) {
            return Some(code as u32);
        }
        extra
            .get("proj:code")
            .and_then(Value::as_str)
            .and_then(|s| s.strip_prefix("EPSG:"))
            .and_then(|s| s.parse().ok())
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// All other properties we don't model explicitly.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    /// Media type (e.g., `"image/tiff; application=geotiff; profile=cloud-optimized"`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A STAC Link (used for pagination and related resources).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    /// Relationship: `"self"`, `"root"`, `"next"`, `"prev"`, etc.
    pub rel: String,

    pub href: String,

    /// HTTP method for the link (default GET, but `"next"` often uses POST).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Merge mode: if true, merge body with previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const FIXTURE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "S2B_MSIL2A_20210830T184919_R113_T10SFH_20210901T041426",
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[-121.0, 38.7], [-119.7, 38.7], [-119.7, 39.7], [-121.0, 39.7], [-121.0, 38.7]]]
      },
      "bbox": [-121.0, 38.7, -119.7, 39.7],
      "properties": {
        "datetime": "2021-08-30T18:49:19.024000Z",
        "eo:cloud_cover": 3.4,
        "platform": "Sentinel-2B",
        "proj:epsg": 32610
      },
      "assets": {
        "B08": {
          "href": "https://example.com/T10SFH/B08_10m.tif",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Band 8 - NIR - 10m",
          "roles": ["data"]
        },
        "B12": {
          "href": "https://example.com/T10SFH/B12_20m.tif",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Band 12 - SWIR (2.2) - 20m",
          "roles": ["data"]
        },
        "SCL": {
          "href": "https://example.com/T10SFH/SCL_20m.tif",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Scene classfication map (SCL)",
          "roles": ["data"]
        },
        "rendered_preview": {
          "href": "https://example.com/preview.png",
          "type": "image/png",
          "roles": ["overview"]
        }
      },
      "collection": "sentinel-2-l2a",
      "links": []
    },
    {
      "type": "Feature",
      "id": "S2A_MSIL2A_20210825T184921_R113_T10SFH_20210826T033405",
      "properties": {
        "datetime": "2021-08-25T18:49:21Z",
        "eo:cloud_cover": 41.0,
        "proj:code": "EPSG:32610"
      },
      "assets": {
        "B08": { "href": "https://example.com/a/B08_10m.tif" }
      },
      "collection": "sentinel-2-l2a"
    }
  ],
  "links": [
    {
      "rel": "next",
      "href": "https://planetarycomputer.microsoft.com/api/stac/v1/search",
      "method": "POST",
      "body": {"token": "next:abc123"},
      "merge": true
    },
    {
      "rel": "self",
      "href": "https://planetarycomputer.microsoft.com/api/stac/v1/search"
    }
  ],
  "numberMatched": 42,
  "numberReturned": 2
}"#;

    #[test]
    fn parse_item_collection() {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(col.type_, "FeatureCollection");
        assert_eq!(col.len(), 2);
        assert_eq!(col.number_matched, Some(42));
    }

    #[test]
    fn item_acquisition_and_cloud_cover() {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        let item = &col.features[0];
        let acquired = item.acquired().unwrap();
        assert_eq!(acquired.format("%Y-%m-%d").to_string(), "2021-08-30");
        assert!((item.cloud_cover().unwrap() - 3.4).abs() < f64::EPSILON);
        assert_eq!(item.collection.as_deref(), Some("sentinel-2-l2a"));
    }

    #[test]
    fn epsg_from_either_projection_field() {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(col.features[0].epsg(), Some(32610));
        assert_eq!(col.features[1].epsg(), Some(32610));
    }

    #[test]
    fn asset_lookup() {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        let item = &col.features[0];
        assert_eq!(item.asset("B12").unwrap().href, "https://example.com/T10SFH/B12_20m.tif");
        assert!(item.asset("B04").is_none());
    }

    #[test]
    fn pagination_links() {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        let next = col.next_link().unwrap();
        assert_eq!(next.method.as_deref(), Some("POST"));
        assert_eq!(next.merge, Some(true));
    }

    #[test]
    fn search_body_shape() {
        let start = NaiveDate::from_ymd_opt(2021, 8, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2021, 8, 31).unwrap();
        let params = StacSearchParams::new()
            .intersects(json!({"type": "Polygon", "coordinates": []}))
            .date_range(start, end)
            .collections(&["sentinel-2-l2a"])
            .limit(50)
            .max_cloud_cover(10.0)
            .sort_by_datetime();

        let body = serde_json::to_value(&params).unwrap();
        assert_eq!(body["datetime"], "2021-08-01T00:00:00Z/2021-08-31T23:59:59Z");
        assert_eq!(body["query"]["eo:cloud_cover"]["lte"], 10.0);
        assert_eq!(body["sortby"][0]["field"], "properties.datetime");
        assert_eq!(body["intersects"]["type"], "Polygon");
        assert!(body.get("bbox").is_none());
        assert!(body.get("token").is_none());
    }
}
