//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Planetary Computer and Earth Search out of the box, plus
//! arbitrary STAC API endpoints via [`StacCatalog::Custom`].

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CloudError, Result};
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

const PC_SIGN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum StacCatalog {
    /// Microsoft Planetary Computer STAC API.
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Any STAC API endpoint (root URL or full `/search` URL).
    Custom(String),
}

impl StacCatalog {
    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`. Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Whether this catalog requires SAS token signing for asset access.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }
}

impl Default for StacCatalog {
    fn default() -> Self {
        Self::PlanetaryComputer
    }
}

impl From<String> for StacCatalog {
    fn from(s: String) -> Self {
        Self::from_str_or_url(&s)
    }
}

impl From<StacCatalog> for String {
    fn from(c: StacCatalog) -> Self {
        match c {
            StacCatalog::PlanetaryComputer => "planetary-computer".into(),
            StacCatalog::EarthSearch => "earth-search".into(),
            StacCatalog::Custom(url) => url,
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout for searches (default 30 s).
    pub request_timeout: Duration,
    /// Timeout for a whole asset download (default 10 min).
    pub download_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// Maximum total items a search may match (default 100).
    pub max_items: usize,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(600),
            max_retries: 3,
            max_items: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search and asset download.
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    /// Create a new STAC client.
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            catalog,
            client,
            options,
        })
    }

    /// The catalog this client is configured for.
    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    // ── Single-page search ──────────────────────────────────────────

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        self.post_search(&url, params).await
    }

    // ── Paginated search ────────────────────────────────────────────

    /// Search with automatic pagination, collecting every matching item.
    ///
    /// Fails with [`CloudError::TooManyItems`] when the search matches more
    /// than `max_items`.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let mut all_items: Vec<StacItem> = Vec::new();
        let max = self.options.max_items;

        let mut page = self.search(params).await?;

        loop {
            let next = page.next_link().cloned();
            all_items.append(&mut page.features);
            debug!(items = all_items.len(), "STAC page received");

            ensure_within_cap(all_items.len(), max)?;
            let Some(link) = next else { break };
            page = self.follow_next(&link, params).await?;
            if page.is_empty() {
                break;
            }
        }

        Ok(all_items)
    }

    // ── Asset access ────────────────────────────────────────────────

    /// Sign an asset href for Planetary Computer via the `/sign` endpoint.
    ///
    /// For non-PC catalogs this is a no-op and returns the href unchanged.
    pub async fn sign_asset_href(&self, href: &str) -> Result<String> {
        if !self.catalog.needs_signing() {
            return Ok(href.to_string());
        }
        self.sign_pc_href(href).await
    }

    /// Stream `href` into `dest`. Returns the number of bytes written.
    ///
    /// The body is written chunk by chunk; a partially written file is left
    /// for the caller to discard.
    pub async fn download(&self, href: &str, dest: &Path) -> Result<u64> {
        let mut resp = self
            .client
            .get(href)
            .timeout(self.options.download_timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CloudError::Network(format!(
                "GET {} returned HTTP {}",
                href, status
            )));
        }

        let mut file = File::create(dest)?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        file.flush()?;

        if written == 0 {
            return Err(CloudError::Network(format!("GET {} returned an empty body", href)));
        }
        debug!(href, bytes = written, "asset downloaded");
        Ok(written)
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post_search(&self, url: &str, params: &StacSearchParams) -> Result<StacItemCollection> {
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s, 2s, ...
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(url)
                .timeout(self.options.request_timeout)
                .json(params)
                .send()
                .await;

            match resp {
                Ok(r) if r.status().is_success() => {
                    let body = r
                        .text()
                        .await
                        .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
                    return serde_json::from_str(&body)
                        .map_err(|e| CloudError::Parse(format!("STAC search response: {e}")));
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    warn!(%status, attempt, "STAC search rejected");
                    last_err = Some(CloudError::Network(format!(
                        "STAC search returned HTTP {}: {}",
                        status,
                        body.chars().take(500).collect::<String>()
                    )));
                    // Don't retry client errors (4xx)
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "STAC search request failed");
                    last_err = Some(CloudError::Network(format!("STAC search request failed: {e}")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network("STAC search failed".into())))
    }

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(
        &self,
        link: &StacLink,
        original_params: &StacSearchParams,
    ) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();

        if method == "POST" {
            let body = next_page_body(link, original_params)?;
            let merged: StacSearchParams = serde_json::from_value(body)
                .map_err(|e| CloudError::Parse(format!("merged pagination body: {e}")))?;
            self.post_search(&link.href, &merged).await
        } else {
            let resp = self
                .client
                .get(&link.href)
                .timeout(self.options.request_timeout)
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(CloudError::Network(format!(
                    "STAC pagination returned HTTP {}: {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let body = resp.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| CloudError::Parse(format!("pagination response: {e}")))
        }
    }

    /// Sign a single href via the Planetary Computer SAS endpoint.
    async fn sign_pc_href(&self, href: &str) -> Result<String> {
        let resp = self
            .client
            .get(PC_SIGN_URL)
            .query(&[("href", href)])
            .timeout(self.options.request_timeout)
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("PC sign request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "PC sign returned HTTP {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CloudError::Auth(format!("parsing PC sign response: {e}")))?;

        body["href"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CloudError::Auth("PC sign response missing 'href' field".into()))
    }
}

fn ensure_within_cap(collected: usize, max: usize) -> Result<()> {
    if collected > max {
        warn!(collected, max, "STAC search exceeds the item cap");
        return Err(CloudError::TooManyItems { max });
    }
    Ok(())
}

/// Request body for a POST `next` link: the link body alone, or merged over
/// the original search when `merge` is set.
fn next_page_body(link: &StacLink, original: &StacSearchParams) -> Result<serde_json::Value> {
    let original = || {
        serde_json::to_value(original)
            .map_err(|e| CloudError::Parse(format!("serializing params: {e}")))
    };

    match (&link.body, link.merge.unwrap_or(false)) {
        (Some(link_body), true) => {
            let mut base = original()?;
            if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), link_body.as_object()) {
                for (k, v) in link_obj {
                    base_obj.insert(k.clone(), v.clone());
                }
            }
            Ok(base)
        }
        (Some(link_body), false) => Ok(link_body.clone()),
        (None, _) => original(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
