use futures_util::future::LocalBoxFuture;
use scene::FeatureCollection;
use tracing::debug;
use url::Url;

use crate::request::{RasterQuery, VectorQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Network(String),
    Status { url: String, status: u16 },
    Decode(String),
    /// The generation advanced while the fetch was in flight.
    Cancelled,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "request failed: {msg}"),
            FetchError::Status { url, status } => write!(f, "HTTP {status} from {url}"),
            FetchError::Decode(msg) => write!(f, "failed to decode response: {msg}"),
            FetchError::Cancelled => write!(f, "request cancelled"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Remote source of boundary feature collections.
pub trait VectorService {
    fn fetch(&self, query: &VectorQuery)
    -> LocalBoxFuture<'static, Result<FeatureCollection, FetchError>>;
}

/// Remote source of raster tile-URL templates.
///
/// An empty string means the service has no coverage for the query.
pub trait RasterService {
    fn fetch(&self, query: &RasterQuery) -> LocalBoxFuture<'static, Result<String, FetchError>>;
}

/// WFS `GetFeature` client returning GeoJSON.
#[derive(Debug, Clone)]
pub struct WfsVectorService {
    client: reqwest::Client,
    base_url: String,
}

impl WfsVectorService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn request_url(&self, query: &VectorQuery) -> Result<Url, FetchError> {
        let mut params: Vec<(&str, String)> = vec![
            ("service", "WFS".to_string()),
            ("version", "2.0.0".to_string()),
            ("request", "GetFeature".to_string()),
            ("typeNames", query.layer_name.clone()),
            ("outputFormat", "application/json".to_string()),
        ];
        if let Some(cql) = query.cql() {
            params.push(("CQL_FILTER", cql));
        }
        Url::parse_with_params(&self.base_url, &params)
            .map_err(|e| FetchError::Network(format!("bad service url {}: {e}", self.base_url)))
    }
}

impl VectorService for WfsVectorService {
    fn fetch(
        &self,
        query: &VectorQuery,
    ) -> LocalBoxFuture<'static, Result<FeatureCollection, FetchError>> {
        let client = self.client.clone();
        let url = self.request_url(query);
        Box::pin(async move {
            let url = url?;
            debug!(%url, "fetching features");
            let resp = client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                });
            }

            resp.json::<FeatureCollection>()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))
        })
    }
}

/// `GET {base}/lulc?{filters}&year={year}` returning a tile-URL template as text.
#[derive(Debug, Clone)]
pub struct TileUrlService {
    client: reqwest::Client,
    base_url: String,
}

impl TileUrlService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn request_url(&self, query: &RasterQuery) -> Result<Url, FetchError> {
        let endpoint = format!("{}/lulc", self.base_url.trim_end_matches('/'));
        Url::parse_with_params(&endpoint, query.params())
            .map_err(|e| FetchError::Network(format!("bad service url {endpoint}: {e}")))
    }
}

impl RasterService for TileUrlService {
    fn fetch(&self, query: &RasterQuery) -> LocalBoxFuture<'static, Result<String, FetchError>> {
        let client = self.client.clone();
        let url = self.request_url(query);
        Box::pin(async move {
            let url = url?;
            debug!(%url, "fetching tile url");
            let resp = client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                });
            }

            let body = resp
                .text()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            Ok(body.trim().to_string())
        })
    }
}
