// src/storage/geoip.rs
use axum::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use super::StoreError;

pub const UNKNOWN_COUNTRY: &str = "UNKNOWN";

#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// ISO 3166 alpha-2 code, upper case, or `UNKNOWN`.
    async fn country_code(&self, ip: IpAddr) -> Result<String, StoreError>;
}

/// Fixed lookup table; anything absent resolves to `UNKNOWN`.
#[derive(Default)]
pub struct StaticGeoResolver {
    table: HashMap<IpAddr, String>,
}

impl StaticGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: IpAddr, country: &str) -> Self {
        self.table.insert(ip, country.to_ascii_uppercase());
        self
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    async fn country_code(&self, ip: IpAddr) -> Result<String, StoreError> {
        Ok(self
            .table
            .get(&ip)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    country_code: Option<String>,
}

/// Resolves against an HTTP service answering `GET {endpoint}/{ip}` with
/// `{"country_code": "US"}`.
pub struct HttpGeoResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGeoResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn country_code(&self, ip: IpAddr) -> Result<String, StoreError> {
        let url = format!("{}/{}", self.endpoint, ip);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: GeoResponse = response.json().await?;

        Ok(body
            .country_code
            .filter(|code| !code.trim().is_empty())
            .map(|code| code.trim().to_ascii_uppercase())
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()))
    }
}
