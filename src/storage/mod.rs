// src/storage/mod.rs - contracts for the stores the firewall consults
pub mod geoip;
pub mod ip_list;
pub mod rate_counter;

pub use geoip::{GeoResolver, HttpGeoResolver, StaticGeoResolver};
pub use ip_list::{IpListStore, MemoryIpList};
pub use rate_counter::{MemoryRateCounter, RateCounter};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store returned malformed data: {0}")]
    Malformed(String),

    #[error("no live session {0}")]
    UnknownSession(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Malformed(e.to_string())
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}
