// src/middleware/mod.rs
pub mod cache;
pub mod firewall;

pub use cache::{CacheService, CacheStore};
pub use firewall::{firewall_guard, FirewallState, SanitizedInput, Uploads};
