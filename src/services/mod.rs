// src/services/mod.rs
pub mod audit;
