// src/handlers/mod.rs
pub mod firewall_admin;
pub mod web;
