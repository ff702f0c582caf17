// src/templates/mod.rs
pub mod index;

mod layout;

pub use layout::render_page;
