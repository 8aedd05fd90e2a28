#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod feed;
pub mod likes;
pub mod logging;
pub mod markup;
pub mod model;
pub mod pagination;
pub mod render;
pub mod submit;
pub mod ui;

#[cfg(test)]
mod testing;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
