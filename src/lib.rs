// src/lib.rs

pub mod config;
pub mod crop;
pub mod enrichment;
pub mod error;
pub mod geometry;
pub mod persistence;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod track_store;
pub mod tracker_feed;
pub mod types;

pub use error::{ConfigError, FrameError};
pub use types::Config;
