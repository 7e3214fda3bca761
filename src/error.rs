// src/error.rs
//
// Two error families: configuration problems stop the process before the
// frame loop starts; frame problems are skipped and the stream continues.
// Enrichment failures never become errors here, they are folded into
// `DescriptionOutcome` and logged inside the worker.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("video source not found: {0}")]
    MissingSource(PathBuf),

    #[error("detections feed not found: {0}")]
    MissingDetections(PathBuf),

    #[error("video files need the `opencv` feature: {0}")]
    UnsupportedSource(PathBuf),

    #[error("region needs at least 2 points, got {0}")]
    RegionTooShort(usize),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("storage unreachable: {0}")]
    StorageUnreachable(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("detection without a track id")]
    Untracked,

    #[error("non-finite bounding box for track {0}")]
    NonFiniteBox(u32),

    #[error("bounding box for track {0} is outside the pixel range")]
    BoxOutOfRange(u32),

    #[error("tracker feed line {line}: {reason}")]
    MalformedFeed { line: usize, reason: String },
}
