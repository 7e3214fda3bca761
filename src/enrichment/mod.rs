// src/enrichment/mod.rs
//
// Everything that happens to a track after the frame loop has decided it is
// worth describing: crop archive, description lookup, result hand-off.
// Runs entirely off the frame loop and never touches track state.

pub mod description;
pub mod dispatcher;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::crop::CropImage;

pub use description::{
    build_description_service, DescriptionOutcome, DescriptionService, FallbackDescriber,
};
pub use dispatcher::{DispatchHandle, DispatchSummary, EnrichmentDispatcher};

/// Created once per track by the extractor, consumed once by a worker.
#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub track_id: u32,
    pub object_type: String,
    pub timestamp: NaiveDateTime,
    pub crop: CropImage,
    pub center_x: i32,
    pub center_y: i32,
    pub frame_id: u64,
}

/// What the persistence gateway receives. Ownership passes at hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub track_id: u32,
    pub object_type: String,
    pub timestamp: NaiveDateTime,
    pub description: String,
    pub x: i32,
    pub y: i32,
}

impl EnrichmentResult {
    pub fn from_job(job: &EnrichmentJob, description: String) -> Self {
        Self {
            track_id: job.track_id,
            object_type: job.object_type.clone(),
            timestamp: job.timestamp,
            description,
            x: job.center_x,
            y: job.center_y,
        }
    }
}
