use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::geometry::BoundingBox;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub detections: DetectionFeedConfig,
    pub region: RegionConfig,
    pub tracking: TrackingConfig,
    pub enrichment: EnrichmentConfig,
    pub description: DescriptionConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Directory of frame images, or a video file with the `opencv` feature.
    pub source: String,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Show an interactive window (`opencv` feature only).
    pub display: bool,
    pub save_annotated: bool,
    pub output_dir: String,
    pub line_width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFeedConfig {
    /// JSONL file with one tracker result per frame.
    pub path: String,
    /// Class-id → label table. Empty means COCO names.
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub points: Vec<[i32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Tracks unseen for this many frames are forgotten. 0 keeps them forever.
    pub idle_prune_frames: u64,
    pub prune_interval_frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// Frame loop waits for queue space.
    Block,
    /// Job is logged and discarded when the queue is full.
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub crops_dir: String,
    pub jpeg_quality: u8,
    pub queue_capacity: usize,
    pub max_concurrent_jobs: usize,
    pub job_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub backpressure: Backpressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionProvider {
    Gemini,
    Http,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionConfig {
    pub provider: DescriptionProvider,
    pub model: String,
    /// Name of the env var holding the API key (never the key itself).
    pub api_key_env: String,
    /// Base URL override for Gemini, or the full URL for `http`.
    pub endpoint: Option<String>,
    pub prompt: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Sqlite,
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: StorageBackend,
    pub sqlite_path: String,
    pub jsonl_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Decoded RGB frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub frame_id: u64,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize, frame_id: u64, timestamp_ms: f64) -> Self {
        Self {
            data,
            width,
            height,
            frame_id,
            timestamp_ms,
        }
    }

    /// Uniformly coloured frame, handy for synthetic streams.
    pub fn filled(width: usize, height: usize, rgb: [u8; 3], frame_id: u64) -> Self {
        let data = rgb.iter().copied().cycle().take(width * height * 3).collect();
        Self::new(data, width, height, frame_id, 0.0)
    }
}

/// One tracker output row: box, persistent id (if assigned) and class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    #[serde(default)]
    pub track_id: Option<u32>,
    pub class_id: usize,
}

impl Detection {
    pub fn new(bbox: BoundingBox, track_id: u32, class_id: usize) -> Self {
        Self {
            bbox,
            track_id: Some(track_id),
            class_id,
        }
    }

    /// Track id of a usable detection.
    pub fn validate(&self) -> Result<u32, FrameError> {
        let track_id = self.track_id.ok_or(FrameError::Untracked)?;
        if !self.bbox.is_finite() {
            return Err(FrameError::NonFiniteBox(track_id));
        }
        if !self.bbox.in_pixel_range() {
            return Err(FrameError::BoxOutOfRange(track_id));
        }
        Ok(track_id)
    }
}

/// Class-id → label lookup.
#[derive(Debug, Clone)]
pub struct ClassNames(Vec<String>);

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    pub fn coco() -> Self {
        Self(COCO_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    pub fn from_config(names: &[String]) -> Self {
        if names.is_empty() {
            Self::coco()
        } else {
            Self(names.to_vec())
        }
    }

    pub fn name(&self, class_id: usize) -> String {
        self.0
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];
