use crate::error::ConfigError;
use crate::geometry::Region;
use crate::types::{
    Backpressure, Config, DescriptionConfig, DescriptionProvider, DetectionFeedConfig,
    EnrichmentConfig, LoggingConfig, PersistenceConfig, RegionConfig, StorageBackend,
    TrackingConfig, VideoConfig,
};
use anyhow::{Context, Result};
use std::fs;
use std::time::Duration;

pub const DEFAULT_PROMPT: &str = "Provide a brief description of the railway object in the image.";

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
        Self::from_yaml(&contents).with_context(|| format!("parsing config {}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Settings that would only fail later, inside the loop, fail here instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.region()?;

        if self.video.frame_width == 0 || self.video.frame_height == 0 {
            return Err(ConfigError::Invalid {
                field: "video.frame_width/frame_height",
                reason: "frame size must be non-zero".to_string(),
            });
        }
        if self.enrichment.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "enrichment.queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.enrichment.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid {
                field: "enrichment.max_concurrent_jobs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.enrichment.job_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "enrichment.job_timeout_secs",
                reason: "an unbounded lookup is not allowed".to_string(),
            });
        }
        if !(1..=100).contains(&self.enrichment.jpeg_quality) {
            return Err(ConfigError::Invalid {
                field: "enrichment.jpeg_quality",
                reason: format!("{} is outside 1..=100", self.enrichment.jpeg_quality),
            });
        }
        if self.tracking.idle_prune_frames > 0 && self.tracking.prune_interval_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "tracking.prune_interval_frames",
                reason: "must be at least 1 when pruning is enabled".to_string(),
            });
        }
        Ok(())
    }

    pub fn region(&self) -> Result<Region, ConfigError> {
        Region::from_pairs(&self.region.points)
    }
}

impl EnrichmentConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            source: "frames".to_string(),
            frame_width: 640,
            frame_height: 360,
            display: false,
            save_annotated: false,
            output_dir: "output".to_string(),
            line_width: 2,
        }
    }
}

impl Default for DetectionFeedConfig {
    fn default() -> Self {
        Self {
            path: "detections.jsonl".to_string(),
            class_names: Vec::new(),
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            points: vec![[0, 200], [640, 200]],
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            idle_prune_frames: 900,
            prune_interval_frames: 30,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            crops_dir: "railway_crops".to_string(),
            jpeg_quality: 90,
            queue_capacity: 64,
            max_concurrent_jobs: 4,
            job_timeout_secs: 60,
            shutdown_grace_secs: 10,
            backpressure: Backpressure::Block,
        }
    }
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        Self {
            provider: DescriptionProvider::Gemini,
            model: "gemini-1.5-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            endpoint: None,
            prompt: DEFAULT_PROMPT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: "railway_data.db".to_string(),
            jsonl_path: "output/railway_objects.jsonl".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
