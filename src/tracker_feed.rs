// src/tracker_feed.rs
//
// Detector + tracker seam. The frame loop only sees `ObjectTracker`; the
// shipped implementation replays recorded tracker output so the pipeline can
// run without a model on the box.
//
// Feed format (JSONL, one line per frame, frames without objects may be
// omitted):
//   {"frame": 12, "detections": [{"bbox": [x1, y1, x2, y2], "track_id": 7, "class_id": 6}]}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ConfigError, FrameError};
use crate::types::{Detection, Frame};

pub trait ObjectTracker: Send {
    /// Tracked detections for this frame. An error skips the frame.
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

#[derive(Debug, Deserialize)]
struct FeedLine {
    frame: u64,
    #[serde(default)]
    detections: Vec<Detection>,
}

pub struct ReplayTracker {
    by_frame: HashMap<u64, Vec<Detection>>,
}

impl ReplayTracker {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::MissingDetections(path.to_path_buf()).into());
        }
        let file =
            File::open(path).with_context(|| format!("opening detections {}", path.display()))?;
        let tracker = Self::from_reader(BufReader::new(file))?;
        info!(
            "✓ Loaded tracker feed: {} ({} frame(s))",
            path.display(),
            tracker.by_frame.len()
        );
        Ok(tracker)
    }

    /// Parse a feed. Malformed lines are logged and skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut by_frame: HashMap<u64, Vec<Detection>> = HashMap::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.context("reading detections feed")?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedLine>(trimmed) {
                Ok(entry) => by_frame.entry(entry.frame).or_default().extend(entry.detections),
                Err(e) => {
                    let err = FrameError::MalformedFeed {
                        line: idx + 1,
                        reason: e.to_string(),
                    };
                    warn!("⚠️  {}", err);
                }
            }
        }

        Ok(Self { by_frame })
    }

    pub fn from_frames(frames: Vec<(u64, Vec<Detection>)>) -> Self {
        let mut by_frame: HashMap<u64, Vec<Detection>> = HashMap::new();
        for (frame_id, dets) in frames {
            by_frame.entry(frame_id).or_default().extend(dets);
        }
        Self { by_frame }
    }
}

impl ObjectTracker for ReplayTracker {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.by_frame.remove(&frame.frame_id).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use std::io::Cursor;

    #[test]
    fn test_feed_is_indexed_by_frame() {
        let feed = r#"
{"frame": 1, "detections": [{"bbox": [10, 20, 50, 60], "track_id": 7, "class_id": 6}]}
{"frame": 3, "detections": [{"bbox": [12, 22, 52, 62], "track_id": 7, "class_id": 6}, {"bbox": [0, 0, 5, 5], "class_id": 0}]}
"#;
        let mut tracker = ReplayTracker::from_reader(Cursor::new(feed)).unwrap();

        let f1 = tracker.track(&Frame::filled(4, 4, [0, 0, 0], 1)).unwrap();
        assert_eq!(f1.len(), 1);
        assert_eq!(f1[0].bbox, BoundingBox::new(10.0, 20.0, 50.0, 60.0));
        assert_eq!(f1[0].track_id, Some(7));

        assert!(tracker.track(&Frame::filled(4, 4, [0, 0, 0], 2)).unwrap().is_empty());

        let f3 = tracker.track(&Frame::filled(4, 4, [0, 0, 0], 3)).unwrap();
        assert_eq!(f3.len(), 2);
        assert_eq!(f3[1].track_id, None);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let feed = "not json\n{\"frame\": 2, \"detections\": [{\"bbox\": [1, 2], \"track_id\": 1, \"class_id\": 0}]}\n{\"frame\": 4}\n";
        let mut tracker = ReplayTracker::from_reader(Cursor::new(feed)).unwrap();
        assert!(tracker.track(&Frame::filled(4, 4, [0, 0, 0], 2)).unwrap().is_empty());
        assert!(tracker.track(&Frame::filled(4, 4, [0, 0, 0], 4)).unwrap().is_empty());
    }

    #[test]
    fn test_missing_feed_is_a_config_error() {
        let err = ReplayTracker::open(Path::new("/definitely/not/here.jsonl"))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingDetections(_))
        ));
    }
}
