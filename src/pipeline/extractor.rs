// src/pipeline/extractor.rs
//
// Turns one frame's tracker output into dedup-checked events.
//
// Per detection, in order:
//   1. register / refresh the track and its position
//   2. crossing: box diagonal hits the region AND the track's crossed flag
//      flips on this call
//   3. enrichment: first sighting with a usable crop flips the dispatched
//      flag and emits a job. Crossing status plays no part here.
//
// Malformed detections are counted and skipped. A degenerate crop leaves the
// dispatched flag alone, so the track gets another chance on its next frame.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::crop::extract_crop;
use crate::enrichment::EnrichmentJob;
use crate::geometry::{crosses, BoundingBox, Point, Region};
use crate::track_store::TrackStore;
use crate::types::{ClassNames, Detection, Frame, TrackingConfig};

/// A track's diagonal touched the region for the first time.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    pub track_id: u32,
    pub object_type: String,
    pub frame_id: u64,
    pub position: Point,
}

/// Box + label handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub track_id: u32,
    pub label: String,
}

#[derive(Debug, Default)]
pub struct FrameEvents {
    pub crossings: Vec<CrossingEvent>,
    pub jobs: Vec<EnrichmentJob>,
    pub annotations: Vec<Annotation>,
    pub skipped: usize,
}

pub struct FrameEventExtractor {
    region: Region,
    classes: ClassNames,
    store: TrackStore,
    idle_prune_frames: u64,
    prune_interval_frames: u64,
}

impl FrameEventExtractor {
    pub fn new(region: Region, classes: ClassNames, tracking: &TrackingConfig) -> Self {
        Self {
            region,
            classes,
            store: TrackStore::new(),
            idle_prune_frames: tracking.idle_prune_frames,
            prune_interval_frames: tracking.prune_interval_frames.max(1),
        }
    }

    pub fn process(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        now: NaiveDateTime,
    ) -> FrameEvents {
        let mut events = FrameEvents::default();

        for det in detections {
            let track_id = match det.validate() {
                Ok(id) => id,
                Err(e) => {
                    debug!("Skipping detection on frame {}: {}", frame.frame_id, e);
                    events.skipped += 1;
                    continue;
                }
            };

            let object_type = self.classes.name(det.class_id);
            let center = det.bbox.center();

            let already_dispatched = self
                .store
                .get_or_create(track_id, &object_type, frame.frame_id)
                .enrichment_dispatched();
            self.store.update_position(track_id, center, frame.frame_id);

            if crosses(&self.region, &det.bbox) && self.store.mark_crossed(track_id) {
                events.crossings.push(CrossingEvent {
                    track_id,
                    object_type: object_type.clone(),
                    frame_id: frame.frame_id,
                    position: center,
                });
            }

            events.annotations.push(Annotation {
                bbox: det.bbox,
                track_id,
                label: format!("ID: {} | {}", track_id, object_type),
            });

            if already_dispatched {
                continue;
            }

            match extract_crop(frame, &det.bbox) {
                Some(crop) => {
                    if self.store.mark_enrichment_dispatched(track_id) {
                        events.jobs.push(EnrichmentJob {
                            track_id,
                            object_type,
                            timestamp: now,
                            crop,
                            center_x: center.x,
                            center_y: center.y,
                            frame_id: frame.frame_id,
                        });
                    }
                }
                None => debug!(
                    "Empty crop for track #{} on frame {}, enrichment deferred",
                    track_id, frame.frame_id
                ),
            }
        }

        self.prune_if_due(frame.frame_id);
        events
    }

    fn prune_if_due(&mut self, frame_id: u64) {
        if self.idle_prune_frames == 0
            || frame_id % self.prune_interval_frames != 0
            || frame_id <= self.idle_prune_frames
        {
            return;
        }
        let removed = self.store.prune(frame_id - self.idle_prune_frames);
        if removed > 0 {
            info!(
                "🗑️  Pruned {} idle track(s), {} still active",
                removed,
                self.store.len()
            );
        }
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn region(&self) -> &Region {
        &self.region
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassNames;

    const TRAIN: usize = 6;

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn extractor(tracking: TrackingConfig) -> FrameEventExtractor {
        let region = Region::from_pairs(&[[0, 200], [640, 200]]).unwrap();
        FrameEventExtractor::new(region, ClassNames::coco(), &tracking)
    }

    fn no_pruning() -> TrackingConfig {
        TrackingConfig {
            idle_prune_frames: 0,
            prune_interval_frames: 30,
        }
    }

    fn frame(id: u64) -> Frame {
        Frame::filled(640, 360, [90, 90, 90], id)
    }

    fn above() -> BoundingBox {
        BoundingBox::new(100.0, 40.0, 180.0, 140.0)
    }

    fn straddling() -> BoundingBox {
        BoundingBox::new(100.0, 150.0, 180.0, 250.0)
    }

    fn below() -> BoundingBox {
        BoundingBox::new(100.0, 240.0, 180.0, 340.0)
    }

    #[test]
    fn test_crossing_and_enrichment_fire_once_independently() {
        let mut ex = extractor(no_pruning());
        let boxes = [above(), above(), straddling(), below(), below()];

        let mut crossing_frames = Vec::new();
        let mut job_frames = Vec::new();
        for (i, bbox) in boxes.iter().enumerate() {
            let id = i as u64 + 1;
            let events = ex.process(&frame(id), &[Detection::new(*bbox, 7, TRAIN)], now());
            crossing_frames.extend(events.crossings.iter().map(|c| c.frame_id));
            job_frames.extend(events.jobs.iter().map(|j| j.frame_id));
        }

        assert_eq!(crossing_frames, vec![3]);
        assert_eq!(job_frames, vec![1]);

        let track = ex.store().get(7).unwrap();
        assert!(track.has_crossed());
        assert!(track.enrichment_dispatched());
        assert_eq!(track.last_position(), below().center());
    }

    #[test]
    fn test_job_carries_first_sighting_data() {
        let mut ex = extractor(no_pruning());
        let events = ex.process(&frame(1), &[Detection::new(above(), 7, TRAIN)], now());

        assert_eq!(events.jobs.len(), 1);
        let job = &events.jobs[0];
        assert_eq!(job.track_id, 7);
        assert_eq!(job.object_type, "train");
        assert_eq!(job.timestamp, now());
        assert_eq!((job.center_x, job.center_y), (140, 90));
        assert_eq!((job.crop.width, job.crop.height), (80, 100));
    }

    #[test]
    fn test_degenerate_crop_never_produces_a_job() {
        let mut ex = extractor(no_pruning());
        let flat = BoundingBox::new(100.0, 200.0, 180.0, 200.0);
        let thin = BoundingBox::new(100.0, 150.0, 100.0, 250.0);

        let events = ex.process(
            &frame(1),
            &[Detection::new(flat, 1, TRAIN), Detection::new(thin, 2, TRAIN)],
            now(),
        );
        assert!(events.jobs.is_empty());
        // Position and crossing still update.
        assert_eq!(events.crossings.len(), 2);
        assert!(!ex.store().get(1).unwrap().enrichment_dispatched());
        assert!(!ex.store().get(2).unwrap().enrichment_dispatched());

        // First usable box later on is the enrichment trigger.
        let events = ex.process(&frame(2), &[Detection::new(above(), 1, TRAIN)], now());
        assert_eq!(events.jobs.len(), 1);
        assert_eq!(events.jobs[0].frame_id, 2);
        assert!(events.crossings.is_empty());
    }

    #[test]
    fn test_malformed_detection_is_skipped_not_fatal() {
        let mut ex = extractor(no_pruning());
        let untracked = Detection {
            bbox: above(),
            track_id: None,
            class_id: TRAIN,
        };
        let nan = Detection::new(BoundingBox::new(f32::NAN, 0.0, 10.0, 10.0), 4, TRAIN);
        let good = Detection::new(above(), 5, TRAIN);

        let events = ex.process(&frame(1), &[untracked, nan, good], now());
        assert_eq!(events.skipped, 2);
        assert_eq!(events.jobs.len(), 1);
        assert_eq!(ex.store().len(), 1);
    }

    #[test]
    fn test_huge_finite_box_is_skipped() {
        let mut ex = extractor(no_pruning());
        let huge = Detection::new(BoundingBox::new(2.0e9, 10.0, 2.1e9, 20.0), 1, TRAIN);

        let events = ex.process(&frame(1), &[huge], now());
        assert_eq!(events.skipped, 1);
        assert!(events.jobs.is_empty());
        assert!(ex.store().is_empty());

        // The stream carries on with the next detection.
        let events = ex.process(&frame(2), &[Detection::new(above(), 1, TRAIN)], now());
        assert_eq!(events.jobs.len(), 1);
    }

    #[test]
    fn test_annotations_use_current_label() {
        let mut ex = extractor(no_pruning());
        ex.process(&frame(1), &[Detection::new(above(), 9, TRAIN)], now());
        let events = ex.process(&frame(2), &[Detection::new(above(), 9, 2)], now());

        assert_eq!(events.annotations.len(), 1);
        assert_eq!(events.annotations[0].label, "ID: 9 | car");
        assert_eq!(ex.store().get(9).unwrap().object_type(), "train");
    }

    #[test]
    fn test_several_tracks_in_one_frame() {
        let mut ex = extractor(no_pruning());
        let dets: Vec<Detection> = (1..=3)
            .map(|id| Detection::new(above(), id, TRAIN))
            .collect();
        let events = ex.process(&frame(1), &dets, now());
        let mut ids: Vec<u32> = events.jobs.iter().map(|j| j.track_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);

        let events = ex.process(&frame(2), &dets, now());
        assert!(events.jobs.is_empty());
    }

    #[test]
    fn test_pruned_track_is_enriched_again() {
        let mut ex = extractor(TrackingConfig {
            idle_prune_frames: 10,
            prune_interval_frames: 1,
        });
        let events = ex.process(&frame(1), &[Detection::new(above(), 4, TRAIN)], now());
        assert_eq!(events.jobs.len(), 1);

        for id in 2..=20 {
            ex.process(&frame(id), &[], now());
        }
        assert!(ex.store().get(4).is_none());

        let events = ex.process(&frame(21), &[Detection::new(above(), 4, TRAIN)], now());
        assert_eq!(events.jobs.len(), 1);
    }
}
