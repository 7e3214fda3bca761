// src/pipeline/runner.rs
//
// The synchronous frame loop. Runs on a blocking thread; everything slow is
// handed to the enrichment dispatcher.
//
//   source → tracker → extractor → (crossings logged, jobs submitted) → display

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::extractor::FrameEventExtractor;
use super::metrics::PipelineMetrics;
use crate::enrichment::{DispatchHandle, DispatchSummary, EnrichmentDispatcher};
use crate::render::{DisplayControl, FrameDisplay};
use crate::source::FrameSource;
use crate::tracker_feed::ObjectTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StopReason {
    EndOfStream,
    UserQuit,
    Interrupted,
    SourceFailed,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProcessingStats {
    pub frames: u64,
    pub detections: u64,
    pub skipped_detections: u64,
    pub crossings: u64,
    pub jobs_submitted: u64,
    pub jobs_dropped: u64,
    pub stop_reason: StopReason,
}

pub struct StreamRunner {
    source: Box<dyn FrameSource>,
    tracker: Box<dyn ObjectTracker>,
    extractor: FrameEventExtractor,
    display: Box<dyn FrameDisplay>,
    dispatch: DispatchHandle,
    metrics: PipelineMetrics,
}

impl StreamRunner {
    pub fn new(
        source: Box<dyn FrameSource>,
        tracker: Box<dyn ObjectTracker>,
        extractor: FrameEventExtractor,
        display: Box<dyn FrameDisplay>,
        dispatch: DispatchHandle,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            source,
            tracker,
            extractor,
            display,
            dispatch,
            metrics,
        }
    }

    /// Process frames until end of stream, a quit from the display, or `stop`.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<ProcessingStats> {
        let mut stats = ProcessingStats {
            frames: 0,
            detections: 0,
            skipped_detections: 0,
            crossings: 0,
            jobs_submitted: 0,
            jobs_dropped: 0,
            stop_reason: StopReason::EndOfStream,
        };

        info!("▶️  Starting railway object detection...");

        loop {
            if stop.load(Ordering::Relaxed) {
                stats.stop_reason = StopReason::Interrupted;
                break;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    error!("❌ Frame source failed: {:#}", e);
                    stats.stop_reason = StopReason::SourceFailed;
                    break;
                }
            };
            stats.frames += 1;
            self.metrics.inc(&self.metrics.total_frames);

            let detections = match self.tracker.track(&frame) {
                Ok(dets) => dets,
                Err(e) => {
                    warn!("⚠️  Tracker failed on frame {}: {:#}", frame.frame_id, e);
                    Vec::new()
                }
            };
            stats.detections += detections.len() as u64;
            self.metrics
                .add(&self.metrics.detections, detections.len() as u64);

            let now = chrono::Local::now().naive_local();
            let events = self.extractor.process(&frame, &detections, now);

            stats.skipped_detections += events.skipped as u64;
            self.metrics
                .add(&self.metrics.skipped_detections, events.skipped as u64);

            for crossing in &events.crossings {
                info!(
                    "🚦 Track #{} ({}) crossed the region at frame {}",
                    crossing.track_id, crossing.object_type, crossing.frame_id
                );
                stats.crossings += 1;
                self.metrics.inc(&self.metrics.crossings);
            }

            for job in events.jobs {
                debug!("🆕 Enrichment job for track #{}", job.track_id);
                if self.dispatch.submit(job) {
                    stats.jobs_submitted += 1;
                } else {
                    stats.jobs_dropped += 1;
                }
            }

            match self
                .display
                .show(&frame, self.extractor.region(), &events.annotations)
            {
                Ok(DisplayControl::Continue) => {}
                Ok(DisplayControl::Quit) => {
                    info!("⏹️  Quit requested");
                    stats.stop_reason = StopReason::UserQuit;
                    break;
                }
                Err(e) => warn!("⚠️  Display failed on frame {}: {:#}", frame.frame_id, e),
            }
        }

        match stats.stop_reason {
            StopReason::EndOfStream => info!("🏁 End of stream after {} frame(s)", stats.frames),
            StopReason::UserQuit => info!("🏁 Stopped by user after {} frame(s)", stats.frames),
            StopReason::Interrupted => info!("🏁 Interrupted after {} frame(s)", stats.frames),
            StopReason::SourceFailed => warn!("🏁 Source failed after {} frame(s)", stats.frames),
        }

        Ok(stats)
    }
}

/// Run the loop on a blocking thread, then shut the dispatcher down. The
/// dispatcher gets its grace period even when the loop fails or panics.
pub async fn run_and_drain(
    mut runner: StreamRunner,
    stop: Arc<AtomicBool>,
    dispatcher: EnrichmentDispatcher,
    grace: Duration,
) -> Result<(ProcessingStats, DispatchSummary)> {
    let outcome = tokio::task::spawn_blocking(move || runner.run(&stop))
        .await
        .context("frame loop panicked")
        .and_then(|res| res);

    if let Err(e) = &outcome {
        error!("❌ Frame loop failed: {:#}", e);
    }

    let summary = dispatcher.shutdown(grace).await;
    outcome.map(|stats| (stats, summary))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{EnrichmentDispatcher, EnrichmentResult, FallbackDescriber};
    use crate::geometry::{BoundingBox, Region};
    use crate::persistence::PersistenceGateway;
    use crate::render::HeadlessDisplay;
    use crate::tracker_feed::ReplayTracker;
    use crate::types::{ClassNames, Detection, EnrichmentConfig, Frame, TrackingConfig};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct SyntheticSource {
        remaining: u64,
        next_id: u64,
    }

    impl FrameSource for SyntheticSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let id = self.next_id;
            self.next_id += 1;
            Ok(Some(Frame::filled(640, 360, [80, 80, 80], id)))
        }
    }

    struct QuitAfter(u64);

    impl FrameDisplay for QuitAfter {
        fn show(
            &mut self,
            frame: &Frame,
            _region: &crate::geometry::Region,
            _annotations: &[crate::pipeline::extractor::Annotation],
        ) -> Result<DisplayControl> {
            if frame.frame_id >= self.0 {
                Ok(DisplayControl::Quit)
            } else {
                Ok(DisplayControl::Continue)
            }
        }
    }

    struct PanicAt(u64);

    impl FrameDisplay for PanicAt {
        fn show(
            &mut self,
            frame: &Frame,
            _region: &crate::geometry::Region,
            _annotations: &[crate::pipeline::extractor::Annotation],
        ) -> Result<DisplayControl> {
            if frame.frame_id >= self.0 {
                panic!("display blew up on frame {}", frame.frame_id);
            }
            Ok(DisplayControl::Continue)
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        rows: Mutex<Vec<EnrichmentResult>>,
    }

    #[async_trait]
    impl PersistenceGateway for RecordingGateway {
        async fn record(&self, result: &EnrichmentResult) -> anyhow::Result<()> {
            self.rows.lock().await.push(result.clone());
            Ok(())
        }
    }

    /// Track 1 moves down 30px per frame; its diagonal first reaches the
    /// line (y=200) on frame 4.
    fn descending_track(frames: u64) -> ReplayTracker {
        ReplayTracker::from_frames(
            (1..=frames)
                .map(|id| {
                    let top = 20.0 + (id - 1) as f32 * 30.0;
                    let bbox = BoundingBox::new(300.0, top, 360.0, top + 90.0);
                    (id, vec![Detection::new(bbox, 1, 6)])
                })
                .collect(),
        )
    }

    fn extractor() -> FrameEventExtractor {
        FrameEventExtractor::new(
            Region::from_pairs(&[[0, 200], [640, 200]]).unwrap(),
            ClassNames::coco(),
            &TrackingConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ten_frames_one_crossing_one_persisted_result() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        let metrics = PipelineMetrics::new();
        let config = EnrichmentConfig {
            crops_dir: dir.path().to_str().unwrap().to_string(),
            ..EnrichmentConfig::default()
        };
        let dispatcher = EnrichmentDispatcher::start(
            &config,
            Arc::new(FallbackDescriber),
            gateway.clone(),
            metrics.clone(),
        );

        let mut runner = StreamRunner::new(
            Box::new(SyntheticSource {
                remaining: 10,
                next_id: 1,
            }),
            Box::new(descending_track(10)),
            extractor(),
            Box::new(HeadlessDisplay::new(None, 2).unwrap()),
            dispatcher.handle(),
            metrics.clone(),
        );

        let stats = tokio::task::spawn_blocking(move || {
            let stop = AtomicBool::new(false);
            runner.run(&stop)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(stats.frames, 10);
        assert_eq!(stats.crossings, 1);
        assert_eq!(stats.jobs_submitted, 1);
        assert_eq!(stats.stop_reason, StopReason::EndOfStream);

        let summary = dispatcher.shutdown(Duration::from_secs(5)).await;
        assert!(summary.drained);
        assert_eq!(summary.results_persisted, 1);

        let rows = gateway.rows.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].track_id, 1);
        assert_eq!(rows[0].object_type, "train");
        // Position at first sighting: box (300,20)-(360,110).
        assert_eq!((rows[0].x, rows[0].y), (330, 65));
        assert!(dir.path().join("1_train.jpg").exists());
    }

    #[tokio::test]
    async fn test_quit_and_stop_flag_end_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = PipelineMetrics::new();
        let config = EnrichmentConfig {
            crops_dir: dir.path().to_str().unwrap().to_string(),
            ..EnrichmentConfig::default()
        };
        let dispatcher = EnrichmentDispatcher::start(
            &config,
            Arc::new(FallbackDescriber),
            Arc::new(RecordingGateway::default()),
            metrics.clone(),
        );

        let mut quitting = StreamRunner::new(
            Box::new(SyntheticSource {
                remaining: 100,
                next_id: 1,
            }),
            Box::new(ReplayTracker::from_frames(Vec::new())),
            extractor(),
            Box::new(QuitAfter(3)),
            dispatcher.handle(),
            metrics.clone(),
        );
        let mut interrupted = StreamRunner::new(
            Box::new(SyntheticSource {
                remaining: 100,
                next_id: 1,
            }),
            Box::new(ReplayTracker::from_frames(Vec::new())),
            extractor(),
            Box::new(QuitAfter(u64::MAX)),
            dispatcher.handle(),
            metrics.clone(),
        );

        let (quit_stats, stop_stats) = tokio::task::spawn_blocking(move || {
            let running = AtomicBool::new(false);
            let quit = quitting.run(&running).unwrap();
            let stopped = AtomicBool::new(true);
            let stop = interrupted.run(&stopped).unwrap();
            (quit, stop)
        })
        .await
        .unwrap();

        assert_eq!(quit_stats.frames, 3);
        assert_eq!(quit_stats.stop_reason, StopReason::UserQuit);
        assert_eq!(stop_stats.frames, 0);
        assert_eq!(stop_stats.stop_reason, StopReason::Interrupted);

        dispatcher.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_panicking_loop_still_drains_dispatcher() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        let metrics = PipelineMetrics::new();
        let config = EnrichmentConfig {
            crops_dir: dir.path().to_str().unwrap().to_string(),
            ..EnrichmentConfig::default()
        };
        let dispatcher = EnrichmentDispatcher::start(
            &config,
            Arc::new(FallbackDescriber),
            gateway.clone(),
            metrics.clone(),
        );

        let runner = StreamRunner::new(
            Box::new(SyntheticSource {
                remaining: 10,
                next_id: 1,
            }),
            Box::new(descending_track(10)),
            extractor(),
            Box::new(PanicAt(5)),
            dispatcher.handle(),
            metrics.clone(),
        );

        let err = run_and_drain(
            runner,
            Arc::new(AtomicBool::new(false)),
            dispatcher,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("frame loop panicked"));

        // The job submitted on frame 1 was persisted before returning.
        let rows = gateway.rows.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].track_id, 1);
    }
}
