// src/pipeline/metrics.rs
//
// Counters shared by the frame loop and the enrichment workers.
// Cloning shares the same counters. Logged once at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub detections: Arc<AtomicU64>,
    pub skipped_detections: Arc<AtomicU64>,
    pub crossings: Arc<AtomicU64>,
    pub jobs_dispatched: Arc<AtomicU64>,
    pub jobs_dropped: Arc<AtomicU64>,
    pub crops_saved: Arc<AtomicU64>,
    pub crop_failures: Arc<AtomicU64>,
    pub descriptions_ok: Arc<AtomicU64>,
    pub descriptions_failed: Arc<AtomicU64>,
    pub descriptions_unavailable: Arc<AtomicU64>,
    pub results_persisted: Arc<AtomicU64>,
    pub persist_failures: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            detections: Arc::new(AtomicU64::new(0)),
            skipped_detections: Arc::new(AtomicU64::new(0)),
            crossings: Arc::new(AtomicU64::new(0)),
            jobs_dispatched: Arc::new(AtomicU64::new(0)),
            jobs_dropped: Arc::new(AtomicU64::new(0)),
            crops_saved: Arc::new(AtomicU64::new(0)),
            crop_failures: Arc::new(AtomicU64::new(0)),
            descriptions_ok: Arc::new(AtomicU64::new(0)),
            descriptions_failed: Arc::new(AtomicU64::new(0)),
            descriptions_unavailable: Arc::new(AtomicU64::new(0)),
            results_persisted: Arc::new(AtomicU64::new(0)),
            persist_failures: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            detections: self.detections.load(Ordering::Relaxed),
            skipped_detections: self.skipped_detections.load(Ordering::Relaxed),
            crossings: self.crossings.load(Ordering::Relaxed),
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            crops_saved: self.crops_saved.load(Ordering::Relaxed),
            crop_failures: self.crop_failures.load(Ordering::Relaxed),
            descriptions_ok: self.descriptions_ok.load(Ordering::Relaxed),
            descriptions_failed: self.descriptions_failed.load(Ordering::Relaxed),
            descriptions_unavailable: self.descriptions_unavailable.load(Ordering::Relaxed),
            results_persisted: self.results_persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub detections: u64,
    pub skipped_detections: u64,
    pub crossings: u64,
    pub jobs_dispatched: u64,
    pub jobs_dropped: u64,
    pub crops_saved: u64,
    pub crop_failures: u64,
    pub descriptions_ok: u64,
    pub descriptions_failed: u64,
    pub descriptions_unavailable: u64,
    pub results_persisted: u64,
    pub persist_failures: u64,
    pub elapsed_secs: f64,
}
