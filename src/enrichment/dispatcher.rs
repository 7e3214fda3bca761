// src/enrichment/dispatcher.rs
//
// Bounded hand-off from the frame loop to the enrichment workers.
//
//   frame loop ──submit──▶ [mpsc, queue_capacity] ──▶ dispatch task
//                                                        │ Semaphore(max_concurrent_jobs)
//                                                        ▼
//                                                  JoinSet of workers
//
// A worker runs one job to completion: save crop, describe, record. Nothing
// it does can fail the frame loop. Shutdown closes the queue and gives queued
// plus in-flight jobs a grace period before the rest is abandoned.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::description::{DescriptionOutcome, DescriptionService};
use super::{EnrichmentJob, EnrichmentResult};
use crate::crop::encode_jpeg;
use crate::persistence::PersistenceGateway;
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{Backpressure, EnrichmentConfig};

/// Frame-loop side of the queue. Cheap to clone.
#[derive(Clone)]
pub struct DispatchHandle {
    sender: mpsc::Sender<EnrichmentJob>,
    backpressure: Backpressure,
    metrics: PipelineMetrics,
}

impl DispatchHandle {
    /// Queue a job. Returns false when it was dropped.
    ///
    /// With `Backpressure::Block` a full queue blocks the calling thread, so
    /// call this from a blocking context (the frame loop runs on one).
    pub fn submit(&self, job: EnrichmentJob) -> bool {
        let track_id = job.track_id;
        let result = match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => match self.backpressure {
                Backpressure::Block => {
                    debug!("Enrichment queue full, waiting (track #{})", track_id);
                    self.sender.blocking_send(job).map_err(|_| "queue closed")
                }
                Backpressure::Drop => Err("queue full"),
            },
            Err(TrySendError::Closed(_)) => Err("queue closed"),
        };

        match result {
            Ok(()) => {
                self.metrics.inc(&self.metrics.jobs_dispatched);
                true
            }
            Err(reason) => {
                warn!("⚠️  Enrichment job for track #{} dropped: {}", track_id, reason);
                self.metrics.inc(&self.metrics.jobs_dropped);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct DispatchSummary {
    /// Every queued job finished within the grace period.
    pub drained: bool,
    pub jobs_completed: u64,
    pub results_persisted: u64,
    pub worker_panics: u64,
}

pub struct EnrichmentDispatcher {
    sender: mpsc::Sender<EnrichmentJob>,
    backpressure: Backpressure,
    metrics: PipelineMetrics,
    run_task: JoinHandle<()>,
    completed: Arc<AtomicU64>,
    panics: Arc<AtomicU64>,
}

impl EnrichmentDispatcher {
    /// Spawn the dispatch task. Must be called inside a tokio runtime.
    pub fn start(
        config: &EnrichmentConfig,
        describer: Arc<dyn DescriptionService>,
        gateway: Arc<dyn PersistenceGateway>,
        metrics: PipelineMetrics,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let worker = Arc::new(Worker {
            describer,
            gateway,
            metrics: metrics.clone(),
            crops_dir: PathBuf::from(&config.crops_dir),
            jpeg_quality: config.jpeg_quality,
            job_timeout: config.job_timeout(),
        });
        let limit = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let completed = Arc::new(AtomicU64::new(0));
        let panics = Arc::new(AtomicU64::new(0));

        let run_task = tokio::spawn(dispatch_loop(
            receiver,
            worker,
            limit,
            completed.clone(),
            panics.clone(),
        ));

        info!(
            "🧵 Enrichment dispatcher started (queue {}, {} concurrent, {:?} on full)",
            config.queue_capacity, config.max_concurrent_jobs, config.backpressure
        );

        Self {
            sender,
            backpressure: config.backpressure,
            metrics,
            run_task,
            completed,
            panics,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            sender: self.sender.clone(),
            backpressure: self.backpressure,
            metrics: self.metrics.clone(),
        }
    }

    /// Close the queue and wait up to `grace` for the backlog.
    ///
    /// The queue only closes once every `DispatchHandle` is dropped as well;
    /// a handle still alive simply runs the grace period out.
    pub async fn shutdown(self, grace: Duration) -> DispatchSummary {
        let Self {
            sender,
            metrics,
            mut run_task,
            completed,
            panics,
            ..
        } = self;
        drop(sender);

        let drained = match tokio::time::timeout(grace, &mut run_task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("❌ Enrichment dispatcher failed: {}", e);
                false
            }
            Err(_) => {
                warn!(
                    "⏱️  Enrichment backlog not drained after {:?}, abandoning remaining jobs",
                    grace
                );
                run_task.abort();
                false
            }
        };

        let summary = DispatchSummary {
            drained,
            jobs_completed: completed.load(Ordering::Relaxed),
            results_persisted: metrics.results_persisted.load(Ordering::Relaxed),
            worker_panics: panics.load(Ordering::Relaxed),
        };
        info!(
            "🏁 Enrichment stopped: {} job(s) completed, {} persisted",
            summary.jobs_completed, summary.results_persisted
        );
        summary
    }
}

async fn dispatch_loop(
    mut receiver: mpsc::Receiver<EnrichmentJob>,
    worker: Arc<Worker>,
    limit: Arc<Semaphore>,
    completed: Arc<AtomicU64>,
    panics: Arc<AtomicU64>,
) {
    let mut tasks = JoinSet::new();
    let reap = |res: Result<(), JoinError>| match res {
        Ok(()) => {
            completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!("❌ Enrichment worker crashed: {}", e);
            panics.fetch_add(1, Ordering::Relaxed);
        }
    };

    while let Some(job) = receiver.recv().await {
        while let Some(res) = tasks.try_join_next() {
            reap(res);
        }

        let permit = match limit.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let worker = worker.clone();
        tasks.spawn(async move {
            let _permit = permit;
            worker.process(job).await;
        });
    }

    while let Some(res) = tasks.join_next().await {
        reap(res);
    }
}

// ============================================================================
// WORKER
// ============================================================================

struct Worker {
    describer: Arc<dyn DescriptionService>,
    gateway: Arc<dyn PersistenceGateway>,
    metrics: PipelineMetrics,
    crops_dir: PathBuf,
    jpeg_quality: u8,
    job_timeout: Duration,
}

impl Worker {
    async fn process(&self, job: EnrichmentJob) {
        let mut result = EnrichmentResult::from_job(&job, String::new());
        let EnrichmentJob {
            track_id,
            object_type,
            crop,
            ..
        } = job;

        let quality = self.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || encode_jpeg(&crop, quality)).await;

        let outcome = match encoded {
            Ok(Ok(jpeg)) => {
                self.save_crop(track_id, &object_type, &jpeg).await;
                self.describe(track_id, &jpeg).await
            }
            Ok(Err(e)) => {
                self.metrics.inc(&self.metrics.crop_failures);
                DescriptionOutcome::Failed(format!("crop encoding: {:#}", e))
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.crop_failures);
                DescriptionOutcome::Failed(format!("crop encoding task: {}", e))
            }
        };

        match &outcome {
            DescriptionOutcome::Described(_) => self.metrics.inc(&self.metrics.descriptions_ok),
            DescriptionOutcome::Unavailable => {
                self.metrics.inc(&self.metrics.descriptions_unavailable)
            }
            DescriptionOutcome::NoDescription => {
                debug!("Empty description for track #{}", track_id);
                self.metrics.inc(&self.metrics.descriptions_failed)
            }
            DescriptionOutcome::Failed(reason) => {
                warn!("❌ Description lookup failed for track #{}: {}", track_id, reason);
                self.metrics.inc(&self.metrics.descriptions_failed)
            }
        }
        result.description = outcome.into_text();

        match self.gateway.record(&result).await {
            Ok(()) => {
                self.metrics.inc(&self.metrics.results_persisted);
                info!("✅ Data inserted for Track ID: {} - {}", track_id, object_type);
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.persist_failures);
                error!("❌ Database Insert Error for track #{}: {:#}", track_id, e);
            }
        }
    }

    async fn describe(&self, track_id: u32, jpeg: &[u8]) -> DescriptionOutcome {
        match tokio::time::timeout(self.job_timeout, self.describer.describe(jpeg)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "⏱️  Description for track #{} timed out after {:?}",
                    track_id, self.job_timeout
                );
                DescriptionOutcome::Failed("timed out".to_string())
            }
        }
    }

    /// Best effort: a failed write is logged and the job goes on.
    async fn save_crop(&self, track_id: u32, object_type: &str, jpeg: &[u8]) {
        let path = self.crops_dir.join(crop_file_name(track_id, object_type));
        let written = async {
            tokio::fs::create_dir_all(&self.crops_dir).await?;
            tokio::fs::write(&path, jpeg).await
        }
        .await;

        match written {
            Ok(()) => {
                self.metrics.inc(&self.metrics.crops_saved);
                info!("📷 Saved image: {}", path.display());
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.crop_failures);
                warn!("❌ Could not save crop {}: {}", path.display(), e);
            }
        }
    }
}

/// `{track_id}_{object_type}.jpg`, with anything that is not a safe file-name
/// character replaced by `_`.
pub fn crop_file_name(track_id: u32, object_type: &str) -> String {
    let label: String = object_type
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}.jpg", track_id, label)
}

// ============================================================================
// TESTS
// ============================================================================
