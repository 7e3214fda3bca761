// src/main.rs

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use railway_watch::enrichment::{build_description_service, EnrichmentDispatcher};
use railway_watch::persistence::open_gateway;
use railway_watch::pipeline::{run_and_drain, FrameEventExtractor, PipelineMetrics, StreamRunner};
use railway_watch::render::{FrameDisplay, HeadlessDisplay};
use railway_watch::source::open_source;
use railway_watch::tracker_feed::ReplayTracker;
use railway_watch::types::{ClassNames, Config};

const WINDOW_TITLE: &str = "Railway Object Detection";

#[derive(Debug, Parser)]
#[command(name = "railway-watch", about = "Railway object detection and enrichment")]
struct Cli {
    /// YAML config file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Frame directory or video file (overrides video.source)
    #[arg(long)]
    source: Option<PathBuf>,

    /// Tracker feed JSONL (overrides detections.path)
    #[arg(long)]
    detections: Option<PathBuf>,

    /// Never open a window, even if video.display is set
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config.to_string_lossy())?
    } else {
        Config::default()
    };
    if let Some(source) = &cli.source {
        config.video.source = source.to_string_lossy().into_owned();
    }
    if let Some(detections) = &cli.detections {
        config.detections.path = detections.to_string_lossy().into_owned();
    }
    if cli.headless {
        config.video.display = false;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("railway_watch={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚆 Railway Object Detection Starting");
    if !cli.config.exists() {
        warn!("⚠️  {} not found, using defaults", cli.config.display());
    } else {
        info!("✓ Configuration loaded from {}", cli.config.display());
    }

    config.validate()?;
    let region = config.region()?;

    let gateway = open_gateway(&config.persistence).await?;
    let describer = build_description_service(&config.description);
    let metrics = PipelineMetrics::new();
    let dispatcher =
        EnrichmentDispatcher::start(&config.enrichment, describer, gateway, metrics.clone());

    let source = open_source(PathBuf::from(&config.video.source).as_path(), &config.video)?;
    let tracker = ReplayTracker::open(PathBuf::from(&config.detections.path).as_path())?;
    let display = build_display(&config)?;

    let extractor = FrameEventExtractor::new(
        region,
        ClassNames::from_config(&config.detections.class_names),
        &config.tracking,
    );

    let runner = StreamRunner::new(
        source,
        Box::new(tracker),
        extractor,
        display,
        dispatcher.handle(),
        metrics.clone(),
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("🛑 Ctrl-C received, stopping");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let (stats, dispatch) =
        run_and_drain(runner, stop, dispatcher, config.enrichment.shutdown_grace()).await?;

    info!("{}", "=".repeat(60));
    info!("📊 RUN SUMMARY");
    info!("{}", "=".repeat(60));
    info!("  Frames:        {}", stats.frames);
    info!("  Crossings:     {}", stats.crossings);
    info!("  Jobs queued:   {}", stats.jobs_submitted);
    info!("  Jobs dropped:  {}", stats.jobs_dropped);
    info!("  Persisted:     {}", dispatch.results_persisted);
    if !dispatch.drained {
        warn!("  Enrichment backlog abandoned at shutdown");
    }
    info!(
        "  Metrics: {}",
        serde_json::to_string(&metrics.summary()).unwrap_or_default()
    );

    Ok(())
}

fn build_display(config: &Config) -> Result<Box<dyn FrameDisplay>> {
    if config.video.display {
        #[cfg(feature = "opencv")]
        {
            let window =
                railway_watch::render::WindowDisplay::new(WINDOW_TITLE, config.video.line_width)?;
            return Ok(Box::new(window));
        }
        #[cfg(not(feature = "opencv"))]
        warn!("⚠️  video.display needs the `opencv` feature, running headless");
    }

    let output_dir = config
        .video
        .save_annotated
        .then(|| PathBuf::from(&config.video.output_dir).join("annotated"));
    Ok(Box::new(HeadlessDisplay::new(
        output_dir,
        config.video.line_width,
    )?))
}
