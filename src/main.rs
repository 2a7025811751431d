//! Scenecast: live VLM scene description from a frame source

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scenecast::capture::PatternCapture;
use scenecast::{
    BroadcastHub, Config, Controller, FrameSampler, InferenceScheduler, OpenAiClient, PromptStore,
};

#[derive(Debug, Parser)]
#[command(
    version,
    about = "Stream frames to a vision-language model and broadcast the descriptions"
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SCENECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many captured frames
    #[arg(long)]
    frames: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scenecast=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args = Args::parse();
    info!("Scenecast launching...");

    // Load configuration
    let config = Config::load(args.config.as_deref())?;
    info!(
        "Model {} at {}, processing every {} frames",
        config.backend.model, config.backend.base_url, config.pipeline.process_every
    );

    // Wire the pipeline: sampler -> scheduler -> hub
    let prompts = Arc::new(PromptStore::new(config.prompt_config())?);
    let hub = Arc::new(BroadcastHub::new(config.broadcast.subscriber_buffer));
    let client = Arc::new(OpenAiClient::new(&config.backend)?);
    let scheduler = InferenceScheduler::new(
        client,
        prompts.clone(),
        hub.clone(),
        config.scheduler_options(),
    );
    let sampler = Arc::new(FrameSampler::new(
        i64::from(config.pipeline.process_every),
        Arc::new(scheduler.clone()),
    ));
    let controller = Controller::new(prompts, sampler.clone(), scheduler.clone());

    // Console listener
    let subscription = hub.subscribe();
    let _listener_handle = tokio::spawn(async move {
        while let Some(event) = subscription.recv_event().await {
            if event.success {
                info!(
                    "[frame {}] {} ({:.0} ms, avg {:.0} ms)",
                    event.frame_sequence, event.text, event.latency_ms, event.avg_latency_ms
                );
            } else {
                warn!(
                    "[frame {}] inference failed: {}",
                    event.frame_sequence,
                    event.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    });

    // Control commands, one JSON object per line on stdin
    let _control_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match controller.apply_json(&line) {
                    Ok(command) => info!("Applied {:?}", command),
                    Err(e) => error!("Control error: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read control input: {}", e);
                    break;
                }
            }
        }
    });

    // Spawn capture task
    let mut capture = PatternCapture::new(config.capture.clone());
    let limit = args.frames;
    let capture_sampler = sampler.clone();
    let mut capture_handle = tokio::spawn(async move {
        loop {
            let frame = capture.capture_frame().await;
            let seq = frame.sequence();
            capture_sampler.offer(frame);
            if limit.is_some_and(|n| seq >= n) {
                break;
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupt received"),
        res = &mut capture_handle => {
            if let Err(e) = res {
                error!("Capture task failed: {}", e);
            }
        }
    }
    capture_handle.abort();

    // Let the call in flight finish so its result is published
    scheduler.wait_idle().await;

    let stats = scheduler.stats();
    let summary = scheduler.metrics_summary();
    let sampled = sampler.stats();
    info!(
        "Frames offered {}, candidates {}, processed {}, dropped while busy {}",
        sampled.offered, sampled.forwarded, stats.processed, stats.dropped
    );
    info!(
        "Latency avg {:.1} ms (min {:.1}, max {:.1}), {} failures in window",
        summary.avg_latency_ms,
        summary.min_latency_ms,
        summary.max_latency_ms,
        summary.failure_count
    );

    info!("Scenecast shutting down");
    Ok(())
}
