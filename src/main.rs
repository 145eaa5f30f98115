mod cli;

use segmux::config::{self, Config};
use segmux::media::{Segmenter, SegmenterConfig};
use segmux::store::{PartStore, SegmentSummary, StoreEvent};
use segmux::synthetic::{SyntheticSample, SyntheticSource};
use segmux_common::SequentialIds;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Serialize)]
struct SynthReport {
    init_bytes: usize,
    parts: usize,
    segments: Vec<SegmentSummary>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "segmux=trace,segmux_media=trace".to_string()
        } else {
            "segmux=debug,segmux_media=debug".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckConfig => check_config(cli.config.as_deref()),
        Commands::Synth {
            duration,
            no_audio,
            no_video,
            json,
            output,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(secs) = duration {
                config.synthetic.duration_secs = secs;
            }
            if no_audio {
                config.synthetic.audio = false;
            }
            if no_video {
                config.synthetic.video = false;
            }
            config::validate_config(&config)?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(synth(config, json, output.as_deref()))
        }
    }
}

fn check_config(path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(path)?;
    match path {
        Some(p) => println!("Validating config: {:?}", p),
        None => println!("No config file specified, using ./segmux.toml or defaults"),
    }

    let warnings = config.validate();
    for warning in &warnings {
        tracing::warn!("{}", warning);
        println!("  warning: {}", warning);
    }

    println!("✓ Configuration is valid");
    println!("  Low latency: {}", config.muxer.low_latency);
    println!("  Segment duration: {} ms", config.muxer.segment_duration_ms);
    println!("  Part duration: {} ms", config.muxer.part_duration_ms);
    println!("  Segment max size: {} bytes", config.muxer.segment_max_size);
    println!("  Warnings: {}", warnings.len());
    Ok(())
}

async fn synth(config: Config, json: bool, output: Option<&Path>) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let source = SyntheticSource::new(config.synthetic.clone());
    let segmenter_config = config.muxer.segmenter_config();
    let store = Arc::new(PartStore::new());

    let watcher = tokio::spawn(watch_events(store.subscribe()));

    let ingest_store = Arc::clone(&store);
    let init = tokio::task::spawn_blocking(move || ingest(source, segmenter_config, ingest_store))
        .await
        .context("ingestion task panicked")??;

    let report = SynthReport {
        init_bytes: init.len(),
        parts: store.part_count(),
        segments: store.summaries(),
    };

    if let Some(path) = output {
        write_output(path, &init, &store)?;
    }

    // finished segments hold no sink, so this drops the last sender
    drop(store);
    let announced = watcher.await.context("event watcher panicked")?;
    tracing::debug!(events = announced, "event watcher finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Init segment: {} bytes", report.init_bytes);
        for s in &report.segments {
            println!(
                "{:<8} parts={:<3} bytes={:<9} duration={:.3}s",
                s.name, s.parts, s.bytes, s.duration_secs
            );
        }
        println!(
            "{} segments, {} parts",
            report.segments.len(),
            report.parts
        );
    }

    Ok(())
}

/// Drive every synthetic sample through a segmenter publishing into `store`.
/// Returns the init segment.
fn ingest(
    source: SyntheticSource,
    config: SegmenterConfig,
    store: Arc<PartStore>,
) -> Result<Vec<u8>> {
    let mut segmenter = Segmenter::new(
        config,
        source.tracks(),
        Arc::new(SequentialIds::new()),
        store.clone(),
        store,
    )?;
    let init = segmenter.init_segment()?;

    let mut rejected = 0u64;
    for sample in source.samples() {
        let result = match sample {
            SyntheticSample::Video(v) => segmenter.write_h264(v),
            SyntheticSample::Audio(a) => segmenter.write_aac(a),
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_capacity_exceeded() => rejected += 1,
            Err(e) => return Err(e.into()),
        }
    }
    segmenter.close()?;

    if rejected > 0 {
        tracing::warn!(rejected, "samples dropped by segment size limit");
    }
    Ok(init)
}

async fn watch_events(mut rx: broadcast::Receiver<StoreEvent>) -> u64 {
    let mut seen = 0u64;
    loop {
        match rx.recv().await {
            Ok(StoreEvent::SegmentFinalized { name, .. }) => {
                seen += 1;
                tracing::trace!(segment = %name, "segment announced");
            }
            Ok(StoreEvent::PartFinalized { part_id, .. }) => {
                seen += 1;
                tracing::trace!(part = %part_id, "part announced");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => seen += skipped,
            Err(broadcast::error::RecvError::Closed) => return seen,
        }
    }
}

fn write_output(path: &Path, init: &[u8], store: &PartStore) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    let mut out = BufWriter::new(file);

    out.write_all(init)?;
    let mut written = init.len() as u64;
    for segment in store.segments() {
        written += std::io::copy(&mut segment.reader(), &mut out)
            .with_context(|| format!("Failed to write {}", segment.name()))?;
    }
    out.flush()?;

    tracing::info!(path = %path.display(), bytes = written, "wrote fMP4 stream");
    Ok(())
}
