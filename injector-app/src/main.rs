//! Injector native host entry point.
//!
//! Streams a WAV file through an `InjectorSession` into the default (or
//! preferred) output device until the file ends or Ctrl-C.
//!
//! ```text
//! injector [path/to/file.wav]
//! ```

mod settings;
mod source;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use injector_core::{
    list_output_devices, AudioOutput, InjectorError, InjectorSession, SampleSink, SessionStatus,
};
use settings::{apply_env_overrides, default_settings_path, load_settings, save_settings};
use source::WavSource;
use tracing::{error, info, warn};

/// Retry delay while the staging queue is full.
const STAGING_BACKOFF: Duration = Duration::from_millis(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("injector=info")),
        )
        .init();

    info!("injector starting");

    let settings_path = default_settings_path();
    if !settings_path.exists() {
        if let Err(e) = save_settings(&settings_path, &Default::default()) {
            warn!("could not write default settings to {}: {e}", settings_path.display());
        }
    }
    let mut settings = load_settings(&settings_path);
    apply_env_overrides(&mut settings);

    let source_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| settings.source_path.clone())
        .context("no source given: pass a WAV path or set INJECTOR_SOURCE")?;

    for device in list_output_devices() {
        info!(
            name = device.name.as_str(),
            is_default = device.is_default,
            "output device"
        );
    }

    let source = WavSource::open(&source_path)?;
    let channels = source.channels();
    info!(
        path = %source_path.display(),
        channels,
        sample_rate = source.sample_rate(),
        frames = source.total_frames(),
        "source opened"
    );

    let session = Arc::new(InjectorSession::<f32>::new(
        settings.injector_config(channels),
    )?);
    let mut status_rx = session.subscribe_status();
    tokio::spawn(async move {
        while let Ok(event) = status_rx.recv().await {
            match event.status {
                SessionStatus::Error => error!(detail = ?event.detail, "session error"),
                status => info!(?status, "session status"),
            }
        }
    });

    // The stream plays as soon as it is open, so the processor is already
    // polling its port when the handshake starts.
    let output = AudioOutput::open_with_preference(
        session.take_processor()?,
        channels,
        settings.preferred_output_device.as_deref(),
    )?;
    if output.sample_rate != source.sample_rate() {
        warn!(
            device_rate = output.sample_rate,
            source_rate = source.sample_rate(),
            "sample rates differ; audio will play at the wrong speed"
        );
    }

    session.initialize()?;
    session.start()?;

    let sink = session.take_sink()?;
    let decoding = Arc::new(AtomicBool::new(true));
    let chunk_frames = settings
        .decode_chunk_frames
        .min(settings.staging_capacity_frames);
    let decoder = {
        let decoding = Arc::clone(&decoding);
        tokio::task::spawn_blocking(move || decode_into(source, sink, chunk_frames, &decoding))
    };

    tokio::select! {
        result = decoder => {
            let frames = result.context("decoder task panicked")??;
            info!(frames, "source exhausted, draining");
            wait_for_drain(&session).await;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            decoding.store(false, Ordering::Release);
        }
    }

    if let Err(e) = session.stop() {
        warn!("stop: {e}");
    }
    // Detach the render callback before the session goes away.
    drop(output);

    let diag = session.diagnostics_snapshot();
    info!(
        frames_written = diag.frames_written,
        frames_dropped = diag.frames_dropped,
        underrun_frames = diag.underrun_frames,
        wakeups = diag.wakeups,
        "injector finished"
    );
    Ok(())
}

/// Decode `source` into `sink` until end of file or `decoding` clears.
/// Returns frames staged.
fn decode_into(
    mut source: WavSource,
    mut sink: SampleSink<f32>,
    chunk_frames: usize,
    decoding: &AtomicBool,
) -> Result<usize> {
    let mut staged = 0;
    while decoding.load(Ordering::Acquire) {
        let Some(chunk) = source.next_chunk(chunk_frames)? else {
            break;
        };
        loop {
            match sink.push_chunk(&chunk) {
                Ok(frames) => {
                    staged += frames;
                    break;
                }
                Err(InjectorError::StagingFull) => {
                    if !decoding.load(Ordering::Acquire) {
                        return Ok(staged);
                    }
                    std::thread::sleep(STAGING_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(staged)
}

/// Wait until every staged frame has been written and rendered.
async fn wait_for_drain(session: &InjectorSession) {
    let mut tick = tokio::time::interval(Duration::from_millis(50));
    loop {
        tick.tick().await;
        let diag = session.diagnostics_snapshot();
        if diag.frames_written >= diag.frames_staged && diag.buffer_level_frames == 0 {
            break;
        }
    }
}
