//! Measures the cost of one render quantum against a pre-filled ring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use injector_core::buffering::{AudioRingBuffer, RingProducer};
use injector_core::ipc::{control_channel, ProcessorMessage};
use injector_core::{InjectorProcessor, RenderCallback, SessionConfig};
use serde::Serialize;

#[derive(Debug)]
struct Args {
    capacity_frames: usize,
    quantum: usize,
    channels: usize,
    iterations: usize,
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    capacity_frames: usize,
    quantum: usize,
    channels: usize,
    iterations: usize,
    p50_ns: f64,
    p95_ns: f64,
    max_ns: f64,
    avg_ns: f64,
    /// Real-time budget for one quantum at 48 kHz.
    budget_ns: f64,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("render benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        capacity_frames: 44_100 * 2,
        quantum: 128,
        channels: 1,
        iterations: 100_000,
        output: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().ok_or(format!("missing value for {flag}"));
        match arg.as_str() {
            "--capacity" => args.capacity_frames = parse_usize(&value("--capacity")?)?,
            "--quantum" => args.quantum = parse_usize(&value("--quantum")?)?,
            "--channels" => args.channels = parse_usize(&value("--channels")?)?,
            "--iterations" => args.iterations = parse_usize(&value("--iterations")?)?.max(1),
            "--output" => args.output = Some(PathBuf::from(value("--output")?)),
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p injector-core --release --bin render_benchmark -- \\
  [--capacity <frames>] [--quantum <frames>] [--channels <n>] \\
  [--iterations <n>] [--output <file.json>]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    if args.quantum == 0 || args.quantum > args.capacity_frames {
        return Err("quantum must be between 1 and the ring capacity".into());
    }
    Ok(args)
}

fn parse_usize(raw: &str) -> Result<usize, String> {
    raw.parse::<usize>()
        .map_err(|_| format!("invalid number: {raw}"))
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let config = SessionConfig::new(args.capacity_frames, args.channels);
    let ring = AudioRingBuffer::<f32>::shared(&config).map_err(|e| e.to_string())?;
    let mut producer = RingProducer::new(Arc::clone(&ring), &config).map_err(|e| e.to_string())?;

    let (owner, port) = control_channel::<f32>();
    let mut processor = InjectorProcessor::new(port);
    owner
        .post(ProcessorMessage::init(ring, config))
        .map_err(|e| e.to_string())?;
    processor.drain_port();
    if !processor.is_ready() {
        return Err("processor rejected init".into());
    }

    let block_len = args.quantum * args.channels;
    let source: Vec<f32> = (0..args.capacity_frames * args.channels)
        .map(|i| (i as f32 * 0.01).sin())
        .collect();
    let mut output = vec![0.0f32; block_len];
    let mut timings = Vec::with_capacity(args.iterations);

    println!(
        "Running render benchmark (capacity={}, quantum={}, channels={}, iterations={})",
        args.capacity_frames, args.quantum, args.channels, args.iterations
    );

    for _ in 0..args.iterations {
        let free = producer.free_frames();
        if free >= args.quantum {
            producer.write(&source[..free * args.channels]);
        }
        let started = Instant::now();
        processor.render(&mut output, args.quantum);
        timings.push(started.elapsed().as_nanos() as f64);
    }

    timings.sort_by(|a, b| a.total_cmp(b));
    let avg_ns = timings.iter().sum::<f64>() / timings.len() as f64;
    let budget = Duration::from_secs_f64(args.quantum as f64 / 48_000.0);
    let summary = Summary {
        capacity_frames: args.capacity_frames,
        quantum: args.quantum,
        channels: args.channels,
        iterations: args.iterations,
        p50_ns: percentile(&timings, 0.50),
        p95_ns: percentile(&timings, 0.95),
        max_ns: timings.last().copied().unwrap_or_default(),
        avg_ns,
        budget_ns: budget.as_nanos() as f64,
    };

    println!(
        "p50 {:.0} ns | p95 {:.0} ns | max {:.0} ns | budget {:.0} ns",
        summary.p50_ns, summary.p95_ns, summary.max_ns, summary.budget_ns
    );

    if let Some(path) = args.output {
        let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        std::fs::write(&path, json).map_err(|e| e.to_string())?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
