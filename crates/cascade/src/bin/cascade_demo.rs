//! # CASCADE Demo
//!
//! Runs a demo script headlessly and prints what a debug panel would show.
//!
//! ```bash
//! # Built-in script (one entity, C1 = 5)
//! cascade_demo
//!
//! # Custom script with per-event tracing
//! cascade_demo --config crates/cascade/config/demo.toml --log cascade_core=trace
//! ```

use std::path::PathBuf;

use anyhow::Result;
use cascade::{panel, script, DemoConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Headless driver for the C1 -> C2 -> C3 pipeline.
#[derive(Parser, Debug)]
#[command(name = "cascade_demo")]
#[command(version)]
#[command(about = "Runs a scripted CASCADE pipeline and prints the result", long_about = None)]
struct Args {
    /// Demo script (TOML). The built-in script is used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of frames to run.
    #[arg(short, long)]
    frames: Option<u32>,

    /// Log filter, e.g. `debug` or `cascade_core=trace`. Overrides RUST_LOG.
    #[arg(long)]
    log: Option<String>,
}

fn init_logging(directive: Option<&str>) {
    // --log wins over RUST_LOG, which wins over the default
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    let mut config = match &args.config {
        Some(path) => DemoConfig::load(path)?,
        None => DemoConfig::default(),
    };
    if let Some(frames) = args.frames {
        config.frames = frames;
    }

    tracing::info!(
        frames = config.frames,
        entities = config.initial.len(),
        edits = config.edits.len(),
        "starting demo"
    );

    let (pipeline, reports) = script::run(&config)?;

    println!("═══════════════════════════════════════════════════════════");
    println!("                      CASCADE DEMO");
    println!("═══════════════════════════════════════════════════════════");
    for report in &reports {
        print!("{}", panel::frame_summary(report));
    }
    println!();
    println!("── Entities ───────────────────────────────────────────────");
    print!("{}", panel::entity_table(pipeline.registry()));
    println!();
    println!("── Change log ─────────────────────────────────────────────");
    print!("{}", panel::change_log(&pipeline.log().lock()));

    let failed = reports.iter().map(|r| r.failures().count()).sum::<usize>();
    if failed > 0 {
        tracing::warn!(failed, "some system runs failed");
    }
    Ok(())
}
