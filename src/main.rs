#![forbid(unsafe_code)]

mod config;
mod palette;
mod scene;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use strata_octree::{TraceRay, VoxelStore};
use strata_shard::ShardedVoxelIndex;
use strata_trace::TracePipeline;

use crate::config::AppConfig;
use crate::palette::PaletteResolver;

#[derive(Parser)]
#[command(name = "strata", about = "Build a sharded voxel scene and trace it out of core")]
struct Cli {
    /// TOML configuration; defaults are used when the file is missing
    #[arg(long, short, default_value = "strata.toml")]
    config: PathBuf,
    /// Override the view width in rays
    #[arg(long)]
    width: Option<u32>,
    /// Override the view height in rays
    #[arg(long)]
    height: Option<u32>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Trace the configured view and print a depth preview
    Trace,
    /// Build the index and report node and shard counts
    Stats,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut cfg = if cli.config.exists() {
        AppConfig::from_path(&cli.config)?
    } else {
        log::warn!("{} not found, using defaults", cli.config.display());
        AppConfig::default()
    };
    if let Some(w) = cli.width {
        cfg.view.width = w;
    }
    if let Some(h) = cli.height {
        cfg.view.height = h;
    }

    let mut index = ShardedVoxelIndex::new(cfg.index.total_depth, cfg.index_config())?;
    let started = Instant::now();
    scene::populate(&mut index, &cfg.scene)?;
    log::info!("scene built in {:.2?}", started.elapsed());

    match cli.command.unwrap_or(Command::Trace) {
        Command::Stats => {
            let nodes = index.node_count();
            let stats = index.stats();
            println!("total depth   {}", index.total_depth());
            println!("shard depth   {}", index.shard_depth());
            println!("shards        {}", stats.shards);
            println!("nodes         {}", nodes);
            println!("shard loads   {}", stats.shard_loads);
            println!("shard flushes {}", stats.shard_flushes);
            Ok(())
        }
        Command::Trace => trace(&cfg, &mut index),
    }
}

fn trace(cfg: &AppConfig, index: &mut ShardedVoxelIndex) -> Result<(), Box<dyn Error>> {
    let shards = index.finalize_for_tracing()?;
    let resolver = Arc::new(PaletteResolver::from_entries(&cfg.materials));
    let mut pipeline = TracePipeline::start(shards, resolver, cfg.trace_config())?;

    let rays = scene::view_rays(&cfg.view);
    let total = rays.len();
    let started = Instant::now();
    pipeline.submit_batch(rays)?;

    let mut done: Vec<TraceRay> = Vec::with_capacity(total);
    while done.len() < total {
        done.extend(pipeline.drain_completed());
        if done.len() < total {
            if pipeline.queue().is_closed() {
                return Err("trace driver stopped before the view finished".into());
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
    let stats = pipeline.shutdown();

    let hits = done.iter().filter(|r| r.is_hit()).count();
    log::info!(
        "traced {} rays in {:.2?}: {} hits, {} misses",
        total,
        started.elapsed(),
        hits,
        total - hits
    );
    if let Some(stats) = stats {
        log::info!(
            "{} batches, {} shard visits, {} failed loads",
            stats.batches,
            stats.shards_traced,
            stats.failed_loads
        );
    }
    print!("{}", depth_preview(&done, cfg.view.width, cfg.view.height));
    Ok(())
}

/// Nearer hits are drawn denser; misses are blank.
fn depth_preview(rays: &[TraceRay], width: u32, height: u32) -> String {
    const RAMP: &[u8] = b"@%#*+=-:.";
    let (near, far) = rays
        .iter()
        .filter(|r| r.is_hit())
        .fold((f32::INFINITY, 0.0f32), |(lo, hi), r| {
            (lo.min(r.distance), hi.max(r.distance))
        });
    let span = (far - near).max(1e-3);

    let mut grid = vec![b' '; (width * height) as usize];
    for r in rays.iter().filter(|r| r.is_hit()) {
        let t = ((r.distance - near) / span).clamp(0.0, 1.0);
        let k = (t * (RAMP.len() - 1) as f32).round() as usize;
        grid[(r.y * width + r.x) as usize] = RAMP[k];
    }
    let mut out = String::with_capacity(grid.len() + height as usize);
    for row in grid.chunks(width.max(1) as usize) {
        out.push_str(&String::from_utf8_lossy(row));
        out.push('\n');
    }
    out
}
