//! # wave_app — Runner
//!
//! Loads system declarations, computes the wave schedule once, and runs it
//! against an in-memory world on a fixed timestep.
//!
//! ## Startup Sequence
//!
//! 1. Load declarations from `--config`, or use the built-in demo set.
//! 2. Bind each declaration to its demo body by name.
//! 3. Build the plan and log the wave table.
//! 4. Enable the systems named by `--only` (all when none are given).
//! 5. Populate the world and enter the tick loop.

mod demo;
mod tick;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wave_schedule::{DeclarationFile, SystemRegistry};
use wave_world::{DEFAULT_BATCH_SIZE, World};
use tick::{RunMode, TickConfig, TickLoop};

#[derive(Parser)]
#[command(name = "wave_app", about = "Run a wave schedule over an in-memory world")]
struct Args {
    /// JSON declaration file (defaults to the built-in demo set)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of ticks to run (0 = until interrupted)
    #[arg(short, long, default_value_t = 10)]
    ticks: u64,

    /// Target ticks per second
    #[arg(long, default_value_t = 60.0, value_parser = parse_tick_rate)]
    tick_rate: f64,

    /// How systems within a wave are dispatched
    #[arg(short, long, value_enum, default_value_t = RunMode::Parallel)]
    mode: RunMode,

    /// Entities to spawn
    #[arg(short, long, default_value_t = 1000)]
    entities: usize,

    /// Rows per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Enable only the named system (repeatable)
    #[arg(long = "only", value_name = "SYSTEM")]
    only: Vec<String>,

    /// Print the declarations as JSON and exit
    #[arg(long)]
    dump: bool,

    /// Print the wave table and exit
    #[arg(long)]
    plan: bool,
}

fn parse_tick_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(format!("tick rate must be a positive number, got {value}"))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wave_app=info".parse()?))
        .init();

    let args = Args::parse();

    let file = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading declarations");
            DeclarationFile::load(path)?
        }
        None => demo::default_declarations(),
    };

    if args.dump {
        println!("{}", serde_json::to_string_pretty(&file)?);
        return Ok(());
    }

    let mut components = file.component_registry()?;
    demo::register_components(&mut components)?;
    let components = Arc::new(components);
    info!(
        components = components.len(),
        systems = file.systems.len(),
        "declarations loaded"
    );

    let mut registry = SystemRegistry::new();
    for declaration in file.systems {
        let name = declaration.name.clone();
        if !demo::bind(&mut registry, declaration) {
            warn!(system = %name, "no body with this name, system skipped");
        }
    }

    let plan = registry.build(Arc::clone(&components))?;
    if args.plan {
        print!("{}", plan.waves());
        return Ok(());
    }
    for line in plan.waves().to_string().lines() {
        info!("{line}");
    }

    let mut builder = plan.builder();
    if args.only.is_empty() {
        builder.enable_all();
    } else {
        for name in &args.only {
            builder.enable_named(name);
        }
    }
    let schedule = builder.build();
    info!(
        enabled = schedule.enabled_count(),
        total = plan.waves().system_count(),
        "schedule ready"
    );

    let mut world = World::new(components).with_batch_size(args.batch_size);
    demo::populate(&mut world, args.entities)?;
    info!(
        entities = world.entity_count(),
        archetypes = world.archetype_count(),
        "world populated"
    );

    let config = TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.ticks,
        mode: args.mode,
    };
    let mut tick_loop = TickLoop::new(config, schedule, world);
    tick_loop.run()?;

    let totals = tick_loop.totals();
    info!(
        ticks = tick_loop.tick_id(),
        systems = totals.systems,
        batches = totals.batches,
        units = totals.units,
        "run finished"
    );
    Ok(())
}
