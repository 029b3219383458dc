//! Fixed-timestep tick loop.
//!
//! Each tick runs the whole schedule once against the world, then sleeps out
//! the rest of the tick budget. A tick that overruns its budget is logged and
//! the next one starts immediately.

use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::{debug, info, warn};
use wave_schedule::{CancelToken, DispatchError, RunStats, Schedule};
use wave_world::World;

/// How systems inside one wave are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RunMode {
    /// One system at a time, in wave order.
    Sequential,
    /// Systems of a wave on the rayon pool.
    #[default]
    Parallel,
}

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second. Zero, negative or non-finite rates run
    /// unthrottled.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Dispatch mode.
    pub mode: RunMode,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            mode: RunMode::Parallel,
        }
    }
}

/// The tick loop state.
pub struct TickLoop {
    /// Ticks completed so far.
    tick_id: u64,
    config: TickConfig,
    schedule: Schedule,
    world: World,
    cancel: CancelToken,
    totals: RunStats,
}

impl TickLoop {
    /// Create a tick loop running `schedule` against `world`.
    #[must_use]
    pub fn new(config: TickConfig, schedule: Schedule, world: World) -> Self {
        Self {
            tick_id: 0,
            config,
            schedule,
            world,
            cancel: CancelToken::new(),
            totals: RunStats::default(),
        }
    }

    /// Returns the number of completed ticks.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns a reference to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// A token that stops the loop at the next wave boundary.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Counters summed over every completed tick.
    #[must_use]
    pub fn totals(&self) -> RunStats {
        self.totals
    }

    /// Run the schedule once.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error; the tick counter does not advance.
    pub fn tick(&mut self) -> Result<RunStats, DispatchError> {
        let stats = match self.config.mode {
            RunMode::Sequential => {
                self.schedule.run_sequential_until(&mut self.world, &self.cancel)?
            }
            RunMode::Parallel => self.schedule.run_parallel_until(&mut self.world, &self.cancel)?,
        };
        self.tick_id += 1;
        self.totals.waves += stats.waves;
        self.totals.systems += stats.systems;
        self.totals.batches += stats.batches;
        self.totals.units += stats.units;
        debug!(
            tick_id = self.tick_id,
            waves = stats.waves,
            systems = stats.systems,
            units = stats.units,
            "tick complete"
        );
        Ok(stats)
    }

    /// Run for the configured number of ticks, or until cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first dispatch error other than cancellation.
    pub fn run(&mut self) -> Result<(), DispatchError> {
        let tick_duration = tick_budget(self.config.tick_rate);

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            mode = ?self.config.mode,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            match self.tick() {
                Ok(_) => {}
                Err(DispatchError::Cancelled { completed_waves }) => {
                    info!(tick_id = self.tick_id, completed_waves, "tick loop cancelled");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }

            if self.config.max_ticks > 0 && self.tick_id >= self.config.max_ticks {
                info!(ticks = self.tick_id, units = self.totals.units, "tick loop complete");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}

/// Wall-clock time allotted to one tick at `tick_rate` ticks per second.
fn tick_budget(tick_rate: f64) -> Duration {
    Duration::try_from_secs_f64(1.0 / tick_rate).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wave_schedule::{SystemDeclaration, SystemRegistry, per_batch};

    use super::*;
    use crate::demo;

    fn tick_loop(config: TickConfig) -> TickLoop {
        let file = demo::default_declarations();
        let mut components = file.component_registry().unwrap();
        demo::register_components(&mut components).unwrap();
        let components = Arc::new(components);

        let mut registry = SystemRegistry::new();
        for declaration in file.systems {
            demo::bind(&mut registry, declaration);
        }
        let plan = registry.build(Arc::clone(&components)).unwrap();
        let schedule = plan.builder().enable_all().build();

        let mut world = World::new(components).with_batch_size(8);
        demo::populate(&mut world, 30).unwrap();
        TickLoop::new(config, schedule, world)
    }

    #[test]
    fn test_tick_advances_counter() {
        let mut tick_loop = tick_loop(TickConfig::default());
        assert_eq!(tick_loop.tick_id(), 0);
        tick_loop.tick().unwrap();
        assert_eq!(tick_loop.tick_id(), 1);
        tick_loop.tick().unwrap();
        assert_eq!(tick_loop.tick_id(), 2);
        assert_eq!(tick_loop.totals().systems, 10);
    }

    #[test]
    fn test_run_limited_ticks() {
        for mode in [RunMode::Sequential, RunMode::Parallel] {
            let config = TickConfig {
                tick_rate: 1000.0,
                max_ticks: 5,
                mode,
            };
            let mut tick_loop = tick_loop(config);
            tick_loop.run().unwrap();
            assert_eq!(tick_loop.tick_id(), 5);

            let world = tick_loop.world();
            for table in world.archetypes() {
                for &entity in table.entities() {
                    assert_eq!(world.get::<demo::Age>(entity).unwrap().0, 5);
                }
            }
        }
    }

    #[test]
    fn test_tick_budget_handles_degenerate_rates() {
        assert_eq!(tick_budget(4.0), Duration::from_millis(250));
        for rate in [0.0, -1.0, f64::NAN, f64::MIN_POSITIVE] {
            assert_eq!(tick_budget(rate), Duration::ZERO);
        }
        assert_eq!(tick_budget(f64::INFINITY), Duration::ZERO);
    }

    #[test]
    fn test_zero_tick_rate_runs_unthrottled() {
        for tick_rate in [0.0, f64::NAN] {
            let mut tick_loop = tick_loop(TickConfig {
                tick_rate,
                max_ticks: 3,
                mode: RunMode::Sequential,
            });
            tick_loop.run().unwrap();
            assert_eq!(tick_loop.tick_id(), 3);
        }
    }

    #[test]
    fn test_cancel_stops_unlimited_loop() {
        let mut tick_loop = tick_loop(TickConfig {
            tick_rate: 1000.0,
            max_ticks: 0,
            mode: RunMode::Parallel,
        });
        tick_loop.cancel_token().cancel();
        tick_loop.run().unwrap();
        assert_eq!(tick_loop.tick_id(), 0);
    }

    #[test]
    fn test_failing_system_stops_loop() {
        let mut components = wave_component::ComponentRegistry::new();
        demo::register_components(&mut components).unwrap();
        let components = Arc::new(components);
        let mut registry = SystemRegistry::new();
        registry.register(
            SystemDeclaration::new("Broken").read("Age"),
            per_batch(|_| anyhow::bail!("broken")),
        );
        let plan = registry.build(Arc::clone(&components)).unwrap();
        let schedule = plan.builder().enable_all().build();
        let mut world = World::new(components);
        demo::populate(&mut world, 3).unwrap();

        let mut tick_loop = TickLoop::new(TickConfig::default(), schedule, world);
        assert!(matches!(tick_loop.run(), Err(DispatchError::System { .. })));
    }
}
