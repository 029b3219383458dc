//! Schedules and dispatch.
//!
//! A [`SchedulePlan`] is the shared, immutable result of a build: waves plus
//! bodies. A [`Schedule`] pairs a plan with an enabled mask and runs it.
//! Many schedules can share one plan; none of them recomputes waves.
//!
//! Waves run strictly one after another. Inside a wave, enabled systems run
//! either in stored order ([`Schedule::run_sequential`]) or on the rayon pool
//! ([`Schedule::run_parallel`]). Either way every system of wave *n* returns
//! before any system of wave *n + 1* starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, trace};
use wave_component::{BitSet, ComponentRegistry};

use crate::batch::{BatchSource, BatchView};
use crate::build::PrecomputedWaves;
use crate::builder::ScheduleBuilder;
use crate::cancel::CancelToken;
use crate::declaration::SystemId;
use crate::error::{AccessError, DispatchError};
use crate::system::{Granularity, System};

/// Waves, access records and bodies for one set of systems.
pub struct SchedulePlan {
    components: Arc<ComponentRegistry>,
    waves: PrecomputedWaves,
    bodies: BTreeMap<SystemId, Box<dyn System>>,
}

impl SchedulePlan {
    /// Assemble a plan from a finished build.
    #[must_use]
    pub fn new(
        components: Arc<ComponentRegistry>,
        waves: PrecomputedWaves,
        bodies: BTreeMap<SystemId, Box<dyn System>>,
    ) -> Self {
        Self {
            components,
            waves,
            bodies,
        }
    }

    /// The precomputed wave table.
    #[must_use]
    pub fn waves(&self) -> &PrecomputedWaves {
        &self.waves
    }

    /// The component registry the plan was built against.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Returns `true` if a body is bound to `id`.
    #[must_use]
    pub fn has_body(&self, id: SystemId) -> bool {
        self.bodies.contains_key(&id)
    }

    /// Start a run configuration with nothing enabled.
    #[must_use]
    pub fn builder(self: &Arc<Self>) -> ScheduleBuilder {
        ScheduleBuilder::new(Arc::clone(self))
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Waves that had at least one enabled system.
    pub waves: usize,
    /// Systems invoked.
    pub systems: usize,
    /// Non-empty batches visited.
    pub batches: usize,
    /// Body invocations: one per batch or one per entity.
    pub units: usize,
}

impl RunStats {
    fn absorb(&mut self, other: RunStats) {
        self.systems += other.systems;
        self.batches += other.batches;
        self.units += other.units;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Sequential,
    Parallel,
}

/// A plan plus the systems enabled for this run configuration.
#[derive(Clone)]
pub struct Schedule {
    plan: Arc<SchedulePlan>,
    enabled: BitSet,
}

impl Schedule {
    pub(crate) fn new(plan: Arc<SchedulePlan>, enabled: BitSet) -> Self {
        Self { plan, enabled }
    }

    /// The shared plan.
    #[must_use]
    pub fn plan(&self) -> &Arc<SchedulePlan> {
        &self.plan
    }

    /// Returns `true` if `id` takes part in runs of this schedule.
    #[must_use]
    pub fn is_enabled(&self, id: SystemId) -> bool {
        self.enabled.contains(id.index())
    }

    /// Number of enabled systems.
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.enabled.len()
    }

    /// Enabled systems in the order [`Schedule::run_sequential`] invokes them.
    #[must_use]
    pub fn traversal(&self) -> Vec<SystemId> {
        self.plan
            .waves
            .waves()
            .iter()
            .flat_map(|wave| wave.systems().iter().copied())
            .filter(|&id| self.is_enabled(id))
            .collect()
    }

    /// Run every wave, one system at a time.
    ///
    /// # Errors
    ///
    /// Stops at the first failing system.
    pub fn run_sequential<S: BatchSource>(
        &self,
        source: &mut S,
    ) -> Result<RunStats, DispatchError> {
        self.run(source, Mode::Sequential, None)
    }

    /// As [`Schedule::run_sequential`], checking `cancel` before each wave.
    ///
    /// # Errors
    ///
    /// Also returns [`DispatchError::Cancelled`] once `cancel` is observed.
    pub fn run_sequential_until<S: BatchSource>(
        &self,
        source: &mut S,
        cancel: &CancelToken,
    ) -> Result<RunStats, DispatchError> {
        self.run(source, Mode::Sequential, Some(cancel))
    }

    /// Run every wave, dispatching the systems of a wave concurrently.
    ///
    /// # Errors
    ///
    /// Finishes the wave in which a system failed, then returns the first
    /// failure in wave order.
    pub fn run_parallel<S: BatchSource>(&self, source: &mut S) -> Result<RunStats, DispatchError> {
        self.run(source, Mode::Parallel, None)
    }

    /// As [`Schedule::run_parallel`], checking `cancel` before each wave.
    ///
    /// # Errors
    ///
    /// Also returns [`DispatchError::Cancelled`] once `cancel` is observed.
    pub fn run_parallel_until<S: BatchSource>(
        &self,
        source: &mut S,
        cancel: &CancelToken,
    ) -> Result<RunStats, DispatchError> {
        self.run(source, Mode::Parallel, Some(cancel))
    }

    // `&mut S` keeps the source out of reach of anything else for the whole
    // run; workers only ever see the shared reborrow.
    fn run<S: BatchSource>(
        &self,
        source: &mut S,
        mode: Mode,
        cancel: Option<&CancelToken>,
    ) -> Result<RunStats, DispatchError> {
        let source: &S = source;
        let mut stats = RunStats::default();

        for (index, wave) in self.plan.waves.waves().iter().enumerate() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                debug!(completed_waves = index, "run cancelled");
                return Err(DispatchError::Cancelled {
                    completed_waves: index,
                });
            }

            let enabled: Vec<SystemId> = wave
                .systems()
                .iter()
                .copied()
                .filter(|&id| self.is_enabled(id))
                .collect();
            if enabled.is_empty() {
                continue;
            }
            trace!(wave = index, systems = enabled.len(), ?mode, "dispatching wave");

            match mode {
                Mode::Parallel if enabled.len() > 1 => {
                    let outcomes: Vec<Result<RunStats, DispatchError>> =
                        enabled.par_iter().map(|&id| self.dispatch(id, source)).collect();
                    for outcome in outcomes {
                        stats.absorb(outcome?);
                    }
                }
                _ => {
                    for &id in &enabled {
                        stats.absorb(self.dispatch(id, source)?);
                    }
                }
            }
            stats.waves += 1;
        }

        debug!(
            waves = stats.waves,
            systems = stats.systems,
            batches = stats.batches,
            units = stats.units,
            "run complete"
        );
        Ok(stats)
    }

    fn dispatch<S: BatchSource>(
        &self,
        id: SystemId,
        source: &S,
    ) -> Result<RunStats, DispatchError> {
        let waves = &self.plan.waves;
        let Some(descriptor) = waves.descriptor(id) else {
            return Ok(RunStats::default());
        };
        let system = || descriptor.name.clone();

        let body = self
            .plan
            .bodies
            .get(&id)
            .ok_or_else(|| DispatchError::MissingBody { system: system() })?;
        let batches = source
            .resolve(&descriptor.access)
            .map_err(|source| DispatchError::Resolve {
                system: system(),
                source,
            })?;

        let mut stats = RunStats {
            systems: 1,
            ..RunStats::default()
        };
        for batch in batches.iter().filter(|batch| !batch.is_empty()) {
            let view = BatchView::new(batch, &descriptor.access, &self.plan.components);
            match body.granularity() {
                Granularity::Batch => {
                    body.run_batch(&view).map_err(|source| body_error(system(), source))?;
                    stats.units += 1;
                }
                Granularity::Entity => {
                    for row in 0..view.len() {
                        body.run_entity(&view.unit(row))
                            .map_err(|source| body_error(system(), source))?;
                    }
                    stats.units += view.len();
                }
            }
            stats.batches += 1;
        }
        trace!(
            system = %descriptor.name,
            batches = stats.batches,
            units = stats.units,
            "system done"
        );
        Ok(stats)
    }
}

fn body_error(system: String, source: anyhow::Error) -> DispatchError {
    match source.downcast::<AccessError>() {
        Ok(source) => DispatchError::Access { system, source },
        Err(source) => DispatchError::System { system, source },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wave_component::{Component, ComponentAccess, Entity};

    use super::*;
    use crate::batch::{Batch, SharedColumn};
    use crate::declaration::SystemDeclaration;
    use crate::registry::SystemRegistry;
    use crate::system::{per_batch, per_entity};

    #[derive(Debug)]
    struct Position(f32);
    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug)]
    struct Velocity(f32);
    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[derive(Debug)]
    struct Health(f32);
    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    /// One table holding every component, split into fixed-size batches.
    struct Table {
        components: Arc<ComponentRegistry>,
        entities: Vec<Entity>,
        positions: SharedColumn<Position>,
        velocities: SharedColumn<Velocity>,
        healths: SharedColumn<Health>,
        batch_size: usize,
    }

    impl Table {
        fn new(rows: u32, batch_size: usize) -> Self {
            let mut components = ComponentRegistry::new();
            components.register::<Position>().unwrap();
            components.register::<Velocity>().unwrap();
            components.register::<Health>().unwrap();
            Self {
                components: Arc::new(components),
                entities: (0..rows).map(|i| Entity::new(i, 0)).collect(),
                positions: (0..rows).map(|i| Position(i as f32)).collect(),
                velocities: (0..rows).map(|_| Velocity(1.0)).collect(),
                healths: (0..rows).map(|_| Health(10.0)).collect(),
                batch_size,
            }
        }
    }

    unsafe impl BatchSource for Table {
        fn resolve(&self, access: &ComponentAccess) -> anyhow::Result<Vec<Batch<'_>>> {
            let id = |name| self.components.id_by_name(name).unwrap();
            let mut signature = BitSet::new();
            signature.extend(["Position", "Velocity", "Health"].map(|name| id(name).index()));
            if !access.matches(&signature) {
                return Ok(Vec::new());
            }
            let mut batches = Vec::new();
            let mut start = 0;
            while start < self.entities.len() {
                let end = (start + self.batch_size).min(self.entities.len());
                batches.push(
                    Batch::new(&self.entities, start..end)
                        .with_column(id("Position"), &self.positions)
                        .with_column(id("Velocity"), &self.velocities)
                        .with_column(id("Health"), &self.healths),
                );
                start = end;
            }
            Ok(batches)
        }
    }

    fn movement_registry(log: &Arc<Mutex<Vec<&'static str>>>) -> SystemRegistry {
        let mut registry = SystemRegistry::new();
        let gravity_log = Arc::clone(log);
        let move_log = Arc::clone(log);
        let render_log = Arc::clone(log);
        registry
            .register(
                SystemDeclaration::new("Gravity").write("Velocity"),
                per_batch(move |view| {
                    gravity_log.lock().unwrap().push("Gravity");
                    for v in view.write::<Velocity>()? {
                        v.0 -= 0.5;
                    }
                    Ok(())
                }),
            )
            .register(
                SystemDeclaration::new("Move").write("Position").read("Velocity"),
                per_entity(move |unit| {
                    move_log.lock().unwrap().push("Move");
                    let v = unit.read::<Velocity>()?.0;
                    unit.write::<Position>()?.0 += v;
                    Ok(())
                }),
            )
            .register(
                SystemDeclaration::new("Render").read("Position"),
                per_batch(move |view| {
                    render_log.lock().unwrap().push("Render");
                    let _ = view.read::<Position>()?;
                    Ok(())
                }),
            );
        registry
    }

    #[test]
    fn test_sequential_run_follows_waves() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = Table::new(4, 4);
        let plan = movement_registry(&log).build(Arc::clone(&table.components)).unwrap();
        let schedule = plan.builder().enable_all().build();

        let stats = schedule.run_sequential(&mut table).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["Gravity", "Render", "Move", "Move", "Move", "Move"]);
        assert_eq!(
            stats,
            RunStats {
                waves: 2,
                systems: 3,
                batches: 3,
                units: 6
            }
        );
        // Gravity ran before Move: every velocity was 0.5 when it was added.
        assert_eq!(table.positions.get(3).unwrap().0, 3.5);
    }

    #[test]
    fn test_parallel_matches_sequential_results() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sequential = Table::new(37, 8);
        let mut parallel = Table::new(37, 8);
        let plan = movement_registry(&log).build(Arc::clone(&sequential.components)).unwrap();
        let schedule = plan.builder().enable_all().build();

        for _ in 0..3 {
            schedule.run_sequential(&mut sequential).unwrap();
            schedule.run_parallel(&mut parallel).unwrap();
        }
        for row in 0..37 {
            let (a, b) = (&sequential, &parallel);
            assert_eq!(a.positions.get(row).unwrap().0, b.positions.get(row).unwrap().0);
            assert_eq!(a.velocities.get(row).unwrap().0, b.velocities.get(row).unwrap().0);
        }
    }

    #[test]
    fn test_repeated_sequential_runs_keep_traversal_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = Table::new(6, 4);
        let plan = movement_registry(&log).build(Arc::clone(&table.components)).unwrap();
        let schedule = plan.builder().enable_all().build();

        schedule.run_sequential(&mut table).unwrap();
        let first = std::mem::take(&mut *log.lock().unwrap());
        let first_traversal = schedule.traversal();
        schedule.run_sequential(&mut table).unwrap();
        let second = std::mem::take(&mut *log.lock().unwrap());

        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert_eq!(first_traversal, schedule.traversal());
    }

    #[test]
    fn test_lone_system_in_wave_runs_on_calling_thread() {
        let mut table = Table::new(8, 4);
        let threads = Arc::new(Mutex::new(BTreeMap::<&'static str, Vec<Option<usize>>>::new()));
        let mut registry = SystemRegistry::new();
        for name in ["A", "B", "C"] {
            let threads = Arc::clone(&threads);
            registry.register(
                SystemDeclaration::new(name).read("Health"),
                per_batch(move |_| {
                    let index = rayon::current_thread_index();
                    threads.lock().unwrap().entry(name).or_default().push(index);
                    Ok(())
                }),
            );
        }
        let plan = registry.build(Arc::clone(&table.components)).unwrap();
        assert_eq!(plan.waves().waves().len(), 1);

        plan.builder().enable_named("B").build().run_parallel(&mut table).unwrap();
        {
            let threads = threads.lock().unwrap();
            assert_eq!(threads.len(), 1);
            assert_eq!(threads["B"], vec![None, None]);
        }

        threads.lock().unwrap().clear();
        plan.builder().enable_all().build().run_parallel(&mut table).unwrap();
        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 3);
        assert!(threads.values().flatten().all(Option::is_some));
    }

    #[test]
    fn test_parallel_wave_is_a_barrier() {
        let mut table = Table::new(16, 4);
        let finished_first_wave = Arc::new(AtomicUsize::new(0));
        let mut registry = SystemRegistry::new();
        for name in ["A", "B", "C"] {
            let counter = Arc::clone(&finished_first_wave);
            registry.register(
                SystemDeclaration::new(name).read("Health"),
                per_batch(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }
        let observer = Arc::clone(&finished_first_wave);
        registry.register(
            SystemDeclaration::new("D").write("Health"),
            per_batch(move |_| {
                anyhow::ensure!(observer.load(Ordering::SeqCst) == 12, "wave 0 still running");
                Ok(())
            }),
        );
        let plan = registry.build(Arc::clone(&table.components)).unwrap();
        assert_eq!(plan.waves().waves().len(), 2);
        let stats = plan.builder().enable_all().build().run_parallel(&mut table).unwrap();
        assert_eq!(stats.systems, 4);
    }

    #[test]
    fn test_disabled_systems_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = Table::new(4, 2);
        let plan = movement_registry(&log).build(Arc::clone(&table.components)).unwrap();
        let schedule = plan.builder().enable_named("Render").build();

        assert_eq!(schedule.traversal(), vec![plan.waves().id_of("Render").unwrap()]);
        let stats = schedule.run_parallel(&mut table).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["Render", "Render"]);
        assert_eq!(stats.waves, 1);
        assert_eq!(table.velocities.get(0).unwrap().0, 1.0);
    }

    #[test]
    fn test_one_plan_many_configurations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let table = Table::new(1, 1);
        let plan = movement_registry(&log).build(Arc::clone(&table.components)).unwrap();

        let physics = plan.builder().enable_named("Gravity").enable_named("Move").build();
        let everything = plan.builder().enable_all().build();
        let nothing = plan.builder().build();

        assert_eq!(physics.enabled_count(), 2);
        assert_eq!(everything.enabled_count(), 3);
        assert!(nothing.traversal().is_empty());
        assert!(Arc::ptr_eq(physics.plan(), everything.plan()));
    }

    #[test]
    fn test_access_violation_names_the_system() {
        let mut table = Table::new(2, 2);
        let mut registry = SystemRegistry::new();
        registry.register(
            SystemDeclaration::new("Faulty").write("Health"),
            per_entity(|unit| {
                let _ = unit.write::<Velocity>()?;
                Ok(())
            }),
        );
        let plan = registry.build(Arc::clone(&table.components)).unwrap();
        let err = plan
            .builder()
            .enable_all()
            .build()
            .run_sequential(&mut table)
            .unwrap_err();
        assert!(matches!(&err, DispatchError::Access { system, .. } if system == "Faulty"));
    }

    #[test]
    fn test_body_error_names_the_system() {
        let mut table = Table::new(2, 2);
        let mut registry = SystemRegistry::new();
        registry.register(
            SystemDeclaration::new("Faulty").read("Health"),
            per_batch(|_| anyhow::bail!("out of mana")),
        );
        let plan = registry.build(Arc::clone(&table.components)).unwrap();
        let err = plan
            .builder()
            .enable_all()
            .build()
            .run_parallel(&mut table)
            .unwrap_err();
        assert!(matches!(&err, DispatchError::System { system, .. } if system == "Faulty"));
        assert_eq!(err.to_string(), "system 'Faulty' failed");
    }

    #[test]
    fn test_cancelled_before_first_wave() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = Table::new(2, 2);
        let plan = movement_registry(&log).build(Arc::clone(&table.components)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = plan
            .builder()
            .enable_all()
            .build()
            .run_parallel_until(&mut table, &cancel)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled { completed_waves: 0 }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_from_inside_a_wave_stops_at_the_barrier() {
        let mut table = Table::new(2, 2);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut registry = SystemRegistry::new();
        registry
            .register(
                SystemDeclaration::new("First").write("Health"),
                per_batch(move |_| {
                    trigger.cancel();
                    Ok(())
                }),
            )
            .register(
                SystemDeclaration::new("Second").write("Health").after("First"),
                per_batch(|_| anyhow::bail!("must not run")),
            );
        let plan = registry.build(Arc::clone(&table.components)).unwrap();
        let err = plan
            .builder()
            .enable_all()
            .build()
            .run_sequential_until(&mut table, &cancel)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled { completed_waves: 1 }));
    }

    #[test]
    fn test_missing_body_is_reported() {
        let mut table = Table::new(1, 1);
        let waves = crate::build::build_schedule(
            &[SystemDeclaration::new("Bodiless").read("Health")],
            &table.components,
        )
        .unwrap();
        let components = Arc::clone(&table.components);
        let plan = Arc::new(SchedulePlan::new(components, waves, BTreeMap::new()));
        let err = plan
            .builder()
            .enable_all()
            .build()
            .run_sequential(&mut table)
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingBody { .. }));
    }
}
