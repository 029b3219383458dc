//! System bodies.
//!
//! A body is what runs once the scheduler has decided *when* a system runs.
//! It never sees the world directly: the dispatcher resolves the system's
//! batches and hands the body one [`BatchView`] per batch, or one
//! [`EntityView`] per unit, depending on [`System::granularity`].
//!
//! Most bodies are closures wrapped with [`per_batch`] or [`per_entity`].

use crate::batch::{BatchView, EntityView};

/// The unit a body is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Once per matching entity.
    Entity,
    /// Once per matching batch.
    Batch,
}

/// The executable part of a scheduled system.
///
/// Bodies must be `Send + Sync`; systems sharing a wave run on worker
/// threads.
pub trait System: Send + Sync {
    /// What the dispatcher invokes the body for.
    fn granularity(&self) -> Granularity;

    /// Called once per batch for [`Granularity::Batch`] bodies.
    ///
    /// # Errors
    ///
    /// Any error aborts the run after the current wave.
    fn run_batch(&self, view: &BatchView<'_>) -> anyhow::Result<()> {
        let _ = view;
        Ok(())
    }

    /// Called once per unit for [`Granularity::Entity`] bodies.
    ///
    /// # Errors
    ///
    /// Any error aborts the run after the current wave.
    fn run_entity(&self, unit: &EntityView<'_>) -> anyhow::Result<()> {
        let _ = unit;
        Ok(())
    }
}

/// A batch-granular body backed by a closure.
pub struct BatchFn<F>(F);

impl<F> System for BatchFn<F>
where
    F: Fn(&BatchView<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn granularity(&self) -> Granularity {
        Granularity::Batch
    }

    fn run_batch(&self, view: &BatchView<'_>) -> anyhow::Result<()> {
        (self.0)(view)
    }
}

/// An entity-granular body backed by a closure.
pub struct EntityFn<F>(F);

impl<F> System for EntityFn<F>
where
    F: Fn(&EntityView<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn granularity(&self) -> Granularity {
        Granularity::Entity
    }

    fn run_entity(&self, unit: &EntityView<'_>) -> anyhow::Result<()> {
        (self.0)(unit)
    }
}

/// Wrap a closure invoked once per batch.
///
/// ```rust
/// use wave_schedule::system::{per_batch, Granularity, System};
///
/// let body = per_batch(|view| {
///     let _units = view.len();
///     Ok(())
/// });
/// assert_eq!(body.granularity(), Granularity::Batch);
/// ```
pub fn per_batch<F>(body: F) -> BatchFn<F>
where
    F: Fn(&BatchView<'_>) -> anyhow::Result<()> + Send + Sync,
{
    BatchFn(body)
}

/// Wrap a closure invoked once per entity.
pub fn per_entity<F>(body: F) -> EntityFn<F>
where
    F: Fn(&EntityView<'_>) -> anyhow::Result<()> + Send + Sync,
{
    EntityFn(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl System for Noop {
        fn granularity(&self) -> Granularity {
            Granularity::Entity
        }
    }

    #[test]
    fn test_adapters_report_their_granularity() {
        assert_eq!(per_batch(|_| Ok(())).granularity(), Granularity::Batch);
        assert_eq!(per_entity(|_| Ok(())).granularity(), Granularity::Entity);
        assert_eq!(Noop.granularity(), Granularity::Entity);
    }

    #[test]
    fn test_bodies_are_object_safe() {
        let bodies: Vec<Box<dyn System>> = vec![
            Box::new(per_batch(|_| Ok(()))),
            Box::new(per_entity(|_| anyhow::bail!("boom"))),
            Box::new(Noop),
        ];
        assert_eq!(bodies.len(), 3);
    }
}
