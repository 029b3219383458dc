//! Run configuration staging.

use std::sync::Arc;

use tracing::warn;
use wave_component::BitSet;

use crate::declaration::SystemId;
use crate::schedule::{Schedule, SchedulePlan};

/// Chooses which systems of a plan take part in a run.
///
/// The builder only edits the enabled mask. [`ScheduleBuilder::build`] can be
/// called repeatedly; every schedule it produces shares the plan's waves.
#[derive(Clone)]
pub struct ScheduleBuilder {
    plan: Arc<SchedulePlan>,
    enabled: BitSet,
}

impl ScheduleBuilder {
    /// Start with every system disabled.
    #[must_use]
    pub fn new(plan: Arc<SchedulePlan>) -> Self {
        Self {
            plan,
            enabled: BitSet::new(),
        }
    }

    /// Enable one system. Ids the plan does not schedule are ignored.
    pub fn enable(&mut self, id: SystemId) -> &mut Self {
        if self.plan.waves().descriptor(id).is_some() {
            self.enabled.insert(id.index());
        } else {
            warn!(%id, "ignoring unknown system id");
        }
        self
    }

    /// Enable one system by qualified name.
    pub fn enable_named(&mut self, name: &str) -> &mut Self {
        match self.plan.waves().id_of(name) {
            Some(id) => {
                self.enabled.insert(id.index());
            }
            None => warn!(system = name, "ignoring unknown system"),
        }
        self
    }

    /// Enable every scheduled system.
    pub fn enable_all(&mut self) -> &mut Self {
        let ids: Vec<usize> = self.plan.waves().descriptors().map(|d| d.id.index()).collect();
        self.enabled.extend(ids);
        self
    }

    /// Disable one system.
    pub fn disable(&mut self, id: SystemId) -> &mut Self {
        self.enabled.remove(id.index());
        self
    }

    /// Returns `true` if `id` is currently enabled.
    #[must_use]
    pub fn is_enabled(&self, id: SystemId) -> bool {
        self.enabled.contains(id.index())
    }

    /// Freeze the current mask into a schedule.
    #[must_use]
    pub fn build(&self) -> Schedule {
        Schedule::new(Arc::clone(&self.plan), self.enabled.clone())
    }
}
