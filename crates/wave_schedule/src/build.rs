//! The one-shot build step: declarations in, precomputed waves out.
//!
//! 1. Reject unnamed and duplicate-named declarations.
//! 2. Extract each system's [`ComponentAccess`].
//! 3. Assign ids: manual ids first, then ascending qualified name fills the
//!    remaining gaps.
//! 4. Resolve `after`/`before` names to ids and build the explicit graph.
//! 5. Sort topologically; a cycle aborts the build.
//! 6. Assign waves.
//!
//! Only step 5 can fail the whole build. Everything else is reported per
//! system in [`PrecomputedWaves::diagnostics`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{info, warn};
use wave_component::{ComponentAccess, ComponentRegistry};

use crate::declaration::{SystemDeclaration, SystemDescriptor, SystemId};
use crate::error::{CycleError, DeclarationError, DeclarationField};
use crate::extract::extract_access;
use crate::graph::{DependencyEdge, DependencyGraph};
use crate::waves::{Wave, WaveAssignment, assign_waves};

/// The immutable result of a build: every scheduled system, the explicit
/// ordering graph, and the wave table.
#[derive(Debug, Clone)]
pub struct PrecomputedWaves {
    descriptors: BTreeMap<SystemId, SystemDescriptor>,
    by_name: BTreeMap<String, SystemId>,
    graph: DependencyGraph,
    waves: Vec<Wave>,
    placement: BTreeMap<SystemId, usize>,
    diagnostics: Vec<DeclarationError>,
}

impl PrecomputedWaves {
    /// Waves in execution order.
    #[must_use]
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Scheduled systems in id order.
    pub fn descriptors(&self) -> impl Iterator<Item = &SystemDescriptor> {
        self.descriptors.values()
    }

    /// The descriptor of a scheduled system.
    #[must_use]
    pub fn descriptor(&self, id: SystemId) -> Option<&SystemDescriptor> {
        self.descriptors.get(&id)
    }

    /// The id of a scheduled system.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<SystemId> {
        self.by_name.get(name).copied()
    }

    /// The qualified name of a scheduled system.
    #[must_use]
    pub fn name_of(&self, id: SystemId) -> Option<&str> {
        self.descriptors.get(&id).map(|d| d.name.as_str())
    }

    /// The wave a system was placed in.
    #[must_use]
    pub fn wave_of(&self, id: SystemId) -> Option<usize> {
        self.placement.get(&id).copied()
    }

    /// Number of scheduled systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Explicit ordering edges between scheduled systems.
    pub fn edges(&self) -> impl Iterator<Item = DependencyEdge> + '_ {
        self.graph.edges()
    }

    /// Declaration problems found during the build, sorted by system name.
    #[must_use]
    pub fn diagnostics(&self) -> &[DeclarationError] {
        &self.diagnostics
    }

    /// Wave tables as qualified names, for fixtures and logs.
    #[must_use]
    pub fn wave_names(&self) -> Vec<Vec<&str>> {
        self.waves
            .iter()
            .map(|wave| {
                wave.systems()
                    .iter()
                    .filter_map(|&id| self.name_of(id))
                    .collect()
            })
            .collect()
    }
}

impl fmt::Display for PrecomputedWaves {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, names) in self.wave_names().iter().enumerate() {
            writeln!(f, "wave {index}: {}", names.join(", "))?;
        }
        Ok(())
    }
}

/// Build the wave table for `declarations`.
///
/// The result depends only on the set of declarations, not on their order in
/// the slice.
///
/// # Errors
///
/// Returns [`CycleError`] if explicit ordering between the surviving systems
/// is cyclic. No wave table is produced in that case.
pub fn build_schedule(
    declarations: &[SystemDeclaration],
    components: &ComponentRegistry,
) -> Result<PrecomputedWaves, CycleError> {
    let mut diagnostics = Vec::new();

    // Group by name; unnamed and duplicated declarations never get an id.
    let mut by_name: BTreeMap<&str, Vec<&SystemDeclaration>> = BTreeMap::new();
    for (position, declaration) in declarations.iter().enumerate() {
        if declaration.name.is_empty() {
            diagnostics.push(DeclarationError::EmptyName { position });
            continue;
        }
        by_name.entry(&declaration.name).or_default().push(declaration);
    }

    let mut accepted: Vec<(&SystemDeclaration, ComponentAccess)> = Vec::new();
    for (name, group) in &by_name {
        if group.len() > 1 {
            diagnostics.push(DeclarationError::DuplicateName {
                system: (*name).to_string(),
                count: group.len(),
            });
            continue;
        }
        let declaration = group[0];
        match extract_access(declaration, components) {
            Ok(access) => accepted.push((declaration, access)),
            Err(errors) => diagnostics.extend(errors),
        }
    }

    let ids = assign_ids(&accepted, &mut diagnostics);
    let by_name: BTreeMap<String, SystemId> = ids
        .iter()
        .map(|(&name, &id)| (name.to_string(), id))
        .collect();

    let mut descriptors = BTreeMap::new();
    for (declaration, access) in accepted {
        let Some(&id) = ids.get(declaration.name.as_str()) else {
            continue;
        };
        let after = resolve_targets(
            declaration,
            DeclarationField::After,
            &declaration.after,
            &by_name,
            &mut diagnostics,
        );
        let before = resolve_targets(
            declaration,
            DeclarationField::Before,
            &declaration.before,
            &by_name,
            &mut diagnostics,
        );
        descriptors.insert(
            id,
            SystemDescriptor {
                id,
                name: declaration.name.clone(),
                access,
                after,
                before,
            },
        );
    }

    diagnostics.sort_by(|a, b| {
        a.system()
            .cmp(&b.system())
            .then_with(|| a.to_string().cmp(&b.to_string()))
    });
    for diagnostic in &diagnostics {
        warn!(
            system = diagnostic.system().unwrap_or("<unnamed>"),
            excluded = diagnostic.excludes_system(),
            "{diagnostic}"
        );
    }

    let graph = DependencyGraph::from_descriptors(descriptors.values());
    let order = graph.topological_order().map_err(|unresolved| {
        let mut members: Vec<String> = unresolved
            .iter()
            .filter_map(|id| descriptors.get(id).map(|d| d.name.clone()))
            .collect();
        members.sort();
        warn!(members = ?members, "explicit ordering is cyclic; no schedule produced");
        CycleError { members }
    })?;

    let WaveAssignment { waves, placement } =
        assign_waves(&order, &graph, |id| descriptors.get(&id).map(|d| &d.access));

    info!(
        systems = descriptors.len(),
        waves = waves.len(),
        edges = graph.edges().count(),
        diagnostics = diagnostics.len(),
        "built wave schedule"
    );

    Ok(PrecomputedWaves {
        descriptors,
        by_name,
        graph,
        waves,
        placement,
        diagnostics,
    })
}

/// Manual ids win; automatic ids fill the gaps in ascending name order,
/// skipping anything already claimed. `accepted` is in ascending name order.
///
/// Every id stays below `accepted.len()`, so masks indexed by id are sized to
/// the system set.
fn assign_ids<'a>(
    accepted: &[(&'a SystemDeclaration, ComponentAccess)],
    diagnostics: &mut Vec<DeclarationError>,
) -> BTreeMap<&'a str, SystemId> {
    let limit = u32::try_from(accepted.len()).unwrap_or(u32::MAX);
    let mut claimed: BTreeMap<u32, &'a str> = BTreeMap::new();
    let mut ids: BTreeMap<&'a str, SystemId> = BTreeMap::new();
    let mut rejected: BTreeSet<&'a str> = BTreeSet::new();

    for (declaration, _) in accepted {
        let Some(manual) = declaration.manual_id else {
            continue;
        };
        if manual >= limit {
            diagnostics.push(DeclarationError::ManualIdOutOfRange {
                system: declaration.name.clone(),
                id: manual,
                limit,
            });
            rejected.insert(&declaration.name);
            continue;
        }
        if let Some(owner) = claimed.get(&manual) {
            diagnostics.push(DeclarationError::DuplicateManualId {
                system: declaration.name.clone(),
                id: manual,
                claimed_by: (*owner).to_string(),
            });
            rejected.insert(&declaration.name);
            continue;
        }
        claimed.insert(manual, &declaration.name);
        ids.insert(&declaration.name, SystemId(manual));
    }

    let mut next = 0u32;
    for (declaration, _) in accepted {
        let name = declaration.name.as_str();
        if declaration.manual_id.is_some() || rejected.contains(name) {
            continue;
        }
        while claimed.contains_key(&next) {
            next += 1;
        }
        claimed.insert(next, name);
        ids.insert(name, SystemId(next));
        next += 1;
    }

    ids
}

fn resolve_targets(
    declaration: &SystemDeclaration,
    field: DeclarationField,
    targets: &[String],
    by_name: &BTreeMap<String, SystemId>,
    diagnostics: &mut Vec<DeclarationError>,
) -> BTreeSet<SystemId> {
    let mut resolved = BTreeSet::new();
    for target in targets {
        match by_name.get(target) {
            Some(&id) => {
                resolved.insert(id);
            }
            None => diagnostics.push(DeclarationError::UnresolvedOrderingTarget {
                system: declaration.name.clone(),
                field,
                target: target.clone(),
            }),
        }
    }
    resolved
}
