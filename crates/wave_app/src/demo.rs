//! Demo components and system bodies.
//!
//! Declarations can come from a file, but bodies are code: each declared
//! system is bound by name to one of the bodies below.

use tracing::trace;
use wave_component::{Component, ComponentRegistry, RegistryError};
use wave_schedule::{DeclarationFile, SystemDeclaration, SystemRegistry, per_batch, per_entity};
use wave_world::{World, WorldError};

/// Fixed simulation step, in seconds.
pub const DT: f32 = 1.0 / 60.0;

const GRAVITY: f32 = -9.81;

/// World-space location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Units per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// Fraction of velocity lost per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Friction(pub f32);

/// Ticks lived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Age(pub u64);

/// Excluded from physics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frozen;

macro_rules! component {
    ($($ty:ident),* $(,)?) => {
        $(impl Component for $ty {
            fn type_name() -> &'static str {
                stringify!($ty)
            }
        })*
    };
}

component!(Position, Velocity, Friction, Age, Frozen);

/// Bind the demo Rust types to their names, registering missing names.
///
/// # Errors
///
/// Fails if a name is already bound to another Rust type.
pub fn register_components(registry: &mut ComponentRegistry) -> Result<(), RegistryError> {
    registry.register::<Position>()?;
    registry.register::<Velocity>()?;
    registry.register::<Friction>()?;
    registry.register::<Age>()?;
    registry.register::<Frozen>()?;
    Ok(())
}

/// The built-in declaration set, used when no file is given.
#[must_use]
pub fn default_declarations() -> DeclarationFile {
    DeclarationFile {
        resources: ["Position", "Velocity", "Friction", "Age", "Frozen"]
            .map(String::from)
            .to_vec(),
        systems: vec![
            SystemDeclaration::new("Gravity").write("Velocity").without("Frozen"),
            SystemDeclaration::new("Drag")
                .write("Velocity")
                .read("Friction")
                .after("Gravity"),
            SystemDeclaration::new("Move")
                .write("Position")
                .read("Velocity")
                .without("Frozen")
                .after("Drag"),
            SystemDeclaration::new("Age").write("Age"),
            SystemDeclaration::new("Render").read("Position").read("Age"),
        ],
    }
}

/// Register `declaration` with the demo body of the same name.
///
/// Returns `false`, registering nothing, if no body has that name.
pub fn bind(registry: &mut SystemRegistry, declaration: SystemDeclaration) -> bool {
    let name = declaration.name.clone();
    match name.as_str() {
        "Gravity" => registry.register(
            declaration,
            per_batch(|view| {
                for v in view.write::<Velocity>()? {
                    v.y += GRAVITY * DT;
                }
                Ok(())
            }),
        ),
        "Drag" => registry.register(
            declaration,
            per_entity(|unit| {
                let keep = 1.0 - unit.read::<Friction>()?.0.clamp(0.0, 1.0);
                let v = unit.write::<Velocity>()?;
                v.x *= keep;
                v.y *= keep;
                Ok(())
            }),
        ),
        "Move" => registry.register(
            declaration,
            per_batch(|view| {
                let velocities = view.read::<Velocity>()?;
                for (p, v) in view.write::<Position>()?.iter_mut().zip(velocities) {
                    p.x += v.x * DT;
                    p.y += v.y * DT;
                }
                Ok(())
            }),
        ),
        "Age" => registry.register(
            declaration,
            per_entity(|unit| {
                unit.write::<Age>()?.0 += 1;
                Ok(())
            }),
        ),
        "Render" => registry.register(
            declaration,
            per_batch(|view| {
                let positions = view.read::<Position>()?;
                let oldest = view.read::<Age>()?.iter().map(|a| a.0).max().unwrap_or(0);
                let n = positions.len().max(1) as f32;
                let (sx, sy) = positions
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
                trace!(units = positions.len(), cx = sx / n, cy = sy / n, oldest, "render batch");
                Ok(())
            }),
        ),
        _ => return false,
    };
    true
}

/// Spawn `count` entities spread over a few archetypes.
///
/// # Errors
///
/// Fails if the world's registry lacks the demo components.
pub fn populate(world: &mut World, count: usize) -> Result<(), WorldError> {
    for i in 0..count {
        let x = (i % 100) as f32;
        let y = (i / 100) as f32;
        let builder = world
            .spawn()
            .with(Position { x, y })
            .with(Velocity { x: 1.0, y: 0.0 })
            .with(Age(0));
        let builder = match i % 10 {
            0 => builder.with(Frozen),
            1..=3 => builder.with(Friction(0.05)),
            _ => builder,
        };
        builder.build()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wave_schedule::build_schedule;

    use super::*;

    fn components() -> Arc<ComponentRegistry> {
        let file = default_declarations();
        let mut components = file.component_registry().unwrap();
        register_components(&mut components).unwrap();
        Arc::new(components)
    }

    #[test]
    fn test_default_wave_table() {
        let file = default_declarations();
        let plan = build_schedule(&file.systems, &components()).unwrap();
        assert_eq!(
            plan.to_string(),
            "wave 0: Age, Gravity\nwave 1: Drag, Render\nwave 2: Move\n"
        );
        assert!(plan.diagnostics().is_empty());
    }

    #[test]
    fn test_bundled_asset_matches_defaults() {
        let file = DeclarationFile::from_json(include_str!("../assets/demo.json")).unwrap();
        assert_eq!(file, default_declarations());
    }

    #[test]
    fn test_every_default_system_has_a_body() {
        let mut registry = SystemRegistry::new();
        for declaration in default_declarations().systems {
            assert!(bind(&mut registry, declaration));
        }
        assert!(!bind(&mut registry, SystemDeclaration::new("Teleport").read("Position")));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_one_tick_moves_unfrozen_entities() {
        let components = components();
        let mut world = World::new(Arc::clone(&components)).with_batch_size(16);
        populate(&mut world, 40).unwrap();
        assert_eq!(world.archetype_count(), 3);

        let mut registry = SystemRegistry::new();
        for declaration in default_declarations().systems {
            bind(&mut registry, declaration);
        }
        let plan = registry.build(components).unwrap();
        plan.builder().enable_all().build().run_parallel(&mut world).unwrap();

        for table in world.archetypes() {
            for &entity in table.entities() {
                let age = world.get::<Age>(entity).unwrap();
                assert_eq!(age.0, 1);
                let position = world.get::<Position>(entity).unwrap();
                if world.get::<Frozen>(entity).is_ok() {
                    assert_eq!(position.x, (entity.index() % 100) as f32);
                } else {
                    assert!(position.x > (entity.index() % 100) as f32);
                }
            }
        }
    }
}
