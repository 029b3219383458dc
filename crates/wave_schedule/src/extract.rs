//! Access descriptor extraction.
//!
//! Turns the name-based parameters and filters of a [`SystemDeclaration`] into
//! a [`ComponentAccess`] over registered component ids. This is a pure
//! transform: a declaration either yields one access record or a list of
//! everything wrong with it.

use wave_component::{ComponentAccess, ComponentRegistry, ComponentTypeId};

use crate::declaration::{AccessMode, SystemDeclaration};
use crate::error::{DeclarationError, DeclarationField};

/// Build the access record for `declaration`.
///
/// A read-write parameter lands in `read` and `write`, a read-only one in
/// `read`; both land in `all`. `with` adds to `all` only, `without` and `any`
/// fill their own sets. Declaring the same resource read and write yields
/// write access.
///
/// # Errors
///
/// Returns every problem found: no parameters, resources missing from
/// `components`, and resources that are both required and excluded.
pub fn extract_access(
    declaration: &SystemDeclaration,
    components: &ComponentRegistry,
) -> Result<ComponentAccess, Vec<DeclarationError>> {
    let system = declaration.name.as_str();
    let mut errors = Vec::new();
    let mut access = ComponentAccess::new();

    if declaration.parameters.is_empty() {
        errors.push(DeclarationError::NoParameters {
            system: system.to_string(),
        });
    }

    let mut resolve = |name: &str, field: DeclarationField| -> Option<ComponentTypeId> {
        let id = components.id_by_name(name);
        if id.is_none() {
            errors.push(DeclarationError::UnknownResource {
                system: system.to_string(),
                field,
                resource: name.to_string(),
            });
        }
        id
    };

    for parameter in &declaration.parameters {
        if let Some(id) = resolve(&parameter.resource, DeclarationField::Parameters) {
            match parameter.access {
                AccessMode::Read => access.add_read(id),
                AccessMode::Write => access.add_write(id),
            }
        }
    }
    for name in &declaration.filters.with {
        if let Some(id) = resolve(name, DeclarationField::With) {
            access.all.insert(id.index());
        }
    }
    for name in &declaration.filters.without {
        if let Some(id) = resolve(name, DeclarationField::Without) {
            access.without.insert(id.index());
        }
    }
    for name in &declaration.filters.any {
        if let Some(id) = resolve(name, DeclarationField::Any) {
            access.any.insert(id.index());
        }
    }

    for bit in access.all.intersection(&access.without).iter() {
        let resource = components
            .name_of(ComponentTypeId(bit as u32))
            .unwrap_or_default()
            .to_string();
        errors.push(DeclarationError::ExcludedAndRequired {
            system: system.to_string(),
            resource,
        });
    }

    if errors.is_empty() {
        debug_assert!(access.is_well_formed());
        Ok(access)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::from_names(["Position", "Velocity", "Frozen", "Player", "Npc"]).unwrap()
    }

    fn id(registry: &ComponentRegistry, name: &str) -> usize {
        registry.id_by_name(name).unwrap().index()
    }

    #[test]
    fn test_read_and_write_parameters() {
        let components = registry();
        let decl = SystemDeclaration::new("Move").write("Position").read("Velocity");
        let access = extract_access(&decl, &components).unwrap();

        let position = id(&components, "Position");
        let velocity = id(&components, "Velocity");
        assert!(access.write.contains(position));
        assert!(access.read.contains(position));
        assert!(access.read.contains(velocity));
        assert!(!access.write.contains(velocity));
        assert_eq!(access.all.len(), 2);
        assert!(access.is_well_formed());
    }

    #[test]
    fn test_read_then_write_same_resource_is_write() {
        let components = registry();
        let decl = SystemDeclaration::new("A").read("Position").write("Position");
        let access = extract_access(&decl, &components).unwrap();
        assert!(access.write.contains(id(&components, "Position")));
        assert_eq!(access.read.len(), 1);
    }

    #[test]
    fn test_filters_fill_their_own_sets() {
        let components = registry();
        let decl = SystemDeclaration::new("A")
            .read("Position")
            .with("Velocity")
            .without("Frozen")
            .any("Player")
            .any("Npc");
        let access = extract_access(&decl, &components).unwrap();

        assert!(access.all.contains(id(&components, "Velocity")));
        assert!(!access.read.contains(id(&components, "Velocity")));
        assert!(access.without.contains(id(&components, "Frozen")));
        assert_eq!(access.any.len(), 2);
        assert!(!access.all.contains(id(&components, "Frozen")));
    }

    #[test]
    fn test_no_parameters_is_rejected() {
        let components = registry();
        let decl = SystemDeclaration::new("Idle").with("Position");
        let errors = extract_access(&decl, &components).unwrap_err();
        assert_eq!(
            errors,
            vec![DeclarationError::NoParameters {
                system: "Idle".to_string()
            }]
        );
    }

    #[test]
    fn test_unknown_resources_are_all_reported() {
        let components = registry();
        let decl = SystemDeclaration::new("A")
            .read("Position")
            .write("Mass")
            .without("Ghost");
        let errors = extract_access(&decl, &components).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&DeclarationError::UnknownResource {
            system: "A".to_string(),
            field: DeclarationField::Parameters,
            resource: "Mass".to_string(),
        }));
        assert!(errors.contains(&DeclarationError::UnknownResource {
            system: "A".to_string(),
            field: DeclarationField::Without,
            resource: "Ghost".to_string(),
        }));
    }

    #[test]
    fn test_only_unknown_parameters_leaves_nothing_valid() {
        let components = registry();
        let decl = SystemDeclaration::new("A").read("Mass");
        let errors = extract_access(&decl, &components).unwrap_err();
        assert!(matches!(errors[0], DeclarationError::UnknownResource { .. }));
    }

    #[test]
    fn test_required_and_excluded_is_rejected() {
        let components = registry();
        let decl = SystemDeclaration::new("A").read("Position").without("Position");
        let errors = extract_access(&decl, &components).unwrap_err();
        assert_eq!(
            errors,
            vec![DeclarationError::ExcludedAndRequired {
                system: "A".to_string(),
                resource: "Position".to_string(),
            }]
        );
    }
}
