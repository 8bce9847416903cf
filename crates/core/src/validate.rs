//! Static validation of a scenario configuration.
//!
//! Every check appends structured [`CheckError`]s to one list; nothing
//! stops at the first failure. The single exception: a component whose
//! chains are cyclic skips the parameter-uniqueness walk, because a cyclic
//! chain cannot be safely flattened.

use crate::catalog::{find_step, find_step_by_full_name, StepCatalog, StepKind};
use crate::chain::{build_chain, ChosenSteps};
use crate::error::{CheckError, CheckErrorKind};
use crate::slots::{SlotAddress, StoreSet};
use std::collections::{BTreeMap, BTreeSet};

/// Whether the attached components form a static scenario.
pub fn is_static_scenario(catalog: &dyn StepCatalog) -> bool {
    catalog.components().iter().any(|c| c.static_scenario)
}

/// Run every check for a scenario configuration. Dynamic-mode checks are
/// skipped when a static component is attached (static scenarios carry no
/// chosen-step lists).
pub fn check_scenario(
    catalog: &dyn StepCatalog,
    chosen: &ChosenSteps,
    stores: &StoreSet,
) -> Vec<CheckError> {
    let mut errors = check_components(catalog);
    if !catalog.components().is_empty() && !is_static_scenario(catalog) {
        errors.extend(check_chosen_steps(catalog, chosen, stores));
    }
    errors
}

/// Component-level checks: the attachment set, then every component's
/// declarations.
pub fn check_components(catalog: &dyn StepCatalog) -> Vec<CheckError> {
    let mut errors = Vec::new();

    let components = catalog.components();
    if components.is_empty() {
        errors.push(CheckError::new(
            CheckErrorKind::MissingComponents,
            None,
            None,
            "Please, add your step components.",
        ));
        return errors;
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for component in components {
        if !seen.insert(&component.type_name) {
            errors.push(CheckError::new(
                CheckErrorKind::DuplicateComponent,
                Some(&component.type_name),
                None,
                format!("The component {} is duplicated.", component.type_name),
            ));
        }
    }

    let static_count = components.iter().filter(|c| c.static_scenario).count();
    if static_count > 1 {
        errors.push(CheckError::new(
            CheckErrorKind::DuplicateStaticComponent,
            None,
            None,
            "There is more than one static component. Only one is allowed.",
        ));
    }

    for component in components {
        errors.extend(check_component(catalog, &component.type_name, component.static_scenario));
    }
    errors
}

fn check_component(catalog: &dyn StepCatalog, component: &str, is_static: bool) -> Vec<CheckError> {
    let mut errors = Vec::new();
    let steps = catalog.list_steps(component);

    // Duplicate step names.
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for step in &steps {
        if !names.insert(&step.method) {
            errors.push(CheckError::new(
                CheckErrorKind::DuplicateStepName,
                Some(component),
                Some(&step.method),
                format!(
                    "There is more than one step with the name {}.{}. Step names must be unique per component.",
                    component, step.method
                ),
            ));
        }
    }

    // Each kind must be represented.
    for kind in StepKind::ALL {
        if !steps.iter().any(|s| s.kind == kind) {
            errors.push(CheckError::new(
                CheckErrorKind::MissingStepKind,
                Some(component),
                None,
                format!("The component {} has no {} steps.", component, kind.label()),
            ));
        }
    }

    for step in &steps {
        if !catalog.conforms(step) {
            errors.push(CheckError::new(
                CheckErrorKind::NonConformingStep,
                Some(component),
                Some(&step.method),
                format!(
                    "The step {} does not return a step outcome.",
                    step.full_name()
                ),
            ));
        }

        // Prerequisite targets and succession orders.
        let declarations = catalog.list_prerequisites(step);
        let mut orders: BTreeMap<u32, usize> = BTreeMap::new();
        let mut max_order = 0;
        for decl in &declarations {
            if decl.method.is_empty() {
                continue;
            }
            if find_step(catalog, component, &decl.method).is_none() {
                if catalog.has_method(component, &decl.method) {
                    errors.push(CheckError::new(
                        CheckErrorKind::PrerequisiteNotAStep,
                        Some(component),
                        Some(&step.method),
                        format!(
                            "The method {}.{} referenced by a call_before declaration on {} is not a step.",
                            component,
                            decl.method,
                            step.full_name()
                        ),
                    ));
                } else {
                    errors.push(CheckError::new(
                        CheckErrorKind::DanglingPrerequisite,
                        Some(component),
                        Some(&step.method),
                        format!(
                            "Step {}.{} not found. It is referenced in a call_before declaration on the step {}.",
                            component,
                            decl.method,
                            step.full_name()
                        ),
                    ));
                }
            }

            if decl.succession_order == 0 {
                errors.push(CheckError::new(
                    CheckErrorKind::InvalidSuccessionOrder,
                    Some(component),
                    Some(&step.method),
                    format!(
                        "The step {} has an invalid call_before succession order: 0. It must be > 0.",
                        step.full_name()
                    ),
                ));
            }
            max_order = max_order.max(decl.succession_order);
            let count = orders.entry(decl.succession_order).or_insert(0);
            *count += 1;
            if *count == 2 {
                errors.push(CheckError::new(
                    CheckErrorKind::DuplicateSuccessionOrder,
                    Some(component),
                    Some(&step.method),
                    format!(
                        "The step {} has a duplicated call_before succession order: {}.",
                        step.full_name(),
                        decl.succession_order
                    ),
                ));
            }
        }
        for expected in 1..=max_order {
            if !orders.contains_key(&expected) {
                errors.push(CheckError::new(
                    CheckErrorKind::MissingSuccessionOrder,
                    Some(component),
                    Some(&step.method),
                    format!(
                        "The step {} has a missing call_before succession order: {}.",
                        step.full_name(),
                        expected
                    ),
                ));
            }
        }

        if is_static {
            if !step.parameters.is_empty() {
                errors.push(CheckError::new(
                    CheckErrorKind::StaticStepWithParameters,
                    Some(component),
                    Some(&step.method),
                    format!(
                        "The step {} is not allowed to have parameters in a static scenario.",
                        step.full_name()
                    ),
                ));
            }
            if step.execution_order == 0 {
                errors.push(CheckError::new(
                    CheckErrorKind::MissingExecutionOrder,
                    Some(component),
                    Some(&step.method),
                    format!("The step {} has no execution order.", step.full_name()),
                ));
            }
        }
    }

    if is_static {
        errors.extend(check_static_execution_orders(component, &steps));
    }

    // Recursion, then parameter uniqueness (skipped on cyclic chains).
    let mut recursive = false;
    for step in &steps {
        if let Err(err) = build_chain(catalog, step, 1) {
            if err.kind == CheckErrorKind::RecursiveChain {
                recursive = true;
                errors.push(err);
            }
            // Dangling prerequisites inside the chain were already
            // reported by the declaration checks above.
        }
    }
    if !recursive {
        errors.extend(check_parameter_uniqueness(catalog, component));
    }

    errors
}

fn check_static_execution_orders(
    component: &str,
    steps: &[crate::catalog::StepDescriptor],
) -> Vec<CheckError> {
    let mut errors = Vec::new();
    for kind in StepKind::ALL {
        let mut orders: BTreeMap<u32, usize> = BTreeMap::new();
        let mut max_order = 0;
        for step in steps.iter().filter(|s| s.kind == kind) {
            if step.execution_order == 0 {
                continue;
            }
            max_order = max_order.max(step.execution_order);
            let count = orders.entry(step.execution_order).or_insert(0);
            *count += 1;
            if *count == 2 {
                errors.push(CheckError::new(
                    CheckErrorKind::DuplicateExecutionOrder,
                    Some(component),
                    Some(&step.method),
                    format!(
                        "The component {} has a duplicated {} execution order: {}.",
                        component,
                        kind.label(),
                        step.execution_order
                    ),
                ));
            }
        }
        for expected in 1..=max_order {
            if !orders.contains_key(&expected) {
                errors.push(CheckError::new(
                    CheckErrorKind::MissingExecutionOrder,
                    Some(component),
                    None,
                    format!(
                        "The component {} has a missing {} execution order: {}.",
                        component,
                        kind.label(),
                        expected
                    ),
                ));
            }
        }
    }
    errors
}

/// Within one root step's chain, two nodes that are not in an
/// ancestor/descendant relationship must not share the
/// `(owner.method, full_id)` key when they carry parameters: the key is
/// what addresses their slots, and a collision would make two logically
/// distinct parameter occurrences indistinguishable.
fn check_parameter_uniqueness(catalog: &dyn StepCatalog, component: &str) -> Vec<CheckError> {
    let mut errors = Vec::new();
    for step in catalog.list_steps(component) {
        let Ok(nodes) = build_chain(catalog, &step, 1) else {
            continue;
        };
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for node in &nodes {
            if node.params.is_empty() {
                continue;
            }
            let key = format!("{}.{}", node.step.full_name(), node.full_id);
            if !seen.insert(key.clone()) {
                errors.push(CheckError::new(
                    CheckErrorKind::ParameterCollision,
                    Some(component),
                    Some(&step.method),
                    format!(
                        "The call_before chains declared for the step {} have a non unique identification for the parameters of the step identified by the key \"{}\". Please, use the id property of the call_before declarations to make them unique.",
                        step.full_name(),
                        key
                    ),
                ));
            }
        }
    }
    errors
}

fn check_chosen_steps(
    catalog: &dyn StepCatalog,
    chosen: &ChosenSteps,
    stores: &StoreSet,
) -> Vec<CheckError> {
    let mut errors = Vec::new();
    for kind in StepKind::ALL {
        for (position, chosen_step) in chosen.for_kind(kind).iter().enumerate() {
            let position = position + 1;
            if chosen_step.full_name.is_empty() {
                errors.push(CheckError::new(
                    CheckErrorKind::BlankChosenStep,
                    None,
                    None,
                    format!(
                        "Incomplete settings detected on {} steps at position {}.",
                        kind.label(),
                        position
                    ),
                ));
                continue;
            }

            let owner = chosen_step
                .full_name
                .split_once('.')
                .map(|(owner, _)| owner)
                .unwrap_or(chosen_step.full_name.as_str());
            if !catalog.components().iter().any(|c| c.type_name == owner) {
                errors.push(CheckError::new(
                    CheckErrorKind::ChosenComponentNotFound,
                    None,
                    None,
                    format!(
                        "The component for the step {} is not found in {} steps at position {}.",
                        chosen_step.full_name,
                        kind.label(),
                        position
                    ),
                ));
            }

            match find_step_by_full_name(catalog, &chosen_step.full_name) {
                Some(step) if step.kind == kind => {}
                _ => {
                    errors.push(CheckError::new(
                        CheckErrorKind::ChosenStepNotFound,
                        None,
                        None,
                        format!(
                            "Step {} not found on {} steps at position {}.",
                            chosen_step.full_name,
                            kind.label(),
                            position
                        ),
                    ));
                }
            }

            errors.extend(check_parameters_index(
                catalog,
                stores,
                &chosen_step.parameters_index,
                kind,
                position,
            ));
        }
    }
    errors
}

/// Check every entry of a persisted parameters-index string against the
/// catalog (parameter exists, type matches) and the stores (array present
/// and not reset).
fn check_parameters_index(
    catalog: &dyn StepCatalog,
    stores: &StoreSet,
    parameters_index: &str,
    kind: StepKind,
    position: usize,
) -> Vec<CheckError> {
    let mut errors = Vec::new();
    for entry in SlotAddress::split_entries(parameters_index) {
        let address = match SlotAddress::decode(entry) {
            Ok(address) => address,
            Err(err) => {
                errors.push(CheckError::new(
                    CheckErrorKind::StorageFieldNotFound,
                    None,
                    None,
                    format!(
                        "{} in {} steps at position {}.",
                        err,
                        kind.label(),
                        position
                    ),
                ));
                continue;
            }
        };

        match find_step(catalog, &address.owner, &address.method) {
            None => {
                errors.push(CheckError::new(
                    CheckErrorKind::ParameterNotFound,
                    Some(&address.owner),
                    Some(&address.method),
                    format!(
                        "The parameter {} is not found in {} steps at position {}.",
                        address.parameter_full_name(),
                        kind.label(),
                        position
                    ),
                ));
                continue;
            }
            Some(step) => {
                match step.parameters.iter().find(|p| p.name == address.param) {
                    None => {
                        errors.push(CheckError::new(
                            CheckErrorKind::ParameterNotFound,
                            Some(&address.owner),
                            Some(&address.method),
                            format!(
                                "The parameter {} is not found in {} steps at position {}.",
                                address.parameter_full_name(),
                                kind.label(),
                                position
                            ),
                        ));
                        continue;
                    }
                    Some(descriptor) if descriptor.ty != address.ty => {
                        errors.push(CheckError::new(
                            CheckErrorKind::ParameterTypeMismatch,
                            Some(&address.owner),
                            Some(&address.method),
                            format!(
                                "The parameter {} has a wrong type in {} steps at position {}.\n Previous type: {}\n Current type: {}",
                                address.parameter_full_name(),
                                kind.label(),
                                position,
                                address.ty.type_name(),
                                descriptor.ty.type_name()
                            ),
                        ));
                        continue;
                    }
                    Some(_) => {}
                }
            }
        }

        let store_is_reset = stores
            .store(&address.owner)
            .map(|store| store.is_empty(address.ty))
            .unwrap_or(true);
        if store_is_reset {
            errors.push(CheckError::new(
                CheckErrorKind::StorageReset,
                Some(&address.owner),
                Some(&address.method),
                format!(
                    "The component {} seems to have been reset, so some parameter values are lost. Please, undo the reset operation or rebuild the settings to confirm the reset.",
                    address.owner
                ),
            ));
        }
    }
    errors
}

#[cfg(test)]
mod tests;
