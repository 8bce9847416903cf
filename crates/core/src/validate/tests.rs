use super::*;
use crate::catalog::{
    Outcome, ParameterDescriptor, ParameterType, PrerequisiteDeclaration, StepDescriptor,
    DEFAULT_TIMEOUT_MS,
};
use crate::chain::ChosenStep;
use crate::registry::Registry;

fn descriptor(owner: &str, method: &str, kind: StepKind) -> StepDescriptor {
    StepDescriptor {
        owner: owner.to_owned(),
        method: method.to_owned(),
        kind,
        sentence: method.replace('_', " "),
        parameters: vec![],
        execution_order: 0,
        delay_ms: 0,
        timeout_ms: DEFAULT_TIMEOUT_MS,
    }
}

fn prereq(order: u32, method: &str) -> PrerequisiteDeclaration {
    PrerequisiteDeclaration {
        method: method.to_owned(),
        succession_order: order,
        delay_ms: 0,
        timeout_ms: DEFAULT_TIMEOUT_MS,
        id: String::new(),
    }
}

fn ok_handler() -> Option<crate::registry::StepHandler> {
    Some(Box::new(|_| Some(Outcome::Success)))
}

/// One component with a valid step of every kind.
fn valid_registry() -> Registry {
    let mut registry = Registry::new();
    registry.add_component("ButtonSteps", false);
    for (method, kind) in [
        ("button_exists", StepKind::Given),
        ("press_button", StepKind::When),
        ("menu_opens", StepKind::Then),
    ] {
        registry
            .register_step(descriptor("ButtonSteps", method, kind), vec![], ok_handler())
            .unwrap();
    }
    registry
}

fn kinds(errors: &[CheckError]) -> Vec<CheckErrorKind> {
    errors.iter().map(|e| e.kind).collect()
}

// ── component checks ──

#[test]
fn valid_components_produce_no_errors() {
    assert!(check_components(&valid_registry()).is_empty());
}

#[test]
fn no_components_is_a_single_error() {
    let registry = Registry::new();
    let errors = check_components(&registry);
    assert_eq!(kinds(&errors), [CheckErrorKind::MissingComponents]);
}

#[test]
fn duplicate_components_are_reported() {
    let mut registry = valid_registry();
    registry.add_component("ButtonSteps", false);
    let errors = check_components(&registry);
    assert!(kinds(&errors).contains(&CheckErrorKind::DuplicateComponent));
}

#[test]
fn more_than_one_static_component_is_reported() {
    let mut registry = Registry::new();
    registry.add_component("FirstStatic", true);
    registry.add_component("SecondStatic", true);
    let errors = check_components(&registry);
    assert!(kinds(&errors).contains(&CheckErrorKind::DuplicateStaticComponent));
}

#[test]
fn missing_step_kinds_are_reported_per_component() {
    let mut registry = Registry::new();
    registry.add_component("HalfSteps", false);
    registry
        .register_step(
            descriptor("HalfSteps", "something", StepKind::Given),
            vec![],
            ok_handler(),
        )
        .unwrap();
    let errors = check_components(&registry);
    let missing: Vec<&CheckError> = errors
        .iter()
        .filter(|e| e.kind == CheckErrorKind::MissingStepKind)
        .collect();
    assert_eq!(missing.len(), 2);
    assert!(missing[0].message.contains("no When steps"));
    assert!(missing[1].message.contains("no Then steps"));
}

#[test]
fn duplicate_step_names_are_reported() {
    let mut registry = valid_registry();
    registry
        .register_step(
            descriptor("ButtonSteps", "press_button", StepKind::When),
            vec![],
            ok_handler(),
        )
        .unwrap();
    let errors = check_components(&registry);
    assert!(kinds(&errors).contains(&CheckErrorKind::DuplicateStepName));
}

#[test]
fn non_conforming_steps_are_reported() {
    let mut registry = valid_registry();
    registry
        .register_step(
            descriptor("ButtonSteps", "broken_step", StepKind::Given),
            vec![],
            None,
        )
        .unwrap();
    let errors = check_components(&registry);
    assert_eq!(kinds(&errors), [CheckErrorKind::NonConformingStep]);
    assert!(errors[0]
        .message
        .contains("ButtonSteps.broken_step does not return a step outcome"));
}

// ── prerequisite declarations ──

#[test]
fn dangling_and_plain_method_targets_are_distinguished() {
    let mut registry = valid_registry();
    registry.register_plain_method("ButtonSteps", "helper").unwrap();
    registry
        .register_step(
            descriptor("ButtonSteps", "with_bad_targets", StepKind::Given),
            vec![prereq(1, "missing"), prereq(2, "helper")],
            ok_handler(),
        )
        .unwrap();
    let errors = check_components(&registry);
    assert!(kinds(&errors).contains(&CheckErrorKind::DanglingPrerequisite));
    assert!(kinds(&errors).contains(&CheckErrorKind::PrerequisiteNotAStep));
}

#[test]
fn succession_orders_must_be_positive_unique_and_contiguous() {
    let mut registry = valid_registry();
    registry
        .register_step(
            descriptor("ButtonSteps", "bad_orders", StepKind::Given),
            vec![
                prereq(0, "button_exists"),
                prereq(2, "press_button"),
                prereq(2, "menu_opens"),
            ],
            ok_handler(),
        )
        .unwrap();
    let errors = check_components(&registry);
    let listed = kinds(&errors);
    assert!(listed.contains(&CheckErrorKind::InvalidSuccessionOrder));
    assert!(listed.contains(&CheckErrorKind::DuplicateSuccessionOrder));
    // Order 1 never appears.
    assert!(listed.contains(&CheckErrorKind::MissingSuccessionOrder));
}

// ── recursion and parameter uniqueness ──

#[test]
fn recursive_chains_skip_the_uniqueness_check() {
    let mut registry = Registry::new();
    registry.add_component("LoopSteps", false);
    let with_param = |mut step: StepDescriptor| {
        step.parameters.push(ParameterDescriptor {
            name: "value".to_owned(),
            ty: ParameterType::Int,
        });
        step
    };
    registry
        .register_step(
            with_param(descriptor("LoopSteps", "first", StepKind::Given)),
            vec![prereq(1, "second")],
            ok_handler(),
        )
        .unwrap();
    registry
        .register_step(
            with_param(descriptor("LoopSteps", "second", StepKind::Given)),
            vec![prereq(1, "first")],
            ok_handler(),
        )
        .unwrap();
    registry
        .register_step(descriptor("LoopSteps", "whatever", StepKind::When), vec![], ok_handler())
        .unwrap();
    registry
        .register_step(descriptor("LoopSteps", "observed", StepKind::Then), vec![], ok_handler())
        .unwrap();

    let errors = check_components(&registry);
    let listed = kinds(&errors);
    assert!(listed.contains(&CheckErrorKind::RecursiveChain));
    assert!(!listed.contains(&CheckErrorKind::ParameterCollision));
}

#[test]
fn parameter_collisions_need_an_id() {
    let mut registry = Registry::new();
    registry.add_component("CubeSteps", false);
    let mut named = descriptor("CubeSteps", "a_cube_named", StepKind::Given);
    named.parameters.push(ParameterDescriptor {
        name: "name".to_owned(),
        ty: ParameterType::Str,
    });
    registry.register_step(named, vec![], ok_handler()).unwrap();
    registry
        .register_step(
            descriptor("CubeSteps", "a_pair", StepKind::Given),
            vec![prereq(1, "a_cube_named"), prereq(2, "a_cube_named")],
            ok_handler(),
        )
        .unwrap();
    registry
        .register_step(descriptor("CubeSteps", "collide", StepKind::When), vec![], ok_handler())
        .unwrap();
    registry
        .register_step(descriptor("CubeSteps", "observed", StepKind::Then), vec![], ok_handler())
        .unwrap();

    let errors = check_components(&registry);
    let collisions: Vec<&CheckError> = errors
        .iter()
        .filter(|e| e.kind == CheckErrorKind::ParameterCollision)
        .collect();
    assert_eq!(collisions.len(), 1);
    assert!(collisions[0]
        .message
        .contains("\"CubeSteps.a_cube_named.\""));
    assert!(collisions[0].message.contains("id property"));
}

// ── static components ──

#[test]
fn static_execution_orders_are_checked_per_kind() {
    let mut registry = Registry::new();
    registry.add_component("StartupSteps", true);
    let mut first = descriptor("StartupSteps", "disk_mounted", StepKind::Given);
    first.execution_order = 1;
    let mut dup = descriptor("StartupSteps", "config_loaded", StepKind::Given);
    dup.execution_order = 1;
    let mut gap = descriptor("StartupSteps", "cache_warm", StepKind::Given);
    gap.execution_order = 3;
    let mut when = descriptor("StartupSteps", "service_starts", StepKind::When);
    when.execution_order = 1;
    let mut then = descriptor("StartupSteps", "port_open", StepKind::Then);
    then.execution_order = 1;
    for step in [first, dup, gap, when, then] {
        registry.register_step(step, vec![], ok_handler()).unwrap();
    }

    let errors = check_components(&registry);
    let listed = kinds(&errors);
    assert!(listed.contains(&CheckErrorKind::DuplicateExecutionOrder));
    assert!(listed.contains(&CheckErrorKind::MissingExecutionOrder));
}

#[test]
fn static_steps_may_not_declare_parameters() {
    let mut registry = Registry::new();
    registry.add_component("StartupSteps", true);
    let mut given = descriptor("StartupSteps", "disk_mounted", StepKind::Given);
    given.execution_order = 1;
    given.parameters.push(ParameterDescriptor {
        name: "path".to_owned(),
        ty: ParameterType::Str,
    });
    let mut when = descriptor("StartupSteps", "service_starts", StepKind::When);
    when.execution_order = 1;
    let mut then = descriptor("StartupSteps", "port_open", StepKind::Then);
    then.execution_order = 1;
    for step in [given, when, then] {
        registry.register_step(step, vec![], ok_handler()).unwrap();
    }
    let errors = check_components(&registry);
    assert!(kinds(&errors).contains(&CheckErrorKind::StaticStepWithParameters));
}

// ── chosen steps ──

#[test]
fn blank_chosen_steps_are_reported_with_their_position() {
    let registry = valid_registry();
    let chosen = ChosenSteps {
        given: vec![
            ChosenStep {
                full_name: "ButtonSteps.button_exists".to_owned(),
                parameters_index: String::new(),
            },
            ChosenStep::default(),
        ],
        when: vec![],
        then: vec![],
    };
    let errors = check_scenario(&registry, &chosen, &StoreSet::new());
    let blanks: Vec<&CheckError> = errors
        .iter()
        .filter(|e| e.kind == CheckErrorKind::BlankChosenStep)
        .collect();
    assert_eq!(blanks.len(), 1);
    assert!(blanks[0]
        .message
        .contains("Given steps at position 2"));
}

#[test]
fn unknown_chosen_steps_and_components_are_reported() {
    let registry = valid_registry();
    let chosen = ChosenSteps {
        given: vec![ChosenStep {
            full_name: "GhostSteps.boo".to_owned(),
            parameters_index: String::new(),
        }],
        when: vec![ChosenStep {
            // Known component, wrong kind.
            full_name: "ButtonSteps.button_exists".to_owned(),
            parameters_index: String::new(),
        }],
        then: vec![],
    };
    let errors = check_scenario(&registry, &chosen, &StoreSet::new());
    let listed = kinds(&errors);
    assert!(listed.contains(&CheckErrorKind::ChosenComponentNotFound));
    assert_eq!(
        listed
            .iter()
            .filter(|k| **k == CheckErrorKind::ChosenStepNotFound)
            .count(),
        2
    );
}

#[test]
fn parameter_index_entries_are_matched_against_the_catalog() {
    let mut registry = valid_registry();
    let mut named = descriptor("ButtonSteps", "press_button_times", StepKind::When);
    named.parameters.push(ParameterDescriptor {
        name: "count".to_owned(),
        ty: ParameterType::Int,
    });
    registry.register_step(named, vec![], ok_handler()).unwrap();

    let mut stores = StoreSet::new();
    stores.store_mut("ButtonSteps").int_storage.push(3);

    let ok_entry = ";int,ButtonSteps.press_button_times.count.,int_storage.Array.data[0]";
    let missing_param = ";int,ButtonSteps.press_button_times.repeat.,int_storage.Array.data[0]";
    let wrong_type = ";string,ButtonSteps.press_button_times.count.,string_storage.Array.data[0]";

    let chosen_with = |index: &str| ChosenSteps {
        given: vec![],
        when: vec![ChosenStep {
            full_name: "ButtonSteps.press_button_times".to_owned(),
            parameters_index: index.to_owned(),
        }],
        then: vec![],
    };

    assert!(check_scenario(&registry, &chosen_with(ok_entry), &stores).is_empty());

    let errors = check_scenario(&registry, &chosen_with(missing_param), &stores);
    assert_eq!(kinds(&errors), [CheckErrorKind::ParameterNotFound]);

    let errors = check_scenario(&registry, &chosen_with(wrong_type), &stores);
    assert_eq!(kinds(&errors), [CheckErrorKind::ParameterTypeMismatch]);
    assert!(errors[0].message.contains("Previous type: string"));
    assert!(errors[0].message.contains("Current type: int"));
}

#[test]
fn a_reset_store_is_reported_for_referenced_parameters() {
    let mut registry = valid_registry();
    let mut named = descriptor("ButtonSteps", "press_button_times", StepKind::When);
    named.parameters.push(ParameterDescriptor {
        name: "count".to_owned(),
        ty: ParameterType::Int,
    });
    registry.register_step(named, vec![], ok_handler()).unwrap();

    let chosen = ChosenSteps {
        given: vec![],
        when: vec![ChosenStep {
            full_name: "ButtonSteps.press_button_times".to_owned(),
            parameters_index: ";int,ButtonSteps.press_button_times.count.,int_storage.Array.data[0]"
                .to_owned(),
        }],
        then: vec![],
    };
    let errors = check_scenario(&registry, &chosen, &StoreSet::new());
    assert_eq!(kinds(&errors), [CheckErrorKind::StorageReset]);
    assert!(errors[0].message.contains("seems to have been reset"));
}

#[test]
fn chosen_step_checks_are_skipped_for_static_scenarios() {
    let mut registry = Registry::new();
    registry.add_component("StartupSteps", true);
    for (method, kind) in [
        ("disk_mounted", StepKind::Given),
        ("service_starts", StepKind::When),
        ("port_open", StepKind::Then),
    ] {
        let mut step = descriptor("StartupSteps", method, kind);
        step.execution_order = 1;
        registry.register_step(step, vec![], ok_handler()).unwrap();
    }
    // Stale chosen lists from a previous dynamic configuration are ignored.
    let chosen = ChosenSteps {
        given: vec![ChosenStep::default()],
        when: vec![],
        then: vec![],
    };
    assert!(check_scenario(&registry, &chosen, &StoreSet::new()).is_empty());
}
