//! JSON scenario fixtures.
//!
//! A fixture file declares components, their steps with scripted outcomes,
//! and the chosen Given/When/Then lists with literal parameter values. The
//! CLI builds a [`Registry`] from it, so a whole scenario can be described,
//! validated and executed without writing any host code.
//!
//! Scripted outcomes:
//!
//! - `"success"` -- the step succeeds on every invocation
//! - `"invalid"` -- the step yields no usable result
//! - `{"fail": "msg"}` -- the step fails with the message
//! - `{"retry": "msg"}` -- the step retries forever (until its timeout)
//! - `{"retry": "msg", "succeed_after": 3}` -- the step retries three
//!   times, then succeeds

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use stepchain_core::{
    allocate, write_slot, ChosenStep, ChosenSteps, FlattenedPlan, Outcome, ParamValue,
    ParameterDescriptor, ParameterType, PrerequisiteDeclaration, Registry, StepDescriptor,
    StepHandler, StepKind, StoreSet, DEFAULT_TIMEOUT_MS,
};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("error reading '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("error parsing JSON in '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("step {step} has an unknown scripted outcome '{value}'")]
    UnknownOutcome { step: String, value: String },

    #[error("value '{key}' on chosen step {step} does not name a parameter of its chain")]
    UnknownParameter { step: String, key: String },

    #[error("value '{key}' on chosen step {step} is not a {expected}")]
    ValueType {
        step: String,
        key: String,
        expected: &'static str,
    },

    #[error("{0}")]
    Registry(#[from] stepchain_core::RegistryError),
}

#[derive(Debug, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub components: Vec<ComponentFixture>,
    #[serde(default)]
    pub given: Vec<ChosenFixture>,
    #[serde(default)]
    pub when: Vec<ChosenFixture>,
    #[serde(default)]
    pub then: Vec<ChosenFixture>,
}

#[derive(Debug, Deserialize)]
pub struct ComponentFixture {
    pub type_name: String,
    #[serde(default)]
    pub static_scenario: bool,
    #[serde(default)]
    pub plain_methods: Vec<String>,
    #[serde(default)]
    pub steps: Vec<StepFixture>,
}

#[derive(Debug, Deserialize)]
pub struct StepFixture {
    pub method: String,
    pub kind: StepKind,
    #[serde(default)]
    pub sentence: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub execution_order: u32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub prerequisites: Vec<PrerequisiteDeclaration>,
    #[serde(default)]
    pub outcome: ScriptedOutcome,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// A chosen-step entry with literal parameter values.
///
/// Value keys address parameters anywhere in the entry's chain: a bare
/// parameter name for the chosen step itself, or
/// `method.parameter.full_id` for a prerequisite occurrence.
#[derive(Debug, Deserialize)]
pub struct ChosenFixture {
    pub step: String,
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptedOutcome {
    Simple(String),
    Fail {
        fail: String,
    },
    Retry {
        retry: String,
        #[serde(default)]
        succeed_after: Option<u32>,
    },
}

impl Default for ScriptedOutcome {
    fn default() -> Self {
        ScriptedOutcome::Simple("success".to_owned())
    }
}

impl ScriptedOutcome {
    fn handler(&self, step: &str) -> Result<Option<StepHandler>, FixtureError> {
        match self {
            ScriptedOutcome::Simple(word) => match word.as_str() {
                "success" => Ok(Some(Box::new(|_| Some(Outcome::Success)))),
                "invalid" => Ok(Some(Box::new(|_| None))),
                // A declared step whose implementation does not yield an
                // outcome; the validator flags it.
                "unimplemented" => Ok(None),
                other => Err(FixtureError::UnknownOutcome {
                    step: step.to_owned(),
                    value: other.to_owned(),
                }),
            },
            ScriptedOutcome::Fail { fail } => {
                let message = fail.clone();
                Ok(Some(Box::new(move |_| Some(Outcome::Fail(message.clone())))))
            }
            ScriptedOutcome::Retry {
                retry,
                succeed_after,
            } => {
                let message = retry.clone();
                let succeed_after = *succeed_after;
                let mut invocations = 0u32;
                Ok(Some(Box::new(move |_| {
                    invocations += 1;
                    match succeed_after {
                        Some(n) if invocations > n => Some(Outcome::Success),
                        _ => Some(Outcome::Retry(message.clone())),
                    }
                })))
            }
        }
    }
}

/// Read and parse a fixture file.
pub fn load(path: &Path) -> Result<Fixture, FixtureError> {
    let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| FixtureError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Build the registered catalog a fixture describes.
pub fn build_registry(fixture: &Fixture) -> Result<Registry, FixtureError> {
    let mut registry = Registry::new();
    for component in &fixture.components {
        registry.add_component(&component.type_name, component.static_scenario);
        for method in &component.plain_methods {
            registry.register_plain_method(&component.type_name, method)?;
        }
        for step in &component.steps {
            let descriptor = StepDescriptor {
                owner: component.type_name.clone(),
                method: step.method.clone(),
                kind: step.kind,
                sentence: step
                    .sentence
                    .clone()
                    .unwrap_or_else(|| step.method.replace('_', " ")),
                parameters: step.parameters.clone(),
                execution_order: step.execution_order,
                delay_ms: step.delay_ms,
                timeout_ms: step.timeout_ms,
            };
            let full_name = descriptor.full_name();
            registry.register_step(
                descriptor,
                step.prerequisites.clone(),
                step.outcome.handler(&full_name)?,
            )?;
        }
    }
    Ok(registry)
}

/// The chosen-step lists of a fixture. Fixture values are literal, so the
/// persisted parameters-index strings are always empty here; slots are
/// allocated fresh by [`bind_values`].
pub fn chosen_steps(fixture: &Fixture) -> ChosenSteps {
    let entry = |c: &ChosenFixture| ChosenStep {
        full_name: c.step.clone(),
        parameters_index: String::new(),
    };
    ChosenSteps {
        given: fixture.given.iter().map(entry).collect(),
        when: fixture.when.iter().map(entry).collect(),
        then: fixture.then.iter().map(entry).collect(),
    }
}

/// Allocate slots for the plan and write the fixture's literal values into
/// them. Chain roots appear in the plan in chosen-list order, so the nth
/// root pairs with the nth chosen entry.
pub fn bind_values(
    plan: &mut FlattenedPlan,
    stores: &mut StoreSet,
    fixture: &Fixture,
) -> Result<(), FixtureError> {
    allocate(plan, stores);

    let entries: Vec<&ChosenFixture> = fixture
        .given
        .iter()
        .chain(fixture.when.iter())
        .chain(fixture.then.iter())
        .collect();
    let roots: Vec<usize> = (0..plan.len()).filter(|&i| plan.nodes[i].is_root()).collect();

    for (entry_index, &root) in roots.iter().enumerate() {
        let Some(entry) = entries.get(entry_index) else {
            break; // static scenario: no chosen entries, no values
        };
        for (key, value) in &entry.values {
            let slot = find_slot(plan, root, key).ok_or_else(|| FixtureError::UnknownParameter {
                step: entry.step.clone(),
                key: key.clone(),
            })?;
            let (node_index, param_index, ty) = slot;
            let value = convert_value(value, ty).ok_or_else(|| FixtureError::ValueType {
                step: entry.step.clone(),
                key: key.clone(),
                expected: ty.type_name(),
            })?;
            let param = &mut plan.nodes[node_index].params[param_index];
            if let Some(address) = &param.address {
                write_slot(address, &value, stores).map_err(|_| FixtureError::ValueType {
                    step: entry.step.clone(),
                    key: key.clone(),
                    expected: ty.type_name(),
                })?;
            }
            param.value = Some(value);
        }
    }
    Ok(())
}

/// Locate the parameter a value key addresses within one chain.
fn find_slot(
    plan: &FlattenedPlan,
    root: usize,
    key: &str,
) -> Option<(usize, usize, ParameterType)> {
    for node_index in 0..plan.len() {
        if plan.root_of(node_index) != root {
            continue;
        }
        let node = &plan.nodes[node_index];
        for (param_index, param) in node.params.iter().enumerate() {
            let matches = if node_index == root {
                key == param.descriptor.name
            } else {
                key == format!(
                    "{}.{}.{}",
                    node.step.method, param.descriptor.name, node.full_id
                )
            };
            if matches {
                return Some((node_index, param_index, param.descriptor.ty));
            }
        }
    }
    None
}

fn convert_value(value: &serde_json::Value, ty: ParameterType) -> Option<ParamValue> {
    match (ty, value) {
        (ParameterType::Bool, serde_json::Value::Bool(v)) => Some(ParamValue::Bool(*v)),
        (ParameterType::Int, serde_json::Value::Number(n)) => n.as_i64().map(ParamValue::Int),
        (ParameterType::Float, serde_json::Value::Number(n)) => n.as_f64().map(ParamValue::Float),
        (ParameterType::Str, serde_json::Value::String(v)) => Some(ParamValue::Str(v.clone())),
        _ => None,
    }
}
