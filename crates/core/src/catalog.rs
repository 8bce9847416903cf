//! Step model and the catalog interface.
//!
//! A *step* is a Given/When/Then method declared on a component. The core
//! never discovers steps itself -- a [`StepCatalog`] supplies them, already
//! described, and performs the actual invocations. The bundled
//! [`Registry`](crate::registry::Registry) is a function-table
//! implementation built once at startup; hosts with their own discovery
//! mechanism implement the trait directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default step timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// The three step kinds, in scenario order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Given,
    When,
    Then,
}

impl StepKind {
    pub const ALL: [StepKind; 3] = [StepKind::Given, StepKind::When, StepKind::Then];

    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Given => "Given",
            StepKind::When => "When",
            StepKind::Then => "Then",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The closed set of concrete parameter types the slot storage supports.
///
/// Each type maps to one growable array per component (see
/// [`ParameterStore`](crate::slots::ParameterStore)); the portable names
/// appear verbatim in encoded slot addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Bool,
    Int,
    Float,
    #[serde(rename = "string")]
    Str,
}

impl ParameterType {
    /// Portable type name used in slot addresses.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterType::Bool => "bool",
            ParameterType::Int => "int",
            ParameterType::Float => "float",
            ParameterType::Str => "string",
        }
    }

    /// Name of the per-component storage array holding values of this type.
    pub fn storage_field(&self) -> &'static str {
        match self {
            ParameterType::Bool => "bool_storage",
            ParameterType::Int => "int_storage",
            ParameterType::Float => "float_storage",
            ParameterType::Str => "string_storage",
        }
    }

    pub fn from_type_name(name: &str) -> Option<ParameterType> {
        match name {
            "bool" => Some(ParameterType::Bool),
            "int" => Some(ParameterType::Int),
            "float" => Some(ParameterType::Float),
            "string" => Some(ParameterType::Str),
            _ => None,
        }
    }

    pub fn from_storage_field(name: &str) -> Option<ParameterType> {
        match name {
            "bool_storage" => Some(ParameterType::Bool),
            "int_storage" => Some(ParameterType::Int),
            "float_storage" => Some(ParameterType::Float),
            "string_storage" => Some(ParameterType::Str),
            _ => None,
        }
    }

    /// The value a freshly allocated slot of this type holds.
    pub fn default_value(&self) -> ParamValue {
        match self {
            ParameterType::Bool => ParamValue::Bool(false),
            ParameterType::Int => ParamValue::Int(0),
            ParameterType::Float => ParamValue::Float(0.0),
            ParameterType::Str => ParamValue::Str(String::new()),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A runtime parameter value, one variant per [`ParameterType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn ty(&self) -> ParameterType {
        match self {
            ParamValue::Bool(_) => ParameterType::Bool,
            ParamValue::Int(_) => ParameterType::Int,
            ParamValue::Float(_) => ParameterType::Float,
            ParamValue::Str(_) => ParameterType::Str,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

/// A declared parameter of a step method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParameterType,
}

/// A step as declared on a component. Immutable once produced by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// Component type name owning the step.
    pub owner: String,
    /// Method name. Unique per owner (the validator enforces this).
    pub method: String,
    pub kind: StepKind,
    /// Scenario sentence template; may embed `%paramName%` placeholders.
    pub sentence: String,
    pub parameters: Vec<ParameterDescriptor>,
    /// Static-scenario position. 0 means unset (dynamic scenarios only).
    pub execution_order: u32,
    pub delay_ms: u64,
    pub timeout_ms: u64,
}

impl StepDescriptor {
    /// `"Owner.method"` -- the name chosen-step lists refer to.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.owner, self.method)
    }
}

/// A `call_before` declaration: `method` must run before the declaring step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrerequisiteDeclaration {
    /// Target step name on the same owner. Empty means no-op (skipped).
    pub method: String,
    /// Position among the declaring step's prerequisites. Must be > 0,
    /// unique and contiguous from 1.
    pub succession_order: u32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Disambiguator when the same target appears at several positions of
    /// one chain. Default empty.
    #[serde(default)]
    pub id: String,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// The three first-class results a step invocation can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Proceed to the next plan node.
    Success,
    /// Stop the whole plan; the message reaches the failure report.
    Fail(String),
    /// Re-invoke on a later tick until the node's timeout elapses, then
    /// convert to a failure carrying the message.
    Retry(String),
}

/// A component attached to the scenario under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub type_name: String,
    /// Static components order their steps by `execution_order` instead of
    /// a chosen-steps list. At most one may be attached.
    pub static_scenario: bool,
}

/// Supplies step metadata and performs invocations.
///
/// The core treats discovery as external: explicit registration tables,
/// code generation or reflection are all valid implementations.
pub trait StepCatalog {
    /// Attached components, in attach order. Duplicates are reported by the
    /// validator, not rejected here.
    fn components(&self) -> &[ComponentInfo];

    /// Declared steps of one component, in declaration order.
    fn list_steps(&self, component: &str) -> Vec<StepDescriptor>;

    /// Prerequisite declarations of one step, in declaration order.
    fn list_prerequisites(&self, step: &StepDescriptor) -> Vec<PrerequisiteDeclaration>;

    /// Invoke the step with bound argument values. `None` models a host
    /// method that produced no usable result (reported as a failure with a
    /// fixed message, never a crash).
    fn invoke(&mut self, step: &StepDescriptor, args: &[ParamValue]) -> Option<Outcome>;

    /// Whether the component has a callable method of this name, step or
    /// not. Backs the "prerequisite targets a plain method" check.
    fn has_method(&self, component: &str, method: &str) -> bool;

    /// Whether the step's implementation yields a step outcome. Backs the
    /// return-type check.
    fn conforms(&self, step: &StepDescriptor) -> bool;
}

/// Look up a step by owner and method name.
pub fn find_step(
    catalog: &dyn StepCatalog,
    component: &str,
    method: &str,
) -> Option<StepDescriptor> {
    catalog
        .list_steps(component)
        .into_iter()
        .find(|s| s.method == method)
}

/// Look up a step by its `"Owner.method"` full name across all components.
pub fn find_step_by_full_name(catalog: &dyn StepCatalog, full_name: &str) -> Option<StepDescriptor> {
    let (owner, method) = full_name.split_once('.')?;
    find_step(catalog, owner, method)
}
