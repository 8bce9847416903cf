use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a structural (validation-time) error.
///
/// No numeric codes are defined; consumers match on the kind or the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckErrorKind {
    MissingComponents,
    DuplicateComponent,
    DuplicateStaticComponent,
    DuplicateStepName,
    MissingStepKind,
    NonConformingStep,
    DanglingPrerequisite,
    PrerequisiteNotAStep,
    InvalidSuccessionOrder,
    DuplicateSuccessionOrder,
    MissingSuccessionOrder,
    RecursiveChain,
    ParameterCollision,
    DuplicateExecutionOrder,
    MissingExecutionOrder,
    StaticStepWithParameters,
    BlankChosenStep,
    ChosenStepNotFound,
    ChosenComponentNotFound,
    ParameterNotFound,
    ParameterTypeMismatch,
    StorageFieldNotFound,
    StorageReset,
}

/// A structural error found by the plan validator or the chain resolver.
///
/// Errors are reported, never thrown: every check appends to one list and
/// the caller decides what blocks execution (any structural error should).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckError {
    pub kind: CheckErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub message: String,
}

impl CheckError {
    pub fn new(
        kind: CheckErrorKind,
        component: Option<&str>,
        method: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        CheckError {
            kind,
            component: component.map(str::to_owned),
            method: method.map(str::to_owned),
            message: message.into(),
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
