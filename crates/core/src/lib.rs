//! stepchain-core: step composition, parameter slots and plan validation.
//!
//! Turns Given/When/Then step declarations with `call_before` prerequisites
//! into a deterministic linear plan, allocates typed storage slots for step
//! parameters behind portable string addresses, and validates the whole
//! configuration with collect-all error reporting.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`resolve_scenario()`] / [`resolve_static()`] -- chosen steps to a
//!   [`FlattenedPlan`]
//! - [`check_scenario()`] -- run every validation check, collecting
//!   [`CheckError`]s
//! - [`allocate()`] -- assign storage slots to every plan parameter
//! - [`Registry`] -- function-table [`StepCatalog`] implementation
//! - [`SlotAddress`] / [`ParameterStore`] / [`StoreSet`] -- parameter
//!   storage and addressing

pub mod catalog;
pub mod chain;
pub mod error;
pub mod registry;
pub mod slots;
pub mod validate;

// ── Convenience re-exports: key types ────────────────────────────────

pub use catalog::{
    ComponentInfo, Outcome, ParamValue, ParameterDescriptor, ParameterType,
    PrerequisiteDeclaration, StepCatalog, StepDescriptor, StepKind, DEFAULT_TIMEOUT_MS,
};
pub use chain::{BoundParameter, ChainNode, ChosenStep, ChosenSteps, FlattenedPlan, OrderKey};
pub use error::{CheckError, CheckErrorKind};
pub use registry::{Registry, RegistryError, StepHandler};
pub use slots::{ParameterStore, SlotAddress, SlotError, StoreSet};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use chain::{build_chain, resolve_scenario, resolve_static, resolve_step};
pub use slots::{allocate, read as read_slot, write as write_slot};
pub use validate::{check_components, check_scenario, is_static_scenario};
