//! stepchain-engine: cooperative, tick-driven execution of resolved plans.
//!
//! The host owns the loop: it resolves a [`FlattenedPlan`] with
//! stepchain-core, wraps it in a [`ScenarioRunner`] and calls
//! [`ScenarioRunner::tick`] with timestamps from a [`Clock`] until the
//! status turns terminal. Failure reports carry two byte-stable traces, a
//! scenario view and a plan-location view.
//!
//! [`FlattenedPlan`]: stepchain_core::FlattenedPlan

pub mod clock;
pub mod runner;
pub mod trace;

pub use clock::{Clock, ManualClock, SystemClock};
pub use runner::{FailureReport, RunStatus, ScenarioRunner, INVALID_RESULT_MESSAGE};
pub use trace::{location_trace, scenario_trace};
