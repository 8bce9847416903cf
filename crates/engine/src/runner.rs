//! Tick-driven scenario execution.
//!
//! The runner owns no thread and never sleeps: the host calls [`tick`] once
//! per frame (or per simulated instant) with the current time, and the
//! runner advances through the plan one node at a time. A node is invoked
//! only after its delay has elapsed since the previous node finished; a
//! retrying node is re-invoked every tick until it succeeds or its timeout
//! elapses.
//!
//! [`tick`]: ScenarioRunner::tick

use crate::trace::{location_trace, scenario_trace};
use serde::Serialize;
use stepchain_core::{FlattenedPlan, Outcome, ParamValue, StepCatalog};

/// Message reported when a step invocation yields no usable outcome.
pub const INVALID_RESULT_MESSAGE: &str = "The step returned an invalid result.";

/// Everything a host needs to report one failed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub message: String,
    /// Scenario sentences with the failed chain marked.
    pub scenario_trace: String,
    /// Full plan with the failed node marked.
    pub location_trace: String,
    /// Arena index of the failed node in the plan.
    pub failed_index: usize,
}

/// Result of one tick. Terminal states repeat on every further tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed(FailureReport),
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Executes a [`FlattenedPlan`] cooperatively.
pub struct ScenarioRunner {
    plan: FlattenedPlan,
    /// Index of the node being executed; -1 before the first tick.
    index: isize,
    /// Instant the previous node finished (or the run started); the delay
    /// gate of the current node counts from here.
    delay_start: u64,
    /// Instant the current node was first invoked; the retry timeout counts
    /// from here. Cleared whenever the runner advances.
    timeout_start: Option<u64>,
    terminal: Option<RunStatus>,
}

impl ScenarioRunner {
    pub fn new(plan: FlattenedPlan) -> Self {
        ScenarioRunner {
            plan,
            index: -1,
            delay_start: 0,
            timeout_start: None,
            terminal: None,
        }
    }

    pub fn plan(&self) -> &FlattenedPlan {
        &self.plan
    }

    /// Index of the node currently being executed, if the run has started
    /// and not finished.
    pub fn current_index(&self) -> Option<usize> {
        if self.index < 0 || self.index as usize >= self.plan.len() {
            None
        } else {
            Some(self.index as usize)
        }
    }

    /// Advance the run by one tick at time `now_ms`.
    ///
    /// Success is observed on the tick after the last node finished, never
    /// on the same tick. Once terminal, every further tick returns the same
    /// status without invoking anything.
    pub fn tick(&mut self, catalog: &mut dyn StepCatalog, now_ms: u64) -> RunStatus {
        if let Some(status) = &self.terminal {
            return status.clone();
        }

        if self.index < 0 {
            self.index = 0;
            self.delay_start = now_ms;
        }
        let index = self.index as usize;
        if index >= self.plan.len() {
            self.terminal = Some(RunStatus::Succeeded);
            return RunStatus::Succeeded;
        }

        let node = &self.plan.nodes[index];
        if now_ms.saturating_sub(self.delay_start) < node.delay_ms {
            return RunStatus::Running;
        }
        let timeout_start = *self.timeout_start.get_or_insert(now_ms);

        let args: Vec<ParamValue> = node
            .params
            .iter()
            .map(|p| {
                p.value
                    .clone()
                    .unwrap_or_else(|| p.descriptor.ty.default_value())
            })
            .collect();
        let step = node.step.clone();
        let timeout_ms = node.timeout_ms;

        match catalog.invoke(&step, &args) {
            Some(Outcome::Success) => {
                self.index += 1;
                self.delay_start = now_ms;
                self.timeout_start = None;
                RunStatus::Running
            }
            Some(Outcome::Fail(message)) => self.fail(index, message),
            Some(Outcome::Retry(message)) => {
                if now_ms.saturating_sub(timeout_start) >= timeout_ms {
                    self.fail(index, message)
                } else {
                    RunStatus::Running
                }
            }
            None => self.fail(index, INVALID_RESULT_MESSAGE.to_owned()),
        }
    }

    fn fail(&mut self, index: usize, message: String) -> RunStatus {
        let report = FailureReport {
            message,
            scenario_trace: scenario_trace(&self.plan, index),
            location_trace: location_trace(&self.plan, index),
            failed_index: index,
        };
        let status = RunStatus::Failed(report);
        self.terminal = Some(status.clone());
        status
    }
}
