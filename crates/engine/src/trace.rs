//! Failure trace rendering.
//!
//! Two human-readable views of the same failure, byte-stable so hosts can
//! diff them across runs. The scenario trace shows only chain roots -- the
//! sentences a reader of the scenario would recognize -- and marks the root
//! of the chain containing the failed node. The location trace shows every
//! plan node with its nesting and timing, and marks the exact failed node.

use stepchain_core::{FlattenedPlan, StepKind};

const ARROW: &str = "---------->";

fn scenario_label(previous: Option<StepKind>, current: StepKind) -> &'static str {
    match previous {
        None => "Given",
        Some(p) if p == current => "  and",
        Some(StepKind::Given) => " when",
        Some(_) => " then",
    }
}

fn kind_bracket(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Given => "[Given]",
        StepKind::When => "[ When]",
        StepKind::Then => "[ Then]",
    }
}

/// Scenario sentences, one line per chain root, the failed chain marked.
pub fn scenario_trace(plan: &FlattenedPlan, failed_index: usize) -> String {
    let failed_root = plan.root_of(failed_index);
    let mut result = String::new();
    let mut previous: Option<StepKind> = None;
    for (index, node) in plan.nodes.iter().enumerate() {
        if !node.is_root() {
            continue;
        }
        let label = scenario_label(previous, node.step.kind);
        let prefix = if index == failed_root {
            ARROW
        } else {
            "           " // same width as the arrow
        };
        result.push_str(&format!(
            "\n{} {} {}",
            prefix,
            label,
            node.sentence_with_values()
        ));
        previous = Some(node.step.kind);
    }
    result
}

/// Every plan node with kind, nesting, delay and timeout; the failed node
/// marked.
pub fn location_trace(plan: &FlattenedPlan, failed_index: usize) -> String {
    let mut result = String::new();
    for (index, node) in plan.nodes.iter().enumerate() {
        let prefix = if index == failed_index {
            ARROW
        } else {
            "           "
        };
        let indent = "   ".repeat(plan.depth(index));
        result.push_str(&format!(
            "\n{}{} {} {} [Delay= {} Timeout= {}]",
            prefix,
            kind_bracket(node.step.kind),
            indent,
            node.step.full_name(),
            node.delay_ms,
            node.timeout_ms
        ));
    }
    result
}
