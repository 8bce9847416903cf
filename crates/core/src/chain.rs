//! Chain resolution: from a chosen step and its `call_before` declarations
//! to a cycle-free, deterministically ordered linear plan.
//!
//! Nodes live in a flat arena and reference their parent by index; the
//! hierarchical order of a node is the tuple of succession orders walked
//! from the chain root down to the node, with the root carrying the
//! chosen-step number. Comparing two nodes compares the tuples elementwise;
//! when one tuple is a prefix of the other, the prefix sorts *last*, so
//! every prerequisite precedes the step that declared it.

use crate::catalog::{find_step, find_step_by_full_name, StepCatalog, StepDescriptor, StepKind};
use crate::error::{CheckError, CheckErrorKind};
use crate::slots::{SlotAddress, StoreSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::catalog::{ParamValue, ParameterDescriptor};

/// Hierarchical position of a node inside one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(pub Vec<u32>);

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut lhs = self.0.iter();
        let mut rhs = other.0.iter();
        loop {
            match (lhs.next(), rhs.next()) {
                (Some(a), Some(b)) if a != b => return a.cmp(b),
                (Some(_), Some(_)) => continue,
                (None, None) => return Ordering::Equal,
                // A terminal path sorts after its extensions: the step runs
                // after the prerequisites it declared.
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
            }
        }
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A step parameter occurrence inside a resolved chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParameter {
    pub descriptor: ParameterDescriptor,
    /// Value read from storage at resolution time; `None` until a slot is
    /// allocated or when the referenced storage was reset.
    pub value: Option<ParamValue>,
    /// Storage slot, present once the plan has been through allocation.
    pub address: Option<SlotAddress>,
}

/// One resolved occurrence of a step within a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainNode {
    pub step: StepDescriptor,
    /// Arena index of the node that declared this one; `None` for a chain
    /// root (a chosen step).
    pub parent: Option<usize>,
    /// Disambiguator inherited from the introducing prerequisite.
    pub id: String,
    /// Ancestor ids joined by `_`, innermost last; `""` for a root.
    pub full_id: String,
    /// Succession order of the introducing prerequisite; the chosen-step
    /// number for a root.
    pub succession_order: u32,
    pub delay_ms: u64,
    pub timeout_ms: u64,
    pub params: Vec<BoundParameter>,
    pub order: OrderKey,
}

impl ChainNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Scenario sentence with `%name%` placeholders substituted. Unbound
    /// parameters substitute as the empty string.
    pub fn sentence_with_values(&self) -> String {
        let mut text = self.step.sentence.clone();
        for param in &self.params {
            let placeholder = format!("%{}%", param.descriptor.name);
            let value = param
                .value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default();
            text = text.replace(&placeholder, &value);
        }
        text
    }
}

/// An ordered scenario plan: all Given chains, then When, then Then.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlattenedPlan {
    pub nodes: Vec<ChainNode>,
}

impl FlattenedPlan {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nesting depth of a node (0 for chain roots).
    pub fn depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[index].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent].parent;
        }
        depth
    }

    /// Arena index of the chain root above a node (itself when a root).
    pub fn root_of(&self, index: usize) -> usize {
        let mut current = index;
        while let Some(parent) = self.nodes[current].parent {
            current = parent;
        }
        current
    }

    /// Component type names appearing in the plan, deduplicated.
    pub fn component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for node in &self.nodes {
            if !names.iter().any(|n| n == &node.step.owner) {
                names.push(node.step.owner.clone());
            }
        }
        names
    }
}

/// One entry of a chosen-steps list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChosenStep {
    /// `"Owner.method"` full step name.
    pub full_name: String,
    /// Encoded slot-address list persisted by the host; empty when no
    /// values were ever allocated.
    #[serde(default)]
    pub parameters_index: String,
}

/// The ordered Given/When/Then selections of a dynamic scenario.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChosenSteps {
    pub given: Vec<ChosenStep>,
    pub when: Vec<ChosenStep>,
    pub then: Vec<ChosenStep>,
}

impl ChosenSteps {
    pub fn for_kind(&self, kind: StepKind) -> &[ChosenStep] {
        match kind {
            StepKind::Given => &self.given,
            StepKind::When => &self.when,
            StepKind::Then => &self.then,
        }
    }
}

/// Build one root step's chain: prerequisite tree, cycle check, flatten.
///
/// The returned nodes are in hierarchical order with the root step last in
/// its own subtree. A prerequisite with an empty target name is skipped.
pub fn build_chain(
    catalog: &dyn StepCatalog,
    root: &StepDescriptor,
    step_number: u32,
) -> Result<Vec<ChainNode>, CheckError> {
    let mut nodes = Vec::new();
    let root_node = ChainNode {
        step: root.clone(),
        parent: None,
        id: String::new(),
        full_id: String::new(),
        succession_order: step_number,
        delay_ms: root.delay_ms,
        timeout_ms: root.timeout_ms,
        params: unbound_params(root),
        order: OrderKey(vec![step_number]),
    };
    nodes.push(root_node);

    let mut ancestry = vec![(root.owner.clone(), root.method.clone())];
    let mut chain_lines: Vec<String> = Vec::new();
    expand_prerequisites(
        catalog,
        root,
        0,
        "",
        &mut nodes,
        &mut ancestry,
        &mut chain_lines,
    )?;

    // Stable sort by hierarchical order, then remap parent indices.
    let mut permutation: Vec<usize> = (0..nodes.len()).collect();
    permutation.sort_by(|&a, &b| nodes[a].order.cmp(&nodes[b].order));
    let mut new_position = vec![0usize; nodes.len()];
    for (new_index, &old_index) in permutation.iter().enumerate() {
        new_position[old_index] = new_index;
    }
    let mut sorted: Vec<ChainNode> = permutation.into_iter().map(|i| nodes[i].clone()).collect();
    for node in &mut sorted {
        node.parent = node.parent.map(|p| new_position[p]);
    }
    Ok(sorted)
}

fn unbound_params(step: &StepDescriptor) -> Vec<BoundParameter> {
    step.parameters
        .iter()
        .map(|descriptor| BoundParameter {
            descriptor: descriptor.clone(),
            value: None,
            address: None,
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn expand_prerequisites(
    catalog: &dyn StepCatalog,
    step: &StepDescriptor,
    parent_index: usize,
    child_prefix: &str,
    nodes: &mut Vec<ChainNode>,
    ancestry: &mut Vec<(String, String)>,
    chain_lines: &mut Vec<String>,
) -> Result<(), CheckError> {
    for decl in catalog.list_prerequisites(step) {
        if decl.method.is_empty() {
            continue;
        }
        chain_lines.push(format!(
            "{} call_before({}, \"{}\")",
            step.method, decl.succession_order, decl.method
        ));
        let target = find_step(catalog, &step.owner, &decl.method).ok_or_else(|| {
            CheckError::new(
                CheckErrorKind::DanglingPrerequisite,
                Some(&step.owner),
                Some(&step.method),
                format!(
                    "Step {}.{} not found. It is referenced in a call_before declaration on the step {}.{}",
                    step.owner, decl.method, step.owner, step.method
                ),
            )
        })?;
        if ancestry
            .iter()
            .any(|(owner, method)| owner == &target.owner && method == &target.method)
        {
            return Err(CheckError::new(
                CheckErrorKind::RecursiveChain,
                Some(&target.owner),
                Some(&target.method),
                format!(
                    "The step {} has a recursive call. Recursive calls are not allowed.\n Call chain:\n{}",
                    target.method,
                    chain_lines.join("\n")
                ),
            ));
        }

        let full_id = format!("{}{}", child_prefix, decl.id);
        let parent_order = nodes[parent_index].order.0.clone();
        let mut order = parent_order;
        order.push(decl.succession_order);
        let node = ChainNode {
            step: target.clone(),
            parent: Some(parent_index),
            id: decl.id.clone(),
            full_id,
            succession_order: decl.succession_order,
            delay_ms: decl.delay_ms,
            timeout_ms: decl.timeout_ms,
            params: unbound_params(&target),
            order: OrderKey(order),
        };
        nodes.push(node);
        let node_index = nodes.len() - 1;

        let nested_prefix = format!("{}{}_", child_prefix, decl.id);
        ancestry.push((target.owner.clone(), target.method.clone()));
        expand_prerequisites(
            catalog,
            &target,
            node_index,
            &nested_prefix,
            nodes,
            ancestry,
            chain_lines,
        )?;
        ancestry.pop();
        chain_lines.pop();
    }
    Ok(())
}

/// Bind parameter values and addresses from a persisted parameters-index
/// string. Entries that fail to decode or do not match any parameter are
/// skipped; the validator reports them.
pub fn bind_parameters(nodes: &mut [ChainNode], parameters_index: &str, stores: &StoreSet) {
    let addresses: Vec<SlotAddress> = SlotAddress::split_entries(parameters_index)
        .filter_map(|entry| SlotAddress::decode(entry).ok())
        .collect();
    for node in nodes.iter_mut() {
        let owner = node.step.owner.clone();
        let method = node.step.method.clone();
        let full_id = node.full_id.clone();
        for param in &mut node.params {
            let expected = format!("{}.{}.{}.{}", owner, method, param.descriptor.name, full_id);
            if let Some(address) = addresses
                .iter()
                .find(|a| a.parameter_full_name() == expected)
            {
                param.value = crate::slots::read(address, stores).ok();
                param.address = Some(address.clone());
            }
        }
    }
}

/// Resolve one root step into its chain, binding values from storage.
pub fn resolve_step(
    catalog: &dyn StepCatalog,
    step: &StepDescriptor,
    step_number: u32,
    parameters_index: &str,
    stores: &StoreSet,
) -> Result<Vec<ChainNode>, CheckError> {
    let mut nodes = build_chain(catalog, step, step_number)?;
    bind_parameters(&mut nodes, parameters_index, stores);
    Ok(nodes)
}

/// Resolve a dynamic scenario: the ordered chosen-step lists, concatenated
/// Given, then When, then Then. All resolution errors are collected; a
/// plan is produced only when there are none.
pub fn resolve_scenario(
    catalog: &dyn StepCatalog,
    chosen: &ChosenSteps,
    stores: &StoreSet,
) -> Result<FlattenedPlan, Vec<CheckError>> {
    let mut plan = FlattenedPlan::default();
    let mut errors = Vec::new();

    for kind in StepKind::ALL {
        for (position, chosen_step) in chosen.for_kind(kind).iter().enumerate() {
            let step = match find_step_by_full_name(catalog, &chosen_step.full_name) {
                Some(step) if step.kind == kind => step,
                _ => {
                    errors.push(CheckError::new(
                        CheckErrorKind::ChosenStepNotFound,
                        None,
                        None,
                        format!(
                            "Step {} not found on {} steps at position {}.",
                            chosen_step.full_name,
                            kind.label(),
                            position + 1
                        ),
                    ));
                    continue;
                }
            };
            match resolve_step(
                catalog,
                &step,
                position as u32 + 1,
                &chosen_step.parameters_index,
                stores,
            ) {
                Ok(nodes) => append_chain(&mut plan, nodes),
                Err(err) => errors.push(err),
            }
        }
    }

    if errors.is_empty() {
        Ok(plan)
    } else {
        Err(errors)
    }
}

/// Resolve a static scenario: steps ordered by their declared
/// `execution_order` within each kind, across all attached components.
pub fn resolve_static(catalog: &dyn StepCatalog) -> Result<FlattenedPlan, Vec<CheckError>> {
    let mut plan = FlattenedPlan::default();
    let mut errors = Vec::new();

    for kind in StepKind::ALL {
        let mut steps: Vec<StepDescriptor> = Vec::new();
        for component in catalog.components() {
            steps.extend(
                catalog
                    .list_steps(&component.type_name)
                    .into_iter()
                    .filter(|s| s.kind == kind && s.execution_order > 0),
            );
        }
        steps.sort_by_key(|s| s.execution_order);
        for (position, step) in steps.iter().enumerate() {
            match build_chain(catalog, step, position as u32 + 1) {
                Ok(nodes) => append_chain(&mut plan, nodes),
                Err(err) => errors.push(err),
            }
        }
    }

    if errors.is_empty() {
        Ok(plan)
    } else {
        Err(errors)
    }
}

fn append_chain(plan: &mut FlattenedPlan, nodes: Vec<ChainNode>) {
    let offset = plan.nodes.len();
    for mut node in nodes {
        node.parent = node.parent.map(|p| p + offset);
        plan.nodes.push(node);
    }
}
