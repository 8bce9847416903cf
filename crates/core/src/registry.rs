//! Function-table implementation of [`StepCatalog`].
//!
//! Hosts without a reflection facility register everything once at
//! startup: component entries, step descriptors paired with handler
//! closures, prerequisite declarations and plain (non-step) method names.

use crate::catalog::{
    ComponentInfo, Outcome, ParamValue, PrerequisiteDeclaration, StepCatalog, StepDescriptor,
};
use std::collections::BTreeMap;

/// A registered step implementation.
pub type StepHandler = Box<dyn FnMut(&[ParamValue]) -> Option<Outcome> + Send>;

/// Faults raised at registration time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("component '{component}' is not registered")]
    UnknownComponent { component: String },
}

struct RegisteredStep {
    descriptor: StepDescriptor,
    prerequisites: Vec<PrerequisiteDeclaration>,
    handler: Option<StepHandler>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.components)
            .field(
                "steps",
                &self
                    .steps
                    .iter()
                    .map(|step| &step.descriptor)
                    .collect::<Vec<_>>(),
            )
            .field("plain_methods", &self.plain_methods)
            .finish()
    }
}

/// Registered step catalog, built once at startup.
#[derive(Default)]
pub struct Registry {
    components: Vec<ComponentInfo>,
    steps: Vec<RegisteredStep>,
    plain_methods: BTreeMap<String, Vec<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Attach a component. Duplicate attachments are accepted here and
    /// reported by the validator, matching how a host would let a user
    /// attach anything and complain afterwards.
    pub fn add_component(&mut self, type_name: &str, static_scenario: bool) {
        self.components.push(ComponentInfo {
            type_name: type_name.to_owned(),
            static_scenario,
        });
    }

    /// Register a step with its prerequisite declarations and handler.
    /// A `None` handler registers a declared-but-unimplemented step, which
    /// the validator reports as non-conforming.
    pub fn register_step(
        &mut self,
        descriptor: StepDescriptor,
        prerequisites: Vec<PrerequisiteDeclaration>,
        handler: Option<StepHandler>,
    ) -> Result<(), RegistryError> {
        if !self.is_attached(&descriptor.owner) {
            return Err(RegistryError::UnknownComponent {
                component: descriptor.owner.clone(),
            });
        }
        self.steps.push(RegisteredStep {
            descriptor,
            prerequisites,
            handler,
        });
        Ok(())
    }

    /// Register a callable method that is not a step. Only the name is
    /// needed: these exist so the validator can distinguish "prerequisite
    /// targets a plain method" from "prerequisite targets nothing".
    pub fn register_plain_method(
        &mut self,
        component: &str,
        method: &str,
    ) -> Result<(), RegistryError> {
        if !self.is_attached(component) {
            return Err(RegistryError::UnknownComponent {
                component: component.to_owned(),
            });
        }
        self.plain_methods
            .entry(component.to_owned())
            .or_default()
            .push(method.to_owned());
        Ok(())
    }

    fn is_attached(&self, component: &str) -> bool {
        self.components.iter().any(|c| c.type_name == component)
    }

    fn find_registered(&self, owner: &str, method: &str) -> Option<&RegisteredStep> {
        self.steps
            .iter()
            .find(|s| s.descriptor.owner == owner && s.descriptor.method == method)
    }
}

impl StepCatalog for Registry {
    fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    fn list_steps(&self, component: &str) -> Vec<StepDescriptor> {
        self.steps
            .iter()
            .filter(|s| s.descriptor.owner == component)
            .map(|s| s.descriptor.clone())
            .collect()
    }

    fn list_prerequisites(&self, step: &StepDescriptor) -> Vec<PrerequisiteDeclaration> {
        self.find_registered(&step.owner, &step.method)
            .map(|s| s.prerequisites.clone())
            .unwrap_or_default()
    }

    fn invoke(&mut self, step: &StepDescriptor, args: &[ParamValue]) -> Option<Outcome> {
        let registered = self
            .steps
            .iter_mut()
            .find(|s| s.descriptor.owner == step.owner && s.descriptor.method == step.method)?;
        let handler = registered.handler.as_mut()?;
        handler(args)
    }

    fn has_method(&self, component: &str, method: &str) -> bool {
        if self.find_registered(component, method).is_some() {
            return true;
        }
        self.plain_methods
            .get(component)
            .is_some_and(|methods| methods.iter().any(|m| m == method))
    }

    fn conforms(&self, step: &StepDescriptor) -> bool {
        self.find_registered(&step.owner, &step.method)
            .is_some_and(|s| s.handler.is_some())
    }
}
