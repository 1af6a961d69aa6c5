//! Step contract and the step registry.
//!
//! The registry is built once at startup and is read-only afterwards. Each
//! entry pairs a declared input/output shape with the function that runs
//! the step.

use crate::definition::{AccessToken, StepId, Workflow};
use crate::error::StepError;
use async_trait::async_trait;
use flowrun_core::ExecutionId;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Data type tag of a step input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// A user id.
    User,
    /// A channel id.
    Channel,
    /// Plain text.
    Text,
    /// A serialized rich text document.
    RichText,
    /// A serialized `{channel, ts}` message reference.
    Message,
    /// A user group id.
    Usergroup,
}

impl DataType {
    /// Returns the string tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Channel => "channel",
            Self::Text => "text",
            Self::RichText => "rich_text",
            Self::Message => "message",
            Self::Usergroup => "usergroup",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared shape of one named input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IoSpec {
    /// Key the value is stored under.
    pub key: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Optional help text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    /// Data type tag.
    pub data_type: DataType,
    /// Whether a value must be provided.
    pub required: bool,
}

impl IoSpec {
    /// Declares a required value.
    #[must_use]
    pub const fn required(key: &'static str, name: &'static str, data_type: DataType) -> Self {
        Self {
            key,
            name,
            description: None,
            data_type,
            required: true,
        }
    }

    /// Adds help text.
    #[must_use]
    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }
}

/// Declared shape of a step type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSpec {
    /// Display name.
    pub name: &'static str,
    /// Grouping used by editors.
    pub category: &'static str,
    /// Inputs in declaration order.
    pub inputs: Vec<IoSpec>,
    /// Outputs in declaration order.
    pub outputs: Vec<IoSpec>,
}

impl StepSpec {
    /// Creates a spec with no inputs or outputs.
    #[must_use]
    pub fn new(name: &'static str, category: &'static str) -> Self {
        Self {
            name,
            category,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Declares an input.
    #[must_use]
    pub fn input(mut self, spec: IoSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    /// Declares an output.
    #[must_use]
    pub fn output(mut self, spec: IoSpec) -> Self {
        self.outputs.push(spec);
        self
    }
}

/// What a step function produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step finished; the run continues with these outputs.
    Outputs(BTreeMap<String, String>),
    /// The run suspends. The step has arranged any resume it needs.
    Pending,
}

impl StepOutcome {
    /// Finished with no outputs.
    #[must_use]
    pub fn empty() -> Self {
        Self::Outputs(BTreeMap::new())
    }

    /// Finished with a single output.
    #[must_use]
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Outputs(BTreeMap::from([(key.into(), value.into())]))
    }
}

/// Context handed to a step function.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The run.
    pub execution_id: ExecutionId,
    /// The step being run.
    pub step_id: StepId,
    /// User the run acts on behalf of.
    pub trigger_user_id: String,
    /// Correlation id of a pending external interaction.
    pub correlation_id: Option<String>,
    /// Credential for platform actions.
    pub credential: AccessToken,
    /// The owning workflow as loaded for this step.
    pub workflow: Workflow,
}

/// An executable step.
#[async_trait]
pub trait StepFunction: Send + Sync {
    /// Runs the step with fully resolved inputs.
    async fn run(
        &self,
        ctx: &StepContext,
        inputs: &BTreeMap<String, String>,
    ) -> Result<StepOutcome, Report<StepError>>;
}

/// A registered step type.
#[derive(Clone)]
pub struct StepDefinition {
    /// Declared shape.
    pub spec: StepSpec,
    /// Implementation.
    pub function: Arc<dyn StepFunction>,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Read-only catalog of step types keyed by type id.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<String, StepDefinition>,
}

impl StepRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> StepRegistryBuilder {
        StepRegistryBuilder::default()
    }

    /// Looks up a step type.
    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&StepDefinition> {
        self.steps.get(type_id)
    }

    /// Returns true if the type id is registered.
    #[must_use]
    pub fn contains(&self, type_id: &str) -> bool {
        self.steps.contains_key(type_id)
    }

    /// Iterates registered specs sorted by type id.
    pub fn specs(&self) -> impl Iterator<Item = (&str, &StepSpec)> {
        let mut entries: Vec<_> = self
            .steps
            .iter()
            .map(|(id, def)| (id.as_str(), &def.spec))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter()
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builder for [`StepRegistry`].
#[derive(Default)]
pub struct StepRegistryBuilder {
    steps: HashMap<String, StepDefinition>,
}

impl StepRegistryBuilder {
    /// Registers a step type. A later registration of the same id wins.
    #[must_use]
    pub fn register(
        mut self,
        type_id: impl Into<String>,
        spec: StepSpec,
        function: impl StepFunction + 'static,
    ) -> Self {
        self.steps.insert(
            type_id.into(),
            StepDefinition {
                spec,
                function: Arc::new(function),
            },
        );
        self
    }

    /// Finishes the registry.
    #[must_use]
    pub fn build(self) -> StepRegistry {
        StepRegistry { steps: self.steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl StepFunction for Echo {
        async fn run(
            &self,
            _ctx: &StepContext,
            inputs: &BTreeMap<String, String>,
        ) -> Result<StepOutcome, Report<StepError>> {
            Ok(StepOutcome::Outputs(inputs.clone()))
        }
    }

    #[test]
    fn registry_lookup() {
        let registry = StepRegistry::builder()
            .register(
                "echo",
                StepSpec::new("Echo", "Testing")
                    .input(IoSpec::required("value", "Value", DataType::Text))
                    .output(IoSpec::required("value", "Value", DataType::Text)),
                Echo,
            )
            .build();

        let def = registry.get("echo").expect("registered");
        assert_eq!(def.spec.inputs[0].key, "value");
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn specs_are_sorted_by_type_id() {
        let registry = StepRegistry::builder()
            .register("b", StepSpec::new("B", "X"), Echo)
            .register("a", StepSpec::new("A", "X"), Echo)
            .build();
        let ids: Vec<_> = registry.specs().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn data_type_tags() {
        assert_eq!(DataType::RichText.as_str(), "rich_text");
        let json = serde_json::to_string(&DataType::Usergroup).expect("serialize");
        assert_eq!(json, "\"usergroup\"");
    }
}
