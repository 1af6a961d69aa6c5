//! Workflow definition types.
//!
//! A workflow is a named, user-owned automation that consists of:
//! - An ordered list of steps (typed actions with inputs)
//! - An optional platform access credential
//!
//! Definitions are owned by the surrounding application. The engine only
//! reads them; a run snapshots the step list when it starts.

use chrono::{DateTime, Utc};
use flowrun_core::WorkflowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ulid::Ulid;

/// Stable identifier of a step within a workflow.
///
/// Outputs are keyed by this id, not by the step's position, so it must
/// survive reordering and edits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Generates a fresh step id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string().to_lowercase())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque platform credential used by step functions.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Exposes the raw token for use in a platform call.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Comparison operator of a branching guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchOp {
    /// Exact string equality.
    #[serde(rename = "==")]
    Eq,
    /// Exact string inequality.
    #[serde(rename = "!=")]
    Ne,
}

/// What happens to the run when a branching guard is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFalse {
    /// Stop advancing the whole run at this step.
    #[default]
    Halt,
    /// Advance past this step without running it.
    Skip,
}

/// An optional per-step guard condition.
///
/// Both sides are token-bearing strings resolved against the run's
/// replacement set before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchingSpec {
    /// Left-hand side.
    pub left: String,
    /// Operator.
    pub op: BranchOp,
    /// Right-hand side.
    pub right: String,
    /// Behavior when the guard does not hold.
    #[serde(default)]
    pub on_false: OnFalse,
}

impl BranchingSpec {
    /// Creates a halting guard.
    #[must_use]
    pub fn new(left: impl Into<String>, op: BranchOp, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            op,
            right: right.into(),
            on_false: OnFalse::Halt,
        }
    }

    /// Sets the on-false behavior.
    #[must_use]
    pub fn on_false(mut self, on_false: OnFalse) -> Self {
        self.on_false = on_false;
        self
    }
}

/// A single declared action in a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Stable step id.
    pub id: StepId,
    /// Key into the step registry.
    pub type_id: String,
    /// Raw input values (literals or token-bearing strings) by input key.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// Optional guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branching: Option<BranchingSpec>,
}

impl Step {
    /// Creates a step with a generated id and no inputs.
    #[must_use]
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            id: StepId::generate(),
            type_id: type_id.into(),
            inputs: BTreeMap::new(),
            branching: None,
        }
    }

    /// Sets the step id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<StepId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets a raw input value.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// Sets the branching guard.
    #[must_use]
    pub fn with_branching(mut self, branching: BranchingSpec) -> Self {
        self.branching = Some(branching);
        self
    }
}

/// A user-owned workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Platform user that owns the workflow.
    pub creator_user_id: String,
    /// Credential the workflow's steps act with; runs are refused without it.
    pub access_token: Option<AccessToken>,
    /// Ordered step list.
    pub steps: Vec<Step>,
    /// When this workflow was created.
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates an empty workflow.
    #[must_use]
    pub fn new(name: impl Into<String>, creator_user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            creator_user_id: creator_user_id.into(),
            access_token: None,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the access credential.
    #[must_use]
    pub fn with_access_token(mut self, token: AccessToken) -> Self {
        self.access_token = Some(token);
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}
