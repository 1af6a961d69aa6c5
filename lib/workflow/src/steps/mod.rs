//! Built-in step catalog.
//!
//! Only platform-independent steps live here. Steps that act on the chat
//! platform are registered by the embedding application.

mod convert;
mod utilities;

pub use convert::MessageRef;
pub use utilities::{DelayStep, StopStep};

use crate::step::{StepRegistry, StepRegistryBuilder};
use crate::store::TriggerStore;
use std::sync::Arc;

/// Adds the built-in steps to a registry under construction.
#[must_use]
pub fn register_builtin(
    builder: StepRegistryBuilder,
    triggers: Arc<dyn TriggerStore>,
) -> StepRegistryBuilder {
    let builder = utilities::register(builder, triggers);
    convert::register(builder)
}

/// A registry holding only the built-in steps.
#[must_use]
pub fn builtin_registry(triggers: Arc<dyn TriggerStore>) -> StepRegistry {
    register_builtin(StepRegistry::builder(), triggers).build()
}
