//! Token substitution for step inputs.
//!
//! Tokens are fixed-syntax placeholders (`$!{...}`) treated as opaque
//! strings: substitution is exact substring replacement, nothing is parsed
//! out of the token itself.

use crate::definition::StepId;
use crate::execution::ExecutionState;
use regex::Regex;
use std::sync::LazyLock;

/// Token resolving to the triggering user's id.
pub const TRIGGER_USER_ID: &str = "$!{ctx.trigger_user_id}";

/// Token resolving to the triggering user's mention form.
pub const TRIGGER_USER_PING: &str = "$!{ctx.trigger_user_ping}";

static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@(U[0-9A-Z]+)>$").expect("valid user mention pattern"));

static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<#(C[0-9A-Z]+)>$").expect("valid channel mention pattern"));

/// Builds the token referencing a stored step output.
#[must_use]
pub fn output_token(step_id: &StepId, key: &str) -> String {
    format!("$!{{outputs.{step_id}.{key}}}")
}

/// Builds the token referencing a caller-supplied context value.
#[must_use]
pub fn context_token(key: &str) -> String {
    format!("$!{{{key}}}")
}

/// Formats a user id in its mention surface syntax.
#[must_use]
pub fn user_mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

/// A mention reference recognized in a replacement value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mention {
    /// `<@U...>`
    User(String),
    /// `<#C...>`
    Channel(String),
}

impl Mention {
    /// Parses a value that is exactly a user or channel mention.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if let Some(caps) = USER_MENTION.captures(value) {
            return Some(Self::User(caps[1].to_string()));
        }
        CHANNEL_MENTION
            .captures(value)
            .map(|caps| Self::Channel(caps[1].to_string()))
    }
}

/// The set of token/value pairs used to resolve a step's inputs.
///
/// Insertion order is kept; inserting an existing token replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacements {
    pairs: Vec<(String, String)>,
}

impl Replacements {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the replacement set for a run: the trigger user entries, one
    /// entry per stored output, one entry per additional context key.
    #[must_use]
    pub fn for_run(trigger_user_id: &str, state: &ExecutionState) -> Self {
        let mut replacements = Self::new();
        replacements.insert(TRIGGER_USER_ID, trigger_user_id);
        replacements.insert(TRIGGER_USER_PING, user_mention(trigger_user_id));
        for (key, value) in &state.outputs {
            replacements.insert(format!("$!{{outputs.{key}}}"), value.clone());
        }
        for (key, value) in &state.additional_ctx {
            replacements.insert(context_token(key), value.clone());
        }
        replacements
    }

    /// Adds or replaces a pair.
    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(t, _)| *t == token) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((token, value)),
        }
    }

    /// Returns the value for an exact token.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates the pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    /// Returns the number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true when there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Replaces every literal occurrence of every token in `text`.
#[must_use]
pub fn substitute_text(text: &str, replacements: &Replacements) -> String {
    let mut text = text.to_string();
    for (token, value) in replacements.iter() {
        if text.contains(token) {
            text = text.replace(token, value);
        }
    }
    text
}
