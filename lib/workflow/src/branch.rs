//! Branching guard evaluation.

use crate::definition::{BranchOp, BranchingSpec, OnFalse};
use crate::token::{Replacements, substitute_text};

/// What to do with a guarded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchDecision {
    /// The guard holds (or there is none); run the step.
    Run,
    /// Stop the run at this step.
    Halt,
    /// Move past the step without running it.
    Skip,
}

/// Resolves both sides and compares them as exact strings.
#[must_use]
pub fn guard_holds(spec: &BranchingSpec, replacements: &Replacements) -> bool {
    let left = substitute_text(&spec.left, replacements);
    let right = substitute_text(&spec.right, replacements);
    match spec.op {
        BranchOp::Eq => left == right,
        BranchOp::Ne => left != right,
    }
}

/// Decides how to treat a step given its optional guard.
#[must_use]
pub fn evaluate(spec: Option<&BranchingSpec>, replacements: &Replacements) -> BranchDecision {
    match spec {
        None => BranchDecision::Run,
        Some(spec) if guard_holds(spec, replacements) => BranchDecision::Run,
        Some(spec) => match spec.on_false {
            OnFalse::Halt => BranchDecision::Halt,
            OnFalse::Skip => BranchDecision::Skip,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TRIGGER_USER_ID;

    fn replacements() -> Replacements {
        let mut r = Replacements::new();
        r.insert(TRIGGER_USER_ID, "U123");
        r
    }

    #[test]
    fn no_guard_runs() {
        assert_eq!(evaluate(None, &replacements()), BranchDecision::Run);
    }

    #[test]
    fn equality_after_substitution() {
        let spec = BranchingSpec::new(TRIGGER_USER_ID, BranchOp::Eq, "U123");
        assert_eq!(evaluate(Some(&spec), &replacements()), BranchDecision::Run);

        let spec = BranchingSpec::new(TRIGGER_USER_ID, BranchOp::Eq, "U999");
        assert_eq!(evaluate(Some(&spec), &replacements()), BranchDecision::Halt);
    }

    #[test]
    fn inequality_and_skip_policy() {
        let spec = BranchingSpec::new(TRIGGER_USER_ID, BranchOp::Ne, "U123").on_false(OnFalse::Skip);
        assert_eq!(evaluate(Some(&spec), &replacements()), BranchDecision::Skip);

        let spec = BranchingSpec::new(TRIGGER_USER_ID, BranchOp::Ne, "U999");
        assert_eq!(evaluate(Some(&spec), &replacements()), BranchDecision::Run);
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let spec = BranchingSpec::new("abc", BranchOp::Eq, "ABC");
        assert!(!guard_holds(&spec, &Replacements::new()));
    }
}
