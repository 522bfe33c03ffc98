//! Human approval decisions for `execute_query`.
//!
//! The gate is a plain lookup keyed by trimmed query text. The first time the
//! model asks to run a query there is no decision, so the tool reports that
//! approval is required; once a person approves (possibly editing the text)
//! or rejects it, a later exchange carrying that decision completes the call.

use std::collections::HashMap;

/// A resolved human decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run this text, which may differ from what the model proposed.
    Approved(String),
    /// Do not run the query.
    Rejected,
}

/// What the gate knows about a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalState {
    Unresolved,
    Approved(String),
    Rejected,
}

/// Lookup of decisions by exact trimmed query text.
#[derive(Debug, Clone, Default)]
pub struct ApprovalGate {
    decisions: HashMap<String, Decision>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a gate from the client wire shape: query text to final text, or
    /// `null` for a rejection.
    pub fn from_wire(approvals: HashMap<String, Option<String>>) -> Self {
        let mut gate = Self::new();
        for (query, final_query) in approvals {
            let decision = match final_query {
                Some(text) => Decision::Approved(text),
                None => Decision::Rejected,
            };
            gate.record(&query, decision);
        }
        gate
    }

    /// Record a decision, replacing any earlier one for the same text.
    pub fn record(&mut self, query: &str, decision: Decision) {
        self.decisions.insert(query.trim().to_string(), decision);
    }

    /// Overlay `other` on top of this gate; its decisions win.
    pub fn merged_with(mut self, other: ApprovalGate) -> Self {
        self.decisions.extend(other.decisions);
        self
    }

    /// Look up the decision for `query`.
    pub fn lookup(&self, query: &str) -> ApprovalState {
        match self.decisions.get(query.trim()) {
            None => ApprovalState::Unresolved,
            Some(Decision::Approved(text)) => ApprovalState::Approved(text.clone()),
            Some(Decision::Rejected) => ApprovalState::Rejected,
        }
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}
