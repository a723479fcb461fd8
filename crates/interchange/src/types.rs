//! Typed form of an interchange document.

use qti_core::{Processing, State, Variable};

/// A parsed assessment item (or test) document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub identifier: String,
    /// Variable declarations in document order.
    pub declarations: Vec<Variable>,
    pub template_processing: Option<Processing>,
    pub response_processing: Option<Processing>,
    pub outcome_processing: Option<Processing>,
}

impl Document {
    /// A fresh attempt state: every declared variable at its default value.
    pub fn new_state(&self) -> State {
        let mut state: State = self.declarations.iter().cloned().collect();
        state.apply_defaults();
        state
    }

    /// Number of top-level and nested rules across all processing blocks.
    pub fn rule_count(&self) -> usize {
        [
            &self.template_processing,
            &self.response_processing,
            &self.outcome_processing,
        ]
        .into_iter()
        .flatten()
        .flat_map(|p| p.rules.iter())
        .map(|r| r.count())
        .sum()
    }
}
