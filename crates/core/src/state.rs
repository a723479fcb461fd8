//! The per-attempt variable store.

use std::collections::HashMap;

use crate::error::StateError;
use crate::types::Value;
use crate::variable::{Variable, VariableRole};

/// Identifier-keyed variables, iterated in declaration order.
///
/// The state never creates variables on assignment: writing to an
/// undeclared identifier is an error.
#[derive(Debug, Clone, Default)]
pub struct State {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable. Redeclaring an identifier replaces the previous
    /// variable in place and returns it.
    pub fn declare(&mut self, variable: Variable) -> Option<Variable> {
        match self.index.get(&variable.identifier) {
            Some(&pos) => Some(std::mem::replace(&mut self.variables[pos], variable)),
            None => {
                self.index
                    .insert(variable.identifier.clone(), self.variables.len());
                self.variables.push(variable);
                None
            }
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&Variable> {
        self.index.get(identifier).map(|&pos| &self.variables[pos])
    }

    pub fn get_mut(&mut self, identifier: &str) -> Option<&mut Variable> {
        match self.index.get(identifier) {
            Some(&pos) => Some(&mut self.variables[pos]),
            None => None,
        }
    }

    /// Like [`State::get`] but reports a missing identifier as an error.
    pub fn variable(&self, identifier: &str) -> Result<&Variable, StateError> {
        self.get(identifier)
            .ok_or_else(|| StateError::UnknownVariable {
                identifier: identifier.to_string(),
            })
    }

    pub fn variable_mut(&mut self, identifier: &str) -> Result<&mut Variable, StateError> {
        self.get_mut(identifier)
            .ok_or_else(|| StateError::UnknownVariable {
                identifier: identifier.to_string(),
            })
    }

    /// Current value of a variable, `None` if it is not declared.
    pub fn value(&self, identifier: &str) -> Option<&Value> {
        self.get(identifier).map(|v| &v.value)
    }

    /// Assign a value, coercing it to the declaration (see [`Variable::coerce`]).
    pub fn set_value(&mut self, identifier: &str, value: Value) -> Result<(), StateError> {
        let variable = self.variable_mut(identifier)?;
        variable.value = variable.coerce(value)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.variables.iter()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.identifier.as_str())
    }

    /// Reset every outcome variable to its default.
    pub fn reset_outcomes(&mut self) {
        self.reset_where(|v| matches!(v.role, VariableRole::Outcome(_)));
    }

    /// Reset every template variable to its default.
    pub fn reset_templates(&mut self) {
        self.reset_where(|v| matches!(v.role, VariableRole::Template(_)));
    }

    /// Reset every variable to its default.
    pub fn apply_defaults(&mut self) {
        self.reset_where(|_| true);
    }

    fn reset_where(&mut self, filter: impl Fn(&Variable) -> bool) {
        for variable in self.variables.iter_mut().filter(|v| filter(v)) {
            variable.reset();
        }
    }
}

impl FromIterator<Variable> for State {
    fn from_iter<T: IntoIterator<Item = Variable>>(iter: T) -> Self {
        let mut state = State::new();
        for variable in iter {
            state.declare(variable);
        }
        state
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = &'a Variable;
    type IntoIter = std::slice::Iter<'a, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.variables.iter()
    }
}
