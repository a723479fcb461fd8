//! Rule trees: assignments, conditionals, exits and constraints.

use std::fmt;

use crate::expression::Expression;

/// Which non-local exit a rule raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitKind {
    Response,
    Template,
    Test,
}

impl ExitKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            ExitKind::Response => "exitResponse",
            ExitKind::Template => "exitTemplate",
            ExitKind::Test => "exitTest",
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// The processing context a conditional or fragment belongs to. Only
/// affects naming; the semantics are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleFamily {
    Response,
    Outcome,
    Template,
}

/// What an assignment-style rule writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentKind {
    SetOutcomeValue,
    SetTemplateValue,
    SetCorrectResponse,
    SetDefaultValue,
    /// Writes the result of the outcome's lookup table, not the expression.
    LookupOutcomeValue,
}

impl AssignmentKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            AssignmentKind::SetOutcomeValue => "setOutcomeValue",
            AssignmentKind::SetTemplateValue => "setTemplateValue",
            AssignmentKind::SetCorrectResponse => "setCorrectResponse",
            AssignmentKind::SetDefaultValue => "setDefaultValue",
            AssignmentKind::LookupOutcomeValue => "lookupOutcomeValue",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub kind: AssignmentKind,
    pub identifier: String,
    pub expression: Expression,
}

/// One `if`/`elseIf` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionBranch {
    pub guard: Expression,
    pub rules: Vec<Rule>,
}

/// `responseCondition`, `outcomeCondition` or `templateCondition`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRule {
    pub family: RuleFamily,
    /// The `if` arm followed by any `elseIf` arms, in document order.
    pub branches: Vec<ConditionBranch>,
    /// The `else` block.
    pub otherwise: Option<Vec<Rule>>,
}

/// `branchRule`: the session runtime jumps to `target` when the guard holds.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchRule {
    pub target: String,
    pub guard: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Assign(Assignment),
    Condition(ConditionRule),
    Exit(ExitKind),
    TemplateConstraint(Expression),
    Branch(BranchRule),
    /// `responseProcessingFragment` / `outcomeProcessingFragment`.
    Fragment { family: RuleFamily, rules: Vec<Rule> },
}

impl Rule {
    pub fn assign(kind: AssignmentKind, identifier: impl Into<String>, expression: Expression) -> Self {
        Rule::Assign(Assignment {
            kind,
            identifier: identifier.into(),
            expression,
        })
    }

    pub fn set_outcome(identifier: impl Into<String>, expression: Expression) -> Self {
        Rule::assign(AssignmentKind::SetOutcomeValue, identifier, expression)
    }

    pub fn set_template(identifier: impl Into<String>, expression: Expression) -> Self {
        Rule::assign(AssignmentKind::SetTemplateValue, identifier, expression)
    }

    /// QTI element name, used in engine traces.
    pub fn class_name(&self) -> &'static str {
        match self {
            Rule::Assign(a) => a.kind.class_name(),
            Rule::Condition(c) => match c.family {
                RuleFamily::Response => "responseCondition",
                RuleFamily::Outcome => "outcomeCondition",
                RuleFamily::Template => "templateCondition",
            },
            Rule::Exit(kind) => kind.class_name(),
            Rule::TemplateConstraint(_) => "templateConstraint",
            Rule::Branch(_) => "branchRule",
            Rule::Fragment { family, .. } => match family {
                RuleFamily::Outcome => "outcomeProcessingFragment",
                _ => "responseProcessingFragment",
            },
        }
    }

    /// Rules nested directly inside this one, across all branches.
    pub fn nested(&self) -> Vec<&Rule> {
        match self {
            Rule::Condition(c) => c
                .branches
                .iter()
                .flat_map(|b| b.rules.iter())
                .chain(c.otherwise.iter().flatten())
                .collect(),
            Rule::Fragment { rules, .. } => rules.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Total number of rules in this subtree, itself included.
    pub fn count(&self) -> usize {
        1 + self.nested().iter().map(|r| r.count()).sum::<usize>()
    }
}

/// A `templateProcessing`, `responseProcessing` or `outcomeProcessing`
/// block. Inline rules take precedence over `template`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Processing {
    pub rules: Vec<Rule>,
    /// Template URI, resolved through the engine's template mapping.
    pub template: Option<String>,
    /// Fallback location when the mapping has no entry for `template`.
    pub template_location: Option<String>,
}

impl Processing {
    pub fn inline(rules: Vec<Rule>) -> Self {
        Processing {
            rules,
            ..Default::default()
        }
    }

    pub fn from_template(uri: impl Into<String>) -> Self {
        Processing {
            template: Some(uri.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scalar;

    #[test]
    fn class_names_follow_qti_elements() {
        let cond = Rule::Condition(ConditionRule {
            family: RuleFamily::Template,
            branches: vec![ConditionBranch {
                guard: Expression::BaseValue(Scalar::Boolean(true)),
                rules: vec![Rule::Exit(ExitKind::Template)],
            }],
            otherwise: Some(vec![Rule::set_template(
                "X",
                Expression::BaseValue(Scalar::Integer(1)),
            )]),
        });
        assert_eq!(cond.class_name(), "templateCondition");
        assert_eq!(cond.count(), 3);
        assert_eq!(
            Rule::set_outcome("SCORE", Expression::Null).class_name(),
            "setOutcomeValue"
        );
        assert_eq!(Rule::Exit(ExitKind::Test).class_name(), "exitTest");
    }
}
