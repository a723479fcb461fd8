//! Response processing templates: where a `template` URI's rules come from.
//!
//! A [`TemplateResolver`] maps template URIs to locations and asks a
//! [`TemplateLoader`] for the rules stored there. The standard QTI
//! templates (`match_correct`, `map_response`, `map_response_point`) are
//! built in and served from memory.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use qti_core::{
    ConditionBranch, ConditionRule, Expression, OperatorKind, Processing, Rule, RuleFamily, Scalar,
};

use crate::error::RuleError;

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Source of template rule sequences.
pub trait TemplateLoader: Send + Sync {
    /// Rules stored at `location`; `Ok(None)` when there is nothing there.
    fn load(&self, location: &str) -> Result<Option<Vec<Rule>>, String>;
}

// ──────────────────────────────────────────────
// StaticTemplateLoader
// ──────────────────────────────────────────────

const MATCH_CORRECT: &str = "builtin:match_correct";
const MAP_RESPONSE: &str = "builtin:map_response";
const MAP_RESPONSE_POINT: &str = "builtin:map_response_point";

/// A loader backed by an in-memory map of location → rules.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplateLoader {
    templates: BTreeMap<String, Vec<Rule>>,
}

impl StaticTemplateLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader serving the standard response processing templates.
    pub fn standard() -> Self {
        let mut loader = StaticTemplateLoader::new();
        loader.insert(MATCH_CORRECT, match_correct());
        loader.insert(MAP_RESPONSE, map_response(Expression::MapResponse("RESPONSE".into())));
        loader.insert(
            MAP_RESPONSE_POINT,
            map_response(Expression::MapResponsePoint("RESPONSE".into())),
        );
        loader
    }

    pub fn insert(&mut self, location: impl Into<String>, rules: Vec<Rule>) {
        self.templates.insert(location.into(), rules);
    }
}

impl TemplateLoader for StaticTemplateLoader {
    fn load(&self, location: &str) -> Result<Option<Vec<Rule>>, String> {
        Ok(self.templates.get(location).cloned())
    }
}

/// Template URI → location for the standard templates, for QTI 2.0
/// through 2.2 (with and without the `.xml` suffix).
pub fn standard_mapping() -> BTreeMap<String, String> {
    let mut mapping = BTreeMap::new();
    for version in ["qti_v2p0", "qti_v2p1", "qti_v2p2"] {
        for (name, location) in [
            ("match_correct", MATCH_CORRECT),
            ("map_response", MAP_RESPONSE),
            ("map_response_point", MAP_RESPONSE_POINT),
        ] {
            let uri = format!("http://www.imsglobal.org/question/{}/rptemplates/{}", version, name);
            mapping.insert(format!("{}.xml", uri), location.to_string());
            mapping.insert(uri, location.to_string());
        }
    }
    mapping
}

fn response_condition(guard: Expression, then: Rule, otherwise: Rule) -> Rule {
    Rule::Condition(ConditionRule {
        family: RuleFamily::Response,
        branches: vec![ConditionBranch {
            guard,
            rules: vec![then],
        }],
        otherwise: Some(vec![otherwise]),
    })
}

fn score(value: f64) -> Expression {
    Expression::BaseValue(Scalar::Float(value))
}

/// SCORE is 1 when RESPONSE matches its correct response, else 0.
fn match_correct() -> Vec<Rule> {
    vec![response_condition(
        Expression::operator(
            OperatorKind::Match,
            vec![
                Expression::variable("RESPONSE"),
                Expression::Correct("RESPONSE".into()),
            ],
        ),
        Rule::set_outcome("SCORE", score(1.0)),
        Rule::set_outcome("SCORE", score(0.0)),
    )]
}

/// SCORE is 0 for an empty RESPONSE, else the mapped value.
fn map_response(mapped: Expression) -> Vec<Rule> {
    vec![response_condition(
        Expression::operator(OperatorKind::IsNull, vec![Expression::variable("RESPONSE")]),
        Rule::set_outcome("SCORE", score(0.0)),
        Rule::set_outcome("SCORE", mapped),
    )]
}

// ──────────────────────────────────────────────
// Resolution
// ──────────────────────────────────────────────

/// Resolves a processing block to the rules it runs.
#[derive(Clone)]
pub struct TemplateResolver {
    mapping: BTreeMap<String, String>,
    loader: Arc<dyn TemplateLoader>,
}

impl fmt::Debug for TemplateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateResolver")
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

impl TemplateResolver {
    pub fn new(mapping: BTreeMap<String, String>, loader: Arc<dyn TemplateLoader>) -> Self {
        TemplateResolver { mapping, loader }
    }

    /// Standard templates plus `extra` entries, which win on conflict.
    pub fn standard(extra: &BTreeMap<String, String>) -> Self {
        let mut mapping = standard_mapping();
        mapping.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        TemplateResolver::new(mapping, Arc::new(StaticTemplateLoader::standard()))
    }

    pub fn with_loader(mut self, loader: Arc<dyn TemplateLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn location(&self, uri: &str) -> Option<&str> {
        self.mapping.get(uri).map(String::as_str)
    }

    /// Inline rules win; otherwise the template URI through the mapping,
    /// then the `templateLocation` hint.
    pub fn resolve<'p>(&self, processing: &'p Processing) -> Result<Cow<'p, [Rule]>, RuleError> {
        let wanted = processing
            .template
            .as_deref()
            .or(processing.template_location.as_deref());
        let Some(name) = wanted else {
            return Ok(Cow::Borrowed(processing.rules.as_slice()));
        };
        if !processing.rules.is_empty() {
            return Ok(Cow::Borrowed(processing.rules.as_slice()));
        }

        let candidates = processing
            .template
            .as_deref()
            .and_then(|uri| self.location(uri))
            .into_iter()
            .chain(processing.template_location.as_deref());
        for location in candidates {
            let loaded = self.loader.load(location).map_err(|message| RuleError::TemplateError {
                uri: name.to_string(),
                message,
            })?;
            if let Some(rules) = loaded {
                return Ok(Cow::Owned(rules));
            }
        }
        Err(RuleError::TemplateNotFound {
            uri: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V2P1_MATCH: &str = "http://www.imsglobal.org/question/qti_v2p1/rptemplates/match_correct";

    #[test]
    fn test_inline_rules_take_precedence() {
        let resolver = TemplateResolver::standard(&BTreeMap::new());
        let processing = Processing {
            rules: vec![Rule::Exit(qti_core::ExitKind::Response)],
            template: Some(V2P1_MATCH.into()),
            template_location: None,
        };
        assert_eq!(resolver.resolve(&processing).unwrap().len(), 1);
        assert!(matches!(resolver.resolve(&processing).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_standard_uri_resolves() {
        let resolver = TemplateResolver::standard(&BTreeMap::new());
        let processing = Processing::from_template(V2P1_MATCH);
        let rules = resolver.resolve(&processing).unwrap();
        assert_eq!(&rules[..], match_correct().as_slice());
        let xml = format!("{}.xml", V2P1_MATCH.replace("v2p1", "v2p0"));
        assert!(resolver.resolve(&Processing::from_template(xml)).is_ok());
    }

    #[test]
    fn test_location_hint_is_the_fallback() {
        let mut loader = StaticTemplateLoader::new();
        loader.insert("local/custom.json", vec![Rule::Exit(qti_core::ExitKind::Response)]);
        let resolver = TemplateResolver::new(BTreeMap::new(), Arc::new(loader));
        let processing = Processing {
            rules: vec![],
            template: Some("https://example.org/unmapped".into()),
            template_location: Some("local/custom.json".into()),
        };
        assert_eq!(resolver.resolve(&processing).unwrap().len(), 1);
    }

    #[test]
    fn test_unresolvable_template() {
        let resolver = TemplateResolver::standard(&BTreeMap::new());
        let err = resolver
            .resolve(&Processing::from_template("https://example.org/none"))
            .unwrap_err();
        assert_eq!(
            err,
            RuleError::TemplateNotFound {
                uri: "https://example.org/none".into()
            }
        );
    }

    #[test]
    fn test_config_mapping_overrides_standard() {
        let mut extra = BTreeMap::new();
        extra.insert(V2P1_MATCH.to_string(), MAP_RESPONSE.to_string());
        let resolver = TemplateResolver::standard(&extra);
        assert_eq!(resolver.location(V2P1_MATCH), Some(MAP_RESPONSE));
    }
}
