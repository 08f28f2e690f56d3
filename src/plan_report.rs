//! JSON view of a [`BuildPlan`].
//!
//! The report lists rules in dependency order together with the canonical keys
//! of the rules each one waits for, the external inputs, and the materialised
//! command sequence of every requested target.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::hasher::RuleHasher;
use crate::ir::{BindError, BuildPlan, OrderedCommandSequence};
use crate::rule::OutputRuleSpec;

/// Length of the rule fingerprint shown in reports.
pub const RULE_ID_LEN: usize = 16;

/// One rule of the report.
#[derive(Debug, Serialize)]
pub struct RuleReport<'a> {
    /// Short fingerprint from [`RuleHasher`].
    pub id: String,
    /// Declaration index.
    pub index: usize,
    /// Canonical keys of the rules this one depends on.
    pub after: Vec<&'a Utf8PathBuf>,
    /// The rule itself.
    #[serde(flatten)]
    pub rule: &'a OutputRuleSpec,
}

/// Serializable summary of a plan.
#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    /// Rules in dependency order.
    pub rules: Vec<RuleReport<'a>>,
    /// Dependencies not produced by any rule.
    pub external_inputs: Vec<&'a Utf8Path>,
    /// Command sequences of the requested targets.
    pub targets: Vec<OrderedCommandSequence>,
}

impl<'a> PlanReport<'a> {
    /// Build a report for `plan`, materialising every target in `targets`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnknownTarget`] if a requested target is not
    /// registered.
    pub fn new<'t>(
        plan: &'a BuildPlan<'_>,
        targets: impl IntoIterator<Item = &'t str>,
    ) -> Result<Self, BindError> {
        let graph = plan.graph();
        let rules = plan
            .rules_in_order()
            .map(|(id, rule)| RuleReport {
                id: RuleHasher::short(rule, RULE_ID_LEN),
                index: id.index(),
                after: graph
                    .dependencies_of(id)
                    .into_iter()
                    .filter_map(|dep| graph.canonical_key(dep))
                    .collect(),
                rule,
            })
            .collect();
        let targets = targets
            .into_iter()
            .map(|name| plan.materialize(name))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            rules,
            external_inputs: graph.external_inputs().into_iter().collect(),
            targets,
        })
    }

    /// Render the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
