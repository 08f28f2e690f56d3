//! The output-keyed build-rule graph.
//!
//! Rules are stored in an arena in insertion order. Every output path maps to
//! the arena slot of the rule producing it, so a multi-output rule is a single
//! node reachable through any of its outputs. Edges are never stored: they are
//! derived by looking dependency paths up in the output map.

use std::collections::{BTreeSet, HashMap};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use itertools::Itertools;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use super::cycle;
use crate::rule::OutputRuleSpec;

/// Index of a rule in a [`BuildRuleGraph`], equal to its declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RuleId(usize);

impl RuleId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the rule in declaration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Errors raised while building or resolving the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum GraphError {
    /// A rule was inserted without outputs.
    #[error("custom command rule has no outputs")]
    #[diagnostic(code(rulegraph::graph::empty_output_set))]
    EmptyOutputSet,
    /// Two rules claim the same output.
    #[error("output '{path}' is already produced by the rule for '{existing}'")]
    #[diagnostic(
        code(rulegraph::graph::duplicate_output),
        help("each output may be produced by a single custom command")
    )]
    DuplicateOutput {
        /// The contested output.
        path: Utf8PathBuf,
        /// Canonical key of the rule that claimed it first.
        existing: Utf8PathBuf,
    },
    /// The dependency edges form a cycle.
    #[error("circular dependency detected: {}", .cycle.iter().join(" -> "))]
    #[diagnostic(
        code(rulegraph::graph::cyclic_dependency),
        help("remove one of the DEPENDS entries forming the cycle")
    )]
    CyclicDependency {
        /// Canonical keys of the rules in the cycle, starting from the
        /// smallest and ending where it started.
        cycle: Vec<Utf8PathBuf>,
    },
}

/// Rules in an order where every rule follows the rules it depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TopoOrder {
    order: Vec<RuleId>,
}

impl TopoOrder {
    /// Iterate the rule identifiers in order.
    pub fn iter(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.order.iter().copied()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the order is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<'a> IntoIterator for &'a TopoOrder {
    type Item = RuleId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, RuleId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter().copied()
    }
}

/// Insertion-ordered collection of output rules keyed by output path.
#[derive(Debug, Clone, Default)]
pub struct BuildRuleGraph {
    rules: Vec<OutputRuleSpec>,
    outputs: HashMap<Utf8PathBuf, RuleId>,
}

impl BuildRuleGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, registering every output as a key for it.
    ///
    /// Nothing is registered when the insert fails.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateOutput`] when an output already belongs
    /// to another rule and [`GraphError::EmptyOutputSet`] when `spec` has no
    /// outputs.
    pub fn insert(&mut self, spec: OutputRuleSpec) -> Result<RuleId, GraphError> {
        let Some(primary) = spec.primary_output() else {
            return Err(GraphError::EmptyOutputSet);
        };
        let clash = spec
            .outputs
            .iter()
            .find_map(|path| self.outputs.get(path).map(|id| (path, *id)));
        if let Some((path, existing)) = clash {
            return Err(GraphError::DuplicateOutput {
                path: path.clone(),
                existing: self.canonical_key(existing).cloned().unwrap_or_default(),
            });
        }

        let id = RuleId::new(self.rules.len());
        tracing::debug!(rule = %primary, outputs = spec.outputs.len(), "registered custom command rule");
        for out in &spec.outputs {
            self.outputs.insert(out.clone(), id);
        }
        self.rules.push(spec);
        Ok(id)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the graph holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule stored under `id`.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&OutputRuleSpec> {
        self.rules.get(id.index())
    }

    /// All rules in insertion order.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &OutputRuleSpec)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(idx, rule)| (RuleId::new(idx), rule))
    }

    /// The rule producing `path`, if any.
    #[must_use]
    pub fn producer_of(&self, path: &Utf8Path) -> Option<RuleId> {
        self.outputs.get(path).copied()
    }

    /// The first output of the rule stored under `id`.
    #[must_use]
    pub fn canonical_key(&self, id: RuleId) -> Option<&Utf8PathBuf> {
        self.rule(id).and_then(OutputRuleSpec::primary_output)
    }

    /// Rules that `id` depends on, in the order their outputs first appear in
    /// its dependency list.
    #[must_use]
    pub fn dependencies_of(&self, id: RuleId) -> Vec<RuleId> {
        self.rule(id).map_or_else(Vec::new, |rule| {
            rule.dependencies
                .iter()
                .filter_map(|dep| self.producer_of(dep))
                .unique()
                .collect()
        })
    }

    /// Dependency paths that no rule produces, in first-seen order.
    #[must_use]
    pub fn external_inputs(&self) -> IndexSet<&Utf8Path> {
        self.rules
            .iter()
            .flat_map(|rule| rule.dependencies.iter())
            .filter(|dep| !self.outputs.contains_key(*dep))
            .map(Utf8PathBuf::as_path)
            .collect()
    }

    /// Derive the dependency edges, reject cycles and order the rules.
    ///
    /// Rules without an ordering constraint between them keep their insertion
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CyclicDependency`] naming the canonical keys of
    /// the rules in the first cycle found.
    pub fn resolve_dependency_edges(&self) -> Result<TopoOrder, GraphError> {
        let edges = self.derive_edges();
        if let Some(ids) = cycle::find_cycle(&edges) {
            let paths = ids
                .into_iter()
                .filter_map(|id| self.canonical_key(id).cloned())
                .collect();
            return Err(GraphError::CyclicDependency {
                cycle: cycle::canonicalize_cycle(paths),
            });
        }
        Ok(TopoOrder {
            order: stable_topological_order(&edges),
        })
    }

    fn derive_edges(&self) -> Vec<Vec<RuleId>> {
        self.rules()
            .map(|(id, rule)| {
                for dep in rule.dependencies.iter().filter(|d| !self.outputs.contains_key(*d)) {
                    tracing::debug!(
                        input = %dep,
                        dependent = %rule.primary_output().map(|p| p.as_str()).unwrap_or_default(),
                        "treating unmatched dependency as an external input",
                    );
                }
                self.dependencies_of(id)
            })
            .collect()
    }
}

/// Kahn's algorithm, always releasing the lowest ready index first.
///
/// `edges` must be acyclic.
fn stable_topological_order(edges: &[Vec<RuleId>]) -> Vec<RuleId> {
    let mut pending: Vec<usize> = edges.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<RuleId>> = vec![Vec::new(); edges.len()];
    for (idx, deps) in edges.iter().enumerate() {
        for dep in deps {
            if let Some(list) = dependents.get_mut(dep.index()) {
                list.push(RuleId::new(idx));
            }
        }
    }

    let mut ready: BTreeSet<RuleId> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(idx, _)| RuleId::new(idx))
        .collect();
    let mut order = Vec::with_capacity(edges.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for dependent in dependents.get(next.index()).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent.index()) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }
    debug_assert_eq!(order.len(), edges.len(), "edges must be acyclic");
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Invocation;
    use rstest::rstest;

    fn rule(outputs: &[&str], deps: &[&str]) -> OutputRuleSpec {
        OutputRuleSpec::new(
            outputs.iter().copied().map(Utf8PathBuf::from).collect(),
            vec![Invocation::new("touch")],
        )
        .with_dependencies(deps.iter().copied())
    }

    fn keys(graph: &BuildRuleGraph, order: &TopoOrder) -> Vec<String> {
        order
            .iter()
            .filter_map(|id| graph.canonical_key(id))
            .map(ToString::to_string)
            .collect()
    }

    #[rstest]
    fn multi_output_rule_is_one_node() {
        let mut graph = BuildRuleGraph::new();
        let id = graph.insert(rule(&["a.c", "a.h"], &[])).expect("insert");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.producer_of(Utf8Path::new("a.c")), Some(id));
        assert_eq!(graph.producer_of(Utf8Path::new("a.h")), Some(id));
    }

    #[rstest]
    fn failed_insert_leaves_graph_untouched() {
        let mut graph = BuildRuleGraph::new();
        graph.insert(rule(&["b"], &[])).expect("insert");
        let err = graph.insert(rule(&["a", "b"], &[])).expect_err("duplicate");
        assert_eq!(
            err,
            GraphError::DuplicateOutput {
                path: "b".into(),
                existing: "b".into(),
            }
        );
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.producer_of(Utf8Path::new("a")), None);
    }

    #[rstest]
    fn empty_rule_is_rejected() {
        let mut graph = BuildRuleGraph::new();
        assert_eq!(graph.insert(rule(&[], &[])), Err(GraphError::EmptyOutputSet));
    }

    #[rstest]
    fn depending_on_any_output_depends_on_the_rule() {
        let mut graph = BuildRuleGraph::new();
        let user = graph.insert(rule(&["main.o"], &["gen.h", "main.c"])).expect("insert");
        let generator = graph.insert(rule(&["gen.c", "gen.h"], &[])).expect("insert");
        assert_eq!(graph.dependencies_of(user), vec![generator]);

        let order = graph.resolve_dependency_edges().expect("acyclic");
        assert_eq!(keys(&graph, &order), ["gen.c", "main.o"]);
    }

    #[rstest]
    fn ties_follow_insertion_order() {
        let mut graph = BuildRuleGraph::new();
        graph.insert(rule(&["d"], &["b", "c"])).expect("insert");
        graph.insert(rule(&["c"], &[])).expect("insert");
        graph.insert(rule(&["b"], &["a"])).expect("insert");
        graph.insert(rule(&["a"], &[])).expect("insert");
        graph.insert(rule(&["z"], &[])).expect("insert");

        let order = graph.resolve_dependency_edges().expect("acyclic");
        assert_eq!(keys(&graph, &order), ["c", "a", "b", "d", "z"]);
    }

    #[rstest]
    fn long_dependency_chain_resolves() {
        const LEN: usize = 50_000;
        let mut graph = BuildRuleGraph::new();
        for idx in 0..LEN {
            let output = format!("o{idx}");
            let next = format!("o{}", idx + 1);
            graph
                .insert(rule(&[output.as_str()], &[next.as_str()]))
                .expect("insert");
        }
        let order = graph.resolve_dependency_edges().expect("acyclic");
        assert_eq!(order.len(), LEN);
        let first = order.iter().next().and_then(|id| graph.canonical_key(id));
        assert_eq!(first.map(Utf8PathBuf::as_path), Some(Utf8Path::new("o49999")));
    }

    #[rstest]
    fn self_dependency_is_a_cycle() {
        let mut graph = BuildRuleGraph::new();
        graph.insert(rule(&["a"], &["a"])).expect("insert");
        let err = graph.resolve_dependency_edges().expect_err("cycle");
        assert_eq!(
            err,
            GraphError::CyclicDependency {
                cycle: vec!["a".into(), "a".into()],
            }
        );
    }

    #[rstest]
    fn external_inputs_are_reported_once() {
        let mut graph = BuildRuleGraph::new();
        graph.insert(rule(&["a"], &["src.txt", "tool"])).expect("insert");
        graph.insert(rule(&["b"], &["a", "src.txt"])).expect("insert");
        let inputs: Vec<&str> = graph.external_inputs().into_iter().map(Utf8Path::as_str).collect();
        assert_eq!(inputs, ["src.txt", "tool"]);
    }

    #[rstest]
    fn cycle_message_lists_the_path() {
        let err = GraphError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "circular dependency detected: a -> b -> a");
    }
}
