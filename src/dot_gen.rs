//! Graphviz DOT rendering of the rule graph.
//!
//! Rules become boxes labelled with their outputs; external inputs become
//! ellipses. Edges point from what is needed to what needs it. Nodes appear in
//! dependency order so the output is deterministic.

use std::fmt::{self, Display, Formatter};

use camino::Utf8Path;
use itertools::Itertools;

use crate::ir::{BuildPlan, RuleId};

/// Render `plan` as a DOT digraph.
#[must_use]
pub fn generate(plan: &BuildPlan<'_>) -> String {
    DotGraph { plan }.to_string()
}

/// Escape a label for use inside a double-quoted DOT string.
fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

fn rule_node(id: RuleId) -> String {
    format!("r{}", id.index())
}

struct DotGraph<'p, 'a> {
    plan: &'p BuildPlan<'a>,
}

impl DotGraph<'_, '_> {
    fn input_nodes(&self) -> Vec<(&Utf8Path, String)> {
        self.plan
            .graph()
            .external_inputs()
            .into_iter()
            .enumerate()
            .map(|(idx, path)| (path, format!("i{idx}")))
            .collect()
    }
}

impl Display for DotGraph<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let graph = self.plan.graph();
        let inputs = self.input_nodes();

        writeln!(f, "digraph rules {{")?;
        writeln!(f, "  rankdir=LR;")?;
        for (path, node) in &inputs {
            writeln!(f, "  {node} [label=\"{}\", shape=ellipse];", escape(path.as_str()))?;
        }
        for (id, rule) in self.plan.rules_in_order() {
            let label = rule.outputs.iter().map(|p| escape(p.as_str())).join("\\n");
            writeln!(f, "  {} [label=\"{label}\", shape=box];", rule_node(id))?;
        }
        for (id, rule) in self.plan.rules_in_order() {
            for dep in graph.dependencies_of(id) {
                writeln!(f, "  {} -> {};", rule_node(dep), rule_node(id))?;
            }
            for dep in &rule.dependencies {
                if let Some((_, node)) = inputs.iter().find(|(path, _)| *path == dep.as_path()) {
                    writeln!(f, "  {node} -> {};", rule_node(id))?;
                }
            }
        }
        writeln!(f, "}}")
    }
}
