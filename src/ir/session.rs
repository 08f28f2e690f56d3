//! One configuration run: declarations in, a frozen [`BuildPlan`] out.

use miette::Diagnostic;
use thiserror::Error;

use super::binder::{
    BindError, BinderOptions, OrderedCommandSequence, TargetPhaseBinder, TargetRegistry,
};
use super::graph::{BuildRuleGraph, GraphError, RuleId, TopoOrder};
use crate::normalize::{DirectoryContext, NormalizeError, RuleNormalizer};
use crate::parser::{ParseError, parse};
use crate::rule::{CustomCommand, OutputRuleSpec};

/// Any failure while processing a declaration.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum DeclarationError {
    /// The tokens did not form a declaration.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
    /// The declaration could not be normalised.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Normalize(#[from] NormalizeError),
    /// The rule conflicts with the graph.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
    /// The command names an unknown target.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Bind(#[from] BindError),
    /// No handler is registered under the command name.
    #[error("unknown command '{name}'")]
    #[diagnostic(
        code(rulegraph::registry::unknown_command),
        help("run `rulegraph describe` with a registered command name")
    )]
    UnknownCommand {
        /// Name as written.
        name: String,
    },
}

/// The single writer of a configuration run.
///
/// The first error poisons the session: later declarations and
/// [`Session::finish`] return that error again. Only a session without errors
/// yields a [`BuildPlan`], and only once the graph is known to be acyclic.
pub struct Session<'a> {
    normalizer: RuleNormalizer<'a>,
    registry: &'a dyn TargetRegistry,
    graph: BuildRuleGraph,
    binder: TargetPhaseBinder<'a>,
    failed: Option<DeclarationError>,
}

impl<'a> Session<'a> {
    /// Start a run declaring from `context` against the targets in `registry`.
    #[must_use]
    pub fn new(
        context: &'a dyn DirectoryContext,
        registry: &'a dyn TargetRegistry,
        options: BinderOptions,
    ) -> Self {
        Self {
            normalizer: RuleNormalizer::new(context),
            registry,
            graph: BuildRuleGraph::new(),
            binder: TargetPhaseBinder::new(registry, options),
            failed: None,
        }
    }

    /// Parse, normalise and record one declaration.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError`] when the tokens are malformed, an output
    /// rule has no outputs or clashes with an earlier rule, or a target is
    /// unknown. Once a declaration has failed, every later call returns that
    /// first error without looking at `tokens`.
    pub fn declare<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<(), DeclarationError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        self.accept(tokens)
            .inspect_err(|err| self.failed = Some(err.clone()))
    }

    fn accept<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<(), DeclarationError> {
        match self.normalizer.normalize(parse(tokens)?)? {
            CustomCommand::Output(spec) => self.insert_rule(spec)?,
            CustomCommand::TargetPhase(spec) => self.binder.bind(spec)?,
        }
        Ok(())
    }

    fn insert_rule(&mut self, spec: OutputRuleSpec) -> Result<(), DeclarationError> {
        if let Some(target) = &spec.attached_target
            && self.registry.target(target).is_none()
        {
            return Err(BindError::UnknownTarget {
                target: target.clone(),
            }
            .into());
        }
        self.graph.insert(spec)?;
        Ok(())
    }

    /// Number of output rules declared so far.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.graph.len()
    }

    /// Resolve the graph and freeze the run.
    ///
    /// # Errors
    ///
    /// Returns the first declaration error if any declaration failed, or
    /// [`DeclarationError::Graph`] when the rules form a cycle.
    pub fn finish(self) -> Result<BuildPlan<'a>, DeclarationError> {
        if let Some(err) = self.failed {
            return Err(err);
        }
        let order = self.graph.resolve_dependency_edges()?;
        tracing::info!(
            rules = self.graph.len(),
            external_inputs = self.graph.external_inputs().len(),
            bound_targets = self.binder.bound_targets().count(),
            "custom command graph resolved",
        );
        Ok(BuildPlan {
            graph: self.graph,
            order,
            binder: self.binder,
        })
    }
}

/// The read-only result of a successful [`Session`].
pub struct BuildPlan<'a> {
    graph: BuildRuleGraph,
    order: TopoOrder,
    binder: TargetPhaseBinder<'a>,
}

impl BuildPlan<'_> {
    /// The rule graph.
    #[must_use]
    pub const fn graph(&self) -> &BuildRuleGraph {
        &self.graph
    }

    /// The rules in dependency order.
    #[must_use]
    pub const fn order(&self) -> &TopoOrder {
        &self.order
    }

    /// The target-phase bindings.
    #[must_use]
    pub const fn binder(&self) -> &TargetPhaseBinder<'_> {
        &self.binder
    }

    /// Rules in dependency order.
    pub fn rules_in_order(&self) -> impl Iterator<Item = (RuleId, &OutputRuleSpec)> {
        self.order
            .iter()
            .filter_map(|id| self.graph.rule(id).map(|rule| (id, rule)))
    }

    /// The ordered command sequence of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnknownTarget`] when `target` is not registered.
    pub fn materialize(&self, target: &str) -> Result<OrderedCommandSequence, BindError> {
        self.binder.materialize(target)
    }
}
