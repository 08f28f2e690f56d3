//! Binding of target-scoped commands to build phases.
//!
//! Each target owns three command lists, one per [`Phase`]. Bindings only ever
//! append, so commands for the same phase run in declaration order. The lists
//! are merged with the target's intrinsic steps on demand by
//! [`TargetPhaseBinder::materialize`].

use indexmap::IndexMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Phase;
use crate::rule::TargetPhaseSpec;

/// Role of an intrinsic build step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Produces intermediate artefacts.
    #[default]
    Compile,
    /// Links or otherwise finalises the target's artefact.
    Link,
    /// Any other step owned by the target.
    Custom,
}

/// One of a target's own build steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Display name of the step.
    pub name: String,
    /// Role of the step.
    #[serde(default)]
    pub kind: StepKind,
}

impl BuildStep {
    /// Create a step.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A target known to the registry together with its intrinsic steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetModel {
    /// Target name used by `TARGET` declarations.
    pub name: String,
    /// Intrinsic steps in execution order.
    #[serde(default)]
    pub steps: Vec<BuildStep>,
}

impl TargetModel {
    /// Create a target with the given steps.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: impl IntoIterator<Item = BuildStep>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into_iter().collect(),
        }
    }

    /// Index of the first link step.
    #[must_use]
    pub fn link_step(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.kind == StepKind::Link)
    }
}

/// Resolves target names for the binder.
pub trait TargetRegistry {
    /// Look up a target by name.
    fn target(&self, name: &str) -> Option<&TargetModel>;
}

/// Insertion-ordered [`TargetRegistry`] backed by a map.
#[derive(Debug, Clone, Default)]
pub struct TargetTable {
    targets: IndexMap<String, TargetModel>,
}

impl TargetTable {
    /// Add or replace a target, returning the previous definition.
    pub fn insert(&mut self, model: TargetModel) -> Option<TargetModel> {
        self.targets.insert(model.name.clone(), model)
    }

    /// Targets in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TargetModel> {
        self.targets.values()
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl FromIterator<TargetModel> for TargetTable {
    fn from_iter<I: IntoIterator<Item = TargetModel>>(iter: I) -> Self {
        let mut table = Self::default();
        for model in iter {
            table.insert(model);
        }
        table
    }
}

impl TargetRegistry for TargetTable {
    fn target(&self, name: &str) -> Option<&TargetModel> {
        self.targets.get(name)
    }
}

/// Where `PRE_LINK` commands go when a target has no link step.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum PreLinkFallback {
    /// Immediately before the last intrinsic step.
    #[default]
    BeforeTerminal,
    /// After every intrinsic step, before `POST_BUILD` commands.
    AfterTerminal,
    /// Right after `PRE_BUILD` commands, before every intrinsic step.
    AfterPreBuild,
}

/// Tunables for [`TargetPhaseBinder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderOptions {
    /// Placement of `PRE_LINK` commands for targets without a link step.
    pub pre_link_fallback: PreLinkFallback,
}

/// Errors raised while binding target-scoped commands.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum BindError {
    /// The named target is not in the registry.
    #[error("unknown target '{target}'")]
    #[diagnostic(
        code(rulegraph::binder::unknown_target),
        help("declare the target before attaching custom commands to it")
    )]
    UnknownTarget {
        /// Name as written in the declaration.
        target: String,
    },
}

/// An entry of an [`OrderedCommandSequence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SequenceStep {
    /// A bound custom command.
    Command(TargetPhaseSpec),
    /// One of the target's own steps.
    Intrinsic(BuildStep),
}

/// Every step of one target, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderedCommandSequence {
    /// The target the sequence belongs to.
    pub target: String,
    /// Steps in execution order.
    pub steps: Vec<SequenceStep>,
}

#[derive(Debug, Clone, Default)]
struct PhaseCommands {
    pre_build: Vec<TargetPhaseSpec>,
    pre_link: Vec<TargetPhaseSpec>,
    post_build: Vec<TargetPhaseSpec>,
}

impl PhaseCommands {
    const fn list(&self, phase: Phase) -> &Vec<TargetPhaseSpec> {
        match phase {
            Phase::PreBuild => &self.pre_build,
            Phase::PreLink => &self.pre_link,
            Phase::PostBuild => &self.post_build,
        }
    }

    const fn list_mut(&mut self, phase: Phase) -> &mut Vec<TargetPhaseSpec> {
        match phase {
            Phase::PreBuild => &mut self.pre_build,
            Phase::PreLink => &mut self.pre_link,
            Phase::PostBuild => &mut self.post_build,
        }
    }
}

/// Per-target, per-phase registry of custom commands.
pub struct TargetPhaseBinder<'r> {
    registry: &'r dyn TargetRegistry,
    options: BinderOptions,
    bindings: IndexMap<String, PhaseCommands>,
}

impl<'r> TargetPhaseBinder<'r> {
    /// Create a binder resolving targets through `registry`.
    #[must_use]
    pub fn new(registry: &'r dyn TargetRegistry, options: BinderOptions) -> Self {
        Self {
            registry,
            options,
            bindings: IndexMap::new(),
        }
    }

    /// Append `spec` to its target's list for its phase.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnknownTarget`] when the registry does not know
    /// `spec.target_name`.
    pub fn bind(&mut self, spec: TargetPhaseSpec) -> Result<(), BindError> {
        if self.registry.target(&spec.target_name).is_none() {
            return Err(BindError::UnknownTarget {
                target: spec.target_name,
            });
        }
        tracing::debug!(target_name = %spec.target_name, phase = %spec.phase, "bound custom command");
        self.bindings
            .entry(spec.target_name.clone())
            .or_default()
            .list_mut(spec.phase)
            .push(spec);
        Ok(())
    }

    /// Commands bound to `target` for `phase`, in declaration order.
    #[must_use]
    pub fn commands(&self, target: &str, phase: Phase) -> &[TargetPhaseSpec] {
        self.bindings
            .get(target)
            .map_or(&[][..], |b| b.list(phase).as_slice())
    }

    /// Targets with at least one bound command, in first-binding order.
    pub fn bound_targets(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Merge `target`'s bound commands with its intrinsic steps.
    ///
    /// The result is `PRE_BUILD` commands, the intrinsic steps before the link
    /// step, `PRE_LINK` commands, the link step and any later steps, then
    /// `POST_BUILD` commands. Targets without a link step place `PRE_LINK`
    /// commands according to [`BinderOptions::pre_link_fallback`].
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnknownTarget`] when the registry does not know
    /// `target`.
    pub fn materialize(&self, target: &str) -> Result<OrderedCommandSequence, BindError> {
        let model = self
            .registry
            .target(target)
            .ok_or_else(|| BindError::UnknownTarget {
                target: target.to_owned(),
            })?;

        let steps = model.steps.as_slice();
        let split = model
            .link_step()
            .unwrap_or(match self.options.pre_link_fallback {
                PreLinkFallback::BeforeTerminal => steps.len().saturating_sub(1),
                PreLinkFallback::AfterTerminal => steps.len(),
                PreLinkFallback::AfterPreBuild => 0,
            });
        let (before_link, from_link) = steps.split_at_checked(split).unwrap_or((steps, &[]));

        let commands = |phase| {
            self.commands(target, phase)
                .iter()
                .cloned()
                .map(SequenceStep::Command)
        };
        let intrinsic = |slice: &[BuildStep]| {
            slice
                .iter()
                .cloned()
                .map(SequenceStep::Intrinsic)
                .collect::<Vec<_>>()
        };

        let mut sequence = Vec::with_capacity(steps.len());
        sequence.extend(commands(Phase::PreBuild));
        sequence.extend(intrinsic(before_link));
        sequence.extend(commands(Phase::PreLink));
        sequence.extend(intrinsic(from_link));
        sequence.extend(commands(Phase::PostBuild));
        Ok(OrderedCommandSequence {
            target: model.name.clone(),
            steps: sequence,
        })
    }
}
