//! Canonical custom command records.
//!
//! Values of these types come out of [`crate::normalize::RuleNormalizer`]:
//! paths are resolved, dependencies are deduplicated and every optional field
//! has its default filled in. Once handed to the graph or the binder they are
//! only ever read.

use camino::Utf8PathBuf;
use indexmap::IndexSet;
use serde::Serialize;

use crate::ast::{Invocation, Phase};

/// A rule producing `outputs` by running `command_line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRuleSpec {
    /// Distinct output paths; the first is the rule's canonical key.
    pub outputs: Vec<Utf8PathBuf>,
    /// The primary input, also present in `dependencies`.
    pub main_dependency: Option<Utf8PathBuf>,
    /// Every input, in first-seen order.
    pub dependencies: IndexSet<Utf8PathBuf>,
    /// Invocation steps run in order.
    pub command_line: Vec<Invocation>,
    /// Text shown while the rule runs.
    pub comment: String,
    /// Directory the command line runs in.
    pub working_directory: Utf8PathBuf,
    /// Target the rule was attached to by the legacy signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached_target: Option<String>,
}

impl OutputRuleSpec {
    /// Build a rule with the given outputs and command line and empty
    /// dependencies.
    ///
    /// The comment and working directory are left empty; callers going through
    /// the normaliser never see such values.
    #[must_use]
    pub fn new(outputs: Vec<Utf8PathBuf>, command_line: Vec<Invocation>) -> Self {
        Self {
            outputs,
            main_dependency: None,
            dependencies: IndexSet::new(),
            command_line,
            comment: String::new(),
            working_directory: Utf8PathBuf::new(),
            attached_target: None,
        }
    }

    /// Builder-style helper adding dependencies.
    #[must_use]
    pub fn with_dependencies<I, P>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// The canonical key: the first output path.
    #[must_use]
    pub fn primary_output(&self) -> Option<&Utf8PathBuf> {
        self.outputs.first()
    }
}

/// A command bound to one phase of an existing target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetPhaseSpec {
    /// Name of the owning target.
    pub target_name: String,
    /// When the command runs relative to the target's own steps.
    pub phase: Phase,
    /// Invocation steps run in order.
    pub command_line: Vec<Invocation>,
    /// Text shown while the command runs.
    pub comment: String,
    /// Directory the command line runs in.
    pub working_directory: Utf8PathBuf,
}

impl TargetPhaseSpec {
    /// Build a target-phase command with an empty comment and working
    /// directory.
    #[must_use]
    pub fn new(target_name: impl Into<String>, phase: Phase, command_line: Vec<Invocation>) -> Self {
        Self {
            target_name: target_name.into(),
            phase,
            command_line,
            comment: String::new(),
            working_directory: Utf8PathBuf::new(),
        }
    }
}

/// A normalised declaration, routed to the graph or the binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomCommand {
    /// Goes to [`crate::ir::BuildRuleGraph`].
    Output(OutputRuleSpec),
    /// Goes to [`crate::ir::TargetPhaseBinder`].
    TargetPhase(TargetPhaseSpec),
}
