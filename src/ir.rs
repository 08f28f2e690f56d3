//! Intermediate Representation of synthesised custom commands.
//!
//! Output rules live in a [`BuildRuleGraph`]; target-scoped commands live in a
//! [`TargetPhaseBinder`]. A [`Session`] feeds both from declarations and, once
//! every declaration is accepted, freezes them into a [`BuildPlan`].
//!
//! # Examples
//!
//! ```
//! use rulegraph::ir::{BinderOptions, BuildStep, Session, StepKind, TargetModel, TargetTable};
//! use rulegraph::normalize::DeclaringDirectory;
//!
//! let dir = DeclaringDirectory::new("/src");
//! let targets: TargetTable = [TargetModel::new("app", [BuildStep::new("link", StepKind::Link)])]
//!     .into_iter()
//!     .collect();
//! let mut session = Session::new(&dir, &targets, BinderOptions::default());
//! session.declare(&["OUTPUT", "gen.c", "COMMAND", "gen"]).expect("declare");
//! session.declare(&["TARGET", "app", "POST_BUILD", "COMMAND", "strip"]).expect("declare");
//! let plan = session.finish().expect("plan");
//! assert_eq!(plan.order().len(), 1);
//! assert_eq!(plan.materialize("app").expect("sequence").steps.len(), 2);
//! ```

mod binder;
mod cycle;
mod graph;
mod session;

pub use binder::{
    BindError, BinderOptions, BuildStep, OrderedCommandSequence, PreLinkFallback, SequenceStep,
    StepKind, TargetModel, TargetPhaseBinder, TargetRegistry, TargetTable,
};
pub use graph::{BuildRuleGraph, GraphError, RuleId, TopoOrder};
pub use session::{BuildPlan, DeclarationError, Session};
