//! Parsed custom command declarations.
//!
//! These records are the direct output of [`crate::parser::parse`]. They keep
//! the paths exactly as written by the user; resolution and defaulting happen
//! later in [`crate::normalize`].
//!
//! ```rust
//! use rulegraph::ast::{Declaration, Phase};
//! use rulegraph::parser::parse;
//!
//! let tokens = ["TARGET", "app", "POST_BUILD", "COMMAND", "strip", "app"];
//! let Declaration::TargetPhase(decl) = parse(&tokens).expect("parse") else {
//!     panic!("expected a target-phase declaration");
//! };
//! assert_eq!(decl.phase, Phase::PostBuild);
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// One step of a command line: an executable and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invocation {
    /// Program to run.
    pub executable: String,
    /// Arguments passed to the program, in order.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Invocation {
    /// Create an invocation with no arguments.
    #[must_use]
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
        }
    }

    /// Builder-style helper appending arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.executable)?;
        for arg in &self.args {
            let quoted = shlex::try_quote(arg).unwrap_or(Cow::Borrowed(arg.as_str()));
            write!(f, " {quoted}")?;
        }
        Ok(())
    }
}

/// Point in a target's build at which a target-scoped command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Before any other work for the target.
    PreBuild,
    /// After compilation, immediately before the link step.
    PreLink,
    /// After the target's final artefact exists.
    PostBuild,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Self; 3] = [Self::PreBuild, Self::PreLink, Self::PostBuild];

    /// The declaration keyword selecting this phase.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::PreBuild => "PRE_BUILD",
            Self::PreLink => "PRE_LINK",
            Self::PostBuild => "POST_BUILD",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// "Build these outputs from this command", as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutputRule {
    /// Output paths in declaration order. May be empty here; normalisation
    /// rejects an empty set.
    pub outputs: Vec<String>,
    /// The `MAIN_DEPENDENCY` (or legacy `SOURCE`) path.
    pub main_dependency: Option<String>,
    /// `DEPENDS` paths, duplicates allowed.
    pub depends: Vec<String>,
    /// Invocation steps in the order their `COMMAND` sections appeared.
    pub command_line: Vec<Invocation>,
    /// Joined `COMMENT` text.
    pub comment: Option<String>,
    /// `WORKING_DIRECTORY` as written.
    pub working_directory: Option<String>,
    /// Target named by the legacy `TARGET … OUTPUTS …` signature.
    pub attached_target: Option<String>,
}

/// "Run this command while building this target", as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTargetPhase {
    /// Name of the target the command belongs to.
    pub target: String,
    /// Phase selected by `PRE_BUILD`, `PRE_LINK` or `POST_BUILD`.
    pub phase: Phase,
    /// Invocation steps in declaration order.
    pub command_line: Vec<Invocation>,
    /// Joined `COMMENT` text.
    pub comment: Option<String>,
    /// `WORKING_DIRECTORY` as written.
    pub working_directory: Option<String>,
}

/// Either of the two declaration signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// `OUTPUT …` form.
    Output(RawOutputRule),
    /// `TARGET … PRE_BUILD|PRE_LINK|POST_BUILD …` form.
    TargetPhase(RawTargetPhase),
}
