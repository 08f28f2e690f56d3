//! Normalisation of parsed declarations into canonical records.
//!
//! Relative paths are resolved against the directory that made the
//! declaration. Resolution is purely lexical: `.` components are dropped and
//! `..` pops the previous component, without consulting the filesystem.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use miette::Diagnostic;
use thiserror::Error;

use crate::ast::{Declaration, Invocation, RawOutputRule, RawTargetPhase};
use crate::rule::{CustomCommand, OutputRuleSpec, TargetPhaseSpec};

/// Supplies the declaring scope for path resolution.
pub trait DirectoryContext {
    /// Directory the declaration was made in.
    fn declaring_dir(&self) -> &Utf8Path;

    /// Resolve `path` against [`Self::declaring_dir`].
    fn resolve(&self, path: &str) -> Utf8PathBuf {
        clean_path(&self.declaring_dir().join(path))
    }
}

/// A fixed declaring directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaringDirectory {
    dir: Utf8PathBuf,
}

impl DeclaringDirectory {
    /// Use `dir` as the declaring directory.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dir: clean_path(&dir.into()),
        }
    }
}

impl DirectoryContext for DeclaringDirectory {
    fn declaring_dir(&self) -> &Utf8Path {
        &self.dir
    }
}

/// Errors raised while normalising a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum NormalizeError {
    /// An output rule named no outputs.
    #[error("custom command '{command}' does not declare any OUTPUT")]
    #[diagnostic(
        code(rulegraph::normalize::empty_output_set),
        help("list at least one path after OUTPUT")
    )]
    EmptyOutputSet {
        /// The first invocation of the rule, for identification.
        command: String,
    },
}

/// Turns parsed declarations into canonical records.
pub struct RuleNormalizer<'a> {
    context: &'a dyn DirectoryContext,
}

impl<'a> RuleNormalizer<'a> {
    /// Create a normaliser resolving paths through `context`.
    #[must_use]
    pub fn new(context: &'a dyn DirectoryContext) -> Self {
        Self { context }
    }

    /// Normalise either declaration form.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::EmptyOutputSet`] for an output rule without
    /// outputs.
    pub fn normalize(&self, declaration: Declaration) -> Result<CustomCommand, NormalizeError> {
        match declaration {
            Declaration::Output(raw) => self.output_rule(raw).map(CustomCommand::Output),
            Declaration::TargetPhase(raw) => Ok(CustomCommand::TargetPhase(self.target_phase(raw))),
        }
    }

    /// Normalise an output rule.
    ///
    /// Output order is preserved; a path repeated in the output list is kept
    /// once, at its first position.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::EmptyOutputSet`] when `raw.outputs` is empty.
    pub fn output_rule(&self, raw: RawOutputRule) -> Result<OutputRuleSpec, NormalizeError> {
        let mut outputs: IndexSet<Utf8PathBuf> = IndexSet::with_capacity(raw.outputs.len());
        for out in &raw.outputs {
            let resolved = self.context.resolve(out);
            if !outputs.insert(resolved) {
                tracing::warn!(output = %out, "output listed twice in one rule; keeping the first");
            }
        }
        let Some(first) = outputs.first() else {
            return Err(NormalizeError::EmptyOutputSet {
                command: describe_command(&raw.command_line),
            });
        };
        let comment = raw
            .comment
            .unwrap_or_else(|| format!("Generating {first}"));

        let main_dependency = raw.main_dependency.as_deref().map(|p| self.context.resolve(p));
        let mut dependencies: IndexSet<Utf8PathBuf> = IndexSet::new();
        dependencies.extend(main_dependency.iter().cloned());
        dependencies.extend(raw.depends.iter().map(|p| self.context.resolve(p)));

        Ok(OutputRuleSpec {
            outputs: outputs.into_iter().collect(),
            main_dependency,
            dependencies,
            command_line: raw.command_line,
            comment,
            working_directory: self.working_directory(raw.working_directory.as_deref()),
            attached_target: raw.attached_target,
        })
    }

    /// Normalise a target-phase declaration.
    #[must_use]
    pub fn target_phase(&self, raw: RawTargetPhase) -> TargetPhaseSpec {
        let comment = raw
            .comment
            .unwrap_or_else(|| format!("Running {} command for {}", raw.phase, raw.target));
        TargetPhaseSpec {
            working_directory: self.working_directory(raw.working_directory.as_deref()),
            target_name: raw.target,
            phase: raw.phase,
            command_line: raw.command_line,
            comment,
        }
    }

    fn working_directory(&self, dir: Option<&str>) -> Utf8PathBuf {
        dir.map_or_else(
            || self.context.declaring_dir().to_path_buf(),
            |d| self.context.resolve(d),
        )
    }
}

fn describe_command(command_line: &[Invocation]) -> String {
    command_line
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Lexically normalise `path`.
///
/// `..` at the root is dropped; leading `..` of a relative path is kept.
///
/// ```rust
/// use camino::Utf8Path;
/// use rulegraph::normalize::clean_path;
///
/// assert_eq!(clean_path(Utf8Path::new("/src/./gen/../out.c")), "/src/out.c");
/// assert_eq!(clean_path(Utf8Path::new("../a/./b")), "../a/b");
/// ```
#[must_use]
pub fn clean_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match out.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    out.pop();
                }
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                Some(Utf8Component::ParentDir | Utf8Component::CurDir) | None => out.push(".."),
            },
            other => out.push(other.as_str()),
        }
    }
    if out.as_str().is_empty() {
        out.push(".");
    }
    out
}
