//! Rule manifest loading.
//!
//! A manifest is a JSON document naming the declaring directory, the targets
//! custom commands may attach to, and the command calls to replay:
//!
//! ```json
//! {
//!   "directory": "/src/project",
//!   "targets": [{ "name": "app", "steps": [{ "name": "link", "kind": "link" }] }],
//!   "commands": [
//!     { "args": "OUTPUT gen.c COMMAND gen ARGS -o gen.c" },
//!     { "name": "add_custom_command", "args": ["TARGET", "app", "POST_BUILD", "COMMAND", "strip"] }
//!   ]
//! }
//! ```
//!
//! String arguments are split with shell-like rules before reaching the
//! engine.

use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::ir::{BinderOptions, TargetModel, TargetTable};

/// Command name used when a call does not name one.
pub const DEFAULT_COMMAND: &str = "ADD_CUSTOM_COMMAND";

fn default_command() -> String {
    DEFAULT_COMMAND.to_owned()
}

/// Arguments given either as one shell-like string or as a token list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arguments {
    /// A single string, split with shell quoting rules.
    Line(String),
    /// Tokens used verbatim.
    List(Vec<String>),
}

impl Arguments {
    /// The argument tokens.
    ///
    /// # Errors
    ///
    /// Returns an error when a string form has unbalanced quotes.
    pub fn tokens(&self) -> Result<Vec<String>> {
        match self {
            Self::Line(line) => {
                shlex::split(line).ok_or_else(|| anyhow!("unbalanced quoting in '{line}'"))
            }
            Self::List(tokens) => Ok(tokens.clone()),
        }
    }
}

/// One command call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandCall {
    /// Registered command name; `ADD_CUSTOM_COMMAND` when omitted.
    #[serde(default = "default_command")]
    pub name: String,
    /// The call's arguments.
    pub args: Arguments,
}

/// A parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleManifest {
    /// Declaring directory. Relative values are taken relative to the
    /// manifest's own directory.
    #[serde(default)]
    pub directory: Option<Utf8PathBuf>,
    /// Targets custom commands may attach to.
    #[serde(default)]
    pub targets: Vec<TargetModel>,
    /// Binder tunables; command-line flags take precedence.
    #[serde(default)]
    pub options: BinderOptions,
    /// Command calls in declaration order.
    #[serde(default)]
    pub commands: Vec<CommandCall>,
}

impl RuleManifest {
    /// The targets as a registry.
    #[must_use]
    pub fn target_table(&self) -> TargetTable {
        self.targets.iter().cloned().collect()
    }

    /// The declaring directory, resolved against `base`.
    #[must_use]
    pub fn declaring_dir(&self, base: &Utf8Path) -> Utf8PathBuf {
        self.directory
            .as_ref()
            .map_or_else(|| base.to_path_buf(), |dir| base.join(dir))
    }
}

/// Parse a manifest from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON does not describe a manifest.
pub fn from_str(json: &str) -> Result<RuleManifest> {
    serde_json::from_str(json).context("parsing rule manifest")
}

/// Load a [`RuleManifest`] from the given file path.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON fails to parse.
pub fn from_path(path: impl AsRef<Path>) -> Result<RuleManifest> {
    let path_ref = path.as_ref();
    let data = fs::read_to_string(path_ref)
        .with_context(|| format!("failed to read {}", path_ref.display()))?;
    from_str(&data).with_context(|| format!("in {}", path_ref.display()))
}
