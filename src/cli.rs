//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::ir::PreLinkFallback;

/// Default manifest file name.
pub const DEFAULT_MANIFEST: &str = "Rulefile.json";

/// Turns custom command declarations into an ordered, cycle-checked rule graph.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the rule manifest to use.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_MANIFEST)]
    pub file: PathBuf,

    /// Change to this directory before doing anything.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Enable verbose logging output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Where PRE_LINK commands run for targets without a link step.
    ///
    /// Overrides the manifest's `options.pre_link_fallback`.
    #[arg(long, value_name = "MODE", value_enum)]
    pub pre_link_fallback: Option<PreLinkFallback>,

    /// Optional subcommand to execute; defaults to `plan` when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply the default command if none was specified.
    #[must_use]
    pub fn with_default_command(mut self) -> Self {
        if self.command.is_none() {
            self.command = Some(Commands::Plan);
        }
        self
    }

    /// Path of the manifest after applying `--directory`.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.directory
            .as_ref()
            .map_or_else(|| self.file.clone(), |dir| dir.join(&self.file))
    }
}

/// Available top-level commands.
#[derive(Debug, Subcommand, PartialEq, Eq, Clone)]
pub enum Commands {
    /// Print the resolved build plan as JSON.
    Plan,

    /// Display the rule dependency graph in DOT format for visualization.
    Graph,

    /// Print the ordered command sequence of one target.
    Sequence {
        /// Target whose sequence to print.
        #[arg(value_name = "TARGET")]
        target: String,
    },

    /// Print the documentation of a registered command, or list them all.
    Describe {
        /// Command name, case-insensitive.
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },
}
