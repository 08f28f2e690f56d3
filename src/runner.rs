//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! loads the manifest, replays its command calls through a [`CommandTable`]
//! and prints the requested view of the resulting plan.

use anyhow::{Context, Result, anyhow};
use camino::Utf8PathBuf;
use itertools::Itertools;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::ir::{BinderOptions, BuildPlan, SequenceStep, Session, TargetTable};
use crate::manifest::{self, RuleManifest};
use crate::normalize::DeclaringDirectory;
use crate::plan_report::PlanReport;
use crate::registry::CommandTable;
use crate::{dot_gen, ir::OrderedCommandSequence};

/// Execute the parsed [`Cli`] command, writing to standard output.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded, a declaration is
/// rejected, or writing the output fails.
pub fn run(cli: &Cli) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_with_writer(cli, &mut out)
}

/// Execute the parsed [`Cli`] command, writing to `out`.
///
/// # Errors
///
/// See [`run`].
pub fn run_with_writer(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let table = CommandTable::with_builtins();
    match cli.command.clone().unwrap_or(Commands::Plan) {
        Commands::Describe { name } => describe(&table, name.as_deref(), out),
        Commands::Plan => {
            let loaded = Loaded::from_cli(cli)?;
            let plan = loaded.plan(&table)?;
            let names = loaded.targets.iter().map(|t| t.name.as_str());
            let report = PlanReport::new(&plan, names)?;
            writeln!(out, "{}", report.to_json().context("serialising plan")?)?;
            Ok(())
        }
        Commands::Graph => {
            let loaded = Loaded::from_cli(cli)?;
            let plan = loaded.plan(&table)?;
            write!(out, "{}", dot_gen::generate(&plan))?;
            Ok(())
        }
        Commands::Sequence { target } => {
            let loaded = Loaded::from_cli(cli)?;
            let plan = loaded.plan(&table)?;
            let sequence = plan.materialize(&target)?;
            write_sequence(out, &sequence)?;
            Ok(())
        }
    }
}

/// Everything a [`Session`] borrows for one run.
struct Loaded {
    manifest: RuleManifest,
    directory: DeclaringDirectory,
    targets: TargetTable,
    options: BinderOptions,
}

impl Loaded {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let path = cli.manifest_path();
        let manifest = manifest::from_path(&path)
            .with_context(|| format!("loading manifest at {}", path.display()))?;
        let base = manifest_dir(&path)?;
        let directory = DeclaringDirectory::new(manifest.declaring_dir(&base));
        let mut options = manifest.options;
        if let Some(fallback) = cli.pre_link_fallback {
            options.pre_link_fallback = fallback;
        }
        debug!(?options, commands = manifest.commands.len(), "loaded manifest");
        Ok(Self {
            targets: manifest.target_table(),
            manifest,
            directory,
            options,
        })
    }

    /// Replay every command call; the first failure abandons the run.
    fn plan(&self, table: &CommandTable) -> Result<BuildPlan<'_>> {
        let mut session = Session::new(&self.directory, &self.targets, self.options);
        for (idx, call) in self.manifest.commands.iter().enumerate() {
            let position = idx + 1;
            let args = call
                .args
                .tokens()
                .with_context(|| format!("splitting arguments of command #{position}"))?;
            table
                .invoke(&call.name, &mut session, &args)
                .with_context(|| format!("in {} call #{position}", call.name))?;
        }
        let plan = session
            .finish()
            .context("resolving custom command graph")?;
        info!(rules = plan.order().len(), "build plan ready");
        Ok(plan)
    }
}

fn manifest_dir(path: &Path) -> Result<Utf8PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    Utf8PathBuf::from_path_buf(parent.to_path_buf())
        .map_err(|p| anyhow!("manifest directory {} is not valid UTF-8", p.display()))
}

fn describe(table: &CommandTable, name: Option<&str>, out: &mut impl Write) -> Result<()> {
    match name {
        Some(name) => {
            let definition = table
                .get(name)
                .ok_or_else(|| anyhow!("unknown command '{name}'"))?;
            writeln!(out, "{}: {}", definition.name, definition.summary)?;
            writeln!(out)?;
            write!(out, "{}", definition.documentation)?;
        }
        None => {
            for definition in table.iter() {
                writeln!(out, "{:<24}{}", definition.name, definition.summary)?;
            }
        }
    }
    Ok(())
}

/// Write one line per step: the phase or step name, then what runs.
fn write_sequence(out: &mut impl Write, sequence: &OrderedCommandSequence) -> io::Result<()> {
    for step in &sequence.steps {
        match step {
            SequenceStep::Command(spec) => {
                let commands = spec.command_line.iter().join(" && ");
                writeln!(out, "{}: {commands}", spec.phase)?;
            }
            SequenceStep::Intrinsic(step) => writeln!(out, "step: {}", step.name)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Invocation, Phase};
    use crate::ir::{BuildStep, StepKind};
    use crate::rule::TargetPhaseSpec;
    use rstest::rstest;

    #[rstest]
    fn sequence_lines_name_phase_and_command() {
        let sequence = OrderedCommandSequence {
            target: "app".into(),
            steps: vec![
                SequenceStep::Command(TargetPhaseSpec::new(
                    "app",
                    Phase::PreBuild,
                    vec![
                        Invocation::new("echo").with_args(["a"]),
                        Invocation::new("date"),
                    ],
                )),
                SequenceStep::Intrinsic(BuildStep::new("link", StepKind::Link)),
            ],
        };
        let mut out = Vec::new();
        write_sequence(&mut out, &sequence).expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "PRE_BUILD: echo a && date\nstep: link\n"
        );
    }

    #[rstest]
    #[case("Rulefile.json", ".")]
    #[case("sub/Rulefile.json", "sub")]
    fn manifest_dir_defaults_to_current(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(manifest_dir(Path::new(path)).expect("dir"), expected);
    }

    #[rstest]
    fn describe_lists_builtins() {
        let mut out = Vec::new();
        describe(&CommandTable::with_builtins(), None, &mut out).expect("describe");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("ADD_CUSTOM_COMMAND"));
    }
}
