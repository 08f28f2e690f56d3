//! Command table mapping command names to handlers.
//!
//! A [`CommandTable`] is built once per run and passed by reference to
//! whatever drives the declarations. Lookups ignore ASCII case, matching how
//! build scripts spell command names.

use std::fmt;

use indexmap::IndexMap;

use crate::ir::{DeclarationError, Session};

/// Signature of a command handler.
pub type CommandHandler = fn(&mut Session<'_>, &[String]) -> Result<(), DeclarationError>;

/// A registered command and its documentation.
#[derive(Clone, Copy)]
pub struct CommandDefinition {
    /// Canonical, upper-case command name.
    pub name: &'static str,
    /// One-line summary.
    pub summary: &'static str,
    /// Full usage documentation.
    pub documentation: &'static str,
    /// Whether the command propagates into subdirectories.
    pub inherited: bool,
    /// Function processing the command's arguments.
    pub handler: CommandHandler,
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("summary", &self.summary)
            .field("inherited", &self.inherited)
            .finish_non_exhaustive()
    }
}

const ADD_CUSTOM_COMMAND_DOC: &str = "\
ADD_CUSTOM_COMMAND has two signatures.

The first adds a rule producing one or more files:

  ADD_CUSTOM_COMMAND(OUTPUT output [output...]
                     COMMAND command [ARGS [args...]]
                     [COMMAND command [ARGS [args...]] ...]
                     [MAIN_DEPENDENCY depend]
                     [DEPENDS [depends...]]
                     [WORKING_DIRECTORY dir]
                     [COMMENT comment])

The outputs are rebuilt by running every COMMAND in order whenever
MAIN_DEPENDENCY or one of DEPENDS changes. Dependencies produced by another
custom command are built first.

The second attaches a command to a phase of an existing target:

  ADD_CUSTOM_COMMAND(TARGET target
                     PRE_BUILD | PRE_LINK | POST_BUILD
                     COMMAND command [ARGS [args...]]
                     [WORKING_DIRECTORY dir]
                     [COMMENT comment])

PRE_BUILD runs before any other work for the target, PRE_LINK runs after
compilation and before linking, and POST_BUILD runs once the target has been
built.

The older form SOURCE source COMMAND command [ARGS ...] TARGET target
OUTPUTS output... is accepted as an output rule whose main dependency is
SOURCE.
";

fn add_custom_command(session: &mut Session<'_>, args: &[String]) -> Result<(), DeclarationError> {
    session.declare(args)
}

/// Registered commands keyed by upper-case name.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: IndexMap<String, CommandDefinition>,
}

impl CommandTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding the built-in commands.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register(CommandDefinition {
            name: "ADD_CUSTOM_COMMAND",
            summary: "Add a custom build rule to the generated build system.",
            documentation: ADD_CUSTOM_COMMAND_DOC,
            inherited: true,
            handler: add_custom_command,
        });
        table
    }

    /// Register `definition`, returning any definition it replaces.
    pub fn register(&mut self, definition: CommandDefinition) -> Option<CommandDefinition> {
        self.commands
            .insert(definition.name.to_ascii_uppercase(), definition)
    }

    /// Look a command up by name, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.get(&name.to_ascii_uppercase())
    }

    /// Registered commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.commands.values()
    }

    /// Dispatch `args` to the handler registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::UnknownCommand`] when nothing is registered
    /// under `name`, or whatever the handler returns.
    pub fn invoke(
        &self,
        name: &str,
        session: &mut Session<'_>,
        args: &[String],
    ) -> Result<(), DeclarationError> {
        let definition = self
            .get(name)
            .ok_or_else(|| DeclarationError::UnknownCommand {
                name: name.to_owned(),
            })?;
        (definition.handler)(session, args)
    }
}
