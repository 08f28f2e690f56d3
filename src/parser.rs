//! Token-level parsing of `ADD_CUSTOM_COMMAND` arguments.
//!
//! The argument list is already split into tokens. Parsing first decides which
//! signature is present, then groups every token under the keyword preceding
//! it and validates the groups for that signature.

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::{Declaration, Invocation, Phase, RawOutputRule, RawTargetPhase};

/// Structural problems detected while parsing a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformed {
    /// Neither `OUTPUT`/`OUTPUTS` nor `TARGET` was present.
    #[error("expected an OUTPUT or TARGET signature")]
    MissingSignature,
    /// A value appeared before the first keyword.
    #[error("unexpected value '{value}' before any keyword")]
    ValueBeforeKeyword {
        /// The stray token.
        value: String,
    },
    /// A `COMMAND` keyword with nothing after it.
    #[error("COMMAND requires an executable")]
    EmptyCommand,
    /// No `COMMAND` keyword at all.
    #[error("at least one COMMAND is required")]
    MissingCommand,
    /// `ARGS` with no preceding `COMMAND`.
    #[error("ARGS must follow a COMMAND")]
    ArgsWithoutCommand,
    /// A keyword that needs a value was given none.
    #[error("{keyword} requires a value")]
    MissingValue {
        /// Keyword as spelled canonically.
        keyword: &'static str,
    },
    /// A single-valued keyword received several values.
    #[error("{keyword} accepts a single value but {found} were given")]
    ExpectedSingleValue {
        /// Keyword as spelled canonically.
        keyword: &'static str,
        /// Number of values supplied.
        found: usize,
    },
    /// A keyword that may only appear once was repeated.
    #[error("{keyword} may only be given once")]
    RepeatedKeyword {
        /// Keyword as spelled canonically.
        keyword: &'static str,
    },
    /// More than one phase keyword in a target declaration.
    #[error("{first} and {second} are mutually exclusive")]
    ConflictingPhases {
        /// The phase seen first.
        first: Phase,
        /// The conflicting phase.
        second: Phase,
    },
    /// Target declaration without a phase keyword.
    #[error("TARGET {target} requires one of PRE_BUILD, PRE_LINK or POST_BUILD")]
    MissingPhase {
        /// Target named by the declaration.
        target: String,
    },
    /// A phase keyword followed by values.
    #[error("{phase} takes no values but got '{value}'")]
    PhaseWithValues {
        /// The phase keyword.
        phase: Phase,
        /// First unexpected value.
        value: String,
    },
    /// A phase keyword in the `OUTPUT` signature.
    #[error("{phase} is only valid together with TARGET")]
    PhaseWithoutTarget {
        /// The phase keyword.
        phase: Phase,
    },
    /// An output-only keyword in the `TARGET` signature.
    #[error("{keyword} is only valid together with OUTPUT")]
    OutputOnlyKeyword {
        /// Keyword as spelled canonically.
        keyword: &'static str,
    },
}

/// Errors produced by [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ParseError {
    /// The token list does not form a valid declaration.
    #[error("malformed custom command: {reason}")]
    #[diagnostic(
        code(rulegraph::parse::malformed_spec),
        help("run `rulegraph describe add_custom_command` to list the accepted signatures")
    )]
    MalformedSpec {
        /// What was wrong.
        reason: Malformed,
    },
}

impl From<Malformed> for ParseError {
    fn from(reason: Malformed) -> Self {
        Self::MalformedSpec { reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Output,
    Target,
    MainDependency,
    Source,
    Depends,
    Phase(Phase),
    Common(CommonKeyword),
}

/// Keywords shared by both signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommonKeyword {
    Command,
    Args,
    Comment,
    WorkingDirectory,
}

impl Keyword {
    fn from_token(token: &str) -> Option<Self> {
        let keyword = match token {
            "OUTPUT" | "OUTPUTS" => Self::Output,
            "TARGET" => Self::Target,
            "MAIN_DEPENDENCY" => Self::MainDependency,
            "SOURCE" => Self::Source,
            "DEPENDS" => Self::Depends,
            "PRE_BUILD" => Self::Phase(Phase::PreBuild),
            "PRE_LINK" => Self::Phase(Phase::PreLink),
            "POST_BUILD" => Self::Phase(Phase::PostBuild),
            "COMMAND" => Self::Common(CommonKeyword::Command),
            "ARGS" => Self::Common(CommonKeyword::Args),
            "COMMENT" => Self::Common(CommonKeyword::Comment),
            "WORKING_DIRECTORY" => Self::Common(CommonKeyword::WorkingDirectory),
            _ => return None,
        };
        Some(keyword)
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Output => "OUTPUT",
            Self::Target => "TARGET",
            Self::MainDependency => "MAIN_DEPENDENCY",
            Self::Source => "SOURCE",
            Self::Depends => "DEPENDS",
            Self::Phase(phase) => phase.keyword(),
            Self::Common(CommonKeyword::Command) => "COMMAND",
            Self::Common(CommonKeyword::Args) => "ARGS",
            Self::Common(CommonKeyword::Comment) => "COMMENT",
            Self::Common(CommonKeyword::WorkingDirectory) => "WORKING_DIRECTORY",
        }
    }
}

#[derive(Debug)]
struct Section {
    keyword: Keyword,
    values: Vec<String>,
}

/// Parse one declaration from its argument tokens.
///
/// The presence of `OUTPUT` or `OUTPUTS` anywhere selects the output-rule
/// signature, even when `TARGET` is also given (the legacy form). Otherwise
/// `TARGET` selects the target-phase signature.
///
/// # Errors
///
/// Returns [`ParseError::MalformedSpec`] when no signature keyword is present,
/// a `COMMAND` is empty or missing, or the sections do not fit the selected
/// signature.
///
/// # Examples
///
/// ```rust
/// use rulegraph::ast::Declaration;
/// use rulegraph::parser::parse;
///
/// let tokens = ["OUTPUT", "gen.c", "COMMAND", "gen", "ARGS", "-o", "gen.c"];
/// let Declaration::Output(rule) = parse(&tokens).expect("parse") else {
///     panic!("expected an output rule");
/// };
/// assert_eq!(rule.outputs, vec!["gen.c".to_owned()]);
/// assert_eq!(rule.command_line[0].args, vec!["-o", "gen.c"]);
/// ```
pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Declaration, ParseError> {
    let keywords = || tokens.iter().filter_map(|t| Keyword::from_token(t.as_ref()));
    let has_output = keywords().any(|k| k == Keyword::Output);
    let has_target = keywords().any(|k| k == Keyword::Target);
    if !has_output && !has_target {
        return Err(Malformed::MissingSignature.into());
    }

    let sections = split_sections(tokens)?;
    let declaration = if has_output {
        Declaration::Output(output_rule(sections)?)
    } else {
        Declaration::TargetPhase(target_phase(sections)?)
    };
    Ok(declaration)
}

fn split_sections<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Section>, Malformed> {
    let mut sections: Vec<Section> = Vec::new();
    for token in tokens.iter().map(AsRef::as_ref) {
        if let Some(keyword) = Keyword::from_token(token) {
            sections.push(Section {
                keyword,
                values: Vec::new(),
            });
            continue;
        }
        let Some(current) = sections.last_mut() else {
            return Err(Malformed::ValueBeforeKeyword {
                value: token.to_owned(),
            });
        };
        current.values.push(token.to_owned());
    }
    Ok(sections)
}

fn output_rule(sections: Vec<Section>) -> Result<RawOutputRule, Malformed> {
    let mut rule = RawOutputRule::default();
    let mut common = CommonSections::default();
    for section in sections {
        match section.keyword {
            Keyword::Output => rule.outputs.extend(section.values),
            Keyword::Target => set_once(&mut rule.attached_target, section)?,
            Keyword::MainDependency | Keyword::Source => {
                set_once(&mut rule.main_dependency, section)?;
            }
            Keyword::Depends => rule.depends.extend(section.values),
            Keyword::Phase(phase) => return Err(Malformed::PhaseWithoutTarget { phase }),
            Keyword::Common(keyword) => common.accept(keyword, section)?,
        }
    }
    let common = common.finish()?;
    rule.command_line = common.command_line;
    rule.comment = common.comment;
    rule.working_directory = common.working_directory;
    Ok(rule)
}

fn target_phase(sections: Vec<Section>) -> Result<RawTargetPhase, Malformed> {
    let mut target = None;
    let mut phase: Option<Phase> = None;
    let mut common = CommonSections::default();
    for section in sections {
        match section.keyword {
            Keyword::Target => set_once(&mut target, section)?,
            Keyword::Phase(next) => {
                if let Some(value) = section.values.into_iter().next() {
                    return Err(Malformed::PhaseWithValues { phase: next, value });
                }
                match phase {
                    Some(first) if first == next => {
                        return Err(Malformed::RepeatedKeyword {
                            keyword: next.keyword(),
                        });
                    }
                    Some(first) => {
                        return Err(Malformed::ConflictingPhases {
                            first,
                            second: next,
                        });
                    }
                    None => phase = Some(next),
                }
            }
            Keyword::Output | Keyword::MainDependency | Keyword::Source | Keyword::Depends => {
                return Err(Malformed::OutputOnlyKeyword {
                    keyword: section.keyword.name(),
                });
            }
            Keyword::Common(keyword) => common.accept(keyword, section)?,
        }
    }
    let Some(target) = target else {
        return Err(Malformed::MissingSignature);
    };
    let Some(phase) = phase else {
        return Err(Malformed::MissingPhase { target });
    };
    let common = common.finish()?;
    Ok(RawTargetPhase {
        target,
        phase,
        command_line: common.command_line,
        comment: common.comment,
        working_directory: common.working_directory,
    })
}

fn set_once(slot: &mut Option<String>, section: Section) -> Result<(), Malformed> {
    let keyword = section.keyword.name();
    if slot.is_some() {
        return Err(Malformed::RepeatedKeyword { keyword });
    }
    let mut values = section.values.into_iter();
    match (values.next(), values.len()) {
        (None, _) => Err(Malformed::MissingValue { keyword }),
        (Some(value), 0) => {
            *slot = Some(value);
            Ok(())
        }
        (Some(_), rest) => Err(Malformed::ExpectedSingleValue {
            keyword,
            found: rest + 1,
        }),
    }
}

#[derive(Debug, Default)]
struct CommonSections {
    command_line: Vec<Invocation>,
    comment: Option<String>,
    working_directory: Option<String>,
}

impl CommonSections {
    fn accept(&mut self, keyword: CommonKeyword, section: Section) -> Result<(), Malformed> {
        match keyword {
            CommonKeyword::Command => {
                let mut values = section.values.into_iter();
                let executable = values.next().ok_or(Malformed::EmptyCommand)?;
                self.command_line
                    .push(Invocation::new(executable).with_args(values));
            }
            CommonKeyword::Args => {
                let last = self
                    .command_line
                    .last_mut()
                    .ok_or(Malformed::ArgsWithoutCommand)?;
                last.args.extend(section.values);
            }
            CommonKeyword::Comment => {
                if self.comment.is_some() {
                    return Err(Malformed::RepeatedKeyword { keyword: "COMMENT" });
                }
                if section.values.is_empty() {
                    return Err(Malformed::MissingValue { keyword: "COMMENT" });
                }
                self.comment = Some(section.values.join(" "));
            }
            CommonKeyword::WorkingDirectory => set_once(&mut self.working_directory, section)?,
        }
        Ok(())
    }

    fn finish(self) -> Result<Self, Malformed> {
        if self.command_line.is_empty() {
            return Err(Malformed::MissingCommand);
        }
        Ok(self)
    }
}
