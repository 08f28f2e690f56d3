//! End-to-end tests for declaring custom commands through a [`Session`].
//!
//! Each test drives the public library surface the way a configuration run
//! would: token lists in, a [`BuildPlan`] or a typed error out.

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use rulegraph::ast::Phase;
use rulegraph::ir::{
    BindError, BinderOptions, BuildPlan, BuildStep, DeclarationError, GraphError,
    PreLinkFallback, SequenceStep, Session, StepKind, TargetModel, TargetTable,
};
use rulegraph::normalize::DeclaringDirectory;
use rulegraph::parser::{Malformed, ParseError};

#[fixture]
fn dir() -> DeclaringDirectory {
    DeclaringDirectory::new("/src/proj")
}

#[fixture]
fn targets() -> TargetTable {
    [
        TargetModel::new(
            "app",
            [
                BuildStep::new("compile", StepKind::Compile),
                BuildStep::new("link", StepKind::Link),
            ],
        ),
        TargetModel::new("docs", [BuildStep::new("render", StepKind::Custom)]),
    ]
    .into_iter()
    .collect()
}

fn plan<'a>(
    dir: &'a DeclaringDirectory,
    targets: &'a TargetTable,
    options: BinderOptions,
    declarations: &[&[&str]],
) -> Result<BuildPlan<'a>, DeclarationError> {
    let mut session = Session::new(dir, targets, options);
    for &tokens in declarations {
        session.declare(tokens)?;
    }
    session.finish()
}

fn outputs_in_order(plan: &BuildPlan<'_>) -> Vec<String> {
    plan.rules_in_order()
        .filter_map(|(_, rule)| rule.primary_output().map(ToString::to_string))
        .collect()
}

fn step_labels(plan: &BuildPlan<'_>, target: &str) -> Vec<String> {
    plan.materialize(target)
        .expect("materialize")
        .steps
        .iter()
        .map(|step| match step {
            SequenceStep::Command(spec) => format!("{}:{}", spec.phase, spec.command_line[0]),
            SequenceStep::Intrinsic(step) => step.name.clone(),
        })
        .collect()
}

#[rstest]
#[case(&["OUTPUT", "a.c", "COMMAND", "gen1"], &["OUTPUT", "a.c", "COMMAND", "gen2"])]
#[case(&["OUTPUT", "b.c", "a.c", "COMMAND", "gen1"], &["OUTPUT", "a.c", "COMMAND", "gen2"])]
fn duplicate_output_is_rejected(
    dir: DeclaringDirectory,
    targets: TargetTable,
    #[case] first: &[&str],
    #[case] second: &[&str],
) {
    let mut session = Session::new(&dir, &targets, BinderOptions::default());
    session.declare(first).expect("first declaration");
    let err = session.declare(second).expect_err("duplicate accepted");
    match err {
        DeclarationError::Graph(GraphError::DuplicateOutput { path, .. }) => {
            assert_eq!(path, "/src/proj/a.c");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.rule_count(), 1);
}

#[rstest]
fn producer_runs_before_consumer(dir: DeclaringDirectory, targets: TargetTable) {
    let plan = plan(
        &dir,
        &targets,
        BinderOptions::default(),
        &[
            &["OUTPUT", "b.o", "COMMAND", "cc", "b.c", "DEPENDS", "b.c"],
            &["OUTPUT", "b.c", "COMMAND", "gen", "b.c"],
        ],
    )
    .expect("plan");
    assert_eq!(outputs_in_order(&plan), ["/src/proj/b.c", "/src/proj/b.o"]);
}

#[rstest]
fn independent_rules_keep_declaration_order(dir: DeclaringDirectory, targets: TargetTable) {
    let plan = plan(
        &dir,
        &targets,
        BinderOptions::default(),
        &[
            &["OUTPUT", "z", "COMMAND", "touch", "z"],
            &["OUTPUT", "y", "COMMAND", "touch", "y"],
            &["OUTPUT", "x", "COMMAND", "touch", "x"],
        ],
    )
    .expect("plan");
    assert_eq!(
        outputs_in_order(&plan),
        ["/src/proj/z", "/src/proj/y", "/src/proj/x"]
    );
}

#[rstest]
fn cycle_names_both_outputs(dir: DeclaringDirectory, targets: TargetTable) {
    let err = plan(
        &dir,
        &targets,
        BinderOptions::default(),
        &[
            &["OUTPUT", "a", "COMMAND", "mk", "DEPENDS", "b"],
            &["OUTPUT", "b", "COMMAND", "mk", "DEPENDS", "a"],
        ],
    )
    .err()
    .expect("cycle accepted");
    match &err {
        DeclarationError::Graph(GraphError::CyclicDependency { cycle }) => {
            let expected: Vec<Utf8PathBuf> =
                vec!["/src/proj/a".into(), "/src/proj/b".into(), "/src/proj/a".into()];
            assert_eq!(cycle, &expected);
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("/src/proj/a") && message.contains("/src/proj/b"));
}

#[rstest]
fn leaf_dependency_is_an_external_input(dir: DeclaringDirectory, targets: TargetTable) {
    let plan = plan(
        &dir,
        &targets,
        BinderOptions::default(),
        &[&["OUTPUT", "out.txt", "COMMAND", "cp", "DEPENDS", "in.txt"]],
    )
    .expect("plan");
    let inputs: Vec<_> = plan
        .graph()
        .external_inputs()
        .into_iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(inputs, ["/src/proj/in.txt"]);
    assert_eq!(plan.order().len(), 1);
}

#[rstest]
fn main_dependency_is_not_repeated(dir: DeclaringDirectory, targets: TargetTable) {
    let plan = plan(
        &dir,
        &targets,
        BinderOptions::default(),
        &[&[
            "OUTPUT",
            "out",
            "COMMAND",
            "gen",
            "MAIN_DEPENDENCY",
            "in",
            "DEPENDS",
            "in",
            "extra",
        ]],
    )
    .expect("plan");
    let (_, rule) = plan.rules_in_order().next().expect("one rule");
    let deps: Vec<_> = rule.dependencies.iter().map(ToString::to_string).collect();
    assert_eq!(deps, ["/src/proj/in", "/src/proj/extra"]);
    assert_eq!(
        rule.main_dependency.as_deref(),
        Some(Utf8Path::new("/src/proj/in"))
    );
}

#[rstest]
fn phases_wrap_intrinsic_steps(dir: DeclaringDirectory, targets: TargetTable) {
    let plan = plan(
        &dir,
        &targets,
        BinderOptions::default(),
        &[
            &["TARGET", "app", "POST_BUILD", "COMMAND", "strip"],
            &["TARGET", "app", "PRE_LINK", "COMMAND", "check"],
            &["TARGET", "app", "PRE_BUILD", "COMMAND", "prep"],
        ],
    )
    .expect("plan");
    assert_eq!(
        step_labels(&plan, "app"),
        [
            "PRE_BUILD:prep",
            "compile",
            "PRE_LINK:check",
            "link",
            "POST_BUILD:strip"
        ]
    );
}

#[rstest]
fn same_phase_commands_stay_adjacent_in_order(dir: DeclaringDirectory, targets: TargetTable) {
    let plan = plan(
        &dir,
        &targets,
        BinderOptions::default(),
        &[
            &["TARGET", "app", "POST_BUILD", "COMMAND", "first"],
            &["TARGET", "app", "POST_BUILD", "COMMAND", "second"],
        ],
    )
    .expect("plan");
    let labels = step_labels(&plan, "app");
    assert_eq!(
        labels.get(labels.len() - 2..),
        Some(&["POST_BUILD:first".to_owned(), "POST_BUILD:second".to_owned()][..])
    );
    assert_eq!(plan.binder().commands("app", Phase::PostBuild).len(), 2);
}

#[rstest]
#[case(PreLinkFallback::BeforeTerminal, &["PRE_LINK:check", "render"])]
#[case(PreLinkFallback::AfterTerminal, &["render", "PRE_LINK:check"])]
#[case(PreLinkFallback::AfterPreBuild, &["PRE_LINK:check", "render"])]
fn pre_link_without_link_step_follows_fallback(
    dir: DeclaringDirectory,
    targets: TargetTable,
    #[case] fallback: PreLinkFallback,
    #[case] expected: &[&str],
) {
    let options = BinderOptions {
        pre_link_fallback: fallback,
    };
    let plan = plan(
        &dir,
        &targets,
        options,
        &[&["TARGET", "docs", "PRE_LINK", "COMMAND", "check"]],
    )
    .expect("plan");
    assert_eq!(step_labels(&plan, "docs"), expected);
}

#[rstest]
fn target_without_phase_is_malformed(dir: DeclaringDirectory, targets: TargetTable) {
    let mut session = Session::new(&dir, &targets, BinderOptions::default());
    let err = session
        .declare(&["TARGET", "app", "COMMAND", "x"])
        .expect_err("accepted");
    assert!(matches!(
        err,
        DeclarationError::Parse(ParseError::MalformedSpec {
            reason: Malformed::MissingPhase { .. }
        })
    ));
}

#[rstest]
fn unknown_target_is_rejected(dir: DeclaringDirectory, targets: TargetTable) {
    let mut session = Session::new(&dir, &targets, BinderOptions::default());
    let err = session
        .declare(&["TARGET", "nope", "POST_BUILD", "COMMAND", "x"])
        .expect_err("accepted");
    assert!(matches!(
        err,
        DeclarationError::Bind(BindError::UnknownTarget { ref target }) if target == "nope"
    ));
}

#[rstest]
fn failed_declaration_poisons_the_session(dir: DeclaringDirectory, targets: TargetTable) {
    let mut session = Session::new(&dir, &targets, BinderOptions::default());
    session
        .declare(&["OUTPUT", "a", "COMMAND", "gen"])
        .expect("first declaration");
    let first = session
        .declare(&["OUTPUT", "a", "COMMAND", "again"])
        .expect_err("duplicate accepted");

    let later = session
        .declare(&["OUTPUT", "b", "COMMAND", "gen"])
        .expect_err("declaration accepted after a failure");
    assert_eq!(later.to_string(), first.to_string());
    assert_eq!(session.rule_count(), 1);

    let err = session.finish().err().expect("plan exposed after a failure");
    assert!(matches!(
        err,
        DeclarationError::Graph(GraphError::DuplicateOutput { .. })
    ));
}

#[rstest]
fn legacy_form_rejects_unknown_target(dir: DeclaringDirectory, targets: TargetTable) {
    let mut session = Session::new(&dir, &targets, BinderOptions::default());
    let err = session
        .declare(&["SOURCE", "s", "COMMAND", "g", "TARGET", "nope", "OUTPUTS", "o"])
        .expect_err("accepted");
    assert!(matches!(
        err,
        DeclarationError::Bind(BindError::UnknownTarget { ref target }) if target == "nope"
    ));
    assert_eq!(session.rule_count(), 0);
}

#[rstest]
fn legacy_form_attaches_to_registered_target(dir: DeclaringDirectory, targets: TargetTable) {
    let plan = plan(
        &dir,
        &targets,
        BinderOptions::default(),
        &[&["SOURCE", "s", "COMMAND", "g", "TARGET", "app", "OUTPUTS", "o"]],
    )
    .expect("plan");
    let (_, rule) = plan.rules_in_order().next().expect("one rule");
    assert_eq!(rule.attached_target.as_deref(), Some("app"));
    assert_eq!(
        rule.main_dependency.as_deref(),
        Some(Utf8Path::new("/src/proj/s"))
    );
    assert_eq!(rule.outputs, [Utf8PathBuf::from("/src/proj/o")]);
}
