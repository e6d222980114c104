use std::io::Write;
use std::path::{Path, PathBuf};

use insta::assert_snapshot;
use tessera::{Outcome, OutcomeReport, Scenario, ScenarioErrorKind, solve_system};
use tessera_solver::{ConstraintSystem, SolverContext};

struct Run {
    report: String,
    solved: bool,
    ambiguous: bool,
    /// Value keys of the chosen overloads, in locator order.
    choices: Vec<String>,
}

fn scenario_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

fn run(scenario: &Scenario) -> Run {
    let db = salsa::DatabaseImpl::new();
    let decls = scenario.build_decls(&db).unwrap();
    let mut cs = ConstraintSystem::new(
        SolverContext::new(&db, &decls.table),
        scenario.config.clone(),
    );
    let vars = scenario.populate(&mut cs, &decls).unwrap();
    let outcome = solve_system(&mut cs).unwrap();
    let choices = outcome
        .solution()
        .map(|solution| {
            solution
                .overload_choices()
                .values()
                .filter_map(|selected| selected.choice.decl_id())
                .filter_map(|decl| decls.value_key(decl))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    Run {
        report: OutcomeReport::new(&db, &outcome, cs.locators())
            .with_names(&vars, &decls)
            .to_string(),
        solved: outcome.is_solved(),
        ambiguous: matches!(outcome, Outcome::Ambiguous { .. }),
        choices,
    }
}

fn run_file(name: &str) -> Run {
    run(&Scenario::from_path(scenario_path(name)).unwrap())
}

#[test]
fn overload_call_picks_matching_argument() {
    let run = run_file("overload_call.json");
    assert!(run.solved);
    assert_eq!(run.choices, ["f_int"]);
    assert_snapshot!(run.report, @r"
    Solved (fixed score 0)
    Bindings:
      callee as Int -> ()
      result as ()
    Overloads:
      expr#0 with f_int as Int -> ()
    ");
}

#[test]
fn literal_takes_parameter_type() {
    let run = run_file("literal_default.json");
    assert!(run.solved);
    assert_eq!(run.choices, ["scale"]);
    assert!(run.report.contains("literal as Double"), "{}", run.report);
    assert!(run.report.contains("result as Double"), "{}", run.report);
}

#[test]
fn concrete_overload_beats_generic_one() {
    let run = run_file("generic_overload.json");
    assert!(run.solved, "{}", run.report);
    assert_eq!(run.choices, ["id_int"]);
    assert!(run.report.contains("result as Int"), "{}", run.report);
}

#[test]
fn subclass_overload_beats_superclass_one() {
    let run = run_file("class_hierarchy.json");
    assert!(run.solved, "{}", run.report);
    assert_eq!(run.choices, ["draw_circle"]);
}

#[test]
fn unrelated_results_are_ambiguous() {
    let run = run_file("ambiguous.json");
    assert!(run.ambiguous, "{}", run.report);
    assert!(run.report.starts_with("Ambiguous: 2 solutions"), "{}", run.report);
    assert!(
        run.report.contains("expr#0: make_int | make_string"),
        "{}",
        run.report
    );
}

#[test]
fn mismatch_reports_failure() {
    let run = run_file("mismatch.json");
    assert!(!run.solved);
    assert!(run.report.starts_with("No solution"), "{}", run.report);
}

#[test]
fn scenario_loads_from_any_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "config": {{ "max_depth": 16 }},
            "types": [{{ "name": "Int" }}],
            "type_vars": ["x"],
            "constraints": [
                {{ "kind": "bind", "first": {{ "var": "x" }}, "second": {{ "nominal": "Int" }} }}
            ]
        }}"#
    )
    .unwrap();
    let scenario = Scenario::from_path(file.path()).unwrap();
    assert_eq!(scenario.config.max_depth, 16);
    let run = run(&scenario);
    assert_snapshot!(run.report, @r"
    Solved (fixed score 0)
    Bindings:
      x as Int
    ");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Scenario::from_path(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err.kind(), ScenarioErrorKind::Io(_)));
}
