//! tessera CLI entry point.

mod cli;

use std::path::Path;

use clap::Parser;
use cli::{Cli, Command, SolverArgs};
use tessera::{Outcome, OutcomeReport, Scenario, ScenarioResult, solve_system};
use tessera_solver::{ConstraintSystem, SolverContext};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Solve { file, solver } => solve_file(&file, &solver),
        Command::Dump { file } => dump_file(&file).map(|()| true),
    };
    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("TESSERA_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether the scenario was solved.
fn solve_file(path: &Path, solver: &SolverArgs) -> ScenarioResult<bool> {
    let mut scenario = Scenario::from_path(path)?;
    solver.apply(&mut scenario.config);
    let debug = scenario.config.debug_constraint_solver;

    let db = salsa::DatabaseImpl::new();
    let decls = scenario.build_decls(&db)?;
    let mut cs = ConstraintSystem::new(
        SolverContext::new(&db, &decls.table),
        scenario.config.clone(),
    );
    let vars = scenario.populate(&mut cs, &decls)?;
    if debug {
        println!("=== Constraint system ===\n{}\n", cs.dump());
    }

    let outcome = match solve_system(&mut cs) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {e}");
            return Ok(false);
        }
    };
    if debug {
        let solutions: &[_] = match &outcome {
            Outcome::Solved(solution) => std::slice::from_ref(solution),
            Outcome::Ambiguous { solutions, .. } => solutions,
            Outcome::Failed(_) => &[],
        };
        for (i, solution) in solutions.iter().enumerate() {
            println!(
                "=== Solution #{i} ===\n{}\n",
                solution.dump(&db, Some(cs.locators()))
            );
        }
    }

    println!(
        "{}",
        OutcomeReport::new(&db, &outcome, cs.locators()).with_names(&vars, &decls)
    );
    Ok(outcome.is_solved())
}

fn dump_file(path: &Path) -> ScenarioResult<()> {
    let scenario = Scenario::from_path(path)?;
    let db = salsa::DatabaseImpl::new();
    let decls = scenario.build_decls(&db)?;
    let mut cs = ConstraintSystem::new(
        SolverContext::new(&db, &decls.table),
        scenario.config.clone(),
    );
    scenario.populate(&mut cs, &decls)?;
    println!("{}", cs.dump());
    Ok(())
}
