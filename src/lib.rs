//! Driver for the tessera constraint solver.
//!
//! [`check`] solves a prepared set of constraints and reduces the solutions
//! to an [`Outcome`]. The [`scenario`] module loads declarations and
//! constraints from JSON, and [`report`] renders outcomes for the CLI.

pub mod error;
pub mod report;
pub mod scenario;

use tessera_solver::{
    Constraint, ConstraintSystem, Failure, FreeTypeVariableBinding, SolutionDiff, SolveError,
    SolverConfig, SolverContext, TypeVarOptions,
};
use tessera_types::DeclTable;
use tracing::debug;

// Re-exports
pub use error::{ScenarioError, ScenarioErrorKind, ScenarioResult};
pub use report::OutcomeReport;
pub use scenario::{Scenario, ScenarioDecls, ScenarioVars};
pub use tessera_solver::Solution;

/// What solving a system amounted to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<'db> {
    /// A single solution, or one that beats every other.
    Solved(Solution<'db>),
    /// Several solutions survived ranking.
    Ambiguous {
        solutions: Vec<Solution<'db>>,
        diff: SolutionDiff<'db>,
    },
    /// No solution; carries the first failure recorded, if any.
    Failed(Option<Failure<'db>>),
}

impl<'db> Outcome<'db> {
    pub fn solution(&self) -> Option<&Solution<'db>> {
        match self {
            Outcome::Solved(solution) => Some(solution),
            _ => None,
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self, Outcome::Solved(_))
    }
}

/// Solve `cs`, leaving free variables an error, and rank the solutions.
///
/// Only running out of depth or steps is an `Err`; an unsolvable system is
/// [`Outcome::Failed`].
pub fn solve_system<'db>(
    cs: &mut ConstraintSystem<'_, 'db>,
) -> Result<Outcome<'db>, SolveError<'db>> {
    let mut solutions = match cs.solve(FreeTypeVariableBinding::Disallow) {
        Ok(solutions) => solutions,
        Err(SolveError::NoSolution { failure }) => return Ok(Outcome::Failed(failure)),
        Err(err) => return Err(err),
    };
    debug!(count = solutions.len(), "ranking solutions");
    if solutions.len() == 1
        && let Some(solution) = solutions.pop()
    {
        return Ok(Outcome::Solved(solution));
    }
    match cs.find_best_solution(&mut solutions) {
        Some(best) => Ok(Outcome::Solved(solutions.swap_remove(best))),
        None => {
            let diff = SolutionDiff::new(cs.db(), &solutions);
            Ok(Outcome::Ambiguous { solutions, diff })
        }
    }
}

/// Build a system over `decls`, create one type variable per entry of
/// `type_vars` (`$T0`, `$T1`, ... in order), add `constraints` and solve.
pub fn check<'db>(
    db: &'db dyn salsa::Database,
    decls: &DeclTable<'db>,
    type_vars: &[TypeVarOptions],
    constraints: Vec<Constraint<'db>>,
    config: SolverConfig,
) -> Result<Outcome<'db>, SolveError<'db>> {
    let mut cs = ConstraintSystem::new(SolverContext::new(db, decls), config);
    for options in type_vars {
        cs.create_type_var(*options, None);
    }
    for constraint in constraints {
        cs.add_constraint(constraint);
    }
    solve_system(&mut cs)
}

#[cfg(test)]
mod tests {
    use tessera_solver::{FailureKind, MatchKind};
    use tessera_types::{NominalKind, Type, TypeVarId};

    use super::*;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn single_solution_is_solved() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let var = Type::type_var(&db, TypeVarId(0));
        let outcome = check(
            &db,
            &decls,
            &[TypeVarOptions::NONE],
            vec![Constraint::relational(MatchKind::Bind, var, int, None)],
            SolverConfig::default(),
        )
        .unwrap();
        let solution = outcome.solution().unwrap();
        assert_eq!(solution.binding(TypeVarId(0)), Some(int));
    }

    #[test]
    fn contradiction_fails_with_its_failure() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let outcome = check(
            &db,
            &decls,
            &[],
            vec![Constraint::relational(MatchKind::SameType, int, string, None)],
            SolverConfig::default(),
        )
        .unwrap();
        let Outcome::Failed(Some(failure)) = outcome else {
            panic!("expected a failure, got {outcome:?}");
        };
        assert_eq!(failure.kind, FailureKind::TypesNotEqual);
    }

    #[test]
    fn unranked_alternatives_are_ambiguous() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let var = Type::type_var(&db, TypeVarId(0));
        let outcome = check(
            &db,
            &decls,
            &[TypeVarOptions::NONE.prefers_subtype()],
            vec![Constraint::disjunction(
                vec![
                    Constraint::relational(MatchKind::Bind, var, int, None),
                    Constraint::relational(MatchKind::Bind, var, string, None),
                ],
                None,
            )],
            SolverConfig::default(),
        )
        .unwrap();
        let Outcome::Ambiguous { solutions, diff } = outcome else {
            panic!("expected an ambiguity, got {outcome:?}");
        };
        assert_eq!(solutions.len(), 2);
        assert_eq!(diff.type_bindings.len(), 1);
        assert_eq!(diff.type_bindings[0].var, TypeVarId(0));
    }

    #[test]
    fn exhausted_steps_are_an_error() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let var = Type::type_var(&db, TypeVarId(0));
        let config = SolverConfig {
            max_steps: 1,
            ..SolverConfig::default()
        };
        let result = check(
            &db,
            &decls,
            &[TypeVarOptions::NONE],
            vec![Constraint::disjunction(
                vec![
                    Constraint::relational(MatchKind::Bind, var, int, None),
                    Constraint::relational(MatchKind::Bind, var, string, None),
                ],
                None,
            )],
            config,
        );
        assert!(matches!(result, Err(SolveError::ResourceExhausted { .. })));
    }
}
