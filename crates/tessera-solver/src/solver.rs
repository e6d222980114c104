//! The backtracking search.
//!
//! [`ConstraintSystem::solve`] simplifies the worklist to a fixed point and
//! then branches, first on the smallest disjunction and otherwise on the
//! candidate bindings of a blocked type variable. Every branch runs between
//! a checkpoint and a rollback, so the system leaves `solve` in the state it
//! entered.

use tessera_types::{Type, TypeVarId};
use tracing::{debug, trace};

use crate::constraint::{Constraint, ConstraintId, ConstraintKind, MatchKind, SolutionKind};
use crate::failure::{ResourceLimit, SolveError};
use crate::solution::Solution;
use crate::system::{ConstraintSystem, SolverState};

/// Whether a solution may leave type variables unbound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FreeTypeVariableBinding {
    #[default]
    Disallow,
    Allow,
}

/// Candidate types for one blocked variable, tried in tiers.
#[derive(Clone, Debug, Default)]
struct PotentialBindings<'db> {
    /// Types the variable is directly related to.
    direct: Vec<Type<'db>>,
    /// Types the variable must be a supertype of; their superclasses are
    /// tried when no direct binding works.
    lower_bounds: Vec<Type<'db>>,
    /// Default types of literal protocols the variable conforms to.
    defaults: Vec<Type<'db>>,
}

impl PotentialBindings<'_> {
    fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.defaults.is_empty()
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    /// Find every solution of the system.
    ///
    /// # Panics
    ///
    /// Panics if called while a search on this system is already running.
    pub fn solve(
        &mut self,
        free_vars: FreeTypeVariableBinding,
    ) -> Result<Vec<Solution<'db>>, SolveError<'db>> {
        assert!(self.solver_state.is_none(), "solve is not reentrant");
        self.solver_state = Some(SolverState {
            shared_type_vars: self.type_vars.len(),
            ..SolverState::default()
        });
        let checkpoint = self.checkpoint();
        if self.config().debug_constraint_solver {
            debug!("---Constraint solving---\n{}", self.dump());
        }

        let mut solutions = Vec::new();
        let result = self.solve_rec(free_vars, &mut solutions);
        let steps = self.solver_state.as_ref().map_or(0, |state| state.steps);
        self.rollback(checkpoint);
        self.solver_state = None;
        result?;

        debug!(solutions = solutions.len(), steps, "solve finished");
        if solutions.is_empty() {
            return Err(SolveError::NoSolution {
                failure: self.first_failure(),
            });
        }
        Ok(solutions)
    }

    /// Returns whether any solution was found below this point.
    fn solve_rec(
        &mut self,
        free_vars: FreeTypeVariableBinding,
        solutions: &mut Vec<Solution<'db>>,
    ) -> Result<bool, SolveError<'db>> {
        let (max_depth, max_steps) = (self.config().max_depth, self.config().max_steps);
        let Some(state) = self.solver_state.as_mut() else {
            return Ok(false);
        };
        state.depth += 1;
        state.steps += 1;
        let (depth, steps) = (state.depth, state.steps);
        if depth > max_depth {
            state.depth -= 1;
            return Err(SolveError::ResourceExhausted {
                limit: ResourceLimit::Depth,
                reached: depth,
            });
        }
        if steps > max_steps {
            state.depth -= 1;
            return Err(SolveError::ResourceExhausted {
                limit: ResourceLimit::Steps,
                reached: steps,
            });
        }

        let result = self.solve_step(free_vars, solutions);
        if let Some(state) = self.solver_state.as_mut() {
            state.depth -= 1;
        }
        result
    }

    fn solve_step(
        &mut self,
        free_vars: FreeTypeVariableBinding,
        solutions: &mut Vec<Solution<'db>>,
    ) -> Result<bool, SolveError<'db>> {
        if self.failed_constraint().is_some() || !self.simplify_worklist() {
            return Ok(false);
        }

        if !self.constraints.has_active() {
            if free_vars == FreeTypeVariableBinding::Disallow && self.has_free_type_variables() {
                trace!("free type variables remain");
                return Ok(false);
            }
            return Ok(self.record_solution(solutions));
        }

        if let Some(disjunction) = self.select_disjunction() {
            if !self.config().branch_on_disjunctions {
                trace!("not branching on disjunction");
                return Ok(false);
            }
            return self.solve_disjunction(disjunction, free_vars, solutions);
        }

        if let Some((var, bindings)) = self.select_potential_bindings() {
            return self.try_type_var_bindings(var, bindings, free_vars, solutions);
        }

        // With free variables allowed, leftover conformance and type-member
        // constraints on them do not prevent a solution.
        if free_vars == FreeTypeVariableBinding::Allow
            && self.has_free_type_variables()
            && self.constraints.active().all(|(_, constraint)| {
                matches!(
                    constraint.kind(),
                    ConstraintKind::ConformsTo
                        | ConstraintKind::SelfObjectOfProtocol
                        | ConstraintKind::TypeMember
                )
            })
        {
            return Ok(self.record_solution(solutions));
        }
        Ok(false)
    }

    fn record_solution(&mut self, solutions: &mut Vec<Solution<'db>>) -> bool {
        let solution = self.finalize_solution();
        debug!(
            score = solution.fixed_score(),
            index = solutions.len(),
            "found solution"
        );
        solutions.push(solution);
        true
    }

    /// Simplify active constraints until none of them makes progress.
    /// Returns false once a constraint fails.
    fn simplify_worklist(&mut self) -> bool {
        loop {
            let mut progress = false;
            for id in self.constraints.active_ids() {
                let Some(constraint) = self.constraints.get(id).cloned() else {
                    continue;
                };
                if constraint.is_disjunction() {
                    continue;
                }
                match self.simplify_constraint(&constraint) {
                    SolutionKind::Error => {
                        trace!(constraint = %constraint.display(self.db()), "constraint failed");
                        self.remove_constraint(id);
                        self.set_failed_constraint(constraint.clone());
                        self.retire(constraint);
                        return false;
                    }
                    SolutionKind::Solved => {
                        self.remove_constraint(id);
                        self.retire(constraint);
                        progress = true;
                    }
                    SolutionKind::Unsolved => {}
                }
                // A nested constraint may have failed while this one
                // was being simplified.
                if self.failed_constraint().is_some() {
                    return false;
                }
            }
            if !progress {
                return true;
            }
        }
    }

    /// Whether some equivalence class has neither a fixed type nor a
    /// parent.
    fn has_free_type_variables(&self) -> bool {
        self.type_vars
            .ids()
            .any(|var| self.type_vars.is_representative(var) && self.fixed_type(var).is_none())
    }

    /// The disjunction with the fewest alternatives; the oldest one on ties.
    fn select_disjunction(&self) -> Option<ConstraintId> {
        let mut best: Option<(ConstraintId, usize)> = None;
        for (id, constraint) in self.constraints.active() {
            let Constraint::Disjunction { alternatives, .. } = constraint else {
                continue;
            };
            if best.is_none_or(|(_, size)| alternatives.len() < size) {
                best = Some((id, alternatives.len()));
            }
        }
        best.map(|(id, _)| id)
    }

    fn solve_disjunction(
        &mut self,
        id: ConstraintId,
        free_vars: FreeTypeVariableBinding,
        solutions: &mut Vec<Solution<'db>>,
    ) -> Result<bool, SolveError<'db>> {
        let Some(Constraint::Disjunction { alternatives, .. }) = self.remove_constraint(id) else {
            return Ok(false);
        };
        let depth = self.solver_state.as_ref().map_or(0, |state| state.depth);
        debug!(depth, alternatives = alternatives.len(), "branch on disjunction");
        if self.config().debug_constraint_solver {
            debug!("\n{}", self.dump());
        }

        let mut any_solved = false;
        for alternative in alternatives {
            trace!(depth, alternative = %alternative.display(self.db()), "assuming");
            let found = self.in_branch(|cs| {
                cs.add_constraint(alternative);
                cs.solve_rec(free_vars, solutions)
            })?;
            if found {
                any_solved = true;
                if self.config().stop_at_first_solution {
                    break;
                }
            }
        }
        Ok(any_solved)
    }

    /// Run `body` as one branch of the search and undo what it did.
    fn in_branch<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R {
        let checkpoint = self.checkpoint();
        if let Some(state) = self.solver_state.as_mut() {
            state.branch_depth += 1;
        }
        let result = body(self);
        if let Some(state) = self.solver_state.as_mut() {
            state.branch_depth -= 1;
        }
        self.rollback(checkpoint);
        result
    }

    /// Candidate bindings of the lowest-numbered free variable that has any.
    fn select_potential_bindings(&self) -> Option<(TypeVarId, PotentialBindings<'db>)> {
        self.type_vars
            .ids()
            .filter(|var| self.type_vars.is_representative(*var) && self.fixed_type(*var).is_none())
            .map(|var| (var, self.potential_bindings(var)))
            .find(|(_, bindings)| !bindings.is_empty())
    }

    fn potential_bindings(&self, var: TypeVarId) -> PotentialBindings<'db> {
        let db = self.db();
        let can_bind_lvalue = self.type_vars.options(var).can_bind_to_lvalue;
        let mut bindings = PotentialBindings::default();

        for (_, constraint) in self.constraints.active() {
            match constraint {
                Constraint::Relational {
                    first,
                    second,
                    restriction: None,
                    ..
                } => {
                    let (first, first_var) = self.fixed_type_recursive(*first, false);
                    let (second, second_var) = self.fixed_type_recursive(*second, false);
                    let (candidate, is_lower_bound) = if first_var == Some(var) {
                        (self.simplify_type(second), false)
                    } else if second_var == Some(var) {
                        (self.simplify_type(first), true)
                    } else {
                        continue;
                    };
                    if candidate.has_type_variable(db) {
                        continue;
                    }
                    let candidate = if can_bind_lvalue {
                        candidate
                    } else {
                        candidate.rvalue(db)
                    };
                    push_unique(&mut bindings.direct, candidate);
                    if is_lower_bound {
                        push_unique(&mut bindings.lower_bounds, candidate);
                    }
                }
                Constraint::Conformance { ty, protocol, .. } => {
                    let (_, ty_var) = self.fixed_type_recursive(*ty, true);
                    if ty_var != Some(var) {
                        continue;
                    }
                    if let Some(default) = self.ctx().decls.protocol_decl(*protocol).literal_default {
                        push_unique(&mut bindings.defaults, default);
                    }
                }
                _ => {}
            }
        }
        bindings
    }

    fn try_type_var_bindings(
        &mut self,
        var: TypeVarId,
        bindings: PotentialBindings<'db>,
        free_vars: FreeTypeVariableBinding,
        solutions: &mut Vec<Solution<'db>>,
    ) -> Result<bool, SolveError<'db>> {
        let db = self.db();
        let mut tried = Vec::new();

        if self.try_bindings(var, &bindings.direct, &mut tried, free_vars, solutions)? {
            return Ok(true);
        }

        let mut supertypes = Vec::new();
        for lower in &bindings.lower_bounds {
            let mut current = self.ctx().conformance.superclass_of(db, *lower);
            while let Some(superclass) = current {
                push_unique(&mut supertypes, superclass);
                current = self.ctx().conformance.superclass_of(db, superclass);
            }
        }
        if self.try_bindings(var, &supertypes, &mut tried, free_vars, solutions)? {
            return Ok(true);
        }

        self.try_bindings(var, &bindings.defaults, &mut tried, free_vars, solutions)
    }

    fn try_bindings(
        &mut self,
        var: TypeVarId,
        candidates: &[Type<'db>],
        tried: &mut Vec<Type<'db>>,
        free_vars: FreeTypeVariableBinding,
        solutions: &mut Vec<Solution<'db>>,
    ) -> Result<bool, SolveError<'db>> {
        let db = self.db();
        let var_ty = Type::type_var(db, var);
        let locator = self.type_vars.locator(var);
        let mut any_solved = false;
        for candidate in candidates {
            if tried.contains(candidate) {
                continue;
            }
            tried.push(*candidate);
            debug!(var = %var, ty = %candidate.display(db), "trying binding");
            let bind = Constraint::relational(MatchKind::Bind, var_ty, *candidate, locator);
            let found = self.in_branch(|cs| {
                cs.add_constraint(bind);
                cs.solve_rec(free_vars, solutions)
            })?;
            if found {
                any_solved = true;
                if self.config().stop_at_first_solution {
                    break;
                }
            }
        }
        Ok(any_solved)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use tessera_types::{DeclTable, LValueQuals, NominalKind, Symbol, TupleElt};

    use super::*;
    use crate::config::SolverConfig;
    use crate::failure::FailureKind;
    use crate::system::SolverContext;
    use crate::typevar::TypeVarOptions;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn explores_every_alternative() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        cs.add_constraint(Constraint::disjunction(
            vec![
                Constraint::relational(MatchKind::Bind, t0, int, None),
                Constraint::relational(MatchKind::Bind, t0, string, None),
            ],
            None,
        ));

        let solutions = cs.solve(FreeTypeVariableBinding::Disallow).unwrap();
        let bound: Vec<_> = solutions
            .iter()
            .map(|s| s.simplify_type(&db, t0).display(&db).to_string())
            .collect();
        assert_eq!(bound, vec!["Int", "String"]);
        // The system is back where it started.
        assert_eq!(cs.simplify_type(t0), t0);
        assert_eq!(cs.constraints().active_len(), 1);
    }

    #[test]
    fn free_variables_need_permission() {
        let db = test_db();
        let decls = DeclTable::new(&db);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        assert!(matches!(
            cs.solve(FreeTypeVariableBinding::Disallow),
            Err(SolveError::NoSolution { failure: None })
        ));
        let solutions = cs.solve(FreeTypeVariableBinding::Allow).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].simplify_type(&db, t0), t0);
    }

    #[test]
    fn blocked_variable_takes_related_type() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let base = Type::nominal(&db, decls.add_nominal("Base", NominalKind::Class));
        let derived = decls.add_nominal("Derived", NominalKind::Class);
        decls.set_superclass(derived, base);
        let derived = Type::nominal(&db, derived);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        cs.add_constraint(Constraint::relational(MatchKind::Subtype, derived, t0, None));

        let solutions = cs.solve(FreeTypeVariableBinding::Disallow).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_snapshot!(solutions[0].simplify_type(&db, t0).display(&db), @"Derived");
    }

    #[test]
    fn literal_default_is_the_last_resort() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let literal = decls.add_protocol("IntegerLiteralConvertible");
        let int = decls.add_nominal("Int", NominalKind::Struct);
        decls.add_conformance(int, tessera_types::Conformance::new(literal));
        let int = Type::nominal(&db, int);
        decls.protocol_mut(literal).literal_default = Some(int);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        cs.add_constraint(Constraint::conforms_to(t0, literal, None));

        let solutions = cs.solve(FreeTypeVariableBinding::Disallow).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].binding(TypeVarId(0)), Some(int));
    }

    #[test]
    fn failure_outside_branches_is_reported() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        cs.add_constraint(Constraint::relational(MatchKind::Conversion, int, string, None));

        let Err(SolveError::NoSolution { failure: Some(failure) }) =
            cs.solve(FreeTypeVariableBinding::Disallow)
        else {
            panic!("expected a failure");
        };
        assert_eq!(failure.kind, FailureKind::TypesNotConvertible);
    }

    #[test]
    fn binding_an_rvalue_variable_to_an_lvalue_is_reported() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        let lvalue = Type::lvalue(&db, int, LValueQuals::IMPLICIT);
        cs.add_constraint(Constraint::relational(MatchKind::Bind, t0, lvalue, None));

        let Err(SolveError::NoSolution { failure: Some(failure) }) =
            cs.solve(FreeTypeVariableBinding::Disallow)
        else {
            panic!("expected a failure");
        };
        assert_eq!(failure.kind, FailureKind::LValueQualifiers);
        assert_eq!(failure.second, Some(lvalue));
    }

    #[test]
    fn mismatched_tuple_labels_are_reported() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let from = Type::tuple(&db, vec![TupleElt::named(Symbol::new("a"), int), TupleElt::new(int)]);
        let to = Type::tuple(&db, vec![TupleElt::named(Symbol::new("b"), int), TupleElt::new(int)]);
        cs.add_constraint(Constraint::relational(MatchKind::Conversion, from, to, None));

        let Err(SolveError::NoSolution { failure: Some(failure) }) =
            cs.solve(FreeTypeVariableBinding::Disallow)
        else {
            panic!("expected a failure");
        };
        assert_eq!(failure.kind, FailureKind::TupleNameMismatch);
    }

    #[test]
    fn failures_inside_alternatives_stay_there() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let double = Type::nominal(&db, decls.add_nominal("Double", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        cs.add_constraint(Constraint::disjunction(
            vec![
                Constraint::relational(MatchKind::Conversion, int, string, None),
                Constraint::relational(MatchKind::Conversion, int, double, None),
            ],
            None,
        ));

        assert_eq!(
            cs.solve(FreeTypeVariableBinding::Disallow),
            Err(SolveError::NoSolution { failure: None })
        );
    }

    #[test]
    fn step_limit_is_fatal() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let config = SolverConfig {
            max_steps: 2,
            ..SolverConfig::default()
        };
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), config);
        for _ in 0..3 {
            let var = cs.new_type_var(TypeVarOptions::NONE, None);
            cs.add_constraint(Constraint::disjunction(
                vec![
                    Constraint::relational(MatchKind::Bind, var, int, None),
                    Constraint::relational(MatchKind::Bind, var, string, None),
                ],
                None,
            ));
        }
        assert!(matches!(
            cs.solve(FreeTypeVariableBinding::Disallow),
            Err(SolveError::ResourceExhausted {
                limit: ResourceLimit::Steps,
                ..
            })
        ));
    }
}
