//! Solution ranking.
//!
//! Two solutions are compared only where they differ: at overload sets that
//! picked different declarations, and at shared type variables bound to
//! different types. Each side collects a point for every position where its
//! choice is the more specific one, on top of its negated fixed score.

use std::collections::HashMap;

use tessera_types::{
    ArchetypeId, AssocTypeId, ConformanceAnswer, DeclContext, GenericParamDecl, Type, TypeKind,
    TypeVarId, ValueDeclId, ValueDeclKind,
};
use tracing::debug;

use crate::choice::{OverloadChoice, OverloadChoiceKind};
use crate::config::SolverConfig;
use crate::constraint::{Constraint, MatchKind};
use crate::generics::{AssociatedTypeBinding, DependentTypeOpener, FreeOpener, OpenedGenerics};
use crate::locator::LocatorId;
use crate::relations::{is_convertible_to, is_subtype_of};
use crate::solution::Solution;
use crate::solver::FreeTypeVariableBinding;
use crate::system::{ConstraintSystem, SolverContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolutionCompareResult {
    /// No difference that ranking can see.
    Identical,
    Better,
    Worse,
    /// The solutions differ but neither is preferred.
    Incomparable,
}

/// An overload set whose choice differs between solutions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverloadDiff<'db> {
    pub locator: LocatorId,
    /// The choice of each solution, in solution order.
    pub choices: Vec<OverloadChoice<'db>>,
}

/// A type variable bound differently between solutions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeBindingDiff<'db> {
    pub var: TypeVarId,
    /// The binding in each solution, in solution order.
    pub bindings: Vec<Type<'db>>,
}

/// The positions at which a set of solutions disagree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SolutionDiff<'db> {
    pub overloads: Vec<OverloadDiff<'db>>,
    pub type_bindings: Vec<TypeBindingDiff<'db>>,
}

impl<'db> SolutionDiff<'db> {
    pub fn new(db: &'db dyn salsa::Database, solutions: &[Solution<'db>]) -> Self {
        let mut diff = SolutionDiff::default();
        let Some((first, rest)) = solutions.split_first() else {
            return diff;
        };
        if rest.is_empty() {
            return diff;
        }

        for (locator, selected) in first.overload_choices() {
            let Some(choices) = solutions
                .iter()
                .map(|solution| solution.overload_choice(*locator).map(|s| s.choice))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            if choices
                .iter()
                .any(|choice| !same_overload_choice(&selected.choice, choice))
            {
                diff.overloads.push(OverloadDiff {
                    locator: *locator,
                    choices,
                });
            }
        }

        for (var, ty) in first.type_bindings() {
            if !solutions.iter().all(|solution| solution.is_shared_type_var(*var)) {
                continue;
            }
            let Some(bindings) = solutions
                .iter()
                .map(|solution| solution.binding(*var))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            if bindings.iter().any(|other| !ty.is_equal(*other, db)) {
                diff.type_bindings.push(TypeBindingDiff {
                    var: *var,
                    bindings,
                });
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.overloads.is_empty() && self.type_bindings.is_empty()
    }
}

/// Whether two choices pick the same thing, ignoring the base they were
/// found on.
fn same_overload_choice(a: &OverloadChoice<'_>, b: &OverloadChoice<'_>) -> bool {
    if a.kind() != b.kind() {
        return false;
    }
    match (a, b) {
        (OverloadChoice::BaseType { .. }, OverloadChoice::BaseType { .. }) => true,
        (
            OverloadChoice::TupleIndex { index: a, .. },
            OverloadChoice::TupleIndex { index: b, .. },
        ) => a == b,
        _ => a.decl_id() == b.decl_id(),
    }
}

/// How the `Self` types of two members' contexts relate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SelfTypeRelationship {
    Unrelated,
    Equivalent,
    Subclass,
    Superclass,
    ConformsTo,
    ConformedToBy,
}

fn context_type<'db>(ctx: SolverContext<'_, 'db>, context: DeclContext) -> Option<Type<'db>> {
    match context {
        DeclContext::Module(_) => None,
        DeclContext::Nominal(nominal) => {
            Some(ctx.decls.nominal_decl(nominal).declared_type_in_context(ctx.db))
        }
        DeclContext::Protocol(proto) => Some(Type::protocol(ctx.db, proto)),
    }
}

fn self_type_relationship(
    ctx: SolverContext<'_, '_>,
    first: DeclContext,
    second: DeclContext,
) -> SelfTypeRelationship {
    if first == second {
        return SelfTypeRelationship::Equivalent;
    }
    let (Some(first_ty), Some(second_ty)) = (context_type(ctx, first), context_type(ctx, second))
    else {
        return SelfTypeRelationship::Unrelated;
    };
    if is_subtype_of(ctx, first_ty, second_ty) {
        return SelfTypeRelationship::Subclass;
    }
    if is_subtype_of(ctx, second_ty, first_ty) {
        return SelfTypeRelationship::Superclass;
    }
    if let DeclContext::Protocol(proto) = second
        && ctx.conformance.conforms_to(ctx.db, first_ty, proto).conforms()
    {
        return SelfTypeRelationship::ConformsTo;
    }
    if let DeclContext::Protocol(proto) = first
        && ctx.conformance.conforms_to(ctx.db, second_ty, proto).conforms()
    {
        return SelfTypeRelationship::ConformedToBy;
    }
    SelfTypeRelationship::Unrelated
}

/// Opens generic parameters to their own archetypes, so the opened type
/// stands for "any instantiation" rather than "some instantiation".
struct ArchetypeOpener<'a, 'db> {
    ctx: SolverContext<'a, 'db>,
    var_archetypes: HashMap<TypeVarId, ArchetypeId>,
}

impl<'db> DependentTypeOpener<'db> for ArchetypeOpener<'_, 'db> {
    fn opened_generic_parameter(
        &mut self,
        param: &GenericParamDecl,
        var: TypeVarId,
    ) -> Option<Type<'db>> {
        self.var_archetypes.insert(var, param.archetype);
        Some(Type::archetype(self.ctx.db, param.archetype))
    }

    fn should_bind_associated_type(
        &mut self,
        _base: Type<'db>,
        base_var: TypeVarId,
        assoc: AssocTypeId,
        member: TypeVarId,
    ) -> AssociatedTypeBinding<'db> {
        let nested = self
            .var_archetypes
            .get(&base_var)
            .and_then(|archetype| self.ctx.decls.archetype_decl(*archetype).nested_archetype(assoc));
        match nested {
            Some(nested) => {
                self.var_archetypes.insert(member, nested);
                AssociatedTypeBinding {
                    bind_member: false,
                    replacement: Some(Type::archetype(self.ctx.db, nested)),
                }
            }
            None => AssociatedTypeBinding::default(),
        }
    }
}

/// Whether `decl1` is at least as specialized as `decl2`: every use of
/// `decl1` could be served by `decl2`.
///
/// Answered by a nested constraint system that never branches on
/// disjunctions, so the check cannot recurse back into ranking.
pub fn is_decl_as_specialized_as<'db>(
    ctx: SolverContext<'_, 'db>,
    config: &SolverConfig,
    decl1: ValueDeclId,
    decl2: ValueDeclId,
) -> bool {
    let db = ctx.db;
    let first = ctx.decls.value_decl(decl1);
    let second = ctx.decls.value_decl(decl2);
    if first.kind != second.kind || first.kind.is_type_decl() {
        return false;
    }

    let mut cs = ConstraintSystem::new(ctx, config.specialization_check());

    let mut opener1 = ArchetypeOpener {
        ctx,
        var_archetypes: HashMap::new(),
    };
    let mut replacements1 = OpenedGenerics::new();
    let self1 = cs.open_context_self(first.context, true, &mut replacements1, &mut opener1);
    let type1 = cs.open_type(
        first.interface_type,
        first.context,
        true,
        &mut replacements1,
        &mut opener1,
    );

    let mut replacements2 = OpenedGenerics::new();
    let self2 = cs.open_context_self(second.context, true, &mut replacements2, &mut FreeOpener);
    let type2 = cs.open_type(
        second.interface_type,
        second.context,
        true,
        &mut replacements2,
        &mut FreeOpener,
    );

    if let (Some(self1), Some(self2)) = (self1, self2) {
        match self_type_relationship(ctx, first.context, second.context) {
            SelfTypeRelationship::Unrelated => {}
            SelfTypeRelationship::Equivalent => {
                cs.add_constraint(Constraint::relational(MatchKind::SameType, self1, self2, None));
            }
            SelfTypeRelationship::Subclass => {
                cs.add_constraint(Constraint::relational(
                    MatchKind::TrivialSubtype,
                    self1,
                    self2,
                    None,
                ));
            }
            SelfTypeRelationship::Superclass => {
                cs.add_constraint(Constraint::relational(
                    MatchKind::TrivialSubtype,
                    self2,
                    self1,
                    None,
                ));
            }
            SelfTypeRelationship::ConformsTo => {
                if let DeclContext::Protocol(proto) = second.context {
                    cs.add_constraint(Constraint::conforms_to(self1, proto, None));
                }
            }
            SelfTypeRelationship::ConformedToBy => {
                if let DeclContext::Protocol(proto) = first.context {
                    cs.add_constraint(Constraint::conforms_to(self2, proto, None));
                }
            }
        }
    }

    // Functions are compared by their parameters only.
    let compares_inputs = first.kind.is_function_like() || first.kind == ValueDeclKind::Subscript;
    let (lhs, rhs) = match (type1.as_function(db), type2.as_function(db)) {
        (Some(f1), Some(f2)) if compares_inputs => (f1.input, f2.input),
        _ => (type1, type2),
    };
    cs.add_constraint(Constraint::relational(MatchKind::Subtype, lhs, rhs, None));

    let result = cs
        .solve(FreeTypeVariableBinding::Allow)
        .is_ok_and(|solutions| !solutions.is_empty());
    debug!(
        first = %decl1.name(),
        second = %decl2.name(),
        result,
        "specialization check"
    );
    result
}

/// Whether `witness` satisfies the protocol requirement `requirement` in
/// the conformance of the witness's context.
fn is_witness_of(ctx: SolverContext<'_, '_>, witness: ValueDeclId, requirement: ValueDeclId) -> bool {
    let witness_decl = ctx.decls.value_decl(witness);
    let requirement_decl = ctx.decls.value_decl(requirement);
    let (DeclContext::Nominal(_), DeclContext::Protocol(proto)) =
        (witness_decl.context, requirement_decl.context)
    else {
        return false;
    };
    let Some(owner) = context_type(ctx, witness_decl.context) else {
        return false;
    };
    match ctx.conformance.conforms_to(ctx.db, owner, proto) {
        ConformanceAnswer::Concrete(conformance) => {
            conformance.value_witness(requirement) == Some(witness)
        }
        _ => false,
    }
}

fn is_archetype(db: &dyn salsa::Database, ty: Type<'_>) -> bool {
    matches!(ty.desugar(db).kind(db), TypeKind::Archetype(_))
}

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    /// Compare solution `idx1` against solution `idx2`.
    pub fn compare_solutions(
        &self,
        solutions: &[Solution<'db>],
        diff: &SolutionDiff<'db>,
        idx1: usize,
        idx2: usize,
    ) -> SolutionCompareResult {
        let db = self.db();
        let ctx = self.ctx();
        let mut score1 = -i64::from(solutions[idx1].fixed_score());
        let mut score2 = -i64::from(solutions[idx2].fixed_score());
        let mut identical = true;

        for overload in &diff.overloads {
            let (choice1, choice2) = (overload.choices[idx1], overload.choices[idx2]);
            if same_overload_choice(&choice1, &choice2) {
                continue;
            }
            identical = false;

            // A declaration found directly beats one found through dynamic
            // lookup.
            if choice1.kind() != choice2.kind() {
                if choice1.kind() == OverloadChoiceKind::DeclViaDynamic {
                    score2 += 1;
                    continue;
                }
                if choice2.kind() == OverloadChoiceKind::DeclViaDynamic {
                    score1 += 1;
                    continue;
                }
            }
            let (Some(decl1), Some(decl2)) = (choice1.decl_id(), choice2.decl_id()) else {
                continue;
            };
            let (value1, value2) = (ctx.decls.value_decl(decl1), ctx.decls.value_decl(decl2));

            if value1.attrs.optional != value2.attrs.optional {
                if value1.attrs.optional {
                    score2 += 1;
                } else {
                    score1 += 1;
                }
            }

            let first_specialized = is_decl_as_specialized_as(ctx, self.config(), decl1, decl2);
            let second_specialized = is_decl_as_specialized_as(ctx, self.config(), decl2, decl1);
            if first_specialized {
                score1 += 1;
            }
            if second_specialized {
                score2 += 1;
            }

            if is_witness_of(ctx, decl1, decl2) {
                score1 += 1;
            } else if is_witness_of(ctx, decl2, decl1) {
                score2 += 1;
            }

            if first_specialized == second_specialized
                && value1.attrs.imported
                && value2.attrs.imported
                && value1.kind.is_type_decl() != value2.kind.is_type_decl()
            {
                if value1.kind.is_type_decl() {
                    score2 += 1;
                } else {
                    score1 += 1;
                }
            }
        }

        for binding in &diff.type_bindings {
            if binding.var.0 as usize >= self.type_vars.len()
                || !self.type_vars.options(binding.var).prefers_subtype_binding
            {
                continue;
            }
            let (type1, type2) = (binding.bindings[idx1], binding.bindings[idx2]);
            if type1.is_equal(type2, db) {
                continue;
            }
            identical = false;
            if type1.has_type_variable(db) || type2.has_type_variable(db) {
                continue;
            }

            let first_better = is_subtype_of(ctx, type1, type2);
            let second_better = is_subtype_of(ctx, type2, type1);
            if first_better || second_better {
                if first_better {
                    score1 += 1;
                }
                if second_better {
                    score2 += 1;
                }
                let (unlabeled1, unlabeled2) = (type1.unlabeled(db), type2.unlabeled(db));
                if unlabeled1.is_equal(unlabeled2, db) {
                    if type1.is_equal(unlabeled1, db) {
                        score1 += 1;
                    } else if type2.is_equal(unlabeled2, db) {
                        score2 += 1;
                    }
                }
                continue;
            }

            let first_better = is_convertible_to(ctx, type1, type2);
            let second_better = is_convertible_to(ctx, type2, type1);
            if first_better || second_better {
                if first_better {
                    score1 += 1;
                }
                if second_better {
                    score2 += 1;
                }
                continue;
            }

            // A concrete type beats an archetype.
            match (is_archetype(db, type1), is_archetype(db, type2)) {
                (true, false) => score2 += 1,
                (false, true) => score1 += 1,
                _ => {}
            }
        }

        let result = if score1 == score2 {
            if identical {
                SolutionCompareResult::Identical
            } else {
                SolutionCompareResult::Incomparable
            }
        } else if score1 > score2 {
            SolutionCompareResult::Better
        } else {
            SolutionCompareResult::Worse
        };
        debug!(idx1, idx2, score1, score2, result = ?result, "compared solutions");
        result
    }

    /// Index of the unique best solution.
    ///
    /// When no solution beats all others, the solutions strictly worse than
    /// some other one are removed from `solutions` and `None` is returned.
    pub fn find_best_solution(&self, solutions: &mut Vec<Solution<'db>>) -> Option<usize> {
        match solutions.len() {
            0 => return None,
            1 => return Some(0),
            _ => {}
        }
        let diff = SolutionDiff::new(self.db(), solutions);

        let mut best = 0;
        for idx in 1..solutions.len() {
            if self.compare_solutions(solutions, &diff, idx, best) == SolutionCompareResult::Better {
                best = idx;
            }
        }

        let ambiguous = (0..solutions.len()).filter(|idx| *idx != best).any(|idx| {
            matches!(
                self.compare_solutions(solutions, &diff, best, idx),
                SolutionCompareResult::Incomparable | SolutionCompareResult::Worse
            )
        });
        if !ambiguous {
            debug!(best, "found best solution");
            return Some(best);
        }

        let mut losers = vec![false; solutions.len()];
        for i in 0..solutions.len() {
            if losers[i] {
                continue;
            }
            for j in (i + 1)..solutions.len() {
                if losers[j] {
                    continue;
                }
                match self.compare_solutions(solutions, &diff, i, j) {
                    SolutionCompareResult::Better => losers[j] = true,
                    SolutionCompareResult::Worse => losers[i] = true,
                    SolutionCompareResult::Identical | SolutionCompareResult::Incomparable => {}
                }
            }
        }
        let mut index = 0;
        solutions.retain(|_| {
            let keep = !losers[index];
            index += 1;
            keep
        });
        debug!(remaining = solutions.len(), "ambiguous solutions");
        None
    }
}
