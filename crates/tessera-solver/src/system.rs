//! The constraint system.
//!
//! A [`ConstraintSystem`] owns everything one type-checking request needs:
//! type variables, interned locators, the constraint worklist, resolved
//! overloads and the failure log. While a search is running every mutation
//! is written to a trail so that the solver can roll it back in LIFO order.

use std::collections::{HashMap, HashSet};

use tessera_types::{
    ConformanceOracle, DeclIntrospection, MemberLookup, NominalId, Symbol, Type, TypeKind,
    TypeVarId, ValueDeclId, ValueDeclKind,
};
use tracing::trace;

use crate::choice::OverloadChoice;
use crate::config::SolverConfig;
use crate::constraint::{Constraint, ConstraintId, ConstraintStore, ConversionRestriction, SolutionKind};
use crate::failure::{Failure, FailureLog};
use crate::locator::{LocatorBuilder, LocatorId, LocatorStore, PathElement};
use crate::typevar::{SavedBinding, TypeVarOptions, TypeVarStore};

/// The collaborators a constraint system consults.
#[derive(Clone, Copy)]
pub struct SolverContext<'a, 'db> {
    pub db: &'db dyn salsa::Database,
    pub decls: &'a dyn DeclIntrospection<'db>,
    pub lookup: &'a dyn MemberLookup<'db>,
    pub conformance: &'a dyn ConformanceOracle<'db>,
}

impl<'a, 'db> SolverContext<'a, 'db> {
    /// A context backed by one environment answering every query.
    pub fn new<E>(db: &'db dyn salsa::Database, env: &'a E) -> Self
    where
        E: DeclIntrospection<'db> + MemberLookup<'db> + ConformanceOracle<'db>,
    {
        Self {
            db,
            decls: env,
            lookup: env,
            conformance: env,
        }
    }
}

/// An overload set that has been bound to one of its choices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedOverload<'db> {
    pub locator: Option<LocatorId>,
    pub bound: Type<'db>,
    pub choice: OverloadChoice<'db>,
    /// The opened type of the full declaration reference, including any
    /// curried `self`.
    pub opened_full_type: Option<Type<'db>>,
    /// The type the bound type was equated with.
    pub implied: Type<'db>,
}

/// A conversion path the matcher committed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedRestriction<'db> {
    pub from: Type<'db>,
    pub to: Type<'db>,
    pub restriction: ConversionRestriction,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SolverState {
    pub depth: usize,
    pub steps: usize,
    /// Number of disjunction or binding branches currently open.
    pub branch_depth: usize,
    /// Type variables that existed when the search began. Only these mean
    /// the same thing in every solution.
    pub shared_type_vars: usize,
}

#[derive(Clone, Debug)]
enum TrailEntry<'db> {
    Binding(SavedBinding<'db>),
    TypeVarCreated,
    ConstraintAdded(ConstraintId),
    ConstraintRemoved(ConstraintId, Constraint<'db>),
    ConstraintRetired,
    OverloadResolved,
    RestrictionRecorded,
    ScoreIncreased(u32),
    FailedConstraintSet,
}

/// A position in the trail to roll back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint(usize);

pub struct ConstraintSystem<'a, 'db> {
    ctx: SolverContext<'a, 'db>,
    config: SolverConfig,
    pub(crate) type_vars: TypeVarStore<'db>,
    pub(crate) locators: LocatorStore,
    pub(crate) constraints: ConstraintStore<'db>,
    resolved_overloads: Vec<ResolvedOverload<'db>>,
    restrictions: Vec<RecordedRestriction<'db>>,
    failed_constraint: Option<Constraint<'db>>,
    failures: FailureLog<'db>,
    fixed_score: u32,
    trail: Vec<TrailEntry<'db>>,
    pub(crate) solver_state: Option<SolverState>,
    member_lookups: HashMap<(Type<'db>, Symbol), Vec<ValueDeclId>>,
}

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    pub fn new(ctx: SolverContext<'a, 'db>, config: SolverConfig) -> Self {
        Self {
            ctx,
            config,
            type_vars: TypeVarStore::new(),
            locators: LocatorStore::new(),
            constraints: ConstraintStore::new(),
            resolved_overloads: Vec::new(),
            restrictions: Vec::new(),
            failed_constraint: None,
            failures: FailureLog::default(),
            fixed_score: 0,
            trail: Vec::new(),
            solver_state: None,
            member_lookups: HashMap::new(),
        }
    }

    pub fn ctx(&self) -> SolverContext<'a, 'db> {
        self.ctx
    }

    pub fn db(&self) -> &'db dyn salsa::Database {
        self.ctx.db
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn type_vars(&self) -> &TypeVarStore<'db> {
        &self.type_vars
    }

    pub fn locators(&self) -> &LocatorStore {
        &self.locators
    }

    pub fn locators_mut(&mut self) -> &mut LocatorStore {
        &mut self.locators
    }

    pub fn constraints(&self) -> &ConstraintStore<'db> {
        &self.constraints
    }

    pub fn resolved_overloads(&self) -> &[ResolvedOverload<'db>] {
        &self.resolved_overloads
    }

    pub fn restrictions(&self) -> &[RecordedRestriction<'db>] {
        &self.restrictions
    }

    pub fn failed_constraint(&self) -> Option<&Constraint<'db>> {
        self.failed_constraint.as_ref()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure<'db>> {
        self.failures.all()
    }

    /// The representative failure: the first one recorded outside any branch.
    pub fn first_failure(&self) -> Option<Failure<'db>> {
        self.failures.first()
    }

    pub fn fixed_score(&self) -> u32 {
        self.fixed_score
    }

    // ===== Type variables =====

    pub fn create_type_var(
        &mut self,
        options: TypeVarOptions,
        locator: Option<LocatorId>,
    ) -> TypeVarId {
        let var = self.type_vars.create(options, locator);
        self.push_trail(TrailEntry::TypeVarCreated);
        var
    }

    /// A fresh variable as a type.
    pub fn new_type_var(&mut self, options: TypeVarOptions, locator: Option<LocatorId>) -> Type<'db> {
        let var = self.create_type_var(options, locator);
        Type::type_var(self.db(), var)
    }

    pub fn representative(&self, var: TypeVarId) -> TypeVarId {
        self.type_vars.representative(var)
    }

    pub fn fixed_type(&self, var: TypeVarId) -> Option<Type<'db>> {
        self.type_vars.fixed_type(var)
    }

    /// Bind a free representative.
    ///
    /// # Panics
    ///
    /// Panics if `var` is not a free representative or `ty` mentions it; the
    /// matcher checks both before binding.
    pub fn assign_fixed_type(&mut self, var: TypeVarId, ty: Type<'db>) {
        trace!(var = %var, ty = %ty.display(self.db()), "assign fixed type");
        match self.type_vars.assign_fixed_type(self.ctx.db, var, ty) {
            Ok(saved) => self.push_trail(TrailEntry::Binding(saved)),
            Err(err) => panic!("invalid type variable binding: {err}"),
        }
    }

    pub fn merge_equivalence_classes(&mut self, a: TypeVarId, b: TypeVarId) {
        trace!(a = %a, b = %b, "merge equivalence classes");
        let saved = self.type_vars.merge(a, b);
        self.push_trail(TrailEntry::Binding(saved));
    }

    /// Look through bindings until reaching a concrete type or an unbound
    /// variable. The variable, if any, is returned as its representative.
    pub fn fixed_type_recursive(
        &self,
        ty: Type<'db>,
        want_rvalue: bool,
    ) -> (Type<'db>, Option<TypeVarId>) {
        let db = self.db();
        let ty = if want_rvalue { ty.rvalue(db) } else { ty };
        let Some(mut var) = ty.as_type_var(db) else {
            return (ty, None);
        };
        loop {
            match self.fixed_type(var) {
                Some(fixed) => {
                    let fixed = if want_rvalue { fixed.rvalue(db) } else { fixed };
                    match fixed.as_type_var(db) {
                        Some(next) => var = next,
                        None => return (fixed, None),
                    }
                }
                None => {
                    let rep = self.representative(var);
                    return (Type::type_var(db, rep), Some(rep));
                }
            }
        }
    }

    /// Substitute every bound variable, recursively.
    pub fn simplify_type(&self, ty: Type<'db>) -> Type<'db> {
        self.simplify_type_guarded(ty, &mut HashSet::new())
    }

    fn simplify_type_guarded(&self, ty: Type<'db>, substituting: &mut HashSet<TypeVarId>) -> Type<'db> {
        let db = self.db();
        ty.transform(db, &mut |node| match node.kind(db) {
            TypeKind::TypeVar(var) => {
                let rep = self.representative(*var);
                if let Some(fixed) = self.fixed_type(rep)
                    && substituting.insert(rep)
                {
                    let result = self.simplify_type_guarded(fixed, substituting);
                    substituting.remove(&rep);
                    return Some(result);
                }
                Some(Type::type_var(db, rep))
            }
            _ => None,
        })
    }

    // ===== Locators =====

    pub fn locator(&mut self, builder: &LocatorBuilder) -> Option<LocatorId> {
        self.locators.materialize(builder)
    }

    pub fn extend_locator(&mut self, base: Option<LocatorId>, elt: PathElement) -> Option<LocatorId> {
        base.map(|base| self.locators.extend(base, &[elt]))
    }

    // ===== Constraints =====

    /// Add a constraint, simplifying it right away.
    ///
    /// A constraint that cannot make progress yet is put on the worklist; a
    /// failing one becomes the failed constraint unless one is already known.
    pub fn add_constraint(&mut self, constraint: Constraint<'db>) -> SolutionKind {
        let result = self.simplify_constraint(&constraint);
        match result {
            SolutionKind::Error => {
                trace!(constraint = %constraint.display(self.db()), "constraint failed");
                self.set_failed_constraint(constraint.clone());
                self.retire(constraint);
            }
            SolutionKind::Solved => self.retire(constraint),
            SolutionKind::Unsolved => {
                let id = self.constraints.push(constraint);
                self.push_trail(TrailEntry::ConstraintAdded(id));
            }
        }
        result
    }

    /// Take an active constraint off the worklist.
    pub(crate) fn remove_constraint(&mut self, id: ConstraintId) -> Option<Constraint<'db>> {
        let constraint = self.constraints.remove(id)?;
        self.push_trail(TrailEntry::ConstraintRemoved(id, constraint.clone()));
        Some(constraint)
    }

    pub(crate) fn retire(&mut self, constraint: Constraint<'db>) {
        if self.solver_state.is_some() {
            self.constraints.retire(constraint);
            self.push_trail(TrailEntry::ConstraintRetired);
        }
    }

    pub(crate) fn set_failed_constraint(&mut self, constraint: Constraint<'db>) {
        if self.failed_constraint.is_none() {
            self.failed_constraint = Some(constraint);
            self.push_trail(TrailEntry::FailedConstraintSet);
        }
    }

    pub(crate) fn record_failure(&mut self, failure: Failure<'db>) {
        let in_branch = self
            .solver_state
            .as_ref()
            .is_some_and(|state| state.branch_depth > 0);
        self.failures.record(failure, in_branch);
    }

    pub(crate) fn increase_score(&mut self, amount: u32) {
        self.fixed_score += amount;
        self.push_trail(TrailEntry::ScoreIncreased(amount));
    }

    pub(crate) fn record_restriction(
        &mut self,
        from: Type<'db>,
        to: Type<'db>,
        restriction: ConversionRestriction,
    ) {
        self.restrictions.push(RecordedRestriction {
            from,
            to,
            restriction,
        });
        self.push_trail(TrailEntry::RestrictionRecorded);
    }

    pub(crate) fn record_resolved_overload(&mut self, resolved: ResolvedOverload<'db>) {
        self.resolved_overloads.push(resolved);
        self.push_trail(TrailEntry::OverloadResolved);
    }

    // ===== Trail =====

    fn push_trail(&mut self, entry: TrailEntry<'db>) {
        if self.solver_state.is_some() {
            self.trail.push(entry);
        }
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.trail.len())
    }

    /// Undo every mutation made since `checkpoint`.
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        while self.trail.len() > checkpoint.0 {
            let Some(entry) = self.trail.pop() else {
                break;
            };
            match entry {
                TrailEntry::Binding(saved) => self.type_vars.restore(saved),
                TrailEntry::TypeVarCreated => {
                    let len = self.type_vars.len();
                    self.type_vars.truncate(len - 1);
                }
                TrailEntry::ConstraintAdded(id) => {
                    self.constraints.remove(id);
                }
                TrailEntry::ConstraintRemoved(id, constraint) => {
                    self.constraints.reinsert(id, constraint)
                }
                TrailEntry::ConstraintRetired => {
                    self.constraints.unretire();
                }
                TrailEntry::OverloadResolved => {
                    self.resolved_overloads.pop();
                }
                TrailEntry::RestrictionRecorded => {
                    self.restrictions.pop();
                }
                TrailEntry::ScoreIncreased(amount) => self.fixed_score -= amount,
                TrailEntry::FailedConstraintSet => self.failed_constraint = None,
            }
        }
    }

    // ===== Lookup =====

    /// Members named `name` of `base`, cached by canonical base type.
    ///
    /// On the dynamic-lookup existential, candidates sharing a selector and
    /// type are collapsed to the first one.
    pub fn lookup_member(&mut self, base: Type<'db>, name: Symbol) -> Vec<ValueDeclId> {
        let db = self.db();
        let key = (base.canonical(db), name);
        if let Some(found) = self.member_lookups.get(&key) {
            return found.clone();
        }
        let mut found = self.ctx.lookup.lookup_member(db, key.0, name);
        if self.is_dynamic_lookup_base(key.0) {
            let mut seen = HashSet::new();
            found.retain(|decl| seen.insert(self.dynamic_signature(*decl)));
        }
        self.member_lookups.insert(key, found.clone());
        found
    }

    fn is_dynamic_lookup_base(&self, base: Type<'db>) -> bool {
        let db = self.db();
        let instance = base.metatype_instance(db).unwrap_or(base).desugar(db);
        match (instance.kind(db), self.ctx.decls.dynamic_lookup_protocol()) {
            (TypeKind::Protocol(proto), Some(dynamic)) => *proto == dynamic,
            _ => false,
        }
    }

    /// Selector plus canonical type, identifying a dynamically found member.
    fn dynamic_signature(&self, decl: ValueDeclId) -> (String, Type<'db>) {
        let value = self.ctx.decls.value_decl(decl);
        let selector = match value.kind {
            ValueDeclKind::Func => {
                let prefix = if value.is_static { '+' } else { '-' };
                format!("{prefix}{}", value.name())
            }
            _ => value.name().to_string(),
        };
        (selector, value.interface_type.canonical(self.db()))
    }

    // ===== Type queries =====

    /// Class types and class-bound archetypes.
    pub fn may_have_superclass(&self, ty: Type<'db>) -> bool {
        let db = self.db();
        match ty.desugar(db).kind(db) {
            TypeKind::Archetype(archetype) => {
                let decl = self.ctx.decls.archetype_decl(*archetype);
                decl.requires_class || decl.superclass.is_some()
            }
            _ => self.class_decl(ty).is_some(),
        }
    }

    /// The class declaration of a class or bound generic class type.
    pub fn class_decl(&self, ty: Type<'db>) -> Option<NominalId> {
        let db = self.db();
        match ty.desugar(db).kind(db) {
            TypeKind::Nominal { decl, .. } | TypeKind::BoundGeneric { decl, .. } => {
                self.ctx.decls.nominal_decl(*decl).is_class().then_some(*decl)
            }
            _ => None,
        }
    }

    /// An existential one of whose protocols only classes can conform to.
    pub fn is_class_existential(&self, ty: Type<'db>) -> bool {
        ty.existential_protocols(self.db()).is_some_and(|protocols| {
            protocols
                .iter()
                .any(|proto| self.ctx.decls.protocol_decl(*proto).class_bound)
        })
    }
}

#[cfg(test)]
mod tests {
    use tessera_types::{DeclTable, NominalKind};

    use super::*;
    use crate::constraint::MatchKind;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn rollback_restores_bindings_and_worklist() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        let t1 = cs.new_type_var(TypeVarOptions::NONE, None);
        cs.solver_state = Some(SolverState::default());
        let checkpoint = cs.checkpoint();

        cs.add_constraint(Constraint::relational(MatchKind::Subtype, t0, t1, None));
        cs.add_constraint(Constraint::relational(MatchKind::Bind, t0, int, None));
        let t2 = cs.new_type_var(TypeVarOptions::NONE, None);
        assert_eq!(cs.simplify_type(t0), int);
        assert_eq!(cs.constraints().active_len(), 1);
        assert!(t2.as_type_var(&db).is_some());

        cs.rollback(checkpoint);
        assert_eq!(cs.simplify_type(t0), t0);
        assert_eq!(cs.constraints().active_len(), 0);
        assert_eq!(cs.type_vars().len(), 2);
        assert!(cs.constraints().retired().is_empty());
    }

    #[test]
    fn fixed_type_recursive_follows_chains() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let a = cs.create_type_var(TypeVarOptions::NONE.lvalue_allowed(), None);
        let b = cs.create_type_var(TypeVarOptions::NONE, None);
        let lvalue = Type::lvalue(&db, Type::type_var(&db, b), Default::default());
        cs.assign_fixed_type(a, lvalue);

        let a_ty = Type::type_var(&db, a);
        assert_eq!(cs.fixed_type_recursive(a_ty, false), (lvalue, None));
        assert_eq!(
            cs.fixed_type_recursive(a_ty, true),
            (Type::type_var(&db, b), Some(b))
        );
        cs.assign_fixed_type(b, int);
        assert_eq!(cs.fixed_type_recursive(a_ty, true), (int, None));
    }

    #[test]
    fn member_lookups_are_cached_by_canonical_type() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let point = decls.add_nominal("Point", NominalKind::Struct);
        let point_ty = Type::nominal(&db, point);
        let x = decls.add_var("x", tessera_types::DeclContext::Nominal(point), point_ty);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let sugared = Type::paren(&db, point_ty);
        assert_eq!(cs.lookup_member(sugared, Symbol::new("x")), vec![x]);
        assert_eq!(cs.lookup_member(point_ty, Symbol::new("x")), vec![x]);
        assert_eq!(cs.member_lookups.len(), 1);
    }
}
