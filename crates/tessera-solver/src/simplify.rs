//! Constraint simplification.
//!
//! [`ConstraintSystem::simplify_constraint`] makes whatever progress a single
//! constraint allows given the current bindings. Relational constraints go
//! to the matcher; the others are handled here.

use tessera_types::{
    INIT, ProtocolId, Symbol, Type, TypeKind, ValueDeclId, ValueDeclKind, named_element_index,
};
use tracing::trace;

use crate::choice::OverloadChoice;
use crate::constraint::{
    ConformanceKind, Constraint, MatchFlags, MatchKind, MemberKind, SolutionKind, TypeProperty,
};
use crate::failure::{Failure, FailureKind};
use crate::locator::{LocatorBuilder, LocatorId, PathElement};
use crate::relations::{CheckedCastKind, classify_checked_cast};
use crate::system::ConstraintSystem;
use crate::typevar::TypeVarOptions;

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    /// Simplify one constraint against the current bindings.
    pub(crate) fn simplify_constraint(&mut self, constraint: &Constraint<'db>) -> SolutionKind {
        trace!(constraint = %constraint.display(self.db()), "simplify");
        match constraint {
            Constraint::Relational {
                kind,
                first,
                second,
                restriction,
                locator,
            } => {
                let builder = LocatorBuilder::new(*locator);
                match restriction {
                    Some(restriction) => {
                        let want_rvalue = *kind == MatchKind::SameType;
                        let (first, _) = self.fixed_type_recursive(*first, want_rvalue);
                        let (second, _) = self.fixed_type_recursive(*second, want_rvalue);
                        self.apply_restriction(
                            *restriction,
                            first,
                            second,
                            *kind,
                            MatchFlags::NONE.with_generate_constraints(),
                            &builder,
                        )
                    }
                    None => self.match_types(*first, *second, *kind, MatchFlags::NONE, &builder),
                }
            }
            Constraint::Construction {
                argument,
                value,
                locator,
            } => self.simplify_construction(*argument, *value, *locator),
            Constraint::ApplicableFunction {
                function,
                callee,
                locator,
            } => self.simplify_applicable_function(*function, *callee, *locator),
            Constraint::BindOverload {
                bound,
                choice,
                locator,
            } => {
                let resolved = self.resolved_overloads().iter().any(|resolved| {
                    resolved.locator == *locator
                        && resolved.bound == *bound
                        && resolved.choice == *choice
                });
                if !resolved {
                    self.resolve_overload(*locator, *bound, *choice);
                }
                SolutionKind::Solved
            }
            Constraint::Conformance {
                kind,
                ty,
                protocol,
                locator,
            } => self.simplify_conformance(*ty, *protocol, *kind, *locator),
            Constraint::CheckedCast { from, to, locator } => {
                self.simplify_checked_cast(*from, *to, *locator)
            }
            Constraint::Member {
                kind,
                base,
                name,
                member,
                locator,
            } => self.simplify_member(*kind, *base, *name, *member, *locator),
            Constraint::TypeProperty {
                property,
                ty,
                locator,
            } => self.simplify_type_property(*property, *ty, *locator),
            Constraint::Conjunction { nested, .. } => {
                for child in nested {
                    self.add_constraint(child.clone());
                    if self.failed_constraint().is_some() {
                        return SolutionKind::Error;
                    }
                }
                SolutionKind::Solved
            }
            // Only the solver picks an alternative.
            Constraint::Disjunction { .. } => SolutionKind::Unsolved,
        }
    }

    fn simplify_construction(
        &mut self,
        argument: Type<'db>,
        value: Type<'db>,
        locator: Option<LocatorId>,
    ) -> SolutionKind {
        let db = self.db();
        let (value, var) = self.fixed_type_recursive(value, false);
        if var.is_some() {
            return SolutionKind::Unsolved;
        }

        match value.desugar(db).kind(db) {
            TypeKind::Error => return SolutionKind::Error,
            // Tuple construction is tuple conversion.
            TypeKind::Tuple(_) => {
                return self.match_types(
                    argument,
                    value,
                    MatchKind::Conversion,
                    MatchFlags::NONE.with_generate_constraints(),
                    &LocatorBuilder::new(locator),
                );
            }
            TypeKind::Nominal { .. } | TypeKind::BoundGeneric { .. } | TypeKind::Archetype(_) => {}
            _ => {
                self.record_failure(Failure::new(FailureKind::TypesNotConstructible, value, locator));
                return SolutionKind::Error;
            }
        }

        if self.ctx().lookup.lookup_constructors(db, value).is_empty() {
            self.record_failure(Failure::new(FailureKind::TypesNotConstructible, value, locator));
            return SolutionKind::Error;
        }

        // The initializer has type `$Arg -> Value`: initializers of nominal
        // types produce exactly that type.
        let apply_locator = self.extend_locator(locator, PathElement::ApplyArgument);
        let input = self.new_type_var(
            TypeVarOptions::NONE.lvalue_allowed().prefers_subtype(),
            apply_locator,
        );
        let member_locator = self.extend_locator(locator, PathElement::ConstructorMember);
        self.add_constraint(Constraint::value_member(
            value,
            INIT(),
            Type::function(db, input, value),
            member_locator,
        ));
        self.add_constraint(Constraint::relational(
            MatchKind::Conversion,
            argument,
            input,
            apply_locator,
        ));
        SolutionKind::Solved
    }

    fn simplify_applicable_function(
        &mut self,
        function: Type<'db>,
        callee: Type<'db>,
        locator: Option<LocatorId>,
    ) -> SolutionKind {
        let db = self.db();
        let (callee, var) = self.fixed_type_recursive(callee, true);
        if function.desugar(db) == callee.desugar(db) {
            return SolutionKind::Solved;
        }
        if var.is_some() {
            return SolutionKind::Unsolved;
        }
        let Some(applied) = self.simplify_type(function).as_function(db) else {
            self.record_failure(
                Failure::new(FailureKind::FunctionTypesMismatch, function, locator).with_second(callee),
            );
            return SolutionKind::Error;
        };

        let outer = self.strip_apply_function(locator);
        let flags = MatchFlags::NONE.with_generate_constraints();

        match callee.desugar(db).kind(db) {
            TypeKind::Function(callee_fn) => {
                let argument = LocatorBuilder::new(outer).with_path_element(PathElement::ApplyArgument);
                if self.match_types(
                    applied.input,
                    callee_fn.input,
                    MatchKind::Conversion,
                    flags,
                    &argument,
                ) == SolutionKind::Error
                {
                    return SolutionKind::Error;
                }
                let result = LocatorBuilder::new(locator).with_path_element(PathElement::FunctionResult);
                if self.match_types(applied.result, callee_fn.result, MatchKind::Bind, flags, &result)
                    == SolutionKind::Error
                {
                    return SolutionKind::Error;
                }
                SolutionKind::Solved
            }
            TypeKind::Metatype(instance) => {
                let instance = *instance;
                self.add_constraint(Constraint::construction(applied.input, instance, outer));
                let result = LocatorBuilder::new(locator).with_path_element(PathElement::FunctionResult);
                if self.match_types(applied.result, instance, MatchKind::Bind, flags, &result)
                    == SolutionKind::Error
                {
                    return SolutionKind::Error;
                }
                SolutionKind::Solved
            }
            _ => {
                self.record_failure(
                    Failure::new(FailureKind::FunctionTypesMismatch, function, locator)
                        .with_second(callee),
                );
                SolutionKind::Error
            }
        }
    }

    /// The locator of the whole application, without a trailing
    /// `ApplyFunction` element.
    fn strip_apply_function(&mut self, locator: Option<LocatorId>) -> Option<LocatorId> {
        let id = locator?;
        let resolved = self.locators.get(id);
        if resolved.path.last() != Some(&PathElement::ApplyFunction) {
            return Some(id);
        }
        let anchor = resolved.anchor;
        let path = resolved.path[..resolved.path.len() - 1].to_vec();
        Some(self.locators.intern(anchor, path))
    }

    pub(crate) fn simplify_conformance(
        &mut self,
        ty: Type<'db>,
        protocol: ProtocolId,
        kind: ConformanceKind,
        locator: Option<LocatorId>,
    ) -> SolutionKind {
        let db = self.db();
        let (ty, var) = self.fixed_type_recursive(ty, true);
        if var.is_some() {
            return SolutionKind::Unsolved;
        }

        // An existential is the `Self` of any protocol it contains.
        if kind == ConformanceKind::SelfObjectOf
            && let Some(protocols) = ty.existential_protocols(db)
        {
            let decls = self.ctx().decls;
            if protocols
                .iter()
                .any(|proto| decls.protocol_inherits(*proto, protocol))
            {
                return SolutionKind::Solved;
            }
        }

        if self.ctx().conformance.conforms_to(db, ty, protocol).conforms() {
            return SolutionKind::Solved;
        }
        self.record_failure(
            Failure::new(FailureKind::DoesNotConformToProtocol, ty, locator)
                .with_second(Type::protocol(db, protocol)),
        );
        SolutionKind::Error
    }

    fn simplify_checked_cast(
        &mut self,
        from: Type<'db>,
        to: Type<'db>,
        locator: Option<LocatorId>,
    ) -> SolutionKind {
        let db = self.db();
        let (from, from_var) = self.fixed_type_recursive(from, true);
        if from_var.is_some() {
            return SolutionKind::Unsolved;
        }
        let (to, to_var) = self.fixed_type_recursive(to, true);
        if to_var.is_some() {
            return SolutionKind::Unsolved;
        }
        if from.is_equal(to, db) {
            return SolutionKind::Solved;
        }

        match classify_checked_cast(self.ctx(), from, to) {
            CheckedCastKind::Downcast => {
                if !self.may_have_superclass(from) {
                    self.record_failure(
                        Failure::new(FailureKind::CastUnresolved, from, locator).with_second(to),
                    );
                    return SolutionKind::Error;
                }
                self.add_constraint(Constraint::relational(MatchKind::Subtype, to, from, locator));
                SolutionKind::Solved
            }
            CheckedCastKind::ExistentialToConcrete => {
                self.add_constraint(Constraint::relational(
                    MatchKind::Conversion,
                    to,
                    from,
                    locator,
                ));
                SolutionKind::Solved
            }
            CheckedCastKind::ConcreteToUnrelatedExistential
            | CheckedCastKind::ArchetypeToArchetype
            | CheckedCastKind::ArchetypeToConcrete
            | CheckedCastKind::ExistentialToArchetype
            | CheckedCastKind::SuperToArchetype
            | CheckedCastKind::ConcreteToArchetype => SolutionKind::Solved,
        }
    }

    fn simplify_member(
        &mut self,
        kind: MemberKind,
        base: Type<'db>,
        name: Symbol,
        member: Type<'db>,
        locator: Option<LocatorId>,
    ) -> SolutionKind {
        let db = self.db();
        let base = self.simplify_type(base);
        let base_obj = base.rvalue(db);
        let (instance, is_metatype) = match base_obj.metatype_instance(db) {
            Some(instance) => (instance, true),
            None => (base_obj, false),
        };
        if instance.as_type_var(db).is_some() {
            return SolutionKind::Unsolved;
        }

        // Tuple elements, by label or position.
        if let Some(elts) = base_obj.tuple_elements(db) {
            let index = name
                .as_index()
                .filter(|index| *index < elts.len())
                .or_else(|| named_element_index(elts, name));
            let Some(index) = index else {
                return self.fail_member(base_obj, name, locator);
            };
            let choice = OverloadChoice::TupleIndex {
                base,
                index: index as u32,
            };
            self.add_constraint(Constraint::bind_overload(member, choice, locator));
            return SolutionKind::Solved;
        }

        let decls = self.ctx().decls;
        let is_existential = instance.is_existential(db);

        if name == INIT() {
            let choices: Vec<_> = self
                .ctx()
                .lookup
                .lookup_constructors(db, base_obj)
                .into_iter()
                .filter(|ctor| !(is_existential && self.involves_associated_types(*ctor)))
                .map(|ctor| OverloadChoice::decl(decls, Some(base), ctor))
                .collect();
            if choices.is_empty() {
                return self.fail_member(base_obj, name, locator);
            }
            self.add_overload_set(member, choices, locator);
            return SolutionKind::Solved;
        }

        if kind == MemberKind::Type {
            let found = self.ctx().lookup.lookup_member_type(db, base_obj, name);
            if found.is_empty() {
                return self.fail_member(base_obj, name, locator);
            }
            let choices = found
                .into_iter()
                .map(|decl| OverloadChoice::decl(decls, Some(base), decl))
                .collect();
            self.add_overload_set(member, choices, locator);
            return SolutionKind::Solved;
        }

        let found = self.lookup_member(base_obj, name);
        if found.is_empty() {
            // `.0` of a scalar is the scalar itself.
            if name.as_index() == Some(0) {
                self.add_constraint(Constraint::bind_overload(
                    member,
                    OverloadChoice::BaseType { base },
                    locator,
                ));
                return SolutionKind::Solved;
            }
            return self.fail_member(base_obj, name, locator);
        }

        let is_dynamic_lookup = match (instance.desugar(db).kind(db), decls.dynamic_lookup_protocol()) {
            (TypeKind::Protocol(proto), Some(dynamic)) => *proto == dynamic,
            _ => false,
        };
        let is_module = matches!(base_obj.desugar(db).kind(db), TypeKind::Module(_));

        let mut choices = Vec::with_capacity(found.len());
        for decl in found {
            let value = decls.value_decl(decl);
            if is_existential && self.involves_associated_types(decl) {
                continue;
            }
            // A metatype base only sees functions and non-instance members.
            if is_metatype && !(value.kind == ValueDeclKind::Func || !value.is_instance_member()) {
                continue;
            }
            if !is_metatype && !is_module && !value.is_instance_member() {
                continue;
            }
            if is_dynamic_lookup {
                if is_metatype && value.is_instance_member() {
                    continue;
                }
                choices.push(OverloadChoice::DeclViaDynamic { base, decl });
                continue;
            }
            choices.push(OverloadChoice::decl(decls, Some(base), decl));
        }

        if choices.is_empty() {
            return self.fail_member(base_obj, name, locator);
        }
        self.add_overload_set(member, choices, locator);
        SolutionKind::Solved
    }

    fn fail_member(
        &mut self,
        base: Type<'db>,
        name: Symbol,
        locator: Option<LocatorId>,
    ) -> SolutionKind {
        self.record_failure(Failure::new(FailureKind::DoesNotHaveMember, base, locator).with_name(name));
        SolutionKind::Error
    }

    /// Members whose signature mentions associated types cannot be used on
    /// an existential.
    fn involves_associated_types(&self, decl: ValueDeclId) -> bool {
        let db = self.db();
        self.ctx()
            .decls
            .value_decl(decl)
            .interface_type
            .any(db, &mut |ty| matches!(ty.kind(db), TypeKind::DependentMember { .. }))
    }

    fn simplify_type_property(
        &mut self,
        property: TypeProperty,
        ty: Type<'db>,
        locator: Option<LocatorId>,
    ) -> SolutionKind {
        let db = self.db();
        let (resolved, var) = self.fixed_type_recursive(ty, true);
        if var.is_some() {
            return SolutionKind::Unsolved;
        }

        let (holds, failure) = match property {
            TypeProperty::Archetype => (
                matches!(resolved.desugar(db).kind(db), TypeKind::Archetype(_)),
                FailureKind::IsNotArchetype,
            ),
            TypeProperty::Class => (
                self.may_have_superclass(resolved) || self.is_class_existential(resolved),
                FailureKind::IsNotClass,
            ),
            TypeProperty::DynamicLookupValue => {
                let dynamic = self.ctx().decls.dynamic_lookup_protocol();
                let holds = match resolved.desugar(db).kind(db) {
                    TypeKind::Protocol(proto) => Some(*proto) == dynamic,
                    _ => false,
                };
                (holds, FailureKind::IsNotDynamicLookup)
            }
        };

        if holds {
            SolutionKind::Solved
        } else {
            self.record_failure(Failure::new(failure, resolved, locator));
            SolutionKind::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use tessera_types::{Conformance, DeclContext, DeclTable, LValueQuals, NominalKind, TupleElt};

    use super::*;
    use crate::config::SolverConfig;
    use crate::failure::FailureCategory;
    use crate::locator::Anchor;
    use crate::system::SolverContext;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn solved_constraint_stays_solved() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        let bind = Constraint::relational(MatchKind::Bind, t0, int, None);
        assert_eq!(cs.simplify_constraint(&bind), SolutionKind::Solved);
        let vars = cs.type_vars().len();
        assert_eq!(cs.simplify_constraint(&bind), SolutionKind::Solved);
        assert_eq!(cs.type_vars().len(), vars);
        assert_eq!(cs.constraints().active_len(), 0);
        assert_eq!(cs.simplify_type(t0), int);
    }

    #[test]
    fn overload_binding_resolves_once() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let f = decls.add_func("f", decls.top_level(), Type::function(&db, int, int));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let anchor = cs.locators_mut().anchor(Anchor::expr(0));
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        let bind = Constraint::bind_overload(
            t0,
            OverloadChoice::Decl { base: None, decl: f },
            Some(anchor),
        );
        assert_eq!(cs.simplify_constraint(&bind), SolutionKind::Solved);
        assert_eq!(cs.simplify_constraint(&bind), SolutionKind::Solved);
        assert_eq!(cs.resolved_overloads().len(), 1);
        assert_eq!(cs.constraints().active_len(), 0);
        assert_snapshot!(cs.simplify_type(t0).display(&db), @"Int -> Int");
    }

    #[test]
    fn tuple_member_by_label_and_index() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let tuple = Type::tuple(
            &db,
            vec![TupleElt::named(Symbol::new("x"), int), TupleElt::new(string)],
        );
        let base = Type::lvalue(&db, tuple, LValueQuals::IMPLICIT);

        let by_label = cs.new_type_var(TypeVarOptions::NONE.lvalue_allowed(), None);
        cs.add_constraint(Constraint::value_member(base, Symbol::new("x"), by_label, None));
        assert_snapshot!(cs.simplify_type(by_label).display(&db), @"@lvalue(implicit) Int");

        let by_index = cs.new_type_var(TypeVarOptions::NONE, None);
        cs.add_constraint(Constraint::value_member(tuple, Symbol::new("1"), by_index, None));
        assert_snapshot!(cs.simplify_type(by_index).display(&db), @"String");

        let missing = cs.new_type_var(TypeVarOptions::NONE, None);
        let result = cs.add_constraint(Constraint::value_member(tuple, Symbol::new("y"), missing, None));
        assert_eq!(result, SolutionKind::Error);
        let failure = cs.first_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::DoesNotHaveMember);
        assert_eq!(failure.name, Some(Symbol::new("y")));
    }

    #[test]
    fn member_on_unresolved_base_waits() {
        let db = test_db();
        let decls = DeclTable::new(&db);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let base = cs.new_type_var(TypeVarOptions::NONE, None);
        let member = cs.new_type_var(TypeVarOptions::NONE, None);
        let result = cs.add_constraint(Constraint::value_member(base, Symbol::new("count"), member, None));
        assert_eq!(result, SolutionKind::Unsolved);
        assert_eq!(cs.constraints().active_len(), 1);
    }

    #[test]
    fn static_members_need_a_metatype_base() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let point = decls.add_nominal("Point", NominalKind::Struct);
        let point_ty = Type::nominal(&db, point);
        let origin = decls.add_var("origin", DeclContext::Nominal(point), point_ty);
        decls.value_mut(origin).is_static = true;
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let on_instance = cs.new_type_var(TypeVarOptions::NONE, None);
        let result =
            cs.add_constraint(Constraint::value_member(point_ty, Symbol::new("origin"), on_instance, None));
        assert_eq!(result, SolutionKind::Error);

        let on_type = cs.new_type_var(TypeVarOptions::NONE.lvalue_allowed(), None);
        let result = cs.add_constraint(Constraint::value_member(
            Type::metatype(&db, point_ty),
            Symbol::new("origin"),
            on_type,
            None,
        ));
        assert_eq!(result, SolutionKind::Solved);
        assert_eq!(cs.resolved_overloads().len(), 1);
    }

    #[test]
    fn construction_goes_through_initializers() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let point = decls.add_nominal("Point", NominalKind::Struct);
        let point_ty = Type::nominal(&db, point);
        decls.add_value(
            "init",
            ValueDeclKind::Constructor,
            DeclContext::Nominal(point),
            Type::function(&db, Type::tuple_of(&db, [int, int]), point_ty),
        );
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let argument = Type::tuple_of(&db, [int, int]);
        let result = cs.add_constraint(Constraint::construction(argument, point_ty, None));
        assert_eq!(result, SolutionKind::Solved);
        assert!(cs.failed_constraint().is_none());
        assert_eq!(cs.resolved_overloads().len(), 1);

        let result = cs.add_constraint(Constraint::construction(argument, Type::empty_tuple(&db), None));
        assert_eq!(result, SolutionKind::Error);
        assert_eq!(
            cs.first_failure().map(|f| f.kind),
            Some(FailureKind::TupleSizeMismatch)
        );
    }

    #[test]
    fn functions_are_not_constructible() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let func = Type::function(&db, int, int);
        let result = cs.add_constraint(Constraint::construction(int, func, None));
        assert_eq!(result, SolutionKind::Error);
        assert_eq!(
            cs.first_failure().map(|f| f.kind.category()),
            Some(FailureCategory::ConstructionFailure)
        );
    }

    #[test]
    fn applicable_function_converts_argument_and_binds_result() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let anchor = cs.locators_mut().anchor(Anchor::expr(0));
        let apply = cs.extend_locator(Some(anchor), PathElement::ApplyFunction);
        let result_var = cs.new_type_var(TypeVarOptions::NONE, None);
        let applied = Type::function(
            &db,
            Type::lvalue(&db, int, LValueQuals::IMPLICIT),
            result_var,
        );
        let callee = Type::function(&db, int, Type::optional(&db, int));
        let result = cs.add_constraint(Constraint::applicable_function(applied, callee, apply));
        assert_eq!(result, SolutionKind::Solved);
        assert_snapshot!(cs.simplify_type(result_var).display(&db), @"Int?");

        let not_callable = cs.add_constraint(Constraint::applicable_function(applied, int, apply));
        assert_eq!(not_callable, SolutionKind::Error);
        assert_eq!(
            cs.first_failure().map(|f| f.kind),
            Some(FailureKind::FunctionTypesMismatch)
        );
    }

    #[test]
    fn conformance_waits_then_checks() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let equatable = decls.add_protocol("Equatable");
        let int = decls.add_nominal("Int", NominalKind::Struct);
        decls.add_conformance(int, Conformance::new(equatable));
        let int_ty = Type::nominal(&db, int);
        let string = Type::nominal(&db, decls.add_nominal("String", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        assert_eq!(
            cs.add_constraint(Constraint::conforms_to(t0, equatable, None)),
            SolutionKind::Unsolved
        );
        assert_eq!(
            cs.simplify_conformance(int_ty, equatable, ConformanceKind::ConformsTo, None),
            SolutionKind::Solved
        );
        assert_eq!(
            cs.simplify_conformance(string, equatable, ConformanceKind::ConformsTo, None),
            SolutionKind::Error
        );
        let failure = cs.first_failure().unwrap();
        assert_snapshot!(failure.display(&db, None), @"type does not conform to protocol: String, Equatable");

        let existential = Type::protocol(&db, equatable);
        assert_eq!(
            cs.simplify_conformance(existential, equatable, ConformanceKind::SelfObjectOf, None),
            SolutionKind::Solved
        );
    }

    #[test]
    fn checked_casts() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let base = decls.add_nominal("Base", NominalKind::Class);
        let derived = decls.add_nominal("Derived", NominalKind::Class);
        let base_ty = Type::nominal(&db, base);
        let derived_ty = Type::nominal(&db, derived);
        decls.set_superclass(derived, base_ty);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        assert_eq!(
            cs.add_constraint(Constraint::checked_cast(base_ty, derived_ty, None)),
            SolutionKind::Solved
        );
        assert!(cs.failed_constraint().is_none());

        assert_eq!(
            cs.add_constraint(Constraint::checked_cast(int, derived_ty, None)),
            SolutionKind::Error
        );
        assert_eq!(
            cs.first_failure().map(|f| f.kind),
            Some(FailureKind::CastUnresolved)
        );
    }

    #[test]
    fn type_properties() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let object = decls.add_nominal("Object", NominalKind::Class);
        let object_ty = Type::nominal(&db, object);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let any_object = decls.add_protocol("AnyObject");
        decls.set_dynamic_lookup(any_object);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let class = |ty| Constraint::type_property(TypeProperty::Class, ty, None);
        assert_eq!(cs.simplify_constraint(&class(object_ty)), SolutionKind::Solved);
        assert_eq!(cs.simplify_constraint(&class(int)), SolutionKind::Error);

        let dynamic = Constraint::type_property(
            TypeProperty::DynamicLookupValue,
            Type::lvalue(&db, Type::protocol(&db, any_object), LValueQuals::IMPLICIT),
            None,
        );
        assert_eq!(cs.simplify_constraint(&dynamic), SolutionKind::Solved);

        let archetype = Constraint::type_property(TypeProperty::Archetype, int, None);
        assert_eq!(cs.simplify_constraint(&archetype), SolutionKind::Error);
        assert_eq!(
            cs.failures().map(|f| f.kind).collect::<Vec<_>>(),
            vec![FailureKind::IsNotClass, FailureKind::IsNotArchetype]
        );
    }
}
