//! Declaration references and overload resolution.

use tessera_types::{
    ConformanceAnswer, DeclContext, LValueQuals, Type, TypeKind, ValueDecl, ValueDeclId,
    ValueDeclKind,
};
use tracing::debug;

use crate::choice::OverloadChoice;
use crate::constraint::{Constraint, MatchKind, TypeProperty};
use crate::generics::{DependentTypeOpener, FreeOpener, OpenedGenerics};
use crate::locator::LocatorId;
use crate::matching::tuple_element_type;
use crate::system::{ConstraintSystem, ResolvedOverload};

/// The opened type of a declaration reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeclReference<'db> {
    /// The full type, including the curried `self` of a member.
    pub opened_full_type: Type<'db>,
    /// The type the reference expression has.
    pub reference_type: Type<'db>,
}

impl<'db> DeclReference<'db> {
    fn same(ty: Type<'db>) -> Self {
        Self {
            opened_full_type: ty,
            reference_type: ty,
        }
    }
}

/// Make the reference an implicit lvalue where it already is one, and make
/// the first parameter of an assignment operator one.
pub fn adjust_lvalue_for_reference<'db>(
    db: &'db dyn salsa::Database,
    ty: Type<'db>,
    is_assignment: bool,
) -> Type<'db> {
    if let TypeKind::LValue { object, quals } = ty.desugar(db).kind(db) {
        return Type::lvalue(db, *object, quals.with_implicit());
    }
    if !is_assignment {
        return ty;
    }
    let Some(func) = ty.as_function(db) else {
        return ty;
    };
    let input = match func.input.tuple_elements(db) {
        Some([]) => func.input,
        Some([first, rest @ ..]) => {
            let mut elts = Vec::with_capacity(rest.len() + 1);
            elts.push(first.with_type(adjust_lvalue_for_reference(db, first.ty, false)));
            elts.extend(rest.iter().cloned());
            Type::tuple(db, elts)
        }
        None => adjust_lvalue_for_reference(db, func.input, false),
    };
    Type::function_ext(db, input, func.result, func.ext)
}

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    /// The type of an unqualified reference to `decl`.
    pub fn type_of_reference(
        &mut self,
        decl: ValueDeclId,
        is_type_reference: bool,
        opener: &mut dyn DependentTypeOpener<'db>,
    ) -> DeclReference<'db> {
        let db = self.db();
        let value = self.ctx().decls.value_decl(decl);

        // Unqualified lookup finds operators declared inside types.
        if value.context.is_type_context() && value.kind == ValueDeclKind::Func {
            let mut replacements = OpenedGenerics::new();
            let self_ty = self
                .open_context_self(value.context, false, &mut replacements, opener)
                .unwrap_or_else(|| Type::error(db));
            let opened =
                self.open_type(value.interface_type, value.context, false, &mut replacements, opener);
            // `Self` must be bound to an archetype.
            self.add_constraint(Constraint::type_property(TypeProperty::Archetype, self_ty, None));
            return DeclReference {
                opened_full_type: Type::function(db, Type::metatype(db, self_ty), opened),
                reference_type: opened,
            };
        }

        if value.kind.is_type_decl() {
            let ty = self.open_interface_type(value.interface_type, value.context, false, opener);
            if is_type_reference {
                return DeclReference::same(ty);
            }
            return DeclReference::same(Type::metatype(db, ty));
        }

        let opened = self.open_interface_type(value.interface_type, value.context, false, opener);
        let ty = match value.kind {
            ValueDeclKind::Var => Type::lvalue(db, opened, settable_quals(value.settable)),
            _ => opened,
        };
        DeclReference::same(adjust_lvalue_for_reference(db, ty, value.attrs.assignment))
    }

    /// The type of a reference to `decl` as a member of `base`.
    pub fn type_of_member_reference(
        &mut self,
        base: Type<'db>,
        decl: ValueDeclId,
        is_type_reference: bool,
        is_dynamic: bool,
        opener: &mut dyn DependentTypeOpener<'db>,
    ) -> DeclReference<'db> {
        let db = self.db();
        let (base_obj, _) = self.fixed_type_recursive(base, true);
        let (base_obj, is_instance) = match base_obj.metatype_instance(db) {
            Some(instance) => (instance, false),
            None => (base_obj, true),
        };

        if matches!(base_obj.desugar(db).kind(db), TypeKind::Module(_)) {
            return self.type_of_reference(decl, is_type_reference, opener);
        }

        let value = self.ctx().decls.value_decl(decl);
        if let ValueDeclKind::AssociatedType(assoc) = value.kind {
            let member = self.associated_type_of(base_obj, assoc);
            let member = if is_type_reference {
                member
            } else {
                Type::metatype(db, member)
            };
            return DeclReference {
                opened_full_type: Type::function(db, base_obj, member),
                reference_type: member,
            };
        }

        let mut replacements = OpenedGenerics::new();
        let self_ty = self
            .open_context_self(value.context, true, &mut replacements, opener)
            .unwrap_or(base_obj);
        let mut opened =
            self.open_type(value.interface_type, value.context, true, &mut replacements, opener);
        if value.kind.is_type_decl() && !is_type_reference {
            opened = Type::metatype(db, opened);
        }
        if value.kind == ValueDeclKind::Var {
            let settable = self.is_settable_on_base(base, base_obj, is_instance, value);
            opened = Type::lvalue(db, opened, settable_quals(settable));
        }
        let self_param = if value.is_instance_member() {
            self_ty
        } else {
            Type::metatype(db, self_ty)
        };
        let opened_full = Type::function(db, self_param, opened);

        // Protocol members were found through a conforming base; the base
        // stands in for `Self` directly.
        if matches!(value.context, DeclContext::Protocol(_)) {
            self.add_constraint(Constraint::relational(MatchKind::SameType, base_obj, self_ty, None));
        } else if !is_dynamic {
            self.add_self_constraint(base_obj, self_ty);
        }

        let reference = match value.kind {
            ValueDeclKind::Subscript => match opened.as_function(db) {
                Some(func) => {
                    let element = if is_dynamic || value.attrs.optional {
                        Type::optional(db, func.result)
                    } else {
                        let settable = self.is_settable_on_base(base, base_obj, is_instance, value);
                        Type::lvalue(db, func.result, settable_quals(settable))
                    };
                    Type::function_ext(db, func.input, element, func.ext)
                }
                None => opened,
            },
            ValueDeclKind::Constructor | ValueDeclKind::EnumElement => opened,
            kind if value.is_static || kind.is_type_decl() || is_instance => opened,
            ValueDeclKind::Func if is_dynamic => {
                // An instance method reached through a metatype takes the
                // dynamic-lookup existential as its receiver.
                match self.ctx().decls.dynamic_lookup_protocol() {
                    Some(proto) => Type::function(db, Type::protocol(db, proto), opened),
                    None => opened_full,
                }
            }
            _ => opened_full,
        };
        DeclReference {
            opened_full_type: opened_full,
            reference_type: reference,
        }
    }

    /// Open the generic parameters of a type context and return its `Self`
    /// type. `None` outside type contexts.
    pub(crate) fn open_context_self(
        &mut self,
        context: DeclContext,
        skip_protocol_self: bool,
        replacements: &mut OpenedGenerics<'db>,
        opener: &mut dyn DependentTypeOpener<'db>,
    ) -> Option<Type<'db>> {
        let db = self.db();
        match context {
            DeclContext::Module(_) => None,
            DeclContext::Protocol(proto) => {
                let decl = self.ctx().decls.protocol_decl(proto);
                let signature = decl.generic_signature(db);
                self.open_generic(
                    context,
                    &signature.params,
                    &signature.requirements,
                    skip_protocol_self,
                    replacements,
                    opener,
                );
                replacements
                    .param(decl.self_param.param)
                    .map(|var| Type::type_var(db, var))
            }
            DeclContext::Nominal(nominal) => {
                let decl = self.ctx().decls.nominal_decl(nominal);
                let Some(generics) = &decl.generics else {
                    return Some(Type::nominal(db, nominal));
                };
                self.open_generic(
                    context,
                    &generics.params,
                    &generics.requirements,
                    skip_protocol_self,
                    replacements,
                    opener,
                );
                let declared = decl.declared_interface_type(db);
                Some(self.open_type(declared, context, skip_protocol_self, replacements, opener))
            }
        }
    }

    /// Relate the object a member is accessed on to the `Self` of the
    /// member's context.
    fn add_self_constraint(&mut self, object: Type<'db>, self_ty: Type<'db>) {
        let db = self.db();
        let constraint = if let TypeKind::Protocol(proto) = self_ty.desugar(db).kind(db) {
            Constraint::self_object_of(object, *proto, None)
        } else if self.class_decl(self_ty).is_some() {
            Constraint::relational(MatchKind::Subtype, object, self_ty, None)
        } else {
            Constraint::relational(MatchKind::SameType, object, self_ty, None)
        };
        self.add_constraint(constraint);
    }

    /// A member is settable when the declaration has a setter and the base
    /// is mutable: an lvalue, a reference type, or a metatype.
    fn is_settable_on_base(
        &self,
        base: Type<'db>,
        base_obj: Type<'db>,
        is_instance: bool,
        value: &ValueDecl<'db>,
    ) -> bool {
        let db = self.db();
        let (base, _) = self.fixed_type_recursive(base, false);
        value.settable
            && (base.is_lvalue(db)
                || !is_instance
                || self.may_have_superclass(base_obj)
                || self.is_class_existential(base_obj))
    }

    /// The type an associated type takes on `base`.
    fn associated_type_of(
        &mut self,
        base: Type<'db>,
        assoc: tessera_types::AssocTypeId,
    ) -> Type<'db> {
        let db = self.db();
        let decls = self.ctx().decls;
        if let TypeKind::Archetype(archetype) = base.desugar(db).kind(db)
            && let Some(nested) = decls.archetype_decl(*archetype).nested_archetype(assoc)
        {
            return Type::archetype(db, nested);
        }

        let protocol = decls.assoc_type_decl(assoc).protocol;
        if !base.is_existential(db)
            && !base.has_type_variable(db)
            && base.nominal_decl(db).is_some()
            && let ConformanceAnswer::Concrete(conformance) =
                self.ctx().conformance.conforms_to(db, base, protocol)
            && let Some(witness) = conformance.type_witness(assoc)
        {
            return witness;
        }

        // Without a witness, the member of the protocol's own `Self`.
        let self_archetype = decls.protocol_decl(protocol).self_param.archetype;
        decls
            .archetype_decl(self_archetype)
            .nested_archetype(assoc)
            .map(|nested| Type::archetype(db, nested))
            .unwrap_or_else(|| Type::error(db))
    }

    /// Bind `bound` to the type of referencing `choice`.
    pub fn resolve_overload(
        &mut self,
        locator: Option<LocatorId>,
        bound: Type<'db>,
        choice: OverloadChoice<'db>,
    ) {
        let db = self.db();
        let (reference_type, opened_full_type) = match choice {
            OverloadChoice::Decl { base, decl }
            | OverloadChoice::TypeDecl { base, decl } => {
                let is_type_reference = matches!(choice, OverloadChoice::TypeDecl { .. });
                self.decl_reference_type(base, decl, is_type_reference, false)
            }
            OverloadChoice::DeclViaDynamic { base, decl } => {
                self.decl_reference_type(Some(base), decl, false, true)
            }
            OverloadChoice::BaseType { base } => (base, None),
            OverloadChoice::TupleIndex { base, index } => {
                (self.tuple_index_type(base, index as usize), None)
            }
        };

        debug!(
            choice = %choice.display(db),
            ty = %reference_type.display(db),
            "resolve overload"
        );
        self.record_resolved_overload(ResolvedOverload {
            locator,
            bound,
            choice,
            opened_full_type,
            implied: reference_type,
        });
        self.add_constraint(Constraint::relational(
            MatchKind::Bind,
            bound,
            reference_type,
            locator,
        ));
    }

    fn decl_reference_type(
        &mut self,
        base: Option<Type<'db>>,
        decl: ValueDeclId,
        is_type_reference: bool,
        is_dynamic: bool,
    ) -> (Type<'db>, Option<Type<'db>>) {
        let db = self.db();
        let reference = match base {
            Some(base) => self.type_of_member_reference(
                base,
                decl,
                is_type_reference,
                is_dynamic,
                &mut FreeOpener,
            ),
            None => self.type_of_reference(decl, is_type_reference, &mut FreeOpener),
        };
        let value = self.ctx().decls.value_decl(decl);
        // Dynamic lookup and optional requirements may come up empty.
        let ty = if is_dynamic
            || (value.attrs.optional && value.kind != ValueDeclKind::Subscript)
        {
            Type::optional(db, reference.reference_type.rvalue(db))
        } else {
            adjust_lvalue_for_reference(db, reference.reference_type, value.attrs.assignment)
        };
        (ty, Some(reference.opened_full_type))
    }

    /// Accessing element `index` of a tuple is an lvalue exactly when the
    /// tuple is.
    fn tuple_index_type(&self, base: Type<'db>, index: usize) -> Type<'db> {
        let db = self.db();
        let element = |tuple: Type<'db>| {
            tuple
                .tuple_elements(db)
                .and_then(|elts| elts.get(index))
                .map(|elt| tuple_element_type(db, elt).rvalue(db))
        };
        let result = match base.desugar(db).kind(db) {
            TypeKind::LValue { object, quals } => {
                element(*object).map(|elt| Type::lvalue(db, elt, *quals))
            }
            _ => element(base),
        };
        result.unwrap_or_else(|| Type::error(db))
    }

    /// Add a disjunction binding `bound` to each of `choices`; a single
    /// choice is bound directly.
    pub fn add_overload_set(
        &mut self,
        bound: Type<'db>,
        choices: Vec<OverloadChoice<'db>>,
        locator: Option<LocatorId>,
    ) {
        if let [choice] = choices.as_slice() {
            self.resolve_overload(locator, bound, *choice);
            return;
        }
        let alternatives = choices
            .into_iter()
            .map(|choice| Constraint::bind_overload(bound, choice, locator))
            .collect();
        self.add_constraint(Constraint::disjunction(alternatives, locator));
    }
}

fn settable_quals(settable: bool) -> LValueQuals {
    if settable {
        LValueQuals::IMPLICIT
    } else {
        LValueQuals::IMPLICIT.non_settable()
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use tessera_types::{DeclAttrs, DeclTable, NominalKind, Symbol, TupleElt};

    use super::*;
    use crate::config::SolverConfig;
    use crate::system::SolverContext;
    use crate::typevar::TypeVarOptions;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn assignment_operator_takes_implicit_lvalue() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let inout = Type::lvalue(&db, int, LValueQuals::EXPLICIT);
        let func = Type::function(&db, Type::tuple_of(&db, [inout, int]), Type::empty_tuple(&db));
        let adjusted = adjust_lvalue_for_reference(&db, func, true);
        assert_snapshot!(adjusted.display(&db), @"(@lvalue(implicit) Int, Int) -> ()");
        assert_eq!(adjust_lvalue_for_reference(&db, func, false), func);
    }

    #[test]
    fn instance_method_reference_curries_self() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = decls.add_nominal("Int", NominalKind::Struct);
        let int_ty = Type::nominal(&db, int);
        let method = decls.add_func(
            "successor",
            DeclContext::Nominal(int),
            Type::function(&db, Type::empty_tuple(&db), int_ty),
        );
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let on_instance = cs.type_of_member_reference(int_ty, method, false, false, &mut FreeOpener);
        assert_snapshot!(on_instance.reference_type.display(&db), @"() -> Int");
        assert_snapshot!(on_instance.opened_full_type.display(&db), @"Int -> () -> Int");

        let on_type = cs.type_of_member_reference(
            Type::metatype(&db, int_ty),
            method,
            false,
            false,
            &mut FreeOpener,
        );
        assert_snapshot!(on_type.reference_type.display(&db), @"Int -> () -> Int");
    }

    #[test]
    fn stored_property_settability_follows_base() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let point = decls.add_nominal("Point", NominalKind::Struct);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let point_ty = Type::nominal(&db, point);
        let x = decls.add_var("x", DeclContext::Nominal(point), int);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let rvalue_base = cs.type_of_member_reference(point_ty, x, false, false, &mut FreeOpener);
        assert_snapshot!(rvalue_base.reference_type.display(&db), @"@lvalue(implicit, nonsettable) Int");
        let lvalue_base = cs.type_of_member_reference(
            Type::lvalue(&db, point_ty, LValueQuals::IMPLICIT),
            x,
            false,
            false,
            &mut FreeOpener,
        );
        assert_snapshot!(lvalue_base.reference_type.display(&db), @"@lvalue(implicit) Int");
    }

    #[test]
    fn generic_member_binds_base_arguments() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let array = decls.add_nominal("Array", NominalKind::Struct);
        let params = decls.set_generic_params(array, &[("T", vec![])]);
        let element = Type::generic_param(&db, params[0].param);
        let first = decls.add_var("first", DeclContext::Nominal(array), element);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let base = Type::bound_generic(&db, array, None, vec![int]);
        let reference = cs.type_of_member_reference(base, first, false, false, &mut FreeOpener);
        assert_snapshot!(
            cs.simplify_type(reference.reference_type).display(&db),
            @"@lvalue(implicit, nonsettable) Int"
        );
    }

    #[test]
    fn optional_requirement_reference_is_optional() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let delegate = decls.add_protocol("Delegate");
        let count = decls.add_func(
            "count",
            DeclContext::Protocol(delegate),
            Type::function(&db, Type::empty_tuple(&db), int),
        );
        decls.value_mut(count).attrs = DeclAttrs {
            optional: true,
            ..DeclAttrs::default()
        };
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let bound = cs.new_type_var(TypeVarOptions::NONE.lvalue_allowed(), None);
        cs.resolve_overload(
            None,
            bound,
            OverloadChoice::Decl {
                base: Some(Type::protocol(&db, delegate)),
                decl: count,
            },
        );
        assert_snapshot!(cs.simplify_type(bound).display(&db), @"(() -> Int)?");
        assert_eq!(cs.resolved_overloads().len(), 1);
    }

    #[test]
    fn tuple_index_keeps_lvalue_qualifiers() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let tuple = Type::tuple(
            &db,
            vec![
                TupleElt::named(Symbol::new("a"), int),
                TupleElt::new(int).variadic(),
            ],
        );
        let cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let quals = LValueQuals::IMPLICIT.non_settable();
        assert_snapshot!(
            cs.tuple_index_type(Type::lvalue(&db, tuple, quals), 0).display(&db),
            @"@lvalue(implicit, nonsettable) Int"
        );
        assert_snapshot!(cs.tuple_index_type(tuple, 1).display(&db), @"Int[]");
    }
}
