//! Opening generic types.
//!
//! Interface types mention generic parameters, dependent members and
//! generic function signatures. Opening replaces each generic parameter with
//! a fresh type variable, each dependent member with a variable constrained
//! as a type member of its (opened) base, and turns the requirements into
//! constraints over those variables.

use std::collections::HashMap;

use tessera_types::{
    ArchetypeId, AssocTypeId, DeclContext, GenericParamDecl, GenericParamTy, Requirement, Type,
    TypeKind, TypeVarId,
};
use tracing::trace;

use crate::constraint::{Constraint, MatchKind};
use crate::locator::PathElement;
use crate::system::ConstraintSystem;
use crate::typevar::TypeVarOptions;

/// What to do with the variable opened for an associated type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssociatedTypeBinding<'db> {
    /// Constrain the variable as a type member of its base.
    pub bind_member: bool,
    /// Bind the variable to this type.
    pub replacement: Option<Type<'db>>,
}

impl Default for AssociatedTypeBinding<'_> {
    fn default() -> Self {
        Self {
            bind_member: true,
            replacement: None,
        }
    }
}

/// Hooks into opening, used to tie opened variables to known types instead
/// of leaving them free.
pub trait DependentTypeOpener<'db> {
    /// `param` was opened to `var`. A returned type is bound to `var`.
    fn opened_generic_parameter(
        &mut self,
        param: &GenericParamDecl,
        var: TypeVarId,
    ) -> Option<Type<'db>> {
        let _ = (param, var);
        None
    }

    /// The associated type `assoc` of `base` was opened to `member`.
    fn should_bind_associated_type(
        &mut self,
        base: Type<'db>,
        base_var: TypeVarId,
        assoc: AssocTypeId,
        member: TypeVarId,
    ) -> AssociatedTypeBinding<'db> {
        let _ = (base, base_var, assoc, member);
        AssociatedTypeBinding::default()
    }
}

/// Opens every parameter to a free variable.
#[derive(Clone, Copy, Debug, Default)]
pub struct FreeOpener;

impl<'db> DependentTypeOpener<'db> for FreeOpener {}

/// The variables introduced while opening one declaration reference.
#[derive(Clone, Debug, Default)]
pub struct OpenedGenerics<'db> {
    params: HashMap<(u32, u32), TypeVarId>,
    archetypes: HashMap<ArchetypeId, TypeVarId>,
    var_archetypes: HashMap<TypeVarId, ArchetypeId>,
    members: HashMap<(Type<'db>, AssocTypeId), TypeVarId>,
}

impl<'db> OpenedGenerics<'db> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The variable a generic parameter was opened to.
    pub fn param(&self, param: GenericParamTy) -> Option<TypeVarId> {
        self.params.get(&param.key()).copied()
    }

    /// The variable standing for an archetype's parameter.
    pub fn archetype(&self, archetype: ArchetypeId) -> Option<TypeVarId> {
        self.archetypes.get(&archetype).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

fn is_protocol_self(db: &dyn salsa::Database, ty: Type<'_>) -> bool {
    matches!(ty.kind(db), TypeKind::GenericParam(param) if param.key() == (0, 0))
}

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    /// Open `ty` with fresh replacements.
    pub fn open_interface_type(
        &mut self,
        ty: Type<'db>,
        context: DeclContext,
        skip_protocol_self: bool,
        opener: &mut dyn DependentTypeOpener<'db>,
    ) -> Type<'db> {
        let mut replacements = OpenedGenerics::new();
        self.open_type(ty, context, skip_protocol_self, &mut replacements, opener)
    }

    /// Replace generic parameters, archetypes and dependent members in `ty`
    /// using (and extending) `replacements`.
    ///
    /// Generic function signatures and unbound generic types met along the
    /// way are opened in place.
    pub fn open_type(
        &mut self,
        ty: Type<'db>,
        context: DeclContext,
        skip_protocol_self: bool,
        replacements: &mut OpenedGenerics<'db>,
        opener: &mut dyn DependentTypeOpener<'db>,
    ) -> Type<'db> {
        let db = self.db();
        ty.transform(db, &mut |node| {
            self.open_node(node, context, skip_protocol_self, replacements, &mut *opener)
        })
    }

    fn open_node(
        &mut self,
        node: Type<'db>,
        context: DeclContext,
        skip_protocol_self: bool,
        replacements: &mut OpenedGenerics<'db>,
        opener: &mut dyn DependentTypeOpener<'db>,
    ) -> Option<Type<'db>> {
        let db = self.db();
        match node.kind(db) {
            TypeKind::GenericParam(param) => replacements
                .param(*param)
                .map(|var| Type::type_var(db, var)),
            TypeKind::Archetype(archetype) => replacements
                .archetype(*archetype)
                .map(|var| Type::type_var(db, var)),
            TypeKind::DependentMember { base, assoc } => {
                let base = self.open_type(*base, context, skip_protocol_self, replacements, opener);
                let var = self.open_associated_type(base, *assoc, replacements, opener);
                Some(Type::type_var(db, var))
            }
            TypeKind::GenericFunction {
                signature,
                function,
            } => {
                self.open_generic(
                    context,
                    &signature.params,
                    &signature.requirements,
                    skip_protocol_self,
                    replacements,
                    opener,
                );
                let input =
                    self.open_type(function.input, context, skip_protocol_self, replacements, opener);
                let result =
                    self.open_type(function.result, context, skip_protocol_self, replacements, opener);
                Some(Type::function_ext(db, input, result, function.ext))
            }
            TypeKind::UnboundGeneric { decl, parent } => {
                let parent = parent
                    .map(|parent| self.open_type(parent, context, skip_protocol_self, replacements, opener));
                let nominal = self.ctx().decls.nominal_decl(*decl);
                let Some(generics) = &nominal.generics else {
                    return Some(Type::nominal(db, *decl));
                };
                self.open_generic(
                    DeclContext::Nominal(*decl),
                    &generics.params,
                    &generics.requirements,
                    false,
                    replacements,
                    opener,
                );
                let args = generics
                    .params
                    .iter()
                    .filter_map(|gp| replacements.param(gp.param))
                    .map(|var| Type::type_var(db, var))
                    .collect();
                Some(Type::bound_generic(db, *decl, parent, args))
            }
            _ => None,
        }
    }

    /// Open `params` to fresh variables and add `requirements` as
    /// constraints over them.
    ///
    /// With `skip_protocol_self`, the conformance of a protocol's `Self` to
    /// that protocol is assumed rather than checked.
    pub fn open_generic(
        &mut self,
        context: DeclContext,
        params: &[GenericParamDecl],
        requirements: &[Requirement<'db>],
        skip_protocol_self: bool,
        replacements: &mut OpenedGenerics<'db>,
        opener: &mut dyn DependentTypeOpener<'db>,
    ) {
        let db = self.db();
        for gp in params {
            let locator = self
                .locators
                .intern(None, [PathElement::Archetype(gp.archetype)]);
            let var = self.create_type_var(TypeVarOptions::NONE.prefers_subtype(), Some(locator));
            trace!(param = %gp.param.name, var = %var, "open generic parameter");
            replacements.params.insert(gp.param.key(), var);
            replacements.archetypes.insert(gp.archetype, var);
            replacements.var_archetypes.insert(var, gp.archetype);

            if let Some(replacement) = opener.opened_generic_parameter(gp, var) {
                self.add_constraint(Constraint::relational(
                    MatchKind::Bind,
                    Type::type_var(db, var),
                    replacement,
                    None,
                ));
            }
        }

        let in_protocol = matches!(context, DeclContext::Protocol(_));
        for requirement in requirements {
            match requirement {
                Requirement::Conformance { subject, protocol } => {
                    if skip_protocol_self && in_protocol && is_protocol_self(db, *subject) {
                        continue;
                    }
                    let subject =
                        self.open_type(*subject, context, skip_protocol_self, replacements, opener);
                    self.add_constraint(Constraint::conforms_to(subject, *protocol, None));
                }
                Requirement::Superclass {
                    subject,
                    superclass,
                } => {
                    let subject =
                        self.open_type(*subject, context, skip_protocol_self, replacements, opener);
                    let superclass =
                        self.open_type(*superclass, context, skip_protocol_self, replacements, opener);
                    self.add_constraint(Constraint::relational(
                        MatchKind::Subtype,
                        subject,
                        superclass,
                        None,
                    ));
                }
                Requirement::SameType { first, second } => {
                    let first = self.open_type(*first, context, skip_protocol_self, replacements, opener);
                    let second =
                        self.open_type(*second, context, skip_protocol_self, replacements, opener);
                    self.add_constraint(Constraint::relational(MatchKind::Bind, first, second, None));
                }
            }
        }
    }

    /// The variable standing for `base.assoc`, created on first use.
    fn open_associated_type(
        &mut self,
        base: Type<'db>,
        assoc: AssocTypeId,
        replacements: &mut OpenedGenerics<'db>,
        opener: &mut dyn DependentTypeOpener<'db>,
    ) -> TypeVarId {
        let db = self.db();
        if let Some(known) = replacements.members.get(&(base, assoc)) {
            return *known;
        }

        let base_var = base.as_type_var(db);
        let nested = base_var
            .and_then(|var| replacements.var_archetypes.get(&var))
            .and_then(|archetype| {
                self.ctx()
                    .decls
                    .archetype_decl(*archetype)
                    .nested_archetype(assoc)
            });
        let locator =
            nested.map(|nested| self.locators.intern(None, [PathElement::Archetype(nested)]));
        let var = self.create_type_var(TypeVarOptions::NONE.prefers_subtype(), locator);
        let member = Type::type_var(db, var);
        replacements.members.insert((base, assoc), var);
        if let Some(nested) = nested {
            replacements.var_archetypes.insert(var, nested);
        }

        let binding = match base_var {
            Some(base_var) => opener.should_bind_associated_type(base, base_var, assoc, var),
            None => AssociatedTypeBinding::default(),
        };
        if binding.bind_member {
            self.add_constraint(Constraint::type_member(base, assoc.name(), member, None));
        }
        if let Some(replacement) = binding.replacement {
            self.add_constraint(Constraint::relational(MatchKind::Bind, member, replacement, None));
        }

        let decl = self.ctx().decls.assoc_type_decl(assoc);
        if let Some(superclass) = decl.superclass {
            self.add_constraint(Constraint::relational(MatchKind::Subtype, member, superclass, None));
        }
        for proto in &decl.conforms_to {
            self.add_constraint(Constraint::conforms_to(member, *proto, None));
        }
        var
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use tessera_types::{BuiltinKind, DeclTable, GenericSignature, NominalKind};

    use super::*;
    use crate::config::SolverConfig;
    use crate::system::SolverContext;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn generic_function_opens_to_fresh_variables() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let equatable = decls.add_protocol("Equatable");
        let t = decls.add_generic_param(0, 0, "T", vec![equatable]);
        let requirements = decls.conformance_requirements(&[t]);
        let param = Type::generic_param(&db, t.param);
        let pair = Type::tuple_of(&db, [param, param]);
        let generic = Type::generic_function(
            &db,
            GenericSignature::new(vec![t], requirements),
            pair,
            param,
        );
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let opened = cs.open_interface_type(generic, decls.top_level(), false, &mut FreeOpener);
        assert_snapshot!(opened.display(&db), @"($T0, $T0) -> $T0");
        assert!(cs.type_vars().options(TypeVarId(0)).prefers_subtype_binding);
        let active: Vec<_> = cs
            .constraints()
            .active()
            .map(|(_, c)| c.display(&db).to_string())
            .collect();
        assert_eq!(active, vec!["$T0 conforms to Equatable".to_string()]);
    }

    #[test]
    fn unbound_generic_opens_to_bound_generic() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let array = decls.add_nominal("Array", NominalKind::Struct);
        decls.set_generic_params(array, &[("T", vec![])]);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let opened = cs.open_interface_type(
            Type::unbound_generic(&db, array),
            decls.top_level(),
            false,
            &mut FreeOpener,
        );
        assert_snapshot!(opened.display(&db), @"Array<$T0>");
    }

    #[test]
    fn dependent_members_share_one_variable() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let sequence = decls.add_protocol("Sequence");
        let element = decls.add_assoc_type(sequence, "Element", vec![]);
        let s = decls.add_generic_param(0, 0, "S", vec![sequence]);
        let param = Type::generic_param(&db, s.param);
        let member = Type::dependent_member(&db, param, element);
        let generic = Type::generic_function(
            &db,
            GenericSignature::new(vec![s], vec![]),
            Type::tuple_of(&db, [param, member]),
            member,
        );
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let opened = cs.open_interface_type(generic, decls.top_level(), false, &mut FreeOpener);
        assert_snapshot!(opened.display(&db), @"($T0, $T1) -> $T1");
        let active: Vec<_> = cs
            .constraints()
            .active()
            .map(|(_, c)| c.display(&db).to_string())
            .collect();
        assert_eq!(active, vec!["$T0[.Element: type] == $T1".to_string()]);
    }

    struct BindFirstParam<'db> {
        ty: Type<'db>,
    }

    impl<'db> DependentTypeOpener<'db> for BindFirstParam<'db> {
        fn opened_generic_parameter(
            &mut self,
            param: &GenericParamDecl,
            _var: TypeVarId,
        ) -> Option<Type<'db>> {
            (param.param.key() == (0, 0)).then_some(self.ty)
        }
    }

    #[test]
    fn opener_binds_parameters() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let t = decls.add_generic_param(0, 0, "T", vec![]);
        let param = Type::generic_param(&db, t.param);
        let generic = Type::generic_function(
            &db,
            GenericSignature::new(vec![t], vec![]),
            param,
            param,
        );
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let mut opener = BindFirstParam {
            ty: Type::builtin(&db, BuiltinKind::Int64),
        };
        let opened = cs.open_interface_type(generic, decls.top_level(), false, &mut opener);
        assert_snapshot!(cs.simplify_type(opened).display(&db), @"Builtin.Int64 -> Builtin.Int64");
    }
}
