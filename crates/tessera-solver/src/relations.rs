//! One-shot relation queries.
//!
//! Each query builds a throwaway [`ConstraintSystem`], adds a single
//! relation and asks whether any solution exists.

use tessera_types::{ArchetypeId, Type, TypeKind};
use tracing::debug;

use crate::config::SolverConfig;
use crate::constraint::{Constraint, MatchKind, TypeProperty};
use crate::solver::FreeTypeVariableBinding;
use crate::system::{ConstraintSystem, SolverContext};

/// How a checked cast gets from its source type to its target type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheckedCastKind {
    /// From a class to one of its subclasses.
    Downcast,
    /// From a superclass of an archetype's class bound to the archetype.
    SuperToArchetype,
    ArchetypeToArchetype,
    ArchetypeToConcrete,
    ExistentialToArchetype,
    ExistentialToConcrete,
    ConcreteToArchetype,
    ConcreteToUnrelatedExistential,
}

/// Classify the cast of a value of type `from` to type `to`.
pub fn classify_checked_cast<'db>(
    ctx: SolverContext<'_, 'db>,
    from: Type<'db>,
    to: Type<'db>,
) -> CheckedCastKind {
    let db = ctx.db;
    let from = from.rvalue(db);
    if to.is_existential(db) {
        return CheckedCastKind::ConcreteToUnrelatedExistential;
    }
    let to_archetype = as_archetype(db, to);
    let from_archetype = as_archetype(db, from);

    if from_archetype.is_some() && to_archetype.is_some() {
        return CheckedCastKind::ArchetypeToArchetype;
    }
    if from.is_existential(db) {
        return if to_archetype.is_some() {
            CheckedCastKind::ExistentialToArchetype
        } else {
            CheckedCastKind::ExistentialToConcrete
        };
    }
    if from_archetype.is_some() {
        return CheckedCastKind::ArchetypeToConcrete;
    }
    if let Some(archetype) = to_archetype {
        if let Some(superclass) = ctx.decls.archetype_decl(archetype).superclass
            && is_subtype_of(ctx, from, superclass)
        {
            return CheckedCastKind::SuperToArchetype;
        }
        return CheckedCastKind::ConcreteToArchetype;
    }
    CheckedCastKind::Downcast
}

fn as_archetype(db: &dyn salsa::Database, ty: Type<'_>) -> Option<ArchetypeId> {
    match ty.desugar(db).kind(db) {
        TypeKind::Archetype(archetype) => Some(*archetype),
        _ => None,
    }
}

fn holds<'db>(ctx: SolverContext<'_, 'db>, constraints: Vec<Constraint<'db>>) -> bool {
    let mut cs = ConstraintSystem::new(ctx, SolverConfig::default().one_shot());
    for constraint in constraints {
        cs.add_constraint(constraint);
    }
    cs.solve(FreeTypeVariableBinding::Disallow)
        .is_ok_and(|solutions| !solutions.is_empty())
}

fn types_satisfy<'db>(
    ctx: SolverContext<'_, 'db>,
    kind: MatchKind,
    first: Type<'db>,
    second: Type<'db>,
) -> bool {
    let result = holds(ctx, vec![Constraint::relational(kind, first, second, None)]);
    debug!(
        kind = %kind,
        first = %first.display(ctx.db),
        second = %second.display(ctx.db),
        result,
        "relation query"
    );
    result
}

pub fn is_trivial_subtype_of<'db>(ctx: SolverContext<'_, 'db>, a: Type<'db>, b: Type<'db>) -> bool {
    types_satisfy(ctx, MatchKind::TrivialSubtype, a, b)
}

pub fn is_subtype_of<'db>(ctx: SolverContext<'_, 'db>, a: Type<'db>, b: Type<'db>) -> bool {
    types_satisfy(ctx, MatchKind::Subtype, a, b)
}

pub fn is_convertible_to<'db>(ctx: SolverContext<'_, 'db>, a: Type<'db>, b: Type<'db>) -> bool {
    types_satisfy(ctx, MatchKind::Conversion, a, b)
}

/// Whether `ty` meets every requirement of `archetype`, so that it could
/// replace the archetype.
pub fn is_substitutable_for<'db>(
    ctx: SolverContext<'_, 'db>,
    ty: Type<'db>,
    archetype: ArchetypeId,
) -> bool {
    let decl = ctx.decls.archetype_decl(archetype);
    let mut constraints = Vec::new();
    if decl.requires_class {
        constraints.push(Constraint::type_property(TypeProperty::Class, ty, None));
    }
    if let Some(superclass) = decl.superclass {
        constraints.push(Constraint::relational(
            MatchKind::TrivialSubtype,
            ty,
            superclass,
            None,
        ));
    }
    for proto in &decl.conforms_to {
        constraints.push(Constraint::conforms_to(ty, *proto, None));
    }
    holds(ctx, constraints)
}
