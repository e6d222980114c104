//! Type matching.
//!
//! [`ConstraintSystem::match_types`] relates two types under a [`MatchKind`].
//! It binds or merges type variables, decomposes types of the same shape,
//! and otherwise collects the conversions that could relate the two types.
//! A single candidate is applied directly; several become a disjunction so
//! that the solver explores each of them.

use std::collections::HashSet;

use smallvec::SmallVec;
use tessera_types::{
    CONVERSION, FunctionType, TupleElt, Type, TypeKind, TypeVarId, scalar_init_field,
    named_element_index,
};
use tracing::trace;

use crate::constraint::{
    ConformanceKind, Constraint, ConversionRestriction, MatchFlags, MatchKind, SolutionKind,
};
use crate::failure::{Failure, FailureKind};
use crate::locator::{LocatorBuilder, PathElement};
use crate::system::ConstraintSystem;
use crate::tuple_shuffle::{ShuffleError, ShuffleSource, compute_tuple_shuffle};
use crate::typevar::TypeVarOptions;

/// The type a tuple element materializes as: variadic elements are arrays
/// of their base type.
pub(crate) fn tuple_element_type<'db>(db: &'db dyn salsa::Database, elt: &TupleElt<'db>) -> Type<'db> {
    if elt.vararg {
        Type::array(db, elt.ty)
    } else {
        elt.ty
    }
}

fn relational_failure_kind(kind: MatchKind) -> FailureKind {
    match kind {
        MatchKind::Bind | MatchKind::SameType => FailureKind::TypesNotEqual,
        MatchKind::TrivialSubtype => FailureKind::TypesNotTrivialSubtypes,
        MatchKind::Subtype => FailureKind::TypesNotSubtypes,
        MatchKind::Conversion => FailureKind::TypesNotConvertible,
    }
}

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    /// Relate `type1` to `type2` under `kind`.
    ///
    /// Returns `Unsolved` when the answer depends on type variables that are
    /// still free and no constraint could be generated for later.
    pub fn match_types(
        &mut self,
        type1: Type<'db>,
        type2: Type<'db>,
        kind: MatchKind,
        flags: MatchFlags,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let db = self.db();
        let want_rvalue = kind == MatchKind::SameType;
        let (type1, var1) = self.fixed_type_recursive(type1, want_rvalue);
        let (type2, var2) = self.fixed_type_recursive(type2, want_rvalue);
        let desugar1 = type1.desugar(db);
        let desugar2 = type2.desugar(db);
        trace!(
            kind = %kind,
            first = %type1.display(db),
            second = %type2.display(db),
            "match types"
        );

        if desugar1 == desugar2 {
            return SolutionKind::Solved;
        }

        if (var1.is_some() || var2.is_some())
            && let Some(result) =
                self.match_type_variables(type1, var1, type2, var2, kind, flags, locator)
        {
            return result;
        }

        let concrete = var1.is_none() && var2.is_none();
        let sub_flags = flags.with_generate_constraints();
        let mut candidates: SmallVec<[ConversionRestriction; 4]> = SmallVec::new();

        match (desugar1.kind(db), desugar2.kind(db)) {
            (TypeKind::Builtin(_), TypeKind::Builtin(_))
            | (TypeKind::Module(_), TypeKind::Module(_)) => {
                return self.fail_relation(kind, type1, type2, locator);
            }
            (TypeKind::Error, TypeKind::Error) => {
                return self.fail_relation(kind, type1, type2, locator);
            }
            (TypeKind::GenericParam(_), TypeKind::GenericParam(_))
            | (TypeKind::DependentMember { .. }, TypeKind::DependentMember { .. })
            | (TypeKind::GenericFunction { .. }, TypeKind::GenericFunction { .. }) => {
                panic!(
                    "unopened generic type reached the matcher: {}",
                    type1.display(db)
                )
            }
            (TypeKind::Tuple(_), TypeKind::Tuple(_)) => {
                candidates.push(ConversionRestriction::TupleToTuple)
            }
            (TypeKind::Nominal { decl: decl1, .. }, TypeKind::Nominal { decl: decl2, .. })
            | (
                TypeKind::BoundGeneric { decl: decl1, .. },
                TypeKind::BoundGeneric { decl: decl2, .. },
            ) if decl1 == decl2 => candidates.push(ConversionRestriction::DeepEquality),
            (TypeKind::Optional(_), TypeKind::Optional(_)) => {
                candidates.push(ConversionRestriction::DeepEquality)
            }
            (TypeKind::Metatype(instance1), TypeKind::Metatype(instance2)) => {
                let (instance1, instance2) = (*instance1, *instance2);
                // Metatypes of classes are covariant.
                let sub_kind = if kind != MatchKind::SameType
                    && (self.may_have_superclass(instance1)
                        || self.class_decl(instance2).is_some())
                {
                    kind.min(MatchKind::Subtype)
                } else {
                    MatchKind::SameType
                };
                return self.match_types(
                    instance1,
                    instance2,
                    sub_kind,
                    sub_flags,
                    &locator.with_path_element(PathElement::InstanceType),
                );
            }
            (TypeKind::Function(func1), TypeKind::Function(func2)) => {
                return self.match_function_types(type1, *func1, type2, *func2, kind, flags, locator);
            }
            (TypeKind::Array(element1), TypeKind::Array(element2)) => {
                return self.match_types(
                    *element1,
                    *element2,
                    MatchKind::SameType,
                    sub_flags,
                    &locator.with_path_element(PathElement::ArrayElement),
                );
            }
            (
                TypeKind::LValue {
                    object: object1,
                    quals: quals1,
                },
                TypeKind::LValue {
                    object: object2,
                    quals: quals2,
                },
            ) => {
                if quals1 != quals2
                    && !(kind >= MatchKind::TrivialSubtype && quals1.is_strict_subset_of(*quals2))
                {
                    let loc = self.locator(locator);
                    self.record_failure(
                        Failure::new(FailureKind::LValueQualifiers, type1, loc).with_second(type2),
                    );
                    return SolutionKind::Error;
                }
                return self.match_types(*object1, *object2, MatchKind::SameType, sub_flags, locator);
            }
            _ => {}
        }

        'collect: {
            if concrete && kind >= MatchKind::TrivialSubtype {
                let tuple1 = desugar1.tuple_elements(db);
                let tuple2 = desugar2.tuple_elements(db);

                // Both sides accept a scalar, but the source scalar field is
                // labeled differently from the destination one.
                let mismatched_names = match (tuple1, tuple2) {
                    (Some(elts1), Some(elts2)) => {
                        match (scalar_init_field(elts1), scalar_init_field(elts2)) {
                            (Some(i1), Some(i2)) => {
                                elts1[i1].name.is_some() && elts1[i1].name != elts2[i2].name
                            }
                            _ => false,
                        }
                    }
                    _ => false,
                };

                if let Some(elts2) = tuple2
                    && !mismatched_names
                    && ((elts2.len() == 1 && !elts2[0].vararg)
                        || (kind >= MatchKind::Conversion && scalar_init_field(elts2).is_some()))
                {
                    candidates.push(ConversionRestriction::ScalarToTuple);
                    break 'collect;
                }

                if let Some(elts1) = tuple1
                    && !mismatched_names
                    && elts1.len() == 1
                    && !elts1[0].vararg
                {
                    candidates.push(ConversionRestriction::TupleToScalar);
                }

                if self.may_have_superclass(type1)
                    && self.may_have_superclass(type2)
                    && let Some(class2) = self.class_decl(type2)
                    && self.class_decl(type1) != Some(class2)
                {
                    candidates.push(ConversionRestriction::Superclass);
                }
            }

            if concrete && kind >= MatchKind::Conversion {
                if let TypeKind::LValue { quals, .. } = desugar1.kind(db)
                    && quals.implicit
                {
                    candidates.push(ConversionRestriction::LValueToRValue);
                }

                // Any expression converts to an auto-closure of its type.
                if let Some(func2) = type2.as_function(db)
                    && func2.ext.auto_closure
                {
                    return self.match_types(
                        type1,
                        func2.result,
                        kind,
                        sub_flags,
                        &locator.with_path_element(PathElement::Load),
                    );
                }
            }

            if type2.is_existential(db)
                && (kind >= MatchKind::Conversion
                    || (kind == MatchKind::Subtype
                        && (type1.is_existential(db) || self.is_class_existential(type2))))
            {
                candidates.push(ConversionRestriction::Existential);
            }

            if concrete && kind >= MatchKind::Conversion && type2.optional_object(db).is_some() {
                if type1.optional_object(db).is_some() {
                    candidates.push(ConversionRestriction::OptionalToOptional);
                }
                candidates.push(ConversionRestriction::ValueToOptional);
            }

            if concrete && kind >= MatchKind::Conversion && self.should_try_user_conversion(type1) {
                candidates.push(ConversionRestriction::User);
            }
        }

        match candidates.as_slice() {
            [] => {
                if var1.is_some() || var2.is_some() {
                    SolutionKind::Unsolved
                } else {
                    self.fail_relation(kind, type1, type2, locator)
                }
            }
            [only] => self.apply_restriction(*only, type1, type2, kind, flags, locator),
            _ => {
                let loc = self.locator(locator);
                let alternatives = candidates
                    .iter()
                    .map(|restriction| {
                        let alt_kind = if *restriction == ConversionRestriction::DeepEquality {
                            MatchKind::SameType
                        } else {
                            kind
                        };
                        Constraint::restricted(alt_kind, type1, type2, *restriction, loc)
                    })
                    .collect();
                self.add_constraint(Constraint::disjunction(alternatives, loc));
                SolutionKind::Solved
            }
        }
    }

    /// Handle a match where at least one side is a free variable. `None`
    /// means the structural cases below still apply.
    #[allow(clippy::too_many_arguments)]
    fn match_type_variables(
        &mut self,
        type1: Type<'db>,
        var1: Option<TypeVarId>,
        type2: Type<'db>,
        var2: Option<TypeVarId>,
        kind: MatchKind,
        flags: MatchFlags,
        locator: &LocatorBuilder,
    ) -> Option<SolutionKind> {
        match kind {
            MatchKind::Bind | MatchKind::SameType => {
                let result = match (var1, var2) {
                    (Some(rep1), Some(rep2)) => {
                        if rep1 == rep2 {
                            return Some(SolutionKind::Solved);
                        }
                        let lvalue1 = self.type_vars.options(rep1).can_bind_to_lvalue;
                        let lvalue2 = self.type_vars.options(rep2).can_bind_to_lvalue;
                        if lvalue1 != lvalue2 {
                            // Merging would lose one side's lvalue capability.
                            if flags.generate_constraints {
                                let loc = self.locator(locator);
                                self.add_constraint(Constraint::relational(kind, type1, type2, loc));
                                SolutionKind::Solved
                            } else {
                                SolutionKind::Unsolved
                            }
                        } else {
                            self.merge_equivalence_classes(rep1, rep2);
                            SolutionKind::Solved
                        }
                    }
                    (Some(var), None) => self.bind_type_var(var, type1, type2, kind, locator),
                    (None, Some(var)) => self.bind_type_var(var, type2, type1, kind, locator),
                    (None, None) => return None,
                };
                Some(result)
            }
            MatchKind::TrivialSubtype | MatchKind::Subtype | MatchKind::Conversion => {
                if flags.generate_constraints {
                    let loc = self.locator(locator);
                    self.add_constraint(Constraint::relational(kind, type1, type2, loc));
                    return Some(SolutionKind::Solved);
                }
                match (var1, var2) {
                    (Some(rep1), Some(rep2)) => Some(if rep1 == rep2 {
                        SolutionKind::Solved
                    } else {
                        SolutionKind::Unsolved
                    }),
                    _ => None,
                }
            }
        }
    }

    fn bind_type_var(
        &mut self,
        var: TypeVarId,
        var_ty: Type<'db>,
        other: Type<'db>,
        kind: MatchKind,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let db = self.db();
        let other = if kind == MatchKind::SameType {
            other.rvalue(db)
        } else {
            other
        };
        if !self.type_vars.options(var).can_bind_to_lvalue && other.is_lvalue(db) {
            let loc = self.locator(locator);
            self.record_failure(
                Failure::new(FailureKind::LValueQualifiers, var_ty, loc).with_second(other),
            );
            return SolutionKind::Error;
        }
        if self.type_vars.occurs(db, var, other) {
            let loc = self.locator(locator);
            self.record_failure(
                Failure::new(FailureKind::RecursiveType, var_ty, loc).with_second(other),
            );
            return SolutionKind::Error;
        }
        self.assign_fixed_type(var, other);
        SolutionKind::Solved
    }

    /// Apply one conversion path, recording it when it succeeds.
    pub(crate) fn apply_restriction(
        &mut self,
        restriction: ConversionRestriction,
        type1: Type<'db>,
        type2: Type<'db>,
        kind: MatchKind,
        flags: MatchFlags,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let db = self.db();
        let sub_flags = flags.with_generate_constraints();
        trace!(%restriction, kind = %kind, "apply restriction");
        let result = match restriction {
            ConversionRestriction::TupleToTuple => {
                match (type1.tuple_elements(db), type2.tuple_elements(db)) {
                    (Some(elts1), Some(elts2)) => {
                        self.match_tuple_types(type1, elts1, type2, elts2, kind, flags, locator)
                    }
                    _ => self.fail_relation(kind, type1, type2, locator),
                }
            }
            ConversionRestriction::ScalarToTuple => match type2.tuple_elements(db) {
                Some(elts2) => match scalar_init_field(elts2) {
                    Some(index) => self.match_types(
                        type1,
                        elts2[index].ty,
                        kind,
                        sub_flags,
                        &locator.with_path_element(PathElement::ScalarToTuple),
                    ),
                    None => self.fail_relation(kind, type1, type2, locator),
                },
                None => self.fail_relation(kind, type1, type2, locator),
            },
            ConversionRestriction::TupleToScalar => match type1.tuple_elements(db) {
                Some([elt]) if !elt.vararg => self.match_types(
                    elt.ty,
                    type2,
                    kind,
                    sub_flags,
                    &locator.with_path_element(PathElement::TupleElement(0)),
                ),
                _ => self.fail_relation(kind, type1, type2, locator),
            },
            ConversionRestriction::DeepEquality => self.match_deep_equality(type1, type2, kind, locator),
            ConversionRestriction::Superclass => {
                self.match_superclass_types(type1, type2, kind, locator)
            }
            ConversionRestriction::LValueToRValue => {
                self.match_types(type1.rvalue(db), type2, kind, sub_flags, locator)
            }
            ConversionRestriction::Existential => self.match_existential_types(type1, type2, locator),
            ConversionRestriction::ValueToOptional => match type2.optional_object(db) {
                Some(object2) => self.match_types(type1, object2, kind, sub_flags, locator),
                None => self.fail_relation(kind, type1, type2, locator),
            },
            ConversionRestriction::OptionalToOptional => {
                match (type1.optional_object(db), type2.optional_object(db)) {
                    (Some(object1), Some(object2)) => {
                        self.match_types(object1, object2, kind, sub_flags, locator)
                    }
                    _ => self.fail_relation(kind, type1, type2, locator),
                }
            }
            ConversionRestriction::User => {
                self.try_user_conversion(type1, MatchKind::Subtype, type2, locator)
            }
        };

        if result == SolutionKind::Solved {
            self.record_restriction(type1, type2, restriction);
            if matches!(
                restriction,
                ConversionRestriction::ValueToOptional | ConversionRestriction::User
            ) {
                self.increase_score(1);
            }
        }
        result
    }

    fn fail_relation(
        &mut self,
        kind: MatchKind,
        type1: Type<'db>,
        type2: Type<'db>,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let loc = self.locator(locator);
        self.record_failure(Failure::new(relational_failure_kind(kind), type1, loc).with_second(type2));
        SolutionKind::Error
    }

    fn fail_structure(
        &mut self,
        failure: FailureKind,
        type1: Type<'db>,
        type2: Type<'db>,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let loc = self.locator(locator);
        self.record_failure(Failure::new(failure, type1, loc).with_second(type2));
        SolutionKind::Error
    }

    #[allow(clippy::too_many_arguments)]
    fn match_tuple_types(
        &mut self,
        type1: Type<'db>,
        elts1: &'db [TupleElt<'db>],
        type2: Type<'db>,
        elts2: &'db [TupleElt<'db>],
        kind: MatchKind,
        flags: MatchFlags,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let db = self.db();
        let sub_flags = flags.with_generate_constraints();

        // Equality and subtyping need the elements to line up one to one.
        if kind < MatchKind::Conversion {
            if elts1.len() != elts2.len() {
                return self.fail_structure(FailureKind::TupleSizeMismatch, type1, type2, locator);
            }
            for (i, (elt1, elt2)) in elts1.iter().zip(elts2).enumerate() {
                let named = locator.with_path_element(PathElement::NamedTupleElement(i as u32));
                if elt1.name != elt2.name {
                    if kind == MatchKind::SameType {
                        return self.fail_structure(FailureKind::TupleNameMismatch, type1, type2, &named);
                    }
                    // The label may not be used at another position.
                    if let Some(name) = elt2.name
                        && named_element_index(elts1, name).is_some()
                    {
                        return self.fail_structure(
                            FailureKind::TupleNamePositionMismatch,
                            type1,
                            type2,
                            &named,
                        );
                    }
                }
                if elt1.vararg != elt2.vararg {
                    return self.fail_structure(FailureKind::TupleVariadicMismatch, type1, type2, &named);
                }
                let result = self.match_types(
                    tuple_element_type(db, elt1),
                    tuple_element_type(db, elt2),
                    kind,
                    sub_flags,
                    &locator.with_path_element(PathElement::TupleElement(i as u32)),
                );
                if result == SolutionKind::Error {
                    return SolutionKind::Error;
                }
            }
            return SolutionKind::Solved;
        }

        let labels_mandatory = self.locators.has_mandatory_tuple_labels(locator);
        let shuffle = match compute_tuple_shuffle(elts1, elts2, labels_mandatory) {
            Ok(shuffle) => shuffle,
            Err(err) => {
                trace!(%err, "tuple shuffle failed");
                let failure = if elts1.len() != elts2.len() {
                    FailureKind::TupleSizeMismatch
                } else if let ShuffleError::LabeledVariadic { .. } = err {
                    FailureKind::TupleVariadicMismatch
                } else {
                    FailureKind::TupleNameMismatch
                };
                return self.fail_structure(failure, type1, type2, locator);
            }
        };

        let mut has_variadic = false;
        for (index2, source) in shuffle.sources.iter().enumerate() {
            let index1 = match source {
                ShuffleSource::DefaultInitialize => continue,
                ShuffleSource::FirstVariadic => {
                    has_variadic = true;
                    continue;
                }
                ShuffleSource::Element(index1) => *index1,
            };
            let result = self.match_types(
                tuple_element_type(db, &elts1[index1]),
                tuple_element_type(db, &elts2[index2]),
                MatchKind::Conversion,
                sub_flags,
                &locator.with_path_element(PathElement::TupleElement(index1 as u32)),
            );
            if result == SolutionKind::Error {
                return SolutionKind::Error;
            }
        }

        if has_variadic && let Some(last) = elts2.last() {
            for index1 in &shuffle.variadic_args {
                let result = self.match_types(
                    tuple_element_type(db, &elts1[*index1]),
                    last.ty,
                    MatchKind::Conversion,
                    sub_flags,
                    &locator.with_path_element(PathElement::TupleElement(*index1 as u32)),
                );
                if result == SolutionKind::Error {
                    return SolutionKind::Error;
                }
            }
        }
        SolutionKind::Solved
    }

    #[allow(clippy::too_many_arguments)]
    fn match_function_types(
        &mut self,
        type1: Type<'db>,
        func1: FunctionType<'db>,
        type2: Type<'db>,
        func2: FunctionType<'db>,
        kind: MatchKind,
        flags: MatchFlags,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        // An auto-closure may be used where a plain function is expected.
        if func1.ext.auto_closure != func2.ext.auto_closure
            && (func2.ext.auto_closure || kind < MatchKind::TrivialSubtype)
        {
            return self.fail_structure(FailureKind::FunctionAutoclosureMismatch, type1, type2, locator);
        }
        // So may a noreturn function.
        if func1.ext.no_return != func2.ext.no_return
            && (func2.ext.no_return || kind < MatchKind::SameType)
        {
            return self.fail_structure(FailureKind::FunctionNoReturnMismatch, type1, type2, locator);
        }

        let sub_kind = match kind {
            MatchKind::Bind | MatchKind::SameType | MatchKind::TrivialSubtype => kind,
            MatchKind::Subtype => MatchKind::TrivialSubtype,
            MatchKind::Conversion => MatchKind::Subtype,
        };
        let sub_flags = flags.with_generate_constraints();

        let input = self.match_types(
            func2.input,
            func1.input,
            sub_kind,
            sub_flags,
            &locator.with_path_element(PathElement::FunctionArgument),
        );
        if input == SolutionKind::Error {
            return SolutionKind::Error;
        }
        self.match_types(
            func1.result,
            func2.result,
            sub_kind,
            sub_flags,
            &locator.with_path_element(PathElement::FunctionResult),
        )
    }

    fn match_deep_equality(
        &mut self,
        type1: Type<'db>,
        type2: Type<'db>,
        kind: MatchKind,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let db = self.db();
        let flags = MatchFlags::NONE.with_generate_constraints();
        match (type1.desugar(db).kind(db), type2.desugar(db).kind(db)) {
            (TypeKind::Nominal { parent: parent1, .. }, TypeKind::Nominal { parent: parent2, .. }) => {
                match (parent1, parent2) {
                    (None, None) => SolutionKind::Solved,
                    (Some(parent1), Some(parent2)) => self.match_types(
                        *parent1,
                        *parent2,
                        MatchKind::SameType,
                        flags,
                        &locator.with_path_element(PathElement::ParentType),
                    ),
                    _ => self.fail_relation(kind, type1, type2, locator),
                }
            }
            (
                TypeKind::BoundGeneric {
                    parent: parent1,
                    args: args1,
                    ..
                },
                TypeKind::BoundGeneric {
                    parent: parent2,
                    args: args2,
                    ..
                },
            ) => {
                match (parent1, parent2) {
                    (None, None) => {}
                    (Some(parent1), Some(parent2)) => {
                        let result = self.match_types(
                            *parent1,
                            *parent2,
                            MatchKind::SameType,
                            flags,
                            &locator.with_path_element(PathElement::ParentType),
                        );
                        if result == SolutionKind::Error {
                            return SolutionKind::Error;
                        }
                    }
                    _ => return self.fail_relation(kind, type1, type2, locator),
                }
                if args1.len() != args2.len() {
                    return self.fail_relation(kind, type1, type2, locator);
                }
                for (i, (arg1, arg2)) in args1.iter().zip(args2).enumerate() {
                    let result = self.match_types(
                        *arg1,
                        *arg2,
                        MatchKind::SameType,
                        flags,
                        &locator.with_path_element(PathElement::GenericArgument(i as u32)),
                    );
                    if result == SolutionKind::Error {
                        return SolutionKind::Error;
                    }
                }
                SolutionKind::Solved
            }
            (TypeKind::Optional(object1), TypeKind::Optional(object2)) => self.match_types(
                *object1,
                *object2,
                MatchKind::SameType,
                flags,
                &locator.with_path_element(PathElement::GenericArgument(0)),
            ),
            _ => self.fail_relation(kind, type1, type2, locator),
        }
    }

    fn match_superclass_types(
        &mut self,
        type1: Type<'db>,
        type2: Type<'db>,
        kind: MatchKind,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let db = self.db();
        if let Some(class2) = self.class_decl(type2) {
            let oracle = self.ctx().conformance;
            let mut visited = HashSet::new();
            let mut current = oracle.superclass_of(db, type1);
            while let Some(superclass) = current {
                let decl = self.class_decl(superclass);
                if decl == Some(class2) {
                    return self.match_types(
                        superclass,
                        type2,
                        MatchKind::SameType,
                        MatchFlags::NONE.with_generate_constraints(),
                        locator,
                    );
                }
                if !visited.insert(decl) {
                    break;
                }
                current = oracle.superclass_of(db, superclass);
            }
        }
        self.fail_relation(kind, type1, type2, locator)
    }

    fn match_existential_types(
        &mut self,
        type1: Type<'db>,
        type2: Type<'db>,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        let db = self.db();
        let Some(protocols) = type2.existential_protocols(db) else {
            return self.fail_relation(MatchKind::Conversion, type1, type2, locator);
        };
        let loc = self.locator(locator);
        for proto in protocols {
            match self.simplify_conformance(type1, proto, ConformanceKind::ConformsTo, loc) {
                SolutionKind::Solved => {}
                SolutionKind::Unsolved => {
                    self.add_constraint(Constraint::conforms_to(type1, proto, loc));
                }
                SolutionKind::Error => return SolutionKind::Error,
            }
        }
        SolutionKind::Solved
    }

    /// Nominal types and archetypes with a `__conversion` member.
    fn should_try_user_conversion(&mut self, ty: Type<'db>) -> bool {
        let db = self.db();
        let convertible = ty.nominal_decl(db).is_some()
            || matches!(ty.desugar(db).kind(db), TypeKind::Archetype(_));
        convertible && !self.lookup_member(ty, CONVERSION()).is_empty()
    }

    /// Relate the result of `ty`'s conversion function to `other`.
    fn try_user_conversion(
        &mut self,
        ty: Type<'db>,
        kind: MatchKind,
        other: Type<'db>,
        locator: &LocatorBuilder,
    ) -> SolutionKind {
        if !self.should_try_user_conversion(ty) {
            return SolutionKind::Unsolved;
        }
        let db = self.db();
        let member_loc = self.locator(&locator.with_path_element(PathElement::ConversionMember));
        let input_loc = self.extend_locator(member_loc, PathElement::FunctionArgument);
        let output_loc = self.extend_locator(member_loc, PathElement::FunctionResult);
        let input = self.new_type_var(TypeVarOptions::NONE, input_loc);
        let output = self.new_type_var(TypeVarOptions::NONE, output_loc);

        self.add_constraint(Constraint::value_member(
            ty,
            CONVERSION(),
            Type::function(db, input, output),
            member_loc,
        ));
        // Conversion functions take no arguments.
        let loc = self.locator(locator);
        self.add_constraint(Constraint::relational(
            MatchKind::Conversion,
            Type::empty_tuple(db),
            input,
            loc,
        ));
        let result_loc = self.locator(&locator.with_path_element(PathElement::ConversionResult));
        self.add_constraint(Constraint::relational(kind, output, other, result_loc));
        SolutionKind::Solved
    }
}

#[cfg(test)]
mod tests {
    use tessera_types::{
        DeclTable, FunctionExt, LValueQuals, NominalKind, Symbol,
    };

    use super::*;
    use crate::config::SolverConfig;
    use crate::system::SolverContext;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    fn none() -> LocatorBuilder {
        LocatorBuilder::new(None)
    }

    #[test]
    fn test_match_binds_type_variable() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        let opt = Type::optional(&db, t0);
        let result = cs.match_types(opt, Type::optional(&db, int), MatchKind::Bind, MatchFlags::NONE, &none());
        assert_eq!(result, SolutionKind::Solved);
        assert_eq!(cs.simplify_type(t0), int);
    }

    #[test]
    fn test_match_rejects_lvalue_for_rvalue_variable() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        let lvalue = Type::lvalue(&db, int, LValueQuals::IMPLICIT);
        assert_eq!(
            cs.match_types(t0, lvalue, MatchKind::Bind, MatchFlags::NONE, &none()),
            SolutionKind::Error
        );
        let failure = cs.first_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::LValueQualifiers);
        assert_eq!((failure.first, failure.second), (t0, Some(lvalue)));
        // Same-type matching looks through the lvalue instead.
        assert_eq!(
            cs.match_types(t0, lvalue, MatchKind::SameType, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        assert_eq!(cs.simplify_type(t0), int);
    }

    #[test]
    fn test_match_occurs_check_records_failure() {
        let db = test_db();
        let decls = DeclTable::new(&db);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        let result = cs.match_types(t0, Type::array(&db, t0), MatchKind::Bind, MatchFlags::NONE, &none());
        assert_eq!(result, SolutionKind::Error);
        assert_eq!(
            cs.first_failure().map(|f| f.kind),
            Some(FailureKind::RecursiveType)
        );
        assert_eq!(cs.fixed_type(t0.as_type_var(&db).unwrap()), None);
    }

    #[test]
    fn test_match_merges_variables_with_equal_capabilities() {
        let db = test_db();
        let decls = DeclTable::new(&db);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let t0 = cs.new_type_var(TypeVarOptions::NONE, None);
        let t1 = cs.new_type_var(TypeVarOptions::NONE, None);
        let t2 = cs.new_type_var(TypeVarOptions::NONE.lvalue_allowed(), None);
        assert_eq!(
            cs.match_types(t1, t0, MatchKind::SameType, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        assert_eq!(cs.simplify_type(t1), t0);
        assert_eq!(
            cs.match_types(t0, t2, MatchKind::Bind, MatchFlags::NONE, &none()),
            SolutionKind::Unsolved
        );
    }

    #[test]
    fn test_match_tuple_size_mismatch() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let pair = Type::tuple_of(&db, [int, int]);
        let single = Type::tuple(&db, vec![TupleElt::new(int).variadic()]);
        let result = cs.match_types(pair, Type::tuple_of(&db, [int, int, int]), MatchKind::SameType, MatchFlags::NONE, &none());
        assert_eq!(result, SolutionKind::Error);
        assert_eq!(
            cs.first_failure().map(|f| f.kind),
            Some(FailureKind::TupleSizeMismatch)
        );
        // A conversion may collect both elements into a variadic one.
        assert_eq!(
            cs.match_types(pair, single, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
    }

    #[test]
    fn test_match_tuple_labels_under_subtyping() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let (a, b) = (Symbol::new("a"), Symbol::new("b"));
        let ab = Type::tuple(&db, vec![TupleElt::named(a, int), TupleElt::named(b, int)]);
        let ba = Type::tuple(&db, vec![TupleElt::named(b, int), TupleElt::named(a, int)]);
        let plain = Type::tuple_of(&db, [int, int]);
        assert_eq!(
            cs.match_types(ab, plain, MatchKind::Subtype, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        assert_eq!(
            cs.match_types(ab, ba, MatchKind::Subtype, MatchFlags::NONE, &none()),
            SolutionKind::Error
        );
        assert_eq!(
            cs.first_failure().map(|f| f.kind),
            Some(FailureKind::TupleNamePositionMismatch)
        );
        // Conversions shuffle by label.
        assert_eq!(
            cs.match_types(ab, ba, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
    }

    #[test]
    fn test_match_tuple_shuffle_failure_is_recorded() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let a = Type::tuple(&db, vec![TupleElt::named(Symbol::new("a"), int), TupleElt::new(int)]);
        let b = Type::tuple(&db, vec![TupleElt::named(Symbol::new("b"), int), TupleElt::new(int)]);
        assert_eq!(
            cs.match_types(a, b, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Error
        );
        let failure = cs.first_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::TupleNameMismatch);
        assert_eq!((failure.first, failure.second), (a, Some(b)));
    }

    #[test]
    fn test_match_scalar_to_tuple_keeps_label() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let x = Symbol::new("x");
        let labeled = Type::tuple(&db, vec![TupleElt::named(x, int)]);
        assert_eq!(
            cs.match_types(int, labeled, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        let recorded = cs.restrictions();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].restriction, ConversionRestriction::ScalarToTuple);
        assert_eq!(recorded[0].to.tuple_elements(&db).unwrap()[0].name, Some(x));
    }

    #[test]
    fn test_match_function_variance() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let base = decls.add_nominal("Base", NominalKind::Class);
        let derived = decls.add_nominal("Derived", NominalKind::Class);
        let base_ty = Type::nominal(&db, base);
        let derived_ty = Type::nominal(&db, derived);
        decls.set_superclass(derived, base_ty);
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());

        let wide = Type::function(&db, base_ty, derived_ty);
        let narrow = Type::function(&db, derived_ty, base_ty);
        assert_eq!(
            cs.match_types(wide, narrow, MatchKind::Subtype, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        assert_eq!(
            cs.match_types(narrow, wide, MatchKind::Subtype, MatchFlags::NONE, &none()),
            SolutionKind::Error
        );
    }

    #[test]
    fn test_match_autoclosure_flags() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let unit = Type::empty_tuple(&db);
        let plain = Type::function(&db, unit, int);
        let auto = Type::function_ext(
            &db,
            unit,
            int,
            FunctionExt {
                auto_closure: true,
                no_return: false,
            },
        );
        assert_eq!(
            cs.match_types(plain, auto, MatchKind::SameType, MatchFlags::NONE, &none()),
            SolutionKind::Error
        );
        assert_eq!(
            cs.first_failure().map(|f| f.kind),
            Some(FailureKind::FunctionAutoclosureMismatch)
        );
        // A value converts to an auto-closure producing it.
        assert_eq!(
            cs.match_types(int, auto, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
    }

    #[test]
    fn test_match_lvalue_to_rvalue() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let implicit = Type::lvalue(&db, int, LValueQuals::IMPLICIT);
        let explicit = Type::lvalue(&db, int, LValueQuals::EXPLICIT);
        assert_eq!(
            cs.match_types(implicit, int, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        assert_eq!(cs.restrictions()[0].restriction, ConversionRestriction::LValueToRValue);
        assert_eq!(
            cs.match_types(explicit, int, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Error
        );
        // Dropping qualifiers is allowed, adding them is not.
        assert_eq!(
            cs.match_types(explicit, implicit, MatchKind::Subtype, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        assert_eq!(
            cs.match_types(implicit, explicit, MatchKind::Subtype, MatchFlags::NONE, &none()),
            SolutionKind::Error
        );
    }

    #[test]
    fn test_match_value_to_optional_adds_score() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        assert_eq!(
            cs.match_types(int, Type::optional(&db, int), MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        assert_eq!(cs.fixed_score(), 1);
    }

    #[test]
    fn test_match_several_paths_make_a_disjunction() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let unlabeled = Type::tuple_of(&db, [int]);
        let labeled = Type::tuple(&db, vec![TupleElt::named(Symbol::new("x"), int)]);
        assert_eq!(
            cs.match_types(unlabeled, labeled, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        let active: Vec<_> = cs.constraints().active().map(|(_, c)| c.clone()).collect();
        assert_eq!(active.len(), 1);
        let Constraint::Disjunction { alternatives, .. } = &active[0] else {
            panic!("expected a disjunction, got {:?}", active[0]);
        };
        let restrictions: Vec<_> = alternatives
            .iter()
            .map(|alt| match alt {
                Constraint::Relational { restriction, .. } => *restriction,
                _ => None,
            })
            .collect();
        assert_eq!(
            restrictions,
            vec![
                Some(ConversionRestriction::TupleToTuple),
                Some(ConversionRestriction::ScalarToTuple)
            ]
        );
    }

    fn alternatives(cs: &ConstraintSystem<'_, '_>) -> Vec<(MatchKind, Option<ConversionRestriction>)> {
        let active: Vec<_> = cs.constraints().active().map(|(_, c)| c.clone()).collect();
        assert_eq!(active.len(), 1);
        let Constraint::Disjunction { alternatives, .. } = &active[0] else {
            panic!("expected a disjunction, got {:?}", active[0]);
        };
        alternatives
            .iter()
            .map(|alt| match alt {
                Constraint::Relational {
                    kind, restriction, ..
                } => (*kind, *restriction),
                other => panic!("expected a relational alternative, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_match_optional_paths_keep_their_order() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let double = Type::nominal(&db, decls.add_nominal("Double", NominalKind::Struct));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        assert_eq!(
            cs.match_types(
                Type::optional(&db, int),
                Type::optional(&db, double),
                MatchKind::Conversion,
                MatchFlags::NONE,
                &none()
            ),
            SolutionKind::Solved
        );
        assert_eq!(
            alternatives(&cs),
            vec![
                (MatchKind::SameType, Some(ConversionRestriction::DeepEquality)),
                (MatchKind::Conversion, Some(ConversionRestriction::OptionalToOptional)),
                (MatchKind::Conversion, Some(ConversionRestriction::ValueToOptional)),
            ]
        );
    }

    #[test]
    fn test_match_existential_is_one_of_several_paths() {
        let db = test_db();
        let mut decls = DeclTable::new(&db);
        let int = Type::nominal(&db, decls.add_nominal("Int", NominalKind::Struct));
        let printable = Type::protocol(&db, decls.add_protocol("Printable"));
        let mut cs = ConstraintSystem::new(SolverContext::new(&db, &decls), SolverConfig::default());
        let single = Type::tuple_of(&db, [int]);
        assert_eq!(
            cs.match_types(single, printable, MatchKind::Conversion, MatchFlags::NONE, &none()),
            SolutionKind::Solved
        );
        assert_eq!(
            alternatives(&cs),
            vec![
                (MatchKind::Conversion, Some(ConversionRestriction::TupleToScalar)),
                (MatchKind::Conversion, Some(ConversionRestriction::Existential)),
            ]
        );
    }
}
