//! The type algebra.
//!
//! Types are hash-consed through salsa: two types are the same type exactly
//! when their interned handles are equal. Sugar (`Paren`, `NameAlias`) is kept
//! for printing and collapsed by [`Type::desugar`] / [`Type::canonical`]
//! before any structural comparison.

use derive_more::Display;
use smallvec::SmallVec;

use crate::decl::{
    ArchetypeId, AssocTypeId, GenericParamTy, GenericSignature, ModuleId, NominalId, ProtocolId,
};
use crate::Symbol;

/// A type variable identifier, local to one constraint system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, salsa::Update)]
#[display("$T{_0}")]
pub struct TypeVarId(pub u32);

impl TypeVarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An interned type.
#[salsa::interned(debug)]
pub struct Type<'db> {
    #[returns(ref)]
    pub kind: TypeKind<'db>,
}

/// The different kinds of types.
#[derive(Clone, Debug, PartialEq, Eq, Hash, salsa::Update)]
pub enum TypeKind<'db> {
    // === Leaves ===
    /// A compiler-provided primitive such as `Builtin.Int64`.
    Builtin(BuiltinKind),
    Module(ModuleId),
    /// Placeholder produced after an earlier error; matches anything of its kind.
    Error,

    // === Structural ===
    Tuple(Vec<TupleElt<'db>>),
    Function(FunctionType<'db>),
    Metatype(Type<'db>),
    LValue {
        object: Type<'db>,
        quals: LValueQuals,
    },
    Optional(Type<'db>),
    Array(Type<'db>),

    // === Nominal ===
    Nominal {
        decl: NominalId,
        parent: Option<Type<'db>>,
    },
    BoundGeneric {
        decl: NominalId,
        parent: Option<Type<'db>>,
        args: Vec<Type<'db>>,
    },
    /// A generic nominal named without arguments; opening supplies them.
    UnboundGeneric {
        decl: NominalId,
        parent: Option<Type<'db>>,
    },

    // === Existentials ===
    Protocol(ProtocolId),
    /// `protocol<P, Q>`; the empty composition is the top type.
    Composition(Vec<Type<'db>>),

    // === Generics ===
    Archetype(ArchetypeId),
    /// Interface-type generic parameter. Never survives opening.
    GenericParam(GenericParamTy),
    /// `T.Element` over a generic parameter. Never survives opening.
    DependentMember {
        base: Type<'db>,
        assoc: AssocTypeId,
    },
    GenericFunction {
        signature: GenericSignature<'db>,
        function: FunctionType<'db>,
    },

    // === Inference ===
    TypeVar(TypeVarId),

    // === Sugar ===
    Paren(Type<'db>),
    NameAlias {
        name: Symbol,
        underlying: Type<'db>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, salsa::Update)]
pub enum BuiltinKind {
    Int1,
    Int64,
    Float64,
    RawPointer,
}

impl BuiltinKind {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Int1 => "Int1",
            BuiltinKind::Int64 => "Int64",
            BuiltinKind::Float64 => "Float64",
            BuiltinKind::RawPointer => "RawPointer",
        }
    }
}

/// One element of a tuple type.
///
/// For a variadic element `ty` is the element's base type; the element itself
/// materializes as an array of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, salsa::Update)]
pub struct TupleElt<'db> {
    pub name: Option<Symbol>,
    pub ty: Type<'db>,
    pub vararg: bool,
    pub has_default: bool,
}

impl<'db> TupleElt<'db> {
    pub fn new(ty: Type<'db>) -> Self {
        Self {
            name: None,
            ty,
            vararg: false,
            has_default: false,
        }
    }

    pub fn named(name: Symbol, ty: Type<'db>) -> Self {
        Self {
            name: Some(name),
            ..Self::new(ty)
        }
    }

    pub fn variadic(mut self) -> Self {
        self.vararg = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn with_type(self, ty: Type<'db>) -> Self {
        Self { ty, ..self }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, salsa::Update)]
pub struct FunctionExt {
    /// The argument is wrapped in an implicit closure at the call site.
    pub auto_closure: bool,
    pub no_return: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, salsa::Update)]
pub struct FunctionType<'db> {
    pub input: Type<'db>,
    pub result: Type<'db>,
    pub ext: FunctionExt,
}

/// Qualifiers of an lvalue type.
///
/// Fewer qualifiers is more capable: a plain `@lvalue` converts to an
/// implicit one, not the other way around.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, salsa::Update)]
pub struct LValueQuals {
    /// Formed implicitly by referencing storage; loads happen silently.
    pub implicit: bool,
    pub non_settable: bool,
}

impl LValueQuals {
    pub const EXPLICIT: LValueQuals = LValueQuals {
        implicit: false,
        non_settable: false,
    };

    pub const IMPLICIT: LValueQuals = LValueQuals {
        implicit: true,
        non_settable: false,
    };

    pub fn non_settable(self) -> Self {
        Self {
            non_settable: true,
            ..self
        }
    }

    pub fn with_implicit(self) -> Self {
        Self {
            implicit: true,
            ..self
        }
    }

    pub fn union(self, other: LValueQuals) -> Self {
        Self {
            implicit: self.implicit || other.implicit,
            non_settable: self.non_settable || other.non_settable,
        }
    }

    /// Strict subset of qualifiers.
    pub fn is_strict_subset_of(self, other: LValueQuals) -> bool {
        self != other
            && (!self.implicit || other.implicit)
            && (!self.non_settable || other.non_settable)
    }
}

impl<'db> Type<'db> {
    // ===== Constructors =====

    pub fn builtin(db: &'db dyn salsa::Database, kind: BuiltinKind) -> Self {
        Type::new(db, TypeKind::Builtin(kind))
    }

    pub fn module(db: &'db dyn salsa::Database, module: ModuleId) -> Self {
        Type::new(db, TypeKind::Module(module))
    }

    pub fn error(db: &'db dyn salsa::Database) -> Self {
        Type::new(db, TypeKind::Error)
    }

    pub fn tuple(db: &'db dyn salsa::Database, elts: Vec<TupleElt<'db>>) -> Self {
        Type::new(db, TypeKind::Tuple(elts))
    }

    /// Unlabeled tuple of the given element types.
    pub fn tuple_of(db: &'db dyn salsa::Database, tys: impl IntoIterator<Item = Type<'db>>) -> Self {
        Type::tuple(db, tys.into_iter().map(TupleElt::new).collect())
    }

    pub fn empty_tuple(db: &'db dyn salsa::Database) -> Self {
        Type::tuple(db, Vec::new())
    }

    pub fn function(db: &'db dyn salsa::Database, input: Type<'db>, result: Type<'db>) -> Self {
        Type::function_ext(db, input, result, FunctionExt::default())
    }

    pub fn function_ext(
        db: &'db dyn salsa::Database,
        input: Type<'db>,
        result: Type<'db>,
        ext: FunctionExt,
    ) -> Self {
        Type::new(
            db,
            TypeKind::Function(FunctionType { input, result, ext }),
        )
    }

    pub fn generic_function(
        db: &'db dyn salsa::Database,
        signature: GenericSignature<'db>,
        input: Type<'db>,
        result: Type<'db>,
    ) -> Self {
        Type::new(
            db,
            TypeKind::GenericFunction {
                signature,
                function: FunctionType {
                    input,
                    result,
                    ext: FunctionExt::default(),
                },
            },
        )
    }

    pub fn metatype(db: &'db dyn salsa::Database, instance: Type<'db>) -> Self {
        Type::new(db, TypeKind::Metatype(instance))
    }

    pub fn lvalue(db: &'db dyn salsa::Database, object: Type<'db>, quals: LValueQuals) -> Self {
        Type::new(db, TypeKind::LValue { object, quals })
    }

    pub fn optional(db: &'db dyn salsa::Database, object: Type<'db>) -> Self {
        Type::new(db, TypeKind::Optional(object))
    }

    pub fn array(db: &'db dyn salsa::Database, element: Type<'db>) -> Self {
        Type::new(db, TypeKind::Array(element))
    }

    pub fn nominal(db: &'db dyn salsa::Database, decl: NominalId) -> Self {
        Type::new(db, TypeKind::Nominal { decl, parent: None })
    }

    pub fn bound_generic(
        db: &'db dyn salsa::Database,
        decl: NominalId,
        parent: Option<Type<'db>>,
        args: Vec<Type<'db>>,
    ) -> Self {
        Type::new(db, TypeKind::BoundGeneric { decl, parent, args })
    }

    pub fn unbound_generic(db: &'db dyn salsa::Database, decl: NominalId) -> Self {
        Type::new(db, TypeKind::UnboundGeneric { decl, parent: None })
    }

    pub fn protocol(db: &'db dyn salsa::Database, protocol: ProtocolId) -> Self {
        Type::new(db, TypeKind::Protocol(protocol))
    }

    pub fn composition(db: &'db dyn salsa::Database, members: Vec<Type<'db>>) -> Self {
        Type::new(db, TypeKind::Composition(members))
    }

    pub fn archetype(db: &'db dyn salsa::Database, archetype: ArchetypeId) -> Self {
        Type::new(db, TypeKind::Archetype(archetype))
    }

    pub fn generic_param(db: &'db dyn salsa::Database, param: GenericParamTy) -> Self {
        Type::new(db, TypeKind::GenericParam(param))
    }

    pub fn dependent_member(
        db: &'db dyn salsa::Database,
        base: Type<'db>,
        assoc: AssocTypeId,
    ) -> Self {
        Type::new(db, TypeKind::DependentMember { base, assoc })
    }

    pub fn type_var(db: &'db dyn salsa::Database, id: TypeVarId) -> Self {
        Type::new(db, TypeKind::TypeVar(id))
    }

    pub fn paren(db: &'db dyn salsa::Database, inner: Type<'db>) -> Self {
        Type::new(db, TypeKind::Paren(inner))
    }

    pub fn alias(db: &'db dyn salsa::Database, name: Symbol, underlying: Type<'db>) -> Self {
        Type::new(db, TypeKind::NameAlias { name, underlying })
    }

    // ===== Sugar =====

    /// Strip top-level sugar.
    pub fn desugar(self, db: &'db dyn salsa::Database) -> Type<'db> {
        let mut ty = self;
        loop {
            match ty.kind(db) {
                TypeKind::Paren(inner) => ty = *inner,
                TypeKind::NameAlias { underlying, .. } => ty = *underlying,
                _ => return ty,
            }
        }
    }

    /// Strip sugar everywhere in the type.
    pub fn canonical(self, db: &'db dyn salsa::Database) -> Type<'db> {
        self.transform(db, &mut |ty| match ty.kind(db) {
            TypeKind::Paren(_) | TypeKind::NameAlias { .. } => {
                Some(ty.desugar(db).canonical(db))
            }
            _ => None,
        })
    }

    /// Type identity modulo sugar.
    pub fn is_equal(self, other: Type<'db>, db: &'db dyn salsa::Database) -> bool {
        self == other || self.canonical(db) == other.canonical(db)
    }

    // ===== Queries =====

    /// Strip a top-level lvalue.
    pub fn rvalue(self, db: &'db dyn salsa::Database) -> Type<'db> {
        match self.desugar(db).kind(db) {
            TypeKind::LValue { object, .. } => *object,
            _ => self,
        }
    }

    pub fn is_lvalue(self, db: &'db dyn salsa::Database) -> bool {
        matches!(self.desugar(db).kind(db), TypeKind::LValue { .. })
    }

    pub fn as_type_var(self, db: &'db dyn salsa::Database) -> Option<TypeVarId> {
        match self.desugar(db).kind(db) {
            TypeKind::TypeVar(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_function(self, db: &'db dyn salsa::Database) -> Option<FunctionType<'db>> {
        match self.desugar(db).kind(db) {
            TypeKind::Function(func) => Some(*func),
            _ => None,
        }
    }

    pub fn tuple_elements(self, db: &'db dyn salsa::Database) -> Option<&'db [TupleElt<'db>]> {
        match self.desugar(db).kind(db) {
            TypeKind::Tuple(elts) => Some(elts),
            _ => None,
        }
    }

    pub fn metatype_instance(self, db: &'db dyn salsa::Database) -> Option<Type<'db>> {
        match self.desugar(db).kind(db) {
            TypeKind::Metatype(instance) => Some(*instance),
            _ => None,
        }
    }

    pub fn optional_object(self, db: &'db dyn salsa::Database) -> Option<Type<'db>> {
        match self.desugar(db).kind(db) {
            TypeKind::Optional(object) => Some(*object),
            _ => None,
        }
    }

    /// The nominal declaration of a nominal or (un)bound generic type.
    pub fn nominal_decl(self, db: &'db dyn salsa::Database) -> Option<NominalId> {
        match self.desugar(db).kind(db) {
            TypeKind::Nominal { decl, .. }
            | TypeKind::BoundGeneric { decl, .. }
            | TypeKind::UnboundGeneric { decl, .. } => Some(*decl),
            _ => None,
        }
    }

    pub fn is_generic_function(self, db: &'db dyn salsa::Database) -> bool {
        matches!(self.desugar(db).kind(db), TypeKind::GenericFunction { .. })
    }

    /// The protocols of an existential type, flattening compositions.
    pub fn existential_protocols(self, db: &'db dyn salsa::Database) -> Option<SmallVec<[ProtocolId; 2]>> {
        match self.desugar(db).kind(db) {
            TypeKind::Protocol(proto) => Some(SmallVec::from_elem(*proto, 1)),
            TypeKind::Composition(members) => {
                let mut protocols = SmallVec::new();
                for member in members {
                    protocols.extend(member.existential_protocols(db)?);
                }
                Some(protocols)
            }
            _ => None,
        }
    }

    pub fn is_existential(self, db: &'db dyn salsa::Database) -> bool {
        matches!(
            self.desugar(db).kind(db),
            TypeKind::Protocol(_) | TypeKind::Composition(_)
        )
    }

    pub fn has_type_variable(self, db: &'db dyn salsa::Database) -> bool {
        self.any(db, &mut |ty| matches!(ty.kind(db), TypeKind::TypeVar(_)))
    }

    pub fn references_type_var(self, db: &'db dyn salsa::Database, var: TypeVarId) -> bool {
        self.any(db, &mut |ty| matches!(ty.kind(db), TypeKind::TypeVar(id) if *id == var))
    }

    /// Whether the type still mentions interface generic parameters.
    pub fn has_generic_params(self, db: &'db dyn salsa::Database) -> bool {
        self.any(db, &mut |ty| {
            matches!(
                ty.kind(db),
                TypeKind::GenericParam(_) | TypeKind::DependentMember { .. }
            )
        })
    }

    pub fn has_archetype(self, db: &'db dyn salsa::Database) -> bool {
        self.any(db, &mut |ty| matches!(ty.kind(db), TypeKind::Archetype(_)))
    }

    /// A tuple none of whose elements carries a label.
    pub fn is_unlabeled_tuple(self, db: &'db dyn salsa::Database) -> bool {
        self.tuple_elements(db)
            .is_some_and(|elts| elts.iter().all(|elt| elt.name.is_none()))
    }

    /// Drop every tuple label.
    pub fn unlabeled(self, db: &'db dyn salsa::Database) -> Type<'db> {
        match self.desugar(db).kind(db) {
            TypeKind::Tuple(elts) => Type::tuple(
                db,
                elts.iter()
                    .map(|elt| TupleElt {
                        name: None,
                        ..*elt
                    })
                    .collect(),
            ),
            _ => self,
        }
    }

    /// Drop default-argument markers from tuples anywhere in the type.
    pub fn without_defaults(self, db: &'db dyn salsa::Database) -> Type<'db> {
        self.transform(db, &mut |ty| match ty.kind(db) {
            TypeKind::Tuple(elts) if elts.iter().any(|elt| elt.has_default) => Some(Type::tuple(
                db,
                elts.iter()
                    .map(|elt| TupleElt {
                        has_default: false,
                        ty: elt.ty.without_defaults(db),
                        ..*elt
                    })
                    .collect(),
            )),
            _ => None,
        })
    }
}

/// Index of the element that a scalar initializes when converted to this tuple.
///
/// Fields with defaults are skipped; trailing variadic fields may stay empty.
/// When every field has a default, the first one is initialized.
pub fn scalar_init_field(elts: &[TupleElt<'_>]) -> Option<usize> {
    if elts.is_empty() {
        return None;
    }
    let mut without_default = None;
    for (i, elt) in elts.iter().enumerate() {
        if elt.has_default {
            continue;
        }
        if without_default.is_some() {
            if elt.vararg {
                continue;
            }
            return None;
        }
        without_default = Some(i);
    }
    Some(without_default.unwrap_or(0))
}

pub fn named_element_index(elts: &[TupleElt<'_>], name: Symbol) -> Option<usize> {
    elts.iter().position(|elt| elt.name == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn ids_display_as_names() {
        assert_eq!(TypeVarId(3).to_string(), "$T3");
        assert_eq!(NominalId::new(7, Symbol::new("Point")).to_string(), "Point");
    }

    #[test]
    fn interning_gives_identity() {
        let db = test_db();
        let a = Type::builtin(&db, BuiltinKind::Int64);
        let b = Type::builtin(&db, BuiltinKind::Int64);
        assert_eq!(a, b);
        let pair1 = Type::tuple_of(&db, [a, b]);
        let pair2 = Type::tuple_of(&db, [b, a]);
        assert_eq!(pair1, pair2);
    }

    #[test]
    fn sugar_is_transparent_to_equality() {
        let db = test_db();
        let int = Type::builtin(&db, BuiltinKind::Int64);
        let sugared = Type::paren(&db, Type::alias(&db, Symbol::new("Word"), int));
        assert_ne!(sugared, int);
        assert_eq!(sugared.desugar(&db), int);
        let in_tuple = Type::tuple_of(&db, [sugared]);
        assert!(in_tuple.is_equal(Type::tuple_of(&db, [int]), &db));
    }

    #[test]
    fn scalar_init_field_rules() {
        let db = test_db();
        let int = Type::builtin(&db, BuiltinKind::Int64);
        let x = Symbol::new("x");
        assert_eq!(scalar_init_field(&[TupleElt::named(x, int)]), Some(0));
        assert_eq!(
            scalar_init_field(&[TupleElt::new(int).with_default(), TupleElt::new(int)]),
            Some(1)
        );
        assert_eq!(
            scalar_init_field(&[TupleElt::new(int), TupleElt::new(int).variadic()]),
            Some(0)
        );
        assert_eq!(
            scalar_init_field(&[TupleElt::new(int), TupleElt::new(int)]),
            None
        );
        assert_eq!(
            scalar_init_field(&[
                TupleElt::new(int).with_default(),
                TupleElt::new(int).with_default()
            ]),
            Some(0)
        );
        assert_eq!(scalar_init_field(&[]), None);
    }

    #[test]
    fn qualifier_subsets() {
        assert!(LValueQuals::EXPLICIT.is_strict_subset_of(LValueQuals::IMPLICIT));
        assert!(!LValueQuals::IMPLICIT.is_strict_subset_of(LValueQuals::EXPLICIT));
        assert!(!LValueQuals::IMPLICIT.is_strict_subset_of(LValueQuals::IMPLICIT));
        assert!(LValueQuals::IMPLICIT.is_strict_subset_of(LValueQuals::IMPLICIT.non_settable()));
    }

    #[test]
    fn type_variable_occurrence() {
        let db = test_db();
        let t0 = Type::type_var(&db, TypeVarId(0));
        let t1 = Type::type_var(&db, TypeVarId(1));
        let func = Type::function(&db, Type::tuple_of(&db, [t0]), Type::optional(&db, t1));
        assert!(func.has_type_variable(&db));
        assert!(func.references_type_var(&db, TypeVarId(1)));
        assert!(!func.references_type_var(&db, TypeVarId(2)));
    }
}
