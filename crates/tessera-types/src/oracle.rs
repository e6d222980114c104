//! Collaborator interfaces consumed by the solver.
//!
//! The solver only reads declarations; it never builds them. Each trait is a
//! narrow, side-effect-free query surface so that a driver can back them with
//! whatever front end it has. [`DeclTable`](crate::DeclTable) implements all
//! three for tests and the command-line driver.

use crate::{
    ArchetypeDecl, ArchetypeId, AssocTypeDecl, AssocTypeId, Conformance, NominalDecl, NominalId,
    ProtocolDecl, ProtocolId, Symbol, Type, ValueDecl, ValueDeclId,
};

/// Read-only access to declarations.
pub trait DeclIntrospection<'db> {
    fn value_decl(&self, id: ValueDeclId) -> &ValueDecl<'db>;
    fn nominal_decl(&self, id: NominalId) -> &NominalDecl<'db>;
    fn protocol_decl(&self, id: ProtocolId) -> &ProtocolDecl<'db>;
    fn assoc_type_decl(&self, id: AssocTypeId) -> &AssocTypeDecl<'db>;
    fn archetype_decl(&self, id: ArchetypeId) -> &ArchetypeDecl<'db>;

    /// The protocol whose existential answers dynamic member lookups.
    fn dynamic_lookup_protocol(&self) -> Option<ProtocolId>;

    /// Whether `proto` is `base` or inherits from it, transitively.
    fn protocol_inherits(&self, proto: ProtocolId, base: ProtocolId) -> bool {
        if proto == base {
            return true;
        }
        self.protocol_decl(proto)
            .inherited
            .iter()
            .any(|inherited| self.protocol_inherits(*inherited, base))
    }
}

/// Name lookup into types.
///
/// Results must be a pure function of the canonical base type and the name;
/// the solver caches them.
pub trait MemberLookup<'db> {
    /// Value and type members named `name`; a metatype base looks into its
    /// instance type.
    fn lookup_member(
        &self,
        db: &'db dyn salsa::Database,
        base: Type<'db>,
        name: Symbol,
    ) -> Vec<ValueDeclId>;

    /// Type declarations named `name`, including associated types reached
    /// through conformances.
    fn lookup_member_type(
        &self,
        db: &'db dyn salsa::Database,
        base: Type<'db>,
        name: Symbol,
    ) -> Vec<ValueDeclId>;

    fn lookup_constructors(&self, db: &'db dyn salsa::Database, base: Type<'db>)
    -> Vec<ValueDeclId>;
}

/// Answer of a conformance query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConformanceAnswer<'db> {
    DoesNotConform,
    /// Conforms without a statically known witness table (archetypes,
    /// existentials).
    Abstract,
    /// A concrete conformance whose witnesses are already specialized for
    /// the queried type.
    Concrete(Conformance<'db>),
}

impl ConformanceAnswer<'_> {
    pub fn conforms(&self) -> bool {
        !matches!(self, ConformanceAnswer::DoesNotConform)
    }
}

pub trait ConformanceOracle<'db> {
    fn conforms_to(
        &self,
        db: &'db dyn salsa::Database,
        ty: Type<'db>,
        protocol: ProtocolId,
    ) -> ConformanceAnswer<'db>;

    /// The direct superclass of a class type or class-constrained archetype,
    /// specialized for the type's generic arguments.
    fn superclass_of(&self, db: &'db dyn salsa::Database, ty: Type<'db>) -> Option<Type<'db>>;
}
