//! Type algebra and declaration model shared by the tessera solver and its
//! drivers.
//!
//! - [`Type`] / [`TypeKind`]: interned types, including type variables and
//!   the interface-only generic forms that opening removes.
//! - [`decl`]: declarations the solver reasons about, addressed by small ids.
//! - [`oracle`]: the lookup, introspection and conformance interfaces the
//!   solver consumes.
//! - [`DeclTable`]: an in-memory implementation of those interfaces.

pub mod decl;
pub mod oracle;
mod print;
mod symbol;
mod table;
mod transform;
mod types;

pub use decl::{
    ArchetypeDecl, ArchetypeId, AssocTypeDecl, AssocTypeId, Conformance, DeclAttrs, DeclContext,
    GenericParamDecl, GenericParamTy, GenericSignature, ModuleId, NominalDecl, NominalId,
    NominalKind, ProtocolDecl, ProtocolId, Requirement, ValueDecl, ValueDeclId, ValueDeclKind,
};
pub use oracle::{ConformanceAnswer, ConformanceOracle, DeclIntrospection, MemberLookup};
pub use print::TypeDisplay;
pub use symbol::{CONVERSION, INIT, SELF, Symbol};
pub use table::DeclTable;
pub use types::{
    BuiltinKind, FunctionExt, FunctionType, LValueQuals, TupleElt, Type, TypeKind, TypeVarId,
    named_element_index, scalar_init_field,
};
