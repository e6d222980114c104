//! Declarations referenced by types and overload choices.
//!
//! The solver never owns declarations; it reads them through
//! [`DeclIntrospection`](crate::DeclIntrospection). Every declaration is named by a
//! small copyable id that also carries its source name, so types can be printed
//! without a lookup.

use crate::{Symbol, Type};

macro_rules! decl_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display, salsa::Update)]
        #[display("{name}")]
        pub struct $name {
            index: u32,
            name: Symbol,
        }

        impl $name {
            pub fn new(index: u32, name: Symbol) -> Self {
                Self { index, name }
            }

            pub fn index(self) -> u32 {
                self.index
            }

            pub fn name(self) -> Symbol {
                self.name
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", self.name, self.index)
            }
        }
    };
}

decl_id!(
    /// A struct, class, or enum declaration.
    NominalId
);
decl_id!(
    /// A protocol declaration.
    ProtocolId
);
decl_id!(
    /// An associated type requirement of a protocol.
    AssocTypeId
);
decl_id!(
    /// An opaque generic placeholder bound to one generic context.
    ArchetypeId
);
decl_id!(
    /// Any named value or type declaration that lookup can return.
    ValueDeclId
);
decl_id!(
    /// A module.
    ModuleId
);

/// A generic parameter in interface types, addressed by depth and index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, salsa::Update)]
pub struct GenericParamTy {
    pub depth: u32,
    pub index: u32,
    pub name: Symbol,
}

impl GenericParamTy {
    pub fn new(depth: u32, index: u32, name: Symbol) -> Self {
        Self { depth, index, name }
    }

    /// The `(depth, index)` pair that identifies the parameter regardless of
    /// its spelling.
    pub fn key(self) -> (u32, u32) {
        (self.depth, self.index)
    }
}

/// A generic parameter together with the archetype it maps to inside its
/// own generic context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, salsa::Update)]
pub struct GenericParamDecl {
    pub param: GenericParamTy,
    pub archetype: ArchetypeId,
}

/// A requirement of a generic signature, written over interface types.
#[derive(Clone, Debug, PartialEq, Eq, Hash, salsa::Update)]
pub enum Requirement<'db> {
    Conformance {
        subject: Type<'db>,
        protocol: ProtocolId,
    },
    Superclass {
        subject: Type<'db>,
        superclass: Type<'db>,
    },
    SameType {
        first: Type<'db>,
        second: Type<'db>,
    },
}

/// Generic parameters and requirements of a declaration or generic function type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, salsa::Update)]
pub struct GenericSignature<'db> {
    pub params: Vec<GenericParamDecl>,
    pub requirements: Vec<Requirement<'db>>,
}

impl<'db> GenericSignature<'db> {
    pub fn new(params: Vec<GenericParamDecl>, requirements: Vec<Requirement<'db>>) -> Self {
        Self {
            params,
            requirements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NominalKind {
    Struct,
    Class,
    Enum,
}

/// Where a value declaration lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclContext {
    Module(ModuleId),
    Nominal(NominalId),
    Protocol(ProtocolId),
}

impl DeclContext {
    pub fn is_type_context(self) -> bool {
        !matches!(self, DeclContext::Module(_))
    }
}

/// A protocol conformance of a concrete type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conformance<'db> {
    pub protocol: ProtocolId,
    /// Type witnesses for the protocol's associated types.
    pub type_witnesses: Vec<(AssocTypeId, Type<'db>)>,
    /// Value witnesses: requirement declaration to witness declaration.
    pub value_witnesses: Vec<(ValueDeclId, ValueDeclId)>,
}

impl<'db> Conformance<'db> {
    pub fn new(protocol: ProtocolId) -> Self {
        Self {
            protocol,
            type_witnesses: Vec::new(),
            value_witnesses: Vec::new(),
        }
    }

    pub fn type_witness(&self, assoc: AssocTypeId) -> Option<Type<'db>> {
        self.type_witnesses
            .iter()
            .find(|(a, _)| *a == assoc)
            .map(|(_, ty)| *ty)
    }

    pub fn value_witness(&self, requirement: ValueDeclId) -> Option<ValueDeclId> {
        self.value_witnesses
            .iter()
            .find(|(req, _)| *req == requirement)
            .map(|(_, witness)| *witness)
    }
}

#[derive(Clone, Debug)]
pub struct NominalDecl<'db> {
    pub id: NominalId,
    pub kind: NominalKind,
    pub generics: Option<GenericSignature<'db>>,
    /// Superclass, written over this declaration's generic parameters.
    pub superclass: Option<Type<'db>>,
    pub conformances: Vec<Conformance<'db>>,
}

impl<'db> NominalDecl<'db> {
    pub fn is_class(&self) -> bool {
        self.kind == NominalKind::Class
    }

    /// The type of `self` inside the declaration: the nominal applied to its
    /// own generic parameters.
    pub fn declared_interface_type(&self, db: &'db dyn salsa::Database) -> Type<'db> {
        match &self.generics {
            Some(generics) => {
                let args = generics
                    .params
                    .iter()
                    .map(|gp| Type::generic_param(db, gp.param))
                    .collect();
                Type::bound_generic(db, self.id, None, args)
            }
            None => Type::nominal(db, self.id),
        }
    }

    /// The type of `self` inside the declaration's own generic context.
    pub fn declared_type_in_context(&self, db: &'db dyn salsa::Database) -> Type<'db> {
        match &self.generics {
            Some(generics) => {
                let args = generics
                    .params
                    .iter()
                    .map(|gp| Type::archetype(db, gp.archetype))
                    .collect();
                Type::bound_generic(db, self.id, None, args)
            }
            None => Type::nominal(db, self.id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProtocolDecl<'db> {
    pub id: ProtocolId,
    pub inherited: Vec<ProtocolId>,
    /// Only classes may conform.
    pub class_bound: bool,
    /// Values of this protocol's existential type answer any `@objc` member.
    pub dynamic_lookup: bool,
    /// The implicit `Self` parameter and its archetype.
    pub self_param: GenericParamDecl,
    pub assoc_types: Vec<AssocTypeId>,
    /// Type a literal of this protocol defaults to when nothing else fixes it.
    pub literal_default: Option<Type<'db>>,
}

impl<'db> ProtocolDecl<'db> {
    /// The generic signature of members of this protocol: `<Self: P>`.
    pub fn generic_signature(&self, db: &'db dyn salsa::Database) -> GenericSignature<'db> {
        GenericSignature::new(
            vec![self.self_param],
            vec![Requirement::Conformance {
                subject: Type::generic_param(db, self.self_param.param),
                protocol: self.id,
            }],
        )
    }
}

#[derive(Clone, Debug)]
pub struct AssocTypeDecl<'db> {
    pub id: AssocTypeId,
    pub protocol: ProtocolId,
    pub conforms_to: Vec<ProtocolId>,
    pub superclass: Option<Type<'db>>,
}

#[derive(Clone, Debug)]
pub struct ArchetypeDecl<'db> {
    pub id: ArchetypeId,
    pub conforms_to: Vec<ProtocolId>,
    pub superclass: Option<Type<'db>>,
    pub requires_class: bool,
    /// Archetypes standing for associated types of this one.
    pub nested: Vec<(AssocTypeId, ArchetypeId)>,
    /// The protocol whose `Self` this archetype is, if any.
    pub self_of: Option<ProtocolId>,
}

impl ArchetypeDecl<'_> {
    pub fn nested_archetype(&self, assoc: AssocTypeId) -> Option<ArchetypeId> {
        self.nested
            .iter()
            .find(|(a, _)| *a == assoc)
            .map(|(_, arch)| *arch)
    }

    pub fn nested_by_name(&self, name: Symbol) -> Option<ArchetypeId> {
        self.nested
            .iter()
            .find(|(a, _)| a.name() == name)
            .map(|(_, arch)| *arch)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueDeclKind {
    Func,
    Var,
    Subscript,
    Constructor,
    EnumElement,
    /// A nominal type declaration; its interface type is the declared type.
    Nominal(NominalId),
    /// A type alias; its interface type is the aliased type.
    TypeAlias,
    /// An associated type requirement.
    AssociatedType(AssocTypeId),
}

impl ValueDeclKind {
    pub fn is_type_decl(self) -> bool {
        matches!(
            self,
            ValueDeclKind::Nominal(_) | ValueDeclKind::TypeAlias | ValueDeclKind::AssociatedType(_)
        )
    }

    pub fn is_function_like(self) -> bool {
        matches!(
            self,
            ValueDeclKind::Func | ValueDeclKind::Constructor | ValueDeclKind::EnumElement
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DeclAttrs {
    /// Assignment operator: the first parameter is implicitly `inout`.
    pub assignment: bool,
    /// A user-defined conversion function.
    pub conversion: bool,
    /// An optional protocol requirement.
    pub optional: bool,
    /// Visible through dynamic lookup.
    pub objc: bool,
    /// Imported from a foreign module.
    pub imported: bool,
}

/// A value or type declaration as the solver sees it.
///
/// Members of a type context carry their interface type without the implicit
/// `self` parameter; references to them add it while opening. Generic
/// functions use a [`TypeKind::GenericFunction`](crate::TypeKind::GenericFunction)
/// interface type whose parameters sit one level deeper than those of the
/// enclosing context.
#[derive(Clone, Debug)]
pub struct ValueDecl<'db> {
    pub id: ValueDeclId,
    pub kind: ValueDeclKind,
    pub context: DeclContext,
    pub interface_type: Type<'db>,
    pub is_static: bool,
    /// Has a setter; meaningful for variables and subscripts.
    pub settable: bool,
    pub attrs: DeclAttrs,
}

impl<'db> ValueDecl<'db> {
    pub fn name(&self) -> Symbol {
        self.id.name()
    }

    pub fn is_generic(&self, db: &'db dyn salsa::Database) -> bool {
        self.interface_type.is_generic_function(db)
    }

    /// Whether the declaration needs an instance of its context to be
    /// referenced, as opposed to static members, type declarations,
    /// constructors, and enum elements.
    pub fn is_instance_member(&self) -> bool {
        self.context.is_type_context()
            && !self.is_static
            && !self.kind.is_type_decl()
            && !matches!(
                self.kind,
                ValueDeclKind::Constructor | ValueDeclKind::EnumElement
            )
    }
}
