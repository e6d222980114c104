//! Overload choices.

use std::fmt;

use tessera_types::{DeclIntrospection, Type, ValueDeclId};

/// One candidate of an overload set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverloadChoice<'db> {
    /// A value declaration, referenced directly or as a member of `base`.
    Decl {
        base: Option<Type<'db>>,
        decl: ValueDeclId,
    },
    /// A member found through dynamic lookup on `base`.
    DeclViaDynamic { base: Type<'db>, decl: ValueDeclId },
    /// A type declaration.
    TypeDecl {
        base: Option<Type<'db>>,
        decl: ValueDeclId,
    },
    /// The base type itself (the implicit `.self` of a member access).
    BaseType { base: Type<'db> },
    /// A tuple element, by position.
    TupleIndex { base: Type<'db>, index: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverloadChoiceKind {
    Decl,
    DeclViaDynamic,
    TypeDecl,
    BaseType,
    TupleIndex,
}

impl<'db> OverloadChoice<'db> {
    /// A reference to `decl`, as a type-declaration choice when it is one.
    pub fn decl(
        decls: &dyn DeclIntrospection<'db>,
        base: Option<Type<'db>>,
        decl: ValueDeclId,
    ) -> Self {
        if decls.value_decl(decl).kind.is_type_decl() {
            OverloadChoice::TypeDecl { base, decl }
        } else {
            OverloadChoice::Decl { base, decl }
        }
    }

    pub fn kind(&self) -> OverloadChoiceKind {
        match self {
            OverloadChoice::Decl { .. } => OverloadChoiceKind::Decl,
            OverloadChoice::DeclViaDynamic { .. } => OverloadChoiceKind::DeclViaDynamic,
            OverloadChoice::TypeDecl { .. } => OverloadChoiceKind::TypeDecl,
            OverloadChoice::BaseType { .. } => OverloadChoiceKind::BaseType,
            OverloadChoice::TupleIndex { .. } => OverloadChoiceKind::TupleIndex,
        }
    }

    pub fn base_type(&self) -> Option<Type<'db>> {
        match self {
            OverloadChoice::Decl { base, .. } | OverloadChoice::TypeDecl { base, .. } => *base,
            OverloadChoice::DeclViaDynamic { base, .. }
            | OverloadChoice::BaseType { base }
            | OverloadChoice::TupleIndex { base, .. } => Some(*base),
        }
    }

    pub fn decl_id(&self) -> Option<ValueDeclId> {
        match self {
            OverloadChoice::Decl { decl, .. }
            | OverloadChoice::DeclViaDynamic { decl, .. }
            | OverloadChoice::TypeDecl { decl, .. } => Some(*decl),
            OverloadChoice::BaseType { .. } | OverloadChoice::TupleIndex { .. } => None,
        }
    }

    pub fn display(&self, db: &'db dyn salsa::Database) -> OverloadChoiceDisplay<'_, 'db> {
        OverloadChoiceDisplay { db, choice: self }
    }
}

pub struct OverloadChoiceDisplay<'a, 'db> {
    db: &'db dyn salsa::Database,
    choice: &'a OverloadChoice<'db>,
}

impl fmt::Display for OverloadChoiceDisplay<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.choice {
            OverloadChoice::Decl { base, decl } | OverloadChoice::TypeDecl { base, decl } => {
                if let Some(base) = base {
                    write!(f, "{}.", base.rvalue(self.db).display(self.db))?;
                }
                write!(f, "{decl}")
            }
            OverloadChoice::DeclViaDynamic { base, decl } => {
                write!(f, "{}.{decl} (dynamic)", base.rvalue(self.db).display(self.db))
            }
            OverloadChoice::BaseType { base } => write!(f, "base type {}", base.display(self.db)),
            OverloadChoice::TupleIndex { base, index } => {
                write!(f, "tuple {} index {index}", base.display(self.db))
            }
        }
    }
}
