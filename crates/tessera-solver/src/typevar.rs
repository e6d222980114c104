//! Type variable store.
//!
//! Variables live in an arena indexed by [`TypeVarId`]. Each record is either
//! free, points at a parent in its equivalence class, or carries a fixed
//! type. Mutations return the previous state so the solver can undo them.

use derive_more::{Display, Error};
use tessera_types::{Type, TypeKind, TypeVarId};

use crate::locator::LocatorId;

/// Option bits of a type variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TypeVarOptions {
    /// The variable may be bound to an lvalue type.
    pub can_bind_to_lvalue: bool,
    /// Ranking prefers the more specific binding for this variable.
    pub prefers_subtype_binding: bool,
}

impl TypeVarOptions {
    pub const NONE: TypeVarOptions = TypeVarOptions {
        can_bind_to_lvalue: false,
        prefers_subtype_binding: false,
    };

    pub fn lvalue_allowed(self) -> Self {
        Self {
            can_bind_to_lvalue: true,
            ..self
        }
    }

    pub fn prefers_subtype(self) -> Self {
        Self {
            prefers_subtype_binding: true,
            ..self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding<'db> {
    Free,
    /// Member of the class represented (transitively) by the parent.
    Parent(TypeVarId),
    Fixed(Type<'db>),
}

#[derive(Clone, Debug)]
struct TypeVarRecord<'db> {
    binding: Binding<'db>,
    options: TypeVarOptions,
    locator: Option<LocatorId>,
}

/// The state a variable had before a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SavedBinding<'db> {
    pub var: TypeVarId,
    pub previous: Binding<'db>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Error)]
pub enum BindingError {
    #[display("{var} is not the representative of its equivalence class")]
    NotRepresentative { var: TypeVarId },
    #[display("{var} already has a fixed type")]
    AlreadyFixed { var: TypeVarId },
    #[display("binding {var} would make its type cyclic")]
    Cyclic { var: TypeVarId },
}

#[derive(Clone, Debug, Default)]
pub struct TypeVarStore<'db> {
    vars: Vec<TypeVarRecord<'db>>,
}

impl<'db> TypeVarStore<'db> {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Allocate a fresh free variable.
    pub fn create(&mut self, options: TypeVarOptions, locator: Option<LocatorId>) -> TypeVarId {
        let id = TypeVarId(self.vars.len() as u32);
        self.vars.push(TypeVarRecord {
            binding: Binding::Free,
            options,
            locator,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeVarId> + use<'db> {
        (0..self.vars.len() as u32).map(TypeVarId)
    }

    pub fn options(&self, var: TypeVarId) -> TypeVarOptions {
        self.vars[var.index()].options
    }

    pub fn locator(&self, var: TypeVarId) -> Option<LocatorId> {
        self.vars[var.index()].locator
    }

    pub fn binding(&self, var: TypeVarId) -> Binding<'db> {
        self.vars[var.index()].binding
    }

    /// The root of the variable's equivalence class.
    pub fn representative(&self, var: TypeVarId) -> TypeVarId {
        let mut current = var;
        while let Binding::Parent(parent) = self.vars[current.index()].binding {
            current = parent;
        }
        current
    }

    pub fn is_representative(&self, var: TypeVarId) -> bool {
        !matches!(self.vars[var.index()].binding, Binding::Parent(_))
    }

    /// The fixed type of the variable's equivalence class, if any.
    pub fn fixed_type(&self, var: TypeVarId) -> Option<Type<'db>> {
        match self.vars[self.representative(var).index()].binding {
            Binding::Fixed(ty) => Some(ty),
            _ => None,
        }
    }

    /// Whether `ty`, looking through fixed bindings, mentions the class of `var`.
    pub fn occurs(&self, db: &'db dyn salsa::Database, var: TypeVarId, ty: Type<'db>) -> bool {
        let var = self.representative(var);
        ty.any(db, &mut |node| match node.kind(db) {
            TypeKind::TypeVar(id) => {
                let rep = self.representative(*id);
                rep == var || self.fixed_type(rep).is_some_and(|fixed| self.occurs(db, var, fixed))
            }
            _ => false,
        })
    }

    /// Give a free representative its fixed type.
    pub fn assign_fixed_type(
        &mut self,
        db: &'db dyn salsa::Database,
        var: TypeVarId,
        ty: Type<'db>,
    ) -> Result<SavedBinding<'db>, BindingError> {
        match self.vars[var.index()].binding {
            Binding::Parent(_) => return Err(BindingError::NotRepresentative { var }),
            Binding::Fixed(_) => return Err(BindingError::AlreadyFixed { var }),
            Binding::Free => {}
        }
        if self.occurs(db, var, ty) {
            return Err(BindingError::Cyclic { var });
        }
        Ok(self.replace(var, Binding::Fixed(ty)))
    }

    /// Union two free representatives; the lower id stays the root.
    pub fn merge(&mut self, a: TypeVarId, b: TypeVarId) -> SavedBinding<'db> {
        debug_assert!(self.is_representative(a) && self.is_representative(b));
        debug_assert_ne!(a, b);
        let (root, child) = if a < b { (a, b) } else { (b, a) };
        self.replace(child, Binding::Parent(root))
    }

    pub fn restore(&mut self, saved: SavedBinding<'db>) {
        self.vars[saved.var.index()].binding = saved.previous;
    }

    /// Drop variables created after the store had `len` of them.
    pub fn truncate(&mut self, len: usize) {
        self.vars.truncate(len);
    }

    fn replace(&mut self, var: TypeVarId, binding: Binding<'db>) -> SavedBinding<'db> {
        let previous = std::mem::replace(&mut self.vars[var.index()].binding, binding);
        SavedBinding { var, previous }
    }
}
