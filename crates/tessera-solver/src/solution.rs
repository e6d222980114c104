//! Solutions.
//!
//! A [`Solution`] is a snapshot taken when the search reaches a state with
//! no active constraints. It no longer refers to the constraint system that
//! produced it, apart from the locator ids used as keys.

use std::collections::BTreeMap;

use tessera_types::{Type, TypeKind, TypeVarId};

use crate::choice::OverloadChoice;
use crate::locator::LocatorId;
use crate::system::{ConstraintSystem, RecordedRestriction};

/// The choice made for one overload set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectedOverload<'db> {
    pub choice: OverloadChoice<'db>,
    /// Type of the full declaration reference, including a curried `self`.
    pub opened_full_type: Option<Type<'db>>,
    /// The type the overload's bound type was equated with.
    pub implied: Type<'db>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution<'db> {
    pub(crate) type_bindings: BTreeMap<TypeVarId, Type<'db>>,
    pub(crate) overload_choices: BTreeMap<LocatorId, SelectedOverload<'db>>,
    pub(crate) restrictions: Vec<RecordedRestriction<'db>>,
    pub(crate) fixed_score: u32,
    /// Variables below this index were created before the search began.
    pub(crate) shared_type_vars: usize,
}

impl<'db> Solution<'db> {
    /// Final type of every type variable. A variable left free maps to
    /// its representative.
    pub fn type_bindings(&self) -> &BTreeMap<TypeVarId, Type<'db>> {
        &self.type_bindings
    }

    pub fn binding(&self, var: TypeVarId) -> Option<Type<'db>> {
        self.type_bindings.get(&var).copied()
    }

    pub fn overload_choices(&self) -> &BTreeMap<LocatorId, SelectedOverload<'db>> {
        &self.overload_choices
    }

    pub fn overload_choice(&self, locator: LocatorId) -> Option<&SelectedOverload<'db>> {
        self.overload_choices.get(&locator)
    }

    pub fn restrictions(&self) -> &[RecordedRestriction<'db>] {
        &self.restrictions
    }

    pub fn fixed_score(&self) -> u32 {
        self.fixed_score
    }

    /// Whether `var` existed before the search that produced this solution
    /// began branching.
    pub fn is_shared_type_var(&self, var: TypeVarId) -> bool {
        (var.0 as usize) < self.shared_type_vars
    }

    /// Replace every type variable in `ty` by its final binding.
    pub fn simplify_type(&self, db: &'db dyn salsa::Database, ty: Type<'db>) -> Type<'db> {
        ty.transform(db, &mut |node| match node.kind(db) {
            TypeKind::TypeVar(var) => self.type_bindings.get(var).copied(),
            _ => None,
        })
    }
}

impl<'a, 'db> ConstraintSystem<'a, 'db> {
    /// Snapshot the current bindings and overload choices.
    pub(crate) fn finalize_solution(&self) -> Solution<'db> {
        let db = self.db();
        let type_bindings = self
            .type_vars
            .ids()
            .map(|var| (var, self.simplify_type(Type::type_var(db, var))))
            .collect();

        // Overload sets without a locator cannot be told apart across
        // solutions, so only located ones are kept.
        let overload_choices = self
            .resolved_overloads()
            .iter()
            .filter_map(|resolved| {
                let locator = resolved.locator?;
                let selected = SelectedOverload {
                    choice: resolved.choice,
                    opened_full_type: resolved.opened_full_type.map(|ty| self.simplify_type(ty)),
                    implied: self.simplify_type(resolved.implied),
                };
                Some((locator, selected))
            })
            .collect();

        let restrictions = self
            .restrictions()
            .iter()
            .map(|recorded| RecordedRestriction {
                from: self.simplify_type(recorded.from),
                to: self.simplify_type(recorded.to),
                restriction: recorded.restriction,
            })
            .collect();

        Solution {
            type_bindings,
            overload_choices,
            restrictions,
            fixed_score: self.fixed_score(),
            shared_type_vars: self
                .solver_state
                .as_ref()
                .map_or(self.type_vars.len(), |state| state.shared_type_vars),
        }
    }
}
