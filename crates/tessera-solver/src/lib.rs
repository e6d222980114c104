//! Constraint-based type inference and overload resolution.
//!
//! A caller builds one [`ConstraintSystem`] per checked expression, adds
//! constraints over fresh type variables, and calls
//! [`ConstraintSystem::solve`]. Every solution found is returned; ranking
//! ([`ConstraintSystem::find_best_solution`]) then picks the unique best one
//! or reports the system as ambiguous.
//!
//! ## Layout
//!
//! - [`typevar`], [`locator`], [`constraint`]: the stores a system owns.
//! - `matching`, `simplify`: the per-constraint rewriting engine.
//! - [`generics`], `overload`: opening generic declarations and binding
//!   overload choices.
//! - `solver`, [`solution`], [`ranking`]: search and selection.

// === Stores ===
pub mod choice;
pub mod config;
pub mod constraint;
pub mod failure;
pub mod locator;
pub mod typevar;

// === Engine ===
pub mod generics;
mod matching;
mod overload;
mod simplify;
mod system;
pub mod tuple_shuffle;

// === Search and selection ===
mod dump;
pub mod ranking;
pub mod relations;
pub mod solution;
mod solver;

// Re-exports
pub use choice::{OverloadChoice, OverloadChoiceKind};
pub use config::SolverConfig;
pub use constraint::{
    Constraint, ConstraintKind, ConversionRestriction, MatchKind, SolutionKind, TypeProperty,
};
pub use dump::{SolutionDump, SystemDump};
pub use failure::{Failure, FailureCategory, FailureKind, ResourceLimit, SolveError};
pub use generics::{AssociatedTypeBinding, DependentTypeOpener, FreeOpener, OpenedGenerics};
pub use locator::{Anchor, Locator, LocatorBuilder, LocatorId, LocatorStore, PathElement};
pub use overload::{DeclReference, adjust_lvalue_for_reference};
pub use ranking::{
    OverloadDiff, SolutionCompareResult, SolutionDiff, TypeBindingDiff, is_decl_as_specialized_as,
};
pub use relations::{
    CheckedCastKind, classify_checked_cast, is_convertible_to, is_subtype_of,
    is_substitutable_for, is_trivial_subtype_of,
};
pub use solution::{SelectedOverload, Solution};
pub use solver::FreeTypeVariableBinding;
pub use system::{ConstraintSystem, RecordedRestriction, ResolvedOverload, SolverContext};
pub use typevar::TypeVarOptions;
