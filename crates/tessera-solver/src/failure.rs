//! Solver failures.
//!
//! A [`Failure`] is data: the locator it is attributed to, a classified
//! reason and the offending types. Rendering it into a user message is the
//! caller's business.

use std::fmt;

use derive_more::{Display, Error};
use tessera_types::{Symbol, Type};

use crate::locator::{LocatorId, LocatorStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    TupleSizeMismatch,
    TupleNameMismatch,
    TupleNamePositionMismatch,
    TupleVariadicMismatch,
    FunctionAutoclosureMismatch,
    FunctionNoReturnMismatch,
    TypesNotEqual,
    TypesNotTrivialSubtypes,
    TypesNotSubtypes,
    TypesNotConvertible,
    TypesNotConstructible,
    LValueQualifiers,
    /// Binding a variable would make its type contain itself.
    RecursiveType,
    DoesNotHaveMember,
    DoesNotConformToProtocol,
    IsNotArchetype,
    IsNotClass,
    IsNotDynamicLookup,
    FunctionTypesMismatch,
    CastUnresolved,
}

/// Coarse classification of failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    StructuralMismatch,
    RelationalFailure,
    MemberNotFound,
    ConstructionFailure,
    ConformanceFailure,
    CastUnresolved,
    ArchetypeOrClassPropertyFailure,
    ResourceExhausted,
}

impl FailureKind {
    pub fn category(self) -> FailureCategory {
        match self {
            FailureKind::TupleSizeMismatch
            | FailureKind::TupleNameMismatch
            | FailureKind::TupleNamePositionMismatch
            | FailureKind::TupleVariadicMismatch
            | FailureKind::FunctionAutoclosureMismatch
            | FailureKind::FunctionNoReturnMismatch
            | FailureKind::FunctionTypesMismatch
            | FailureKind::LValueQualifiers => FailureCategory::StructuralMismatch,
            FailureKind::TypesNotEqual
            | FailureKind::TypesNotTrivialSubtypes
            | FailureKind::TypesNotSubtypes
            | FailureKind::TypesNotConvertible
            | FailureKind::RecursiveType => FailureCategory::RelationalFailure,
            FailureKind::DoesNotHaveMember => FailureCategory::MemberNotFound,
            FailureKind::TypesNotConstructible => FailureCategory::ConstructionFailure,
            FailureKind::DoesNotConformToProtocol => FailureCategory::ConformanceFailure,
            FailureKind::CastUnresolved => FailureCategory::CastUnresolved,
            FailureKind::IsNotArchetype
            | FailureKind::IsNotClass
            | FailureKind::IsNotDynamicLookup => FailureCategory::ArchetypeOrClassPropertyFailure,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FailureKind::TupleSizeMismatch => "tuple size mismatch",
            FailureKind::TupleNameMismatch => "tuple element name mismatch",
            FailureKind::TupleNamePositionMismatch => "tuple element name at a different position",
            FailureKind::TupleVariadicMismatch => "tuple variadic mismatch",
            FailureKind::FunctionAutoclosureMismatch => "function auto-closure mismatch",
            FailureKind::FunctionNoReturnMismatch => "function noreturn mismatch",
            FailureKind::TypesNotEqual => "types are not equal",
            FailureKind::TypesNotTrivialSubtypes => "types are not trivial subtypes",
            FailureKind::TypesNotSubtypes => "types are not subtypes",
            FailureKind::TypesNotConvertible => "types are not convertible",
            FailureKind::TypesNotConstructible => "type is not constructible",
            FailureKind::LValueQualifiers => "lvalue qualifier mismatch",
            FailureKind::RecursiveType => "binding would create a recursive type",
            FailureKind::DoesNotHaveMember => "type does not have member",
            FailureKind::DoesNotConformToProtocol => "type does not conform to protocol",
            FailureKind::IsNotArchetype => "type is not an archetype",
            FailureKind::IsNotClass => "type is not a class",
            FailureKind::IsNotDynamicLookup => "type is not a dynamic lookup value",
            FailureKind::FunctionTypesMismatch => "function types mismatch",
            FailureKind::CastUnresolved => "checked cast cannot succeed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Failure<'db> {
    pub locator: Option<LocatorId>,
    pub kind: FailureKind,
    pub first: Type<'db>,
    pub second: Option<Type<'db>>,
    /// Member name for member failures.
    pub name: Option<Symbol>,
}

impl<'db> Failure<'db> {
    pub fn new(kind: FailureKind, first: Type<'db>, locator: Option<LocatorId>) -> Self {
        Self {
            locator,
            kind,
            first,
            second: None,
            name: None,
        }
    }

    pub fn with_second(self, second: Type<'db>) -> Self {
        Self {
            second: Some(second),
            ..self
        }
    }

    pub fn with_name(self, name: Symbol) -> Self {
        Self {
            name: Some(name),
            ..self
        }
    }

    pub fn display<'a>(
        &'a self,
        db: &'db dyn salsa::Database,
        locators: Option<&'a LocatorStore>,
    ) -> FailureDisplay<'a, 'db> {
        FailureDisplay {
            db,
            failure: self,
            locators,
        }
    }
}

pub struct FailureDisplay<'a, 'db> {
    db: &'db dyn salsa::Database,
    failure: &'a Failure<'db>,
    locators: Option<&'a LocatorStore>,
}

impl fmt::Display for FailureDisplay<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failure = self.failure;
        write!(f, "{}: {}", failure.kind.describe(), failure.first.display(self.db))?;
        if let Some(name) = failure.name {
            write!(f, ".{name}")?;
        }
        if let Some(second) = failure.second {
            write!(f, ", {}", second.display(self.db))?;
        }
        if let (Some(locators), Some(locator)) = (self.locators, failure.locator) {
            write!(f, " at {}", locators.get(locator))?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ResourceLimit {
    #[display("depth")]
    Depth,
    #[display("steps")]
    Steps,
}

/// Why `solve` produced no solutions.
#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum SolveError<'db> {
    #[display("no solution")]
    NoSolution {
        failure: Option<Failure<'db>>,
    },
    #[display("solver exceeded its {limit} limit ({reached})")]
    ResourceExhausted {
        limit: ResourceLimit,
        reached: usize,
    },
}

impl<'db> SolveError<'db> {
    pub fn failure(&self) -> Option<&Failure<'db>> {
        match self {
            SolveError::NoSolution { failure } => failure.as_ref(),
            SolveError::ResourceExhausted { .. } => None,
        }
    }

    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            SolveError::NoSolution { failure } => failure.map(|f| f.kind.category()),
            SolveError::ResourceExhausted { .. } => Some(FailureCategory::ResourceExhausted),
        }
    }
}

/// A failure together with whether it happened inside a search branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FailureRecord<'db> {
    pub failure: Failure<'db>,
    pub in_branch: bool,
}

/// Append-only log of recorded failures.
#[derive(Clone, Debug, Default)]
pub(crate) struct FailureLog<'db> {
    records: Vec<FailureRecord<'db>>,
}

impl<'db> FailureLog<'db> {
    pub fn record(&mut self, failure: Failure<'db>, in_branch: bool) {
        self.records.push(FailureRecord { failure, in_branch });
    }

    /// The first failure outside any branch. Failures inside a branch only
    /// eliminate that branch.
    pub fn first(&self) -> Option<Failure<'db>> {
        self.records
            .iter()
            .find(|r| !r.in_branch)
            .map(|r| r.failure)
    }

    pub fn all(&self) -> impl Iterator<Item = &Failure<'db>> {
        self.records.iter().map(|r| &r.failure)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
