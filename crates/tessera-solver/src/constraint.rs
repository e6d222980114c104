//! Constraint representation.
//!
//! A constraint is a tagged variant carrying its operands and the locator it
//! is attributed to. Conjunctions and disjunctions own their nested
//! constraints.

use std::collections::BTreeMap;
use std::fmt;

use tessera_types::{ProtocolId, Symbol, Type};

use crate::choice::OverloadChoice;
use crate::locator::{LocatorId, LocatorStore};

/// Strictness of a relational match, from most to least strict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    /// Exact binding; lvalue-ness is significant.
    Bind,
    SameType,
    TrivialSubtype,
    Subtype,
    Conversion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Bind,
    Equal,
    TrivialSubtype,
    Subtype,
    Conversion,
    Construction,
    ApplicableFunction,
    BindOverload,
    ConformsTo,
    SelfObjectOfProtocol,
    CheckedCast,
    ValueMember,
    TypeMember,
    Archetype,
    Class,
    DynamicLookupValue,
    Conjunction,
    Disjunction,
}

impl From<MatchKind> for ConstraintKind {
    fn from(kind: MatchKind) -> Self {
        match kind {
            MatchKind::Bind => ConstraintKind::Bind,
            MatchKind::SameType => ConstraintKind::Equal,
            MatchKind::TrivialSubtype => ConstraintKind::TrivialSubtype,
            MatchKind::Subtype => ConstraintKind::Subtype,
            MatchKind::Conversion => ConstraintKind::Conversion,
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            MatchKind::Bind => ":=",
            MatchKind::SameType => "==",
            MatchKind::TrivialSubtype => "<t",
            MatchKind::Subtype => "<",
            MatchKind::Conversion => "<c",
        };
        write!(f, "{symbol}")
    }
}

/// The structural path a conversion took.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConversionRestriction {
    TupleToTuple,
    ScalarToTuple,
    TupleToScalar,
    DeepEquality,
    Superclass,
    LValueToRValue,
    Existential,
    ValueToOptional,
    OptionalToOptional,
    User,
}

impl fmt::Display for ConversionRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionRestriction::TupleToTuple => "tuple-to-tuple",
            ConversionRestriction::ScalarToTuple => "scalar-to-tuple",
            ConversionRestriction::TupleToScalar => "tuple-to-scalar",
            ConversionRestriction::DeepEquality => "deep equality",
            ConversionRestriction::Superclass => "superclass",
            ConversionRestriction::LValueToRValue => "lvalue-to-rvalue",
            ConversionRestriction::Existential => "existential",
            ConversionRestriction::ValueToOptional => "value-to-optional",
            ConversionRestriction::OptionalToOptional => "optional-to-optional",
            ConversionRestriction::User => "user conversion",
        };
        write!(f, "{name}")
    }
}

/// Outcome of simplifying a constraint or matching two types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolutionKind {
    Solved,
    /// Not enough is known yet; try again after more variables are bound.
    Unsolved,
    Error,
}

/// Flags threaded through the matcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MatchFlags {
    /// Deferred sub-problems may be added as new constraints.
    pub generate_constraints: bool,
}

impl MatchFlags {
    pub const NONE: MatchFlags = MatchFlags {
        generate_constraints: false,
    };

    pub fn with_generate_constraints(self) -> Self {
        Self {
            generate_constraints: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConformanceKind {
    ConformsTo,
    /// The type is the `Self` of the protocol, or an existential containing it.
    SelfObjectOf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Value,
    Type,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeProperty {
    Archetype,
    Class,
    DynamicLookupValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Constraint<'db> {
    Relational {
        kind: MatchKind,
        first: Type<'db>,
        second: Type<'db>,
        /// Set once the structural path is known, so it is not re-derived.
        restriction: Option<ConversionRestriction>,
        locator: Option<LocatorId>,
    },
    /// `value` can be constructed from `argument`.
    Construction {
        argument: Type<'db>,
        value: Type<'db>,
        locator: Option<LocatorId>,
    },
    /// `function` (`$Arg -> $Result`) describes an application of `callee`.
    ApplicableFunction {
        function: Type<'db>,
        callee: Type<'db>,
        locator: Option<LocatorId>,
    },
    BindOverload {
        bound: Type<'db>,
        choice: OverloadChoice<'db>,
        locator: Option<LocatorId>,
    },
    Conformance {
        kind: ConformanceKind,
        ty: Type<'db>,
        protocol: ProtocolId,
        locator: Option<LocatorId>,
    },
    CheckedCast {
        from: Type<'db>,
        to: Type<'db>,
        locator: Option<LocatorId>,
    },
    Member {
        kind: MemberKind,
        base: Type<'db>,
        name: Symbol,
        member: Type<'db>,
        locator: Option<LocatorId>,
    },
    TypeProperty {
        property: TypeProperty,
        ty: Type<'db>,
        locator: Option<LocatorId>,
    },
    Conjunction {
        nested: Vec<Constraint<'db>>,
        locator: Option<LocatorId>,
    },
    Disjunction {
        alternatives: Vec<Constraint<'db>>,
        locator: Option<LocatorId>,
    },
}

impl<'db> Constraint<'db> {
    pub fn relational(
        kind: MatchKind,
        first: Type<'db>,
        second: Type<'db>,
        locator: Option<LocatorId>,
    ) -> Self {
        Constraint::Relational {
            kind,
            first,
            second,
            restriction: None,
            locator,
        }
    }

    pub fn restricted(
        kind: MatchKind,
        first: Type<'db>,
        second: Type<'db>,
        restriction: ConversionRestriction,
        locator: Option<LocatorId>,
    ) -> Self {
        Constraint::Relational {
            kind,
            first,
            second,
            restriction: Some(restriction),
            locator,
        }
    }

    pub fn bind_overload(
        bound: Type<'db>,
        choice: OverloadChoice<'db>,
        locator: Option<LocatorId>,
    ) -> Self {
        Constraint::BindOverload {
            bound,
            choice,
            locator,
        }
    }

    pub fn construction(argument: Type<'db>, value: Type<'db>, locator: Option<LocatorId>) -> Self {
        Constraint::Construction {
            argument,
            value,
            locator,
        }
    }

    pub fn applicable_function(
        function: Type<'db>,
        callee: Type<'db>,
        locator: Option<LocatorId>,
    ) -> Self {
        Constraint::ApplicableFunction {
            function,
            callee,
            locator,
        }
    }

    pub fn conforms_to(ty: Type<'db>, protocol: ProtocolId, locator: Option<LocatorId>) -> Self {
        Constraint::Conformance {
            kind: ConformanceKind::ConformsTo,
            ty,
            protocol,
            locator,
        }
    }

    pub fn self_object_of(ty: Type<'db>, protocol: ProtocolId, locator: Option<LocatorId>) -> Self {
        Constraint::Conformance {
            kind: ConformanceKind::SelfObjectOf,
            ty,
            protocol,
            locator,
        }
    }

    pub fn checked_cast(from: Type<'db>, to: Type<'db>, locator: Option<LocatorId>) -> Self {
        Constraint::CheckedCast { from, to, locator }
    }

    pub fn value_member(
        base: Type<'db>,
        name: Symbol,
        member: Type<'db>,
        locator: Option<LocatorId>,
    ) -> Self {
        Constraint::Member {
            kind: MemberKind::Value,
            base,
            name,
            member,
            locator,
        }
    }

    pub fn type_member(
        base: Type<'db>,
        name: Symbol,
        member: Type<'db>,
        locator: Option<LocatorId>,
    ) -> Self {
        Constraint::Member {
            kind: MemberKind::Type,
            base,
            name,
            member,
            locator,
        }
    }

    pub fn type_property(property: TypeProperty, ty: Type<'db>, locator: Option<LocatorId>) -> Self {
        Constraint::TypeProperty {
            property,
            ty,
            locator,
        }
    }

    pub fn conjunction(nested: Vec<Constraint<'db>>, locator: Option<LocatorId>) -> Self {
        Constraint::Conjunction { nested, locator }
    }

    pub fn disjunction(alternatives: Vec<Constraint<'db>>, locator: Option<LocatorId>) -> Self {
        Constraint::Disjunction {
            alternatives,
            locator,
        }
    }

    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::Relational { kind, .. } => (*kind).into(),
            Constraint::Construction { .. } => ConstraintKind::Construction,
            Constraint::ApplicableFunction { .. } => ConstraintKind::ApplicableFunction,
            Constraint::BindOverload { .. } => ConstraintKind::BindOverload,
            Constraint::Conformance {
                kind: ConformanceKind::ConformsTo,
                ..
            } => ConstraintKind::ConformsTo,
            Constraint::Conformance {
                kind: ConformanceKind::SelfObjectOf,
                ..
            } => ConstraintKind::SelfObjectOfProtocol,
            Constraint::CheckedCast { .. } => ConstraintKind::CheckedCast,
            Constraint::Member {
                kind: MemberKind::Value,
                ..
            } => ConstraintKind::ValueMember,
            Constraint::Member {
                kind: MemberKind::Type,
                ..
            } => ConstraintKind::TypeMember,
            Constraint::TypeProperty { property, .. } => match property {
                TypeProperty::Archetype => ConstraintKind::Archetype,
                TypeProperty::Class => ConstraintKind::Class,
                TypeProperty::DynamicLookupValue => ConstraintKind::DynamicLookupValue,
            },
            Constraint::Conjunction { .. } => ConstraintKind::Conjunction,
            Constraint::Disjunction { .. } => ConstraintKind::Disjunction,
        }
    }

    pub fn locator(&self) -> Option<LocatorId> {
        match self {
            Constraint::Relational { locator, .. }
            | Constraint::Construction { locator, .. }
            | Constraint::ApplicableFunction { locator, .. }
            | Constraint::BindOverload { locator, .. }
            | Constraint::Conformance { locator, .. }
            | Constraint::CheckedCast { locator, .. }
            | Constraint::Member { locator, .. }
            | Constraint::TypeProperty { locator, .. }
            | Constraint::Conjunction { locator, .. }
            | Constraint::Disjunction { locator, .. } => *locator,
        }
    }

    pub fn is_disjunction(&self) -> bool {
        matches!(self, Constraint::Disjunction { .. })
    }

    pub fn display<'a>(&'a self, db: &'db dyn salsa::Database) -> ConstraintDisplay<'a, 'db> {
        ConstraintDisplay {
            db,
            constraint: self,
            locators: None,
            indent: 0,
        }
    }

    /// Display including the printed locator of each constraint.
    pub fn display_with_locators<'a>(
        &'a self,
        db: &'db dyn salsa::Database,
        locators: &'a LocatorStore,
    ) -> ConstraintDisplay<'a, 'db> {
        ConstraintDisplay {
            db,
            constraint: self,
            locators: Some(locators),
            indent: 0,
        }
    }
}

pub struct ConstraintDisplay<'a, 'db> {
    db: &'db dyn salsa::Database,
    constraint: &'a Constraint<'db>,
    locators: Option<&'a LocatorStore>,
    indent: usize,
}

impl ConstraintDisplay<'_, '_> {
    /// Indentation of the lines of nested constraints.
    pub fn indented(self, indent: usize) -> Self {
        Self { indent, ..self }
    }
}

impl fmt::Display for ConstraintDisplay<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let db = self.db;
        match self.constraint {
            Constraint::Relational {
                kind,
                first,
                second,
                restriction,
                ..
            } => {
                write!(f, "{} {kind} {}", first.display(db), second.display(db))?;
                if let Some(restriction) = restriction {
                    write!(f, " [[{restriction}]]")?;
                }
            }
            Constraint::Construction {
                argument, value, ..
            } => write!(f, "{} <C {}", argument.display(db), value.display(db))?,
            Constraint::ApplicableFunction {
                function, callee, ..
            } => write!(f, "{} ==Fn {}", function.display(db), callee.display(db))?,
            Constraint::BindOverload { bound, choice, .. } => write!(
                f,
                "{} bound to {}",
                bound.display(db),
                choice.display(db)
            )?,
            Constraint::Conformance {
                kind, ty, protocol, ..
            } => match kind {
                ConformanceKind::ConformsTo => {
                    write!(f, "{} conforms to {protocol}", ty.display(db))?
                }
                ConformanceKind::SelfObjectOf => {
                    write!(f, "{} Self type of {protocol}", ty.display(db))?
                }
            },
            Constraint::CheckedCast { from, to, .. } => {
                write!(f, "{} checked cast to {}", from.display(db), to.display(db))?
            }
            Constraint::Member {
                kind,
                base,
                name,
                member,
                ..
            } => {
                let which = match kind {
                    MemberKind::Value => "value",
                    MemberKind::Type => "type",
                };
                write!(
                    f,
                    "{}[.{name}: {which}] == {}",
                    base.display(db),
                    member.display(db)
                )?
            }
            Constraint::TypeProperty { property, ty, .. } => {
                let what = match property {
                    TypeProperty::Archetype => "is an archetype",
                    TypeProperty::Class => "is a class",
                    TypeProperty::DynamicLookupValue => "is a DynamicLookup value",
                };
                write!(f, "{} {what}", ty.display(db))?
            }
            Constraint::Conjunction { nested, .. } | Constraint::Disjunction { alternatives: nested, .. } => {
                let label = if matches!(self.constraint, Constraint::Conjunction { .. }) {
                    "conjunction"
                } else {
                    "disjunction"
                };
                write!(f, "{label}")?;
                self.write_locator(f)?;
                write!(f, ":")?;
                for child in nested {
                    write!(f, "\n{:width$}", "", width = self.indent + 2)?;
                    let display = ConstraintDisplay {
                        db,
                        constraint: child,
                        locators: self.locators,
                        indent: self.indent + 2,
                    };
                    write!(f, "{display}")?;
                }
                return Ok(());
            }
        }
        self.write_locator(f)
    }
}

impl ConstraintDisplay<'_, '_> {
    fn write_locator(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(locators), Some(locator)) = (self.locators, self.constraint.locator()) {
            write!(f, " [[{}]]", locators.get(locator))?;
        }
        Ok(())
    }
}

/// Stable identity of an active constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(u32);

/// The worklist of active constraints plus the retired (solved) ones.
#[derive(Clone, Debug, Default)]
pub struct ConstraintStore<'db> {
    next_id: u32,
    active: BTreeMap<ConstraintId, Constraint<'db>>,
    retired: Vec<Constraint<'db>>,
}

impl<'db> ConstraintStore<'db> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint to the worklist.
    pub fn push(&mut self, constraint: Constraint<'db>) -> ConstraintId {
        let id = ConstraintId(self.next_id);
        self.next_id += 1;
        self.active.insert(id, constraint);
        id
    }

    /// Put a constraint back under the id it had before.
    pub fn reinsert(&mut self, id: ConstraintId, constraint: Constraint<'db>) {
        self.active.insert(id, constraint);
    }

    pub fn remove(&mut self, id: ConstraintId) -> Option<Constraint<'db>> {
        self.active.remove(&id)
    }

    pub fn get(&self, id: ConstraintId) -> Option<&Constraint<'db>> {
        self.active.get(&id)
    }

    pub fn retire(&mut self, constraint: Constraint<'db>) {
        self.retired.push(constraint);
    }

    pub fn unretire(&mut self) -> Option<Constraint<'db>> {
        self.retired.pop()
    }

    /// Active constraints in insertion order.
    pub fn active(&self) -> impl Iterator<Item = (ConstraintId, &Constraint<'db>)> {
        self.active.iter().map(|(id, c)| (*id, c))
    }

    pub fn active_ids(&self) -> Vec<ConstraintId> {
        self.active.keys().copied().collect()
    }

    pub fn retired(&self) -> &[Constraint<'db>] {
        &self.retired
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }
}
