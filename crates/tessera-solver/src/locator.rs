//! Constraint locators.
//!
//! A locator names the place in an expression a constraint comes from: an
//! anchor expression plus a path into its type. Locators are interned, so
//! two structurally equal locators share one [`LocatorId`].

use std::collections::HashMap;
use std::fmt;

use smallvec::SmallVec;
use tessera_types::{ArchetypeId, AssocTypeId};

/// Opaque identity of an expression handed out by the constraint generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Anchor {
    pub id: u32,
    /// The anchor is a tuple literal whose labels were written explicitly;
    /// conversions out of it must respect the labels.
    pub tuple_literal: bool,
}

impl Anchor {
    pub fn expr(id: u32) -> Self {
        Self {
            id,
            tuple_literal: false,
        }
    }

    pub fn labeled_tuple(id: u32) -> Self {
        Self {
            id,
            tuple_literal: true,
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr#{}", self.id)
    }
}

/// One step of a locator path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathElement {
    ApplyArgument,
    ApplyFunction,
    FunctionArgument,
    FunctionResult,
    TupleElement(u32),
    NamedTupleElement(u32),
    GenericArgument(u32),
    ArrayElement,
    ParentType,
    InstanceType,
    ScalarToTuple,
    Load,
    ConversionMember,
    ConversionResult,
    ConstructorMember,
    Member,
    /// The variable standing for a generic parameter of this archetype.
    Archetype(ArchetypeId),
    /// The variable standing for an associated type.
    AssociatedType(AssocTypeId),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::ApplyArgument => write!(f, "apply argument"),
            PathElement::ApplyFunction => write!(f, "apply function"),
            PathElement::FunctionArgument => write!(f, "function argument"),
            PathElement::FunctionResult => write!(f, "function result"),
            PathElement::TupleElement(i) => write!(f, "tuple element #{i}"),
            PathElement::NamedTupleElement(i) => write!(f, "named tuple element #{i}"),
            PathElement::GenericArgument(i) => write!(f, "generic argument #{i}"),
            PathElement::ArrayElement => write!(f, "array element"),
            PathElement::ParentType => write!(f, "parent type"),
            PathElement::InstanceType => write!(f, "instance type"),
            PathElement::ScalarToTuple => write!(f, "scalar to tuple"),
            PathElement::Load => write!(f, "load"),
            PathElement::ConversionMember => write!(f, "conversion member"),
            PathElement::ConversionResult => write!(f, "conversion result"),
            PathElement::ConstructorMember => write!(f, "constructor member"),
            PathElement::Member => write!(f, "member"),
            PathElement::Archetype(arch) => write!(f, "archetype '{arch}'"),
            PathElement::AssociatedType(assoc) => write!(f, "associated type '{assoc}'"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocatorId(u32);

impl LocatorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locator {
    pub anchor: Option<Anchor>,
    pub path: SmallVec<[PathElement; 4]>,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            Some(anchor) => write!(f, "{anchor}")?,
            None => write!(f, "<no anchor>")?,
        }
        for elt in &self.path {
            write!(f, " -> {elt}")?;
        }
        Ok(())
    }
}

/// A locator that has not been interned yet: a base plus extra path elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocatorBuilder {
    base: Option<LocatorId>,
    extra: SmallVec<[PathElement; 4]>,
}

impl LocatorBuilder {
    pub fn new(base: Option<LocatorId>) -> Self {
        Self {
            base,
            extra: SmallVec::new(),
        }
    }

    pub fn with_path_element(&self, elt: PathElement) -> Self {
        let mut extended = self.clone();
        extended.extra.push(elt);
        extended
    }

    pub fn base(&self) -> Option<LocatorId> {
        self.base
    }

    pub fn extra(&self) -> &[PathElement] {
        &self.extra
    }

    pub fn has_empty_path(&self) -> bool {
        self.extra.is_empty()
    }

    pub fn last(&self) -> Option<PathElement> {
        self.extra.last().copied()
    }
}

impl From<LocatorId> for LocatorBuilder {
    fn from(base: LocatorId) -> Self {
        Self::new(Some(base))
    }
}

impl From<Option<LocatorId>> for LocatorBuilder {
    fn from(base: Option<LocatorId>) -> Self {
        Self::new(base)
    }
}

#[derive(Clone, Debug, Default)]
pub struct LocatorStore {
    locators: Vec<Locator>,
    index: HashMap<Locator, LocatorId>,
}

impl LocatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(
        &mut self,
        anchor: Option<Anchor>,
        path: impl IntoIterator<Item = PathElement>,
    ) -> LocatorId {
        let locator = Locator {
            anchor,
            path: path.into_iter().collect(),
        };
        if let Some(id) = self.index.get(&locator) {
            return *id;
        }
        let id = LocatorId(self.locators.len() as u32);
        self.locators.push(locator.clone());
        self.index.insert(locator, id);
        id
    }

    /// The locator of an anchor with an empty path.
    pub fn anchor(&mut self, anchor: Anchor) -> LocatorId {
        self.intern(Some(anchor), [])
    }

    pub fn get(&self, id: LocatorId) -> &Locator {
        &self.locators[id.index()]
    }

    pub fn len(&self) -> usize {
        self.locators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    pub fn extend(&mut self, base: LocatorId, elts: &[PathElement]) -> LocatorId {
        let locator = self.get(base).clone();
        self.intern(
            locator.anchor,
            locator.path.iter().copied().chain(elts.iter().copied()),
        )
    }

    /// Intern a builder. Without a base there is nothing to attribute the
    /// constraint to, and the result is `None`.
    pub fn materialize(&mut self, builder: &LocatorBuilder) -> Option<LocatorId> {
        let base = builder.base?;
        if builder.has_empty_path() {
            return Some(base);
        }
        self.get(base).anchor?;
        Some(self.extend(base, builder.extra()))
    }

    /// Whether a tuple conversion at `builder` must respect element labels.
    pub fn has_mandatory_tuple_labels(&self, builder: &LocatorBuilder) -> bool {
        let Some(base) = builder.base else {
            return false;
        };
        let locator = self.get(base);
        builder.has_empty_path()
            && locator.path.is_empty()
            && locator.anchor.is_some_and(|anchor| anchor.tuple_literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut store = LocatorStore::new();
        let a = store.intern(Some(Anchor::expr(1)), [PathElement::ApplyArgument]);
        let b = store.intern(Some(Anchor::expr(1)), [PathElement::ApplyArgument]);
        let c = store.intern(Some(Anchor::expr(2)), [PathElement::ApplyArgument]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn builders_materialize_lazily() {
        let mut store = LocatorStore::new();
        let base = store.anchor(Anchor::expr(7));
        let builder = LocatorBuilder::from(base)
            .with_path_element(PathElement::ApplyArgument)
            .with_path_element(PathElement::TupleElement(1));
        assert_eq!(store.len(), 1);
        let id = store.materialize(&builder).unwrap();
        assert_eq!(
            store.get(id).to_string(),
            "expr#7 -> apply argument -> tuple element #1"
        );
        assert_eq!(store.materialize(&LocatorBuilder::from(base)), Some(base));
        assert_eq!(store.materialize(&LocatorBuilder::new(None)), None);
    }

    #[test]
    fn only_bare_labeled_tuple_anchors_force_labels() {
        let mut store = LocatorStore::new();
        let labeled = store.anchor(Anchor::labeled_tuple(3));
        let plain = store.anchor(Anchor::expr(4));
        assert!(store.has_mandatory_tuple_labels(&labeled.into()));
        assert!(!store.has_mandatory_tuple_labels(&plain.into()));
        let nested = LocatorBuilder::from(labeled).with_path_element(PathElement::Load);
        assert!(!store.has_mandatory_tuple_labels(&nested));
    }
}
