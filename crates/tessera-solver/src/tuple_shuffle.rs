//! Tuple element shuffles.
//!
//! Converting one tuple to another may reorder elements by label, fill
//! defaulted destination elements, and collect trailing source elements into
//! a variadic destination element. [`compute_tuple_shuffle`] decides where
//! every destination element comes from.

use derive_more::{Display, Error};
use tessera_types::TupleElt;

/// Where a destination element gets its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShuffleSource {
    /// The source element at this index.
    Element(usize),
    /// The destination element's default value.
    DefaultInitialize,
    /// The variadic destination element; its sources are listed in
    /// [`TupleShuffle::variadic_args`].
    FirstVariadic,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TupleShuffle {
    /// One entry per destination element.
    pub sources: Vec<ShuffleSource>,
    /// Source indices collected by the variadic destination element.
    pub variadic_args: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Error)]
pub enum ShuffleError {
    #[display("destination element #{index} has no source")]
    MissingSource { index: usize },
    #[display("labeled source element #{index} cannot fill destination element #{dest}")]
    LabelConflict { index: usize, dest: usize },
    #[display("labeled source element #{index} cannot be variadic")]
    LabeledVariadic { index: usize },
    #[display("source element #{index} is left over")]
    Unconsumed { index: usize },
}

/// Match the elements of `to` with the elements of `from`.
///
/// Labeled destination elements take the first unconsumed source element
/// with the same label. The remaining destination elements are filled left
/// to right from the remaining source elements. With `labels_mandatory`, a
/// labeled source element may only be matched by label.
pub fn compute_tuple_shuffle(
    from: &[TupleElt<'_>],
    to: &[TupleElt<'_>],
    labels_mandatory: bool,
) -> Result<TupleShuffle, ShuffleError> {
    let mut consumed = vec![false; from.len()];
    let mut sources: Vec<Option<ShuffleSource>> = vec![None; to.len()];
    let mut variadic_args = Vec::new();

    for (i, to_elt) in to.iter().enumerate() {
        let Some(name) = to_elt.name else {
            continue;
        };
        let matched = from
            .iter()
            .enumerate()
            .position(|(j, from_elt)| from_elt.name == Some(name) && !consumed[j]);
        if let Some(j) = matched {
            sources[i] = Some(ShuffleSource::Element(j));
            consumed[j] = true;
        }
    }

    let mut next = 0;
    let skip_consumed = |next: &mut usize, consumed: &[bool]| {
        while *next < consumed.len() && consumed[*next] {
            *next += 1;
        }
    };
    skip_consumed(&mut next, &consumed);

    for (i, to_elt) in to.iter().enumerate() {
        if sources[i].is_some() {
            continue;
        }

        if to_elt.vararg {
            while next < from.len() {
                // Labeled elements are never adopted into a variadic element.
                if from[next].name.is_some() {
                    return Err(ShuffleError::LabeledVariadic { index: next });
                }
                variadic_args.push(next);
                consumed[next] = true;
                skip_consumed(&mut next, &consumed);
            }
            sources[i] = Some(ShuffleSource::FirstVariadic);
            break;
        }

        if next == from.len() {
            if to_elt.has_default {
                sources[i] = Some(ShuffleSource::DefaultInitialize);
                continue;
            }
            return Err(ShuffleError::MissingSource { index: i });
        }

        if from[next].name.is_some() && (labels_mandatory || to_elt.name.is_some()) {
            return Err(ShuffleError::LabelConflict {
                index: next,
                dest: i,
            });
        }

        sources[i] = Some(ShuffleSource::Element(next));
        consumed[next] = true;
        skip_consumed(&mut next, &consumed);
    }

    if next != from.len() {
        return Err(ShuffleError::Unconsumed { index: next });
    }

    // A variadic element ends the positional pass; anything after it must
    // already be matched by label.
    let sources = sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| source.ok_or(ShuffleError::MissingSource { index: i }))
        .collect::<Result<_, _>>()?;
    Ok(TupleShuffle {
        sources,
        variadic_args,
    })
}

#[cfg(test)]
mod tests {
    use tessera_types::{BuiltinKind, Symbol, Type};

    use super::*;

    fn test_db() -> salsa::DatabaseImpl {
        salsa::DatabaseImpl::new()
    }

    #[test]
    fn named_match_wins_over_position() {
        let db = test_db();
        let int = Type::builtin(&db, BuiltinKind::Int64);
        let x = Symbol::new("x");
        let from = [TupleElt::named(x, int), TupleElt::new(int)];
        let to = [TupleElt::new(int), TupleElt::named(x, int)];
        let shuffle = compute_tuple_shuffle(&from, &to, false).unwrap();
        assert_eq!(
            shuffle.sources,
            vec![ShuffleSource::Element(1), ShuffleSource::Element(0)]
        );
        assert!(shuffle.variadic_args.is_empty());
    }

    #[test]
    fn leftover_source_elements_fail() {
        let db = test_db();
        let int = Type::builtin(&db, BuiltinKind::Int64);
        let from = [TupleElt::new(int), TupleElt::new(int)];
        let to = [TupleElt::new(int)];
        assert_eq!(
            compute_tuple_shuffle(&from, &to, false),
            Err(ShuffleError::Unconsumed { index: 1 })
        );
    }

    #[test]
    fn defaults_fill_missing_elements() {
        let db = test_db();
        let int = Type::builtin(&db, BuiltinKind::Int64);
        let from = [TupleElt::new(int)];
        let to = [
            TupleElt::new(int),
            TupleElt::named(Symbol::new("y"), int).with_default(),
        ];
        let shuffle = compute_tuple_shuffle(&from, &to, false).unwrap();
        assert_eq!(
            shuffle.sources,
            vec![ShuffleSource::Element(0), ShuffleSource::DefaultInitialize]
        );

        let to = [TupleElt::new(int), TupleElt::new(int)];
        assert_eq!(
            compute_tuple_shuffle(&from, &to, false),
            Err(ShuffleError::MissingSource { index: 1 })
        );
    }

    #[test]
    fn variadic_element_collects_the_rest() {
        let db = test_db();
        let int = Type::builtin(&db, BuiltinKind::Int64);
        let from = [TupleElt::new(int), TupleElt::new(int), TupleElt::new(int)];
        let to = [TupleElt::new(int), TupleElt::new(int).variadic()];
        let shuffle = compute_tuple_shuffle(&from, &to, false).unwrap();
        assert_eq!(
            shuffle.sources,
            vec![ShuffleSource::Element(0), ShuffleSource::FirstVariadic]
        );
        assert_eq!(shuffle.variadic_args, vec![1, 2]);

        let labeled = [TupleElt::new(int), TupleElt::named(Symbol::new("z"), int)];
        assert_eq!(
            compute_tuple_shuffle(&labeled, &to, false),
            Err(ShuffleError::LabeledVariadic { index: 1 })
        );
    }

    #[test]
    fn mandatory_labels_reject_positional_match() {
        let db = test_db();
        let int = Type::builtin(&db, BuiltinKind::Int64);
        let from = [TupleElt::named(Symbol::new("a"), int)];
        let to = [TupleElt::new(int)];
        assert!(compute_tuple_shuffle(&from, &to, false).is_ok());
        assert_eq!(
            compute_tuple_shuffle(&from, &to, true),
            Err(ShuffleError::LabelConflict { index: 0, dest: 0 })
        );

        let to = [TupleElt::named(Symbol::new("b"), int)];
        assert!(compute_tuple_shuffle(&from, &to, false).is_err());
    }
}
