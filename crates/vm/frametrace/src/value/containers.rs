//! Sequences, dicts and iterators.

use crate::errors::ValueError;
use crate::runtime::{SliceValue, TypeTag};

use super::{Literal, SymbolicValue, ValueKind, propagate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SequenceKind {
    List,
    Tuple,
    /// `(start, stop, step)`.
    Slice,
}

impl SequenceKind {
    pub fn type_tag(self) -> TypeTag {
        match self {
            SequenceKind::List => TypeTag::List,
            SequenceKind::Tuple => TypeTag::Tuple,
            SequenceKind::Slice => TypeTag::Slice,
        }
    }

    /// The literal of this kind holding `items`; slices need int-or-None bounds.
    pub fn literal(self, items: Vec<Literal>) -> Option<Literal> {
        match self {
            SequenceKind::List => Some(Literal::List(items)),
            SequenceKind::Tuple => Some(Literal::Tuple(items)),
            SequenceKind::Slice => {
                let bound = |literal: &Literal| match literal {
                    Literal::None => Some(None),
                    other => other.as_int().map(Some),
                };
                match items.as_slice() {
                    [start, stop, step] => Some(Literal::Slice(SliceValue {
                        start: bound(start)?,
                        stop: bound(stop)?,
                        step: bound(step)?,
                    })),
                    _ => None,
                }
            }
        }
    }
}

impl SymbolicValue {
    pub fn sequence(kind: SequenceKind, items: Vec<SymbolicValue>) -> SymbolicValue {
        let options = propagate(&items);
        SymbolicValue::derived(ValueKind::Sequence { kind, items }, options)
    }

    /// Items of a list or tuple value, or of a constant list or tuple.
    ///
    /// Each item carries the container's guards as well as its own.
    pub fn sequence_items(&self) -> Result<Vec<SymbolicValue>, ValueError> {
        match self.kind() {
            ValueKind::Sequence {
                kind: SequenceKind::List | SequenceKind::Tuple,
                items,
            } => Ok(items
                .iter()
                .map(|item| item.clone().add_guards(self.guards()))
                .collect()),
            ValueKind::Constant(literal) => {
                let items = literal
                    .items()
                    .ok_or_else(|| ValueError::NotConstant(format!("{self} is not iterable")))?;
                Ok(items
                    .iter()
                    .map(|item| SymbolicValue::derived(ValueKind::Constant(item.clone()), propagate([self])))
                    .collect())
            }
            ValueKind::StructuredObject { .. } => self.expand_module_list(),
            _ => Err(ValueError::NotConstant(format!("{self} is not a known sequence"))),
        }
    }

    /// `self[key]` for a constant key; the result carries both operands' guards.
    pub fn getitem_const(&self, key: &SymbolicValue) -> Result<SymbolicValue, ValueError> {
        let key_literal = key.as_constant()?;
        let options = propagate([self, key]);
        match self.kind() {
            ValueKind::Sequence {
                kind: kind @ (SequenceKind::List | SequenceKind::Tuple),
                items,
            } => match &key_literal {
                Literal::Slice(slice) => {
                    let picked = slice
                        .indices(items.len())
                        .map_err(|err| ValueError::NotConstant(err.to_string()))?
                        .into_iter()
                        .filter_map(|position| items.get(position).cloned())
                        .collect();
                    Ok(SymbolicValue::derived(
                        ValueKind::Sequence { kind: *kind, items: picked },
                        options,
                    ))
                }
                other => {
                    let index = other
                        .as_int()
                        .ok_or_else(|| ValueError::NotConstant(format!("index {other}")))?;
                    let item = crate::runtime::array::normalize_index(index, items.len())
                        .and_then(|position| items.get(position))
                        .ok_or_else(|| ValueError::NotConstant(format!("index {index} out of range")))?;
                    Ok(item.clone().with_propagation(options))
                }
            },
            ValueKind::ConstDict(map) => {
                let dict_key = key_literal
                    .as_dict_key()
                    .ok_or_else(|| ValueError::NotConstant(format!("unhashable key {key_literal}")))?;
                map.get(&dict_key)
                    .map(|item| item.clone().with_propagation(options))
                    .ok_or_else(|| ValueError::NotConstant(format!("missing key {dict_key}")))
            }
            ValueKind::Constant(literal) => literal
                .getitem(&key_literal)
                .map(|item| SymbolicValue::derived(ValueKind::Constant(item), options))
                .map_err(|err| ValueError::NotConstant(err.to_string())),
            ValueKind::StructuredObject { .. } => match &key_literal {
                Literal::Int(index) => self.index_module(*index, key),
                other => Err(ValueError::NotConstant(format!("module index {other}"))),
            },
            _ => Err(ValueError::NotConstant(format!("{self} is not indexable by a constant"))),
        }
    }

    /// Iterator over the items of a known sequence.
    pub fn iterate(&self) -> Result<SymbolicValue, ValueError> {
        let items = self.sequence_items()?;
        Ok(SymbolicValue::derived(
            ValueKind::ListIterator { items, index: 0 },
            propagate([self]),
        ))
    }

    /// Advances a list iterator.
    ///
    /// Returns the next item (carrying the iterator's guards) and the new
    /// iterator state, whose source-name binding is cleared, or `None` when
    /// exhausted. `self` is left untouched.
    pub fn advance(&self) -> Result<Option<(SymbolicValue, SymbolicValue)>, ValueError> {
        let ValueKind::ListIterator { items, index } = self.kind() else {
            return Err(ValueError::NotConstant(format!("{self} is not an iterator")));
        };
        let Some(item) = items.get(*index) else {
            return Ok(None);
        };
        let item = item.clone().add_guards(self.guards());
        let next = SymbolicValue::new(ValueKind::ListIterator {
            items: items.clone(),
            index: index.saturating_add(1),
        })
        .with_state(self.state())
        .add_guards(self.guards());
        Ok(Some((item, next)))
    }

    /// Number of items of a known sequence.
    pub fn known_len(&self) -> Option<usize> {
        match self.kind() {
            ValueKind::Sequence { kind: SequenceKind::List | SequenceKind::Tuple, items } => Some(items.len()),
            ValueKind::ConstDict(map) => Some(map.len()),
            ValueKind::Constant(literal) => literal.items().map(<[Literal]>::len),
            ValueKind::StructuredObject { module, .. } => module.len(),
            ValueKind::NumericArray(meta) => meta.shape.as_ref().and_then(|shape| shape.first().copied()),
            _ => None,
        }
    }
}
