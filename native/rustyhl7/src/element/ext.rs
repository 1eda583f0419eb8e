//! Algorithms written once against the `Element` contract

use log::warn;

use super::{Element, Level};
use crate::core::HL7_NULL;
use crate::error::{Hl7Error, Operation, Result};

/// Values of an element with trailing empty entries dropped.
///
/// Holds a snapshot; `iter()` can be called any number of times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimmedValues {
    values: Vec<String>,
}

impl TrimmedValues {
    fn new(mut values: Vec<String>) -> Self {
        while values.last().is_some_and(|v| v.is_empty()) {
            values.pop();
        }
        Self { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + Clone {
        self.values.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for TrimmedValues {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Operations available on every element of either representation
pub trait ElementExt: Element {
    /// Remove this element from its ancestor
    ///
    /// # Errors
    ///
    /// `RootElement` for a message or detached root, plus the ancestor's
    /// structural-edit rules.
    fn delete(&self) -> Result<()> {
        match self.ancestor() {
            Some(ancestor) => ancestor.delete_descendant(self.index()),
            None => {
                warn!("delete of a root element rejected");
                Err(Hl7Error::RootElement {
                    operation: Operation::Delete,
                })
            }
        }
    }

    /// Insert `value` as the next sibling of this element
    ///
    /// # Errors
    ///
    /// `NoAncestor` when there is nothing to insert relative to.
    fn insert_after(&self, value: &str) -> Result<()> {
        match self.ancestor() {
            Some(ancestor) => ancestor.insert_descendant(self.index() + 1, value),
            None => {
                warn!("insert after a parentless element rejected");
                Err(Hl7Error::NoAncestor {
                    operation: Operation::Insert,
                })
            }
        }
    }

    /// Insert `value` at this element's position, shifting it up by one
    ///
    /// # Errors
    ///
    /// `NoAncestor` when there is nothing to insert relative to.
    fn insert_before(&self, value: &str) -> Result<()> {
        match self.ancestor() {
            Some(ancestor) => ancestor.insert_descendant(self.index(), value),
            None => {
                warn!("insert before a parentless element rejected");
                Err(Hl7Error::NoAncestor {
                    operation: Operation::Insert,
                })
            }
        }
    }

    /// Insert a copy of `element`'s value as the child at `index`.
    /// `element` must sit inside a message; parentless elements are refused.
    ///
    /// # Errors
    ///
    /// `NoAncestor` when `element` has no ancestor, plus the structural-edit
    /// rules of this element.
    fn insert_element<E: Element>(&self, index: usize, element: &E) -> Result<()> {
        if element.ancestor().is_none() {
            warn!("insert of a parentless element rejected");
            return Err(Hl7Error::NoAncestor {
                operation: Operation::Insert,
            });
        }
        self.insert_descendant(index, &element.value())
    }

    /// Move this element to `target` within its ancestor
    ///
    /// # Errors
    ///
    /// `RootElement` for roots, plus the ancestor's structural-edit rules.
    fn move_to(&self, target: usize) -> Result<()> {
        match self.ancestor() {
            Some(ancestor) => ancestor.move_descendant(self.index(), target),
            None => {
                warn!("move of a root element rejected");
                Err(Hl7Error::RootElement {
                    operation: Operation::Move,
                })
            }
        }
    }

    /// Replace the value with the HL7 null `""`
    ///
    /// # Errors
    ///
    /// Whatever `set_value` rejects at this position.
    fn nullify(&self) -> Result<()> {
        self.set_value(HL7_NULL)
    }

    /// Own values without trailing empty entries
    fn trimmed_values(&self) -> TrimmedValues {
        TrimmedValues::new(self.values())
    }

    /// Dotted location such as `MSH1.3.1.1.1`; "" for a message
    fn key(&self) -> String {
        match self.level() {
            Level::Message => String::new(),
            Level::Segment => format!("{}{}", self.segment_type(), self.index()),
            _ => {
                let prefix = self.ancestor().map(|a| a.key()).unwrap_or_default();
                if prefix.is_empty() {
                    self.index().to_string()
                } else {
                    format!("{prefix}.{}", self.index())
                }
            }
        }
    }
}

impl<E: Element> ElementExt for E {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_drops_only_trailing_empties() {
        let trimmed = TrimmedValues::new(vec!["a".into(), String::new(), "b".into(), String::new(), String::new()]);
        assert_eq!(trimmed.iter().collect::<Vec<_>>(), vec!["a", "", "b"]);
        // restartable
        assert_eq!(trimmed.iter().count(), 3);
        assert_eq!(trimmed.len(), 3);
    }

    #[test]
    fn test_trimmed_all_empty() {
        let trimmed = TrimmedValues::new(vec![String::new(), String::new()]);
        assert!(trimmed.is_empty());
    }
}
