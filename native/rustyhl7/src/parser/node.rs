//! Parsing-mode nodes
//!
//! A `Node` is a `(document, divider)` pair. It holds no text of its own;
//! every read goes through the divider arena, which re-divides lazily after
//! edits.

use std::cell::RefMut;
use std::fmt;

use log::{debug, warn};

use super::{Detached, Document};
use crate::core::input::normalize_line_endings;
use crate::core::Encoding;
use crate::divider::{Anchor, DividerId, Dividers, StringDivider};
use crate::element::{
    check_structural_edit, check_type_field_edit, check_value, division_index, msh_rules_apply, ChildEdit, Element,
    ElementKind, Level,
};
use crate::error::{Hl7Error, Operation, Result};

/// Offset of the field delimiter inside an MSH segment
const MSH_FIELD_DELIMITER_OFFSET: usize = 3;

/// View of one element of a parsed message
#[derive(Clone, Copy)]
pub struct Node<'d> {
    doc: &'d Document,
    id: DividerId,
}

impl<'d> Node<'d> {
    pub(super) fn new(doc: &'d Document, id: DividerId) -> Self {
        Self { doc, id }
    }

    fn dividers(&self) -> RefMut<'d, Dividers> {
        self.doc.dividers.borrow_mut()
    }

    fn anchor(&self) -> Option<Anchor> {
        self.doc.dividers.borrow().anchor(self.id)
    }

    fn is_opaque(&self) -> bool {
        self.doc.dividers.borrow().is_opaque(self.id)
    }

    /// Replace this node's whole range, creating it when absent
    fn write(&self, value: &str) {
        let mut dividers = self.dividers();
        let mut divider = dividers.divider(self.id);
        let bound = divider.bound();
        if bound.valid {
            divider.splice(bound.offset, bound.length, value);
        } else {
            divider.materialize(value);
        }
    }

    /// Copy this node's value into an independent root at the same level
    pub fn detach(&self) -> Detached {
        debug!("detaching {:?} {}", self.level(), self.index());
        let value = self.value();
        let encoding = self.encoding();
        Detached::from_dividers(Dividers::new(&value, self.level(), encoding))
    }

    /// Arena handle, stable for the lifetime of the document
    pub fn id(&self) -> DividerId {
        self.id
    }
}

impl Element for Node<'_> {
    fn level(&self) -> Level {
        self.doc.dividers.borrow().level(self.id)
    }

    fn kind(&self) -> ElementKind {
        if self.level() != Level::Field || !self.is_opaque() {
            return ElementKind::Normal;
        }
        match self.anchor() {
            Some(Anchor::Char(_)) => ElementKind::FieldDelimiter,
            Some(Anchor::Division(_)) => ElementKind::EncodingCharacters,
            _ => ElementKind::Normal,
        }
    }

    fn index(&self) -> usize {
        self.doc.dividers.borrow().index(self.id)
    }

    fn ancestor(&self) -> Option<Self> {
        let parent = self.doc.dividers.borrow().parent(self.id)?;
        Some(Node::new(self.doc, parent))
    }

    fn descendant(&self, index: usize) -> Self {
        let level = self.level();
        let Some(child_level) = level.child() else {
            let id = self
                .dividers()
                .child(self.id, Anchor::Nowhere, Level::Subcomponent, index, true);
            return Node::new(self.doc, id);
        };
        // the type field decides MSH-ness, so it is never looked up through it
        let is_msh = level == Level::Segment && index > 0 && self.is_msh();
        let anchor = if is_msh && index == 1 {
            Anchor::Char(MSH_FIELD_DELIMITER_OFFSET)
        } else {
            division_index(level, is_msh, index).map_or(Anchor::Nowhere, Anchor::Division)
        };
        let opaque = is_msh && index <= 2;
        let id = self.dividers().child(self.id, anchor, child_level, index, opaque);
        Node::new(self.doc, id)
    }

    fn encoding(&self) -> Encoding {
        self.dividers().encoding()
    }

    fn delimiter(&self) -> Option<char> {
        if self.is_opaque() {
            return None;
        }
        self.level().delimiter(&self.encoding()).map(char::from)
    }

    fn value(&self) -> String {
        self.dividers().divider(self.id).value().to_owned()
    }

    fn set_value(&self, value: &str) -> Result<()> {
        if self.level() == Level::Message {
            let normalized = normalize_line_endings(value);
            check_value(self, &normalized)?;
            self.write(&normalized);
            return Ok(());
        }

        if self.anchor() == Some(Anchor::Nowhere) {
            let ancestor_level = self.ancestor().map_or(Level::Subcomponent, |a| a.level());
            if ancestor_level.child().is_none() {
                debug!("subcomponents have no descendants, write ignored");
                return Ok(());
            }
            let err = Hl7Error::IndexBelowMinimum {
                index: self.index(),
                minimum: ancestor_level.minimum_child_index(),
            };
            warn!("write rejected: {err}");
            return Err(err);
        }

        if self.is_opaque() && self.kind() == ElementKind::Normal {
            // inside MSH-1/MSH-2 only the first position exists
            return match self.ancestor() {
                Some(ancestor) if self.index() == 1 => ancestor.set_value(value),
                _ => {
                    debug!("position {} of a fixed leaf does not exist, write ignored", self.index());
                    Ok(())
                }
            };
        }

        check_value(self, value)?;
        self.write(value);
        Ok(())
    }

    fn values(&self) -> Vec<String> {
        self.dividers().divider(self.id).values()
    }

    fn delete_descendant(&self, index: usize) -> Result<()> {
        let level = self.level();
        let is_msh = msh_rules_apply(self);
        check_structural_edit(level, is_msh, Operation::Delete, index)?;
        check_type_field_edit(self, ChildEdit::Delete(index))?;
        let Some(division) = division_index(level, is_msh, index).filter(|_| self.delimiter().is_some()) else {
            return Ok(());
        };
        debug!("delete {level:?} child {index}");
        self.dividers().divider(self.id).delete(division);
        Ok(())
    }

    fn insert_descendant(&self, index: usize, value: &str) -> Result<()> {
        let level = self.level();
        let is_msh = msh_rules_apply(self);
        check_structural_edit(level, is_msh, Operation::Insert, index)?;
        check_type_field_edit(self, ChildEdit::Insert(index, value))?;
        let Some(division) = division_index(level, is_msh, index).filter(|_| self.delimiter().is_some()) else {
            return Ok(());
        };
        debug!("insert {level:?} child {index}");
        self.dividers().divider(self.id).insert(division, value);
        Ok(())
    }

    fn move_descendant(&self, source: usize, target: usize) -> Result<()> {
        let level = self.level();
        let is_msh = msh_rules_apply(self);
        check_structural_edit(level, is_msh, Operation::Move, source)?;
        check_structural_edit(level, is_msh, Operation::Move, target)?;
        check_type_field_edit(self, ChildEdit::Move(source, target))?;
        if source == target || self.delimiter().is_none() {
            return Ok(());
        }
        let (Some(from), Some(to)) = (
            division_index(level, is_msh, source),
            division_index(level, is_msh, target),
        ) else {
            return Ok(());
        };
        debug!("move {level:?} child {source} -> {target}");
        self.dividers().divider(self.id).move_division(from, to);
        Ok(())
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("level", &self.level())
            .field("index", &self.index())
            .field("value", &self.value())
            .finish()
    }
}

impl fmt::Display for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value())
    }
}
