//! Building-mode nodes
//!
//! A `BuilderNode` is a path of external indices from the document root.
//! Like parsing-mode nodes it is a positional view: the tree node it stands
//! for is looked up again on every access.

use std::fmt;

use log::{debug, warn};

use super::tree::{is_msh_value, level_below, TreeNode};
use super::{BuilderDocument, DetachedBuilder};
use crate::core::input::normalize_line_endings;
use crate::core::Encoding;
use crate::element::{
    check_structural_edit, check_type_field_edit, check_value, field_kind, msh_rules_apply, ChildEdit, Element,
    ElementKind, Level,
};
use crate::error::{Hl7Error, Operation, Result};

/// Where a path lands in the tree
enum Address {
    /// Positions from the root node
    Tree(Vec<usize>),
    /// MSH-1/MSH-2 (`depth` 0) or `depth` levels inside one. Only the
    /// first position at each level holds the value.
    Fixed {
        kind: ElementKind,
        depth: usize,
        whole: bool,
    },
    /// Index 0 at a 1-based level
    BelowMinimum { index: usize },
    /// Under a subcomponent
    Beyond,
}

/// Value of an MSH fixed field under `encoding`
fn fixed_value(kind: ElementKind, encoding: &Encoding) -> String {
    match kind {
        ElementKind::FieldDelimiter => encoding.field_delimiter().to_string(),
        ElementKind::EncodingCharacters => encoding.encoding_characters(),
        ElementKind::Normal => String::new(),
    }
}

/// Position of external child `index` among the children of a `level` node
fn child_position(level: Level, index: usize) -> Option<usize> {
    match level {
        Level::Segment => Some(index),
        _ => index.checked_sub(1),
    }
}

/// View of one element of a message under construction
#[derive(Clone)]
pub struct BuilderNode<'d> {
    doc: &'d BuilderDocument,
    path: Vec<usize>,
}

impl<'d> BuilderNode<'d> {
    pub(super) fn new(doc: &'d BuilderDocument, path: Vec<usize>) -> Self {
        Self { doc, path }
    }

    /// External indices from the document root
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    fn address(&self) -> Address {
        let tree = self.doc.tree.borrow();
        let mut level = tree.root_level;
        let mut positions = Vec::with_capacity(self.path.len());
        for (depth, &index) in self.path.iter().enumerate() {
            let Some(child) = level.child() else {
                return Address::Beyond;
            };
            if level == Level::Segment
                && (index == 1 || index == 2)
                && tree.root.get(&positions).is_some_and(|s| s.is_msh(&tree.encoding))
            {
                let rest = &self.path[depth + 1..];
                return Address::Fixed {
                    kind: field_kind(true, index),
                    depth: rest.len(),
                    whole: rest.len() <= 3 && rest.iter().all(|&i| i == 1),
                };
            }
            let Some(position) = child_position(level, index) else {
                return Address::BelowMinimum { index };
            };
            positions.push(position);
            level = child;
        }
        Address::Tree(positions)
    }

    fn write_fixed(&self, kind: ElementKind, value: &str) -> Result<()> {
        check_value(self, value)?;
        let mut tree = self.doc.tree.borrow_mut();
        match kind {
            ElementKind::FieldDelimiter => {
                if let Some(c) = value.chars().next() {
                    tree.encoding.set_field_delimiter(c)?;
                }
            }
            ElementKind::EncodingCharacters => tree.encoding.set_encoding_characters(value)?,
            ElementKind::Normal => {}
        }
        debug!("encoding changed to {}", tree.encoding);
        Ok(())
    }

    fn write_tree(&self, positions: &[usize], value: &str) {
        let level = self.level();
        let mut tree = self.doc.tree.borrow_mut();
        if level == Level::Segment && is_msh_value(value) {
            if let Some(encoding) = Encoding::from_msh(value) {
                tree.encoding = encoding;
            }
        }
        let encoding = tree.encoding;
        let root_level = tree.root_level;
        *tree.root.get_or_pad(root_level, positions, &encoding) = TreeNode::parse(level, value, &encoding);
    }

    /// Copy this node's value into an independent builder at the same level
    pub fn detach(&self) -> DetachedBuilder {
        debug!("detaching {:?} {}", self.level(), self.index());
        DetachedBuilder::new(self.level(), &self.value(), self.encoding())
    }
}

impl Element for BuilderNode<'_> {
    fn level(&self) -> Level {
        let root_level = self.doc.tree.borrow().root_level;
        level_below(root_level, self.path.len()).unwrap_or(Level::Subcomponent)
    }

    fn kind(&self) -> ElementKind {
        match self.address() {
            Address::Fixed { kind, depth: 0, .. } => kind,
            _ => ElementKind::Normal,
        }
    }

    fn index(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }

    fn ancestor(&self) -> Option<Self> {
        let (_, parent) = self.path.split_last()?;
        Some(BuilderNode::new(self.doc, parent.to_vec()))
    }

    fn descendant(&self, index: usize) -> Self {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(index);
        BuilderNode::new(self.doc, path)
    }

    fn encoding(&self) -> Encoding {
        self.doc.tree.borrow().encoding
    }

    fn delimiter(&self) -> Option<char> {
        match self.address() {
            Address::Fixed { .. } => None,
            _ => self.level().delimiter(&self.encoding()).map(char::from),
        }
    }

    fn value(&self) -> String {
        let level = self.level();
        let address = self.address();
        let tree = self.doc.tree.borrow();
        match address {
            Address::Tree(positions) => tree
                .root
                .get(&positions)
                .map(|node| node.render(level, &tree.encoding))
                .unwrap_or_default(),
            Address::Fixed { kind, whole: true, .. } => fixed_value(kind, &tree.encoding),
            _ => String::new(),
        }
    }

    fn set_value(&self, value: &str) -> Result<()> {
        match self.address() {
            Address::Tree(positions) => {
                if self.level() == Level::Message {
                    let normalized = normalize_line_endings(value);
                    check_value(self, &normalized)?;
                    self.doc.replace(&normalized);
                } else {
                    check_value(self, value)?;
                    self.write_tree(&positions, value);
                }
                Ok(())
            }
            Address::Fixed { kind, depth: 0, .. } => self.write_fixed(kind, value),
            Address::Fixed { depth, whole: true, .. } => {
                let fixed = BuilderNode::new(self.doc, self.path[..self.path.len() - depth].to_vec());
                fixed.set_value(value)
            }
            Address::Fixed { .. } => {
                debug!("position {} of a fixed leaf does not exist, write ignored", self.index());
                Ok(())
            }
            Address::BelowMinimum { index } => {
                let err = Hl7Error::IndexBelowMinimum { index, minimum: 1 };
                warn!("write rejected: {err}");
                Err(err)
            }
            Address::Beyond => {
                debug!("subcomponents have no descendants, write ignored");
                Ok(())
            }
        }
    }

    fn values(&self) -> Vec<String> {
        let exists = match self.address() {
            Address::Tree(positions) => self.doc.tree.borrow().root.get(&positions).is_some(),
            Address::Fixed { whole, .. } => whole,
            _ => false,
        };
        if !exists {
            return Vec::new();
        }
        let value = self.value();
        match self.delimiter() {
            Some(delimiter) => value.split(delimiter).map(str::to_owned).collect(),
            None => vec![value],
        }
    }

    fn delete_descendant(&self, index: usize) -> Result<()> {
        let level = self.level();
        check_structural_edit(level, msh_rules_apply(self), Operation::Delete, index)?;
        check_type_field_edit(self, ChildEdit::Delete(index))?;
        let (Address::Tree(parent), Some(child), Some(position)) =
            (self.address(), level.child(), child_position(level, index))
        else {
            return Ok(());
        };
        debug!("delete {level:?} child {index}");
        let mut tree = self.doc.tree.borrow_mut();
        let encoding = tree.encoding;
        tree.root.delete_child(&parent, child, position, &encoding);
        Ok(())
    }

    fn insert_descendant(&self, index: usize, value: &str) -> Result<()> {
        let level = self.level();
        check_structural_edit(level, msh_rules_apply(self), Operation::Insert, index)?;
        check_type_field_edit(self, ChildEdit::Insert(index, value))?;
        let (Address::Tree(parent), Some(position)) = (self.address(), child_position(level, index)) else {
            return Ok(());
        };
        debug!("insert {level:?} child {index}");
        let mut tree = self.doc.tree.borrow_mut();
        let encoding = tree.encoding;
        let root_level = tree.root_level;
        tree.root
            .insert_child(root_level, &parent, position, value, &encoding);
        Ok(())
    }

    fn move_descendant(&self, source: usize, target: usize) -> Result<()> {
        let level = self.level();
        let is_msh = msh_rules_apply(self);
        check_structural_edit(level, is_msh, Operation::Move, source)?;
        check_structural_edit(level, is_msh, Operation::Move, target)?;
        check_type_field_edit(self, ChildEdit::Move(source, target))?;
        if source == target {
            return Ok(());
        }
        let (Address::Tree(parent), Some(from), Some(to)) = (
            self.address(),
            child_position(level, source),
            child_position(level, target),
        ) else {
            return Ok(());
        };
        let count = self.doc.tree.borrow().root.child_count(&parent);
        if level.child().is_none() || (from >= count && to >= count) {
            return Ok(());
        }
        debug!("move {level:?} child {source} -> {target}");
        let value = self.descendant(source).value();
        let child = level.child().unwrap_or(Level::Subcomponent);
        let mut tree = self.doc.tree.borrow_mut();
        let encoding = tree.encoding;
        let root_level = tree.root_level;
        tree.root.delete_child(&parent, child, from, &encoding);
        tree.root
            .insert_child(root_level, &parent, to, &value, &encoding);
        Ok(())
    }
}

impl fmt::Debug for BuilderNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderNode")
            .field("path", &self.path)
            .field("value", &self.value())
            .finish()
    }
}

impl fmt::Display for BuilderNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value())
    }
}
