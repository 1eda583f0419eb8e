//! Canonical tree of editable nodes
//!
//! Building mode keeps every element as a node instead of a range of text.
//! Children are stored densely by position: segments by field number (with
//! MSH-1/MSH-2 held as placeholders, their values come from the encoding),
//! every other level by `index - 1`.

use log::debug;

use crate::core::{Encoding, MSH};
use crate::element::Level;

/// One element of the tree. Subcomponents carry `text`; every other level
/// carries `children`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    text: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    /// Build the subtree for `value` at `level`
    pub fn parse(level: Level, value: &str, encoding: &Encoding) -> Self {
        let Some(child) = level.child() else {
            return TreeNode {
                text: value.to_owned(),
                children: Vec::new(),
            };
        };
        if level == Level::Segment && is_msh_value(value) {
            return Self::parse_msh(value, encoding);
        }
        let children = match level.delimiter(encoding) {
            Some(delimiter) => value
                .split(char::from(delimiter))
                .map(|part| TreeNode::parse(child, part, encoding))
                .collect(),
            None => vec![TreeNode::parse(child, value, encoding)],
        };
        TreeNode {
            text: String::new(),
            children,
        }
    }

    /// MSH segment: type, two placeholders, then fields 3.. split with the
    /// segment's own field delimiter
    fn parse_msh(value: &str, encoding: &Encoding) -> Self {
        let encoding = Encoding::from_msh(value).unwrap_or(*encoding);
        let mut children = vec![
            TreeNode::parse(Level::Field, MSH, &encoding),
            TreeNode::empty(Level::Field, &encoding),
            TreeNode::empty(Level::Field, &encoding),
        ];
        let rest = value.get(4..).unwrap_or_default();
        children.extend(
            rest.split(encoding.field_delimiter())
                .skip(1)
                .map(|field| TreeNode::parse(Level::Field, field, &encoding)),
        );
        TreeNode {
            text: String::new(),
            children,
        }
    }

    /// An element holding the empty string
    pub fn empty(level: Level, encoding: &Encoding) -> Self {
        TreeNode::parse(level, "", encoding)
    }

    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    /// Text of this element at `level`
    pub fn render(&self, level: Level, encoding: &Encoding) -> String {
        let mut out = String::new();
        self.render_into(level, encoding, &mut out);
        out
    }

    fn render_into(&self, level: Level, encoding: &Encoding, out: &mut String) {
        let (Some(child), Some(delimiter)) = (level.child(), level.delimiter(encoding)) else {
            out.push_str(&self.text);
            return;
        };
        let delimiter = char::from(delimiter);
        if level == Level::Segment && self.is_msh(encoding) {
            out.push_str(MSH);
            out.push(delimiter);
            out.push_str(&encoding.encoding_characters());
            for field in self.children.iter().skip(3) {
                out.push(delimiter);
                field.render_into(child, encoding, out);
            }
            return;
        }
        for (i, node) in self.children.iter().enumerate() {
            if i > 0 {
                out.push(delimiter);
            }
            node.render_into(child, encoding, out);
        }
    }

    /// For segments: whether the type field reads `MSH`
    pub fn is_msh(&self, encoding: &Encoding) -> bool {
        self.children
            .first()
            .is_some_and(|ty| ty.render(Level::Field, encoding) == MSH)
    }

    /// Node at `positions` below this one, if it exists
    pub fn get(&self, positions: &[usize]) -> Option<&TreeNode> {
        positions
            .iter()
            .try_fold(self, |node, &position| node.children.get(position))
    }

    fn get_mut(&mut self, positions: &[usize]) -> Option<&mut TreeNode> {
        positions
            .iter()
            .try_fold(self, |node, &position| node.children.get_mut(position))
    }

    /// Node at `positions`, creating empty elements on the way
    pub fn get_or_pad(&mut self, level: Level, positions: &[usize], encoding: &Encoding) -> &mut TreeNode {
        let (Some((&first, rest)), Some(child)) = (positions.split_first(), level.child()) else {
            return self;
        };
        if self.children.len() <= first {
            debug!(
                "padding {} empty {child:?} element(s)",
                first + 1 - self.children.len()
            );
            self.children
                .resize_with(first + 1, || TreeNode::empty(child, encoding));
        }
        self.children[first].get_or_pad(child, rest, encoding)
    }

    /// Remove child `position` of the node at `parent`.
    ///
    /// The only child is emptied rather than removed, as removing it from
    /// the text would leave the same empty element behind.
    pub fn delete_child(&mut self, parent: &[usize], child: Level, position: usize, encoding: &Encoding) {
        let Some(node) = self.get_mut(parent) else {
            return;
        };
        match node.children.len() {
            len if position >= len => {}
            1 => node.children[0] = TreeNode::empty(child, encoding),
            _ => {
                node.children.remove(position);
            }
        }
    }

    /// Insert `value` as child `position` of the node at `parent`, padding
    /// when `position` is past the end. `level` is the level of `self`.
    pub fn insert_child(&mut self, level: Level, parent: &[usize], position: usize, value: &str, encoding: &Encoding) {
        let Some(child) = level_below(level, parent.len()).and_then(Level::child) else {
            return;
        };
        let node = self.get_or_pad(level, parent, encoding);
        let inserted = TreeNode::parse(child, value, encoding);
        if position < node.children.len() {
            node.children.insert(position, inserted);
        } else {
            node.children
                .resize_with(position, || TreeNode::empty(child, encoding));
            node.children.push(inserted);
        }
    }

    /// Number of children of the node at `parent`, 0 when absent
    pub fn child_count(&self, parent: &[usize]) -> usize {
        self.get(parent).map_or(0, |node| node.children.len())
    }
}

/// Level `depth` steps below `level`
pub fn level_below(level: Level, depth: usize) -> Option<Level> {
    (0..depth).try_fold(level, |level, _| level.child())
}

/// Whether a segment value starts with an MSH header
pub(super) fn is_msh_value(value: &str) -> bool {
    value == MSH
        || (value.starts_with(MSH)
            && value
                .as_bytes()
                .get(MSH.len())
                .is_some_and(u8::is_ascii_punctuation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn enc() -> Encoding {
        Encoding::default()
    }

    #[test]
    fn test_parse_render_identity() {
        for text in ["PID|1||a~b^c&d||", "OBX", "", "ZZ1|^^&"] {
            let node = TreeNode::parse(Level::Segment, text, &enc());
            assert_eq!(node.render(Level::Segment, &enc()), text);
        }
    }

    #[test]
    fn test_empty_is_a_chain() {
        let node = TreeNode::empty(Level::Field, &enc());
        assert_eq!(node.children().len(), 1);
        assert_eq!(node.children()[0].children().len(), 1);
        assert_eq!(node.get(&[0, 0, 0]).map(|n| n.render(Level::Subcomponent, &enc())), Some(String::new()));
    }

    #[test]
    fn test_msh_placeholders() {
        let node = TreeNode::parse(Level::Segment, "MSH|^~\\&|A|B", &enc());
        assert!(node.is_msh(&enc()));
        assert_eq!(node.children().len(), 5);
        assert_eq!(node.get(&[3]).map(|n| n.render(Level::Field, &enc())), Some("A".to_owned()));
        assert_eq!(node.render(Level::Segment, &enc()), "MSH|^~\\&|A|B");
    }

    #[test]
    fn test_msh_renders_current_encoding() {
        let node = TreeNode::parse(Level::Segment, "MSH|^~\\&|A^B", &enc());
        let custom = Encoding::new('#', '@', '*', '%', '!').unwrap();
        assert_eq!(node.render(Level::Segment, &custom), "MSH#*@!%#A*B");
    }

    #[test]
    fn test_pad_and_insert() {
        let mut node = TreeNode::parse(Level::Segment, "PID|1", &enc());
        node.get_or_pad(Level::Segment, &[4, 1], &enc());
        assert_eq!(node.render(Level::Segment, &enc()), "PID|1|||~");
        node.insert_child(Level::Segment, &[], 1, "0", &enc());
        assert_eq!(node.render(Level::Segment, &enc()), "PID|0|1|||~");
        node.insert_child(Level::Segment, &[], 8, "x", &enc());
        assert_eq!(node.render(Level::Segment, &enc()), "PID|0|1|||~|||x");
    }

    #[test]
    fn test_delete_child() {
        let mut node = TreeNode::parse(Level::Field, "a~b", &enc());
        node.delete_child(&[], Level::Repetition, 0, &enc());
        assert_eq!(node.render(Level::Field, &enc()), "b");
        node.delete_child(&[], Level::Repetition, 0, &enc());
        assert_eq!(node.render(Level::Field, &enc()), "");
        assert_eq!(node.child_count(&[]), 1);
    }
}
