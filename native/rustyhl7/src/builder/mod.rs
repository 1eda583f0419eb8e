//! Building Representation
//!
//! Mutation-oriented message model. Each element is a node of a canonical
//! tree, text is only produced on demand, and the delimiters are mutable
//! properties of the message rather than characters in a buffer.
//!
//! Changing a delimiter re-renders the whole message with the new character;
//! in parsing mode the same change only rewrites MSH-1/MSH-2.

pub mod node;
pub mod tree;

use std::cell::RefCell;
use std::fmt;

use log::warn;

use crate::core::input::{decode, normalize_line_endings, validate_message};
use crate::core::scanner::nth_division;
use crate::core::{Encoding, SEGMENT_DELIMITER};
use crate::element::{Element, Level};
use crate::error::{Hl7Error, Result};
use crate::parser::Message;
use crate::path;

pub use node::BuilderNode;
use tree::TreeNode;

#[derive(Debug, Clone)]
struct BuilderTree {
    encoding: Encoding,
    root: TreeNode,
    root_level: Level,
}

/// Tree plus encoding shared by every node of one builder
#[derive(Debug, Clone)]
pub struct BuilderDocument {
    tree: RefCell<BuilderTree>,
}

/// Delimiters declared by the MSH header of `value`, if it has one
fn declared_encoding(level: Level, value: &str) -> Option<Encoding> {
    let msh = match level {
        Level::Message => nth_division(value, Some(SEGMENT_DELIMITER), 0)?,
        Level::Segment => value,
        _ => return None,
    };
    Encoding::from_msh(msh)
}

impl BuilderDocument {
    fn new(root_level: Level, value: &str, encoding: Encoding) -> Self {
        let encoding = declared_encoding(root_level, value).unwrap_or(encoding);
        Self {
            tree: RefCell::new(BuilderTree {
                encoding,
                root: TreeNode::parse(root_level, value, &encoding),
                root_level,
            }),
        }
    }

    fn root(&self) -> BuilderNode<'_> {
        BuilderNode::new(self, Vec::new())
    }

    /// Rebuild the whole tree from `value`
    fn replace(&self, value: &str) {
        let mut tree = self.tree.borrow_mut();
        if let Some(encoding) = declared_encoding(tree.root_level, value) {
            tree.encoding = encoding;
        }
        let encoding = tree.encoding;
        tree.root = TreeNode::parse(tree.root_level, value, &encoding);
    }

    fn render(&self) -> String {
        let tree = self.tree.borrow();
        tree.root.render(tree.root_level, &tree.encoding)
    }

    fn update_encoding(&self, update: impl FnOnce(&mut Encoding) -> Result<()>) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        let mut encoding = tree.encoding;
        update(&mut encoding).inspect_err(|err| warn!("delimiter change rejected: {err}"))?;
        tree.encoding = encoding;
        Ok(())
    }
}

/// A message under construction
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    doc: BuilderDocument,
}

impl MessageBuilder {
    /// An empty message: just the MSH header with the standard delimiters
    pub fn new() -> Self {
        Self::with_encoding(Encoding::default())
    }

    /// An empty message using `encoding`
    pub fn with_encoding(encoding: Encoding) -> Self {
        Self {
            doc: BuilderDocument::new(Level::Message, &encoding.msh_prefix(), encoding),
        }
    }

    /// Build from message text. Line endings are normalised to `\r`.
    ///
    /// # Errors
    ///
    /// `MessageDataMissing`, `MessageTooShort` or `MessageMissingMsh`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = normalize_line_endings(text);
        let text = validate_message(Some(text.as_ref())).inspect_err(|err| warn!("message rejected: {err}"))?;
        Ok(Self {
            doc: BuilderDocument::new(Level::Message, text, Encoding::default()),
        })
    }

    /// Decode raw bytes, then build
    ///
    /// # Errors
    ///
    /// Decoding failures, then the same as `parse`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&decode(bytes)?)
    }

    pub fn root(&self) -> BuilderNode<'_> {
        self.doc.root()
    }

    /// Segment at 1-based `index`
    pub fn segment(&self, index: usize) -> BuilderNode<'_> {
        self.root().descendant(index)
    }

    pub fn segments(&self) -> impl Iterator<Item = BuilderNode<'_>> + '_ {
        let root = self.root();
        (1..=root.descendant_count()).map(move |i| root.descendant(i))
    }

    pub fn segment_count(&self) -> usize {
        self.root().descendant_count()
    }

    pub fn segments_of_type(&self, segment_type: &str) -> Vec<BuilderNode<'_>> {
        self.segments()
            .filter(|s| s.segment_type() == segment_type)
            .collect()
    }

    pub fn segment_of_type(&self, segment_type: &str) -> Option<BuilderNode<'_>> {
        self.segments().find(|s| s.segment_type() == segment_type)
    }

    pub fn segment_types(&self) -> Vec<String> {
        self.segments().map(|s| s.segment_type()).collect()
    }

    pub fn encoding(&self) -> Encoding {
        self.doc.tree.borrow().encoding
    }

    /// Replace all delimiters at once
    pub fn set_encoding(&self, encoding: Encoding) {
        self.doc.tree.borrow_mut().encoding = encoding;
    }

    /// # Errors
    ///
    /// `InvalidDelimiter`; the message is unchanged.
    pub fn set_field_delimiter(&self, c: char) -> Result<()> {
        self.doc.update_encoding(|e| e.set_field_delimiter(c))
    }

    /// # Errors
    ///
    /// `InvalidDelimiter`; the message is unchanged.
    pub fn set_repetition_delimiter(&self, c: char) -> Result<()> {
        self.doc.update_encoding(|e| e.set_repetition_delimiter(c))
    }

    /// # Errors
    ///
    /// `InvalidDelimiter`; the message is unchanged.
    pub fn set_component_delimiter(&self, c: char) -> Result<()> {
        self.doc.update_encoding(|e| e.set_component_delimiter(c))
    }

    /// # Errors
    ///
    /// `InvalidDelimiter`; the message is unchanged.
    pub fn set_subcomponent_delimiter(&self, c: char) -> Result<()> {
        self.doc.update_encoding(|e| e.set_subcomponent_delimiter(c))
    }

    /// # Errors
    ///
    /// `InvalidDelimiter`; the message is unchanged.
    pub fn set_escape_character(&self, c: char) -> Result<()> {
        self.doc.update_encoding(|e| e.set_escape_character(c))
    }

    /// Element at a location path, if its segment exists
    ///
    /// # Errors
    ///
    /// `InvalidPath` when the expression does not parse.
    pub fn node(&self, location: &str) -> Result<Option<BuilderNode<'_>>> {
        Ok(path::cache::compile(location)?.locate(&self.root()))
    }

    /// Value at a location path, "" when absent
    ///
    /// # Errors
    ///
    /// `InvalidPath` when the expression does not parse.
    pub fn get(&self, location: &str) -> Result<String> {
        Ok(self.node(location)?.map(|n| n.value()).unwrap_or_default())
    }

    /// Write the value at a location path
    ///
    /// # Errors
    ///
    /// `InvalidPath` when the expression does not parse or its segment does
    /// not exist, otherwise whatever the addressed element rejects.
    pub fn set(&self, location: &str, value: &str) -> Result<()> {
        match self.node(location)? {
            Some(node) => node.set_value(value),
            None => Err(Hl7Error::InvalidPath {
                path: location.to_owned(),
                reason: "no such segment",
            }),
        }
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.doc.render())
    }
}

impl From<&Message> for MessageBuilder {
    fn from(message: &Message) -> Self {
        Self {
            doc: BuilderDocument::new(Level::Message, &message.to_string(), message.encoding()),
        }
    }
}

impl TryFrom<&MessageBuilder> for Message {
    type Error = Hl7Error;

    fn try_from(builder: &MessageBuilder) -> Result<Self> {
        Message::parse(&builder.to_string())
    }
}

/// An independent builder rooted at one element's level
#[derive(Debug, Clone)]
pub struct DetachedBuilder {
    doc: BuilderDocument,
}

impl DetachedBuilder {
    pub(crate) fn new(level: Level, value: &str, encoding: Encoding) -> Self {
        Self {
            doc: BuilderDocument::new(level, value, encoding),
        }
    }

    /// Root element of the copy; it has no ancestor
    pub fn root(&self) -> BuilderNode<'_> {
        self.doc.root()
    }

    pub fn level(&self) -> Level {
        self.doc.tree.borrow().root_level
    }

    pub fn value(&self) -> String {
        self.doc.render()
    }
}

impl fmt::Display for DetachedBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.doc.render())
    }
}
