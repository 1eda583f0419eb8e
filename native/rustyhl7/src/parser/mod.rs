//! Parsing Representation
//!
//! Read-mostly message model over the original text. Nodes are positional
//! views into a divider arena; edits splice the one buffer and everything
//! else re-divides on its next read.
//!
//! ```text
//! Message
//! └── Document { RefCell<Dividers> }
//!     └── Node<'d> { &Document, DividerId }   (Copy, one per position)
//! ```

pub mod node;

use std::cell::RefCell;
use std::fmt;

use log::{debug, warn};

use crate::core::input::{decode, normalize_line_endings, validate_message};
use crate::core::Encoding;
use crate::divider::{DividerId, Dividers};
use crate::element::{Element, Level};
use crate::error::{Hl7Error, Result};
use crate::path;
use crate::reader::MessageView;

pub use node::Node;

/// Divider arena shared by every node of one message
#[derive(Debug, Clone)]
pub struct Document {
    dividers: RefCell<Dividers>,
}

impl Document {
    fn new(dividers: Dividers) -> Self {
        Self {
            dividers: RefCell::new(dividers),
        }
    }

    fn root(&self) -> Node<'_> {
        Node::new(self, DividerId::ROOT)
    }

    fn text(&self) -> String {
        self.dividers.borrow().as_str().to_owned()
    }
}

/// A parsed HL7 message
#[derive(Debug, Clone)]
pub struct Message {
    doc: Document,
}

impl Message {
    /// Parse message text. Line endings are normalised to `\r`.
    ///
    /// # Errors
    ///
    /// `MessageDataMissing`, `MessageTooShort` or `MessageMissingMsh`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = normalize_line_endings(text);
        let text = validate_message(Some(text.as_ref())).inspect_err(|err| warn!("message rejected: {err}"))?;
        Ok(Self {
            doc: Document::new(Dividers::new(text, Level::Message, Encoding::default())),
        })
    }

    /// Decode raw bytes (UTF-8 or UTF-16, with or without BOM), then parse
    ///
    /// # Errors
    ///
    /// Decoding failures, then the same as `parse`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&decode(bytes)?)
    }

    /// The message element
    pub fn root(&self) -> Node<'_> {
        self.doc.root()
    }

    /// Segment at 1-based `index`
    pub fn segment(&self, index: usize) -> Node<'_> {
        self.root().descendant(index)
    }

    pub fn segments(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        let root = self.root();
        (1..=root.descendant_count()).map(move |i| root.descendant(i))
    }

    pub fn segment_count(&self) -> usize {
        self.root().descendant_count()
    }

    /// All segments of `segment_type`, in message order
    pub fn segments_of_type(&self, segment_type: &str) -> Vec<Node<'_>> {
        self.segments()
            .filter(|s| s.segment_type() == segment_type)
            .collect()
    }

    /// First segment of `segment_type`
    pub fn segment_of_type(&self, segment_type: &str) -> Option<Node<'_>> {
        self.segments().find(|s| s.segment_type() == segment_type)
    }

    /// Type of every segment, in message order
    pub fn segment_types(&self) -> Vec<String> {
        self.segments().map(|s| s.segment_type()).collect()
    }

    /// Delimiters resolved from MSH
    pub fn encoding(&self) -> Encoding {
        self.root().encoding()
    }

    /// Element at a location path such as `PID.3[2].1`, if its segment exists
    ///
    /// # Errors
    ///
    /// `InvalidPath` when the expression does not parse.
    pub fn node(&self, location: &str) -> Result<Option<Node<'_>>> {
        Ok(path::cache::compile(location)?.locate(&self.root()))
    }

    /// Value at a location path, "" when absent
    ///
    /// # Errors
    ///
    /// `InvalidPath` when the expression does not parse.
    pub fn get(&self, location: &str) -> Result<String> {
        let path = path::cache::compile(location)?;
        let dividers = self.doc.dividers.borrow();
        Ok(MessageView::new(dividers.as_str()).resolve(&path))
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

    /// Number of divider slots created so far
    pub fn divider_count(&self) -> usize {
        self.doc.dividers.borrow().descendant_count()
    }

    /// Drop every cached divider slot. Positions are re-created on their
    /// next read; no `Node` can be alive across this call.
    pub fn compact(&mut self) {
        debug!("dropping {} divider slots", self.divider_count());
        self.doc.dividers.get_mut().clear_slots();
    }

    pub fn into_string(self) -> String {
        self.doc.dividers.into_inner().into_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.doc.dividers.borrow().as_str())
    }
}

impl std::str::FromStr for Message {
    type Err = Hl7Error;

    fn from_str(s: &str) -> Result<Self> {
        Message::parse(s)
    }
}

/// An independent copy of one element, rooted at that element's level
#[derive(Debug, Clone)]
pub struct Detached {
    doc: Document,
}

impl Detached {
    fn from_dividers(dividers: Dividers) -> Self {
        Self {
            doc: Document::new(dividers),
        }
    }

    /// Root element of the copy; it has no ancestor
    pub fn root(&self) -> Node<'_> {
        self.doc.root()
    }

    pub fn level(&self) -> Level {
        self.doc.dividers.borrow().root_level()
    }

    pub fn value(&self) -> String {
        self.doc.text()
    }
}

impl fmt::Display for Detached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.doc.dividers.borrow().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementExt, ElementKind};
    use crate::error::Operation;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const EXAMPLE: &str = "MSH|^~\\&|A|B\rPID|1|2\r";
    const ADT: &str = "MSH|^~\\&|SEND|FAC|RECV|FAC|20240101||ADT^A01|123|P|2.5\r\
                       PID|1||555^^^MRN~777^^^SSN||DOE^JOHN^Q||19700101|M\r\
                       OBX|1|ST|A^B||v1\r\
                       OBX|2|ST|C^D||v2";

    #[test]
    fn test_concrete_example() {
        let message = Message::parse(EXAMPLE).unwrap();
        assert_eq!(message.segment(1).descendant(3).value(), "A");
        assert_eq!(message.segment(2).segment_type(), "PID");
        assert_eq!(message.segment(2).descendant(1).value(), "1");

        message.segment(1).insert_after("OBR|9").unwrap();
        assert_eq!(message.segment(2).segment_type(), "OBR");
        assert_eq!(message.segment(3).segment_type(), "PID");
        assert_eq!(message.to_string(), "MSH|^~\\&|A|B\rOBR|9\rPID|1|2\r");
    }

    #[rstest]
    #[case(EXAMPLE)]
    #[case(ADT)]
    #[case("MSH|^~\\&|A\r\rPID|1")]
    fn test_round_trip(#[case] text: &str) {
        assert_eq!(Message::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_round_trip_normalises_line_endings() {
        let message = Message::parse("MSH|^~\\&|A\r\nPID|1\nPV1|2").unwrap();
        assert_eq!(message.to_string(), "MSH|^~\\&|A\rPID|1\rPV1|2");
    }

    #[rstest]
    #[case("", Hl7Error::MessageDataMissing)]
    #[case("MSH|^~", Hl7Error::MessageTooShort { length: 6 })]
    #[case("PID|1|2|3|4", Hl7Error::MessageMissingMsh)]
    fn test_shape_violations(#[case] text: &str, #[case] expected: Hl7Error) {
        assert_eq!(Message::parse(text).unwrap_err(), expected);
    }

    #[test]
    fn test_msh_fixed_fields() {
        let message = Message::parse(ADT).unwrap();
        let msh = message.segment(1);
        assert!(msh.is_msh());
        let delimiter = msh.descendant(1);
        assert_eq!(delimiter.value(), "|");
        assert_eq!(delimiter.kind(), ElementKind::FieldDelimiter);
        assert_eq!(delimiter.delimiter(), None);
        let characters = msh.descendant(2);
        assert_eq!(characters.value(), "^~\\&");
        assert_eq!(characters.kind(), ElementKind::EncodingCharacters);
        assert_eq!(characters.descendant(1).value(), "^~\\&");
        assert!(characters.descendant(2).is_null());
        assert_eq!(msh.descendant(9).value(), "ADT^A01");
        assert_eq!(msh.descendant(9).descendant(1).descendant(2).value(), "A01");
        assert_eq!(msh.descendant_count(), 12);
    }

    #[test]
    fn test_out_of_range_reads_are_empty() {
        let message = Message::parse(EXAMPLE).unwrap();
        let far = message.segment(40).descendant(7).descendant(3).descendant(2);
        assert!(far.is_null());
        assert_eq!(far.value_count(), 0);
        assert_eq!(message.to_string(), EXAMPLE);
    }

    #[test]
    fn test_write_pads() {
        let message = Message::parse("MSH|^~\\&|A\rPID|1").unwrap();
        message.segment(2).descendant(5).descendant(2).descendant(3).set_value("x").unwrap();
        assert_eq!(message.to_string(), "MSH|^~\\&|A\rPID|1||||~^^x");
        assert_eq!(message.get("PID.5[2].3").unwrap(), "x");
    }

    #[test]
    fn test_write_to_new_segment() {
        let message = Message::parse("MSH|^~\\&|A").unwrap();
        message.segment(3).descendant(2).set_value("b").unwrap();
        assert_eq!(message.to_string(), "MSH|^~\\&|A\r\r||b");
    }

    #[test]
    fn test_delete_then_reindex() {
        let message = Message::parse("MSH|^~\\&|A\rPID|a|b|c|d").unwrap();
        let pid = message.segment(2);
        let third = pid.descendant(3);
        pid.delete_descendant(2).unwrap();
        assert_eq!(pid.descendant_count(), 3);
        assert_eq!(pid.descendant(2).value(), "c");
        assert_eq!(pid.descendant(3).value(), "d");
        assert!(pid.descendant(4).is_null());
        // handles are positional
        assert_eq!(third.value(), "d");
    }

    #[test]
    fn test_delete_via_extension() {
        let message = Message::parse("MSH|^~\\&|A\rPID|1\rPV1|2\rOBX|3").unwrap();
        message.segment(3).delete().unwrap();
        assert_eq!(message.segment_types(), vec!["MSH", "PID", "OBX"]);
        assert_eq!(
            message.root().delete(),
            Err(Hl7Error::RootElement { operation: Operation::Delete })
        );
    }

    #[test]
    fn test_move() {
        let message = Message::parse("MSH|^~\\&|A\rPID|a|b|c|d").unwrap();
        let pid = message.segment(2);
        pid.move_descendant(1, 3).unwrap();
        assert_eq!(pid.value(), "PID|b|c|a|d");
        pid.descendant(4).move_to(1).unwrap();
        assert_eq!(pid.value(), "PID|d|b|c|a");
    }

    #[rstest]
    #[case(3)]
    #[case(5)]
    #[case(12)]
    fn test_move_to_self_is_noop(#[case] index: usize) {
        let message = Message::parse(ADT).unwrap();
        message.segment(1).move_descendant(index, index).unwrap();
        message.segment(2).move_descendant(index, index).unwrap();
        assert_eq!(message.to_string(), ADT);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    fn test_fixed_leaf_protection(#[case] index: usize) {
        let message = Message::parse(ADT).unwrap();
        let msh = message.segment(1);
        assert!(msh.delete_descendant(index).unwrap_err().is_structural());
        assert!(msh.move_descendant(index, 5).unwrap_err().is_structural());
        assert!(msh.move_descendant(5, index).unwrap_err().is_structural());
        assert!(msh.descendant(index).delete().is_err());
        assert_eq!(message.to_string(), ADT);
    }

    #[test]
    fn test_non_msh_type_field_protected() {
        let message = Message::parse(ADT).unwrap();
        let pid = message.segment(2);
        assert_eq!(
            pid.delete_descendant(0),
            Err(Hl7Error::FixedElement { operation: Operation::Delete, index: 0 })
        );
        assert!(pid.delete_descendant(1).is_ok());
        assert!(pid.move_descendant(1, 2).is_ok());
    }

    #[test]
    fn test_index_below_minimum() {
        let message = Message::parse(EXAMPLE).unwrap();
        assert_eq!(
            message.root().move_descendant(0, 1),
            Err(Hl7Error::IndexBelowMinimum { index: 0, minimum: 1 })
        );
        assert!(message.segment(0).set_value("ZZZ|1").is_err());
        assert!(message.segment(2).descendant(1).descendant(0).set_value("x").is_err());
    }

    #[test]
    fn test_type_transitions() {
        let message = Message::parse(EXAMPLE).unwrap();
        assert!(message.segment(2).descendant(0).set_value("MSH").is_err());
        assert!(message.segment(1).descendant(0).set_value("PID").is_err());
        assert!(message.segment(2).set_value("MSH|^~\\&|X").is_err());
        assert!(message.segment(2).descendant(0).set_value("PV1").is_ok());
        assert_eq!(message.segment(1).set_value(""), Err(Hl7Error::MshSegmentDataMissing));
        message.segment(4).set_value("MSH|^~\\&|Z").unwrap();
        assert_eq!(message.segment(4).segment_type(), "MSH");
    }

    #[test]
    fn test_field_delimiter_write() {
        let message = Message::parse("MSH|^~\\&|A|B").unwrap();
        let delimiter = message.segment(1).descendant(1);
        assert_eq!(
            delimiter.set_value("##"),
            Err(Hl7Error::FieldDelimiterLength { length: 2 })
        );
        delimiter.set_value("#").unwrap();
        assert_eq!(message.to_string(), "MSH#^~\\&|A|B");
        assert_eq!(message.encoding().field_delimiter(), '#');
    }

    #[test]
    fn test_encoding_characters_write() {
        let message = Message::parse("MSH|^~\\&|A^B").unwrap();
        message.segment(1).descendant(2).set_value("*~\\&").unwrap();
        assert_eq!(message.encoding().component_delimiter(), '*');
        assert_eq!(message.segment(1).descendant(3).descendant(1).descendant(1).value(), "A^B");
        assert!(message.segment(1).descendant(2).set_value("é~\\&").is_err());
    }

    #[test]
    fn test_message_value_write() {
        let message = Message::parse(EXAMPLE).unwrap();
        assert!(message.root().set_value("PID|1").is_err());
        message.root().set_value("MSH|^~\\&|Z\nPV1|1").unwrap();
        assert_eq!(message.to_string(), "MSH|^~\\&|Z\rPV1|1");
        assert_eq!(message.segment(2).descendant(1).value(), "1");
    }

    #[test]
    fn test_segments_by_type() {
        let message = Message::parse(ADT).unwrap();
        let obx = message.segments_of_type("OBX");
        assert_eq!(obx.len(), 2);
        assert_eq!(obx[1].descendant(5).value(), "v2");
        assert_eq!(message.segment_of_type("PID").map(|s| s.index()), Some(2));
        assert!(message.segment_of_type("ZZZ").is_none());
    }

    #[test]
    fn test_paths() {
        let message = Message::parse(ADT).unwrap();
        assert_eq!(message.get("PID.3[2].1").unwrap(), "777");
        assert_eq!(message.get("PID-5.2").unwrap(), "JOHN");
        assert_eq!(message.get("OBX[2].5").unwrap(), "v2");
        assert_eq!(message.get("OBX4.3.1.2").unwrap(), "D");
        assert_eq!(message.get("ZZZ.1").unwrap(), "");
        message.set("PID.5.1", "ROE").unwrap();
        assert_eq!(message.get("PID.5").unwrap(), "ROE^JOHN^Q");
        assert!(message.set("ZZZ.1", "x").is_err());
        assert!(message.get("P").is_err());
    }

    #[test]
    fn test_key() {
        let message = Message::parse(ADT).unwrap();
        let node = message.segment(1).descendant(3).descendant(1).descendant(1).descendant(1);
        assert_eq!(node.key(), "MSH1.3.1.1.1");
        assert_eq!(message.segment(4).descendant(2).key(), "OBX4.2");
        assert_eq!(message.root().key(), "");
        assert_eq!(message.get(&node.key()).unwrap(), "SEND");
    }

    #[test]
    fn test_counts() {
        let message = Message::parse("MSH|^~\\&|A\rPID|1|a~b~|x^y").unwrap();
        let pid = message.segment(2);
        assert_eq!(pid.descendant_count(), 3);
        assert_eq!(pid.descendant(2).value_count(), 3);
        assert_eq!(pid.descendant(2).descendant_count(), 3);
        assert_eq!(pid.descendant(2).trimmed_values().len(), 2);
        assert_eq!(pid.descendant(3).descendant(1).value_count(), 2);
        assert_eq!(pid.descendant(9).value_count(), 0);
    }

    #[test]
    fn test_hl7_null() {
        let message = Message::parse(EXAMPLE).unwrap();
        let field = message.segment(2).descendant(2);
        assert!(!field.is_hl7_null());
        field.nullify().unwrap();
        assert!(field.is_hl7_null());
        assert!(!field.is_null());
        assert_eq!(message.to_string(), "MSH|^~\\&|A|B\rPID|1|\"\"\r");
    }

    #[test]
    fn test_detach() {
        let message = Message::parse(ADT).unwrap();
        let detached = message.segment(2).detach();
        assert_eq!(detached.level(), Level::Segment);
        let root = detached.root();
        assert!(root.ancestor().is_none());
        assert_eq!(root.descendant(5).descendant(1).descendant(2).value(), "JOHN");
        root.descendant(1).set_value("99").unwrap();
        assert_eq!(message.segment(2).descendant(1).value(), "1");
        assert!(detached.value().starts_with("PID|99|"));
        assert_eq!(root.insert_after("x"), Err(Hl7Error::NoAncestor { operation: Operation::Insert }));
        assert_eq!(root.key(), "PID0");
    }

    #[test]
    fn test_clone_is_independent() {
        let message = Message::parse(EXAMPLE).unwrap();
        let copy = message.clone();
        copy.segment(2).descendant(1).set_value("7").unwrap();
        assert_eq!(message.to_string(), EXAMPLE);
        assert_eq!(copy.get("PID.1").unwrap(), "7");
    }

    #[test]
    fn test_insert_element() {
        let message = Message::parse("MSH|^~\\&|A\rPID|a|c").unwrap();
        let source = Message::parse("MSH|^~\\&|A\rPID|b").unwrap();
        message.segment(2).insert_element(2, &source.segment(2).descendant(1)).unwrap();
        assert_eq!(message.segment(2).value(), "PID|a|b|c");
    }

    #[test]
    fn test_insert_before() {
        let message = Message::parse("MSH|^~\\&|A\rPID|a|c").unwrap();
        message.segment(2).descendant(2).insert_before("b").unwrap();
        assert_eq!(message.segment(2).value(), "PID|a|b|c");
        assert_eq!(
            message.root().insert_before("x"),
            Err(Hl7Error::NoAncestor { operation: Operation::Insert })
        );
    }

    #[test]
    fn test_insert_element_needs_ancestor() {
        let message = Message::parse("MSH|^~\\&|A\rPID|a|c").unwrap();
        let detached = message.segment(2).descendant(1).detach();
        assert_eq!(
            message.segment(2).insert_element(2, &detached.root()),
            Err(Hl7Error::NoAncestor { operation: Operation::Insert })
        );
        assert_eq!(message.segment(2).value(), "PID|a|c");
    }

    #[test]
    fn test_nested_type_field_writes_checked() {
        let message = Message::parse(EXAMPLE).unwrap();
        let pid_type = message.segment(2).descendant(0);
        assert_eq!(
            pid_type.descendant(1).set_value("MSH"),
            Err(Hl7Error::IllegalTypeTransition { from: "PID".into(), to: "MSH".into() })
        );
        assert!(pid_type.descendant(1).descendant(1).descendant(1).set_value("MSH").is_err());
        let msh_type = message.segment(1).descendant(0);
        assert!(msh_type.descendant(1).descendant(1).set_value("PID").is_err());
        assert!(msh_type.descendant(1).descendant(1).descendant(1).set_value("PID").is_err());
        assert_eq!(message.to_string(), EXAMPLE);

        pid_type.descendant(1).set_value("PV1").unwrap();
        msh_type.descendant(1).descendant(1).descendant(1).set_value("MSH").unwrap();
        assert_eq!(message.to_string(), "MSH|^~\\&|A|B\rPV1|1|2\r");
    }

    #[test]
    fn test_type_field_structural_edits_checked() {
        let message = Message::parse(EXAMPLE).unwrap();
        let msh_type = message.segment(1).descendant(0);
        assert_eq!(
            msh_type.insert_descendant(2, "X"),
            Err(Hl7Error::IllegalTypeTransition { from: "MSH".into(), to: "MSH~X".into() })
        );
        assert!(msh_type.insert_descendant(1, "X").is_err());
        assert!(msh_type.descendant(1).delete_descendant(1).is_err());
        assert!(msh_type.descendant(1).move_descendant(1, 2).is_err());
        assert!(msh_type.descendant(1).descendant(1).delete().is_err());
        assert_eq!(message.to_string(), EXAMPLE);

        message.segment(2).descendant(0).insert_descendant(2, "X").unwrap();
        assert_eq!(message.segment(2).value(), "PID~X|1|2");
    }

    #[test]
    fn test_header_segment_protected() {
        let message = Message::parse(ADT).unwrap();
        let root = message.root();
        assert_eq!(
            message.segment(1).delete(),
            Err(Hl7Error::HeaderSegment { operation: Operation::Delete })
        );
        assert_eq!(
            root.insert_descendant(1, "ZZZ|x"),
            Err(Hl7Error::HeaderSegment { operation: Operation::Insert })
        );
        assert!(root.move_descendant(2, 1).unwrap_err().is_structural());
        assert!(root.move_descendant(1, 3).unwrap_err().is_structural());
        assert!(message.segment(1).move_to(4).is_err());
        assert_eq!(message.to_string(), ADT);

        root.move_descendant(2, 3).unwrap();
        assert_eq!(message.segment_types(), ["MSH", "OBX", "PID", "OBX"]);
        message.segment(1).insert_after("ZZZ|x").unwrap();
        assert_eq!(message.segment(2).segment_type(), "ZZZ");
    }

    #[test]
    fn test_path_reads_do_not_grow_dividers() {
        let message = Message::parse(EXAMPLE).unwrap();
        for n in 3..10_003 {
            assert_eq!(message.get(&format!("PID.{n}")).unwrap(), "");
        }
        assert_eq!(message.get("PID.2").unwrap(), "2");
        assert_eq!(message.divider_count(), 0);
        assert_eq!(message.to_string(), EXAMPLE);
    }

    #[test]
    fn test_compact_drops_cached_dividers() {
        let mut message = Message::parse(ADT).unwrap();
        for n in 1..100 {
            let _ = message.segment(2).descendant(n).value();
        }
        assert!(message.divider_count() >= 99);
        message.compact();
        assert_eq!(message.divider_count(), 0);
        assert_eq!(message.segment(2).descendant(5).descendant(1).descendant(2).value(), "JOHN");
    }

    #[test]
    fn test_custom_delimiters() {
        let message = Message::parse("MSH#*@!%#A*B@C%D").unwrap();
        let field = message.segment(1).descendant(3);
        assert_eq!(field.descendant_count(), 2);
        assert_eq!(field.descendant(2).descendant(1).descendant(2).value(), "D");
        assert_eq!(field.descendant(1).descendant(2).value(), "B");
    }

    #[test]
    fn test_from_bytes_utf16() {
        let bytes: Vec<u8> = [0xFF, 0xFE]
            .into_iter()
            .chain(EXAMPLE.encode_utf16().flat_map(u16::to_le_bytes))
            .collect();
        assert_eq!(Message::from_bytes(&bytes).unwrap().to_string(), EXAMPLE);
    }
}
