//! Element Module - the contract shared by both message representations
//!
//! Parsing mode (`crate::parser`) and building mode (`crate::builder`) expose
//! the same six-level hierarchy. Both implement `Element`, so the structural
//! rules here and the algorithms in `ext` are written once.
//!
//! Indices are external: segments and repetitions/components/subcomponents
//! are 1-based, fields are numbered from 0 (the segment type). In an MSH
//! segment field 1 is the field delimiter itself and field 2 the encoding
//! characters; both are fixed leaves.

pub mod ext;

use log::warn;

use crate::core::input::validate_message;
use crate::core::{Encoding, HL7_NULL, MSH, SEGMENT_DELIMITER};
use crate::error::{Hl7Error, Operation, Result};

pub use ext::ElementExt;

/// The six levels of the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Message,
    Segment,
    Field,
    Repetition,
    Component,
    Subcomponent,
}

impl Level {
    /// One level finer, `None` below subcomponents
    pub fn child(self) -> Option<Level> {
        match self {
            Level::Message => Some(Level::Segment),
            Level::Segment => Some(Level::Field),
            Level::Field => Some(Level::Repetition),
            Level::Repetition => Some(Level::Component),
            Level::Component => Some(Level::Subcomponent),
            Level::Subcomponent => None,
        }
    }

    /// Character splitting an element of this level into its children
    pub fn delimiter(self, encoding: &Encoding) -> Option<u8> {
        match self {
            Level::Message => Some(SEGMENT_DELIMITER),
            Level::Segment => Some(encoding.field_byte()),
            Level::Field => Some(encoding.repetition_byte()),
            Level::Repetition => Some(encoding.component_byte()),
            Level::Component => Some(encoding.subcomponent_byte()),
            Level::Subcomponent => None,
        }
    }

    /// Smallest external index a child of this level can have
    pub fn minimum_child_index(self) -> usize {
        match self {
            Level::Segment => 0,
            _ => 1,
        }
    }
}

/// What a node is, beyond its level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Ordinary divisible element
    Normal,
    /// MSH-1
    FieldDelimiter,
    /// MSH-2
    EncodingCharacters,
}

/// Whether a segment's child at `index` is structurally fixed
pub fn is_fixed_field(is_msh: bool, index: usize) -> bool {
    index == 0 || (is_msh && index <= 2)
}

/// Kind of the field at `index` in a segment
pub fn field_kind(is_msh: bool, index: usize) -> ElementKind {
    match (is_msh, index) {
        (true, 1) => ElementKind::FieldDelimiter,
        (true, 2) => ElementKind::EncodingCharacters,
        _ => ElementKind::Normal,
    }
}

/// Position of an external child index inside the parent's divisions,
/// `None` when the index does not address a division
pub fn division_index(level: Level, is_msh: bool, index: usize) -> Option<usize> {
    match level {
        Level::Segment if is_msh => match index {
            0 => Some(0),
            1 => None,
            _ => Some(index - 1),
        },
        Level::Segment => Some(index),
        _ => index.checked_sub(1),
    }
}

/// Validate a structural edit of the child at `index` of an element at `level`
///
/// # Errors
///
/// `IndexBelowMinimum` below the level's first index, `FixedElement` for the
/// segment type field and MSH-1/MSH-2, `HeaderSegment` for segment 1 of a
/// message that starts with MSH.
///
/// At message level `is_msh` tells whether segment 1 is an MSH segment.
pub fn check_structural_edit(level: Level, is_msh: bool, operation: Operation, index: usize) -> Result<()> {
    let minimum = level.minimum_child_index();
    let result = if index < minimum {
        Err(Hl7Error::IndexBelowMinimum { index, minimum })
    } else if level == Level::Message && is_msh && index == 1 {
        Err(Hl7Error::HeaderSegment { operation })
    } else if level == Level::Segment && is_fixed_field(is_msh, index) {
        Err(Hl7Error::FixedElement { operation, index })
    } else {
        Ok(())
    };
    if let Err(err) = &result {
        warn!("{operation} rejected: {err}");
    }
    result
}

/// Whether the MSH rules govern edits of `element`'s children: it is an MSH
/// segment, or a message whose first segment is MSH
pub fn msh_rules_apply<E: Element>(element: &E) -> bool {
    match element.level() {
        Level::Message => element.descendant(1).is_msh(),
        _ => element.is_msh(),
    }
}

/// Type of a segment value under `encoding`
pub fn segment_type_of<'a>(value: &'a str, encoding: &Encoding) -> &'a str {
    value
        .split(encoding.field_delimiter())
        .next()
        .unwrap_or_default()
}

/// Validate replacing a segment's type `from` with `to`.
///
/// An empty type has not been written yet, so any first write is allowed.
///
/// # Errors
///
/// `IllegalTypeTransition` when the change would turn an MSH segment into
/// something else or the reverse.
pub fn check_type_transition(from: &str, to: &str) -> Result<()> {
    if !from.is_empty() && (from == MSH) != (to == MSH) {
        warn!("segment type change {from:?} -> {to:?} rejected");
        return Err(Hl7Error::IllegalTypeTransition {
            from: from.to_owned(),
            to: to.to_owned(),
        });
    }
    Ok(())
}

/// Validate a new value for a whole segment currently typed `current`
///
/// # Errors
///
/// `MshSegmentDataMissing`, `SegmentTooShort` or `IllegalTypeTransition`.
pub fn check_segment_value(current: &str, value: &str, encoding: &Encoding) -> Result<()> {
    if current == MSH && value.is_empty() {
        return Err(Hl7Error::MshSegmentDataMissing);
    }
    let next = if value.starts_with(MSH) {
        MSH
    } else {
        segment_type_of(value, encoding)
    };
    check_type_transition(current, next)?;
    if next == MSH && value.len() < crate::core::input::MIN_MESSAGE_LENGTH {
        return Err(Hl7Error::SegmentTooShort { length: value.len() });
    }
    Ok(())
}

/// Validate a value written into MSH-1 or MSH-2
///
/// # Errors
///
/// `FieldDelimiterLength` or `InvalidDelimiter`.
pub fn check_fixed_value(kind: ElementKind, value: &str, encoding: &Encoding) -> Result<()> {
    let mut probe = *encoding;
    match kind {
        ElementKind::FieldDelimiter => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => probe.set_field_delimiter(c),
                _ => Err(Hl7Error::FieldDelimiterLength {
                    length: value.chars().count(),
                }),
            }
        }
        ElementKind::EncodingCharacters => probe.set_encoding_characters(value),
        ElementKind::Normal => Ok(()),
    }
}

/// Validate writing `value` into `element`, whichever representation it
/// belongs to. Message values must already have normalised line endings.
///
/// # Errors
///
/// Message-shape, segment-shape, type-transition and delimiter violations.
pub fn check_value<E: Element>(element: &E, value: &str) -> Result<()> {
    let result = match (element.level(), element.kind()) {
        (Level::Message, _) => validate_message(Some(value)).map(|_| ()),
        (Level::Segment, _) => check_segment_value(&element.segment_type(), value, &element.encoding()),
        (_, ElementKind::Normal) => check_type_field_write(element, value),
        (_, kind) => check_fixed_value(kind, value, &element.encoding()),
    };
    if let Err(err) = &result {
        warn!("write rejected: {err}");
    }
    result
}

/// Segment owning `element` and the indices leading from the segment's type
/// field down to `element`, when `element` is the type field or lies below it
fn type_field_path<E: Element>(element: &E) -> Option<(E, Vec<usize>)> {
    let mut below = Vec::new();
    let mut level = element.level();
    let mut index = element.index();
    let mut parent = element.ancestor()?;
    while level > Level::Field {
        below.push(index);
        level = parent.level();
        index = parent.index();
        parent = parent.ancestor()?;
    }
    if level != Level::Field || index != 0 || parent.level() != Level::Segment {
        return None;
    }
    below.reverse();
    Some((parent, below))
}

/// Replace the value found by following `indices` (1-based) through `text`,
/// splitting by one delimiter per step and padding missing positions
fn replace_nested(text: &str, delimiters: &[char], indices: &[usize], value: &str) -> String {
    let (Some((&index, rest)), Some((&delimiter, deeper))) = (indices.split_first(), delimiters.split_first())
    else {
        return value.to_owned();
    };
    let Some(position) = index.checked_sub(1) else {
        return text.to_owned();
    };
    let mut parts: Vec<String> = text.split(delimiter).map(str::to_owned).collect();
    if parts.len() <= position {
        parts.resize(position + 1, String::new());
    }
    parts[position] = replace_nested(&parts[position], deeper, rest, value);
    parts.join(delimiter.to_string().as_str())
}

fn type_field_delimiters(encoding: &Encoding) -> [char; 3] {
    [
        encoding.repetition_delimiter(),
        encoding.component_delimiter(),
        encoding.subcomponent_delimiter(),
    ]
}

/// Current type of `segment`, and its type once `field_value` is written at
/// `below` inside the type field
fn type_after_write<E: Element>(segment: &E, below: &[usize], field_value: &str) -> (String, String) {
    let current = segment.segment_type();
    let next = replace_nested(&current, &type_field_delimiters(&segment.encoding()), below, field_value);
    (current, next)
}

/// Writes into the type field, or anything nested in it, must not turn a
/// segment into MSH or out of it
fn check_type_field_write<E: Element>(element: &E, value: &str) -> Result<()> {
    match type_field_path(element) {
        Some((segment, below)) => {
            let (current, next) = type_after_write(&segment, &below, value);
            check_type_transition(&current, &next)
        }
        None => Ok(()),
    }
}

/// A structural edit of an element's children, with external 1-based indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEdit<'a> {
    Delete(usize),
    Insert(usize, &'a str),
    Move(usize, usize),
}

impl ChildEdit<'_> {
    /// Apply the edit to a list of child values the way a divider would
    fn apply(self, values: &mut Vec<String>) {
        match self {
            ChildEdit::Delete(index) => delete_value(values, index),
            ChildEdit::Insert(index, value) => insert_value(values, index, value),
            ChildEdit::Move(source, target) => {
                if source == target || (source > values.len() && target > values.len()) {
                    return;
                }
                let value = source
                    .checked_sub(1)
                    .and_then(|i| values.get(i))
                    .cloned()
                    .unwrap_or_default();
                delete_value(values, source);
                insert_value(values, target, &value);
            }
        }
    }
}

fn delete_value(values: &mut Vec<String>, index: usize) {
    match index.checked_sub(1) {
        Some(_) if values.len() == 1 && index == 1 => values[0].clear(),
        Some(i) if i < values.len() => {
            values.remove(i);
        }
        _ => {}
    }
}

fn insert_value(values: &mut Vec<String>, index: usize, value: &str) {
    let Some(position) = index.checked_sub(1) else {
        return;
    };
    if position < values.len() {
        values.insert(position, value.to_owned());
    } else {
        values.resize(position, String::new());
        values.push(value.to_owned());
    }
}

/// Validate a structural edit of `parent`'s children against the type of the
/// segment, for parents that are a type field or lie inside one
///
/// # Errors
///
/// `IllegalTypeTransition` when the edit would turn the segment into MSH or
/// out of it.
pub fn check_type_field_edit<E: Element>(parent: &E, edit: ChildEdit<'_>) -> Result<()> {
    let (Some((segment, below)), Some(delimiter)) = (type_field_path(parent), parent.delimiter()) else {
        return Ok(());
    };
    let mut values = parent.values();
    edit.apply(&mut values);
    let field_value = values.join(delimiter.to_string().as_str());
    let (current, next) = type_after_write(&segment, &below, &field_value);
    check_type_transition(&current, &next)
}

/// A node of either message representation.
///
/// Nodes are positional views: a node stands for "child `index` of its
/// ancestor", whatever that currently holds. Reads never fail; reading past
/// the end of the content yields empty values.
pub trait Element: Sized {
    /// Level of this node
    fn level(&self) -> Level;

    /// Fixed-leaf kind (MSH-1, MSH-2) or normal
    fn kind(&self) -> ElementKind;

    /// External index within the ancestor; 0 for roots
    fn index(&self) -> usize;

    /// Parent node, `None` for a message or a detached root
    fn ancestor(&self) -> Option<Self>;

    /// Child at external `index`. Always succeeds; the child may be absent.
    fn descendant(&self, index: usize) -> Self;

    /// Delimiters in effect for this node
    fn encoding(&self) -> Encoding;

    /// Character splitting this node's value, `None` for leaves
    fn delimiter(&self) -> Option<char>;

    /// Raw value, "" when absent
    fn value(&self) -> String;

    /// Replace the raw value
    ///
    /// # Errors
    ///
    /// Message-shape, type-transition and delimiter violations.
    fn set_value(&self, value: &str) -> Result<()>;

    /// Raw values of the divisions of this node
    fn values(&self) -> Vec<String>;

    /// Remove the child at `index`, shifting later children down
    ///
    /// # Errors
    ///
    /// Structural-edit violations.
    fn delete_descendant(&self, index: usize) -> Result<()>;

    /// Insert `value` as the child at `index`, shifting later children up
    ///
    /// # Errors
    ///
    /// Structural-edit violations.
    fn insert_descendant(&self, index: usize, value: &str) -> Result<()>;

    /// Move the child at `source` to `target`
    ///
    /// # Errors
    ///
    /// Structural-edit violations.
    fn move_descendant(&self, source: usize, target: usize) -> Result<()>;

    /// Absent, or present with no characters
    fn is_null(&self) -> bool {
        self.value().is_empty()
    }

    /// Holds the explicit HL7 null `""`
    fn is_hl7_null(&self) -> bool {
        self.value() == HL7_NULL
    }

    /// Number of values, 0 when null
    fn value_count(&self) -> usize {
        if self.is_null() {
            0
        } else {
            self.values().len()
        }
    }

    /// For segments: whether this is an MSH segment
    fn is_msh(&self) -> bool {
        self.level() == Level::Segment && self.segment_type() == MSH
    }

    /// Type of the segment this node belongs to, "" above segment level
    fn segment_type(&self) -> String {
        match self.level() {
            Level::Message => String::new(),
            Level::Segment => self.descendant(0).value(),
            _ => self
                .ancestor()
                .map(|a| a.segment_type())
                .unwrap_or_default(),
        }
    }

    /// Highest child index currently addressable
    fn descendant_count(&self) -> usize {
        if self.delimiter().is_none() {
            return 0;
        }
        let count = self.value_count();
        match self.level() {
            Level::Segment if count > 0 && !self.is_msh() => count - 1,
            _ => count,
        }
    }

    /// Children with index 1 through `descendant_count()`
    fn descendants(&self) -> impl Iterator<Item = Self> {
        (1..=self.descendant_count()).map(|i| self.descendant(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Level::Segment, false, 0, Some(0))]
    #[case(Level::Segment, false, 3, Some(3))]
    #[case(Level::Segment, true, 0, Some(0))]
    #[case(Level::Segment, true, 1, None)]
    #[case(Level::Segment, true, 2, Some(1))]
    #[case(Level::Segment, true, 9, Some(8))]
    #[case(Level::Field, false, 1, Some(0))]
    #[case(Level::Component, false, 0, None)]
    fn test_division_index(#[case] level: Level, #[case] msh: bool, #[case] index: usize, #[case] expected: Option<usize>) {
        assert_eq!(division_index(level, msh, index), expected);
    }

    #[rstest]
    #[case(true, 0)]
    #[case(true, 1)]
    #[case(true, 2)]
    #[case(false, 0)]
    fn test_fixed_fields_reject_edits(#[case] msh: bool, #[case] index: usize) {
        for op in [Operation::Delete, Operation::Move, Operation::Insert] {
            assert_eq!(
                check_structural_edit(Level::Segment, msh, op, index),
                Err(Hl7Error::FixedElement { operation: op, index })
            );
        }
    }

    #[test]
    fn test_ordinary_fields_accept_edits() {
        assert!(check_structural_edit(Level::Segment, false, Operation::Delete, 1).is_ok());
        assert!(check_structural_edit(Level::Segment, true, Operation::Move, 3).is_ok());
        assert!(check_structural_edit(Level::Field, false, Operation::Move, 1).is_ok());
    }

    #[test]
    fn test_below_minimum() {
        assert_eq!(
            check_structural_edit(Level::Message, false, Operation::Move, 0),
            Err(Hl7Error::IndexBelowMinimum { index: 0, minimum: 1 })
        );
    }

    #[test]
    fn test_header_segment_is_fixed() {
        for op in [Operation::Delete, Operation::Move, Operation::Insert] {
            assert_eq!(
                check_structural_edit(Level::Message, true, op, 1),
                Err(Hl7Error::HeaderSegment { operation: op })
            );
        }
        assert!(check_structural_edit(Level::Message, true, Operation::Delete, 2).is_ok());
        assert!(check_structural_edit(Level::Message, false, Operation::Delete, 1).is_ok());
    }

    #[rstest]
    #[case("PID", &[], "MSH", "MSH")]
    #[case("PID", &[1], "MSH", "MSH")]
    #[case("PID", &[2], "X", "PID~X")]
    #[case("MSH", &[1, 1], "PID", "PID")]
    #[case("MSH", &[1, 2], "X", "MSH^X")]
    #[case("", &[1, 1, 3], "A", "&&A")]
    fn test_replace_nested(#[case] text: &str, #[case] indices: &[usize], #[case] value: &str, #[case] expected: &str) {
        let delimiters = type_field_delimiters(&Encoding::default());
        assert_eq!(replace_nested(text, &delimiters, indices, value), expected);
    }

    #[rstest]
    #[case(ChildEdit::Delete(1), &["MSH"], &[""])]
    #[case(ChildEdit::Delete(2), &["A", "B", "C"], &["A", "C"])]
    #[case(ChildEdit::Delete(5), &["A"], &["A"])]
    #[case(ChildEdit::Insert(1, "X"), &["A"], &["X", "A"])]
    #[case(ChildEdit::Insert(3, "X"), &["A"], &["A", "", "X"])]
    #[case(ChildEdit::Move(1, 3), &["A", "B"], &["B", "", "A"])]
    #[case(ChildEdit::Move(4, 5), &["A", "B"], &["A", "B"])]
    fn test_child_edit_apply(#[case] edit: ChildEdit<'static>, #[case] before: &[&str], #[case] after: &[&str]) {
        let mut values: Vec<String> = before.iter().map(|v| v.to_string()).collect();
        edit.apply(&mut values);
        assert_eq!(values, after);
    }

    #[test]
    fn test_type_transitions() {
        assert!(check_type_transition("", MSH).is_ok());
        assert!(check_type_transition("PID", "PV1").is_ok());
        assert!(check_type_transition("PID", MSH).is_err());
        assert!(check_type_transition(MSH, "PID").is_err());
        assert!(check_type_transition(MSH, MSH).is_ok());
    }

    #[test]
    fn test_segment_value_checks() {
        let enc = Encoding::default();
        assert_eq!(check_segment_value(MSH, "", &enc), Err(Hl7Error::MshSegmentDataMissing));
        assert_eq!(
            check_segment_value("", "MSH|^~", &enc),
            Err(Hl7Error::SegmentTooShort { length: 6 })
        );
        assert!(check_segment_value("PID", "PID|1", &enc).is_ok());
        assert!(check_segment_value("PID", "", &enc).is_ok());
    }

    #[test]
    fn test_fixed_value_checks() {
        let enc = Encoding::default();
        assert!(check_fixed_value(ElementKind::FieldDelimiter, "#", &enc).is_ok());
        assert_eq!(
            check_fixed_value(ElementKind::FieldDelimiter, "##", &enc),
            Err(Hl7Error::FieldDelimiterLength { length: 2 })
        );
        assert!(check_fixed_value(ElementKind::EncodingCharacters, "^~é&", &enc).is_err());
    }
}
