//! String Divider Module
//!
//! A message is one character buffer divided five times over: segments,
//! fields, repetitions, components, subcomponents. This module provides the
//! engine that computes those divisions lazily and edits them in place.
//!
//! ## Architecture
//!
//! ```text
//! Dividers (arena, one per message or detached clone)
//! ├── root: RootDivider            # owns the buffer, bumps version on splice
//! ├── slots: Vec<Slot>             # descendant dividers, addressed by DividerId
//! └── lookup: (parent, anchor) -> DividerId
//! ```
//!
//! Descendants never copy the buffer. Each one remembers the version of its
//! parent it was computed against and re-scans its own bounded slice on the
//! first read after that version moves on.

pub mod descendant;
pub mod root;

use std::collections::HashMap;

use log::debug;

use crate::core::Division;
use crate::core::Encoding;
use crate::element::Level;

pub use descendant::DescendantDivider;
pub use root::RootDivider;
use descendant::Slot;

/// Shared contract of root and descendant dividers.
///
/// Reads take `&mut self` because descendants refresh lazily. All edits are
/// expressed through `splice` (root buffer) and `materialize` (write the
/// whole value when this divider's slot does not exist yet).
pub trait StringDivider {
    /// Splitting character; `None` never divides
    fn delimiter(&self) -> Option<u8>;

    /// Increases whenever the exposed divisions may have changed
    fn version(&mut self) -> u64;

    /// Buffer the divisions point into
    fn buffer(&self) -> &str;

    /// Range of the buffer covered by this divider; invalid when absent
    fn bound(&mut self) -> Division;

    /// Current divisions, ordered and contiguous
    fn divisions(&mut self) -> &[Division];

    /// Replace `buffer[start..start + length]` with `value`
    fn splice(&mut self, start: usize, length: usize, value: &str);

    /// Write the whole value of this divider through its ancestor
    fn materialize(&mut self, value: &str);

    /// Number of divisions
    fn count(&mut self) -> usize {
        self.divisions().len()
    }

    /// Whole value, "" when absent
    fn value(&mut self) -> &str {
        let bound = self.bound();
        bound.slice(self.buffer())
    }

    /// Absent, or present with no characters
    fn is_null(&mut self) -> bool {
        let bound = self.bound();
        !bound.valid || bound.is_empty()
    }

    /// Division at `index`, "" when out of range
    fn get(&mut self, index: usize) -> &str {
        let division = self
            .divisions()
            .get(index)
            .copied()
            .unwrap_or(Division::INVALID);
        division.slice(self.buffer())
    }

    /// All division values
    fn values(&mut self) -> Vec<String> {
        let divisions = self.divisions().to_vec();
        let buffer = self.buffer();
        divisions.iter().map(|d| d.slice(buffer).to_owned()).collect()
    }

    /// Write division `index`, padding with delimiters when it does not exist
    fn set(&mut self, index: usize, value: &str) {
        let bound = self.bound();
        let Some(delimiter) = self.delimiter() else {
            if index == 0 {
                if bound.valid {
                    self.splice(bound.offset, bound.length, value);
                } else {
                    self.materialize(value);
                }
            }
            return;
        };

        if !bound.valid {
            let mut whole = String::with_capacity(index + value.len());
            whole.extend(std::iter::repeat_n(char::from(delimiter), index));
            whole.push_str(value);
            self.materialize(&whole);
            return;
        }

        let count = self.count();
        if let Some(division) = self.divisions().get(index).copied() {
            self.splice(division.offset, division.length, value);
        } else {
            let pad = index + 1 - count;
            debug!("padding {pad} delimiter(s) to reach division {index}");
            let mut tail = String::with_capacity(pad + value.len());
            tail.extend(std::iter::repeat_n(char::from(delimiter), pad));
            tail.push_str(value);
            self.splice(bound.end(), 0, &tail);
        }
    }

    /// Insert a new division before `index`, shifting later ones up
    fn insert(&mut self, index: usize, value: &str) {
        let bound = self.bound();
        let (Some(delimiter), true) = (self.delimiter(), bound.valid) else {
            self.set(index, value);
            return;
        };
        match self.divisions().get(index).copied() {
            Some(division) => {
                let mut inserted = String::with_capacity(value.len() + 1);
                inserted.push_str(value);
                inserted.push(char::from(delimiter));
                self.splice(division.offset, 0, &inserted);
            }
            None => self.set(index, value),
        }
    }

    /// Remove division `index` together with one adjoining delimiter
    fn delete(&mut self, index: usize) {
        let count = self.count();
        let Some(division) = self.divisions().get(index).copied() else {
            return;
        };
        if count == 1 {
            self.splice(division.offset, division.length, "");
        } else if index + 1 < count {
            self.splice(division.offset, division.length + 1, "");
        } else {
            self.splice(division.offset - 1, division.length + 1, "");
        }
    }

    /// Move division `source` to `target`, shifting everything in between
    fn move_division(&mut self, source: usize, target: usize) {
        if source == target {
            return;
        }
        let count = self.count();
        if source >= count && target >= count {
            return;
        }
        let value = self.get(source).to_owned();
        self.delete(source);
        self.insert(target, &value);
    }
}

/// Handle of a divider inside a `Dividers` arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DividerId(u32);

impl DividerId {
    /// The arena's root divider
    pub const ROOT: DividerId = DividerId(0);

    #[inline]
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    fn slot(self) -> usize {
        self.0 as usize - 1
    }
}

/// Where a descendant divider sits inside its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// The parent's division at this index
    Division(usize),
    /// One character at this offset from the start of the parent's value
    Char(usize),
    /// Not addressable (index below the level's minimum)
    Nowhere,
}

/// Mutable access to one divider of an arena
#[derive(Debug)]
pub enum DividerMut<'a> {
    Root(&'a mut RootDivider),
    Descendant(DescendantDivider<'a>),
}

impl StringDivider for DividerMut<'_> {
    fn delimiter(&self) -> Option<u8> {
        match self {
            DividerMut::Root(d) => d.delimiter(),
            DividerMut::Descendant(d) => d.delimiter(),
        }
    }

    fn version(&mut self) -> u64 {
        match self {
            DividerMut::Root(d) => d.version(),
            DividerMut::Descendant(d) => d.version(),
        }
    }

    fn buffer(&self) -> &str {
        match self {
            DividerMut::Root(d) => d.buffer(),
            DividerMut::Descendant(d) => d.buffer(),
        }
    }

    fn bound(&mut self) -> Division {
        match self {
            DividerMut::Root(d) => d.bound(),
            DividerMut::Descendant(d) => d.bound(),
        }
    }

    fn divisions(&mut self) -> &[Division] {
        match self {
            DividerMut::Root(d) => d.divisions(),
            DividerMut::Descendant(d) => d.divisions(),
        }
    }

    fn splice(&mut self, start: usize, length: usize, value: &str) {
        match self {
            DividerMut::Root(d) => d.splice(start, length, value),
            DividerMut::Descendant(d) => d.splice(start, length, value),
        }
    }

    fn materialize(&mut self, value: &str) {
        match self {
            DividerMut::Root(d) => d.materialize(value),
            DividerMut::Descendant(d) => d.materialize(value),
        }
    }
}

/// Arena holding the root divider of one buffer and all of its descendants
#[derive(Debug)]
pub struct Dividers {
    root: RootDivider,
    root_level: Level,
    fallback: Encoding,
    resolved: Option<(u64, Encoding)>,
    slots: Vec<Slot>,
    lookup: HashMap<(DividerId, Anchor, bool), DividerId>,
}

impl Dividers {
    /// Create an arena over `value`, whose root sits at `root_level`.
    ///
    /// `fallback` is used whenever the buffer carries no MSH segment to
    /// resolve the encoding from.
    pub fn new(value: &str, root_level: Level, fallback: Encoding) -> Self {
        let mut dividers = Self {
            root: RootDivider::new(value, None),
            root_level,
            fallback,
            resolved: None,
            slots: Vec::new(),
            lookup: HashMap::new(),
        };
        dividers.refresh_root();
        dividers
    }

    /// Level of the root divider
    #[inline]
    pub fn root_level(&self) -> Level {
        self.root_level
    }

    /// The whole buffer
    #[inline]
    pub fn as_str(&self) -> &str {
        self.root.as_str()
    }

    /// Delimiters currently in effect.
    ///
    /// Messages and segments resolve them from their MSH segment, re-reading
    /// after every change to the buffer.
    pub fn encoding(&mut self) -> Encoding {
        let version = self.root.current_version();
        if let Some((seen, encoding)) = self.resolved {
            if seen == version {
                return encoding;
            }
        }
        let buffer = self.root.as_str();
        let msh = match self.root_level {
            Level::Message => crate::core::scanner::nth_division(
                buffer,
                Some(crate::core::SEGMENT_DELIMITER),
                0,
            ),
            Level::Segment => Some(buffer),
            _ => None,
        };
        let encoding = msh
            .and_then(Encoding::from_msh)
            .unwrap_or(self.fallback);
        if self.resolved.is_some_and(|(_, previous)| previous != encoding) {
            debug!("encoding changed to {encoding}");
        }
        self.resolved = Some((version, encoding));
        encoding
    }

    /// Find or create the descendant of `parent` at `anchor`
    pub fn child(&mut self, parent: DividerId, anchor: Anchor, level: Level, index: usize, opaque: bool) -> DividerId {
        let opaque = opaque || self.is_opaque(parent);
        let key = (parent, anchor, opaque);
        if let Some(&id) = self.lookup.get(&key) {
            return id;
        }
        self.slots.push(Slot::new(parent, anchor, level, index, opaque));
        let id = DividerId(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        self.lookup.insert(key, id);
        id
    }

    /// Mutable access to a divider, refreshed and ready to read
    pub fn divider(&mut self, id: DividerId) -> DividerMut<'_> {
        if id.is_root() {
            self.refresh_root();
            DividerMut::Root(&mut self.root)
        } else {
            DividerMut::Descendant(DescendantDivider::new(self, id))
        }
    }

    /// Parent divider, `None` for the root
    pub fn parent(&self, id: DividerId) -> Option<DividerId> {
        (!id.is_root()).then(|| self.slots[id.slot()].parent)
    }

    /// Anchor inside the parent; the root has none
    pub fn anchor(&self, id: DividerId) -> Option<Anchor> {
        (!id.is_root()).then(|| self.slots[id.slot()].anchor)
    }

    /// Level of a divider's element
    pub fn level(&self, id: DividerId) -> Level {
        if id.is_root() {
            self.root_level
        } else {
            self.slots[id.slot()].level
        }
    }

    /// External index recorded when the divider was created; 0 for the root
    pub fn index(&self, id: DividerId) -> usize {
        if id.is_root() {
            0
        } else {
            self.slots[id.slot()].index
        }
    }

    /// Whether the divider can never be divided further
    pub fn is_opaque(&self, id: DividerId) -> bool {
        !id.is_root() && self.slots[id.slot()].opaque
    }

    /// Number of descendant dividers created so far
    pub fn descendant_count(&self) -> usize {
        self.slots.len()
    }

    fn refresh_root(&mut self) -> u64 {
        let encoding = self.encoding();
        self.root.set_delimiter(self.root_level.delimiter(&encoding));
        self.root.current_version()
    }

    /// Forget every descendant slot, leaving only the root
    pub fn clear_slots(&mut self) {
        self.slots.clear();
        self.lookup.clear();
    }

    /// Consume the arena, returning the buffer
    pub fn into_string(self) -> String {
        self.root.into_string()
    }
}

impl Clone for Dividers {
    /// Deep copy into a fresh arena; no descendant caches are carried over
    fn clone(&self) -> Self {
        Dividers::new(self.root.as_str(), self.root_level, self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "MSH|^~\\&|A|B\rPID|1|x^y&z~w\r";

    fn field(dividers: &mut Dividers, segment: usize, division: usize) -> DividerId {
        let seg = dividers.child(DividerId::ROOT, Anchor::Division(segment), Level::Segment, segment + 1, false);
        dividers.child(seg, Anchor::Division(division), Level::Field, division, false)
    }

    #[test]
    fn test_root_divides_segments() {
        let mut dividers = Dividers::new(SAMPLE, Level::Message, Encoding::default());
        let mut root = dividers.divider(DividerId::ROOT);
        assert_eq!(root.count(), 3);
        assert_eq!(root.get(1), "PID|1|x^y&z~w");
        assert_eq!(root.get(2), "");
    }

    #[test]
    fn test_descendant_reads_through_ancestors() {
        let mut dividers = Dividers::new(SAMPLE, Level::Message, Encoding::default());
        let id = field(&mut dividers, 1, 2);
        let mut divider = dividers.divider(id);
        assert_eq!(divider.value(), "x^y&z~w");
        assert_eq!(divider.values(), vec!["x^y&z", "w"]);
    }

    #[test]
    fn test_descendant_is_recomputed_after_edit() {
        let mut dividers = Dividers::new(SAMPLE, Level::Message, Encoding::default());
        let id = field(&mut dividers, 1, 2);
        let before = dividers.divider(id).version();
        let seg = dividers.parent(id).unwrap();
        dividers.divider(seg).set(1, "100");
        let mut divider = dividers.divider(id);
        assert!(divider.version() > before);
        assert_eq!(divider.value(), "x^y&z~w");
        assert_eq!(dividers.as_str(), "MSH|^~\\&|A|B\rPID|100|x^y&z~w\r");
    }

    #[test]
    fn test_unchanged_descendant_keeps_version() {
        let mut dividers = Dividers::new(SAMPLE, Level::Message, Encoding::default());
        let id = field(&mut dividers, 1, 2);
        let first = dividers.divider(id).version();
        assert_eq!(dividers.divider(id).version(), first);
    }

    #[test]
    fn test_write_to_missing_slot_materializes() {
        let mut dividers = Dividers::new("MSH|^~\\&", Level::Message, Encoding::default());
        let id = field(&mut dividers, 2, 3);
        assert!(dividers.divider(id).is_null());
        dividers.divider(id).set(1, "R2");
        assert_eq!(dividers.as_str(), "MSH|^~\\&\r\r|||~R2");
    }

    #[test]
    fn test_encoding_follows_msh() {
        let mut dividers = Dividers::new("MSH#*@!%#A*B", Level::Message, Encoding::default());
        assert_eq!(dividers.encoding().field_delimiter(), '#');
        let id = field(&mut dividers, 0, 2);
        let mut divider = dividers.divider(id);
        assert_eq!(divider.value(), "A*B");
    }

    #[test]
    fn test_clone_is_detached() {
        let mut original = Dividers::new(SAMPLE, Level::Message, Encoding::default());
        let mut copy = original.clone();
        copy.divider(DividerId::ROOT).set(0, "MSH|^~\\&");
        assert_eq!(original.divider(DividerId::ROOT).get(0), "MSH|^~\\&|A|B");
        assert_eq!(copy.as_str(), "MSH|^~\\&\rPID|1|x^y&z~w\r");
    }
}
