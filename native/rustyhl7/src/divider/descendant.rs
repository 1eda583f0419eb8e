//! Descendant dividers - lazy views into an ancestor's buffer
//!
//! A descendant owns no characters. Its bound is re-derived from the
//! parent's divisions whenever the parent's version differs from the one it
//! last saw, and only its own bounded slice is re-scanned.

use log::{debug, trace};

use super::{Anchor, DividerId, Dividers, StringDivider};
use crate::core::scanner::get_divisions_bounded;
use crate::core::Division;
use crate::element::Level;

/// Cached state of one descendant divider
#[derive(Debug, Clone)]
pub(super) struct Slot {
    pub(super) parent: DividerId,
    pub(super) anchor: Anchor,
    pub(super) level: Level,
    pub(super) index: usize,
    pub(super) opaque: bool,
    delimiter: Option<u8>,
    bound: Division,
    divisions: Vec<Division>,
    version: u64,
    /// Parent version the cached state was computed against
    parent_version: Option<u64>,
}

impl Slot {
    pub(super) fn new(parent: DividerId, anchor: Anchor, level: Level, index: usize, opaque: bool) -> Self {
        Self {
            parent,
            anchor,
            level,
            index,
            opaque,
            delimiter: None,
            bound: Division::INVALID,
            divisions: Vec::new(),
            version: 0,
            parent_version: None,
        }
    }
}

/// Bring `id` up to date with its ancestors, returning its version
fn refresh(arena: &mut Dividers, id: DividerId) -> u64 {
    if id.is_root() {
        return arena.refresh_root();
    }
    let (parent, anchor, level, opaque, seen) = {
        let slot = &arena.slots[id.slot()];
        (slot.parent, slot.anchor, slot.level, slot.opaque, slot.parent_version)
    };

    let parent_version = refresh(arena, parent);
    if seen == Some(parent_version) {
        return arena.slots[id.slot()].version;
    }

    let bound = match anchor {
        Anchor::Division(index) => parent_divisions(arena, parent)
            .get(index)
            .copied()
            .unwrap_or(Division::INVALID),
        Anchor::Char(offset) => {
            let parent_bound = parent_bound(arena, parent);
            char_at(arena.root.as_str(), parent_bound, offset)
        }
        Anchor::Nowhere => Division::INVALID,
    };
    let delimiter = if opaque {
        None
    } else {
        let encoding = arena.encoding();
        level.delimiter(&encoding)
    };
    let divisions = get_divisions_bounded(arena.root.as_str(), delimiter, bound);
    trace!(
        "re-divided {level:?} {id:?}: {} division(s) over {}..{}",
        divisions.len(),
        bound.offset,
        bound.end()
    );

    let slot = &mut arena.slots[id.slot()];
    slot.bound = bound;
    slot.delimiter = delimiter;
    slot.divisions = divisions;
    slot.parent_version = Some(parent_version);
    slot.version += 1;
    slot.version
}

fn parent_divisions(arena: &mut Dividers, parent: DividerId) -> &[Division] {
    if parent.is_root() {
        arena.root.divisions()
    } else {
        &arena.slots[parent.slot()].divisions
    }
}

fn parent_bound(arena: &mut Dividers, parent: DividerId) -> Division {
    if parent.is_root() {
        arena.root.bound()
    } else {
        arena.slots[parent.slot()].bound
    }
}

/// The single character at `offset` inside `bound`
fn char_at(buffer: &str, bound: Division, offset: usize) -> Division {
    if !bound.valid {
        return Division::INVALID;
    }
    let start = bound.offset + offset;
    buffer
        .get(start..bound.end())
        .and_then(|rest| rest.chars().next())
        .map_or(Division::INVALID, |c| Division::new(start, c.len_utf8()))
}

/// A divider computed from a bounded slice of its ancestor's buffer
#[derive(Debug)]
pub struct DescendantDivider<'a> {
    arena: &'a mut Dividers,
    id: DividerId,
}

impl<'a> DescendantDivider<'a> {
    pub(super) fn new(arena: &'a mut Dividers, id: DividerId) -> Self {
        Self { arena, id }
    }

    /// Arena handle of this divider
    pub fn id(&self) -> DividerId {
        self.id
    }

    fn slot(&self) -> &Slot {
        &self.arena.slots[self.id.slot()]
    }
}

impl StringDivider for DescendantDivider<'_> {
    fn delimiter(&self) -> Option<u8> {
        self.slot().delimiter
    }

    fn version(&mut self) -> u64 {
        refresh(self.arena, self.id)
    }

    fn buffer(&self) -> &str {
        self.arena.root.as_str()
    }

    fn bound(&mut self) -> Division {
        refresh(self.arena, self.id);
        self.slot().bound
    }

    fn divisions(&mut self) -> &[Division] {
        refresh(self.arena, self.id);
        &self.arena.slots[self.id.slot()].divisions
    }

    fn splice(&mut self, start: usize, length: usize, value: &str) {
        self.arena.root.replace(start, length, value);
    }

    fn materialize(&mut self, value: &str) {
        let (parent, anchor) = {
            let slot = self.slot();
            (slot.parent, slot.anchor)
        };
        match anchor {
            Anchor::Division(index) => self.arena.divider(parent).set(index, value),
            Anchor::Char(offset) => {
                let mut parent = self.arena.divider(parent);
                let bound = parent.bound();
                if bound.valid && bound.length == offset {
                    parent.splice(bound.end(), 0, value);
                } else {
                    debug!("no position {offset} to write into, ignored");
                }
            }
            Anchor::Nowhere => debug!("write to unaddressable divider ignored"),
        }
    }
}
