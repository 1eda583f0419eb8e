//! Location Paths
//!
//! Compiled location expressions such as `PID.3`, `OBX[2]-5[1].1` or the
//! key form `PID2.3.1.1.1`. A `Path` resolves against any `Element` message
//! root, so both representations share one implementation.

pub mod cache;
pub mod parser;

use std::fmt;

use crate::element::{Element, Level};

pub use cache::PathCache;
pub use parser::parse;

/// How the segment of a path is chosen
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SegmentSelector {
    /// n-th segment (1-based) of the given type
    Occurrence { segment_type: String, occurrence: usize },
    /// Segment at a message-level index, which must have the given type
    Key { segment_type: String, index: usize },
}

impl SegmentSelector {
    pub fn segment_type(&self) -> &str {
        match self {
            SegmentSelector::Occurrence { segment_type, .. } | SegmentSelector::Key { segment_type, .. } => {
                segment_type
            }
        }
    }
}

/// A compiled location expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub segment: SegmentSelector,
    pub field: Option<usize>,
    pub repetition: Option<usize>,
    pub component: Option<usize>,
    pub subcomponent: Option<usize>,
}

impl Path {
    /// Indices below the segment, in descent order.
    ///
    /// A component without an explicit repetition addresses repetition 1.
    pub fn indices(&self) -> Vec<usize> {
        let mut indices = Vec::with_capacity(4);
        let Some(field) = self.field else {
            return indices;
        };
        indices.push(field);
        match (self.repetition, self.component) {
            (Some(rep), _) => indices.push(rep),
            (None, Some(_)) => indices.push(1),
            (None, None) => return indices,
        }
        indices.extend(self.component);
        indices.extend(self.component.and(self.subcomponent));
        indices
    }

    /// Level of the element this path addresses
    pub fn level(&self) -> Level {
        let mut level = Level::Segment;
        for _ in self.indices() {
            level = level.child().unwrap_or(Level::Subcomponent);
        }
        level
    }

    /// Message-level index of the segment this path selects, if any
    pub fn segment_index<E: Element>(&self, message: &E) -> Option<usize> {
        match &self.segment {
            SegmentSelector::Key { segment_type, index } => {
                (message.descendant(*index).segment_type() == *segment_type).then_some(*index)
            }
            SegmentSelector::Occurrence { segment_type, occurrence } => message
                .descendants()
                .filter(|segment| segment.segment_type() == *segment_type)
                .nth(occurrence.checked_sub(1)?)
                .map(|segment| segment.index()),
        }
    }

    /// Resolve against a message root; `None` when the segment does not exist
    pub fn locate<E: Element>(&self, message: &E) -> Option<E> {
        let index = self.segment_index(message)?;
        let mut element = message.descendant(index);
        for i in self.indices() {
            element = element.descendant(i);
        }
        Some(element)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.segment {
            SegmentSelector::Occurrence { segment_type, occurrence } => {
                write!(f, "{segment_type}")?;
                if *occurrence != 1 {
                    write!(f, "[{occurrence}]")?;
                }
                if let Some(field) = self.field {
                    write!(f, "-{field}")?;
                }
                if let Some(rep) = self.repetition {
                    write!(f, "[{rep}]")?;
                }
                if let Some(component) = self.component {
                    write!(f, ".{component}")?;
                }
                if let Some(sub) = self.subcomponent {
                    write!(f, ".{sub}")?;
                }
                Ok(())
            }
            SegmentSelector::Key { segment_type, index } => {
                write!(f, "{segment_type}{index}")?;
                for i in [self.field, self.repetition, self.component, self.subcomponent]
                    .into_iter()
                    .flatten()
                {
                    write!(f, ".{i}")?;
                }
                Ok(())
            }
        }
    }
}
