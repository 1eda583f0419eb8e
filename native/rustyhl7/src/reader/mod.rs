//! Read-only Message View
//!
//! Answers location lookups straight off a borrowed buffer, without building
//! dividers or tree nodes. A `MessageView` is `Sync`, which is what lets
//! several paths be resolved against one message in parallel.
//!
//! Lookups follow the parsing-mode element model exactly, including the MSH
//! special cases: MSH-1 is the character after `MSH`, MSH-2 is the raw text
//! up to the next field delimiter, and neither divides any further.

use crate::core::scanner::{count_divisions, nth_division};
use crate::core::{Encoding, MSH, SEGMENT_DELIMITER};
use crate::error::Result;
use crate::path::{self, Path, SegmentSelector};

#[derive(Debug, Clone, Copy)]
pub struct MessageView<'a> {
    text: &'a str,
    encoding: Encoding,
}

impl<'a> MessageView<'a> {
    /// View over normalised message text. Delimiters come from the leading
    /// MSH segment, the defaults otherwise.
    pub fn new(text: &'a str) -> Self {
        let encoding = nth_division(text, Some(SEGMENT_DELIMITER), 0)
            .and_then(Encoding::from_msh)
            .unwrap_or_default();
        Self { text, encoding }
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn segment_count(&self) -> usize {
        count_divisions(self.text, Some(SEGMENT_DELIMITER))
    }

    fn segments(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.text.split(char::from(SEGMENT_DELIMITER))
    }

    /// Segment at 1-based `index`
    pub fn segment(&self, index: usize) -> Option<&'a str> {
        nth_division(self.text, Some(SEGMENT_DELIMITER), index.checked_sub(1)?)
    }

    fn segment_type(&self, segment: &'a str) -> &'a str {
        nth_division(segment, Some(self.encoding.field_byte()), 0).unwrap_or_default()
    }

    pub fn segment_types(&self) -> Vec<&'a str> {
        self.segments().map(|s| self.segment_type(s)).collect()
    }

    fn select(&self, selector: &SegmentSelector) -> Option<&'a str> {
        match selector {
            SegmentSelector::Key { segment_type, index } => self
                .segment(*index)
                .filter(|segment| self.segment_type(segment) == *segment_type),
            SegmentSelector::Occurrence { segment_type, occurrence } => self
                .segments()
                .filter(|segment| self.segment_type(segment) == *segment_type)
                .nth(occurrence.checked_sub(1)?),
        }
    }

    /// Value addressed by a compiled path, "" when absent
    pub fn resolve(&self, path: &Path) -> String {
        self.lookup(path).unwrap_or_default().to_owned()
    }

    fn lookup(&self, path: &Path) -> Option<&'a str> {
        let segment = self.select(&path.segment)?;
        let indices = path.indices();
        let Some((&field, rest)) = indices.split_first() else {
            return Some(segment);
        };
        let value = self.field(segment, field)?;
        if self.segment_type(segment) == MSH && (field == 1 || field == 2) {
            return rest.iter().all(|&i| i == 1).then_some(value);
        }
        let delimiters = [
            self.encoding.repetition_byte(),
            self.encoding.component_byte(),
            self.encoding.subcomponent_byte(),
        ];
        rest.iter()
            .zip(delimiters)
            .try_fold(value, |text, (&index, delimiter)| {
                nth_division(text, Some(delimiter), index.checked_sub(1)?)
            })
    }

    fn field(&self, segment: &'a str, index: usize) -> Option<&'a str> {
        let delimiter = Some(self.encoding.field_byte());
        if self.segment_type(segment) != MSH {
            return nth_division(segment, delimiter, index);
        }
        match index {
            0 => nth_division(segment, delimiter, 0),
            1 => segment.get(MSH.len()..MSH.len() + 1),
            n => nth_division(segment, delimiter, n - 1),
        }
    }

    /// Value at a location path, "" when absent
    ///
    /// # Errors
    ///
    /// `InvalidPath` when the expression does not parse.
    pub fn get(&self, location: &str) -> Result<String> {
        Ok(self.resolve(&path::cache::compile(location)?))
    }
}
