//! HL7 Encoding Characters
//!
//! The five delimiters of a message. Parsing mode reads them from the MSH
//! segment (MSH-1 at offset 3, MSH-2 right after it); building mode keeps them
//! as mutable properties seeded with the standard defaults.

use std::fmt;

use crate::error::{Hl7Error, Result};

/// Segment terminator. Fixed by the protocol, never configurable.
pub const SEGMENT_DELIMITER: u8 = b'\r';

/// The reserved "explicitly absent" token
pub const HL7_NULL: &str = "\"\"";

/// Segment type whose fields 1 and 2 carry the encoding characters
pub const MSH: &str = "MSH";

/// Delimiters for one message.
///
/// All delimiters are ASCII so that splitting works on bytes and every
/// division boundary is also a UTF-8 boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoding {
    field: u8,
    repetition: u8,
    component: u8,
    subcomponent: u8,
    escape: u8,
}

impl Default for Encoding {
    fn default() -> Self {
        Self {
            field: b'|',
            repetition: b'~',
            component: b'^',
            subcomponent: b'&',
            escape: b'\\',
        }
    }
}

fn check_delimiter(c: char) -> Result<u8> {
    match u8::try_from(c) {
        Ok(b) if b.is_ascii() && b != SEGMENT_DELIMITER && b != b'\n' && b != 0 => Ok(b),
        _ => Err(Hl7Error::InvalidDelimiter { character: c }),
    }
}

impl Encoding {
    /// Create an encoding from explicit delimiters
    ///
    /// # Errors
    ///
    /// Returns `InvalidDelimiter` for non-ASCII characters, line terminators and NUL.
    pub fn new(field: char, repetition: char, component: char, subcomponent: char, escape: char) -> Result<Self> {
        Ok(Self {
            field: check_delimiter(field)?,
            repetition: check_delimiter(repetition)?,
            component: check_delimiter(component)?,
            subcomponent: check_delimiter(subcomponent)?,
            escape: check_delimiter(escape)?,
        })
    }

    /// Resolve from the raw value of an MSH segment.
    ///
    /// Returns `None` when `segment` is not an MSH segment carrying at least a
    /// field delimiter. Encoding characters that are missing or unusable fall
    /// back to the defaults.
    pub fn from_msh(segment: &str) -> Option<Self> {
        let bytes = segment.as_bytes();
        if !segment.starts_with(MSH) || bytes.len() < 4 {
            return None;
        }
        let mut encoding = Encoding::default();
        if let Ok(field) = check_delimiter(char::from(bytes[3])) {
            encoding.field = field;
        }
        let rest = segment.get(4..).unwrap_or_default();
        let characters = rest
            .split(char::from(encoding.field))
            .next()
            .unwrap_or_default();
        encoding.apply_lenient(characters);
        Some(encoding)
    }

    /// Field delimiter (MSH-1)
    #[inline]
    pub fn field_delimiter(&self) -> char {
        char::from(self.field)
    }

    #[inline]
    pub fn repetition_delimiter(&self) -> char {
        char::from(self.repetition)
    }

    #[inline]
    pub fn component_delimiter(&self) -> char {
        char::from(self.component)
    }

    #[inline]
    pub fn subcomponent_delimiter(&self) -> char {
        char::from(self.subcomponent)
    }

    #[inline]
    pub fn escape_character(&self) -> char {
        char::from(self.escape)
    }

    pub(crate) fn field_byte(&self) -> u8 {
        self.field
    }

    pub(crate) fn repetition_byte(&self) -> u8 {
        self.repetition
    }

    pub(crate) fn component_byte(&self) -> u8 {
        self.component
    }

    pub(crate) fn subcomponent_byte(&self) -> u8 {
        self.subcomponent
    }

    pub(crate) fn escape_byte(&self) -> u8 {
        self.escape
    }

    /// # Errors
    ///
    /// Returns `InvalidDelimiter` if `c` cannot be a delimiter.
    pub fn set_field_delimiter(&mut self, c: char) -> Result<()> {
        self.field = check_delimiter(c)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `InvalidDelimiter` if `c` cannot be a delimiter.
    pub fn set_repetition_delimiter(&mut self, c: char) -> Result<()> {
        self.repetition = check_delimiter(c)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `InvalidDelimiter` if `c` cannot be a delimiter.
    pub fn set_component_delimiter(&mut self, c: char) -> Result<()> {
        self.component = check_delimiter(c)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `InvalidDelimiter` if `c` cannot be a delimiter.
    pub fn set_subcomponent_delimiter(&mut self, c: char) -> Result<()> {
        self.subcomponent = check_delimiter(c)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `InvalidDelimiter` if `c` cannot be a delimiter.
    pub fn set_escape_character(&mut self, c: char) -> Result<()> {
        self.escape = check_delimiter(c)?;
        Ok(())
    }

    /// MSH-2: component, repetition, escape, subcomponent, in that order
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .map(|&b| char::from(b))
            .collect()
    }

    /// Replace the four MSH-2 characters. Missing trailing characters keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDelimiter` on the first unusable character; `self` is
    /// left untouched in that case.
    pub fn set_encoding_characters(&mut self, characters: &str) -> Result<()> {
        let mut next = Encoding {
            field: self.field,
            ..Encoding::default()
        };
        let mut chars = characters.chars();
        if let Some(c) = chars.next() {
            next.component = check_delimiter(c)?;
        }
        if let Some(c) = chars.next() {
            next.repetition = check_delimiter(c)?;
        }
        if let Some(c) = chars.next() {
            next.escape = check_delimiter(c)?;
        }
        if let Some(c) = chars.next() {
            next.subcomponent = check_delimiter(c)?;
        }
        *self = next;
        Ok(())
    }

    fn apply_lenient(&mut self, characters: &str) {
        let slots = [
            &mut self.component,
            &mut self.repetition,
            &mut self.escape,
            &mut self.subcomponent,
        ];
        for (slot, c) in slots.into_iter().zip(characters.chars()) {
            if let Ok(b) = check_delimiter(c) {
                *slot = b;
            }
        }
    }

    /// `MSH|^~\&` for this encoding
    pub fn msh_prefix(&self) -> String {
        let mut prefix = String::with_capacity(8);
        prefix.push_str(MSH);
        prefix.push(self.field_delimiter());
        prefix.push_str(&self.encoding_characters());
        prefix
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.field_delimiter(), self.encoding_characters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let enc = Encoding::default();
        assert_eq!(enc.field_delimiter(), '|');
        assert_eq!(enc.encoding_characters(), "^~\\&");
        assert_eq!(enc.msh_prefix(), "MSH|^~\\&");
    }

    #[test]
    fn test_from_msh() {
        let enc = Encoding::from_msh("MSH#*@!%#A#B").unwrap();
        assert_eq!(enc.field_delimiter(), '#');
        assert_eq!(enc.component_delimiter(), '*');
        assert_eq!(enc.repetition_delimiter(), '@');
        assert_eq!(enc.escape_character(), '!');
        assert_eq!(enc.subcomponent_delimiter(), '%');
    }

    #[test]
    fn test_from_msh_short_characters_keep_defaults() {
        let enc = Encoding::from_msh("MSH|*|A").unwrap();
        assert_eq!(enc.component_delimiter(), '*');
        assert_eq!(enc.repetition_delimiter(), '~');
        assert_eq!(enc.subcomponent_delimiter(), '&');
    }

    #[test]
    fn test_from_non_msh() {
        assert!(Encoding::from_msh("PID|1").is_none());
        assert!(Encoding::from_msh("MSH").is_none());
    }

    #[test]
    fn test_invalid_delimiters() {
        let mut enc = Encoding::default();
        assert_eq!(
            enc.set_field_delimiter('\r'),
            Err(Hl7Error::InvalidDelimiter { character: '\r' })
        );
        assert!(enc.set_component_delimiter('é').is_err());
        assert!(enc.set_encoding_characters("^~é&").is_err());
        assert_eq!(enc, Encoding::default());
    }

    #[test]
    fn test_set_encoding_characters() {
        let mut enc = Encoding::default();
        enc.set_field_delimiter('#').unwrap();
        enc.set_encoding_characters("*@").unwrap();
        assert_eq!(enc.to_string(), "#*@\\&");
    }
}
