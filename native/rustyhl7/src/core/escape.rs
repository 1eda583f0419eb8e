//! HL7 Escape Sequences
//!
//! Handles the escape sequences that let delimiter characters travel inside
//! values:
//! - Delimiters: \F\ \S\ \T\ \R\ \E\
//! - Hexadecimal data: \X0D\ \X0D0A\
//!
//! Formatting sequences (\H\, \N\, \.br\ ...) belong to the formatted-text
//! codec and pass through untouched. Uses Cow for zero-copy when nothing needs
//! translating.

use std::borrow::Cow;

use memchr::memchr;

use super::encoding::{Encoding, SEGMENT_DELIMITER};

impl Encoding {
    /// Escape every delimiter occurring in `text`
    ///
    /// Returns Borrowed if `text` contains no delimiter (zero-copy).
    pub fn escape<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let needs_escape = |b: u8| self.escape_code(b).is_some();
        if !text.bytes().any(needs_escape) {
            return Cow::Borrowed(text);
        }

        let mut result = String::with_capacity(text.len() + 8);
        for c in text.chars() {
            let code = u8::try_from(c).ok().and_then(|b| self.escape_code(b));
            match code {
                Some(code) => {
                    result.push(self.escape_character());
                    result.push_str(code);
                    result.push(self.escape_character());
                }
                None => result.push(c),
            }
        }
        Cow::Owned(result)
    }

    /// Decode escape sequences in `text`
    ///
    /// Returns Borrowed if no escape character is present (zero-copy).
    /// Unknown or malformed sequences are kept verbatim.
    pub fn unescape<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let escape = self.escape_byte();
        let bytes = text.as_bytes();
        if memchr(escape, bytes).is_none() {
            return Cow::Borrowed(text);
        }

        let mut result = String::with_capacity(text.len());
        let mut pos = 0;
        while pos < bytes.len() {
            let Some(start) = memchr(escape, &bytes[pos..]).map(|i| pos + i) else {
                result.push_str(&text[pos..]);
                break;
            };
            result.push_str(&text[pos..start]);

            // Find the closing escape character
            let Some(end) = memchr(escape, &bytes[start + 1..]).map(|i| start + 1 + i) else {
                result.push_str(&text[start..]);
                break;
            };

            let sequence = &text[start + 1..end];
            match self.decode_sequence(sequence) {
                Some(decoded) => result.push_str(&decoded),
                None => result.push_str(&text[start..=end]),
            }
            pos = end + 1;
        }
        Cow::Owned(result)
    }

    fn escape_code(&self, b: u8) -> Option<&'static str> {
        if b == self.field_byte() {
            Some("F")
        } else if b == self.component_byte() {
            Some("S")
        } else if b == self.subcomponent_byte() {
            Some("T")
        } else if b == self.repetition_byte() {
            Some("R")
        } else if b == self.escape_byte() {
            Some("E")
        } else if b == SEGMENT_DELIMITER {
            Some("X0D")
        } else {
            None
        }
    }

    fn decode_sequence(&self, sequence: &str) -> Option<String> {
        match sequence {
            "F" => Some(self.field_delimiter().to_string()),
            "S" => Some(self.component_delimiter().to_string()),
            "T" => Some(self.subcomponent_delimiter().to_string()),
            "R" => Some(self.repetition_delimiter().to_string()),
            "E" => Some(self.escape_character().to_string()),
            _ => sequence
                .strip_prefix('X')
                .or_else(|| sequence.strip_prefix('x'))
                .and_then(decode_hex),
        }
    }
}

/// Decode `\Xhh..\` payload into text; None if not hex or not UTF-8
fn decode_hex(hex: &str) -> Option<String> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
