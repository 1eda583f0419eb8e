//! Path Parser
//!
//! Hand-written cursor over the expression text. Two surface forms compile
//! to the same `Path`:
//!
//! ```text
//! PID[2]-5[2].1.1     segment occurrence, field, repetition, component, subcomponent
//! PID.3               whole field
//! PID2.3.1.1.1        key form: message-level segment index, then dotted indices
//! ```

use super::{Path, SegmentSelector};
use crate::error::{Hl7Error, Result};

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Cursor { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance(c.len_utf8());
            true
        } else {
            false
        }
    }

    fn at_digit(&self) -> bool {
        self.peek().is_some_and(|c| c.is_ascii_digit())
    }

    /// Read an unsigned decimal number
    fn number(&mut self) -> Option<usize> {
        let digits = self
            .remaining()
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits == 0 {
            return None;
        }
        let value = self.remaining().get(..digits)?.parse().ok();
        self.advance(digits);
        value
    }

    fn is_done(&self) -> bool {
        self.pos >= self.input.len()
    }
}

fn invalid(path: &str, reason: &'static str) -> Hl7Error {
    Hl7Error::InvalidPath {
        path: path.to_owned(),
        reason,
    }
}

/// Compile `text` into a `Path`
///
/// # Errors
///
/// `InvalidPath` naming the first problem found.
pub fn parse(text: &str) -> Result<Path> {
    let text = text.trim();
    let mut cursor = Cursor::new(text);

    let segment_type = cursor.remaining().get(..3).unwrap_or_default();
    if segment_type.len() != 3 || !segment_type.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(invalid(text, "segment type must be three letters or digits"));
    }
    let segment_type = segment_type.to_ascii_uppercase();
    cursor.advance(3);

    if cursor.at_digit() {
        return parse_key(text, cursor, segment_type);
    }

    let occurrence = if cursor.eat('[') {
        let n = cursor
            .number()
            .ok_or_else(|| invalid(text, "segment occurrence must be a number"))?;
        if !cursor.eat(']') {
            return Err(invalid(text, "unclosed segment occurrence"));
        }
        if n == 0 {
            return Err(invalid(text, "segment occurrence starts at 1"));
        }
        n
    } else {
        1
    };

    let mut path = Path {
        segment: SegmentSelector::Occurrence { segment_type, occurrence },
        field: None,
        repetition: None,
        component: None,
        subcomponent: None,
    };
    if cursor.is_done() {
        return Ok(path);
    }

    if !(cursor.eat('.') || cursor.eat('-')) {
        return Err(invalid(text, "expected '.' or '-' after the segment"));
    }
    path.field = Some(
        cursor
            .number()
            .ok_or_else(|| invalid(text, "field must be a number"))?,
    );

    if cursor.eat('[') {
        let rep = cursor
            .number()
            .ok_or_else(|| invalid(text, "repetition must be a number"))?;
        if !cursor.eat(']') {
            return Err(invalid(text, "unclosed repetition"));
        }
        path.repetition = Some(rep);
    }

    if cursor.eat('.') || cursor.eat('-') {
        path.component = Some(
            cursor
                .number()
                .ok_or_else(|| invalid(text, "component must be a number"))?,
        );
        if cursor.eat('.') || cursor.eat('-') {
            path.subcomponent = Some(
                cursor
                    .number()
                    .ok_or_else(|| invalid(text, "subcomponent must be a number"))?,
            );
        }
    }

    if !cursor.is_done() {
        return Err(invalid(text, "unexpected trailing characters"));
    }
    Ok(path)
}

/// `PID2.3.1.1.1`: every level is an explicit dotted index
fn parse_key(text: &str, mut cursor: Cursor<'_>, segment_type: String) -> Result<Path> {
    let index = cursor
        .number()
        .ok_or_else(|| invalid(text, "segment index must be a number"))?;
    let mut levels = [None; 4];
    for level in &mut levels {
        if cursor.is_done() {
            break;
        }
        if !cursor.eat('.') {
            return Err(invalid(text, "expected '.' between key indices"));
        }
        *level = Some(
            cursor
                .number()
                .ok_or_else(|| invalid(text, "key index must be a number"))?,
        );
    }
    if !cursor.is_done() {
        return Err(invalid(text, "key has more than five levels"));
    }
    let [field, repetition, component, subcomponent] = levels;
    Ok(Path {
        segment: SegmentSelector::Key { segment_type, index },
        field,
        repetition,
        component,
        subcomponent,
    })
}
