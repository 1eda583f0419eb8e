//! Message Input Decoding and Validation
//!
//! Handles detection of UTF-16 input based on BOM or byte patterns, converts
//! it to UTF-8, normalises line endings to the segment terminator, and applies
//! the message-shape checks that gate every construction entry point.

use std::borrow::Cow;

use memchr::memchr;

use super::encoding::MSH;
use crate::error::{Hl7Error, Result};

/// Shortest acceptable message: `MSH|^~\&`
pub const MIN_MESSAGE_LENGTH: usize = 8;

/// Byte encoding of raw message input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl InputEncoding {
    /// Detect encoding from byte order mark or initial bytes
    pub fn detect(input: &[u8]) -> Self {
        if input.len() < 2 {
            return InputEncoding::Utf8;
        }

        match (input[0], input[1]) {
            // UTF-16 LE BOM: 0xFF 0xFE
            (0xFF, 0xFE) => InputEncoding::Utf16Le,
            // UTF-16 BE BOM: 0xFE 0xFF
            (0xFE, 0xFF) => InputEncoding::Utf16Be,
            // No BOM - an MSH segment starts with 'M'
            (0x00, b'M') => InputEncoding::Utf16Be,
            (b'M', 0x00) => InputEncoding::Utf16Le,
            _ => InputEncoding::Utf8,
        }
    }
}

/// Decode raw bytes into message text with normalised line endings
///
/// # Errors
///
/// Returns `Utf16` for malformed UTF-16 input and `Utf8` when the bytes are
/// not valid UTF-8.
pub fn decode(input: &[u8]) -> Result<String> {
    let text = match InputEncoding::detect(input) {
        InputEncoding::Utf8 => {
            let bytes = input.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(input);
            std::str::from_utf8(bytes).map_err(|_| Hl7Error::Utf8)?.to_owned()
        }
        InputEncoding::Utf16Le => decode_utf16(input, [0xFF, 0xFE], u16::from_le_bytes)?,
        InputEncoding::Utf16Be => decode_utf16(input, [0xFE, 0xFF], u16::from_be_bytes)?,
    };
    Ok(match normalize_line_endings(&text) {
        Cow::Borrowed(_) => text,
        Cow::Owned(normalized) => normalized,
    })
}

fn decode_utf16(input: &[u8], bom: [u8; 2], unit: fn([u8; 2]) -> u16) -> Result<String> {
    let bytes = input.strip_prefix(&bom).unwrap_or(input);

    if bytes.len() % 2 != 0 {
        return Err(Hl7Error::Utf16("odd number of bytes".to_string()));
    }

    let code_units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| unit([chunk[0], chunk[1]]))
        .collect();

    String::from_utf16(&code_units).map_err(|e| Hl7Error::Utf16(e.to_string()))
}

/// Convert `\r\n` and `\n` to the `\r` segment terminator
///
/// Returns Borrowed if there is no line feed (zero-copy).
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if memchr(b'\n', text.as_bytes()).is_none() {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\r").replace('\n', "\r"))
}

/// Message-shape checks: present, long enough, starts with MSH
///
/// # Errors
///
/// `MessageDataMissing`, `MessageTooShort` or `MessageMissingMsh`.
pub fn validate_message(text: Option<&str>) -> Result<&str> {
    let text = match text {
        Some(t) if !t.is_empty() => t,
        _ => return Err(Hl7Error::MessageDataMissing),
    };
    if text.len() < MIN_MESSAGE_LENGTH {
        return Err(Hl7Error::MessageTooShort { length: text.len() });
    }
    if !text.starts_with(MSH) {
        return Err(Hl7Error::MessageMissingMsh);
    }
    Ok(text)
}
