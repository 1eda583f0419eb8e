//! Core HL7 primitives
//!
//! This module contains the fundamental building blocks shared by both
//! message representations:
//! - Division: (offset, length, valid) slice of a buffer
//! - Scanner: SIMD-accelerated delimiter splitting using memchr
//! - Encoding: the five delimiters, resolved from MSH or set explicitly
//! - Escape: escape/unescape pass-through for the codec layer
//! - Input: UTF-16 detection, line-ending normalisation, shape checks

pub mod division;
pub mod encoding;
pub mod escape;
pub mod input;
pub mod scanner;

pub use division::Division;
pub use encoding::{Encoding, HL7_NULL, MSH, SEGMENT_DELIMITER};
