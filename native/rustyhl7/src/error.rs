//! Error taxonomy
//!
//! Reads are permissive (out-of-range reads yield absent values), so every
//! variant here comes from a write, a structural edit, or message ingestion.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Hl7Error>;

/// Structural operation that was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Delete,
    Insert,
    Move,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Delete => "delete",
            Operation::Insert => "insert",
            Operation::Move => "move",
        })
    }
}

/// Every failure condition the engine reports
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Hl7Error {
    // Structural-edit violations
    #[error("cannot {operation} the root element")]
    RootElement { operation: Operation },

    #[error("cannot {operation} the fixed element at index {index}")]
    FixedElement { operation: Operation, index: usize },

    #[error("index {index} is below the minimum of {minimum}")]
    IndexBelowMinimum { index: usize, minimum: usize },

    #[error("cannot {operation} relative to an element without an ancestor")]
    NoAncestor { operation: Operation },

    #[error("cannot {operation} at segment 1, it holds the MSH header")]
    HeaderSegment { operation: Operation },

    // Message-shape violations
    #[error("message data is missing")]
    MessageDataMissing,

    #[error("message is {length} characters long, at least 8 are required")]
    MessageTooShort { length: usize },

    #[error("message does not start with MSH")]
    MessageMissingMsh,

    #[error("MSH segment data is {length} characters long, at least 8 are required")]
    SegmentTooShort { length: usize },

    #[error("MSH segment data is missing")]
    MshSegmentDataMissing,

    // Illegal type transitions
    #[error("segment type cannot change from {from:?} to {to:?}")]
    IllegalTypeTransition { from: String, to: String },

    // Delimiters and input decoding
    #[error("invalid delimiter {character:?}")]
    InvalidDelimiter { character: char },

    #[error("field delimiter must be exactly one character, got {length}")]
    FieldDelimiterLength { length: usize },

    #[error("invalid UTF-16 input: {0}")]
    Utf16(String),

    #[error("input is not valid UTF-8")]
    Utf8,

    // Location paths
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

impl Hl7Error {
    /// Stable reason code, used as the error atom on the NIF boundary
    pub fn code(&self) -> &'static str {
        match self {
            Hl7Error::RootElement { .. } => "root_element",
            Hl7Error::FixedElement { .. } => "fixed_element",
            Hl7Error::IndexBelowMinimum { .. } => "index_below_minimum",
            Hl7Error::NoAncestor { .. } => "no_ancestor",
            Hl7Error::HeaderSegment { .. } => "header_segment",
            Hl7Error::MessageDataMissing => "message_data_missing",
            Hl7Error::MessageTooShort { .. } => "message_too_short",
            Hl7Error::MessageMissingMsh => "message_missing_msh",
            Hl7Error::SegmentTooShort { .. } => "segment_too_short",
            Hl7Error::MshSegmentDataMissing => "msh_segment_data_missing",
            Hl7Error::IllegalTypeTransition { .. } => "illegal_type_transition",
            Hl7Error::InvalidDelimiter { .. } => "invalid_delimiter",
            Hl7Error::FieldDelimiterLength { .. } => "field_delimiter_length",
            Hl7Error::Utf16(_) => "invalid_utf16",
            Hl7Error::Utf8 => "invalid_utf8",
            Hl7Error::InvalidPath { .. } => "invalid_path",
        }
    }

    /// True for violations of the structural-edit rules
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Hl7Error::RootElement { .. }
                | Hl7Error::FixedElement { .. }
                | Hl7Error::IndexBelowMinimum { .. }
                | Hl7Error::NoAncestor { .. }
                | Hl7Error::HeaderSegment { .. }
        )
    }
}
