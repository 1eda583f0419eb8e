//! Root divider - owns the message buffer
//!
//! Every edit anywhere in a message ends up as exactly one `replace` here.

use log::{trace, warn};

use super::StringDivider;
use crate::core::scanner::get_divisions;
use crate::core::Division;

/// Divider that owns its character buffer.
///
/// Divisions are cached until the next splice; `version` increases with
/// every splice so descendants can tell their cached divisions are stale.
#[derive(Debug, Clone)]
pub struct RootDivider {
    buffer: String,
    delimiter: Option<u8>,
    version: u64,
    divisions: Option<Vec<Division>>,
}

impl RootDivider {
    /// Create a root divider over a copy of `value`
    pub fn new(value: &str, delimiter: Option<u8>) -> Self {
        Self {
            buffer: value.to_owned(),
            delimiter,
            version: 0,
            divisions: None,
        }
    }

    /// The whole buffer
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Current version without touching the division cache
    #[inline]
    pub fn current_version(&self) -> u64 {
        self.version
    }

    /// Change the splitting character; cached divisions are dropped
    pub fn set_delimiter(&mut self, delimiter: Option<u8>) {
        if self.delimiter != delimiter {
            self.delimiter = delimiter;
            self.divisions = None;
            self.version += 1;
        }
    }

    /// Splice `value` over `buffer[start..start + length]`.
    ///
    /// Same-length replacements overwrite in place; only a length change can
    /// reallocate. Always drops the division cache and bumps the version.
    pub fn replace(&mut self, start: usize, length: usize, value: &str) {
        let start = start.min(self.buffer.len());
        let end = start.saturating_add(length).min(self.buffer.len());
        if !self.buffer.is_char_boundary(start) || !self.buffer.is_char_boundary(end) {
            warn!("splice {start}..{end} does not fall on character boundaries, ignored");
            return;
        }
        trace!("splice {start}..{end} <- {} bytes", value.len());
        self.buffer.replace_range(start..end, value);
        self.divisions = None;
        self.version += 1;
    }

    /// Consume the divider, returning the buffer
    pub fn into_string(self) -> String {
        self.buffer
    }
}

impl StringDivider for RootDivider {
    fn delimiter(&self) -> Option<u8> {
        self.delimiter
    }

    fn version(&mut self) -> u64 {
        self.version
    }

    fn buffer(&self) -> &str {
        &self.buffer
    }

    fn bound(&mut self) -> Division {
        Division::new(0, self.buffer.len())
    }

    fn divisions(&mut self) -> &[Division] {
        self.divisions
            .get_or_insert_with(|| get_divisions(&self.buffer, self.delimiter))
    }

    fn splice(&mut self, start: usize, length: usize, value: &str) {
        self.replace(start, length, value);
    }

    fn materialize(&mut self, value: &str) {
        let length = self.buffer.len();
        self.replace(0, length, value);
    }
}
