//! Compiled path cache
//!
//! Paths are small but parsed on every NIF call, so compiled paths are kept
//! in an LRU keyed by the expression text.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock, PoisonError};

use log::debug;
use lru::LruCache;

use super::{parser, Path};
use crate::error::Result;

/// Capacity of the process-wide cache
pub const GLOBAL_CAPACITY: usize = 256;

/// LRU of compiled paths
#[derive(Debug)]
pub struct PathCache {
    paths: LruCache<String, Path>,
}

impl PathCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            paths: LruCache::new(capacity),
        }
    }

    /// Compiled form of `text`, parsing it on a miss
    ///
    /// # Errors
    ///
    /// `InvalidPath` when `text` does not parse. Failures are not cached.
    pub fn compile(&mut self, text: &str) -> Result<Path> {
        if let Some(path) = self.paths.get(text) {
            return Ok(path.clone());
        }
        debug!("path cache miss for {text:?}");
        let path = parser::parse(text)?;
        self.paths.put(text.to_owned(), path.clone());
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::with_capacity(GLOBAL_CAPACITY)
    }
}

static GLOBAL: OnceLock<Mutex<PathCache>> = OnceLock::new();

/// Compile through the process-wide cache
///
/// # Errors
///
/// `InvalidPath` when `text` does not parse.
pub fn compile(text: &str) -> Result<Path> {
    GLOBAL
        .get_or_init(|| Mutex::new(PathCache::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .compile(text)
}
