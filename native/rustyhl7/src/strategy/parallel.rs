//! Parallel Path Evaluation
//!
//! Uses Rayon to resolve many location paths against one read-only view.

use rayon::prelude::*;

use crate::error::Result;
use crate::reader::MessageView;

/// Resolve every path in parallel. Results keep the order of `paths`.
pub fn evaluate_parallel(view: &MessageView<'_>, paths: &[&str]) -> Vec<Result<String>> {
    paths.par_iter().map(|path| view.get(path)).collect()
}

/// Resolve `(key, path)` pairs in parallel, failing on the first bad path
pub fn get_map(view: &MessageView<'_>, queries: &[(&str, &str)]) -> Result<Vec<(String, String)>> {
    queries
        .par_iter()
        .map(|(key, path)| view.get(path).map(|value| ((*key).to_owned(), value)))
        .collect()
}
