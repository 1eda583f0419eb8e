//! Evaluation Strategies
//!
//! - Sequential: `Message::get` / `MessageBuilder::get`, one path at a time
//! - Parallel: many paths against one `MessageView` with Rayon

pub mod parallel;

pub use parallel::{evaluate_parallel, get_map};
