//! RustyHL7 - HL7v2 messages over lazily divided text
//!
//! Two representations share one element contract:
//! - Parsing (`Message`): views over the original buffer, re-divided lazily
//!   after each splice
//! - Building (`MessageBuilder`): a canonical tree with mutable delimiters
//!
//! Plus a read-only `MessageView` for parallel path lookups, and the NIF
//! surface for `Elixir.RustyHL7.Native`.

use log::debug;
use rustler::{Binary, Encoder, Env, NifResult, ResourceArc, Term};

pub mod builder;
pub mod core;
pub mod divider;
pub mod element;
pub mod error;
pub mod parser;
pub mod path;
pub mod reader;
mod resource;
pub mod strategy;
mod term;

pub use crate::builder::{BuilderNode, DetachedBuilder, MessageBuilder};
pub use crate::core::{Encoding, HL7_NULL};
pub use crate::element::{Element, ElementExt, ElementKind, Level};
pub use crate::error::{Hl7Error, Operation};
pub use crate::parser::{Detached, Message, Node};
pub use crate::path::Path;
pub use crate::reader::MessageView;

use resource::{MessageRef, MessageResource};
use term::{error_to_term, ok, results_to_term, str_to_binary, string_to_term, strings_to_term, unit_to_term};

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "memory_tracking")]
mod tracking {
    use std::alloc::{GlobalAlloc, Layout};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
    pub static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

    /// Counts live bytes on top of the configured allocator
    pub struct TrackingAllocator;

    #[cfg(feature = "mimalloc")]
    static UNDERLYING: mimalloc::MiMalloc = mimalloc::MiMalloc;

    #[cfg(not(feature = "mimalloc"))]
    static UNDERLYING: std::alloc::System = std::alloc::System;

    unsafe impl GlobalAlloc for TrackingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ptr = UNDERLYING.alloc(layout);
            if !ptr.is_null() {
                let current = ALLOCATED.fetch_add(layout.size(), Ordering::Relaxed) + layout.size();
                PEAK_ALLOCATED.fetch_max(current, Ordering::Relaxed);
            }
            ptr
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
            UNDERLYING.dealloc(ptr, layout)
        }
    }
}

#[cfg(feature = "memory_tracking")]
#[global_allocator]
static GLOBAL: tracking::TrackingAllocator = tracking::TrackingAllocator;

#[cfg(all(feature = "mimalloc", not(feature = "memory_tracking")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Memory Tracking NIFs
// ============================================================================

#[cfg(feature = "memory_tracking")]
use std::sync::atomic::Ordering;

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn get_rust_memory() -> usize {
    tracking::ALLOCATED.load(Ordering::SeqCst)
}

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    tracking::PEAK_ALLOCATED.load(Ordering::SeqCst)
}

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    let current = tracking::ALLOCATED.load(Ordering::SeqCst);
    let peak = tracking::PEAK_ALLOCATED.swap(current, Ordering::SeqCst);
    (current, peak)
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn get_rust_memory() -> usize {
    0
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    0
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    (0, 0)
}

// ============================================================================
// Message Lifecycle
// ============================================================================

fn lock_error(reason: &'static str) -> rustler::Error {
    rustler::Error::Term(Box::new(reason))
}

/// Element at `location`, which must name an existing segment
fn locate<'m>(message: &'m Message, location: &str) -> error::Result<Node<'m>> {
    message.node(location)?.ok_or_else(|| Hl7Error::InvalidPath {
        path: location.to_owned(),
        reason: "no such segment",
    })
}

/// Parse message bytes (UTF-8 or UTF-16) into a resource.
/// Returns `{:ok, ref}` or `{:error, {reason, message}}`.
#[rustler::nif]
fn parse<'a>(env: Env<'a>, input: Binary<'a>) -> Term<'a> {
    match Message::from_bytes(input.as_slice()) {
        Ok(message) => {
            debug!("parsed message with {} segments", message.segment_count());
            (ok(), ResourceArc::new(MessageResource::new(message))).encode(env)
        }
        Err(err) => error_to_term(env, &err),
    }
}

/// Current text of the message
#[rustler::nif]
fn to_string<'a>(env: Env<'a>, message: MessageRef) -> NifResult<Term<'a>> {
    let text = message.snapshot().map_err(lock_error)?;
    Ok(str_to_binary(env, &text))
}

#[rustler::nif]
fn segment_types<'a>(env: Env<'a>, message: MessageRef) -> NifResult<Term<'a>> {
    let types = message.with(Message::segment_types).map_err(lock_error)?;
    Ok(strings_to_term(env, &types))
}

// ============================================================================
// Path Access and Structural Edits
// ============================================================================

/// Value at a location path, `{:ok, ""}` when absent
#[rustler::nif]
fn get<'a>(env: Env<'a>, message: MessageRef, location: &str) -> NifResult<Term<'a>> {
    let result = message.with(|m| m.get(location)).map_err(lock_error)?;
    Ok(string_to_term(env, result))
}

/// Write the value at a location path, padding as needed
#[rustler::nif]
fn set<'a>(env: Env<'a>, message: MessageRef, location: &str, value: &str) -> NifResult<Term<'a>> {
    let result = message.with(|m| m.set(location, value)).map_err(lock_error)?;
    Ok(unit_to_term(env, result))
}

/// Remove the element at a location path from its ancestor
#[rustler::nif]
fn delete<'a>(env: Env<'a>, message: MessageRef, location: &str) -> NifResult<Term<'a>> {
    let result = message
        .with(|m| locate(m, location).and_then(|node| node.delete()))
        .map_err(lock_error)?;
    Ok(unit_to_term(env, result))
}

/// Insert `value` at the position a location path addresses
#[rustler::nif]
fn insert<'a>(env: Env<'a>, message: MessageRef, location: &str, value: &str) -> NifResult<Term<'a>> {
    let result = message
        .with(|m| locate(m, location).and_then(|node| node.insert_before(value)))
        .map_err(lock_error)?;
    Ok(unit_to_term(env, result))
}

/// Move the element at a location path to `target` within its ancestor
#[rustler::nif(name = "move")]
fn move_element<'a>(env: Env<'a>, message: MessageRef, location: &str, target: usize) -> NifResult<Term<'a>> {
    let result = message
        .with(|m| locate(m, location).and_then(|node| node.move_to(target)))
        .map_err(lock_error)?;
    Ok(unit_to_term(env, result))
}

// ============================================================================
// Parallel Lookup
// ============================================================================

/// Resolve many paths in parallel over a snapshot of the message.
/// The lock is released before the lookups run.
#[rustler::nif(schedule = "DirtyCpu")]
fn get_parallel<'a>(env: Env<'a>, message: MessageRef, locations: Vec<&str>) -> NifResult<Term<'a>> {
    let text = message.snapshot().map_err(lock_error)?;
    let view = MessageView::new(&text);
    let results = strategy::parallel::evaluate_parallel(&view, &locations);
    Ok(results_to_term(env, results))
}

// ============================================================================
// Escaping
// ============================================================================

/// Escape delimiters in `text` using the message's encoding
#[rustler::nif]
fn escape<'a>(env: Env<'a>, message: MessageRef, text: &str) -> NifResult<Term<'a>> {
    let encoding = message.lock().map_err(lock_error)?.encoding();
    Ok(str_to_binary(env, &encoding.escape(text)))
}

/// Translate escape sequences in `text` using the message's encoding
#[rustler::nif]
fn unescape<'a>(env: Env<'a>, message: MessageRef, text: &str) -> NifResult<Term<'a>> {
    let encoding = message.lock().map_err(lock_error)?.encoding();
    Ok(str_to_binary(env, &encoding.unescape(text)))
}

// ============================================================================
// NIF Initialization
// ============================================================================

fn load(_env: Env, _info: Term) -> bool {
    debug!("rustyhl7 loaded");
    true
}

rustler::init!("Elixir.RustyHL7.Native", load = load);
