//! Elixir Term Conversion Utilities
//!
//! Converts lookup results and errors to Elixir terms.

use rustler::types::atom::Atom;
use rustler::{Encoder, Env, NewBinary, Term};

use crate::error::{Hl7Error, Result};

rustler::atoms! {
    ok,
    error,
}

/// `{:error, {reason, message}}`, where `reason` is the error's code atom
pub fn error_to_term<'a>(env: Env<'a>, err: &Hl7Error) -> Term<'a> {
    let message = str_to_binary(env, &err.to_string());
    match Atom::from_str(env, err.code()) {
        Ok(reason) => (error(), (reason, message)).encode(env),
        Err(_) => (error(), message).encode(env),
    }
}

/// `:ok` or an error tuple
pub fn unit_to_term<'a>(env: Env<'a>, result: Result<()>) -> Term<'a> {
    match result {
        Ok(()) => ok().encode(env),
        Err(err) => error_to_term(env, &err),
    }
}

/// `{:ok, binary}` or an error tuple
pub fn string_to_term<'a>(env: Env<'a>, result: Result<String>) -> Term<'a> {
    match result {
        Ok(value) => (ok(), str_to_binary(env, &value)).encode(env),
        Err(err) => error_to_term(env, &err),
    }
}

/// List of `{:ok, binary}` / error tuples in input order
pub fn results_to_term<'a>(env: Env<'a>, results: Vec<Result<String>>) -> Term<'a> {
    let mut list = Term::list_new_empty(env);
    for result in results.into_iter().rev() {
        list = list.list_prepend(string_to_term(env, result));
    }
    list
}

/// List of binaries
pub fn strings_to_term<'a>(env: Env<'a>, values: &[String]) -> Term<'a> {
    let mut list = Term::list_new_empty(env);
    for value in values.iter().rev() {
        list = list.list_prepend(str_to_binary(env, value));
    }
    list
}

/// Convert a string to a binary term (more efficient than .encode())
#[inline]
pub fn str_to_binary<'a>(env: Env<'a>, s: &str) -> Term<'a> {
    let bytes = s.as_bytes();
    let mut binary = NewBinary::new(env, bytes.len());
    binary.as_mut_slice().copy_from_slice(bytes);
    binary.into()
}
