//! Native builtin groups.
//!
//! Each submodule contributes one registration group in the sense of
//! the embedder API: a vector of [`Builtin`] declarations whose
//! argument strings are parsed into arity and type descriptors at
//! registration time. The natives themselves follow the single
//! native-function contract: the VM validates the argument count
//! before invocation, and errors use the "who: message" convention.

pub mod boolean;
pub mod bytevectors;
pub mod chars;
pub mod debug;
pub mod files;
pub mod io;
pub mod lists;
pub mod load;
pub mod numbers;
pub mod procedures;
pub mod programs;
pub mod strings;
pub mod symbols;
pub mod vectors;

use std::cell::RefCell;
use std::rc::Rc;

use crate::Error;
use crate::number::Number;
use crate::symbols::SymbolRef;
use crate::value::{PairRef, Port, Value};

pub(crate) fn wrong_type(who: &str, expected: &str, got: &Value) -> Error {
    Error::type_error(format!("{who}: expected {expected}, got {got}"))
}

pub(crate) fn number_arg<'a>(who: &str, v: &'a Value) -> Result<&'a Number, Error> {
    match v {
        Value::Number(n) => Ok(n),
        other => Err(wrong_type(who, "a number", other)),
    }
}

/// An exact non-negative machine integer, used for indices and counts.
pub(crate) fn index_arg(who: &str, v: &Value) -> Result<usize, Error> {
    match v {
        Value::Number(n) => match n.as_i64() {
            Some(i) if i >= 0 => Ok(i as usize),
            _ => Err(Error::domain_error(format!("{who}: invalid index: {v}"))),
        },
        other => Err(wrong_type(who, "an index", other)),
    }
}

pub(crate) fn string_arg(who: &str, v: &Value) -> Result<Rc<RefCell<String>>, Error> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(wrong_type(who, "a string", other)),
    }
}

pub(crate) fn char_arg(who: &str, v: &Value) -> Result<char, Error> {
    match v {
        Value::Char(c) => Ok(*c),
        other => Err(wrong_type(who, "a character", other)),
    }
}

pub(crate) fn symbol_arg(who: &str, v: &Value) -> Result<SymbolRef, Error> {
    match v {
        Value::Symbol(s) => Ok(s.clone()),
        other => Err(wrong_type(who, "a symbol", other)),
    }
}

pub(crate) fn pair_arg(who: &str, v: &Value) -> Result<PairRef, Error> {
    match v {
        Value::Pair(p) => Ok(p.clone()),
        other => Err(wrong_type(who, "a pair", other)),
    }
}

pub(crate) fn vector_arg(who: &str, v: &Value) -> Result<Rc<RefCell<Vec<Value>>>, Error> {
    match v {
        Value::Vector(items) => Ok(items.clone()),
        other => Err(wrong_type(who, "a vector", other)),
    }
}

pub(crate) fn bytevector_arg(who: &str, v: &Value) -> Result<Rc<RefCell<Vec<u8>>>, Error> {
    match v {
        Value::Bytevector(bytes) => Ok(bytes.clone()),
        other => Err(wrong_type(who, "a bytevector", other)),
    }
}

pub(crate) fn port_arg(who: &str, v: &Value) -> Result<Rc<Port>, Error> {
    match v {
        Value::Port(p) => Ok(p.clone()),
        other => Err(wrong_type(who, "a port", other)),
    }
}

pub(crate) fn list_arg(who: &str, v: &Value) -> Result<Vec<Value>, Error> {
    crate::value::list_to_vec(v).ok_or_else(|| wrong_type(who, "a list", v))
}

/// A byte fill value; the accepted range spans signed and unsigned
/// byte interpretations.
pub(crate) fn fill_byte_arg(who: &str, v: &Value) -> Result<u8, Error> {
    match v {
        Value::Number(n) => match n.as_i64() {
            Some(f) if (-128..=255).contains(&f) => Ok(f as u8),
            _ => Err(Error::domain_error(format!("{who}: invalid fill: {v}"))),
        },
        other => Err(wrong_type(who, "a byte", other)),
    }
}
