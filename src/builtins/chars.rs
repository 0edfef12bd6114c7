//! Character primitives, including the Unicode classification group.

use std::cell::RefCell;
use std::rc::Rc;

use super::{char_arg, index_arg, string_arg};
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::Value;

fn native_char_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Char(_))))
}

fn native_char_to_integer(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let c = char_arg("char->integer", &args[0])?;
    Ok(Value::Number((c as u32 as i64).into()))
}

fn native_integer_to_char(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let code = index_arg("integer->char", &args[0])?;
    match u32::try_from(code).ok().and_then(char::from_u32) {
        Some(c) => Ok(Value::Char(c)),
        None => Err(Error::domain_error(format!(
            "integer->char: invalid scalar value: {}",
            args[0]
        ))),
    }
}

fn native_char_eq(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let a = char_arg("char=?", &args[0])?;
    let b = char_arg("char=?", &args[1])?;
    Ok(Value::Boolean(a == b))
}

fn native_char_lt(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let a = char_arg("char<?", &args[0])?;
    let b = char_arg("char<?", &args[1])?;
    Ok(Value::Boolean(a < b))
}

fn native_char_upcase(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let c = char_arg("char-upcase", &args[0])?;
    Ok(Value::Char(c.to_uppercase().next().unwrap_or(c)))
}

fn native_char_downcase(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let c = char_arg("char-downcase", &args[0])?;
    Ok(Value::Char(c.to_lowercase().next().unwrap_or(c)))
}

fn native_char_alphabetic_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let c = char_arg("char-alphabetic?", &args[0])?;
    Ok(Value::Boolean(c.is_alphabetic()))
}

fn native_char_numeric_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let c = char_arg("char-numeric?", &args[0])?;
    Ok(Value::Boolean(c.is_numeric()))
}

fn native_char_whitespace_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let c = char_arg("char-whitespace?", &args[0])?;
    Ok(Value::Boolean(c.is_whitespace()))
}

fn native_string_upcase(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string-upcase", &args[0])?;
    let out = s.borrow().to_uppercase();
    Ok(Value::String(Rc::new(RefCell::new(out))))
}

fn native_string_downcase(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string-downcase", &args[0])?;
    let out = s.borrow().to_lowercase();
    Ok(Value::String(Rc::new(RefCell::new(out))))
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("char?", &["obj"], Type::boolean(), native_char_p),
        Builtin::new(
            "char->integer",
            &["char"],
            Type::inexact_integer(),
            native_char_to_integer,
        ),
        Builtin::new(
            "integer->char",
            &["k"],
            Type::character(),
            native_integer_to_char,
        ),
        Builtin::new("char=?", &["char1", "char2"], Type::boolean(), native_char_eq),
        Builtin::new("char<?", &["char1", "char2"], Type::boolean(), native_char_lt),
    ]
}

pub fn unicode_builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("char-upcase", &["char"], Type::character(), native_char_upcase),
        Builtin::new(
            "char-downcase",
            &["char"],
            Type::character(),
            native_char_downcase,
        ),
        Builtin::new(
            "char-alphabetic?",
            &["char"],
            Type::boolean(),
            native_char_alphabetic_p,
        ),
        Builtin::new(
            "char-numeric?",
            &["char"],
            Type::boolean(),
            native_char_numeric_p,
        ),
        Builtin::new(
            "char-whitespace?",
            &["char"],
            Type::boolean(),
            native_char_whitespace_p,
        ),
        Builtin::new(
            "string-upcase",
            &["string"],
            Type::string(),
            native_string_upcase,
        ),
        Builtin::new(
            "string-downcase",
            &["string"],
            Type::string(),
            native_string_downcase,
        ),
    ]
}
