//! String primitives. Indices count Unicode scalar values, not bytes.

use std::cell::RefCell;
use std::rc::Rc;

use super::{char_arg, index_arg, list_arg, string_arg};
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::{Value, list_from_vec};

fn string_value(s: String) -> Value {
    Value::String(Rc::new(RefCell::new(s)))
}

fn native_string_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::String(_))))
}

fn native_make_string(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let k = index_arg("make-string", &args[0])?;
    let fill = if args.len() > 1 {
        char_arg("make-string", &args[1])?
    } else {
        ' '
    };
    Ok(string_value(std::iter::repeat_n(fill, k).collect()))
}

fn native_string_length(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string-length", &args[0])?;
    let len = s.borrow().chars().count() as i64;
    Ok(Value::Number(len.into()))
}

fn native_string_ref(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string-ref", &args[0])?;
    let k = index_arg("string-ref", &args[1])?;
    match s.borrow().chars().nth(k) {
        Some(c) => Ok(Value::Char(c)),
        None => Err(Error::domain_error(format!(
            "string-ref: index {k} out of range"
        ))),
    }
}

fn native_substring(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("substring", &args[0])?;
    let start = index_arg("substring", &args[1])?;
    let end = index_arg("substring", &args[2])?;
    let s = s.borrow();
    let len = s.chars().count();
    if start > end || end > len {
        return Err(Error::domain_error(format!(
            "substring: invalid range {start}..{end} for length {len}"
        )));
    }
    Ok(string_value(s.chars().skip(start).take(end - start).collect()))
}

fn native_string_append(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let mut out = String::new();
    for arg in args {
        let s = string_arg("string-append", arg)?;
        out.push_str(&s.borrow());
    }
    Ok(string_value(out))
}

fn string_compare(
    who: &str,
    args: &[Value],
    good: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, Error> {
    let a = string_arg(who, &args[0])?;
    let b = string_arg(who, &args[1])?;
    let ordering = a.borrow().cmp(&b.borrow());
    Ok(Value::Boolean(good(ordering)))
}

fn native_string_eq(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    string_compare("string=?", args, |o| o.is_eq())
}

fn native_string_lt(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    string_compare("string<?", args, |o| o.is_lt())
}

fn native_string_gt(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    string_compare("string>?", args, |o| o.is_gt())
}

fn native_string_copy(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string-copy", &args[0])?;
    let copy = s.borrow().clone();
    Ok(string_value(copy))
}

fn native_string_to_list(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string->list", &args[0])?;
    let items: Vec<Value> = s.borrow().chars().map(Value::Char).collect();
    Ok(list_from_vec(items))
}

fn native_list_to_string(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let items = list_arg("list->string", &args[0])?;
    let mut out = String::with_capacity(items.len());
    for item in &items {
        out.push(char_arg("list->string", item)?);
    }
    Ok(string_value(out))
}

fn native_string_set(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string-set!", &args[0])?;
    let k = index_arg("string-set!", &args[1])?;
    let c = char_arg("string-set!", &args[2])?;
    let mut chars: Vec<char> = s.borrow().chars().collect();
    if k >= chars.len() {
        return Err(Error::domain_error(format!(
            "string-set!: index {k} out of range"
        )));
    }
    chars[k] = c;
    *s.borrow_mut() = chars.into_iter().collect();
    Ok(Value::Unspecified)
}

fn native_string_fill(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string-fill!", &args[0])?;
    let c = char_arg("string-fill!", &args[1])?;
    let len = s.borrow().chars().count();
    *s.borrow_mut() = std::iter::repeat_n(c, len).collect();
    Ok(Value::Unspecified)
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("string?", &["obj"], Type::boolean(), native_string_p),
        Builtin::new(
            "make-string",
            &["k", "[char:fill]"],
            Type::string(),
            native_make_string,
        ),
        Builtin::new(
            "string-length",
            &["string"],
            Type::inexact_integer(),
            native_string_length,
        ),
        Builtin::new(
            "string-ref",
            &["string", "k"],
            Type::character(),
            native_string_ref,
        ),
        Builtin::new(
            "substring",
            &["string", "start", "end"],
            Type::string(),
            native_substring,
        ),
        Builtin::new(
            "string-append",
            &["string..."],
            Type::string(),
            native_string_append,
        ),
        Builtin::new(
            "string=?",
            &["string1", "string2"],
            Type::boolean(),
            native_string_eq,
        ),
        Builtin::new(
            "string<?",
            &["string1", "string2"],
            Type::boolean(),
            native_string_lt,
        ),
        Builtin::new(
            "string>?",
            &["string1", "string2"],
            Type::boolean(),
            native_string_gt,
        ),
        Builtin::new("string-copy", &["string"], Type::string(), native_string_copy),
        Builtin::new(
            "string->list",
            &["string"],
            Type::list_of(Type::character()),
            native_string_to_list,
        ),
        Builtin::new("list->string", &["list"], Type::string(), native_list_to_string),
    ]
}

pub fn mutable_string_builtins() -> Vec<Builtin> {
    vec![
        Builtin::new(
            "string-set!",
            &["string", "k", "char"],
            Type::any(),
            native_string_set,
        ),
        Builtin::new(
            "string-fill!",
            &["string", "char"],
            Type::any(),
            native_string_fill,
        ),
    ]
}
