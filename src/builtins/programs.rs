//! Program-level primitives.

use super::number_arg;
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::Value;

fn native_exit(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let code = if args.is_empty() {
        0
    } else {
        number_arg("exit", &args[0])?.as_i64().unwrap_or(1)
    };
    std::process::exit(code as i32);
}

/// `(error irritant...)`: raise a runtime error whose message is the
/// display form of the irritants joined with spaces.
fn native_error(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let message = if args.is_empty() {
        "error".to_string()
    } else {
        args.iter()
            .map(|v| v.display_string())
            .collect::<Vec<String>>()
            .join(" ")
    };
    Err(Error::other(message))
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("exit", &["[k]"], Type::any(), native_exit),
        Builtin::new("error", &["irritant..."], Type::any(), native_error),
    ]
}
