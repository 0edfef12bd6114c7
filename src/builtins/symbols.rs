//! Symbol primitives.

use std::cell::RefCell;
use std::rc::Rc;

use super::{string_arg, symbol_arg};
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::Value;

fn native_symbol_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Symbol(_))))
}

fn native_symbol_to_string(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let sym = symbol_arg("symbol->string", &args[0])?;
    let name = sym.borrow().name.clone();
    Ok(Value::String(Rc::new(RefCell::new(name))))
}

fn native_string_to_symbol(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let s = string_arg("string->symbol", &args[0])?;
    let name = s.borrow().clone();
    Ok(Value::Symbol(interp.intern(&name)))
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("symbol?", &["obj"], Type::boolean(), native_symbol_p),
        Builtin::new(
            "symbol->string",
            &["sym"],
            Type::string(),
            native_symbol_to_string,
        ),
        Builtin::new(
            "string->symbol",
            &["string"],
            Type::symbol(),
            native_string_to_symbol,
        ),
    ]
}
