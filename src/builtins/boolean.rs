//! Boolean and equality primitives.

use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::Value;

fn native_not(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(!args[0].is_truthy()))
}

fn native_boolean_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Boolean(_))))
}

fn native_eq(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(args[0].is_eq(&args[1])))
}

fn native_eqv(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(args[0].is_eqv(&args[1])))
}

fn native_equal(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(args[0].is_equal(&args[1])))
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("not", &["obj"], Type::boolean(), native_not),
        Builtin::new("boolean?", &["obj"], Type::boolean(), native_boolean_p),
        Builtin::new("eq?", &["obj1", "obj2"], Type::boolean(), native_eq),
        Builtin::new("eqv?", &["obj1", "obj2"], Type::boolean(), native_eqv),
        Builtin::new("equal?", &["obj1", "obj2"], Type::boolean(), native_equal),
    ]
}
