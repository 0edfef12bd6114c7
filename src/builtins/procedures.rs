//! Procedure primitives.

use super::list_arg;
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::Value;

fn native_procedure_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Lambda(_))))
}

/// `(apply proc arg1 ... rest-list)`: the fixed arguments are prepended
/// to the elements of the trailing list. Re-enters the VM through
/// [`Interp::apply`].
fn native_apply(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let func = args[0].clone();
    let last = &args[args.len() - 1];
    let tail = list_arg("apply", last)?;

    let mut call_args = Vec::with_capacity(args.len() - 2 + tail.len());
    call_args.extend_from_slice(&args[1..args.len() - 1]);
    call_args.extend(tail);
    interp.apply(func, &call_args)
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("procedure?", &["obj"], Type::boolean(), native_procedure_p),
        Builtin::new("apply", &["proc", "obj1", "obj..."], Type::any(), native_apply),
    ]
}
