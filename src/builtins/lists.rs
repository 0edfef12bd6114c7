//! List and pair primitives.

use super::{index_arg, list_arg, pair_arg};
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::{Value, cons, list_from_vec};

fn native_pair_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Pair(_))))
}

fn native_null_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Null)))
}

fn native_list_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(crate::value::list_to_vec(&args[0]).is_some()))
}

fn native_cons(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(cons(args[0].clone(), args[1].clone()))
}

fn native_car(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let pair = pair_arg("car", &args[0])?;
    let car = pair.borrow().car.clone();
    Ok(car)
}

fn native_cdr(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let pair = pair_arg("cdr", &args[0])?;
    let cdr = pair.borrow().cdr.clone();
    Ok(cdr)
}

fn native_list(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(list_from_vec(args.to_vec()))
}

fn native_length(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let items = list_arg("length", &args[0])?;
    Ok(Value::Number((items.len() as i64).into()))
}

fn native_append(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let Some((last, init)) = args.split_last() else {
        return Ok(Value::Null);
    };
    // All but the last argument must be proper lists; the last becomes
    // the tail as-is.
    let mut result = last.clone();
    for arg in init.iter().rev() {
        let items = list_arg("append", arg)?;
        for item in items.into_iter().rev() {
            result = cons(item, result);
        }
    }
    Ok(result)
}

fn native_reverse(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let mut items = list_arg("reverse", &args[0])?;
    items.reverse();
    Ok(list_from_vec(items))
}

fn native_list_tail(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let k = index_arg("list-tail", &args[1])?;
    let mut cursor = args[0].clone();
    for _ in 0..k {
        match cursor {
            Value::Pair(p) => {
                let next = p.borrow().cdr.clone();
                cursor = next;
            }
            _ => {
                return Err(Error::domain_error(format!(
                    "list-tail: index {k} out of range: {}",
                    args[0]
                )));
            }
        }
    }
    Ok(cursor)
}

fn native_list_ref(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let items = list_arg("list-ref", &args[0])?;
    let k = index_arg("list-ref", &args[1])?;
    match items.get(k) {
        Some(item) => Ok(item.clone()),
        None => Err(Error::domain_error(format!(
            "list-ref: index {k} out of range: {}",
            args[0]
        ))),
    }
}

fn native_set_car(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let pair = pair_arg("set-car!", &args[0])?;
    pair.borrow_mut().car = args[1].clone();
    Ok(Value::Unspecified)
}

fn native_set_cdr(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let pair = pair_arg("set-cdr!", &args[0])?;
    pair.borrow_mut().cdr = args[1].clone();
    Ok(Value::Unspecified)
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("pair?", &["obj"], Type::boolean(), native_pair_p),
        Builtin::new("null?", &["obj"], Type::boolean(), native_null_p),
        Builtin::new("list?", &["obj"], Type::boolean(), native_list_p),
        Builtin::new("cons", &["obj1", "obj2"], Type::pair_of(Type::any(), Type::any()), native_cons),
        Builtin::new("car", &["pair"], Type::any(), native_car),
        Builtin::new("cdr", &["pair"], Type::any(), native_cdr),
        Builtin::new("list", &["obj..."], Type::list_of(Type::any()), native_list),
        Builtin::new("length", &["list"], Type::inexact_integer(), native_length),
        Builtin::new("append", &["list..."], Type::any(), native_append),
        Builtin::new("reverse", &["list"], Type::list_of(Type::any()), native_reverse),
        Builtin::new("list-tail", &["list", "k"], Type::any(), native_list_tail),
        Builtin::new("list-ref", &["list", "k"], Type::any(), native_list_ref),
    ]
}

pub fn mutable_pair_builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("set-car!", &["pair", "obj"], Type::any(), native_set_car),
        Builtin::new("set-cdr!", &["pair", "obj"], Type::any(), native_set_cdr),
    ]
}
