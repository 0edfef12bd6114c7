//! Vector primitives.

use std::cell::RefCell;
use std::rc::Rc;

use super::{index_arg, list_arg, vector_arg};
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::{Value, list_from_vec};

fn native_vector_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Vector(_))))
}

fn native_make_vector(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let k = index_arg("make-vector", &args[0])?;
    let fill = if args.len() > 1 {
        args[1].clone()
    } else {
        Value::Unspecified
    };
    Ok(Value::Vector(Rc::new(RefCell::new(vec![fill; k]))))
}

fn native_vector(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Vector(Rc::new(RefCell::new(args.to_vec()))))
}

fn native_vector_length(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector-length", &args[0])?;
    let len = v.borrow().len() as i64;
    Ok(Value::Number(len.into()))
}

fn native_vector_ref(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector-ref", &args[0])?;
    let k = index_arg("vector-ref", &args[1])?;
    let v = v.borrow();
    match v.get(k) {
        Some(item) => Ok(item.clone()),
        None => Err(Error::domain_error(format!(
            "vector-ref: invalid index: 0 <= {k} < {}",
            v.len()
        ))),
    }
}

fn native_vector_set(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector-set!", &args[0])?;
    let k = index_arg("vector-set!", &args[1])?;
    let mut v = v.borrow_mut();
    if k >= v.len() {
        return Err(Error::domain_error(format!(
            "vector-set!: invalid index: 0 <= {k} < {}",
            v.len()
        )));
    }
    v[k] = args[2].clone();
    Ok(Value::Unspecified)
}

fn native_vector_to_list(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector->list", &args[0])?;
    let items = v.borrow().clone();
    Ok(list_from_vec(items))
}

fn native_list_to_vector(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let items = list_arg("list->vector", &args[0])?;
    Ok(Value::Vector(Rc::new(RefCell::new(items))))
}

fn native_vector_fill(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector-fill!", &args[0])?;
    let mut v = v.borrow_mut();
    for slot in v.iter_mut() {
        *slot = args[1].clone();
    }
    Ok(Value::Unspecified)
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("vector?", &["obj"], Type::boolean(), native_vector_p),
        Builtin::new(
            "make-vector",
            &["k", "[obj:fill]"],
            Type::vector_of(Type::any()),
            native_make_vector,
        ),
        Builtin::new("vector", &["obj..."], Type::vector_of(Type::any()), native_vector),
        Builtin::new(
            "vector-length",
            &["vector"],
            Type::inexact_integer(),
            native_vector_length,
        ),
        Builtin::new("vector-ref", &["vector", "k"], Type::any(), native_vector_ref),
        Builtin::new(
            "vector-set!",
            &["vector", "k", "obj"],
            Type::any(),
            native_vector_set,
        ),
        Builtin::new(
            "vector->list",
            &["vector"],
            Type::list_of(Type::any()),
            native_vector_to_list,
        ),
        Builtin::new(
            "list->vector",
            &["list"],
            Type::vector_of(Type::any()),
            native_list_to_vector,
        ),
        Builtin::new("vector-fill!", &["vector", "obj"], Type::any(), native_vector_fill),
    ]
}
