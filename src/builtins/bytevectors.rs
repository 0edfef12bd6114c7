//! Bytevector primitives.

use std::cell::RefCell;
use std::rc::Rc;

use super::{bytevector_arg, fill_byte_arg, index_arg};
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::Value;

fn native_bytevector_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Bytevector(_))))
}

fn native_make_bytevector(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let length = index_arg("make-bytevector", &args[0])?;
    let fill = if args.len() > 1 {
        fill_byte_arg("make-bytevector", &args[1])?
    } else {
        0
    };
    Ok(Value::Bytevector(Rc::new(RefCell::new(vec![fill; length]))))
}

fn native_bytevector_length(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let bv = bytevector_arg("bytevector-length", &args[0])?;
    let len = bv.borrow().len() as i64;
    Ok(Value::Number(len.into()))
}

fn native_bytevector_eq(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let a = bytevector_arg("bytevector=?", &args[0])?;
    let b = bytevector_arg("bytevector=?", &args[1])?;
    let equal = *a.borrow() == *b.borrow();
    Ok(Value::Boolean(equal))
}

fn native_bytevector_fill(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let bv = bytevector_arg("bytevector-fill!", &args[0])?;
    let fill = fill_byte_arg("bytevector-fill!", &args[1])?;
    for byte in bv.borrow_mut().iter_mut() {
        *byte = fill;
    }
    Ok(Value::Unspecified)
}

fn native_bytevector_copy_bang(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let source = bytevector_arg("bytevector-copy!", &args[0])?;
    let source_start = index_arg("bytevector-copy!", &args[1])?;
    let target = bytevector_arg("bytevector-copy!", &args[2])?;
    let target_start = index_arg("bytevector-copy!", &args[3])?;
    let k = index_arg("bytevector-copy!", &args[4])?;

    let source = source.borrow();
    if source_start + k > source.len() {
        return Err(Error::domain_error(format!(
            "bytevector-copy!: invalid source range: {source_start}+{k}>{}",
            source.len()
        )));
    }
    let mut target = target.borrow_mut();
    if target_start + k > target.len() {
        return Err(Error::domain_error(format!(
            "bytevector-copy!: invalid target range: {target_start}+{k}>{}",
            target.len()
        )));
    }
    target[target_start..target_start + k]
        .copy_from_slice(&source[source_start..source_start + k]);
    Ok(Value::Unspecified)
}

fn native_bytevector_copy(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let bv = bytevector_arg("bytevector-copy", &args[0])?;
    let copy = bv.borrow().clone();
    Ok(Value::Bytevector(Rc::new(RefCell::new(copy))))
}

fn byte_ref(who: &str, args: &[Value]) -> Result<u8, Error> {
    let bv = bytevector_arg(who, &args[0])?;
    let k = index_arg(who, &args[1])?;
    let bv = bv.borrow();
    match bv.get(k) {
        Some(byte) => Ok(*byte),
        None => Err(Error::domain_error(format!(
            "{who}: invalid index: 0 <= {k} < {}",
            bv.len()
        ))),
    }
}

fn native_bytevector_u8_ref(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let byte = byte_ref("bytevector-u8-ref", args)?;
    Ok(Value::Number((byte as i64).into()))
}

fn native_bytevector_s8_ref(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let byte = byte_ref("bytevector-s8-ref", args)?;
    Ok(Value::Number((byte as i8 as i64).into()))
}

fn native_bytevector_u8_set(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let bv = bytevector_arg("bytevector-u8-set!", &args[0])?;
    let k = index_arg("bytevector-u8-set!", &args[1])?;
    let byte = fill_byte_arg("bytevector-u8-set!", &args[2])?;
    let mut bv = bv.borrow_mut();
    if k >= bv.len() {
        return Err(Error::domain_error(format!(
            "bytevector-u8-set!: invalid index: 0 <= {k} < {}",
            bv.len()
        )));
    }
    bv[k] = byte;
    Ok(Value::Unspecified)
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("bytevector?", &["obj"], Type::boolean(), native_bytevector_p),
        Builtin::new(
            "make-bytevector",
            &["k", "[k:fill]"],
            Type::bytevector(),
            native_make_bytevector,
        ),
        Builtin::new(
            "bytevector-length",
            &["bytevector"],
            Type::inexact_integer(),
            native_bytevector_length,
        ),
        Builtin::new(
            "bytevector=?",
            &["bytevector1", "bytevector2"],
            Type::boolean(),
            native_bytevector_eq,
        ),
        Builtin::new(
            "bytevector-fill!",
            &["bytevector", "k:fill"],
            Type::any(),
            native_bytevector_fill,
        ),
        Builtin::new(
            "bytevector-copy!",
            &[
                "bytevector:source",
                "k:source-start",
                "bytevector:target",
                "k:target-start",
                "k",
            ],
            Type::any(),
            native_bytevector_copy_bang,
        ),
        Builtin::new(
            "bytevector-copy",
            &["bytevector"],
            Type::bytevector(),
            native_bytevector_copy,
        ),
        Builtin::new(
            "bytevector-u8-ref",
            &["bytevector", "k"],
            Type::inexact_integer(),
            native_bytevector_u8_ref,
        ),
        Builtin::new(
            "bytevector-s8-ref",
            &["bytevector", "k"],
            Type::inexact_integer(),
            native_bytevector_s8_ref,
        ),
        Builtin::new(
            "bytevector-u8-set!",
            &["bytevector", "k", "k:value"],
            Type::any(),
            native_bytevector_u8_set,
        ),
    ]
}
