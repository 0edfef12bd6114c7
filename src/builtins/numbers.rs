//! Numeric primitives. Exact integers with transparent bignum
//! promotion; see `number` for the arithmetic itself.

use num_bigint::BigInt;

use super::{index_arg, number_arg, string_arg};
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::number::Number;
use crate::types::Type;
use crate::value::Value;

fn native_add(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let mut sum = Number::from_i64(0);
    for arg in args {
        sum = sum.add(number_arg("+", arg)?);
    }
    Ok(Value::Number(sum))
}

fn native_mul(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let mut product = Number::from_i64(1);
    for arg in args {
        product = product.mul(number_arg("*", arg)?);
    }
    Ok(Value::Number(product))
}

fn native_sub(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let first = number_arg("-", &args[0])?;
    if args.len() == 1 {
        return Ok(Value::Number(first.neg()));
    }
    let mut result = first.clone();
    for arg in &args[1..] {
        result = result.sub(number_arg("-", arg)?);
    }
    Ok(Value::Number(result))
}

/// Chained numeric comparison shared by `=`, `<`, `>`, `<=` and `>=`.
fn compare(
    who: &str,
    args: &[Value],
    good: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, Error> {
    let mut prev = number_arg(who, &args[0])?;
    for arg in &args[1..] {
        let current = number_arg(who, arg)?;
        if !good(prev.cmp(current)) {
            return Ok(Value::Boolean(false));
        }
        prev = current;
    }
    Ok(Value::Boolean(true))
}

fn native_num_eq(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    compare("=", args, |o| o.is_eq())
}

fn native_lt(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    compare("<", args, |o| o.is_lt())
}

fn native_gt(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    compare(">", args, |o| o.is_gt())
}

fn native_le(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    compare("<=", args, |o| o.is_le())
}

fn native_ge(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    compare(">=", args, |o| o.is_ge())
}

fn native_quotient(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let a = number_arg("quotient", &args[0])?;
    let b = number_arg("quotient", &args[1])?;
    Ok(Value::Number(a.quotient(b)?))
}

fn native_remainder(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let a = number_arg("remainder", &args[0])?;
    let b = number_arg("remainder", &args[1])?;
    Ok(Value::Number(a.remainder(b)?))
}

fn native_modulo(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let a = number_arg("modulo", &args[0])?;
    let b = number_arg("modulo", &args[1])?;
    Ok(Value::Number(a.modulo(b)?))
}

fn native_abs(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Number(number_arg("abs", &args[0])?.abs()))
}

fn native_min(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let mut best = number_arg("min", &args[0])?;
    for arg in &args[1..] {
        let n = number_arg("min", arg)?;
        if n < best {
            best = n;
        }
    }
    Ok(Value::Number(best.clone()))
}

fn native_max(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let mut best = number_arg("max", &args[0])?;
    for arg in &args[1..] {
        let n = number_arg("max", arg)?;
        if n > best {
            best = n;
        }
    }
    Ok(Value::Number(best.clone()))
}

fn native_expt(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let base = number_arg("expt", &args[0])?;
    let exp = number_arg("expt", &args[1])?;
    match exp.as_i64() {
        Some(e) if (0..=u32::MAX as i64).contains(&e) => Ok(Value::Number(base.pow(e as u32))),
        _ => Err(Error::domain_error(format!(
            "expt: invalid exponent: {}",
            args[1]
        ))),
    }
}

fn native_zero_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(number_arg("zero?", &args[0])?.is_zero()))
}

fn native_positive_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let n = number_arg("positive?", &args[0])?;
    Ok(Value::Boolean(!n.is_negative() && !n.is_zero()))
}

fn native_negative_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(
        number_arg("negative?", &args[0])?.is_negative(),
    ))
}

fn native_even_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(number_arg("even?", &args[0])?.is_even()))
}

fn native_odd_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(!number_arg("odd?", &args[0])?.is_even()))
}

fn native_number_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Number(_))))
}

fn valid_radix(who: &str, v: &Value) -> Result<u32, Error> {
    match index_arg(who, v)? {
        r @ (2 | 8 | 10 | 16) => Ok(r as u32),
        _ => Err(Error::domain_error(format!("{who}: invalid radix: {v}"))),
    }
}

fn native_number_to_string(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let n = number_arg("number->string", &args[0])?;
    let radix = if args.len() > 1 {
        valid_radix("number->string", &args[1])?
    } else {
        10
    };
    Ok(Value::String(std::rc::Rc::new(std::cell::RefCell::new(
        n.to_radix_string(radix),
    ))))
}

fn native_string_to_number(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let text = string_arg("string->number", &args[0])?;
    let radix = if args.len() > 1 {
        valid_radix("string->number", &args[1])?
    } else {
        10
    };
    let text = text.borrow();
    match i64::from_str_radix(&text, radix) {
        Ok(n) => Ok(Value::Number(Number::from_i64(n))),
        Err(_) => match BigInt::parse_bytes(text.as_bytes(), radix) {
            Some(b) => Ok(Value::Number(Number::from_bigint(b))),
            None => Ok(Value::Boolean(false)),
        },
    }
}

fn native_integer_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Number(_))))
}

fn native_exact_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    // The numeric tower is exact integers only.
    number_arg("exact?", &args[0])?;
    Ok(Value::Boolean(true))
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("+", &["zn..."], Type::number(), native_add),
        Builtin::new("*", &["zn..."], Type::number(), native_mul),
        Builtin::new("-", &["z1", "zn..."], Type::number(), native_sub),
        Builtin::new("=", &["z1", "z2", "zn..."], Type::boolean(), native_num_eq),
        Builtin::new("<", &["z1", "z2", "zn..."], Type::boolean(), native_lt),
        Builtin::new(">", &["z1", "z2", "zn..."], Type::boolean(), native_gt),
        Builtin::new("<=", &["z1", "z2", "zn..."], Type::boolean(), native_le),
        Builtin::new(">=", &["z1", "z2", "zn..."], Type::boolean(), native_ge),
        Builtin::new("quotient", &["z1", "z2"], Type::number(), native_quotient),
        Builtin::new("remainder", &["z1", "z2"], Type::number(), native_remainder),
        Builtin::new("modulo", &["z1", "z2"], Type::number(), native_modulo),
        Builtin::new("abs", &["z"], Type::number(), native_abs),
        Builtin::new("min", &["z1", "zn..."], Type::number(), native_min),
        Builtin::new("max", &["z1", "zn..."], Type::number(), native_max),
        Builtin::new("expt", &["z", "k"], Type::number(), native_expt),
        Builtin::new("zero?", &["z"], Type::boolean(), native_zero_p),
        Builtin::new("positive?", &["z"], Type::boolean(), native_positive_p),
        Builtin::new("negative?", &["z"], Type::boolean(), native_negative_p),
        Builtin::new("even?", &["z"], Type::boolean(), native_even_p),
        Builtin::new("odd?", &["z"], Type::boolean(), native_odd_p),
        Builtin::new("number?", &["obj"], Type::boolean(), native_number_p),
        Builtin::new("integer?", &["obj"], Type::boolean(), native_integer_p),
        Builtin::new("exact?", &["z"], Type::boolean(), native_exact_p),
        Builtin::new(
            "number->string",
            &["z", "[k:radix]"],
            Type::string(),
            native_number_to_string,
        ),
        Builtin::new(
            "string->number",
            &["string", "[k:radix]"],
            Type::any(),
            native_string_to_number,
        ),
    ]
}
