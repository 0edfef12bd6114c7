//! VM introspection primitives: disassembly, global environment
//! listing and stack traces.

use std::cell::RefCell;
use std::rc::Rc;

use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::number::Number;
use crate::types::Type;
use crate::value::{LambdaKind, Value, cons, list_from_vec};

const F_LAMBDA: u32 = 1 << 0;
const F_NATIVE: u32 = 1 << 1;
const F_SCHEME: u32 = 1 << 2;

/// `(disassemble obj)`: print the instruction listing of a compiled
/// lambda, or the value itself otherwise.
fn native_disassemble(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let out = interp.stdout();
    match &args[0] {
        Value::Lambda(lambda) => {
            out.write_str(&format!(
                "lambda: {} {}\n",
                args[0],
                lambda.args.signature()
            ))?;
            match &lambda.kind {
                LambdaKind::Compiled { code, start, end, .. } => {
                    for instr in &code.instrs[*start..*end] {
                        out.write_str(&format!("{instr}\n"))?;
                    }
                }
                LambdaKind::Native(_) => {
                    out.write_str("\t{native}\n")?;
                }
            }
        }
        value => {
            out.write_str(&format!("value: {value}\n"))?;
        }
    }
    Ok(Value::Unspecified)
}

/// `(print-env flag...)`: list global symbols. The flags `native`,
/// `scheme` and `lambda` narrow the listing; no flags lists everything.
fn native_print_env(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let mut flags = 0u32;
    for arg in args {
        match arg {
            Value::Symbol(sym) => match sym.borrow().name.as_str() {
                "native" => flags |= F_NATIVE | F_LAMBDA,
                "scheme" => flags |= F_SCHEME | F_LAMBDA,
                "lambda" => flags |= F_LAMBDA,
                other => {
                    return Err(Error::domain_error(format!(
                        "print-env: unknown flag: {other}"
                    )));
                }
            },
            other => {
                return Err(Error::domain_error(format!(
                    "print-env: invalid flag: {other}"
                )));
            }
        }
    }
    if flags == 0 {
        flags = u32::MAX;
    }

    let mut entries: Vec<(String, String)> = Vec::new();
    for (name, sym) in interp.symbols().iter() {
        let id = sym.borrow();
        let Some(global) = &id.global else { continue };
        let selected = match global {
            Value::Lambda(lambda) => {
                flags & F_LAMBDA != 0
                    && (flags & (F_NATIVE | F_SCHEME) == 0
                        || (lambda.is_native() && flags & F_NATIVE != 0)
                        || (!lambda.is_native() && flags & F_SCHEME != 0))
            }
            _ => flags & F_LAMBDA == 0 || flags == u32::MAX,
        };
        if selected {
            entries.push((name.clone(), global.write_string()));
        }
    }
    entries.sort();

    let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let out = interp.stdout();
    out.write_str("Global symbols:\n")?;
    for (name, value) in &entries {
        out.write_str(&format!("{name:>width$} : {value}\n"))?;
    }
    out.write_str(&format!("{} symbols matched\n", entries.len()))?;
    Ok(Value::Unspecified)
}

/// `(scheme::stack-trace)`: the live call stack as a list of
/// `(source . line)` pairs.
fn native_stack_trace(interp: &mut Interp, _: &[Value]) -> Result<Value, Error> {
    let trace = interp.stack_trace();
    let items: Vec<Value> = trace
        .into_iter()
        .map(|frame| {
            cons(
                Value::String(Rc::new(RefCell::new(frame.source))),
                Value::Number(Number::from_i64(frame.line as i64)),
            )
        })
        .collect();
    Ok(list_from_vec(items))
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("disassemble", &["obj"], Type::any(), native_disassemble),
        Builtin::new("print-env", &["sym..."], Type::any(), native_print_env),
        Builtin::new(
            "scheme::stack-trace",
            &[],
            Type::list_of(Type::pair_of(Type::string(), Type::inexact_integer())),
            native_stack_trace,
        ),
    ]
}
