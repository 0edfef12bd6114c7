//! Simple I/O primitives: textual output through ports.

use std::cell::RefCell;
use std::rc::Rc;

use super::port_arg;
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::{Port, Value};

fn output_port(
    interp: &Interp,
    who: &str,
    args: &[Value],
    idx: usize,
) -> Result<Rc<Port>, Error> {
    if args.len() > idx {
        port_arg(who, &args[idx])
    } else {
        Ok(interp.stdout())
    }
}

fn native_display(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let port = output_port(interp, "display", args, 1)?;
    port.write_str(&args[0].display_string())?;
    Ok(Value::Unspecified)
}

fn native_write(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let port = output_port(interp, "write", args, 1)?;
    port.write_str(&args[0].write_string())?;
    Ok(Value::Unspecified)
}

fn native_newline(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let port = output_port(interp, "newline", args, 0)?;
    port.write_str("\n")?;
    Ok(Value::Unspecified)
}

fn native_port_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(matches!(args[0], Value::Port(_))))
}

fn native_current_output_port(interp: &mut Interp, _: &[Value]) -> Result<Value, Error> {
    Ok(Value::Port(interp.stdout()))
}

fn native_current_error_port(interp: &mut Interp, _: &[Value]) -> Result<Value, Error> {
    Ok(Value::Port(interp.stderr()))
}

fn native_open_output_string(_: &mut Interp, _: &[Value]) -> Result<Value, Error> {
    Ok(Value::Port(Rc::new(Port::string_buffer())))
}

fn native_get_output_string(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let port = port_arg("get-output-string", &args[0])?;
    match port.buffer() {
        Some(buffer) => Ok(Value::String(Rc::new(RefCell::new(buffer)))),
        None => Err(Error::domain_error(format!(
            "get-output-string: not an open string port: {}",
            port.name
        ))),
    }
}

fn native_close_port(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let port = port_arg("close-port", &args[0])?;
    port.close();
    Ok(Value::Unspecified)
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("display", &["obj", "[port]"], Type::any(), native_display),
        Builtin::new("write", &["obj", "[port]"], Type::any(), native_write),
        Builtin::new("newline", &["[port]"], Type::any(), native_newline),
        Builtin::new("port?", &["obj"], Type::boolean(), native_port_p),
        Builtin::new(
            "current-output-port",
            &[],
            Type::port(),
            native_current_output_port,
        ),
        Builtin::new(
            "current-error-port",
            &[],
            Type::port(),
            native_current_error_port,
        ),
        Builtin::new(
            "open-output-string",
            &[],
            Type::port(),
            native_open_output_string,
        ),
        Builtin::new(
            "get-output-string",
            &["port"],
            Type::string(),
            native_get_output_string,
        ),
        Builtin::new("close-port", &["port"], Type::any(), native_close_port),
    ]
}
