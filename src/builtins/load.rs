//! Loading Scheme source files at run time.

use super::string_arg;
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::Value;

/// `(load filename)`: compile and run the file in the current
/// interpreter. The evaluation nests a fresh VM entry, so loading from
/// running code composes.
fn native_load(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let path = string_arg("load", &args[0])?;
    let path = path.borrow().clone();
    if interp.params.verbose {
        eprintln!("load: {path}");
    }
    interp.eval_file(&path)
}

pub fn builtins() -> Vec<Builtin> {
    vec![Builtin::new(
        "load",
        &["filename<string>"],
        Type::any(),
        native_load,
    )]
}
