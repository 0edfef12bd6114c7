//! File system primitives.

use super::string_arg;
use crate::Error;
use crate::interp::{Builtin, Interp};
use crate::types::Type;
use crate::value::Value;

fn native_file_exists_p(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let path = string_arg("file-exists?", &args[0])?;
    let exists = std::path::Path::new(&*path.borrow()).exists();
    Ok(Value::Boolean(exists))
}

fn native_delete_file(_: &mut Interp, args: &[Value]) -> Result<Value, Error> {
    let path = string_arg("delete-file", &args[0])?;
    let path = path.borrow().clone();
    std::fs::remove_file(&path)
        .map_err(|e| Error::domain_error(format!("delete-file: {path}: {e}")))?;
    Ok(Value::Unspecified)
}

pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new(
            "file-exists?",
            &["filename<string>"],
            Type::boolean(),
            native_file_exists_p,
        ),
        Builtin::new(
            "delete-file",
            &["filename<string>"],
            Type::any(),
            native_delete_file,
        ),
    ]
}
