//! Runtime values.
//!
//! [`Value`] is the tagged sum shared by the compiler and the VM. Heap
//! values (strings, pairs, vectors, bytevectors, lambdas, ports) are
//! reference counted and shared; `eq?` on them is pointer identity.
//! Mutation goes through `RefCell`, which is also what gives `set-car!`
//! and friends their Scheme semantics.
//!
//! Equality has the three standard levels: [`Value::is_eq`] (identity
//! for heap values, value equality for immediates), [`Value::is_eqv`]
//! (additionally numeric value equality) and [`Value::is_equal`]
//! (structural). Each level implies the next.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::number::Number;
use crate::symbols::SymbolRef;
use crate::types::{Type, TypeEnum};
use crate::vm::{CompiledCode, Frame};
use crate::{Error, Interp, RuntimeError};

/// A mutable cons cell.
#[derive(Debug)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

pub type PairRef = Rc<RefCell<Pair>>;

/// A heap environment record: the captured locals of one scope. Chains
/// are materialized as vectors of records, indexed directly by the
/// `Env`/`EnvSet` instructions.
pub type EnvRef = Rc<RefCell<Vec<Value>>>;

/// Native function contract: the VM guarantees the argument count is
/// within the declared arity before invocation. A native may call back
/// into [`Interp::apply`] to run user code.
pub type NativeFn = fn(&mut Interp, &[Value]) -> Result<Value, Error>;

/// A Scheme value.
#[derive(Clone)]
pub enum Value {
    Boolean(bool),
    Char(char),
    Number(Number),
    String(Rc<RefCell<String>>),
    Symbol(SymbolRef),
    Bytevector(Rc<RefCell<Vec<u8>>>),
    Pair(PairRef),
    Vector(Rc<RefCell<Vec<Value>>>),
    Lambda(Rc<Lambda>),
    Port(Rc<Port>),
    /// Call frame marker. Only ever appears on the VM stack; not
    /// user-constructible.
    Frame(Rc<RefCell<Frame>>),
    /// The empty list, a distinct singleton.
    Null,
    /// The value of expressions with no useful result.
    Unspecified,
}

/// Declared argument signature of a lambda.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub min: usize,
    pub max: usize,
    pub fixed: Vec<TypedName>,
    pub rest: bool,
}

#[derive(Debug, Clone)]
pub struct TypedName {
    pub name: String,
    pub typ: Type,
}

impl ArgSpec {
    /// Fixed-arity signature with `any` typed names.
    pub fn fixed_names(names: &[String], rest: bool) -> ArgSpec {
        let fixed: Vec<TypedName> = names
            .iter()
            .map(|n| TypedName {
                name: n.clone(),
                typ: Type::any(),
            })
            .collect();
        let min = if rest {
            fixed.len().saturating_sub(1)
        } else {
            fixed.len()
        };
        ArgSpec {
            min,
            max: if rest { usize::MAX } else { fixed.len() },
            fixed,
            rest,
        }
    }

    pub fn validate(&self, who: &str, argc: usize) -> Result<(), RuntimeError> {
        if argc < self.min {
            return Err(RuntimeError::arity_error(format!(
                "{who}: too few arguments: expected {}, got {argc}",
                self.expected()
            )));
        }
        if argc > self.max {
            return Err(RuntimeError::arity_error(format!(
                "{who}: too many arguments: expected {}, got {argc}",
                self.expected()
            )));
        }
        Ok(())
    }

    fn expected(&self) -> String {
        if self.max == usize::MAX {
            format!("at least {}", self.min)
        } else if self.min == self.max {
            format!("{}", self.min)
        } else {
            format!("{} to {}", self.min, self.max)
        }
    }

    /// Parameter list in Scheme notation, for diagnostics.
    pub fn signature(&self) -> String {
        let mut out = String::from("(");
        let fixed_count = if self.rest {
            self.fixed.len().saturating_sub(1)
        } else {
            self.fixed.len()
        };
        for (idx, tn) in self.fixed.iter().take(fixed_count).enumerate() {
            if idx > 0 {
                out.push(' ');
            }
            out.push_str(&tn.name);
        }
        if self.rest
            && let Some(rest) = self.fixed.last()
        {
            if fixed_count > 0 {
                out.push_str(" . ");
            } else {
                out.push_str(". ");
            }
            out.push_str(&rest.name);
        }
        out.push(')');
        out
    }
}

/// A callable value: either a native (host-implemented) primitive or a
/// region of compiled bytecode with its captured environment chain.
pub struct Lambda {
    pub name: Option<String>,
    pub args: ArgSpec,
    pub ret: Type,
    pub kind: LambdaKind,
}

pub enum LambdaKind {
    Native(NativeFn),
    Compiled {
        code: Rc<CompiledCode>,
        start: usize,
        end: usize,
        env: Vec<EnvRef>,
    },
}

impl Lambda {
    pub fn is_native(&self) -> bool {
        matches!(self.kind, LambdaKind::Native(_))
    }

    /// Type descriptor of the lambda derived from its signature.
    pub fn type_of(&self) -> Type {
        let fixed_count = if self.rest() {
            self.args.fixed.len().saturating_sub(1)
        } else {
            self.args.fixed.len()
        };
        let args: Vec<Type> = self
            .args
            .fixed
            .iter()
            .take(fixed_count)
            .map(|tn| tn.typ.clone())
            .collect();
        let rest = if self.rest() {
            self.args.fixed.last().map(|tn| tn.typ.clone())
        } else {
            None
        };
        Type::lambda(args, rest, self.ret.clone())
    }

    fn rest(&self) -> bool {
        self.args.rest
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "#<lambda {name}>"),
            None => write!(f, "#<lambda>"),
        }
    }
}

/// An I/O handle, opaque to the VM.
#[derive(Debug)]
pub struct Port {
    pub name: String,
    stream: RefCell<PortStream>,
}

#[derive(Debug)]
enum PortStream {
    Stdout,
    Stderr,
    Buffer(String),
    Closed,
}

impl Port {
    pub fn stdout() -> Port {
        Port {
            name: "stdout".to_string(),
            stream: RefCell::new(PortStream::Stdout),
        }
    }

    pub fn stderr() -> Port {
        Port {
            name: "stderr".to_string(),
            stream: RefCell::new(PortStream::Stderr),
        }
    }

    /// An in-memory output port, readable with `get-output-string`.
    pub fn string_buffer() -> Port {
        Port {
            name: "string".to_string(),
            stream: RefCell::new(PortStream::Buffer(String::new())),
        }
    }

    pub fn write_str(&self, s: &str) -> Result<(), RuntimeError> {
        use std::io::Write;
        match &mut *self.stream.borrow_mut() {
            PortStream::Stdout => {
                let mut out = std::io::stdout();
                out.write_all(s.as_bytes())
                    .and_then(|()| out.flush())
                    .map_err(|e| RuntimeError::domain_error(format!("{}: {e}", self.name)))
            }
            PortStream::Stderr => {
                let mut out = std::io::stderr();
                out.write_all(s.as_bytes())
                    .and_then(|()| out.flush())
                    .map_err(|e| RuntimeError::domain_error(format!("{}: {e}", self.name)))
            }
            PortStream::Buffer(buf) => {
                buf.push_str(s);
                Ok(())
            }
            PortStream::Closed => Err(RuntimeError::domain_error(format!(
                "{}: port is closed",
                self.name
            ))),
        }
    }

    /// Buffered content of a string port, if this is one.
    pub fn buffer(&self) -> Option<String> {
        match &*self.stream.borrow() {
            PortStream::Buffer(buf) => Some(buf.clone()),
            _ => None,
        }
    }

    pub fn close(&self) {
        *self.stream.borrow_mut() = PortStream::Closed;
    }
}

/// Build a cons cell.
pub fn cons(car: Value, cdr: Value) -> Value {
    Value::Pair(Rc::new(RefCell::new(Pair { car, cdr })))
}

/// Build a proper list from the items.
pub fn list_from_vec(items: Vec<Value>) -> Value {
    let mut result = Value::Null;
    for item in items.into_iter().rev() {
        result = cons(item, result);
    }
    result
}

/// Collect a proper list into a vector. Returns `None` for improper
/// lists and non-list values.
pub fn list_to_vec(value: &Value) -> Option<Vec<Value>> {
    let mut items = Vec::new();
    let mut cursor = value.clone();
    loop {
        match cursor {
            Value::Null => return Some(items),
            Value::Pair(p) => {
                items.push(p.borrow().car.clone());
                let next = p.borrow().cdr.clone();
                cursor = next;
            }
            _ => return None,
        }
    }
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false))
    }

    /// Identity equality. Value equality for immediates, pointer
    /// equality for heap values.
    pub fn is_eq(&self, o: &Value) -> bool {
        match (self, o) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Symbol(a), Value::Symbol(b)) => Rc::ptr_eq(a, b),
            (Value::Bytevector(a), Value::Bytevector(b)) => Rc::ptr_eq(a, b),
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Vector(a), Value::Vector(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Port(a), Value::Port(b)) => Rc::ptr_eq(a, b),
            (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b),
            (Value::Null, Value::Null) => true,
            (Value::Unspecified, Value::Unspecified) => true,
            _ => false,
        }
    }

    /// Like `is_eq` but numbers and characters compare by value. With
    /// the exact-integer tower this differs from `is_eq` only in name,
    /// and it is the equality `case` dispatches on.
    pub fn is_eqv(&self, o: &Value) -> bool {
        match (self, o) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            _ => self.is_eq(o),
        }
    }

    /// Structural equality.
    pub fn is_equal(&self, o: &Value) -> bool {
        match (self, o) {
            (Value::String(a), Value::String(b)) => *a.borrow() == *b.borrow(),
            (Value::Bytevector(a), Value::Bytevector(b)) => *a.borrow() == *b.borrow(),
            (Value::Pair(a), Value::Pair(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.car.is_equal(&b.car) && a.cdr.is_equal(&b.cdr)
            }
            (Value::Vector(a), Value::Vector(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.is_equal(y))
            }
            _ => self.is_eqv(o),
        }
    }

    /// The value's place in the type lattice.
    pub fn type_of(&self) -> TypeEnum {
        match self {
            Value::Boolean(_) => TypeEnum::Boolean,
            Value::Char(_) => TypeEnum::Character,
            Value::Number(_) => TypeEnum::ExactInteger,
            Value::String(_) => TypeEnum::String,
            Value::Symbol(_) => TypeEnum::Symbol,
            Value::Bytevector(_) => TypeEnum::Bytevector,
            Value::Pair(_) => TypeEnum::Pair,
            Value::Vector(_) => TypeEnum::Vector,
            Value::Lambda(_) => TypeEnum::Lambda,
            Value::Port(_) => TypeEnum::Port,
            Value::Frame(_) | Value::Null | Value::Unspecified => TypeEnum::Any,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Char(_) => "character",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Bytevector(_) => "bytevector",
            Value::Pair(_) => "pair",
            Value::Vector(_) => "vector",
            Value::Lambda(_) => "procedure",
            Value::Port(_) => "port",
            Value::Frame(_) => "frame",
            Value::Null => "null",
            Value::Unspecified => "unspecified",
        }
    }

    /// Machine-readable rendering: strings quoted and escaped,
    /// characters in `#\` notation.
    pub fn write_string(&self) -> String {
        let mut out = String::new();
        write_value(&mut out, self, true);
        out
    }

    /// Human-readable rendering: strings and characters raw.
    pub fn display_string(&self) -> String {
        let mut out = String::new();
        write_value(&mut out, self, false);
        out
    }
}

fn write_value(out: &mut String, value: &Value, write: bool) {
    match value {
        Value::Boolean(b) => out.push_str(if *b { "#t" } else { "#f" }),
        Value::Char(c) => {
            if write {
                write_char(out, *c);
            } else {
                out.push(*c);
            }
        }
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            if write {
                write_scheme_string(out, &s.borrow());
            } else {
                out.push_str(&s.borrow());
            }
        }
        Value::Symbol(sym) => out.push_str(&sym.borrow().name),
        Value::Bytevector(bytes) => {
            out.push_str("#vu8(");
            for (idx, b) in bytes.borrow().iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                }
                out.push_str(&b.to_string());
            }
            out.push(')');
        }
        Value::Pair(pair) => {
            out.push('(');
            let mut cursor = pair.clone();
            loop {
                write_value(out, &cursor.borrow().car, write);
                let cdr = cursor.borrow().cdr.clone();
                match cdr {
                    Value::Pair(next) => {
                        out.push(' ');
                        cursor = next;
                    }
                    Value::Null => break,
                    other => {
                        out.push_str(" . ");
                        write_value(out, &other, write);
                        break;
                    }
                }
            }
            out.push(')');
        }
        Value::Vector(items) => {
            out.push_str("#(");
            for (idx, item) in items.borrow().iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                }
                write_value(out, item, write);
            }
            out.push(')');
        }
        Value::Lambda(l) => match &l.name {
            Some(name) => {
                out.push_str("#<lambda ");
                out.push_str(name);
                out.push('>');
            }
            None => out.push_str("#<lambda>"),
        },
        Value::Port(p) => {
            out.push_str("#<port ");
            out.push_str(&p.name);
            out.push('>');
        }
        Value::Frame(f) => {
            let f = f.borrow();
            out.push_str(&format!(
                "#<frame next={} toplevel={}>",
                f.next, f.toplevel
            ));
        }
        Value::Null => out.push_str("()"),
        Value::Unspecified => out.push_str("#<unspecified>"),
    }
}

fn write_char(out: &mut String, c: char) {
    out.push_str("#\\");
    match c {
        ' ' => out.push_str("space"),
        '\n' => out.push_str("newline"),
        '\t' => out.push_str("tab"),
        '\r' => out.push_str("return"),
        '\0' => out.push_str("nul"),
        '\x7f' => out.push_str("delete"),
        c if c.is_control() => out.push_str(&format!("x{:x}", c as u32)),
        c => out.push(c),
    }
}

/// Escape a string into Scheme literal notation.
fn write_scheme_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' | '"' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0b' => out.push_str("\\v"),
            '\x0c' => out.push_str("\\f"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.write_string())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.write_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: i64) -> Value {
        Value::Number(Number::from_i64(v))
    }

    fn string(s: &str) -> Value {
        Value::String(Rc::new(RefCell::new(s.to_string())))
    }

    #[test]
    fn test_equality_refinement() {
        // eq? implies eqv? implies equal? for every pair here.
        let shared = string("abc");
        let pairs = vec![
            (Value::Boolean(true), Value::Boolean(true)),
            (num(42), num(42)),
            (Value::Char('x'), Value::Char('x')),
            (Value::Null, Value::Null),
            (shared.clone(), shared.clone()),
        ];
        for (a, b) in pairs {
            assert!(a.is_eq(&b), "eq {a}");
            assert!(a.is_eqv(&b), "eqv {a}");
            assert!(a.is_equal(&b), "equal {a}");
        }

        // Distinct strings with equal content: equal? only.
        let a = string("abc");
        let b = string("abc");
        assert!(!a.is_eq(&b));
        assert!(!a.is_eqv(&b));
        assert!(a.is_equal(&b));

        // Structurally equal lists.
        let l1 = list_from_vec(vec![num(1), num(2)]);
        let l2 = list_from_vec(vec![num(1), num(2)]);
        assert!(!l1.is_eq(&l2));
        assert!(l1.is_equal(&l2));
    }

    #[test]
    fn test_write_forms() {
        let cases = vec![
            (Value::Boolean(true), "#t"),
            (Value::Boolean(false), "#f"),
            (num(-17), "-17"),
            (Value::Char('a'), "#\\a"),
            (Value::Char(' '), "#\\space"),
            (Value::Char('\n'), "#\\newline"),
            (string("a\"b\\c"), "\"a\\\"b\\\\c\""),
            (Value::Null, "()"),
            (list_from_vec(vec![num(1), num(2), num(3)]), "(1 2 3)"),
            (cons(num(1), num(2)), "(1 . 2)"),
            (
                Value::Bytevector(Rc::new(RefCell::new(vec![1, 2, 255]))),
                "#vu8(1 2 255)",
            ),
            (
                Value::Vector(Rc::new(RefCell::new(vec![num(1), string("x")]))),
                "#(1 \"x\")",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(value.write_string(), expected);
        }
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(string("a\nb").display_string(), "a\nb");
        assert_eq!(Value::Char('q').display_string(), "q");
        assert_eq!(
            list_from_vec(vec![string("x")]).display_string(),
            "(x)"
        );
    }

    #[test]
    fn test_list_helpers() {
        let list = list_from_vec(vec![num(1), num(2)]);
        let items = list_to_vec(&list).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], num(1));

        assert_eq!(list_to_vec(&Value::Null), Some(vec![]));
        assert!(list_to_vec(&cons(num(1), num(2))).is_none());
        assert!(list_to_vec(&num(1)).is_none());
    }

    #[test]
    fn test_string_port() {
        let port = Port::string_buffer();
        port.write_str("hello ").unwrap();
        port.write_str("world").unwrap();
        assert_eq!(port.buffer(), Some("hello world".to_string()));
        port.close();
        assert!(port.write_str("more").is_err());
    }
}
