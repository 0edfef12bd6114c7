//! Schemex - a bytecode-compiling Scheme interpreter
//!
//! This crate implements an interpreter for a lexically-scoped Scheme
//! dialect in the R6RS family. Source text is read into S-expressions,
//! analyzed into an abstract syntax tree, lowered to a linear bytecode,
//! and executed on a stack-based virtual machine with closure-capturing
//! environments, tail-call elimination, and a library of native
//! (host-implemented) primitives.
//!
//! ```
//! use schemex::Interp;
//!
//! let mut interp = Interp::new().unwrap();
//! let value = interp.eval_str("repl", "(+ 1 2 3)").unwrap();
//! assert_eq!(value.write_string(), "6");
//! ```
//!
//! ## Pipeline
//!
//! - `parser`: source text to located S-expressions
//! - `compiler`: S-expressions to AST (binding resolution, tail and
//!   capture analysis), AST to bytecode (label resolution, lambda table)
//! - `vm`: the instruction set and the fetch-dispatch loop
//! - `interp`: the embedder API tying the pieces together
//!
//! ## Strictness
//!
//! Only `#f` is false; the numeric tower is exact integers only, with
//! `i64` values promoted to bignums on overflow. There is no `call/cc`
//! and no macro expander; `cond`, `case`, named `let` and friends are
//! handled as primitive syntax.

use std::fmt;
use std::rc::Rc;

/// Maximum reader nesting depth. Limits deeply nested structures so
/// hostile input cannot overflow the host stack during parsing.
pub const MAX_PARSE_DEPTH: usize = 128;

/// A source position attached to S-expressions, AST nodes and compiled
/// instructions. The source name is shared between all locations of one
/// compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    pub source: Rc<str>,
    pub line: u32,
}

impl SourceLoc {
    pub fn new(source: Rc<str>, line: u32) -> Self {
        SourceLoc { source, line }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

/// Categorizes the different kinds of reader failures.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub loc: Option<SourceLoc>,
    /// Context snippet from the input showing where the error occurred
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            loc: None,
            context: None,
        }
    }

    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    /// Attach a context snippet extracted from the input at the given
    /// byte offset.
    pub fn with_context(mut self, input: &str, offset: usize) -> Self {
        const MAX_CONTEXT: usize = 60;

        let start = offset.saturating_sub(20);
        let snippet: String = input
            .char_indices()
            .skip_while(|(i, _)| *i < start)
            .take_while(|(i, _)| *i < start + MAX_CONTEXT)
            .map(|(_, c)| c)
            .collect();

        let mut display = String::new();
        if start > 0 {
            display.push_str("[...]");
        }
        display.push_str(&snippet);
        if start + snippet.len() < input.len() {
            display.push_str("[...]");
        }
        self.context = Some(display.replace('\n', "\\n").replace('\r', ""));
        self
    }
}

/// A failure raised while turning S-expressions into an AST or while
/// emitting bytecode.
#[derive(Debug, PartialEq, Clone)]
pub struct CompileError {
    pub message: String,
    pub loc: Option<SourceLoc>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        CompileError {
            message: message.into(),
            loc: None,
        }
    }

    pub fn at(message: impl Into<String>, loc: Option<SourceLoc>) -> Self {
        CompileError {
            message: message.into(),
            loc,
        }
    }
}

/// Runtime error taxonomy. `Type`, `Arity`, `Domain`, `Unbound` and
/// `Const` are the recoverable kinds a program can trigger; `Other`
/// covers errors raised by native primitives (including `(error ...)`).
/// VM invariant violations are not errors but panics.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RuntimeErrorKind {
    Type,
    Arity,
    Domain,
    Unbound,
    Const,
    Other,
}

/// One entry of a captured stack trace: the source name and line of the
/// call site.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TraceFrame {
    pub source: String,
    pub line: u32,
}

/// A runtime failure. Native primitives format messages with the
/// "who: message" convention; the VM attaches the source location of the
/// failing instruction and a stack trace built from the live frames.
#[derive(Debug, PartialEq, Clone)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub loc: Option<SourceLoc>,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            loc: None,
            trace: Vec::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Type, message)
    }

    pub fn arity_error(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Arity, message)
    }

    pub fn domain_error(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Domain, message)
    }

    pub fn unbound(name: &str) -> Self {
        Self::new(
            RuntimeErrorKind::Unbound,
            format!("unbound symbol '{name}'"),
        )
    }

    pub fn const_violation(name: &str) -> Self {
        Self::new(
            RuntimeErrorKind::Const,
            format!("can't redefine constant symbol '{name}'"),
        )
    }
}

/// Error type covering all interpreter stages.
#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Compile(CompileError),
    Runtime(RuntimeError),
    Io(std::io::Error),
}

impl Error {
    /// Shorthand for a runtime type error using the "who: message"
    /// convention.
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Runtime(RuntimeError::type_error(message))
    }

    pub fn domain_error(message: impl Into<String>) -> Self {
        Error::Runtime(RuntimeError::domain_error(message))
    }

    pub fn other(message: impl Into<String>) -> Self {
        Error::Runtime(RuntimeError::new(RuntimeErrorKind::Other, message))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => {
                write!(f, "parse error: {}", e.message)?;
                if let Some(loc) = &e.loc {
                    write!(f, "\n  at {loc}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\n  context: {context}")?;
                }
                Ok(())
            }
            Error::Compile(e) => {
                write!(f, "compile error: {}", e.message)?;
                if let Some(loc) = &e.loc {
                    write!(f, "\n  at {loc}")?;
                }
                Ok(())
            }
            Error::Runtime(e) => {
                write!(f, "{}", e.message)?;
                if let Some(loc) = &e.loc {
                    write!(f, "\n  at {loc}")?;
                }
                for frame in &e.trace {
                    write!(f, "\n  from {}:{}", frame.source, frame.line)?;
                }
                Ok(())
            }
            Error::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<CompileError> for Error {
    fn from(e: CompileError) -> Self {
        Error::Compile(e)
    }
}

impl From<RuntimeError> for Error {
    fn from(e: RuntimeError) -> Self {
        Error::Runtime(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod env;
pub mod interp;
pub mod number;
pub mod parser;
pub mod symbols;
pub mod types;
pub mod value;
pub mod vm;

pub use interp::{Interp, Params};
pub use number::Number;
pub use value::Value;
