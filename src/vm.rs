//! Bytecode and the virtual machine.
//!
//! The VM is a single accumulator register (`accu`), a value stack with
//! a frame pointer, and an environment-chain register for captured
//! scopes. Instructions are in-memory records; no byte serialization.
//!
//! ## Call protocol
//!
//! For `(f a1 .. an)` the compiler emits: evaluate `f` into `accu`,
//! `PushF` (pushes a frame record holding the callee), `PushS n` (the
//! argument scope), one `LocalSet` per evaluated argument, then
//! `Call n`. The frame pointer is re-based at `Call`, not at `PushF`,
//! so caller locals stay addressable while arguments evaluate; the
//! compiler accounts for the frame marker slot in its stack offsets.
//!
//! A compiled callee runs with the argument scope as its initial local
//! frame; its `Return` truncates the stack to the frame base and
//! restores the caller's `pc`, code buffer and environment chain. Tail
//! calls discard the current activation first: the frame and argument
//! scope slide down over the caller's frame slot, inheriting its return
//! linkage, so iteration runs in constant frame-stack space.
//!
//! The outermost frame of every entry into the VM is marked `toplevel`;
//! its `Return` ends the dispatch loop. This is also what makes nested
//! entries compose: a native primitive may call [`Interp::apply`],
//! which runs an inner loop with its own toplevel frame.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::interp::Interp;
use crate::symbols::{Flags, SymbolRef};
use crate::types::Type;
use crate::value::{ArgSpec, EnvRef, Lambda, LambdaKind, Value, list_from_vec};
use crate::{Error, RuntimeError, SourceLoc, TraceFrame};

/// Bytecode instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Const,
    Define,
    Lambda,
    Label,
    Local,
    Global,
    LocalSet,
    GlobalSet,
    Env,
    EnvSet,
    PushF,
    PushS,
    PopS,
    PushA,
    Call,
    Return,
    If,
    IfNot,
    Jmp,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Const => "const",
            Opcode::Define => "define",
            Opcode::Lambda => "lambda",
            Opcode::Label => "label",
            Opcode::Local => "local",
            Opcode::Global => "global",
            Opcode::LocalSet => "local!",
            Opcode::GlobalSet => "global!",
            Opcode::Env => "env",
            Opcode::EnvSet => "env!",
            Opcode::PushF => "pushf",
            Opcode::PushS => "pushs",
            Opcode::PopS => "pops",
            Opcode::PushA => "pusha",
            Opcode::Call => "call",
            Opcode::Return => "return",
            Opcode::If => "if",
            Opcode::IfNot => "ifnot",
            Opcode::Jmp => "jmp",
        };
        write!(f, "{name}")
    }
}

/// One bytecode instruction: opcode, optional constant payload, two
/// integer operands, optional symbol reference and the source location
/// for diagnostics.
#[derive(Clone)]
pub struct Instr {
    pub op: Opcode,
    pub v: Option<Value>,
    pub i: i32,
    pub j: i32,
    pub sym: Option<SymbolRef>,
    pub loc: Option<SourceLoc>,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Opcode::Label => write!(f, ".l{}:", self.i),
            Opcode::Const => match &self.v {
                Some(v) => write!(f, "\t{}\t{}", self.op, v),
                None => write!(f, "\t{}", self.op),
            },
            Opcode::Lambda => write!(f, "\t{}\t{}", self.op, self.i),
            Opcode::Local | Opcode::LocalSet | Opcode::PushS | Opcode::PopS | Opcode::PushA => {
                if self.j != 0 {
                    write!(f, "\t{}\t{}\tcaptures", self.op, self.i)
                } else {
                    write!(f, "\t{}\t{}", self.op, self.i)
                }
            }
            Opcode::Env | Opcode::EnvSet => write!(f, "\t{}\t{}.{}", self.op, self.i, self.j),
            Opcode::Global | Opcode::GlobalSet | Opcode::Define => match &self.sym {
                Some(sym) => write!(f, "\t{}\t{}", self.op, sym.borrow().name),
                None => write!(f, "\t{}", self.op),
            },
            Opcode::Call => {
                if self.j != 0 {
                    write!(f, "\t{}\t{}\ttail", self.op, self.i)
                } else {
                    write!(f, "\t{}\t{}", self.op, self.i)
                }
            }
            Opcode::If | Opcode::IfNot | Opcode::Jmp => {
                write!(f, "\t{}\t{}", self.op, self.i)
            }
            _ => write!(f, "\t{}", self.op),
        }
    }
}

impl fmt::Debug for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A compiled lambda body: its location in the shared code buffer plus
/// the signature stamped by the compiler.
#[derive(Debug, Clone)]
pub struct LambdaInfo {
    pub name: Option<String>,
    pub args: ArgSpec,
    pub start: usize,
    pub end: usize,
    pub captures: bool,
    pub loc: Option<SourceLoc>,
}

/// The output of one compilation: the instruction buffer and the lambda
/// table. Closures keep the whole unit alive through an `Rc`.
pub struct CompiledCode {
    pub instrs: Vec<Instr>,
    pub lambdas: Vec<LambdaInfo>,
}

impl CompiledCode {
    pub fn empty() -> CompiledCode {
        CompiledCode {
            instrs: Vec::new(),
            lambdas: Vec::new(),
        }
    }
}

impl fmt::Display for CompiledCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instrs {
            writeln!(f, "{instr}")?;
        }
        Ok(())
    }
}

/// A call activation record. Lives in a stack slot at the frame
/// pointer; everything needed to resume the caller.
pub struct Frame {
    /// Caller's frame pointer.
    pub next: usize,
    /// Return address in the caller's code buffer.
    pub pc: usize,
    pub lambda: Rc<Lambda>,
    /// The outermost frame of a VM entry; its Return ends the loop.
    pub toplevel: bool,
    pub code: Rc<CompiledCode>,
    pub env: Vec<EnvRef>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame: next={}, pc={}, toplevel={}",
            self.next, self.pc, self.toplevel
        )
    }
}

impl Interp {
    /// Run the dispatch loop until the toplevel frame returns.
    pub(crate) fn execute(&mut self) -> Result<Value, Error> {
        loop {
            let instr = match self.code.instrs.get(self.pc) {
                Some(instr) => instr.clone(),
                None => panic!("vm: pc {} out of code range", self.pc),
            };
            self.pc += 1;
            match self.step(&instr) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => return Err(self.annotate(err, &instr)),
            }
        }
    }

    /// Execute one instruction. `Some(value)` means the toplevel frame
    /// returned.
    fn step(&mut self, instr: &Instr) -> Result<Option<Value>, Error> {
        match instr.op {
            Opcode::Const => match &instr.v {
                Some(v) => self.accu = v.clone(),
                None => panic!("vm: const without a value"),
            },

            Opcode::Define => {
                let sym = expect_sym(instr);
                let name = sym.borrow().name.clone();
                {
                    let id = sym.borrow();
                    if id.flags.contains(Flags::CONST) {
                        return Err(RuntimeError::const_violation(&name).into());
                    }
                    if id.flags.contains(Flags::DEFINED)
                        && !self.params.no_warn_define
                        && !self.params.quiet
                    {
                        eprintln!("warning: redefining symbol {name}");
                    }
                }
                let mut id = sym.borrow_mut();
                id.global = Some(self.accu.clone());
                id.flags.insert(Flags::DEFINED | Flags::from_bits(instr.i as u16));
            }

            Opcode::Lambda => {
                let info = match self.code.lambdas.get(instr.i as usize) {
                    Some(info) => info.clone(),
                    None => panic!("vm: lambda table index {} out of range", instr.i),
                };
                debug_assert!(
                    matches!(
                        self.code.instrs.get(info.end - 1).map(|i| i.op),
                        Some(Opcode::Return)
                    ),
                    "lambda body must end in Return"
                );
                let env = if info.captures {
                    self.env.clone()
                } else {
                    Vec::new()
                };
                self.accu = Value::Lambda(Rc::new(Lambda {
                    name: info.name.clone(),
                    args: info.args.clone(),
                    ret: Type::any(),
                    kind: LambdaKind::Compiled {
                        code: self.code.clone(),
                        start: info.start,
                        end: info.end,
                        env,
                    },
                }));
            }

            Opcode::Label => {}

            Opcode::Local => {
                let slot = self.fp + 1 + instr.i as usize;
                self.accu = self.stack[slot].clone();
            }

            Opcode::LocalSet => {
                let slot = self.fp + 1 + instr.i as usize;
                self.stack[slot] = self.accu.clone();
            }

            Opcode::Global => {
                let sym = expect_sym(instr);
                let (defined, value, name) = {
                    let id = sym.borrow();
                    (
                        id.flags.contains(Flags::DEFINED),
                        id.global.clone(),
                        id.name.clone(),
                    )
                };
                match value {
                    Some(value) if defined => self.accu = value,
                    _ => return Err(RuntimeError::unbound(&name).into()),
                }
            }

            Opcode::GlobalSet => {
                let sym = expect_sym(instr);
                let mut id = sym.borrow_mut();
                if id.flags.contains(Flags::CONST) || id.flags.contains(Flags::FINAL) {
                    let name = id.name.clone();
                    return Err(RuntimeError::const_violation(&name).into());
                }
                if !id.flags.contains(Flags::DEFINED) {
                    return Err(RuntimeError::unbound(&id.name).into());
                }
                id.global = Some(self.accu.clone());
            }

            Opcode::Env => {
                let record = match self.env.get(instr.i as usize) {
                    Some(r) => r.clone(),
                    None => panic!("vm: env frame {} out of range", instr.i),
                };
                self.accu = record.borrow()[instr.j as usize].clone();
            }

            Opcode::EnvSet => {
                let record = match self.env.get(instr.i as usize) {
                    Some(r) => r.clone(),
                    None => panic!("vm: env frame {} out of range", instr.i),
                };
                record.borrow_mut()[instr.j as usize] = self.accu.clone();
            }

            Opcode::PushF => {
                let lambda = match &self.accu {
                    Value::Lambda(l) => l.clone(),
                    v => {
                        return Err(RuntimeError::type_error(format!(
                            "invalid function: {v}"
                        ))
                        .into());
                    }
                };
                let frame = Frame {
                    next: self.fp,
                    pc: 0,
                    lambda,
                    toplevel: false,
                    code: self.code.clone(),
                    env: self.env.clone(),
                };
                self.stack.push(Value::Frame(Rc::new(RefCell::new(frame))));
            }

            Opcode::PushS => {
                let n = instr.i as usize;
                if instr.j != 0 {
                    self.env
                        .push(Rc::new(RefCell::new(vec![Value::Unspecified; n])));
                } else {
                    self.stack
                        .extend(std::iter::repeat_n(Value::Unspecified, n));
                }
            }

            Opcode::PopS => {
                if instr.j != 0 {
                    if self.env.pop().is_none() {
                        panic!("vm: env scope pop without a scope");
                    }
                } else {
                    let n = instr.i as usize;
                    let new_len = self.stack.len() - n;
                    if new_len <= self.fp {
                        panic!("vm: scope pop below the frame base");
                    }
                    self.stack.truncate(new_len);
                }
            }

            Opcode::PushA => {
                // Splice the trailing list argument into individual
                // argument slots; Call recomputes the count.
                let list_slot = self.stack.len() - 1;
                let list = self.stack[list_slot].clone();
                self.stack.truncate(list_slot);
                let mut cursor = list;
                loop {
                    match cursor {
                        Value::Null => break,
                        Value::Pair(p) => {
                            self.stack.push(p.borrow().car.clone());
                            let next = p.borrow().cdr.clone();
                            cursor = next;
                        }
                        v => {
                            return Err(RuntimeError::type_error(format!(
                                "apply: expected a list, got {v}"
                            ))
                            .into());
                        }
                    }
                }
            }

            Opcode::Call => {
                return self.call(instr).map(|()| None);
            }

            Opcode::Return => {
                let frame_rc = self.frame_at(self.fp);
                let (pc, code, env, next, toplevel) = {
                    let frame = frame_rc.borrow();
                    (
                        frame.pc,
                        frame.code.clone(),
                        frame.env.clone(),
                        frame.next,
                        frame.toplevel,
                    )
                };
                self.pc = pc;
                self.code = code;
                self.env = env;
                self.stack.truncate(self.fp);
                self.fp = next;
                if toplevel {
                    return Ok(Some(self.accu.clone()));
                }
            }

            Opcode::If => {
                if self.accu.is_truthy() {
                    self.pc = instr.i as usize;
                }
            }

            Opcode::IfNot => {
                if !self.accu.is_truthy() {
                    self.pc = instr.i as usize;
                }
            }

            Opcode::Jmp => {
                self.pc = instr.i as usize;
            }
        }
        Ok(None)
    }

    /// The `Call` instruction. Finds the frame below the argument
    /// scope, validates arity, and either invokes a native in-line or
    /// transfers control into compiled code.
    fn call(&mut self, instr: &Instr) -> Result<(), Error> {
        let framepos = if instr.i >= 0 {
            self.stack.len() - instr.i as usize - 1
        } else {
            // Variadic apply: the argument count comes from the stack.
            match (0..self.stack.len())
                .rev()
                .find(|idx| matches!(self.stack[*idx], Value::Frame(_)))
            {
                Some(pos) => pos,
                None => panic!("vm: call without a pending frame"),
            }
        };

        let frame_rc = self.frame_at(framepos);
        let lambda = frame_rc.borrow().lambda.clone();
        let argc = self.stack.len() - framepos - 1;

        let name = lambda.name.clone();
        let who = name.as_deref().unwrap_or("lambda");
        lambda.args.validate(who, argc)?;

        match &lambda.kind {
            LambdaKind::Native(native) => {
                let args: Vec<Value> = self.stack[framepos + 1..].to_vec();
                self.accu = native(self, &args)?;
                // Pop the argument scope and the frame marker; fp never
                // moved for a native call.
                self.stack.truncate(framepos);
            }
            LambdaKind::Compiled { code, start, env, .. } => {
                // Pack excess positional arguments into the rest list.
                if lambda.args.rest {
                    let rest: Vec<Value> = self.stack.split_off(framepos + 1 + lambda.args.min);
                    self.stack.push(list_from_vec(rest));
                }

                if instr.j != 0 {
                    // Tail call: the new activation inherits the return
                    // linkage of the current one, then slides down over
                    // it.
                    let old_rc = self.frame_at(self.fp);
                    {
                        let old = old_rc.borrow();
                        let mut new = frame_rc.borrow_mut();
                        new.pc = old.pc;
                        new.next = old.next;
                        new.toplevel = old.toplevel;
                        new.code = old.code.clone();
                        new.env = old.env.clone();
                    }
                    let moved = self.stack.split_off(framepos);
                    self.stack.truncate(self.fp);
                    self.stack.extend(moved);
                } else {
                    frame_rc.borrow_mut().pc = self.pc;
                    self.fp = framepos;
                }

                self.env = env.clone();
                self.code = code.clone();
                self.pc = *start;
            }
        }
        Ok(())
    }

    fn frame_at(&self, pos: usize) -> Rc<RefCell<Frame>> {
        match self.stack.get(pos) {
            Some(Value::Frame(f)) => f.clone(),
            Some(v) => panic!("vm: invalid frame at {pos}: {v}"),
            None => panic!("vm: frame position {pos} out of range"),
        }
    }

    /// Build a stack trace from the live frames: the current location
    /// first, then each caller's call site.
    pub fn stack_trace(&self) -> Vec<TraceFrame> {
        let mut trace = Vec::new();

        let push = |trace: &mut Vec<TraceFrame>, code: &CompiledCode, pc: usize| {
            if let Some(instr) = code.instrs.get(pc.saturating_sub(1))
                && let Some(loc) = &instr.loc
            {
                trace.push(TraceFrame {
                    source: loc.source.to_string(),
                    line: loc.line,
                });
            }
        };

        push(&mut trace, &self.code, self.pc);

        let mut fp = self.fp;
        loop {
            let Some(Value::Frame(frame)) = self.stack.get(fp) else {
                break;
            };
            let frame = frame.borrow();
            push(&mut trace, &frame.code, frame.pc);
            if frame.toplevel || frame.next == fp {
                break;
            }
            fp = frame.next;
        }
        trace
    }

    /// Attach the failing instruction's location and the live stack
    /// trace to a runtime error.
    fn annotate(&self, err: Error, instr: &Instr) -> Error {
        match err {
            Error::Runtime(mut e) => {
                if e.loc.is_none() {
                    e.loc = instr.loc.clone();
                }
                if e.trace.is_empty() {
                    e.trace = self.stack_trace();
                }
                Error::Runtime(e)
            }
            other => other,
        }
    }
}

fn expect_sym(instr: &Instr) -> SymbolRef {
    match &instr.sym {
        Some(sym) => sym.clone(),
        None => panic!("vm: {} without a symbol operand", instr.op),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_display() {
        let cases = vec![
            (
                Instr {
                    op: Opcode::Const,
                    v: Some(Value::Boolean(true)),
                    i: 0,
                    j: 0,
                    sym: None,
                    loc: None,
                },
                "\tconst\t#t",
            ),
            (
                Instr {
                    op: Opcode::Label,
                    v: None,
                    i: 3,
                    j: 0,
                    sym: None,
                    loc: None,
                },
                ".l3:",
            ),
            (
                Instr {
                    op: Opcode::Env,
                    v: None,
                    i: 1,
                    j: 2,
                    sym: None,
                    loc: None,
                },
                "\tenv\t1.2",
            ),
            (
                Instr {
                    op: Opcode::Call,
                    v: None,
                    i: 2,
                    j: 1,
                    sym: None,
                    loc: None,
                },
                "\tcall\t2\ttail",
            ),
            (
                Instr {
                    op: Opcode::PushS,
                    v: None,
                    i: 3,
                    j: 1,
                    sym: None,
                    loc: None,
                },
                "\tpushs\t3\tcaptures",
            ),
            (
                Instr {
                    op: Opcode::Return,
                    v: None,
                    i: 0,
                    j: 0,
                    sym: None,
                    loc: None,
                },
                "\treturn",
            ),
        ];
        for (instr, expected) in cases {
            assert_eq!(instr.to_string(), expected);
        }
    }
}
