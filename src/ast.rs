//! Abstract syntax tree.
//!
//! Each node knows how to emit its own bytecode. Binding resolution,
//! tail marking and capture analysis happen before emission (see
//! `compiler`), so emission is a single pass: nodes read their resolved
//! [`EnvBinding`]s and stamp frame indices as scopes are opened.

use std::rc::Rc;

use crate::SourceLoc;
use crate::compiler::Compiler;
use crate::env::{EnvBinding, FrameRef, FrameType};
use crate::symbols::{Flags, SymbolRef};
use crate::value::Value;
use crate::{CompileError, Error};

/// A tagged syntactic form.
pub enum Ast {
    /// `(begin ...)` and implicit bodies.
    Sequence {
        loc: Option<SourceLoc>,
        items: Vec<Ast>,
    },
    /// `(define name value)`; always a global binding.
    Define {
        loc: Option<SourceLoc>,
        sym: SymbolRef,
        flags: Flags,
        value: Box<Ast>,
    },
    /// `(set! name value)`.
    Set {
        loc: Option<SourceLoc>,
        name: String,
        binding: Option<EnvBinding>,
        sym: Option<SymbolRef>,
        value: Box<Ast>,
    },
    /// `let`, `let*` and `letrec` after resolution share this shape.
    Let {
        loc: Option<SourceLoc>,
        frame: FrameRef,
        bindings: Vec<LetBinding>,
        body: Vec<Ast>,
        tail: bool,
    },
    If {
        loc: Option<SourceLoc>,
        cond: Box<Ast>,
        then: Box<Ast>,
        els: Option<Box<Ast>>,
    },
    /// `(apply f fixed... list)`.
    Apply {
        loc: Option<SourceLoc>,
        func: Box<Ast>,
        fixed: Vec<Ast>,
        list: Box<Ast>,
        frame: FrameRef,
        tail: bool,
    },
    Call {
        loc: Option<SourceLoc>,
        func: Box<Ast>,
        arg_frame: FrameRef,
        args: Vec<Ast>,
        tail: bool,
    },
    Lambda(Rc<LambdaData>),
    Constant {
        loc: Option<SourceLoc>,
        value: Value,
    },
    Identifier {
        loc: Option<SourceLoc>,
        name: String,
        binding: Option<EnvBinding>,
        sym: Option<SymbolRef>,
    },
    Cond {
        loc: Option<SourceLoc>,
        choices: Vec<CondChoice>,
        tail: bool,
    },
    Case {
        loc: Option<SourceLoc>,
        expr: Box<Ast>,
        choices: Vec<CaseChoice>,
        value_frame: FrameRef,
        eqv_frame: FrameRef,
        eqv_sym: SymbolRef,
        tail: bool,
    },
    And {
        loc: Option<SourceLoc>,
        exprs: Vec<Ast>,
    },
    Or {
        loc: Option<SourceLoc>,
        exprs: Vec<Ast>,
    },
}

/// One `let` binding: the slot in the enclosing frame and its
/// initializer.
pub struct LetBinding {
    pub loc: Option<SourceLoc>,
    pub index: usize,
    pub init: Ast,
}

pub struct CondChoice {
    pub loc: Option<SourceLoc>,
    /// `None` for the `else` clause.
    pub cond: Option<Ast>,
    pub body: CondBody,
}

pub enum CondBody {
    /// Plain expression clause; empty means the test's value is the
    /// result.
    Exprs(Vec<Ast>),
    /// `(test => func)`: the matched value is saved in a one-slot scope
    /// and passed to `func`.
    Arrow {
        func: Ast,
        value_frame: FrameRef,
        arg_frame: FrameRef,
    },
}

pub struct CaseChoice {
    pub loc: Option<SourceLoc>,
    /// Empty for the `else` clause.
    pub datums: Vec<Value>,
    pub datum_locs: Vec<Option<SourceLoc>>,
    pub exprs: Vec<Ast>,
}

/// Everything needed to compile a lambda body in the compiler's second
/// pass.
pub struct LambdaData {
    pub loc: Option<SourceLoc>,
    pub name: Option<String>,
    /// Parameter names; with `rest` the last name collects the tail.
    pub params: Vec<String>,
    pub rest: bool,
    pub arg_frame: FrameRef,
    pub body: Vec<Ast>,
    /// True when the body references bindings of enclosing frames; the
    /// closure then snapshots the environment chain at construction.
    pub captures: bool,
    /// Lexical frame chain at the definition point.
    pub env_frames: Vec<FrameRef>,
    /// Set for `(define (name ...) ...)`: emit a `Define` after the
    /// closure is built.
    pub define: bool,
    pub sym: Option<SymbolRef>,
    pub flags: Flags,
}

impl LambdaData {
    /// Runtime environment-chain length at entry to the body: the
    /// number of captured heap frames lexically in scope. Non-capturing
    /// lambdas start with an empty chain.
    pub fn env_base(&self) -> usize {
        if self.captures {
            self.env_frames.iter().filter(|f| f.is_captured()).count()
        } else {
            0
        }
    }
}

impl Ast {
    pub fn loc(&self) -> Option<SourceLoc> {
        match self {
            Ast::Sequence { loc, .. }
            | Ast::Define { loc, .. }
            | Ast::Set { loc, .. }
            | Ast::Let { loc, .. }
            | Ast::If { loc, .. }
            | Ast::Apply { loc, .. }
            | Ast::Call { loc, .. }
            | Ast::Constant { loc, .. }
            | Ast::Identifier { loc, .. }
            | Ast::Cond { loc, .. }
            | Ast::Case { loc, .. }
            | Ast::And { loc, .. }
            | Ast::Or { loc, .. } => loc.clone(),
            Ast::Lambda(data) => data.loc.clone(),
        }
    }

    /// Emit bytecode for this node into the compiler's instruction
    /// buffer.
    pub fn bytecode(&self, c: &mut Compiler) -> Result<(), Error> {
        match self {
            Ast::Sequence { items, .. } => {
                for item in items {
                    item.bytecode(c)?;
                }
                Ok(())
            }

            Ast::Define { loc, sym, flags, value } => {
                value.bytecode(c)?;
                c.emit_define(loc.clone(), sym.clone(), *flags);
                Ok(())
            }

            Ast::Set { loc, binding, sym, value, name } => {
                value.bytecode(c)?;
                match binding {
                    Some(b) => emit_slot_write(c, loc.clone(), b),
                    None => match sym {
                        Some(sym) => c.emit_global_set(loc.clone(), sym.clone()),
                        None => {
                            return Err(CompileError::at(
                                format!("set!: unresolved variable {name}"),
                                loc.clone(),
                            )
                            .into());
                        }
                    },
                }
                Ok(())
            }

            Ast::Let { loc, frame, bindings, body, tail } => {
                let captures = frame.is_captured();
                let n = frame.size.get();
                c.open_scope(loc.clone(), frame, n, captures);
                for binding in bindings {
                    binding.init.bytecode(c)?;
                    emit_slot_write(
                        c,
                        binding.loc.clone(),
                        &EnvBinding {
                            frame: frame.clone(),
                            index: binding.index,
                        },
                    );
                }
                for item in body {
                    item.bytecode(c)?;
                }
                c.close_scope(None, n, captures, *tail);
                Ok(())
            }

            Ast::If { loc, cond, then, els } => {
                let label_false = c.new_label();
                let label_end = c.new_label();

                cond.bytecode(c)?;
                match els {
                    None => {
                        c.emit_branch(loc.clone(), crate::vm::Opcode::IfNot, label_end);
                        then.bytecode(c)?;
                    }
                    Some(els) => {
                        c.emit_branch(loc.clone(), crate::vm::Opcode::IfNot, label_false);
                        then.bytecode(c)?;
                        c.emit_branch(None, crate::vm::Opcode::Jmp, label_end);
                        c.add_label(label_false);
                        els.bytecode(c)?;
                    }
                }
                c.add_label(label_end);
                Ok(())
            }

            Ast::Apply { loc, func, fixed, list, frame, tail } => {
                func.bytecode(c)?;
                c.open_call_frame(loc.clone());

                let n = fixed.len() + 1;
                c.open_scope(loc.clone(), frame, n, false);
                for (idx, arg) in fixed.iter().enumerate() {
                    arg.bytecode(c)?;
                    c.emit_local_set(arg.loc(), frame.index.get() + idx);
                }
                list.bytecode(c)?;
                c.emit_local_set(list.loc(), frame.index.get() + n - 1);

                c.emit_push_a(loc.clone(), n);
                c.add_call(loc.clone(), -1, *tail);
                c.close_call_frame(n);
                Ok(())
            }

            Ast::Call { loc, func, arg_frame, args, tail } => {
                func.bytecode(c)?;
                c.open_call_frame(loc.clone());

                c.open_scope(loc.clone(), arg_frame, args.len(), false);
                for (idx, arg) in args.iter().enumerate() {
                    arg.bytecode(c)?;
                    c.emit_local_set(arg.loc(), arg_frame.index.get() + idx);
                }
                c.add_call(loc.clone(), args.len() as i32, *tail);
                c.close_call_frame(args.len());
                Ok(())
            }

            Ast::Lambda(data) => {
                c.emit_lambda(data.clone());
                if data.define
                    && let Some(sym) = &data.sym
                {
                    c.emit_define(data.loc.clone(), sym.clone(), data.flags);
                }
                Ok(())
            }

            Ast::Constant { loc, value } => {
                c.emit_const(loc.clone(), value.clone());
                Ok(())
            }

            Ast::Identifier { loc, name, binding, sym } => {
                match binding {
                    Some(b) => emit_slot_read(c, loc.clone(), b),
                    None => match sym {
                        Some(sym) => c.emit_global(loc.clone(), sym.clone()),
                        None => {
                            return Err(CompileError::at(
                                format!("unresolved identifier {name}"),
                                loc.clone(),
                            )
                            .into());
                        }
                    },
                }
                Ok(())
            }

            Ast::Cond { choices, tail, .. } => {
                let label_end = c.new_label();
                let mut pending: Option<i32> = None;

                for (i, choice) in choices.iter().enumerate() {
                    if let Some(id) = pending.take() {
                        c.add_label(id);
                    }
                    let next = if i + 1 < choices.len() {
                        let id = c.new_label();
                        pending = Some(id);
                        id
                    } else {
                        label_end
                    };

                    if let Some(cond) = &choice.cond {
                        cond.bytecode(c)?;
                        c.emit_branch(choice.loc.clone(), crate::vm::Opcode::IfNot, next);
                    }

                    match &choice.body {
                        CondBody::Arrow { func, value_frame, arg_frame } => {
                            // Save the matched value into a one-slot
                            // scope, then call func with it.
                            c.open_scope(choice.loc.clone(), value_frame, 1, false);
                            c.emit_local_set(choice.loc.clone(), value_frame.index.get());

                            func.bytecode(c)?;
                            c.open_call_frame(choice.loc.clone());
                            c.open_scope(choice.loc.clone(), arg_frame, 1, false);
                            c.emit_local(choice.loc.clone(), value_frame.index.get());
                            c.emit_local_set(choice.loc.clone(), arg_frame.index.get());
                            c.add_call(choice.loc.clone(), 1, *tail);
                            c.close_call_frame(1);

                            c.close_scope(choice.loc.clone(), 1, false, *tail);
                        }
                        CondBody::Exprs(exprs) => {
                            for expr in exprs {
                                expr.bytecode(c)?;
                            }
                        }
                    }

                    c.emit_branch(None, crate::vm::Opcode::Jmp, label_end);
                }
                c.add_label(label_end);
                Ok(())
            }

            Ast::Case {
                loc,
                expr,
                choices,
                value_frame,
                eqv_frame,
                eqv_sym,
                tail,
            } => {
                let label_end = c.new_label();

                // Evaluate the key into a one-slot scope.
                c.open_scope(loc.clone(), value_frame, 1, false);
                expr.bytecode(c)?;
                c.emit_local_set(loc.clone(), value_frame.index.get());

                let mut pending: Option<i32> = None;
                for (i, choice) in choices.iter().enumerate() {
                    if let Some(id) = pending.take() {
                        c.add_label(id);
                    }
                    let next = if i + 1 < choices.len() {
                        let id = c.new_label();
                        pending = Some(id);
                        id
                    } else {
                        label_end
                    };

                    if !choice.datums.is_empty() {
                        let label_exprs = c.new_label();

                        // (eqv? key datum) for each datum of the choice.
                        for (idx, datum) in choice.datums.iter().enumerate() {
                            let from = choice.datum_locs.get(idx).cloned().flatten();
                            c.emit_global(from.clone(), eqv_sym.clone());
                            c.open_call_frame(from.clone());
                            c.open_scope(from.clone(), eqv_frame, 2, false);
                            c.emit_local(from.clone(), value_frame.index.get());
                            c.emit_local_set(from.clone(), eqv_frame.index.get());
                            c.emit_const(from.clone(), datum.clone());
                            c.emit_local_set(from.clone(), eqv_frame.index.get() + 1);
                            c.add_call(from.clone(), 2, false);
                            c.close_call_frame(2);
                            c.emit_branch(from, crate::vm::Opcode::If, label_exprs);
                        }

                        // No datum matched.
                        c.emit_branch(None, crate::vm::Opcode::Jmp, next);
                        c.add_label(label_exprs);
                    }

                    for expr in &choice.exprs {
                        expr.bytecode(c)?;
                    }
                    c.emit_branch(None, crate::vm::Opcode::Jmp, label_end);
                }
                c.add_label(label_end);

                c.close_scope(None, 1, false, *tail);
                Ok(())
            }

            Ast::And { loc, exprs } => {
                if exprs.is_empty() {
                    c.emit_const(loc.clone(), Value::Boolean(true));
                    return Ok(());
                }
                let label_end = c.new_label();
                for expr in &exprs[..exprs.len() - 1] {
                    expr.bytecode(c)?;
                    c.emit_branch(expr.loc(), crate::vm::Opcode::IfNot, label_end);
                }
                exprs[exprs.len() - 1].bytecode(c)?;
                c.add_label(label_end);
                Ok(())
            }

            Ast::Or { loc, exprs } => {
                if exprs.is_empty() {
                    c.emit_const(loc.clone(), Value::Boolean(false));
                    return Ok(());
                }
                let label_end = c.new_label();
                for expr in &exprs[..exprs.len() - 1] {
                    expr.bytecode(c)?;
                    c.emit_branch(expr.loc(), crate::vm::Opcode::If, label_end);
                }
                exprs[exprs.len() - 1].bytecode(c)?;
                c.add_label(label_end);
                Ok(())
            }
        }
    }
}

fn emit_slot_read(c: &mut Compiler, loc: Option<SourceLoc>, binding: &EnvBinding) {
    match binding.frame.ftype.get() {
        FrameType::Stack => {
            c.emit_local(loc, binding.frame.index.get() + binding.index);
        }
        FrameType::Env => {
            c.emit_env(loc, binding.frame.index.get(), binding.index);
        }
    }
}

fn emit_slot_write(c: &mut Compiler, loc: Option<SourceLoc>, binding: &EnvBinding) {
    match binding.frame.ftype.get() {
        FrameType::Stack => {
            c.emit_local_set(loc, binding.frame.index.get() + binding.index);
        }
        FrameType::Env => {
            c.emit_env_set(loc, binding.frame.index.get(), binding.index);
        }
    }
}
