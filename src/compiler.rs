//! AST construction and bytecode emission.
//!
//! The first half of this module is the syntax analyzer: it walks the
//! reader's S-expressions and produces [`Ast`] nodes with every variable
//! reference resolved to a binding, tail positions marked, and captured
//! frames promoted to heap environments. The second half is the
//! [`Compiler`]: it runs each node's emission method, assigns labels,
//! compiles the collected lambda bodies in a second pass, and links
//! branch targets to absolute instruction indices.
//!
//! Frame indices are stamped during emission: the compiler tracks the
//! current stack depth (slots above the activation base, including call
//! frame markers) and the current environment-chain depth, and writes
//! them into the shared frames as scopes open.

use std::rc::Rc;

use crate::ast::{Ast, CaseChoice, CondBody, CondChoice, LambdaData, LetBinding};
use crate::env::{EnvBinding, EnvFrame, FrameRef};
use crate::parser::{self, LineIndex, Sexpr, SexprKind};
use crate::symbols::{Flags, SymbolRef, SymbolTable};
use crate::types::Type;
use crate::value::{ArgSpec, Lambda, LambdaKind, Value, cons, list_from_vec};
use crate::vm::{CompiledCode, Instr, LambdaInfo, Opcode};
use crate::{CompileError, Error, SourceLoc};

/// Compile a source unit into a zero-argument entry lambda. Running the
/// returned closure evaluates the program and yields the value of its
/// last form.
pub fn compile(symbols: &mut SymbolTable, source_name: &str, text: &str) -> Result<Value, Error> {
    let datums = parser::parse_program(source_name, text)?;

    let mut analysis = Analysis::new(symbols, source_name, text);
    let program = analysis.analyze_program(&datums)?;

    let mut c = Compiler::new();
    for item in &program {
        item.bytecode(&mut c)?;
    }
    c.emit(None, Opcode::Return, 0, 0);
    let top_end = c.code.len();

    c.compile_lambdas()?;
    c.link();

    let code = Rc::new(CompiledCode {
        instrs: c.code,
        lambdas: c.infos,
    });
    Ok(Value::Lambda(Rc::new(Lambda {
        name: Some(source_name.to_string()),
        args: ArgSpec::fixed_names(&[], false),
        ret: Type::any(),
        kind: LambdaKind::Compiled {
            code,
            start: 0,
            end: top_end,
            env: Vec::new(),
        },
    })))
}

const KEYWORDS: &[&str] = &[
    "define", "lambda", "set!", "let", "let*", "letrec", "letrec*", "if", "cond", "case", "and",
    "or", "begin", "quote", "apply",
];

/// One lexical scope under analysis: the shared frame and the names of
/// its slots. `let*` grows `names` binding by binding.
struct Scope {
    frame: FrameRef,
    names: Vec<String>,
}

/// Syntax analyzer state.
struct Analysis<'a> {
    symbols: &'a mut SymbolTable,
    source: Rc<str>,
    lines: LineIndex,
    scopes: Vec<Scope>,
    /// One entry per enclosing lambda under analysis; set to true when
    /// its body is found to reference an outer binding.
    lambda_captures: Vec<bool>,
}

impl<'a> Analysis<'a> {
    fn new(symbols: &'a mut SymbolTable, source_name: &str, text: &str) -> Analysis<'a> {
        Analysis {
            symbols,
            source: Rc::from(source_name),
            lines: LineIndex::new(text),
            scopes: Vec::new(),
            lambda_captures: Vec::new(),
        }
    }

    fn analyze_program(&mut self, datums: &[Sexpr]) -> Result<Vec<Ast>, Error> {
        let mut items = Vec::with_capacity(datums.len());
        for (idx, datum) in datums.iter().enumerate() {
            let tail = idx + 1 == datums.len();
            items.push(self.analyze(datum, tail)?);
        }
        Ok(items)
    }

    fn loc(&self, offset: usize) -> Option<SourceLoc> {
        Some(SourceLoc::new(self.source.clone(), self.lines.line(offset)))
    }

    fn error(&self, sx: &Sexpr, message: impl Into<String>) -> Error {
        CompileError::at(message, self.loc(sx.offset)).into()
    }

    fn lambda_level(&self) -> usize {
        self.lambda_captures.len()
    }

    fn push_scope(&mut self, names: Vec<String>) -> FrameRef {
        let frame = EnvFrame::new(names.len(), self.lambda_level());
        self.scopes.push(Scope {
            frame: frame.clone(),
            names,
        });
        frame
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Look up a name in the lexical chain. A reference that crosses a
    /// lambda boundary promotes the binding's frame to a heap
    /// environment and marks every crossed lambda as capturing.
    fn resolve(&mut self, name: &str) -> Option<EnvBinding> {
        for scope in self.scopes.iter().rev() {
            if let Some(index) = scope.names.iter().rposition(|n| n == name) {
                let frame = scope.frame.clone();
                if frame.level < self.lambda_level() {
                    frame.promote();
                    for entry in &mut self.lambda_captures[frame.level..] {
                        *entry = true;
                    }
                }
                return Some(EnvBinding { frame, index });
            }
        }
        None
    }

    fn analyze(&mut self, sx: &Sexpr, tail: bool) -> Result<Ast, Error> {
        match &sx.kind {
            SexprKind::Atom(value) => Ok(Ast::Constant {
                loc: self.loc(sx.offset),
                value: value.clone(),
            }),
            SexprKind::Vector(_) => {
                let value = self.datum_value(sx);
                Ok(Ast::Constant {
                    loc: self.loc(sx.offset),
                    value,
                })
            }
            SexprKind::Symbol(name) => {
                let binding = self.resolve(name);
                let sym = if binding.is_none() {
                    Some(self.symbols.intern(name))
                } else {
                    None
                };
                Ok(Ast::Identifier {
                    loc: self.loc(sx.offset),
                    name: name.clone(),
                    binding,
                    sym,
                })
            }
            SexprKind::Dotted(..) => Err(self.error(sx, "unexpected dotted list")),
            SexprKind::List(items) => {
                let Some(first) = items.first() else {
                    return Err(self.error(sx, "empty application"));
                };
                if let SexprKind::Symbol(name) = &first.kind {
                    let name = name.clone();
                    if self.resolve(&name).is_none() && KEYWORDS.contains(&name.as_str()) {
                        return self.analyze_form(sx, &name, items, tail);
                    }
                }
                self.analyze_call(sx, items, tail)
            }
        }
    }

    fn analyze_form(
        &mut self,
        sx: &Sexpr,
        keyword: &str,
        items: &[Sexpr],
        tail: bool,
    ) -> Result<Ast, Error> {
        match keyword {
            "define" => self.analyze_define(sx, items),
            "lambda" => self.analyze_lambda_form(sx, items),
            "set!" => self.analyze_set(sx, items),
            "let" => self.analyze_let(sx, items, LetKind::Let, tail),
            "let*" => self.analyze_let(sx, items, LetKind::LetStar, tail),
            "letrec" | "letrec*" => self.analyze_let(sx, items, LetKind::Letrec, tail),
            "if" => self.analyze_if(sx, items, tail),
            "cond" => self.analyze_cond(sx, items, tail),
            "case" => self.analyze_case(sx, items, tail),
            "and" => self.analyze_and_or(sx, items, tail, true),
            "or" => self.analyze_and_or(sx, items, tail, false),
            "begin" => {
                let body = self.analyze_body(&items[1..], tail)?;
                Ok(Ast::Sequence {
                    loc: self.loc(sx.offset),
                    items: body,
                })
            }
            "quote" => {
                if items.len() != 2 {
                    return Err(self.error(sx, "quote: expected one argument"));
                }
                let value = self.datum_value(&items[1]);
                Ok(Ast::Constant {
                    loc: self.loc(sx.offset),
                    value,
                })
            }
            "apply" => self.analyze_apply(sx, items, tail),
            _ => Err(self.error(sx, format!("unknown syntactic form {keyword}"))),
        }
    }

    /// A body: all items in sequence, the last in tail position when the
    /// body itself is.
    fn analyze_body(&mut self, items: &[Sexpr], tail: bool) -> Result<Vec<Ast>, Error> {
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let item_tail = tail && idx + 1 == items.len();
            out.push(self.analyze(item, item_tail)?);
        }
        Ok(out)
    }

    fn analyze_call(&mut self, sx: &Sexpr, items: &[Sexpr], tail: bool) -> Result<Ast, Error> {
        let func = self.analyze(&items[0], false)?;
        let args = self.analyze_body(&items[1..], false)?;
        let arg_frame = EnvFrame::new(args.len(), self.lambda_level());
        Ok(Ast::Call {
            loc: self.loc(sx.offset),
            func: Box::new(func),
            arg_frame,
            args,
            tail,
        })
    }

    fn analyze_apply(&mut self, sx: &Sexpr, items: &[Sexpr], tail: bool) -> Result<Ast, Error> {
        if items.len() < 3 {
            return Err(self.error(sx, "apply: expected a function and an argument list"));
        }
        let func = self.analyze(&items[1], false)?;
        let fixed = self.analyze_body(&items[2..items.len() - 1], false)?;
        let list = self.analyze(&items[items.len() - 1], false)?;
        let frame = EnvFrame::new(fixed.len() + 1, self.lambda_level());
        Ok(Ast::Apply {
            loc: self.loc(sx.offset),
            func: Box::new(func),
            fixed,
            list: Box::new(list),
            frame,
            tail,
        })
    }

    fn analyze_define(&mut self, sx: &Sexpr, items: &[Sexpr]) -> Result<Ast, Error> {
        match items.get(1).map(|i| &i.kind) {
            Some(SexprKind::Symbol(name)) => {
                let value = match items.len() {
                    2 => Ast::Constant {
                        loc: self.loc(sx.offset),
                        value: Value::Unspecified,
                    },
                    3 => self.analyze(&items[2], false)?,
                    _ => return Err(self.error(sx, "define: too many forms")),
                };
                // Name lambda values after the binding for diagnostics.
                let value = match value {
                    Ast::Lambda(data) => {
                        let mut data = take_lambda_data(data);
                        if data.name.is_none() {
                            data.name = Some(name.clone());
                        }
                        Ast::Lambda(Rc::new(data))
                    }
                    other => other,
                };
                Ok(Ast::Define {
                    loc: self.loc(sx.offset),
                    sym: self.symbols.intern(name),
                    flags: Flags::DEFINED,
                    value: Box::new(value),
                })
            }
            Some(SexprKind::List(_)) | Some(SexprKind::Dotted(..)) => {
                // (define (name formals...) body...)
                let (name_sx, formals) = split_define_head(&items[1])
                    .ok_or_else(|| self.error(sx, "define: malformed function form"))?;
                let SexprKind::Symbol(name) = &name_sx.kind else {
                    return Err(self.error(sx, "define: function name must be a symbol"));
                };
                if items.len() < 3 {
                    return Err(self.error(sx, "define: empty function body"));
                }
                let sym = self.symbols.intern(name);
                self.analyze_lambda(
                    sx,
                    Some(name.clone()),
                    &formals,
                    &items[2..],
                    true,
                    Some(sym),
                    Flags::DEFINED,
                )
            }
            _ => Err(self.error(sx, "define: expected a symbol or function form")),
        }
    }

    fn analyze_lambda_form(&mut self, sx: &Sexpr, items: &[Sexpr]) -> Result<Ast, Error> {
        if items.len() < 3 {
            return Err(self.error(sx, "lambda: expected formals and a body"));
        }
        self.analyze_lambda(
            sx,
            None,
            &Formals::from_sexpr(&items[1]),
            &items[2..],
            false,
            None,
            Flags::empty(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn analyze_lambda(
        &mut self,
        sx: &Sexpr,
        name: Option<String>,
        formals: &Formals<'_>,
        body: &[Sexpr],
        define: bool,
        sym: Option<SymbolRef>,
        flags: Flags,
    ) -> Result<Ast, Error> {
        let (params, rest) = self.parse_formals(sx, formals)?;

        let env_frames: Vec<FrameRef> = self.scopes.iter().map(|s| s.frame.clone()).collect();
        self.lambda_captures.push(false);
        let arg_frame = self.push_scope(params.clone());
        let result = self.analyze_body(body, true);
        self.pop_scope();
        let captures = self.lambda_captures.pop().unwrap_or(false);
        let body_ast = result?;

        if body_ast.is_empty() {
            return Err(self.error(sx, "lambda: empty body"));
        }

        Ok(Ast::Lambda(Rc::new(LambdaData {
            loc: self.loc(sx.offset),
            name,
            params,
            rest,
            arg_frame,
            body: body_ast,
            captures,
            env_frames,
            define,
            sym,
            flags,
        })))
    }

    fn parse_formals(
        &self,
        sx: &Sexpr,
        formals: &Formals<'_>,
    ) -> Result<(Vec<String>, bool), Error> {
        let mut params = Vec::new();
        let mut push = |param: &Sexpr| -> Result<(), Error> {
            match &param.kind {
                SexprKind::Symbol(name) => {
                    if params.contains(name) {
                        Err(self.error(param, format!("duplicate parameter name: {name}")))
                    } else {
                        params.push(name.clone());
                        Ok(())
                    }
                }
                _ => Err(self.error(param, "parameter must be a symbol")),
            }
        };
        let rest = match formals {
            Formals::Fixed(items) => {
                for item in *items {
                    push(item)?;
                }
                false
            }
            Formals::WithRest(items, tail) => {
                for item in *items {
                    push(item)?;
                }
                push(tail)?;
                true
            }
            Formals::RestOnly(tail) => {
                push(tail)?;
                true
            }
            Formals::Invalid => {
                return Err(self.error(sx, "lambda: formals must be a list or a symbol"));
            }
        };
        Ok((params, rest))
    }

    fn analyze_set(&mut self, sx: &Sexpr, items: &[Sexpr]) -> Result<Ast, Error> {
        if items.len() != 3 {
            return Err(self.error(sx, "set!: expected a variable and a value"));
        }
        let SexprKind::Symbol(name) = &items[1].kind else {
            return Err(self.error(sx, "set!: variable must be a symbol"));
        };
        let value = self.analyze(&items[2], false)?;
        let binding = self.resolve(name);
        let sym = if binding.is_none() {
            Some(self.symbols.intern(name))
        } else {
            None
        };
        Ok(Ast::Set {
            loc: self.loc(sx.offset),
            name: name.clone(),
            binding,
            sym,
            value: Box::new(value),
        })
    }

    fn analyze_let(
        &mut self,
        sx: &Sexpr,
        items: &[Sexpr],
        kind: LetKind,
        tail: bool,
    ) -> Result<Ast, Error> {
        // Named let: (let loop ((var init)...) body...)
        if kind == LetKind::Let
            && items.len() >= 3
            && matches!(items[1].kind, SexprKind::Symbol(_))
        {
            return self.analyze_named_let(sx, items, tail);
        }

        if items.len() < 3 {
            return Err(self.error(sx, "let: expected bindings and a body"));
        }
        let SexprKind::List(binding_forms) = &items[1].kind else {
            return Err(self.error(sx, "let: bindings must be a list"));
        };

        let mut names = Vec::with_capacity(binding_forms.len());
        let mut inits = Vec::with_capacity(binding_forms.len());
        for form in binding_forms {
            let SexprKind::List(pair) = &form.kind else {
                return Err(self.error(form, "let: binding must be (name init)"));
            };
            let [name_sx, init_sx] = pair.as_slice() else {
                return Err(self.error(form, "let: binding must be (name init)"));
            };
            let SexprKind::Symbol(name) = &name_sx.kind else {
                return Err(self.error(name_sx, "let: binding name must be a symbol"));
            };
            names.push(name.clone());
            inits.push(init_sx);
        }

        let (frame, bindings) = match kind {
            LetKind::Let => {
                // Initializers see the outer scope.
                let mut analyzed = Vec::with_capacity(inits.len());
                for init in &inits {
                    analyzed.push(self.analyze(init, false)?);
                }
                let frame = self.push_scope(names);
                let bindings = analyzed
                    .into_iter()
                    .enumerate()
                    .map(|(index, init)| LetBinding {
                        loc: init.loc(),
                        index,
                        init,
                    })
                    .collect();
                (frame, bindings)
            }
            LetKind::LetStar => {
                // Each initializer sees the bindings before it.
                let frame = self.push_scope(Vec::new());
                frame.size.set(names.len());
                let mut bindings = Vec::with_capacity(inits.len());
                for (index, (name, init)) in names.into_iter().zip(inits).enumerate() {
                    let init = self.analyze(init, false)?;
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.names.push(name);
                    }
                    bindings.push(LetBinding {
                        loc: init.loc(),
                        index,
                        init,
                    });
                }
                (frame, bindings)
            }
            LetKind::Letrec => {
                // All names are in scope in every initializer.
                let frame = self.push_scope(names);
                let mut bindings = Vec::with_capacity(inits.len());
                for (index, init) in inits.iter().enumerate() {
                    let init = self.analyze(init, false)?;
                    bindings.push(LetBinding {
                        loc: init.loc(),
                        index,
                        init,
                    });
                }
                (frame, bindings)
            }
        };

        let result = self.analyze_body(&items[2..], tail);
        self.pop_scope();
        let body = result?;

        Ok(Ast::Let {
            loc: self.loc(sx.offset),
            frame,
            bindings,
            body,
            tail,
        })
    }

    /// Desugar `(let loop ((v init)...) body...)` into
    /// `(letrec ((loop (lambda (v...) body...))) (loop init...))`.
    fn analyze_named_let(&mut self, sx: &Sexpr, items: &[Sexpr], tail: bool) -> Result<Ast, Error> {
        if items.len() < 4 {
            return Err(self.error(sx, "let: expected bindings and a body"));
        }
        let name = items[1].clone();
        let SexprKind::List(binding_forms) = &items[2].kind else {
            return Err(self.error(sx, "let: bindings must be a list"));
        };

        let mut vars = Vec::with_capacity(binding_forms.len());
        let mut inits = Vec::with_capacity(binding_forms.len());
        for form in binding_forms {
            let SexprKind::List(pair) = &form.kind else {
                return Err(self.error(form, "let: binding must be (name init)"));
            };
            let [var, init] = pair.as_slice() else {
                return Err(self.error(form, "let: binding must be (name init)"));
            };
            vars.push(var.clone());
            inits.push(init.clone());
        }

        let offset = sx.offset;
        let symbol = |name: &str| Sexpr {
            offset,
            kind: SexprKind::Symbol(name.to_string()),
        };
        let list = |items: Vec<Sexpr>| Sexpr {
            offset,
            kind: SexprKind::List(items),
        };

        let mut lambda = vec![symbol("lambda"), list(vars)];
        lambda.extend_from_slice(&items[3..]);

        let binding = list(vec![name.clone(), list(lambda)]);
        let mut call = vec![name];
        call.extend(inits);

        let letrec = list(vec![symbol("letrec"), list(vec![binding]), list(call)]);
        self.analyze(&letrec, tail)
    }

    fn analyze_if(&mut self, sx: &Sexpr, items: &[Sexpr], tail: bool) -> Result<Ast, Error> {
        if items.len() != 3 && items.len() != 4 {
            return Err(self.error(sx, "if: expected 2 or 3 forms"));
        }
        let cond = self.analyze(&items[1], false)?;

        // Trivial constant folding: a literal test selects its branch at
        // compile time.
        if let Ast::Constant { value, .. } = &cond {
            return if value.is_truthy() {
                self.analyze(&items[2], tail)
            } else if items.len() == 4 {
                self.analyze(&items[3], tail)
            } else {
                Ok(Ast::Constant {
                    loc: self.loc(sx.offset),
                    value: Value::Boolean(false),
                })
            };
        }

        let then = self.analyze(&items[2], tail)?;
        let els = if items.len() == 4 {
            Some(Box::new(self.analyze(&items[3], tail)?))
        } else {
            None
        };
        Ok(Ast::If {
            loc: self.loc(sx.offset),
            cond: Box::new(cond),
            then: Box::new(then),
            els,
        })
    }

    fn analyze_cond(&mut self, sx: &Sexpr, items: &[Sexpr], tail: bool) -> Result<Ast, Error> {
        if items.len() < 2 {
            return Err(self.error(sx, "cond: expected at least one clause"));
        }
        let mut choices = Vec::with_capacity(items.len() - 1);
        for (idx, clause_sx) in items[1..].iter().enumerate() {
            let SexprKind::List(clause) = &clause_sx.kind else {
                return Err(self.error(clause_sx, "cond: clause must be a list"));
            };
            if clause.is_empty() {
                return Err(self.error(clause_sx, "cond: empty clause"));
            }

            let is_else = matches!(&clause[0].kind, SexprKind::Symbol(name) if name == "else");
            if is_else {
                if idx + 1 != items.len() - 1 {
                    return Err(self.error(clause_sx, "cond: else clause must be last"));
                }
                if clause.len() < 2 {
                    return Err(self.error(clause_sx, "cond: else clause needs a body"));
                }
                choices.push(CondChoice {
                    loc: self.loc(clause_sx.offset),
                    cond: None,
                    body: CondBody::Exprs(self.analyze_body(&clause[1..], tail)?),
                });
                continue;
            }

            let cond = self.analyze(&clause[0], false)?;
            let is_arrow = clause.len() == 3
                && matches!(&clause[1].kind, SexprKind::Symbol(name) if name == "=>");
            let body = if is_arrow {
                CondBody::Arrow {
                    func: self.analyze(&clause[2], false)?,
                    value_frame: EnvFrame::new(1, self.lambda_level()),
                    arg_frame: EnvFrame::new(1, self.lambda_level()),
                }
            } else {
                CondBody::Exprs(self.analyze_body(&clause[1..], tail)?)
            };
            choices.push(CondChoice {
                loc: self.loc(clause_sx.offset),
                cond: Some(cond),
                body,
            });
        }
        Ok(Ast::Cond {
            loc: self.loc(sx.offset),
            choices,
            tail,
        })
    }

    fn analyze_case(&mut self, sx: &Sexpr, items: &[Sexpr], tail: bool) -> Result<Ast, Error> {
        if items.len() < 3 {
            return Err(self.error(sx, "case: expected a key and clauses"));
        }
        let expr = self.analyze(&items[1], false)?;

        let mut choices = Vec::with_capacity(items.len() - 2);
        for (idx, clause_sx) in items[2..].iter().enumerate() {
            let SexprKind::List(clause) = &clause_sx.kind else {
                return Err(self.error(clause_sx, "case: clause must be a list"));
            };
            if clause.is_empty() {
                return Err(self.error(clause_sx, "case: empty clause"));
            }

            let is_else = matches!(&clause[0].kind, SexprKind::Symbol(name) if name == "else");
            if is_else {
                if idx + 1 != items.len() - 2 {
                    return Err(self.error(clause_sx, "case: else clause must be last"));
                }
                choices.push(CaseChoice {
                    loc: self.loc(clause_sx.offset),
                    datums: Vec::new(),
                    datum_locs: Vec::new(),
                    exprs: self.analyze_body(&clause[1..], tail)?,
                });
                continue;
            }

            let SexprKind::List(datum_forms) = &clause[0].kind else {
                return Err(self.error(&clause[0], "case: datums must be a list"));
            };
            let datums: Vec<Value> = datum_forms.iter().map(|d| self.datum_value(d)).collect();
            let datum_locs: Vec<Option<SourceLoc>> =
                datum_forms.iter().map(|d| self.loc(d.offset)).collect();
            choices.push(CaseChoice {
                loc: self.loc(clause_sx.offset),
                datums,
                datum_locs,
                exprs: self.analyze_body(&clause[1..], tail)?,
            });
        }

        Ok(Ast::Case {
            loc: self.loc(sx.offset),
            expr: Box::new(expr),
            choices,
            value_frame: EnvFrame::new(1, self.lambda_level()),
            eqv_frame: EnvFrame::new(2, self.lambda_level()),
            eqv_sym: self.symbols.intern("eqv?"),
            tail,
        })
    }

    fn analyze_and_or(
        &mut self,
        sx: &Sexpr,
        items: &[Sexpr],
        tail: bool,
        is_and: bool,
    ) -> Result<Ast, Error> {
        let mut exprs = Vec::with_capacity(items.len() - 1);
        for (idx, item) in items[1..].iter().enumerate() {
            let item_tail = tail && idx + 2 == items.len();
            exprs.push(self.analyze(item, item_tail)?);
        }
        let loc = self.loc(sx.offset);
        Ok(if is_and {
            Ast::And { loc, exprs }
        } else {
            Ast::Or { loc, exprs }
        })
    }

    /// Convert a datum S-expression into a runtime value, interning
    /// symbols along the way.
    fn datum_value(&mut self, sx: &Sexpr) -> Value {
        match &sx.kind {
            SexprKind::Atom(value) => value.clone(),
            SexprKind::Symbol(name) => Value::Symbol(self.symbols.intern(name)),
            SexprKind::List(items) => {
                list_from_vec(items.iter().map(|i| self.datum_value(i)).collect())
            }
            SexprKind::Dotted(items, tail) => {
                let mut result = self.datum_value(tail);
                for item in items.iter().rev() {
                    result = cons(self.datum_value(item), result);
                }
                result
            }
            SexprKind::Vector(items) => Value::Vector(Rc::new(std::cell::RefCell::new(
                items.iter().map(|i| self.datum_value(i)).collect(),
            ))),
        }
    }
}

#[derive(PartialEq, Clone, Copy)]
enum LetKind {
    Let,
    LetStar,
    Letrec,
}

/// Formals of a lambda: `(a b)`, `(a b . rest)` or a bare rest symbol.
enum Formals<'a> {
    Fixed(&'a [Sexpr]),
    WithRest(&'a [Sexpr], &'a Sexpr),
    RestOnly(&'a Sexpr),
    Invalid,
}

impl<'a> Formals<'a> {
    fn from_sexpr(sx: &'a Sexpr) -> Formals<'a> {
        match &sx.kind {
            SexprKind::List(items) => Formals::Fixed(items),
            SexprKind::Dotted(items, tail) => Formals::WithRest(items, tail),
            SexprKind::Symbol(_) => Formals::RestOnly(sx),
            _ => Formals::Invalid,
        }
    }
}

/// Split `(define (head formals...) ...)`'s head form into the name and
/// the formals.
fn split_define_head(sx: &Sexpr) -> Option<(&Sexpr, Formals<'_>)> {
    match &sx.kind {
        SexprKind::List(items) => {
            let (name, rest) = items.split_first()?;
            Some((name, Formals::Fixed(rest)))
        }
        SexprKind::Dotted(items, tail) => {
            let (name, rest) = items.split_first()?;
            Some((name, Formals::WithRest(rest, tail)))
        }
        _ => None,
    }
}

fn take_lambda_data(data: Rc<LambdaData>) -> LambdaData {
    match Rc::try_unwrap(data) {
        Ok(data) => data,
        Err(_) => panic!("lambda data is uniquely owned during analysis"),
    }
}

/// Bytecode emitter. Tracks the activation's stack depth (slots above
/// the frame base, including call-frame markers) and environment-chain
/// depth so scope frames get their runtime indices as they open.
pub struct Compiler {
    pub(crate) code: Vec<Instr>,
    pending: Vec<Rc<LambdaData>>,
    infos: Vec<LambdaInfo>,
    next_label: i32,
    stack_depth: usize,
    env_depth: usize,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler {
            code: Vec::new(),
            pending: Vec::new(),
            infos: Vec::new(),
            next_label: 0,
            stack_depth: 0,
            env_depth: 0,
        }
    }

    pub(crate) fn emit(&mut self, loc: Option<SourceLoc>, op: Opcode, i: i32, j: i32) {
        self.code.push(Instr {
            op,
            v: None,
            i,
            j,
            sym: None,
            loc,
        });
    }

    pub(crate) fn emit_const(&mut self, loc: Option<SourceLoc>, value: Value) {
        self.code.push(Instr {
            op: Opcode::Const,
            v: Some(value),
            i: 0,
            j: 0,
            sym: None,
            loc,
        });
    }

    fn emit_with_sym(&mut self, loc: Option<SourceLoc>, op: Opcode, sym: SymbolRef, i: i32) {
        self.code.push(Instr {
            op,
            v: None,
            i,
            j: 0,
            sym: Some(sym),
            loc,
        });
    }

    pub(crate) fn emit_global(&mut self, loc: Option<SourceLoc>, sym: SymbolRef) {
        self.emit_with_sym(loc, Opcode::Global, sym, 0);
    }

    pub(crate) fn emit_global_set(&mut self, loc: Option<SourceLoc>, sym: SymbolRef) {
        self.emit_with_sym(loc, Opcode::GlobalSet, sym, 0);
    }

    pub(crate) fn emit_define(&mut self, loc: Option<SourceLoc>, sym: SymbolRef, flags: Flags) {
        self.emit_with_sym(loc, Opcode::Define, sym, flags.bits() as i32);
    }

    pub(crate) fn emit_local(&mut self, loc: Option<SourceLoc>, index: usize) {
        self.emit(loc, Opcode::Local, index as i32, 0);
    }

    pub(crate) fn emit_local_set(&mut self, loc: Option<SourceLoc>, index: usize) {
        self.emit(loc, Opcode::LocalSet, index as i32, 0);
    }

    pub(crate) fn emit_env(&mut self, loc: Option<SourceLoc>, frame: usize, index: usize) {
        self.emit(loc, Opcode::Env, frame as i32, index as i32);
    }

    pub(crate) fn emit_env_set(&mut self, loc: Option<SourceLoc>, frame: usize, index: usize) {
        self.emit(loc, Opcode::EnvSet, frame as i32, index as i32);
    }

    pub(crate) fn new_label(&mut self) -> i32 {
        self.next_label += 1;
        self.next_label
    }

    pub(crate) fn add_label(&mut self, id: i32) {
        self.emit(None, Opcode::Label, id, 0);
    }

    pub(crate) fn emit_branch(&mut self, loc: Option<SourceLoc>, op: Opcode, label: i32) {
        self.emit(loc, op, label, 0);
    }

    /// Open a scope: stamp the frame's runtime index and emit `PushS`.
    pub(crate) fn open_scope(
        &mut self,
        loc: Option<SourceLoc>,
        frame: &FrameRef,
        n: usize,
        captures: bool,
    ) {
        if captures {
            frame.index.set(self.env_depth);
            self.env_depth += 1;
        } else {
            frame.index.set(self.stack_depth);
            self.stack_depth += n;
        }
        self.emit(loc, Opcode::PushS, n as i32, captures as i32);
    }

    /// Close a scope. A scope in tail position skips its `PopS`; the
    /// callee's `Return` reclaims the slots. The compile-time depth
    /// model is restored either way so sibling branches see consistent
    /// offsets.
    pub(crate) fn close_scope(
        &mut self,
        loc: Option<SourceLoc>,
        n: usize,
        captures: bool,
        tail: bool,
    ) {
        if !tail {
            self.emit(loc, Opcode::PopS, n as i32, captures as i32);
        }
        if captures {
            self.env_depth -= 1;
        } else {
            self.stack_depth -= n;
        }
    }

    pub(crate) fn open_call_frame(&mut self, loc: Option<SourceLoc>) {
        self.emit(loc, Opcode::PushF, 0, 0);
        self.stack_depth += 1;
    }

    /// Account for `Call` consuming the frame marker and argument scope.
    pub(crate) fn close_call_frame(&mut self, argc: usize) {
        self.stack_depth -= argc + 1;
    }

    pub(crate) fn emit_push_a(&mut self, loc: Option<SourceLoc>, n: usize) {
        self.emit(loc, Opcode::PushA, n as i32, 0);
    }

    pub(crate) fn add_call(&mut self, loc: Option<SourceLoc>, argc: i32, tail: bool) {
        self.emit(loc, Opcode::Call, argc, tail as i32);
    }

    pub(crate) fn emit_lambda(&mut self, data: Rc<LambdaData>) {
        let index = self.pending.len();
        self.emit(data.loc.clone(), Opcode::Lambda, index as i32, 0);
        self.pending.push(data);
    }

    /// Second pass: compile every collected lambda body. Bodies may
    /// collect further lambdas; the queue drains in discovery order so
    /// table indices match the emitted `Lambda` operands.
    fn compile_lambdas(&mut self) -> Result<(), Error> {
        let mut idx = 0;
        while idx < self.pending.len() {
            let data = self.pending[idx].clone();
            let start = self.code.len();

            self.env_depth = data.env_base();
            self.stack_depth = data.params.len();

            // Argument unpacking: captured parameters move from their
            // stack slots into a fresh heap frame.
            let arg_frame = &data.arg_frame;
            if arg_frame.is_captured() {
                arg_frame.index.set(self.env_depth);
                let n = data.params.len();
                self.emit(data.loc.clone(), Opcode::PushS, n as i32, 1);
                for i in 0..n {
                    self.emit(None, Opcode::Local, i as i32, 0);
                    self.emit(None, Opcode::EnvSet, arg_frame.index.get() as i32, i as i32);
                }
                self.env_depth += 1;
            } else {
                arg_frame.index.set(0);
            }

            for item in &data.body {
                item.bytecode(self)?;
            }
            self.emit(None, Opcode::Return, 0, 0);
            let end = self.code.len();

            self.infos.push(LambdaInfo {
                name: data.name.clone(),
                args: ArgSpec::fixed_names(&data.params, data.rest),
                start,
                end,
                captures: data.captures,
                loc: data.loc.clone(),
            });
            idx += 1;
        }
        Ok(())
    }

    /// Resolve label operands of branch instructions to absolute
    /// instruction indices. `Label` records stay behind as no-ops.
    fn link(&mut self) {
        let mut targets = std::collections::HashMap::new();
        for (idx, instr) in self.code.iter().enumerate() {
            if matches!(instr.op, Opcode::Label) {
                targets.insert(instr.i, idx as i32);
            }
        }
        for instr in &mut self.code {
            if matches!(instr.op, Opcode::If | Opcode::IfNot | Opcode::Jmp) {
                match targets.get(&instr.i) {
                    Some(target) => instr.i = *target,
                    None => panic!("link: unresolved label {}", instr.i),
                }
            }
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Opcode;

    fn compile_code(text: &str) -> Rc<CompiledCode> {
        let mut symbols = SymbolTable::new();
        let thunk = compile(&mut symbols, "test", text).unwrap();
        match &thunk {
            Value::Lambda(l) => match &l.kind {
                LambdaKind::Compiled { code, .. } => code.clone(),
                LambdaKind::Native(_) => panic!("expected compiled lambda"),
            },
            other => panic!("expected lambda, got {other}"),
        }
    }

    fn ops(code: &CompiledCode) -> Vec<Opcode> {
        code.instrs.iter().map(|i| i.op).collect()
    }

    #[test]
    fn test_constant_emission() {
        let code = compile_code("42");
        assert_eq!(ops(&code), vec![Opcode::Const, Opcode::Return]);
    }

    #[test]
    fn test_call_protocol_shape() {
        // The trailing constant keeps the call out of tail position.
        let code = compile_code("(f 1 2) 99");
        // Global f; PushF; PushS 2; Const/LocalSet per argument; Call.
        let expected = vec![
            Opcode::Global,
            Opcode::PushF,
            Opcode::PushS,
            Opcode::Const,
            Opcode::LocalSet,
            Opcode::Const,
            Opcode::LocalSet,
            Opcode::Call,
            Opcode::Const,
            Opcode::Return,
        ];
        assert_eq!(ops(&code), expected);

        let call = &code.instrs[7];
        assert_eq!(call.i, 2, "argc operand");
        assert_eq!(call.j, 0, "call is not in tail position");
    }

    #[test]
    fn test_toplevel_last_call_is_tail() {
        let code = compile_code("(f) (g)");
        let calls: Vec<&Instr> = code
            .instrs
            .iter()
            .filter(|i| matches!(i.op, Opcode::Call))
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].j, 0, "first toplevel call is not in tail position");
        assert_eq!(calls[1].j, 1, "last toplevel form is in tail position");
    }

    #[test]
    fn test_lambda_table_and_recursive_tail_call() {
        let code = compile_code("(define (f n) (f n))");
        assert_eq!(code.lambdas.len(), 1);
        let info = &code.lambdas[0];
        assert_eq!(info.name.as_deref(), Some("f"));
        assert_eq!(info.args.min, 1);
        assert_eq!(info.args.max, 1);
        assert!(!info.captures);

        // The body's self-call is a tail call.
        let body = &code.instrs[info.start..info.end];
        let call = body
            .iter()
            .find(|i| matches!(i.op, Opcode::Call))
            .expect("body should contain a call");
        assert_eq!(call.j, 1, "self call in tail position");
        assert!(
            matches!(body.last().map(|i| i.op), Some(Opcode::Return)),
            "lambda body must end in Return"
        );
    }

    #[test]
    fn test_captured_let_scope_uses_heap_frame() {
        let code = compile_code("(let ((x 0)) (lambda () x))");
        // The let scope is captured by the inner lambda: PushS with the
        // captures operand set.
        let push = code
            .instrs
            .iter()
            .find(|i| matches!(i.op, Opcode::PushS))
            .expect("let should push a scope");
        assert_eq!(push.i, 1);
        assert_eq!(push.j, 1, "captured scope allocates a heap frame");

        // The lambda body reads the variable through the env chain.
        let info = &code.lambdas[0];
        assert!(info.captures);
        let body = &code.instrs[info.start..info.end];
        assert!(
            body.iter().any(|i| matches!(i.op, Opcode::Env)),
            "captured variable read via Env"
        );
    }

    #[test]
    fn test_uncaptured_let_scope_stays_on_stack() {
        let code = compile_code("(let ((x 1)) x)");
        let push = code
            .instrs
            .iter()
            .find(|i| matches!(i.op, Opcode::PushS))
            .expect("let should push a scope");
        assert_eq!(push.j, 0, "uncaptured scope stays on the stack");
        assert!(code.instrs.iter().any(|i| matches!(i.op, Opcode::Local)));
        assert!(
            code.instrs.iter().any(|i| matches!(i.op, Opcode::PopS)),
            "non-tail let pops its scope"
        );
    }

    #[test]
    fn test_captured_parameters_unpack_into_env_frame() {
        let code = compile_code("(define (adder n) (lambda (x) (+ x n)))");
        assert_eq!(code.lambdas.len(), 2);
        let outer = &code.lambdas[0];
        let body = &code.instrs[outer.start..outer.end];
        // Argument unpacking prologue: heap scope plus Local/EnvSet moves.
        assert!(
            matches!(body[0].op, Opcode::PushS) && body[0].j == 1,
            "captured parameter frame is heap allocated"
        );
        assert!(matches!(body[1].op, Opcode::Local));
        assert!(matches!(body[2].op, Opcode::EnvSet));
    }

    #[test]
    fn test_branches_link_to_labels() {
        let code = compile_code("(if (f) 1 2)");
        for instr in &code.instrs {
            if matches!(instr.op, Opcode::If | Opcode::IfNot | Opcode::Jmp) {
                let target = instr.i as usize;
                assert!(target < code.instrs.len(), "branch target in range");
                assert!(
                    matches!(code.instrs[target].op, Opcode::Label),
                    "branch lands on a label"
                );
            }
        }
    }

    #[test]
    fn test_and_or_empty_forms() {
        let code = compile_code("(and)");
        assert!(matches!(&code.instrs[0].v, Some(Value::Boolean(true))));
        let code = compile_code("(or)");
        assert!(matches!(&code.instrs[0].v, Some(Value::Boolean(false))));
    }

    #[test]
    fn test_if_constant_folding() {
        let code = compile_code("(if #t 1 (f))");
        // The false branch is folded away entirely.
        assert_eq!(ops(&code), vec![Opcode::Const, Opcode::Return]);

        let code = compile_code("(if #f (f) 2)");
        assert_eq!(ops(&code), vec![Opcode::Const, Opcode::Return]);
    }

    #[test]
    fn test_apply_emits_adapter() {
        let code = compile_code("(apply f '(1 2))");
        let ops = ops(&code);
        assert!(ops.contains(&Opcode::PushA));
        let call = code
            .instrs
            .iter()
            .find(|i| matches!(i.op, Opcode::Call))
            .expect("apply should emit a call");
        assert_eq!(call.i, -1, "argument count taken from the stack");
    }

    #[test]
    fn test_tail_let_skips_pop() {
        let code = compile_code("(define (f) (let ((x 1)) x))");
        let info = &code.lambdas[0];
        let body = &code.instrs[info.start..info.end];
        assert!(
            !body.iter().any(|i| matches!(i.op, Opcode::PopS)),
            "tail-position let leaves its scope for Return to reclaim"
        );
    }

    #[test]
    fn test_compile_errors() {
        let mut symbols = SymbolTable::new();
        let cases = vec![
            "()",
            "(define)",
            "(define 3 4)",
            "(lambda (x))",
            "(lambda (x x) x)",
            "(if 1 2 3 4)",
            "(set! 3 4)",
            "(let ((x)) x)",
            "(cond)",
            "(cond (else 1) (#t 2))",
            "(quote a b)",
            "(apply f)",
            "(a . b)",
        ];
        for case in cases {
            assert!(
                compile(&mut symbols, "test", case).is_err(),
                "expected compile error for {case}"
            );
        }
    }

    #[test]
    fn test_set_resolves_to_binding_kind() {
        // Local set! uses LocalSet; global set! uses GlobalSet.
        let code = compile_code("(let ((x 1)) (set! x 2) x)");
        assert!(code.instrs.iter().any(|i| matches!(i.op, Opcode::LocalSet)));

        let code = compile_code("(define g 1) (set! g 2)");
        assert!(
            code.instrs
                .iter()
                .any(|i| matches!(i.op, Opcode::GlobalSet))
        );
    }
}
