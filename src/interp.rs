//! The embedder API.
//!
//! [`Interp`] owns the symbol table, the value stack and the VM
//! registers. Construction registers the native builtin groups and,
//! unless disabled, loads the bundled Scheme runtime. After the runtime
//! is loaded, user programs are compiled into a thunk and dispatched
//! through the runtime's `scheme::init-library` entry; without a
//! runtime the thunk runs directly.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use crate::builtins;
use crate::compiler;
use crate::symbols::{Flags, SymbolTable};
use crate::types::{self, Kind, Type};
use crate::value::{
    ArgSpec, EnvRef, Lambda, LambdaKind, NativeFn, Port, TypedName, Value, list_from_vec,
};
use crate::vm::{CompiledCode, Frame};
use crate::{Error, RuntimeError};

/// Configuration parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Params {
    /// Verbose output: print compiled bytecode before execution.
    pub verbose: bool,
    /// Suppress warnings.
    pub quiet: bool,
    /// Skip loading the Scheme-implemented runtime during construction.
    pub no_runtime: bool,
    /// Do not warn when redefining global symbols.
    pub no_warn_define: bool,
}

/// Declaration of a native builtin. The argument declarations use the
/// naming-convention grammar of [`types::parse_arg`]; registration
/// stamps the derived arity and type descriptors into the global
/// symbol.
pub struct Builtin {
    pub name: &'static str,
    pub args: &'static [&'static str],
    pub ret: Type,
    pub native: NativeFn,
    pub flags: Flags,
    pub aliases: &'static [&'static str],
}

impl Builtin {
    pub fn new(
        name: &'static str,
        args: &'static [&'static str],
        ret: Type,
        native: NativeFn,
    ) -> Builtin {
        Builtin {
            name,
            args,
            ret,
            native,
            flags: Flags::empty(),
            aliases: &[],
        }
    }

    pub fn with_aliases(mut self, aliases: &'static [&'static str]) -> Builtin {
        self.aliases = aliases;
        self
    }
}

/// The bundled runtime sources, resolved at build time.
const RUNTIME_SOURCES: &[(&str, &str)] = &[
    ("runtime/base.scm", include_str!("../runtime/base.scm")),
    ("runtime/list.scm", include_str!("../runtime/list.scm")),
];

/// A Scheme interpreter and its virtual machine.
pub struct Interp {
    pub params: Params,
    pub(crate) symbols: SymbolTable,
    pub(crate) stack: Vec<Value>,
    pub(crate) fp: usize,
    pub(crate) pc: usize,
    pub(crate) accu: Value,
    pub(crate) env: Vec<EnvRef>,
    pub(crate) code: Rc<CompiledCode>,
    pub(crate) stdout: Rc<Port>,
    pub(crate) stderr: Rc<Port>,
    pub(crate) has_runtime: bool,
}

impl Interp {
    /// Create an interpreter with default parameters.
    pub fn new() -> Result<Interp, Error> {
        Interp::new_with(Params::default())
    }

    /// Create an interpreter with the given parameters.
    pub fn new_with(params: Params) -> Result<Interp, Error> {
        let mut interp = Interp {
            params,
            symbols: SymbolTable::new(),
            stack: Vec::new(),
            fp: 0,
            pc: 0,
            accu: Value::Unspecified,
            env: Vec::new(),
            code: Rc::new(CompiledCode::empty()),
            stdout: Rc::new(Port::stdout()),
            stderr: Rc::new(Port::stderr()),
            has_runtime: false,
        };

        interp.define_builtins(builtins::boolean::builtins());
        interp.define_builtins(builtins::chars::builtins());
        interp.define_builtins(builtins::chars::unicode_builtins());
        interp.define_builtins(builtins::debug::builtins());
        interp.define_builtins(builtins::files::builtins());
        interp.define_builtins(builtins::io::builtins());
        interp.define_builtins(builtins::lists::builtins());
        interp.define_builtins(builtins::lists::mutable_pair_builtins());
        interp.define_builtins(builtins::load::builtins());
        interp.define_builtins(builtins::numbers::builtins());
        interp.define_builtins(builtins::procedures::builtins());
        interp.define_builtins(builtins::programs::builtins());
        interp.define_builtins(builtins::strings::builtins());
        interp.define_builtins(builtins::strings::mutable_string_builtins());
        interp.define_builtins(builtins::symbols::builtins());
        interp.define_builtins(builtins::vectors::builtins());
        interp.define_builtins(builtins::bytevectors::builtins());

        if !interp.params.no_runtime {
            interp.load_runtime()?;
        }

        Ok(interp)
    }

    fn load_runtime(&mut self) -> Result<(), Error> {
        for (name, text) in RUNTIME_SOURCES {
            self.eval_str(name, text)?;
        }
        self.has_runtime = true;
        Ok(())
    }

    /// Register a group of native builtins.
    pub fn define_builtins(&mut self, group: Vec<Builtin>) {
        for builtin in group {
            self.define_builtin(builtin);
        }
    }

    /// Register one native builtin: parse its argument declarations,
    /// derive the arity and type descriptor, and bind the global
    /// symbol (and any aliases).
    pub fn define_builtin(&mut self, builtin: Builtin) {
        let mut min = 0;
        let mut max = 0;
        let mut rest = false;
        let mut fixed = Vec::with_capacity(builtin.args.len());

        for arg in builtin.args {
            let (typ, name, kind) = match types::parse_arg(arg) {
                Ok(parsed) => parsed,
                Err(err) => panic!("builtin {}: {err}", builtin.name),
            };
            fixed.push(TypedName { name, typ });
            max += 1;
            match kind {
                Kind::Fixed => min += 1,
                Kind::Optional => {}
                Kind::Rest => rest = true,
            }
        }
        if rest {
            max = usize::MAX;
        }
        let args = ArgSpec {
            min,
            max,
            fixed,
            rest,
        };

        self.install_native(builtin.name, &args, &builtin.ret, builtin.native, builtin.flags);
        for alias in builtin.aliases {
            self.install_native(alias, &args, &builtin.ret, builtin.native, builtin.flags);
        }
    }

    fn install_native(
        &mut self,
        name: &str,
        args: &ArgSpec,
        ret: &Type,
        native: NativeFn,
        flags: Flags,
    ) {
        let lambda = Rc::new(Lambda {
            name: Some(name.to_string()),
            args: args.clone(),
            ret: ret.clone(),
            kind: LambdaKind::Native(native),
        });
        let sym = self.symbols.intern(name);
        let mut id = sym.borrow_mut();
        id.global_type = Some(lambda.type_of());
        id.global = Some(Value::Lambda(lambda));
        id.flags.insert(Flags::DEFINED | flags);
    }

    /// Evaluate a Scheme source file.
    pub fn eval_file(&mut self, path: &str) -> Result<Value, Error> {
        let file = std::fs::File::open(path)?;
        self.eval(path, file)
    }

    /// Evaluate Scheme source read from `input`.
    pub fn eval<R: Read>(&mut self, source_name: &str, mut input: R) -> Result<Value, Error> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        self.eval_str(source_name, &text)
    }

    /// Evaluate Scheme source text.
    pub fn eval_str(&mut self, source_name: &str, text: &str) -> Result<Value, Error> {
        let thunk = compiler::compile(&mut self.symbols, source_name, text)?;

        if self.params.verbose
            && let Value::Lambda(lambda) = &thunk
            && let LambdaKind::Compiled { code, .. } = &lambda.kind
        {
            eprint!("{code}");
        }

        if self.has_runtime {
            let init = self.global("scheme::init-library")?;
            self.apply(init, &[thunk])
        } else {
            self.apply(thunk, &[])
        }
    }

    /// The global value of a symbol.
    pub fn global(&self, name: &str) -> Result<Value, Error> {
        match self.symbols.get(name) {
            Some(sym) => {
                let id = sym.borrow();
                match &id.global {
                    Some(value) if id.flags.contains(Flags::DEFINED) => Ok(value.clone()),
                    _ => Err(RuntimeError::unbound(name).into()),
                }
            }
            None => Err(RuntimeError::unbound(name).into()),
        }
    }

    /// Set the global value of a symbol; defines it when undefined.
    /// Fails on `Const` symbols.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), Error> {
        let sym = self.symbols.intern(name);
        let mut id = sym.borrow_mut();
        if id.flags.contains(Flags::CONST) {
            return Err(RuntimeError::const_violation(name).into());
        }
        id.flags.insert(Flags::DEFINED);
        id.global = Some(value);
        Ok(())
    }

    /// Intern a symbol name.
    pub fn intern(&mut self, name: &str) -> crate::symbols::SymbolRef {
        self.symbols.intern(name)
    }

    pub(crate) fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub(crate) fn stdout(&self) -> Rc<Port> {
        self.stdout.clone()
    }

    pub(crate) fn stderr(&self) -> Rc<Port> {
        self.stderr.clone()
    }

    /// Apply a function value to arguments. Compiled callees run in a
    /// nested VM loop with their own toplevel frame, so natives may
    /// re-enter the interpreter through this.
    pub fn apply(&mut self, func: Value, args: &[Value]) -> Result<Value, Error> {
        let lambda = match &func {
            Value::Lambda(l) => l.clone(),
            v => {
                return Err(Error::type_error(format!("apply: not a procedure: {v}")));
            }
        };
        let name = lambda.name.clone();
        let who = name.as_deref().unwrap_or("lambda");
        lambda.args.validate(who, args.len())?;

        match &lambda.kind {
            LambdaKind::Native(native) => native(self, args),
            LambdaKind::Compiled { code, start, env, .. } => {
                let saved_pc = self.pc;
                let saved_fp = self.fp;
                let saved_sp = self.stack.len();
                let saved_code = self.code.clone();
                let saved_env = self.env.clone();

                let frame = Frame {
                    next: saved_fp,
                    pc: saved_pc,
                    lambda: lambda.clone(),
                    toplevel: true,
                    code: saved_code.clone(),
                    env: saved_env.clone(),
                };
                self.fp = self.stack.len();
                self.stack.push(Value::Frame(Rc::new(RefCell::new(frame))));
                for arg in args {
                    self.stack.push(arg.clone());
                }
                if lambda.args.rest {
                    let rest: Vec<Value> = self.stack.split_off(self.fp + 1 + lambda.args.min);
                    self.stack.push(list_from_vec(rest));
                }

                self.env = env.clone();
                self.code = code.clone();
                self.pc = *start;

                let result = self.execute();
                if result.is_err() {
                    // Unwind so the interpreter stays usable after a
                    // runtime error.
                    self.stack.truncate(saved_sp);
                    self.fp = saved_fp;
                    self.pc = saved_pc;
                    self.code = saved_code;
                    self.env = saved_env;
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;

    /// Expected outcome of one evaluation.
    enum TestResult {
        /// The result's written form matches.
        Written(&'static str),
        /// Evaluation fails with an error containing this text.
        SpecificError(&'static str),
        /// Evaluation fails with any error.
        AnyError,
    }
    use TestResult::*;

    fn test_interp() -> Interp {
        Interp::new_with(Params {
            no_warn_define: true,
            ..Params::default()
        })
        .unwrap()
    }

    fn execute_case(interp: &mut Interp, input: &str, expected: &TestResult, id: &str) {
        let result = interp.eval_str("test", input);
        match (result, expected) {
            (Ok(value), Written(text)) => {
                assert_eq!(value.write_string(), *text, "{id}: {input}");
            }
            (Err(_), AnyError) => {}
            (Err(err), SpecificError(text)) => {
                let message = format!("{err}");
                assert!(
                    message.contains(text),
                    "{id}: {input}: error should contain '{text}', got: {message}"
                );
            }
            (Ok(value), AnyError) => {
                panic!("{id}: {input}: expected error, got {value}");
            }
            (Ok(value), SpecificError(text)) => {
                panic!("{id}: {input}: expected error containing '{text}', got {value}");
            }
            (Err(err), Written(text)) => {
                panic!("{id}: {input}: expected {text}, got error: {err}");
            }
        }
        assert!(
            interp.stack.is_empty(),
            "{id}: {input}: value stack not empty after evaluation"
        );
        assert_eq!(interp.fp, 0, "{id}: {input}: frame pointer not reset");
    }

    /// Each case runs in a fresh interpreter.
    fn run_cases(cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in cases.iter().enumerate() {
            let mut interp = test_interp();
            execute_case(&mut interp, input, expected, &format!("#{}", i + 1));
        }
    }

    /// Each group shares one interpreter, so definitions persist.
    fn run_grouped_cases(groups: Vec<Vec<(&str, TestResult)>>) {
        for (g, group) in groups.iter().enumerate() {
            let mut interp = test_interp();
            for (i, (input, expected)) in group.iter().enumerate() {
                let id = format!("group #{} case #{}", g + 1, i + 1);
                execute_case(&mut interp, input, expected, &id);
            }
        }
    }

    #[test]
    fn test_self_evaluating_and_quote() {
        run_cases(vec![
            ("42", Written("42")),
            ("-271", Written("-271")),
            ("#t", Written("#t")),
            ("#f", Written("#f")),
            ("\"hello\"", Written("\"hello\"")),
            ("#\\a", Written("#\\a")),
            ("#x2a", Written("#x2a")),
            ("'foo", Written("foo")),
            ("'(1 2 3)", Written("(1 2 3)")),
            ("'(a . b)", Written("(a . b)")),
            ("''x", Written("(quote x)")),
            ("'()", Written("()")),
            ("#(1 2 3)", Written("#(1 2 3)")),
            ("#vu8(1 2 3)", Written("#vu8(1 2 3)")),
            ("()", AnyError),
        ]);
    }

    #[test]
    fn test_arithmetic_scenarios() {
        run_cases(vec![
            // S1
            ("(+ 1 2 3)", Written("6")),
            ("(+)", Written("0")),
            ("(*)", Written("1")),
            ("(* 2 3 4)", Written("24")),
            ("(- 10 3 2)", Written("5")),
            ("(- 10)", Written("-10")),
            ("(+ (* 2 3) (- 8 2))", Written("12")),
            // Bigint promotion on overflow.
            ("(+ 9223372036854775807 1)", Written("9223372036854775808")),
            ("(* 4611686018427387904 2)", Written("9223372036854775808")),
            ("(- -9223372036854775808)", Written("9223372036854775808")),
            ("(- (+ 9223372036854775807 1) 1)", Written("9223372036854775807")),
            // Comparisons chain.
            ("(= 5 5)", Written("#t")),
            ("(= 5 5 5)", Written("#t")),
            ("(= 5 5 6)", Written("#f")),
            ("(< 1 2 3)", Written("#t")),
            ("(< 1 3 2)", Written("#f")),
            ("(>= 3 3 2)", Written("#t")),
            ("(quotient 7 2)", Written("3")),
            ("(remainder 7 2)", Written("1")),
            ("(modulo -7 3)", Written("2")),
            ("(quotient 1 0)", SpecificError("division by zero")),
            ("(abs -5)", Written("5")),
            ("(min 3 1 2)", Written("1")),
            ("(max 3 1 2)", Written("3")),
            ("(expt 2 10)", Written("1024")),
            ("(expt 2 100)", Written("1267650600228229401496703205376")),
            ("(number->string 255 16)", Written("\"ff\"")),
            ("(string->number \"ff\" 16)", Written("255")),
            ("(string->number \"bogus\")", Written("#f")),
            // Type errors.
            ("(+ 1 \"x\")", SpecificError("+")),
            ("(< 1 #t)", AnyError),
        ]);
    }

    #[test]
    fn test_factorial_scenario() {
        // S2: global recursion through the define'd name.
        run_grouped_cases(vec![vec![
            (
                "(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))",
                Written("#<lambda fact>"),
            ),
            ("(fact 10)", Written("3628800")),
            // Promotes to bignums transparently.
            (
                "(fact 25)",
                Written("15511210043330985984000000"),
            ),
        ]]);
    }

    #[test]
    fn test_named_let_tail_loop() {
        // S3: a million tail calls must run in constant frame space.
        run_cases(vec![(
            "(let loop ((i 0) (acc 0)) (if (= i 1000000) acc (loop (+ i 1) (+ acc i))))",
            Written("499999500000"),
        )]);
    }

    #[test]
    fn test_deep_mutual_tail_recursion() {
        // P7 in mutual form: alternating tail calls stay in constant
        // space.
        run_grouped_cases(vec![vec![
            (
                "(define (even-n? n) (if (= n 0) #t (odd-n? (- n 1))))",
                Written("#<lambda even-n?>"),
            ),
            (
                "(define (odd-n? n) (if (= n 0) #f (even-n? (- n 1))))",
                Written("#<lambda odd-n?>"),
            ),
            ("(even-n? 200001)", Written("#f")),
        ]]);
    }

    #[test]
    fn test_closure_counter_scenario() {
        // S4: closure over a captured, mutated binding.
        run_grouped_cases(vec![vec![
            (
                "(define c (let ((x 0)) (lambda () (set! x (+ x 1)) x)))",
                Written("#<lambda>"),
            ),
            ("(c)", Written("1")),
            ("(c)", Written("2")),
            ("(c)", Written("3")),
        ]]);
    }

    #[test]
    fn test_apply_scenarios() {
        // S5 and friends.
        run_cases(vec![
            ("(apply + '(1 2 3 4))", Written("10")),
            ("(apply + 1 2 '(3 4))", Written("10")),
            ("(apply list '())", Written("()")),
            ("(apply cons '(1 2))", Written("(1 . 2)")),
            ("(apply + 1)", SpecificError("apply")),
            // The procedure value itself also works through the native.
            ("((lambda (f) (apply f '(2 3))) *)", Written("6")),
        ]);
    }

    #[test]
    fn test_case_scenario() {
        run_cases(vec![
            // S6
            (
                "(case 2 ((1 3) 'odd) ((2 4) 'even) (else 'other))",
                Written("even"),
            ),
            (
                "(case 9 ((1 3) 'odd) ((2 4) 'even) (else 'other))",
                Written("other"),
            ),
            (
                "(case (* 2 3) ((2 3 5 7) 'prime) ((1 4 6 8 9) 'composite))",
                Written("composite"),
            ),
            ("(case 'a ((a) 1) ((b) 2))", Written("1")),
        ]);
    }

    #[test]
    fn test_string_scenarios() {
        run_cases(vec![
            // S7: Unicode scalar count, not byte count.
            ("(string-length \"αβγ\")", Written("3")),
            ("(string-length \"\")", Written("0")),
            // S8
            ("(substring \"hello\" 1 4)", Written("\"ell\"")),
            ("(substring \"αβγδ\" 1 3)", Written("\"βγ\"")),
            ("(substring \"hi\" 0 5)", AnyError),
            ("(string-append \"foo\" \"bar\" \"baz\")", Written("\"foobarbaz\"")),
            ("(string-append)", Written("\"\"")),
            ("(string-ref \"abc\" 1)", Written("#\\b")),
            ("(string=? \"a\" \"a\")", Written("#t")),
            ("(string<? \"a\" \"b\")", Written("#t")),
            ("(string->symbol \"hello\")", Written("hello")),
            ("(symbol->string 'hello)", Written("\"hello\"")),
            ("(string->list \"ab\")", Written("(#\\a #\\b)")),
            ("(list->string '(#\\a #\\b))", Written("\"ab\"")),
            ("(string-length 42)", SpecificError("string-length")),
        ]);
    }

    #[test]
    fn test_conditionals() {
        run_cases(vec![
            // P9: only #f is false.
            ("(if #f 'a 'b)", Written("b")),
            ("(if #t 'a 'b)", Written("a")),
            ("(if 0 'a 'b)", Written("a")),
            ("(if '() 'a 'b)", Written("a")),
            ("(if \"\" 'a 'b)", Written("a")),
            ("(if (> 5 3) \"yes\" \"no\")", Written("\"yes\"")),
            // P10: empty and/or identities and short-circuiting.
            ("(and)", Written("#t")),
            ("(or)", Written("#f")),
            ("(and 1 2 3)", Written("3")),
            ("(and 1 #f 3)", Written("#f")),
            ("(and #f undefined-variable)", Written("#f")),
            ("(or #f #f 2)", Written("2")),
            ("(or 1 undefined-variable)", Written("1")),
            ("(or #f #f)", Written("#f")),
            // cond
            ("(cond (#t 1))", Written("1")),
            ("(cond (#f 1) (else 2))", Written("2")),
            ("(cond (#f 1) (#t 2) (else 3))", Written("2")),
            ("(cond (42))", Written("42")),
            ("(cond (#f 1))", Written("#f")),
            // P11: => binds the matched value and calls once.
            ("(cond ((+ 1 2) => (lambda (x) (* x 10))) (else 'no))", Written("30")),
            ("(cond (#f => (lambda (x) x)) (else 'no))", Written("no")),
        ]);
    }

    #[test]
    fn test_let_forms() {
        run_cases(vec![
            ("(let ((x 1) (y 2)) (+ x y))", Written("3")),
            ("(let ((x 1)) (let ((x 2) (y x)) (+ x y)))", Written("3")),
            ("(let* ((x 1) (y (+ x 1))) (+ x y))", Written("3")),
            (
                "(letrec ((even-n? (lambda (n) (if (= n 0) #t (odd-n? (- n 1))))) (odd-n? (lambda (n) (if (= n 0) #f (even-n? (- n 1)))))) (even-n? 10))",
                Written("#t"),
            ),
            ("(let ((x 5)) (set! x 6) x)", Written("6")),
            // Scopes nest and unwind.
            ("(+ (let ((x 1)) x) (let ((x 2)) x))", Written("3")),
        ]);
    }

    #[test]
    fn test_lambda_and_closures() {
        run_cases(vec![
            ("((lambda (x) (* x x)) 4)", Written("16")),
            ("((lambda () 42))", Written("42")),
            ("((lambda (a . rest) rest) 1 2 3)", Written("(2 3)")),
            ("((lambda (a . rest) rest) 1)", Written("()")),
            ("((lambda args args) 1 2)", Written("(1 2)")),
            ("(((lambda (x) (lambda (y) (+ x y))) 10) 5)", Written("15")),
            ("((lambda (x) x))", SpecificError("too few arguments")),
            ("((lambda (x) x) 1 2)", SpecificError("too many arguments")),
            ("(1 2 3)", SpecificError("invalid function")),
        ]);
        run_grouped_cases(vec![vec![
            (
                "(define (make-adder n) (lambda (x) (+ x n)))",
                Written("#<lambda make-adder>"),
            ),
            ("(define add5 (make-adder 5))", Written("#<lambda>")),
            ("(add5 3)", Written("8")),
            ("(add5 30)", Written("35")),
            // A second closure gets its own environment.
            ("((make-adder 100) 1)", Written("101")),
        ]]);
    }

    #[test]
    fn test_equality_predicates() {
        // P8: eq? refines eqv? refines equal?.
        run_cases(vec![
            ("(eq? 'a 'a)", Written("#t")),
            ("(eq? '() '())", Written("#t")),
            ("(eq? \"a\" \"a\")", Written("#f")),
            ("(eqv? 10 10)", Written("#t")),
            ("(eqv? #\\a #\\a)", Written("#t")),
            ("(eqv? 10 \"10\")", Written("#f")),
            ("(equal? \"abc\" \"abc\")", Written("#t")),
            ("(equal? '(1 (2 3)) '(1 (2 3)))", Written("#t")),
            ("(equal? '(1 2) '(1 3))", Written("#f")),
            ("(equal? #(1 2) #(1 2))", Written("#t")),
            ("(let ((x '(a))) (eq? x x))", Written("#t")),
        ]);
    }

    #[test]
    fn test_list_builtins() {
        run_cases(vec![
            ("(cons 1 2)", Written("(1 . 2)")),
            ("(cons 1 '(2 3))", Written("(1 2 3)")),
            ("(car '(1 2))", Written("1")),
            ("(cdr '(1 2))", Written("(2)")),
            ("(car '())", SpecificError("car")),
            ("(list 1 2 3)", Written("(1 2 3)")),
            ("(list)", Written("()")),
            ("(length '(1 2 3))", Written("3")),
            ("(length '())", Written("0")),
            ("(append '(1 2) '(3) '())", Written("(1 2 3)")),
            ("(reverse '(1 2 3))", Written("(3 2 1)")),
            ("(list-tail '(1 2 3) 1)", Written("(2 3)")),
            ("(list-ref '(1 2 3) 2)", Written("3")),
            ("(null? '())", Written("#t")),
            ("(null? '(1))", Written("#f")),
            ("(pair? '(1))", Written("#t")),
            ("(pair? '())", Written("#f")),
            ("(list? '(1 2))", Written("#t")),
            ("(list? '(1 . 2))", Written("#f")),
            ("(let ((p (cons 1 2))) (set-car! p 9) p)", Written("(9 . 2)")),
            ("(let ((p (cons 1 2))) (set-cdr! p '()) p)", Written("(1)")),
        ]);
    }

    #[test]
    fn test_vector_builtins() {
        run_cases(vec![
            ("(vector 1 2 3)", Written("#(1 2 3)")),
            ("(make-vector 2 'x)", Written("#(x x)")),
            ("(vector-length #(1 2))", Written("2")),
            ("(vector-ref #(1 2) 1)", Written("2")),
            ("(vector-ref #(1 2) 5)", SpecificError("vector-ref")),
            ("(let ((v (make-vector 2 0))) (vector-set! v 0 9) v)", Written("#(9 0)")),
            ("(vector->list #(1 2))", Written("(1 2)")),
            ("(list->vector '(1 2))", Written("#(1 2)")),
            ("(let ((v (make-vector 3 0))) (vector-fill! v 7) v)", Written("#(7 7 7)")),
        ]);
    }

    #[test]
    fn test_bytevector_builtins() {
        run_cases(vec![
            ("(bytevector? #vu8(1))", Written("#t")),
            ("(bytevector? \"no\")", Written("#f")),
            ("(make-bytevector 3 7)", Written("#vu8(7 7 7)")),
            ("(make-bytevector 2)", Written("#vu8(0 0)")),
            ("(make-bytevector 2 -1)", Written("#vu8(255 255)")),
            ("(make-bytevector 2 256)", SpecificError("invalid fill")),
            ("(bytevector-length #vu8(1 2 3))", Written("3")),
            ("(bytevector=? #vu8(1 2) #vu8(1 2))", Written("#t")),
            ("(bytevector=? #vu8(1 2) #vu8(2 1))", Written("#f")),
            ("(bytevector-u8-ref #vu8(0 129) 1)", Written("129")),
            ("(bytevector-s8-ref #vu8(0 129) 1)", Written("-127")),
            ("(bytevector-u8-ref #vu8(1) 5)", SpecificError("invalid index")),
            (
                "(let ((bv (make-bytevector 3 0))) (bytevector-fill! bv 9) bv)",
                Written("#vu8(9 9 9)"),
            ),
            ("(bytevector-copy #vu8(1 2 3))", Written("#vu8(1 2 3)")),
            (
                "(let ((s #vu8(1 2 3 4)) (t (make-bytevector 4 0))) (bytevector-copy! s 1 t 0 2) t)",
                Written("#vu8(2 3 0 0)"),
            ),
            (
                "(bytevector-copy! #vu8(1) 0 (make-bytevector 1 0) 0 2)",
                SpecificError("invalid source range"),
            ),
        ]);
    }

    #[test]
    fn test_char_builtins() {
        run_cases(vec![
            ("(char? #\\a)", Written("#t")),
            ("(char->integer #\\A)", Written("65")),
            ("(integer->char 955)", Written("#\\λ")),
            ("(char=? #\\a #\\a)", Written("#t")),
            ("(char<? #\\a #\\b)", Written("#t")),
            ("(char-upcase #\\a)", Written("#\\A")),
            ("(char-downcase #\\A)", Written("#\\a")),
            ("(char-alphabetic? #\\x)", Written("#t")),
            ("(char-numeric? #\\5)", Written("#t")),
            ("(char-whitespace? #\\space)", Written("#t")),
            ("(string-upcase \"abc\")", Written("\"ABC\"")),
            ("(string-downcase \"ABC\")", Written("\"abc\"")),
        ]);
    }

    #[test]
    fn test_runtime_library() {
        // Derived procedures implemented in the bundled Scheme runtime.
        run_cases(vec![
            ("(cadr '(1 2 3))", Written("2")),
            ("(caar '((1 2) 3))", Written("1")),
            ("(cddr '(1 2 3))", Written("(3)")),
            ("(memq 'c '(a b c d))", Written("(c d)")),
            ("(memq 'q '(a b))", Written("#f")),
            ("(member \"b\" '(\"a\" \"b\"))", Written("(\"b\")")),
            ("(assq 'b '((a 1) (b 2)))", Written("(b 2)")),
            ("(assv 2 '((1 one) (2 two)))", Written("(2 two)")),
            ("(map (lambda (x) (* x x)) '(1 2 3))", Written("(1 4 9)")),
            ("(for-each (lambda (x) x) '(1 2))", Written("#f")),
            ("(list-copy '(1 2 3))", Written("(1 2 3)")),
        ]);
    }

    #[test]
    fn test_string_mutation() {
        run_cases(vec![
            (
                "(let ((s (make-string 3 #\\a))) (string-set! s 1 #\\b) s)",
                Written("\"aba\""),
            ),
            (
                "(let ((s (make-string 2 #\\x))) (string-fill! s #\\y) s)",
                Written("\"yy\""),
            ),
            ("(make-string 3 #\\z)", Written("\"zzz\"")),
            ("(string-set! (make-string 1 #\\a) 5 #\\b)", SpecificError("string-set!")),
        ]);
    }

    #[test]
    fn test_error_taxonomy() {
        run_cases(vec![
            // Unbound globals.
            ("undefined-variable", SpecificError("unbound symbol")),
            ("(set! undefined-variable 1)", SpecificError("unbound symbol")),
            // Type errors from primitives.
            ("(car 42)", SpecificError("car")),
            ("(vector-ref '(1) 0)", SpecificError("vector-ref")),
            // Arity errors.
            ("(cons 1)", SpecificError("too few arguments")),
            ("(cons 1 2 3)", SpecificError("too many arguments")),
            // Domain errors.
            ("(integer->char -1)", SpecificError("integer->char")),
            // The error builtin.
            ("(error \"boom\" 1 2)", SpecificError("boom")),
        ]);
    }

    #[test]
    fn test_const_flag_blocks_redefinition() {
        let mut interp = test_interp();
        let sym = interp.intern("locked");
        sym.borrow_mut().global = Some(Value::Boolean(true));
        sym.borrow_mut().flags.insert(Flags::DEFINED | Flags::CONST);

        let err = interp.eval_str("test", "(define locked 2)").unwrap_err();
        assert!(format!("{err}").contains("constant"));
        let err = interp.eval_str("test", "(set! locked 2)").unwrap_err();
        assert!(format!("{err}").contains("constant"));
        assert!(interp.set_global("locked", Value::Null).is_err());
    }

    #[test]
    fn test_embedder_api() {
        let mut interp = test_interp();

        // P3: define then read back through the embedder API.
        interp.eval_str("test", "(define x 42)").unwrap();
        let x = interp.global("x").unwrap();
        assert_eq!(x.write_string(), "42");

        interp
            .set_global("injected", Value::Number(Number::from_i64(7)))
            .unwrap();
        let v = interp.eval_str("test", "(+ injected 1)").unwrap();
        assert_eq!(v.write_string(), "8");

        // apply on a compiled function value.
        interp
            .eval_str("test", "(define (double n) (* n 2))")
            .unwrap();
        let double = interp.global("double").unwrap();
        let result = interp
            .apply(double, &[Value::Number(Number::from_i64(21))])
            .unwrap();
        assert_eq!(result.write_string(), "42");

        // apply on a native function value.
        let plus = interp.global("+").unwrap();
        let result = interp
            .apply(
                plus,
                &[
                    Value::Number(Number::from_i64(1)),
                    Value::Number(Number::from_i64(2)),
                ],
            )
            .unwrap();
        assert_eq!(result.write_string(), "3");

        assert!(interp.global("missing").is_err());
    }

    #[test]
    fn test_define_builtin_and_reentry() {
        // A custom native that re-enters the VM through apply.
        fn call_twice(interp: &mut Interp, args: &[Value]) -> Result<Value, Error> {
            let f = args[0].clone();
            let once = interp.apply(f.clone(), &args[1..])?;
            interp.apply(f, &[once])
        }

        let mut interp = test_interp();
        interp.define_builtin(Builtin::new(
            "call-twice",
            &["proc", "obj"],
            Type::any(),
            call_twice,
        ));

        let v = interp
            .eval_str("test", "(call-twice (lambda (x) (* x 3)) 2)")
            .unwrap();
        assert_eq!(v.write_string(), "18");
        assert!(interp.stack.is_empty());
    }

    #[test]
    fn test_builtin_aliases() {
        let mut interp = test_interp();
        fn nothing(_: &mut Interp, _: &[Value]) -> Result<Value, Error> {
            Ok(Value::Unspecified)
        }
        interp.define_builtin(
            Builtin::new("original-name", &[], Type::any(), nothing)
                .with_aliases(&["alias-name"]),
        );
        assert!(interp.global("original-name").is_ok());
        assert!(interp.global("alias-name").is_ok());
    }

    #[test]
    fn test_stack_trace_on_error() {
        let mut interp = test_interp();
        let err = interp
            .eval_str(
                "trace.scm",
                "(define (inner) (car 42))\n(define (outer) (inner))\n(outer)\n",
            )
            .unwrap_err();
        match err {
            Error::Runtime(e) => {
                let loc = e.loc.expect("runtime error should carry a location");
                assert_eq!(&*loc.source, "trace.scm");
                assert_eq!(loc.line, 1);
                assert!(!e.trace.is_empty(), "stack trace should not be empty");
            }
            other => panic!("expected runtime error, got {other}"),
        }
        // The interpreter survives the error.
        assert_eq!(
            interp.eval_str("test", "(+ 1 1)").unwrap().write_string(),
            "2"
        );
    }

    #[test]
    fn test_scheme_stack_trace_builtin() {
        let mut interp = test_interp();
        let v = interp
            .eval_str("t.scm", "(define (f) (scheme::stack-trace))\n(f)\n")
            .unwrap();
        // A proper list of (source . line) pairs.
        let items = crate::value::list_to_vec(&v).expect("trace should be a list");
        assert!(!items.is_empty());
        for item in items {
            match item {
                Value::Pair(p) => {
                    assert!(matches!(p.borrow().car, Value::String(_)));
                    assert!(matches!(p.borrow().cdr, Value::Number(_)));
                }
                other => panic!("expected pair, got {other}"),
            }
        }
    }

    #[test]
    fn test_no_runtime_mode() {
        let mut interp = Interp::new_with(Params {
            no_runtime: true,
            no_warn_define: true,
            ..Params::default()
        })
        .unwrap();
        // Core evaluation works without the runtime.
        assert_eq!(
            interp.eval_str("test", "(+ 1 2)").unwrap().write_string(),
            "3"
        );
        // Runtime-provided procedures are absent.
        assert!(interp.eval_str("test", "(cadr '(1 2))").is_err());
    }

    #[test]
    fn test_output_ports() {
        let mut interp = test_interp();
        let v = interp
            .eval_str(
                "test",
                "(let ((p (open-output-string)))\
                   (display \"x = \" p)\
                   (display 42 p)\
                   (newline p)\
                   (write \"quoted\" p)\
                   (get-output-string p))",
            )
            .unwrap();
        assert_eq!(v.display_string(), "x = 42\n\"quoted\"");
    }

    #[test]
    fn test_call_with_port_runtime() {
        let mut interp = test_interp();
        let v = interp
            .eval_str(
                "test",
                "(define p (open-output-string))\
                 (call-with-port p (lambda (port) (display \"done\" port) 'ok))",
            )
            .unwrap();
        assert_eq!(v.write_string(), "ok");
        // The port is closed after its dynamic extent.
        assert!(
            interp
                .eval_str("test", "(display \"more\" p)")
                .is_err()
        );
    }

    #[test]
    fn test_sequencing_and_begin() {
        run_cases(vec![
            ("(begin 1 2 3)", Written("3")),
            ("(begin (define t 1) (set! t (+ t 1)) t)", Written("2")),
        ]);
    }

    #[test]
    fn test_disassemble_and_print_env_run() {
        // Smoke tests: these print through the stdout port and must not
        // fail.
        let mut interp = test_interp();
        interp
            .eval_str("test", "(define (f x) (+ x 1)) (disassemble f)")
            .unwrap();
        interp.eval_str("test", "(disassemble car)").unwrap();
        interp.eval_str("test", "(disassemble 42)").unwrap();
        interp.eval_str("test", "(print-env 'native)").unwrap();
    }
}
