//! Interactive read-eval-print loop.
//!
//! Run with `cargo run --example repl`. Supports a few meta commands
//! besides plain evaluation: `:help`, `:env`, `:dis <expr>` and
//! `:quit`.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemex::{Interp, Params, Value};

fn main() {
    let mut interp = match Interp::new_with(Params {
        no_warn_define: true,
        ..Params::default()
    }) {
        Ok(interp) => interp,
        Err(e) => {
            eprintln!("failed to initialize interpreter: {e}");
            std::process::exit(1);
        }
    };

    println!("schemex - an R6RS-leaning Scheme");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for commands, Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("could not initialize line editor: {e}");
            std::process::exit(1);
        }
    };

    loop {
        match rl.readline("schemex> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        run(&mut interp, "(print-env)");
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                if let Some(expr) = line.strip_prefix(":dis ") {
                    run(&mut interp, &format!("(disassemble {expr})"));
                    continue;
                }

                run(&mut interp, line);
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("error: {e:?}");
                break;
            }
        }
    }
}

fn run(interp: &mut Interp, line: &str) {
    match interp.eval_str("repl", line) {
        Ok(value) => {
            if !matches!(value, Value::Unspecified) {
                println!("{value}");
            }
        }
        Err(e) => println!("error: {e}"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help       - show this help");
    println!("  :env        - list global symbols");
    println!("  :dis <expr> - disassemble the value of an expression");
    println!("  :quit       - exit");
    println!();
    println!("Examples:");
    println!("  (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    println!("  (fact 20)");
    println!("  (let loop ((i 0)) (if (< i 3) (loop (+ i 1)) 'done))");
    println!("  :dis fact");
}
