//! The datum reader.
//!
//! Turns source text into located S-expressions. The reader understands
//! booleans, exact integers in the `#b`/`#o`/`#d`/`#x` radices (with
//! bignum fallback for literals that overflow `i64`), characters,
//! strings with the usual escapes, symbols, proper and dotted lists,
//! `'` quote shorthand, `#(...)` vector and `#vu8(...)` bytevector
//! literals, and `;` line comments.
//!
//! Each S-expression carries its byte offset into the source; the
//! compiler converts offsets into line numbers with [`LineIndex`].

use std::cell::RefCell;
use std::rc::Rc;

use nom::{
    IResult, Parser,
    character::complete::char,
    error::{Error as NomError, ErrorKind},
};
use num_bigint::BigInt;

use crate::MAX_PARSE_DEPTH;
use crate::number::Number;
use crate::value::Value;
use crate::{ParseError, ParseErrorKind, SourceLoc};

/// Characters allowed in symbol names besides alphanumerics. Covers the
/// usual operator identifiers plus `:` for library-qualified names like
/// `scheme::load`.
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$:&^~%";

/// A located S-expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Sexpr {
    pub offset: usize,
    pub kind: SexprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SexprKind {
    /// Self-evaluating atom: boolean, number, character, string or
    /// bytevector literal.
    Atom(Value),
    Symbol(String),
    List(Vec<Sexpr>),
    /// `(a b . c)`
    Dotted(Vec<Sexpr>, Box<Sexpr>),
    /// `#(a b c)`
    Vector(Vec<Sexpr>),
}

impl Sexpr {
    fn new(offset: usize, kind: SexprKind) -> Sexpr {
        Sexpr { offset, kind }
    }
}

/// Maps byte offsets to 1-based line numbers.
pub struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    pub fn new(input: &str) -> LineIndex {
        LineIndex {
            newlines: input
                .char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(i, _)| i)
                .collect(),
        }
    }

    pub fn line(&self, offset: usize) -> u32 {
        (self.newlines.partition_point(|&n| n < offset) + 1) as u32
    }
}

struct Ctx {
    len: usize,
}

impl Ctx {
    fn offset(&self, input: &str) -> usize {
        self.len - input.len()
    }
}

/// Check if a string is a valid symbol name: non-empty, not starting
/// with a digit, no `+digit`/`-digit` prefix (those are numbers).
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => false,
        Some(first) => {
            if first.is_ascii_digit() {
                return false;
            }
            if (first == '-' || first == '+')
                && let Some(second) = chars.next()
                && second.is_ascii_digit()
            {
                return false;
            }
            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

fn skip_ws(mut input: &str) -> &str {
    loop {
        let trimmed = input.trim_start();
        if let Some(rest) = trimmed.strip_prefix(';') {
            match rest.find('\n') {
                Some(i) => input = &rest[i + 1..],
                None => return "",
            }
        } else {
            return trimmed;
        }
    }
}

fn at_delimiter(input: &str) -> bool {
    match input.chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '\''),
    }
}

fn fail<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(NomError::new(input, kind)))
}

fn parse_decimal(input: &str) -> IResult<&str, Value> {
    let mut end = 0;
    let bytes = input.as_bytes();
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return fail(input, ErrorKind::Digit);
    }
    let (text, rest) = input.split_at(end);
    if !at_delimiter(rest) {
        return fail(input, ErrorKind::Digit);
    }
    let number = match text.parse::<i64>() {
        Ok(n) => Number::from_i64(n),
        Err(_) => match BigInt::parse_bytes(text.as_bytes(), 10) {
            Some(b) => Number::from_bigint(b),
            None => return fail(input, ErrorKind::Digit),
        },
    };
    Ok((rest, Value::Number(number)))
}

fn parse_radix(input: &str, radix: u32) -> IResult<&str, Value> {
    let mut end = 0;
    let bytes = input.as_bytes();
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && (bytes[end] as char).is_digit(radix) {
        end += 1;
    }
    if end == digits_start {
        return fail(input, ErrorKind::Digit);
    }
    let (text, rest) = input.split_at(end);
    if !at_delimiter(rest) {
        return fail(input, ErrorKind::Digit);
    }
    let number = match i64::from_str_radix(text, radix) {
        Ok(n) => Number::from_i64(n).with_base(radix),
        Err(_) => match BigInt::parse_bytes(text.as_bytes(), radix) {
            Some(b) => Number::from_bigint(b).with_base(radix),
            None => return fail(input, ErrorKind::Digit),
        },
    };
    Ok((rest, Value::Number(number)))
}

fn parse_string_literal(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut iter = remaining.chars();
        match iter.next() {
            Some('"') => {
                return Ok((
                    iter.as_str(),
                    Value::String(Rc::new(RefCell::new(chars))),
                ));
            }
            Some('\\') => {
                match iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('a') => chars.push('\x07'),
                    Some('b') => chars.push('\x08'),
                    Some('v') => chars.push('\x0b'),
                    Some('f') => chars.push('\x0c'),
                    Some('0') => chars.push('\0'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    _ => return fail(remaining, ErrorKind::Char),
                }
                remaining = iter.as_str();
            }
            Some(c) => {
                chars.push(c);
                remaining = iter.as_str();
            }
            None => return fail(remaining, ErrorKind::Char),
        }
    }
}

fn parse_character(input: &str) -> IResult<&str, Value> {
    // Input starts after the "#\" prefix.
    let named_end = input
        .char_indices()
        .find(|(_, c)| !c.is_alphanumeric())
        .map(|(i, _)| i)
        .unwrap_or(input.len());

    if named_end == 0 {
        // Punctuation character like #\( or #\space-less input.
        return match input.chars().next() {
            Some(c) => Ok((&input[c.len_utf8()..], Value::Char(c))),
            None => fail(input, ErrorKind::Char),
        };
    }

    let (name, rest) = input.split_at(named_end);
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('\0');
    if name.chars().count() == 1 {
        return Ok((rest, Value::Char(first)));
    }

    if (first == 'x' || first == 'X') && name[1..].chars().all(|c| c.is_ascii_hexdigit()) {
        let code = u32::from_str_radix(&name[1..], 16).map_err(|_| {
            nom::Err::Error(NomError::new(input, ErrorKind::HexDigit))
        })?;
        return match char::from_u32(code) {
            Some(c) => Ok((rest, Value::Char(c))),
            None => fail(input, ErrorKind::HexDigit),
        };
    }

    let c = match name {
        "space" => ' ',
        "newline" | "linefeed" => '\n',
        "tab" => '\t',
        "return" => '\r',
        "nul" => '\0',
        "delete" => '\x7f',
        "alarm" => '\x07',
        "backspace" => '\x08',
        _ => return fail(input, ErrorKind::Char),
    };
    Ok((rest, Value::Char(c)))
}

fn parse_symbol(input: &str) -> IResult<&str, String> {
    let end = input
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(*c)))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    if end == 0 {
        return fail(input, ErrorKind::Alpha);
    }
    let (candidate, rest) = input.split_at(end);
    if is_valid_symbol(candidate) {
        Ok((rest, candidate.to_string()))
    } else {
        fail(input, ErrorKind::Alpha)
    }
}

fn parse_bytevector(input: &str) -> IResult<&str, Value> {
    // Input starts after the "#vu8(" prefix.
    let mut input = input;
    let mut bytes = Vec::new();
    loop {
        input = skip_ws(input);
        if let Some(rest) = input.strip_prefix(')') {
            return Ok((rest, Value::Bytevector(Rc::new(RefCell::new(bytes)))));
        }
        let (rest, value) = parse_decimal(input)?;
        let byte = match value {
            Value::Number(n) => match n.as_i64() {
                Some(b) if (0..=255).contains(&b) => b as u8,
                _ => return fail(input, ErrorKind::Digit),
            },
            _ => return fail(input, ErrorKind::Digit),
        };
        bytes.push(byte);
        input = rest;
    }
}

fn parse_hash<'a>(ctx: &Ctx, input: &'a str, depth: usize) -> IResult<&'a str, Sexpr> {
    let offset = ctx.offset(input);
    let body = &input[1..]; // past '#'

    if let Some(rest) = body.strip_prefix('\\') {
        let (rest, c) = parse_character(rest)?;
        return Ok((rest, Sexpr::new(offset, SexprKind::Atom(c))));
    }
    if let Some(rest) = body.strip_prefix("vu8(") {
        let (rest, bv) = parse_bytevector(rest)?;
        return Ok((rest, Sexpr::new(offset, SexprKind::Atom(bv))));
    }
    if let Some(rest) = body.strip_prefix('(') {
        let (rest, items) = parse_items_until_close(ctx, rest, depth)?;
        return Ok((rest, Sexpr::new(offset, SexprKind::Vector(items))));
    }
    match body.chars().next() {
        Some('t') if at_delimiter(&body[1..]) => Ok((
            &body[1..],
            Sexpr::new(offset, SexprKind::Atom(Value::Boolean(true))),
        )),
        Some('f') if at_delimiter(&body[1..]) => Ok((
            &body[1..],
            Sexpr::new(offset, SexprKind::Atom(Value::Boolean(false))),
        )),
        Some('b') | Some('B') => {
            let (rest, v) = parse_radix(&body[1..], 2)?;
            Ok((rest, Sexpr::new(offset, SexprKind::Atom(v))))
        }
        Some('o') | Some('O') => {
            let (rest, v) = parse_radix(&body[1..], 8)?;
            Ok((rest, Sexpr::new(offset, SexprKind::Atom(v))))
        }
        Some('d') | Some('D') => {
            let (rest, v) = parse_radix(&body[1..], 10)?;
            Ok((rest, Sexpr::new(offset, SexprKind::Atom(v))))
        }
        Some('x') | Some('X') => {
            let (rest, v) = parse_radix(&body[1..], 16)?;
            Ok((rest, Sexpr::new(offset, SexprKind::Atom(v))))
        }
        _ => fail(input, ErrorKind::Tag),
    }
}

/// Parse datums until a closing paren; shared by vectors and the plain
/// list parser body.
fn parse_items_until_close<'a>(
    ctx: &Ctx,
    mut input: &'a str,
    depth: usize,
) -> IResult<&'a str, Vec<Sexpr>> {
    let mut items = Vec::new();
    loop {
        input = skip_ws(input);
        if let Some(rest) = input.strip_prefix(')') {
            return Ok((rest, items));
        }
        if input.is_empty() {
            return fail(input, ErrorKind::Eof);
        }
        let (rest, item) = parse_sexpr(ctx, input, depth + 1)?;
        items.push(item);
        input = rest;
    }
}

fn parse_list<'a>(ctx: &Ctx, input: &'a str, depth: usize) -> IResult<&'a str, Sexpr> {
    let offset = ctx.offset(input);
    let (mut input, _) = char('(').parse(input)?;
    let mut items = Vec::new();
    loop {
        input = skip_ws(input);
        if let Some(rest) = input.strip_prefix(')') {
            return Ok((rest, Sexpr::new(offset, SexprKind::List(items))));
        }
        // A lone dot introduces the tail of a dotted pair.
        if !items.is_empty()
            && input.starts_with('.')
            && at_delimiter(&input[1..])
        {
            let (rest, tail) = parse_sexpr(ctx, &input[1..], depth + 1)?;
            let rest = skip_ws(rest);
            let (rest, _) = char(')').parse(rest)?;
            return Ok((
                rest,
                Sexpr::new(offset, SexprKind::Dotted(items, Box::new(tail))),
            ));
        }
        if input.is_empty() {
            return fail(input, ErrorKind::Eof);
        }
        let (rest, item) = parse_sexpr(ctx, input, depth + 1)?;
        items.push(item);
        input = rest;
    }
}

fn parse_quote<'a>(ctx: &Ctx, input: &'a str, depth: usize) -> IResult<&'a str, Sexpr> {
    let offset = ctx.offset(input);
    let (input, _) = char('\'').parse(input)?;
    let (rest, datum) = parse_sexpr(ctx, input, depth + 1)?;
    Ok((
        rest,
        Sexpr::new(
            offset,
            SexprKind::List(vec![
                Sexpr::new(offset, SexprKind::Symbol("quote".to_string())),
                datum,
            ]),
        ),
    ))
}

fn parse_sexpr<'a>(ctx: &Ctx, input: &'a str, depth: usize) -> IResult<&'a str, Sexpr> {
    if depth >= MAX_PARSE_DEPTH {
        return fail(input, ErrorKind::TooLarge);
    }
    let input = skip_ws(input);
    let offset = ctx.offset(input);

    match input.chars().next() {
        None => fail(input, ErrorKind::Eof),
        Some('(') => parse_list(ctx, input, depth),
        Some('\'') => parse_quote(ctx, input, depth),
        Some('"') => {
            let (rest, s) = parse_string_literal(input)?;
            Ok((rest, Sexpr::new(offset, SexprKind::Atom(s))))
        }
        Some('#') => parse_hash(ctx, input, depth),
        Some(c) if c.is_ascii_digit() => {
            let (rest, n) = parse_decimal(input)?;
            Ok((rest, Sexpr::new(offset, SexprKind::Atom(n))))
        }
        Some('+') | Some('-') => {
            // Could be a number or an operator symbol.
            if let Ok((rest, n)) = parse_decimal(input) {
                return Ok((rest, Sexpr::new(offset, SexprKind::Atom(n))));
            }
            let (rest, name) = parse_symbol(input)?;
            Ok((rest, Sexpr::new(offset, SexprKind::Symbol(name))))
        }
        Some(_) => {
            let (rest, name) = parse_symbol(input)?;
            Ok((rest, Sexpr::new(offset, SexprKind::Symbol(name))))
        }
    }
}

fn error_message(kind: ErrorKind) -> (ParseErrorKind, &'static str) {
    match kind {
        ErrorKind::TooLarge => (
            ParseErrorKind::TooDeeplyNested,
            "expression too deeply nested",
        ),
        ErrorKind::Eof => (ParseErrorKind::Incomplete, "unexpected end of input"),
        ErrorKind::Char => (ParseErrorKind::Incomplete, "unterminated literal"),
        _ => (ParseErrorKind::InvalidSyntax, "invalid syntax"),
    }
}

/// Parse all datums of a source unit.
pub fn parse_program(source_name: &str, input: &str) -> Result<Vec<Sexpr>, ParseError> {
    let ctx = Ctx { len: input.len() };
    let lines = LineIndex::new(input);
    let source: Rc<str> = Rc::from(source_name);

    let mut datums = Vec::new();
    let mut remaining = skip_ws(input);
    while !remaining.is_empty() {
        match parse_sexpr(&ctx, remaining, 0) {
            Ok((rest, datum)) => {
                datums.push(datum);
                remaining = skip_ws(rest);
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let offset = ctx.offset(e.input);
                let (kind, message) = error_message(e.code);
                return Err(ParseError::new(kind, message)
                    .with_loc(SourceLoc::new(source.clone(), lines.line(offset)))
                    .with_context(input, offset));
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(ParseError::new(
                    ParseErrorKind::Incomplete,
                    "incomplete input",
                ));
            }
        }
    }
    Ok(datums)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Expected outcomes for the data-driven reader tests.
    enum ParseResult {
        Atom(Value),
        Symbol(&'static str),
        /// A list whose rendering through the datum printer matches.
        Rendered(&'static str),
        Error,
    }
    use ParseResult::*;

    fn num(v: i64) -> Value {
        Value::Number(Number::from_i64(v))
    }

    /// Render an S-expression back to text for structural checks.
    fn render(sx: &Sexpr) -> String {
        match &sx.kind {
            SexprKind::Atom(v) => v.write_string(),
            SexprKind::Symbol(s) => s.clone(),
            SexprKind::List(items) => {
                let inner: Vec<String> = items.iter().map(render).collect();
                format!("({})", inner.join(" "))
            }
            SexprKind::Dotted(items, tail) => {
                let inner: Vec<String> = items.iter().map(render).collect();
                format!("({} . {})", inner.join(" "), render(tail))
            }
            SexprKind::Vector(items) => {
                let inner: Vec<String> = items.iter().map(render).collect();
                format!("#({})", inner.join(" "))
            }
        }
    }

    fn run_parse_tests(cases: Vec<(&str, ParseResult)>) {
        for (i, (input, expected)) in cases.into_iter().enumerate() {
            let id = format!("reader test #{}", i + 1);
            let result = parse_program("test", input);
            match (result, expected) {
                (Ok(datums), Atom(value)) => {
                    assert_eq!(datums.len(), 1, "{id}: expected one datum");
                    match &datums[0].kind {
                        SexprKind::Atom(v) => assert!(
                            v.is_equal(&value),
                            "{id}: expected {value}, got {v}"
                        ),
                        other => panic!("{id}: expected atom, got {other:?}"),
                    }
                }
                (Ok(datums), Symbol(name)) => {
                    assert_eq!(datums.len(), 1, "{id}: expected one datum");
                    assert_eq!(
                        datums[0].kind,
                        SexprKind::Symbol(name.to_string()),
                        "{id}"
                    );
                }
                (Ok(datums), Rendered(text)) => {
                    assert_eq!(datums.len(), 1, "{id}: expected one datum");
                    assert_eq!(render(&datums[0]), text, "{id}");
                }
                (Err(_), Error) => {}
                (Ok(datums), Error) => {
                    panic!("{id}: expected error, got {datums:?}");
                }
                (Err(e), _) => panic!("{id}: unexpected error {e:?}"),
            }
        }
    }

    #[test]
    fn test_reader_comprehensive() {
        let cases = vec![
            // Numbers
            ("42", Atom(num(42))),
            ("-5", Atom(num(-5))),
            ("+7", Atom(num(7))),
            ("0", Atom(num(0))),
            ("9223372036854775807", Atom(num(i64::MAX))),
            ("-9223372036854775808", Atom(num(i64::MIN))),
            ("#x1A", Atom(num(26))),
            ("#X1a", Atom(num(26))),
            ("#b101", Atom(num(5))),
            ("#o17", Atom(num(15))),
            ("#d42", Atom(num(42))),
            ("#x-ff", Atom(num(-255))),
            ("3.14", Error),
            ("#xG", Error),
            ("#x", Error),
            ("123abc", Error),
            // Booleans
            ("#t", Atom(Value::Boolean(true))),
            ("#f", Atom(Value::Boolean(false))),
            ("#true", Error),
            // Characters
            ("#\\a", Atom(Value::Char('a'))),
            ("#\\space", Atom(Value::Char(' '))),
            ("#\\newline", Atom(Value::Char('\n'))),
            ("#\\tab", Atom(Value::Char('\t'))),
            ("#\\(", Atom(Value::Char('('))),
            ("#\\x41", Atom(Value::Char('A'))),
            ("#\\x3bb", Atom(Value::Char('λ'))),
            ("#\\bogus", Error),
            // Strings
            (r#""hello""#, Atom(Value::String(Rc::new(RefCell::new("hello".into()))))),
            (r#""a\nb""#, Atom(Value::String(Rc::new(RefCell::new("a\nb".into()))))),
            (r#""q\"q""#, Atom(Value::String(Rc::new(RefCell::new("q\"q".into()))))),
            (r#""αβγ""#, Atom(Value::String(Rc::new(RefCell::new("αβγ".into()))))),
            (r#""unterminated"#, Error),
            (r#""bad\zescape""#, Error),
            // Symbols
            ("foo", Symbol("foo")),
            ("+", Symbol("+")),
            ("-", Symbol("-")),
            (">=", Symbol(">=")),
            ("list->vector", Symbol("list->vector")),
            ("scheme::init-library", Symbol("scheme::init-library")),
            ("string-length", Symbol("string-length")),
            ("even?", Symbol("even?")),
            ("set!", Symbol("set!")),
            ("-abc", Symbol("-abc")),
            ("-42abc", Error),
            // Lists
            ("()", Rendered("()")),
            ("(1 2 3)", Rendered("(1 2 3)")),
            ("( 1   2\t\n3 )", Rendered("(1 2 3)")),
            ("(+ 1 (- 2 3))", Rendered("(+ 1 (- 2 3))")),
            ("(a . b)", Rendered("(a . b)")),
            ("(a b . c)", Rendered("(a b . c)")),
            ("(lambda (a . rest) rest)", Rendered("(lambda (a . rest) rest)")),
            ("(1 2", Error),
            (")", Error),
            ("(. b)", Error),
            // Quote shorthand
            ("'foo", Rendered("(quote foo)")),
            ("'(1 2)", Rendered("(quote (1 2))")),
            ("''x", Rendered("(quote (quote x))")),
            ("'()", Rendered("(quote ())")),
            // Vectors and bytevectors
            ("#(1 2 3)", Rendered("#(1 2 3)")),
            ("#()", Rendered("#()")),
            ("#(a \"b\")", Rendered("#(a \"b\")")),
            ("#vu8(1 2 255)", Atom(Value::Bytevector(Rc::new(RefCell::new(vec![1, 2, 255]))))),
            ("#vu8()", Atom(Value::Bytevector(Rc::new(RefCell::new(vec![]))))),
            ("#vu8(256)", Error),
            ("#vu8(-1)", Error),
            // Comments
            ("; comment\n42", Atom(num(42))),
            ("42 ; trailing", Atom(num(42))),
            ("(1 ; inner\n 2)", Rendered("(1 2)")),
        ];
        run_parse_tests(cases);
    }

    #[test]
    fn test_atom_print_read_round_trip() {
        // Printing a datum and reading it back preserves equal?.
        let inputs = vec![
            "42",
            "-7",
            "#xff",
            "#b101",
            "#t",
            "#f",
            "#\\a",
            "#\\space",
            "#\\x3bb",
            "\"a\\nb \\\"q\\\"\"",
            "#vu8(0 127 255)",
        ];
        for input in inputs {
            let datums = parse_program("test", input).unwrap();
            let SexprKind::Atom(value) = &datums[0].kind else {
                panic!("expected atom for {input}");
            };
            let written = value.write_string();
            let reparsed = parse_program("test", &written)
                .unwrap_or_else(|e| panic!("reparse of '{written}' failed: {e:?}"));
            let SexprKind::Atom(again) = &reparsed[0].kind else {
                panic!("expected atom after round trip of {input}");
            };
            assert!(
                value.is_equal(again),
                "round trip changed {input}: {value} vs {again}"
            );
        }
    }

    #[test]
    fn test_reader_bignum_literals() {
        let datums = parse_program("test", "99999999999999999999").unwrap();
        match &datums[0].kind {
            SexprKind::Atom(Value::Number(n)) => {
                assert!(n.as_i64().is_none());
                assert_eq!(n.to_radix_string(10), "99999999999999999999");
            }
            other => panic!("expected bignum, got {other:?}"),
        }
    }

    #[test]
    fn test_reader_multiple_datums_and_lines() {
        let source = "(define x 1)\n(define y 2)\nx\n";
        let datums = parse_program("test", source).unwrap();
        assert_eq!(datums.len(), 3);

        let lines = LineIndex::new(source);
        assert_eq!(lines.line(datums[0].offset), 1);
        assert_eq!(lines.line(datums[1].offset), 2);
        assert_eq!(lines.line(datums[2].offset), 3);
    }

    #[test]
    fn test_reader_depth_limit() {
        let deep = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH + 1),
            ")".repeat(MAX_PARSE_DEPTH + 1)
        );
        let err = parse_program("test", &deep).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);

        let ok = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH - 1),
            ")".repeat(MAX_PARSE_DEPTH - 1)
        );
        assert!(parse_program("test", &ok).is_ok());
    }

    #[test]
    fn test_reader_error_location() {
        let err = parse_program("demo.scm", "(+ 1\n   3.14)").unwrap_err();
        let loc = err.loc.expect("error should carry a location");
        assert_eq!(&*loc.source, "demo.scm");
        assert_eq!(loc.line, 2);
        assert!(err.context.is_some());
    }
}
