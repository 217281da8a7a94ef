//! A tiny JavaScript-flavoured evaluator for the mock backend.
//!
//! This is a simulation aid, not a sandbox: it understands just enough of the
//! language for REPL demos and tests to produce realistic event streams.
//!
//! Supported: `let`/`const`/`var` declarations, assignment, number/string/
//! boolean/null/undefined literals, array and object literals, arithmetic,
//! comparison and logical operators, member and index access, `.length`,
//! `console.log/info/warn/error`, `JSON.stringify`, a few `Math` helpers,
//! `String(..)`/`Number(..)`, and `throw` (including `throw new Error(..)`).
//! Statements are separated by `;` or newlines; `//` starts a comment.

use std::collections::HashMap;
use std::fmt;

use serde_json::{json, Map, Value};

use vmsync_core::EventType;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Val>),
    Object(Vec<(String, Val)>),
}

impl Val {
    fn truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            Val::Array(_) | Val::Object(_) => true,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Val::Undefined => f64::NAN,
            Val::Null => 0.0,
            Val::Bool(b) => f64::from(u8::from(*b)),
            Val::Num(n) => *n,
            Val::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Val::Array(_) | Val::Object(_) => f64::NAN,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Undefined => "undefined",
            Val::Null | Val::Array(_) | Val::Object(_) => "object",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
        }
    }

    /// JSON projection. Integral numbers stay integers; NaN and infinities
    /// become `null` like `JSON.stringify` does.
    pub fn to_json(&self) -> Value {
        match self {
            Val::Undefined | Val::Null => Value::Null,
            Val::Bool(b) => Value::Bool(*b),
            Val::Num(n) => number_json(*n),
            Val::Str(s) => Value::String(s.clone()),
            Val::Array(items) => Value::Array(items.iter().map(Val::to_json).collect()),
            Val::Object(fields) => {
                let mut map = Map::new();
                for (k, v) in fields {
                    if *v != Val::Undefined {
                        map.insert(k.clone(), v.to_json());
                    }
                }
                Value::Object(map)
            }
        }
    }

    /// REPL-style preview: strings are quoted.
    pub fn preview(&self) -> String {
        match self {
            Val::Str(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }
}

fn number_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        json!(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// `console.log` rendering: strings are printed raw at the top level.
impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Undefined => f.write_str("undefined"),
            Val::Null => f.write_str("null"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Num(n) => f.write_str(&format_number(*n)),
            Val::Str(s) => f.write_str(s),
            Val::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.preview())?;
                }
                f.write_str("]")
            }
            Val::Object(fields) => {
                if fields.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v.preview())?;
                }
                f.write_str(" }")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// One event the evaluator wants recorded, before sequencing.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub event_type: EventType,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// `input_echo` first, then console output, then `value` or `exception`.
    pub events: Vec<Emitted>,
    /// The `value` payload of the final expression statement, if any.
    pub result: Option<Value>,
    /// The exception message, if evaluation threw.
    pub error: Option<String>,
}

/// A thrown value or an evaluator failure.
#[derive(Debug, Clone, PartialEq)]
struct Thrown {
    message: String,
}

impl Thrown {
    fn new(kind: &str, message: impl fmt::Display) -> Self {
        Thrown {
            message: format!("{}: {}", kind, message),
        }
    }

    fn from_value(value: &Val) -> Self {
        let message = match value {
            Val::Object(fields) => fields
                .iter()
                .find(|(k, _)| k == "message")
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| value.to_string()),
            other => other.to_string(),
        };
        Thrown { message }
    }
}

/// Evaluates `input` and returns the events it produced.
pub fn evaluate(input: &str) -> Outcome {
    let mut events = vec![Emitted {
        event_type: EventType::InputEcho,
        payload: json!({ "text": input }),
    }];

    let program = match Parser::new(input).and_then(|mut p| p.parse_program()) {
        Ok(program) => program,
        Err(thrown) => {
            events.push(exception(&thrown.message));
            return Outcome {
                events,
                result: None,
                error: Some(thrown.message),
            };
        }
    };

    let mut interp = Interpreter::default();
    match interp.run(&program) {
        Ok(last) => {
            events.append(&mut interp.console);
            let result = last.map(|v| {
                json!({
                    "type": v.type_name(),
                    "preview": v.preview(),
                    "json": v.to_json(),
                })
            });
            if let Some(payload) = &result {
                events.push(Emitted {
                    event_type: EventType::Value,
                    payload: payload.clone(),
                });
            }
            Outcome {
                events,
                result,
                error: None,
            }
        }
        Err(thrown) => {
            events.append(&mut interp.console);
            events.push(exception(&thrown.message));
            Outcome {
                events,
                result: None,
                error: Some(thrown.message),
            }
        }
    }
}

/// Deepest expression nesting the parser accepts and the interpreter walks.
const MAX_DEPTH: usize = 256;

fn too_deep() -> Thrown {
    Thrown::new("RangeError", "maximum nesting depth exceeded")
}

fn exception(message: &str) -> Emitted {
    Emitted {
        event_type: EventType::Exception,
        payload: json!({ "message": message }),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Newline,
}

const PUNCTS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "(", ")", "[", "]", "{", "}", ",",
    ";", ":", ".", "+", "-", "*", "/", "%", "=", "<", ">", "!",
];

fn lex(src: &str) -> Result<Vec<Tok>, Thrown> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            toks.push(Tok::Newline);
            i += 1;
        } else if c.is_whitespace() {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| Thrown::new("SyntaxError", format!("invalid number {}", text)))?;
            toks.push(Tok::Num(n));
        } else if c == '"' || c == '\'' || c == '`' {
            let quote = c;
            i += 1;
            let mut s = String::new();
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(Thrown::new("SyntaxError", "unterminated string literal"));
                };
                i += 1;
                if ch == quote {
                    break;
                }
                if ch == '\\' {
                    let Some(&esc) = chars.get(i) else {
                        return Err(Thrown::new("SyntaxError", "unterminated string literal"));
                    };
                    i += 1;
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                } else {
                    s.push(ch);
                }
            }
            toks.push(Tok::Str(s));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            toks.push(Tok::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let Some(p) = PUNCTS.iter().find(|p| rest.starts_with(**p)) else {
                return Err(Thrown::new("SyntaxError", format!("unexpected character '{}'", c)));
            };
            toks.push(Tok::Punct(*p));
            i += p.len();
        }
    }
    Ok(toks)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lit(Val),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    New(String, Vec<Expr>),
    Assign(String, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Stmt {
    Decl { name: String, constant: bool, init: Option<Expr> },
    Throw(Expr),
    Expr(Expr),
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    /// Bracket depth; newlines are insignificant inside brackets.
    nesting: usize,
    /// Expression depth, bounded by [`MAX_DEPTH`].
    depth: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, Thrown> {
        Ok(Parser {
            toks: lex(src)?,
            pos: 0,
            nesting: 0,
            depth: 0,
        })
    }

    fn enter(&mut self) -> Result<(), Thrown> {
        if self.depth >= MAX_DEPTH {
            return Err(too_deep());
        }
        self.depth += 1;
        Ok(())
    }

    fn skip_newlines(&mut self) {
        while self.toks.get(self.pos) == Some(&Tok::Newline) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<&Tok> {
        if self.nesting > 0 {
            self.skip_newlines();
        }
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        self.peek();
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_punct(&mut self, p: &str) -> bool {
        matches!(self.peek(), Some(Tok::Punct(q)) if *q == p)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), Thrown> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&mut self) -> Thrown {
        match self.peek().cloned() {
            Some(Tok::Num(n)) => Thrown::new("SyntaxError", format!("unexpected number {}", n)),
            Some(Tok::Str(_)) => Thrown::new("SyntaxError", "unexpected string"),
            Some(Tok::Ident(name)) => {
                Thrown::new("SyntaxError", format!("unexpected identifier '{}'", name))
            }
            Some(Tok::Punct(p)) => Thrown::new("SyntaxError", format!("unexpected token '{}'", p)),
            Some(Tok::Newline) => Thrown::new("SyntaxError", "unexpected line break"),
            None => Thrown::new("SyntaxError", "unexpected end of input"),
        }
    }

    fn ident(&mut self) -> Result<String, Thrown> {
        match self.peek().cloned() {
            Some(Tok::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, Thrown> {
        let mut stmts = Vec::new();
        loop {
            while matches!(self.toks.get(self.pos), Some(Tok::Newline) | Some(Tok::Punct(";"))) {
                self.pos += 1;
            }
            if self.pos >= self.toks.len() {
                return Ok(stmts);
            }
            stmts.push(self.parse_statement()?);
            match self.toks.get(self.pos) {
                None | Some(Tok::Newline) | Some(Tok::Punct(";")) => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, Thrown> {
        if let Some(Tok::Ident(word)) = self.peek().cloned() {
            match word.as_str() {
                "let" | "const" | "var" => {
                    self.pos += 1;
                    let name = self.ident()?;
                    let init = if self.eat_punct("=") {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    let constant = word == "const";
                    if constant && init.is_none() {
                        return Err(Thrown::new(
                            "SyntaxError",
                            "missing initializer in const declaration",
                        ));
                    }
                    return Ok(Stmt::Decl { name, constant, init });
                }
                "throw" => {
                    self.pos += 1;
                    return Ok(Stmt::Throw(self.parse_expr()?));
                }
                _ => {}
            }
        }
        Ok(Stmt::Expr(self.parse_expr()?))
    }

    fn parse_expr(&mut self) -> Result<Expr, Thrown> {
        self.enter()?;
        let expr = self.parse_assign();
        self.depth -= 1;
        expr
    }

    fn parse_assign(&mut self) -> Result<Expr, Thrown> {
        let lhs = self.parse_binary(0)?;
        if self.at_punct("=") {
            let Expr::Ident(name) = lhs else {
                return Err(Thrown::new("SyntaxError", "invalid assignment target"));
            };
            self.pos += 1;
            let rhs = self.parse_expr()?;
            return Ok(Expr::Assign(name, Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn binary_op(&mut self) -> Option<(&'static str, u8)> {
        let Some(Tok::Punct(p)) = self.peek() else {
            return None;
        };
        let prec = match *p {
            "||" => 1,
            "&&" => 2,
            "==" | "!=" | "===" | "!==" => 3,
            "<" | ">" | "<=" | ">=" => 4,
            "+" | "-" => 5,
            "*" | "/" | "%" => 6,
            _ => return None,
        };
        Some((*p, prec))
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, Thrown> {
        let mut lhs = self.parse_unary()?;
        // Each link of a left-associative chain deepens the tree.
        let mut links = 0;
        let result = loop {
            let Some((op, prec)) = self.binary_op() else {
                break Ok(lhs);
            };
            if prec < min_prec {
                break Ok(lhs);
            }
            if let Err(e) = self.enter() {
                break Err(e);
            }
            links += 1;
            self.pos += 1;
            match self.parse_binary(prec + 1) {
                Ok(rhs) => lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
                Err(e) => break Err(e),
            }
        };
        self.depth -= links;
        result
    }

    fn parse_unary(&mut self) -> Result<Expr, Thrown> {
        self.enter()?;
        let expr = self.parse_prefixed();
        self.depth -= 1;
        expr
    }

    fn parse_prefixed(&mut self) -> Result<Expr, Thrown> {
        for op in ["-", "+", "!"] {
            if self.eat_punct(op) {
                let operand = self.parse_unary()?;
                return Ok(Expr::Unary(op, Box::new(operand)));
            }
        }
        if matches!(self.peek(), Some(Tok::Ident(w)) if w == "typeof") {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary("typeof", Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, Thrown> {
        self.nesting += 1;
        let mut args = Vec::new();
        while !self.at_punct(")") {
            args.push(self.parse_expr()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        let closed = self.expect_punct(")");
        self.nesting -= 1;
        closed.map(|_| args)
    }

    fn parse_postfix(&mut self) -> Result<Expr, Thrown> {
        let mut expr = self.parse_primary()?;
        let mut links = 0;
        let result = loop {
            if !matches!(self.peek(), Some(Tok::Punct("." | "[" | "("))) {
                break Ok(expr);
            }
            if let Err(e) = self.enter() {
                break Err(e);
            }
            links += 1;
            match self.postfix(expr) {
                Ok(next) => expr = next,
                Err(e) => break Err(e),
            }
        };
        self.depth -= links;
        result
    }

    /// Applies one `.name`, `[index]` or `(args)` suffix to `target`.
    fn postfix(&mut self, target: Expr) -> Result<Expr, Thrown> {
        if self.eat_punct(".") {
            let name = self.ident()?;
            Ok(Expr::Member(Box::new(target), name))
        } else if self.eat_punct("[") {
            self.nesting += 1;
            let index = self.parse_expr();
            let closed = self.expect_punct("]");
            self.nesting -= 1;
            closed?;
            Ok(Expr::Index(Box::new(target), Box::new(index?)))
        } else {
            self.expect_punct("(")?;
            let args = self.parse_args()?;
            Ok(Expr::Call(Box::new(target), args))
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Thrown> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(Expr::Lit(Val::Num(n))),
            Some(Tok::Str(s)) => Ok(Expr::Lit(Val::Str(s))),
            Some(Tok::Ident(word)) => Ok(match word.as_str() {
                "true" => Expr::Lit(Val::Bool(true)),
                "false" => Expr::Lit(Val::Bool(false)),
                "null" => Expr::Lit(Val::Null),
                "undefined" => Expr::Lit(Val::Undefined),
                "NaN" => Expr::Lit(Val::Num(f64::NAN)),
                "Infinity" => Expr::Lit(Val::Num(f64::INFINITY)),
                "new" => {
                    let class = self.ident()?;
                    let args = if self.eat_punct("(") {
                        self.parse_args()?
                    } else {
                        Vec::new()
                    };
                    Expr::New(class, args)
                }
                _ => Expr::Ident(word),
            }),
            Some(Tok::Punct("(")) => {
                self.nesting += 1;
                let inner = self.parse_expr();
                let closed = self.expect_punct(")");
                self.nesting -= 1;
                closed?;
                inner
            }
            Some(Tok::Punct("[")) => {
                self.nesting += 1;
                let mut items = Vec::new();
                let result = loop {
                    if self.eat_punct("]") {
                        break Ok(());
                    }
                    match self.parse_expr() {
                        Ok(item) => items.push(item),
                        Err(e) => break Err(e),
                    }
                    if !self.eat_punct(",") {
                        break self.expect_punct("]");
                    }
                };
                self.nesting -= 1;
                result.map(|_| Expr::Array(items))
            }
            Some(Tok::Punct("{")) => {
                self.nesting += 1;
                let result = self.parse_object_body();
                self.nesting -= 1;
                result.map(Expr::Object)
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    fn parse_object_body(&mut self) -> Result<Vec<(String, Expr)>, Thrown> {
        let mut fields = Vec::new();
        loop {
            if self.eat_punct("}") {
                return Ok(fields);
            }
            let key = match self.next() {
                Some(Tok::Ident(k)) | Some(Tok::Str(k)) => k,
                Some(Tok::Num(n)) => format_number(n),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.unexpected());
                }
            };
            let value = if self.eat_punct(":") {
                self.parse_expr()?
            } else {
                Expr::Ident(key.clone())
            };
            fields.push((key, value));
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                return Ok(fields);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Interpreter {
    vars: HashMap<String, (Val, bool)>,
    console: Vec<Emitted>,
    depth: usize,
}

impl Interpreter {
    /// Runs every statement; returns the last expression statement's value.
    fn run(&mut self, program: &[Stmt]) -> Result<Option<Val>, Thrown> {
        let mut last = None;
        for stmt in program {
            last = match stmt {
                Stmt::Decl { name, constant, init } => {
                    let value = match init {
                        Some(expr) => self.eval(expr)?,
                        None => Val::Undefined,
                    };
                    self.vars.insert(name.clone(), (value, *constant));
                    None
                }
                Stmt::Throw(expr) => {
                    let value = self.eval(expr)?;
                    return Err(Thrown::from_value(&value));
                }
                Stmt::Expr(expr) => Some(self.eval(expr)?),
            };
        }
        Ok(last)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Val, Thrown> {
        if self.depth >= MAX_DEPTH {
            return Err(too_deep());
        }
        self.depth += 1;
        let value = self.eval_expr(expr);
        self.depth -= 1;
        value
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Val, Thrown> {
        match expr {
            Expr::Lit(v) => Ok(v.clone()),
            Expr::Ident(name) => self
                .vars
                .get(name)
                .map(|(v, _)| v.clone())
                .ok_or_else(|| Thrown::new("ReferenceError", format!("{} is not defined", name))),
            Expr::Array(items) => Ok(Val::Array(
                items.iter().map(|e| self.eval(e)).collect::<Result<_, _>>()?,
            )),
            Expr::Object(fields) => {
                let mut out: Vec<(String, Val)> = Vec::new();
                for (k, e) in fields {
                    let v = self.eval(e)?;
                    match out.iter_mut().find(|(existing, _)| existing == k) {
                        Some(slot) => slot.1 = v,
                        None => out.push((k.clone(), v)),
                    }
                }
                Ok(Val::Object(out))
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                Ok(match *op {
                    "-" => Val::Num(-v.to_number()),
                    "+" => Val::Num(v.to_number()),
                    "!" => Val::Bool(!v.truthy()),
                    _ => Val::Str(v.type_name().to_string()),
                })
            }
            Expr::Binary(op, lhs, rhs) => self.binary(op, lhs, rhs),
            Expr::Member(target, name) => {
                if let Expr::Ident(root) = target.as_ref() {
                    if !self.vars.contains_key(root) && is_builtin(root) {
                        return Err(Thrown::new(
                            "TypeError",
                            format!("{}.{} is not supported as a value", root, name),
                        ));
                    }
                }
                let v = self.eval(target)?;
                member(&v, name)
            }
            Expr::Index(target, index) => {
                let v = self.eval(target)?;
                let i = self.eval(index)?;
                match (&v, &i) {
                    (Val::Array(items), Val::Num(n)) => Ok(index_of(items.len(), *n)
                        .map(|i| items[i].clone())
                        .unwrap_or(Val::Undefined)),
                    (Val::Str(s), Val::Num(n)) => Ok(index_of(s.chars().count(), *n)
                        .and_then(|i| s.chars().nth(i))
                        .map(|c| Val::Str(c.to_string()))
                        .unwrap_or(Val::Undefined)),
                    _ => member(&v, &i.to_string()),
                }
            }
            Expr::Call(callee, args) => {
                let args = args.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args)
            }
            Expr::New(class, args) => {
                let args = args.iter().map(|e| self.eval(e)).collect::<Result<Vec<_>, _>>()?;
                if !class.ends_with("Error") {
                    return Err(Thrown::new("TypeError", format!("{} is not a constructor", class)));
                }
                let message = args.first().map(Val::to_string).unwrap_or_default();
                Ok(Val::Object(vec![
                    ("name".to_string(), Val::Str(class.clone())),
                    ("message".to_string(), Val::Str(message)),
                ]))
            }
            Expr::Assign(name, rhs) => {
                let constant = match self.vars.get(name) {
                    Some((_, constant)) => *constant,
                    None => {
                        return Err(Thrown::new(
                            "ReferenceError",
                            format!("{} is not defined", name),
                        ))
                    }
                };
                if constant {
                    return Err(Thrown::new("TypeError", "Assignment to constant variable."));
                }
                let v = self.eval(rhs)?;
                self.vars.insert(name.clone(), (v.clone(), false));
                Ok(v)
            }
        }
    }

    fn binary(&mut self, op: &str, lhs: &Expr, rhs: &Expr) -> Result<Val, Thrown> {
        let l = self.eval(lhs)?;
        match op {
            "&&" => return if l.truthy() { self.eval(rhs) } else { Ok(l) },
            "||" => return if l.truthy() { Ok(l) } else { self.eval(rhs) },
            _ => {}
        }
        let r = self.eval(rhs)?;
        Ok(match op {
            "+" => match (&l, &r) {
                (Val::Str(_), _) | (_, Val::Str(_)) | (Val::Array(_) | Val::Object(_), _) | (_, Val::Array(_) | Val::Object(_)) => {
                    Val::Str(format!("{}{}", concat_str(&l), concat_str(&r)))
                }
                _ => Val::Num(l.to_number() + r.to_number()),
            },
            "-" => Val::Num(l.to_number() - r.to_number()),
            "*" => Val::Num(l.to_number() * r.to_number()),
            "/" => Val::Num(l.to_number() / r.to_number()),
            "%" => Val::Num(l.to_number() % r.to_number()),
            "===" => Val::Bool(strict_eq(&l, &r)),
            "!==" => Val::Bool(!strict_eq(&l, &r)),
            "==" => Val::Bool(loose_eq(&l, &r)),
            "!=" => Val::Bool(!loose_eq(&l, &r)),
            "<" | ">" | "<=" | ">=" => Val::Bool(compare(op, &l, &r)),
            _ => return Err(Thrown::new("SyntaxError", format!("unknown operator {}", op))),
        })
    }

    fn call(&mut self, callee: &Expr, args: Vec<Val>) -> Result<Val, Thrown> {
        match callee {
            Expr::Member(target, method) => {
                if let Expr::Ident(root) = target.as_ref() {
                    if !self.vars.contains_key(root) {
                        match root.as_str() {
                            "console" => return self.console_call(method, &args),
                            "JSON" => return json_call(method, &args),
                            "Math" => return math_call(method, &args),
                            _ => {}
                        }
                    }
                }
                let receiver = self.eval(target)?;
                method_call(&receiver, method, &args)
            }
            Expr::Ident(name) if !self.vars.contains_key(name) => match name.as_str() {
                "String" => Ok(Val::Str(args.first().map(Val::to_string).unwrap_or_default())),
                "Number" => Ok(Val::Num(args.first().map(Val::to_number).unwrap_or(0.0))),
                "Boolean" => Ok(Val::Bool(args.first().is_some_and(Val::truthy))),
                _ => Err(Thrown::new("ReferenceError", format!("{} is not defined", name))),
            },
            other => {
                let v = self.eval(other)?;
                Err(Thrown::new("TypeError", format!("{} is not a function", v.preview())))
            }
        }
    }

    fn console_call(&mut self, method: &str, args: &[Val]) -> Result<Val, Thrown> {
        let level = match method {
            "log" | "info" | "warn" | "error" | "debug" => method,
            _ => {
                return Err(Thrown::new(
                    "TypeError",
                    format!("console.{} is not a function", method),
                ))
            }
        };
        let text = args.iter().map(Val::to_string).collect::<Vec<_>>().join(" ");
        self.console.push(Emitted {
            event_type: EventType::Console,
            payload: json!({ "level": level, "text": text }),
        });
        Ok(Val::Undefined)
    }
}

fn is_builtin(name: &str) -> bool {
    matches!(name, "console" | "JSON" | "Math")
}

fn index_of(len: usize, n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 && (n as usize) < len {
        Some(n as usize)
    } else {
        None
    }
}

fn concat_str(v: &Val) -> String {
    match v {
        Val::Array(items) => items.iter().map(Val::to_string).collect::<Vec<_>>().join(","),
        Val::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

fn strict_eq(l: &Val, r: &Val) -> bool {
    match (l, r) {
        (Val::Num(a), Val::Num(b)) => a == b,
        _ => l == r,
    }
}

fn loose_eq(l: &Val, r: &Val) -> bool {
    match (l, r) {
        (Val::Undefined | Val::Null, Val::Undefined | Val::Null) => true,
        (Val::Undefined | Val::Null, _) | (_, Val::Undefined | Val::Null) => false,
        (Val::Str(a), Val::Str(b)) => a == b,
        (Val::Num(_) | Val::Str(_) | Val::Bool(_), Val::Num(_) | Val::Str(_) | Val::Bool(_)) => {
            l.to_number() == r.to_number()
        }
        _ => l == r,
    }
}

fn compare(op: &str, l: &Val, r: &Val) -> bool {
    let ord = match (l, r) {
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    };
    let Some(ord) = ord else {
        return false;
    };
    match op {
        "<" => ord.is_lt(),
        ">" => ord.is_gt(),
        "<=" => ord.is_le(),
        _ => ord.is_ge(),
    }
}

fn member(v: &Val, name: &str) -> Result<Val, Thrown> {
    match (v, name) {
        (Val::Undefined | Val::Null, _) => Err(Thrown::new(
            "TypeError",
            format!("Cannot read properties of {} (reading '{}')", v, name),
        )),
        (Val::Str(s), "length") => Ok(Val::Num(s.chars().count() as f64)),
        (Val::Array(items), "length") => Ok(Val::Num(items.len() as f64)),
        (Val::Object(fields), _) => Ok(fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or(Val::Undefined)),
        _ => Ok(Val::Undefined),
    }
}

fn method_call(receiver: &Val, method: &str, args: &[Val]) -> Result<Val, Thrown> {
    match (receiver, method) {
        (Val::Str(s), "toUpperCase") => Ok(Val::Str(s.to_uppercase())),
        (Val::Str(s), "toLowerCase") => Ok(Val::Str(s.to_lowercase())),
        (Val::Str(s), "trim") => Ok(Val::Str(s.trim().to_string())),
        (Val::Array(items), "join") => {
            let sep = args.first().map(Val::to_string).unwrap_or_else(|| ",".to_string());
            Ok(Val::Str(
                items.iter().map(concat_str).collect::<Vec<_>>().join(&sep),
            ))
        }
        (Val::Array(items), "includes") => Ok(Val::Bool(
            args.first().is_some_and(|needle| items.iter().any(|i| strict_eq(i, needle))),
        )),
        (Val::Undefined | Val::Null, _) => Err(Thrown::new(
            "TypeError",
            format!("Cannot read properties of {} (reading '{}')", receiver, method),
        )),
        _ => Err(Thrown::new(
            "TypeError",
            format!("{}.{} is not a function", receiver.type_name(), method),
        )),
    }
}

fn json_call(method: &str, args: &[Val]) -> Result<Val, Thrown> {
    match method {
        "stringify" => Ok(match args.first() {
            None | Some(Val::Undefined) => Val::Undefined,
            Some(v) => Val::Str(v.to_json().to_string()),
        }),
        _ => Err(Thrown::new("TypeError", format!("JSON.{} is not a function", method))),
    }
}

fn math_call(method: &str, args: &[Val]) -> Result<Val, Thrown> {
    let nums: Vec<f64> = args.iter().map(Val::to_number).collect();
    let first = nums.first().copied().unwrap_or(f64::NAN);
    let n = match method {
        "floor" => first.floor(),
        "ceil" => first.ceil(),
        "round" => (first + 0.5).floor(),
        "abs" => first.abs(),
        "sqrt" => first.sqrt(),
        "max" => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "min" => nums.iter().copied().fold(f64::INFINITY, f64::min),
        _ => return Err(Thrown::new("TypeError", format!("Math.{} is not a function", method))),
    };
    Ok(Val::Num(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(outcome: &Outcome) -> Vec<EventType> {
        outcome.events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn arithmetic_produces_value_event() {
        let out = evaluate("1 + 2 * 3");
        assert_eq!(types(&out), vec![EventType::InputEcho, EventType::Value]);
        let result = out.result.unwrap();
        assert_eq!(result["json"], json!(7));
        assert_eq!(result["type"], "number");
        assert_eq!(result["preview"], "7");
        assert!(out.error.is_none());
    }

    #[test]
    fn console_output_precedes_value() {
        let out = evaluate("const xs = [1, 2, 3]\nconsole.log('len', xs.length)\nxs.join('-')");
        assert_eq!(
            types(&out),
            vec![EventType::InputEcho, EventType::Console, EventType::Value]
        );
        assert_eq!(out.events[1].payload, json!({ "level": "log", "text": "len 3" }));
        assert_eq!(out.result.unwrap()["json"], json!("1-2-3"));
    }

    #[test]
    fn declarations_alone_yield_no_value() {
        let out = evaluate("let x = 4;");
        assert_eq!(types(&out), vec![EventType::InputEcho]);
        assert!(out.result.is_none());
    }

    #[test]
    fn thrown_error_becomes_exception() {
        let out = evaluate("console.log('before'); throw new Error('boom')");
        assert_eq!(
            types(&out),
            vec![EventType::InputEcho, EventType::Console, EventType::Exception]
        );
        assert_eq!(out.error.as_deref(), Some("boom"));
        assert_eq!(out.events[2].payload, json!({ "message": "boom" }));
    }

    #[test]
    fn reference_and_const_errors() {
        assert_eq!(
            evaluate("missing + 1").error.as_deref(),
            Some("ReferenceError: missing is not defined")
        );
        assert_eq!(
            evaluate("const a = 1; a = 2").error.as_deref(),
            Some("TypeError: Assignment to constant variable.")
        );
    }

    #[test]
    fn syntax_error_is_reported() {
        let out = evaluate("let = 3");
        assert_eq!(types(&out), vec![EventType::InputEcho, EventType::Exception]);
        assert!(out.error.unwrap().starts_with("SyntaxError"));
    }

    #[test]
    fn objects_and_strings() {
        let out = evaluate("const o = {\n  name: 'vm',\n  n: 2,\n}\n'hi ' + o.name + o.n");
        assert_eq!(out.result.unwrap()["json"], json!("hi vm2"));
        let out = evaluate("JSON.stringify({ a: [1, true, null] })");
        assert_eq!(out.result.unwrap()["json"], json!("{\"a\":[1,true,null]}"));
    }

    #[test]
    fn deep_nesting_is_a_range_error() {
        let deep = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        let out = evaluate(&deep);
        assert_eq!(
            out.error.as_deref(),
            Some("RangeError: maximum nesting depth exceeded")
        );
        assert_eq!(out.events.last().map(|e| e.event_type), Some(EventType::Exception));

        let negations = format!("{}1", "- ".repeat(50_000));
        assert!(evaluate(&negations).error.unwrap().starts_with("RangeError"));
        let chain = vec!["1"; 50_000].join(" + ");
        assert!(evaluate(&chain).error.unwrap().starts_with("RangeError"));
        let calls = format!("String{}", "(1)".repeat(50_000));
        assert!(evaluate(&calls).error.unwrap().starts_with("RangeError"));
    }

    #[test]
    fn moderate_nesting_still_evaluates() {
        let nested = format!("{}1 + 2{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(evaluate(&nested).result.unwrap()["json"], json!(3));
        let chain = vec!["1"; 100].join(" + ");
        assert_eq!(evaluate(&chain).result.unwrap()["json"], json!(100));
    }

    #[test]
    fn input_is_echoed_verbatim() {
        let out = evaluate("  2  ");
        assert_eq!(out.events[0].payload, json!({ "text": "  2  " }));
    }
}
