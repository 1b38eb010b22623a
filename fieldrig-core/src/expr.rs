//! Scalar expressions of position and time.
//!
//! Field values can be prescribed as formulas in `x`, `y`, `z` and `t`.
//! Field code only sees the [`Expression`] trait; [`ParsedExpression`] is
//! the string-based implementation and [`FnExpression`] wraps a closure.
//!
//! Grammar of [`ParsedExpression`]:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := number | name | name '(' expr ')' | '(' expr ')'
//! ```
//!
//! Names are the keys `x y z t`, the constants `pi e` and the functions
//! `sin cos tan asin acos atan exp log sqrt abs`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Values bound to the expression keys.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Env {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
}

impl Env {
    /// Bind a 1D, 2D or 3D coordinate and a time.
    pub fn at(coord: &[f64], t: f64) -> Self {
        Self {
            x: coord.first().copied().unwrap_or(0.0),
            y: coord.get(1).copied().unwrap_or(0.0),
            z: coord.get(2).copied().unwrap_or(0.0),
            t,
        }
    }

    /// Bind only a time.
    pub fn time(t: f64) -> Self {
        Self { t, ..Self::default() }
    }
}

/// A scalar function of the keys `x`, `y`, `z`, `t`.
pub trait Expression: fmt::Debug + Send + Sync {
    /// Whether the value depends on `key`.
    fn uses(&self, key: &str) -> bool;

    fn eval(&self, env: &Env) -> f64;

    /// Whether the value depends on position.
    fn uses_position(&self) -> bool {
        self.uses("x") || self.uses("y") || self.uses("z")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    X,
    Y,
    Z,
    T,
}

impl Key {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "x" => Some(Key::X),
            "y" => Some(Key::Y),
            "z" => Some(Key::Z),
            "t" => Some(Key::T),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Exp,
    Log,
    Sqrt,
    Abs,
}

impl Func {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "exp" => Func::Exp,
            "log" => Func::Log,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Sin => v.sin(),
            Func::Cos => v.cos(),
            Func::Tan => v.tan(),
            Func::Asin => v.asin(),
            Func::Acos => v.acos(),
            Func::Atan => v.atan(),
            Func::Exp => v.exp(),
            Func::Log => v.ln(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(f64),
    Key(Key),
    Neg(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    Call(Func, Box<Node>),
}

impl Node {
    fn eval(&self, env: &Env) -> f64 {
        match self {
            Node::Num(v) => *v,
            Node::Key(Key::X) => env.x,
            Node::Key(Key::Y) => env.y,
            Node::Key(Key::Z) => env.z,
            Node::Key(Key::T) => env.t,
            Node::Neg(a) => -a.eval(env),
            Node::Bin(op, a, b) => {
                let (a, b) = (a.eval(env), b.eval(env));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Node::Call(f, a) => f.apply(a.eval(env)),
        }
    }

    fn uses(&self, key: Key) -> bool {
        match self {
            Node::Num(_) => false,
            Node::Key(k) => *k == key,
            Node::Neg(a) | Node::Call(_, a) => a.uses(key),
            Node::Bin(_, a, b) => a.uses(key) || b.uses(key),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Name(String),
    Op(char),
    Open,
    Close,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // exponent part, e.g. 1.5e-3
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| Error::Expression(format!("bad number '{text}' in '{src}'")))?;
            tokens.push(Token::Num(value));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Name(chars[start..i].iter().collect()));
        } else if "+-*/^".contains(c) {
            tokens.push(Token::Op(c));
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else {
            return Err(Error::Expression(format!("unexpected character '{c}' in '{src}'")));
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn error(&self, msg: &str) -> Error {
        Error::Expression(format!("{msg} in '{}'", self.src))
    }

    fn expr(&mut self) -> Result<Node> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek() {
            let op = if *c == '+' { BinOp::Add } else { BinOp::Sub };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek() {
            let op = if *c == '*' { BinOp::Mul } else { BinOp::Div };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Node::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Node::Num(v)),
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.error("missing ')'")),
                }
            }
            Some(Token::Name(name)) => {
                if let Some(key) = Key::parse(&name) {
                    return Ok(Node::Key(key));
                }
                match name.as_str() {
                    "pi" => return Ok(Node::Num(std::f64::consts::PI)),
                    "e" => return Ok(Node::Num(std::f64::consts::E)),
                    _ => {}
                }
                let func = Func::parse(&name).ok_or_else(|| self.error(&format!("unknown name '{name}'")))?;
                if self.next() != Some(Token::Open) {
                    return Err(self.error(&format!("'{name}' must be followed by '('")));
                }
                let arg = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(Node::Call(func, Box::new(arg))),
                    _ => Err(self.error("missing ')'")),
                }
            }
            Some(tok) => Err(self.error(&format!("unexpected token {tok:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

/// Expression parsed from text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    source: String,
    root: Node,
}

impl ParsedExpression {
    pub fn parse(src: &str) -> Result<Self> {
        let tokens = tokenize(src)?;
        let mut parser = Parser { src, tokens, pos: 0 };
        let root = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(Self {
            source: src.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for ParsedExpression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Expression for ParsedExpression {
    fn uses(&self, key: &str) -> bool {
        Key::parse(key).is_some_and(|k| self.root.uses(k))
    }

    fn eval(&self, env: &Env) -> f64 {
        self.root.eval(env)
    }
}

/// Expression backed by a closure.
pub struct FnExpression<F> {
    keys: Vec<&'static str>,
    func: F,
}

impl<F> FnExpression<F>
where
    F: Fn(&Env) -> f64 + Send + Sync,
{
    /// Wrap `func`, declaring the keys it reads.
    pub fn new(keys: &[&'static str], func: F) -> Self {
        Self {
            keys: keys.to_vec(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnExpression<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExpression").field("keys", &self.keys).finish()
    }
}

impl<F> Expression for FnExpression<F>
where
    F: Fn(&Env) -> f64 + Send + Sync,
{
    fn uses(&self, key: &str) -> bool {
        self.keys.contains(&key)
    }

    fn eval(&self, env: &Env) -> f64 {
        (self.func)(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(src: &str, env: Env) -> f64 {
        ParsedExpression::parse(src).unwrap().eval(&env)
    }

    #[test]
    fn test_precedence() {
        let env = Env::default();
        assert_relative_eq!(eval("1 + 2 * 3", env), 7.0);
        assert_relative_eq!(eval("(1 + 2) * 3", env), 9.0);
        assert_relative_eq!(eval("2 ^ 3 ^ 2", env), 512.0);
        assert_relative_eq!(eval("-2 ^ 2", env), -4.0);
        assert_relative_eq!(eval("8 / 4 / 2", env), 1.0);
        assert_relative_eq!(eval("1.5e-1 * 10", env), 1.5);
    }

    #[test]
    fn test_keys_and_functions() {
        let env = Env::at(&[1.0, 2.0, 3.0], 0.5);
        assert_relative_eq!(eval("x + 2*y - z", env), 2.0);
        assert_relative_eq!(eval("sin(pi * t)", env), 1.0, epsilon = 1e-12);
        assert_relative_eq!(eval("sqrt(abs(-16)) + log(e)", env), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_key_usage() {
        let expr = ParsedExpression::parse("0.1*sin(t) + y").unwrap();
        assert!(expr.uses("t"));
        assert!(expr.uses("y"));
        assert!(!expr.uses("x"));
        assert!(expr.uses_position());

        let constant = ParsedExpression::parse("3*t").unwrap();
        assert!(!constant.uses_position());
    }

    #[test]
    fn test_malformed() {
        for src in ["1 +", "sin 2", "(x", "foo(1)", "2 $ 3", "x y", ""] {
            assert!(
                matches!(ParsedExpression::parse(src), Err(Error::Expression(_))),
                "accepted '{src}'"
            );
        }
    }

    #[test]
    fn test_closure_expression() {
        let expr = FnExpression::new(&["x"], |env: &Env| 2.0 * env.x);
        assert!(expr.uses("x"));
        assert!(!expr.uses("t"));
        assert_relative_eq!(expr.eval(&Env::at(&[4.0], 0.0)), 8.0);
    }
}
