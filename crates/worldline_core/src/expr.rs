//! Symbolic expression trees.
//!
//! Metric components, Christoffel symbols, and event predicates are all
//! values of [`Expr`]: a small algebra over constants, named symbols, the
//! arithmetic operators, and the function set {sin, cos, tan, exp, ln,
//! sqrt}. Construction goes through smart constructors that fold constants
//! and algebraic identities, which keeps derived tensors compact without a
//! separate simplification pass. Symbol tables are never ambient: every
//! consumer receives the symbols it may reference as explicit data.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops;

/// An interned name: coordinate, velocity, parameter, or affine parameter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Symbol> for Expr {
    fn from(s: &Symbol) -> Self {
        Expr::Sym(s.clone())
    }
}

impl From<Symbol> for Expr {
    fn from(s: Symbol) -> Self {
        Expr::Sym(s)
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Const(v)
    }
}

/// Symbolic expression tree.
///
/// Variants cover exactly what the bytecode compiler can lower; there is no
/// unevaluated-derivative node because velocity components enter the algebra
/// as first-class symbols minted by the coordinate chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(f64),
    Sym(Symbol),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Sin(Box<Expr>),
    Cos(Box<Expr>),
    Tan(Box<Expr>),
    Exp(Box<Expr>),
    Ln(Box<Expr>),
    Sqrt(Box<Expr>),
}

impl Expr {
    pub fn zero() -> Self {
        Expr::Const(0.0)
    }

    pub fn one() -> Self {
        Expr::Const(1.0)
    }

    pub fn sym(name: impl Into<String>) -> Self {
        Expr::Sym(Symbol::new(name))
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(c) if *c == 0.0)
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Const(c) if *c == 1.0)
    }

    // Smart constructors. Each folds constants and the cheap identities so
    // the Christoffel assembly, which sums mostly-zero terms, stays small.

    pub fn add(a: Expr, b: Expr) -> Expr {
        match (a, b) {
            (Expr::Const(x), Expr::Const(y)) => Expr::Const(x + y),
            (a, b) if a.is_zero() => b,
            (a, b) if b.is_zero() => a,
            (a, b) => Expr::Add(Box::new(a), Box::new(b)),
        }
    }

    pub fn sub(a: Expr, b: Expr) -> Expr {
        match (a, b) {
            (Expr::Const(x), Expr::Const(y)) => Expr::Const(x - y),
            (a, b) if b.is_zero() => a,
            (a, b) if a.is_zero() => Expr::neg(b),
            (a, b) => Expr::Sub(Box::new(a), Box::new(b)),
        }
    }

    pub fn mul(a: Expr, b: Expr) -> Expr {
        match (a, b) {
            (Expr::Const(x), Expr::Const(y)) => Expr::Const(x * y),
            (a, _) if a.is_zero() => Expr::zero(),
            (_, b) if b.is_zero() => Expr::zero(),
            (a, b) if a.is_one() => b,
            (a, b) if b.is_one() => a,
            (Expr::Const(x), b) if x == -1.0 => Expr::neg(b),
            (a, Expr::Const(y)) if y == -1.0 => Expr::neg(a),
            (a, b) => Expr::Mul(Box::new(a), Box::new(b)),
        }
    }

    pub fn div(a: Expr, b: Expr) -> Expr {
        match (a, b) {
            (Expr::Const(x), Expr::Const(y)) if y != 0.0 => Expr::Const(x / y),
            (a, _) if a.is_zero() => Expr::zero(),
            (a, b) if b.is_one() => a,
            (a, b) => Expr::Div(Box::new(a), Box::new(b)),
        }
    }

    pub fn pow(a: Expr, b: Expr) -> Expr {
        match (a, b) {
            (Expr::Const(x), Expr::Const(y)) => Expr::Const(x.powf(y)),
            (a, b) if b.is_zero() && !a.is_zero() => Expr::one(),
            (a, b) if b.is_one() => a,
            (a, _) if a.is_one() => Expr::one(),
            (a, b) => Expr::Pow(Box::new(a), Box::new(b)),
        }
    }

    pub fn neg(a: Expr) -> Expr {
        match a {
            Expr::Const(x) => Expr::Const(-x),
            Expr::Neg(inner) => *inner,
            a => Expr::Neg(Box::new(a)),
        }
    }

    pub fn sin(self) -> Expr {
        match self {
            Expr::Const(x) => Expr::Const(x.sin()),
            a => Expr::Sin(Box::new(a)),
        }
    }

    pub fn cos(self) -> Expr {
        match self {
            Expr::Const(x) => Expr::Const(x.cos()),
            a => Expr::Cos(Box::new(a)),
        }
    }

    pub fn tan(self) -> Expr {
        match self {
            Expr::Const(x) => Expr::Const(x.tan()),
            a => Expr::Tan(Box::new(a)),
        }
    }

    pub fn exp(self) -> Expr {
        match self {
            Expr::Const(x) => Expr::Const(x.exp()),
            a => Expr::Exp(Box::new(a)),
        }
    }

    pub fn ln(self) -> Expr {
        match self {
            Expr::Const(x) if x > 0.0 => Expr::Const(x.ln()),
            a => Expr::Ln(Box::new(a)),
        }
    }

    pub fn sqrt(self) -> Expr {
        match self {
            Expr::Const(x) if x >= 0.0 => Expr::Const(x.sqrt()),
            a => Expr::Sqrt(Box::new(a)),
        }
    }

    /// Raises to an integer power by repeated structure, keeping the tree
    /// free of fractional `Pow` nodes for the common squared terms.
    pub fn powi(self, n: i32) -> Expr {
        Expr::pow(self, Expr::Const(f64::from(n)))
    }

    /// Symbolic derivative with respect to `sym`. All other symbols are
    /// treated as independent of `sym`.
    pub fn diff(&self, sym: &Symbol) -> Expr {
        match self {
            Expr::Const(_) => Expr::zero(),
            Expr::Sym(s) => {
                if s == sym {
                    Expr::one()
                } else {
                    Expr::zero()
                }
            }
            Expr::Add(a, b) => Expr::add(a.diff(sym), b.diff(sym)),
            Expr::Sub(a, b) => Expr::sub(a.diff(sym), b.diff(sym)),
            Expr::Mul(a, b) => Expr::add(
                Expr::mul(a.diff(sym), (**b).clone()),
                Expr::mul((**a).clone(), b.diff(sym)),
            ),
            Expr::Div(a, b) => Expr::div(
                Expr::sub(
                    Expr::mul(a.diff(sym), (**b).clone()),
                    Expr::mul((**a).clone(), b.diff(sym)),
                ),
                Expr::pow((**b).clone(), Expr::Const(2.0)),
            ),
            Expr::Pow(a, b) => match &**b {
                // d/dx a^n = n a^(n-1) a'
                Expr::Const(n) => Expr::mul(
                    Expr::mul(
                        Expr::Const(*n),
                        Expr::pow((**a).clone(), Expr::Const(n - 1.0)),
                    ),
                    a.diff(sym),
                ),
                // d/dx a^b = a^b (b' ln a + b a'/a)
                _ => Expr::mul(
                    self.clone(),
                    Expr::add(
                        Expr::mul(b.diff(sym), (**a).clone().ln()),
                        Expr::div(Expr::mul((**b).clone(), a.diff(sym)), (**a).clone()),
                    ),
                ),
            },
            Expr::Neg(a) => Expr::neg(a.diff(sym)),
            Expr::Sin(a) => Expr::mul((**a).clone().cos(), a.diff(sym)),
            Expr::Cos(a) => Expr::neg(Expr::mul((**a).clone().sin(), a.diff(sym))),
            Expr::Tan(a) => Expr::div(
                a.diff(sym),
                Expr::pow((**a).clone().cos(), Expr::Const(2.0)),
            ),
            Expr::Exp(a) => Expr::mul(self.clone(), a.diff(sym)),
            Expr::Ln(a) => Expr::div(a.diff(sym), (**a).clone()),
            Expr::Sqrt(a) => Expr::div(
                a.diff(sym),
                Expr::mul(Expr::Const(2.0), self.clone()),
            ),
        }
    }

    /// Collects the free symbols into `out`.
    pub fn symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Expr::Const(_) => {}
            Expr::Sym(s) => {
                out.insert(s.clone());
            }
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b)
            | Expr::Pow(a, b) => {
                a.symbols(out);
                b.symbols(out);
            }
            Expr::Neg(a) | Expr::Sin(a) | Expr::Cos(a) | Expr::Tan(a) | Expr::Exp(a)
            | Expr::Ln(a) | Expr::Sqrt(a) => a.symbols(out),
        }
    }

    /// Tree-walk evaluation against named bindings. Returns `None` when a
    /// symbol is unbound. Slow path; integration goes through the bytecode
    /// VM instead. Used for probing and by trajectory post-processing tests.
    pub fn eval_map(&self, bindings: &HashMap<String, f64>) -> Option<f64> {
        Some(match self {
            Expr::Const(c) => *c,
            Expr::Sym(s) => *bindings.get(s.as_str())?,
            Expr::Add(a, b) => a.eval_map(bindings)? + b.eval_map(bindings)?,
            Expr::Sub(a, b) => a.eval_map(bindings)? - b.eval_map(bindings)?,
            Expr::Mul(a, b) => a.eval_map(bindings)? * b.eval_map(bindings)?,
            Expr::Div(a, b) => a.eval_map(bindings)? / b.eval_map(bindings)?,
            Expr::Pow(a, b) => a.eval_map(bindings)?.powf(b.eval_map(bindings)?),
            Expr::Neg(a) => -a.eval_map(bindings)?,
            Expr::Sin(a) => a.eval_map(bindings)?.sin(),
            Expr::Cos(a) => a.eval_map(bindings)?.cos(),
            Expr::Tan(a) => a.eval_map(bindings)?.tan(),
            Expr::Exp(a) => a.eval_map(bindings)?.exp(),
            Expr::Ln(a) => a.eval_map(bindings)?.ln(),
            Expr::Sqrt(a) => a.eval_map(bindings)?.sqrt(),
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Add(..) | Expr::Sub(..) => 1,
            Expr::Mul(..) | Expr::Div(..) => 2,
            Expr::Neg(..) => 3,
            Expr::Pow(..) => 4,
            _ => 5,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        let prec = self.precedence();
        if prec < parent {
            write!(f, "(")?;
        }
        match self {
            Expr::Const(c) => write!(f, "{}", c)?,
            Expr::Sym(s) => write!(f, "{}", s)?,
            Expr::Add(a, b) => {
                a.fmt_prec(f, prec)?;
                write!(f, " + ")?;
                b.fmt_prec(f, prec)?;
            }
            Expr::Sub(a, b) => {
                a.fmt_prec(f, prec)?;
                write!(f, " - ")?;
                b.fmt_prec(f, prec + 1)?;
            }
            Expr::Mul(a, b) => {
                a.fmt_prec(f, prec)?;
                write!(f, "*")?;
                b.fmt_prec(f, prec + 1)?;
            }
            Expr::Div(a, b) => {
                a.fmt_prec(f, prec)?;
                write!(f, "/")?;
                b.fmt_prec(f, prec + 1)?;
            }
            Expr::Pow(a, b) => {
                a.fmt_prec(f, prec + 1)?;
                write!(f, "^")?;
                b.fmt_prec(f, prec)?;
            }
            Expr::Neg(a) => {
                write!(f, "-")?;
                a.fmt_prec(f, prec + 1)?;
            }
            Expr::Sin(a) => write!(f, "sin({})", a)?,
            Expr::Cos(a) => write!(f, "cos({})", a)?,
            Expr::Tan(a) => write!(f, "tan({})", a)?,
            Expr::Exp(a) => write!(f, "exp({})", a)?,
            Expr::Ln(a) => write!(f, "ln({})", a)?,
            Expr::Sqrt(a) => write!(f, "sqrt({})", a)?,
        }
        if prec < parent {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

// Operator overloads so metric matrices read like the formulas they encode.
// Owned, borrowed, and f64 mixes all route through the smart constructors.

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $ctor:ident) => {
        impl ops::$trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$ctor(self, rhs)
            }
        }
        impl ops::$trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$ctor(self, rhs.clone())
            }
        }
        impl ops::$trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$ctor(self.clone(), rhs)
            }
        }
        impl ops::$trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$ctor(self.clone(), rhs.clone())
            }
        }
        impl ops::$trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$ctor(self, Expr::Const(rhs))
            }
        }
        impl ops::$trait<f64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$ctor(self.clone(), Expr::Const(rhs))
            }
        }
        impl ops::$trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$ctor(Expr::Const(self), rhs)
            }
        }
        impl ops::$trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$ctor(Expr::Const(self), rhs.clone())
            }
        }
    };
}

impl_binop!(Add, add, add);
impl_binop!(Sub, sub, sub);
impl_binop!(Mul, mul, mul);
impl_binop!(Div, div, div);

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::neg(self)
    }
}

impl ops::Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::neg(self.clone())
    }
}

// --- Parser ---

/// Parses a text expression into an [`Expr`].
///
/// Grammar: `+ -` < `* /` < unary `-` < `^` (right-associative) < atoms;
/// identifiers become symbols unless followed by `(`, in which case they
/// must name one of the supported functions.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(format!("unexpected trailing token {:?}", t)),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            // Exponent suffix (1.2e-10 style constants).
            if let Some(&e) = chars.peek() {
                if e == 'e' || e == 'E' {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exp_str = String::new();
                    if let Some(&sign) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exp_str.push(sign);
                            lookahead.next();
                        }
                    }
                    let mut has_digits = false;
                    while let Some(&d) = lookahead.peek() {
                        if d.is_ascii_digit() {
                            exp_str.push(d);
                            lookahead.next();
                            has_digits = true;
                        } else {
                            break;
                        }
                    }
                    if has_digits {
                        num_str.push('e');
                        num_str.push_str(&exp_str);
                        chars = lookahead;
                    }
                }
            }
            let value: f64 = num_str
                .parse()
                .map_err(|_| format!("malformed number '{}'", num_str))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            match c {
                '+' => tokens.push(Token::Plus),
                '-' => tokens.push(Token::Minus),
                '*' => tokens.push(Token::Star),
                '/' => tokens.push(Token::Slash),
                '^' => tokens.push(Token::Caret),
                '(' => tokens.push(Token::LParen),
                ')' => tokens.push(Token::RParen),
                other => return Err(format!("unexpected character '{}'", other)),
            }
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).cloned()
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expression(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_term()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.consume();
                    let right = self.parse_term()?;
                    left = Expr::add(left, right);
                }
                Token::Minus => {
                    self.consume();
                    let right = self.parse_term()?;
                    left = Expr::sub(left, right);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Expr::mul(left, right);
                }
                Token::Slash => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Expr::div(left, right);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::neg(expr));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            // Right-associative; unary binds the exponent so x^-2 parses.
            let exponent = self.parse_unary()?;
            return Ok(Expr::pow(base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Const(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    match self.consume() {
                        Some(Token::RParen) => {}
                        _ => return Err("expected ')'".to_string()),
                    }
                    match name.as_str() {
                        "sin" => Ok(arg.sin()),
                        "cos" => Ok(arg.cos()),
                        "tan" => Ok(arg.tan()),
                        "exp" => Ok(arg.exp()),
                        "ln" => Ok(arg.ln()),
                        "sqrt" => Ok(arg.sqrt()),
                        other => Err(format!("unknown function '{}'", other)),
                    }
                } else {
                    Ok(Expr::Sym(Symbol::new(name)))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err("expected ')'".to_string()),
                }
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn constant_folding_through_constructors() {
        let r = Expr::sym("r");
        assert_eq!(Expr::add(Expr::zero(), r.clone()), r);
        assert_eq!(Expr::mul(Expr::zero(), r.clone()), Expr::zero());
        assert_eq!(Expr::mul(Expr::one(), r.clone()), r);
        assert_eq!(
            Expr::add(Expr::Const(2.0), Expr::Const(3.0)),
            Expr::Const(5.0)
        );
        assert_eq!(Expr::pow(r.clone(), Expr::one()), r);
        assert_eq!(Expr::neg(Expr::neg(r.clone())), r);
    }

    #[test]
    fn product_and_chain_rules() {
        let r = Symbol::new("r");
        // d/dr (r^2 * sin(r)) = 2r sin(r) + r^2 cos(r)
        let e = Expr::from(&r).powi(2) * Expr::from(&r).sin();
        let d = e.diff(&r);
        let at = |x: f64| {
            let b = bind(&[("r", x)]);
            d.eval_map(&b).unwrap()
        };
        for x in [0.3_f64, 1.1, 2.9] {
            let expected = 2.0 * x * x.sin() + x * x * x.cos();
            assert!((at(x) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn quotient_and_sqrt_rules() {
        let r = Symbol::new("r");
        // d/dr sqrt(1 - 1/r) = (1/r^2) / (2 sqrt(1 - 1/r))
        let e = (1.0 - 1.0 / Expr::from(&r)).sqrt();
        let d = e.diff(&r);
        let x = 3.0;
        let b = bind(&[("r", x)]);
        let expected = (1.0 / (x * x)) / (2.0 * (1.0 - 1.0 / x).sqrt());
        assert!((d.eval_map(&b).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn derivative_of_unrelated_symbol_is_zero() {
        let r = Symbol::new("r");
        let theta = Symbol::new("theta");
        let e = Expr::from(&theta).sin() * 4.0;
        assert_eq!(e.diff(&r), Expr::zero());
    }

    #[test]
    fn parser_precedence_and_unary() {
        let b = bind(&[("x", 2.0)]);
        let cases = [
            ("1 + 2 * 3", 7.0),
            ("(1 + 2) * 3", 9.0),
            ("2 * x^3", 16.0),
            ("-x^2", -4.0),
            ("2^-1", 0.5),
            ("2^3^2", 512.0),
            ("sqrt(x^2 + 5)", 3.0),
            ("1.5e2 / x", 75.0),
        ];
        for (text, expected) in cases {
            let e = parse(text).unwrap();
            assert!(
                (e.eval_map(&b).unwrap() - expected).abs() < 1e-12,
                "{} evaluated wrong",
                text
            );
        }
    }

    #[test]
    fn parser_rejects_garbage() {
        assert!(parse("sin(").is_err());
        assert!(parse("1 + ").is_err());
        assert!(parse("foo(2)").is_err());
        assert!(parse("1 2").is_err());
    }

    #[test]
    fn display_parses_back_to_same_value() {
        let r = Symbol::new("r");
        let theta = Symbol::new("theta");
        let e = -(Expr::from(&r).powi(2) * Expr::from(&theta).sin().powi(2))
            / (1.0 - 2.0 / Expr::from(&r));
        let reparsed = parse(&e.to_string()).unwrap();
        let b = bind(&[("r", 5.0), ("theta", 0.7)]);
        assert!(
            (e.eval_map(&b).unwrap() - reparsed.eval_map(&b).unwrap()).abs() < 1e-12
        );
    }

    #[test]
    fn free_symbols_collected() {
        let e = parse("sin(theta) * r^2 + rs").unwrap();
        let mut out = BTreeSet::new();
        e.symbols(&mut out);
        let names: Vec<&str> = out.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["r", "rs", "theta"]);
    }
}
