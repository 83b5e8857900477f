//! User-supplied restrictions over parameter points.
//!
//! A restriction is a small boolean expression such as `M >= 4 * m` or
//! `M % 2 == 0 and m < M // 2`. Supported:
//!
//! - integer and decimal literals, `True`, `False`, parameter names
//! - arithmetic: `+ - * / // % **` and unary `-`/`+`
//! - comparisons `< <= > >= == !=`, chainable (`2 <= m < 40`)
//! - logic: `and`/`&&`, `or`/`||`, `not`/`!`
//!
//! Values are numbers; comparisons and logic yield 1 or 0 and any non-zero
//! value counts as true. Nothing else can be expressed, so evaluation has no
//! side effects.

use bt_types::{ParameterPoint, SearchError};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

const OPERATORS: [&str; 19] = [
    "**", "//", "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "(",
    ")", "=",
];

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number `{text}`"))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "and" => Token::Op("&&"),
                "or" => Token::Op("||"),
                "not" => Token::Op("!"),
                "True" | "true" => Token::Number(1.0),
                "False" | "false" => Token::Number(0.0),
                _ => Token::Ident(word),
            });
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let op = OPERATORS
            .iter()
            .find(|op| rest.starts_with(**op))
            .ok_or_else(|| format!("unexpected character `{c}`"))?;

        match *op {
            "(" => tokens.push(Token::LParen),
            ")" => tokens.push(Token::RParen),
            "=" => return Err("assignment is not allowed, use `==`".to_string()),
            other => tokens.push(Token::Op(other)),
        }
        i += op.len();
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    fn from_token(op: &str) -> Option<Self> {
        Some(match op {
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            _ => return None,
        })
    }

    fn apply(self, a: f64, b: f64) -> bool {
        match self {
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
            Self::Eq => a == b,
            Self::Ne => a != b,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(String),
    Negate(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` holds when every adjacent pair holds.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        let op = self.peek_op().filter(|op| ops.contains(op))?;
        self.pos += 1;
        Some(op)
    }

    fn parse(mut self) -> Result<Expr, String> {
        if self.tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let expr = self.or()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some(token) => Err(format!("unexpected trailing {token:?}")),
        }
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.not()?;
        while self.eat_op(&["&&"]).is_some() {
            lhs = Expr::And(Box::new(lhs), Box::new(self.not()?));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, String> {
        if self.eat_op(&["!"]).is_some() {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let first = self.sum()?;
        let mut chain = Vec::new();
        while let Some(op) = self.peek_op().and_then(CompareOp::from_token) {
            self.pos += 1;
            chain.push((op, self.sum()?));
        }
        if chain.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), chain))
        }
    }

    fn sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.term()?;
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            let rhs = self.unary()?;
            let op = match op {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                "//" => BinaryOp::FloorDiv,
                _ => BinaryOp::Mod,
            };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        match self.eat_op(&["-", "+"]) {
            Some("-") => Ok(Expr::Negate(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, String> {
        let base = self.atom()?;
        if self.eat_op(&["**"]).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| "unexpected end of expression".to_string())?;
        self.pos += 1;

        match token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Ident(name) => Ok(Expr::Variable(name)),
            Token::LParen => {
                let inner = self.or()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err("missing `)`".to_string()),
                }
            }
            other => Err(format!("unexpected {other:?}")),
        }
    }
}

fn truth(value: f64) -> bool {
    value != 0.0
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    fn eval(&self, point: &ParameterPoint) -> Result<f64, String> {
        Ok(match self {
            Expr::Number(v) => *v,
            Expr::Variable(name) => point
                .get(name)
                .map(|v| v as f64)
                .ok_or_else(|| format!("unknown parameter `{name}`"))?,
            Expr::Negate(inner) => -inner.eval(point)?,
            Expr::Not(inner) => flag(!truth(inner.eval(point)?)),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(point)?;
                let b = rhs.eval(point)?;
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Pow => a.powf(b),
                    BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
                        return Err("division by zero".to_string())
                    }
                    BinaryOp::Div => a / b,
                    BinaryOp::FloorDiv => (a / b).floor(),
                    // Result takes the sign of the divisor.
                    BinaryOp::Mod => a - b * (a / b).floor(),
                }
            }
            Expr::Compare(first, chain) => {
                let mut lhs = first.eval(point)?;
                for (op, rhs) in chain {
                    let rhs = rhs.eval(point)?;
                    if !op.apply(lhs, rhs) {
                        return Ok(0.0);
                    }
                    lhs = rhs;
                }
                1.0
            }
            Expr::And(lhs, rhs) => {
                flag(truth(lhs.eval(point)?) && truth(rhs.eval(point)?))
            }
            Expr::Or(lhs, rhs) => flag(truth(lhs.eval(point)?) || truth(rhs.eval(point)?)),
        })
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                out.insert(name.as_str());
            }
            Expr::Negate(inner) | Expr::Not(inner) => inner.collect_variables(out),
            Expr::Binary(_, lhs, rhs) | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expr::Compare(first, chain) => {
                first.collect_variables(out);
                for (_, rhs) in chain {
                    rhs.collect_variables(out);
                }
            }
        }
    }
}

/// A parsed restriction expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Restriction {
    source: String,
    expr: Expr,
}

impl Restriction {
    pub fn parse(source: &str) -> Result<Self, SearchError> {
        let invalid = |message: String| SearchError::InvalidRestriction {
            expression: source.to_string(),
            message,
        };

        let tokens = tokenize(source).map_err(invalid)?;
        let expr = Parser { tokens, pos: 0 }.parse().map_err(invalid)?;

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter names the expression refers to.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.expr.collect_variables(&mut names);
        names
    }

    /// Evaluate with the point's values bound as variables.
    pub fn evaluate(&self, point: &ParameterPoint) -> Result<bool, SearchError> {
        self.expr
            .eval(point)
            .map(truth)
            .map_err(|message| SearchError::RestrictionEvaluation {
                expression: self.source.clone(),
                message,
            })
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
