//! Recursive-descent parser producing the condition AST.
//!
//! Precedence (loosest to tightest): `or`, `and`, `not`, comparison,
//! postfix (subscript / method call), primary.

use super::lexer::Token;
use super::PredicateError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
}

/// Methods callable on a value. The allowlist *is* the sandbox: anything
/// else fails to parse.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Method {
    Get,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Expr {
    /// The bound state variable `x`.
    State,
    Str(String),
    Num(f64),
    Bool(bool),
    None,
    Subscript(Box<Expr>, Box<Expr>),
    MethodCall(Box<Expr>, Method, Vec<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

pub(super) fn parse(tokens: &[Token]) -> Result<Expr, PredicateError> {
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if parser.pos != tokens.len() {
        return Err(PredicateError::Parse(format!(
            "trailing input at token {}",
            parser.pos
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), PredicateError> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            other => Err(PredicateError::Parse(format!(
                "expected {what}, found {other:?}"
            ))),
        }
    }

    fn peek_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == word)
    }

    fn or_expr(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.and_expr()?;
        while self.peek_ident("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.not_expr()?;
        while self.peek_ident("and") {
            self.pos += 1;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, PredicateError> {
        // `not` binding a comparison, but `not in` belongs to the comparison.
        if self.peek_ident("not") && !matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(s)) if s == "in")
        {
            self.pos += 1;
            let inner = self.not_expr()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, PredicateError> {
        let left = self.postfix()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Some(CmpOp::Eq),
            Some(Token::NotEq) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Ge) => Some(CmpOp::Ge),
            Some(Token::Ident(s)) if s == "in" => Some(CmpOp::In),
            Some(Token::Ident(s)) if s == "not" => {
                if matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(w)) if w == "in") {
                    self.pos += 1; // consume `not`; `in` consumed below
                    Some(CmpOp::NotIn)
                } else {
                    return Err(PredicateError::Parse("bare 'not' after value".into()));
                }
            }
            _ => None,
        };
        match op {
            None => Ok(left),
            Some(op) => {
                self.pos += 1;
                let right = self.postfix()?;
                Ok(Expr::Compare(Box::new(left), op, Box::new(right)))
            }
        }
    }

    fn postfix(&mut self) -> Result<Expr, PredicateError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.or_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Subscript(Box::new(expr), Box::new(index));
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.next() {
                        Some(Token::Ident(s)) => s.clone(),
                        other => {
                            return Err(PredicateError::Parse(format!(
                                "expected method name after '.', found {other:?}"
                            )))
                        }
                    };
                    let method = match name.as_str() {
                        "get" => Method::Get,
                        "startswith" => Method::StartsWith,
                        "endswith" => Method::EndsWith,
                        other => {
                            return Err(PredicateError::Parse(format!(
                                "method '{other}' is not allowed"
                            )))
                        }
                    };
                    self.expect(&Token::LParen, "'('")?;
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.or_expr()?);
                            match self.peek() {
                                Some(Token::Comma) => {
                                    self.pos += 1;
                                }
                                _ => break,
                            }
                        }
                    }
                    self.expect(&Token::RParen, "')'")?;
                    expr = Expr::MethodCall(Box::new(expr), method, args);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, PredicateError> {
        match self.next() {
            Some(Token::Ident(s)) => match s.as_str() {
                "x" => Ok(Expr::State),
                "True" | "true" => Ok(Expr::Bool(true)),
                "False" | "false" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                other => Err(PredicateError::Parse(format!(
                    "unknown identifier '{other}' (only 'x' is bound)"
                ))),
            },
            Some(Token::Str(s)) => Ok(Expr::Str(s.clone())),
            Some(Token::Num(n)) => Ok(Expr::Num(*n)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(PredicateError::Parse(format!(
                "expected a value, found {other:?}"
            ))),
        }
    }
}
