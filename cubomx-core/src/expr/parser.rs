//! Pratt parser producing the expression AST.

use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Ident(String),
    This,
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(AssignOp, Box<Expr>, Box<Expr>),
    /// `++`/`--`; `delta` is +1 or -1.
    Update { target: Box<Expr>, delta: f64, prefix: bool },
}

impl Expr {
    fn is_assignable(&self) -> bool {
        matches!(self, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..))
    }
}

const PREFIX_BP: u8 = 11;

fn infix(punct: &str) -> Option<(u8, u8)> {
    Some(match punct {
        "??" => (4, 5),
        "||" => (5, 6),
        "&&" => (6, 7),
        "==" | "!=" | "===" | "!==" => (7, 8),
        "<" | "<=" | ">" | ">=" => (8, 9),
        "+" | "-" => (9, 10),
        "*" | "/" | "%" => (10, 11),
        _ => return None,
    })
}

pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str) -> Result<Self> {
        Ok(Self {
            source,
            tokens: Lexer::new(source).tokenize()?,
            pos: 0,
        })
    }

    /// Parse `;`-separated statements until the end of input.
    pub(crate) fn parse_statements(mut self) -> Result<Vec<Expr>> {
        let mut statements = Vec::new();
        loop {
            while self.eat(";") {}
            if self.at_eof() {
                return Ok(statements);
            }
            statements.push(self.expression()?);
            if !self.at_eof() && !self.eat(";") {
                return Err(self.unexpected());
            }
        }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.offset)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn at_eof(&self) -> bool {
        *self.peek() == TokenKind::Eof
    }

    fn at(&self, punct: &str) -> bool {
        matches!(self.peek(), TokenKind::Punct(p) if *p == punct)
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.at(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<()> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{punct}`")))
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            source_text: self.source.to_string(),
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn unexpected(&self) -> Error {
        match self.peek() {
            TokenKind::Eof => self.error("unexpected end of expression"),
            TokenKind::Punct(p) => self.error(format!("unexpected `{p}`")),
            TokenKind::Ident(name) => self.error(format!("unexpected identifier `{name}`")),
            TokenKind::Number(_) | TokenKind::String(_) => self.error("unexpected literal"),
        }
    }

    /// Assignment level, right associative.
    fn expression(&mut self) -> Result<Expr> {
        let target = self.conditional()?;
        let op = if self.at("=") {
            AssignOp::Set
        } else if self.at("+=") {
            AssignOp::Add
        } else if self.at("-=") {
            AssignOp::Sub
        } else {
            return Ok(target);
        };
        if !target.is_assignable() {
            return Err(self.error("invalid assignment target"));
        }
        self.pos += 1;
        let value = self.expression()?;
        Ok(Expr::Assign(op, Box::new(target), Box::new(value)))
    }

    fn conditional(&mut self) -> Result<Expr> {
        let test = self.binary(0)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let then = self.expression()?;
        self.expect(":")?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional(Box::new(test), Box::new(then), Box::new(otherwise)))
    }

    fn binary(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let TokenKind::Punct(punct) = *self.peek() else {
                break;
            };
            let Some((left_bp, right_bp)) = infix(punct) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(right_bp)?;
            lhs = match punct {
                "&&" => Expr::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs)),
                "||" => Expr::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs)),
                "??" => Expr::Logical(LogicalOp::Coalesce, Box::new(lhs), Box::new(rhs)),
                other => Expr::Binary(binary_op(other), Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.binary(PREFIX_BP)?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }

        let delta = if self.at("++") {
            Some(1.0)
        } else if self.at("--") {
            Some(-1.0)
        } else {
            None
        };
        if let Some(delta) = delta {
            self.pos += 1;
            let target = self.postfix()?;
            if !target.is_assignable() {
                return Err(self.error("invalid update target"));
            }
            return Ok(Expr::Update {
                target: Box::new(target),
                delta,
                prefix: true,
            });
        }

        let expr = self.postfix()?;
        let delta = if self.at("++") {
            1.0
        } else if self.at("--") {
            -1.0
        } else {
            return Ok(expr);
        };
        if !expr.is_assignable() {
            return Err(self.error("invalid update target"));
        }
        self.pos += 1;
        Ok(Expr::Update {
            target: Box::new(expr),
            delta,
            prefix: false,
        })
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") {
                match self.bump() {
                    TokenKind::Ident(name) => expr = Expr::Member(Box::new(expr), name),
                    _ => {
                        self.pos -= 1;
                        return Err(self.error("expected property name after `.`"));
                    }
                }
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat("(") {
                let args = self.list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn list(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if !self.eat(",") {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr> {
        let expr = match self.peek().clone() {
            TokenKind::Number(n) => Expr::Literal(Value::Number(n)),
            TokenKind::String(s) => Expr::Literal(Value::from(s)),
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                "undefined" => Expr::Literal(Value::Undefined),
                "this" => Expr::This,
                _ => Expr::Ident(name),
            },
            TokenKind::Punct("(") => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(")")?;
                return Ok(inner);
            }
            TokenKind::Punct("[") => {
                self.pos += 1;
                return Ok(Expr::Array(self.list("]")?));
            }
            TokenKind::Punct("{") => {
                self.pos += 1;
                return self.object();
            }
            _ => return Err(self.unexpected()),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn object(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        while !self.eat("}") {
            let key = match self.bump() {
                TokenKind::Ident(name) | TokenKind::String(name) => name,
                TokenKind::Number(n) => crate::value::format_number(n),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected property key"));
                }
            };
            let value = if self.eat(":") {
                self.expression()?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

fn binary_op(punct: &str) -> BinaryOp {
    match punct {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "==" => BinaryOp::LooseEq,
        "!=" => BinaryOp::LooseNe,
        "===" => BinaryOp::StrictEq,
        _ => BinaryOp::StrictNe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Expr> {
        Parser::new(source).unwrap().parse_statements().unwrap()
    }

    #[test]
    fn precedence_and_associativity() {
        let statements = parse("1 + 2 * 3");
        let Expr::Binary(BinaryOp::Add, lhs, rhs) = &statements[0] else {
            panic!("expected addition at the root");
        };
        assert!(matches!(**lhs, Expr::Literal(_)));
        assert!(matches!(**rhs, Expr::Binary(BinaryOp::Mul, ..)));

        let statements = parse("a = b = 1");
        let Expr::Assign(AssignOp::Set, _, value) = &statements[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(**value, Expr::Assign(AssignOp::Set, ..)));
    }

    #[test]
    fn member_calls_and_updates() {
        let statements = parse("CuboMX.a.receive(42); n++; --m;");
        assert_eq!(statements.len(), 3);
        assert!(matches!(&statements[0], Expr::Call(callee, args) if args.len() == 1 && matches!(**callee, Expr::Member(..))));
        assert!(matches!(&statements[1], Expr::Update { prefix: false, delta, .. } if *delta == 1.0));
        assert!(matches!(&statements[2], Expr::Update { prefix: true, delta, .. } if *delta == -1.0));
    }

    #[test]
    fn literals_and_conditionals() {
        let statements = parse("ok ? [1, 'two'] : { a: 1, b }");
        let Expr::Conditional(_, then, otherwise) = &statements[0] else {
            panic!("expected conditional");
        };
        assert!(matches!(&**then, Expr::Array(items) if items.len() == 2));
        assert!(matches!(&**otherwise, Expr::Object(entries) if entries.len() == 2));
    }

    #[test]
    fn rejects_malformed_input() {
        for source in ["1 +", "1 = 2", "a.", "(a", "a b", "5++"] {
            assert!(
                Parser::new(source).and_then(Parser::parse_statements).is_err(),
                "{source} should not parse"
            );
        }
    }
}
