//! DV-012: Expression-program parser — statements and precedence climbing.

use super::lexer::{tokenize, Keyword, Pos, Spanned, Token};
use crate::core::types::{Diagnostic, Value};

/// Operator precedence.
pub type Precedence = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

impl BinaryOp {
    fn from_token(token: &Token) -> Option<Self> {
        Some(match token {
            Token::Keyword(Keyword::Or) => Self::Or,
            Token::Keyword(Keyword::And) => Self::And,
            Token::Equal => Self::Equal,
            Token::NotEqual => Self::NotEqual,
            Token::Less => Self::Less,
            Token::LessEqual => Self::LessEqual,
            Token::Greater => Self::Greater,
            Token::GreaterEqual => Self::GreaterEqual,
            Token::Plus => Self::Add,
            Token::Minus => Self::Subtract,
            Token::Star => Self::Multiply,
            Token::Slash => Self::Divide,
            Token::Percent => Self::Remainder,
            _ => return None,
        })
    }

    pub fn precedence(self) -> Precedence {
        match self {
            Self::Or => 1,
            Self::And => 2,
            // prefix `not` is 3
            Self::Equal
            | Self::NotEqual
            | Self::Less
            | Self::LessEqual
            | Self::Greater
            | Self::GreaterEqual => 4,
            Self::Add | Self::Subtract => 5,
            Self::Multiply | Self::Divide | Self::Remainder => 6,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
        }
    }
}

const NOT_PRECEDENCE: Precedence = 3;
const IN_PRECEDENCE: Precedence = 4;
const NEGATE_PRECEDENCE: Precedence = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// Call argument, positional or named.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Ident(String, Pos),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    In {
        expr: Box<Expr>,
        list: Box<Expr>,
        negated: bool,
    },
    /// Free function call: `round(x, 2)`
    Call {
        name: String,
        args: Vec<Arg>,
        pos: Pos,
    },
    /// Method call: `df.filter(x > 1)`
    Method {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Arg>,
        pos: Pos,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        name: String,
        value: Expr,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

/// Deepest nesting of expressions and blocks a program may use.
pub const MAX_NESTING: usize = 128;

/// Parse a whole program into statements.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, Diagnostic> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        level: 0,
    };
    let stmts = parser.statements(false)?;
    if let Some(tok) = parser.peek() {
        return Err(parser.unexpected(&tok.token, tok.pos));
    }
    Ok(stmts)
}

/// An expression with the depth of its tree.
type Node = (Expr, usize);

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    /// Current recursion level through expressions and blocks.
    level: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.index)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.index + n).map(|s| &s.token)
    }

    /// Position of the next token, or just past the last one.
    fn here(&self) -> Pos {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|s| s.pos)
            .unwrap_or_default()
    }

    fn next(&mut self) -> Result<Spanned, Diagnostic> {
        let tok = self.tokens.get(self.index).cloned().ok_or_else(|| {
            Diagnostic::syntax("unexpected end of program").with_detail(self.here().detail())
        })?;
        self.index += 1;
        Ok(tok)
    }

    fn next_is(&mut self, token: &Token) -> bool {
        if self.peek_token() == Some(token) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), Diagnostic> {
        let tok = self.next()?;
        if tok.token != token {
            return Err(Diagnostic::syntax(format!(
                "expected {}, found {}",
                token, tok.token
            ))
            .with_detail(tok.pos.detail()));
        }
        Ok(())
    }

    fn next_ident(&mut self) -> Result<(String, Pos), Diagnostic> {
        let tok = self.next()?;
        match tok.token {
            Token::Ident(name) => Ok((name, tok.pos)),
            other => Err(Diagnostic::syntax(format!("expected identifier, found {}", other))
                .with_detail(tok.pos.detail())),
        }
    }

    fn unexpected(&self, token: &Token, pos: Pos) -> Diagnostic {
        Diagnostic::syntax(format!("unexpected token {}", token)).with_detail(pos.detail())
    }

    fn too_deep(&self) -> Diagnostic {
        Diagnostic::syntax(format!(
            "program is nested too deeply (more than {} levels)",
            MAX_NESTING
        ))
        .with_detail(self.here().detail())
    }

    /// Depth of a node built over children of depth `inner`.
    fn wrap(&self, inner: usize) -> Result<usize, Diagnostic> {
        let depth = inner + 1;
        if depth > MAX_NESTING {
            return Err(self.too_deep());
        }
        Ok(depth)
    }

    /// Run `f` one recursion level down.
    fn descend<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        if self.level >= MAX_NESTING {
            return Err(self.too_deep());
        }
        self.level += 1;
        let out = f(self);
        self.level -= 1;
        out
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_token(), Some(Token::Newline | Token::Semicolon)) {
            self.index += 1;
        }
    }

    /// Statements until end of input, or until `}` when `in_block`.
    fn statements(&mut self, in_block: bool) -> Result<Vec<Stmt>, Diagnostic> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            match self.peek_token() {
                None => break,
                Some(Token::CloseBrace) if in_block => break,
                Some(_) => {}
            }
            stmts.push(self.statement()?);
            match self.peek_token() {
                None | Some(Token::Newline | Token::Semicolon) => {}
                Some(Token::CloseBrace) if in_block => {}
                Some(tok) => {
                    let tok = tok.clone();
                    return Err(self.unexpected(&tok, self.here()));
                }
            }
        }
        Ok(stmts)
    }

    fn block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.expect(Token::OpenBrace)?;
        let body = self.descend(|p| p.statements(true))?;
        self.expect(Token::CloseBrace)?;
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, Diagnostic> {
        if self.next_is(&Token::Keyword(Keyword::While)) {
            let (cond, _) = self.expression(0)?;
            let body = self.block()?;
            return Ok(Stmt::While { cond, body });
        }
        if self.next_is(&Token::Keyword(Keyword::If)) {
            return self.descend(|p| p.if_statement());
        }
        let (name, _) = self.next_ident()?;
        self.expect(Token::Assign)?;
        let (value, _) = self.expression(0)?;
        Ok(Stmt::Assign { name, value })
    }

    fn if_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let (cond, _) = self.expression(0)?;
        let then = self.block()?;
        let otherwise = if self.next_is(&Token::Keyword(Keyword::Else)) {
            if self.next_is(&Token::Keyword(Keyword::If)) {
                vec![self.descend(|p| p.if_statement())?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn expression(&mut self, min: Precedence) -> Result<Node, Diagnostic> {
        self.descend(|p| p.climb(min))
    }

    /// Precedence climbing: parse an expression whose operators all bind at
    /// least as tightly as `min`.
    fn climb(&mut self, min: Precedence) -> Result<Node, Diagnostic> {
        let (mut lhs, mut depth) = self.prefix()?;
        loop {
            // `in` / `not in`
            let negated = match (self.peek_token(), self.peek_nth(1)) {
                (Some(Token::Keyword(Keyword::In)), _) => Some(false),
                (Some(Token::Keyword(Keyword::Not)), Some(Token::Keyword(Keyword::In))) => {
                    Some(true)
                }
                _ => None,
            };
            if let Some(negated) = negated {
                if IN_PRECEDENCE < min {
                    break;
                }
                self.index += if negated { 2 } else { 1 };
                let (list, list_depth) = self.expression(IN_PRECEDENCE + 1)?;
                depth = self.wrap(depth.max(list_depth))?;
                lhs = Expr::In {
                    expr: Box::new(lhs),
                    list: Box::new(list),
                    negated,
                };
                continue;
            }

            let Some(op) = self.peek_token().and_then(BinaryOp::from_token) else {
                break;
            };
            if op.precedence() < min {
                break;
            }
            self.index += 1;
            // all binary operators are left-associative
            let (rhs, rhs_depth) = self.expression(op.precedence() + 1)?;
            depth = self.wrap(depth.max(rhs_depth))?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok((lhs, depth))
    }

    fn prefix(&mut self) -> Result<Node, Diagnostic> {
        if self.next_is(&Token::Keyword(Keyword::Not)) {
            let (operand, depth) = self.expression(NOT_PRECEDENCE)?;
            return Ok((Expr::Unary(UnaryOp::Not, Box::new(operand)), self.wrap(depth)?));
        }
        if self.next_is(&Token::Minus) {
            let (operand, depth) = self.expression(NEGATE_PRECEDENCE)?;
            return Ok(match operand {
                Expr::Literal(Value::Integer(i)) => (Expr::Literal(Value::Integer(-i)), depth),
                Expr::Literal(Value::Real(r)) => (Expr::Literal(Value::Real(-r)), depth),
                other => (Expr::Unary(UnaryOp::Negate, Box::new(other)), self.wrap(depth)?),
            });
        }
        let atom = self.atom()?;
        self.postfix(atom)
    }

    fn postfix(&mut self, (mut expr, mut depth): Node) -> Result<Node, Diagnostic> {
        while self.next_is(&Token::Period) {
            let (name, pos) = self.next_ident()?;
            self.expect(Token::OpenParen)?;
            let (args, args_depth) = self.arguments()?;
            depth = self.wrap(depth.max(args_depth))?;
            expr = Expr::Method {
                receiver: Box::new(expr),
                name,
                args,
                pos,
            };
        }
        Ok((expr, depth))
    }

    fn atom(&mut self) -> Result<Node, Diagnostic> {
        let tok = self.next()?;
        let literal = |v: Value| (Expr::Literal(v), 1);
        Ok(match tok.token {
            Token::Integer(i) => literal(Value::Integer(i)),
            Token::Real(r) => literal(Value::Real(r)),
            Token::Str(s) => literal(Value::Text(s)),
            Token::Keyword(Keyword::True) => literal(Value::Boolean(true)),
            Token::Keyword(Keyword::False) => literal(Value::Boolean(false)),
            Token::Keyword(Keyword::Null) => literal(Value::Null),
            Token::Ident(name) => {
                if self.next_is(&Token::OpenParen) {
                    let (args, depth) = self.arguments()?;
                    let call = Expr::Call {
                        name,
                        args,
                        pos: tok.pos,
                    };
                    (call, self.wrap(depth)?)
                } else {
                    (Expr::Ident(name, tok.pos), 1)
                }
            }
            Token::OpenParen => {
                let inner = self.expression(0)?;
                self.expect(Token::CloseParen)?;
                inner
            }
            Token::OpenBracket => {
                let mut items = Vec::new();
                let mut depth = 0;
                while !self.next_is(&Token::CloseBracket) {
                    let (item, item_depth) = self.expression(0)?;
                    items.push(item);
                    depth = depth.max(item_depth);
                    if !self.next_is(&Token::Comma) {
                        self.expect(Token::CloseBracket)?;
                        break;
                    }
                }
                (Expr::List(items), self.wrap(depth)?)
            }
            other => return Err(self.unexpected(&other, tok.pos)),
        })
    }

    /// Arguments after an opening parenthesis, through the closing one,
    /// with the depth of the deepest argument.
    fn arguments(&mut self) -> Result<(Vec<Arg>, usize), Diagnostic> {
        let mut args = Vec::new();
        let mut depth = 0;
        while !self.next_is(&Token::CloseParen) {
            let named = matches!(
                (self.peek_token(), self.peek_nth(1)),
                (Some(Token::Ident(_)), Some(Token::Assign))
            );
            let name = if named {
                let (name, _) = self.next_ident()?;
                self.index += 1;
                Some(name)
            } else {
                None
            };
            let (value, value_depth) = self.expression(0)?;
            depth = depth.max(value_depth);
            args.push(Arg { name, value });
            if !self.next_is(&Token::Comma) {
                self.expect(Token::CloseParen)?;
                break;
            }
        }
        Ok((args, depth))
    }
}
