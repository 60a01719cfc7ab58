//! DV-011: Expression-program lexer.
//!
//! Produces a flat token vector with 1-based source positions. Newlines are
//! significant statement separators except inside `(...)` and `[...]`.

use crate::core::types::{Detail, Diagnostic};
use std::fmt;

/// Source position (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn detail(self) -> Detail {
        Detail::Location {
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    And,
    Else,
    False,
    If,
    In,
    Not,
    Null,
    Or,
    True,
    While,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Self> {
        Some(match word {
            "and" => Self::And,
            "else" => Self::Else,
            "false" => Self::False,
            "if" => Self::If,
            "in" => Self::In,
            "not" => Self::Not,
            "null" => Self::Null,
            "or" => Self::Or,
            "true" => Self::True,
            "while" => Self::While,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Integer(i64),
    Real(f64),
    Str(String),
    Keyword(Keyword),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Assign,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Period,
    Semicolon,
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::Integer(i) => write!(f, "{}", i),
            Token::Real(r) => write!(f, "{}", r),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Keyword(k) => write!(f, "{}", format!("{:?}", k).to_lowercase()),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Equal => f.write_str("=="),
            Token::NotEqual => f.write_str("!="),
            Token::Less => f.write_str("<"),
            Token::LessEqual => f.write_str("<="),
            Token::Greater => f.write_str(">"),
            Token::GreaterEqual => f.write_str(">="),
            Token::Assign => f.write_str("="),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::OpenBracket => f.write_str("["),
            Token::CloseBracket => f.write_str("]"),
            Token::OpenBrace => f.write_str("{"),
            Token::CloseBrace => f.write_str("}"),
            Token::Comma => f.write_str(","),
            Token::Period => f.write_str("."),
            Token::Semicolon => f.write_str(";"),
            Token::Newline => f.write_str("newline"),
        }
    }
}

/// A token plus where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: Pos,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    depth: usize,
}

/// Tokenize a whole program.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, Diagnostic> {
    let mut lexer = Lexer {
        chars: src.chars().peekable(),
        line: 1,
        column: 1,
        depth: 0,
    };
    let mut out = Vec::new();
    while let Some(tok) = lexer.scan()? {
        out.push(tok);
    }
    Ok(out)
}

impl Lexer<'_> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_if(&mut self, want: char) -> bool {
        if self.chars.peek() == Some(&want) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn error(pos: Pos, message: String) -> Diagnostic {
        Diagnostic::syntax(message).with_detail(pos.detail())
    }

    /// Next token, or None at end of input.
    fn scan(&mut self) -> Result<Option<Spanned>, Diagnostic> {
        loop {
            match self.chars.peek() {
                None => return Ok(None),
                Some('#') => {
                    while matches!(self.chars.peek(), Some(c) if *c != '\n') {
                        self.bump();
                    }
                }
                Some('\n') if self.depth > 0 => {
                    self.bump();
                }
                Some(c) if c.is_whitespace() && *c != '\n' => {
                    self.bump();
                }
                Some(_) => break,
            }
        }

        let pos = self.pos();
        let Some(c) = self.bump() else {
            return Ok(None);
        };
        let token = match c {
            '\n' => Token::Newline,
            '0'..='9' => self.number(c, pos)?,
            '"' | '\'' => self.string(c, pos)?,
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&n) = self.chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        word.push(n);
                        self.bump();
                    } else {
                        break;
                    }
                }
                match Keyword::lookup(&word) {
                    Some(k) => Token::Keyword(k),
                    None => Token::Ident(word),
                }
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' if self.bump_if('=') => Token::Equal,
            '=' => Token::Assign,
            '!' if self.bump_if('=') => Token::NotEqual,
            '<' if self.bump_if('=') => Token::LessEqual,
            '<' => Token::Less,
            '>' if self.bump_if('=') => Token::GreaterEqual,
            '>' => Token::Greater,
            '(' => {
                self.depth += 1;
                Token::OpenParen
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                Token::CloseParen
            }
            '[' => {
                self.depth += 1;
                Token::OpenBracket
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                Token::CloseBracket
            }
            '{' => Token::OpenBrace,
            '}' => Token::CloseBrace,
            ',' => Token::Comma,
            '.' => Token::Period,
            ';' => Token::Semicolon,
            other => {
                return Err(Self::error(pos, format!("unexpected character {:?}", other)));
            }
        };
        Ok(Some(Spanned { token, pos }))
    }

    fn number(&mut self, first: char, pos: Pos) -> Result<Token, Diagnostic> {
        let mut text = String::from(first);
        let mut real = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
                self.bump();
            } else if c == '.' && !real {
                real = true;
                text.push(c);
                self.bump();
            } else if (c == 'e' || c == 'E') && !text.contains(['e', 'E']) {
                real = true;
                text.push(c);
                self.bump();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.bump();
                    }
                }
            } else {
                break;
            }
        }
        let clean = text.replace('_', "");
        if real {
            clean
                .parse::<f64>()
                .map(Token::Real)
                .map_err(|_| Self::error(pos, format!("invalid number literal '{}'", text)))
        } else {
            clean
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| Self::error(pos, format!("integer literal '{}' out of range", text)))
        }
    }

    fn string(&mut self, quote: char, pos: Pos) -> Result<Token, Diagnostic> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(Self::error(pos, "unterminated string literal".to_string()));
                }
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c) => s.push(c),
                    None => {
                        return Err(Self::error(pos, "unterminated string literal".to_string()));
                    }
                },
                Some(c) if c == quote => return Ok(Token::Str(s)),
                Some(c) => s.push(c),
            }
        }
    }
}
