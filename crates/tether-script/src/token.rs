//! Token definitions for the embedded scripting language.

use std::fmt;

/// A lexed token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Let,
    Const,
    Var,
    Function,
    Return,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    New,
    This,
    Typeof,
    Throw,
    Try,
    Catch,
    Finally,
    True,
    False,
    Null,

    // Literals
    Number(f64),
    String(String),
    Template(Vec<TemplatePart>),
    Identifier(String),

    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Semicolon,
    Comma,
    Dot,
    Question,
    Colon,
    Arrow,

    // Operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    Equal,
    StrictEqual,
    NotEqual,
    StrictNotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Bang,
    AmpAmp,
    PipePipe,
    QuestionQuestion,

    Eof,
}

/// Piece of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text (escapes already processed)
    Text(String),
    /// Tokens of an interpolated `${...}` expression
    Expression(Vec<(Token, Span)>),
}

impl Token {
    /// Keyword spelling, used where keywords are valid property names
    pub fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            Token::Let => "let",
            Token::Const => "const",
            Token::Var => "var",
            Token::Function => "function",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::For => "for",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::New => "new",
            Token::This => "this",
            Token::Typeof => "typeof",
            Token::Throw => "throw",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Finally => "finally",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            _ => return None,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.keyword_text() {
            return f.write_str(keyword);
        }
        let text = match self {
            Token::Number(n) => return write!(f, "{}", n),
            Token::String(s) => return write!(f, "\"{}\"", s),
            Token::Template(_) => "template literal",
            Token::Identifier(name) => return f.write_str(name),
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Arrow => "=>",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::PercentAssign => "%=",
            Token::Equal => "==",
            Token::StrictEqual => "===",
            Token::NotEqual => "!=",
            Token::StrictNotEqual => "!==",
            Token::Less => "<",
            Token::LessEqual => "<=",
            Token::Greater => ">",
            Token::GreaterEqual => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Bang => "!",
            Token::AmpAmp => "&&",
            Token::PipePipe => "||",
            Token::QuestionQuestion => "??",
            Token::Eof => "end of input",
            _ => "keyword",
        };
        f.write_str(text)
    }
}

/// Source location of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering `self` through `other`
    pub fn to(&self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }
}

/// 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
