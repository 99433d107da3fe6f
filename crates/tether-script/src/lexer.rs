//! Lexer for the embedded scripting language.
//!
//! Tokens are produced by a logos state machine over the whole source; byte
//! offsets are mapped back to line/column through a line-start table so that
//! spans stay exact inside template interpolations, which are lexed as
//! sub-ranges of the same source.

use crate::token::{Span, TemplatePart, Token};
use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
enum RawToken {
    #[token("/*", lex_block_comment)]
    BlockComment,

    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("var")]
    Var,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("new")]
    New,
    #[token("this")]
    This,
    #[token("typeof")]
    Typeof,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", parse_decimal)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", parse_decimal)]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, parse_quoted)]
    #[regex(r"'([^'\\\n]|\\.)*'", parse_quoted)]
    String(String),

    #[regex(r"`([^`\\]|\\.)*`")]
    Template,

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("=>")]
    Arrow,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("==")]
    Equal,
    #[token("===")]
    StrictEqual,
    #[token("!=")]
    NotEqual,
    #[token("!==")]
    StrictNotEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("!")]
    Bang,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("??")]
    QuestionQuestion,
}

fn lex_block_comment(lex: &mut logos::Lexer<RawToken>) -> logos::Skip {
    let remainder = lex.remainder();
    match remainder.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(remainder.len()),
    }
    logos::Skip
}

fn parse_hex(lex: &mut logos::Lexer<RawToken>) -> Option<f64> {
    i64::from_str_radix(&lex.slice()[2..], 16)
        .ok()
        .map(|n| n as f64)
}

fn parse_decimal(lex: &mut logos::Lexer<RawToken>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_quoted(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let s = lex.slice();
    Some(unescape(&s[1..s.len() - 1]))
}

/// Process backslash escapes in a string or template segment.
pub(crate) fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let mut hex = String::new();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    while let Some(&ch) = chars.peek() {
                        chars.next();
                        if ch == '}' {
                            break;
                        }
                        hex.push(ch);
                    }
                } else {
                    for _ in 0..4 {
                        if let Some(&ch) = chars.peek() {
                            if ch.is_ascii_hexdigit() {
                                hex.push(ch);
                                chars.next();
                            }
                        }
                    }
                }
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            // \\, \", \', \` and any unknown escape map to the character itself
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedCharacter { char: char, span: Span },
    UnterminatedString { span: Span },
    UnterminatedTemplate { span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::UnterminatedTemplate { span } => *span,
        }
    }

    pub fn message(&self) -> String {
        match self {
            LexError::UnexpectedCharacter { char, .. } => {
                format!("Invalid or unexpected token '{}'", char)
            }
            LexError::UnterminatedString { .. } => "Unterminated string literal".to_string(),
            LexError::UnterminatedTemplate { .. } => "Unterminated template literal".to_string(),
        }
    }
}

/// Source-to-token converter.
pub struct Lexer<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    /// Tokenize the whole source. The returned stream always ends in `Eof`.
    pub fn tokenize(&self) -> Result<Vec<(Token, Span)>, Vec<LexError>> {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        self.lex_range(0, self.source.len(), &mut tokens, &mut errors);
        if !errors.is_empty() {
            return Err(errors);
        }
        let end = self.source.len();
        tokens.push((Token::Eof, self.span(end, end)));
        Ok(tokens)
    }

    fn span(&self, start: usize, end: usize) -> Span {
        let line = match self.line_starts.binary_search(&start) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self.source[line_start..start].chars().count() + 1;
        Span::new(start, end, line as u32 + 1, column as u32)
    }

    fn lex_range(
        &self,
        start: usize,
        end: usize,
        tokens: &mut Vec<(Token, Span)>,
        errors: &mut Vec<LexError>,
    ) {
        let mut lexer = RawToken::lexer(&self.source[start..end]);
        while let Some(result) = lexer.next() {
            let range = lexer.span();
            let span = self.span(start + range.start, start + range.end);
            let raw = match result {
                Ok(raw) => raw,
                Err(()) => {
                    let char = lexer.slice().chars().next().unwrap_or('\0');
                    errors.push(match char {
                        '"' | '\'' => LexError::UnterminatedString { span },
                        '`' => LexError::UnterminatedTemplate { span },
                        _ => LexError::UnexpectedCharacter { char, span },
                    });
                    continue;
                }
            };
            let token = match raw {
                RawToken::Template => {
                    match self.split_template(span.start + 1, span.end - 1) {
                        Ok(parts) => Token::Template(parts),
                        Err(err) => {
                            errors.push(err);
                            continue;
                        }
                    }
                }
                other => convert(other),
            };
            tokens.push((token, span));
        }
    }

    /// Split the body of a template literal into text and `${}` parts.
    fn split_template(&self, start: usize, end: usize) -> Result<Vec<TemplatePart>, LexError> {
        let body = &self.source[start..end];
        let bytes = body.as_bytes();
        let mut parts = Vec::new();
        let mut text_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    if i > text_start {
                        parts.push(TemplatePart::Text(unescape(&body[text_start..i])));
                    }
                    let expr_start = i + 2;
                    let expr_end = matching_brace(bytes, expr_start).ok_or_else(|| {
                        LexError::UnterminatedTemplate {
                            span: self.span(start + i, end),
                        }
                    })?;
                    let mut tokens = Vec::new();
                    let mut errors = Vec::new();
                    self.lex_range(start + expr_start, start + expr_end, &mut tokens, &mut errors);
                    if let Some(err) = errors.into_iter().next() {
                        return Err(err);
                    }
                    let eof = self.span(start + expr_end, start + expr_end);
                    tokens.push((Token::Eof, eof));
                    parts.push(TemplatePart::Expression(tokens));
                    i = expr_end + 1;
                    text_start = i;
                }
                _ => i += 1,
            }
        }
        if text_start < bytes.len() {
            parts.push(TemplatePart::Text(unescape(&body[text_start..])));
        }
        Ok(parts)
    }
}

/// Index of the `}` closing an interpolation that starts at `from`.
fn matching_brace(bytes: &[u8], from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth == 0 => return Some(i),
                b'}' => depth -= 1,
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn convert(raw: RawToken) -> Token {
    match raw {
        RawToken::Let => Token::Let,
        RawToken::Const => Token::Const,
        RawToken::Var => Token::Var,
        RawToken::Function => Token::Function,
        RawToken::Return => Token::Return,
        RawToken::If => Token::If,
        RawToken::Else => Token::Else,
        RawToken::While => Token::While,
        RawToken::For => Token::For,
        RawToken::Break => Token::Break,
        RawToken::Continue => Token::Continue,
        RawToken::New => Token::New,
        RawToken::This => Token::This,
        RawToken::Typeof => Token::Typeof,
        RawToken::Throw => Token::Throw,
        RawToken::Try => Token::Try,
        RawToken::Catch => Token::Catch,
        RawToken::Finally => Token::Finally,
        RawToken::True => Token::True,
        RawToken::False => Token::False,
        RawToken::Null => Token::Null,
        RawToken::Number(n) => Token::Number(n),
        RawToken::String(s) => Token::String(s),
        RawToken::Identifier(name) => Token::Identifier(name),
        RawToken::LeftParen => Token::LeftParen,
        RawToken::RightParen => Token::RightParen,
        RawToken::LeftBrace => Token::LeftBrace,
        RawToken::RightBrace => Token::RightBrace,
        RawToken::LeftBracket => Token::LeftBracket,
        RawToken::RightBracket => Token::RightBracket,
        RawToken::Semicolon => Token::Semicolon,
        RawToken::Comma => Token::Comma,
        RawToken::Dot => Token::Dot,
        RawToken::Question => Token::Question,
        RawToken::Colon => Token::Colon,
        RawToken::Arrow => Token::Arrow,
        RawToken::Assign => Token::Assign,
        RawToken::PlusAssign => Token::PlusAssign,
        RawToken::MinusAssign => Token::MinusAssign,
        RawToken::StarAssign => Token::StarAssign,
        RawToken::SlashAssign => Token::SlashAssign,
        RawToken::PercentAssign => Token::PercentAssign,
        RawToken::Equal => Token::Equal,
        RawToken::StrictEqual => Token::StrictEqual,
        RawToken::NotEqual => Token::NotEqual,
        RawToken::StrictNotEqual => Token::StrictNotEqual,
        RawToken::Less => Token::Less,
        RawToken::LessEqual => Token::LessEqual,
        RawToken::Greater => Token::Greater,
        RawToken::GreaterEqual => Token::GreaterEqual,
        RawToken::Plus => Token::Plus,
        RawToken::Minus => Token::Minus,
        RawToken::Star => Token::Star,
        RawToken::Slash => Token::Slash,
        RawToken::Percent => Token::Percent,
        RawToken::PlusPlus => Token::PlusPlus,
        RawToken::MinusMinus => Token::MinusMinus,
        RawToken::Bang => Token::Bang,
        RawToken::AmpAmp => Token::AmpAmp,
        RawToken::PipePipe => Token::PipePipe,
        RawToken::QuestionQuestion => Token::QuestionQuestion,
        // Skipped by its callback and never yielded
        RawToken::BlockComment | RawToken::Template => Token::Eof,
    }
}
